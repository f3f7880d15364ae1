//! Indented, line-oriented output.

use std::io::{self, Write};

/// One level of indentation. Level zero starts at the first column.
pub const INDENT: &str = "  ";

/// Writes indented lines to an output channel, flushing after every call so
/// nothing is held back from the consumer.
pub struct ReportWriter<W: Write> {
    out: W,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes each line of `text` prefixed with `indent_level` indents.
    pub fn write(&mut self, text: &str, indent_level: usize) -> io::Result<()> {
        let indent = INDENT.repeat(indent_level);
        for line in text.split('\n') {
            self.out.write_all(indent.as_bytes())?;
            self.out.write_all(line.as_bytes())?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }

    /// Writes an empty line.
    pub fn blank(&mut self) -> io::Result<()> {
        self.write("", 0)
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
