//! Terminal styling for the report.
//!
//! Everything the reporter prints goes through a [`Palette`], which turns a
//! [`Style`] into ANSI escapes (or nothing, when color is off). Styling is
//! applied per line and never covers a line's leading whitespace, so indented
//! blocks stay aligned whatever the terminal does with background colors.

use std::io::{self, Write};

use termcolor::{Buffer, Color, ColorChoice, ColorSpec, WriteColor};

pub const FIG_TICK: &str = "✔";
pub const FIG_CROSS: &str = "✖";
pub const FIG_WARNING: &str = "⚠";

/// Semantic styles used across the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Header,
    Success,
    Dim,
    Failure,
    Location,
    Extra,
    Added,
    Removed,
    Inverse,
    Muted,
    Emphasis,
}

impl Style {
    fn spec(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Style::Header => spec.set_fg(Some(Color::Blue)),
            Style::Success => spec.set_fg(Some(Color::Green)),
            Style::Dim => spec.set_dimmed(true),
            Style::Failure => spec.set_fg(Some(Color::Red)),
            Style::Location => spec.set_fg(Some(Color::Magenta)),
            Style::Extra => spec.set_fg(Some(Color::Yellow)),
            Style::Added => spec.set_fg(Some(Color::Black)).set_bg(Some(Color::Green)),
            Style::Removed => spec.set_fg(Some(Color::Black)).set_bg(Some(Color::Red)),
            Style::Inverse => spec.set_fg(Some(Color::Black)).set_bg(Some(Color::White)),
            Style::Muted => spec.set_fg(Some(Color::White)).set_dimmed(true),
            Style::Emphasis => spec.set_fg(Some(Color::White)).set_bold(true),
        };
        spec
    }
}

/// Paints text into owned strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    ansi: bool,
}

impl Palette {
    pub fn ansi() -> Self {
        Self { ansi: true }
    }

    pub fn plain() -> Self {
        Self { ansi: false }
    }

    /// Resolves a color choice against the current stdout.
    pub fn for_stdout(choice: ColorChoice) -> Self {
        let ansi = match choice {
            ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => {
                atty::is(atty::Stream::Stdout)
                    && std::env::var_os("NO_COLOR").is_none()
                    && std::env::var("TERM").map_or(true, |t| t != "dumb")
            }
        };
        Self { ansi }
    }

    /// Applies `style` to every line of `text`, skipping leading whitespace.
    pub fn paint(&self, style: Style, text: &str) -> String {
        let mut buffer = if self.ansi {
            Buffer::ansi()
        } else {
            Buffer::no_color()
        };
        match write_styled(&mut buffer, &style.spec(), text) {
            Ok(()) => String::from_utf8_lossy(buffer.as_slice()).into_owned(),
            Err(_) => text.to_string(),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::plain()
    }
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn write_styled(buffer: &mut Buffer, spec: &ColorSpec, text: &str) -> io::Result<()> {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            buffer.write_all(b"\n")?;
        }
        let body = line.trim_start();
        let lead = &line[..line.len() - body.len()];
        buffer.write_all(lead.as_bytes())?;
        if body.is_empty() {
            continue;
        }
        buffer.set_color(spec)?;
        buffer.write_all(body.as_bytes())?;
        buffer.reset()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_palette_is_identity() {
        assert_eq!(Palette::plain().paint(Style::Added, "  a\n b"), "  a\n b");
    }

    #[test]
    fn test_leading_whitespace_is_not_styled() {
        let painted = Palette::ansi().paint(Style::Removed, "    x");
        assert!(painted.starts_with("    \x1b["));
        assert!(painted.contains("\x1b[41m"));
        assert!(painted.ends_with("x\x1b[0m"));
    }

    #[test]
    fn test_each_line_styled_separately() {
        let painted = Palette::ansi().paint(Style::Added, "a\nb");
        let lines: Vec<&str> = painted.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.contains("\x1b[42m") && l.ends_with("\x1b[0m")));
    }
}
