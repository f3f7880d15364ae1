//! Command-line arguments for `tapdiff`.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use termcolor::ColorChoice;

/// Reads TAP from a file or stdin and prints a readable report.
#[derive(Debug, Parser)]
#[command(
    name = "tapdiff",
    version,
    about = "A TAP reporter with structural diffs and source-mapped locations."
)]
pub struct TapdiffArgs {
    /// TAP input file. Reads stdin when omitted or `-`.
    pub input: Option<PathBuf>,

    /// When to color the report.
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Print stack locations as they appear, without consulting source maps.
    #[arg(long)]
    pub no_source_maps: bool,

    /// Log filter for diagnostics written to stderr (overridden by `TAPDIFF_LOG`).
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl TapdiffArgs {
    /// The input path, or `None` for stdin.
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|p| p.as_os_str() != "-")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl From<ColorMode> for ColorChoice {
    fn from(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Auto => ColorChoice::Auto,
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
        }
    }
}
