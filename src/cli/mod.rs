//! The tapdiff command-line interface.
//!
//! Wires stdin (or a file) through [`TapReader`] into a [`Reporter`] writing
//! to stdout, and maps the run's failure flag to an exit code.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};
use tracing_subscriber::EnvFilter;

use crate::cli::args::TapdiffArgs;
use crate::cli::output::Palette;
use crate::location::SourceLocationResolver;
use crate::report::{Reporter, ReporterConfig};
use crate::tap::TapReader;

pub mod args;
pub mod output;

/// Environment variable holding a `tracing` filter for the stderr log.
pub const LOG_ENV: &str = "TAPDIFF_LOG";

/// The main entry point for the CLI.
pub fn run() -> miette::Result<ExitCode> {
    let args = TapdiffArgs::parse();
    init_logging(&args.log_level);

    let input: Box<dyn BufRead> = match args.input_path() {
        Some(path) => {
            let file = File::open(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let resolver = if args.no_source_maps {
        SourceLocationResolver::identity()
    } else {
        SourceLocationResolver::source_maps()
    };
    let config = ReporterConfig {
        palette: Palette::for_stdout(args.color.into()),
    };
    let mut reporter = Reporter::new(io::stdout().lock(), resolver, config);

    for event in TapReader::new(input) {
        let event = event.into_diagnostic().wrap_err("failed to read TAP input")?;
        reporter.handle(event);
    }

    Ok(if reporter.is_failed() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
