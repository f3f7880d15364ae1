//! The reporter: event dispatch and indented output.

pub mod controller;
pub mod writer;

pub use controller::{Reporter, ReporterConfig, RunState};
pub use writer::ReportWriter;
