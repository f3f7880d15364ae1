//! tapdiff: renders a TAP event stream as a readable, colorized report with
//! structural diffs for failed assertions and source-mapped locations.

pub mod cli;
pub mod diff;
pub mod errors;
pub mod location;
pub mod normalize;
pub mod report;
pub mod tap;

pub use crate::errors::{LocationError, RenderError};
pub use crate::report::{Reporter, ReporterConfig};
pub use crate::tap::{AssertRecord, Diagnostic, Summary, TapEvent};
