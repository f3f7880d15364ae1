//! TAP event model.
//!
//! These are the values a TAP parser hands to the reporter. They are transient:
//! the controller consumes each event as it arrives and only keeps the failed
//! assertions that `Summary` carries for the replay at the end of a run.

pub mod reader;

pub use reader::TapReader;

/// One event from a TAP stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TapEvent {
    /// A `# ...` line, including the leading marker when the source kept it.
    Comment(String),
    /// An `ok` / `not ok` test point.
    Assert(AssertRecord),
    /// End of input, with the aggregated result of the run.
    Complete(Summary),
    /// Any line that is not part of the protocol (console output, bail outs).
    Extra(String),
    /// A nested child group. Acknowledged, never rendered.
    Child(String),
}

/// A single test point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssertRecord {
    pub name: String,
    pub ok: bool,
    pub diag: Option<Diagnostic>,
}

impl AssertRecord {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            diag: None,
        }
    }

    pub fn failed(name: impl Into<String>, diag: Diagnostic) -> Self {
        Self {
            name: name.into(),
            ok: false,
            diag: Some(diag),
        }
    }
}

/// The YAML block attached to a failed test point.
///
/// `actual` and `expected` are always raw text, even when the producer
/// stringified an object or array into them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diagnostic {
    pub operator: String,
    pub at: String,
    pub actual: String,
    pub expected: String,
    pub stack: Option<String>,
}

impl Diagnostic {
    /// Operator tape uses for an exception thrown inside a test.
    pub const ERROR_OPERATOR: &'static str = "error";

    pub fn is_exception(&self) -> bool {
        self.operator == Self::ERROR_OPERATOR
    }
}

/// Aggregated outcome of a run, delivered with [`TapEvent::Complete`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    pub pass: usize,
    pub fail: usize,
    pub count: usize,
    pub ok: bool,
    /// Failed test points in discovery order.
    pub failures: Vec<AssertRecord>,
}
