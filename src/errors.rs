//! tapdiff error taxonomy.
//!
//! None of these errors ends a report. Location errors degrade to an empty
//! location string, render errors are logged and the next event is handled.
//! Values that cannot be recovered are not errors at all: they surface as
//! [`NormalizedValue::Unparseable`](crate::normalize::NormalizedValue::Unparseable).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

/// Why a `(path:line:col)` location could not be mapped to original source.
#[derive(Debug, Error, Diagnostic)]
pub enum LocationError {
    #[error("invalid position in `{0}`")]
    #[diagnostic(code(tapdiff::location::position))]
    InvalidPosition(String),

    #[error("failed to read {}", path.display())]
    #[diagnostic(code(tapdiff::location::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed source map for {}", path.display())]
    #[diagnostic(
        code(tapdiff::location::map),
        help("the map must be a version 3 source map in JSON")
    )]
    MalformedMap {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed inline source map")]
    #[diagnostic(code(tapdiff::location::inline))]
    InlineMap(#[from] base64::DecodeError),

    #[error("invalid mappings segment `{0}`")]
    #[diagnostic(code(tapdiff::location::mappings))]
    Mappings(String),

    #[error("source map for {} failed to load earlier", path.display())]
    #[diagnostic(code(tapdiff::location::unavailable))]
    Unavailable {
        path: PathBuf,
        #[source]
        source: Arc<LocationError>,
    },

    #[error("no mapping for {path}:{line}:{column}")]
    #[diagnostic(code(tapdiff::location::unmapped))]
    Unmapped {
        path: String,
        line: u32,
        column: u32,
    },
}

/// A fault while rendering one event.
#[derive(Debug, Error, Diagnostic)]
pub enum RenderError {
    #[error("failed to write report output")]
    #[diagnostic(code(tapdiff::render::io))]
    Io(#[from] io::Error),

    #[error("formatting `{name}` panicked: {message}")]
    #[diagnostic(code(tapdiff::render::panic))]
    Panicked { name: String, message: String },
}
