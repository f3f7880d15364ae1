//! Source location resolution for `at` fields and stack frames.
//!
//! A frame such as `Test.<anonymous> (/app/dist/a.js:10:5)` ends in a
//! `(path:line:col)` suffix. [`SourceLocationResolver::resolve`] hands those
//! coordinates to a [`LocationLookup`] and writes the answer back into the
//! same suffix, leaving everything before it untouched.

pub mod sourcemap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::LocationError;

pub use sourcemap::SourceMapLookup;

static LOCATION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((.*):(\d*):(\d*)\)$").unwrap());

/// A position in a file. Lines and columns are 1-based, as in stack traces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: String,
    pub line: u32,
    pub column: u32,
}

/// Maps a generated-code position to its original-source position.
pub trait LocationLookup {
    fn lookup(&mut self, location: &Location) -> Result<Location, LocationError>;
}

/// Returns every position unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityLookup;

impl LocationLookup for IdentityLookup {
    fn lookup(&mut self, location: &Location) -> Result<Location, LocationError> {
        Ok(location.clone())
    }
}

pub struct SourceLocationResolver {
    lookup: Box<dyn LocationLookup>,
}

impl SourceLocationResolver {
    pub fn new(lookup: Box<dyn LocationLookup>) -> Self {
        Self { lookup }
    }

    pub fn identity() -> Self {
        Self::new(Box::new(IdentityLookup))
    }

    pub fn source_maps() -> Self {
        Self::new(Box::new(SourceMapLookup::default()))
    }

    /// Rewrites the trailing `(path:line:col)` of `raw`.
    ///
    /// Returns `raw` unchanged when there is no such suffix and an empty
    /// string when the lookup fails.
    pub fn resolve(&mut self, raw: &str) -> String {
        let Some(caps) = LOCATION_SUFFIX.captures(raw) else {
            return raw.to_string();
        };
        let Some(suffix) = caps.get(0) else {
            return raw.to_string();
        };

        match self.lookup_captures(&caps) {
            Ok(resolved) => format!(
                "{}({}:{}:{})",
                &raw[..suffix.start()],
                resolved.path,
                resolved.line,
                resolved.column
            ),
            Err(e) => {
                tracing::debug!(location = raw, error = %e, "unresolvable location");
                String::new()
            }
        }
    }

    fn lookup_captures(&mut self, caps: &regex::Captures<'_>) -> Result<Location, LocationError> {
        let position = |i: usize| -> Result<u32, LocationError> {
            caps[i]
                .parse()
                .map_err(|_| LocationError::InvalidPosition(caps[0].to_string()))
        };
        let location = Location {
            path: caps[1].to_string(),
            line: position(2)?,
            column: position(3)?,
        };
        self.lookup.lookup(&location)
    }
}
