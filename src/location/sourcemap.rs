//! Version 3 source map lookup.
//!
//! The generated file named in a stack frame is scanned for its
//! `sourceMappingURL` comment; the map is loaded from a sibling file or an
//! inline base64 data URL, its `mappings` are decoded once and cached per
//! generated path.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{Location, LocationLookup};
use crate::errors::LocationError;

static MAPPING_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//[#@]\s*sourceMappingURL=(\S+)").unwrap());

#[derive(Debug, Deserialize)]
struct RawSourceMap {
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(rename = "sourceRoot", default)]
    source_root: Option<String>,
    #[serde(default)]
    mappings: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    generated_column: u32,
    original: Option<(usize, u32, u32)>,
}

/// A decoded map: original source paths and, per generated line, segments
/// sorted by generated column.
#[derive(Debug)]
struct SourceMap {
    sources: Vec<String>,
    lines: Vec<Vec<Segment>>,
}

impl SourceMap {
    fn parse(json: &[u8], map_path: &Path) -> Result<Self, LocationError> {
        let raw: RawSourceMap =
            serde_json::from_slice(json).map_err(|source| LocationError::MalformedMap {
                path: map_path.to_path_buf(),
                source,
            })?;

        let base = map_path.parent().unwrap_or_else(|| Path::new(""));
        let root = raw.source_root.as_deref().unwrap_or("");
        let sources = raw
            .sources
            .iter()
            .map(|source| {
                let source = source.as_deref().unwrap_or("");
                let source = source.strip_prefix("file://").unwrap_or(source);
                lexical_normalize(&base.join(root).join(source))
                    .display()
                    .to_string()
            })
            .collect();

        Ok(Self {
            sources,
            lines: decode_mappings(&raw.mappings)?,
        })
    }

    fn find(&self, location: &Location) -> Result<Location, LocationError> {
        let unmapped = || LocationError::Unmapped {
            path: location.path.clone(),
            line: location.line,
            column: location.column,
        };
        let line = location.line.checked_sub(1).ok_or_else(unmapped)?;
        let column = location.column.saturating_sub(1);

        let segments = self.lines.get(line as usize).ok_or_else(unmapped)?;
        let idx = segments.partition_point(|s| s.generated_column <= column);
        let segment = idx.checked_sub(1).map(|i| segments[i]).ok_or_else(unmapped)?;
        let (source, original_line, original_column) = segment.original.ok_or_else(unmapped)?;
        let path = self.sources.get(source).ok_or_else(unmapped)?;

        Ok(Location {
            path: path.clone(),
            line: original_line + 1,
            column: original_column + 1,
        })
    }
}

/// Resolves through source maps, treating files without one as already original.
///
/// Each generated file is loaded at most once. A load failure is cached too
/// and reported as [`LocationError::Unavailable`].
#[derive(Debug, Default)]
pub struct SourceMapLookup {
    cache: HashMap<PathBuf, Result<Option<SourceMap>, Arc<LocationError>>>,
}

impl LocationLookup for SourceMapLookup {
    fn lookup(&mut self, location: &Location) -> Result<Location, LocationError> {
        let generated = PathBuf::from(
            location
                .path
                .strip_prefix("file://")
                .unwrap_or(&location.path),
        );
        let cached = self
            .cache
            .entry(generated.clone())
            .or_insert_with(|| load_map(&generated).map_err(Arc::new));
        match cached {
            Ok(Some(map)) => map.find(location),
            Ok(None) => Ok(location.clone()),
            Err(e) => Err(LocationError::Unavailable {
                path: generated,
                source: Arc::clone(e),
            }),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

fn load_map(generated: &Path) -> Result<Option<SourceMap>, LocationError> {
    let text = match fs::read_to_string(generated) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LocationError::Io {
                path: generated.to_path_buf(),
                source,
            })
        }
    };

    let Some(url) = MAPPING_URL
        .captures_iter(&text)
        .last()
        .map(|caps| caps[1].to_string())
    else {
        return Ok(None);
    };

    if let Some(data) = url.strip_prefix("data:") {
        let (header, payload) = data.split_once(',').unwrap_or(("", data));
        let json = if header.ends_with(";base64") {
            base64::engine::general_purpose::STANDARD.decode(payload)?
        } else {
            payload.as_bytes().to_vec()
        };
        return SourceMap::parse(&json, generated).map(Some);
    }

    let map_path = generated
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(url.strip_prefix("file://").unwrap_or(&url));
    let json = fs::read(&map_path).map_err(|source| LocationError::Io {
        path: map_path.clone(),
        source,
    })?;
    SourceMap::parse(&json, &map_path).map(Some)
}

/// Folds `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if matches!(out.last(), Some(Component::Normal(_))) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.iter().collect()
}

// ============================================================================
// VLQ MAPPINGS
// ============================================================================

fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>, LocationError> {
    let mut lines = Vec::new();
    let (mut source, mut original_line, mut original_column) = (0i64, 0i64, 0i64);

    for line in mappings.split(';') {
        let mut generated_column = 0i64;
        let mut segments = Vec::new();
        for text in line.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_vlq(text)?;
            let bad = || LocationError::Mappings(text.to_string());
            match fields.len() {
                1 | 4 | 5 => {}
                _ => return Err(bad()),
            }
            let add = |acc: i64, delta: i64| acc.checked_add(delta).ok_or_else(bad);
            generated_column = add(generated_column, fields[0])?;
            let original = if fields.len() >= 4 {
                source = add(source, fields[1])?;
                original_line = add(original_line, fields[2])?;
                original_column = add(original_column, fields[3])?;
                Some((
                    usize::try_from(source).map_err(|_| bad())?,
                    u32::try_from(original_line).map_err(|_| bad())?,
                    u32::try_from(original_column).map_err(|_| bad())?,
                ))
            } else {
                None
            };
            segments.push(Segment {
                generated_column: u32::try_from(generated_column).map_err(|_| bad())?,
                original,
            });
        }
        segments.sort_by_key(|s| s.generated_column);
        lines.push(segments);
    }

    Ok(lines)
}

fn decode_vlq(segment: &str) -> Result<Vec<i64>, LocationError> {
    let bad = || LocationError::Mappings(segment.to_string());
    let mut values = Vec::new();
    let (mut value, mut shift) = (0i64, 0u32);

    for byte in segment.bytes() {
        let digit: u8 = match byte {
            b'A'..=b'Z' => byte - b'A',
            b'a'..=b'z' => byte - b'a' + 26,
            b'0'..=b'9' => byte - b'0' + 52,
            b'+' => 62,
            b'/' => 63,
            _ => return Err(bad()),
        };
        let digit = i64::from(digit);
        // Source map fields are 32-bit; seven digits carry 35 bits.
        if shift > 30 {
            return Err(bad());
        }
        value += (digit & 0x1f) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            continue;
        }
        values.push(if value & 1 == 1 { -(value >> 1) } else { value >> 1 });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(bad());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_vlq() {
        assert_eq!(decode_vlq("AAAA").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(decode_vlq("SAAQ").unwrap(), vec![9, 0, 0, 8]);
        assert_eq!(decode_vlq("D").unwrap(), vec![-1]);
        assert_eq!(decode_vlq("gB").unwrap(), vec![16]);
        assert!(decode_vlq("g").is_err());
        assert!(decode_vlq("A*").is_err());
        assert_eq!(decode_vlq("ggggggE").unwrap(), vec![1 << 31]);
        assert!(decode_vlq("gggggggA").is_err());
    }

    #[test]
    fn test_column_past_u32_is_rejected() {
        assert!(decode_mappings("ggggggE").is_ok());
        assert!(matches!(
            decode_mappings("ggggggE,ggggggE"),
            Err(LocationError::Mappings(_))
        ));
    }

    #[test]
    fn test_decode_mappings_accumulates_fields() {
        let lines = decode_mappings("AAAA,EAAE;;AACA").unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0][1].generated_column, 2);
        assert_eq!(lines[0][1].original, Some((0, 0, 2)));
        assert!(lines[1].is_empty());
        assert_eq!(lines[2][0].original, Some((0, 1, 2)));
    }

    #[test]
    fn test_find_uses_closest_preceding_segment() {
        let map = SourceMap {
            sources: vec!["src/a.ts".into()],
            lines: decode_mappings("AAAA,UAAU").unwrap(),
        };
        let at = |column| Location {
            path: "dist/a.js".into(),
            line: 1,
            column,
        };
        assert_eq!(map.find(&at(1)).unwrap().column, 1);
        assert_eq!(map.find(&at(15)).unwrap().column, 11);
        assert!(map.find(&Location { line: 9, ..at(1) }).is_err());
    }

    #[test]
    fn test_lexical_normalize() {
        assert_eq!(
            lexical_normalize(Path::new("/app/dist/./../src/a.ts")),
            PathBuf::from("/app/src/a.ts")
        );
        assert_eq!(lexical_normalize(Path::new("../a.ts")), PathBuf::from("../a.ts"));
    }

    #[test]
    fn test_failed_load_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let generated = dir.path().join("a.js");
        fs::write(&generated, "x();\n//# sourceMappingURL=a.js.map\n").unwrap();
        fs::write(dir.path().join("a.js.map"), "not json").unwrap();

        let mut lookup = SourceMapLookup::default();
        let location = Location {
            path: generated.display().to_string(),
            line: 1,
            column: 1,
        };
        match lookup.lookup(&location) {
            Err(LocationError::Unavailable { source, .. }) => {
                assert!(matches!(*source, LocationError::MalformedMap { .. }));
            }
            other => panic!("expected a cached load failure, got {:?}", other),
        }

        // A repaired map is not picked up: the failure was cached.
        fs::write(
            dir.path().join("a.js.map"),
            r#"{"version":3,"sources":["a.ts"],"mappings":"AAAA"}"#,
        )
        .unwrap();
        assert!(matches!(
            lookup.lookup(&location),
            Err(LocationError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_missing_generated_file_is_identity() {
        let mut lookup = SourceMapLookup::default();
        let location = Location {
            path: "/definitely/not/here.js".into(),
            line: 3,
            column: 4,
        };
        assert_eq!(lookup.lookup(&location).unwrap(), location);
    }
}
