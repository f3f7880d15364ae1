//! Diagnostic value recovery.
//!
//! TAP producers stringify `actual` and `expected` with a JavaScript-ish
//! literal syntax, so the structure has to be recovered heuristically.
//! [`normalize`] tries, in order:
//!
//! 1. atoms: text without `{` is classified as a scalar and never parsed further;
//! 2. a forgiving rewrite (quote bare keys, single to double quotes) fed to `serde_json`;
//! 3. the tolerant literal grammar in [`literal`];
//!
//! and finally returns [`NormalizedValue::Unparseable`] with the original text.

pub mod literal;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static BARE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([$\w]+)\s*:").unwrap());
static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']+)'").unwrap());
static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:Infinity|NaN|\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)$").unwrap()
});

/// A diagnostic value after recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    String(String),
    Number(f64),
    Boolean(bool),
    /// Fields in source order.
    Object(Vec<(String, NormalizedValue)>),
    Array(Vec<NormalizedValue>),
    Undefined,
    /// Text that looked structured but could not be recovered.
    Unparseable(String),
}

impl NormalizedValue {
    /// Lowercase type name used in "Expected X but got Y" messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            NormalizedValue::String(_) | NormalizedValue::Unparseable(_) => "string",
            NormalizedValue::Number(_) => "number",
            NormalizedValue::Boolean(_) => "boolean",
            NormalizedValue::Object(_) => "object",
            NormalizedValue::Array(_) => "array",
            NormalizedValue::Undefined => "undefined",
        }
    }

    /// True for the values a JavaScript producer would treat as absent.
    pub fn is_falsy(&self) -> bool {
        match self {
            NormalizedValue::Undefined => true,
            NormalizedValue::Boolean(b) => !b,
            NormalizedValue::Number(n) => *n == 0.0 || n.is_nan(),
            NormalizedValue::String(s) | NormalizedValue::Unparseable(s) => s.is_empty(),
            NormalizedValue::Object(_) | NormalizedValue::Array(_) => false,
        }
    }

    /// Text view of string-like values. Unparseable values render as their raw text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            NormalizedValue::String(s) | NormalizedValue::Unparseable(s) => Some(s),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&NormalizedValue> {
        match self {
            NormalizedValue::Object(fields) => {
                fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Value> for NormalizedValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => NormalizedValue::Undefined,
            Value::Bool(b) => NormalizedValue::Boolean(b),
            Value::Number(n) => NormalizedValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => NormalizedValue::String(s),
            Value::Array(items) => {
                NormalizedValue::Array(items.into_iter().map(NormalizedValue::from).collect())
            }
            Value::Object(map) => NormalizedValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, NormalizedValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Single-line rendering in the same literal style producers use.
impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::String(s) => {
                write!(f, "'{}'", s.replace('\'', "\\'").replace('\n', "\\n"))
            }
            NormalizedValue::Unparseable(s) => write!(f, "{}", s.replace('\n', "\\n")),
            NormalizedValue::Number(n) => write!(f, "{}", format_number(*n)),
            NormalizedValue::Boolean(b) => write!(f, "{}", b),
            NormalizedValue::Undefined => write!(f, "undefined"),
            NormalizedValue::Array(items) if items.is_empty() => write!(f, "[]"),
            NormalizedValue::Array(items) => {
                write!(f, "[ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, " ]")
            }
            NormalizedValue::Object(fields) if fields.is_empty() => write!(f, "{{}}"),
            NormalizedValue::Object(fields) => {
                write!(f, "{{ ")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", format_key(key), value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn format_key(key: &str) -> String {
    let bare = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if bare {
        key.to_string()
    } else {
        format!("'{}'", key.replace('\'', "\\'"))
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Recovers a structured value from a stringified diagnostic field. Never fails.
pub fn normalize(raw: &str) -> NormalizedValue {
    if !raw.contains('{') {
        return atom(raw);
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&jsonize(raw)) {
        return value.into();
    }

    if let Some(value) = literal::parse_literal(raw) {
        return value;
    }

    tracing::debug!(raw, "diagnostic value could not be recovered");
    NormalizedValue::Unparseable(raw.to_string())
}

/// Rewrites producer literal syntax toward JSON: quotes bare or `$`-prefixed
/// keys and turns single-quoted literals into double-quoted ones.
fn jsonize(raw: &str) -> String {
    let keyed = BARE_KEY.replace_all(raw, "\"$1\": ");
    SINGLE_QUOTED.replace_all(&keyed, "\"$1\"").into_owned()
}

/// Classifies text that carries no object structure.
fn atom(raw: &str) -> NormalizedValue {
    let text = raw.trim();
    match text {
        "undefined" | "null" => return NormalizedValue::Undefined,
        "true" => return NormalizedValue::Boolean(true),
        "false" => return NormalizedValue::Boolean(false),
        _ => {}
    }
    if NUMERIC.is_match(text) {
        if let Some(NormalizedValue::Number(n)) = literal::parse_literal(text) {
            return NormalizedValue::Number(n);
        }
    }
    let quoted = text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')));
    if quoted {
        if let Some(NormalizedValue::String(s)) = literal::parse_literal(text) {
            return NormalizedValue::String(s);
        }
        // YAML quoting, e.g. `'it''s'` or a quoted scalar folded over lines.
        if let Ok(s) = serde_yaml::from_str::<String>(text) {
            return NormalizedValue::String(s);
        }
    }
    NormalizedValue::String(raw.to_string())
}
