//! Tolerant literal parser.
//!
//! Reads object and array literals the way test libraries print them:
//! unquoted keys, single or double quotes, trailing commas. Nothing is ever
//! evaluated; the text is only parsed against `literal.pest`.

use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use super::NormalizedValue;

#[derive(Parser)]
#[grammar = "normalize/literal.pest"]
struct LiteralParser;

/// Parses `text` as a single literal, or returns `None` if the grammar rejects it.
pub fn parse_literal(text: &str) -> Option<NormalizedValue> {
    let mut pairs = LiteralParser::parse(Rule::literal, text).ok()?;
    let literal = pairs.next()?;
    let value = literal.into_inner().find(|p| p.as_rule() != Rule::EOI)?;
    Some(build_value(value))
}

fn build_value(pair: Pair<Rule>) -> NormalizedValue {
    match pair.as_rule() {
        Rule::object => {
            let mut fields: Vec<(String, NormalizedValue)> = Vec::new();
            for field in pair.into_inner().filter(|p| p.as_rule() == Rule::pair) {
                let mut inner = field.into_inner();
                let (Some(key), Some(value)) = (inner.next(), inner.next()) else {
                    continue;
                };
                let key = key_text(key);
                let value = build_value(value);
                // Later duplicates win, keeping the first position.
                match fields.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => fields.push((key, value)),
                }
            }
            NormalizedValue::Object(fields)
        }
        Rule::array => NormalizedValue::Array(pair.into_inner().map(build_value).collect()),
        Rule::string => NormalizedValue::String(string_text(pair)),
        Rule::number => NormalizedValue::Number(parse_number(pair.as_str())),
        Rule::boolean => NormalizedValue::Boolean(pair.as_str() == "true"),
        Rule::null | Rule::undefined => NormalizedValue::Undefined,
        _ => NormalizedValue::String(pair.as_str().to_string()),
    }
}

fn key_text(pair: Pair<Rule>) -> String {
    match pair.as_rule() {
        Rule::string => string_text(pair),
        _ => pair.as_str().to_string(),
    }
}

fn string_text(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|inner| unescape(inner.as_str()))
        .unwrap_or_default()
}

fn parse_number(text: &str) -> f64 {
    match text {
        "Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        "NaN" | "-NaN" => f64::NAN,
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

fn unescape(inner: &str) -> String {
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => result.push(c),
                    None => {
                        result.push_str("\\u");
                        result.push_str(&hex);
                    }
                }
            }
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}
