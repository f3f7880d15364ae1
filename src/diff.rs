//! Highlighted diffs between normalized diagnostic values.
//!
//! Dispatch is on the shape of `expected`:
//!
//! | expected / actual | rendering |
//! |---|---|
//! | either falsy | nothing |
//! | different type | `Expected <type> but got <type>` |
//! | object / object | field-level structural diff |
//! | string / string | character diff, or line diff when multi-line |
//! | array / array | element diff |
//! | anything else | inverse `actual` then inverse `expected` |
//!
//! "Added" always means present in `actual` only, "removed" present in
//! `expected` only.

use difference::{Changeset, Difference};

use crate::cli::output::{Palette, Style};
use crate::normalize::{format_key, NormalizedValue};

/// Indent unit inside structural diffs.
const DIFF_INDENT: &str = "    ";

pub struct DiffRenderer {
    palette: Palette,
}

impl DiffRenderer {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    /// Renders the difference between `actual` and `expected`, or `None` when
    /// there is nothing worth showing.
    pub fn render(&self, actual: &NormalizedValue, expected: &NormalizedValue) -> Option<String> {
        if actual.is_falsy() || expected.is_falsy() {
            return None;
        }
        if expected.type_name() != actual.type_name() {
            return Some(self.type_mismatch(actual, expected));
        }

        let block = match (expected, actual) {
            (NormalizedValue::Object(exp), NormalizedValue::Object(act)) => {
                self.object_diff(exp, act)
            }
            (NormalizedValue::Array(exp), NormalizedValue::Array(act)) => {
                self.array_diff(exp, act)
            }
            _ => match (expected.as_text(), actual.as_text()) {
                (Some(exp), Some(act)) if exp.contains('\n') || act.contains('\n') => {
                    self.line_diff(exp, act)
                }
                (Some(exp), Some(act)) => self.char_diff(exp, act),
                _ => self.fallback(actual, expected),
            },
        };
        Some(block)
    }

    fn type_mismatch(&self, actual: &NormalizedValue, expected: &NormalizedValue) -> String {
        format!(
            "{}{}{}{}",
            self.palette.paint(Style::Muted, "Expected "),
            self.palette.paint(Style::Emphasis, expected.type_name()),
            self.palette.paint(Style::Muted, " but got "),
            self.palette.paint(Style::Emphasis, actual.type_name()),
        )
    }

    fn fallback(&self, actual: &NormalizedValue, expected: &NormalizedValue) -> String {
        format!(
            "{} {}",
            self.palette.paint(Style::Inverse, &actual.to_string()),
            self.palette.paint(Style::Inverse, &expected.to_string()),
        )
    }

    fn char_diff(&self, expected: &str, actual: &str) -> String {
        let changeset = Changeset::new(expected, actual, "");
        changeset
            .diffs
            .iter()
            .map(|diff| match diff {
                Difference::Same(x) => x.clone(),
                Difference::Add(x) => self.palette.paint(Style::Added, x),
                Difference::Rem(x) => self.palette.paint(Style::Removed, x),
            })
            .collect()
    }

    fn line_diff(&self, expected: &str, actual: &str) -> String {
        let changeset = Changeset::new(expected, actual, "\n");
        let mut lines = Vec::new();
        for diff in &changeset.diffs {
            let (marker, style, text) = match diff {
                Difference::Same(x) => (" ", None, x),
                Difference::Add(x) => ("+", Some(Style::Added), x),
                Difference::Rem(x) => ("-", Some(Style::Removed), x),
            };
            for line in text.split('\n') {
                lines.push(match style {
                    None => format!("{} {}", marker, line),
                    Some(style) => format!(
                        "{} {}",
                        self.palette.paint(style, marker),
                        self.palette.paint(style, line)
                    ),
                });
            }
        }
        lines.join("\n")
    }

    fn array_diff(&self, expected: &[NormalizedValue], actual: &[NormalizedValue]) -> String {
        let spans = self.array_spans(expected, actual);
        if spans.is_empty() {
            "[]".to_string()
        } else {
            format!("[ {} ]", spans.join(", "))
        }
    }

    /// Unchanged, added and removed runs of elements, in order, each styled on its own.
    fn array_spans(&self, expected: &[NormalizedValue], actual: &[NormalizedValue]) -> Vec<String> {
        let exp: Vec<String> = expected.iter().map(|v| v.to_string()).collect();
        let act: Vec<String> = actual.iter().map(|v| v.to_string()).collect();

        if exp.is_empty() || act.is_empty() {
            let mut spans = Vec::new();
            if !exp.is_empty() {
                spans.push(self.palette.paint(Style::Removed, &exp.join(", ")));
            }
            if !act.is_empty() {
                spans.push(self.palette.paint(Style::Added, &act.join(", ")));
            }
            return spans;
        }

        let changeset = Changeset::new(&exp.join("\n"), &act.join("\n"), "\n");
        changeset
            .diffs
            .iter()
            .map(|diff| match diff {
                Difference::Same(x) => x.replace('\n', ", "),
                Difference::Add(x) => self.palette.paint(Style::Added, &x.replace('\n', ", ")),
                Difference::Rem(x) => self.palette.paint(Style::Removed, &x.replace('\n', ", ")),
            })
            .collect()
    }

    fn object_diff(
        &self,
        expected: &[(String, NormalizedValue)],
        actual: &[(String, NormalizedValue)],
    ) -> String {
        let mut lines = vec!["{".to_string()];
        lines.extend(self.field_lines(expected, actual, 1));
        lines.push("}".to_string());
        lines.join("\n")
    }

    /// Lines for every field of both objects at `depth`: expected's keys in
    /// order, then keys only `actual` has.
    fn field_lines(
        &self,
        expected: &[(String, NormalizedValue)],
        actual: &[(String, NormalizedValue)],
        depth: usize,
    ) -> Vec<String> {
        let pad = DIFF_INDENT.repeat(depth);

        let mut entries: Vec<Vec<String>> = Vec::new();
        for (key, exp) in expected {
            let label = format_key(key);
            let found = actual.iter().find(|(k, _)| k == key).map(|(_, v)| v);
            let entry = match (exp, found) {
                (_, None) => vec![format!(
                    "{}{}",
                    pad,
                    self.palette.paint(Style::Removed, &format!("{}: {}", label, exp))
                )],
                (_, Some(act)) if act == exp => vec![format!("{}{}: {}", pad, label, exp)],
                (NormalizedValue::Object(exp_fields), Some(NormalizedValue::Object(act_fields))) => {
                    let mut nested = vec![format!("{}{}: {{", pad, label)];
                    nested.extend(self.field_lines(exp_fields, act_fields, depth + 1));
                    nested.push(format!("{}}}", pad));
                    nested
                }
                (NormalizedValue::Array(exp_items), Some(NormalizedValue::Array(act_items))) => {
                    vec![format!("{}{}: {}", pad, label, self.array_diff(exp_items, act_items))]
                }
                (_, Some(act)) => vec![format!(
                    "{}{}: {} {}",
                    pad,
                    label,
                    self.palette.paint(Style::Removed, &exp.to_string()),
                    self.palette.paint(Style::Added, &act.to_string())
                )],
            };
            entries.push(entry);
        }
        for (key, act) in actual {
            if expected.iter().any(|(k, _)| k == key) {
                continue;
            }
            let label = format_key(key);
            entries.push(vec![format!(
                "{}{}",
                pad,
                self.palette.paint(Style::Added, &format!("{}: {}", label, act))
            )]);
        }

        let last = entries.len().saturating_sub(1);
        let mut lines = Vec::new();
        for (i, mut entry) in entries.into_iter().enumerate() {
            if i < last {
                if let Some(tail) = entry.last_mut() {
                    tail.push(',');
                }
            }
            lines.extend(entry);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn plain() -> DiffRenderer {
        DiffRenderer::new(Palette::plain())
    }

    fn render(renderer: &DiffRenderer, actual: &str, expected: &str) -> Option<String> {
        renderer.render(&normalize(actual), &normalize(expected))
    }

    #[test]
    fn test_falsy_side_renders_nothing() {
        assert_eq!(render(&plain(), "undefined", "{ a: 1 }"), None);
        assert_eq!(render(&plain(), "abc", ""), None);
        assert_eq!(render(&plain(), "0", "1"), None);
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            render(&plain(), "3", "{ a: 1 }").as_deref(),
            Some("Expected object but got number")
        );
        assert_eq!(
            render(&plain(), "{ a: [ 1 ] }", "'x'").as_deref(),
            Some("Expected string but got object")
        );
    }

    #[test]
    fn test_single_line_strings_get_added_and_removed_spans() {
        let block = render(&DiffRenderer::new(Palette::ansi()), "abc", "abd").unwrap();
        assert!(block.contains("\x1b[42m"), "no added span in {:?}", block);
        assert!(block.contains("\x1b[41m"), "no removed span in {:?}", block);
        assert_eq!(render(&plain(), "abc", "abd").as_deref(), Some("abdc"));
    }

    #[test]
    fn test_multi_line_strings_diff_by_line() {
        let block = plain()
            .render(
                &NormalizedValue::String("one\ntwo\nthree".into()),
                &NormalizedValue::String("one\n2\nthree".into()),
            )
            .unwrap();
        assert_eq!(block, "  one\n- 2\n+ two\n  three");
    }

    #[test]
    fn test_object_field_diff() {
        let block = render(&plain(), "{ a: 1, b: 'y', c: 3 }", "{ a: 1, b: 'x', d: 4 }").unwrap();
        assert_eq!(
            block,
            "{\n    a: 1,\n    b: 'x' 'y',\n    d: 4,\n    c: 3\n}"
        );
    }

    #[test]
    fn test_nested_objects_recurse() {
        let block = render(&plain(), "{ p: { x: 1, y: 2 } }", "{ p: { x: 1, y: 3 } }").unwrap();
        assert_eq!(block, "{\n    p: {\n        x: 1,\n        y: 3 2\n    }\n}");
    }

    #[test]
    fn test_nested_object_styles_skip_indentation() {
        let block = render(&DiffRenderer::new(Palette::ansi()), "{ a: 1, z: 2 }", "{ a: 1 }").unwrap();
        assert!(block.contains("\n    \x1b[0m"), "indent was styled in {:?}", block);
    }

    #[test]
    fn test_array_spans_in_order() {
        let block = plain()
            .render(
                &normalize("{ v: [ 1, 2, 4 ] }"),
                &normalize("{ v: [ 1, 3, 4 ] }"),
            )
            .unwrap();
        assert_eq!(block, "{\n    v: [ 1, 3, 2, 4 ]\n}");

        let top = plain().render(
            &NormalizedValue::Array(vec![NormalizedValue::Number(1.0)]),
            &NormalizedValue::Array(vec![]),
        );
        assert_eq!(top.as_deref(), Some("[ 1 ]"));
    }

    #[test]
    fn test_primitive_fallback_shows_actual_then_expected() {
        assert_eq!(render(&plain(), "3", "4").as_deref(), Some("3 4"));
        let block = render(&DiffRenderer::new(Palette::ansi()), "2", "5").unwrap();
        assert_eq!(block.matches("\x1b[47m").count(), 2);
    }
}
