//! Line-oriented TAP ingestion.
//!
//! `TapReader` turns TAP text into [`TapEvent`]s for the reporter. It is an
//! adapter, not a grammar: it understands test points, plans, comments, YAML
//! diagnostic blocks and bail outs, and passes everything else through as
//! `Extra`. Indented lines outside a diagnostic block are reported as `Child`.

use std::collections::VecDeque;
use std::io::{self, BufRead, Lines};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{AssertRecord, Diagnostic, Summary, TapEvent};

static ASSERT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(not )?ok\b(?:\s+(\d+))?(?:\s*-)?\s*(.*)$").unwrap());
static DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*#\s*(skip|todo)\b.*$").unwrap());
static PLAN_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1\.\.(\d+)").unwrap());
static VERSION_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^TAP version \d+").unwrap());
static YAML_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][\w-]*):(?:\s+(.*))?$").unwrap());

/// Indentation at which a line is treated as part of a nested child group.
const CHILD_INDENT: &str = "    ";

/// A test point waiting to see whether a diagnostic block follows it.
struct PendingAssert {
    record: AssertRecord,
    directive: bool,
}

/// Streams [`TapEvent`]s out of any buffered TAP source.
pub struct TapReader<R: BufRead> {
    lines: Lines<R>,
    queue: VecDeque<TapEvent>,
    pending: Option<PendingAssert>,
    yaml: Option<Vec<String>>,
    plan: Option<usize>,
    bailed_out: bool,
    pass: usize,
    fail: usize,
    count: usize,
    failures: Vec<AssertRecord>,
    done: bool,
}

impl<R: BufRead> TapReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            lines: source.lines(),
            queue: VecDeque::new(),
            pending: None,
            yaml: None,
            plan: None,
            bailed_out: false,
            pass: 0,
            fail: 0,
            count: 0,
            failures: Vec::new(),
            done: false,
        }
    }

    fn consume(&mut self, raw: String) {
        let line = raw.strip_suffix('\r').unwrap_or(&raw);

        if let Some(block) = self.yaml.as_mut() {
            if line.trim() == "..." {
                let block = self.yaml.take().unwrap_or_default();
                if let Some(pending) = self.pending.as_mut() {
                    pending.record.diag = Some(parse_diagnostic(&block));
                }
                self.flush_pending();
            } else {
                block.push(line.to_string());
            }
            return;
        }

        if self.pending.is_some() && line.starts_with(' ') && line.trim() == "---" {
            self.yaml = Some(Vec::new());
            return;
        }

        self.flush_pending();

        if line.trim().is_empty() {
            return;
        }

        if let Some(caps) = ASSERT_LINE.captures(line) {
            let ok = caps.get(1).is_none();
            let rest = caps.get(3).map_or("", |m| m.as_str());
            let directive = DIRECTIVE.is_match(rest);
            let name = DIRECTIVE.replace(rest, "").trim().to_string();
            self.pending = Some(PendingAssert {
                record: AssertRecord {
                    name,
                    ok: ok || directive,
                    diag: None,
                },
                directive,
            });
        } else if let Some(caps) = PLAN_LINE.captures(line) {
            self.plan = caps[1].parse().ok();
        } else if VERSION_LINE.is_match(line) {
            // Version lines carry nothing the reporter renders.
        } else if line.starts_with('#') {
            self.queue.push_back(TapEvent::Comment(line.to_string()));
        } else if line.starts_with("Bail out!") {
            self.bailed_out = true;
            self.queue.push_back(TapEvent::Extra(format!("{}\n", line)));
        } else if line.starts_with(CHILD_INDENT) {
            self.queue.push_back(TapEvent::Child(line.to_string()));
        } else {
            self.queue.push_back(TapEvent::Extra(format!("{}\n", line)));
        }
    }

    fn flush_pending(&mut self) {
        let Some(PendingAssert { record, directive }) = self.pending.take() else {
            return;
        };
        self.count += 1;
        if record.ok {
            self.pass += 1;
        } else {
            self.fail += 1;
            self.failures.push(record.clone());
        }
        if directive {
            tracing::trace!(name = %record.name, "directive test point counted as passing");
        }
        self.queue.push_back(TapEvent::Assert(record));
    }

    fn finish(&mut self) {
        // An unterminated diagnostic block still belongs to its test point.
        if let Some(block) = self.yaml.take() {
            if let Some(pending) = self.pending.as_mut() {
                pending.record.diag = Some(parse_diagnostic(&block));
            }
        }
        self.flush_pending();

        let ok = self.fail == 0 && !self.bailed_out && self.plan == Some(self.count);
        self.queue.push_back(TapEvent::Complete(Summary {
            pass: self.pass,
            fail: self.fail,
            count: self.count,
            ok,
            failures: std::mem::take(&mut self.failures),
        }));
        self.done = true;
    }
}

impl<R: BufRead> Iterator for TapReader<R> {
    type Item = io::Result<TapEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.lines.next() {
                Some(Ok(line)) => self.consume(line),
                Some(Err(e)) => return Some(Err(e)),
                None => self.finish(),
            }
        }
    }
}

// ============================================================================
// DIAGNOSTIC BLOCKS
// ============================================================================

/// Extracts the fields the reporter uses from a YAML diagnostic block.
///
/// `actual` and `expected` are kept exactly as the producer wrote them,
/// quotes included, so the normalizer can tell `'3'` from `3`. The other
/// fields are plain text and have their YAML quotes removed.
fn parse_diagnostic(lines: &[String]) -> Diagnostic {
    let base = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);

    let mut diag = Diagnostic::default();
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        i += 1;
        if line.trim().is_empty() || indent_of(line) != base {
            continue;
        }
        let Some(caps) = YAML_KEY.captures(&line[base..]) else {
            continue;
        };
        let key = caps[1].to_string();
        let head = caps.get(2).map_or("", |m| m.as_str()).trim_end();

        let mut body = Vec::new();
        while i < lines.len() && (lines[i].trim().is_empty() || indent_of(&lines[i]) > base) {
            body.push(lines[i].as_str());
            i += 1;
        }
        while body.last().is_some_and(|l| l.trim().is_empty()) {
            body.pop();
        }

        let value = scalar_value(head, &body);
        match key.as_str() {
            "operator" => diag.operator = unquote(&value),
            "at" => diag.at = unquote(&value),
            "actual" => diag.actual = value,
            "expected" => diag.expected = value,
            "stack" => diag.stack = Some(unquote(&value)),
            _ => {}
        }
    }
    diag
}

fn scalar_value(head: &str, body: &[&str]) -> String {
    let block_indent = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);
    let body_lines = body.iter().map(|l| l.get(block_indent..).unwrap_or(""));

    match head {
        "|" | "|-" | "|+" => body_lines.collect::<Vec<_>>().join("\n"),
        ">" | ">-" | ">+" => body_lines.collect::<Vec<_>>().join(" "),
        _ => {
            let mut value = head.to_string();
            for line in body_lines {
                value.push('\n');
                value.push_str(line);
            }
            value
        }
    }
}

fn unquote(value: &str) -> String {
    let quoted = (value.starts_with('\'') && value.ends_with('\''))
        || (value.starts_with('"') && value.ends_with('"'));
    if quoted && value.len() >= 2 {
        if let Ok(s) = serde_yaml::from_str::<String>(value) {
            return s;
        }
    }
    value.to_string()
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &str) -> Vec<TapEvent> {
        TapReader::new(input.as_bytes())
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_passing_run() {
        let evs = events("TAP version 13\n# adds\nok 1 should be equal\n1..1\n# tests 1\n# pass  1\n\n# ok\n");
        assert_eq!(evs[0], TapEvent::Comment("# adds".into()));
        assert_eq!(evs[1], TapEvent::Assert(AssertRecord::passed("should be equal")));
        match evs.last().unwrap() {
            TapEvent::Complete(summary) => {
                assert!(summary.ok);
                assert_eq!((summary.pass, summary.fail, summary.count), (1, 0, 1));
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostic_block_attached() {
        let input = "not ok 1 should be equal\n  ---\n    operator: equal\n    expected: 4\n    actual:   3\n    at: Test.<anonymous> (/tmp/a.js:10:5)\n    stack: |-\n      Error: should be equal\n          at Test.assert (/tmp/a.js:10:5)\n  ...\n1..1\n";
        let evs = events(input);
        let TapEvent::Assert(record) = &evs[0] else {
            panic!("expected Assert, got {:?}", evs[0]);
        };
        assert!(!record.ok);
        let diag = record.diag.as_ref().unwrap();
        assert_eq!(diag.operator, "equal");
        assert_eq!(diag.actual, "3");
        assert_eq!(diag.expected, "4");
        assert_eq!(diag.at, "Test.<anonymous> (/tmp/a.js:10:5)");
        assert_eq!(
            diag.stack.as_deref(),
            Some("Error: should be equal\n    at Test.assert (/tmp/a.js:10:5)")
        );

        let TapEvent::Complete(summary) = evs.last().unwrap() else {
            panic!("expected Complete");
        };
        assert!(!summary.ok);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].name, "should be equal");
    }

    #[test]
    fn test_compared_values_keep_their_quotes() {
        let input = "not ok 1 deep\n  ---\n    operator: 'deepEqual'\n    actual: { a: 1, b: 'x' }\n    expected: 'hello'\n    at: \"f (/a.js:1:2)\"\n  ...\n";
        let evs = events(input);
        let TapEvent::Assert(record) = &evs[0] else {
            panic!("expected Assert");
        };
        let diag = record.diag.as_ref().unwrap();
        assert_eq!(diag.actual, "{ a: 1, b: 'x' }");
        assert_eq!(diag.expected, "'hello'");
        assert_eq!(diag.operator, "deepEqual");
        assert_eq!(diag.at, "f (/a.js:1:2)");
    }

    #[test]
    fn test_directives_count_as_passing() {
        let evs = events("not ok 1 later # TODO not yet\nok 2 skipped # SKIP\n1..2\n");
        let TapEvent::Complete(summary) = evs.last().unwrap() else {
            panic!("expected Complete");
        };
        assert_eq!(summary.pass, 2);
        assert!(summary.ok);
        assert_eq!(evs[0], TapEvent::Assert(AssertRecord::passed("later")));
    }

    #[test]
    fn test_extra_child_and_bail_out() {
        let evs = events("console noise\n    ok 1 nested\nBail out! db down\n");
        assert_eq!(evs[0], TapEvent::Extra("console noise\n".into()));
        assert_eq!(evs[1], TapEvent::Child("    ok 1 nested".into()));
        assert_eq!(evs[2], TapEvent::Extra("Bail out! db down\n".into()));
        let TapEvent::Complete(summary) = &evs[3] else {
            panic!("expected Complete");
        };
        assert!(!summary.ok);
    }

    #[test]
    fn test_missing_plan_is_not_ok() {
        let evs = events("ok 1 a\n");
        let TapEvent::Complete(summary) = evs.last().unwrap() else {
            panic!("expected Complete");
        };
        assert!(!summary.ok);
        assert_eq!(summary.fail, 0);
    }
}
