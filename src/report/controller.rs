//! Reporter state machine.
//!
//! A [`Reporter`] lives for one run. It renders every event as it arrives,
//! and on `Complete` prints the totals and replays the failures, newest
//! first. Formatting faults in one failure are logged and never stop the
//! report.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cli::output::{Palette, Style, FIG_CROSS, FIG_TICK, FIG_WARNING};
use crate::diff::DiffRenderer;
use crate::errors::RenderError;
use crate::location::SourceLocationResolver;
use crate::normalize::normalize;
use crate::report::writer::ReportWriter;
use crate::tap::{AssertRecord, Diagnostic, Summary, TapEvent};

/// Comments that only echo the totals the summary prints anyway.
static SUMMARY_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:tests|pass|fail)\s+[0-9]+|ok)$").unwrap());

/// Stack frames that never point at user code.
const INTERNAL_FRAMES: &[&str] = &["node:internal", "internal/", "node_modules", "(native)"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReporterConfig {
    pub palette: Palette,
}

pub struct Reporter<W: Write> {
    writer: ReportWriter<W>,
    resolver: SourceLocationResolver,
    diff: DiffRenderer,
    palette: Palette,
    started_at: Instant,
    failed: bool,
    state: RunState,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, resolver: SourceLocationResolver, config: ReporterConfig) -> Self {
        Self {
            writer: ReportWriter::new(out),
            resolver,
            diff: DiffRenderer::new(config.palette),
            palette: config.palette,
            started_at: Instant::now(),
            failed: false,
            state: RunState::Running,
        }
    }

    /// True once a completed run reported failures. Never reset.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Handles every event in order.
    pub fn run<I: IntoIterator<Item = TapEvent>>(&mut self, events: I) {
        for event in events {
            self.handle(event);
        }
    }

    /// Renders one event. Errors are logged, never returned.
    pub fn handle(&mut self, event: TapEvent) {
        if self.state == RunState::Completed {
            tracing::debug!(?event, "event after completion ignored");
            return;
        }

        let result = match event {
            TapEvent::Comment(text) => self.handle_comment(&text),
            TapEvent::Assert(record) if record.ok => self.handle_assert_success(&record),
            TapEvent::Assert(record) => {
                self.handle_assert_failure(&record);
                Ok(())
            }
            TapEvent::Extra(text) => self.handle_extra(&text),
            TapEvent::Child(_) => {
                tracing::trace!("child group acknowledged");
                Ok(())
            }
            TapEvent::Complete(summary) => self.handle_complete(&summary),
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "failed to render event");
        }
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    fn handle_comment(&mut self, text: &str) -> Result<(), RenderError> {
        let trimmed = text.replacen("# ", "", 1);
        let trimmed = trimmed.trim();
        if SUMMARY_ECHO.is_match(trimmed) {
            return Ok(());
        }
        self.writer.blank()?;
        self.writer.write(&self.palette.paint(Style::Header, trimmed), 1)?;
        Ok(())
    }

    fn handle_assert_success(&mut self, record: &AssertRecord) -> Result<(), RenderError> {
        let line = format!(
            "{}  {}",
            self.palette.paint(Style::Success, FIG_TICK),
            self.palette.paint(Style::Dim, &record.name)
        );
        self.writer.write(&line, 2)?;
        Ok(())
    }

    /// Renders one failure, isolating any fault to this assertion.
    fn handle_assert_failure(&mut self, record: &AssertRecord) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.render_failure(record)));
        let result = outcome.unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RenderError::Panicked {
                name: record.name.clone(),
                message,
            })
        });
        if let Err(e) = result {
            tracing::error!(test = %record.name, error = %e, "failed to render assertion");
        }
    }

    fn handle_extra(&mut self, text: &str) -> Result<(), RenderError> {
        let text = text.strip_suffix('\n').unwrap_or(text);
        self.writer.write(&self.palette.paint(Style::Extra, text), 4)?;
        Ok(())
    }

    fn handle_complete(&mut self, summary: &Summary) -> Result<(), RenderError> {
        self.state = RunState::Completed;
        if !summary.ok {
            self.failed = true;
        }
        let elapsed = self.started_at.elapsed();

        self.writer.blank()?;
        let banner = format!(
            "{}{}{}{}",
            self.palette.paint(Style::Success, &format!("passed: {}  ", summary.pass)),
            self.palette.paint(Style::Failure, &format!("failed: {}  ", summary.fail)),
            self.palette.paint(Style::Emphasis, &format!("of {} tests  ", summary.count)),
            self.palette.paint(Style::Dim, &format!("({})", format_elapsed(elapsed))),
        );
        self.writer.write(&banner, 0)?;
        self.writer.blank()?;

        if summary.ok {
            let line = format!("All of {} tests passed!", summary.count);
            self.writer.write(&self.palette.paint(Style::Success, &line), 0)?;
            self.writer.blank()?;
            return Ok(());
        }

        let line = format!("{} of {} tests failed.", summary.fail, summary.count);
        self.writer.write(&self.palette.paint(Style::Failure, &line), 0)?;
        self.writer.blank()?;
        self.writer.write(&self.palette.paint(Style::Failure, "FAILURES:"), 0)?;

        for failure in summary.failures.iter().rev() {
            self.writer.blank()?;
            self.handle_assert_failure(failure);
        }

        self.writer.blank()?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Failure rendering
    // ------------------------------------------------------------------------

    fn render_failure(&mut self, record: &AssertRecord) -> Result<(), RenderError> {
        let diag = record.diag.clone().unwrap_or_default();
        if diag.is_exception() {
            self.render_exception(&record.name, &diag)
        } else {
            self.render_assertion(&record.name, &diag)
        }
    }

    fn render_assertion(&mut self, name: &str, diag: &Diagnostic) -> Result<(), RenderError> {
        let at = self.resolver.resolve(&diag.at);
        let mut header = format!(
            "{}  {}",
            self.palette.paint(Style::Failure, FIG_CROSS),
            self.palette.paint(Style::Failure, name)
        );
        if !at.is_empty() {
            header.push_str(&format!(" at {}", self.palette.paint(Style::Location, &at)));
        }
        self.writer.write(&header, 2)?;

        let actual = normalize(&diag.actual);
        let expected = normalize(&diag.expected);
        if let Some(block) = self.diff.render(&actual, &expected) {
            self.writer.write(&block, 3)?;
        }
        self.writer.blank()?;
        Ok(())
    }

    fn render_exception(&mut self, name: &str, diag: &Diagnostic) -> Result<(), RenderError> {
        let stack = diag.stack.as_deref().unwrap_or("");
        let frame = first_meaningful_frame(stack).unwrap_or_else(|| "<anonymous>".to_string());
        let at = self.resolver.resolve(&diag.at);

        let mut header = format!(
            "{}  {} threw in {}",
            self.palette.paint(Style::Failure, FIG_WARNING),
            self.palette.paint(Style::Failure, name),
            self.palette.paint(Style::Emphasis, &frame)
        );
        if !at.is_empty() {
            header.push_str(&format!(" at {}", self.palette.paint(Style::Location, &at)));
        }
        self.writer.write(&header, 2)?;

        if !stack.is_empty() {
            let resolved: Vec<String> = stack
                .lines()
                .map(|line| match self.resolver.resolve(line) {
                    r if r.is_empty() => line.to_string(),
                    r => r,
                })
                .collect();
            self.writer
                .write(&self.palette.paint(Style::Dim, &resolved.join("\n")), 3)?;
        }
        let error = normalize(&diag.actual);
        let error = error.as_text().map_or_else(|| error.to_string(), str::to_string);
        if !error.is_empty() {
            self.writer.write(&self.palette.paint(Style::Extra, &error), 3)?;
        }
        self.writer.blank()?;
        Ok(())
    }
}

/// Function name of the first stack frame that points at user code.
fn first_meaningful_frame(stack: &str) -> Option<String> {
    stack
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("at "))
        .find(|frame| !INTERNAL_FRAMES.iter().any(|internal| frame.contains(internal)))
        .map(|frame| match frame.split_once(" (") {
            Some((function, _)) => function.to_string(),
            None => "<anonymous>".to_string(),
        })
}

/// Formats a duration the way people read it: `532ms`, `1.2s`, `2m 3s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> Reporter<Vec<u8>> {
        Reporter::new(
            Vec::new(),
            SourceLocationResolver::identity(),
            ReporterConfig::default(),
        )
    }

    fn output(reporter: Reporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    fn failure(name: &str, actual: &str, expected: &str) -> AssertRecord {
        AssertRecord::failed(
            name,
            Diagnostic {
                operator: "equal".into(),
                at: "(file.js:10:2)".into(),
                actual: actual.into(),
                expected: expected.into(),
                stack: None,
            },
        )
    }

    #[test]
    fn test_success_line_at_indent_two() {
        let mut r = reporter();
        r.handle(TapEvent::Assert(AssertRecord::passed("adds numbers")));
        assert_eq!(output(r), "    ✔  adds numbers\n");
    }

    #[test]
    fn test_summary_echo_comments_are_suppressed() {
        let mut r = reporter();
        for text in ["# tests 5", "tests 5", "# pass  4", "# fail 1", "# ok"] {
            r.handle(TapEvent::Comment(text.into()));
        }
        r.handle(TapEvent::Comment("# Addition suite".into()));
        assert_eq!(output(r), "\n  Addition suite\n");
    }

    #[test]
    fn test_extra_strips_one_trailing_newline() {
        let mut r = reporter();
        r.handle(TapEvent::Extra("console.log\n\n".into()));
        assert_eq!(output(r), "        console.log\n        \n");
    }

    #[test]
    fn test_child_is_a_no_op() {
        let mut r = reporter();
        r.handle(TapEvent::Child("    ok 1 nested".into()));
        assert_eq!(output(r), "");
    }

    #[test]
    fn test_assertion_failure_renders_location_and_diff() {
        let mut r = reporter();
        r.handle(TapEvent::Assert(failure("adds", "3", "4")));
        assert_eq!(output(r), "    ✖  adds at (file.js:10:2)\n      3 4\n\n");
    }

    #[test]
    fn test_exception_path() {
        let mut r = reporter();
        r.handle(TapEvent::Assert(AssertRecord::failed(
            "explodes",
            Diagnostic {
                operator: "error".into(),
                at: "Test.<anonymous> (/app/test.js:4:9)".into(),
                actual: "[TypeError: boom]".into(),
                expected: "undefined".into(),
                stack: Some(
                    "TypeError: boom\n    at node:internal/process:1:1\n    at explode (/app/lib.js:2:3)\n    at Test.<anonymous> (/app/test.js:4:9)"
                        .into(),
                ),
            },
        )));
        let out = output(r);
        assert!(out.starts_with(
            "    ⚠  explodes threw in explode at Test.<anonymous> (/app/test.js:4:9)\n"
        ));
        assert!(out.contains("      TypeError: boom\n"));
        assert!(out.contains("          at explode (/app/lib.js:2:3)\n"));
        assert!(out.contains("      [TypeError: boom]\n"));
    }

    #[test]
    fn test_exception_value_is_unquoted() {
        let mut r = reporter();
        r.handle(TapEvent::Assert(AssertRecord::failed(
            "throws a string",
            Diagnostic {
                operator: "error".into(),
                actual: "'boom'".into(),
                ..Diagnostic::default()
            },
        )));
        let out = output(r);
        assert!(out.contains("\n      boom\n"), "{}", out);
        assert!(!out.contains("'boom'"), "{}", out);
    }

    #[test]
    fn test_complete_replays_failures_newest_first() {
        let mut r = reporter();
        r.handle(TapEvent::Complete(Summary {
            pass: 0,
            fail: 3,
            count: 3,
            ok: false,
            failures: vec![
                failure("F1", "1", "2"),
                failure("F2", "1", "2"),
                failure("F3", "1", "2"),
            ],
        }));
        assert!(r.is_failed());
        assert_eq!(r.state(), RunState::Completed);
        let out = output(r);
        let pos = |name: &str| out.find(&format!("✖  {} at", name)).unwrap();
        assert!(pos("F3") < pos("F2") && pos("F2") < pos("F1"));
        assert!(out.find("FAILURES:").unwrap() < pos("F3"));
    }

    #[test]
    fn test_passing_run_prints_success_banner() {
        let mut r = reporter();
        r.handle(TapEvent::Complete(Summary {
            pass: 2,
            fail: 0,
            count: 2,
            ok: true,
            failures: vec![],
        }));
        assert!(!r.is_failed());
        let out = output(r);
        assert!(out.contains("passed: 2  failed: 0  of 2 tests  ("));
        assert!(out.contains("All of 2 tests passed!"));
        assert!(!out.contains("FAILURES:"));
    }

    #[test]
    fn test_events_after_completion_are_ignored() {
        let mut r = reporter();
        r.handle(TapEvent::Complete(Summary {
            ok: true,
            ..Summary::default()
        }));
        let before = r.writer.get_ref().len();
        r.handle(TapEvent::Assert(AssertRecord::passed("late")));
        assert_eq!(r.writer.get_ref().len(), before);
    }

    #[test]
    fn test_first_meaningful_frame() {
        let stack = "Error: x\n    at Object.<anonymous> (/app/node_modules/tape/index.js:1:1)\n    at /app/test.js:3:3";
        assert_eq!(first_meaningful_frame(stack).as_deref(), Some("<anonymous>"));
        assert_eq!(first_meaningful_frame("no frames"), None);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(532)), "532ms");
        assert_eq!(format_elapsed(Duration::from_millis(1300)), "1.3s");
        assert_eq!(format_elapsed(Duration::from_secs(123)), "2m 3s");
    }
}
