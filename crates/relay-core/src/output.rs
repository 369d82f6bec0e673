//! Append-only worker output and the line-oriented query over it.
//!
//! Every append records a watermark (timestamp, byte offset of the appended
//! text). Queries run in a fixed order:
//!
//! 1. `line_count` is taken from the full text and never changes afterwards.
//! 2. `since` cuts the text down to appends made strictly after the watermark.
//! 3. `filter` keeps the lines the pattern matches anywhere in.
//! 4. `limit` keeps the first N lines and reports whether anything was cut.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::CoreError;

#[derive(Debug, Clone, Copy)]
struct Watermark {
    at: DateTime<Utc>,
    offset: usize,
}

/// Accumulated output of one worker.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    text: String,
    marks: Vec<Watermark>,
}

/// Result of an output query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputView {
    /// Selected text, lines joined with `\n`.
    pub text: String,
    /// Line count of the full, untouched output.
    pub line_count: usize,
    /// True iff the limit dropped lines.
    pub truncated: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk as one or more lines. A trailing newline is dropped,
    /// lines are separated from earlier output by a single `\n`. An empty
    /// chunk is one blank line.
    pub fn append(&mut self, chunk: &str, at: DateTime<Utc>) {
        let chunk = chunk
            .strip_suffix("\r\n")
            .or_else(|| chunk.strip_suffix('\n'))
            .unwrap_or(chunk);
        if !self.marks.is_empty() {
            self.text.push('\n');
        }
        self.marks.push(Watermark {
            at,
            offset: self.text.len(),
        });
        self.text.push_str(chunk);
    }

    /// Full accumulated text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Number of lines appended so far, blank ones included.
    pub fn line_count(&self) -> usize {
        if self.marks.is_empty() {
            0
        } else {
            self.text.split('\n').count()
        }
    }

    /// Timestamp of the most recent append.
    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        self.marks.last().map(|m| m.at)
    }

    /// Text appended strictly after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> &str {
        self.window(Some(since)).unwrap_or("")
    }

    /// Text selected by `since`, or `None` when no append falls in it.
    fn window(&self, since: Option<DateTime<Utc>>) -> Option<&str> {
        let offset = match since {
            Some(at) => self.marks.iter().find(|m| m.at > at)?.offset,
            None => self.marks.first()?.offset,
        };
        Some(&self.text[offset..])
    }

    /// Run a query against the buffer.
    pub fn query(
        &self,
        since: Option<DateTime<Utc>>,
        filter: Option<&Regex>,
        limit: Option<usize>,
    ) -> OutputView {
        let line_count = self.line_count();

        let mut lines: Vec<&str> = match self.window(since) {
            Some(window) => window
                .split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line))
                .collect(),
            None => Vec::new(),
        };

        if let Some(re) = filter {
            lines.retain(|line| re.is_match(line));
        }

        let truncated = match limit {
            Some(n) if n > 0 && lines.len() > n => {
                lines.truncate(n);
                true
            }
            _ => false,
        };

        OutputView {
            text: lines.join("\n"),
            line_count,
            truncated,
        }
    }
}

/// Compile a user supplied filter. Patterns are unanchored.
pub fn compile_filter(pattern: &str) -> Result<Regex, CoreError> {
    Regex::new(pattern).map_err(|e| CoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an RFC 3339 watermark.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CoreError::InvalidTimestamp(value.to_string()))
}
