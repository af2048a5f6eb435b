//! Dual-direction SQL script parsing
//!
//! A migration script holds both directions in one file, delimited by
//! annotation lines. The base case splits statements on semicolons, as those
//! naturally terminate a statement. Procedural bodies (pl/pgsql, triggers)
//! contain embedded semicolons, so the explicit `StatementBegin` /
//! `StatementEnd` annotations let a script suspend semicolon detection and
//! hand the whole span over as a single statement.

use std::fmt;

use crate::error::ParseError;

/// Marker prefix for script annotations, e.g. `-- +mig Up`.
pub const ANNOTATION_MARKER: &str = "-- +mig ";

/// Which half of a migration script to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply forward.
    Up,
    /// Revert.
    Down,
}

impl Direction {
    /// Maps onto the history table's `is_applied` column.
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Scanner state for one forward pass over a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Outside any block for the requested direction; lines are skipped.
    Inactive,
    /// Inside a block for the requested direction; semicolons end statements.
    Active,
    /// Inside an explicit statement span; semicolons are plain text.
    InSpan,
}

/// Split a script into the ordered statements for one direction.
///
/// Annotation lines drive the scanner and never appear in the output; every
/// other line inside an active block is accumulated verbatim, trailing
/// semicolon included. A script with no `Up` or `Down` annotation anywhere
/// is malformed even if the requested direction would be empty.
pub fn split_statements(script: &str, direction: Direction) -> Result<Vec<String>, ParseError> {
    let mut statements = Vec::new();
    let mut buf = String::new();
    let mut state = ScanState::Inactive;
    let mut up_blocks = 0usize;
    let mut down_blocks = 0usize;

    for line in script.lines() {
        if let Some(annotation) = line.strip_prefix(ANNOTATION_MARKER) {
            match annotation.trim() {
                "Up" => {
                    up_blocks += 1;
                    state = if direction.is_up() {
                        ScanState::Active
                    } else {
                        ScanState::Inactive
                    };
                }
                "Down" => {
                    down_blocks += 1;
                    state = if direction.is_up() {
                        ScanState::Inactive
                    } else {
                        ScanState::Active
                    };
                }
                "StatementBegin" => {
                    if state == ScanState::Active {
                        state = ScanState::InSpan;
                    }
                }
                "StatementEnd" => {
                    if state == ScanState::InSpan {
                        state = ScanState::Active;
                        // The span is one complete statement, trailing
                        // semicolon or not.
                        if !buf.is_empty() {
                            statements.push(std::mem::take(&mut buf));
                        }
                    }
                }
                // Unknown keywords after the marker are ignored.
                _ => {}
            }
            continue;
        }

        if state == ScanState::Inactive {
            continue;
        }

        buf.push_str(line);
        buf.push('\n');

        if state == ScanState::Active && ends_with_semicolon(line) {
            statements.push(std::mem::take(&mut buf));
        }
    }

    if state == ScanState::InSpan {
        return Err(ParseError::UnterminatedBlock);
    }

    let leftover = buf.trim();
    if !leftover.is_empty() {
        return Err(ParseError::UnfinishedStatement(leftover.to_string()));
    }

    if up_blocks == 0 && down_blocks == 0 {
        return Err(ParseError::MissingAnnotations);
    }

    Ok(statements)
}

/// A line ends a statement when its last token before any `--` comment ends
/// with a semicolon.
fn ends_with_semicolon(line: &str) -> bool {
    let mut last = "";
    for word in line.split_whitespace() {
        if word.starts_with("--") {
            break;
        }
        last = word;
    }
    last.ends_with(';')
}
