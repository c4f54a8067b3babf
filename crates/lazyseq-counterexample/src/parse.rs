//! Raw backend trace parsing
//!
//! CPROVER-style traces are a sequence of `State` blocks followed by one
//! `Violated property` block. Parsing is best-effort: a block that does not
//! round-trip through reconstruction is skipped with a warning, never
//! aborting the whole decode.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

/// Separator line between a state header and its assignment.
pub const STATE_SEPARATOR: &str = "----------------------------------------------------";

/// One parsed `State` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawState {
    /// State id token, kept verbatim
    pub state: String,
    pub file: String,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub thread: String,
    /// Assigned identifier (left of `=`)
    pub lhs: String,
    /// Assigned value, binary encoding suffix included
    pub rhs: String,
}

/// The final `Violated property` block, lines kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawViolation {
    pub location: String,
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEntry {
    State(RawState),
    Violation(RawViolation),
}

lazy_static! {
    static ref STATE_HEADER: Regex =
        Regex::new(r"^State\s+\S+").expect("STATE_HEADER regex is valid");
}

/// Split a raw trace into its entries, skipping anything unparseable.
#[must_use]
pub fn parse_trace(raw: &str) -> Vec<RawEntry> {
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.contains("Counterexample:"))
        .map_or(0, |i| i + 1);

    let mut entries = Vec::new();
    let mut k = start;
    while k < lines.len() {
        if lines[k].starts_with("State ") && lines.get(k + 1) == Some(&STATE_SEPARATOR) {
            // The assignment may continue over several lines.
            let mut payload = String::new();
            if let Some(first) = lines.get(k + 2) {
                payload.push_str(first);
            }
            let mut j = k + 3;
            while j < lines.len()
                && !lines[j].starts_with("State ")
                && !lines[j].starts_with("Violated property")
            {
                payload.push_str(lines[j]);
                j += 1;
            }

            match parse_state(lines[k], &payload) {
                Some(state) => entries.push(RawEntry::State(state)),
                None => warn!("unable to parse counterexample state: {}", lines[k]),
            }
        } else if lines[k].starts_with("Violated property") {
            if k + 3 < lines.len() {
                entries.push(RawEntry::Violation(RawViolation {
                    location: lines[k + 1].to_string(),
                    property: lines[k + 2].to_string(),
                    value: lines[k + 3].to_string(),
                }));
            } else {
                warn!("unable to parse counterexample final state");
            }
        }
        k += 1;
    }
    entries
}

/// Parse one state header and its payload, validating by reconstruction:
/// the parse only counts if re-rendering the parsed fields reproduces the
/// input byte for byte.
fn parse_state(header: &str, payload: &str) -> Option<RawState> {
    if !STATE_HEADER.is_match(header) {
        return None;
    }

    let tokens: Vec<&str> = header.split_whitespace().collect();
    let keys: HashMap<&str, &str> = tokens
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| (pair[0], pair[1]))
        .collect();

    let state = (*keys.get("State")?).to_string();
    let file = (*keys.get("file")?).to_string();
    let line_token = *keys.get("line")?;
    let thread = (*keys.get("thread")?).to_string();
    let function = keys.get("function").map(|f| (*f).to_string());

    let rebuilt = match &function {
        Some(function) => format!(
            "State {state} file {file} line {line_token} function {function} thread {thread}"
        ),
        None => format!("State {state} file {file} line {line_token} thread {thread}"),
    };
    if rebuilt != header {
        return None;
    }

    let trimmed = payload.trim();
    let eq = trimmed.find('=')?;
    let lhs = &trimmed[..eq];
    let rhs = &trimmed[eq + 1..];
    if format!("  {lhs}={rhs}") != payload {
        return None;
    }

    Some(RawState {
        state,
        file,
        line: line_token.parse().ok(),
        function,
        thread,
        lhs: lhs.to_string(),
        rhs: rhs.to_string(),
    })
}
