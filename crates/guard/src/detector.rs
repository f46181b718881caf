//! SQL detection in free-form text.
//!
//! Scans a response for embedded SQL across three presentations, in priority
//! order: fenced code blocks, inline back-tick/quoted spans, and bare
//! statements in prose. A byte range claimed by an earlier scan is never
//! re-claimed by a later one (first-match-wins).
//!
//! False-positive suppression is a hard requirement, not best-effort: the
//! bare scan only fires when a statement keyword is followed by the shape of
//! a real SQL clause, so "please select a convenient time" produces nothing.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// How a detected SQL fragment was presented in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Inside a ``` fenced code block with no language tag or a sql tag
    Fenced,
    /// A back-tick or quoted span starting with a statement keyword
    Inline,
    /// Unfenced, unquoted SQL embedded in prose
    Bare,
}

/// A detected text span believed to contain SQL, pending validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlCandidate {
    /// The SQL text, stripped of delimiters and surrounding whitespace
    pub text: String,

    /// The presentation the fragment was found in
    pub kind: CandidateKind,

    /// Byte offset of the fragment in the source text
    pub start: usize,

    /// Byte offset one past the end of the fragment
    pub end: usize,
}

/// Statement keywords that can open a SQL fragment.
const STATEMENT_KEYWORDS: &str = "select|insert|update|delete|drop|alter|create|with";

/// Scan `text` for SQL candidates.
///
/// Pure function of its input: the same text always produces the same
/// candidates, in source order.
pub fn detect(text: &str) -> Vec<SqlCandidate> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    scan_fenced(text, &mut candidates, &mut claimed);
    scan_inline(text, &mut candidates, &mut claimed);
    scan_bare(text, &mut candidates, &mut claimed);

    candidates.sort_by_key(|c| c.start);
    candidates
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && s < end)
}

/// Pass 1: fenced code blocks.
///
/// A block qualifies when its language tag is empty or `sql` and its contents
/// carry at least one statement keyword at a word boundary. Blocks tagged with
/// another language are left unclaimed so the bare scan can still look inside
/// them.
fn scan_fenced(text: &str, candidates: &mut Vec<SqlCandidate>, claimed: &mut Vec<(usize, usize)>) {
    // Multi-line form: tag line, then contents up to the closing fence.
    let multiline = Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").unwrap();
    for caps in multiline.captures_iter(text) {
        let full = caps.get(0).unwrap();
        if overlaps(claimed, full.start(), full.end()) {
            continue;
        }
        let tag = caps.get(1).map_or("", |m| m.as_str());
        if !(tag.is_empty() || tag.eq_ignore_ascii_case("sql")) {
            continue;
        }
        if let Some(candidate) = fenced_candidate(caps.get(2).unwrap()) {
            candidates.push(candidate);
            claimed.push((full.start(), full.end()));
        }
    }

    // Single-line form: ```SELECT * FROM t``` with no tag line.
    let single_line = Regex::new(r"```([^`\n]+?)```").unwrap();
    for caps in single_line.captures_iter(text) {
        let full = caps.get(0).unwrap();
        if overlaps(claimed, full.start(), full.end()) {
            continue;
        }
        if let Some(candidate) = fenced_candidate(caps.get(1).unwrap()) {
            candidates.push(candidate);
            claimed.push((full.start(), full.end()));
        }
    }
}

/// Build a fenced candidate from the raw block contents, trimming whitespace
/// while keeping offsets accurate. Returns `None` when the contents carry no
/// statement keyword.
fn fenced_candidate(contents: regex_lite::Match<'_>) -> Option<SqlCandidate> {
    let raw = contents.as_str();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let keyword = Regex::new(&format!(r"(?i)\b(?:{STATEMENT_KEYWORDS}|truncate|merge|grant|revoke)\b")).unwrap();
    if !keyword.is_match(trimmed) {
        return None;
    }

    let lead = raw.len() - raw.trim_start().len();
    Some(SqlCandidate {
        text: trimmed.to_string(),
        kind: CandidateKind::Fenced,
        start: contents.start() + lead,
        end: contents.start() + lead + trimmed.len(),
    })
}

/// Pass 2: inline spans.
///
/// A span delimited by single back-ticks or quotes qualifies when it begins
/// with a statement keyword followed by whitespace.
fn scan_inline(text: &str, candidates: &mut Vec<SqlCandidate>, claimed: &mut Vec<(usize, usize)>) {
    let delimited = [
        Regex::new(r"`([^`\n]+)`").unwrap(),
        Regex::new(r"'([^'\n]+)'").unwrap(),
        Regex::new(r#""([^"\n]+)""#).unwrap(),
    ];
    let opener = Regex::new(&format!(r"(?i)^(?:{STATEMENT_KEYWORDS})\s")).unwrap();

    for pattern in &delimited {
        for caps in pattern.captures_iter(text) {
            let full = caps.get(0).unwrap();
            if overlaps(claimed, full.start(), full.end()) {
                continue;
            }
            let span = caps.get(1).unwrap();
            let content = span.as_str().trim();
            if !opener.is_match(content) {
                continue;
            }
            candidates.push(SqlCandidate {
                text: content.to_string(),
                kind: CandidateKind::Inline,
                start: span.start(),
                end: span.end(),
            });
            claimed.push((full.start(), full.end()));
        }
    }
}

/// Pass 3: bare statements in prose.
///
/// Each pattern anchors a statement keyword to the clause shape that must
/// follow it, which is what rejects conversational keyword use ("select a
/// good option from the menu" has no column list before its `from`).
fn scan_bare(text: &str, candidates: &mut Vec<SqlCandidate>, claimed: &mut Vec<(usize, usize)>) {
    let anchors = [
        Regex::new(r"(?is)\bselect\s+(?:\*|\w+(?:\s*,\s*\w+)*)\s+from\b").unwrap(),
        Regex::new(r"(?i)\binsert\s+into\b").unwrap(),
        Regex::new(r"(?is)\bupdate\s+\w+\s+set\b").unwrap(),
        Regex::new(r"(?i)\bdelete\s+from\b").unwrap(),
        Regex::new(r"(?i)\b(?:drop|alter|truncate)\s+table\b").unwrap(),
        Regex::new(r"(?i)\bcreate\s+(?:table|index|view|database)\b").unwrap(),
        Regex::new(r"(?is)\bwith\s+\w+\s+as\s*\(").unwrap(),
    ];

    let mut starts: Vec<usize> = anchors
        .iter()
        .flat_map(|a| a.find_iter(text).map(|m| m.start()))
        .collect();
    starts.sort_unstable();
    starts.dedup();

    for start in starts {
        let end = bare_extent(text, start);
        if overlaps(claimed, start, end) {
            continue;
        }
        let fragment = text[start..end].trim_end();
        if fragment.is_empty() {
            continue;
        }
        let end = start + fragment.len();
        candidates.push(SqlCandidate {
            text: fragment.to_string(),
            kind: CandidateKind::Bare,
            start,
            end,
        });
        claimed.push((start, end));
    }
}

/// A bare candidate runs from its statement keyword to the first semicolon,
/// blank line, or end of text, so multi-line unfenced SQL is kept whole.
fn bare_extent(text: &str, start: usize) -> usize {
    let rest = &text[start..];
    let mut end = rest.len();
    if let Some(semi) = rest.find(';') {
        end = end.min(semi);
    }
    if let Some(blank) = Regex::new(r"\n[ \t]*\r?\n").unwrap().find(rest) {
        end = end.min(blank.start());
    }
    start + end
}
