//! Deterministic cleanup of page text produced by any extraction stage.
//!
//! Stages disagree on line endings, trailing padding, form feeds and
//! zero-width characters. Normalising before the threshold check keeps the
//! "is this page good enough" decision comparable across stages, and keeps
//! the assembled document identical for identical inputs.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip invisible characters (zero-width, BOM, soft hyphen, form feed, NUL)
//! 3. Trim trailing whitespace per line
//! 4. Collapse runs of blank lines to a single blank line
//! 5. Trim leading and trailing blank lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to one page of extracted text.
pub fn normalise_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Number of characters that count toward a page's quality threshold.
pub fn meaningful_len(text: &str) -> usize {
    text.trim().chars().count()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible characters ──────────────────────────────────────
//
// Tesseract and pdf-extract both terminate pages with a form feed.

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{000C}',
            '\u{0000}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
