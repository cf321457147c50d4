//! Deterministic text normalization shared by fingerprinting and the semantic-cache
//! embedding input.
//!
//! The rewrite pipeline is a fixed, ordered sequence of regex passes. The order is
//! load-bearing: filler removal runs before question-opener rewriting, which runs
//! before arithmetic canonicalization, and so on. Patterns are compiled once behind
//! `LazyLock` rather than per call.

use std::sync::LazyLock;

use regex::Regex;

/// Canonical multiplication glyph produced by the arithmetic-canonicalization pass.
pub const MULTIPLY: char = '×';
/// Canonical division glyph produced by the arithmetic-canonicalization pass.
pub const DIVIDE: char = '÷';
/// Canonical minus glyph produced by the arithmetic-canonicalization pass.
pub const MINUS: char = '−';

static FILLER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bplease\b",
        r"\bkindly\b",
        r"\bcould you\b",
        r"\bcan you\b",
        r"\bwould you\b",
        r"\btell me\b",
        r"\bi want to know\b",
        r"\bi need to know\b",
        r"\bi would like to know\b",
        r"\bjust\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("filler pattern is valid regex"))
    .collect()
});

static OPENER_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"\bwhat's\b").unwrap(), "what is"),
        (Regex::new(r"\bwhats\b").unwrap(), "what is"),
        (Regex::new(r"\bhow do i\b").unwrap(), "how to"),
        (Regex::new(r"\bhow can i\b").unwrap(), "how to"),
        (Regex::new(r"\bhow would i\b").unwrap(), "how to"),
        (Regex::new(r"\bwhere can i\b").unwrap(), "where to"),
        (Regex::new(r"\bwhere do i\b").unwrap(), "where to"),
    ]
});

static MULTIPLY_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\btimes\b|\bmultiplied by\b|\bmultiply by\b").unwrap()
});
static MULTIPLY_SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[x*](?=\d)").unwrap());
static DIVIDE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdivided by\b|\bdivide by\b").unwrap());
static DIVIDE_SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(?=\d)").unwrap());
static PLUS_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bplus\b|\badd to\b").unwrap());
static MINUS_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bminus\b|\bsubtract from\b").unwrap());
static MINUS_SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-(?=\d)").unwrap());

static QUESTION_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?{2,}").unwrap());
static BANG_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!{2,}").unwrap());
static DOT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Applies the ordered rewrite pipeline to a single piece of message text.
///
/// `normalize(normalize(s)) == normalize(s)` — every rewrite in the pipeline produces
/// output that is a fixed point of the earlier passes.
pub fn normalize(input: &str) -> String {
    let mut text = input.to_lowercase();

    for pattern in FILLER_PATTERNS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }

    for (pattern, replacement) in OPENER_PATTERNS.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }

    text = canonicalize_arithmetic(&text);

    text = QUESTION_RUN.replace_all(&text, "?").into_owned();
    text = BANG_RUN.replace_all(&text, "!").into_owned();
    text = DOT_RUN.replace_all(&text, ".").into_owned();

    text = WHITESPACE_RUN.replace_all(&text, " ").into_owned();
    text.trim().to_string()
}

fn canonicalize_arithmetic(input: &str) -> String {
    let mut text = MULTIPLY_WORD
        .replace_all(input, MULTIPLY.to_string().as_str())
        .into_owned();
    text = MULTIPLY_SYMBOL
        .replace_all(&text, MULTIPLY.to_string().as_str())
        .into_owned();
    text = DIVIDE_WORD
        .replace_all(&text, DIVIDE.to_string().as_str())
        .into_owned();
    text = DIVIDE_SYMBOL
        .replace_all(&text, DIVIDE.to_string().as_str())
        .into_owned();
    text = PLUS_WORD.replace_all(&text, "+").into_owned();
    text = MINUS_WORD
        .replace_all(&text, MINUS.to_string().as_str())
        .into_owned();
    MINUS_SYMBOL
        .replace_all(&text, MINUS.to_string().as_str())
        .into_owned()
}

/// Normalizes `role: content` message pairs, preserving the role marker verbatim as a
/// structural separator.
pub fn normalize_message(role: &str, content: &str) -> String {
    format!("{role}:{}", normalize(content))
}
