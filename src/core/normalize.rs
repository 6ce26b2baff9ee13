//! Journal-name normalization.
//!
//! Raw names are reduced to comparison keys in one of two modes:
//!
//! - [`NormalizationMode::FullName`]: folded, punctuation stripped, and
//!   articles/connectives removed ("The Journal of Examples" → "journal examples").
//!   A trailing series letter is kept and a "Series" before it dropped
//!   ("Journal of Physics Series A" → "journal physics a")
//! - [`NormalizationMode::Abbreviation`]: folded and punctuation stripped only,
//!   since every token of a short abbreviation matters ("J. Phys. A" → "j phys a")
//!
//! Folding lower-cases, decomposes (NFKD), drops combining marks and
//! transliterates the few Latin letters that do not decompose (ß, æ, œ, ø, ł, ...).
//! Both modes are idempotent.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Which key space a name is normalized for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    FullName,
    Abbreviation,
}

/// Articles and connectives dropped from full names.
///
/// Covers the languages most journal lists mix in; "journal" itself is kept
/// because it distinguishes e.g. "Journal of Physics" from "Physics".
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "at", "das", "de", "der", "des", "die", "du", "el", "et", "for", "gli", "il",
    "in", "l", "la", "las", "le", "les", "li", "los", "of", "on", "the", "to", "und", "y",
];

/// Normalize a raw name in the given mode
#[must_use]
pub fn normalize(raw: &str, mode: NormalizationMode) -> String {
    let cleaned = strip_punctuation(&fold(raw));
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    match mode {
        NormalizationMode::Abbreviation => tokens.join(" "),
        NormalizationMode::FullName => {
            // A trailing single letter names a series ("Journal of Physics A")
            let series = tokens.len() > 1 && tokens.last().is_some_and(|t| is_series_letter(t));
            let last = tokens.len().saturating_sub(1);
            let mut content: Vec<&str> = tokens
                .iter()
                .enumerate()
                .filter(|&(i, t)| !is_stop_word(t) || (series && i == last))
                .map(|(_, t)| *t)
                .collect();
            // "Series B" and "B" name the same section
            while series && content.len() > 2 && content[content.len() - 2] == "series" {
                content.remove(content.len() - 2);
            }
            // A name made only of stop words keeps them rather than vanishing
            if content.is_empty() {
                tokens.join(" ")
            } else {
                content.join(" ")
            }
        }
    }
}

/// Normalize in full-name mode
#[must_use]
pub fn normalize_full_name(raw: &str) -> String {
    normalize(raw, NormalizationMode::FullName)
}

/// Normalize in abbreviation mode
#[must_use]
pub fn normalize_abbreviation(raw: &str) -> String {
    normalize(raw, NormalizationMode::Abbreviation)
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

fn is_series_letter(token: &str) -> bool {
    token.len() == 1 && token.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Lower-case, decompose, drop combining marks, transliterate.
fn fold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'þ' => out.push_str("th"),
            'ø' => out.push('o'),
            'ł' => out.push('l'),
            'đ' | 'ð' => out.push('d'),
            'ı' => out.push('i'),
            c => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// Replace everything but alphanumerics and internal hyphens with spaces.
fn strip_punctuation(folded: &str) -> String {
    let chars: Vec<char> = folded.chars().collect();
    let mut out = String::with_capacity(folded.len());

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if c == '-' {
            let prev = i > 0 && chars[i - 1].is_alphanumeric();
            let next = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
            out.push(if prev && next { '-' } else { ' ' });
        } else {
            out.push(' ');
        }
    }

    out
}

/// Tidy the display form of an abbreviation.
///
/// Inserts the space missing after a period that runs into an upper-case letter
/// ("J.Phys.A" → "J. Phys. A") and collapses whitespace.
#[must_use]
pub fn tidy_abbreviation(raw: &str) -> String {
    let mut spaced = String::with_capacity(raw.len() + 4);
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        spaced.push(c);
        if c == '.' && chars.peek().is_some_and(|n| n.is_uppercase()) {
            spaced.push(' ');
        }
    }

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a field value into its surrounding brace wrapper and content.
///
/// Returns `(content, depth)` where `depth` is the number of enclosing `{...}`
/// pairs that wrap the whole value. `"{{Nature}}"` → `("Nature", 2)`,
/// `"{A} and {B}"` → `("{A} and {B}", 0)`.
#[must_use]
pub fn strip_braces(value: &str) -> (&str, usize) {
    let mut inner = value.trim();
    let mut depth = 0;

    while inner.len() >= 2 && inner.starts_with('{') && inner.ends_with('}') && wraps_whole(inner) {
        inner = inner[1..inner.len() - 1].trim();
        depth += 1;
    }

    (inner, depth)
}

/// True when the opening brace at position 0 closes at the final character.
fn wraps_whole(s: &str) -> bool {
    let mut depth = 0usize;
    let last = s.len() - 1;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == last;
                }
            }
            _ => {}
        }
    }
    false
}

/// Re-apply a brace wrapper removed by [`strip_braces`]
#[must_use]
pub fn wrap_braces(content: &str, depth: usize) -> String {
    format!("{}{content}{}", "{".repeat(depth), "}".repeat(depth))
}
