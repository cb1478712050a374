//! Search-key normalization and character classes.
//!
//! Search works over *search keys*: every codepoint is folded to a
//! canonical form that erases case, diacritics, and a handful of
//! letter-group distinctions (so `e`, `E`, `é`, `Ê` all compare equal),
//! and collapses every whitespace class to a plain space. Punctuation is
//! left alone; it compares literally.
//!
//! The fold is idempotent: `fold_char(fold_char(c)) == fold_char(c)` for
//! every codepoint. Search relies on this to normalize the query once and
//! compare it against folded page text.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Reserved codepoint standing for "hyphen followed by a line break" as a
/// single unit in the page's character stream. Expands to
/// [`HYPHEN_EXPANSION`] when text is reassembled for display.
pub const HYPHEN_LINE_BREAK: char = '\u{FFFE}';

/// Display expansion of [`HYPHEN_LINE_BREAK`].
pub const HYPHEN_EXPANSION: &str = "-\r\n";

/// Letters that compatibility decomposition leaves alone but that search
/// treats as equivalent to a base letter.
static LETTER_GROUPS: Lazy<FxHashMap<char, char>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    for (from, to) in [
        ('\u{00E6}', 'a'), // ae ligature
        ('\u{0153}', 'o'), // oe ligature
        ('\u{00F8}', 'o'), // o with stroke
        ('\u{0111}', 'd'), // d with stroke
        ('\u{00F0}', 'd'), // eth
        ('\u{0127}', 'h'), // h with stroke
        ('\u{0142}', 'l'), // l with stroke
        ('\u{00DF}', 's'), // sharp s
        ('\u{0131}', 'i'), // dotless i
        ('\u{014B}', 'n'), // eng
        ('\u{00FE}', 't'), // thorn
        ('\u{0192}', 'f'), // f with hook
        ('\u{03C2}', '\u{03C3}'), // final sigma -> sigma
    ] {
        m.insert(from, to);
    }
    m
});

/// Fold one codepoint to its search key.
pub fn fold_char(c: char) -> char {
    if c.is_whitespace() {
        return ' ';
    }
    // Full compatibility decomposition, keeping the first base character
    // and dropping combining marks.
    let base = std::iter::once(c)
        .nfkd()
        .find(|d| !is_combining_mark(*d))
        .unwrap_or(c);
    let lower = base.to_lowercase().next().unwrap_or(base);
    if lower.is_whitespace() {
        return ' ';
    }
    *LETTER_GROUPS.get(&lower).unwrap_or(&lower)
}

/// Fold a UTF-8 query into search keys, collapsing whitespace runs to a
/// single space. The query is composed (NFC) first so that decomposed
/// accents merge with their base letter; a combining mark left standalone
/// after composition is dropped.
pub fn fold_query(query: &str) -> Vec<char> {
    let mut out = Vec::with_capacity(query.len());
    for c in query.nfc() {
        let f = fold_char(c);
        if is_combining_mark(f) {
            continue;
        }
        if f == ' ' && out.last() == Some(&' ') {
            continue;
        }
        out.push(f);
    }
    out
}

/// Word-break characters: whitespace, hyphen-like punctuation, and the
/// hyphenation marker. These delimit words for selection and are trimmed
/// from the printable range.
pub fn is_word_break(c: char) -> bool {
    c.is_whitespace()
        || c == HYPHEN_LINE_BREAK
        || matches!(
            c,
            '-' | '\u{00AD}' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}'
        )
}

/// Line-break characters. Crossing one of these flushes the running
/// rectangle when bounds are accumulated; the hyphenation marker counts
/// since it stands for a break.
pub fn is_line_break(c: char) -> bool {
    matches!(c, '\r' | '\n') || c == HYPHEN_LINE_BREAK
}

/// Characters search may cross without consuming a query character: the
/// hyphenation marker always, whitespace only next to already-matched
/// whitespace (the match loop enforces that context).
pub fn is_skippable(c: char) -> bool {
    c == HYPHEN_LINE_BREAK || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_case_and_accents() {
        assert_eq!(fold_char('A'), 'a');
        assert_eq!(fold_char('z'), 'z');
        assert_eq!(fold_char('É'), 'e');
        assert_eq!(fold_char('é'), 'e');
        assert_eq!(fold_char('ü'), 'u');
        assert_eq!(fold_char('ñ'), 'n');
        assert_eq!(fold_char('Å'), 'a');
    }

    #[test]
    fn test_fold_letter_groups() {
        assert_eq!(fold_char('Æ'), 'a');
        assert_eq!(fold_char('œ'), 'o');
        assert_eq!(fold_char('Ø'), 'o');
        assert_eq!(fold_char('ß'), 's');
        assert_eq!(fold_char('ł'), 'l');
        assert_eq!(fold_char('ς'), 'σ');
    }

    #[test]
    fn test_fold_leaves_punctuation_alone() {
        assert_eq!(fold_char('-'), '-');
        assert_eq!(fold_char('.'), '.');
        assert_eq!(fold_char('!'), '!');
        assert_eq!(fold_char('7'), '7');
    }

    #[test]
    fn test_fold_whitespace_classes() {
        assert_eq!(fold_char(' '), ' ');
        assert_eq!(fold_char('\t'), ' ');
        assert_eq!(fold_char('\n'), ' ');
        assert_eq!(fold_char('\r'), ' ');
        assert_eq!(fold_char('\u{00A0}'), ' ');
    }

    #[test]
    fn test_fold_is_idempotent_for_all_codepoints() {
        for u in 0..=char::MAX as u32 {
            let Some(c) = char::from_u32(u) else { continue };
            let once = fold_char(c);
            assert_eq!(
                fold_char(once),
                once,
                "fold not idempotent for U+{u:04X} ({c:?})"
            );
        }
    }

    #[test]
    fn test_fold_query_collapses_whitespace_runs() {
        assert_eq!(fold_query("a  b"), vec!['a', ' ', 'b']);
        assert_eq!(fold_query("a \t\n b"), vec!['a', ' ', 'b']);
        assert_eq!(fold_query("Vu\u{0065}\u{0301}"), vec!['v', 'u', 'e']);
    }

    #[test]
    fn test_word_break_classes() {
        assert!(is_word_break(' '));
        assert!(is_word_break('-'));
        assert!(is_word_break('\u{2014}'));
        assert!(is_word_break(HYPHEN_LINE_BREAK));
        assert!(!is_word_break('a'));
        assert!(!is_word_break('.'));
    }

    #[test]
    fn test_line_break_classes() {
        assert!(is_line_break('\n'));
        assert!(is_line_break('\r'));
        assert!(is_line_break(HYPHEN_LINE_BREAK));
        assert!(!is_line_break(' '));
        assert!(!is_line_break('-'));
    }
}
