//! Post-processing: deterministic cleanup of recognised page text.
//!
//! OCR output carries artefacts that have nothing to do with the page
//! content: CRLF line endings from the engine, zero-width characters,
//! spaces before commas, words split by an end-of-line hyphen, `0` read
//! for `O` in the middle of a word. These rules repair such quirks.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule only sees `\n`.
//! Hyphen rejoining runs after trailing whitespace is trimmed, otherwise a
//! `word- \n` line would not match.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of recognised text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Rejoin words hyphenated across a line break
/// 5. Repair digit/letter confusions (`H0USE` → `HOUSE`, `2O24` → `2024`)
/// 6. Collapse runs of spaces and tabs inside a line
/// 7. Fix spacing around punctuation and brackets
/// 8. Collapse 3+ consecutive newlines to one blank line
/// 9. Trim leading and trailing blank space of the page
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = rejoin_hyphenated(&s);
    let s = fix_digit_letter_confusions(&s);
    let s = collapse_inline_spaces(&s);
    let s = fix_punctuation_spacing(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
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

// ── Rule 4: Rejoin hyphenated line breaks ───────────────────────────────────
//
// Only a lowercase continuation is joined: `infor-\nmation` becomes
// `information`, while `Jean-\nPaul` and `2019-\n2020` stay as they are.

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-\n[ \t]*(\p{Ll})").unwrap());

fn rejoin_hyphenated(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").to_string()
}

// ── Rule 5: Digit/letter confusions ─────────────────────────────────────────
//
// A run of `0`, `1`, `5` with a letter on both sides is read as letters
// (`w0rd`, `H0USE`, `he1lo`). A run of `O`, `o`, `I`, `l`, `S` with a
// digit on both sides is read as digits (`2O24`, `1l5`). Runs that mix in
// other characters, or touch a word edge, are left alone, so `H2O`,
// `F150` and `iOS10` survive.

fn fix_digit_letter_confusions(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let chars = replace_flanked_runs(
        &chars,
        |c| c.is_ascii_digit(),
        |c| matches!(c, '0' | '1' | '5'),
        char::is_alphabetic,
        |c, upper| match (c, upper) {
            ('0', true) => 'O',
            ('0', false) => 'o',
            ('1', true) => 'I',
            ('1', false) => 'l',
            ('5', true) => 'S',
            ('5', false) => 's',
            (other, _) => other,
        },
    );
    let chars = replace_flanked_runs(
        &chars,
        char::is_alphabetic,
        |c| matches!(c, 'O' | 'o' | 'I' | 'l' | 'S'),
        |c| c.is_ascii_digit(),
        |c, _| match c {
            'O' | 'o' => '0',
            'I' | 'l' => '1',
            'S' => '5',
            other => other,
        },
    );
    chars.into_iter().collect()
}

/// Map every maximal run of `run_char`s made only of `confusable` chars
/// whose neighbours both satisfy `flank`. `map` gets whether both
/// neighbours are uppercase.
fn replace_flanked_runs(
    chars: &[char],
    run_char: impl Fn(char) -> bool,
    confusable: impl Fn(char) -> bool,
    flank: impl Fn(char) -> bool,
    map: impl Fn(char, bool) -> char,
) -> Vec<char> {
    let mut out = chars.to_vec();
    let mut i = 0;
    while i < chars.len() {
        if !run_char(chars[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && run_char(chars[i]) {
            i += 1;
        }
        let before = start.checked_sub(1).map(|b| chars[b]);
        let after = chars.get(i).copied();
        let (Some(before), Some(after)) = (before, after) else {
            continue;
        };
        if flank(before) && flank(after) && chars[start..i].iter().all(|&c| confusable(c)) {
            let upper = before.is_uppercase() && after.is_uppercase();
            for c in &mut out[start..i] {
                *c = map(*c, upper);
            }
        }
    }
    out
}

// ── Rule 6: Collapse inline spaces ──────────────────────────────────────────

static RE_INLINE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S)[ \t]{2,}").unwrap());

/// Leading indentation is kept; only gaps after a visible character shrink.
fn collapse_inline_spaces(input: &str) -> String {
    RE_INLINE_SPACES.replace_all(input, "$1 ").to_string()
}

// ── Rule 7: Punctuation spacing ─────────────────────────────────────────────

static RE_SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([,.;:!?)\]])").unwrap());
static RE_SPACE_AFTER_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([(\[])[ \t]+").unwrap());
static RE_MISSING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([,;!?])(\p{L})").unwrap());

/// `word ,` → `word,`, `( x )` → `(x)`, `a,b` → `a, b`.
///
/// `.` and `:` never get a space inserted after them so decimals,
/// abbreviations, times and URLs survive.
fn fix_punctuation_spacing(input: &str) -> String {
    let s = RE_SPACE_BEFORE_PUNCT.replace_all(input, "$1");
    let s = RE_SPACE_AFTER_OPEN.replace_all(&s, "$1");
    RE_MISSING_SPACE.replace_all(&s, "$1 $2").to_string()
}

// ── Rule 8: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld\t"),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_rejoin_hyphenated() {
        assert_eq!(rejoin_hyphenated("infor-\nmation"), "information");
        assert_eq!(rejoin_hyphenated("Jean-\nPaul"), "Jean-\nPaul");
        assert_eq!(rejoin_hyphenated("2019-\n2020"), "2019-\n2020");
        assert_eq!(rejoin_hyphenated("recog-\n  nition"), "recognition");
    }

    #[test]
    fn test_digits_inside_words_become_letters() {
        assert_eq!(
            fix_digit_letter_confusions("H0USE w0rd he1lo B00K F1LE"),
            "HOUSE word hello BOOK FILE"
        );
    }

    #[test]
    fn test_letters_inside_numbers_become_digits() {
        assert_eq!(fix_digit_letter_confusions("2O24 1l5 1O0 3S0"), "2024 115 100 350");
    }

    #[test]
    fn test_genuine_alphanumerics_are_kept() {
        let input = "H2O COVID19 iOS10 A4 3x5 F150 B20K 10am 1st";
        assert_eq!(fix_digit_letter_confusions(input), input);
    }

    #[test]
    fn test_collapse_inline_spaces_keeps_indent() {
        assert_eq!(collapse_inline_spaces("    a    b\t\tc"), "    a b c");
    }

    #[test]
    fn test_punctuation_spacing() {
        assert_eq!(fix_punctuation_spacing("hello , world !"), "hello, world!");
        assert_eq!(fix_punctuation_spacing("( see [ 1 ] )"), "(see [1])");
        assert_eq!(fix_punctuation_spacing("red,green;blue"), "red, green; blue");
    }

    #[test]
    fn test_punctuation_spacing_leaves_numbers_and_urls() {
        assert_eq!(fix_punctuation_spacing("pi is 3.14"), "pi is 3.14");
        assert_eq!(fix_punctuation_spacing("at 10:30"), "at 10:30");
        assert_eq!(
            fix_punctuation_spacing("see https://x.org/a"),
            "see https://x.org/a"
        );
        assert_eq!(fix_punctuation_spacing("1,000"), "1,000");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_text_full_pipeline() {
        let input = "\r\n\u{FEFF}The  quick br0wn  fox ,\r\njumps over the la-\r\nzy dog .  \r\n\r\n\r\n\r\nSecond   paragraph( here )\r\n\r\n";
        assert_eq!(
            clean_text(input),
            "The quick brown fox,\njumps over the lazy dog.\n\nSecond paragraph(here)"
        );
    }

    #[test]
    fn test_clean_text_empty() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \n\n \r\n"), "");
    }
}
