//! Reversible backslash escaping for string values.
//!
//! Six forms are recognised on the wire:
//!
//! | Form     | Character                      |
//! |----------|--------------------------------|
//! | `\\`     | backslash                      |
//! | `\t`     | tab                            |
//! | `\r`     | carriage return                |
//! | `\n`     | line feed                      |
//! | `\s`     | non-breaking space (U+00A0)    |
//! | `\uXXXX` | any other invisible character  |
//!
//! Characters outside printable ASCII are written as `\uXXXX` when they are
//! control, format, separator, private-use or noncharacter code points, or
//! fall in a range that no Unicode version has assigned (planes 4 to 13 and
//! the gaps of plane 14). Unassigned points inside otherwise populated blocks
//! are written as they are.
//! Astral characters are written as a UTF-16 surrogate pair. Decoding reverses
//! exactly these six forms; any other backslash sequence is kept verbatim.

use std::borrow::Cow;

const NBSP: char = '\u{00A0}';

/// Format (Cf) ranges outside the Latin-1 block.
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

const PRIVATE_USE_RANGES: &[(u32, u32)] = &[
    (0xE000, 0xF8FF),
    (0xF0000, 0xFFFFD),
    (0x100000, 0x10FFFD),
];

/// Ranges no Unicode version assigns.
const UNASSIGNED_RANGES: &[(u32, u32)] = &[
    (0x40000, 0xDFFFF),
    (0xE0000, 0xE0000),
    (0xE0002, 0xE001F),
    (0xE0080, 0xE00FF),
    (0xE01F0, 0xEFFFF),
];

fn in_ranges(code: u32, ranges: &[(u32, u32)]) -> bool {
    ranges.iter().any(|&(lo, hi)| code >= lo && code <= hi)
}

fn is_noncharacter(code: u32) -> bool {
    (0xFDD0..=0xFDEF).contains(&code) || (code & 0xFFFE) == 0xFFFE
}

/// Whether `c` must be written as `\uXXXX`.
fn is_invisible(c: char) -> bool {
    if c.is_ascii_graphic() || c == ' ' {
        return false;
    }
    let code = c as u32;
    c.is_control()
        || c.is_whitespace()
        || in_ranges(code, FORMAT_RANGES)
        || in_ranges(code, PRIVATE_USE_RANGES)
        || in_ranges(code, UNASSIGNED_RANGES)
        || is_noncharacter(code)
}

fn needs_encoding(c: char) -> bool {
    matches!(c, '\\' | '\t' | '\r' | '\n' | NBSP) || is_invisible(c)
}

/// Escapes `text`, borrowing when nothing needs escaping.
pub fn encode(text: &str) -> Cow<'_, str> {
    if !text.chars().any(needs_encoding) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            NBSP => out.push_str("\\s"),
            c if is_invisible(c) => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04X}", unit));
                }
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn parse_unit(hex: &str) -> Option<u16> {
    if hex.len() == 4 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        None
    }
}

/// Reads a `\uXXXX` form at the start of `rest`.
fn unit_at(rest: &str) -> Option<u16> {
    rest.strip_prefix("\\u").and_then(|r| r.get(..4)).and_then(parse_unit)
}

/// Reverses [`encode`]. Malformed sequences are kept literally.
pub fn decode(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let mut consumed = 2;
        match rest.as_bytes().get(1) {
            Some(b'\\') => out.push('\\'),
            Some(b't') => out.push('\t'),
            Some(b'r') => out.push('\r'),
            Some(b'n') => out.push('\n'),
            Some(b's') => out.push(NBSP),
            Some(b'u') => match unit_at(rest) {
                Some(high @ 0xD800..=0xDBFF) => {
                    match unit_at(&rest[6..]).filter(|low| (0xDC00..=0xDFFF).contains(low)) {
                        Some(low) => {
                            let code = 0x10000
                                + (((high as u32) - 0xD800) << 10)
                                + ((low as u32) - 0xDC00);
                            match char::from_u32(code) {
                                Some(c) => out.push(c),
                                None => out.push_str(&rest[..12]),
                            }
                            consumed = 12;
                        }
                        None => {
                            out.push_str(&rest[..6]);
                            consumed = 6;
                        }
                    }
                }
                Some(unit) => {
                    match char::from_u32(unit as u32) {
                        Some(c) => out.push(c),
                        None => out.push_str(&rest[..6]),
                    }
                    consumed = 6;
                }
                None => {
                    out.push('\\');
                    consumed = 1;
                }
            },
            _ => {
                out.push('\\');
                consumed = 1;
            }
        }
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(encode("hello world"), Cow::Borrowed(_)));
        assert!(matches!(decode("hello world"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_named_forms() {
        assert_eq!(encode("a\\b\tc\r\nd\u{00A0}e"), "a\\\\b\\tc\\r\\nd\\se");
        assert_eq!(decode("a\\\\b\\tc\\r\\nd\\se"), "a\\b\tc\r\nd\u{00A0}e");
    }

    #[test]
    fn test_unicode_forms() {
        assert_eq!(encode("\u{0001}"), "\\u0001");
        assert_eq!(encode("zero\u{200B}width"), "zero\\u200Bwidth");
        assert_eq!(encode("\u{2028}"), "\\u2028");
        assert_eq!(encode("\u{E000}"), "\\uE000");
        // Astral private use becomes a surrogate pair.
        assert_eq!(encode("\u{F0000}"), "\\uDB80\\uDC00");
        assert_eq!(decode("\\uDB80\\uDC00"), "\u{F0000}");
    }

    #[test]
    fn test_unassigned_planes_are_escaped() {
        assert_eq!(encode("\u{50000}"), "\\uD900\\uDC00");
        assert_eq!(encode("\u{E0080}"), "\\uDB40\\uDC80");
        assert_eq!(decode("\\uD900\\uDC00"), "\u{50000}");
        // Variation selectors are assigned.
        assert_eq!(encode("\u{E0100}"), "\u{E0100}");
    }

    #[test]
    fn test_visible_unicode_is_kept() {
        assert_eq!(encode("café ☕ 日本"), "café ☕ 日本");
        assert_eq!(encode("emoji 😀"), "emoji 😀");
    }

    #[test]
    fn test_malformed_sequences_are_literal() {
        assert_eq!(decode("\\q"), "\\q");
        assert_eq!(decode("trailing\\"), "trailing\\");
        assert_eq!(decode("\\u12"), "\\u12");
        assert_eq!(decode("\\uZZZZ"), "\\uZZZZ");
        assert_eq!(decode("\\uD800x"), "\\uD800x");
        assert_eq!(decode("\\uDC00"), "\\uDC00");
    }

    #[test]
    fn test_round_trip_samples() {
        for sample in [
            "",
            "\\",
            "\\\\u0041",
            "line1\nline2",
            "\u{0000}\u{001F}\u{007F}",
            "\u{FEFF}bom",
            "\u{FFFF}",
            "mixed \\s and \u{00A0}",
        ] {
            assert_eq!(decode(&encode(sample)), sample);
        }
    }
}
