//! Character reference decoding.
//!
//! Decodes named and numeric references inside DATA, RCDATA, and
//! attribute-value text; RAWTEXT and CDATA pass through untouched. The
//! named table is caller-supplied (names keep any trailing `;`); the
//! longest table hit wins. Numeric references follow the HTML spec's
//! replacement rules including the fixed Windows-1252 remap for the
//! 0x80..=0x9F range.
//!
//! Returns a borrowed `Cow` when nothing decoded.

use memchr::memchr;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::ast::{Position, TextMode};
use crate::cursor::advance_position;
use crate::errors::ErrorCode;

/// Named reference table with the max name length precomputed.
pub(crate) struct NamedReferences {
    map: HashMap<String, String>,
    max_name_len: usize,
}

impl NamedReferences {
    pub fn new(table: &HashMap<String, String>) -> Self {
        Self {
            map: table.clone(),
            max_name_len: table.keys().map(|k| k.len()).max().unwrap_or(0),
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(|s| s.as_str())
    }
}

/// Default table: the five basic entities, in both their `;` and legacy
/// semicolon-less forms (the legacy forms exist in the HTML named list).
pub(crate) fn default_named_references() -> HashMap<String, String> {
    let pairs = [
        ("gt", ">"),
        ("lt", "<"),
        ("amp", "&"),
        ("apos", "'"),
        ("quot", "\""),
    ];
    let mut map = HashMap::with_capacity(pairs.len() * 2);
    for (name, replacement) in pairs {
        map.insert(format!("{name};"), replacement.to_string());
        map.insert(name.to_string(), replacement.to_string());
    }
    map
}

// Numeric references in 0x80..=0x9F decode per Windows-1252, not Unicode.
const CCR_REPLACEMENTS: [(u32, u32); 27] = [
    (0x80, 0x20AC),
    (0x82, 0x201A),
    (0x83, 0x0192),
    (0x84, 0x201E),
    (0x85, 0x2026),
    (0x86, 0x2020),
    (0x87, 0x2021),
    (0x88, 0x02C6),
    (0x89, 0x2030),
    (0x8A, 0x0160),
    (0x8B, 0x2039),
    (0x8C, 0x0152),
    (0x8E, 0x017D),
    (0x91, 0x2018),
    (0x92, 0x2019),
    (0x93, 0x201C),
    (0x94, 0x201D),
    (0x95, 0x2022),
    (0x96, 0x2013),
    (0x97, 0x2014),
    (0x98, 0x02DC),
    (0x99, 0x2122),
    (0x9A, 0x0161),
    (0x9B, 0x203A),
    (0x9C, 0x0153),
    (0x9E, 0x017E),
    (0x9F, 0x0178),
];

fn windows_1252_remap(cp: u32) -> Option<u32> {
    CCR_REPLACEMENTS
        .iter()
        .find(|(from, _)| *from == cp)
        .map(|(_, to)| *to)
}

// C0/C1 subset that draws a control-character-reference diagnostic.
fn is_control_reference(cp: u32) -> bool {
    matches!(cp, 0x01..=0x08 | 0x0B | 0x0D..=0x1F | 0x7F..=0x9F)
}

fn is_noncharacter(cp: u32) -> bool {
    (0xFDD0..=0xFDEF).contains(&cp) || cp & 0xFFFE == 0xFFFE
}

/// Decode references in `raw`, which begins at absolute position `start`.
///
/// Diagnostics are reported through `report` with absolute positions.
pub(crate) fn decode_entities<'a>(
    raw: &'a str,
    start: Position,
    mode: TextMode,
    refs: &NamedReferences,
    report: &mut dyn FnMut(ErrorCode, Position),
) -> Cow<'a, str> {
    debug_assert!(
        !matches!(mode, TextMode::RawText | TextMode::Cdata),
        "rawtext/cdata text is never decoded"
    );
    let bytes = raw.as_bytes();
    if memchr(b'&', bytes).is_none() {
        return Cow::Borrowed(raw);
    }

    let mut out = String::new();
    let mut copy_start = 0;
    let mut i = 0;
    let at = |i: usize| advance_position(start, &raw[..i]);

    while i < bytes.len() {
        let Some(rel) = memchr(b'&', &bytes[i..]) else {
            break;
        };
        let amp = i + rel;
        match bytes.get(amp + 1) {
            Some(b'#') => {
                let hex = matches!(bytes.get(amp + 2), Some(b'x' | b'X'));
                let digits_start = amp + 2 + usize::from(hex);
                let mut j = digits_start;
                let mut value: u32 = 0;
                while j < bytes.len() {
                    let digit = if hex {
                        (bytes[j] as char).to_digit(16)
                    } else {
                        (bytes[j] as char).to_digit(10)
                    };
                    let Some(digit) = digit else { break };
                    value = value
                        .saturating_mul(if hex { 16 } else { 10 })
                        .saturating_add(digit);
                    j += 1;
                }
                if j == digits_start {
                    report(ErrorCode::AbsenceOfDigitsInNumericCharacterReference, at(amp));
                    // Keep the matched prefix literally.
                    i = j;
                    continue;
                }
                let has_semicolon = bytes.get(j) == Some(&b';');
                let end = j + usize::from(has_semicolon);
                out.push_str(&raw[copy_start..amp]);
                let decoded = if value == 0 {
                    report(ErrorCode::NullCharacterReference, at(amp));
                    '\u{FFFD}'
                } else if value > 0x0010_FFFF {
                    report(ErrorCode::CharacterReferenceOutsideUnicodeRange, at(amp));
                    '\u{FFFD}'
                } else if (0xD800..=0xDFFF).contains(&value) {
                    report(ErrorCode::SurrogateCharacterReference, at(amp));
                    '\u{FFFD}'
                } else {
                    if is_noncharacter(value) {
                        report(ErrorCode::NoncharacterCharacterReference, at(amp));
                    } else if is_control_reference(value) {
                        report(ErrorCode::ControlCharacterReference, at(amp));
                    }
                    let cp = windows_1252_remap(value).unwrap_or(value);
                    char::from_u32(cp).unwrap_or('\u{FFFD}')
                };
                out.push(decoded);
                if !has_semicolon {
                    report(ErrorCode::MissingSemicolonAfterCharacterReference, at(j));
                }
                copy_start = end;
                i = end;
            }
            Some(b) if b.is_ascii_alphanumeric() => {
                let name_area = &raw[amp + 1..];
                let max = refs.max_name_len.min(name_area.len());
                let mut matched: Option<(&str, &str)> = None;
                for len in (1..=max).rev() {
                    if !name_area.is_char_boundary(len) {
                        continue;
                    }
                    if let Some(replacement) = refs.lookup(&name_area[..len]) {
                        matched = Some((&name_area[..len], replacement));
                        break;
                    }
                }
                match matched {
                    None => {
                        report(ErrorCode::UnknownNamedCharacterReference, at(amp));
                        // Keep the `&` and candidate chars literally.
                        i = amp + 1;
                    }
                    Some((name, replacement)) => {
                        let has_semicolon = name.ends_with(';');
                        let end = amp + 1 + name.len();
                        let legacy_attr = !has_semicolon
                            && mode == TextMode::AttributeValue
                            && matches!(
                                bytes.get(end),
                                Some(b) if *b == b'=' || b.is_ascii_alphanumeric()
                            );
                        if legacy_attr {
                            // Historical attribute rule: `&name` stays raw.
                            i = end;
                        } else {
                            out.push_str(&raw[copy_start..amp]);
                            out.push_str(replacement);
                            if !has_semicolon {
                                report(
                                    ErrorCode::MissingSemicolonAfterCharacterReference,
                                    at(end),
                                );
                            }
                            copy_start = end;
                            i = end;
                        }
                    }
                }
            }
            _ => {
                i = amp + 1;
            }
        }
    }

    if copy_start == 0 {
        Cow::Borrowed(raw)
    } else {
        out.push_str(&raw[copy_start..]);
        Cow::Owned(out)
    }
}
