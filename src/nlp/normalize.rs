//! Text clean-up applied before translation: repairs UTF-8 that was decoded
//! as Windows-1252 (possibly more than once) and removes emoji.

use once_cell::sync::Lazy;
use regex::Regex;

static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"[0-9#*]\x{FE0F}?\x{20E3}",
        r"|\p{Regional_Indicator}",
        r"|\p{Extended_Pictographic}[\x{FE0E}\x{FE0F}\p{Emoji_Modifier}\x{E0020}-\x{E007F}]*",
        r"(?:\x{200D}\p{Extended_Pictographic}[\x{FE0E}\x{FE0F}\p{Emoji_Modifier}]*)*",
        r"|\p{Emoji_Modifier}",
    ))
    .expect("valid emoji regex")
});

/// Windows-1252 code points for bytes 0x80..=0x9F; `None` marks bytes the
/// code page leaves undefined (those decode to the C1 control instead).
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Repair mojibake and strip emoji. Idempotent.
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_emoji(&fix_mojibake(&current));
        // Both passes only ever shorten the text, so this terminates.
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Remove emoji, pictographs and their modifier/joiner sequences.
pub fn strip_emoji(text: &str) -> String {
    EMOJI.replace_all(text, "").into_owned()
}

/// Punctuation that legitimately follows a word, and whose Windows-1252
/// byte is also a UTF-8 continuation byte.
const WORD_FINAL: [char; 8] = [
    '\u{2019}', '\u{201D}', '\u{00BB}', '\u{203A}', '\u{2026}', '\u{2013}', '\u{2014}',
    '\u{2022}',
];

/// A Windows-1252 run that spells out a UTF-8 sequence.
struct Repair {
    at: usize,
    used: usize,
    decoded: char,
    /// Two-character run that also reads as a letter plus closing
    /// punctuation, e.g. `É»`.
    ambiguous: bool,
}

/// Single left-to-right pass re-decoding Windows-1252 runs that spell out a
/// UTF-8 sequence.
///
/// A repair must decode to a character from a commonly written block.
/// Ambiguous repairs are only applied when the same text also holds an
/// unambiguous one.
pub fn fix_mojibake(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let repairs = find_repairs(&chars);
    let confirmed = repairs.iter().any(|r| !r.ambiguous);
    let mut accepted = repairs
        .into_iter()
        .filter(|r| confirmed || !r.ambiguous)
        .peekable();

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        match accepted.next_if(|r| r.at == i) {
            Some(repair) => {
                out.push(repair.decoded);
                i += repair.used;
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

fn find_repairs(chars: &[char]) -> Vec<Repair> {
    let mut repairs = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match decode_sequence(&chars[i..]).filter(|(decoded, _)| commonly_written(*decoded)) {
            Some((decoded, used)) => {
                let ambiguous = used == 2
                    && WORD_FINAL.contains(&chars[i + 1])
                    && chars.get(i + 2).map_or(true, |c| !c.is_alphanumeric());
                repairs.push(Repair {
                    at: i,
                    used,
                    decoded,
                    ambiguous,
                });
                i += used;
            }
            None => i += 1,
        }
    }
    repairs
}

/// Blocks real text is written in; mis-decoded letters plus punctuation
/// usually land elsewhere (IPA, Latin Extended-B, rare Cyrillic).
fn commonly_written(c: char) -> bool {
    matches!(
        c as u32,
        0x00A0..=0x017F
            | 0x0386..=0x03CE
            | 0x0400..=0x045F
            | 0x2000..=0x206F
            | 0x20A0..=0x20CF
            | 0x20D0..=0x20FF
            | 0x2100..=0x214F
            | 0x2190..=0x21FF
            | 0x2500..=0x27BF
            | 0x3000..=0x30FF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xFE00..=0xFE0F
            | 0xFF00..=0xFFEF
            | 0x1F000..=0x1FAFF
            | 0x20000..=0x2FFFF
            | 0xE0000..=0xE007F
    )
}

fn decode_sequence(chars: &[char]) -> Option<(char, usize)> {
    let lead = cp1252_byte(*chars.first()?)?;
    let width = match lead {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return None,
    };
    if chars.len() < width {
        return None;
    }
    let mut bytes = [lead, 0, 0, 0];
    for (slot, &c) in bytes[1..width].iter_mut().zip(&chars[1..width]) {
        let byte = cp1252_byte(c)?;
        if !(0x80..=0xBF).contains(&byte) {
            return None;
        }
        *slot = byte;
    }
    let decoded = std::str::from_utf8(&bytes[..width]).ok()?;
    decoded.chars().next().map(|c| (c, width))
}

fn cp1252_byte(c: char) -> Option<u8> {
    let code = c as u32;
    if code < 0x80 {
        return None;
    }
    if let Some(pos) = CP1252_HIGH.iter().position(|slot| *slot == Some(c)) {
        return Some(0x80 + pos as u8);
    }
    match code {
        0x80..=0x9F if CP1252_HIGH[(code - 0x80) as usize].is_none() => Some(code as u8),
        0xA0..=0xFF => Some(code as u8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_single_and_double_encoding() {
        assert_eq!(normalize("CafÃ©"), "Café");
        assert_eq!(normalize("itâ€™s â€œfineâ€\u{9d}"), "it\u{2019}s \u{201C}fine\u{201D}");
        assert_eq!(normalize("CafÃƒÂ©"), "Café");
        assert_eq!(normalize("Â« bonjour Â»"), "« bonjour »");
    }

    #[test]
    fn leaves_correct_text_alone() {
        for text in [
            "plain ascii",
            "Café crème, naïve façade",
            "it\u{2019}s \u{201C}quoted\u{201D} \u{2014} ok",
            "Grüße aus Köln",
            "日本語のテキスト",
            "«CAFÉ»",
            "\u{201C}CAFÉ\u{201D}",
            "\u{201E}GRÜSSE AUS MÜNCHEN\u{201C}",
            "«AÑO» y \u{2018}MAÇÃ\u{2019}",
            "Ç\u{2026} voilà",
        ] {
            assert_eq!(normalize(text), text);
        }
    }

    #[test]
    fn removes_emoji_sequences() {
        assert_eq!(normalize("Hi 😀 there"), "Hi  there");
        assert_eq!(normalize("team 👩🏽\u{200D}💻 rocks 🇫🇷"), "team  rocks ");
        assert_eq!(normalize("press 1\u{FE0F}\u{20E3} now"), "press  now");
        assert_eq!(normalize("mojibake emoji ðŸ˜€!"), "mojibake emoji !");
    }

    #[test]
    fn digits_and_symbols_survive() {
        assert_eq!(normalize("room #42 * 3"), "room #42 * 3");
    }
}
