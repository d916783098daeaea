use wana_kana::ConvertJapanese;

use crate::translation_internal::TextSourceMap;

/// Converts a run of lowercase romaji to hiragana, recording in `source_map`
/// which input characters each kana came from.
fn convert_alphabetic_part_to_kana(
    text: &str,
    source_map: &mut TextSourceMap,
    mut source_map_start: usize,
) -> String {
    let result = text.to_hiragana();
    let text_chars: Vec<char> = text.chars().collect();
    let result_chars: Vec<char> = result.chars().collect();

    let mut i = 0;
    let mut result_pos = 0;
    let ii = text_chars.len();
    while i < ii {
        // smallest prefix whose conversion is a prefix of the full conversion
        let mut i_next = i + 1;
        let mut result_pos_next = result_chars.len();
        while i_next < ii {
            let prefix: String = text_chars[..i_next].iter().collect();
            let t: Vec<char> = prefix.to_hiragana().chars().collect();
            if t.len() <= result_chars.len() && t[..] == result_chars[..t.len()] {
                result_pos_next = t.len();
                break;
            }
            i_next += 1;
        }

        let removals = i_next - i - 1;
        if removals > 0 {
            source_map.combine(source_map_start, removals);
        }
        source_map_start += 1;

        let additions = result_pos_next.saturating_sub(result_pos + 1);
        for _ in 0..additions {
            source_map.insert(source_map_start, &[0]);
            source_map_start += 1;
        }

        i = i_next;
        result_pos = result_pos_next;
    }

    result
}

/// Converts romaji (ascii or fullwidth) to hiragana, leaving everything else untouched.
pub fn convert_alphabetic_to_kana(text: &str, source_map: &mut TextSourceMap) -> String {
    let mut part = String::new();
    let mut result = String::new();

    for char in text.chars() {
        let normalized = match char as u32 {
            c @ 0x41..=0x5a => c + 0x61 - 0x41, // ['A', 'Z']
            c @ 0x61..=0x7a => c,               // ['a', 'z']
            c @ 0xff21..=0xff3a => c + 0x61 - 0xff21,
            c @ 0xff41..=0xff5a => c + 0x61 - 0xff41,
            0x2d | 0xff0d => 0x2d, // '-' or fullwidth dash
            _ => {
                if !part.is_empty() {
                    let start = result.chars().count();
                    result.push_str(&convert_alphabetic_part_to_kana(&part, source_map, start));
                    part.clear();
                }
                result.push(char);
                continue;
            }
        };
        part.extend(char::from_u32(normalized));
    }

    if !part.is_empty() {
        let start = result.chars().count();
        result.push_str(&convert_alphabetic_part_to_kana(&part, source_map, start));
    }

    result
}
