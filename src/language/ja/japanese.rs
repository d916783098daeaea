use std::{collections::HashMap, sync::LazyLock};

use crate::{
    language::cjk_utils::{
        is_code_point_in_range, is_code_point_in_ranges, CodepointRange, CJK_IDEOGRAPH_RANGES,
    },
    translation_internal::TextSourceMap,
};

pub const HIRAGANA_SMALL_TSU_CODE_POINT: u32 = 0x3063;
pub const KATAKANA_SMALL_TSU_CODE_POINT: u32 = 0x30c3;
pub const KATAKANA_SMALL_KA_CODE_POINT: u32 = 0x30f5;
pub const KATAKANA_SMALL_KE_CODE_POINT: u32 = 0x30f6;
pub const KANA_PROLONGED_SOUND_MARK_CODE_POINT: u32 = 0x30fc;

pub const HIRAGANA_CONVERSION_RANGE: CodepointRange = (0x3041, 0x3096);
pub const KATAKANA_CONVERSION_RANGE: CodepointRange = (0x30a1, 0x30f6);

pub const HIRAGANA_RANGE: CodepointRange = (0x3040, 0x309f);
pub const KATAKANA_RANGE: CodepointRange = (0x30a0, 0x30ff);

pub const KANA_RANGES: &[CodepointRange] = &[HIRAGANA_RANGE, KATAKANA_RANGE];

pub const JP_RANGES_BASE: [CodepointRange; 14] = [
    HIRAGANA_RANGE,
    KATAKANA_RANGE,
    (0xff66, 0xff9f), // Halfwidth katakana
    (0x30fb, 0x30fc), // Katakana punctuation
    (0xff61, 0xff65), // Kana punctuation
    (0x3000, 0x303f), // CJK punctuation
    (0xff10, 0xff19), // Fullwidth numbers
    (0xff21, 0xff3a), // Fullwidth upper case Latin letters
    (0xff41, 0xff5a), // Fullwidth lower case Latin letters
    (0xff01, 0xff0f), // Fullwidth punctuation 1
    (0xff1a, 0xff1f), // Fullwidth punctuation 2
    (0xff3b, 0xff3f), // Fullwidth punctuation 3
    (0xff5b, 0xff60), // Fullwidth punctuation 4
    (0xffe0, 0xffee), // Currency markers
];

pub static JAPANESE_RANGES: LazyLock<[CodepointRange; 26]> = LazyLock::new(|| {
    let mut combined: [CodepointRange; 26] = [(0, 0); 26];
    combined[..14].copy_from_slice(&JP_RANGES_BASE);
    combined[14..].copy_from_slice(&CJK_IDEOGRAPH_RANGES);
    combined
});

/// Halfwidth katakana to `[plain, dakuten, handakuten]` fullwidth forms.
#[rustfmt::skip]
pub static HALFWIDTH_KATAKANA_MAP: LazyLock<HashMap<char, [Option<char>; 3]>> = LazyLock::new(|| {
    const N: Option<char> = None;
    HashMap::from([
        ('･', [Some('・'), N, N]), ('ｦ', [Some('ヲ'), Some('ヺ'), N]), ('ｧ', [Some('ァ'), N, N]),
        ('ｨ', [Some('ィ'), N, N]), ('ｩ', [Some('ゥ'), N, N]), ('ｪ', [Some('ェ'), N, N]),
        ('ｫ', [Some('ォ'), N, N]), ('ｬ', [Some('ャ'), N, N]), ('ｭ', [Some('ュ'), N, N]),
        ('ｮ', [Some('ョ'), N, N]), ('ｯ', [Some('ッ'), N, N]), ('ｰ', [Some('ー'), N, N]),
        ('ｱ', [Some('ア'), N, N]), ('ｲ', [Some('イ'), N, N]), ('ｳ', [Some('ウ'), Some('ヴ'), N]),
        ('ｴ', [Some('エ'), N, N]), ('ｵ', [Some('オ'), N, N]), ('ｶ', [Some('カ'), Some('ガ'), N]),
        ('ｷ', [Some('キ'), Some('ギ'), N]), ('ｸ', [Some('ク'), Some('グ'), N]), ('ｹ', [Some('ケ'), Some('ゲ'), N]),
        ('ｺ', [Some('コ'), Some('ゴ'), N]), ('ｻ', [Some('サ'), Some('ザ'), N]), ('ｼ', [Some('シ'), Some('ジ'), N]),
        ('ｽ', [Some('ス'), Some('ズ'), N]), ('ｾ', [Some('セ'), Some('ゼ'), N]), ('ｿ', [Some('ソ'), Some('ゾ'), N]),
        ('ﾀ', [Some('タ'), Some('ダ'), N]), ('ﾁ', [Some('チ'), Some('ヂ'), N]), ('ﾂ', [Some('ツ'), Some('ヅ'), N]),
        ('ﾃ', [Some('テ'), Some('デ'), N]), ('ﾄ', [Some('ト'), Some('ド'), N]), ('ﾅ', [Some('ナ'), N, N]),
        ('ﾆ', [Some('ニ'), N, N]), ('ﾇ', [Some('ヌ'), N, N]), ('ﾈ', [Some('ネ'), N, N]),
        ('ﾉ', [Some('ノ'), N, N]), ('ﾊ', [Some('ハ'), Some('バ'), Some('パ')]), ('ﾋ', [Some('ヒ'), Some('ビ'), Some('ピ')]),
        ('ﾌ', [Some('フ'), Some('ブ'), Some('プ')]), ('ﾍ', [Some('ヘ'), Some('ベ'), Some('ペ')]), ('ﾎ', [Some('ホ'), Some('ボ'), Some('ポ')]),
        ('ﾏ', [Some('マ'), N, N]), ('ﾐ', [Some('ミ'), N, N]), ('ﾑ', [Some('ム'), N, N]),
        ('ﾒ', [Some('メ'), N, N]), ('ﾓ', [Some('モ'), N, N]), ('ﾔ', [Some('ヤ'), N, N]),
        ('ﾕ', [Some('ユ'), N, N]), ('ﾖ', [Some('ヨ'), N, N]), ('ﾗ', [Some('ラ'), N, N]),
        ('ﾘ', [Some('リ'), N, N]), ('ﾙ', [Some('ル'), N, N]), ('ﾚ', [Some('レ'), N, N]),
        ('ﾛ', [Some('ロ'), N, N]), ('ﾜ', [Some('ワ'), N, N]), ('ﾝ', [Some('ン'), N, N]),
    ])
});

#[rustfmt::skip]
static VOWEL_TO_KANA_MAPPING: [(char, &str); 5] = [
    ('a', "ぁあかがさざただなはばぱまゃやらゎわヵァアカガサザタダナハバパマャヤラヮワヵヷ"),
    ('i', "ぃいきぎしじちぢにひびぴみりゐィイキギシジチヂニヒビピミリヰヸ"),
    ('u', "ぅうくぐすずっつづぬふぶぷむゅゆるゥウクグスズッツヅヌフブプムュユルヴ"),
    ('e', "ぇえけげせぜてでねへべぺめれゑヶェエケゲセゼテデネヘベペメレヱヶヹ"),
    ('o', "ぉおこごそぞとどのほぼぽもょよろをォオコゴソゾトドノホボポモョヨロヲヺ"),
];

pub static KANA_TO_VOWEL_MAPPING: LazyLock<HashMap<char, char>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (vowel, characters) in VOWEL_TO_KANA_MAPPING {
        for char in characters.chars() {
            map.insert(char, vowel);
        }
    }
    map
});

fn get_prolonged_hiragana(prev_char: char) -> Option<char> {
    match KANA_TO_VOWEL_MAPPING.get(&prev_char)? {
        'a' => Some('あ'),
        'i' => Some('い'),
        'u' | 'o' => Some('う'),
        'e' => Some('え'),
        _ => None,
    }
}

pub fn is_code_point_kana(code_point: u32) -> bool {
    is_code_point_in_ranges(code_point, KANA_RANGES)
}

pub fn is_code_point_japanese(code_point: u32) -> bool {
    is_code_point_in_ranges(code_point, &*JAPANESE_RANGES)
}

pub fn is_string_partially_japanese(text: &str) -> bool {
    text.chars().any(|c| is_code_point_japanese(c as u32))
}

/// `text` truncated before its first non-Japanese character.
pub fn get_japanese_only_text(text: &str) -> &str {
    match text.char_indices().find(|(_, c)| !is_code_point_japanese(*c as u32)) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

pub fn convert_katakana_to_hiragana(text: &str, keep_prolonged_sound_marks: bool) -> String {
    let mut result = String::with_capacity(text.len());
    let offset = KATAKANA_CONVERSION_RANGE.0 - HIRAGANA_CONVERSION_RANGE.0;
    let mut prev: Option<char> = None;

    for char in text.chars() {
        let code_point = char as u32;
        let converted = match code_point {
            KATAKANA_SMALL_KA_CODE_POINT | KATAKANA_SMALL_KE_CODE_POINT => char,
            KANA_PROLONGED_SOUND_MARK_CODE_POINT if !keep_prolonged_sound_marks => prev
                .and_then(get_prolonged_hiragana)
                .unwrap_or(char),
            _ if is_code_point_in_range(code_point, KATAKANA_CONVERSION_RANGE) => {
                char::from_u32(code_point - offset).unwrap_or(char)
            }
            _ => char,
        };
        result.push(converted);
        prev = Some(converted);
    }

    result
}

pub fn convert_hiragana_to_katakana(text: &str) -> String {
    let offset = KATAKANA_CONVERSION_RANGE.0 - HIRAGANA_CONVERSION_RANGE.0;
    text.chars()
        .map(|char| {
            let code_point = char as u32;
            if is_code_point_in_range(code_point, HIRAGANA_CONVERSION_RANGE) {
                char::from_u32(code_point + offset).unwrap_or(char)
            } else {
                char
            }
        })
        .collect()
}

/// Ascii digits to fullwidth digits.
pub fn convert_numeric_to_fullwidth(text: &str) -> String {
    text.chars()
        .map(|char| match char {
            '0'..='9' => char::from_u32(char as u32 + 0xff10 - 0x30).unwrap_or(char),
            _ => char,
        })
        .collect()
}

/// Halfwidth katakana to fullwidth, folding a following (han)dakuten mark
/// into the preceding kana where the combination exists.
pub fn convert_halfwidth_kana_to_fullwidth(text: &str, source_map: &mut TextSourceMap) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut result_len = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let Some(mapping) = HALFWIDTH_KATAKANA_MAP.get(&c) else {
            result.push(c);
            result_len += 1;
            i += 1;
            continue;
        };

        let index = match chars.get(i + 1).map(|&next| next as u32) {
            Some(0xff9e) => 1, // dakuten
            Some(0xff9f) => 2, // handakuten
            _ => 0,
        };

        let combined = match mapping[index] {
            Some(c2) if index > 0 => {
                i += 1;
                source_map.combine(result_len, 1);
                c2
            }
            _ => mapping[0].unwrap_or(c),
        };

        result.push(combined);
        result_len += 1;
        i += 1;
    }

    result
}

pub fn is_emphatic_code_point(code_point: u32) -> bool {
    code_point == HIRAGANA_SMALL_TSU_CODE_POINT
        || code_point == KATAKANA_SMALL_TSU_CODE_POINT
        || code_point == KANA_PROLONGED_SOUND_MARK_CODE_POINT
}

/// Collapses runs of `っ`, `ッ` and `ー` in the middle of `text`.
///
/// Each run is reduced to a single character, or removed entirely when
/// `full_collapse` is set. Leading and trailing emphatics are kept.
pub fn collapse_emphatic_sequences(
    text: &str,
    full_collapse: bool,
    source_map: &mut TextSourceMap,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    let Some(left) = chars.iter().position(|&c| !is_emphatic_code_point(c as u32)) else {
        // whole string is emphatic
        return text.to_string();
    };
    let right = chars
        .iter()
        .rposition(|&c| !is_emphatic_code_point(c as u32))
        .unwrap_or(left);

    let mut result: String = chars[..left].iter().collect();
    let mut result_len = left;
    let mut current_collapsed: Option<char> = None;

    for &char in &chars[left..=right] {
        if is_emphatic_code_point(char as u32) {
            if current_collapsed != Some(char) {
                current_collapsed = Some(char);
                if !full_collapse {
                    result.push(char);
                    result_len += 1;
                    continue;
                }
            }
        } else {
            current_collapsed = None;
            result.push(char);
            result_len += 1;
            continue;
        }
        source_map.combine(result_len.saturating_sub(1), 1);
    }

    result.extend(&chars[right + 1..]);
    result
}

#[cfg(test)]
mod japanese_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kana_conversion() {
        assert_eq!(convert_hiragana_to_katakana("よみちゃん"), "ヨミチャン");
        assert_eq!(convert_katakana_to_hiragana("ヨミチャン", false), "よみちゃん");
        assert_eq!(convert_katakana_to_hiragana("カード", false), "かあど");
        assert_eq!(convert_katakana_to_hiragana("カード", true), "かーど");
        assert_eq!(convert_katakana_to_hiragana("ヵヶ", false), "ヵヶ");
    }

    #[test]
    fn numeric_to_fullwidth() {
        assert_eq!(convert_numeric_to_fullwidth("1月2日abc"), "１月２日abc");
    }

    #[test]
    fn halfwidth_kana_combines_marks() {
        let mut map = TextSourceMap::new("ｶﾞｯｺｳ");
        let result = convert_halfwidth_kana_to_fullwidth("ｶﾞｯｺｳ", &mut map);
        assert_eq!(result, "ガッコウ");
        assert_eq!(map.source_prefix(1), "ｶﾞ");
        assert_eq!(map.source_prefix(4), "ｶﾞｯｺｳ");

        // invalid combination keeps the mark as its own character
        let mut map = TextSourceMap::new("ｱﾞ");
        assert_eq!(convert_halfwidth_kana_to_fullwidth("ｱﾞ", &mut map), "アﾞ");
        assert_eq!(map.mapping(), None);
    }

    #[test]
    fn emphatic_sequences() {
        let mut map = TextSourceMap::new("すっっごーーい");
        let collapsed = collapse_emphatic_sequences("すっっごーーい", false, &mut map);
        assert_eq!(collapsed, "すっごーい");
        assert_eq!(map.source_prefix(collapsed.chars().count()), "すっっごーーい");
        assert_eq!(map.source_prefix(2), "すっっ");

        let mut map = TextSourceMap::new("すっっごーーい");
        let collapsed = collapse_emphatic_sequences("すっっごーーい", true, &mut map);
        assert_eq!(collapsed, "すごい");
        assert_eq!(map.source_prefix(1), "すっっ");
        assert_eq!(map.source_prefix(2), "すっっごーー");

        let mut map = TextSourceMap::new("っっ");
        assert_eq!(collapse_emphatic_sequences("っっ", true, &mut map), "っっ");
        let mut map = TextSourceMap::new("ーすごいっ");
        assert_eq!(collapse_emphatic_sequences("ーすごいっ", true, &mut map), "ーすごいっ");
    }

    #[test]
    fn japanese_detection() {
        assert!(is_code_point_kana('か' as u32));
        assert!(is_code_point_japanese('漢' as u32));
        assert!(!is_code_point_japanese('a' as u32));
        assert!(is_string_partially_japanese("abc字"));
        assert_eq!(get_japanese_only_text("読むbook"), "読む");
        assert_eq!(get_japanese_only_text("book"), "");
        assert_eq!(get_japanese_only_text("読む"), "読む");
    }
}
