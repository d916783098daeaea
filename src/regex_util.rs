use fancy_regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::translation_internal::TextSourceMap;

static MATCH_REPLACEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\$|&|`|'|(\d\d?)|<([^>]*)>)").expect("invalid match replacement pattern")
});

/// Replaces the first (or every, when `is_global`) match of `pattern` in `text`.
///
/// `replacement` understands the javascript `String.prototype.replace`
/// substitutions (`$1`, `$<name>`, `$&`, `` $` ``, `$'`, `$$`). `source_map`
/// is updated so that each replacement maps back onto the matched text.
pub fn apply_text_replacement(
    text: &str,
    source_map: &mut TextSourceMap,
    pattern: &Regex,
    replacement: &str,
    is_global: bool,
) -> Result<String, fancy_regex::Error> {
    let mut current_text = text.to_string();
    let mut current_pos = 0;

    while current_pos <= current_text.len() {
        let (match_start, match_end, actual_replacement) = {
            let Some(captures) = pattern.captures_from_pos(&current_text, current_pos)? else {
                break;
            };
            let Some(whole) = captures.get(0) else {
                break;
            };
            (
                whole.start(),
                whole.end(),
                apply_match_replacement(replacement, &captures, &current_text),
            )
        };

        let index = current_text[..match_start].chars().count();
        let match_length = current_text[match_start..match_end].chars().count();
        let replacement_length = actual_replacement.chars().count();
        if replacement_length > 0 {
            source_map.insert(index, &vec![0; replacement_length]);
            source_map.combine(index + replacement_length - 1, match_length);
        } else {
            source_map.combine(index, match_length);
        }

        let mut new_text = String::with_capacity(
            current_text.len() - (match_end - match_start) + actual_replacement.len(),
        );
        new_text.push_str(&current_text[..match_start]);
        new_text.push_str(&actual_replacement);
        new_text.push_str(&current_text[match_end..]);
        current_text = new_text;

        if !is_global {
            break;
        }
        current_pos = match_start + actual_replacement.len();
        if match_start == match_end {
            // step over one char so an empty match cannot repeat
            match current_text[current_pos..].chars().next() {
                Some(c) => current_pos += c.len_utf8(),
                None => break,
            }
        }
    }

    Ok(current_text)
}

pub fn apply_match_replacement(
    replacement_pattern_input: &str,
    outer_captures: &Captures,
    original_text_at_match_time: &str,
) -> String {
    let (match_start, match_end, match_str) = outer_captures
        .get(0)
        .map_or((0, 0, ""), |m| (m.start(), m.end(), m.as_str()));

    MATCH_REPLACEMENT_PATTERN
        .replace_all(replacement_pattern_input, |inner_caps: &Captures| {
            let g0_match_str = &inner_caps[0];

            if let Some(g1_digit_match) = inner_caps.get(1) {
                if let Ok(idx) = g1_digit_match.as_str().parse::<usize>() {
                    if idx > 0 && idx < outer_captures.len() {
                        return outer_captures
                            .get(idx)
                            .map_or(String::new(), |m| m.as_str().to_string());
                    }
                }
                g0_match_str.to_string()
            } else if let Some(g2_name_match) = inner_caps.get(2) {
                match outer_captures.name(g2_name_match.as_str()) {
                    Some(named_capture) => named_capture.as_str().to_string(),
                    None => g0_match_str.to_string(),
                }
            } else {
                match g0_match_str {
                    "$$" => "$".to_string(),
                    "$&" => match_str.to_string(),
                    "$`" => original_text_at_match_time[..match_start].to_string(),
                    "$'" => original_text_at_match_time[match_end..].to_string(),
                    _ => g0_match_str.to_string(),
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod regex_util_tests {
    use super::apply_text_replacement;
    use crate::translation_internal::TextSourceMap;
    use fancy_regex::Regex;
    use pretty_assertions::assert_eq;

    fn replace(text: &str, pattern: &str, replacement: &str, global: bool) -> (String, TextSourceMap) {
        let mut map = TextSourceMap::new(text);
        let regex = Regex::new(pattern).unwrap();
        let result = apply_text_replacement(text, &mut map, &regex, replacement, global).unwrap();
        (result, map)
    }

    #[test]
    fn substitutions() {
        assert_eq!(replace("abcabc", "b", "X", false).0, "aXcabc");
        assert_eq!(replace("abcabc", "b", "X", true).0, "aXcaXc");
        assert_eq!(replace("2024-05", r"(\d+)-(\d+)", "$2/$1", false).0, "05/2024");
        assert_eq!(replace("key=val", r"(?P<k>\w+)=(?P<v>\w+)", "$<v>:$<k>", false).0, "val:key");
        assert_eq!(replace("abc", "b", "[$&$$]", false).0, "a[b$]c");
        assert_eq!(replace("abc", "b", "$`$'", false).0, "aacc");
    }

    #[test]
    fn source_map_tracks_replacements() {
        // shrinking: "ーー" -> "ー"
        let (result, map) = replace("すーーい", "ー+", "ー", false);
        assert_eq!(result, "すーい");
        assert_eq!(map.source_prefix(2), "すーー");

        // removal folds into the matched position
        let (result, map) = replace("a(b)c", r"\(|\)", "", true);
        assert_eq!(result, "abc");
        assert_eq!(map.source_prefix(3), "a(b)c");

        // growing: every replacement char but the last maps to nothing
        let (result, map) = replace("xy", "x", "abc", false);
        assert_eq!(result, "abcy");
        assert_eq!(map.source_prefix(2), "");
        assert_eq!(map.source_prefix(3), "x");
    }

    #[test]
    fn empty_global_matches_terminate() {
        assert_eq!(replace("ab", "", "-", true).0, "-a-b-");
    }
}
