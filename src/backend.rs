use std::sync::Arc;

use fancy_regex::Regex;
use indexmap::IndexSet;

use crate::{
    database::dictionary_database::DictionaryDatabase,
    deinflector::Deinflector,
    errors::YomichanError,
    settings::{
        ProfileOptions, TranslationOptions, TranslationTextReplacementGroup, YomichanOptions,
    },
    text_scanner::TextScanner,
    translation::{
        EnabledDictionaryMap, FindKanjiDictionary, FindKanjiOptions, FindTermDictionary,
        FindTermsMatchType, FindTermsMode, FindTermsOptions, FindTermsTextReplacement,
        FindTermsTextReplacements, KanjiEnabledDictionaryMap,
    },
};

/// `yomichan_lookup` private engine
pub struct Backend {
    pub text_scanner: TextScanner,
    pub db: Arc<DictionaryDatabase>,
    pub options: YomichanOptions,
}

impl Backend {
    pub fn new(db: Arc<DictionaryDatabase>, options: YomichanOptions) -> Result<Self, YomichanError> {
        let deinflector = Deinflector::japanese()?;
        let text_scanner = TextScanner::new(db.clone(), deinflector)?;
        Ok(Self {
            text_scanner,
            db,
            options,
        })
    }
}

/// Per-call overrides of the profile's scanning options.
///
/// `None` keeps the profile's value, so the default overrides nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindTermsDetails {
    pub match_type: Option<FindTermsMatchType>,
    pub deinflect: Option<bool>,
}

/// Builds the translator options for a term lookup from a profile.
///
/// Enabled dictionaries keep the profile's order, which becomes their
/// dictionary index. In [FindTermsMode::Merge] the main dictionary is always
/// searched; if the profile disables it, its definitions are excluded from
/// the output.
pub fn find_terms_options(
    mode: FindTermsMode,
    details: &FindTermsDetails,
    options: &ProfileOptions,
) -> FindTermsOptions {
    let FindTermsDetails {
        match_type,
        deinflect,
    } = details;
    let ProfileOptions {
        general,
        scanning,
        translation,
        ..
    } = options;
    let TranslationOptions {
        convert_half_width_characters,
        convert_numeric_characters,
        convert_alphabetic_characters,
        convert_hiragana_to_katakana,
        convert_katakana_to_hiragana,
        collapse_emphatic_sequences,
        remove_non_japanese_characters,
        ..
    } = translation;

    let mut enabled_dictionary_map = get_translator_enabled_dictionary_map(options);
    let mut exclude_dictionary_definitions = None;
    if mode == FindTermsMode::Merge
        && !general.main_dictionary.is_empty()
        && !enabled_dictionary_map.contains_key(&general.main_dictionary)
    {
        let index = enabled_dictionary_map.len();
        enabled_dictionary_map.insert(
            general.main_dictionary.clone(),
            FindTermDictionary {
                index,
                priority: 0,
                alias: general.main_dictionary.clone(),
                allow_secondary_searches: false,
            },
        );
        exclude_dictionary_definitions = Some(IndexSet::from([general.main_dictionary.clone()]));
    }

    FindTermsOptions {
        match_type: match_type.unwrap_or(scanning.match_type),
        deinflect: deinflect.unwrap_or(scanning.deinflect),
        main_dictionary: general.main_dictionary.clone(),
        sort_frequency_dictionary: general.sort_frequency_dictionary.clone(),
        sort_frequency_dictionary_order: general.sort_frequency_dictionary_order,
        remove_non_japanese_characters: *remove_non_japanese_characters,
        convert_half_width_characters: *convert_half_width_characters,
        convert_numeric_characters: *convert_numeric_characters,
        convert_alphabetic_characters: *convert_alphabetic_characters,
        convert_hiragana_to_katakana: *convert_hiragana_to_katakana,
        convert_katakana_to_hiragana: *convert_katakana_to_hiragana,
        collapse_emphatic_sequences: *collapse_emphatic_sequences,
        text_replacements: get_translator_text_replacements(translation),
        enabled_dictionary_map,
        exclude_dictionary_definitions,
    }
}

pub fn find_kanji_options(options: &ProfileOptions) -> FindKanjiOptions {
    let enabled_dictionary_map: KanjiEnabledDictionaryMap = options
        .dictionaries
        .values()
        .filter(|dictionary| dictionary.enabled)
        .enumerate()
        .map(|(index, dictionary)| {
            (
                dictionary.name.clone(),
                FindKanjiDictionary {
                    index,
                    priority: dictionary.priority,
                    alias: dictionary.alias.clone(),
                },
            )
        })
        .collect::<indexmap::IndexMap<_, _>>()
        .into();
    FindKanjiOptions {
        enabled_dictionary_map,
        remove_non_japanese_characters: options.translation.remove_non_japanese_characters,
    }
}

fn get_translator_enabled_dictionary_map(options: &ProfileOptions) -> EnabledDictionaryMap {
    options
        .dictionaries
        .values()
        .filter(|dictionary| dictionary.enabled)
        .enumerate()
        .map(|(index, dictionary)| {
            (
                dictionary.name.clone(),
                FindTermDictionary {
                    index,
                    priority: dictionary.priority,
                    alias: dictionary.alias.clone(),
                    allow_secondary_searches: dictionary.allow_secondary_searches,
                },
            )
        })
        .collect::<indexmap::IndexMap<_, _>>()
        .into()
}

/// Compiles the profile's replacement groups.
///
/// Patterns that fail to compile are skipped, and groups left empty are dropped.
fn get_translator_text_replacements(translation: &TranslationOptions) -> FindTermsTextReplacements {
    let mut text_replacements: FindTermsTextReplacements = translation
        .text_replacements
        .groups
        .iter()
        .filter_map(|group| {
            let replacements: Vec<FindTermsTextReplacement> =
                group.iter().filter_map(compile_text_replacement).collect();
            (!replacements.is_empty()).then_some(Some(replacements))
        })
        .collect();
    if text_replacements.is_empty() || translation.text_replacements.search_original {
        text_replacements.insert(0, None);
    }
    text_replacements
}

fn compile_text_replacement(
    group: &TranslationTextReplacementGroup,
) -> Option<FindTermsTextReplacement> {
    let TranslationTextReplacementGroup {
        pattern,
        ignore_case,
        replacement,
    } = group;
    let source = if *ignore_case {
        format!("(?i){pattern}")
    } else {
        pattern.clone()
    };
    match Regex::new(&source) {
        Ok(regex) => Some(FindTermsTextReplacement::new(regex, replacement.clone(), true)),
        Err(e) => {
            log::warn!("skipping text replacement `{pattern}`: {e}");
            None
        }
    }
}

#[cfg(test)]
mod backend_tests {
    use pretty_assertions::assert_eq;

    use super::{find_kanji_options, find_terms_options, FindTermsDetails};
    use crate::{
        dictionary::TermSourceMatchType,
        settings::{ResultOutputMode, TranslationTextReplacementGroup},
        test_utils,
        translation::FindTermsMode,
    };

    fn group(pattern: &str, replacement: &str, ignore_case: bool) -> TranslationTextReplacementGroup {
        TranslationTextReplacementGroup {
            pattern: pattern.into(),
            ignore_case,
            replacement: replacement.into(),
        }
    }

    #[test]
    fn enabled_dictionaries_keep_profile_order() {
        let mut options = test_utils::profile_options(&["a", "b", "c"]);
        options.dictionaries["b"].enabled = false;
        options.dictionaries["c"].priority = 3;
        options.dictionaries["c"].allow_secondary_searches = true;

        let find = find_terms_options(FindTermsMode::Group, &FindTermsDetails::default(), &options);
        let names: Vec<(&str, usize, i64)> = find
            .enabled_dictionary_map
            .iter()
            .map(|(name, info)| (name.as_str(), info.index, info.priority))
            .collect();
        assert_eq!(names, vec![("a", 0, 0), ("c", 1, 3)]);
        assert_eq!(find.enabled_dictionary_map.secondary_search_dictionaries().len(), 1);
        assert!(find.exclude_dictionary_definitions.is_none());

        let kanji = find_kanji_options(&options);
        assert_eq!(kanji.enabled_dictionary_map.dictionary_order("c"), (1, 3));
    }

    #[test]
    fn details_override_scanning() {
        let mut options = test_utils::profile_options(&["a"]);
        options.scanning.deinflect = false;
        let find = find_terms_options(
            FindTermsMode::Group,
            &FindTermsDetails {
                match_type: Some(TermSourceMatchType::Prefix),
                deinflect: None,
            },
            &options,
        );
        assert_eq!(find.match_type, TermSourceMatchType::Prefix);
        assert!(!find.deinflect);
    }

    #[test]
    fn default_details_keep_the_profile_scanning_options() {
        let mut options = test_utils::profile_options(&["a"]);
        options.scanning.deinflect = false;
        options.scanning.match_type = TermSourceMatchType::Suffix;
        let find = find_terms_options(FindTermsMode::Group, &FindTermsDetails::default(), &options);
        assert_eq!(find.match_type, TermSourceMatchType::Suffix);
        assert!(!find.deinflect);
    }

    #[test]
    fn disabled_main_dictionary_is_searched_but_excluded() {
        let mut options = test_utils::profile_options(&["jmdict", "other"]);
        options.general.result_output_mode = ResultOutputMode::Merge;
        options.general.main_dictionary = "jmdict".into();
        options.dictionaries["jmdict"].enabled = false;

        let find = find_terms_options(FindTermsMode::Merge, &FindTermsDetails::default(), &options);
        assert_eq!(find.enabled_dictionary_map.dictionary_order("jmdict"), (1, 0));
        let excluded = find.exclude_dictionary_definitions.unwrap();
        assert!(excluded.contains("jmdict"));

        let find = find_terms_options(FindTermsMode::Group, &FindTermsDetails::default(), &options);
        assert!(!find.enabled_dictionary_map.contains_key("jmdict"));
    }

    #[test]
    fn text_replacement_groups() {
        let mut options = test_utils::profile_options(&["a"]);
        let find = find_terms_options(FindTermsMode::Group, &FindTermsDetails::default(), &options);
        assert_eq!(find.text_replacements.len(), 1);
        assert!(find.text_replacements[0].is_none());

        options.translation.text_replacements.groups = vec![
            vec![group("ABC", "abc", true), group("(unclosed", "", false)],
            vec![group("[", "", false)],
        ];
        let find = find_terms_options(FindTermsMode::Group, &FindTermsDetails::default(), &options);
        assert_eq!(find.text_replacements.len(), 1);
        let replacements = find.text_replacements[0].as_ref().unwrap();
        assert_eq!(replacements.len(), 1);
        assert!(replacements[0].pattern.is_match("xabcx").unwrap());
        assert!(replacements[0].is_global);

        options.translation.text_replacements.search_original = true;
        let find = find_terms_options(FindTermsMode::Group, &FindTermsDetails::default(), &options);
        assert_eq!(find.text_replacements.len(), 2);
        assert!(find.text_replacements[0].is_none());
    }
}
