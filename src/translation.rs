use derive_more::{Deref, DerefMut, From};
use fancy_regex::Regex;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{
    database::dictionary_database::DictionarySet,
    dictionary::TermSourceMatchType,
    settings::{TranslationCollapseEmphaticSequences, TranslationConvertType},
};

// Kanji

/// An options object for use with `Translator::find_kanji`.
#[derive(Debug, Clone, Default)]
pub struct FindKanjiOptions {
    /// The mapping of dictionaries to search for kanji in.
    /// The key is the dictionary name.
    pub enabled_dictionary_map: KanjiEnabledDictionaryMap,
    /// Whether or not non-Japanese characters should be searched.
    pub remove_non_japanese_characters: bool,
}

/// Details about a dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindKanjiDictionary {
    /// The index of the dictionary
    pub index: usize,
    /// The priority of the dictionary
    pub priority: i64,
    /// The alias of the dictionary
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, From, Deref, DerefMut)]
pub struct KanjiEnabledDictionaryMap(pub IndexMap<String, FindKanjiDictionary>);

impl KanjiEnabledDictionaryMap {
    /// `(index, priority)` of a dictionary; unknown dictionaries sort last.
    pub fn dictionary_order(&self, dictionary: &str) -> (usize, i64) {
        match self.0.get(dictionary) {
            Some(info) => (info.index, info.priority),
            None => (self.0.len(), 0),
        }
    }
}

impl DictionarySet for KanjiEnabledDictionaryMap {
    fn has(&self, value: &str) -> bool {
        self.0.contains_key(value)
    }
}

// Terms

/// How the translator shapes its results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FindTermsMode {
    /// Ungrouped entries with only the sort-frequency metadata and no tags.
    Simple,
    /// Entries grouped by headword.
    #[default]
    Group,
    /// Entries merged by the main dictionary's sequence numbers.
    Merge,
    /// One entry per definition.
    Split,
}

/// An options object for use with `Translator::find_terms`.
#[derive(Debug, Clone)]
pub struct FindTermsOptions {
    /// The matching type for looking up terms.
    pub match_type: FindTermsMatchType,
    /// Whether or not deinflection should be performed.
    pub deinflect: bool,
    /// The name of the primary dictionary to search.
    pub main_dictionary: String,
    /// The name of the frequency dictionary used for sorting
    pub sort_frequency_dictionary: Option<String>,
    /// The order used when using a sorting dictionary.
    pub sort_frequency_dictionary_order: FindTermsSortOrder,
    /// Whether or not non-Japanese characters should be searched.
    pub remove_non_japanese_characters: bool,
    /// Whether or not half-width characters should be converted to full-width characters.
    pub convert_half_width_characters: TranslationConvertType,
    /// Whether or not ASCII numeric characters should be converted to full-width numeric characters.
    pub convert_numeric_characters: TranslationConvertType,
    /// Whether or not alphabetic characters should be converted to kana.
    pub convert_alphabetic_characters: TranslationConvertType,
    /// Whether or not hiragana characters should be converted to katakana.
    pub convert_hiragana_to_katakana: TranslationConvertType,
    /// Whether or not katakana characters should be converted to hiragana.
    pub convert_katakana_to_hiragana: TranslationConvertType,
    /// How emphatic character sequences should be collapsed.
    pub collapse_emphatic_sequences: TranslationCollapseEmphaticSequences,
    /// Text replacement groups; `None` stands for the unmodified text.
    pub text_replacements: FindTermsTextReplacements,
    /// The mapping of dictionaries to search for terms in.
    /// The key is the dictionary name.
    pub enabled_dictionary_map: EnabledDictionaryMap,
    /// A set of dictionary names which should have definitions removed.
    pub exclude_dictionary_definitions: Option<IndexSet<String>>,
}

impl Default for FindTermsOptions {
    fn default() -> Self {
        Self {
            match_type: TermSourceMatchType::Exact,
            deinflect: true,
            main_dictionary: String::new(),
            sort_frequency_dictionary: None,
            sort_frequency_dictionary_order: FindTermsSortOrder::Descending,
            remove_non_japanese_characters: false,
            convert_half_width_characters: TranslationConvertType::False,
            convert_numeric_characters: TranslationConvertType::False,
            convert_alphabetic_characters: TranslationConvertType::False,
            convert_hiragana_to_katakana: TranslationConvertType::False,
            convert_katakana_to_hiragana: TranslationConvertType::False,
            collapse_emphatic_sequences: TranslationCollapseEmphaticSequences::False,
            text_replacements: vec![None],
            enabled_dictionary_map: EnabledDictionaryMap::default(),
            exclude_dictionary_definitions: None,
        }
    }
}

/// The matching type for looking up terms.
pub type FindTermsMatchType = TermSourceMatchType;

/// A sorting order to use when finding terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindTermsSortOrder {
    Ascending,
    #[default]
    Descending,
}

/// A single regex replacement applied to the searched text.
#[derive(Debug, Clone)]
pub struct FindTermsTextReplacement {
    pub pattern: Regex,
    pub replacement: String,
    /// Replace every match instead of only the first.
    pub is_global: bool,
}

impl FindTermsTextReplacement {
    pub fn new(pattern: Regex, replacement: impl Into<String>, is_global: bool) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
            is_global,
        }
    }
}

/// Each group is applied in order to one text variant; `None` leaves the text unmodified.
pub type FindTermsTextReplacements = Vec<Option<Vec<FindTermsTextReplacement>>>;

/// Details about a dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindTermDictionary {
    /// The index of the dictionary
    pub index: usize,
    /// The priority of the dictionary
    pub priority: i64,
    /// The alias of the dictionary
    pub alias: String,
    /// Whether or not secondary term searches are allowed for this dictionary.
    pub allow_secondary_searches: bool,
}

/// Enabled dictionaries, keyed by name, in priority order.
#[derive(Debug, Clone, Default, PartialEq, From, Deref, DerefMut)]
pub struct EnabledDictionaryMap(pub IndexMap<String, FindTermDictionary>);

impl EnabledDictionaryMap {
    /// Builds a map with consecutive indices and zero priority.
    pub fn from_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        let map = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let name = name.as_ref().to_string();
                let details = FindTermDictionary {
                    index,
                    priority: 0,
                    alias: name.clone(),
                    allow_secondary_searches: false,
                };
                (name, details)
            })
            .collect();
        Self(map)
    }

    /// `(index, priority)` of a dictionary; unknown dictionaries sort last.
    pub fn dictionary_order(&self, dictionary: &str) -> (usize, i64) {
        match self.0.get(dictionary) {
            Some(info) => (info.index, info.priority),
            None => (self.0.len(), 0),
        }
    }

    pub fn dictionary_alias<'a>(&'a self, dictionary: &'a str) -> &'a str {
        self.0
            .get(dictionary)
            .map_or(dictionary, |info| info.alias.as_str())
    }

    /// Dictionaries that accept secondary searches, as a new map.
    pub fn secondary_search_dictionaries(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, info)| info.allow_secondary_searches)
                .map(|(name, info)| (name.clone(), info.clone()))
                .collect(),
        )
    }
}

impl DictionarySet for EnabledDictionaryMap {
    fn has(&self, value: &str) -> bool {
        self.0.contains_key(value)
    }
}
