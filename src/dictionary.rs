use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{database::dictionary_rows::RowId, dictionary_data::TermGlossary};

/// Enum representing what database field was used to match the source term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TermSourceMatchSource {
    Term,
    Reading,
    Sequence,
}

/// Enum representing how the search term relates to the final term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TermSourceMatchType {
    #[default]
    Exact,
    Prefix,
    Suffix,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DictionaryEntry {
    Kanji(KanjiDictionaryEntry),
    Term(TermDictionaryEntry),
}

/// A tag represents some brief information about part of a dictionary entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryTag {
    /// The name of the tag.
    pub name: String,
    /// The category of the tag.
    pub category: String,
    /// A number indicating the sorting order of the tag.
    pub order: i64,
    /// A score value for the tag.
    pub score: i64,
    /// An array of descriptions for the tag. If there are multiple entries,
    /// the values will typically have originated from different dictionaries.
    /// However, there is no correlation between the length of this array and
    /// the length of the `dictionaries` field, as duplicates are removed.
    pub content: Vec<String>,
    /// An array of dictionary names that contained a tag with this name and category.
    pub dictionaries: Vec<String>,
    /// Whether or not this tag is redundant with previous tags.
    pub redundant: bool,
}

impl DictionaryTag {
    /// A tag with no metadata yet; the tag resolver fills it in.
    pub fn new_default(name: impl Into<String>, dictionary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: "default".to_string(),
            order: 0,
            score: 0,
            content: vec![],
            dictionaries: vec![dictionary.into()],
            redundant: false,
        }
    }
}

/// Tag names awaiting resolution against one dictionary's tag bank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroup {
    pub dictionary: String,
    pub tag_names: Vec<String>,
}

/// The information about how a term was looked up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSource {
    /// The original text that was searched.
    pub original_text: String,
    /// The original text after being transformed, but before applying deinflections.
    pub transformed_text: String,
    /// The final text after applying deinflections.
    pub deinflected_text: String,
    pub match_type: TermSourceMatchType,
    pub match_source: TermSourceMatchSource,
    /// Whether or not this source is a primary source. Primary sources are derived
    /// from the original search text, while non-primary sources originate from
    /// related terms.
    pub is_primary: bool,
}

/// A headword is a term, its reading, and the ways it was found.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermHeadword {
    /// The original order of the headword, which is usually used for sorting.
    pub index: usize,
    pub term: String,
    pub reading: String,
    pub sources: Vec<TermSource>,
    pub tags: Vec<DictionaryTag>,
    #[serde(skip)]
    pub tag_groups: Vec<TagGroup>,
    /// Rules from the dictionary row, e.g. `v5`.
    pub word_classes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermDefinition {
    /// The original order of the definition, which is usually used for sorting.
    pub index: usize,
    /// Indices of the headwords this definition applies to.
    pub headword_indices: Vec<usize>,
    pub dictionary: String,
    pub dictionary_index: usize,
    pub dictionary_priority: i64,
    /// Database ids of the rows this definition came from.
    pub id: RowId,
    pub score: i64,
    pub frequency_order: f64,
    pub sequences: Vec<i64>,
    pub is_primary: bool,
    pub tags: Vec<DictionaryTag>,
    #[serde(skip)]
    pub tag_groups: Vec<TagGroup>,
    pub entries: Vec<TermGlossary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitchAccent {
    pub position: i64,
    pub nasal_positions: Vec<i64>,
    pub devoice_positions: Vec<i64>,
    pub tags: Vec<DictionaryTag>,
    #[serde(skip)]
    pub tag_groups: Vec<TagGroup>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermPronunciation {
    pub index: usize,
    pub headword_index: usize,
    pub dictionary: String,
    pub dictionary_index: usize,
    pub dictionary_priority: i64,
    pub pitches: Vec<PitchAccent>,
}

/// Frequency information corresponds to how frequently a term appears in a corpus,
/// which can be a number of occurrences or an overall rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermFrequency {
    pub index: usize,
    pub headword_index: usize,
    pub dictionary: String,
    pub dictionary_index: usize,
    pub dictionary_priority: i64,
    /// Whether the frequency row was restricted to a reading.
    pub has_reading: bool,
    pub frequency: f64,
    pub display_value: Option<String>,
    /// Whether `frequency` was parsed out of `display_value`.
    pub display_value_parsed: bool,
}

/// A term frequency returned by
/// [Translator::get_term_frequencies](crate::translator::Translator::get_term_frequencies).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermFrequencySimple {
    pub term: String,
    pub reading: Option<String>,
    pub dictionary: String,
    pub has_reading: bool,
    pub frequency: f64,
    pub display_value: Option<String>,
    pub display_value_parsed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermDictionaryEntry {
    /// Whether or not any of the sources is a primary source.
    pub is_primary: bool,
    /// Deinflection reasons, outermost first.
    pub inflections: Vec<String>,
    pub score: i64,
    pub frequency_order: f64,
    pub dictionary_index: usize,
    pub dictionary_priority: i64,
    /// Number of primary sources that exactly match the headword's term.
    pub source_term_exact_match_count: usize,
    /// Character length of the longest primary transformed text.
    pub max_transformed_text_length: usize,
    pub headwords: Vec<TermHeadword>,
    pub definitions: Vec<TermDefinition>,
    pub pronunciations: Vec<TermPronunciation>,
    pub frequencies: Vec<TermFrequency>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KanjiStat {
    pub name: String,
    pub category: String,
    pub content: String,
    pub order: i64,
    pub score: i64,
    pub dictionary: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KanjiFrequency {
    pub index: usize,
    pub dictionary: String,
    pub dictionary_index: usize,
    pub dictionary_priority: i64,
    pub character: String,
    pub frequency: f64,
    pub display_value: Option<String>,
    pub display_value_parsed: bool,
}

/// Stats keyed by tag category.
pub type KanjiStatGroups = IndexMap<String, Vec<KanjiStat>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KanjiDictionaryEntry {
    pub character: String,
    pub dictionary: String,
    pub dictionary_index: usize,
    pub dictionary_priority: i64,
    pub onyomi: Vec<String>,
    pub kunyomi: Vec<String>,
    pub tags: Vec<DictionaryTag>,
    #[serde(skip)]
    pub tag_groups: Vec<TagGroup>,
    pub stats: KanjiStatGroups,
    pub definitions: Vec<String>,
    pub frequencies: Vec<KanjiFrequency>,
}
