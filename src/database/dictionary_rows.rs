use indexmap::IndexMap;
use native_db::*;
use native_model::{native_model, rmp_serde_1_3::RmpSerdeNamed, Model};
use serde::{Deserialize, Serialize};

use crate::{
    dictionary::{TermSourceMatchSource, TermSourceMatchType},
    dictionary_data::{DictionarySummary, GenericFreqData, TermGlossary, TermMetaData},
};

/// Store assigned row identifier. Unique across every table of one store.
pub type RowId = u64;

/// A row delivered by an importer.
///
/// Every variant carries the name of the dictionary that owns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "row", rename_all = "camelCase")]
pub enum DictionaryRow {
    Term(DatabaseTermEntry),
    Kanji(DatabaseKanjiEntry),
    TermMeta(DatabaseTermMeta),
    KanjiMeta(DatabaseKanjiMeta),
    Tag(DatabaseTag),
    Media(DatabaseMedia),
}

impl DictionaryRow {
    pub fn dictionary(&self) -> &str {
        match self {
            DictionaryRow::Term(row) => &row.dictionary,
            DictionaryRow::Kanji(row) => &row.dictionary,
            DictionaryRow::TermMeta(row) => &row.dictionary,
            DictionaryRow::KanjiMeta(row) => &row.dictionary,
            DictionaryRow::Tag(row) => &row.dictionary,
            DictionaryRow::Media(row) => &row.dictionary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[native_model(id = 1, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DatabaseTermEntry {
    #[primary_key]
    #[serde(default)]
    pub id: RowId,
    #[secondary_key]
    pub expression: String,
    #[secondary_key]
    pub reading: String,
    /// Derived from `expression` on insert when empty.
    #[secondary_key]
    #[serde(default)]
    pub expression_reverse: String,
    /// Derived from `reading` on insert when empty.
    #[secondary_key]
    #[serde(default)]
    pub reading_reverse: String,
    #[serde(default)]
    pub definition_tags: Option<String>,
    /// Legacy alias for the `definitionTags` field.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub score: i64,
    pub glossary: Vec<TermGlossary>,
    #[secondary_key]
    #[serde(default)]
    pub sequence: Option<i64>,
    #[serde(default)]
    pub term_tags: Option<String>,
    #[secondary_key]
    pub dictionary: String,
}

impl DatabaseTermEntry {
    /// Converts a row matched through `expression` or `reading` into a [TermEntry].
    ///
    /// `index_index == 0` is the expression index, anything else the reading one.
    /// The match type is upgraded to [TermSourceMatchType::Exact] when the
    /// matched field equals the queried text.
    pub fn into_term_generic(
        self,
        match_type: TermSourceMatchType,
        data: FindMultiBulkData<'_>,
    ) -> TermEntry {
        let match_source = match data.index_index {
            0 => TermSourceMatchSource::Term,
            _ => TermSourceMatchSource::Reading,
        };
        let matched_field = match match_source {
            TermSourceMatchSource::Term => &self.expression,
            _ => &self.reading,
        };
        let match_type = if matched_field == data.item {
            TermSourceMatchType::Exact
        } else {
            match_type
        };
        self.into_term_entry_specific(match_source, match_type, data.item_index)
    }

    pub fn into_term_entry_specific(
        self,
        match_source: TermSourceMatchSource,
        match_type: TermSourceMatchType,
        index: usize,
    ) -> TermEntry {
        let DatabaseTermEntry {
            id,
            expression,
            reading,
            definition_tags,
            tags,
            rules,
            score,
            glossary,
            sequence,
            term_tags,
            dictionary,
            ..
        } = self;
        TermEntry {
            id,
            index,
            match_type,
            match_source,
            term: expression,
            reading,
            definition_tags: split_optional_string_field(definition_tags.or(tags)),
            term_tags: split_optional_string_field(term_tags),
            rules: split_string_field(&rules),
            definitions: glossary,
            score,
            dictionary,
            sequence: sequence.unwrap_or(-1),
        }
    }
}

/// A term row as handed to the translator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub id: RowId,
    /// Index of the query item that produced this row.
    pub index: usize,
    pub match_type: TermSourceMatchType,
    pub match_source: TermSourceMatchSource,
    pub term: String,
    pub reading: String,
    pub definition_tags: Vec<String>,
    pub term_tags: Vec<String>,
    pub rules: Vec<String>,
    pub definitions: Vec<TermGlossary>,
    pub score: i64,
    pub dictionary: String,
    /// `-1` when the row has no sequence.
    pub sequence: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DatabaseTermMeta {
    #[primary_key]
    #[serde(default)]
    pub id: RowId,
    #[secondary_key]
    pub expression: String,
    pub data: TermMetaData,
    #[secondary_key]
    pub dictionary: String,
}

/// A term meta row as handed to the translator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermMetaEntry {
    pub index: usize,
    pub term: String,
    pub data: TermMetaData,
    pub dictionary: String,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[native_model(id = 3, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DatabaseKanjiEntry {
    #[primary_key]
    #[serde(default)]
    pub id: RowId,
    #[secondary_key]
    pub character: String,
    #[serde(default)]
    pub onyomi: String,
    #[serde(default)]
    pub kunyomi: String,
    #[serde(default)]
    pub tags: String,
    pub meanings: Vec<String>,
    #[serde(default)]
    pub stats: IndexMap<String, String>,
    #[secondary_key]
    pub dictionary: String,
}

/// A kanji row as handed to the translator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KanjiEntry {
    pub index: usize,
    pub character: String,
    pub onyomi: Vec<String>,
    pub kunyomi: Vec<String>,
    pub tags: Vec<String>,
    pub definitions: Vec<String>,
    pub stats: IndexMap<String, String>,
    pub dictionary: String,
}

impl DatabaseKanjiEntry {
    pub fn into_kanji_entry(self, index: usize) -> KanjiEntry {
        let DatabaseKanjiEntry {
            character,
            onyomi,
            kunyomi,
            tags,
            meanings,
            stats,
            dictionary,
            ..
        } = self;
        KanjiEntry {
            index,
            character,
            onyomi: split_string_field(&onyomi),
            kunyomi: split_string_field(&kunyomi),
            tags: split_string_field(&tags),
            definitions: meanings,
            stats,
            dictionary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[native_model(id = 4, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DatabaseKanjiMeta {
    #[primary_key]
    #[serde(default)]
    pub id: RowId,
    #[secondary_key]
    pub character: String,
    pub frequency: GenericFreqData,
    #[secondary_key]
    pub dictionary: String,
}

/// A kanji meta row as handed to the translator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KanjiMetaEntry {
    pub index: usize,
    pub character: String,
    pub frequency: GenericFreqData,
    pub dictionary: String,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[native_model(id = 5, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DatabaseTag {
    #[primary_key]
    #[serde(default)]
    pub id: RowId,
    #[secondary_key]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub score: i64,
    #[secondary_key]
    pub dictionary: String,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[native_model(id = 6, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DatabaseMedia {
    #[primary_key]
    #[serde(default)]
    pub id: RowId,
    #[secondary_key]
    pub path: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    pub content: Vec<u8>,
    #[secondary_key]
    pub dictionary: String,
}

/// Everything an importer produced for a single dictionary.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDictData {
    pub summary: DictionarySummary,
    #[serde(default)]
    pub term_list: Vec<DatabaseTermEntry>,
    #[serde(default)]
    pub term_meta_list: Vec<DatabaseTermMeta>,
    #[serde(default)]
    pub kanji_list: Vec<DatabaseKanjiEntry>,
    #[serde(default)]
    pub kanji_meta_list: Vec<DatabaseKanjiMeta>,
    #[serde(default)]
    pub tag_list: Vec<DatabaseTag>,
    #[serde(default)]
    pub media_list: Vec<DatabaseMedia>,
}

impl DatabaseDictData {
    pub fn into_rows(self) -> (DictionarySummary, Vec<DictionaryRow>) {
        let DatabaseDictData {
            summary,
            term_list,
            term_meta_list,
            kanji_list,
            kanji_meta_list,
            tag_list,
            media_list,
        } = self;
        let rows = term_list
            .into_iter()
            .map(DictionaryRow::Term)
            .chain(term_meta_list.into_iter().map(DictionaryRow::TermMeta))
            .chain(kanji_list.into_iter().map(DictionaryRow::Kanji))
            .chain(kanji_meta_list.into_iter().map(DictionaryRow::KanjiMeta))
            .chain(tag_list.into_iter().map(DictionaryRow::Tag))
            .chain(media_list.into_iter().map(DictionaryRow::Media))
            .collect();
        (summary, rows)
    }
}

/// Where a row produced by a bulk query came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FindMultiBulkData<'a> {
    /// The requested key, before any suffix reversal.
    pub item: &'a str,
    /// Index of the queried item in the request list.
    pub item_index: usize,
    /// Index of the secondary index in the request's index list.
    pub index_index: usize,
}

pub fn split_optional_string_field(field: Option<String>) -> Vec<String> {
    field.map(|s| split_string_field(&s)).unwrap_or_default()
}

pub fn split_string_field(field: &str) -> Vec<String> {
    field
        .split(' ')
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}
