use indexmap::IndexSet;

use crate::{
    database::dictionary_rows::{RowId, TermEntry},
    deinflector::RuleFlags,
    dictionary::TermDictionaryEntry,
};

/// A deinflection candidate produced while looking up a piece of text.
#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseDeinflection {
    /// The part of the searched text this candidate was derived from.
    pub original_text: String,
    /// `original_text` after text variants were applied.
    pub transformed_text: String,
    pub deinflected_text: String,
    pub rules: RuleFlags,
    /// Outermost reason first.
    pub reasons: Vec<String>,
    pub database_entries: Vec<TermEntry>,
    /// Matched only non-lemma rows; kept for the matched length but never output.
    pub skip: bool,
    /// Produced by following a non-lemma redirection.
    pub is_extra: bool,
}

impl DatabaseDeinflection {
    pub fn new(
        original_text: impl Into<String>,
        transformed_text: impl Into<String>,
        deinflected_text: impl Into<String>,
        rules: RuleFlags,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            original_text: original_text.into(),
            transformed_text: transformed_text.into(),
            deinflected_text: deinflected_text.into(),
            rules,
            reasons,
            database_entries: vec![],
            skip: false,
            is_extra: false,
        }
    }
}

/// Entries sharing a sequence (or headword) in `Merge` mode.
#[derive(Clone, Debug, PartialEq)]
pub struct DictionaryEntryGroup {
    pub ids: IndexSet<RowId>,
    pub dictionary_entries: Vec<TermDictionaryEntry>,
}

/// Tracks how many characters of a source text each character of a
/// transformed text stands for.
///
/// The mapping is created lazily: until the first edit every character
/// maps to exactly one source character. All positions are in chars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSourceMap {
    source: String,
    mapping: Option<Vec<usize>>,
}

impl TextSourceMap {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mapping: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of source characters covered by the first `final_length`
    /// characters of the transformed text.
    pub fn get_source_length(&self, final_length: usize) -> usize {
        match &self.mapping {
            None => final_length,
            Some(mapping) => mapping.iter().take(final_length).sum(),
        }
    }

    /// The source prefix that produced the first `final_length` transformed characters.
    pub fn source_prefix(&self, final_length: usize) -> String {
        self.source
            .chars()
            .take(self.get_source_length(final_length))
            .collect()
    }

    /// Folds the `count` entries after `index` into `index`.
    pub fn combine(&mut self, index: usize, count: usize) -> bool {
        if count == 0 {
            return false;
        }
        let mapping = self.ensure_mapping();
        if index >= mapping.len() {
            return false;
        }
        let end = (index + 1 + count).min(mapping.len());
        let sum: usize = mapping.drain(index + 1..end).sum();
        mapping[index] += sum;
        true
    }

    /// Inserts `items` before `index`.
    pub fn insert(&mut self, index: usize, items: &[usize]) {
        let mapping = self.ensure_mapping();
        let index = index.min(mapping.len());
        mapping.splice(index..index, items.iter().copied());
    }

    pub fn mapping(&self) -> Option<&[usize]> {
        self.mapping.as_deref()
    }

    fn ensure_mapping(&mut self) -> &mut Vec<usize> {
        let len = self.source.chars().count();
        self.mapping.get_or_insert_with(|| vec![1; len])
    }
}
