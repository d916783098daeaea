//! Dictionary lookups for Japanese text.
//!
//! Installed dictionaries live in an in-memory [DictionaryDatabase]. A
//! [Yomichan] instance turns free-form text into term entries (with
//! deinflection, text variants, frequency, pitch and tag metadata) and
//! kanji entries, configured through [settings::YomichanOptions].

pub mod backend;
pub mod database;
pub mod deinflector;
pub mod dictionary;
pub mod dictionary_data;
pub mod errors;
pub mod language;
pub mod regex_util;
pub mod settings;
pub mod tag_resolver;
pub mod term_grouping;
pub mod term_meta;
pub mod text_scanner;
pub mod translation;
pub mod translation_internal;
pub mod translator;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use backend::{find_kanji_options, find_terms_options, Backend, FindTermsDetails};
pub use database::dictionary_database::DictionaryDatabase;
use database::{dictionary_database::DictionaryCountGroup, dictionary_rows::DatabaseDictData};
use dictionary::{KanjiDictionaryEntry, TermFrequencySimple};
use dictionary_data::DictionarySummary;
pub use errors::{YomichanError, YomichanResult};
use settings::{DictionaryOptions, ProfileOptions, YomichanOptions};
use text_scanner::TermSearchResults;
use translation::FindTermsMode;
use translator::FindTermsResult;

/// A Yomichan dictionary instance.
pub struct Yomichan {
    backend: Backend,
}

impl Yomichan {
    /// Creates an instance over an empty, prepared store with default options.
    ///
    /// # Examples
    /// ```
    /// use yomichan_lookup::Yomichan;
    ///
    /// let ycd = Yomichan::new().unwrap();
    /// assert!(ycd.dictionary_summaries().unwrap().is_empty());
    /// ```
    pub fn new() -> YomichanResult<Self> {
        Self::with_options(YomichanOptions::default())
    }

    pub fn with_options(options: YomichanOptions) -> YomichanResult<Self> {
        let db = Arc::new(DictionaryDatabase::new_prepared()?);
        Self::with_database(db, options)
    }

    /// Uses an existing store. Profiles are not synced with its dictionaries.
    pub fn with_database(
        db: Arc<DictionaryDatabase>,
        options: YomichanOptions,
    ) -> YomichanResult<Self> {
        options.get_current_profile()?;
        Ok(Self {
            backend: Backend::new(db, options)?,
        })
    }

    pub fn db(&self) -> &Arc<DictionaryDatabase> {
        &self.backend.db
    }

    pub fn options(&self) -> &YomichanOptions {
        &self.backend.options
    }

    /// Mutating options does not touch the store; use [Self::import_dictionary]
    /// and [Self::delete_dictionary] to change installed dictionaries.
    pub fn options_mut(&mut self) -> &mut YomichanOptions {
        &mut self.backend.options
    }

    fn profile_options(&self) -> YomichanResult<&ProfileOptions> {
        Ok(&self.backend.options.get_current_profile()?.options)
    }

    /*************** Dictionaries ***************/

    /// Installs a dictionary and enables it in the current profile.
    ///
    /// The first installed dictionary becomes the profile's main dictionary.
    pub fn import_dictionary(&mut self, data: DatabaseDictData) -> YomichanResult<DictionarySummary> {
        let summary = self.backend.db.import_dictionary(data)?;
        let profile = self.backend.options.get_current_profile_mut()?;
        profile
            .dictionaries_mut()
            .entry(summary.title.clone())
            .or_insert_with(|| DictionaryOptions::new(summary.title.clone()));
        if profile.get_main_dictionary().is_empty() {
            profile.set_main_dictionary(summary.title.clone());
        }
        self.backend.text_scanner.translator().clear_tag_cache();
        Ok(summary)
    }

    /// Parses a [DatabaseDictData] json document and installs it.
    pub fn import_dictionary_json(&mut self, json: &str) -> YomichanResult<DictionarySummary> {
        let data: DatabaseDictData = serde_json::from_str(json)?;
        self.import_dictionary(data)
    }

    /// Removes a dictionary from the store and from every profile.
    pub fn delete_dictionary(&mut self, name: &str) -> YomichanResult<DictionaryCountGroup> {
        let removed = self.backend.db.delete_dictionary(name)?;
        for profile in &mut self.backend.options.profiles {
            profile.dictionaries_mut().shift_remove(name);
            if profile.get_main_dictionary() == name {
                profile.set_main_dictionary(String::new());
            }
        }
        self.backend.text_scanner.translator().clear_tag_cache();
        Ok(removed)
    }

    /// Gets all dictionary summaries from the store.
    /// [DictionarySummary] is different from [DictionaryOptions].
    pub fn dictionary_summaries(&self) -> YomichanResult<Vec<DictionarySummary>> {
        Ok(self.backend.db.get_dictionary_info()?)
    }

    /*************** Lookups ***************/

    /// Looks up `text` with the current profile, shaped by its result output mode.
    pub fn search(&self, text: &str) -> YomichanResult<FindTermsResult> {
        let options = self.profile_options()?;
        let mode = FindTermsMode::from(options.general.result_output_mode);
        self.find_terms(mode, text, &FindTermsDetails::default())
    }

    /// Looks up `text` with explicit overrides of the profile's scanning options.
    pub fn find_terms(
        &self,
        mode: FindTermsMode,
        text: &str,
        details: &FindTermsDetails,
    ) -> YomichanResult<FindTermsResult> {
        let options = find_terms_options(mode, details, self.profile_options()?);
        Ok(self
            .backend
            .text_scanner
            .translator()
            .find_terms(mode, text, &options)?)
    }

    /// Exact, case-insensitive lookup of `text` (and of the part before an apostrophe).
    pub fn search_case_variants(&self, text: &str) -> YomichanResult<FindTermsResult> {
        let options = self.profile_options()?;
        let mode = FindTermsMode::from(options.general.result_output_mode);
        let find_options = find_terms_options(mode, &FindTermsDetails::default(), options);
        Ok(self
            .backend
            .text_scanner
            .translator()
            .find_terms_case_variants(mode, text, &find_options)?)
    }

    /// Scans `full_text` at the character index `start_position`, see [text_scanner::TextScanner::search].
    pub fn scan(
        &self,
        full_text: &str,
        start_position: usize,
    ) -> YomichanResult<Option<TermSearchResults>> {
        let options = self.profile_options()?;
        Ok(self
            .backend
            .text_scanner
            .search(full_text, start_position, options)?)
    }

    pub fn search_kanji(&self, text: &str) -> YomichanResult<Vec<KanjiDictionaryEntry>> {
        let options = find_kanji_options(self.profile_options()?);
        Ok(self
            .backend
            .text_scanner
            .translator()
            .find_kanji(text, &options)?)
    }

    /// Frequencies of `(term, reading)` pairs from the profile's enabled dictionaries.
    pub fn term_frequencies(
        &self,
        term_reading_list: &[(String, Option<String>)],
    ) -> YomichanResult<Vec<TermFrequencySimple>> {
        let options = find_terms_options(
            FindTermsMode::Simple,
            &FindTermsDetails::default(),
            self.profile_options()?,
        );
        Ok(self
            .backend
            .text_scanner
            .translator()
            .get_term_frequencies(term_reading_list, &options.enabled_dictionary_map)?)
    }
}
