use std::{
    cmp::{Ordering, Reverse},
    collections::HashSet,
    sync::{Arc, LazyLock},
};

use fancy_regex::Regex;
use icu::{
    collator::{options::CollatorOptions, Collator, CollatorBorrowed},
    locale::locale,
};
use indexmap::{IndexMap, IndexSet};

use crate::{
    database::{
        dictionary_database::{
            DictionaryDatabase, DictionaryDatabaseError, DictionarySet, GenericQueryRequest,
            QueryType, TermExactQueryRequest,
        },
        dictionary_rows::{KanjiEntry, RowId, TermEntry},
    },
    deinflector::{Deinflection, Deinflector, RuleFlags},
    dictionary::{
        KanjiDictionaryEntry, KanjiStat, KanjiStatGroups, TermDefinition, TermDictionaryEntry,
        TermFrequencySimple, TermHeadword, TermSource, TermSourceMatchType,
    },
    language::ja::{
        japanese::{
            collapse_emphatic_sequences, convert_halfwidth_kana_to_fullwidth,
            convert_hiragana_to_katakana, convert_katakana_to_hiragana,
            convert_numeric_to_fullwidth, get_japanese_only_text,
        },
        wanakana::convert_alphabetic_to_kana,
    },
    regex_util::apply_text_replacement,
    tag_resolver::{
        add_tag_names, expand_tag_groups, flag_redundant_definition_tags, get_name_base,
        tag_group_requests, ResolvedTags, TagResolver,
    },
    term_grouping::{
        create_grouped_dictionary_entry, group_dictionary_entries_by_headword,
        remove_excluded_definitions,
    },
    term_meta::{self, collect_headword_targets, update_sort_frequencies},
    text_scanner::get_search_case_variants,
    translation::{
        EnabledDictionaryMap, FindKanjiOptions, FindTermsMode, FindTermsOptions,
        FindTermsSortOrder, FindTermsTextReplacement, KanjiEnabledDictionaryMap,
    },
    translation_internal::{DatabaseDeinflection, DictionaryEntryGroup, TextSourceMap},
};

/// Glossary text of a non-lemma row pointing at its lemma: `<reason> (-><lemma>)`.
static LEMMA_REDIRECT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*) \(->(.*)\)$").expect("invalid lemma redirect pattern"));

const NON_LEMMA_TAG: &str = "non-lemma";

#[derive(thiserror::Error, Debug)]
pub enum TranslatorError {
    #[error("dictionary lookup failed: {0}")]
    Database(#[from] DictionaryDatabaseError),
    #[error("text replacement `{pattern}` failed: {source}")]
    InvalidTextReplacement {
        pattern: String,
        source: fancy_regex::Error,
    },
    #[error("failed to load the collator: {0}")]
    Collator(String),
}

pub type TranslatorResult<T> = Result<T, TranslatorError>;

#[derive(Clone, Debug, PartialEq, Default)]
pub struct FindTermsResult {
    pub dictionary_entries: Vec<TermDictionaryEntry>,
    /// Characters of the searched text covered by the longest match.
    pub matched_text_length: usize,
}

/// Where a lemma redirection was first discovered.
#[derive(Debug)]
struct LemmaRedirect {
    original_text: String,
    surface_reasons: Vec<String>,
    redirect_reasons: Vec<String>,
}

/// Finds term and kanji dictionary entries for text.
pub struct Translator {
    db: Arc<DictionaryDatabase>,
    deinflector: Deinflector,
    tag_resolver: TagResolver,
    /// Invariant Locale
    /// Default: "en-US"
    string_comparer: CollatorBorrowed<'static>,
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("deinflector_reasons", &self.deinflector.reason_count())
            .field("cached_tags", &self.tag_resolver.cached_len())
            .finish_non_exhaustive()
    }
}

impl Translator {
    pub fn new(db: Arc<DictionaryDatabase>, deinflector: Deinflector) -> TranslatorResult<Self> {
        let string_comparer =
            Collator::try_new(locale!("en-US").into(), CollatorOptions::default())
                .map_err(|e| TranslatorError::Collator(e.to_string()))?;
        Ok(Self {
            db,
            deinflector,
            tag_resolver: TagResolver::new(),
            string_comparer,
        })
    }

    pub fn db(&self) -> &Arc<DictionaryDatabase> {
        &self.db
    }

    /// Clears the database tag cache.
    /// This should be called if the database is changed.
    pub fn clear_tag_cache(&self) {
        self.tag_resolver.clear();
    }

    /// Number of cached `(dictionary, tag)` lookups, misses included.
    pub fn cached_tag_count(&self) -> usize {
        self.tag_resolver.cached_len()
    }

    /// Finds term definitions for the given text.
    ///
    /// # Parameters
    ///
    /// `mode`: The [FindTermsMode] to use for finding terms.
    /// Determines the shape of the resulting entries.
    ///
    /// `text`: The text to find terms for.
    ///
    /// `options`: A reference to [FindTermsOptions], describing settings for the lookup.
    ///
    /// # Returns
    ///
    /// A [FindTermsResult] holding the sorted entries and the number of
    /// characters of `text` the longest match covers.
    ///
    /// # Errors
    ///
    /// Fails if any store query fails, or a text replacement cannot be applied.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn find_terms(
        &self,
        mode: FindTermsMode,
        text: &str,
        options: &FindTermsOptions,
    ) -> TranslatorResult<FindTermsResult> {
        let FindTermsOptions {
            enabled_dictionary_map,
            exclude_dictionary_definitions,
            sort_frequency_dictionary,
            sort_frequency_dictionary_order,
            ..
        } = options;

        let (mut dictionary_entries, matched_text_length) =
            self.find_terms_internal(text, options)?;

        match mode {
            FindTermsMode::Group => {
                dictionary_entries = group_dictionary_entries_by_headword(dictionary_entries);
            }
            FindTermsMode::Merge => {
                dictionary_entries =
                    self.get_related_dictionary_entries(dictionary_entries, options)?;
            }
            FindTermsMode::Split | FindTermsMode::Simple => {}
        }

        if let Some(excluded) = exclude_dictionary_definitions {
            remove_excluded_definitions(&mut dictionary_entries, excluded);
        }

        if mode == FindTermsMode::Simple {
            if let Some(sort_dictionary) = sort_frequency_dictionary {
                let sort_dictionary_map: EnabledDictionaryMap = enabled_dictionary_map
                    .get_key_value(sort_dictionary)
                    .map(|(name, info)| (name.clone(), info.clone()))
                    .into_iter()
                    .collect::<IndexMap<_, _>>()
                    .into();
                self.add_term_meta(&mut dictionary_entries, &sort_dictionary_map)?;
            }
            clear_term_tags(&mut dictionary_entries);
        } else {
            self.add_term_meta(&mut dictionary_entries, enabled_dictionary_map)?;
            self.expand_term_tags(&mut dictionary_entries)?;
        }

        if let Some(sort_dictionary) = sort_frequency_dictionary {
            update_sort_frequencies(
                &mut dictionary_entries,
                sort_dictionary,
                *sort_frequency_dictionary_order == FindTermsSortOrder::Ascending,
            );
        }

        if dictionary_entries.len() > 1 {
            self.sort_term_dictionary_entries(&mut dictionary_entries);
        }
        for entry in &mut dictionary_entries {
            if mode != FindTermsMode::Simple {
                flag_redundant_definition_tags(&mut entry.definitions);
            }
            sort_term_dictionary_entry_data(entry);
        }

        log::debug!(
            "find_terms({mode:?}): {} entries, matched {matched_text_length} chars",
            dictionary_entries.len()
        );
        Ok(FindTermsResult {
            dictionary_entries,
            matched_text_length,
        })
    }

    /// Searches the case variants of `text` without deinflection.
    ///
    /// Entries whose definitions equal an earlier variant's entry are dropped.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn find_terms_case_variants(
        &self,
        mode: FindTermsMode,
        text: &str,
        options: &FindTermsOptions,
    ) -> TranslatorResult<FindTermsResult> {
        let mut options = options.clone();
        options.match_type = TermSourceMatchType::Exact;
        options.deinflect = false;

        let mut dictionary_entries: Vec<TermDictionaryEntry> = Vec::new();
        let mut matched_text_length = 0;
        for variant in get_search_case_variants(text) {
            let result = self.find_terms(mode, &variant, &options)?;
            matched_text_length = matched_text_length.max(result.matched_text_length);
            for entry in result.dictionary_entries {
                if dictionary_entries
                    .iter()
                    .any(|existing| existing.definitions == entry.definitions)
                {
                    continue;
                }
                dictionary_entries.push(entry);
            }
        }
        Ok(FindTermsResult {
            dictionary_entries,
            matched_text_length,
        })
    }

    /// Finds kanji definitions for the given text.
    ///
    /// Every unique character of `text` is looked up once.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn find_kanji(
        &self,
        text: &str,
        options: &FindKanjiOptions,
    ) -> TranslatorResult<Vec<KanjiDictionaryEntry>> {
        let FindKanjiOptions {
            enabled_dictionary_map,
            remove_non_japanese_characters,
        } = options;
        let text = if *remove_non_japanese_characters {
            get_japanese_only_text(text)
        } else {
            text
        };
        let kanji_unique: IndexSet<String> = text.chars().map(String::from).collect();
        if kanji_unique.is_empty() {
            return Ok(vec![]);
        }
        let kanji_list: Vec<&String> = kanji_unique.iter().collect();

        let mut database_entries = self.db.find_kanji_bulk(&kanji_list, enabled_dictionary_map)?;
        if database_entries.is_empty() {
            return Ok(vec![]);
        }
        database_entries.sort_by_key(|entry| entry.index);

        let mut requests: Vec<(String, String)> = Vec::new();
        for entry in &database_entries {
            requests.extend(
                entry
                    .stats
                    .keys()
                    .chain(entry.tags.iter())
                    .map(|name| (entry.dictionary.clone(), name.clone())),
            );
        }
        let resolved = self.tag_resolver.resolve(&*self.db, requests)?;

        let mut dictionary_entries: Vec<KanjiDictionaryEntry> = database_entries
            .into_iter()
            .map(|entry| {
                self.create_kanji_dictionary_entry(entry, enabled_dictionary_map, &resolved)
            })
            .collect();

        let characters: Vec<&str> = dictionary_entries
            .iter()
            .map(|entry| entry.character.as_str())
            .collect();
        let metas = self
            .db
            .find_kanji_meta_bulk(&characters, enabled_dictionary_map)?;
        term_meta::add_kanji_meta(&mut dictionary_entries, metas, |dictionary| {
            enabled_dictionary_map.dictionary_order(dictionary)
        });

        for entry in &mut dictionary_entries {
            entry.frequencies.sort_by_key(|frequency| {
                (
                    Reverse(frequency.dictionary_priority),
                    frequency.dictionary_index,
                    frequency.index,
                )
            });
        }

        log::debug!("find_kanji: {} entries", dictionary_entries.len());
        Ok(dictionary_entries)
    }

    /// Gets a list of frequency information for a given list of term-reading pairs.
    ///
    /// A `None` reading matches frequency rows of any reading.
    pub fn get_term_frequencies(
        &self,
        term_reading_list: &[(String, Option<String>)],
        dictionaries: &impl DictionarySet,
    ) -> TranslatorResult<Vec<TermFrequencySimple>> {
        let terms: Vec<&str> = term_reading_list
            .iter()
            .map(|(term, _)| term.as_str())
            .collect();
        let metas = self.db.find_term_meta_bulk(&terms, dictionaries)?;
        Ok(term_meta::create_term_frequencies(term_reading_list, metas))
    }

    /* Find terms internal implementation */

    fn find_terms_internal(
        &self,
        text: &str,
        options: &FindTermsOptions,
    ) -> TranslatorResult<(Vec<TermDictionaryEntry>, usize)> {
        let text = collapse_newlines(text);
        let mut text = text.trim();
        if options.remove_non_japanese_characters {
            text = get_japanese_only_text(text);
        }
        if text.is_empty() {
            return Ok((vec![], 0));
        }

        let mut deinflections = self.find_deinflections(text, options)?;

        // skipped candidates still count towards the matched length
        let matched_text_length = deinflections
            .iter()
            .map(|deinflection| deinflection.original_text.chars().count())
            .max()
            .unwrap_or(0);

        let extra = self.get_lemma_deinflections(&mut deinflections, options)?;
        deinflections.extend(extra);

        let dictionary_entries =
            get_dictionary_entries(&deinflections, &options.enabled_dictionary_map);
        log::trace!(
            "find_terms_internal: {} candidates, {} entries",
            deinflections.len(),
            dictionary_entries.len()
        );
        Ok((dictionary_entries, matched_text_length))
    }

    /// Candidates of `text` that matched at least one row, after the containment filter.
    fn find_deinflections(
        &self,
        text: &str,
        options: &FindTermsOptions,
    ) -> TranslatorResult<Vec<DatabaseDeinflection>> {
        let mut deinflections = if options.deinflect {
            self.get_all_deinflections(text, options)?
        } else {
            vec![DatabaseDeinflection::new(
                text,
                text,
                text,
                RuleFlags::NONE,
                vec![],
            )]
        };
        if deinflections.is_empty() {
            return Ok(deinflections);
        }
        self.add_entries_to_deinflections(&mut deinflections, options)?;
        remove_contained_deinflections(&mut deinflections);
        Ok(deinflections)
    }

    /// Every text variant × prefix × deinflection of `text`.
    fn get_all_deinflections(
        &self,
        text: &str,
        options: &FindTermsOptions,
    ) -> TranslatorResult<Vec<DatabaseDeinflection>> {
        let text_replacements = &options.text_replacements;
        let replacement_count = text_replacements.len().max(1);
        let toggles = [
            options.convert_half_width_characters.variants(),
            options.convert_numeric_characters.variants(),
            options.convert_alphabetic_characters.variants(),
            options.convert_hiragana_to_katakana.variants(),
            options.convert_katakana_to_hiragana.variants(),
        ];
        let collapse_variants = options.collapse_emphatic_sequences.variants();
        let variant_count = replacement_count
            * toggles.iter().map(|values| values.len()).product::<usize>()
            * collapse_variants.len();

        let mut used: HashSet<String> = HashSet::new();
        let mut deinflections: Vec<DatabaseDeinflection> = Vec::new();

        for variant_index in 0..variant_count {
            let mut i = variant_index;
            let replacements = text_replacements
                .get(i % replacement_count)
                .and_then(Option::as_ref);
            i /= replacement_count;
            let mut enabled = [false; 5];
            for (toggle, values) in enabled.iter_mut().zip(toggles) {
                *toggle = values[i % values.len()];
                i /= values.len();
            }
            let [half_width, numeric, alphabetic, hiragana_to_katakana, katakana_to_hiragana] =
                enabled;
            let (collapse, full_collapse) = collapse_variants[i % collapse_variants.len()];

            let mut source_map = TextSourceMap::new(text);
            let mut text2 = text.to_string();
            if let Some(replacements) = replacements {
                text2 = apply_text_replacements(&text2, &mut source_map, replacements)?;
            }
            if half_width {
                text2 = convert_halfwidth_kana_to_fullwidth(&text2, &mut source_map);
            }
            if numeric {
                text2 = convert_numeric_to_fullwidth(&text2);
            }
            if alphabetic {
                text2 = convert_alphabetic_to_kana(&text2, &mut source_map);
            }
            if hiragana_to_katakana {
                text2 = convert_hiragana_to_katakana(&text2);
            }
            if katakana_to_hiragana {
                text2 = convert_katakana_to_hiragana(&text2, false);
            }
            if collapse {
                text2 = collapse_emphatic_sequences(&text2, full_collapse, &mut source_map);
            }

            let chars: Vec<char> = text2.chars().collect();
            for length in (1..=chars.len()).rev() {
                let source: String = chars[..length].iter().collect();
                if !used.insert(source.clone()) {
                    break;
                }
                let original_text = source_map.source_prefix(length);
                for Deinflection {
                    term,
                    rules,
                    reasons,
                } in self.deinflector.deinflect(&source)
                {
                    deinflections.push(DatabaseDeinflection::new(
                        original_text.clone(),
                        source.clone(),
                        term,
                        rules,
                        reasons,
                    ));
                }
            }
        }

        log::trace!(
            "{variant_count} text variants produced {} deinflections",
            deinflections.len()
        );
        Ok(deinflections)
    }

    /// Runs one bulk query for the unique deinflected texts and attaches
    /// every rule-compatible row. Candidates without rows are dropped.
    fn add_entries_to_deinflections(
        &self,
        deinflections: &mut Vec<DatabaseDeinflection>,
        options: &FindTermsOptions,
    ) -> TranslatorResult<()> {
        let mut unique_deinflections: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (i, deinflection) in deinflections.iter().enumerate() {
            unique_deinflections
                .entry(deinflection.deinflected_text.as_str())
                .or_default()
                .push(i);
        }
        let terms: Vec<&str> = unique_deinflections.keys().copied().collect();
        let database_entries = self.db.find_terms_bulk(
            &terms,
            &options.enabled_dictionary_map,
            options.match_type,
        )?;

        let targets: Vec<Vec<usize>> = unique_deinflections.into_values().collect();
        for entry in database_entries {
            let Some(indices) = targets.get(entry.index) else {
                continue;
            };
            let definition_rules = RuleFlags::from_rules(&entry.rules);
            for &i in indices {
                let deinflection = &mut deinflections[i];
                if deinflection.rules.is_compatible(definition_rules) {
                    deinflection.database_entries.push(entry.clone());
                }
            }
        }

        deinflections.retain(|deinflection| !deinflection.database_entries.is_empty());
        Ok(())
    }

    /// Strips non-lemma rows from `deinflections` and looks up the lemmas they point to.
    ///
    /// Only one redirection hop is followed.
    fn get_lemma_deinflections(
        &self,
        deinflections: &mut [DatabaseDeinflection],
        options: &FindTermsOptions,
    ) -> TranslatorResult<Vec<DatabaseDeinflection>> {
        let mut lemmas: IndexMap<String, LemmaRedirect> = IndexMap::new();
        for deinflection in deinflections.iter_mut() {
            for entry in deinflection
                .database_entries
                .iter()
                .filter(|entry| is_non_lemma(entry))
            {
                for (reason, lemma) in entry
                    .definitions
                    .iter()
                    .filter_map(|glossary| glossary.as_text())
                    .filter_map(parse_lemma_redirect)
                {
                    let redirect = lemmas.entry(lemma).or_insert_with(|| LemmaRedirect {
                        original_text: deinflection.original_text.clone(),
                        surface_reasons: deinflection.reasons.clone(),
                        redirect_reasons: vec![],
                    });
                    if !redirect.redirect_reasons.contains(&reason) {
                        redirect.redirect_reasons.push(reason);
                    }
                }
            }
            if remove_non_lemma_entries(deinflection) {
                deinflection.skip = true;
            }
        }
        if lemmas.is_empty() {
            return Ok(vec![]);
        }
        log::trace!("following {} lemma redirections", lemmas.len());

        let mut extra = Vec::new();
        for (lemma, redirect) in lemmas {
            for mut deinflection in self.find_deinflections(&lemma, options)? {
                if remove_non_lemma_entries(&mut deinflection) {
                    continue;
                }
                let mut reasons = std::mem::take(&mut deinflection.reasons);
                reasons.extend(redirect.redirect_reasons.iter().cloned());
                reasons.extend(redirect.surface_reasons.iter().cloned());
                deinflection.reasons = reasons;
                deinflection.original_text = redirect.original_text.clone();
                deinflection.is_extra = true;
                extra.push(deinflection);
            }
        }
        Ok(extra)
    }

    /* Merge mode */

    fn get_related_dictionary_entries(
        &self,
        dictionary_entries: Vec<TermDictionaryEntry>,
        options: &FindTermsOptions,
    ) -> TranslatorResult<Vec<TermDictionaryEntry>> {
        let FindTermsOptions {
            main_dictionary,
            enabled_dictionary_map,
            ..
        } = options;

        let mut sequence_list: Vec<GenericQueryRequest> = Vec::new();
        let mut grouped_dictionary_entries: Vec<DictionaryEntryGroup> = Vec::new();
        let mut grouped_dictionary_entries_map: IndexMap<i64, usize> = IndexMap::new();
        let mut ungrouped_dictionary_entries_map: IndexMap<RowId, TermDictionaryEntry> =
            IndexMap::new();

        for entry in dictionary_entries {
            let Some(definition) = entry.definitions.first() else {
                continue;
            };
            let id = definition.id;
            let sequence = definition.sequences.first().copied().unwrap_or(-1);
            if definition.dictionary == *main_dictionary && sequence >= 0 {
                let group_index = *grouped_dictionary_entries_map
                    .entry(sequence)
                    .or_insert_with(|| {
                        sequence_list.push(GenericQueryRequest::new(
                            QueryType::Sequence(sequence),
                            main_dictionary,
                        ));
                        grouped_dictionary_entries.push(DictionaryEntryGroup {
                            ids: IndexSet::new(),
                            dictionary_entries: vec![],
                        });
                        grouped_dictionary_entries.len() - 1
                    });
                let group = &mut grouped_dictionary_entries[group_index];
                group.ids.insert(id);
                group.dictionary_entries.push(entry);
            } else {
                ungrouped_dictionary_entries_map.insert(id, entry);
            }
        }

        if !sequence_list.is_empty() {
            self.add_related_dictionary_entries(
                &mut grouped_dictionary_entries,
                &mut ungrouped_dictionary_entries_map,
                &sequence_list,
                enabled_dictionary_map,
            )?;
            for group in &mut grouped_dictionary_entries {
                group
                    .dictionary_entries
                    .sort_by_key(|entry| entry.definitions.first().map(|d| d.id));
            }
        }

        let secondary_search_dictionary_map =
            enabled_dictionary_map.secondary_search_dictionaries();
        if !ungrouped_dictionary_entries_map.is_empty()
            || !secondary_search_dictionary_map.is_empty()
        {
            self.add_secondary_related_dictionary_entries(
                &mut grouped_dictionary_entries,
                &mut ungrouped_dictionary_entries_map,
                enabled_dictionary_map,
                &secondary_search_dictionary_map,
            )?;
        }

        let mut new_dictionary_entries: Vec<TermDictionaryEntry> = grouped_dictionary_entries
            .into_iter()
            .map(|group| create_grouped_dictionary_entry(group.dictionary_entries, true))
            .collect();
        new_dictionary_entries.extend(group_dictionary_entries_by_headword(
            ungrouped_dictionary_entries_map.into_values(),
        ));
        Ok(new_dictionary_entries)
    }

    fn add_related_dictionary_entries(
        &self,
        grouped_dictionary_entries: &mut [DictionaryEntryGroup],
        ungrouped_dictionary_entries_map: &mut IndexMap<RowId, TermDictionaryEntry>,
        sequence_list: &[GenericQueryRequest],
        enabled_dictionary_map: &EnabledDictionaryMap,
    ) -> TranslatorResult<()> {
        let database_entries = self.db.find_terms_by_sequence_bulk(sequence_list)?;
        for entry in database_entries {
            let Some(group) = grouped_dictionary_entries.get_mut(entry.index) else {
                continue;
            };
            if !group.ids.insert(entry.id) {
                continue;
            }
            let source_text = entry.term.clone();
            group
                .dictionary_entries
                .push(create_term_dictionary_entry_from_database_entry(
                    &entry,
                    &source_text,
                    &source_text,
                    &source_text,
                    vec![],
                    false,
                    enabled_dictionary_map,
                ));
            ungrouped_dictionary_entries_map.shift_remove(&entry.id);
        }
        Ok(())
    }

    fn add_secondary_related_dictionary_entries(
        &self,
        grouped_dictionary_entries: &mut [DictionaryEntryGroup],
        ungrouped_dictionary_entries_map: &mut IndexMap<RowId, TermDictionaryEntry>,
        enabled_dictionary_map: &EnabledDictionaryMap,
        secondary_search_dictionary_map: &EnabledDictionaryMap,
    ) -> TranslatorResult<()> {
        if grouped_dictionary_entries.is_empty() {
            return Ok(());
        }

        // headword -> groups containing it
        let mut term_list: Vec<TermExactQueryRequest> = Vec::new();
        let mut target_list: Vec<Vec<usize>> = Vec::new();
        let mut target_map: IndexMap<(String, String), usize> = IndexMap::new();
        for (group_index, group) in grouped_dictionary_entries.iter().enumerate() {
            for entry in &group.dictionary_entries {
                let Some(TermHeadword { term, reading, .. }) = entry.headwords.first() else {
                    continue;
                };
                let target = *target_map
                    .entry((term.clone(), reading.clone()))
                    .or_insert_with(|| {
                        term_list.push(TermExactQueryRequest {
                            term: term.clone(),
                            reading: reading.clone(),
                        });
                        target_list.push(vec![]);
                        target_list.len() - 1
                    });
                if !target_list[target].contains(&group_index) {
                    target_list[target].push(group_index);
                }
            }
        }

        // ungrouped entries with a matching headword join those groups
        ungrouped_dictionary_entries_map.retain(|&id, entry| {
            let Some(&target) = entry
                .headwords
                .first()
                .and_then(|h| target_map.get(&(h.term.clone(), h.reading.clone())))
            else {
                return true;
            };
            for &group_index in &target_list[target] {
                let group = &mut grouped_dictionary_entries[group_index];
                if group.ids.insert(id) {
                    group.dictionary_entries.push(entry.clone());
                }
            }
            false
        });

        if term_list.is_empty() || secondary_search_dictionary_map.is_empty() {
            return Ok(());
        }

        let mut database_entries = self
            .db
            .find_terms_exact_bulk(&term_list, secondary_search_dictionary_map)?;
        database_entries.sort_by_key(|entry| entry.index);
        for entry in database_entries {
            let Some(groups) = target_list.get(entry.index) else {
                continue;
            };
            let source_text = term_list[entry.index].term.clone();
            for &group_index in groups {
                let group = &mut grouped_dictionary_entries[group_index];
                if !group.ids.insert(entry.id) {
                    continue;
                }
                group
                    .dictionary_entries
                    .push(create_term_dictionary_entry_from_database_entry(
                        &entry,
                        &source_text,
                        &source_text,
                        &source_text,
                        vec![],
                        false,
                        enabled_dictionary_map,
                    ));
                ungrouped_dictionary_entries_map.shift_remove(&entry.id);
            }
        }
        Ok(())
    }

    /* Metadata and tags */

    fn add_term_meta(
        &self,
        dictionary_entries: &mut [TermDictionaryEntry],
        enabled_dictionary_map: &EnabledDictionaryMap,
    ) -> TranslatorResult<()> {
        let (terms, targets) = collect_headword_targets(dictionary_entries);
        if terms.is_empty() || enabled_dictionary_map.is_empty() {
            return Ok(());
        }
        let metas = self.db.find_term_meta_bulk(&terms, enabled_dictionary_map)?;
        term_meta::add_term_meta(dictionary_entries, &targets, metas, enabled_dictionary_map);
        Ok(())
    }

    /// Resolves every pending tag group of the entries with a single cache pass.
    fn expand_term_tags(
        &self,
        dictionary_entries: &mut [TermDictionaryEntry],
    ) -> TranslatorResult<()> {
        let mut requests: Vec<(String, String)> = Vec::new();
        for entry in dictionary_entries.iter() {
            for headword in &entry.headwords {
                requests.extend(tag_group_requests(&headword.tag_groups));
            }
            for definition in &entry.definitions {
                requests.extend(tag_group_requests(&definition.tag_groups));
            }
            for pronunciation in &entry.pronunciations {
                for pitch in &pronunciation.pitches {
                    requests.extend(tag_group_requests(&pitch.tag_groups));
                }
            }
        }
        if requests.is_empty() {
            return Ok(());
        }
        let resolved = self.tag_resolver.resolve(&*self.db, requests)?;

        let collator = &self.string_comparer;
        for entry in dictionary_entries.iter_mut() {
            for headword in &mut entry.headwords {
                expand_tag_groups(&mut headword.tags, &mut headword.tag_groups, &resolved, collator);
            }
            for definition in &mut entry.definitions {
                expand_tag_groups(
                    &mut definition.tags,
                    &mut definition.tag_groups,
                    &resolved,
                    collator,
                );
            }
            for pronunciation in &mut entry.pronunciations {
                for pitch in &mut pronunciation.pitches {
                    expand_tag_groups(&mut pitch.tags, &mut pitch.tag_groups, &resolved, collator);
                }
            }
        }
        Ok(())
    }

    /* Kanji */

    fn create_kanji_dictionary_entry(
        &self,
        entry: KanjiEntry,
        enabled_dictionary_map: &KanjiEnabledDictionaryMap,
        resolved: &ResolvedTags,
    ) -> KanjiDictionaryEntry {
        let KanjiEntry {
            character,
            onyomi,
            kunyomi,
            tags,
            definitions,
            stats,
            dictionary,
            ..
        } = entry;
        let (dictionary_index, dictionary_priority) =
            enabled_dictionary_map.dictionary_order(&dictionary);
        let stats = self.expand_kanji_stats(&stats, &dictionary, resolved);
        let mut tag_groups = Vec::new();
        add_tag_names(&mut tag_groups, &dictionary, &tags);

        let mut kanji_entry = KanjiDictionaryEntry {
            character,
            dictionary,
            dictionary_index,
            dictionary_priority,
            onyomi,
            kunyomi,
            tags: vec![],
            tag_groups,
            stats,
            definitions,
            frequencies: vec![],
        };
        expand_tag_groups(
            &mut kanji_entry.tags,
            &mut kanji_entry.tag_groups,
            resolved,
            &self.string_comparer,
        );
        kanji_entry
    }

    /// Groups stats by the category of their tag; stats without a tag row are dropped.
    fn expand_kanji_stats(
        &self,
        stats: &IndexMap<String, String>,
        dictionary: &str,
        resolved: &ResolvedTags,
    ) -> KanjiStatGroups {
        let mut groups = KanjiStatGroups::new();
        for (name, value) in stats {
            let key = (dictionary.to_string(), get_name_base(name).to_string());
            let Some(Some(row)) = resolved.get(&key) else {
                continue;
            };
            let category = if row.category.is_empty() {
                "default".to_string()
            } else {
                row.category.clone()
            };
            groups
                .entry(category.clone())
                .or_default()
                .push(KanjiStat {
                    name: name.clone(),
                    category,
                    content: row.notes.clone(),
                    order: row.order,
                    score: row.score,
                    dictionary: dictionary.to_string(),
                    value: value.clone(),
                });
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| match a.order.cmp(&b.order) {
                Ordering::Equal => self.string_comparer.compare(&a.content, &b.content),
                ord => ord,
            });
        }
        groups
    }

    /* Sorting */

    fn sort_term_dictionary_entries(&self, dictionary_entries: &mut [TermDictionaryEntry]) {
        let collator = &self.string_comparer;
        dictionary_entries.sort_by(|v1, v2| {
            v2.max_transformed_text_length
                .cmp(&v1.max_transformed_text_length)
                .then_with(|| v1.inflections.len().cmp(&v2.inflections.len()))
                .then_with(|| {
                    v2.source_term_exact_match_count
                        .cmp(&v1.source_term_exact_match_count)
                })
                .then_with(|| v2.dictionary_priority.cmp(&v1.dictionary_priority))
                .then_with(|| {
                    v1.frequency_order
                        .partial_cmp(&v2.frequency_order)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| v2.score.cmp(&v1.score))
                .then_with(|| {
                    for (h1, h2) in v1.headwords.iter().zip(&v2.headwords) {
                        let ord = h2
                            .term
                            .chars()
                            .count()
                            .cmp(&h1.term.chars().count())
                            .then_with(|| collator.compare(&h1.term, &h2.term));
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                })
                .then_with(|| v1.dictionary_index.cmp(&v2.dictionary_index))
        });
    }
}

fn apply_text_replacements(
    text: &str,
    source_map: &mut TextSourceMap,
    replacements: &[FindTermsTextReplacement],
) -> TranslatorResult<String> {
    let mut text = text.to_string();
    for FindTermsTextReplacement {
        pattern,
        replacement,
        is_global,
    } in replacements
    {
        text = apply_text_replacement(&text, source_map, pattern, replacement, *is_global)
            .map_err(|source| TranslatorError::InvalidTextReplacement {
                pattern: pattern.as_str().to_string(),
                source,
            })?;
    }
    Ok(text)
}

/// Keeps only the longest clean match and candidates it does not contain.
///
/// The first candidate whose original text has no whitespace and ends with
/// a letter is the primary span.
fn remove_contained_deinflections(deinflections: &mut Vec<DatabaseDeinflection>) {
    let Some(primary) = deinflections
        .iter()
        .find(|deinflection| {
            let original = &deinflection.original_text;
            !original.chars().any(char::is_whitespace)
                && original.chars().last().is_some_and(char::is_alphabetic)
        })
        .map(|deinflection| deinflection.original_text.clone())
    else {
        return;
    };
    deinflections.retain(|deinflection| {
        deinflection.original_text == primary
            || !primary.contains(deinflection.original_text.as_str())
    });
}

fn is_non_lemma(entry: &TermEntry) -> bool {
    entry.definition_tags.iter().any(|tag| tag == NON_LEMMA_TAG)
}

/// Drops the non-lemma rows of a candidate.
/// Returns true if the candidate had rows and all of them were dropped.
fn remove_non_lemma_entries(deinflection: &mut DatabaseDeinflection) -> bool {
    let before = deinflection.database_entries.len();
    deinflection
        .database_entries
        .retain(|entry| !is_non_lemma(entry));
    before > 0 && deinflection.database_entries.is_empty()
}

/// `(reason, lemma)` out of a `<reason> (-><lemma>)` glossary.
fn parse_lemma_redirect(text: &str) -> Option<(String, String)> {
    let captures = LEMMA_REDIRECT_PATTERN.captures(text).ok()??;
    let reason = captures.get(1)?.as_str();
    let lemma = captures.get(2)?.as_str();
    if lemma.is_empty() {
        return None;
    }
    Some((reason.to_string(), lemma.to_string()))
}

/// One entry per row id; skipped candidates produce nothing.
fn get_dictionary_entries(
    deinflections: &[DatabaseDeinflection],
    enabled_dictionary_map: &EnabledDictionaryMap,
) -> Vec<TermDictionaryEntry> {
    let mut ids: HashSet<RowId> = HashSet::new();
    let mut dictionary_entries = Vec::new();
    for deinflection in deinflections.iter().filter(|d| !d.skip) {
        for entry in &deinflection.database_entries {
            if !ids.insert(entry.id) {
                continue;
            }
            dictionary_entries.push(create_term_dictionary_entry_from_database_entry(
                entry,
                &deinflection.original_text,
                &deinflection.transformed_text,
                &deinflection.deinflected_text,
                deinflection.reasons.clone(),
                true,
                enabled_dictionary_map,
            ));
        }
    }
    dictionary_entries
}

pub(crate) fn create_term_dictionary_entry_from_database_entry(
    database_entry: &TermEntry,
    original_text: &str,
    transformed_text: &str,
    deinflected_text: &str,
    reasons: Vec<String>,
    is_primary: bool,
    enabled_dictionary_map: &EnabledDictionaryMap,
) -> TermDictionaryEntry {
    let TermEntry {
        id,
        match_type,
        match_source,
        term,
        reading,
        definition_tags,
        term_tags,
        rules,
        definitions,
        score,
        dictionary,
        sequence,
        ..
    } = database_entry;
    let reading = if reading.is_empty() { term } else { reading };
    let (dictionary_index, dictionary_priority) =
        enabled_dictionary_map.dictionary_order(dictionary);
    let source_term_exact_match_count = usize::from(is_primary && deinflected_text == term);

    let source = TermSource {
        original_text: original_text.to_string(),
        transformed_text: transformed_text.to_string(),
        deinflected_text: deinflected_text.to_string(),
        match_type: *match_type,
        match_source: *match_source,
        is_primary,
    };
    let mut headword_tag_groups = Vec::new();
    add_tag_names(&mut headword_tag_groups, dictionary, term_tags);
    let mut definition_tag_groups = Vec::new();
    add_tag_names(&mut definition_tag_groups, dictionary, definition_tags);

    TermDictionaryEntry {
        is_primary,
        inflections: reasons,
        score: *score,
        frequency_order: 0.0,
        dictionary_index,
        dictionary_priority,
        source_term_exact_match_count,
        max_transformed_text_length: transformed_text.chars().count(),
        headwords: vec![TermHeadword {
            index: 0,
            term: term.clone(),
            reading: reading.clone(),
            sources: vec![source],
            tags: vec![],
            tag_groups: headword_tag_groups,
            word_classes: rules.clone(),
        }],
        definitions: vec![TermDefinition {
            index: 0,
            headword_indices: vec![0],
            dictionary: dictionary.clone(),
            dictionary_index,
            dictionary_priority,
            id: *id,
            score: *score,
            frequency_order: 0.0,
            sequences: vec![*sequence],
            is_primary,
            tags: vec![],
            tag_groups: definition_tag_groups,
            entries: definitions.clone(),
        }],
        pronunciations: vec![],
        frequencies: vec![],
    }
}

fn clear_term_tags(dictionary_entries: &mut [TermDictionaryEntry]) {
    for entry in dictionary_entries {
        for headword in &mut entry.headwords {
            headword.tags.clear();
            headword.tag_groups.clear();
        }
        for definition in &mut entry.definitions {
            definition.tags.clear();
            definition.tag_groups.clear();
        }
        for pronunciation in &mut entry.pronunciations {
            for pitch in &mut pronunciation.pitches {
                pitch.tags.clear();
                pitch.tag_groups.clear();
            }
        }
    }
}

/// Replaces every line break (`\r\n`, `\r` or `\n`) with a single space.
fn collapse_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

fn sort_term_dictionary_entry_data(entry: &mut TermDictionaryEntry) {
    entry.definitions.sort_by(|v1, v2| {
        v2.dictionary_priority
            .cmp(&v1.dictionary_priority)
            .then_with(|| v1.dictionary_index.cmp(&v2.dictionary_index))
            .then_with(|| {
                v1.frequency_order
                    .partial_cmp(&v2.frequency_order)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| v2.score.cmp(&v1.score))
            .then_with(|| v2.headword_indices.len().cmp(&v1.headword_indices.len()))
            .then_with(|| v1.headword_indices.cmp(&v2.headword_indices))
            .then_with(|| v1.index.cmp(&v2.index))
    });
    entry.frequencies.sort_by_key(|f| {
        (
            Reverse(f.dictionary_priority),
            f.headword_index,
            f.dictionary_index,
            f.index,
        )
    });
    entry.pronunciations.sort_by_key(|p| {
        (
            Reverse(p.dictionary_priority),
            p.headword_index,
            p.dictionary_index,
            p.index,
        )
    });
}
