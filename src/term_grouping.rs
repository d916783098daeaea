//! Combining single-row term entries into grouped ones, and taking them apart again.

use indexmap::{IndexMap, IndexSet};

use crate::{
    dictionary::{
        TermDefinition, TermDictionaryEntry, TermHeadword, TermSource, TermSourceMatchSource,
    },
    tag_resolver::merge_tag_groups,
};

/// Groups entries sharing `(term, reading, inflections)` of their first headword.
pub fn group_dictionary_entries_by_headword(
    dictionary_entries: impl IntoIterator<Item = TermDictionaryEntry>,
) -> Vec<TermDictionaryEntry> {
    let mut groups: IndexMap<(String, String, Vec<String>), Vec<TermDictionaryEntry>> =
        IndexMap::new();
    for entry in dictionary_entries {
        let Some(headword) = entry.headwords.first() else {
            continue;
        };
        let key = (
            headword.term.clone(),
            headword.reading.clone(),
            entry.inflections.clone(),
        );
        groups.entry(key).or_default().push(entry);
    }
    groups
        .into_values()
        .map(|entries| create_grouped_dictionary_entry(entries, false))
        .collect()
}

/// Merges `dictionary_entries` into one entry.
///
/// Headwords are unified by `(term, reading)`. With `check_duplicate_definitions`
/// definitions with the same dictionary and glossary collapse into one.
pub fn create_grouped_dictionary_entry(
    dictionary_entries: Vec<TermDictionaryEntry>,
    check_duplicate_definitions: bool,
) -> TermDictionaryEntry {
    let check_duplicate_definitions = check_duplicate_definitions && dictionary_entries.len() > 1;

    let mut headwords: IndexMap<(String, String), TermHeadword> = IndexMap::new();
    let mut definitions: Vec<TermDefinition> = Vec::new();
    let mut definition_keys: IndexMap<(String, String), usize> = IndexMap::new();

    let mut score = i64::MIN;
    let mut dictionary_index = usize::MAX;
    let mut dictionary_priority = i64::MIN;
    let mut max_transformed_text_length = 0;
    let mut is_primary = false;
    let mut inflections: Option<Vec<String>> = None;

    for entry in dictionary_entries {
        let headword_index_map = add_term_headwords(&mut headwords, entry.headwords);

        score = score.max(entry.score);
        dictionary_index = dictionary_index.min(entry.dictionary_index);
        dictionary_priority = dictionary_priority.max(entry.dictionary_priority);
        if entry.is_primary {
            is_primary = true;
            max_transformed_text_length =
                max_transformed_text_length.max(entry.max_transformed_text_length);
            if inflections
                .as_ref()
                .map_or(true, |current| entry.inflections.len() < current.len())
            {
                inflections = Some(entry.inflections);
            }
        }

        if check_duplicate_definitions {
            add_term_definitions(
                &mut definitions,
                &mut definition_keys,
                entry.definitions,
                &headword_index_map,
            );
        } else {
            add_term_definitions_fast(&mut definitions, entry.definitions, &headword_index_map);
        }
    }

    let headwords: Vec<TermHeadword> = headwords.into_values().collect();
    let source_term_exact_match_count = headwords
        .iter()
        .filter(|headword| {
            headword
                .sources
                .iter()
                .any(|s| s.is_primary && s.match_source == TermSourceMatchSource::Term)
        })
        .count();

    TermDictionaryEntry {
        is_primary,
        inflections: inflections.unwrap_or_default(),
        score,
        frequency_order: 0.0,
        dictionary_index,
        dictionary_priority,
        source_term_exact_match_count,
        max_transformed_text_length,
        headwords,
        definitions,
        pronunciations: vec![],
        frequencies: vec![],
    }
}

/// Adds `new_headwords` to the map, returning where each of them ended up.
fn add_term_headwords(
    headwords: &mut IndexMap<(String, String), TermHeadword>,
    new_headwords: Vec<TermHeadword>,
) -> Vec<usize> {
    let mut headword_index_map = Vec::with_capacity(new_headwords.len());
    for new_headword in new_headwords {
        let key = (new_headword.term.clone(), new_headword.reading.clone());
        let index = headwords.len();
        let headword = headwords.entry(key).or_insert_with(|| TermHeadword {
            index,
            term: new_headword.term.clone(),
            reading: new_headword.reading.clone(),
            sources: vec![],
            tags: vec![],
            tag_groups: vec![],
            word_classes: vec![],
        });
        add_unique_sources(&mut headword.sources, new_headword.sources);
        merge_tag_groups(&mut headword.tag_groups, &new_headword.tag_groups);
        for word_class in new_headword.word_classes {
            if !headword.word_classes.contains(&word_class) {
                headword.word_classes.push(word_class);
            }
        }
        headword_index_map.push(headword.index);
    }
    headword_index_map
}

/// Adds sources, upgrading an equal existing source to primary instead of duplicating it.
fn add_unique_sources(sources: &mut Vec<TermSource>, new_sources: Vec<TermSource>) {
    for new_source in new_sources {
        let existing = sources.iter_mut().find(|source| {
            source.deinflected_text == new_source.deinflected_text
                && source.transformed_text == new_source.transformed_text
                && source.original_text == new_source.original_text
                && source.match_type == new_source.match_type
                && source.match_source == new_source.match_source
        });
        match existing {
            Some(source) => source.is_primary |= new_source.is_primary,
            None => sources.push(new_source),
        }
    }
}

fn remap_headword_indices(indices: &[usize], headword_index_map: &[usize]) -> Vec<usize> {
    indices
        .iter()
        .filter_map(|&i| headword_index_map.get(i).copied())
        .collect()
}

fn add_term_definitions_fast(
    definitions: &mut Vec<TermDefinition>,
    new_definitions: Vec<TermDefinition>,
    headword_index_map: &[usize],
) {
    for mut definition in new_definitions {
        definition.index = definitions.len();
        definition.headword_indices =
            remap_headword_indices(&definition.headword_indices, headword_index_map);
        definitions.push(definition);
    }
}

fn add_term_definitions(
    definitions: &mut Vec<TermDefinition>,
    definition_keys: &mut IndexMap<(String, String), usize>,
    new_definitions: Vec<TermDefinition>,
    headword_index_map: &[usize],
) {
    for definition in new_definitions {
        // glossaries may hold json content, which has no `Hash`
        let glossary_key = serde_json::to_string(&definition.entries).unwrap_or_default();
        let key = (definition.dictionary.clone(), glossary_key);
        let position = match definition_keys.get(&key) {
            Some(&position) => {
                let existing = &mut definitions[position];
                existing.is_primary |= definition.is_primary;
                for sequence in &definition.sequences {
                    if !existing.sequences.contains(sequence) {
                        existing.sequences.push(*sequence);
                    }
                }
                merge_tag_groups(&mut existing.tag_groups, &definition.tag_groups);
                position
            }
            None => {
                let position = definitions.len();
                definitions.push(TermDefinition {
                    index: position,
                    headword_indices: vec![],
                    ..definition.clone()
                });
                definition_keys.insert(key, position);
                position
            }
        };

        let headword_indices = &mut definitions[position].headword_indices;
        for index in remap_headword_indices(&definition.headword_indices, headword_index_map) {
            // kept sorted and unique
            if let Err(insert_at) = headword_indices.binary_search(&index) {
                headword_indices.insert(insert_at, index);
            }
        }
    }
}

/// Splits a grouped entry into one entry per definition.
///
/// Each new entry only keeps the headwords its definition refers to.
pub fn split_dictionary_entry(entry: &TermDictionaryEntry) -> Vec<TermDictionaryEntry> {
    entry
        .definitions
        .iter()
        .map(|definition| {
            let mut headword_remap: IndexMap<usize, usize> = IndexMap::new();
            let headwords: Vec<TermHeadword> = definition
                .headword_indices
                .iter()
                .filter_map(|&old| entry.headwords.get(old).map(|h| (old, h)))
                .enumerate()
                .map(|(new, (old, headword))| {
                    headword_remap.insert(old, new);
                    TermHeadword {
                        index: new,
                        ..headword.clone()
                    }
                })
                .collect();
            let new_definition = TermDefinition {
                index: 0,
                headword_indices: (0..headwords.len()).collect(),
                ..definition.clone()
            };
            let is_primary = headwords
                .iter()
                .any(|h| h.sources.iter().any(|s| s.is_primary));
            let source_term_exact_match_count = headwords
                .iter()
                .filter(|h| {
                    h.sources
                        .iter()
                        .any(|s| s.is_primary && s.match_source == TermSourceMatchSource::Term)
                })
                .count();
            TermDictionaryEntry {
                is_primary,
                inflections: entry.inflections.clone(),
                score: definition.score,
                frequency_order: definition.frequency_order,
                dictionary_index: definition.dictionary_index,
                dictionary_priority: definition.dictionary_priority,
                source_term_exact_match_count,
                max_transformed_text_length: entry.max_transformed_text_length,
                headwords,
                definitions: vec![new_definition],
                pronunciations: entry
                    .pronunciations
                    .iter()
                    .filter_map(|p| {
                        headword_remap.get(&p.headword_index).map(|&headword_index| {
                            let mut p = p.clone();
                            p.headword_index = headword_index;
                            p
                        })
                    })
                    .collect(),
                frequencies: entry
                    .frequencies
                    .iter()
                    .filter_map(|f| {
                        headword_remap.get(&f.headword_index).map(|&headword_index| {
                            let mut f = f.clone();
                            f.headword_index = headword_index;
                            f
                        })
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Drops the definitions, metadata and tag groups of `excluded` dictionaries.
///
/// Entries left without definitions are removed; headwords no longer
/// referenced by any definition are removed and indices remapped.
pub fn remove_excluded_definitions(
    dictionary_entries: &mut Vec<TermDictionaryEntry>,
    excluded: &IndexSet<String>,
) {
    dictionary_entries.retain_mut(|entry| {
        let before = entry.definitions.len();
        entry
            .definitions
            .retain(|d| !excluded.contains(&d.dictionary));
        entry
            .pronunciations
            .retain(|p| !excluded.contains(&p.dictionary));
        entry
            .frequencies
            .retain(|f| !excluded.contains(&f.dictionary));
        for definition in &mut entry.definitions {
            definition
                .tag_groups
                .retain(|g| !excluded.contains(&g.dictionary));
        }
        for headword in &mut entry.headwords {
            headword
                .tag_groups
                .retain(|g| !excluded.contains(&g.dictionary));
        }

        if entry.definitions.len() == before {
            return true;
        }
        if entry.definitions.is_empty() {
            return false;
        }
        remove_unused_headwords(entry);
        true
    });
}

fn remove_unused_headwords(entry: &mut TermDictionaryEntry) {
    let used: IndexSet<usize> = entry
        .definitions
        .iter()
        .flat_map(|d| d.headword_indices.iter().copied())
        .collect();
    if used.len() == entry.headwords.len() {
        return;
    }

    let mut index_remap: IndexMap<usize, usize> = IndexMap::new();
    let old_headwords = std::mem::take(&mut entry.headwords);
    for (old_index, mut headword) in old_headwords.into_iter().enumerate() {
        if !used.contains(&old_index) {
            continue;
        }
        let new_index = index_remap.len();
        index_remap.insert(old_index, new_index);
        headword.index = new_index;
        entry.headwords.push(headword);
    }

    for definition in &mut entry.definitions {
        definition.headword_indices = definition
            .headword_indices
            .iter()
            .filter_map(|i| index_remap.get(i).copied())
            .collect();
    }
    entry.pronunciations.retain_mut(|p| match index_remap.get(&p.headword_index) {
        Some(&new_index) => {
            p.headword_index = new_index;
            true
        }
        None => false,
    });
    entry.frequencies.retain_mut(|f| match index_remap.get(&f.headword_index) {
        Some(&new_index) => {
            f.headword_index = new_index;
            true
        }
        None => false,
    });
}

#[cfg(test)]
mod term_grouping_tests {
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;

    use super::{
        create_grouped_dictionary_entry, group_dictionary_entries_by_headword,
        remove_excluded_definitions, split_dictionary_entry,
    };
    use crate::{dictionary::TermDictionaryEntry, test_utils::single_entry};

    fn glossaries(entries: &[TermDictionaryEntry]) -> Vec<String> {
        let mut all: Vec<String> = entries
            .iter()
            .flat_map(|e| e.definitions.iter())
            .flat_map(|d| d.entries.iter().filter_map(|g| g.as_text().map(String::from)))
            .collect();
        all.sort();
        all
    }

    #[test]
    fn grouping_merges_headwords_and_keeps_every_definition() {
        let entries = vec![
            single_entry(1, "読む", "よむ", "to read", "a", 0),
            single_entry(2, "読む", "よむ", "to read", "b", 1),
            single_entry(3, "詠む", "よむ", "to compose", "a", 0),
        ];
        let grouped = group_dictionary_entries_by_headword(entries);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].headwords.len(), 1);
        assert_eq!(grouped[0].definitions.len(), 2);
        assert_eq!(grouped[0].dictionary_index, 0);
        assert_eq!(grouped[0].definitions[1].index, 1);
        assert_eq!(grouped[0].source_term_exact_match_count, 1);
    }

    #[test]
    fn duplicate_definitions_collapse_when_checked() {
        let entries = vec![
            single_entry(1, "読む", "よむ", "to read", "a", 0),
            single_entry(2, "讀む", "よむ", "to read", "a", 0),
        ];
        let merged = create_grouped_dictionary_entry(entries.clone(), true);
        assert_eq!(merged.headwords.len(), 2);
        assert_eq!(merged.definitions.len(), 1);
        assert_eq!(merged.definitions[0].headword_indices, vec![0, 1]);

        let fast = create_grouped_dictionary_entry(entries, false);
        assert_eq!(fast.definitions.len(), 2);
    }

    #[test]
    fn group_then_split_preserves_definitions() {
        let entries = vec![
            single_entry(1, "読む", "よむ", "to read", "a", 0),
            single_entry(2, "読む", "よむ", "to read", "a", 0),
            single_entry(3, "読む", "よむ", "to recite", "b", 1),
        ];
        let before = glossaries(&entries);
        let grouped = group_dictionary_entries_by_headword(entries);
        let split: Vec<TermDictionaryEntry> =
            grouped.iter().flat_map(split_dictionary_entry).collect();
        assert_eq!(glossaries(&split), before);
        assert!(split
            .iter()
            .all(|e| e.definitions[0].headword_indices == vec![0] && e.headwords.len() == 1));
    }

    #[test]
    fn excluded_dictionaries_are_removed() {
        let entries = vec![
            single_entry(1, "読む", "よむ", "to read", "main", 0),
            single_entry(2, "讀む", "よむ", "to read (old)", "other", 1),
        ];
        let mut merged = vec![
            create_grouped_dictionary_entry(entries, true),
            single_entry(3, "本", "ほん", "book", "main", 0),
        ];
        let excluded: IndexSet<String> = ["main".to_string()].into_iter().collect();
        remove_excluded_definitions(&mut merged, &excluded);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].headwords.len(), 1);
        assert_eq!(merged[0].headwords[0].term, "讀む");
        assert_eq!(merged[0].headwords[0].index, 0);
        assert_eq!(merged[0].definitions[0].headword_indices, vec![0]);
    }
}
