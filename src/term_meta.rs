use std::sync::LazyLock;

use fancy_regex::Regex;
use indexmap::IndexMap;

use crate::{
    database::dictionary_rows::{KanjiMetaEntry, TermMetaEntry},
    dictionary::{
        KanjiDictionaryEntry, KanjiFrequency, PitchAccent, TagGroup, TermDictionaryEntry,
        TermFrequency, TermFrequencySimple, TermPronunciation,
    },
    dictionary_data::{GenericFreqData, TermMetaData},
    translation::EnabledDictionaryMap,
};

static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("invalid number pattern")
});

/// `Number.MAX_SAFE_INTEGER`, the "no frequency" sort key for ascending order.
pub const NO_FREQUENCY_ASCENDING: f64 = 9_007_199_254_740_991.0;

/// A normalized frequency payload.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyInfo {
    pub frequency: f64,
    pub display_value: Option<String>,
    pub display_value_parsed: bool,
}

impl FrequencyInfo {
    pub fn from_data(data: &GenericFreqData) -> Self {
        match data {
            GenericFreqData::Number(value) => Self {
                frequency: *value,
                display_value: None,
                display_value_parsed: false,
            },
            GenericFreqData::String(text) => Self {
                frequency: convert_string_to_number(text),
                display_value: Some(text.clone()),
                display_value_parsed: true,
            },
            GenericFreqData::Object {
                value,
                display_value,
            } => Self {
                frequency: value.unwrap_or(0.0),
                display_value: display_value.clone(),
                display_value_parsed: false,
            },
        }
    }
}

/// The first number found in `text`, or 0.
pub fn convert_string_to_number(text: &str) -> f64 {
    let Ok(Some(found)) = NUMBER_PATTERN.find(text) else {
        return 0.0;
    };
    match found.as_str().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Where a headword's metadata should be attached.
#[derive(Clone, Copy, Debug)]
struct MetaTarget {
    entry_index: usize,
    headword_index: usize,
}

/// `term -> reading -> targets`, in first-seen order.
type HeadwordMap = IndexMap<String, IndexMap<String, Vec<MetaTarget>>>;

/// The unique headword terms of `entries`, with the targets for each reading.
pub(crate) fn collect_headword_targets(
    entries: &[TermDictionaryEntry],
) -> (Vec<String>, HeadwordTargets) {
    let mut map = HeadwordMap::new();
    for (entry_index, entry) in entries.iter().enumerate() {
        for (headword_index, headword) in entry.headwords.iter().enumerate() {
            map.entry(headword.term.clone())
                .or_default()
                .entry(headword.reading.clone())
                .or_default()
                .push(MetaTarget {
                    entry_index,
                    headword_index,
                });
        }
    }
    let terms = map.keys().cloned().collect();
    (terms, HeadwordTargets(map))
}

pub(crate) struct HeadwordTargets(HeadwordMap);

/// Attaches frequency and pitch rows to the headwords of `entries`.
///
/// `metas` must come from a lookup of the terms returned by
/// [collect_headword_targets] for the same `entries`.
pub(crate) fn add_term_meta(
    entries: &mut [TermDictionaryEntry],
    targets: &HeadwordTargets,
    metas: Vec<TermMetaEntry>,
    enabled_dictionary_map: &EnabledDictionaryMap,
) {
    for TermMetaEntry {
        index,
        data,
        dictionary,
        ..
    } in metas
    {
        let Some((_, readings)) = targets.0.get_index(index) else {
            continue;
        };
        let (dictionary_index, dictionary_priority) =
            enabled_dictionary_map.dictionary_order(&dictionary);

        for (reading, reading_targets) in readings {
            match &data {
                TermMetaData::Freq(freq) => {
                    let has_reading = freq.reading().is_some();
                    if freq.reading().is_some_and(|r| r != reading.as_str()) {
                        continue;
                    }
                    let info = FrequencyInfo::from_data(freq.frequency());
                    for target in reading_targets {
                        let frequencies = &mut entries[target.entry_index].frequencies;
                        frequencies.push(TermFrequency {
                            index: frequencies.len(),
                            headword_index: target.headword_index,
                            dictionary: dictionary.clone(),
                            dictionary_index,
                            dictionary_priority,
                            has_reading,
                            frequency: info.frequency,
                            display_value: info.display_value.clone(),
                            display_value_parsed: info.display_value_parsed,
                        });
                    }
                }
                TermMetaData::Pitch(pitch) => {
                    if &pitch.reading != reading {
                        continue;
                    }
                    let pitches: Vec<PitchAccent> = pitch
                        .pitches
                        .iter()
                        .map(|p| {
                            let tag_groups = match &p.tags {
                                Some(tags) if !tags.is_empty() => vec![TagGroup {
                                    dictionary: dictionary.clone(),
                                    tag_names: tags.clone(),
                                }],
                                _ => vec![],
                            };
                            PitchAccent {
                                position: p.position,
                                nasal_positions: p
                                    .nasal
                                    .as_ref()
                                    .map(|n| n.to_vec())
                                    .unwrap_or_default(),
                                devoice_positions: p
                                    .devoice
                                    .as_ref()
                                    .map(|d| d.to_vec())
                                    .unwrap_or_default(),
                                tags: vec![],
                                tag_groups,
                            }
                        })
                        .collect();
                    for target in reading_targets {
                        let pronunciations = &mut entries[target.entry_index].pronunciations;
                        pronunciations.push(TermPronunciation {
                            index: pronunciations.len(),
                            headword_index: target.headword_index,
                            dictionary: dictionary.clone(),
                            dictionary_index,
                            dictionary_priority,
                            pitches: pitches.clone(),
                        });
                    }
                }
            }
        }
    }
}

/// Attaches frequency rows to kanji entries; `metas` index into `entries`.
pub(crate) fn add_kanji_meta(
    entries: &mut [KanjiDictionaryEntry],
    metas: Vec<KanjiMetaEntry>,
    dictionary_order: impl Fn(&str) -> (usize, i64),
) {
    for KanjiMetaEntry {
        index,
        character,
        frequency,
        dictionary,
    } in metas
    {
        let Some(entry) = entries.get_mut(index) else {
            continue;
        };
        let (dictionary_index, dictionary_priority) = dictionary_order(&dictionary);
        let info = FrequencyInfo::from_data(&frequency);
        entry.frequencies.push(KanjiFrequency {
            index: entry.frequencies.len(),
            dictionary,
            dictionary_index,
            dictionary_priority,
            character,
            frequency: info.frequency,
            display_value: info.display_value,
            display_value_parsed: info.display_value_parsed,
        });
    }
}

/// Flat frequency list for `(term, reading)` pairs.
///
/// A row restricted to a different reading is dropped unless the request had
/// no reading, in which case the row's reading is reported.
pub(crate) fn create_term_frequencies(
    term_reading_list: &[(String, Option<String>)],
    metas: Vec<TermMetaEntry>,
) -> Vec<TermFrequencySimple> {
    let mut results = Vec::new();
    for TermMetaEntry {
        index,
        data,
        dictionary,
        ..
    } in metas
    {
        let TermMetaData::Freq(freq) = data else {
            continue;
        };
        let Some((term, requested_reading)) = term_reading_list.get(index) else {
            continue;
        };
        let mut reading = requested_reading.clone();
        let has_reading = freq.reading().is_some();
        if let Some(data_reading) = freq.reading() {
            if requested_reading.as_deref() != Some(data_reading) {
                if requested_reading.is_some() {
                    continue;
                }
                reading = Some(data_reading.to_string());
            }
        }
        let info = FrequencyInfo::from_data(freq.frequency());
        results.push(TermFrequencySimple {
            term: term.clone(),
            reading,
            dictionary,
            has_reading,
            frequency: info.frequency,
            display_value: info.display_value,
            display_value_parsed: info.display_value_parsed,
        });
    }
    results
}

fn frequency_order(min: f64, max: f64, ascending: bool) -> f64 {
    if min <= max {
        if ascending {
            min
        } else {
            -max
        }
    } else if ascending {
        NO_FREQUENCY_ASCENDING
    } else {
        0.0
    }
}

/// Sets `frequency_order` on entries and their definitions from `dictionary`'s frequencies.
pub(crate) fn update_sort_frequencies(
    entries: &mut [TermDictionaryEntry],
    dictionary: &str,
    ascending: bool,
) {
    for entry in entries.iter_mut() {
        let mut by_headword: IndexMap<usize, f64> = IndexMap::new();
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for frequency in entry.frequencies.iter().filter(|f| f.dictionary == dictionary) {
            by_headword.insert(frequency.headword_index, frequency.frequency);
            min = min.min(frequency.frequency);
            max = max.max(frequency.frequency);
        }
        entry.frequency_order = frequency_order(min, max, ascending);

        for definition in &mut entry.definitions {
            let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
            for frequency in definition
                .headword_indices
                .iter()
                .filter_map(|i| by_headword.get(i))
            {
                min = min.min(*frequency);
                max = max.max(*frequency);
            }
            definition.frequency_order = frequency_order(min, max, ascending);
        }
    }
}

#[cfg(test)]
mod term_meta_tests {
    use super::{convert_string_to_number, frequency_order, FrequencyInfo, NO_FREQUENCY_ASCENDING};
    use crate::dictionary_data::GenericFreqData;
    use pretty_assertions::assert_eq;

    #[test]
    fn frequency_payloads_normalize() {
        assert_eq!(
            FrequencyInfo::from_data(&GenericFreqData::Number(12.0)),
            FrequencyInfo {
                frequency: 12.0,
                display_value: None,
                display_value_parsed: false
            }
        );
        assert_eq!(
            FrequencyInfo::from_data(&GenericFreqData::from("1,234 (rare)")),
            FrequencyInfo {
                frequency: 1.0,
                display_value: Some("1,234 (rare)".into()),
                display_value_parsed: true
            }
        );
        assert_eq!(
            FrequencyInfo::from_data(&GenericFreqData::Object {
                value: None,
                display_value: Some("★".into())
            }),
            FrequencyInfo {
                frequency: 0.0,
                display_value: Some("★".into()),
                display_value_parsed: false
            }
        );
    }

    #[test]
    fn leading_numbers() {
        assert_eq!(convert_string_to_number("rank 2.5e2 words"), 250.0);
        assert_eq!(convert_string_to_number("-7"), -7.0);
        assert_eq!(convert_string_to_number(".5"), 0.5);
        assert_eq!(convert_string_to_number("none"), 0.0);
    }

    #[test]
    fn frequency_order_fallbacks() {
        assert_eq!(frequency_order(3.0, 9.0, true), 3.0);
        assert_eq!(frequency_order(3.0, 9.0, false), -9.0);
        assert_eq!(
            frequency_order(f64::INFINITY, f64::NEG_INFINITY, true),
            NO_FREQUENCY_ASCENDING
        );
        assert_eq!(frequency_order(f64::INFINITY, f64::NEG_INFINITY, false), 0.0);
    }
}
