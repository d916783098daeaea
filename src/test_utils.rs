use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;

use crate::{
    database::{
        dictionary_database::DictionaryDatabase,
        dictionary_rows::{
            DatabaseDictData, DatabaseKanjiEntry, DatabaseKanjiMeta, DatabaseTag,
            DatabaseTermEntry, DatabaseTermMeta, TermEntry,
        },
    },
    deinflector::Deinflector,
    dictionary::{TermDictionaryEntry, TermSourceMatchSource, TermSourceMatchType},
    dictionary_data::{
        DictionarySummary, GenericFreqData, TermMetaData, TermMetaFreqDataMatchType,
        TermMetaFreqDataWithReading, TermMetaPitch, TermMetaPitchData,
    },
    settings::{DictionaryOptions, ProfileOptions},
    text_scanner::TextScanner,
    translation::{EnabledDictionaryMap, FindTermDictionary, FindTermsOptions},
    translator::{create_term_dictionary_entry_from_database_entry, Translator},
};

/// A prepared store holding [basic_dictionary], shared by read-only tests.
pub(crate) static SHARED_DB_INSTANCE: LazyLock<DictionaryDatabase> = LazyLock::new(|| {
    let db = DictionaryDatabase::new_prepared()
        .expect("SHARED_DB_INSTANCE: failed to open the store");
    db.import_dictionary(basic_dictionary())
        .expect("SHARED_DB_INSTANCE: failed to import the basic dictionary");
    db
});

pub(crate) fn term_row(
    expression: &str,
    reading: &str,
    rules: &str,
    glossary: &[&str],
    dictionary: &str,
) -> DatabaseTermEntry {
    DatabaseTermEntry {
        expression: expression.into(),
        reading: reading.into(),
        rules: rules.into(),
        glossary: glossary.iter().map(|&g| g.into()).collect(),
        dictionary: dictionary.into(),
        ..Default::default()
    }
}

pub(crate) fn tag_row(
    name: &str,
    category: &str,
    order: i64,
    notes: &str,
    dictionary: &str,
) -> DatabaseTag {
    DatabaseTag {
        name: name.into(),
        category: category.into(),
        order,
        notes: notes.into(),
        dictionary: dictionary.into(),
        ..Default::default()
    }
}

pub(crate) fn freq_row(
    expression: &str,
    reading: Option<&str>,
    frequency: impl Into<GenericFreqData>,
    dictionary: &str,
) -> DatabaseTermMeta {
    let frequency = frequency.into();
    let data = match reading {
        Some(reading) => TermMetaFreqDataMatchType::WithReading(TermMetaFreqDataWithReading {
            reading: reading.into(),
            frequency,
        }),
        None => TermMetaFreqDataMatchType::Generic(frequency),
    };
    DatabaseTermMeta {
        id: 0,
        expression: expression.into(),
        data: TermMetaData::Freq(data),
        dictionary: dictionary.into(),
    }
}

pub(crate) fn pitch_row(
    expression: &str,
    reading: &str,
    position: i64,
    dictionary: &str,
) -> DatabaseTermMeta {
    DatabaseTermMeta {
        id: 0,
        expression: expression.into(),
        data: TermMetaData::Pitch(TermMetaPitchData {
            reading: reading.into(),
            pitches: vec![TermMetaPitch {
                position,
                nasal: None,
                devoice: None,
                tags: None,
            }],
        }),
        dictionary: dictionary.into(),
    }
}

/// An installable dictionary made of `terms` and `tags`.
pub(crate) fn dictionary(
    title: &str,
    terms: Vec<DatabaseTermEntry>,
    tags: Vec<DatabaseTag>,
) -> DatabaseDictData {
    DatabaseDictData {
        summary: DictionarySummary::new(title, "1"),
        term_list: terms,
        tag_list: tags,
        ..Default::default()
    }
}

/// `basic`: a verb, a noun, one kanji and their metadata.
pub(crate) fn basic_dictionary() -> DatabaseDictData {
    let mut read = term_row("読む", "よむ", "v5", &["to read"], "basic");
    read.definition_tags = Some("v5".into());
    read.sequence = Some(1);
    let mut book = term_row("本", "ほん", "", &["book"], "basic");
    book.definition_tags = Some("n".into());
    book.sequence = Some(2);

    let mut data = dictionary(
        "basic",
        vec![read, book],
        vec![
            tag_row("v5", "partOfSpeech", 0, "godan verb", "basic"),
            tag_row("n", "partOfSpeech", -3, "noun", "basic"),
            tag_row("jouyou", "frequent", 0, "included in list of regular-use characters", "basic"),
            tag_row("strokes", "misc", 1, "Stroke count", "basic"),
            tag_row("grade", "class", 0, "Jouyou grade", "basic"),
        ],
    );
    data.term_meta_list = vec![
        freq_row("読む", Some("よむ"), 100.0, "basic"),
        pitch_row("読む", "よむ", 1, "basic"),
    ];
    data.kanji_list = vec![DatabaseKanjiEntry {
        id: 0,
        character: "読".into(),
        onyomi: "ドク トク".into(),
        kunyomi: "よ.む".into(),
        tags: "jouyou".into(),
        meanings: vec!["read".into()],
        stats: IndexMap::from([
            ("strokes".to_string(), "14".to_string()),
            ("grade".to_string(), "2".to_string()),
            ("unknown".to_string(), "x".to_string()),
        ]),
        dictionary: "basic".into(),
    }];
    data.kanji_meta_list = vec![DatabaseKanjiMeta {
        id: 0,
        character: "読".into(),
        frequency: GenericFreqData::from(300.0),
        dictionary: "basic".into(),
    }];
    data
}

/// A translator over a fresh store holding `dictionaries`.
pub(crate) fn translator_with(
    dictionaries: impl IntoIterator<Item = DatabaseDictData>,
) -> Translator {
    Translator::new(Arc::new(db_with(dictionaries)), Deinflector::japanese().unwrap()).unwrap()
}

pub(crate) fn db_with(dictionaries: impl IntoIterator<Item = DatabaseDictData>) -> DictionaryDatabase {
    let db = DictionaryDatabase::new_prepared().unwrap();
    for data in dictionaries {
        db.import_dictionary(data).unwrap();
    }
    db
}

pub(crate) fn text_scanner() -> TextScanner {
    TextScanner::new(
        Arc::new(db_with([basic_dictionary()])),
        Deinflector::japanese().unwrap(),
    )
    .unwrap()
}

/// Lookup options over `names`, in order; the first name is the main dictionary.
pub(crate) fn find_terms_options(names: &[&str]) -> FindTermsOptions {
    FindTermsOptions {
        main_dictionary: names.first().map(|s| s.to_string()).unwrap_or_default(),
        enabled_dictionary_map: EnabledDictionaryMap::from_names(names),
        ..Default::default()
    }
}

/// A profile with `names` installed and enabled; the first name is the main dictionary.
pub(crate) fn profile_options(names: &[&str]) -> ProfileOptions {
    let mut options = ProfileOptions::default();
    for name in names {
        options
            .dictionaries
            .insert(name.to_string(), DictionaryOptions::new(name.to_string()));
    }
    if let Some(main) = names.first() {
        options.set_main_dictionary(main.to_string());
    }
    options
}

/// A primary single-headword, single-definition entry, as a lookup of `term` would build it.
pub(crate) fn single_entry(
    id: u64,
    term: &str,
    reading: &str,
    glossary: &str,
    dictionary: &str,
    dictionary_index: usize,
) -> TermDictionaryEntry {
    let row = TermEntry {
        id,
        index: 0,
        match_type: TermSourceMatchType::Exact,
        match_source: TermSourceMatchSource::Term,
        term: term.into(),
        reading: reading.into(),
        definition_tags: vec![],
        term_tags: vec![],
        rules: vec![],
        definitions: vec![glossary.into()],
        score: 0,
        dictionary: dictionary.into(),
        sequence: -1,
    };
    let mut enabled = EnabledDictionaryMap::default();
    enabled.insert(
        dictionary.to_string(),
        FindTermDictionary {
            index: dictionary_index,
            priority: 0,
            alias: dictionary.to_string(),
            allow_secondary_searches: false,
        },
    );
    create_term_dictionary_entry_from_database_entry(
        &row, term, term, term, vec![], true, &enabled,
    )
}
