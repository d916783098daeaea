use std::{collections::HashSet, sync::LazyLock};

use indexmap::{IndexMap, IndexSet};
use native_db::{
    db_type::{KeyOptions, ToKeyDefinition},
    Builder as DBBuilder, Database, Models, ToInput,
};
use native_model::Model as NativeModelTrait;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    database::dictionary_rows::{
        DatabaseDictData, DatabaseKanjiEntry, DatabaseKanjiEntryKey, DatabaseKanjiMeta,
        DatabaseKanjiMetaKey, DatabaseMedia, DatabaseMediaKey, DatabaseTag, DatabaseTagKey,
        DatabaseTermEntry, DatabaseTermEntryKey, DatabaseTermMeta, DatabaseTermMetaKey,
        DictionaryRow, FindMultiBulkData, KanjiEntry, KanjiMetaEntry, RowId, TermEntry,
        TermMetaEntry,
    },
    dictionary::{TermSourceMatchSource, TermSourceMatchType},
    dictionary_data::DictionarySummary,
};

#[derive(thiserror::Error, Debug)]
pub enum DictionaryDatabaseError {
    #[error("the dictionary store is not prepared (or has been closed)")]
    StoreNotReady,
    #[error("cannot import {0} as it is already installed\n[help]: delete it first if you are attempting to update it")]
    DictionaryAlreadyExists(String),
    #[error("dictionary `{0}` is not installed")]
    DictionaryNotFound(String),
    #[error("row of dictionary `{found}` cannot be imported as part of `{expected}`")]
    DictionaryMismatch { expected: String, found: String },
    #[error("native_db error: {0}")]
    Database(#[from] native_db::db_type::Error),
    #[error("failed to parse dictionary data: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DatabaseResult<T> = Result<T, DictionaryDatabaseError>;

/// A set of dictionary names a query is restricted to.
pub trait DictionarySet: Sync + Send {
    fn has(&self, value: &str) -> bool;
}

impl DictionarySet for IndexSet<String> {
    fn has(&self, value: &str) -> bool {
        self.contains(value)
    }
}
impl DictionarySet for HashSet<String> {
    fn has(&self, value: &str) -> bool {
        self.contains(value)
    }
}
impl<V: Send + Sync> DictionarySet for IndexMap<String, V> {
    fn has(&self, value: &str) -> bool {
        self.contains_key(value)
    }
}
impl<T: DictionarySet + ?Sized> DictionarySet for &T {
    fn has(&self, value: &str) -> bool {
        (**self).has(value)
    }
}

/// Describes the kind of secondary key to query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecondaryKeyQueryKind {
    Expression,
    Reading,
    Sequence,
    ExpressionReverse,
    ReadingReverse,
    Character,
    Name,
    Path,
}

/// A value stored in a secondary index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Str(String),
    Int(i64),
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Str(value.to_string())
    }
}
impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::Str(value)
    }
}
impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Int(value)
    }
}

/// Represents the type of query to perform on an index.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryInfo {
    Exact(IndexKey),
    /// Every string key in `[prefix, prefix + U+10FFFF)`.
    Prefix(String),
}

/// Anything that can be used as the key of a bulk query.
pub trait QueryItem {
    fn query_key(&self) -> IndexKey;
}

impl QueryItem for String {
    fn query_key(&self) -> IndexKey {
        IndexKey::Str(self.clone())
    }
}
impl QueryItem for &str {
    fn query_key(&self) -> IndexKey {
        IndexKey::Str(self.to_string())
    }
}
impl QueryItem for i64 {
    fn query_key(&self) -> IndexKey {
        IndexKey::Int(*self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TermExactQueryRequest {
    pub term: String,
    pub reading: String,
}

impl QueryItem for TermExactQueryRequest {
    fn query_key(&self) -> IndexKey {
        IndexKey::Str(self.term.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Eq, PartialOrd, Ord, Hash)]
pub enum QueryType {
    String(String),
    Sequence(i64),
}

/// A query restricted to one dictionary (tags, media and sequences).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Eq, PartialOrd, Ord, Hash)]
pub struct GenericQueryRequest {
    pub query_type: QueryType,
    pub dictionary: String,
}

impl GenericQueryRequest {
    pub fn new(query_type: QueryType, dictionary: &str) -> Self {
        Self {
            query_type,
            dictionary: dictionary.to_string(),
        }
    }
    pub fn from_query_type_slice_to_vec(queries: &[QueryType], dictionary: &str) -> Vec<Self> {
        queries
            .iter()
            .map(|q| Self::new(q.clone(), dictionary))
            .collect()
    }
}

impl QueryItem for GenericQueryRequest {
    fn query_key(&self) -> IndexKey {
        match &self.query_type {
            QueryType::String(s) => IndexKey::Str(s.clone()),
            QueryType::Sequence(n) => IndexKey::Int(*n),
        }
    }
}

/// A row returned by one of the generic bulk queries.
#[derive(Clone, Debug, PartialEq)]
pub struct FindMultiBulkResult<M> {
    pub row: M,
    pub item_index: usize,
    pub index_index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub index: usize,
    pub data: DatabaseMedia,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryCountGroup {
    pub terms: usize,
    pub term_meta: usize,
    pub kanji: usize,
    pub kanji_meta: usize,
    pub tag_meta: usize,
    pub media: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DictionaryCounts {
    pub total: Option<DictionaryCountGroup>,
    pub counts: Vec<DictionaryCountGroup>,
}

fn define_models() -> Result<Models, native_db::db_type::Error> {
    let mut models = Models::new();
    models.define::<DictionarySummary>()?;
    models.define::<DatabaseTermEntry>()?;
    models.define::<DatabaseTermMeta>()?;
    models.define::<DatabaseKanjiEntry>()?;
    models.define::<DatabaseKanjiMeta>()?;
    models.define::<DatabaseTag>()?;
    models.define::<DatabaseMedia>()?;
    Ok(models)
}

pub static DB_MODELS: LazyLock<Models> =
    LazyLock::new(|| define_models().expect("store models must have unique ids"));

/// A row type stored in one of the store's tables.
pub trait DatabaseModel: NativeModelTrait + ToInput + Clone + Send + Sync + 'static {
    /// The native_db key enum generated for the model.
    type Key: ToKeyDefinition<KeyOptions> + Send + Sync + 'static;

    /// The secondary key holding the owning dictionary's title.
    fn dictionary_key() -> Self::Key;
    /// Maps a query kind to the model's secondary key, if it has one.
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<Self::Key>;
}

macro_rules! impl_model_basics {
    ($key:ident) => {
        type Key = $key;
        fn dictionary_key() -> $key {
            $key::dictionary
        }
    };
}

impl DatabaseModel for DatabaseTermEntry {
    impl_model_basics!(DatabaseTermEntryKey);
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<DatabaseTermEntryKey> {
        match kind {
            SecondaryKeyQueryKind::Expression => Some(DatabaseTermEntryKey::expression),
            SecondaryKeyQueryKind::Reading => Some(DatabaseTermEntryKey::reading),
            SecondaryKeyQueryKind::Sequence => Some(DatabaseTermEntryKey::sequence),
            SecondaryKeyQueryKind::ExpressionReverse => {
                Some(DatabaseTermEntryKey::expression_reverse)
            }
            SecondaryKeyQueryKind::ReadingReverse => Some(DatabaseTermEntryKey::reading_reverse),
            _ => None,
        }
    }
}

impl DatabaseModel for DatabaseTermMeta {
    impl_model_basics!(DatabaseTermMetaKey);
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<DatabaseTermMetaKey> {
        match kind {
            SecondaryKeyQueryKind::Expression => Some(DatabaseTermMetaKey::expression),
            _ => None,
        }
    }
}

impl DatabaseModel for DatabaseKanjiEntry {
    impl_model_basics!(DatabaseKanjiEntryKey);
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<DatabaseKanjiEntryKey> {
        match kind {
            SecondaryKeyQueryKind::Character => Some(DatabaseKanjiEntryKey::character),
            _ => None,
        }
    }
}

impl DatabaseModel for DatabaseKanjiMeta {
    impl_model_basics!(DatabaseKanjiMetaKey);
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<DatabaseKanjiMetaKey> {
        match kind {
            SecondaryKeyQueryKind::Character => Some(DatabaseKanjiMetaKey::character),
            _ => None,
        }
    }
}

impl DatabaseModel for DatabaseTag {
    impl_model_basics!(DatabaseTagKey);
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<DatabaseTagKey> {
        match kind {
            SecondaryKeyQueryKind::Name => Some(DatabaseTagKey::name),
            _ => None,
        }
    }
}

impl DatabaseModel for DatabaseMedia {
    impl_model_basics!(DatabaseMediaKey);
    fn secondary_key(kind: SecondaryKeyQueryKind) -> Option<DatabaseMediaKey> {
        match kind {
            SecondaryKeyQueryKind::Path => Some(DatabaseMediaKey::path),
            _ => None,
        }
    }
}

/// Rows of `M` whose `key` satisfies `query`, in key order then id order.
///
/// Integer keys only exist on the optional `sequence` field.
fn scan_secondary<M: DatabaseModel>(
    db: &Database<'static>,
    key: M::Key,
    query: &QueryInfo,
) -> Result<Vec<M>, native_db::db_type::Error> {
    let r_txn = db.r_transaction()?;
    let scan = r_txn.scan().secondary::<M>(key)?;
    let rows = match query {
        QueryInfo::Exact(IndexKey::Str(value)) => scan
            .range(value.clone()..=value.clone())?
            .collect::<Result<Vec<M>, _>>()?,
        QueryInfo::Exact(IndexKey::Int(value)) => scan
            .range(Some(*value)..=Some(*value))?
            .collect::<Result<Vec<M>, _>>()?,
        QueryInfo::Prefix(prefix) => scan
            .start_with(prefix.clone())?
            .collect::<Result<Vec<M>, _>>()?,
    };
    Ok(rows)
}

fn get_summary(
    db: &Database<'static>,
    title: &str,
) -> Result<Option<DictionarySummary>, native_db::db_type::Error> {
    let r_txn = db.r_transaction()?;
    let summary = r_txn.get().primary(title.to_string())?;
    Ok(summary)
}

/// Every row of `$model` owned by `$dictionary`, read through `$txn`.
macro_rules! dictionary_rows {
    ($txn:expr, $model:ty, $dictionary:expr) => {{
        let rows: Vec<$model> = $txn
            .scan()
            .secondary::<$model>(<$model as DatabaseModel>::dictionary_key())?
            .range($dictionary.to_string()..=$dictionary.to_string())?
            .collect::<Result<Vec<$model>, _>>()?;
        rows
    }};
}

/// Removes every row of `$model` owned by `$dictionary` and yields the count.
macro_rules! remove_dictionary_rows {
    ($rw:expr, $model:ty, $dictionary:expr) => {{
        let rows = dictionary_rows!($rw, $model, $dictionary);
        let count = rows.len();
        for row in rows {
            $rw.remove(row)?;
        }
        count
    }};
}

/// An open store: the in-memory database and the last row id handed out.
struct OpenStore {
    db: Database<'static>,
    last_id: RowId,
}

impl OpenStore {
    /// Writes `summaries` and `rows` in one transaction, assigning fresh row ids.
    fn insert(
        &mut self,
        summaries: &[DictionarySummary],
        rows: Vec<DictionaryRow>,
    ) -> DatabaseResult<usize> {
        let mut last_id = self.last_id;
        let count = rows.len();
        let rw = self.db.rw_transaction()?;
        for summary in summaries {
            rw.insert(summary.clone())?;
        }
        for row in rows {
            last_id += 1;
            match row {
                DictionaryRow::Term(mut row) => {
                    if row.expression_reverse.is_empty() {
                        row.expression_reverse = row.expression.chars().rev().collect();
                    }
                    if row.reading_reverse.is_empty() {
                        row.reading_reverse = row.reading.chars().rev().collect();
                    }
                    row.id = last_id;
                    rw.insert(row)?;
                }
                DictionaryRow::Kanji(mut row) => {
                    row.id = last_id;
                    rw.insert(row)?;
                }
                DictionaryRow::TermMeta(mut row) => {
                    row.id = last_id;
                    rw.insert(row)?;
                }
                DictionaryRow::KanjiMeta(mut row) => {
                    row.id = last_id;
                    rw.insert(row)?;
                }
                DictionaryRow::Tag(mut row) => {
                    row.id = last_id;
                    rw.insert(row)?;
                }
                DictionaryRow::Media(mut row) => {
                    row.id = last_id;
                    rw.insert(row)?;
                }
            }
        }
        rw.commit()?;
        self.last_id = last_id;
        Ok(count)
    }

    fn counts_for(&self, dictionary: &str) -> DatabaseResult<DictionaryCountGroup> {
        let r_txn = self.db.r_transaction()?;
        Ok(DictionaryCountGroup {
            terms: dictionary_rows!(r_txn, DatabaseTermEntry, dictionary).len(),
            term_meta: dictionary_rows!(r_txn, DatabaseTermMeta, dictionary).len(),
            kanji: dictionary_rows!(r_txn, DatabaseKanjiEntry, dictionary).len(),
            kanji_meta: dictionary_rows!(r_txn, DatabaseKanjiMeta, dictionary).len(),
            tag_meta: dictionary_rows!(r_txn, DatabaseTag, dictionary).len(),
            media: dictionary_rows!(r_txn, DatabaseMedia, dictionary).len(),
        })
    }

    fn summaries(&self) -> DatabaseResult<Vec<DictionarySummary>> {
        let r_txn = self.db.r_transaction()?;
        let summaries = r_txn
            .scan()
            .primary::<DictionarySummary>()?
            .start_with(String::new())?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }
}

/// In-memory dictionary store backed by native_db.
///
/// The store must be [prepared](DictionaryDatabase::prepare) before use;
/// every read or write on an unprepared or closed store fails with
/// [DictionaryDatabaseError::StoreNotReady].
#[derive(Default)]
pub struct DictionaryDatabase {
    state: RwLock<Option<OpenStore>>,
}

impl DictionaryDatabase {
    /// Creates an unprepared store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that is ready for use.
    pub fn new_prepared() -> DatabaseResult<Self> {
        let db = Self::new();
        db.prepare()?;
        Ok(db)
    }

    /// Opens the store. Preparing an open store keeps its contents.
    pub fn prepare(&self) -> DatabaseResult<()> {
        let mut state = self.state.write();
        if state.is_none() {
            let db = DBBuilder::new().create_in_memory(&DB_MODELS)?;
            *state = Some(OpenStore { db, last_id: 0 });
        }
        Ok(())
    }

    /// Closes the store, releasing every row.
    pub fn close(&self) {
        *self.state.write() = None;
    }

    pub fn is_prepared(&self) -> bool {
        self.state.read().is_some()
    }

    fn store(&self) -> DatabaseResult<MappedRwLockReadGuard<'_, OpenStore>> {
        RwLockReadGuard::try_map(self.state.read(), |state| state.as_ref())
            .map_err(|_| DictionaryDatabaseError::StoreNotReady)
    }

    /// Writers hold the lock exclusively so row ids and summaries stay consistent.
    fn store_mut(&self) -> DatabaseResult<MappedRwLockWriteGuard<'_, OpenStore>> {
        RwLockWriteGuard::try_map(self.state.write(), |state| state.as_mut())
            .map_err(|_| DictionaryDatabaseError::StoreNotReady)
    }

    /*************** Writes ***************/

    /// Inserts rows, assigning each a fresh id. Returns the number of rows added.
    ///
    /// A row naming a dictionary with no summary gets a placeholder summary
    /// (empty revision), so everything added here can later be deleted.
    pub fn bulk_add(&self, rows: impl IntoIterator<Item = DictionaryRow>) -> DatabaseResult<usize> {
        let mut store = self.store_mut()?;
        let rows: Vec<DictionaryRow> = rows.into_iter().collect();
        let titles: IndexSet<&str> = rows.iter().map(DictionaryRow::dictionary).collect();
        let mut summaries = Vec::new();
        for title in titles {
            if get_summary(&store.db, title)?.is_none() {
                log::debug!("bulk_add: recording a placeholder summary for `{title}`");
                summaries.push(DictionarySummary::new(title, ""));
            }
        }
        let count = store.insert(&summaries, rows)?;
        log::trace!("bulk_add: inserted {count} rows");
        Ok(count)
    }

    /// Installs a dictionary together with all of its rows.
    ///
    /// Every row must belong to the dictionary being installed.
    pub fn import_dictionary(&self, data: DatabaseDictData) -> DatabaseResult<DictionarySummary> {
        let mut store = self.store_mut()?;
        let title = data.summary.title.clone();
        if get_summary(&store.db, &title)?.is_some() {
            return Err(DictionaryDatabaseError::DictionaryAlreadyExists(title));
        }
        let (summary, rows) = data.into_rows();
        if let Some(row) = rows.iter().find(|row| row.dictionary() != title) {
            return Err(DictionaryDatabaseError::DictionaryMismatch {
                expected: title,
                found: row.dictionary().to_string(),
            });
        }
        let row_count = store.insert(std::slice::from_ref(&summary), rows)?;
        log::debug!("imported dictionary `{title}` ({row_count} rows)");
        Ok(summary)
    }

    /// Parses a [DatabaseDictData] json document and installs it.
    pub fn import_dictionary_json(&self, json: &str) -> DatabaseResult<DictionarySummary> {
        let data: DatabaseDictData = serde_json::from_str(json)?;
        self.import_dictionary(data)
    }

    /// Removes a dictionary and every row it owns.
    pub fn delete_dictionary(&self, dictionary: &str) -> DatabaseResult<DictionaryCountGroup> {
        let store = self.store_mut()?;
        let rw = store.db.rw_transaction()?;
        let summary: Option<DictionarySummary> = rw.get().primary(dictionary.to_string())?;
        let Some(summary) = summary else {
            return Err(DictionaryDatabaseError::DictionaryNotFound(
                dictionary.to_string(),
            ));
        };
        let removed = DictionaryCountGroup {
            terms: remove_dictionary_rows!(rw, DatabaseTermEntry, dictionary),
            term_meta: remove_dictionary_rows!(rw, DatabaseTermMeta, dictionary),
            kanji: remove_dictionary_rows!(rw, DatabaseKanjiEntry, dictionary),
            kanji_meta: remove_dictionary_rows!(rw, DatabaseKanjiMeta, dictionary),
            tag_meta: remove_dictionary_rows!(rw, DatabaseTag, dictionary),
            media: remove_dictionary_rows!(rw, DatabaseMedia, dictionary),
        };
        rw.remove(summary)?;
        rw.commit()?;
        log::debug!("deleted dictionary `{dictionary}`: {removed:?}");
        Ok(removed)
    }

    /*************** Summaries ***************/

    /// Every installed dictionary, ordered by title.
    pub fn get_dictionary_info(&self) -> DatabaseResult<Vec<DictionarySummary>> {
        self.store()?.summaries()
    }

    pub fn get_dictionary_counts(
        &self,
        dictionary_names: &[impl AsRef<str>],
        get_total: bool,
    ) -> DatabaseResult<DictionaryCounts> {
        let store = self.store()?;
        let total = if get_total {
            let mut total = DictionaryCountGroup::default();
            for summary in store.summaries()? {
                let counts = store.counts_for(&summary.title)?;
                total.terms += counts.terms;
                total.term_meta += counts.term_meta;
                total.kanji += counts.kanji;
                total.kanji_meta += counts.kanji_meta;
                total.tag_meta += counts.tag_meta;
                total.media += counts.media;
            }
            Some(total)
        } else {
            None
        };
        let counts = dictionary_names
            .iter()
            .map(|name| store.counts_for(name.as_ref()))
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(DictionaryCounts { total, counts })
    }

    /*************** Generic bulk queries ***************/

    /// Runs `create_query(item)` against every index in `index_kinds` for every item.
    ///
    /// The `items × indices` lookups run in parallel; results are joined
    /// and returned ordered by item, then index, then row id. Nothing is
    /// returned unless every lookup completed.
    pub fn find_multi_bulk<M, I, R, Q, P, C>(
        &self,
        index_kinds: &[SecondaryKeyQueryKind],
        items: &[I],
        create_query: Q,
        predicate: P,
        create_result: C,
    ) -> DatabaseResult<Vec<R>>
    where
        M: DatabaseModel,
        I: Sync,
        R: Send,
        Q: Fn(&I) -> QueryInfo + Sync,
        P: Fn(&M, &I) -> bool + Sync,
        C: Fn(M, &I, usize, usize) -> R + Sync,
    {
        let store = self.store()?;
        let index_count = index_kinds.len();
        if items.is_empty() || index_count == 0 {
            return Ok(vec![]);
        }
        let db = &store.db;
        log::trace!(
            "find_multi_bulk: {} items x {} indices",
            items.len(),
            index_count
        );

        let batches = (0..items.len() * index_count)
            .into_par_iter()
            .map(|n| -> DatabaseResult<Vec<R>> {
                let item_index = n / index_count;
                let index_index = n % index_count;
                let item = &items[item_index];
                let Some(key) = M::secondary_key(index_kinds[index_index]) else {
                    return Ok(vec![]);
                };
                let query = create_query(item);
                Ok(scan_secondary::<M>(db, key, &query)?
                    .into_iter()
                    .filter(|row| predicate(row, item))
                    .map(|row| create_result(row, item, item_index, index_index))
                    .collect())
            })
            .collect::<DatabaseResult<Vec<Vec<R>>>>()?;

        Ok(batches.into_iter().flatten().collect())
    }

    fn find_keyed<M, I, P>(
        &self,
        index_kinds: &[SecondaryKeyQueryKind],
        items: &[I],
        create_query: impl Fn(&I) -> QueryInfo + Sync,
        predicate: P,
    ) -> DatabaseResult<Vec<FindMultiBulkResult<M>>>
    where
        M: DatabaseModel,
        I: QueryItem + Sync,
        P: Fn(&M, &I) -> bool + Sync,
    {
        self.find_multi_bulk(
            index_kinds,
            items,
            create_query,
            predicate,
            |row: M, _item: &I, item_index, index_index| FindMultiBulkResult {
                row,
                item_index,
                index_index,
            },
        )
    }

    /// Rows whose index value equals the item's key.
    pub fn find_by_exact<M, I, P>(
        &self,
        index_kinds: &[SecondaryKeyQueryKind],
        items: &[I],
        predicate: P,
    ) -> DatabaseResult<Vec<FindMultiBulkResult<M>>>
    where
        M: DatabaseModel,
        I: QueryItem + Sync,
        P: Fn(&M, &I) -> bool + Sync,
    {
        self.find_keyed(
            index_kinds,
            items,
            |item| QueryInfo::Exact(item.query_key()),
            predicate,
        )
    }

    /// Rows whose index value starts with the item's key.
    pub fn find_by_prefix<M, I, P>(
        &self,
        index_kinds: &[SecondaryKeyQueryKind],
        items: &[I],
        predicate: P,
    ) -> DatabaseResult<Vec<FindMultiBulkResult<M>>>
    where
        M: DatabaseModel,
        I: QueryItem + Sync,
        P: Fn(&M, &I) -> bool + Sync,
    {
        self.find_keyed(
            index_kinds,
            items,
            |item| match item.query_key() {
                IndexKey::Str(key) => QueryInfo::Prefix(key),
                key => QueryInfo::Exact(key),
            },
            predicate,
        )
    }

    /// Rows whose value ends with the item's key.
    ///
    /// `index_kinds` must name reversed-field indices: each key is reversed
    /// and prefix-queried against them.
    pub fn find_by_suffix<M, I, P>(
        &self,
        index_kinds: &[SecondaryKeyQueryKind],
        items: &[I],
        predicate: P,
    ) -> DatabaseResult<Vec<FindMultiBulkResult<M>>>
    where
        M: DatabaseModel,
        I: QueryItem + Sync,
        P: Fn(&M, &I) -> bool + Sync,
    {
        self.find_keyed(
            index_kinds,
            items,
            |item| match item.query_key() {
                IndexKey::Str(key) => QueryInfo::Prefix(key.chars().rev().collect()),
                key => QueryInfo::Exact(key),
            },
            predicate,
        )
    }

    /// The first row (by id) matching each item, aligned with `items`.
    pub fn find_first<M, I, P>(
        &self,
        index_kind: SecondaryKeyQueryKind,
        items: &[I],
        predicate: P,
    ) -> DatabaseResult<Vec<Option<M>>>
    where
        M: DatabaseModel,
        I: QueryItem + Sync,
        P: Fn(&M, &I) -> bool + Sync,
    {
        let store = self.store()?;
        if items.is_empty() {
            return Ok(vec![]);
        }
        let db = &store.db;
        let found = items
            .par_iter()
            .map(|item| -> DatabaseResult<Option<M>> {
                let Some(key) = M::secondary_key(index_kind) else {
                    return Ok(None);
                };
                let query = QueryInfo::Exact(item.query_key());
                let rows = scan_secondary::<M>(db, key, &query)?;
                Ok(rows.into_iter().find(|row| predicate(row, item)))
            })
            .collect::<DatabaseResult<Vec<Option<M>>>>()?;
        Ok(found)
    }

    /*************** Typed queries ***************/

    /// Finds terms whose expression or reading matches any of `term_list`.
    ///
    /// Each row id is returned at most once, for the first item/index that
    /// produced it.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn find_terms_bulk(
        &self,
        term_list: &[impl AsRef<str> + Sync],
        dictionaries: &impl DictionarySet,
        match_type: TermSourceMatchType,
    ) -> DatabaseResult<Vec<TermEntry>> {
        let terms: Vec<&str> = term_list.iter().map(|t| t.as_ref()).collect();
        let predicate =
            |row: &DatabaseTermEntry, _: &&str| dictionaries.has(&row.dictionary);
        let rows = match match_type {
            TermSourceMatchType::Exact => self.find_by_exact(
                &[SecondaryKeyQueryKind::Expression, SecondaryKeyQueryKind::Reading],
                &terms,
                predicate,
            )?,
            TermSourceMatchType::Prefix => self.find_by_prefix(
                &[SecondaryKeyQueryKind::Expression, SecondaryKeyQueryKind::Reading],
                &terms,
                predicate,
            )?,
            TermSourceMatchType::Suffix => self.find_by_suffix(
                &[
                    SecondaryKeyQueryKind::ExpressionReverse,
                    SecondaryKeyQueryKind::ReadingReverse,
                ],
                &terms,
                predicate,
            )?,
        };

        let mut visited_ids: HashSet<RowId> = HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|result| visited_ids.insert(result.row.id))
            .map(|result| {
                let FindMultiBulkResult {
                    row,
                    item_index,
                    index_index,
                } = result;
                row.into_term_generic(
                    match_type,
                    FindMultiBulkData {
                        item: terms[item_index],
                        item_index,
                        index_index,
                    },
                )
            })
            .collect())
    }

    /// Finds terms matching both the expression and reading of each request.
    pub fn find_terms_exact_bulk(
        &self,
        term_list: &[TermExactQueryRequest],
        dictionaries: &impl DictionarySet,
    ) -> DatabaseResult<Vec<TermEntry>> {
        let rows = self.find_by_exact(
            &[SecondaryKeyQueryKind::Expression],
            term_list,
            |row: &DatabaseTermEntry, request: &TermExactQueryRequest| {
                row.reading == request.reading && dictionaries.has(&row.dictionary)
            },
        )?;
        Ok(rows
            .into_iter()
            .map(|result| {
                result.row.into_term_entry_specific(
                    TermSourceMatchSource::Term,
                    TermSourceMatchType::Exact,
                    result.item_index,
                )
            })
            .collect())
    }

    /// Finds terms by sequence number, each request restricted to its own dictionary.
    pub fn find_terms_by_sequence_bulk(
        &self,
        items: &[GenericQueryRequest],
    ) -> DatabaseResult<Vec<TermEntry>> {
        let rows = self.find_by_exact(
            &[SecondaryKeyQueryKind::Sequence],
            items,
            |row: &DatabaseTermEntry, request: &GenericQueryRequest| {
                row.dictionary == request.dictionary
            },
        )?;
        Ok(rows
            .into_iter()
            .map(|result| {
                result.row.into_term_entry_specific(
                    TermSourceMatchSource::Sequence,
                    TermSourceMatchType::Exact,
                    result.item_index,
                )
            })
            .collect())
    }

    pub fn find_term_meta_bulk(
        &self,
        term_list: &[impl AsRef<str> + Sync],
        dictionaries: &impl DictionarySet,
    ) -> DatabaseResult<Vec<TermMetaEntry>> {
        let terms: Vec<&str> = term_list.iter().map(|t| t.as_ref()).collect();
        let rows = self.find_by_exact(
            &[SecondaryKeyQueryKind::Expression],
            &terms,
            |row: &DatabaseTermMeta, _: &&str| dictionaries.has(&row.dictionary),
        )?;
        Ok(rows
            .into_iter()
            .map(|result| {
                let DatabaseTermMeta {
                    expression,
                    data,
                    dictionary,
                    ..
                } = result.row;
                TermMetaEntry {
                    index: result.item_index,
                    term: expression,
                    data,
                    dictionary,
                }
            })
            .collect())
    }

    pub fn find_kanji_bulk(
        &self,
        kanji_list: &[impl AsRef<str> + Sync],
        dictionaries: &impl DictionarySet,
    ) -> DatabaseResult<Vec<KanjiEntry>> {
        let kanji: Vec<&str> = kanji_list.iter().map(|k| k.as_ref()).collect();
        let rows = self.find_by_exact(
            &[SecondaryKeyQueryKind::Character],
            &kanji,
            |row: &DatabaseKanjiEntry, _: &&str| dictionaries.has(&row.dictionary),
        )?;
        Ok(rows
            .into_iter()
            .map(|result| result.row.into_kanji_entry(result.item_index))
            .collect())
    }

    pub fn find_kanji_meta_bulk(
        &self,
        kanji_list: &[impl AsRef<str> + Sync],
        dictionaries: &impl DictionarySet,
    ) -> DatabaseResult<Vec<KanjiMetaEntry>> {
        let kanji: Vec<&str> = kanji_list.iter().map(|k| k.as_ref()).collect();
        let rows = self.find_by_exact(
            &[SecondaryKeyQueryKind::Character],
            &kanji,
            |row: &DatabaseKanjiMeta, _: &&str| dictionaries.has(&row.dictionary),
        )?;
        Ok(rows
            .into_iter()
            .map(|result| {
                let DatabaseKanjiMeta {
                    character,
                    frequency,
                    dictionary,
                    ..
                } = result.row;
                KanjiMetaEntry {
                    index: result.item_index,
                    character,
                    frequency,
                    dictionary,
                }
            })
            .collect())
    }

    /// Finds tag metadata for a list of tag names and their respective dictionaries.
    ///
    /// The result is aligned with `queries`; `None` where no tag exists.
    pub fn find_tag_meta_bulk(
        &self,
        queries: &[GenericQueryRequest],
    ) -> DatabaseResult<Vec<Option<DatabaseTag>>> {
        self.find_first(
            SecondaryKeyQueryKind::Name,
            queries,
            |row: &DatabaseTag, request: &GenericQueryRequest| row.dictionary == request.dictionary,
        )
    }

    pub fn find_tag_for_title(
        &self,
        name: &str,
        dictionary: &str,
    ) -> DatabaseResult<Option<DatabaseTag>> {
        let query = GenericQueryRequest::new(QueryType::String(name.to_string()), dictionary);
        Ok(self.find_tag_meta_bulk(&[query])?.into_iter().flatten().next())
    }

    pub fn get_media(&self, items: &[GenericQueryRequest]) -> DatabaseResult<Vec<Media>> {
        let rows = self.find_by_exact(
            &[SecondaryKeyQueryKind::Path],
            items,
            |row: &DatabaseMedia, request: &GenericQueryRequest| row.dictionary == request.dictionary,
        )?;
        Ok(rows
            .into_iter()
            .map(|result| Media {
                index: result.item_index,
                data: result.row,
            })
            .collect())
    }
}

#[cfg(test)]
mod ycd {
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;

    use super::{
        DictionaryDatabase, DictionaryDatabaseError, GenericQueryRequest, QueryType,
        SecondaryKeyQueryKind, TermExactQueryRequest,
    };
    use crate::{
        database::dictionary_rows::{
            DatabaseDictData, DatabaseMedia, DatabaseTermEntry, DictionaryRow,
        },
        dictionary::{TermSourceMatchSource, TermSourceMatchType},
        dictionary_data::{DictionarySummary, TermGlossary},
        test_utils::{self, basic_dictionary, tag_row, term_row},
    };

    fn dictionaries(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn small_db() -> DictionaryDatabase {
        let db = DictionaryDatabase::new_prepared().unwrap();
        let mut sequenced = term_row("読む", "よむ", "v5", &["to read"], "jmdict");
        sequenced.sequence = Some(1);
        let mut reading = term_row("読み", "よみ", "", &["reading"], "jmdict");
        reading.sequence = Some(1);
        db.bulk_add([
            DictionaryRow::Term(sequenced),
            DictionaryRow::Term(reading),
            DictionaryRow::Term(term_row("よむ", "よむ", "v5", &["kana entry"], "other")),
            DictionaryRow::Term(term_row("雪読む", "ゆきよむ", "v5", &["snow reading"], "jmdict")),
            DictionaryRow::Tag(tag_row("v5", "partOfSpeech", 0, "godan verb", "jmdict")),
            DictionaryRow::Tag(tag_row("v5", "pos", 1, "godan", "other")),
        ])
        .unwrap();
        db
    }

    #[test]
    fn unprepared_and_closed_store_are_not_ready() {
        let db = DictionaryDatabase::new();
        let empty: [&str; 0] = [];
        assert!(matches!(
            db.find_terms_bulk(&empty, &dictionaries(&[]), TermSourceMatchType::Exact),
            Err(DictionaryDatabaseError::StoreNotReady)
        ));

        db.prepare().unwrap();
        assert!(db.is_prepared());
        assert!(db
            .find_terms_bulk(&empty, &dictionaries(&[]), TermSourceMatchType::Exact)
            .unwrap()
            .is_empty());

        db.close();
        assert!(matches!(
            db.bulk_add(Vec::<DictionaryRow>::new()),
            Err(DictionaryDatabaseError::StoreNotReady)
        ));
    }

    #[test]
    fn find_terms_bulk_exact_matches_expression_and_reading() {
        let db = small_db();
        let entries = db
            .find_terms_bulk(&["よむ"], &dictionaries(&["jmdict", "other"]), TermSourceMatchType::Exact)
            .unwrap();
        let found: Vec<(&str, TermSourceMatchSource)> = entries
            .iter()
            .map(|e| (e.term.as_str(), e.match_source))
            .collect();
        // "よむ" (other) matches through both indices but is returned once.
        assert_eq!(
            found,
            vec![
                ("よむ", TermSourceMatchSource::Term),
                ("読む", TermSourceMatchSource::Reading),
            ]
        );
        assert!(entries
            .iter()
            .all(|e| e.match_type == TermSourceMatchType::Exact));
    }

    #[test]
    fn find_terms_bulk_respects_dictionary_set() {
        let db = small_db();
        let entries = db
            .find_terms_bulk(&["よむ"], &dictionaries(&["jmdict"]), TermSourceMatchType::Exact)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "読む");
        assert_eq!(entries[0].rules, vec!["v5".to_string()]);
        assert_eq!(entries[0].sequence, 1);
    }

    #[test]
    fn prefix_and_suffix_queries() {
        let db = small_db();
        let dicts = dictionaries(&["jmdict"]);
        let prefix = db
            .find_terms_bulk(&["読"], &dicts, TermSourceMatchType::Prefix)
            .unwrap();
        let mut terms: Vec<&str> = prefix.iter().map(|e| e.term.as_str()).collect();
        terms.sort();
        assert_eq!(terms, vec!["読み", "読む"]);
        assert!(prefix
            .iter()
            .all(|e| e.match_type == TermSourceMatchType::Prefix));

        let suffix = db
            .find_terms_bulk(&["読む"], &dicts, TermSourceMatchType::Suffix)
            .unwrap();
        let terms: Vec<(&str, TermSourceMatchType)> = suffix
            .iter()
            .map(|e| (e.term.as_str(), e.match_type))
            .collect();
        assert_eq!(
            terms,
            vec![
                ("読む", TermSourceMatchType::Exact),
                ("雪読む", TermSourceMatchType::Suffix)
            ]
        );
    }

    #[test]
    fn generic_queries_annotate_item_and_index() {
        let db = small_db();
        let items = ["missing", "よむ"];
        let results = db
            .find_by_exact(
                &[SecondaryKeyQueryKind::Expression, SecondaryKeyQueryKind::Reading],
                &items,
                |_: &DatabaseTermEntry, _: &&str| true,
            )
            .unwrap();
        let positions: Vec<(usize, usize, &str)> = results
            .iter()
            .map(|r| (r.item_index, r.index_index, r.row.expression.as_str()))
            .collect();
        assert_eq!(
            positions,
            vec![(1, 0, "よむ"), (1, 1, "読む"), (1, 1, "よむ")]
        );

        let none: [&str; 0] = [];
        let results = db
            .find_by_prefix(
                &[SecondaryKeyQueryKind::Expression],
                &none,
                |_: &DatabaseTermEntry, _: &&str| true,
            )
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn exact_and_sequence_bulk() {
        let db = small_db();
        let exact = db
            .find_terms_exact_bulk(
                &[TermExactQueryRequest {
                    term: "読む".into(),
                    reading: "よむ".into(),
                }],
                &dictionaries(&["jmdict"]),
            )
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].definitions, vec![TermGlossary::from("to read")]);

        let sequence = db
            .find_terms_by_sequence_bulk(&[GenericQueryRequest::new(
                QueryType::Sequence(1),
                "jmdict",
            )])
            .unwrap();
        let terms: Vec<&str> = sequence.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, vec!["読む", "読み"]);
        assert!(sequence
            .iter()
            .all(|e| e.match_source == TermSourceMatchSource::Sequence));
    }

    #[test]
    fn tag_meta_is_aligned_with_queries() {
        let db = small_db();
        let queries = GenericQueryRequest::from_query_type_slice_to_vec(
            &[QueryType::String("v5".into()), QueryType::String("n".into())],
            "other",
        );
        let tags = db.find_tag_meta_bulk(&queries).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].as_ref().map(|t| t.notes.as_str()), Some("godan"));
        assert_eq!(tags[1], None);
        assert_eq!(
            db.find_tag_for_title("v5", "jmdict")
                .unwrap()
                .map(|t| t.category),
            Some("partOfSpeech".to_string())
        );
    }

    #[test]
    fn import_and_delete_dictionary() {
        let db = DictionaryDatabase::new_prepared().unwrap();
        let data = DatabaseDictData {
            summary: DictionarySummary::new("test", "rev1"),
            term_list: vec![term_row("犬", "いぬ", "", &["dog"], "test")],
            tag_list: vec![tag_row("n", "partOfSpeech", 0, "noun", "test")],
            ..Default::default()
        };
        db.import_dictionary(data.clone()).unwrap();
        assert!(matches!(
            db.import_dictionary(data),
            Err(DictionaryDatabaseError::DictionaryAlreadyExists(name)) if name == "test"
        ));

        let counts = db.get_dictionary_counts(&["test"], true).unwrap();
        assert_eq!(counts.counts[0].terms, 1);
        assert_eq!(counts.total.map(|t| t.tag_meta), Some(1));

        let removed = db.delete_dictionary("test").unwrap();
        assert_eq!(removed.terms, 1);
        assert!(db.get_dictionary_info().unwrap().is_empty());
        assert!(db
            .find_terms_bulk(&["犬"], &dictionaries(&["test"]), TermSourceMatchType::Exact)
            .unwrap()
            .is_empty());
        assert!(matches!(
            db.delete_dictionary("test"),
            Err(DictionaryDatabaseError::DictionaryNotFound(_))
        ));
    }

    #[test]
    fn import_rejects_rows_of_another_dictionary() {
        let db = DictionaryDatabase::new_prepared().unwrap();
        let data = DatabaseDictData {
            summary: DictionarySummary::new("test", "rev1"),
            term_list: vec![
                term_row("犬", "いぬ", "", &["dog"], "test"),
                term_row("猫", "ねこ", "", &["cat"], "stray"),
            ],
            ..Default::default()
        };
        assert!(matches!(
            db.import_dictionary(data),
            Err(DictionaryDatabaseError::DictionaryMismatch { expected, found })
                if expected == "test" && found == "stray"
        ));
        assert!(db.get_dictionary_info().unwrap().is_empty());
        let counts = db.get_dictionary_counts(&["test", "stray"], true).unwrap();
        assert_eq!(counts.total, Some(Default::default()));
        assert!(counts.counts.iter().all(|c| c.terms == 0));
    }

    #[test]
    fn delete_leaves_every_table_empty() {
        let db = DictionaryDatabase::new_prepared().unwrap();
        let mut data = basic_dictionary();
        data.media_list = vec![DatabaseMedia {
            path: "img/book.png".into(),
            media_type: "image/png".into(),
            width: 1,
            height: 1,
            content: vec![0x89, 0x50],
            dictionary: "basic".into(),
            ..Default::default()
        }];
        db.import_dictionary(data).unwrap();

        let before = db.get_dictionary_counts(&["basic"], true).unwrap();
        assert_eq!(before.total.as_ref(), Some(&before.counts[0]));
        let removed = db.delete_dictionary("basic").unwrap();
        assert_eq!(removed, before.counts[0]);
        assert_eq!(
            (removed.terms, removed.term_meta, removed.kanji, removed.kanji_meta, removed.tag_meta, removed.media),
            (2, 2, 1, 1, 5, 1)
        );

        let after = db.get_dictionary_counts(&["basic"], true).unwrap();
        assert_eq!(after.total, Some(Default::default()));
        assert_eq!(after.counts, vec![Default::default()]);
        assert!(db.get_dictionary_info().unwrap().is_empty());
        let media = db
            .get_media(&[GenericQueryRequest::new(
                QueryType::String("img/book.png".into()),
                "basic",
            )])
            .unwrap();
        assert!(media.is_empty());
    }

    #[test]
    fn bulk_add_records_a_summary_for_new_dictionaries() {
        let db = small_db();
        let info = db.get_dictionary_info().unwrap();
        let titles: Vec<(&str, &str)> = info
            .iter()
            .map(|s| (s.title.as_str(), s.revision.as_str()))
            .collect();
        assert_eq!(titles, vec![("jmdict", ""), ("other", "")]);

        let removed = db.delete_dictionary("other").unwrap();
        assert_eq!((removed.terms, removed.tag_meta), (1, 1));
        let counts = db.get_dictionary_counts(&["other"], true).unwrap();
        assert_eq!(counts.counts[0], Default::default());
        assert_eq!(counts.total.map(|t| t.terms), Some(3));
    }

    #[test]
    fn lookups_from_several_threads_agree() {
        let db = small_db();
        let dicts = dictionaries(&["jmdict", "other"]);
        let expected = db
            .find_terms_bulk(&["よむ", "読"], &dicts, TermSourceMatchType::Prefix)
            .unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        db.find_terms_bulk(&["よむ", "読"], &dicts, TermSourceMatchType::Prefix)
                            .unwrap()
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn shared_fixture_is_prepared() {
        let db = &test_utils::SHARED_DB_INSTANCE;
        assert!(db.is_prepared());
        assert!(!db.get_dictionary_info().unwrap().is_empty());
    }
}
