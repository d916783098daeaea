//! Tag lookups for dictionary entries.
//!
//! Tag names on rows are resolved against the owning dictionary's tag bank.
//! Results (including misses) are cached per `(dictionary, base name)` until
//! [TagResolver::clear] is called.

use std::cmp::Ordering;

use icu::collator::CollatorBorrowed;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::{
    database::{
        dictionary_database::{
            DatabaseResult, DictionaryDatabase, GenericQueryRequest, QueryType,
        },
        dictionary_rows::DatabaseTag,
    },
    dictionary::{DictionaryTag, TagGroup, TermDefinition},
};

/// Anything that can answer bulk tag queries.
///
/// The result must be aligned with `queries`.
pub trait TagMetaSource {
    fn find_tag_meta_bulk(
        &self,
        queries: &[GenericQueryRequest],
    ) -> DatabaseResult<Vec<Option<DatabaseTag>>>;
}

impl TagMetaSource for DictionaryDatabase {
    fn find_tag_meta_bulk(
        &self,
        queries: &[GenericQueryRequest],
    ) -> DatabaseResult<Vec<Option<DatabaseTag>>> {
        DictionaryDatabase::find_tag_meta_bulk(self, queries)
    }
}

/// `dictionary -> tag base name -> row`; `None` caches a miss.
type TagCache = IndexMap<String, IndexMap<String, Option<DatabaseTag>>>;

/// The resolved tag rows of one lookup, keyed like the cache.
pub type ResolvedTags = IndexMap<(String, String), Option<DatabaseTag>>;

#[derive(Debug, Default)]
pub struct TagResolver {
    cache: RwLock<TagCache>,
}

impl TagResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached tag. Needed whenever the installed dictionaries change.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Number of cached `(dictionary, name)` pairs, misses included.
    pub fn cached_len(&self) -> usize {
        self.cache.read().values().map(IndexMap::len).sum()
    }

    /// Resolves `(dictionary, tag name)` pairs.
    ///
    /// Names are looked up by their base (the part before the first `:`).
    /// Everything the cache can't answer is fetched in a single bulk query.
    pub fn resolve(
        &self,
        source: &impl TagMetaSource,
        requests: impl IntoIterator<Item = (String, String)>,
    ) -> DatabaseResult<ResolvedTags> {
        let mut resolved = ResolvedTags::new();
        let mut misses: IndexSet<(String, String)> = IndexSet::new();
        {
            let cache = self.cache.read();
            for (dictionary, name) in requests {
                let key = (dictionary, get_name_base(&name).to_string());
                if resolved.contains_key(&key) || misses.contains(&key) {
                    continue;
                }
                match cache.get(&key.0).and_then(|tags| tags.get(&key.1)) {
                    Some(tag) => {
                        resolved.insert(key, tag.clone());
                    }
                    None => {
                        misses.insert(key);
                    }
                }
            }
        }
        log::trace!("tag cache: {} hits, {} misses", resolved.len(), misses.len());
        if misses.is_empty() {
            return Ok(resolved);
        }

        let queries: Vec<GenericQueryRequest> = misses
            .iter()
            .map(|(dictionary, name)| {
                GenericQueryRequest::new(QueryType::String(name.clone()), dictionary)
            })
            .collect();
        let rows = source.find_tag_meta_bulk(&queries)?;

        let mut cache = self.cache.write();
        for ((dictionary, name), row) in misses.into_iter().zip(rows) {
            cache
                .entry(dictionary.clone())
                .or_default()
                .entry(name.clone())
                .or_insert_with(|| row.clone());
            resolved.insert((dictionary, name), row);
        }
        Ok(resolved)
    }
}

/// The part of a tag name before the first `:`.
pub fn get_name_base(name: &str) -> &str {
    match name.find(':') {
        Some(index) => &name[..index],
        None => name,
    }
}

/// Builds the [DictionaryTag] for `name`, falling back to the `default` category.
pub fn create_tag(name: &str, dictionary: &str, row: Option<&DatabaseTag>) -> DictionaryTag {
    let Some(row) = row else {
        return DictionaryTag::new_default(name, dictionary);
    };
    let category = if row.category.is_empty() {
        "default".to_string()
    } else {
        row.category.clone()
    };
    let content = if row.notes.is_empty() {
        vec![]
    } else {
        vec![row.notes.clone()]
    };
    DictionaryTag {
        name: name.to_string(),
        category,
        order: row.order,
        score: row.score,
        content,
        dictionaries: vec![dictionary.to_string()],
        redundant: false,
    }
}

/// Expands pending tag groups into `tags`, merging and sorting the result.
pub fn expand_tag_groups(
    tags: &mut Vec<DictionaryTag>,
    tag_groups: &mut Vec<TagGroup>,
    resolved: &ResolvedTags,
    collator: &CollatorBorrowed<'static>,
) {
    for TagGroup {
        dictionary,
        tag_names,
    } in tag_groups.drain(..)
    {
        for name in tag_names {
            let key = (dictionary.clone(), get_name_base(&name).to_string());
            let row = resolved.get(&key).and_then(Option::as_ref);
            tags.push(create_tag(&name, &dictionary, row));
        }
    }
    merge_similar_tags(tags);
    sort_tags(tags, collator);
}

/// Collapses tags with the same name and category.
///
/// The survivor keeps the lowest order, the highest score and the
/// union of contents and dictionaries.
pub fn merge_similar_tags(tags: &mut Vec<DictionaryTag>) {
    let mut merged: Vec<DictionaryTag> = Vec::with_capacity(tags.len());
    for tag in tags.drain(..) {
        match merged
            .iter_mut()
            .find(|other| other.name == tag.name && other.category == tag.category)
        {
            Some(existing) => {
                existing.order = existing.order.min(tag.order);
                existing.score = existing.score.max(tag.score);
                for content in tag.content {
                    if !existing.content.contains(&content) {
                        existing.content.push(content);
                    }
                }
                for dictionary in tag.dictionaries {
                    if !existing.dictionaries.contains(&dictionary) {
                        existing.dictionaries.push(dictionary);
                    }
                }
            }
            None => merged.push(tag),
        }
    }
    *tags = merged;
}

pub fn sort_tags(tags: &mut [DictionaryTag], collator: &CollatorBorrowed<'static>) {
    if tags.len() <= 1 {
        return;
    }
    tags.sort_by(|a, b| match a.order.cmp(&b.order) {
        Ordering::Equal => collator.compare(&a.name, &b.name),
        ord => ord,
    });
}

/// Adds `names` to the group of `dictionary`, keeping names unique.
pub fn add_tag_names(tag_groups: &mut Vec<TagGroup>, dictionary: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    let group = match tag_groups
        .iter()
        .position(|group| group.dictionary == dictionary)
    {
        Some(position) => &mut tag_groups[position],
        None => {
            tag_groups.push(TagGroup {
                dictionary: dictionary.to_string(),
                tag_names: Vec::new(),
            });
            let last = tag_groups.len() - 1;
            &mut tag_groups[last]
        }
    };
    for name in names {
        if !group.tag_names.contains(name) {
            group.tag_names.push(name.clone());
        }
    }
}

/// Merges `source` groups into `target`.
pub fn merge_tag_groups(target: &mut Vec<TagGroup>, source: &[TagGroup]) {
    for group in source {
        add_tag_names(target, &group.dictionary, &group.tag_names);
    }
}

/// Every `(dictionary, name)` pair referenced by `tag_groups`.
pub fn tag_group_requests(tag_groups: &[TagGroup]) -> impl Iterator<Item = (String, String)> + '_ {
    tag_groups.iter().flat_map(|group| {
        group
            .tag_names
            .iter()
            .map(|name| (group.dictionary.clone(), name.clone()))
    })
}

/// Marks part-of-speech tags that repeat the previous definition of the same dictionary.
pub fn flag_redundant_definition_tags(definitions: &mut [TermDefinition]) {
    let mut last_dictionary: Option<String> = None;
    let mut last_part_of_speech = String::new();
    for definition in definitions.iter_mut() {
        let mut names: Vec<&str> = definition
            .tags
            .iter()
            .filter(|tag| tag.category == "partOfSpeech")
            .map(|tag| tag.name.as_str())
            .collect();
        names.sort_unstable();
        let part_of_speech = names.join("\u{1f}");

        if last_dictionary.as_deref() != Some(definition.dictionary.as_str()) {
            last_dictionary = Some(definition.dictionary.clone());
            last_part_of_speech.clear();
        }
        if last_part_of_speech == part_of_speech {
            for tag in &mut definition.tags {
                if tag.category == "partOfSpeech" {
                    tag.redundant = true;
                }
            }
        } else {
            last_part_of_speech = part_of_speech;
        }
    }
}

#[cfg(test)]
mod tag_resolver_tests {
    use std::cell::Cell;

    use icu::{
        collator::{options::CollatorOptions, Collator},
        locale::locale,
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::tag_row;

    /// Counts how often the store is asked.
    struct CountingSource {
        db: DictionaryDatabase,
        calls: Cell<usize>,
    }

    impl TagMetaSource for CountingSource {
        fn find_tag_meta_bulk(
            &self,
            queries: &[GenericQueryRequest],
        ) -> DatabaseResult<Vec<Option<DatabaseTag>>> {
            self.calls.set(self.calls.get() + 1);
            self.db.find_tag_meta_bulk(queries)
        }
    }

    fn source() -> CountingSource {
        let db = DictionaryDatabase::new_prepared().unwrap();
        db.bulk_add([
            crate::database::dictionary_rows::DictionaryRow::Tag(tag_row(
                "n", "partOfSpeech", -3, "noun", "jmdict",
            )),
            crate::database::dictionary_rows::DictionaryRow::Tag(tag_row(
                "P", "popular", 10, "popular term", "jmdict",
            )),
        ])
        .unwrap();
        CountingSource {
            db,
            calls: Cell::new(0),
        }
    }

    fn collator() -> CollatorBorrowed<'static> {
        Collator::try_new(locale!("en-US").into(), CollatorOptions::default()).unwrap()
    }

    #[test]
    fn cache_answers_repeated_requests() {
        let source = source();
        let resolver = TagResolver::new();
        let requests = || {
            vec![
                ("jmdict".to_string(), "n".to_string()),
                ("jmdict".to_string(), "missing".to_string()),
            ]
        };

        let first = resolver.resolve(&source, requests()).unwrap();
        assert_eq!(source.calls.get(), 1);
        let second = resolver.resolve(&source, requests()).unwrap();
        assert_eq!(source.calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(resolver.cached_len(), 2);

        resolver.clear();
        assert_eq!(resolver.cached_len(), 0);
        resolver.resolve(&source, requests()).unwrap();
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn names_resolve_by_base() {
        let source = source();
        let resolver = TagResolver::new();
        let resolved = resolver
            .resolve(&source, [("jmdict".to_string(), "n:suffix".to_string())])
            .unwrap();
        let row = resolved
            .get(&("jmdict".to_string(), "n".to_string()))
            .cloned()
            .flatten();
        assert_eq!(row.map(|r| r.notes), Some("noun".to_string()));
    }

    #[test]
    fn groups_expand_into_sorted_merged_tags() {
        let source = source();
        let resolver = TagResolver::new();
        let mut groups = vec![];
        add_tag_names(&mut groups, "jmdict", &["P".into(), "n".into(), "zz".into()]);
        add_tag_names(&mut groups, "other", &["n".into()]);
        add_tag_names(&mut groups, "jmdict", &["n".into()]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].tag_names, vec!["P", "n", "zz"]);

        let resolved = resolver
            .resolve(&source, tag_group_requests(&groups).collect::<Vec<_>>())
            .unwrap();
        let mut tags = vec![];
        expand_tag_groups(&mut tags, &mut groups, &resolved, &collator());
        assert!(groups.is_empty());

        let summary: Vec<(&str, &str, i64)> = tags
            .iter()
            .map(|t| (t.name.as_str(), t.category.as_str(), t.order))
            .collect();
        // "n" from `other` has no row there, so it stays a separate default tag.
        assert_eq!(
            summary,
            vec![
                ("n", "partOfSpeech", -3),
                ("n", "default", 0),
                ("zz", "default", 0),
                ("P", "popular", 10),
            ]
        );
        assert_eq!(tags[0].content, vec!["noun".to_string()]);
    }

    #[test]
    fn similar_tags_merge() {
        let mut a = DictionaryTag::new_default("n", "d1");
        a.order = 2;
        a.content = vec!["noun".into()];
        let mut b = DictionaryTag::new_default("n", "d2");
        b.order = 1;
        b.score = 5;
        b.content = vec!["noun".into(), "name".into()];
        let mut tags = vec![a, b];
        merge_similar_tags(&mut tags);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].order, 1);
        assert_eq!(tags[0].score, 5);
        assert_eq!(tags[0].content, vec!["noun".to_string(), "name".to_string()]);
        assert_eq!(tags[0].dictionaries, vec!["d1".to_string(), "d2".to_string()]);
    }
}
