use std::sync::Arc;

use crate::{
    backend::{find_terms_options, FindTermsDetails},
    database::dictionary_database::DictionaryDatabase,
    deinflector::Deinflector,
    dictionary::TermDictionaryEntry,
    settings::ProfileOptions,
    translation::FindTermsMode,
    translator::{FindTermsResult, Translator, TranslatorResult},
};

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '？', '！'];

/// Represents the full sentence context for a search result.
///
/// * offset: The character offset of the original search text within the full sentence text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    pub text: String,
    pub offset: usize,
}

/// The final, structured result of a term search.
#[derive(Debug, Clone, PartialEq)]
pub struct TermSearchResults {
    pub dictionary_entries: Vec<TermDictionaryEntry>,
    /// Characters of the scanned text covered by the longest match.
    pub matched_text_length: usize,
    pub sentence: Sentence,
}

/// Reads a window of text at a position, looks it up and
/// extracts the sentence around the match.
#[derive(Debug)]
pub struct TextScanner {
    translator: Translator,
    /// How far back and forward to scan for sentence boundaries.
    sentence_scan_extent: usize,
    /// Whether a newline character should terminate a sentence.
    sentence_terminate_at_newlines: bool,
}

impl TextScanner {
    pub fn new(db: Arc<DictionaryDatabase>, deinflector: Deinflector) -> TranslatorResult<Self> {
        Ok(Self {
            translator: Translator::new(db, deinflector)?,
            sentence_scan_extent: 50,
            sentence_terminate_at_newlines: true,
        })
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn set_sentence_scan_extent(&mut self, extent: usize) {
        self.sentence_scan_extent = extent;
    }

    pub fn set_sentence_terminate_at_newlines(&mut self, terminate: bool) {
        self.sentence_terminate_at_newlines = terminate;
    }

    /// Scans `full_text` starting at the character index `start_position`.
    ///
    /// At most `options.scanning.length` characters are looked up.
    /// Returns `Ok(None)` when nothing was found.
    pub fn search(
        &self,
        full_text: &str,
        start_position: usize,
        options: &ProfileOptions,
    ) -> TranslatorResult<Option<TermSearchResults>> {
        let search_text =
            get_text_source_content(full_text, start_position, options.scanning.length);
        if search_text.is_empty() {
            return Ok(None);
        }

        let mode = FindTermsMode::from(options.general.result_output_mode);
        let FindTermsResult {
            dictionary_entries,
            matched_text_length,
        } = self.find_term_dictionary_entries(mode, search_text, options)?;
        if dictionary_entries.is_empty() {
            return Ok(None);
        }

        let sentence = self.extract_sentence(full_text, start_position, matched_text_length);
        Ok(Some(TermSearchResults {
            dictionary_entries,
            matched_text_length,
            sentence,
        }))
    }

    fn find_term_dictionary_entries(
        &self,
        mode: FindTermsMode,
        search_text: &str,
        options: &ProfileOptions,
    ) -> TranslatorResult<FindTermsResult> {
        let details = FindTermsDetails {
            match_type: Some(options.scanning.match_type),
            deinflect: Some(options.scanning.deinflect),
        };
        let find_terms_options = find_terms_options(mode, &details, options);
        self.translator
            .find_terms(mode, search_text, &find_terms_options)
    }

    /// Extracts the full sentence surrounding the found term.
    ///
    /// # Arguments
    /// * start_position: The character index where the scan started.
    /// * parsed_length: The number of characters that were parsed.
    pub fn extract_sentence(
        &self,
        full_text: &str,
        start_position: usize,
        parsed_length: usize,
    ) -> Sentence {
        let chars: Vec<char> = full_text.chars().collect();
        let start = start_position.min(chars.len());
        let parsed_end = (start + parsed_length).min(chars.len());
        let context_start = start.saturating_sub(self.sentence_scan_extent);
        let context_end = (parsed_end + self.sentence_scan_extent).min(chars.len());

        // the sentence starts after the last terminator before the scan position
        let sentence_start = (context_start..start)
            .rev()
            .find(|&i| self.is_terminator(chars[i]))
            .map_or(context_start, |i| i + 1);
        // and ends at (inclusive) the first terminator after the match
        let sentence_end = (parsed_end..context_end)
            .find(|&i| self.is_terminator(chars[i]))
            .map_or(context_end, |i| i + 1);

        let sentence = &chars[sentence_start..sentence_end];
        let leading = sentence.iter().take_while(|c| c.is_whitespace()).count();
        let trailing = sentence[leading..]
            .iter()
            .rev()
            .take_while(|c| c.is_whitespace())
            .count();
        let text: String = sentence[leading..sentence.len() - trailing].iter().collect();
        let offset = start
            .saturating_sub(sentence_start)
            .saturating_sub(leading);

        Sentence { text, offset }
    }

    fn is_terminator(&self, c: char) -> bool {
        SENTENCE_TERMINATORS.contains(&c) || (c == '\n' && self.sentence_terminate_at_newlines)
    }
}

/// At most `scan_length` characters of `full_text`, starting at the character index `start_position`.
pub fn get_text_source_content(full_text: &str, start_position: usize, scan_length: usize) -> &str {
    let Some((start_byte, _)) = full_text.char_indices().nth(start_position) else {
        return "";
    };
    let rest = &full_text[start_byte..];
    match rest.char_indices().nth(scan_length) {
        Some((end_byte, _)) => &rest[..end_byte],
        None => rest,
    }
}

/// The strings searched for `text` when case should not matter.
///
/// Text before an apostrophe is searched as well, so possessives
/// find their base word.
pub fn get_search_case_variants(text: &str) -> Vec<String> {
    let mut variants = case_variants(text).to_vec();
    if let Some((index, _)) = text
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '\'' | '’' | '´'))
    {
        let base = &text[..index];
        variants.extend(case_variants(base).into_iter().take(3));
    }

    let mut unique: Vec<String> = Vec::with_capacity(variants.len());
    for variant in variants {
        if !unique.contains(&variant) {
            unique.push(variant);
        }
    }
    unique
}

/// `[first lower, first upper, lower, text]`
fn case_variants(text: &str) -> [String; 4] {
    let mut chars = text.chars();
    let (first_lower, first_upper) = match chars.next() {
        Some(first) => {
            let rest = chars.as_str();
            (
                first.to_lowercase().chain(rest.chars()).collect(),
                first.to_uppercase().chain(rest.chars()).collect(),
            )
        }
        None => (String::new(), String::new()),
    };
    [first_lower, first_upper, text.to_lowercase(), text.to_string()]
}

#[cfg(test)]
mod text_scanner_tests {
    use pretty_assertions::assert_eq;

    use super::{get_search_case_variants, get_text_source_content, Sentence};
    use crate::test_utils;

    #[test]
    fn possessive_case_variants() {
        assert_eq!(
            get_search_case_variants("Apple's"),
            vec!["apple's", "Apple's", "apple", "Apple"]
        );
        assert_eq!(get_search_case_variants("word"), vec!["word", "Word"]);
        assert_eq!(
            get_search_case_variants("BIG’s"),
            vec!["bIG’s", "BIG’s", "big’s", "bIG", "BIG", "big"]
        );
        // a leading apostrophe is part of the word
        assert_eq!(get_search_case_variants("'tis"), vec!["'tis"]);
    }

    #[test]
    fn scan_window_counts_chars() {
        assert_eq!(get_text_source_content("日本語の本", 1, 2), "本語");
        assert_eq!(get_text_source_content("日本語", 1, 20), "本語");
        assert_eq!(get_text_source_content("日本語", 3, 20), "");
    }

    #[test]
    fn sentence_around_match() {
        let scanner = test_utils::text_scanner();
        let text = "前の文。 本を読んだ！次の文";
        assert_eq!(
            scanner.extract_sentence(text, 7, 3),
            Sentence {
                text: "本を読んだ！".to_string(),
                offset: 2
            }
        );

        let text = "一行目\n二行目";
        assert_eq!(
            scanner.extract_sentence(text, 4, 1),
            Sentence {
                text: "二行目".to_string(),
                offset: 0
            }
        );
    }

    #[test]
    fn newlines_can_be_ignored() {
        let mut scanner = test_utils::text_scanner();
        scanner.set_sentence_terminate_at_newlines(false);
        let text = "一行目\n二行目";
        assert_eq!(
            scanner.extract_sentence(text, 4, 1),
            Sentence {
                text: "一行目\n二行目".to_string(),
                offset: 4
            }
        );
    }

    #[test]
    fn search_reports_sentence() {
        let scanner = test_utils::text_scanner();
        let options = test_utils::profile_options(&["basic"]);
        let results = scanner
            .search("昨日、本を読んだ。", 5, &options)
            .unwrap()
            .unwrap();
        assert_eq!(results.dictionary_entries[0].headwords[0].term, "読む");
        assert_eq!(results.matched_text_length, 3);
        assert_eq!(results.sentence.text, "昨日、本を読んだ。");
        assert_eq!(results.sentence.offset, 5);

        assert_eq!(scanner.search("昨日", 0, &options).unwrap(), None);
    }
}
