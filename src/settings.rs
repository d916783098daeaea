use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    dictionary::TermSourceMatchType,
    translation::{FindTermsMode, FindTermsSortOrder},
};

/// Global Yomichan Settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YomichanOptions {
    pub version: String,
    pub profiles: Vec<YomichanProfile>,
    pub current_profile: usize,
}

impl Default for YomichanOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl YomichanOptions {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            profiles: vec![YomichanProfile::new("Default".to_string(), ProfileOptions::default())],
            current_profile: 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Gets the currently selected profile.
    /// Returns an error if the index is out of bounds.
    pub fn get_current_profile(&self) -> ProfileResult<&YomichanProfile> {
        self.profiles
            .get(self.current_profile)
            .ok_or(ProfileError::SelectedOutofBounds {
                selected: self.current_profile,
                len: self.profiles.len(),
            })
    }

    pub fn get_current_profile_mut(&mut self) -> ProfileResult<&mut YomichanProfile> {
        let len = self.profiles.len();
        let selected = self.current_profile;
        self.profiles
            .get_mut(selected)
            .ok_or(ProfileError::SelectedOutofBounds { selected, len })
    }

    /// Selects another profile, keeping the old selection on error.
    pub fn set_current_profile(&mut self, selected: usize) -> ProfileResult<()> {
        if selected >= self.profiles.len() {
            return Err(ProfileError::SelectedOutofBounds {
                selected,
                len: self.profiles.len(),
            });
        }
        self.current_profile = selected;
        Ok(())
    }
}

/// Returns `T` or  [ProfileError]
pub type ProfileResult<T> = Result<T, ProfileError>;
#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("tried to index selected_profile[selected], but profiles.len() = {len}")]
    SelectedOutofBounds { selected: usize, len: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct YomichanProfile {
    pub name: String,
    pub options: ProfileOptions,
}

impl YomichanProfile {
    pub fn new(name: String, options: ProfileOptions) -> Self {
        Self { name, options }
    }

    /// Gets the main dictionary for this [YomichanProfile]
    pub fn get_main_dictionary(&self) -> &str {
        self.options.main_dictionary()
    }
    /// Updates the main dictionary and returns the previous one
    pub fn set_main_dictionary(&mut self, new: String) -> String {
        self.options.set_main_dictionary(new)
    }
    /// Gets a ref to this profiles dictionaries
    pub fn dictionaries(&self) -> &IndexMap<String, DictionaryOptions> {
        &self.options.dictionaries
    }
    pub fn dictionaries_mut(&mut self) -> &mut IndexMap<String, DictionaryOptions> {
        &mut self.options.dictionaries
    }

    pub fn extend_dictionaries(
        &mut self,
        new: impl IntoIterator<Item = (String, DictionaryOptions)>,
    ) {
        self.options.dictionaries.extend(new);
    }

    pub fn get_dictionary_options_from_name(&self, find: &str) -> Option<&DictionaryOptions> {
        self.options.dictionaries.get(find)
    }
}

/// Lookup settings of a single profile.
///
/// # Usage
/// Can be used for seperating profiles by language or user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileOptions {
    pub general: GeneralOptions,
    pub scanning: ScanningOptions,
    pub translation: TranslationOptions,
    /// Installed dictionaries in priority order, keyed by title.
    pub dictionaries: IndexMap<String, DictionaryOptions>,
}

impl ProfileOptions {
    /// Gets the main dictionary for this [YomichanProfile] from it's [ProfileOptions]
    pub fn main_dictionary(&self) -> &str {
        self.general.main_dictionary.as_str()
    }
    /// Updates the current dictionary and returns the previous one
    pub fn set_main_dictionary(&mut self, new: String) -> String {
        std::mem::replace(&mut self.general.main_dictionary, new)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralOptions {
    pub result_output_mode: ResultOutputMode,
    /// The dictionary whose sequence numbers drive [ResultOutputMode::Merge].
    pub main_dictionary: String,
    pub sort_frequency_dictionary: Option<String>,
    pub sort_frequency_dictionary_order: FindTermsSortOrder,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanningOptions {
    /// How many characters are read from the scan position.
    pub length: usize,
    pub deinflect: bool,
    pub match_type: TermSourceMatchType,
}

impl Default for ScanningOptions {
    fn default() -> Self {
        Self {
            length: 16,
            deinflect: true,
            match_type: TermSourceMatchType::Exact,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslationOptions {
    pub convert_half_width_characters: TranslationConvertType,
    pub convert_numeric_characters: TranslationConvertType,
    pub convert_alphabetic_characters: TranslationConvertType,
    pub convert_hiragana_to_katakana: TranslationConvertType,
    pub convert_katakana_to_hiragana: TranslationConvertType,
    pub collapse_emphatic_sequences: TranslationCollapseEmphaticSequences,
    pub text_replacements: TranslationTextReplacementOptions,
    /// Stop reading the scanned text at the first non-Japanese character.
    pub remove_non_japanese_characters: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslationTextReplacementOptions {
    /// Also search the text without any replacement applied.
    pub search_original: bool,
    pub groups: Vec<Vec<TranslationTextReplacementGroup>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TranslationTextReplacementGroup {
    pub pattern: String,
    #[serde(default)]
    pub ignore_case: bool,
    pub replacement: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryOptions {
    /// The title of the dictionary.
    pub name: String,
    pub alias: String,
    /// Whether or not the dictionary will be used.
    pub enabled: bool,
    /// Higher priorities sort first.
    #[serde(default)]
    pub priority: i64,
    /// If you have two dictionaries, `Dict 1` and `Dict 2`:
    /// - Set the [`ResultOutputMode`] to `Merge`.
    /// - Choose `Dict 1` as the main dictionary for merged mode.
    /// - Enable `allow_secondary_searches` on `Dict 2`.
    ///   _(Can be enabled for multiple dictionaries)_.
    ///
    /// An _initial_ lookup in `Dict 1` fetches the merged definition,
    /// then the headwords from `Dict 1` are used for a secondary lookup in `Dict 2`,
    /// merging the two dictionary's definitions.
    #[serde(default)]
    pub allow_secondary_searches: bool,
}

impl DictionaryOptions {
    pub fn new(dict_name: String) -> Self {
        DictionaryOptions {
            name: dict_name.clone(),
            alias: dict_name,
            enabled: true,
            priority: 0,
            allow_secondary_searches: false,
        }
    }
}

/// When using the `Merge` mode, a Primary dictionary must be specified.
/// This should be a dictionary which contains related term information,
/// and configuring the Secondary dictionaries will allow definitions for the
/// related terms to be included from other dictionaries.
///
/// _Not all dictionaries are able to be selected as the Primary dictionary_.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResultOutputMode {
    /// No grouping.
    ///
    /// Every definition will be listed as a separate entry.
    Split,
    /// Group term-reading pairs.
    ///
    /// Definitions for the same term with the same reading will be grouped together.
    #[default]
    Group,
    /// Group related terms.
    ///
    /// Related terms that share the same definitions will be grouped together.
    Merge,
}

impl From<ResultOutputMode> for FindTermsMode {
    fn from(mode: ResultOutputMode) -> Self {
        match mode {
            ResultOutputMode::Split => FindTermsMode::Split,
            ResultOutputMode::Group => FindTermsMode::Group,
            ResultOutputMode::Merge => FindTermsMode::Merge,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationConvertType {
    #[default]
    False,
    True,
    /// Search both the converted and the unconverted text.
    Variant,
}

impl TranslationConvertType {
    /// The toggle values a lookup has to try.
    pub fn variants(self) -> &'static [bool] {
        match self {
            TranslationConvertType::False => &[false],
            TranslationConvertType::True => &[true],
            TranslationConvertType::Variant => &[false, true],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationCollapseEmphaticSequences {
    #[default]
    False,
    True,
    /// Also try removing emphatic runs entirely.
    Full,
}

impl TranslationCollapseEmphaticSequences {
    /// `(collapse, full_collapse)` pairs a lookup has to try.
    pub fn variants(self) -> &'static [(bool, bool)] {
        match self {
            TranslationCollapseEmphaticSequences::False => &[(false, false)],
            TranslationCollapseEmphaticSequences::True => &[(false, false), (true, false)],
            TranslationCollapseEmphaticSequences::Full => {
                &[(false, false), (true, false), (true, true)]
            }
        }
    }
}
