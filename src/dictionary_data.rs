//! Payload shapes carried by dictionary rows.
//!
//! These mirror the json shapes found in yomichan dictionary banks after
//! an importer has parsed them; the store never interprets them beyond
//! what lookups need.

use native_db::*;
use native_model::{native_model, rmp_serde_1_3::RmpSerdeNamed, Model};
use serde::{Deserialize, Serialize};

/// A single item of a term's glossary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermGlossary {
    /// Plain definition text.
    Text(String),
    /// Structured content, images and other rich payloads. Kept opaque.
    Content(serde_json::Value),
}

impl TermGlossary {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TermGlossary::Text(text) => Some(text),
            TermGlossary::Content(_) => None,
        }
    }
}

impl From<&str> for TermGlossary {
    fn from(value: &str) -> Self {
        TermGlossary::Text(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermMetaModeType {
    Freq,
    Pitch,
}

/// Frequency payload as found in term and kanji meta banks.
///
/// `Object` has only optional fields, so it has to stay last for
/// untagged deserialization to try the stricter shapes first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenericFreqData {
    Number(f64),
    String(String),
    Object {
        #[serde(default)]
        value: Option<f64>,
        #[serde(default, rename = "displayValue")]
        display_value: Option<String>,
    },
}

impl From<f64> for GenericFreqData {
    fn from(value: f64) -> Self {
        GenericFreqData::Number(value)
    }
}

impl From<&str> for GenericFreqData {
    fn from(value: &str) -> Self {
        GenericFreqData::String(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermMetaFreqDataWithReading {
    pub reading: String,
    pub frequency: GenericFreqData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermMetaFreqDataMatchType {
    WithReading(TermMetaFreqDataWithReading),
    Generic(GenericFreqData),
}

impl TermMetaFreqDataMatchType {
    pub fn reading(&self) -> Option<&str> {
        match self {
            TermMetaFreqDataMatchType::WithReading(data) => Some(&data.reading),
            TermMetaFreqDataMatchType::Generic(_) => None,
        }
    }

    pub fn frequency(&self) -> &GenericFreqData {
        match self {
            TermMetaFreqDataMatchType::WithReading(data) => &data.frequency,
            TermMetaFreqDataMatchType::Generic(data) => data,
        }
    }
}

/// `nasal` and `devoice` positions may be a single number or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VecNumOrNum {
    Vec(Vec<i64>),
    Num(i64),
}

impl VecNumOrNum {
    pub fn to_vec(&self) -> Vec<i64> {
        match self {
            VecNumOrNum::Vec(v) => v.clone(),
            VecNumOrNum::Num(n) => vec![*n],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMetaPitch {
    pub position: i64,
    #[serde(default)]
    pub nasal: Option<VecNumOrNum>,
    #[serde(default)]
    pub devoice: Option<VecNumOrNum>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMetaPitchData {
    pub reading: String,
    pub pitches: Vec<TermMetaPitch>,
}

/// The `mode`-discriminated payload of a term meta row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "data", rename_all = "lowercase")]
pub enum TermMetaData {
    Freq(TermMetaFreqDataMatchType),
    Pitch(TermMetaPitchData),
}

impl TermMetaData {
    pub fn mode(&self) -> TermMetaModeType {
        match self {
            TermMetaData::Freq(_) => TermMetaModeType::Freq,
            TermMetaData::Pitch(_) => TermMetaModeType::Pitch,
        }
    }
}

/// Metadata describing an installed dictionary.
///
/// Stored under its title; every row of the store belongs to one summary.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[native_model(id = 7, version = 1, with = RmpSerdeNamed)]
#[native_db]
pub struct DictionarySummary {
    #[primary_key]
    pub title: String,
    pub revision: String,
    #[serde(default)]
    pub sequenced: bool,
    #[serde(default)]
    pub version: u8,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attribution: Option<String>,
    #[serde(default)]
    pub source_language: Option<String>,
    #[serde(default)]
    pub target_language: Option<String>,
}

impl DictionarySummary {
    pub fn new(title: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            revision: revision.into(),
            version: 3,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod dictionary_data_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frequency_payload_shapes() {
        let with_reading: TermMetaFreqDataMatchType =
            serde_json::from_str(r#"{"reading":"よむ","frequency":{"value":120,"displayValue":"120㋕"}}"#)
                .unwrap();
        assert_eq!(with_reading.reading(), Some("よむ"));
        assert_eq!(
            with_reading.frequency(),
            &GenericFreqData::Object {
                value: Some(120.0),
                display_value: Some("120㋕".into())
            }
        );

        let number: TermMetaFreqDataMatchType = serde_json::from_str("42").unwrap();
        assert_eq!(number.frequency(), &GenericFreqData::Number(42.0));

        let string: TermMetaFreqDataMatchType = serde_json::from_str(r#""7 (rare)""#).unwrap();
        assert_eq!(string.reading(), None);
        assert_eq!(string.frequency(), &GenericFreqData::String("7 (rare)".into()));
    }

    #[test]
    fn pitch_positions_accept_number_or_list() {
        let data: TermMetaPitchData = serde_json::from_str(
            r#"{"reading":"はし","pitches":[{"position":2,"nasal":1},{"position":0,"devoice":[1,2],"tags":["P"]}]}"#,
        )
        .unwrap();
        assert_eq!(data.pitches[0].nasal.as_ref().map(VecNumOrNum::to_vec), Some(vec![1]));
        assert_eq!(data.pitches[1].devoice.as_ref().map(VecNumOrNum::to_vec), Some(vec![1, 2]));
        assert_eq!(data.pitches[1].tags, Some(vec!["P".to_string()]));
    }

    #[test]
    fn glossary_text_or_content() {
        let glossary: Vec<TermGlossary> =
            serde_json::from_str(r#"["to read", {"type":"structured-content","content":"x"}]"#).unwrap();
        assert_eq!(glossary[0].as_text(), Some("to read"));
        assert_eq!(glossary[1].as_text(), None);
    }
}
