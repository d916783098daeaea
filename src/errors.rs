use thiserror::Error;

use crate::{
    database::dictionary_database::DictionaryDatabaseError, deinflector::DeinflectorError,
    settings::ProfileError, translator::TranslatorError,
};

/// All possible `yomichan_lookup` [Error](std::error::Error) paths
#[derive(Error, Debug)]
pub enum YomichanError {
    #[error("(-)[yc_error::<db>] -> {0}")]
    Database(#[from] DictionaryDatabaseError),
    #[error("(-)[yc_error::<deinflector>] -> {0}")]
    Deinflector(#[from] DeinflectorError),
    #[error("(-)[yc_error::<translator>] -> {0}")]
    Translator(#[from] TranslatorError),
    #[error("(-)[yc_error::<profile>] -> {0}")]
    Profile(#[from] ProfileError),
    #[error("(-)[yc_error::<json>] -> {0}")]
    Json(#[from] serde_json::Error),
}

pub type YomichanResult<T> = Result<T, YomichanError>;

#[cfg(test)]
mod errors_tests {
    use super::YomichanError;
    use crate::{database::dictionary_database::DictionaryDatabaseError, settings::ProfileError};

    #[test]
    fn messages_name_their_layer() {
        let e: YomichanError = DictionaryDatabaseError::DictionaryNotFound("jmdict".into()).into();
        assert!(e.to_string().starts_with("(-)[yc_error::<db>]"));
        assert!(e.to_string().contains("jmdict"));

        let e: YomichanError = ProfileError::SelectedOutofBounds { selected: 3, len: 1 }.into();
        assert!(matches!(e, YomichanError::Profile(_)));
    }
}
