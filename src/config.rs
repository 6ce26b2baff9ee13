use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::matching::engine::ResolverConfig;
use crate::merge::policy::TrustPolicy;
use crate::rewrite::pass::RewriteConfig;

/// Environment variable overriding the default store directory
pub const DB_ENV_VAR: &str = "JOURNAL_ABBREV_DB";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Settings loaded from a JSON file; every section is optional
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,

    /// Sources in trust order, most trusted first
    pub trust: TrustPolicy,

    pub matching: ResolverConfig,

    pub rewrite: RewriteConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store directory; defaults to [`default_db_dir`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds
    /// out-of-range values.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that thresholds are probabilities and counts are positive
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("matching.min_confidence", self.matching.min_confidence)?;
        check_unit("rewrite.threshold", self.rewrite.threshold)?;
        if self.matching.max_candidates == 0 {
            return Err(ConfigError::Invalid(
                "matching.max_candidates must be at least 1".to_string(),
            ));
        }
        if self.matching.max_posting == 0 {
            return Err(ConfigError::Invalid(
                "matching.max_posting must be at least 1".to_string(),
            ));
        }
        if self.rewrite.threads == Some(0) {
            return Err(ConfigError::Invalid(
                "rewrite.threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Store directory from settings, the environment, or the platform data dir
    #[must_use]
    pub fn db_dir(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(default_db_dir)
    }
}

/// `$JOURNAL_ABBREV_DB`, else `<data dir>/journal-abbrev`
#[must_use]
pub fn default_db_dir() -> PathBuf {
    if let Ok(path) = std::env::var(DB_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("journal-abbrev")
}

/// Reject values outside [0, 1]
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if `value` is not a probability.
pub fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be between 0 and 1, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AbbreviationStyle, SourceTag};
    use crate::matching::scoring::ScorerKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!((settings.matching.min_confidence - 0.8).abs() < f64::EPSILON);
        assert!((settings.rewrite.threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(settings.rewrite.style, AbbreviationStyle::Iso4);
        assert_eq!(settings.trust, TrustPolicy::default());
    }

    #[test]
    fn test_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "trust": ["isoabbr", "registry"],
                "matching": {{"scorer": "token-sort"}},
                "rewrite": {{"style": "coden", "threads": 2}}
            }}"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert!(
            settings.trust.rank(&SourceTag::new("isoabbr"))
                > settings.trust.rank(&SourceTag::new("registry"))
        );
        assert_eq!(settings.matching.scorer, ScorerKind::TokenSort);
        assert_eq!(settings.matching.max_candidates, ResolverConfig::default().max_candidates);
        assert_eq!(settings.rewrite.style, AbbreviationStyle::Coden);
        assert_eq!(settings.rewrite.threads, Some(2));
        assert!((settings.rewrite.threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"rewrite": {{"threshold": 1.5}}}}"#).unwrap();
        assert!(matches!(
            Settings::load_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            Settings::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_explicit_store_path() {
        let settings = Settings {
            store: StoreSettings {
                path: Some(PathBuf::from("/tmp/journals")),
            },
            ..Settings::default()
        };
        assert_eq!(settings.db_dir(), PathBuf::from("/tmp/journals"));
    }
}
