//! TOML-based configuration for searchkit.
//!
//! Supports a config file (searchkit.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [search]
//! dialect = "mysql"
//! table_prefix = "glpi_"
//! default_page_size = 20
//! max_page_size = 1000
//! concat_max_len = 16384
//! concat_retry_len = 4194304
//!
//! [locale]
//! language = "fr_FR"
//!
//! [database]
//! path = "${SEARCHKIT_DB}"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Query compilation settings.
    pub search: SearchSettings,

    /// Language used for translated dropdown values.
    pub locale: LocaleSettings,

    /// Database used by `searchkit run`.
    pub database: DatabaseSettings,
}

/// Query compilation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Target SQL dialect.
    pub dialect: Dialect,

    /// Table prefix stripped to derive conventional foreign keys
    /// (`glpi_locations` -> `locations_id`).
    pub table_prefix: String,

    /// Page size when the request does not give one.
    pub default_page_size: u64,

    /// Upper bound for any requested page size.
    pub max_page_size: u64,

    /// Initial group concatenation limit.
    pub concat_max_len: u64,

    /// Limit used for the single retry after a concatenation overflow.
    pub concat_retry_len: u64,

    /// Whether fields referenced by meta criteria become result columns.
    pub display_meta_columns: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::MySql,
            table_prefix: "glpi_".to_string(),
            default_page_size: 20,
            max_page_size: 1000,
            concat_max_len: 16_384,
            concat_retry_len: 4_194_304,
            display_meta_columns: true,
        }
    }
}

/// Locale settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocaleSettings {
    /// Active language (e.g. "fr_FR").
    pub language: String,

    /// Table holding dropdown translations.
    pub translation_table: String,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            language: "en_GB".to_string(),
            translation_table: "glpi_dropdowntranslations".to_string(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite database path (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl DatabaseSettings {
    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> SettingsResult<Option<PathBuf>> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SEARCHKIT_CONFIG`
    /// 2. `./searchkit.toml`
    pub fn load() -> SettingsResult<Self> {
        if let Ok(path) = env::var("SEARCHKIT_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("searchkit.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> SettingsResult<()> {
        if self.search.default_page_size == 0 || self.search.max_page_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "page sizes must be greater than zero".to_string(),
            ));
        }
        if self.search.concat_retry_len < self.search.concat_max_len {
            return Err(SettingsError::InvalidConfig(
                "concat_retry_len must not be smaller than concat_max_len".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> SettingsResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR (ends at non-alphanumeric/underscore)
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
