//! Configuration module for searchkit.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, DatabaseSettings, LocaleSettings, SearchSettings, Settings, SettingsError,
    SettingsResult,
};
