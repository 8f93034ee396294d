//! Runtime settings for the rule handle
//!
//! Settings come from a JSON file or the environment; anything not given
//! falls back to the defaults below.
//!
//! # Environment Variables
//!
//! - `FWCHAINS_TABLE_PATH`: read the rule table from this file instead of the
//!   kernel's proc file.
//! - `FWCHAINS_VALIDATE`: set to `0` or `false` to hand rules to the kernel
//!   without local validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::ActiveBackend;
use crate::core::backend::Backend;
use crate::core::error::{Error, Result};

pub const TABLE_PATH_ENV: &str = "FWCHAINS_TABLE_PATH";
pub const VALIDATE_ENV: &str = "FWCHAINS_VALIDATE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// File the installed rules are listed from
    #[serde(default = "default_table_path")]
    pub table_path: PathBuf,
    /// Validate rules before add/delete
    #[serde(default = "default_true")]
    pub validate_rules: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            table_path: default_table_path(),
            validate_rules: true,
        }
    }
}

fn default_table_path() -> PathBuf {
    PathBuf::from(ActiveBackend::TABLE_PATH)
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` if the file cannot be read, or
    /// `Error::Serialization` if it is not valid settings JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::resource(path.to_string_lossy(), e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Builds settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(path) = lookup(TABLE_PATH_ENV).filter(|p| !p.is_empty()) {
            settings.table_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(VALIDATE_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => settings.validate_rules = false,
                "1" | "true" | "yes" | "on" => settings.validate_rules = true,
                other => warn!("Ignoring invalid {VALIDATE_ENV} value '{other}'"),
            }
        }
        settings
    }
}
