//! INI configuration for the `[engine]`, `[bot]`, `[strategy]` and
//! `[strategy.params]` sections.
//!
//! Section and key names are case-insensitive and `keys()` reports them
//! lowercased. Values are trimmed; a key with an empty value reads as unset,
//! so `stop_loss_pct =` falls back to the default like a missing key.

use crate::domain::config_validation::{
    validate_bot_config, validate_engine_config, validate_strategy_config, EngineConfig,
};
use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::fs;
use std::path::Path;
use tracing::debug;

const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug)]
pub struct FileConfigAdapter {
    source: String,
    ini: Ini,
}

impl FileConfigAdapter {
    /// Read an INI file. Syntax problems and unreadable files are both
    /// `ConfigParse`; section contents are checked by `validate`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| EngineError::ConfigParse {
            file: source.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(source, &content)
    }

    pub fn from_string(content: &str) -> Result<Self, EngineError> {
        Self::parse(INLINE_SOURCE.to_string(), content)
    }

    fn parse(source: String, content: &str) -> Result<Self, EngineError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| EngineError::ConfigParse {
                file: source.clone(),
                reason,
            })?;
        let adapter = Self { source, ini };
        debug!(source = %adapter.source, sections = ?adapter.sections(), "configuration read");
        Ok(adapter)
    }

    /// File path, or `<inline>` for configuration parsed from a string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Section names present, lowercased and sorted.
    pub fn sections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ini.get_map_ref().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check every section the engine reads.
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_engine_config(self)?;
        validate_bot_config(self)?;
        validate_strategy_config(self)
    }

    pub fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        EngineConfig::from_config(self)
    }

    fn value(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.value(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.value(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.value(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.value(section, key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .ini
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
