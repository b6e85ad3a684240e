//! Configuration loading and validation for the `[engine]`, `[bot]` and
//! `[strategy]` sections.

use crate::domain::cache::DEFAULT_EXPRESSION_CACHE_CAPACITY;
use crate::domain::compiler::compile;
use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveTime;
use std::time::Duration;

pub const ENGINE_SECTION: &str = "engine";
pub const DEFAULT_PROJECT_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub expression_cache_capacity: usize,
    pub project_cache_capacity: usize,
    pub eval_timeout: Option<Duration>,
    pub validation_timeout: Option<Duration>,
    /// JSON rule file for the regime classifier; built-in rules when absent.
    pub regime_rules: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expression_cache_capacity: DEFAULT_EXPRESSION_CACHE_CAPACITY,
            project_cache_capacity: DEFAULT_PROJECT_CACHE_CAPACITY,
            eval_timeout: None,
            validation_timeout: None,
            regime_rules: None,
        }
    }
}

impl EngineConfig {
    /// Validate, then read `[engine]`. Absent keys keep their defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        validate_engine_config(config)?;
        let d = Self::default();
        Ok(Self {
            expression_cache_capacity: config
                .get_int(ENGINE_SECTION, "expression_cache_capacity", d.expression_cache_capacity as i64)
                as usize,
            project_cache_capacity: config
                .get_int(ENGINE_SECTION, "project_cache_capacity", d.project_cache_capacity as i64)
                as usize,
            eval_timeout: optional_millis(config, ENGINE_SECTION, "eval_timeout_ms")?,
            validation_timeout: optional_millis(config, ENGINE_SECTION, "validation_timeout_ms")?,
            regime_rules: config
                .get_string(ENGINE_SECTION, "regime_rules")
                .filter(|s| !s.trim().is_empty()),
        })
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EngineError {
    EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// A present key must parse as an integer; absent keys yield `None`.
fn optional_int(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, EngineError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("{} must be an integer", key))),
    }
}

fn optional_millis(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Duration>, EngineError> {
    match optional_int(config, section, key)? {
        None => Ok(None),
        Some(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms as u64))),
        Some(_) => Err(invalid(section, key, format!("{} must be positive", key))),
    }
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    for key in ["expression_cache_capacity", "project_cache_capacity"] {
        if let Some(n) = optional_int(config, ENGINE_SECTION, key)? {
            if n < 1 {
                return Err(invalid(ENGINE_SECTION, key, format!("{} must be at least 1", key)));
            }
        }
    }
    optional_millis(config, ENGINE_SECTION, "eval_timeout_ms")?;
    optional_millis(config, ENGINE_SECTION, "validation_timeout_ms")?;
    Ok(())
}

pub fn validate_bot_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let section = "bot";
    for key in [
        "risk_per_trade_pct",
        "max_daily_loss_pct",
        "stop_loss_pct",
        "take_profit_pct",
        "trailing_stop_pct",
        "trailing_activation_pct",
        "break_even_trigger_pct",
    ] {
        let value = config.get_double(section, key, 0.0);
        if !(0.0..=100.0).contains(&value) {
            return Err(invalid(section, key, format!("{} must be between 0 and 100", key)));
        }
    }
    if config.get_int(section, "leverage", 1) < 1 {
        return Err(invalid(section, "leverage", "leverage must be at least 1"));
    }
    for key in ["max_open_positions", "max_trades_per_day"] {
        if config.get_int(section, key, 1) < 1 {
            return Err(invalid(section, key, format!("{} must be at least 1", key)));
        }
    }
    if config.get_int(section, "cooldown_bars", 0) < 0 {
        return Err(invalid(section, "cooldown_bars", "cooldown_bars must be non-negative"));
    }
    let threshold = config.get_double(section, "ai_confidence_threshold", 0.7);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(invalid(
            section,
            "ai_confidence_threshold",
            "ai_confidence_threshold must be between 0 and 1",
        ));
    }
    for key in ["session_start", "session_end"] {
        if let Some(raw) = config.get_string(section, key) {
            NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|_| invalid(section, key, format!("invalid {} format, expected HH:MM", key)))?;
        }
    }
    Ok(())
}

/// Entry/exit expressions, when given, must compile.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let section = "strategy";
    if let Some(direction) = config.get_string(section, "direction") {
        if !matches!(direction.trim(), "long" | "short" | "both") {
            return Err(invalid(section, "direction", "direction must be long, short or both"));
        }
    }
    if config.get_int(section, "max_hold_bars", 0) < 0 {
        return Err(invalid(section, "max_hold_bars", "max_hold_bars must be non-negative"));
    }
    for key in ["entry_expression", "exit_expression"] {
        if let Some(source) = config.get_string(section, key) {
            compile(&source).map_err(|e| invalid(section, key, e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_engine_section_uses_defaults() {
        let engine = EngineConfig::from_config(&make_config("[engine]\n")).unwrap();
        assert_eq!(engine, EngineConfig::default());
        assert_eq!(engine.expression_cache_capacity, 128);
        assert_eq!(engine.project_cache_capacity, 64);
    }

    #[test]
    fn engine_values_are_read() {
        let config = make_config(
            "[engine]\nexpression_cache_capacity = 16\neval_timeout_ms = 50\nregime_rules = rules.json\n",
        );
        let engine = EngineConfig::from_config(&config).unwrap();
        assert_eq!(engine.expression_cache_capacity, 16);
        assert_eq!(engine.eval_timeout, Some(Duration::from_millis(50)));
        assert_eq!(engine.validation_timeout, None);
        assert_eq!(engine.regime_rules.as_deref(), Some("rules.json"));
    }

    #[test]
    fn zero_capacity_fails() {
        let err = validate_engine_config(&make_config("[engine]\nproject_cache_capacity = 0\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "project_cache_capacity"));
    }

    #[test]
    fn non_numeric_timeout_fails() {
        let err = validate_engine_config(&make_config("[engine]\neval_timeout_ms = soon\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "eval_timeout_ms"));
    }

    #[test]
    fn zero_timeout_fails() {
        let err = validate_engine_config(&make_config("[engine]\nvalidation_timeout_ms = 0\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "validation_timeout_ms"));
    }

    #[test]
    fn valid_bot_config_passes() {
        let config = make_config(
            "[bot]\nrisk_per_trade_pct = 1\nleverage = 3\nsession_start = 08:00\nsession_end = 16:30\n",
        );
        assert!(validate_bot_config(&config).is_ok());
    }

    #[test]
    fn risk_over_100_fails() {
        let err = validate_bot_config(&make_config("[bot]\nrisk_per_trade_pct = 150\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "risk_per_trade_pct"));
    }

    #[test]
    fn leverage_zero_fails() {
        let err = validate_bot_config(&make_config("[bot]\nleverage = 0\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "leverage"));
    }

    #[test]
    fn bad_session_time_fails() {
        let err = validate_bot_config(&make_config("[bot]\nsession_end = 25:00\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "session_end"));
    }

    #[test]
    fn confidence_threshold_range() {
        let err = validate_bot_config(&make_config("[bot]\nai_confidence_threshold = 1.5\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "ai_confidence_threshold"));
    }

    #[test]
    fn strategy_expressions_must_compile() {
        let ok = make_config("[strategy]\nentry_expression = chart.price > cfg.level\n");
        assert!(validate_strategy_config(&ok).is_ok());
        let bad = make_config("[strategy]\nexit_expression = chart.price >\n");
        let err = validate_strategy_config(&bad).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "exit_expression"));
    }

    #[test]
    fn strategy_direction_checked() {
        let err = validate_strategy_config(&make_config("[strategy]\ndirection = sideways\n")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { key, .. } if key == "direction"));
    }
}
