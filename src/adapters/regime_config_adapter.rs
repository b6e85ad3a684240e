//! Regime rule files (JSON).
//!
//! ```json
//! {"rules": [{"label": "TREND_BULL", "priority": 70,
//!             "conditions": [{"indicator": "ema_spread_pct", "op": "above", "value": 0.2}]}]}
//! ```

use crate::domain::error::EngineError;
use crate::domain::regime::{RegimeClassifier, RegimeRuleSet};
use std::path::Path;

pub fn parse_rules(text: &str) -> Result<RegimeClassifier, EngineError> {
    let set: RegimeRuleSet = serde_json::from_str(text).map_err(|e| EngineError::RegimeConfig {
        reason: format!("malformed rule file: {}", e),
    })?;
    RegimeClassifier::from_rule_set(set)
}

pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<RegimeClassifier, EngineError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::RegimeConfig {
        reason: format!("cannot read {}: {}", path.display(), e),
    })?;
    parse_rules(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RULES: &str = r#"{"rules": [
        {"label": "HOT", "priority": 80,
         "conditions": [{"indicator": "rsi", "op": "above", "value": 70}]},
        {"label": "COLD", "priority": 20,
         "conditions": [{"indicator": "rsi", "op": "between", "value": 0, "upper": 30}]}
    ]}"#;

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", RULES).unwrap();
        let classifier = load_rules(file.path()).unwrap();
        assert_eq!(classifier.labels(), vec!["HOT", "COLD"]);
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = parse_rules("{\"rules\": [").unwrap_err();
        assert!(matches!(err, EngineError::RegimeConfig { .. }));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let text = r#"{"rules": [{"label": "X", "priority": 1,
            "conditions": [{"indicator": "rsi", "op": "roughly", "value": 1}]}]}"#;
        assert!(parse_rules(text).is_err());
    }

    #[test]
    fn missing_file() {
        assert!(load_rules("/nonexistent/regimes.json").is_err());
    }
}
