//! `cfg.*`: static strategy-level rules and user parameters.

use super::{catalog_of, emit, field, qualify, Field, ProvidedVariable, VariableDef, VariableProvider};
use crate::domain::value::VariableValue;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NAMESPACE: &str = "cfg";
pub const SECTION: &str = "strategy";
pub const PARAMS_SECTION: &str = "strategy.params";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    /// `long`, `short` or `both`.
    pub direction: String,
    pub entry_expression: String,
    pub exit_expression: String,
    pub max_hold_bars: i64,
    /// Free-form parameters exposed as `cfg.<name>`.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl StrategyConfig {
    /// `[strategy]` for the fixed fields, `[strategy.params]` for parameters.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let params = config
            .keys(PARAMS_SECTION)
            .into_iter()
            .filter_map(|key| {
                let raw = config.get_string(PARAMS_SECTION, &key)?;
                Some((key, VariableValue::parse_literal(&raw).to_json()))
            })
            .collect();
        Self {
            name: config.get_string(SECTION, "name").unwrap_or_default(),
            direction: config
                .get_string(SECTION, "direction")
                .unwrap_or_else(|| "both".to_string()),
            entry_expression: config.get_string(SECTION, "entry_expression").unwrap_or_default(),
            exit_expression: config.get_string(SECTION, "exit_expression").unwrap_or_default(),
            max_hold_bars: config.get_int(SECTION, "max_hold_bars", 0),
            params,
        }
    }
}

const FIELDS: &[Field] = &[
    field("name", "string", None, "Strategy name"),
    field("direction", "string", None, "Allowed trade direction: long, short or both"),
    field("entry_expression", "string", None, "Entry rule source"),
    field("exit_expression", "string", None, "Exit rule source"),
    field("max_hold_bars", "int", Some("bars"), "Forced exit after this many bars; 0 disables"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CfgProvider;

impl VariableProvider for CfgProvider {
    type Source = StrategyConfig;

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn catalog(&self) -> Vec<VariableDef> {
        catalog_of(NAMESPACE, FIELDS)
    }

    fn provide(&self, source: Option<&StrategyConfig>) -> Vec<ProvidedVariable> {
        let Some(cfg) = source else {
            return Vec::new();
        };
        let mut vars = emit(
            NAMESPACE,
            FIELDS,
            vec![
                ("name", cfg.name.clone().into()),
                ("direction", cfg.direction.clone().into()),
                ("entry_expression", cfg.entry_expression.clone().into()),
                ("exit_expression", cfg.exit_expression.clone().into()),
                ("max_hold_bars", cfg.max_hold_bars.into()),
            ],
        );
        for (name, raw) in &cfg.params {
            // fixed fields win over a parameter of the same name
            if FIELDS.iter().any(|f| f.name == name) {
                continue;
            }
            let value = VariableValue::from_json(raw);
            vars.push(ProvidedVariable {
                def: VariableDef {
                    name: qualify(NAMESPACE, name),
                    type_name: value.type_name().to_string(),
                    unit: None,
                    description: "Strategy parameter".to_string(),
                },
                value,
            });
        }
        vars
    }
}
