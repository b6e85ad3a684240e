//! `indicators.*` and `regime.*`: caller-supplied dictionaries consumed
//! verbatim under their namespace.

use super::{qualify, ProvidedVariable, VariableDef, VariableProvider};
use crate::domain::value::VariableValue;
use std::collections::BTreeMap;

pub type DynamicValues = BTreeMap<String, VariableValue>;

#[derive(Debug, Clone, Copy)]
pub struct DynamicProvider {
    namespace: &'static str,
    description: &'static str,
}

impl DynamicProvider {
    pub const fn indicators() -> Self {
        Self {
            namespace: "indicators",
            description: "Indicator value supplied by the caller",
        }
    }

    pub const fn regime() -> Self {
        Self {
            namespace: "regime",
            description: "Regime value supplied by the caller",
        }
    }
}

impl VariableProvider for DynamicProvider {
    type Source = DynamicValues;

    fn namespace(&self) -> &'static str {
        self.namespace
    }

    fn catalog(&self) -> Vec<VariableDef> {
        Vec::new()
    }

    fn provide(&self, source: Option<&DynamicValues>) -> Vec<ProvidedVariable> {
        let Some(values) = source else {
            return Vec::new();
        };
        let lead = format!("{}.", self.namespace);
        values
            .iter()
            .map(|(key, value)| {
                // keys may arrive already qualified
                let name = if key.starts_with(&lead) {
                    key.clone()
                } else {
                    qualify(self.namespace, key)
                };
                ProvidedVariable {
                    def: VariableDef {
                        name,
                        type_name: value.type_name().to_string(),
                        unit: None,
                        description: self.description.to_string(),
                    },
                    value: value.clone(),
                }
            })
            .collect()
    }
}

/// Build a dynamic source from a JSON object; anything else yields `None`.
pub fn values_from_json(json: &serde_json::Value) -> Option<DynamicValues> {
    json.as_object().map(|object| {
        object
            .iter()
            .map(|(k, v)| (k.clone(), VariableValue::from_json(v)))
            .collect()
    })
}
