//! Variable providers: each turns one source object, or its absence, into
//! namespaced context entries plus per-variable metadata.
//!
//! Providers are independent of each other; layering and precedence belong
//! to the context builder.

pub mod bot;
pub mod cfg;
pub mod chart;
pub mod dynamic;
pub mod project;
pub mod trade;

use crate::domain::value::VariableValue;

pub use bot::{BotConfig, BotProvider};
pub use cfg::{CfgProvider, StrategyConfig};
pub use chart::{ChartProvider, ChartSnapshot};
pub use dynamic::DynamicProvider;
pub use project::ProjectProvider;
pub use trade::{Side, TradeProvider, TradeState};

/// Static description of a variable a provider can emit.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    /// Full context name, namespace included (`chart.close`).
    pub name: String,
    pub type_name: String,
    pub unit: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvidedVariable {
    pub def: VariableDef,
    pub value: VariableValue,
}

impl ProvidedVariable {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

pub trait VariableProvider {
    type Source: ?Sized;

    /// Namespace root, or `""` for bare names.
    fn namespace(&self) -> &'static str;

    /// Every variable the provider can emit when its source is present.
    /// Dynamic providers return an empty catalog.
    fn catalog(&self) -> Vec<VariableDef>;

    /// `None` yields no variables; providers never fail.
    fn provide(&self, source: Option<&Self::Source>) -> Vec<ProvidedVariable>;
}

/// One row of a provider's static variable table.
pub(crate) struct Field {
    pub name: &'static str,
    pub type_name: &'static str,
    pub unit: Option<&'static str>,
    pub description: &'static str,
}

pub(crate) const fn field(
    name: &'static str,
    type_name: &'static str,
    unit: Option<&'static str>,
    description: &'static str,
) -> Field {
    Field {
        name,
        type_name,
        unit,
        description,
    }
}

pub(crate) fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

pub(crate) fn catalog_of(namespace: &str, fields: &[Field]) -> Vec<VariableDef> {
    fields
        .iter()
        .map(|f| VariableDef {
            name: qualify(namespace, f.name),
            type_name: f.type_name.to_string(),
            unit: f.unit.map(str::to_string),
            description: f.description.to_string(),
        })
        .collect()
}

/// Attach table metadata to computed `(short_name, value)` pairs.
pub(crate) fn emit(
    namespace: &str,
    fields: &[Field],
    values: Vec<(&'static str, VariableValue)>,
) -> Vec<ProvidedVariable> {
    values
        .into_iter()
        .map(|(name, value)| {
            let meta = fields.iter().find(|f| f.name == name);
            ProvidedVariable {
                def: VariableDef {
                    name: qualify(namespace, name),
                    type_name: meta
                        .map(|f| f.type_name)
                        .unwrap_or_else(|| value.type_name())
                        .to_string(),
                    unit: meta.and_then(|f| f.unit).map(str::to_string),
                    description: meta.map(|f| f.description).unwrap_or_default().to_string(),
                },
                value,
            }
        })
        .collect()
}
