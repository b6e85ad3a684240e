//! Project variables: user-defined, typed, bare-named values persisted in
//! `*.cel_variables.json` files.
//!
//! JSON is mapped to the closed `VariableValue` union at the parse boundary;
//! a declared type that disagrees with its value is rejected here, never at
//! evaluation time.

use crate::domain::error::VariableValidationError;
use crate::domain::lexer::KEYWORDS;
use crate::domain::value::{VariableType, VariableValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FILE_SUFFIX: &str = ".cel_variables.json";
pub const CURRENT_VERSION: &str = "1.0";
pub const DEFAULT_CATEGORY: &str = "general";

/// Namespace roots owned by the built-in providers.
pub const RESERVED_PREFIXES: &[&str] = &["chart", "bot", "indicators", "regime", "trade", "cfg"];

/// Words reserved by the grammar or set aside for it.
pub const RESERVED_WORDS: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let", "loop",
    "package", "namespace", "return", "var", "void", "while",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectVariable {
    pub name: String,
    pub var_type: VariableType,
    pub value: VariableValue,
    pub description: String,
    pub category: String,
    pub unit: Option<String>,
    pub tags: Vec<String>,
    pub readonly: bool,
}

impl ProjectVariable {
    /// Declared type is taken from the value; `Null` and maps are rejected.
    pub fn new(name: &str, value: impl Into<VariableValue>) -> Result<Self, VariableValidationError> {
        let value = value.into();
        let var_type = value.declared_type().ok_or_else(|| {
            VariableValidationError::for_variable(
                name,
                format!("{} is not a storable variable type", value.type_name()),
            )
        })?;
        Self::typed(name, var_type, value)
    }

    /// Explicit declared type; an int value is widened when `float` is declared.
    pub fn typed(
        name: &str,
        var_type: VariableType,
        value: VariableValue,
    ) -> Result<Self, VariableValidationError> {
        let value = coerce(name, var_type, value)?;
        Ok(Self {
            name: name.to_string(),
            var_type,
            value,
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            unit: None,
            tags: Vec::new(),
            readonly: false,
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }
}

fn coerce(
    name: &str,
    var_type: VariableType,
    value: VariableValue,
) -> Result<VariableValue, VariableValidationError> {
    if !value.matches_type(var_type) {
        return Err(VariableValidationError::for_variable(
            name,
            format!("declared type {} but value is {}", var_type, value.type_name()),
        ));
    }
    if !is_finite(&value) {
        return Err(VariableValidationError::for_variable(
            name,
            "float values must be finite (no NaN or infinity)",
        ));
    }
    match (var_type, value) {
        (VariableType::Float, VariableValue::Int(i)) => Ok(VariableValue::Float(i as f64)),
        (VariableType::List, VariableValue::List(items)) => {
            if let Some(bad) = items
                .iter()
                .find(|v| matches!(v, VariableValue::Null | VariableValue::Map(_)))
            {
                return Err(VariableValidationError::for_variable(
                    name,
                    format!("list elements must be scalars, found {}", bad.type_name()),
                ));
            }
            Ok(VariableValue::List(items))
        }
        (_, value) => Ok(value),
    }
}

/// JSON has no NaN or infinity, so such values could not be saved and read back.
fn is_finite(value: &VariableValue) -> bool {
    match value {
        VariableValue::Float(f) => f.is_finite(),
        VariableValue::List(items) => items.iter().all(is_finite),
        _ => true,
    }
}

/// Identifier rules plus reserved prefix/word rejection.
pub fn validate_name(name: &str) -> Result<(), VariableValidationError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VariableValidationError::for_variable(
            name,
            "name must start with a letter or '_' and contain only letters, digits and '_'",
        ));
    }
    if RESERVED_PREFIXES.contains(&name) {
        return Err(VariableValidationError::for_variable(
            name,
            format!("'{}' is a reserved namespace prefix", name),
        ));
    }
    if KEYWORDS.contains(&name) || RESERVED_WORDS.contains(&name) {
        return Err(VariableValidationError::for_variable(
            name,
            format!("'{}' is a reserved keyword", name),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectVariables {
    pub version: String,
    pub project_name: String,
    variables: BTreeMap<String, ProjectVariable>,
}

impl ProjectVariables {
    pub fn new(project_name: &str) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            project_name: project_name.to_string(),
            variables: BTreeMap::new(),
        }
    }

    pub fn add_variable(&mut self, variable: ProjectVariable) -> Result<(), VariableValidationError> {
        validate_name(&variable.name)?;
        if self.variables.contains_key(&variable.name) {
            return Err(VariableValidationError::for_variable(
                &variable.name,
                "already defined; use update_value to change it",
            ));
        }
        let value = coerce(&variable.name, variable.var_type, variable.value)?;
        self.variables.insert(
            variable.name.clone(),
            ProjectVariable { value, ..variable },
        );
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<ProjectVariable, VariableValidationError> {
        match self.variables.get(name) {
            None => Err(VariableValidationError::for_variable(name, "no such variable")),
            Some(v) if v.readonly => {
                Err(VariableValidationError::for_variable(name, "variable is read-only"))
            }
            Some(_) => self
                .variables
                .remove(name)
                .ok_or_else(|| VariableValidationError::for_variable(name, "no such variable")),
        }
    }

    /// Replace a value, keeping its declared type.
    pub fn update_value(
        &mut self,
        name: &str,
        value: impl Into<VariableValue>,
    ) -> Result<(), VariableValidationError> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| VariableValidationError::for_variable(name, "no such variable"))?;
        if variable.readonly {
            return Err(VariableValidationError::for_variable(name, "variable is read-only"));
        }
        variable.value = coerce(name, variable.var_type, value.into())?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }

    pub fn get(&self, name: &str) -> Option<&ProjectVariable> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectVariable> {
        self.variables.values()
    }

    pub fn by_category(&self, category: &str) -> Vec<&ProjectVariable> {
        self.variables
            .values()
            .filter(|v| v.category == category)
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&ProjectVariable> {
        self.variables
            .values()
            .filter(|v| v.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Bare `name -> value` pairs for the evaluation context.
    pub fn values(&self) -> BTreeMap<String, VariableValue> {
        self.variables
            .iter()
            .map(|(name, v)| (name.clone(), v.value.clone()))
            .collect()
    }

    pub fn from_json_str(text: &str) -> Result<Self, VariableValidationError> {
        let raw: RawFile = serde_json::from_str(text)
            .map_err(|e| VariableValidationError::new(format!("malformed JSON: {}", e)))?;
        if raw.version.trim().is_empty() {
            return Err(VariableValidationError::new("'version' must not be empty"));
        }
        let mut vars = ProjectVariables {
            version: raw.version,
            project_name: raw.project_name,
            variables: BTreeMap::new(),
        };
        for (name, def) in raw.variables {
            let var_type = VariableType::parse(&def.var_type).ok_or_else(|| {
                VariableValidationError::for_variable(
                    &name,
                    format!("unknown type '{}'", def.var_type),
                )
            })?;
            let value = VariableValue::from_json(&def.value);
            let mut variable = ProjectVariable::typed(&name, var_type, value)?;
            variable.description = def.description;
            variable.category = def.category;
            variable.unit = def.unit;
            variable.tags = def.tags;
            variable.readonly = def.readonly;
            vars.add_variable(variable)?;
        }
        Ok(vars)
    }

    pub fn to_json_string(&self) -> Result<String, VariableValidationError> {
        let raw = RawFile {
            version: self.version.clone(),
            project_name: self.project_name.clone(),
            variables: self
                .variables
                .iter()
                .map(|(name, v)| {
                    (
                        name.clone(),
                        RawVariable {
                            var_type: v.var_type.as_str().to_string(),
                            value: v.value.to_json(),
                            description: v.description.clone(),
                            category: v.category.clone(),
                            unit: v.unit.clone(),
                            tags: v.tags.clone(),
                            readonly: v.readonly,
                        },
                    )
                })
                .collect(),
        };
        serde_json::to_string_pretty(&raw)
            .map_err(|e| VariableValidationError::new(format!("cannot serialize: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawFile {
    version: String,
    project_name: String,
    #[serde(default)]
    variables: BTreeMap<String, RawVariable>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct RawVariable {
    #[serde(rename = "type")]
    var_type: String,
    value: serde_json::Value,
    #[serde(default)]
    description: String,
    #[serde(default = "default_category")]
    category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    readonly: bool,
}
