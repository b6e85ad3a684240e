//! Project variables, merged under bare names.

use super::{ProvidedVariable, VariableDef, VariableProvider};
use crate::domain::project_vars::ProjectVariables;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectProvider;

impl VariableProvider for ProjectProvider {
    type Source = ProjectVariables;

    fn namespace(&self) -> &'static str {
        ""
    }

    fn catalog(&self) -> Vec<VariableDef> {
        Vec::new()
    }

    fn provide(&self, source: Option<&ProjectVariables>) -> Vec<ProvidedVariable> {
        let Some(project) = source else {
            return Vec::new();
        };
        project
            .iter()
            .map(|var| ProvidedVariable {
                def: VariableDef {
                    name: var.name.clone(),
                    type_name: var.var_type.as_str().to_string(),
                    unit: var.unit.clone(),
                    description: var.description.clone(),
                },
                value: var.value.clone(),
            })
            .collect()
    }
}
