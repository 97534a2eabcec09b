//! ParameterManager — merges an application's parameter definitions with an
//! install's overrides.

use std::collections::BTreeMap;

use kb_core::{ParameterDefinition, ParameterSpec};
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::secret::SecretResolver;

/// Display view of one parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterDesc {
    pub value: String,
    pub default: String,
    pub description: String,
}

pub struct ParameterManager {
    secrets: SecretResolver,
    install_name: String,
    definitions: Vec<ParameterDefinition>,
    parameters: Vec<ParameterSpec>,
}

impl ParameterManager {
    pub fn new(
        secrets: SecretResolver,
        install_name: &str,
        definitions: &[ParameterDefinition],
        parameters: &[ParameterSpec],
    ) -> Self {
        Self {
            secrets,
            install_name: install_name.to_string(),
            definitions: definitions.to_vec(),
            parameters: parameters.to_vec(),
        }
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Defaults overlaid by overrides, with generated secrets resolved.
    pub async fn get_merged_map(&self) -> EngineResult<BTreeMap<String, String>> {
        let mut merged = BTreeMap::new();
        for definition in &self.definitions {
            let value = match &definition.generate_secret {
                Some(spec) => {
                    self.secrets
                        .resolve(&self.install_name, &definition.name, spec)
                        .await?
                }
                None => definition.default.clone(),
            };
            merged.insert(definition.name.clone(), value);
        }

        for parameter in &self.parameters {
            let value = match &parameter.generate_secret {
                Some(spec) => {
                    self.secrets
                        .resolve(&self.install_name, &parameter.name, spec)
                        .await?
                }
                None => parameter.value.clone(),
            };
            merged.insert(parameter.name.clone(), value);
        }

        Ok(merged)
    }

    /// Same merge as [`get_merged_map`](Self::get_merged_map) without
    /// touching secrets.
    pub fn get_parameter_desc(&self) -> BTreeMap<String, ParameterDesc> {
        let mut descs: BTreeMap<String, ParameterDesc> = self
            .definitions
            .iter()
            .map(|d| {
                (
                    d.name.clone(),
                    ParameterDesc {
                        value: d.default.clone(),
                        default: d.default.clone(),
                        description: d.description.clone(),
                    },
                )
            })
            .collect();

        for parameter in &self.parameters {
            descs.entry(parameter.name.clone()).or_default().value = parameter.value.clone();
        }
        descs
    }

    /// Every required definition must have a non-blank effective value.
    /// Generated secrets always count as set.
    pub fn validate(&self) -> EngineResult<()> {
        for definition in self.definitions.iter().filter(|d| d.required) {
            let effective = match self.parameters.iter().find(|p| p.name == definition.name) {
                Some(p) if p.generate_secret.is_some() => continue,
                Some(p) => p.value.as_str(),
                None if definition.generate_secret.is_some() => continue,
                None => definition.default.as_str(),
            };
            if effective.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "required parameter '{}' not set",
                    definition.name
                )));
            }
        }
        Ok(())
    }

    /// Overlay `additional` onto this install's overrides. Names already
    /// present take the additional entry; new names are appended in order.
    pub fn merge_additional_parameters(&self, additional: &[ParameterSpec]) -> Vec<ParameterSpec> {
        merge_parameters(&self.parameters, additional)
    }
}

/// `base` with `additional` overlaid by name; unseen names are appended.
pub fn merge_parameters(base: &[ParameterSpec], additional: &[ParameterSpec]) -> Vec<ParameterSpec> {
    let mut merged = base.to_vec();
    for extra in additional {
        match merged.iter_mut().find(|p| p.name == extra.name) {
            Some(existing) => *existing = extra.clone(),
            None => merged.push(extra.clone()),
        }
    }
    merged
}
