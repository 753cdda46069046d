//! Registry: read-only lookup of semantic models and datasets by name.
//!
//! The registry is an explicit context object injected into the compiler,
//! planner and runner - there is no process-wide singleton, so tests and
//! multi-tenant embeddings can hold several independent registries.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::error::{CompileError, CompileResult};
use crate::model::{Dataset, SemanticModel};

/// Errors raised while loading registry definitions.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registry definitions: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate model name: '{0}'")]
    DuplicateModel(String),

    #[error("duplicate dataset name: '{0}'")]
    DuplicateDataset(String),
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "model")]
    models: Vec<SemanticModel>,
    #[serde(default, rename = "dataset")]
    datasets: Vec<Dataset>,
}

/// Read-only lookup of semantic models and datasets by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: HashMap<String, SemanticModel>,
    datasets: HashMap<String, Dataset>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: SemanticModel) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.datasets.insert(dataset.name.clone(), dataset);
        self
    }

    /// Load a registry from a TOML document with `[[model]]` and
    /// `[[dataset]]` tables.
    pub fn from_toml_str(input: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(input)?;
        let mut registry = Registry::new();

        for model in file.models {
            if registry.models.contains_key(&model.name) {
                return Err(RegistryError::DuplicateModel(model.name));
            }
            registry.models.insert(model.name.clone(), model);
        }
        for dataset in file.datasets {
            if registry.datasets.contains_key(&dataset.name) {
                return Err(RegistryError::DuplicateDataset(dataset.name));
            }
            registry.datasets.insert(dataset.name.clone(), dataset);
        }

        Ok(registry)
    }

    /// Load a registry from a TOML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    /// Look up a model; absence is a fatal unresolved-reference error.
    pub fn model(&self, name: &str) -> CompileResult<&SemanticModel> {
        self.models
            .get(name)
            .ok_or_else(|| CompileError::UnknownModel(name.into()))
    }

    /// Look up a dataset; absence is a fatal unresolved-reference error.
    pub fn dataset(&self, name: &str) -> CompileResult<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| CompileError::UnknownDataset(name.into()))
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|s| s.as_str())
    }
}
