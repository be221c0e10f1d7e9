use crate::classifiers::{LogisticRegression, Mlp, RandomForest};
use crate::error::{InfernumError, ModelLoadError};
use crate::model::{ModelFamily, ModelHandle};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Key of the model used when a request does not name one.
pub const DEFAULT_MODEL_KEY: &str = "logistic_regression";

/// Artifact format of a configured model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    LogisticRegression,
    RandomForest,
    Mlp,
}

impl ModelKind {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelKind::LogisticRegression | ModelKind::RandomForest => ModelFamily::Classical,
            ModelKind::Mlp => ModelFamily::Neural,
        }
    }

    /// Reads and validates an artifact of this kind.
    pub fn load(&self, path: &Path) -> Result<ModelHandle, ModelLoadError> {
        let handle = match self {
            ModelKind::LogisticRegression => {
                ModelHandle::classical(LogisticRegression::from_artifact(read_json(path)?)?)
            }
            ModelKind::RandomForest => {
                ModelHandle::classical(RandomForest::from_artifact(read_json(path)?)?)
            }
            ModelKind::Mlp => ModelHandle::neural(Mlp::from_artifact(read_json(path)?)?),
        };
        Ok(handle)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelLoadError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// One named model and where its artifact lives.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub key: String,
    pub kind: ModelKind,
    /// Artifact path, relative to [`RegistryConfig::models_dir`].
    pub file: PathBuf,
}

impl ModelSpec {
    pub fn new(key: impl Into<String>, kind: ModelKind, file: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            kind,
            file: file.into(),
        }
    }
}

/// The fixed set of models to load at startup.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub models_dir: PathBuf,
    pub models: Vec<ModelSpec>,
}

impl RegistryConfig {
    /// The stock deployment: two classical models and one network.
    pub fn standard(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            models: vec![
                ModelSpec::new(
                    "logistic_regression",
                    ModelKind::LogisticRegression,
                    "LogisticRegression.json",
                ),
                ModelSpec::new("random_forest", ModelKind::RandomForest, "RandomForest.json"),
                ModelSpec::new("neural_network", ModelKind::Mlp, "NeuralNetwork.json"),
            ],
        }
    }
}

/// Load state of a configured model, as reported to operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    Ready(ModelFamily),
    Unavailable(String),
}

enum Slot {
    Ready(ModelHandle),
    Unavailable(String),
}

/// Read-only lookup of loaded models by key.
///
/// Built once, then shared (typically behind an `Arc`) by every request.
/// A key that failed to load stays present as unavailable, so callers can
/// tell a misconfigured request from an incomplete deployment.
pub struct ModelRegistry {
    slots: BTreeMap<String, Slot>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.status()).finish()
    }
}

impl ModelRegistry {
    /// Loads every configured model. A model that fails to load is marked
    /// unavailable and does not stop the others.
    pub fn load(config: &RegistryConfig) -> Self {
        log::info!("Loading models from {:?}", config.models_dir);
        let mut builder = Self::builder();
        for spec in &config.models {
            let path = config.models_dir.join(&spec.file);
            builder = match spec.kind.load(&path) {
                Ok(handle) => {
                    log::info!(
                        "Loaded model '{}' ({}) from {:?}",
                        spec.key,
                        handle.family().as_str(),
                        path
                    );
                    builder.insert(&spec.key, handle)
                }
                Err(e) => {
                    log::warn!("Model '{}' unavailable ({:?}): {}", spec.key, path, e);
                    builder.unavailable(&spec.key, e.to_string())
                }
            };
        }
        let registry = builder.build();
        log::info!("Loaded models: {:?}", registry.ready_keys());
        registry
    }

    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Looks up a ready model.
    ///
    /// # Errors
    ///
    /// * [`InfernumError::ModelNotFound`] if `key` was never configured.
    /// * [`InfernumError::ModelUnavailable`] if it was configured but failed to load.
    pub fn get(&self, key: &str) -> Result<&ModelHandle, InfernumError> {
        match self.slots.get(key) {
            Some(Slot::Ready(handle)) => Ok(handle),
            Some(Slot::Unavailable(reason)) => Err(InfernumError::ModelUnavailable {
                key: key.to_string(),
                reason: reason.clone(),
            }),
            None => Err(InfernumError::ModelNotFound {
                key: key.to_string(),
                available: self.keys(),
            }),
        }
    }

    /// All configured keys, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn ready_keys(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn status(&self) -> Vec<(String, ModelStatus)> {
        self.slots
            .iter()
            .map(|(key, slot)| {
                let status = match slot {
                    Slot::Ready(handle) => ModelStatus::Ready(handle.family()),
                    Slot::Unavailable(reason) => ModelStatus::Unavailable(reason.clone()),
                };
                (key.clone(), status)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Assembles a registry by hand; used by [`ModelRegistry::load`] and to
/// inject fake models in tests.
#[derive(Default)]
pub struct ModelRegistryBuilder {
    slots: BTreeMap<String, Slot>,
}

impl ModelRegistryBuilder {
    pub fn insert(mut self, key: impl Into<String>, handle: ModelHandle) -> Self {
        self.slots.insert(key.into(), Slot::Ready(handle));
        self
    }

    pub fn unavailable(mut self, key: impl Into<String>, reason: impl Into<String>) -> Self {
        self.slots.insert(key.into(), Slot::Unavailable(reason.into()));
        self
    }

    pub fn build(self) -> ModelRegistry {
        ModelRegistry { slots: self.slots }
    }
}

/// Startup barrier around the registry: the first caller loads it, every
/// later or concurrent caller gets the same instance.
#[derive(Debug, Default)]
pub struct RegistryCell {
    cell: OnceLock<Arc<ModelRegistry>>,
}

impl RegistryCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Loads the registry from `config` unless it is already loaded.
    pub fn get_or_load(&self, config: &RegistryConfig) -> Arc<ModelRegistry> {
        self.get_or_init(|| ModelRegistry::load(config))
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> ModelRegistry) -> Arc<ModelRegistry> {
        self.cell
            .get_or_init(|| {
                log::debug!("Initializing model registry");
                Arc::new(init())
            })
            .clone()
    }

    /// Returns the registry if it has been loaded.
    pub fn get(&self) -> Option<Arc<ModelRegistry>> {
        self.cell.get().cloned()
    }
}
