use digit_infernum::{ModelRegistry, ModelStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelInfo {
    pub key: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModelInfo {
    #[allow(dead_code)]
    pub fn list(registry: &ModelRegistry) -> Vec<ModelInfo> {
        registry
            .status()
            .into_iter()
            .map(|(key, status)| match status {
                ModelStatus::Ready(family) => ModelInfo {
                    key,
                    status: "ready".to_string(),
                    family: Some(family.as_str().to_string()),
                    reason: None,
                },
                ModelStatus::Unavailable(reason) => ModelInfo {
                    key,
                    status: "unavailable".to_string(),
                    family: None,
                    reason: Some(reason),
                },
            })
            .collect()
    }
}
