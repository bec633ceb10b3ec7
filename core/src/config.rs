use crate::error::CoreResult;
use crate::model::attribution::Confidence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet period before a search-text change triggers a recompute.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Run filter/statistics recomputation on the background worker.
    #[serde(default = "default_true")]
    pub worker_enabled: bool,

    /// Confidence given to a promoted signal that carries none.
    #[serde(default = "default_confidence")]
    pub default_confidence: Confidence,

    #[serde(default)]
    pub journal_path: Option<PathBuf>,

    #[serde(default = "default_actor")]
    pub project_actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: default_search_debounce_ms(),
            worker_enabled: true,
            default_confidence: default_confidence(),
            journal_path: None,
            project_actor: default_actor(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

fn default_search_debounce_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> Confidence {
    Confidence::High
}

fn default_actor() -> String {
    "auditor".to_string()
}
