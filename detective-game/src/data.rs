//! Bundled mission catalog, datasets and engine configuration.
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::DataLoader;
use crate::mission::MissionSpec;

const MISSIONS_JSON: &str = include_str!("../assets/missions.json");
const ENGINE_JSON: &str = include_str!("../assets/engine.json");

const DATASETS: [(&str, &str); 3] = [
    (
        "acme-backorders",
        include_str!("../assets/datasets/acme-backorders.json"),
    ),
    (
        "wh04-overload",
        include_str!("../assets/datasets/wh04-overload.json"),
    ),
    (
        "i80-gridlock",
        include_str!("../assets/datasets/i80-gridlock.json"),
    ),
];

const CONFIGS: [(&str, &str); 1] = [("engine", ENGINE_JSON)];

/// Failures reading bundled assets.
#[derive(Debug, Error)]
pub enum EmbeddedError {
    #[error("no bundled dataset named '{0}'")]
    UnknownDataset(String),
    #[error("no bundled config named '{0}'")]
    UnknownConfig(String),
    #[error("bundled asset '{name}' is not valid: {source}")]
    Parse {
        name: String,
        source: serde_json::Error,
    },
}

#[derive(serde::Deserialize)]
struct MissionDocument {
    missions: Vec<MissionSpec>,
}

/// Loader backed by assets compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedLoader;

impl EmbeddedLoader {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Names of the bundled datasets.
    #[must_use]
    pub fn dataset_names() -> Vec<&'static str> {
        DATASETS.iter().map(|(name, _)| *name).collect()
    }
}

fn parse<T: DeserializeOwned>(name: &str, raw: &str) -> Result<T, EmbeddedError> {
    serde_json::from_str(raw).map_err(|source| EmbeddedError::Parse {
        name: name.to_string(),
        source,
    })
}

impl DataLoader for EmbeddedLoader {
    type Error = EmbeddedError;

    fn load_missions(&self) -> Result<Vec<MissionSpec>, Self::Error> {
        parse::<MissionDocument>("missions", MISSIONS_JSON).map(|doc| doc.missions)
    }

    fn load_dataset(&self, dataset: &str) -> Result<Vec<Value>, Self::Error> {
        let (name, raw) = DATASETS
            .iter()
            .find(|(name, _)| *name == dataset.trim())
            .ok_or_else(|| EmbeddedError::UnknownDataset(dataset.to_string()))?;
        parse(name, raw)
    }

    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: DeserializeOwned,
    {
        let (name, raw) = CONFIGS
            .iter()
            .find(|(name, _)| *name == config_name.trim())
            .ok_or_else(|| EmbeddedError::UnknownConfig(config_name.to_string()))?;
        parse(name, raw)
    }
}
