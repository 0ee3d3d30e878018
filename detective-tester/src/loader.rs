//! Mission data read from a directory on disk.
//!
//! Layout: `missions.json`, optional `<config>.json` files, and
//! `datasets/<name>.json` row arrays.
use detective_game::{DataLoader, MissionSpec};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("'{0}' is not a plain asset name")]
    InvalidName(String),
}

#[derive(Deserialize)]
struct MissionDocument {
    missions: Vec<MissionSpec>,
}

#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn asset_path(&self, dir: Option<&str>, name: &str) -> Result<PathBuf, DirectoryError> {
        let name = name.trim();
        let plain = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !plain {
            return Err(DirectoryError::InvalidName(name.to_string()));
        }
        let mut path = self.root.clone();
        if let Some(dir) = dir {
            path.push(dir);
        }
        path.push(format!("{name}.json"));
        Ok(path)
    }
}

fn read(path: &Path) -> Result<String, DirectoryError> {
    fs::read_to_string(path).map_err(|source| DirectoryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, DirectoryError> {
    serde_json::from_str(raw).map_err(|source| DirectoryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl DataLoader for DirectoryLoader {
    type Error = DirectoryError;

    fn load_missions(&self) -> Result<Vec<MissionSpec>, Self::Error> {
        let path = self.asset_path(None, "missions")?;
        let raw = read(&path)?;
        parse::<MissionDocument>(&path, &raw).map(|doc| doc.missions)
    }

    fn load_dataset(&self, dataset: &str) -> Result<Vec<Value>, Self::Error> {
        let path = self.asset_path(Some("datasets"), dataset)?;
        let raw = read(&path)?;
        parse(&path, &raw)
    }

    /// A missing config file means "use defaults".
    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: DeserializeOwned,
    {
        let path = self.asset_path(None, config_name)?;
        match fs::read_to_string(&path) {
            Ok(raw) => parse(&path, &raw),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("{} not found, using defaults", path.display());
                parse(&path, "{}")
            }
            Err(source) => Err(DirectoryError::Io { path, source }),
        }
    }
}
