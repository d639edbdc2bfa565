use std::path::{Path, PathBuf};

use crate::detection::engine::ModelAssets;

const DATA_SUBDIR: &str = ".local/share/visiontally";

/// Where the model, its labels and the ledger live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub ledger_path: PathBuf,
}

impl AppConfig {
    /// Everything under `data_dir` with the default file names.
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            model_path: data_dir.join("model.rten"),
            labels_path: data_dir.join("labels.txt"),
            ledger_path: data_dir.join("ledger.zst"),
        }
    }

    /// Per-user data directory, `$HOME/.local/share/visiontally`.
    pub fn default_data_dir() -> anyhow::Result<PathBuf> {
        let home_dir = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(Path::new(&home_dir).join(DATA_SUBDIR))
    }

    /// Defaults from the per-user data directory, with any explicit path taking precedence.
    pub fn resolve(
        data_dir: Option<PathBuf>,
        model_path: Option<PathBuf>,
        labels_path: Option<PathBuf>,
        ledger_path: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir()?,
        };
        let defaults = Self::in_dir(data_dir);
        Ok(Self {
            model_path: model_path.unwrap_or(defaults.model_path),
            labels_path: labels_path.unwrap_or(defaults.labels_path),
            ledger_path: ledger_path.unwrap_or(defaults.ledger_path),
        })
    }

    pub fn model_assets(&self) -> ModelAssets {
        ModelAssets {
            model_path: self.model_path.clone(),
            labels_path: self.labels_path.clone(),
        }
    }
}

