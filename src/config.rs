use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dataset::{DatasetOptions, DEFAULT_VAL_SPLIT, KNOWN_DATASETS};

const DEFAULT_ROOT: &str = "data";
const DEFAULT_DATASET: &str = "personx";

#[derive(Debug, Deserialize, Default)]
struct DataConfigFile {
    root: Option<PathBuf>,
    dataset: Option<String>,
    val_split: Option<f64>,
    del_labels: Option<bool>,
    verbose: Option<bool>,
    sort: Option<bool>,
    download: Option<DownloadConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DownloadConfigFile {
    sha256: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub root: PathBuf,
    pub dataset: String,
    pub val_split: f64,
    pub del_labels: bool,
    pub verbose: bool,
    pub sort: bool,
    pub download: DownloadSettings,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadSettings {
    pub sha256: Option<String>,
}

impl DataConfig {
    /// Defaults, then `REID_DATA_CONFIG` (JSON), then `REID_DATA_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REID_DATA_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DataConfigFile) -> Self {
        Self {
            root: file.root.unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
            dataset: file
                .dataset
                .unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            val_split: file.val_split.unwrap_or(DEFAULT_VAL_SPLIT),
            del_labels: file.del_labels.unwrap_or(false),
            verbose: file.verbose.unwrap_or(true),
            sort: file.sort.unwrap_or(true),
            download: DownloadSettings {
                sha256: file.download.and_then(|download| download.sha256),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("REID_DATA_ROOT") {
            if !root.trim().is_empty() {
                self.root = PathBuf::from(root);
            }
        }
        if let Ok(dataset) = std::env::var("REID_DATA_DATASET") {
            if !dataset.trim().is_empty() {
                self.dataset = dataset;
            }
        }
        if let Ok(split) = std::env::var("REID_DATA_VAL_SPLIT") {
            self.val_split = split
                .trim()
                .parse()
                .map_err(|_| anyhow!("REID_DATA_VAL_SPLIT must be a number in (0, 1)"))?;
        }
        if let Ok(flag) = std::env::var("REID_DATA_DEL_LABELS") {
            self.del_labels = parse_bool(&flag)
                .ok_or_else(|| anyhow!("REID_DATA_DEL_LABELS must be true/false/1/0"))?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.dataset = self.dataset.trim().to_lowercase();
        if !KNOWN_DATASETS.contains(&self.dataset.as_str()) {
            return Err(anyhow!(
                "unknown dataset '{}'; expected one of [{}]",
                self.dataset,
                KNOWN_DATASETS.join(" | ")
            ));
        }
        if !(self.val_split > 0.0 && self.val_split < 1.0) {
            return Err(anyhow!(
                "val_split must be within (0.0, 1.0), got {}",
                self.val_split
            ));
        }
        if let Some(sha) = &self.download.sha256 {
            if sha.trim().len() != 64 {
                return Err(anyhow!("download.sha256 must be 64 hex characters"));
            }
        }
        Ok(())
    }

    /// Loader options for this configuration, without transform or pseudo labels.
    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            val_split: self.val_split,
            del_labels: self.del_labels,
            verbose: self.verbose,
            sort: self.sort,
            pseudo_labels: None,
            transform: None,
            download_sha256: self.download.sha256.clone(),
        }
    }

    /// Same as `dataset_options` with the summary table switched off, for
    /// callers that print the summary themselves.
    pub fn quiet_dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            verbose: false,
            ..self.dataset_options()
        }
    }
}

fn read_config_file(path: &Path) -> Result<DataConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
