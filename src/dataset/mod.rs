//! Person re-identification datasets.
//!
//! A dataset is a flat list of `(path, pid, camid)` samples for one split.
//! Loaders such as [`personx::PersonX`] scan the on-disk layout and hand the
//! list to [`ReidDataset`], which counts identities and cameras, keeps the
//! original list around for pseudo-label renewal, and decodes images on demand.

pub mod personx;

pub use personx::PersonX;

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::image_io::read_image;
use crate::transform::Transform;

/// Pseudo label value marking an outlier that is dropped on renewal.
pub const OUTLIER_LABEL: i64 = -1;

pub const DEFAULT_VAL_SPLIT: f64 = 0.2;

/// One image of the dataset. Ordering is by path, then pid, then camid.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub pid: i64,
    pub camid: i64,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, pid: i64, camid: i64) -> Self {
        Self {
            path: path.into(),
            pid,
            camid,
        }
    }
}

/// A decoded sample as consumed by the training loop.
#[derive(Clone, Debug)]
pub struct ReidItem {
    pub img: RgbImage,
    pub path: PathBuf,
    pub id: i64,
    pub cid: i64,
    pub ind: usize,
}

/// Split of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Val,
    TrainVal,
    Query,
    Gallery,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Train,
        Mode::Val,
        Mode::TrainVal,
        Mode::Query,
        Mode::Gallery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Val => "val",
            Mode::TrainVal => "trainval",
            Mode::Query => "query",
            Mode::Gallery => "gallery",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                anyhow!(
                    "Invalid mode. Got {}, but expected to be one of [train | val | trainval | query | gallery]",
                    s
                )
            })
    }
}

/// Knobs shared by all loaders.
#[derive(Clone)]
pub struct DatasetOptions {
    /// Fraction of training identities held out for validation, in (0, 1).
    pub val_split: f64,
    /// Replace every PID with 0 (fully unsupervised training).
    pub del_labels: bool,
    /// Log the summary table after construction.
    pub verbose: bool,
    pub sort: bool,
    pub pseudo_labels: Option<Vec<i64>>,
    pub transform: Option<Arc<dyn Transform>>,
    /// Expected SHA-256 of the downloaded archive, if any.
    pub download_sha256: Option<String>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            val_split: DEFAULT_VAL_SPLIT,
            del_labels: false,
            verbose: true,
            sort: true,
            pseudo_labels: None,
            transform: None,
            download_sha256: None,
        }
    }
}

impl fmt::Debug for DatasetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetOptions")
            .field("val_split", &self.val_split)
            .field("del_labels", &self.del_labels)
            .field("verbose", &self.verbose)
            .field("sort", &self.sort)
            .field("pseudo_labels", &self.pseudo_labels.as_ref().map(Vec::len))
            .field("transform", &self.transform.is_some())
            .field("download_sha256", &self.download_sha256)
            .finish()
    }
}

/// In-memory sample list for one split.
///
/// `all_data` is the list as loaded; `data` is what `get` serves and may have
/// been rewritten by [`ReidDataset::renew_labels`].
pub struct ReidDataset {
    name: String,
    mode: Option<String>,
    data: Vec<Sample>,
    all_data: Vec<Sample>,
    num_pids: usize,
    num_cams: usize,
    transform: Option<Arc<dyn Transform>>,
}

impl ReidDataset {
    pub fn new(
        name: impl Into<String>,
        data: Vec<Sample>,
        mode: Option<String>,
        options: &DatasetOptions,
    ) -> Result<Self> {
        let (num_pids, num_cams) = parse_data(&data);
        let mut data = data;
        if options.sort {
            data.sort();
        }
        let mut dataset = Self {
            name: name.into(),
            mode,
            all_data: data.clone(),
            data,
            num_pids,
            num_cams,
            transform: options.transform.clone(),
        };
        if let Some(labels) = options.pseudo_labels.as_deref() {
            dataset.renew_labels(labels)?;
        }
        if options.verbose {
            log::info!("\n{}", dataset);
        }
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn num_pids(&self) -> usize {
        self.num_pids
    }

    pub fn num_cams(&self) -> usize {
        self.num_cams
    }

    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    pub fn all_data(&self) -> &[Sample] {
        &self.all_data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_transform(&mut self, transform: Option<Arc<dyn Transform>>) {
        self.transform = transform;
    }

    /// Decode the sample at `index` and run the transform on it.
    pub fn get(&self, index: usize) -> Result<ReidItem> {
        let sample = self.data.get(index).ok_or_else(|| {
            anyhow!(
                "index {} out of range for {} with {} samples",
                index,
                self.name,
                self.data.len()
            )
        })?;
        let mut img = read_image(&sample.path)?;
        if let Some(transform) = &self.transform {
            img = transform.apply(img)?;
        }
        Ok(ReidItem {
            img,
            path: sample.path.clone(),
            id: sample.pid,
            cid: sample.camid,
            ind: index,
        })
    }

    pub fn get_many(&self, indices: &[usize]) -> Result<Vec<ReidItem>> {
        indices.iter().map(|&index| self.get(index)).collect()
    }

    /// Swap in cluster assignments, one per entry of `all_data`.
    ///
    /// Samples labeled [`OUTLIER_LABEL`] are left out of the served list.
    pub fn renew_labels(&mut self, pseudo_labels: &[i64]) -> Result<()> {
        if pseudo_labels.len() != self.all_data.len() {
            return Err(anyhow!(
                "the number of pseudo labels should be the same as that of data ({} != {})",
                pseudo_labels.len(),
                self.all_data.len()
            ));
        }
        self.data = pseudo_labels
            .iter()
            .zip(&self.all_data)
            .filter(|(label, _)| **label != OUTLIER_LABEL)
            .map(|(&label, sample)| Sample::new(sample.path.clone(), label, sample.camid))
            .collect();
        let (num_pids, num_cams) = parse_data(&self.data);
        self.num_pids = num_pids;
        self.num_cams = num_cams;
        log::debug!(
            "{}: renewed labels, {} of {} samples kept, {} clusters",
            self.name,
            self.data.len(),
            self.all_data.len(),
            self.num_pids
        );
        Ok(())
    }

    /// Concatenate two splits, e.g. query and gallery for one test loader.
    pub fn combine(&self, other: &ReidDataset) -> ReidDataset {
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        let mode = format!("{}+{}", mode_label(&self.mode), mode_label(&other.mode));
        let (num_pids, num_cams) = parse_data(&data);
        ReidDataset {
            name: self.name.clone(),
            mode: Some(mode),
            all_data: data.clone(),
            data,
            num_pids,
            num_cams,
            transform: self.transform.clone(),
        }
    }
}

impl std::ops::Add for &ReidDataset {
    type Output = ReidDataset;

    fn add(self, other: &ReidDataset) -> ReidDataset {
        self.combine(other)
    }
}

impl fmt::Display for ReidDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-----------------------------------------------------")?;
        writeln!(f, "         dataset        | # ids | # items | # cameras")?;
        writeln!(f, "-----------------------------------------------------")?;
        writeln!(
            f,
            "{} - {}    | {} | {} | {}",
            self.name,
            mode_label(&self.mode),
            self.num_pids,
            self.len(),
            self.num_cams
        )
    }
}

impl fmt::Debug for ReidDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReidDataset")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("len", &self.data.len())
            .field("num_pids", &self.num_pids)
            .field("num_cams", &self.num_cams)
            .finish()
    }
}

fn mode_label(mode: &Option<String>) -> &str {
    mode.as_deref().unwrap_or("Nomode")
}

/// Number of distinct PIDs and distinct camera ids in `data`.
pub fn parse_data(data: &[Sample]) -> (usize, usize) {
    let pids: BTreeSet<i64> = data.iter().map(|s| s.pid).collect();
    let cams: BTreeSet<i64> = data.iter().map(|s| s.camid).collect();
    (pids.len(), cams.len())
}

/// Fail on the first path that does not exist.
pub fn check_before_run<P: AsRef<Path>>(required: &[P]) -> Result<()> {
    for path in required {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow!("\"{}\" is not found", path.display()));
        }
    }
    Ok(())
}

pub const KNOWN_DATASETS: &[&str] = &["personx"];

/// Build a split of a dataset by name.
pub fn build_dataset(
    name: &str,
    root: &Path,
    mode: Mode,
    options: &DatasetOptions,
) -> Result<ReidDataset> {
    match name.trim().to_lowercase().as_str() {
        "personx" => PersonX::new(root).load(mode, options),
        other => Err(anyhow!(
            "unknown dataset '{}'; expected one of [{}]",
            other,
            KNOWN_DATASETS.join(" | ")
        )),
    }
}
