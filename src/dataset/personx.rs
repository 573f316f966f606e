//! PersonX loader.
//!
//! Sun et al., "Dissecting Person Re-identification from the Viewpoint of
//! Viewpoint", CVPR 2019. The synthetic subset has 1266 identities (train +
//! query) over 9840 train, 5136 query and 30816 gallery images.
//!
//! Expected layout under `<root>/personx/subset1`:
//!
//! ```text
//! bounding_box_train/  0001_c3s1_000001.jpg ...
//! bounding_box_test/   (gallery)
//! query/
//! ```
//!
//! File names start with `<pid>_c<camera>`. Train and val split the training
//! identities by range, so no identity appears in both.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{check_before_run, DatasetOptions, Mode, ReidDataset, Sample};
use crate::fetch::{download_dataset, FetchOptions};
use crate::fsutil::{absolute, expand_user};

pub const NAME: &str = "PersonX";
pub const DIR_NAME: &str = "personx";
pub const DATASET_URL: &str =
    "https://drive.google.com/file/d/1hiHoDt3u7_GfeICMdEBt2Of8vXr1RF-U/view";

const SUBSET_DIR: &str = "subset1";
const TRAIN_DIR: &str = "bounding_box_train";
const GALLERY_DIR: &str = "bounding_box_test";
const QUERY_DIR: &str = "query";
const IMAGE_EXT: &str = "jpg";

/// PID used by junk/distractor images.
const JUNK_PID: i64 = -1;

/// Raw PersonX camera ids, in label order.
const CAMERAS: [i64; 6] = [3, 4, 8, 10, 11, 12];

#[derive(Clone, Debug)]
pub struct PersonX {
    root: PathBuf,
}

/// Which directory a split reads and which identity range it keeps.
#[derive(Clone, Debug, PartialEq)]
pub struct SubsetConfig {
    pub dir: PathBuf,
    pub range: [f64; 2],
    pub relabel: bool,
}

impl PersonX {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/personx`, with `~` expanded and made absolute.
    pub fn dataset_dir(&self) -> Result<PathBuf> {
        Ok(absolute(&expand_user(&self.root))?.join(DIR_NAME))
    }

    pub fn load(&self, mode: Mode, options: &DatasetOptions) -> Result<ReidDataset> {
        let val_split = options.val_split;
        if !(val_split > 0.0 && val_split < 1.0) {
            return Err(anyhow!(
                "the percentage of val_set should be within (0.0,1.0), got {}",
                val_split
            ));
        }

        let mut dataset_dir = self.dataset_dir()?;
        let fetch = FetchOptions {
            sha256: options.download_sha256.clone(),
        };
        download_dataset(NAME, &dataset_dir, Some(DATASET_URL), &fetch)?;

        let subset_dir = dataset_dir.join(SUBSET_DIR);
        if subset_dir.is_dir() {
            dataset_dir = subset_dir;
        } else {
            log::warn!(
                "The current data structure is deprecated. Please put data folders such as \"{}\" under \"{}\".",
                TRAIN_DIR,
                SUBSET_DIR
            );
        }

        let cfg = subset_config(&dataset_dir, mode, val_split);
        check_before_run(&[dataset_dir.as_path(), cfg.dir.as_path()])?;

        let data = process_dir(&cfg.dir, cfg.range, cfg.relabel, options.del_labels)?;
        log::debug!(
            "{} {}: {} images from {}",
            NAME,
            mode,
            data.len(),
            cfg.dir.display()
        );
        ReidDataset::new(NAME, data, Some(mode.as_str().to_string()), options)
    }
}

pub fn subset_config(dataset_dir: &Path, mode: Mode, val_split: f64) -> SubsetConfig {
    let train_dir = dataset_dir.join(TRAIN_DIR);
    let (dir, range, relabel) = match mode {
        Mode::Train => (train_dir, [0.0, 1.0 - val_split], true),
        Mode::Val => (train_dir, [1.0 - val_split, 1.0], false),
        Mode::TrainVal => (train_dir, [0.0, 1.0], true),
        Mode::Query => (dataset_dir.join(QUERY_DIR), [0.0, 1.0], false),
        Mode::Gallery => (dataset_dir.join(GALLERY_DIR), [0.0, 1.0], false),
    };
    SubsetConfig {
        dir,
        range,
        relabel,
    }
}

/// Scan `dir` for images and label them.
///
/// Only identities whose rank among the sorted distinct PIDs falls in `range`
/// are kept. With `relabel` the kept PIDs become `0..k`; with `del_labels`
/// every PID becomes 0. Camera ids are mapped to `0..6`.
pub fn process_dir(
    dir: &Path,
    range: [f64; 2],
    relabel: bool,
    del_labels: bool,
) -> Result<Vec<Sample>> {
    let img_paths = list_images(dir)?;
    let mut parsed = Vec::with_capacity(img_paths.len());
    for path in img_paths {
        let (pid, camid) = parse_file_name(&path)?;
        parsed.push((path, pid, camid));
    }

    let pid_container: Vec<i64> = parsed
        .iter()
        .map(|(_, pid, _)| *pid)
        .filter(|pid| *pid != JUNK_PID)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (start, end) = select_range(pid_container.len(), range);
    let selected = &pid_container[start..end];
    if selected.is_empty() {
        return Err(anyhow!(
            "no identities in {} for range [{}, {}]",
            dir.display(),
            range[0],
            range[1]
        ));
    }
    let pid2label: HashMap<i64, i64> = selected
        .iter()
        .enumerate()
        .map(|(label, pid)| (*pid, label as i64))
        .collect();

    let mut data = Vec::new();
    for (path, pid, camid) in parsed {
        let Some(&label) = pid2label.get(&pid) else {
            continue;
        };
        let cam_label = camera_label(camid).ok_or_else(|| {
            anyhow!(
                "unexpected camera id {} in {}; expected one of {:?}",
                camid,
                path.display(),
                CAMERAS
            )
        })?;
        let pid = if del_labels {
            0
        } else if relabel {
            label
        } else {
            pid
        };
        data.push(Sample::new(path, pid, cam_label));
    }
    Ok(data)
}

/// `<pid>_c<camera>` from the file name. PID may be `-1` for junk images.
pub fn parse_file_name(path: &Path) -> Result<(i64, i64)> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| Regex::new(r"(-?\d+)_c(\d+)").unwrap());

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("image path {} has no utf-8 file name", path.display()))?;
    let caps = re
        .captures(name)
        .ok_or_else(|| anyhow!("file name {} does not match <pid>_c<camera>", name))?;
    let pid = caps[1]
        .parse()
        .with_context(|| format!("pid out of range in {}", name))?;
    let camid = caps[2]
        .parse()
        .with_context(|| format!("camera id out of range in {}", name))?;
    Ok((pid, camid))
}

/// Zero-based camera label for a raw PersonX camera id.
pub fn camera_label(camid: i64) -> Option<i64> {
    CAMERAS
        .iter()
        .position(|&cam| cam == camid)
        .map(|idx| idx as i64)
}

/// Index range `[start, end)` of `n` sorted identities covered by `range`.
///
/// Bounds round half to even.
pub fn select_range(n: usize, range: [f64; 2]) -> (usize, usize) {
    let bound = |frac: f64| ((n as f64 * frac).round_ties_even().max(0.0) as usize).min(n);
    let start = bound(range[0]);
    let end = bound(range[1]).max(start);
    (start, end)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXT) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) -> Result<()> {
        fs::create_dir_all(dir)?;
        for name in names {
            fs::write(dir.join(name), b"")?;
        }
        Ok(())
    }

    #[test]
    fn parses_pid_and_camera() -> Result<()> {
        assert_eq!(parse_file_name(Path::new("/d/0012_c8s2_001.jpg"))?, (12, 8));
        assert_eq!(parse_file_name(Path::new("-1_c3s1_000401.jpg"))?, (-1, 3));
        assert!(parse_file_name(Path::new("/d/readme.jpg")).is_err());
        Ok(())
    }

    #[test]
    fn camera_labels_are_zero_based() {
        assert_eq!(camera_label(3), Some(0));
        assert_eq!(camera_label(12), Some(5));
        assert_eq!(camera_label(5), None);
    }

    #[test]
    fn select_range_rounds_half_to_even() {
        assert_eq!(select_range(5, [0.0, 0.5]), (0, 2));
        assert_eq!(select_range(7, [0.0, 0.5]), (0, 4));
        assert_eq!(select_range(10, [0.8, 1.0]), (8, 10));
        assert_eq!(select_range(0, [0.0, 1.0]), (0, 0));
    }

    #[test]
    fn subset_configs_match_modes() {
        let dir = Path::new("/data/personx/subset1");
        let train = subset_config(dir, Mode::Train, 0.25);
        assert_eq!(train.dir, dir.join(TRAIN_DIR));
        assert_eq!(train.range, [0.0, 0.75]);
        assert!(train.relabel);

        let val = subset_config(dir, Mode::Val, 0.25);
        assert_eq!(val.range, [0.75, 1.0]);
        assert!(!val.relabel);

        assert_eq!(subset_config(dir, Mode::Gallery, 0.25).dir, dir.join(GALLERY_DIR));
        assert_eq!(subset_config(dir, Mode::Query, 0.25).dir, dir.join(QUERY_DIR));
        assert!(subset_config(dir, Mode::TrainVal, 0.25).relabel);
    }

    #[test]
    fn process_dir_relabels_and_skips_junk() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        touch(
            tmp.path(),
            &[
                "0007_c3s1_01.jpg",
                "0007_c4s1_02.jpg",
                "0042_c12s1_01.jpg",
                "-1_c8s1_01.jpg",
                "0042_c10s1_01.png",
                ".0042_c10s1_01.jpg",
            ],
        )?;
        let data = process_dir(tmp.path(), [0.0, 1.0], true, false)?;
        let labels: Vec<(i64, i64)> = data.iter().map(|s| (s.pid, s.camid)).collect();
        assert_eq!(labels, vec![(0, 0), (0, 1), (1, 5)]);

        let raw = process_dir(tmp.path(), [0.0, 1.0], false, false)?;
        assert_eq!(raw[2].pid, 42);

        let deleted = process_dir(tmp.path(), [0.0, 1.0], true, true)?;
        assert!(deleted.iter().all(|s| s.pid == 0));
        Ok(())
    }

    #[test]
    fn process_dir_rejects_unknown_camera() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        touch(tmp.path(), &["0001_c5s1_01.jpg"])?;
        let err = process_dir(tmp.path(), [0.0, 1.0], false, false).unwrap_err();
        assert!(err.to_string().contains("unexpected camera id 5"));
        Ok(())
    }

    #[test]
    fn process_dir_rejects_empty_selection() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        touch(tmp.path(), &["0001_c3s1_01.jpg"])?;
        assert!(process_dir(tmp.path(), [0.8, 1.0], false, false).is_err());
        Ok(())
    }
}
