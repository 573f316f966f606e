//! Person re-identification dataset loading.
//!
//! This crate turns an on-disk re-ID dataset into per-split sample lists for a
//! training loop.
//!
//! # Module Structure
//!
//! - `dataset`: `ReidDataset` (sample list, counts, pseudo labels) and loaders (`PersonX`)
//! - `fetch`: archive download, checksum and extraction
//! - `config`: layered configuration (JSON file + environment)
//! - `dist`: process rank, so only the main process prepares data
//! - `image_io`, `transform`: sample decoding and the transform seam
//! - `fsutil`: directory and JSON helpers

pub mod config;
pub mod dataset;
pub mod dist;
pub mod fetch;
pub mod fsutil;
pub mod image_io;
pub mod transform;

pub use config::DataConfig;
pub use dataset::{
    build_dataset, check_before_run, parse_data, DatasetOptions, Mode, PersonX, ReidDataset,
    ReidItem, Sample, OUTLIER_LABEL,
};
pub use fetch::{download_dataset, download_url, extract_archive, ArchiveKind, FetchOptions};
pub use image_io::read_image;
pub use transform::{Compose, Resize, Transform};
