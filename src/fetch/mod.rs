//! Dataset acquisition: HTTP download, integrity check and extraction.
//!
//! Downloads run only on the main process. A dataset directory that already
//! exists is taken as prepared and never touched again.

pub mod archive;

pub use archive::{extract_archive, ArchiveKind};

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::dist;
use crate::fsutil::mkdir_if_missing;

const FALLBACK_FILE_NAME: &str = "download";

/// Download `url` to `dst`, showing progress on stderr.
///
/// The body is streamed into `<dst>.part` and renamed once complete, so an
/// interrupted transfer never leaves a truncated archive at `dst`.
pub fn download_url(url: &str, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        mkdir_if_missing(parent)?;
    }
    log::info!("* url=\"{}\"", url);
    log::info!("* destination=\"{}\"", dst.display());

    fetch_to(url, dst).map_err(|e| {
        anyhow!(
            "Please download the dataset manually from {} to {}: {:#}",
            url,
            dst.display(),
            e
        )
    })
}

fn fetch_to(url: &str, dst: &Path) -> Result<()> {
    let response = ureq::get(url).call().map_err(request_error)?;
    let total = response
        .header("Content-Length")
        .and_then(|len| len.trim().parse::<u64>().ok());
    let progress = progress_bar(total);

    let partial = partial_path(dst);
    let result = (|| -> Result<u64> {
        let file =
            File::create(&partial).with_context(|| format!("create {}", partial.display()))?;
        let mut writer = BufWriter::new(file);
        let mut reader = progress.wrap_read(response.into_reader());
        let written = io::copy(&mut reader, &mut writer).context("read response body")?;
        writer.flush()?;
        Ok(written)
    })();

    match result {
        Ok(written) => {
            progress.finish_and_clear();
            if let Some(expected) = total {
                if written != expected {
                    let _ = fs::remove_file(&partial);
                    return Err(anyhow!(
                        "truncated download: got {} of {} bytes",
                        written,
                        expected
                    ));
                }
            }
            fs::rename(&partial, dst)
                .with_context(|| format!("move {} to {}", partial.display(), dst.display()))?;
            log::info!("downloaded {} bytes", written);
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

/// `download_url` already names the URL, so keep it out of the cause.
fn request_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            anyhow!("server answered {} {}", code, response.status_text())
        }
        ureq::Error::Transport(transport) => match transport.message() {
            Some(message) => anyhow!("request failed: {}: {}", transport.kind(), message),
            None => anyhow!("request failed: {}", transport.kind()),
        },
    }
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            let style = ProgressStyle::with_template(
                "{percent:>3}% [{bar:40}] {bytes}/{total_bytes} {bytes_per_sec} {elapsed}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
            bar.set_style(style);
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner} {bytes} {bytes_per_sec} {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        }
    };
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dst.with_file_name(name)
}

/// File name a download of `url` is stored under: the last path segment.
pub fn url_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_sha256(path: &Path, expected_hex: &str) -> Result<()> {
    let expected = expected_hex.trim().to_lowercase();
    if expected.len() != 64 || hex::decode(&expected).is_err() {
        return Err(anyhow!("expected sha256 must be 64 hex characters"));
    }
    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(anyhow!(
            "sha256 mismatch for {} (expected={}, actual={})",
            path.display(),
            expected,
            actual
        ));
    }
    Ok(())
}

/// Options for `download_dataset` beyond the URL itself.
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub sha256: Option<String>,
}

/// Make sure `dataset_dir` holds the named dataset, fetching it if needed.
///
/// Non-main ranks return immediately. An existing directory is left as is.
/// Without a URL the dataset has to be placed there by hand.
pub fn download_dataset(
    name: &str,
    dataset_dir: &Path,
    url: Option<&str>,
    options: &FetchOptions,
) -> Result<()> {
    if !dist::is_main_process() {
        log::debug!("rank {} skips {} download", dist::rank(), name);
        return Ok(());
    }
    if dataset_dir.exists() {
        return Ok(());
    }
    let Some(url) = url else {
        return Err(anyhow!(
            "{} dataset needs to be manually prepared, please download this dataset under the folder of {}",
            name,
            dataset_dir.display()
        ));
    };

    log::info!("Creating directory {}", dataset_dir.display());
    mkdir_if_missing(dataset_dir)?;
    if let Err(e) = fetch_into(name, dataset_dir, url, options) {
        // A leftover directory would pass the existence check on the next run.
        if let Err(cleanup) = fs::remove_dir_all(dataset_dir) {
            log::warn!(
                "failed to remove incomplete {}: {}",
                dataset_dir.display(),
                cleanup
            );
        }
        return Err(e);
    }
    log::info!("{} dataset is ready", name);
    Ok(())
}

fn fetch_into(name: &str, dataset_dir: &Path, url: &str, options: &FetchOptions) -> Result<()> {
    let fpath = dataset_dir.join(url_file_name(url));

    log::info!("Downloading {} dataset to {}", name, dataset_dir.display());
    download_url(url, &fpath)?;
    if let Some(expected) = options.sha256.as_deref() {
        verify_sha256(&fpath, expected)?;
    }

    log::info!("Extracting {}", fpath.display());
    let kind = extract_archive(&fpath, dataset_dir)?;
    log::debug!("{} unpacked as {:?}", fpath.display(), kind);
    Ok(())
}
