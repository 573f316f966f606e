//! Image decoding for dataset samples.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::Path;
use std::time::Duration;

const READ_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Decode the image at `path` into RGB.
///
/// A missing file fails immediately. Decode errors are retried because network
/// filesystems occasionally hand back short reads under load.
pub fn read_image(path: &Path) -> Result<RgbImage> {
    if !path.exists() {
        return Err(anyhow!("\"{}\" does not exist", path.display()));
    }
    let mut attempt = 1;
    loop {
        match image::open(path) {
            Ok(img) => return Ok(img.into_rgb8()),
            Err(e) if attempt < READ_ATTEMPTS => {
                log::warn!(
                    "failed to read '{}' (attempt {}/{}): {}; retrying",
                    path.display(),
                    attempt,
                    READ_ATTEMPTS,
                    e
                );
                attempt += 1;
                std::thread::sleep(RETRY_DELAY);
            }
            Err(e) => {
                return Err(anyhow!(
                    "failed to read image '{}' after {} attempts: {}",
                    path.display(),
                    READ_ATTEMPTS,
                    e
                ))
            }
        }
    }
}
