//! Sample transform seam.
//!
//! The training pipeline owns augmentation and tensor conversion. Loaders only
//! need something that maps one decoded image to another.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;

pub trait Transform: Send + Sync {
    fn apply(&self, img: RgbImage) -> Result<RgbImage>;
}

/// Bilinear resize to a fixed size.
#[derive(Clone, Copy, Debug)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("resize target must be non-zero, got {}x{}", width, height));
        }
        Ok(Self { width, height })
    }
}

impl Transform for Resize {
    fn apply(&self, img: RgbImage) -> Result<RgbImage> {
        if img.dimensions() == (self.width, self.height) {
            return Ok(img);
        }
        Ok(imageops::resize(&img, self.width, self.height, FilterType::Triangle))
    }
}

/// Applies transforms in order.
#[derive(Clone, Default)]
pub struct Compose {
    steps: Vec<Arc<dyn Transform>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<T: Transform + 'static>(mut self, step: T) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, img: RgbImage) -> Result<RgbImage> {
        self.steps.iter().try_fold(img, |img, step| step.apply(img))
    }
}
