//! Heightmap export.

use std::path::Path;

use anyhow::Context;
use image::{ImageBuffer, Luma};
use terrane_world::HeightPatch;
use tracing::info;

/// Convert a patch to a 16-bit grayscale image, stretching its height range.
pub fn patch_image(patch: &HeightPatch) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let (lo, hi) = patch.height_range();
    let span = (hi - lo).max(f32::EPSILON);
    ImageBuffer::from_fn(patch.dimension, patch.dimension, |x, y| {
        let t = (patch.get(x, y) - lo) / span;
        Luma([(t * f32::from(u16::MAX)).round() as u16])
    })
}

/// Write a patch heightmap as PNG.
pub fn save_patch(patch: &HeightPatch, path: &Path) -> anyhow::Result<()> {
    patch_image(patch)
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), key = ?patch.key, "exported patch heightmap");
    Ok(())
}
