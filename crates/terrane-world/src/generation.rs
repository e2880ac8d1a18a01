//! Procedural height patch generation.

use rayon::prelude::*;
use terrane_core::{GridCoord, PatchKey, Result, TerrainSettings};

use crate::noise_field::NoiseField;

/// Sample layout shared by every patch of a terrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchLayout {
    /// Grid cells along the nominal patch edge.
    pub grid_size: u32,
    /// Extra samples before the nominal origin on each axis.
    pub margin: u32,
    /// Samples per row (and rows per patch).
    pub dimension: u32,
}

impl PatchLayout {
    /// Derive the layout from the settings, rejecting fractional margins.
    pub fn from_settings(settings: &TerrainSettings) -> Result<Self> {
        let total_margin = settings.bleed_margin()?;
        Ok(Self {
            grid_size: settings.grid_size,
            margin: total_margin / 2,
            dimension: settings.patch_dimension()?,
        })
    }

    /// Total samples in one patch buffer.
    #[inline]
    pub const fn sample_count(&self) -> usize {
        (self.dimension as usize) * (self.dimension as usize)
    }

    /// Lattice step in patch units for a level scale factor.
    #[inline]
    pub fn step(&self, level_scale: i32) -> f64 {
        f64::from(level_scale) / f64::from(self.grid_size)
    }

    /// Patch-unit position of sample (`col`, `row`) of the patch at `coord`.
    #[inline]
    pub fn sample_position(&self, level_scale: i32, coord: GridCoord, col: u32, row: u32) -> (f64, f64) {
        let step = self.step(level_scale);
        let margin = f64::from(self.margin);
        (
            f64::from(coord.x) + (f64::from(col) - margin) * step,
            f64::from(coord.y) + (f64::from(row) - margin) * step,
        )
    }
}

/// Row-major elevation samples for one patch, including the bleed border.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightPatch {
    pub key: PatchKey,
    pub dimension: u32,
    pub samples: Vec<f32>,
}

impl HeightPatch {
    /// Sample at (`col`, `row`).
    #[inline]
    pub fn get(&self, col: u32, row: u32) -> f32 {
        self.samples[(row * self.dimension + col) as usize]
    }

    /// Lowest and highest sample.
    pub fn height_range(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            })
    }
}

/// Anything that can produce height patches on demand.
///
/// Implemented by [`HeightPatchGenerator`]; the background builder is
/// generic over it so tests can substitute their own sources.
pub trait PatchSource: Send + Sync + 'static {
    /// Sample layout of produced patches.
    fn layout(&self) -> PatchLayout;

    /// Build the patch for `key`.
    fn build(&self, key: PatchKey) -> HeightPatch;
}

/// Builds height patches by sampling a [`NoiseField`] on a regular lattice.
#[derive(Clone, Debug)]
pub struct HeightPatchGenerator {
    noise: NoiseField,
    layout: PatchLayout,
}

impl HeightPatchGenerator {
    /// Create a generator from validated settings.
    pub fn new(settings: &TerrainSettings) -> Result<Self> {
        Ok(Self {
            noise: NoiseField::new(settings.seed, settings.noise.clone()),
            layout: PatchLayout::from_settings(settings)?,
        })
    }

    /// Create a generator from parts.
    pub fn with_noise(noise: NoiseField, layout: PatchLayout) -> Self {
        Self { noise, layout }
    }

    /// Get the sample layout.
    pub fn layout(&self) -> PatchLayout {
        self.layout
    }

    /// Get the noise field.
    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Generate the samples of the patch with origin `(grid_x, grid_y)`.
    ///
    /// The lattice step is `level_scale / grid_size` and the sampled area
    /// extends `margin` samples beyond the nominal patch on every edge.
    pub fn generate(&self, level_scale: i32, grid_x: i32, grid_y: i32) -> Vec<f32> {
        let mut samples = vec![0.0; self.layout.sample_count()];
        self.fill(level_scale, GridCoord::new(grid_x, grid_y), &mut samples);
        samples
    }

    /// Write the samples of the patch at `coord` into `out`, overwriting it.
    pub fn fill(&self, level_scale: i32, coord: GridCoord, out: &mut [f32]) {
        let dim = self.layout.dimension;
        assert_eq!(out.len(), self.layout.sample_count(), "patch buffer size mismatch");

        let _span = tracing::trace_span!("generate_patch", level_scale, x = coord.x, y = coord.y)
            .entered();
        for (row, line) in out.chunks_exact_mut(dim as usize).enumerate() {
            for (col, sample) in line.iter_mut().enumerate() {
                let (x, y) = self
                    .layout
                    .sample_position(level_scale, coord, col as u32, row as u32);
                *sample = self.noise.elevation(x, y) as f32;
            }
        }
    }

    /// Generate the patch for a key.
    pub fn generate_patch(&self, key: PatchKey) -> HeightPatch {
        HeightPatch {
            key,
            dimension: self.layout.dimension,
            samples: self.generate(key.level_factor(), key.coord.x, key.coord.y),
        }
    }

    /// Generate multiple patches in parallel.
    pub fn generate_many(&self, keys: &[PatchKey]) -> Vec<HeightPatch> {
        keys.par_iter().map(|&key| self.generate_patch(key)).collect()
    }

    /// Terrain height under a world-space position.
    pub fn height_at_world(&self, world_x: f32, world_z: f32, patch_world_size: f32) -> f32 {
        self.noise.height_at_world(world_x, world_z, patch_world_size)
    }
}

impl PatchSource for HeightPatchGenerator {
    fn layout(&self) -> PatchLayout {
        self.layout
    }

    fn build(&self, key: PatchKey) -> HeightPatch {
        self.generate_patch(key)
    }
}
