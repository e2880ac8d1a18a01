//! Terrain configuration.
//!
//! Everything here is fixed for the lifetime of a terrain instance. Call
//! [`TerrainSettings::validate`] before building anything from it; a malformed
//! configuration is a startup error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_GRID_SIZE, DEFAULT_LEVEL_COUNT, DEFAULT_PATCH_WORLD_SIZE, MAX_LAYER_COUNT,
    MAX_RENDER_DISTANCE, SKIRT_SENTINEL_HEIGHT,
};
use crate::error::{Error, Result};

/// How patches are distributed over the level chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LodStrategy {
    /// Concentric rings per level, each coarser ring leaving a hole for the finer one.
    #[default]
    NestedRings,
    /// Start at the coarsest level and split patches near the viewer.
    Quadtree,
}

/// Which points of a patch the facing test looks at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    /// Keep a patch when any corner is in front.
    #[default]
    Corners,
    /// Keep a patch when its center is in front.
    Center,
}

/// Fractal noise parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// Number of octaves summed.
    pub octaves: u32,
    /// Frequency of the first octave, in cycles per patch unit.
    pub base_frequency: f64,
    /// World height of a unit of summed noise.
    pub height_scale: f64,
    /// Added to every sample so the surface sits above the reference plane.
    pub vertical_offset: f64,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            octaves: 10,
            base_frequency: 0.25,
            height_scale: 160.0,
            vertical_offset: 40.0,
        }
    }
}

/// Terrain engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Seed for noise generation.
    pub seed: u64,
    /// Grid cells along one patch edge.
    pub grid_size: u32,
    /// Sampled extent relative to the nominal patch (1.25 = 12.5% per edge).
    pub bleed_factor: f64,
    /// Extra samples per axis on top of the bled grid.
    pub skirt_padding: u32,
    /// Texture layers (cache slots) per level.
    pub layer_count: usize,
    /// Number of resolution levels.
    pub level_count: u32,
    /// Patches beyond the viewer's own to draw at each level.
    pub render_distance: u32,
    /// Edge length of a level-0 patch in world units.
    pub patch_world_size: f32,
    /// Height of skirt vertices in the mesh template.
    pub skirt_height: f32,
    pub noise: NoiseSettings,
    pub lod_strategy: LodStrategy,
    pub cull_mode: CullMode,
    /// Cosine threshold of the facing test.
    pub facing_threshold: f32,
    /// How far behind the viewer (patch units, scaled by level) the facing apex sits.
    pub apex_setback: f32,
    /// Quadtree split distance, in multiples of the patch size.
    pub subdivide_distance: f32,
    /// Generate patches on a background worker.
    pub async_generation: bool,
    /// Seed for victim selection; entropy when unset.
    pub eviction_seed: Option<u64>,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            grid_size: DEFAULT_GRID_SIZE,
            bleed_factor: 1.25,
            skirt_padding: 1,
            layer_count: MAX_LAYER_COUNT,
            level_count: DEFAULT_LEVEL_COUNT,
            render_distance: 3,
            patch_world_size: DEFAULT_PATCH_WORLD_SIZE,
            skirt_height: SKIRT_SENTINEL_HEIGHT,
            noise: NoiseSettings::default(),
            lod_strategy: LodStrategy::default(),
            cull_mode: CullMode::default(),
            facing_threshold: 0.5,
            apex_setback: 0.0,
            subdivide_distance: 1.5,
            async_generation: false,
            eviction_seed: None,
        }
    }
}

impl TerrainSettings {
    /// Create settings with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Load settings from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Set the grid size.
    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set the layer count.
    pub fn with_layer_count(mut self, layer_count: usize) -> Self {
        self.layer_count = layer_count;
        self
    }

    /// Set the number of levels.
    pub fn with_level_count(mut self, level_count: u32) -> Self {
        self.level_count = level_count;
        self
    }

    /// Set the render distance.
    pub fn with_render_distance(mut self, render_distance: u32) -> Self {
        self.render_distance = render_distance;
        self
    }

    /// Set the LOD strategy.
    pub fn with_lod_strategy(mut self, strategy: LodStrategy) -> Self {
        self.lod_strategy = strategy;
        self
    }

    /// Enable or disable background generation.
    pub fn with_async_generation(mut self, enabled: bool) -> Self {
        self.async_generation = enabled;
        self
    }

    /// Fix the eviction seed.
    pub fn with_eviction_seed(mut self, seed: u64) -> Self {
        self.eviction_seed = Some(seed);
        self
    }

    /// Total bleed margin in samples per axis (both edges together).
    ///
    /// Fails when the bleed does not land on a whole, even number of samples.
    pub fn bleed_margin(&self) -> Result<u32> {
        let total = f64::from(self.grid_size) * (self.bleed_factor - 1.0);
        if total < 0.0 || total.fract() != 0.0 {
            return Err(Error::InvalidConfig(format!(
                "grid size {} with bleed factor {} gives a fractional margin of {total} samples",
                self.grid_size, self.bleed_factor
            )));
        }
        let total = total as u32;
        if total % 2 != 0 {
            return Err(Error::InvalidConfig(format!(
                "grid size {} with bleed factor {} gives an odd margin of {total} samples",
                self.grid_size, self.bleed_factor
            )));
        }
        Ok(total)
    }

    /// Texture edge length in samples: `grid_size * bleed_factor + skirt_padding`.
    pub fn patch_dimension(&self) -> Result<u32> {
        Ok(self.grid_size + self.bleed_margin()? + self.skirt_padding)
    }

    /// Check the configuration for combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(Error::InvalidConfig("grid size must be positive".into()));
        }
        self.bleed_margin()?;
        if self.layer_count == 0 || self.layer_count > MAX_LAYER_COUNT {
            return Err(Error::InvalidConfig(format!(
                "layer count {} outside 1..={MAX_LAYER_COUNT}",
                self.layer_count
            )));
        }
        if self.level_count == 0 || self.level_count > 16 {
            return Err(Error::InvalidConfig(format!(
                "level count {} outside 1..=16",
                self.level_count
            )));
        }
        if self.render_distance > MAX_RENDER_DISTANCE {
            return Err(Error::InvalidConfig(format!(
                "render distance {} exceeds {MAX_RENDER_DISTANCE}",
                self.render_distance
            )));
        }
        // Ring bounds of the coarsest level are computed in i32 grid units,
        // with up to 4x headroom for snapping and the viewer offset.
        let coarsest_extent = (1 + i64::from(self.render_distance)) << (self.level_count - 1);
        if coarsest_extent.saturating_mul(4) > i64::from(i32::MAX) {
            return Err(Error::InvalidConfig(format!(
                "render distance {} too large for {} levels",
                self.render_distance, self.level_count
            )));
        }
        if !(self.patch_world_size.is_finite() && self.patch_world_size > 0.0) {
            return Err(Error::InvalidConfig(
                "patch world size must be positive and finite".into(),
            ));
        }
        if !(-1.0..1.0).contains(&self.facing_threshold) {
            return Err(Error::InvalidConfig(format!(
                "facing threshold {} outside [-1, 1)",
                self.facing_threshold
            )));
        }
        if self.noise.octaves == 0 {
            return Err(Error::InvalidConfig("noise needs at least one octave".into()));
        }
        if self.subdivide_distance < 0.0 || self.apex_setback < 0.0 {
            return Err(Error::InvalidConfig(
                "subdivide distance and apex setback must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
