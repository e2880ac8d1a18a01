//! Core types, math, and configuration for the Terrane terrain engine.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Grid coordinates and patch keys (patch-unit coordinate system)
//! - 2D math used by LOD selection (rects, view cones)
//! - Viewer state and per-frame shader uniforms
//! - Terrain settings and the engine-wide error type

pub mod config;
pub mod coords;
pub mod error;
pub mod math;
pub mod types;

pub use config::{CullMode, LodStrategy, NoiseSettings, TerrainSettings};
pub use coords::{GridCoord, PatchKey};
pub use error::{Error, Result};
pub use types::{FrameUniforms, ViewerState};

/// Engine-wide constants
pub mod constants {
    /// Default number of grid cells along one patch edge
    pub const DEFAULT_GRID_SIZE: u32 = 64;
    /// Minimum layer count every 2D-array texture implementation supports
    pub const MAX_LAYER_COUNT: usize = 256;
    /// Default edge length of a level-0 patch in world units
    pub const DEFAULT_PATCH_WORLD_SIZE: f32 = 256.0;
    /// Default number of resolution levels in the chain
    pub const DEFAULT_LEVEL_COUNT: u32 = 5;
    /// Largest ring radius (in patches) a level may request
    pub const MAX_RENDER_DISTANCE: u32 = 64;
    /// Height given to skirt vertices so the shader can drop them below ground
    pub const SKIRT_SENTINEL_HEIGHT: f32 = -1.0;
}
