//! Procedural terrain patches, LOD selection and patch caching.
//!
//! This crate is the core of the engine:
//! - [`NoiseField`] and [`HeightPatchGenerator`] turn patch coordinates into height samples
//! - [`PatchCache`] keeps a bounded set of patches resident per level
//! - [`LodSelector`] decides which patches are drawn at which level
//! - [`AsyncPatchBuilder`] moves generation off the render thread
//! - [`TerrainContext`] ties them together behind a [`TerrainBackend`]

pub mod async_builder;
pub mod backend;
pub mod generation;
pub mod lod;
pub mod mesh;
pub mod noise_field;
pub mod patch_cache;
pub mod terrain;

pub use async_builder::{AsyncPatchBuilder, PatchBuildState};
pub use backend::{BackendError, HeadlessBackend, PatchDraw, TerrainBackend};
pub use generation::{HeightPatch, HeightPatchGenerator, PatchLayout, PatchSource};
pub use lod::{LodSelection, LodSelector};
pub use mesh::{MeshTemplate, TerrainVertex};
pub use noise_field::NoiseField;
pub use patch_cache::{CacheStats, PatchCache};
pub use terrain::{FrameStats, TerrainContext, TerrainLevel};
