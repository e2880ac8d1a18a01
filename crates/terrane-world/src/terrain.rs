//! Per-frame terrain driver.
//!
//! [`TerrainContext`] owns everything the engine needs between frames: the
//! generator, the selector, one cache and mesh template per level, and the
//! optional background builder. It is created once at startup and passed to
//! the render loop explicitly.

use std::time::Instant;

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use terrane_core::coords::level_factor;
use terrane_core::{Error, FrameUniforms, PatchKey, Result, TerrainSettings, ViewerState};
use tracing::{debug, info, trace_span, warn};

use crate::async_builder::AsyncPatchBuilder;
use crate::backend::{BackendError, PatchDraw, TerrainBackend};
use crate::generation::HeightPatchGenerator;
use crate::lod::{LodSelection, LodSelector};
use crate::mesh::MeshTemplate;
use crate::patch_cache::{CacheStats, PatchCache};

/// One resolution level: its slot cache and its mesh template.
#[derive(Debug)]
pub struct TerrainLevel {
    pub level: u32,
    pub cache: PatchCache<StdRng>,
    pub mesh: MeshTemplate,
}

/// Diagnostics for one rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub triangles: u64,
    pub patches_drawn: usize,
    /// Patches skipped because their async build has not finished.
    pub patches_pending: usize,
    /// Draws the backend rejected without losing the context.
    pub draw_failures: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    /// Worker completions observed this frame.
    pub builds_completed: usize,
    /// Stale async requests dropped this frame.
    pub builds_cancelled: usize,
}

/// Terrain engine state shared across frames.
pub struct TerrainContext {
    settings: TerrainSettings,
    generator: HeightPatchGenerator,
    selector: LodSelector,
    levels: Vec<TerrainLevel>,
    builder: Option<AsyncPatchBuilder>,
    frames: u64,
}

impl TerrainContext {
    /// Validate the settings and create per-level resources on the backend.
    ///
    /// Configuration errors surface here, before any frame is rendered.
    pub fn new<B: TerrainBackend + ?Sized>(settings: TerrainSettings, backend: &mut B) -> Result<Self> {
        settings.validate()?;
        let generator = HeightPatchGenerator::new(&settings)?;
        let selector = LodSelector::from_settings(&settings);
        let layout = generator.layout();

        let mut eviction_rng = match settings.eviction_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut levels = Vec::with_capacity(settings.level_count as usize);
        for level in 0..settings.level_count {
            let mesh = MeshTemplate::new(settings.grid_size, settings.skirt_height);
            backend.init_level(level, &mesh, layout.dimension, settings.layer_count)?;
            let cache = PatchCache::new(
                level,
                settings.layer_count,
                layout.sample_count(),
                StdRng::seed_from_u64(eviction_rng.next_u64()),
            );
            levels.push(TerrainLevel { level, cache, mesh });
        }

        let builder = if settings.async_generation {
            Some(AsyncPatchBuilder::spawn(generator.clone())?)
        } else {
            None
        };

        info!(
            levels = settings.level_count,
            layers = settings.layer_count,
            dimension = layout.dimension,
            strategy = ?settings.lod_strategy,
            async_generation = settings.async_generation,
            "terrain initialized"
        );

        Ok(Self {
            settings,
            generator,
            selector,
            levels,
            builder,
            frames: 0,
        })
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn generator(&self) -> &HeightPatchGenerator {
        &self.generator
    }

    pub fn selector(&self) -> &LodSelector {
        &self.selector
    }

    pub fn levels(&self) -> &[TerrainLevel] {
        &self.levels
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Whether patches are built on a background worker.
    pub fn is_async(&self) -> bool {
        self.builder.is_some()
    }

    /// Terrain height under a world-space position.
    pub fn height_at_world(&self, world_x: f32, world_z: f32) -> f32 {
        self.generator
            .height_at_world(world_x, world_z, self.settings.patch_world_size)
    }

    /// Patches the selector would draw for `viewer`.
    pub fn select(&self, viewer: &ViewerState) -> LodSelection {
        self.selector.select(viewer, self.settings.patch_world_size)
    }

    /// Counters summed over all levels.
    pub fn cache_stats(&self) -> CacheStats {
        self.levels.iter().fold(CacheStats::default(), |acc, l| {
            let s = l.cache.stats();
            CacheStats {
                hits: acc.hits + s.hits,
                misses: acc.misses + s.misses,
                evictions: acc.evictions + s.evictions,
                upload_failures: acc.upload_failures + s.upload_failures,
            }
        })
    }

    /// Generate every patch visible from `viewer` in parallel and upload it.
    ///
    /// Avoids a burst of synchronous misses on the first frame. At most one
    /// cache's worth of patches is generated per level. Returns the number of
    /// patches installed.
    pub fn prewarm<B: TerrainBackend + ?Sized>(&mut self, viewer: &ViewerState, backend: &mut B) -> Result<usize> {
        let started = Instant::now();
        let selection = self.select(viewer);

        let mut keys = Vec::new();
        for terrain_level in &self.levels {
            keys.extend(
                selection
                    .level(terrain_level.level)
                    .iter()
                    .filter(|&&c| !terrain_level.cache.contains(c))
                    .take(terrain_level.cache.capacity())
                    .map(|&c| PatchKey::new(terrain_level.level, c)),
            );
        }

        let patches = self.generator.generate_many(&keys);
        for patch in &patches {
            let terrain_level = &mut self.levels[patch.key.level as usize];
            terrain_level
                .cache
                .install(patch.key.coord, &patch.samples, backend)?;
        }

        info!(
            patches = patches.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "prewarmed terrain"
        );
        Ok(patches.len())
    }

    /// Select, resolve and draw every visible patch for one frame.
    ///
    /// Fails on configuration-independent fatal conditions only: context loss
    /// or a dead generation worker. Other backend errors are logged and the
    /// frame continues with the affected patch missing.
    pub fn render_frame<B: TerrainBackend + ?Sized>(
        &mut self,
        viewer: &ViewerState,
        uniforms: &FrameUniforms,
        backend: &mut B,
    ) -> Result<FrameStats> {
        let _span = trace_span!("render_frame", frame = self.frames).entered();
        let before = self.cache_stats();
        let mut stats = FrameStats::default();

        tolerate(backend.begin_frame(uniforms), "begin frame")?;
        let selection = self.selector.select(viewer, self.settings.patch_world_size);

        if let Some(builder) = &self.builder {
            builder.ensure_alive()?;
            stats.builds_completed = builder.poll_ready().len();
            let wanted: HashSet<PatchKey> = selection
                .iter()
                .flat_map(|(level, coords)| coords.iter().map(move |&c| PatchKey::new(level, c)))
                .collect();
            stats.builds_cancelled = builder.cancel_where(|key| !wanted.contains(key));
        }

        for terrain_level in &mut self.levels {
            let level = terrain_level.level;
            let index_count = terrain_level.mesh.index_count();
            for &coord in selection.level(level) {
                let slot = match &self.builder {
                    Some(builder) => match terrain_level.cache.resolve_async(coord, builder, backend)? {
                        Some(slot) => slot,
                        None => {
                            stats.patches_pending += 1;
                            continue;
                        }
                    },
                    None => terrain_level.cache.resolve(coord, &self.generator, backend)?,
                };

                let draw = PatchDraw {
                    level,
                    level_factor: level_factor(level),
                    grid_offset: coord,
                    layer: slot,
                    index_count,
                };
                if tolerate(backend.draw_patch(&draw), "draw patch")? {
                    stats.patches_drawn += 1;
                    stats.triangles += u64::from(terrain_level.mesh.triangle_count());
                } else {
                    stats.draw_failures += 1;
                }
            }
        }

        let after = self.cache_stats();
        stats.cache_hits = after.hits - before.hits;
        stats.cache_misses = after.misses - before.misses;
        stats.evictions = after.evictions - before.evictions;
        self.frames += 1;
        Ok(stats)
    }

    /// Verify every level's slot mapping.
    pub fn check_consistency(&self) -> Result<()> {
        self.levels.iter().try_for_each(|l| l.cache.check_consistency())
    }

    /// Stop the background worker, discarding in-flight builds.
    pub fn shutdown(&mut self) {
        if let Some(mut builder) = self.builder.take() {
            builder.shutdown();
        }
        debug!(frames = self.frames, "terrain shut down");
    }
}

impl Drop for TerrainContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Log a non-fatal backend error and report whether the call succeeded.
fn tolerate(result: std::result::Result<(), BackendError>, what: &str) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_fatal() => Err(Error::from(err)),
        Err(err) => {
            warn!("{what} failed: {err}");
            Ok(false)
        }
    }
}
