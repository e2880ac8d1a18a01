//! Fixed-capacity cache of patch height data, one per level.
//!
//! Each slot corresponds to one layer of the level's texture array and owns
//! the CPU copy of the patch currently in that layer. The cache keeps a
//! coordinate → slot map and a slot → coordinate back-reference that are
//! always inverses of each other.
//!
//! Victims are picked uniformly at random once every slot has been used.
//! Most visible patches stay resident across frames, so true recency
//! tracking would buy little over a constant-time random pick.

use hashbrown::HashMap;
use rand::RngCore;
use terrane_core::coords::level_factor;
use terrane_core::{Error, GridCoord, PatchKey, Result};
use tracing::{debug, warn};

use crate::async_builder::{AsyncPatchBuilder, PatchBuildState};
use crate::backend::TerrainBackend;
use crate::generation::HeightPatchGenerator;

/// Hit/miss counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub upload_failures: u64,
}

#[derive(Debug, Default)]
struct CacheSlot {
    coord: Option<GridCoord>,
    /// Allocated on first use, then overwritten in place.
    samples: Vec<f32>,
}

/// Bounded store mapping grid coordinates of one level to texture layers.
pub struct PatchCache<R> {
    level: u32,
    sample_count: usize,
    coord_to_slot: HashMap<GridCoord, u32>,
    slots: Vec<CacheSlot>,
    /// Slots below this index have held a patch at least once.
    next_unused: usize,
    rng: R,
    stats: CacheStats,
}

impl<R: RngCore> PatchCache<R> {
    /// Create an empty cache for `level` with `layer_count` slots.
    ///
    /// `rng` drives victim selection; pass a seeded generator for
    /// reproducible eviction.
    pub fn new(level: u32, layer_count: usize, sample_count: usize, rng: R) -> Self {
        assert!(layer_count > 0, "patch cache needs at least one slot");
        Self {
            level,
            sample_count,
            coord_to_slot: HashMap::with_capacity(layer_count),
            slots: (0..layer_count).map(|_| CacheSlot::default()).collect(),
            next_unused: 0,
            rng,
            stats: CacheStats::default(),
        }
    }

    /// Level this cache serves.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live coordinate mappings.
    pub fn len(&self) -> usize {
        self.coord_to_slot.len()
    }

    /// Check if no patch is resident.
    pub fn is_empty(&self) -> bool {
        self.coord_to_slot.is_empty()
    }

    /// Get the counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Slot holding `coord`, without touching anything.
    pub fn lookup(&self, coord: GridCoord) -> Option<u32> {
        self.coord_to_slot.get(&coord).copied()
    }

    /// Check if `coord` is resident.
    pub fn contains(&self, coord: GridCoord) -> bool {
        self.coord_to_slot.contains_key(&coord)
    }

    /// Coordinate held by `slot`.
    pub fn slot_coord(&self, slot: u32) -> Option<GridCoord> {
        self.slots.get(slot as usize).and_then(|s| s.coord)
    }

    /// Samples held by `slot`, if it holds a patch.
    pub fn samples(&self, slot: u32) -> Option<&[f32]> {
        self.slots
            .get(slot as usize)
            .filter(|s| s.coord.is_some())
            .map(|s| s.samples.as_slice())
    }

    /// All live (coordinate, slot) pairs.
    pub fn entries(&self) -> impl Iterator<Item = (GridCoord, u32)> + '_ {
        self.coord_to_slot.iter().map(|(&c, &s)| (c, s))
    }

    /// Make `coord` resident, generating it synchronously on a miss.
    ///
    /// On return the slot's texture layer holds the patch, unless the
    /// backend rejected the upload (logged, visuals degrade for that patch).
    pub fn resolve<B: TerrainBackend + ?Sized>(
        &mut self,
        coord: GridCoord,
        generator: &HeightPatchGenerator,
        backend: &mut B,
    ) -> Result<u32> {
        debug_assert!(coord.is_aligned(self.level), "unaligned patch origin {coord:?}");
        if let Some(slot) = self.lookup(coord) {
            self.stats.hits += 1;
            return Ok(slot);
        }
        self.stats.misses += 1;

        let factor = level_factor(self.level);
        let slot = self.claim_slot();
        generator.fill(factor, coord, self.slot_buffer(slot));
        self.commit(slot, coord, backend)
    }

    /// Non-blocking variant of [`resolve`](Self::resolve) backed by a worker.
    ///
    /// Returns `Ok(None)` while the patch is still being built; the caller
    /// skips it for this frame.
    pub fn resolve_async<B: TerrainBackend + ?Sized>(
        &mut self,
        coord: GridCoord,
        builder: &AsyncPatchBuilder,
        backend: &mut B,
    ) -> Result<Option<u32>> {
        debug_assert!(coord.is_aligned(self.level), "unaligned patch origin {coord:?}");
        if let Some(slot) = self.lookup(coord) {
            self.stats.hits += 1;
            return Ok(Some(slot));
        }

        let key = PatchKey::new(self.level, coord);
        match builder.state(key) {
            Some(PatchBuildState::Ready) => {
                let patch = builder.take_ready(key).ok_or_else(|| {
                    Error::InvariantViolation(format!("{key:?} reported ready but has no data"))
                })?;
                self.stats.misses += 1;
                self.install(coord, &patch.samples, backend).map(Some)
            }
            Some(PatchBuildState::Queued | PatchBuildState::Generating) => Ok(None),
            None => {
                let state = builder.request(key);
                if state != PatchBuildState::Queued {
                    return Err(Error::InvariantViolation(format!(
                        "{key:?} was unknown but is already {state:?}"
                    )));
                }
                Ok(None)
            }
        }
    }

    /// Place already generated samples for `coord` into a slot.
    ///
    /// A resident coordinate is left as is.
    pub fn install<B: TerrainBackend + ?Sized>(
        &mut self,
        coord: GridCoord,
        samples: &[f32],
        backend: &mut B,
    ) -> Result<u32> {
        if samples.len() != self.sample_count {
            return Err(Error::InvariantViolation(format!(
                "patch has {} samples, cache expects {}",
                samples.len(),
                self.sample_count
            )));
        }
        if let Some(slot) = self.lookup(coord) {
            return Ok(slot);
        }
        let slot = self.claim_slot();
        self.slot_buffer(slot).copy_from_slice(samples);
        self.commit(slot, coord, backend)
    }

    /// Verify the coordinate ↔ slot bijection.
    pub fn check_consistency(&self) -> Result<()> {
        if self.coord_to_slot.len() > self.slots.len() {
            return Err(Error::InvariantViolation(format!(
                "level {} holds {} patches in {} slots",
                self.level,
                self.coord_to_slot.len(),
                self.slots.len()
            )));
        }
        for (&coord, &slot) in &self.coord_to_slot {
            if self.slot_coord(slot) != Some(coord) {
                return Err(Error::InvariantViolation(format!(
                    "level {}: {coord:?} maps to slot {slot} which holds {:?}",
                    self.level,
                    self.slot_coord(slot)
                )));
            }
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(coord) = slot.coord {
                if self.lookup(coord) != Some(index as u32) {
                    return Err(Error::InvariantViolation(format!(
                        "level {}: slot {index} holds {coord:?} but the map disagrees",
                        self.level
                    )));
                }
            }
        }
        Ok(())
    }

    /// Pick a slot for a new patch and unmap whatever it held.
    fn claim_slot(&mut self) -> u32 {
        let slot = self.choose_victim();
        if let Some(old) = self.slots[slot].coord.take() {
            self.coord_to_slot.remove(&old);
            self.stats.evictions += 1;
            debug!(level = self.level, slot, ?old, "evicted patch");
        }
        slot as u32
    }

    /// Never-used slots first, then a uniform random pick.
    fn choose_victim(&mut self) -> usize {
        if self.next_unused < self.slots.len() {
            let slot = self.next_unused;
            self.next_unused += 1;
            return slot;
        }
        // The low-order bits of cheap generators are the least random.
        (self.rng.next_u32() >> 8) as usize % self.slots.len()
    }

    fn slot_buffer(&mut self, slot: u32) -> &mut [f32] {
        let buffer = &mut self.slots[slot as usize].samples;
        if buffer.len() != self.sample_count {
            buffer.resize(self.sample_count, 0.0);
        }
        buffer
    }

    /// Upload a filled slot and record its mapping.
    fn commit<B: TerrainBackend + ?Sized>(
        &mut self,
        slot: u32,
        coord: GridCoord,
        backend: &mut B,
    ) -> Result<u32> {
        if let Err(err) = backend.upload_layer(self.level, slot, &self.slots[slot as usize].samples) {
            if err.is_fatal() {
                return Err(err.into());
            }
            self.stats.upload_failures += 1;
            warn!(level = self.level, slot, ?coord, "patch upload failed: {err}");
        }
        self.slots[slot as usize].coord = Some(coord);
        self.coord_to_slot.insert(coord, slot);
        Ok(slot)
    }
}

impl<R> std::fmt::Debug for PatchCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchCache")
            .field("level", &self.level)
            .field("capacity", &self.slots.len())
            .field("resident", &self.coord_to_slot.len())
            .field("stats", &self.stats)
            .finish()
    }
}
