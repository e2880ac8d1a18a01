//! Level-of-detail selection.
//!
//! Every frame the selector decides which patches to draw at which level.
//! Levels are walked as an explicit list; nothing links one level to another
//! except the pending subdivision list of the quadtree strategy, which is
//! handed from each coarse level to the next finer one.

use glam::{Vec2, Vec3};
use terrane_core::coords::{floor_mult, level_factor};
use terrane_core::math::{Rect, ViewCone};
use terrane_core::{CullMode, GridCoord, LodStrategy, TerrainSettings, ViewerState};
use tracing::trace_span;

/// Patches chosen for one frame, indexed by level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LodSelection {
    levels: Vec<Vec<GridCoord>>,
}

impl LodSelection {
    /// Patch origins selected at `level`.
    pub fn level(&self, level: u32) -> &[GridCoord] {
        self.levels
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of levels in the selection.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Total number of selected patches.
    pub fn total(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// `(level, origins)` pairs, finest first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[GridCoord])> {
        self.levels
            .iter()
            .enumerate()
            .map(|(level, coords)| (level as u32, coords.as_slice()))
    }
}

/// Chooses visible patches per level from the viewer state.
#[derive(Clone, Debug)]
pub struct LodSelector {
    level_count: u32,
    render_distance: u32,
    strategy: LodStrategy,
    cull_mode: CullMode,
    facing_threshold: f32,
    apex_setback: f32,
    subdivide_distance: f32,
}

impl LodSelector {
    /// Build a selector from the terrain settings.
    pub fn from_settings(settings: &TerrainSettings) -> Self {
        Self {
            level_count: settings.level_count,
            render_distance: settings.render_distance,
            strategy: settings.lod_strategy,
            cull_mode: settings.cull_mode,
            facing_threshold: settings.facing_threshold,
            apex_setback: settings.apex_setback,
            subdivide_distance: settings.subdivide_distance,
        }
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn strategy(&self) -> LodStrategy {
        self.strategy
    }

    /// Select patches for a viewer given in world units.
    pub fn select(&self, viewer: &ViewerState, patch_world_size: f32) -> LodSelection {
        self.select_at(viewer.ground_position(patch_world_size), viewer.heading)
    }

    /// Select patches for a viewer at `position` (patch units, x/z plane).
    pub fn select_at(&self, position: Vec2, heading: Vec3) -> LodSelection {
        let levels = match self.strategy {
            LodStrategy::NestedRings => self.select_rings(position, heading),
            LodStrategy::Quadtree => self.select_quadtree(position, heading),
        };
        LodSelection { levels }
    }

    /// Ring candidates of `level` before culling.
    ///
    /// The lattice spans `(1 + render_distance)` patches of the level around
    /// `position`, aligned to twice the level factor so it nests inside the
    /// next coarser ring. When `punch_hole` is set the inner box deferred to
    /// the finer level is left out.
    pub fn ring_candidates(&self, level: u32, position: Vec2, punch_hole: bool) -> Vec<GridCoord> {
        let f = level_factor(level);
        let max_extent = (1 + self.render_distance as i32) * f;
        let min_extent = max_extent / 2;
        let (max_extent, min_extent) = (max_extent as f32, min_extent as f32);

        let lo_x = floor_mult(position.x - max_extent, 2 * f);
        let hi_x = floor_mult(position.x + max_extent, 2 * f) + f;
        let lo_y = floor_mult(position.y - max_extent, 2 * f);
        let hi_y = floor_mult(position.y + max_extent, 2 * f) + f;

        let hole_x = floor_mult(position.x - min_extent, f)..=floor_mult(position.x + min_extent, f);
        let hole_y = floor_mult(position.y - min_extent, f)..=floor_mult(position.y + min_extent, f);

        let mut out = Vec::new();
        for y in (lo_y..=hi_y).step_by(f as usize) {
            for x in (lo_x..=hi_x).step_by(f as usize) {
                if punch_hole && hole_x.contains(&x) && hole_y.contains(&y) {
                    continue;
                }
                out.push(GridCoord::new(x, y));
            }
        }
        out
    }

    /// Facing cone used for `level`; the apex setback grows with the level.
    pub fn view_cone(&self, level: u32, position: Vec2, heading: Vec3) -> ViewCone {
        let setback = self.apex_setback * level_factor(level) as f32;
        ViewCone::from_viewer(position, heading, self.facing_threshold, setback)
    }

    /// Check if the patch at `coord` passes the facing cull.
    pub fn admits(&self, cone: &ViewCone, level: u32, coord: GridCoord) -> bool {
        let rect = Rect::square(coord.to_vec2(), level_factor(level) as f32);
        match self.cull_mode {
            CullMode::Corners => cone.admits_any_corner(&rect),
            CullMode::Center => cone.admits_point(rect.center()),
        }
    }

    fn select_rings(&self, position: Vec2, heading: Vec3) -> Vec<Vec<GridCoord>> {
        (0..self.level_count)
            .map(|level| {
                let _span = trace_span!("select_level", level).entered();
                let cone = self.view_cone(level, position, heading);
                let candidates = self.ring_candidates(level, position, level > 0);
                finish_level(
                    level,
                    candidates
                        .into_iter()
                        .filter(|&c| self.admits(&cone, level, c)),
                )
            })
            .collect()
    }

    fn select_quadtree(&self, position: Vec2, heading: Vec3) -> Vec<Vec<GridCoord>> {
        let mut levels = vec![Vec::new(); self.level_count as usize];
        let coarsest = self.level_count - 1;
        let mut pending = self.ring_candidates(coarsest, position, false);

        for level in (0..=coarsest).rev() {
            let _span = trace_span!("select_level", level).entered();
            let cone = self.view_cone(level, position, heading);
            let size = level_factor(level) as f32;
            let split_below = self.subdivide_distance * size;

            let mut drawn = Vec::with_capacity(pending.len());
            let mut finer = Vec::new();
            for coord in pending.drain(..) {
                if !self.admits(&cone, level, coord) {
                    continue;
                }
                let center = Rect::square(coord.to_vec2(), size).center();
                if level > 0 && center.distance(position) < split_below {
                    finer.extend_from_slice(&coord.children(level));
                } else {
                    drawn.push(coord);
                }
            }
            levels[level as usize] = finish_level(level, drawn.into_iter());
            pending = finer;
        }
        levels
    }
}

/// Snap to the level's origin lattice and drop duplicates.
fn finish_level(level: u32, coords: impl Iterator<Item = GridCoord>) -> Vec<GridCoord> {
    let mut out: Vec<_> = coords.map(|c| c.snapped(level)).collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn selector(strategy: LodStrategy) -> LodSelector {
        LodSelector::from_settings(
            &TerrainSettings::default()
                .with_render_distance(3)
                .with_lod_strategy(strategy),
        )
    }

    fn patch_rect(level: u32, coord: GridCoord) -> Rect {
        Rect::square(coord.to_vec2(), level_factor(level) as f32)
    }

    fn assert_no_overlap(selection: &LodSelection) {
        let rects: Vec<_> = selection
            .iter()
            .flat_map(|(level, coords)| coords.iter().map(move |&c| (level, patch_rect(level, c))))
            .collect();
        for (i, (la, a)) in rects.iter().enumerate() {
            for (lb, b) in &rects[i + 1..] {
                assert!(!a.overlaps(b), "level {la} {a:?} overlaps level {lb} {b:?}");
            }
        }
    }

    const STRAIGHT_DOWN: Vec3 = Vec3::NEG_Y;

    #[test]
    fn facing_cull_at_origin_heading_forward() {
        let sel = selector(LodStrategy::NestedRings);
        let position = Vec2::ZERO;
        let heading = Vec3::Z;
        let selection = sel.select_at(position, heading);

        let mut excluded = 0;
        for level in 0..sel.level_count() {
            let cone = sel.view_cone(level, position, heading);
            let chosen = selection.level(level);
            assert!(!chosen.is_empty());
            for &c in chosen {
                let rect = patch_rect(level, c);
                assert!(rect.corners().iter().any(|&p| cone.facing(p) > 0.5), "{c:?} kept");
            }
            for c in sel.ring_candidates(level, position, level > 0) {
                if chosen.contains(&c) {
                    continue;
                }
                excluded += 1;
                let rect = patch_rect(level, c);
                assert!(rect.corners().iter().all(|&p| cone.facing(p) <= 0.5), "{c:?} dropped");
            }
        }
        assert!(excluded > 0);
    }

    #[test]
    fn patches_behind_the_viewer_are_dropped() {
        let sel = selector(LodStrategy::NestedRings);
        let selection = sel.select_at(Vec2::new(0.5, 0.5), Vec3::Z);
        for (level, coords) in selection.iter() {
            let f = level_factor(level);
            // Far edge of every kept patch lies ahead of the viewer.
            assert!(coords.iter().all(|c| (c.y + f) as f32 > 0.5));
        }
    }

    #[test]
    fn center_mode_is_stricter_than_corners() {
        let corners = selector(LodStrategy::NestedRings);
        let mut center = corners.clone();
        center.cull_mode = CullMode::Center;

        let position = Vec2::new(3.3, -1.7);
        let heading = Vec3::new(1.0, 0.0, 1.0).normalize();
        let loose = corners.select_at(position, heading);
        let strict = center.select_at(position, heading);
        for level in 0..corners.level_count() {
            for c in strict.level(level) {
                assert!(loose.level(level).contains(c));
            }
        }
        assert!(strict.total() < loose.total());
    }

    #[test]
    fn rings_cover_without_overlap() {
        let sel = selector(LodStrategy::NestedRings);
        for position in [
            Vec2::ZERO,
            Vec2::new(0.5, 0.5),
            Vec2::new(-3.75, 12.2),
            Vec2::new(101.9, -77.1),
        ] {
            let selection = sel.select_at(position, STRAIGHT_DOWN);
            assert_eq!(selection.level_count(), 5);
            assert_no_overlap(&selection);

            let under = GridCoord::new(position.x.floor() as i32, position.y.floor() as i32);
            assert!(selection.level(0).contains(&under));
        }
    }

    #[test]
    fn coarser_hole_matches_finer_ring() {
        let sel = selector(LodStrategy::NestedRings);
        let position = Vec2::new(7.2, -2.6);
        let selection = sel.select_at(position, STRAIGHT_DOWN);

        // Without culling, the union of all levels is the coarsest full ring.
        let coarsest = sel.level_count() - 1;
        let full: f32 = sel
            .ring_candidates(coarsest, position, false)
            .iter()
            .map(|_| (level_factor(coarsest) as f32).powi(2))
            .sum();
        let covered: f32 = selection
            .iter()
            .map(|(level, coords)| coords.len() as f32 * (level_factor(level) as f32).powi(2))
            .sum();
        assert_relative_eq!(covered, full);
    }

    #[test]
    fn single_level_draws_full_ring() {
        let sel = LodSelector::from_settings(
            &TerrainSettings::default()
                .with_level_count(1)
                .with_render_distance(2),
        );
        let selection = sel.select_at(Vec2::new(0.5, 0.5), STRAIGHT_DOWN);
        // -4..=3 on both axes.
        assert_eq!(selection.level(0).len(), 8 * 8);
    }

    #[test]
    fn selected_origins_are_aligned() {
        for strategy in [LodStrategy::NestedRings, LodStrategy::Quadtree] {
            let selection = selector(strategy).select_at(Vec2::new(-13.4, 5.9), Vec3::X);
            for (level, coords) in selection.iter() {
                assert!(coords.iter().all(|c| c.is_aligned(level)));
                assert!(coords.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn quadtree_refines_near_viewer() {
        let sel = selector(LodStrategy::Quadtree);
        let position = Vec2::new(9.5, -20.25);
        let selection = sel.select_at(position, STRAIGHT_DOWN);
        assert_no_overlap(&selection);

        let under = GridCoord::new(9, -21);
        assert!(selection.level(0).contains(&under));

        for (level, coords) in selection.iter() {
            let size = level_factor(level) as f32;
            for &c in coords {
                let center = patch_rect(level, c).center();
                if level > 0 {
                    assert!(center.distance(position) >= sel.subdivide_distance * size);
                }
            }
        }
    }

    #[test]
    fn quadtree_covers_the_coarse_ring() {
        let sel = selector(LodStrategy::Quadtree);
        let position = Vec2::new(1.0, 1.0);
        let selection = sel.select_at(position, STRAIGHT_DOWN);

        let coarsest = sel.level_count() - 1;
        let ring = sel.ring_candidates(coarsest, position, false);
        let full = ring.len() as f32 * (level_factor(coarsest) as f32).powi(2);
        let covered: f32 = selection
            .iter()
            .map(|(level, coords)| coords.len() as f32 * (level_factor(level) as f32).powi(2))
            .sum();
        assert_relative_eq!(covered, full);
    }

    #[test]
    fn selection_from_world_viewer() {
        let sel = selector(LodStrategy::NestedRings);
        let viewer = ViewerState::new(Vec3::new(256.0 * 4.5, 80.0, -256.0 * 2.5), Vec3::NEG_Y);
        let selection = sel.select(&viewer, 256.0);
        assert!(selection.level(0).contains(&GridCoord::new(4, -3)));
    }
}
