//! Fractal elevation noise.

use noise::{NoiseFn, Perlin};
use terrane_core::NoiseSettings;

/// Perlin's permutation table repeats every 256 lattice cells.
const PERLIN_PERIOD: f64 = 256.0;

/// Deterministic elevation function over the ground plane.
///
/// Sums octaves of Perlin noise, each at half the amplitude and twice the
/// frequency of the previous one, then scales and offsets the result into
/// world height units. Equal inputs always produce bit-identical outputs,
/// which the patch cache relies on when it regenerates an evicted patch.
#[derive(Clone)]
pub struct NoiseField {
    perlin: Perlin,
    settings: NoiseSettings,
}

impl NoiseField {
    /// Create a noise field from a world seed and noise parameters.
    pub fn new(seed: u64, settings: NoiseSettings) -> Self {
        Self {
            perlin: Perlin::new(seed as u32),
            settings,
        }
    }

    /// Get the noise parameters.
    pub fn settings(&self) -> &NoiseSettings {
        &self.settings
    }

    /// Elevation at a ground-plane point given in patch units.
    pub fn elevation(&self, x: f64, y: f64) -> f64 {
        let mut scale = 1.0;
        let mut detail = self.settings.base_frequency;
        let mut sum = 0.0;
        for _ in 0..self.settings.octaves {
            sum += self.perlin.get([wrap(x * detail), wrap(y * detail)]) * scale;
            scale /= 2.0;
            detail *= 2.0;
        }
        sum * self.settings.height_scale + self.settings.vertical_offset
    }

    /// Elevation under a world-space position (x/z plane).
    pub fn height_at_world(&self, world_x: f32, world_z: f32, patch_world_size: f32) -> f32 {
        let x = f64::from(world_x) / f64::from(patch_world_size);
        let y = f64::from(world_z) / f64::from(patch_world_size);
        self.elevation(x, y) as f32
    }

    /// Upper bound on |elevation - vertical_offset| implied by the octave sum.
    pub fn amplitude_bound(&self) -> f64 {
        // Perlin output is roughly within [-1, 1]; the octave weights sum below 2.
        let weights: f64 = (0..self.settings.octaves).map(|i| 0.5f64.powi(i as i32)).sum();
        weights * self.settings.height_scale
    }
}

/// Keep lattice indices small so huge inputs never overflow the integer cast.
#[inline]
fn wrap(v: f64) -> f64 {
    if v.is_finite() {
        v.rem_euclid(PERLIN_PERIOD)
    } else {
        0.0
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField")
            .field("settings", &self.settings)
            .field("perlin", &"<Perlin>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(seed: u64) -> NoiseField {
        NoiseField::new(seed, NoiseSettings::default())
    }

    #[test]
    fn elevation_is_deterministic() {
        let a = field(12345);
        let b = field(12345);
        for i in -50..50 {
            let x = f64::from(i) * 0.37;
            let y = f64::from(i) * -1.13;
            assert_eq!(a.elevation(x, y).to_bits(), a.elevation(x, y).to_bits());
            assert_eq!(a.elevation(x, y).to_bits(), b.elevation(x, y).to_bits());
        }
    }

    #[test]
    fn different_seeds_different_terrain() {
        let a = field(12345);
        let b = field(54321);
        let mut differences = 0;
        for i in 0..100 {
            let x = f64::from(i) * 0.31 + 0.05;
            let y = f64::from(i) * 0.17 + 0.05;
            if a.elevation(x, y) != b.elevation(x, y) {
                differences += 1;
            }
        }
        assert!(differences > 50, "Seeds should produce different terrain");
    }

    #[test]
    fn surface_stays_within_octave_bound() {
        let noise = field(7);
        let offset = noise.settings().vertical_offset;
        let bound = noise.amplitude_bound() * 1.1;
        for i in 0..400 {
            let x = f64::from(i % 20) * 0.73;
            let y = f64::from(i / 20) * 0.41;
            let h = noise.elevation(x, y);
            assert!((h - offset).abs() <= bound, "height {h} escapes bound {bound}");
        }
    }

    #[test]
    fn extreme_inputs_stay_finite() {
        let noise = field(3);
        for (x, y) in [(1.0e12, -1.0e12), (-3.5e9, 2.0e-12), (f64::MAX / 4.0, 0.0)] {
            let h = noise.elevation(x, y);
            assert!(h.is_finite(), "elevation({x}, {y}) = {h}");
        }
    }

    #[test]
    fn wrapping_preserves_the_lattice() {
        let noise = field(11);
        let shifted = noise.elevation(0.3 + 1024.0 / 0.25, 0.7);
        let base = noise.elevation(0.3, 0.7);
        assert!((shifted - base).abs() < 1e-6);
    }

    #[test]
    fn world_height_matches_patch_units() {
        let noise = field(9);
        let direct = noise.elevation(1.5, -0.25) as f32;
        let world = noise.height_at_world(384.0, -64.0, 256.0);
        assert_eq!(direct.to_bits(), world.to_bits());
    }
}
