//! Scripted viewer path.

use glam::{Mat4, Vec3};
use terrane_core::{FrameUniforms, TerrainSettings, ViewerState};
use terrane_world::TerrainContext;

/// Minimum clearance above the ground.
const GROUND_CLEARANCE: f32 = 10.0;
/// Yaw rate of the scripted path (radians per second).
const TURN_RATE: f32 = 0.15;
const CRUISE_ALTITUDE: f32 = 120.0;

/// Flies a slow banking loop over the terrain, never below the ground.
#[derive(Debug, Clone)]
pub struct Flyer {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    speed: f32,
    elapsed: f32,
}

impl Flyer {
    pub fn new(speed: f32) -> Self {
        Self {
            position: Vec3::new(0.0, CRUISE_ALTITUDE, 0.0),
            yaw: 0.0,
            pitch: -0.15,
            speed,
            elapsed: 0.0,
        }
    }

    pub fn heading(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        )
    }

    pub fn viewer(&self) -> ViewerState {
        ViewerState::new(self.position, self.heading())
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advance by `dt` seconds and clamp to the terrain height.
    pub fn advance(&mut self, dt: f32, terrain: &TerrainContext) {
        self.elapsed += dt;
        self.yaw += TURN_RATE * dt;
        let heading = self.heading();
        self.position += Vec3::new(heading.x, 0.0, heading.z) * self.speed * dt;

        // Drift back towards cruise altitude after climbing over hills.
        if self.position.y > CRUISE_ALTITUDE {
            self.position.y -= (self.position.y - CRUISE_ALTITUDE) * dt.min(1.0) * 0.5;
        }
        let ground = terrain.height_at_world(self.position.x, self.position.z);
        self.position.y = self.position.y.max(ground + GROUND_CLEARANCE);
    }

    /// Shader uniforms for the current pose.
    pub fn uniforms(&self, settings: &TerrainSettings, aspect: f32) -> FrameUniforms {
        let view = Mat4::look_to_rh(self.position, self.heading(), Vec3::Y);
        let far = settings.patch_world_size * (1 << settings.level_count) as f32 * 2.0;
        let projection = Mat4::perspective_rh(60f32.to_radians(), aspect, 0.5, far);
        FrameUniforms::new(projection * view, &self.viewer(), self.elapsed)
            .with_grid(settings.patch_world_size, settings.grid_size)
            .with_tunables(1.0, 0.0)
    }
}
