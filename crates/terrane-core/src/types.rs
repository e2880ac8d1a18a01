//! Viewer state and per-frame shader inputs.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Viewer position and heading, owned by the movement code.
///
/// The terrain engine only reads this.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewerState {
    /// World-space position
    pub position: Vec3,
    /// World-space heading (unit vector)
    pub heading: Vec3,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.2, 0.0),
            heading: Vec3::NEG_Z,
        }
    }
}

impl ViewerState {
    /// Create a new viewer state, normalizing the heading
    pub fn new(position: Vec3, heading: Vec3) -> Self {
        Self {
            position,
            heading: heading.normalize_or_zero(),
        }
    }

    /// Position on the ground plane in patch units.
    #[inline]
    pub fn ground_position(&self, patch_world_size: f32) -> Vec2 {
        Vec2::new(self.position.x, self.position.z) / patch_world_size
    }
}

/// Per-frame shader uniforms handed to the graphics backend.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub mvp: [[f32; 4]; 4],
    pub view_position: [f32; 4],
    /// Elapsed time in seconds
    pub time: f32,
    /// Edge length of a level-0 patch in world units
    pub grid_scale: f32,
    /// Grid cells per patch edge
    pub grid_size: f32,
    /// Free tunable exposed to the shader
    pub value_a: f32,
    /// Free tunable exposed to the shader
    pub value_b: f32,
    pub _pad: [f32; 3],
}

impl FrameUniforms {
    /// Build uniforms from a view-projection matrix and the viewer.
    pub fn new(view_projection: Mat4, viewer: &ViewerState, time: f32) -> Self {
        Self {
            mvp: view_projection.to_cols_array_2d(),
            view_position: viewer.position.extend(1.0).to_array(),
            time,
            grid_scale: 0.0,
            grid_size: 0.0,
            value_a: 0.0,
            value_b: 0.0,
            _pad: [0.0; 3],
        }
    }

    /// Set the grid scale and size
    pub fn with_grid(mut self, grid_scale: f32, grid_size: u32) -> Self {
        self.grid_scale = grid_scale;
        self.grid_size = grid_size as f32;
        self
    }

    /// Set the two free tunables
    pub fn with_tunables(mut self, value_a: f32, value_b: f32) -> Self {
        self.value_a = value_a;
        self.value_b = value_b;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ground_position_uses_xz_plane() {
        let viewer = ViewerState::new(Vec3::new(512.0, 80.0, -256.0), Vec3::Z);
        let ground = viewer.ground_position(256.0);
        assert_relative_eq!(ground.x, 2.0);
        assert_relative_eq!(ground.y, -1.0);
    }

    #[test]
    fn viewer_heading_is_normalized() {
        let viewer = ViewerState::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0));
        assert_relative_eq!(viewer.heading.length(), 1.0);
    }

    #[test]
    fn uniforms_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
        let uniforms = FrameUniforms::new(Mat4::IDENTITY, &ViewerState::default(), 1.5)
            .with_grid(256.0, 64)
            .with_tunables(0.1, 0.2);
        assert_relative_eq!(uniforms.grid_size, 64.0);
        assert_relative_eq!(uniforms.value_b, 0.2);
    }
}
