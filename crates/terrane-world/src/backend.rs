//! Graphics backend seam.
//!
//! The terrain core never talks to a graphics API directly. It asks the
//! backend to create per-level resources once, upload a patch into a texture
//! layer on a cache miss, and draw a patch with a given offset and layer.

use terrane_core::{Error, FrameUniforms, GridCoord};
use thiserror::Error;

use crate::mesh::MeshTemplate;

/// Failure reported by a graphics backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The context is gone; nothing further can be drawn.
    #[error("graphics context lost")]
    ContextLost,
    /// A single call failed; the frame can continue with degraded output.
    #[error("graphics API error: {0}")]
    Api(String),
}

impl BackendError {
    /// Whether rendering must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ContextLost)
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ContextLost => Self::ContextLost,
            BackendError::Api(msg) => Self::Graphics(msg),
        }
    }
}

/// One indexed draw of the level's mesh template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchDraw {
    pub level: u32,
    /// Scale factor of the level (`2^level`)
    pub level_factor: i32,
    /// Patch origin in patch units
    pub grid_offset: GridCoord,
    /// Texture array layer holding the patch heights
    pub layer: u32,
    pub index_count: u32,
}

/// Graphics operations the terrain core needs.
///
/// All calls happen on the render thread.
pub trait TerrainBackend {
    /// Create the texture array and upload the mesh template for a level.
    fn init_level(
        &mut self,
        level: u32,
        mesh: &MeshTemplate,
        texture_dimension: u32,
        layer_count: usize,
    ) -> Result<(), BackendError>;

    /// Set per-frame uniforms before any draws.
    fn begin_frame(&mut self, uniforms: &FrameUniforms) -> Result<(), BackendError>;

    /// Overwrite one texture layer with a patch's samples.
    fn upload_layer(&mut self, level: u32, layer: u32, samples: &[f32]) -> Result<(), BackendError>;

    /// Issue one indexed draw.
    fn draw_patch(&mut self, draw: &PatchDraw) -> Result<(), BackendError>;
}

/// Backend that records what it was asked to do without touching a GPU.
///
/// Used by the headless flythrough and by tests.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    pub levels: Vec<(u32, u32, usize)>,
    pub uploads: Vec<(u32, u32)>,
    pub draws: Vec<PatchDraw>,
    pub frames: u64,
    pub uniforms: Option<FrameUniforms>,
    /// Uploads to fail with an API error, counted down per upload.
    pub fail_uploads: usize,
    /// Report context loss on the next call.
    pub lose_context: bool,
}

impl HeadlessBackend {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame records.
    pub fn clear_frame(&mut self) {
        self.uploads.clear();
        self.draws.clear();
    }

    fn check_context(&self) -> Result<(), BackendError> {
        if self.lose_context {
            Err(BackendError::ContextLost)
        } else {
            Ok(())
        }
    }
}

impl TerrainBackend for HeadlessBackend {
    fn init_level(
        &mut self,
        level: u32,
        _mesh: &MeshTemplate,
        texture_dimension: u32,
        layer_count: usize,
    ) -> Result<(), BackendError> {
        self.check_context()?;
        self.levels.push((level, texture_dimension, layer_count));
        Ok(())
    }

    fn begin_frame(&mut self, uniforms: &FrameUniforms) -> Result<(), BackendError> {
        self.check_context()?;
        self.frames += 1;
        self.uniforms = Some(*uniforms);
        Ok(())
    }

    fn upload_layer(&mut self, level: u32, layer: u32, _samples: &[f32]) -> Result<(), BackendError> {
        self.check_context()?;
        if self.fail_uploads > 0 {
            self.fail_uploads -= 1;
            return Err(BackendError::Api(format!("upload of layer {layer} rejected")));
        }
        self.uploads.push((level, layer));
        Ok(())
    }

    fn draw_patch(&mut self, draw: &PatchDraw) -> Result<(), BackendError> {
        self.check_context()?;
        self.draws.push(*draw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_context_loss_is_fatal() {
        assert!(BackendError::ContextLost.is_fatal());
        assert!(!BackendError::Api("oops".into()).is_fatal());
    }

    #[test]
    fn backend_errors_map_to_engine_errors() {
        assert!(matches!(Error::from(BackendError::ContextLost), Error::ContextLost));
        assert!(matches!(
            Error::from(BackendError::Api("bad".into())),
            Error::Graphics(msg) if msg == "bad"
        ));
    }

    #[test]
    fn headless_backend_fails_requested_uploads() {
        let mut backend = HeadlessBackend::new();
        backend.fail_uploads = 1;
        assert!(backend.upload_layer(0, 3, &[]).is_err());
        assert!(backend.upload_layer(0, 3, &[]).is_ok());
        assert_eq!(backend.uploads, vec![(0, 3)]);
    }
}
