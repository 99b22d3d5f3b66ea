use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::decode::PreparedImage;
use crate::effects::catalog::EffectParams;
use crate::effects::cpu::render_effect;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::frame::FrameRGBA;

/// Handle to an uploaded source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// A bank of effect programs plus the textures they sample.
///
/// Program and geometry state are created once with the backend; switching scenes only
/// swaps which texture is bound.
pub trait EffectBackend: Send {
    fn kind(&self) -> BackendKind;

    fn upload(&mut self, image: &PreparedImage) -> ReelResult<TextureId>;

    fn release(&mut self, texture: TextureId);

    /// Render one frame of `params.effect` sampling `texture`.
    fn render(&mut self, texture: TextureId, params: &EffectParams) -> ReelResult<FrameRGBA>;
}

/// Available backend kinds.
///
/// - `Cpu` is always available.
/// - `Gpu` requires the `gpu` cargo feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Gpu,
}

impl BackendKind {
    pub fn parse(s: &str) -> ReelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(ReelError::validation(format!(
                "unknown effect backend '{other}'"
            ))),
        }
    }
}

pub fn create_backend(kind: BackendKind) -> ReelResult<Box<dyn EffectBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(CpuEffectBackend::new())),
        BackendKind::Gpu => {
            #[cfg(feature = "gpu")]
            {
                Ok(Box::new(crate::effects::gpu::GpuEffectBackend::new()?))
            }
            #[cfg(not(feature = "gpu"))]
            {
                Err(ReelError::gpu(
                    "gpu effect backend requires the 'gpu' feature",
                ))
            }
        }
    }
}

/// Reference backend shading on the CPU with rayon.
#[derive(Debug, Default)]
pub struct CpuEffectBackend {
    textures: HashMap<TextureId, Arc<PreparedImage>>,
    next_id: u64,
}

impl CpuEffectBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl EffectBackend for CpuEffectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn upload(&mut self, image: &PreparedImage) -> ReelResult<TextureId> {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, Arc::new(image.clone()));
        Ok(id)
    }

    fn release(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn render(&mut self, texture: TextureId, params: &EffectParams) -> ReelResult<FrameRGBA> {
        let img = self
            .textures
            .get(&texture)
            .ok_or_else(|| ReelError::render(format!("unknown texture {texture:?}")))?;
        Ok(render_effect(img, params))
    }
}
