//! Scenereel turns an ordered list of narrated scenes into a live, effect-processed preview
//! and a single exported audio/video file.
//!
//! The crate is layered bottom-up:
//!
//! - [`AssetCache`] normalizes, classifies and deduplicates remote media references
//! - the effect bank ([`EffectBackend`]) applies one time-animated effect per frame
//! - [`LivePlayer`] presents scenes interactively, mounted on a tick loop with [`PreviewHandle`]
//! - [`ExportRenderer`] composites the whole scene list once into a [`MediaBlob`]
//! - [`ProductionPipeline`] fills scene assets from a [`GenerativeProvider`] on a bounded pool
#![forbid(unsafe_code)]

pub mod assets;
pub mod audio;
pub mod effects;
pub mod encode;
pub mod export;
pub mod foundation;
pub mod live;
pub mod production;
pub mod render;
pub mod scene;

pub use crate::foundation::clock::{SystemClock, TickSource, VirtualClock};
pub use crate::foundation::config::ReelConfig;
pub use crate::foundation::core::{AspectRatio, Canvas, Fps, FrameIndex};
pub use crate::foundation::error::{ReelError, ReelResult};

pub use crate::assets::cache::{AssetCache, AssetRecord};
pub use crate::assets::fetch::{HttpImageFetcher, ImageFetcher};
pub use crate::assets::loader::{DefaultMediaLoader, MediaLoader};
pub use crate::assets::url::AssetKind;
pub use crate::effects::backend::{BackendKind, EffectBackend, create_backend};
pub use crate::encode::sink::{FrameSink, InMemorySink, MediaBlob, SinkConfig};
pub use crate::export::renderer::{ExportOpts, ExportRenderer};
pub use crate::live::driver::{PlayerCommand, PreviewHandle};
pub use crate::live::player::{LiveOpts, LivePlayer, PlayState, PlayerEvent};
pub use crate::production::pipeline::{
    ProductionMode, ProductionOpts, ProductionPipeline, ProductionReport,
};
pub use crate::production::provider::{GenerativeProvider, OfflineProvider};
pub use crate::render::frame::FrameRGBA;
pub use crate::scene::model::{AssetStatus, EffectTag, Scene, SlotId, TransitionTag, VisualSlot};
pub use crate::scene::project::ProjectSnapshot;
