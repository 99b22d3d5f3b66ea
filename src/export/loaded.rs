use std::sync::Arc;

use tokio::sync::mpsc;

use crate::assets::decode::PreparedImage;
use crate::assets::loader::MediaLoader;
use crate::assets::media::AudioPcm;
use crate::assets::url::looks_like_video_url;
use crate::assets::video::VideoSource;
use crate::scene::model::{Scene, SlotId, VisualSlot};

/// Assets loaded per scene: narration plus both visual slots.
pub const ASSETS_PER_SCENE: usize = 3;

/// Render-time media for one visual slot.
pub enum SlotMedia {
    Image(Arc<PreparedImage>),
    Video(Box<dyn VideoSource>),
    /// Load failed or nothing was assigned; drawn as the checkerboard.
    Placeholder,
    /// Slot B left empty; shows slot A's media.
    SameAsA,
}

impl SlotMedia {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

impl std::fmt::Debug for SlotMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(img) => write!(f, "Image({}x{})", img.width, img.height),
            Self::Video(v) => write!(f, "Video({:?})", v.info()),
            Self::Placeholder => f.write_str("Placeholder"),
            Self::SameAsA => f.write_str("SameAsA"),
        }
    }
}

/// A scene plus its materialized media. Owned by exactly one render pass.
#[derive(Debug)]
pub struct LoadedScene {
    pub scene: Scene,
    pub audio: Option<AudioPcm>,
    pub slots: [SlotMedia; 2],
    pub effective_duration: f64,
}

impl LoadedScene {
    pub fn new(scene: Scene, audio: Option<AudioPcm>, slots: [SlotMedia; 2]) -> Self {
        let effective_duration = effective_duration(&scene, audio.as_ref());
        Self {
            scene,
            audio,
            slots,
            effective_duration,
        }
    }

    /// Media drawn for `slot`, following slot B back to slot A when B is empty.
    pub fn media_mut(&mut self, slot: SlotId) -> &mut SlotMedia {
        let idx = match (slot, &self.slots[1]) {
            (SlotId::B, SlotMedia::SameAsA) => 0,
            (s, _) => s.index(),
        };
        &mut self.slots[idx]
    }

    pub fn has_video(&self) -> bool {
        self.slots.iter().any(SlotMedia::is_video)
    }

    /// Restart every video from time zero.
    pub fn rewind_videos(&mut self) {
        for slot in &mut self.slots {
            if let SlotMedia::Video(v) = slot {
                v.rewind();
            }
        }
    }
}

/// Narration length when a non-empty buffer decoded, otherwise the authored duration.
pub fn effective_duration(scene: &Scene, audio: Option<&AudioPcm>) -> f64 {
    match audio {
        Some(pcm) if pcm.duration_sec() > 0.0 => pcm.duration_sec(),
        _ => scene.duration,
    }
}

/// Load one scene's narration and both slots concurrently. Individual failures degrade to
/// no audio or a placeholder and are logged.
pub async fn load_scene(loader: &dyn MediaLoader, scene: &Scene, fps: f64) -> LoadedScene {
    load_scene_reporting(loader, scene, fps, None).await
}

/// [`load_scene`], sending one message on `done` as each of the [`ASSETS_PER_SCENE`] loads
/// settles, whether it succeeded or degraded.
#[tracing::instrument(skip_all, fields(scene = %scene.id))]
pub async fn load_scene_reporting(
    loader: &dyn MediaLoader,
    scene: &Scene,
    fps: f64,
    done: Option<&mpsc::UnboundedSender<()>>,
) -> LoadedScene {
    let settled = || {
        if let Some(tx) = done {
            let _ = tx.send(());
        }
    };
    let (audio, slot_a, slot_b) = tokio::join!(
        async {
            let audio = load_audio(loader, scene).await;
            settled();
            audio
        },
        async {
            let media = load_slot(loader, scene.slot(SlotId::A), fps).await;
            settled();
            media
        },
        async {
            let slot = scene.slot(SlotId::B);
            let media = if slot.is_empty() {
                SlotMedia::SameAsA
            } else {
                load_slot(loader, slot, fps).await
            };
            settled();
            media
        },
    );
    LoadedScene::new(scene.clone(), audio, [slot_a, slot_b])
}

async fn load_audio(loader: &dyn MediaLoader, scene: &Scene) -> Option<AudioPcm> {
    let url = scene.audio_url.as_deref()?;
    match loader.load_audio(url).await {
        Ok(pcm) => Some(pcm),
        Err(e) => {
            tracing::warn!(url, error = %e, "narration failed to load, continuing silent");
            None
        }
    }
}

fn wants_video(slot: &VisualSlot) -> Option<&str> {
    let url = slot.video_url.as_deref()?;
    (slot.prefer_video && looks_like_video_url(url)).then_some(url)
}

async fn load_slot(loader: &dyn MediaLoader, slot: &VisualSlot, fps: f64) -> SlotMedia {
    if let Some(url) = wants_video(slot) {
        match loader.load_video(url, fps).await {
            Ok(v) => return SlotMedia::Video(v),
            Err(e) => tracing::warn!(url, error = %e, "video failed to load, trying image"),
        }
    }
    let Some(url) = slot.image_url.as_deref() else {
        return SlotMedia::Placeholder;
    };
    match loader.load_image(url).await {
        Ok(img) => SlotMedia::Image(Arc::new(img)),
        Err(e) => {
            tracing::warn!(url, error = %e, "image failed to load, using placeholder");
            SlotMedia::Placeholder
        }
    }
}
