//! Per-scene asset production over the worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::assets::wav::wrap_pcm16_wav;
use crate::foundation::config::ProductionConfig;
use crate::foundation::core::AspectRatio;
use crate::foundation::error::{ReelError, ReelResult};
use crate::production::pool::{WorkFailure, run_bounded};
use crate::production::provider::{GeneratedMedia, GenerativeProvider};
use crate::scene::model::{AssetStatus, Scene, SlotId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductionMode {
    /// Narration, stills and optional motion for every scene.
    Full,
    /// Stills only, with a wider pool.
    Research,
}

impl ProductionMode {
    pub fn workers(self, cfg: &ProductionConfig) -> usize {
        match self {
            Self::Full => cfg.full_workers,
            Self::Research => cfg.research_workers,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProductionOpts {
    pub mode: ProductionMode,
    pub workers: usize,
    pub aspect: AspectRatio,
    /// Animate each slot's still into a short video after it is produced.
    pub motion_video: bool,
    pub default_voice: String,
    /// Assets land in `<output_dir>/<scene id>/`.
    pub output_dir: PathBuf,
}

impl ProductionOpts {
    pub fn from_config(cfg: &ProductionConfig, mode: ProductionMode, aspect: AspectRatio) -> Self {
        Self {
            mode,
            workers: mode.workers(cfg),
            aspect,
            motion_video: cfg.motion_video,
            default_voice: cfg.default_voice.clone(),
            output_dir: cfg.output_dir.clone(),
        }
    }
}

/// A scene-production failure that halted the run.
#[derive(Debug)]
pub struct ProductionFailure {
    pub scene_id: String,
    pub error: ReelError,
}

/// Result of a production run. Assets already produced are kept even when the run failed.
#[derive(Debug)]
pub struct ProductionReport {
    /// Every input scene in order, carrying every asset produced for it, including the
    /// failed and interrupted ones.
    pub scenes: Vec<Scene>,
    /// Ids of scenes whose steps all completed.
    pub produced: Vec<String>,
    /// Ids of scenes that were in flight when the run halted and stopped part way.
    pub interrupted: Vec<String>,
    /// Ids of scenes never started because the run halted.
    pub skipped: Vec<String>,
    pub failure: Option<ProductionFailure>,
}

impl ProductionReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// The produced scenes, or the error that halted production.
    pub fn into_result(self) -> ReelResult<Vec<Scene>> {
        match self.failure {
            None => Ok(self.scenes),
            Some(f) => Err(f.error),
        }
    }
}

pub struct ProductionPipeline {
    provider: Arc<dyn GenerativeProvider>,
    opts: ProductionOpts,
}

impl ProductionPipeline {
    pub fn new(provider: Arc<dyn GenerativeProvider>, opts: ProductionOpts) -> Self {
        Self { provider, opts }
    }

    pub fn opts(&self) -> &ProductionOpts {
        &self.opts
    }

    #[tracing::instrument(skip_all, fields(scenes = scenes.len(), mode = ?self.opts.mode))]
    pub async fn run(&self, scenes: Vec<Scene>) -> ProductionReport {
        let provider = self.provider.clone();
        let opts = Arc::new(self.opts.clone());
        let outcome = run_bounded(scenes.clone(), self.opts.workers, move |_, scene, cancel| {
            let provider = provider.clone();
            let opts = opts.clone();
            async move { produce_scene(provider.as_ref(), scene, &opts, &cancel).await }
        })
        .await;

        let mut merged = scenes;
        let mut produced = Vec::with_capacity(outcome.completed.len());
        for (i, scene) in outcome.completed {
            produced.push(scene.id.clone());
            merged[i] = scene;
        }
        for (i, scene) in outcome.partial {
            merged[i] = scene;
        }
        let ids = |indices: &[usize]| -> Vec<String> {
            indices.iter().map(|&i| merged[i].id.clone()).collect()
        };
        let interrupted = ids(&outcome.interrupted);
        let skipped = ids(&outcome.skipped);
        let failure = outcome.error.map(|(i, error)| ProductionFailure {
            scene_id: merged.get(i).map(|s| s.id.clone()).unwrap_or_default(),
            error,
        });

        match &failure {
            None => tracing::info!(produced = produced.len(), "production finished"),
            Some(f) => tracing::error!(
                scene = %f.scene_id,
                error = %f.error,
                produced = produced.len(),
                interrupted = interrupted.len(),
                "production halted"
            ),
        }
        ProductionReport {
            scenes: merged,
            produced,
            interrupted,
            skipped,
            failure,
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> ReelResult<()> {
    if cancel.is_cancelled() {
        return Err(ReelError::provider("production cancelled"));
    }
    Ok(())
}

/// Run one scene's steps strictly in order: narration, then each slot's still followed by
/// its motion video. A slot's video is conditioned on the still produced just before it.
///
/// On failure the scene is handed back with every asset produced so far and the failing
/// asset marked [`AssetStatus::Failed`].
#[tracing::instrument(skip_all, fields(scene = %scene.id))]
pub async fn produce_scene(
    provider: &dyn GenerativeProvider,
    mut scene: Scene,
    opts: &ProductionOpts,
    cancel: &CancellationToken,
) -> Result<Scene, WorkFailure<Scene>> {
    match produce_steps(provider, &mut scene, opts, cancel).await {
        Ok(()) => {
            tracing::info!("scene produced");
            Ok(scene)
        }
        Err(error) => Err(WorkFailure::with_partial(scene, error)),
    }
}

async fn produce_steps(
    provider: &dyn GenerativeProvider,
    scene: &mut Scene,
    opts: &ProductionOpts,
    cancel: &CancellationToken,
) -> ReelResult<()> {
    let dir = opts.output_dir.join(&scene.id);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create '{}'", dir.display()))?;

    if opts.mode == ProductionMode::Full && scene.audio_url.is_none() {
        ensure_live(cancel)?;
        let voice = scene
            .voice_id
            .clone()
            .unwrap_or_else(|| opts.default_voice.clone());
        match provider.synthesize_speech(&scene.script, &voice).await {
            Ok(pcm) => {
                let wav = wrap_pcm16_wav(&pcm.samples, pcm.sample_rate, pcm.channels);
                scene.audio_url = Some(write_asset(&dir, "narration.wav", &wav).await?);
                scene.audio_status = AssetStatus::Success;
            }
            Err(e) => {
                scene.audio_status = AssetStatus::Failed;
                return Err(e);
            }
        }
    }

    for id in SlotId::ALL {
        ensure_live(cancel)?;
        let tag = slot_tag(id);
        let prompt = {
            let slot = scene.slot(id);
            if slot.prompt.trim().is_empty() {
                scene.script.clone()
            } else {
                slot.prompt.clone()
            }
        };

        let mut still: Option<GeneratedMedia> = None;
        if scene.slot(id).image_url.is_none() {
            let media = match provider.synthesize_image(&prompt, opts.aspect).await {
                Ok(m) => m,
                Err(e) => {
                    scene.slot_mut(id).image_status = AssetStatus::Failed;
                    return Err(e);
                }
            };
            let name = format!("{tag}.{}", media.extension());
            let url = write_asset(&dir, &name, &media.bytes).await?;
            let slot = scene.slot_mut(id);
            slot.image_url = Some(url);
            slot.image_status = AssetStatus::Success;
            still = Some(media);
        }

        let wants_motion = opts.mode == ProductionMode::Full
            && opts.motion_video
            && scene.slot(id).video_url.is_none();
        if !wants_motion {
            continue;
        }
        let Some(reference) = still else {
            tracing::debug!(slot = tag, "no fresh still to animate, motion skipped");
            continue;
        };
        ensure_live(cancel)?;
        let motion_prompt = scene.slot(id).motion_prompt.clone().unwrap_or(prompt);
        let video = match provider
            .synthesize_video(&motion_prompt, opts.aspect, &reference)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                scene.slot_mut(id).video_status = AssetStatus::Failed;
                return Err(e);
            }
        };
        let name = format!("{tag}_motion.{}", video.extension());
        let url = write_asset(&dir, &name, &video.bytes).await?;
        let slot = scene.slot_mut(id);
        slot.video_url = Some(url);
        slot.video_status = AssetStatus::Success;
        slot.prefer_video = true;
    }
    Ok(())
}

fn slot_tag(id: SlotId) -> &'static str {
    match id {
        SlotId::A => "slot_a",
        SlotId::B => "slot_b",
    }
}

async fn write_asset(dir: &Path, name: &str, bytes: &[u8]) -> ReelResult<String> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}
