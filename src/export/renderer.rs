use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::assets::decode::PreparedImage;
use crate::assets::loader::MediaLoader;
use crate::assets::media::MIX_SAMPLE_RATE;
use crate::audio::mix::AudioBus;
use crate::effects::backend::{CpuEffectBackend, EffectBackend};
use crate::effects::catalog::EffectParams;
use crate::encode::sink::{AudioInput, FrameSink, MediaBlob, SinkConfig};
use crate::export::loaded::{ASSETS_PER_SCENE, LoadedScene, SlotMedia, load_scene_reporting};
use crate::foundation::clock::{SystemClock, TickSource};
use crate::foundation::config::RenderConfig;
use crate::foundation::core::{AspectRatio, Canvas, Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::compose::{apply_black_overlay, draw_cover, overlay_opacity, select_slot};
use crate::render::frame::FrameRGBA;
use crate::scene::model::{EffectTag, Scene, validate_scenes};

/// Share of the progress range spent on asset preparation; composition fills the rest.
const PREPARE_SHARE: f64 = 0.5;

/// Options controlling an export.
#[derive(Clone, Debug)]
pub struct ExportOpts {
    pub fps: Fps,
    /// Shorter canvas edge in pixels; the longer edge follows the aspect ratio.
    pub short_edge: u32,
    /// Straight-alpha color every frame is cleared to.
    pub bg_rgba: [u8; 4],
    /// Length of the black fade-in at the start of each scene.
    pub transition_sec: f64,
    /// Run each scene's visual effect over its frames.
    pub apply_effects: bool,
    /// Pace composition against the tick source, one frame interval per frame.
    pub realtime: bool,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            fps: Fps { num: 30, den: 1 },
            short_edge: 720,
            bg_rgba: [0, 0, 0, 255],
            transition_sec: 1.0,
            apply_effects: false,
            realtime: true,
        }
    }
}

impl ExportOpts {
    pub fn from_config(cfg: &RenderConfig) -> ReelResult<Self> {
        Ok(Self {
            fps: Fps::new(cfg.fps, 1)?,
            short_edge: cfg.short_edge,
            bg_rgba: cfg.bg_rgba,
            transition_sec: cfg.transition_sec,
            apply_effects: cfg.effects_in_export,
            realtime: true,
        })
    }
}

/// Frame range `[start, end)` a scene occupies on the export timeline. Boundaries are
/// snapped to the nearest frame so adjacent scenes never overlap or leave gaps.
pub fn scene_frame_range(fps: Fps, start_sec: f64, duration_sec: f64) -> (u64, u64) {
    (
        fps.secs_to_frames_round(start_sec),
        fps.secs_to_frames_round(start_sec + duration_sec),
    )
}

/// Walks the scene list once and produces a single muxed media blob.
pub struct ExportRenderer {
    loader: Arc<dyn MediaLoader>,
    opts: ExportOpts,
    sink: Box<dyn FrameSink>,
    clock: Box<dyn TickSource>,
    effects: Option<Box<dyn EffectBackend>>,
}

impl ExportRenderer {
    /// Renderer writing MP4 through ffmpeg when the `media-ffmpeg` feature is on, raw frames
    /// in memory otherwise.
    pub fn new(loader: Arc<dyn MediaLoader>, opts: ExportOpts) -> Self {
        Self {
            loader,
            sink: default_sink(opts.bg_rgba),
            opts,
            clock: Box::new(SystemClock::new()),
            effects: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn TickSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_effects(mut self, backend: Box<dyn EffectBackend>) -> Self {
        self.effects = Some(backend);
        self
    }

    pub fn opts(&self) -> &ExportOpts {
        &self.opts
    }

    /// Render `scenes` at `aspect`. `on_progress(fraction, label)` is called with
    /// non-decreasing fractions, ending at exactly 1.0 on success.
    ///
    /// Asset failures degrade to placeholders or silence. Sink and audio bus failures abort
    /// with [`ReelError::Export`].
    #[tracing::instrument(skip_all, fields(scenes = scenes.len(), aspect = %aspect))]
    pub async fn render<F>(
        &mut self,
        scenes: &[Scene],
        aspect: AspectRatio,
        mut on_progress: F,
    ) -> ReelResult<MediaBlob>
    where
        F: FnMut(f64, &str) + Send,
    {
        if scenes.is_empty() {
            return Err(ReelError::validation("nothing to render: scene list is empty"));
        }
        validate_scenes(scenes)?;
        let canvas = aspect.canvas(self.opts.short_edge);

        on_progress(0.0, "Loading assets");
        let mut loaded = prepare(
            self.loader.as_ref(),
            scenes,
            self.opts.fps.as_f64(),
            &mut on_progress,
        )
        .await;

        let total_sec: f64 = loaded.iter().map(|l| l.effective_duration).sum();
        let audio = build_audio_bus(&loaded, total_sec)?;
        tracing::info!(
            width = canvas.width,
            height = canvas.height,
            duration = total_sec,
            audio = audio.is_some(),
            "export started"
        );

        self.sink
            .begin(SinkConfig {
                width: canvas.width,
                height: canvas.height,
                fps: self.opts.fps,
                audio,
            })
            .map_err(into_export_error)?;

        if let Err(e) = self
            .compose_all(&mut loaded, canvas, total_sec, &mut on_progress)
            .await
        {
            // Finalize so the encoder releases its resources; the export error wins.
            let _ = self.sink.end();
            return Err(e);
        }

        let blob = self.sink.end().map_err(into_export_error)?;
        tracing::info!(
            bytes = blob.bytes.len(),
            frames = blob.frame_count,
            "export finished"
        );
        on_progress(1.0, "Done");
        Ok(blob)
    }

    async fn compose_all<F>(
        &mut self,
        loaded: &mut [LoadedScene],
        canvas: Canvas,
        total_sec: f64,
        on_progress: &mut F,
    ) -> ReelResult<()>
    where
        F: FnMut(f64, &str) + Send,
    {
        let fps = self.opts.fps;
        let total_frames = fps.secs_to_frames_round(total_sec).max(1);
        let scene_count = loaded.len();
        let origin = self.clock.now();
        let mut start_sec = 0.0;
        let mut frame = FrameRGBA::new(canvas.width, canvas.height);

        for (i, scene) in loaded.iter_mut().enumerate() {
            let eff = scene.effective_duration;
            let (f0, f1) = scene_frame_range(fps, start_sec, eff);
            let label = format!("Rendering scene {}/{}", i + 1, scene_count);
            scene.rewind_videos();

            for f in f0..f1 {
                let t_local = (fps.frames_to_secs(f) - start_sec).max(0.0);
                self.compose_frame(&mut frame, scene, t_local)?;
                self.sink
                    .push_frame(FrameIndex(f), &frame)
                    .map_err(into_export_error)?;

                let done = (f + 1).min(total_frames);
                on_progress(
                    PREPARE_SHARE + (1.0 - PREPARE_SHARE) * (done as f64 / total_frames as f64),
                    &label,
                );
                if self.opts.realtime {
                    let deadline = origin + Duration::from_secs(f + 1) * fps.den / fps.num;
                    self.clock.wait_until(deadline).await;
                }
            }

            scene.rewind_videos();
            start_sec += eff;
        }
        Ok(())
    }

    fn compose_frame(
        &mut self,
        frame: &mut FrameRGBA,
        scene: &mut LoadedScene,
        t_local: f64,
    ) -> ReelResult<()> {
        frame.clear(self.opts.bg_rgba);

        let slot = select_slot(t_local, scene.effective_duration);
        let source = match scene.media_mut(slot) {
            SlotMedia::Image(img) => img.clone(),
            SlotMedia::Video(video) => match video.frame_at(t_local) {
                Ok(img) => img,
                Err(e) => {
                    tracing::warn!(error = %e, "video frame failed, drawing placeholder");
                    Arc::new(PreparedImage::placeholder())
                }
            },
            SlotMedia::Placeholder | SlotMedia::SameAsA => Arc::new(PreparedImage::placeholder()),
        };

        let effect = scene.scene.visual_effect;
        if self.opts.apply_effects && effect != EffectTag::None {
            let shaded = self.shade(&source, effect, t_local, frame.width, frame.height)?;
            draw_cover(frame, &shaded);
        } else {
            draw_cover(frame, &source);
        }

        apply_black_overlay(frame, overlay_opacity(t_local, self.opts.transition_sec));
        Ok(())
    }

    fn shade(
        &mut self,
        source: &PreparedImage,
        effect: EffectTag,
        t_local: f64,
        width: u32,
        height: u32,
    ) -> ReelResult<PreparedImage> {
        let backend = self
            .effects
            .get_or_insert_with(|| Box::new(CpuEffectBackend::new()));
        let texture = backend.upload(source)?;
        let out = backend.render(texture, &EffectParams::new(effect, t_local as f32, width, height));
        backend.release(texture);
        let out = out?;
        PreparedImage::from_premul(out.width, out.height, out.data)
    }
}

/// Load scenes one after another; each scene's three assets load concurrently. Progress
/// advances as each single asset settles.
async fn prepare<F>(
    loader: &dyn MediaLoader,
    scenes: &[Scene],
    fps: f64,
    on_progress: &mut F,
) -> Vec<LoadedScene>
where
    F: FnMut(f64, &str) + Send,
{
    let total_assets = scenes.len() * ASSETS_PER_SCENE;
    let mut loaded = Vec::with_capacity(scenes.len());
    let mut completed = 0usize;
    for scene in scenes {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let load = async move { load_scene_reporting(loader, scene, fps, Some(&tx)).await };
        let report = async {
            while rx.recv().await.is_some() {
                completed += 1;
                tracing::debug!(completed, total_assets, "asset prepared");
                on_progress(
                    PREPARE_SHARE * (completed as f64 / total_assets as f64),
                    &format!("Loading assets {completed}/{total_assets}"),
                );
            }
        };
        let (scene_loaded, ()) = tokio::join!(load, report);
        loaded.push(scene_loaded);
    }
    loaded
}

fn default_sink(bg_rgba: [u8; 4]) -> Box<dyn FrameSink> {
    #[cfg(feature = "media-ffmpeg")]
    {
        use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
        Box::new(FfmpegSink::new(FfmpegSinkOpts { bg_rgba }))
    }
    #[cfg(not(feature = "media-ffmpeg"))]
    {
        let _ = bg_rgba;
        Box::new(crate::encode::sink::InMemorySink::counting())
    }
}

/// Place every decoded narration at its scene's start. `None` when no scene has audio.
fn build_audio_bus(loaded: &[LoadedScene], total_sec: f64) -> ReelResult<Option<AudioInput>> {
    if loaded.iter().all(|l| l.audio.is_none()) {
        return Ok(None);
    }
    let mut bus = AudioBus::new(MIX_SAMPLE_RATE, 2, total_sec)?;
    let mut start = 0.0;
    for scene in loaded {
        if let Some(pcm) = scene.audio.as_ref() {
            bus.place(pcm, start, scene.effective_duration);
        }
        start += scene.effective_duration;
    }
    Ok(Some(AudioInput {
        samples: Arc::new(bus.mix()),
        sample_rate: bus.sample_rate,
        channels: bus.channels,
    }))
}

fn into_export_error(e: ReelError) -> ReelError {
    if e.is_export_fatal() {
        e
    } else {
        ReelError::export(e.to_string())
    }
}
