use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;

use crate::assets::media::AudioPcm;
use crate::foundation::error::ReelResult;
use crate::render::frame::FrameRGBA;

/// Where a presented frame sits on the preview timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    pub scene_index: usize,
    /// Seconds since the scene was entered.
    pub scene_time: f64,
    /// Scene progress in `[0, 1]`.
    pub progress: f64,
}

/// Display target of the live compositor.
pub trait PreviewSurface: Send {
    fn present(&mut self, frame: &FrameRGBA, info: FrameInfo) -> ReelResult<()>;
}

/// Narration playback channel, driven in lockstep with the play state.
pub trait AudioOutput: Send {
    fn start(&mut self, pcm: &AudioPcm);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}

#[derive(Debug, Default)]
struct MemoryInner {
    last: Option<(FrameRGBA, FrameInfo)>,
    presented: u64,
}

/// Keeps the most recent frame. Clones share state so a test can hold one while the player
/// owns the other.
#[derive(Clone, Debug, Default)]
pub struct MemorySurface {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.lock().presented
    }

    pub fn last_frame(&self) -> Option<(FrameRGBA, FrameInfo)> {
        self.lock().last.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PreviewSurface for MemorySurface {
    fn present(&mut self, frame: &FrameRGBA, info: FrameInfo) -> ReelResult<()> {
        let mut inner = self.lock();
        inner.last = Some((frame.clone(), info));
        inner.presented += 1;
        Ok(())
    }
}

/// Writes every presented frame as a numbered PNG.
#[derive(Debug)]
pub struct PngSequenceSurface {
    dir: PathBuf,
    next: u64,
}

impl PngSequenceSurface {
    pub fn new(dir: impl Into<PathBuf>) -> ReelResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create frame directory '{}'", dir.display()))?;
        Ok(Self { dir, next: 0 })
    }

    pub fn written(&self) -> u64 {
        self.next
    }
}

impl PreviewSurface for PngSequenceSurface {
    fn present(&mut self, frame: &FrameRGBA, _info: FrameInfo) -> ReelResult<()> {
        let path = self.dir.join(format!("frame_{:05}.png", self.next));
        let png = frame.to_png()?;
        std::fs::write(&path, png)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        self.next += 1;
        Ok(())
    }
}

/// Audio output that plays nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAudio;

impl AudioOutput for NullAudio {
    fn start(&mut self, _pcm: &AudioPcm) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn stop(&mut self) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum AudioEvent {
    Start { duration_sec: f64 },
    Pause,
    Resume,
    Stop,
}

/// Audio output that records the calls it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingAudio {
    events: Arc<Mutex<Vec<AudioEvent>>>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(&self, ev: AudioEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ev);
    }
}

impl AudioOutput for RecordingAudio {
    fn start(&mut self, pcm: &AudioPcm) {
        self.push(AudioEvent::Start {
            duration_sec: pcm.duration_sec(),
        });
    }

    fn pause(&mut self) {
        self.push(AudioEvent::Pause);
    }

    fn resume(&mut self) {
        self.push(AudioEvent::Resume);
    }

    fn stop(&mut self) {
        self.push(AudioEvent::Stop);
    }
}
