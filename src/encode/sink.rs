use std::path::Path;
use std::sync::Arc;

use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::frame::FrameRGBA;

/// Configuration provided to a [`FrameSink`] at the start of an export.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    /// Mixed narration bus, if any scene carried audio.
    pub audio: Option<AudioInput>,
}

/// Interleaved `f32` PCM handed to the sink alongside the frames.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioInput {
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        (self.samples.len() / usize::from(self.channels)) as f64 / f64::from(self.sample_rate)
    }
}

/// The finished artifact of an export.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub duration_sec: f64,
    pub frame_count: u64,
}

impl MediaBlob {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn save(&self, path: &Path) -> ReelResult<()> {
        use anyhow::Context as _;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        std::fs::write(path, &self.bytes)
            .with_context(|| format!("failed to write media blob '{}'", path.display()))?;
        Ok(())
    }
}

/// Capture endpoint consuming composited frames in timeline order.
///
/// `push_frame` is called with strictly increasing `FrameIndex` values. A failure in
/// `begin` or `end` aborts the export.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()>;
    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()>;
    fn end(&mut self) -> ReelResult<MediaBlob>;
}

/// In-memory sink for tests and debugging. The blob holds the raw premultiplied frames
/// back to back.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, FrameRGBA)>,
    keep_frames: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            keep_frames: true,
            ..Self::default()
        }
    }

    /// Count frames without retaining pixels; the blob then only carries the first frame.
    pub fn counting() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg.clone()
    }

    pub fn frames(&self) -> &[(FrameIndex, FrameRGBA)] {
        &self.frames
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelError::export("sink width/height must be non-zero"));
        }
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        if self.cfg.is_none() {
            return Err(ReelError::export("sink not started"));
        }
        if let Some((last, _)) = self.frames.last()
            && idx.0 <= last.0
        {
            return Err(ReelError::export("sink received out-of-order frame index"));
        }
        if self.keep_frames || self.frames.is_empty() {
            self.frames.push((idx, frame.clone()));
        } else if let Some(slot) = self.frames.last_mut() {
            slot.0 = idx;
        }
        Ok(())
    }

    fn end(&mut self) -> ReelResult<MediaBlob> {
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| ReelError::export("sink not started"))?;
        let frame_count = self.frames.last().map(|(idx, _)| idx.0 + 1).unwrap_or(0);
        let bytes = self
            .frames
            .iter()
            .flat_map(|(_, f)| f.data.iter().copied())
            .collect();
        Ok(MediaBlob {
            bytes,
            mime: "video/x-raw-rgba".to_owned(),
            duration_sec: cfg.fps.frames_to_secs(frame_count),
            frame_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SinkConfig {
        SinkConfig {
            width: 2,
            height: 2,
            fps: Fps::new(10, 1).unwrap(),
            audio: None,
        }
    }

    #[test]
    fn blob_duration_follows_frame_count() {
        let mut sink = InMemorySink::new();
        sink.begin(cfg()).unwrap();
        for i in 0..15 {
            sink.push_frame(FrameIndex(i), &FrameRGBA::new(2, 2)).unwrap();
        }
        let blob = sink.end().unwrap();
        assert_eq!(blob.frame_count, 15);
        assert!((blob.duration_sec - 1.5).abs() < 1e-9);
        assert_eq!(blob.bytes.len(), 15 * 16);
    }

    #[test]
    fn counting_sink_keeps_one_frame() {
        let mut sink = InMemorySink::counting();
        sink.begin(cfg()).unwrap();
        for i in 0..5 {
            sink.push_frame(FrameIndex(i), &FrameRGBA::new(2, 2)).unwrap();
        }
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.end().unwrap().frame_count, 5);
    }

    #[test]
    fn out_of_order_frames_are_rejected() {
        let mut sink = InMemorySink::new();
        sink.begin(cfg()).unwrap();
        sink.push_frame(FrameIndex(1), &FrameRGBA::new(2, 2)).unwrap();
        assert!(sink.push_frame(FrameIndex(1), &FrameRGBA::new(2, 2)).is_err());
    }

    #[test]
    fn end_without_begin_is_export_fatal() {
        let err = InMemorySink::new().end().unwrap_err();
        assert!(err.is_export_fatal());
    }
}
