use std::sync::Arc;

use crate::assets::decode::{PreparedImage, premultiply_rgba8_in_place};
use crate::assets::media::{VideoSourceInfo, decode_video_frames_rgba8};
use crate::foundation::error::{ReelError, ReelResult};

const DECODE_BATCH: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration_sec: f64,
}

/// Playable video handle sampled by scene-local time. Past the end of the clip the last frame
/// is held.
pub trait VideoSource: Send {
    fn info(&self) -> VideoInfo;

    fn frame_at(&mut self, t_sec: f64) -> ReelResult<Arc<PreparedImage>>;

    /// Restart from time zero, dropping decoded state.
    fn rewind(&mut self);
}

/// Decodes a batch of straight-alpha RGBA frames: `(source, start_sec, count, fps)`.
type BatchDecoder = fn(&VideoSourceInfo, f64, u32, f64) -> ReelResult<Vec<Vec<u8>>>;

/// Video decoded on demand through ffmpeg, one batch of frames at a time.
pub struct FfmpegVideoSource {
    info: VideoSourceInfo,
    fps: f64,
    decode: BatchDecoder,
    batch_start: u64,
    batch: Vec<Arc<PreparedImage>>,
    last: Option<Arc<PreparedImage>>,
    /// First frame index known not to decode. Set when a batch comes back short or fails.
    decodable_end: Option<u64>,
    // Keeps spilled in-memory objects alive for as long as ffmpeg may read them.
    _spill: Option<tempfile::NamedTempFile>,
}

impl FfmpegVideoSource {
    pub fn new(
        info: VideoSourceInfo,
        fps: f64,
        spill: Option<tempfile::NamedTempFile>,
    ) -> ReelResult<Self> {
        Self::with_decoder(info, fps, spill, decode_video_frames_rgba8)
    }

    fn with_decoder(
        info: VideoSourceInfo,
        fps: f64,
        spill: Option<tempfile::NamedTempFile>,
        decode: BatchDecoder,
    ) -> ReelResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ReelError::validation("video sample fps must be > 0"));
        }
        Ok(Self {
            info,
            fps,
            decode,
            batch_start: 0,
            batch: Vec::new(),
            last: None,
            decodable_end: None,
            _spill: spill,
        })
    }

    fn last_index(&self) -> u64 {
        let frames = (self.info.duration_sec * self.fps).floor();
        if frames.is_finite() && frames >= 1.0 {
            frames as u64 - 1
        } else {
            0
        }
    }

    fn in_batch(&self, idx: u64) -> bool {
        idx >= self.batch_start && idx < self.batch_start + self.batch.len() as u64
    }

    /// Map `idx` onto the last frame that decodes.
    fn clamp_decodable(&self, idx: u64) -> ReelResult<u64> {
        match self.decodable_end {
            Some(0) => Err(ReelError::asset(format!(
                "no frames decoded from '{}'",
                self.info.input
            ))),
            Some(end) if idx >= end => Ok(end - 1),
            _ => Ok(idx),
        }
    }

    fn note_decodable_end(&mut self, end: u64) {
        let end = self.decodable_end.map_or(end, |known| known.min(end));
        self.decodable_end = Some(end);
    }

    fn load_batch(&mut self, start: u64) -> ReelResult<()> {
        let frames = match (self.decode)(
            &self.info,
            start as f64 / self.fps,
            DECODE_BATCH,
            self.fps,
        ) {
            Ok(frames) => frames,
            Err(e) => {
                self.note_decodable_end(start);
                return Err(e);
            }
        };
        if frames.len() < DECODE_BATCH as usize {
            // The container reported a longer duration than ffmpeg could decode.
            self.note_decodable_end(start + frames.len() as u64);
        }
        self.batch_start = start;
        self.batch = frames
            .into_iter()
            .map(|mut rgba| {
                premultiply_rgba8_in_place(&mut rgba);
                Arc::new(PreparedImage {
                    width: self.info.width,
                    height: self.info.height,
                    rgba8_premul: Arc::new(rgba),
                })
            })
            .collect();
        Ok(())
    }
}

impl VideoSource for FfmpegVideoSource {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            width: self.info.width,
            height: self.info.height,
            duration_sec: self.info.duration_sec,
        }
    }

    fn frame_at(&mut self, t_sec: f64) -> ReelResult<Arc<PreparedImage>> {
        let requested = ((t_sec.max(0.0) * self.fps).floor() as u64).min(self.last_index());
        let mut idx = self.clamp_decodable(requested)?;
        if !self.in_batch(idx) {
            self.load_batch(idx)?;
            idx = self.clamp_decodable(idx)?;
            if !self.in_batch(idx) {
                self.load_batch(idx)?;
            }
        }
        match self.batch.get((idx.saturating_sub(self.batch_start)) as usize) {
            Some(frame) if self.in_batch(idx) => {
                self.last = Some(frame.clone());
                Ok(frame.clone())
            }
            _ => self.last.clone().ok_or_else(|| {
                ReelError::asset(format!("no frames decoded from '{}'", self.info.input))
            }),
        }
    }

    /// Restart from time zero. How far the clip decodes is kept.
    fn rewind(&mut self) {
        self.batch.clear();
        self.batch_start = 0;
        self.last = None;
    }
}

/// Video made of pre-decoded frames at a fixed rate.
#[derive(Clone, Debug)]
pub struct StillFramesVideo {
    frames: Vec<Arc<PreparedImage>>,
    fps: f64,
}

impl StillFramesVideo {
    pub fn new(frames: Vec<Arc<PreparedImage>>, fps: f64) -> ReelResult<Self> {
        if frames.is_empty() {
            return Err(ReelError::validation("video needs at least one frame"));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ReelError::validation("video fps must be > 0"));
        }
        Ok(Self { frames, fps })
    }
}

impl VideoSource for StillFramesVideo {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            width: self.frames[0].width,
            height: self.frames[0].height,
            duration_sec: self.frames.len() as f64 / self.fps,
        }
    }

    fn frame_at(&mut self, t_sec: f64) -> ReelResult<Arc<PreparedImage>> {
        let idx = ((t_sec.max(0.0) * self.fps).floor() as usize).min(self.frames.len() - 1);
        Ok(self.frames[idx].clone())
    }

    fn rewind(&mut self) {}
}
