//! Audio/video decoding through the system `ffprobe`/`ffmpeg` binaries.
//!
//! Inputs are anything ffmpeg accepts as `-i`: a local path or an http(s) URL. In-memory
//! objects are spilled to a temp file by the loader first.

use std::sync::Arc;

use crate::foundation::error::{ReelError, ReelResult};

/// Rate of the narration bus. Every decoded narration is brought to it before mixing.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    pub input: String,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
    pub has_audio: bool,
}

impl VideoSourceInfo {
    pub fn source_fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Arc<Vec<f32>>,
}

impl AudioPcm {
    pub fn silent(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            interleaved_f32: Arc::new(Vec::new()),
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }

    /// Playback length in seconds.
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Same signal as interleaved stereo at `sample_rate`, linearly resampled. Mono is
    /// duplicated to both channels; extra channels beyond two are dropped.
    pub fn to_stereo(&self, sample_rate: u32) -> AudioPcm {
        if self.channels == 2 && self.sample_rate == sample_rate {
            return self.clone();
        }
        let channels = usize::from(self.channels.max(1));
        let in_frames = self.frames();
        if in_frames == 0 || self.sample_rate == 0 {
            return AudioPcm::silent(sample_rate, 2);
        }
        let ratio = f64::from(self.sample_rate) / f64::from(sample_rate);
        let out_frames = ((in_frames as f64) / ratio).round() as usize;
        let src = self.interleaved_f32.as_slice();
        let sample = |frame: usize, ch: usize| -> f32 {
            let c = ch.min(channels - 1);
            src[frame.min(in_frames - 1) * channels + c]
        };

        let mut out = Vec::with_capacity(out_frames * 2);
        for i in 0..out_frames {
            let pos = (i as f64) * ratio;
            let i0 = pos.floor() as usize;
            let frac = (pos - i0 as f64) as f32;
            for ch in 0..2 {
                let a = sample(i0, ch);
                let b = sample(i0 + 1, ch);
                out.push(a + (b - a) * frac);
            }
        }
        AudioPcm {
            sample_rate,
            channels: 2,
            interleaved_f32: Arc::new(out),
        }
    }
}

#[cfg(feature = "media-ffmpeg")]
pub fn probe_video(input: &str) -> ReelResult<VideoSourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(input)
        .output()
        .map_err(|e| ReelError::asset(format!("ffprobe unavailable: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::asset(format!(
            "cannot probe '{input}': {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelError::asset(format!("unreadable probe report: {e}")))?;
    let is_kind = |s: &&ProbeStream, kind: &str| s.codec_type.as_deref() == Some(kind);
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| is_kind(s, "video"))
        .ok_or_else(|| ReelError::asset(format!("no video stream in '{input}'")))?;
    let width = video_stream
        .width
        .ok_or_else(|| ReelError::asset("probe report has no frame width"))?;
    let height = video_stream
        .height
        .ok_or_else(|| ReelError::asset("probe report has no frame height"))?;

    let (fps_num, fps_den) = parse_ff_ratio(video_stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| ReelError::asset("probe report has no usable frame rate"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref()?.parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = parsed.streams.iter().any(|s| is_kind(&s, "audio"));

    Ok(VideoSourceInfo {
        input: input.to_string(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
        has_audio,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn probe_video(_input: &str) -> ReelResult<VideoSourceInfo> {
    Err(ReelError::asset(
        "narration and video loading need the media-ffmpeg feature",
    ))
}

/// Decode up to `frame_count` straight-alpha RGBA frames starting at `start_time_sec`,
/// resampled to `out_fps` so frame `i` of the batch shows `start + i / out_fps`.
#[cfg(feature = "media-ffmpeg")]
pub(crate) fn decode_video_frames_rgba8(
    source: &VideoSourceInfo,
    start_time_sec: f64,
    frame_count: u32,
    out_fps: f64,
) -> ReelResult<Vec<Vec<u8>>> {
    if frame_count == 0 {
        return Ok(Vec::new());
    }

    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{start_time_sec:.9}")])
        .arg("-i")
        .arg(&source.input)
        .args([
            "-vf",
            &format!("fps={out_fps:.6}"),
            "-frames:v",
            &frame_count.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReelError::asset(format!("ffmpeg unavailable for video frames: {e}")))?;

    if !out.status.success() {
        return Err(ReelError::asset(format!(
            "cannot decode frames of '{}': {}",
            source.input,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = source.width as usize * source.height as usize * 4;
    if expected_len == 0 {
        return Err(ReelError::asset(
            "video reports a zero-sized frame",
        ));
    }
    if !out.stdout.len().is_multiple_of(expected_len) {
        return Err(ReelError::asset(format!(
            "video batch of {} bytes does not split into {expected_len}-byte frames",
            out.stdout.len()
        )));
    }

    Ok(out
        .stdout
        .chunks_exact(expected_len)
        .take(frame_count as usize)
        .map(<[u8]>::to_vec)
        .collect())
}

#[cfg(not(feature = "media-ffmpeg"))]
pub(crate) fn decode_video_frames_rgba8(
    _source: &VideoSourceInfo,
    _start_time_sec: f64,
    _frame_count: u32,
    _out_fps: f64,
) -> ReelResult<Vec<Vec<u8>>> {
    Err(ReelError::asset(
        "narration and video loading need the media-ffmpeg feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
pub fn decode_audio_f32_stereo(input: &str, sample_rate: u32) -> ReelResult<AudioPcm> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(input)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReelError::asset(format!("ffmpeg unavailable for narration: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // ffmpeg reports a missing audio stream as an error; that is silence, not a failure.
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("Output file #0 does not contain any stream")
        {
            return Ok(AudioPcm::silent(sample_rate, 2));
        }
        return Err(ReelError::asset(format!(
            "cannot decode narration '{input}': {}",
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(ReelError::asset(
            "narration stream ended mid-sample",
        ));
    }
    let pcm = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: Arc::new(pcm),
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn decode_audio_f32_stereo(_input: &str, _sample_rate: u32) -> ReelResult<AudioPcm> {
    Err(ReelError::asset(
        "narration and video loading need the media-ffmpeg feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.split_once('/')?;
    let (num, den) = (a.trim().parse::<u32>().ok()?, b.trim().parse::<u32>().ok()?);
    (den != 0).then_some((num, den))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_counts_frames_not_samples() {
        let pcm = AudioPcm {
            sample_rate: 48_000,
            channels: 2,
            interleaved_f32: Arc::new(vec![0.0; 48_000 * 2 * 3]),
        };
        assert!((pcm.duration_sec() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn mono_upsample_keeps_duration_and_duplicates_channels() {
        let mono = AudioPcm {
            sample_rate: 24_000,
            channels: 1,
            interleaved_f32: Arc::new(vec![0.5; 24_000]),
        };
        let st = mono.to_stereo(MIX_SAMPLE_RATE);
        assert_eq!(st.channels, 2);
        assert_eq!(st.frames(), 48_000);
        assert!((st.duration_sec() - 1.0).abs() < 1e-9);
        assert!(st.interleaved_f32.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[cfg(feature = "media-ffmpeg")]
    #[test]
    fn ff_ratio_rejects_zero_denominator() {
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
        assert_eq!(parse_ff_ratio("30/0"), None);
        assert_eq!(parse_ff_ratio("abc"), None);
    }
}
