use std::path::Path;
use std::sync::Arc;

use crate::assets::media::AudioPcm;
use crate::foundation::error::{ReelError, ReelResult};

/// One narration buffer placed on the bus.
#[derive(Clone, Debug)]
pub struct MixSegment {
    pub timeline_start_sample: u64,
    pub timeline_end_sample: u64,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    pub source_interleaved_f32: Arc<Vec<f32>>,
    pub volume: f32,
}

/// Single stereo mix bus covering the whole export timeline.
#[derive(Clone, Debug)]
pub struct AudioBus {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_samples: u64,
    pub segments: Vec<MixSegment>,
}

impl AudioBus {
    pub fn new(sample_rate: u32, channels: u16, duration_sec: f64) -> ReelResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(ReelError::export(
                "audio bus needs a non-zero sample rate and channel count",
            ));
        }
        if !duration_sec.is_finite() || duration_sec < 0.0 {
            return Err(ReelError::export("audio bus duration must be finite"));
        }
        Ok(Self {
            sample_rate,
            channels,
            total_samples: secs_to_samples(duration_sec, sample_rate),
            segments: Vec::new(),
        })
    }

    /// Place `pcm` at `start_sec`, truncated to `max_len_sec` and to the end of the bus.
    pub fn place(&mut self, pcm: &AudioPcm, start_sec: f64, max_len_sec: f64) {
        if pcm.sample_rate == 0 || pcm.channels == 0 || pcm.frames() == 0 {
            return;
        }
        let start = secs_to_samples(start_sec, self.sample_rate).min(self.total_samples);
        let len = pcm.duration_sec().min(max_len_sec.max(0.0));
        let end = (start + secs_to_samples(len, self.sample_rate)).min(self.total_samples);
        if end <= start {
            return;
        }
        self.segments.push(MixSegment {
            timeline_start_sample: start,
            timeline_end_sample: end,
            source_sample_rate: pcm.sample_rate,
            source_channels: pcm.channels,
            source_interleaved_f32: pcm.interleaved_f32.clone(),
            volume: 1.0,
        });
    }

    pub fn duration_sec(&self) -> f64 {
        self.total_samples as f64 / f64::from(self.sample_rate)
    }

    /// Mix all segments into interleaved output PCM, clamped to `[-1, 1]`.
    pub fn mix(&self) -> Vec<f32> {
        let frames = self.total_samples as usize;
        let mut out = vec![0.0f32; frames * usize::from(self.channels)];

        for seg in &self.segments {
            mix_segment(&mut out, self, seg);
        }

        for s in &mut out {
            *s = s.clamp(-1.0, 1.0);
        }
        out
    }
}

fn secs_to_samples(sec: f64, sample_rate: u32) -> u64 {
    (sec.max(0.0) * f64::from(sample_rate)).round() as u64
}

fn mix_segment(out: &mut [f32], bus: &AudioBus, seg: &MixSegment) {
    let src = seg.source_interleaved_f32.as_ref();
    let src_channels = usize::from(seg.source_channels);
    let src_frames = src.len() / src_channels;
    if src_frames == 0 {
        return;
    }

    for dst_sample in seg.timeline_start_sample..seg.timeline_end_sample {
        let rel_sample = dst_sample - seg.timeline_start_sample;
        let rel_sec = (rel_sample as f64) / f64::from(bus.sample_rate);

        let src_pos = rel_sec * f64::from(seg.source_sample_rate);
        let src_frame0 = src_pos.floor() as usize;
        if src_frame0 >= src_frames {
            break;
        }
        let src_frame1 = (src_frame0 + 1).min(src_frames - 1);
        let frac = (src_pos - src_frame0 as f64) as f32;
        let dst_idx = dst_sample as usize * usize::from(bus.channels);

        let (l, r) = if src_channels == 1 {
            let v0 = src[src_frame0];
            let v1 = src[src_frame1];
            let v = v0 + ((v1 - v0) * frac);
            (v, v)
        } else {
            let i0 = src_frame0 * src_channels;
            let i1 = src_frame1 * src_channels;
            (
                src[i0] + ((src[i1] - src[i0]) * frac),
                src[i0 + 1] + ((src[i1 + 1] - src[i0 + 1]) * frac),
            )
        };

        out[dst_idx] += l * seg.volume;
        if bus.channels > 1 {
            out[dst_idx + 1] += r * seg.volume;
        }
    }
}

/// Write interleaved `f32` PCM samples to raw little-endian `.f32le` file.
pub fn write_mix_to_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> ReelResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ReelError::export(format!(
                "failed to create audio mix output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        ReelError::export(format!(
            "failed to write mixed audio file '{}': {e}",
            out_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(sample_rate: u32, channels: u16, secs: f64, v: f32) -> AudioPcm {
        let n = (secs * f64::from(sample_rate)) as usize * usize::from(channels);
        AudioPcm {
            sample_rate,
            channels,
            interleaved_f32: Arc::new(vec![v; n]),
        }
    }

    #[test]
    fn segments_land_at_scene_offsets() {
        let mut bus = AudioBus::new(1000, 2, 3.0).unwrap();
        bus.place(&tone(1000, 2, 1.0, 0.5), 1.0, 2.0);
        let out = bus.mix();
        assert_eq!(out.len(), 3000 * 2);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1000 * 2], 0.5);
        assert_eq!(out[1999 * 2 + 1], 0.5);
        assert_eq!(out[2000 * 2], 0.0);
    }

    #[test]
    fn overlapping_segments_sum_and_clamp() {
        let mut bus = AudioBus::new(100, 2, 1.0).unwrap();
        bus.place(&tone(100, 1, 1.0, 0.75), 0.0, 1.0);
        bus.place(&tone(100, 1, 1.0, 0.75), 0.0, 1.0);
        assert!(bus.mix().iter().all(|s| *s == 1.0));
    }

    #[test]
    fn placement_is_truncated_to_max_len_and_bus_end() {
        let mut bus = AudioBus::new(100, 2, 2.0).unwrap();
        bus.place(&tone(100, 2, 5.0, 0.1), 1.5, 4.0);
        assert_eq!(bus.segments[0].timeline_end_sample, 200);
        bus.place(&tone(100, 2, 5.0, 0.1), 0.0, 0.25);
        assert_eq!(bus.segments[1].timeline_end_sample, 25);
    }

    #[test]
    fn zero_rate_bus_is_an_export_error() {
        assert!(matches!(
            AudioBus::new(0, 2, 1.0),
            Err(ReelError::Export(_))
        ));
    }

    #[test]
    fn f32le_file_has_four_bytes_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix/out.f32le");
        write_mix_to_f32le_file(&[0.0, 1.0, -1.0], &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 12);
    }
}
