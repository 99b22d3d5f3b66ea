//! Minimal RIFF/WAVE container for 16-bit PCM narration.

use std::sync::Arc;

use crate::assets::media::AudioPcm;
use crate::foundation::error::{ReelError, ReelResult};

const HEADER_LEN: usize = 44;

/// Wrap interleaved 16-bit samples in a canonical 44-byte-header WAV container.
pub fn wrap_pcm16_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut out = Vec::with_capacity(HEADER_LEN + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// `true` when `bytes` starts with a RIFF/WAVE signature.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a 16-bit PCM WAV into float samples. Chunks other than `fmt ` and `data` are
/// skipped. Other sample formats are rejected; callers fall back to ffmpeg for those.
pub fn parse_pcm16_wav(bytes: &[u8]) -> ReelResult<AudioPcm> {
    if !is_wav(bytes) {
        return Err(ReelError::asset("not a RIFF/WAVE container"));
    }
    let mut pos = 12usize;
    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let len = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
            as usize;
        let body_start = pos + 8;
        let body_end = body_start.saturating_add(len).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(ReelError::asset("truncated wav fmt chunk"));
                }
                let format = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                fmt = Some((format, channels, rate, bits));
            }
            b"data" => {
                let (format, channels, sample_rate, bits) =
                    fmt.ok_or_else(|| ReelError::asset("wav data chunk before fmt chunk"))?;
                if format != 1 || bits != 16 || channels == 0 {
                    return Err(ReelError::asset(format!(
                        "unsupported wav format {format} with {bits} bits and {channels} channels"
                    )));
                }
                let samples = body
                    .chunks_exact(2)
                    .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32768.0)
                    .collect();
                return Ok(AudioPcm {
                    sample_rate,
                    channels,
                    interleaved_f32: Arc::new(samples),
                });
            }
            _ => {}
        }
        // Chunks are word aligned.
        pos = body_start.saturating_add(len + (len & 1));
    }
    Err(ReelError::asset("wav has no data chunk"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_are_consistent() {
        let wav = wrap_pcm16_wav(&[0, 1, -1, 2], 24_000, 1);
        assert_eq!(wav.len(), HEADER_LEN + 8);
        assert!(is_wav(&wav));
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 8);
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), 48_000);
    }

    #[test]
    fn wrapped_speech_decodes_with_duration() {
        let samples = vec![16_384i16; 24_000 * 2];
        let wav = wrap_pcm16_wav(&samples, 24_000, 1);
        let pcm = parse_pcm16_wav(&wav).unwrap();
        assert_eq!(pcm.channels, 1);
        assert!((pcm.duration_sec() - 2.0).abs() < 1e-9);
        assert!((pcm.interleaved_f32[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn non_wav_is_rejected() {
        assert!(parse_pcm16_wav(b"ID3\x04garbage").is_err());
    }
}
