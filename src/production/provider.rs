use crate::assets::decode::encode_png;
use crate::foundation::core::AspectRatio;
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::hash_u32;

/// Binary output of a generative call.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedMedia {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl GeneratedMedia {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// File extension matching `mime`.
    pub fn extension(&self) -> &'static str {
        match self.mime.split(';').next().map(str::trim).unwrap_or_default() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            _ => "bin",
        }
    }
}

/// Raw synthesized narration; wrapped into a WAV container before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

/// Remote content generator used by the production pipeline. Errors are fatal to the run.
#[async_trait::async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn synthesize_image(&self, prompt: &str, aspect: AspectRatio)
    -> ReelResult<GeneratedMedia>;

    /// Animate `reference` (a still produced earlier for the same slot).
    async fn synthesize_video(
        &self,
        prompt: &str,
        aspect: AspectRatio,
        reference: &GeneratedMedia,
    ) -> ReelResult<GeneratedMedia>;

    async fn synthesize_speech(&self, text: &str, voice: &str) -> ReelResult<SpeechPcm>;
}

/// Deterministic local provider for dry runs: flat stills colored by prompt hash and silent
/// narration paced by word count. It cannot animate.
#[derive(Clone, Debug)]
pub struct OfflineProvider {
    short_edge: u32,
    speech_rate: u32,
    secs_per_word: f64,
}

impl Default for OfflineProvider {
    fn default() -> Self {
        Self {
            short_edge: 360,
            speech_rate: 24_000,
            secs_per_word: 0.4,
        }
    }
}

impl OfflineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn prompt_color(prompt: &str) -> [u8; 4] {
        let h = prompt
            .bytes()
            .fold(0x9e37_79b9u32, |acc, b| hash_u32(acc ^ u32::from(b)));
        [(h >> 16) as u8, (h >> 8) as u8, h as u8, 255]
    }
}

#[async_trait::async_trait]
impl GenerativeProvider for OfflineProvider {
    async fn synthesize_image(
        &self,
        prompt: &str,
        aspect: AspectRatio,
    ) -> ReelResult<GeneratedMedia> {
        let canvas = aspect.canvas(self.short_edge);
        let rgba = Self::prompt_color(prompt);
        let pixels: Vec<u8> = std::iter::repeat_n(rgba, (canvas.width * canvas.height) as usize)
            .flatten()
            .collect();
        let png = encode_png(canvas.width, canvas.height, &pixels)?;
        Ok(GeneratedMedia::new(png, "image/png"))
    }

    async fn synthesize_video(
        &self,
        _prompt: &str,
        _aspect: AspectRatio,
        _reference: &GeneratedMedia,
    ) -> ReelResult<GeneratedMedia> {
        Err(ReelError::provider("offline provider cannot synthesize video"))
    }

    async fn synthesize_speech(&self, text: &str, _voice: &str) -> ReelResult<SpeechPcm> {
        let words = text.split_whitespace().count().max(1);
        let frames = (words as f64 * self.secs_per_word * f64::from(self.speech_rate)) as usize;
        Ok(SpeechPcm {
            sample_rate: self.speech_rate,
            channels: 1,
            samples: vec![0; frames],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_speech_length_follows_word_count() {
        let p = OfflineProvider::new();
        let pcm = p.synthesize_speech("one two three four five", "narrator").await.unwrap();
        assert_eq!(pcm.samples.len(), 48_000);
    }

    #[tokio::test]
    async fn offline_stills_are_deterministic_pngs() {
        let p = OfflineProvider::new();
        let a = p.synthesize_image("harbor at dawn", AspectRatio::Square).await.unwrap();
        let b = p.synthesize_image("harbor at dawn", AspectRatio::Square).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.extension(), "png");
        let img = crate::assets::decode::decode_image(&a.bytes).unwrap();
        assert_eq!((img.width, img.height), (360, 360));
    }

    #[tokio::test]
    async fn offline_video_is_a_provider_error() {
        let p = OfflineProvider::new();
        let still = GeneratedMedia::new(vec![1], "image/png");
        let err = p
            .synthesize_video("x", AspectRatio::Square, &still)
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::Provider(_)));
    }
}
