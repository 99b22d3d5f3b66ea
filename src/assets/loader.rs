use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use reqwest::Url;

use crate::assets::cache::{AssetCache, OBJECT_HANDLE_PREFIX};
use crate::assets::decode::{PreparedImage, decode_image};
use crate::assets::fetch::ImageFetcher;
use crate::assets::media::{AudioPcm, MIX_SAMPLE_RATE, decode_audio_f32_stereo, probe_video};
use crate::assets::video::{FfmpegVideoSource, VideoSource};
use crate::assets::wav::{is_wav, parse_pcm16_wav};
use crate::foundation::error::{ReelError, ReelResult};

/// Materializes resolved URLs into render-ready media.
#[async_trait::async_trait]
pub trait MediaLoader: Send + Sync {
    async fn load_image(&self, url: &str) -> ReelResult<PreparedImage>;

    /// Open a video for sampling at `fps` frames per second of scene time.
    async fn load_video(&self, url: &str, fps: f64) -> ReelResult<Box<dyn VideoSource>>;

    /// Decode narration to interleaved stereo at [`MIX_SAMPLE_RATE`].
    async fn load_audio(&self, url: &str) -> ReelResult<AudioPcm>;
}

enum Location {
    Object(String),
    Remote(String),
    Local(PathBuf),
}

fn locate(url: &str) -> ReelResult<Location> {
    if url.starts_with(OBJECT_HANDLE_PREFIX) {
        return Ok(Location::Object(url.to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Location::Remote(url.to_string()));
    }
    if url.starts_with("file://") {
        let parsed = Url::parse(url).map_err(|e| ReelError::asset(format!("bad file url '{url}': {e}")))?;
        let path = parsed
            .to_file_path()
            .map_err(|_| ReelError::asset(format!("file url '{url}' has no local path")))?;
        return Ok(Location::Local(path));
    }
    if url.contains("://") {
        return Err(ReelError::asset(format!("unsupported url scheme in '{url}'")));
    }
    Ok(Location::Local(PathBuf::from(url)))
}

/// [`MediaLoader`] reading cache objects, http(s) URLs and local files.
pub struct DefaultMediaLoader {
    fetcher: Arc<dyn ImageFetcher>,
    cache: Option<Arc<AssetCache>>,
}

impl DefaultMediaLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            fetcher,
            cache: None,
        }
    }

    /// Resolve `blob:` handles through `cache`.
    pub fn with_cache(mut self, cache: Arc<AssetCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn read_bytes(&self, url: &str) -> ReelResult<Arc<Vec<u8>>> {
        match locate(url)? {
            Location::Object(handle) => self
                .cache
                .as_ref()
                .and_then(|c| c.object_bytes(&handle))
                .ok_or_else(|| ReelError::asset(format!("unknown object handle '{handle}'"))),
            Location::Remote(u) => Ok(Arc::new(self.fetcher.fetch(&u).await?.bytes)),
            Location::Local(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| ReelError::asset(format!("read '{}': {e}", path.display())))?;
                Ok(Arc::new(bytes))
            }
        }
    }
}

fn spill_to_tempfile(bytes: &[u8]) -> ReelResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("scenereel-")
        .tempfile()
        .context("create media spill file")?;
    file.write_all(bytes).context("write media spill file")?;
    file.flush().context("flush media spill file")?;
    Ok(file)
}

async fn blocking<T, F>(what: &'static str, f: F) -> ReelResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ReelResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReelError::asset(format!("{what} task failed: {e}")))?
}

#[async_trait::async_trait]
impl MediaLoader for DefaultMediaLoader {
    async fn load_image(&self, url: &str) -> ReelResult<PreparedImage> {
        let bytes = self.read_bytes(url).await?;
        blocking("image decode", move || decode_image(&bytes)).await
    }

    async fn load_video(&self, url: &str, fps: f64) -> ReelResult<Box<dyn VideoSource>> {
        let (input, spill) = match locate(url)? {
            Location::Remote(u) => (u, None),
            Location::Local(p) => (p.to_string_lossy().into_owned(), None),
            Location::Object(_) => {
                let bytes = self.read_bytes(url).await?;
                let file = spill_to_tempfile(&bytes)?;
                (file.path().to_string_lossy().into_owned(), Some(file))
            }
        };
        let info = blocking("video probe", move || probe_video(&input)).await?;
        tracing::debug!(
            width = info.width,
            height = info.height,
            duration = info.duration_sec,
            "video opened"
        );
        Ok(Box::new(FfmpegVideoSource::new(info, fps, spill)?))
    }

    async fn load_audio(&self, url: &str) -> ReelResult<AudioPcm> {
        let bytes = self.read_bytes(url).await?;
        if is_wav(&bytes) {
            if let Ok(pcm) = parse_pcm16_wav(&bytes) {
                return Ok(pcm.to_stereo(MIX_SAMPLE_RATE));
            }
        }
        blocking("audio decode", move || {
            let file = spill_to_tempfile(&bytes)?;
            decode_audio_f32_stereo(&file.path().to_string_lossy(), MIX_SAMPLE_RATE)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::decode::encode_png;
    use crate::assets::fetch::Fetched;
    use crate::assets::wav::wrap_pcm16_wav;

    struct NoNetwork;

    #[async_trait::async_trait]
    impl ImageFetcher for NoNetwork {
        async fn fetch(&self, url: &str) -> ReelResult<Fetched> {
            Err(ReelError::asset(format!("offline: {url}")))
        }
    }

    #[test]
    fn locate_distinguishes_schemes() {
        assert!(matches!(locate("blob:scenereel/x"), Ok(Location::Object(_))));
        assert!(matches!(locate("https://a.b/c.png"), Ok(Location::Remote(_))));
        assert!(matches!(locate("/tmp/a.png"), Ok(Location::Local(_))));
        assert!(matches!(locate("file:///tmp/a.png"), Ok(Location::Local(_))));
        assert!(locate("ftp://a.b/c").is_err());
    }

    #[tokio::test]
    async fn local_png_and_wav_load_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let png_path = dir.path().join("a.png");
        std::fs::write(&png_path, encode_png(2, 1, &[255, 0, 0, 255, 0, 255, 0, 255]).unwrap())
            .unwrap();
        let wav_path = dir.path().join("n.wav");
        std::fs::write(&wav_path, wrap_pcm16_wav(&vec![0i16; 24_000], 24_000, 1)).unwrap();

        let loader = DefaultMediaLoader::new(Arc::new(NoNetwork));
        let img = loader
            .load_image(png_path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!((img.width, img.height), (2, 1));

        let pcm = loader.load_audio(wav_path.to_str().unwrap()).await.unwrap();
        assert_eq!(pcm.sample_rate, MIX_SAMPLE_RATE);
        assert!((pcm.duration_sec() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn remote_failures_surface_as_asset_errors() {
        let loader = DefaultMediaLoader::new(Arc::new(NoNetwork));
        let err = loader.load_image("https://a.b/c.png").await.unwrap_err();
        assert!(matches!(err, ReelError::Asset(_)));
        let err = loader.load_image("blob:scenereel/missing").await.unwrap_err();
        assert!(matches!(err, ReelError::Asset(_)));
    }
}
