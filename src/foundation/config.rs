//! TOML configuration. Every field has a default so partial files are accepted.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Base URL of the resizing image proxy. The source URL, width and quality are appended
    /// as `url`, `w` and `q` query parameters.
    pub proxy_base: String,
    pub max_width: u32,
    pub quality: u8,
    pub redirector_hosts: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            proxy_base: "https://wsrv.nl/".to_string(),
            max_width: 1920,
            quality: 85,
            redirector_hosts: [
                "google.com",
                "www.google.com",
                "l.facebook.com",
                "lm.facebook.com",
                "l.instagram.com",
                "www.bing.com",
                "href.li",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
    pub short_edge: u32,
    pub bg_rgba: [u8; 4],
    pub transition_sec: f64,
    pub effects_in_export: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            short_edge: 720,
            bg_rgba: [0, 0, 0, 255],
            transition_sec: 1.0,
            effects_in_export: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub tick_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            width: 640,
            height: 360,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProductionConfig {
    pub full_workers: usize,
    pub research_workers: usize,
    pub motion_video: bool,
    pub default_voice: String,
    pub output_dir: PathBuf,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            full_workers: 2,
            research_workers: 4,
            motion_video: false,
            default_voice: "narrator".to_string(),
            output_dir: PathBuf::from("scenereel-out"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReelConfig {
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub preview: PreviewConfig,
    pub production: ProductionConfig,
}

impl ReelConfig {
    pub fn from_toml_str(s: &str) -> ReelResult<Self> {
        let cfg: ReelConfig =
            toml::from_str(s).map_err(|e| ReelError::serde(format!("config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> ReelResult<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> ReelResult<String> {
        toml::to_string_pretty(self).map_err(|e| ReelError::serde(format!("config: {e}")))
    }

    pub fn validate(&self) -> ReelResult<()> {
        Fps::new(self.render.fps, 1)?;
        if self.preview.tick_rate == 0 {
            return Err(ReelError::validation("preview.tick_rate must be > 0"));
        }
        if self.production.full_workers == 0 || self.production.research_workers == 0 {
            return Err(ReelError::validation("worker counts must be > 0"));
        }
        if !self.render.transition_sec.is_finite() || self.render.transition_sec <= 0.0 {
            return Err(ReelError::validation(
                "render.transition_sec must be finite and > 0",
            ));
        }
        Ok(())
    }

    pub fn fps(&self) -> ReelResult<Fps> {
        Fps::new(self.render.fps, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = ReelConfig::from_toml_str(
            r#"
[render]
fps = 24

[production]
motion_video = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.render.fps, 24);
        assert_eq!(cfg.render.short_edge, 720);
        assert!(cfg.production.motion_video);
        assert_eq!(cfg.production.full_workers, 2);
        assert_eq!(cfg.production.research_workers, 4);
        assert!(cfg.cache.redirector_hosts.iter().any(|h| h == "google.com"));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let err = ReelConfig::from_toml_str("[render]\nfps = 0\n").unwrap_err();
        assert!(matches!(err, ReelError::Validation(_)));
    }

    #[test]
    fn defaults_serialize_and_reload() {
        let s = ReelConfig::default().to_toml_string().unwrap();
        let back = ReelConfig::from_toml_str(&s).unwrap();
        assert_eq!(back.preview.tick_rate, 60);
    }
}
