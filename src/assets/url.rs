//! Pure URL handling for ingestion: unwrapping redirectors, classifying, naming.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::foundation::config::CacheConfig;
use crate::foundation::error::{ReelError, ReelResult};

pub const EXTERNAL_DOMAIN: &str = "external";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "m4v", "ogv", "mkv"];
const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "tiktok.com",
    "dailymotion.com",
];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "bmp", "svg"];
const IMAGE_HOST_PREFIXES: &[&str] = &[
    "images.",
    "img.",
    "i.",
    "media.",
    "pbs.twimg.com",
    "upload.wikimedia.org",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    SourceDocument,
}

impl AssetKind {
    /// Directory segment used in synthetic storage keys.
    pub fn storage_dir(self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Video => "videos",
            AssetKind::SourceDocument => "sources",
        }
    }
}

/// Strip redirect wrappers: when the host is a known redirector and the query carries the real
/// target in `url` or `q`, return that target. Anything else is returned trimmed.
pub fn clean_url(raw: &str, redirector_hosts: &[String]) -> String {
    let trimmed = raw.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return trimmed.to_string();
    };
    if !redirector_hosts
        .iter()
        .any(|h| h.eq_ignore_ascii_case(host))
    {
        return trimmed.to_string();
    }

    let target = parsed
        .query_pairs()
        .find(|(k, _)| k == "url")
        .or_else(|| parsed.query_pairs().find(|(k, _)| k == "q"))
        .map(|(_, v)| v.into_owned());
    match target {
        Some(t) if Url::parse(&t).is_ok() => t,
        _ => trimmed.to_string(),
    }
}

/// Host without a leading `www.`, or [`EXTERNAL_DOMAIN`] when the URL cannot be parsed.
pub fn source_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| EXTERNAL_DOMAIN.to_string())
}

/// Lowercased extension of the URL path, ignoring query and fragment.
pub fn path_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => {
            let no_frag = url.split('#').next().unwrap_or(url);
            no_frag.split('?').next().unwrap_or(no_frag).to_string()
        }
    };
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.trim().to_ascii_lowercase();
    if ext.is_empty() { None } else { Some(ext) }
}

fn host_matches(domain: &str, host: &str) -> bool {
    domain == host || domain.ends_with(&format!(".{host}"))
}

/// Classify in fixed order: video extension, video host, image extension, image host prefix,
/// otherwise a source document.
pub fn classify_url(url: &str) -> AssetKind {
    let ext = path_extension(url);
    let domain = source_domain(url);

    if ext
        .as_deref()
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e))
    {
        return AssetKind::Video;
    }
    if VIDEO_HOSTS.iter().any(|h| host_matches(&domain, h)) {
        return AssetKind::Video;
    }
    if ext
        .as_deref()
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e))
    {
        return AssetKind::Image;
    }
    if IMAGE_HOST_PREFIXES.iter().any(|p| domain.starts_with(p)) {
        return AssetKind::Image;
    }
    AssetKind::SourceDocument
}

/// `true` when the URL can be handed to a media decoder as a video stream: a known video file
/// extension or a local/in-memory handle. Hosting pages (YouTube and friends) are not.
pub fn looks_like_video_url(url: &str) -> bool {
    let ext = path_extension(url);
    if ext
        .as_deref()
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e))
    {
        return true;
    }
    url.starts_with("blob:") && ext.is_none()
}

/// URL of `target` routed through the resizing proxy.
pub fn proxy_url(cfg: &CacheConfig, target: &str) -> ReelResult<String> {
    let url = Url::parse_with_params(
        &cfg.proxy_base,
        &[
            ("url", target.to_string()),
            ("w", cfg.max_width.to_string()),
            ("q", cfg.quality.to_string()),
            ("output", "webp".to_string()),
        ],
    )
    .map_err(|e| ReelError::validation(format!("invalid proxy base '{}': {e}", cfg.proxy_base)))?;
    Ok(url.into())
}

/// Human-readable storage key such as `images/real.com/1a2b3c4d`.
pub fn storage_key(kind: AssetKind, domain: &str, id: &str) -> String {
    let short: String = id.chars().filter(|c| *c != '-').take(8).collect();
    format!("{}/{}/{}", kind.storage_dir(), domain, short)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirectors() -> Vec<String> {
        CacheConfig::default().redirector_hosts
    }

    #[test]
    fn google_redirect_is_unwrapped() {
        let cleaned = clean_url(
            "https://google.com/url?q=https%3A%2F%2Freal.com%2Fimg.png",
            &redirectors(),
        );
        assert_eq!(cleaned, "https://real.com/img.png");
    }

    #[test]
    fn url_param_wins_over_q() {
        let cleaned = clean_url(
            "https://www.google.com/url?q=https%3A%2F%2Fa.com&url=https%3A%2F%2Fb.com%2Fx",
            &redirectors(),
        );
        assert_eq!(cleaned, "https://b.com/x");
    }

    #[test]
    fn non_redirector_hosts_are_left_alone() {
        let u = "https://example.com/url?q=https%3A%2F%2Freal.com";
        assert_eq!(clean_url(u, &redirectors()), u);
        assert_eq!(clean_url("  not a url ", &redirectors()), "not a url");
    }

    #[test]
    fn classification_order() {
        assert_eq!(classify_url("https://x.com/a.mp4"), AssetKind::Video);
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=abc"),
            AssetKind::Video
        );
        assert_eq!(classify_url("https://images.unsplash.com/abc"), AssetKind::Image);
        assert_eq!(classify_url("https://example.com/pic.JPG?w=2"), AssetKind::Image);
        // A video extension on an image host is still a video.
        assert_eq!(classify_url("https://i.imgur.com/clip.webm"), AssetKind::Video);
        assert_eq!(
            classify_url("https://example.com/article"),
            AssetKind::SourceDocument
        );
    }

    #[test]
    fn domain_falls_back_to_sentinel() {
        assert_eq!(source_domain("https://www.Real.com/x"), "real.com");
        assert_eq!(source_domain("::nope::"), EXTERNAL_DOMAIN);
    }

    #[test]
    fn proxy_url_encodes_target() {
        let cfg = CacheConfig::default();
        let p = proxy_url(&cfg, "https://real.com/img.png?a=1&b=2").unwrap();
        assert!(p.starts_with("https://wsrv.nl/?url=https%3A%2F%2Freal.com%2Fimg.png%3Fa%3D1%26b%3D2"));
        assert!(p.contains("w=1920"));
        assert!(p.contains("q=85"));
    }

    #[test]
    fn storage_key_is_truncated() {
        let key = storage_key(
            AssetKind::Image,
            "real.com",
            "1a2b3c4d-5e6f-7081-9203-a4b5c6d7e8f9",
        );
        assert_eq!(key, "images/real.com/1a2b3c4d");
    }

    #[test]
    fn video_url_heuristic() {
        assert!(looks_like_video_url("https://cdn.x/clip.mp4?sig=1"));
        assert!(!looks_like_video_url("https://youtube.com/watch?v=1"));
        assert!(!looks_like_video_url("https://cdn.x/still.png"));
    }
}
