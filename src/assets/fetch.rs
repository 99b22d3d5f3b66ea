use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::error::{ReelError, ReelResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw bytes returned by a successful fetch.
#[derive(Clone, Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Byte fetcher used by the cache for image materialization and by the media loader for
/// remote media. Any network failure or non-2xx status is an `Err`.
#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> ReelResult<Fetched>;
}

/// [`ImageFetcher`] over a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> ReelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("scenereel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> ReelResult<Fetched> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReelError::asset(format!("GET '{url}': {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ReelError::asset(format!("GET '{url}' returned HTTP {status}")));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ReelError::asset(format!("read body of '{url}': {e}")))?;
        Ok(Fetched {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
