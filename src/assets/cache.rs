//! Session-scoped asset cache.
//!
//! The cache owns the URL -> record table for its lifetime. Each cleaned URL maps to a
//! single-assignment cell, so concurrent first-use of the same URL races on initialising one
//! cell rather than on inserting into the table: exactly one ingestion does the work and every
//! caller gets the same `Arc<AssetRecord>`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::assets::fetch::{Fetched, ImageFetcher};
use crate::assets::url::{AssetKind, classify_url, clean_url, proxy_url, source_domain, storage_key};
use crate::foundation::config::CacheConfig;
use crate::foundation::error::ReelResult;

/// Prefix of local object handles handed out as `resolved_url`.
pub const OBJECT_HANDLE_PREFIX: &str = "blob:scenereel/";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: Uuid,
    pub original_url: String,
    /// Local object handle when materialized, otherwise the proxy (or original) URL.
    pub resolved_url: String,
    pub kind: AssetKind,
    pub source_domain: String,
    pub storage_key: String,
    pub is_locally_cached: bool,
    pub created_at: DateTime<Utc>,
    pub title: Option<String>,
}

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Arc<Vec<u8>>,
    content_type: Option<String>,
}

#[derive(Default)]
struct CacheInner {
    cells: HashMap<String, Arc<OnceCell<Arc<AssetRecord>>>>,
    order: Vec<Arc<AssetRecord>>,
    objects: HashMap<String, StoredObject>,
    /// Bumped by `clear`; ingests started under an older generation do not write back.
    generation: u64,
}

pub struct AssetCache {
    cfg: CacheConfig,
    fetcher: Arc<dyn ImageFetcher>,
    inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("proxy_base", &self.cfg.proxy_base)
            .field("len", &self.len())
            .finish()
    }
}

impl AssetCache {
    pub fn new(cfg: CacheConfig, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            cfg,
            fetcher,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // The table holds no invariant a panicking holder could break halfway.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve `url` to its record, ingesting it on first use. Never fails on network errors:
    /// images that cannot be fetched degrade to a remote proxy handle.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub async fn ingest(&self, url: &str, title: Option<&str>) -> Arc<AssetRecord> {
        let cleaned = clean_url(url, &self.cfg.redirector_hosts);
        let (cell, generation) = {
            let mut inner = self.lock();
            let cell = inner.cells.entry(cleaned.clone()).or_default().clone();
            (cell, inner.generation)
        };
        cell.get_or_init(|| self.build_record(cleaned, title.map(str::to_string), generation))
            .await
            .clone()
    }

    async fn build_record(
        &self,
        cleaned: String,
        title: Option<String>,
        generation: u64,
    ) -> Arc<AssetRecord> {
        let id = Uuid::new_v4();
        let kind = classify_url(&cleaned);
        let domain = source_domain(&cleaned);

        let (resolved_url, is_locally_cached) = match kind {
            AssetKind::Image => self.materialize_image(&cleaned, id, generation).await,
            AssetKind::Video | AssetKind::SourceDocument => (cleaned.clone(), false),
        };

        let record = Arc::new(AssetRecord {
            id,
            storage_key: storage_key(kind, &domain, &id.to_string()),
            original_url: cleaned,
            resolved_url,
            kind,
            source_domain: domain,
            is_locally_cached,
            created_at: Utc::now(),
            title,
        });
        tracing::debug!(
            kind = ?record.kind,
            key = %record.storage_key,
            local = record.is_locally_cached,
            "asset ingested"
        );
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.order.push(record.clone());
        } else {
            tracing::debug!("cache cleared during ingest, record not kept");
        }
        record
    }

    async fn materialize_image(&self, cleaned: &str, id: Uuid, generation: u64) -> (String, bool) {
        let proxied = match proxy_url(&self.cfg, cleaned) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "proxy url unavailable, keeping original link");
                return (cleaned.to_string(), false);
            }
        };
        match self.fetcher.fetch(&proxied).await {
            Ok(Fetched {
                bytes,
                content_type,
            }) if !bytes.is_empty() => {
                let handle = format!("{OBJECT_HANDLE_PREFIX}{id}");
                let mut inner = self.lock();
                if inner.generation == generation {
                    inner.objects.insert(
                        handle.clone(),
                        StoredObject {
                            bytes: Arc::new(bytes),
                            content_type,
                        },
                    );
                }
                (handle, true)
            }
            Ok(_) => {
                tracing::warn!("proxy returned an empty body, using remote handle");
                (proxied, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "image fetch failed, using remote handle");
                (proxied, false)
            }
        }
    }

    /// Existing record for `url` (after redirect cleaning), without ingesting.
    pub fn get(&self, url: &str) -> Option<Arc<AssetRecord>> {
        let cleaned = clean_url(url, &self.cfg.redirector_hosts);
        self.lock()
            .cells
            .get(&cleaned)
            .and_then(|c| c.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record in ingestion order.
    pub fn records(&self) -> Vec<Arc<AssetRecord>> {
        self.lock().order.clone()
    }

    /// Bytes behind a local object handle.
    pub fn object_bytes(&self, handle: &str) -> Option<Arc<Vec<u8>>> {
        self.lock().objects.get(handle).map(|o| o.bytes.clone())
    }

    /// Drop every record and object. Called when the owning session ends. Ingests still in
    /// flight complete for their callers but leave nothing behind.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.cells.clear();
        inner.order.clear();
        inner.objects.clear();
    }

    /// Write every materialized object under `dir/<storage_key>.<ext>`. Returns the number of
    /// files written.
    pub fn save_objects(&self, dir: &Path) -> ReelResult<usize> {
        let (records, objects) = {
            let inner = self.lock();
            (inner.order.clone(), inner.objects.clone())
        };
        let mut written = 0usize;
        for rec in records.iter().filter(|r| r.is_locally_cached) {
            let Some(obj) = objects.get(&rec.resolved_url) else {
                continue;
            };
            let ext = extension_for(obj.content_type.as_deref());
            let path = dir.join(format!("{}.{ext}", rec.storage_key));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create '{}'", parent.display()))?;
            }
            std::fs::write(&path, obj.bytes.as_slice())
                .with_context(|| format!("write '{}'", path.display()))?;
            written += 1;
        }
        Ok(written)
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|c| c.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/webp" | "" => "webp",
        _ => "bin",
    }
}
