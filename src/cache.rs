//! Content-addressed snapshot cache
//!
//! Exported images are written to `<cache_dir>/<hash>.<ext>` where `hash` is
//! a 32-bit FNV-1a digest of the snapshot's cache key. Writes are
//! unconditional overwrites: identical keys converge on the same file, so no
//! read-before-write is needed. A hash collision is an accepted, bounded
//! risk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;

use crate::data_url::DataUrl;
use crate::host::Storage;
use crate::{Error, ImageFormat, Result};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the UTF-8 bytes of `input`, as 8 lowercase hex digits.
pub fn hash_key(input: &str) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:08x}", hash)
}

/// Path a snapshot with `cache_key` is stored at inside `cache_dir`.
pub fn cache_path(cache_dir: &str, cache_key: &str, format: ImageFormat) -> String {
    format!(
        "{}/{}.{}",
        cache_dir.trim_end_matches('/'),
        hash_key(cache_key),
        format.extension()
    )
}

type EnsureTask = Shared<BoxFuture<'static, ()>>;

/// Persists exported snapshots through a [`Storage`] backend.
///
/// One cache is shared by every mounted visual; its directory-creation map is
/// the only cross-instance mutable state.
pub struct SnapshotCache {
    storage: Arc<dyn Storage>,
    ensured: Mutex<HashMap<String, EnsureTask>>,
}

impl SnapshotCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            ensured: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Make sure `dir` exists.
    ///
    /// Creation runs once per directory: concurrent callers await the same
    /// in-flight task instead of issuing a second creation. Failures are
    /// ignored here; a truly broken directory fails the subsequent write.
    pub async fn ensure_dir(&self, dir: &str) {
        let task = {
            let mut ensured = self.ensured.lock().unwrap_or_else(|p| p.into_inner());
            ensured
                .entry(dir.to_string())
                .or_insert_with(|| {
                    let storage = self.storage.clone();
                    let dir = dir.to_string();
                    async move {
                        if let Err(e) = storage.ensure_dir(&dir).await {
                            debug!("ensure_dir({}) failed: {}", dir, e);
                        }
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };
        task.await;
    }

    /// Decode `data_url` and write it to its content-addressed path.
    ///
    /// Returns a reference the host can load in place of the data URL.
    /// Raster payloads are written as binary, vector payloads as text
    /// (base64 and percent-encoded transports are both accepted).
    pub async fn persist(
        &self,
        cache_dir: &str,
        data_url: &str,
        format: ImageFormat,
        cache_key: &str,
    ) -> Result<String> {
        self.ensure_dir(cache_dir.trim_end_matches('/')).await;
        let path = cache_path(cache_dir, cache_key, format);
        let parsed = DataUrl::parse(data_url)?;

        let written = match format {
            ImageFormat::Png => {
                let bytes = parsed.decode_bytes()?;
                self.storage.write_binary(&path, &bytes).await
            }
            ImageFormat::Svg => {
                let text = parsed.decode_text()?;
                self.storage.write_text(&path, &text).await
            }
        };
        written.map_err(|e| match e {
            Error::Persistence(_) => e,
            other => Error::Persistence(other.to_string()),
        })?;

        debug!("persisted snapshot {}", path);
        Ok(self.storage.resource_path(&path))
    }
}
