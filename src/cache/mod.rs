//! # Cache Module
//!
//! Cache of resolved track descriptors, keyed by URL.
//!
//! [`MusicCache`] avoids re-running `yt-dlp` for tracks that were already
//! resolved. It is bounded by `CACHE_SIZE` entries and every entry expires
//! after `CACHE_TTL` seconds. Expired entries are swept by the periodic
//! maintenance task in [`crate::bot`].

pub mod lru_cache;

use lru_cache::LRUCache;
use std::time::Duration;
use tracing::info;

use crate::sources::TrackSource;

/// Caché principal de descriptores, clave = URL de origen.
pub type MusicCache = LRUCache<String, TrackSource>;

impl MusicCache {
    pub fn from_config(capacity: usize, ttl_secs: u64) -> Self {
        Self::with_ttl(capacity, Some(Duration::from_secs(ttl_secs)))
    }

    /// Performs cache maintenance by removing expired entries.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }
}
