//! Content-addressed result cache.
//!
//! JSON payloads keyed by a sha256 fingerprint of the input blobs,
//! algorithm, pipeline, and package version. Every operation is
//! best-effort: failures are logged at debug and surface as a miss
//! (get) or a no-op (set). Callers never see cache errors.
//!
//! The production backend is redis; an in-memory backend exists for
//! tests and cache-free development, and a disabled backend misses
//! everything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const KEY_PREFIX: &str = "seizeval";

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    /// TTL is not enforced here; entries live as long as the process.
    Memory(Arc<Mutex<HashMap<String, String>>>),
    Disabled,
}

/// Best-effort JSON cache.
#[derive(Clone)]
pub struct ResultCache {
    backend: Backend,
    ttl_seconds: u64,
}

impl ResultCache {
    /// Connect to redis. A failed connection yields a disabled cache
    /// rather than an error; the service runs without it.
    pub async fn connect(url: &str, ttl_seconds: u64) -> Self {
        let backend = match redis::Client::open(url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => Backend::Redis(conn),
                Err(err) => {
                    warn!(%err, url, "redis unavailable, result cache disabled");
                    Backend::Disabled
                }
            },
            Err(err) => {
                warn!(%err, url, "invalid redis url, result cache disabled");
                Backend::Disabled
            }
        };

        Self {
            backend,
            ttl_seconds,
        }
    }

    /// Process-local cache for tests and development.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(Mutex::new(HashMap::new()))),
            ttl_seconds: 0,
        }
    }

    /// A cache with no backend; gets miss and sets drop.
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            ttl_seconds: 0,
        }
    }

    /// Readiness check.
    pub async fn ping(&self) -> bool {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                    .is_ok()
            }
            Backend::Memory(_) => true,
            Backend::Disabled => false,
        }
    }

    pub async fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        let raw = match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(raw) => raw,
                    Err(err) => {
                        debug!(%err, key, "cache get failed");
                        None
                    }
                }
            }
            Backend::Memory(map) => map.lock().get(key).cloned(),
            Backend::Disabled => None,
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(%err, key, "cache payload not valid JSON");
                None
            }
        }
    }

    pub async fn set_json(&self, key: &str, value: &serde_json::Value) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(%err, key, "cache payload serialization failed");
                return;
            }
        };

        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(err) = conn
                    .set_ex::<_, _, ()>(key, payload, self.ttl_seconds)
                    .await
                {
                    debug!(%err, key, "cache set failed");
                }
            }
            Backend::Memory(map) => {
                map.lock().insert(key.to_string(), payload);
            }
            Backend::Disabled => {}
        }
    }

    /// Build the lookup key: sha256 over the input blobs and the
    /// evaluation coordinates, separated to avoid ambiguity.
    pub fn make_key(
        ref_bytes: &[u8],
        hyp_bytes: &[u8],
        algorithm: &str,
        pipeline: &str,
        version: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ref_bytes);
        hasher.update(b"|");
        hasher.update(hyp_bytes);
        hasher.update(b"|");
        hasher.update(algorithm.as_bytes());
        hasher.update(b"|");
        hasher.update(pipeline.as_bytes());
        hasher.update(b"|");
        hasher.update(version.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{KEY_PREFIX}:{algorithm}:{pipeline}:{digest}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_input_sensitive() {
        let a = ResultCache::make_key(b"ref", b"hyp", "taes", "dual", "0.1.0");
        let b = ResultCache::make_key(b"ref", b"hyp", "taes", "dual", "0.1.0");
        assert_eq!(a, b);
        assert!(a.starts_with("seizeval:taes:dual:"));

        // Any coordinate change produces a different key
        assert_ne!(a, ResultCache::make_key(b"ref2", b"hyp", "taes", "dual", "0.1.0"));
        assert_ne!(a, ResultCache::make_key(b"ref", b"hyp2", "taes", "dual", "0.1.0"));
        assert_ne!(a, ResultCache::make_key(b"ref", b"hyp", "dp", "dual", "0.1.0"));
        assert_ne!(a, ResultCache::make_key(b"ref", b"hyp", "taes", "new-only", "0.1.0"));
        assert_ne!(a, ResultCache::make_key(b"ref", b"hyp", "taes", "dual", "0.2.0"));
    }

    #[test]
    fn separator_prevents_boundary_ambiguity() {
        // Moving a byte across the ref/hyp boundary must change the key
        let a = ResultCache::make_key(b"ab", b"c", "taes", "dual", "v");
        let b = ResultCache::make_key(b"a", b"bc", "taes", "dual", "v");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn disabled_cache_misses_and_swallows_sets() {
        let cache = ResultCache::disabled();
        assert!(!cache.ping().await);
        assert!(cache.get_json("seizeval:x").await.is_none());
        cache.set_json("seizeval:x", &serde_json::json!({"v": 1})).await;
        assert!(cache.get_json("seizeval:x").await.is_none());
    }

    #[tokio::test]
    async fn memory_cache_round_trips_json() {
        let cache = ResultCache::in_memory();
        assert!(cache.ping().await);

        let value = serde_json::json!({"parity_passed": true, "speedup": 2.0});
        cache.set_json("seizeval:k", &value).await;
        assert_eq!(cache.get_json("seizeval:k").await, Some(value));
        assert!(cache.get_json("seizeval:other").await.is_none());
    }
}
