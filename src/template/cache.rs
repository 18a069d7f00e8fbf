//! Content-addressed caches for parsed token streams and rendered output.
//!
//! Both caches key on `(template id, sha256 of content)`, so a template
//! whose content changed under the same id is always a miss; the stale
//! entry for that id is replaced whole on the next insert, never patched
//! in place. Entries are `Arc`-shared and immutable, which makes
//! concurrent reads safe and replacement an atomic pointer swap inside
//! the map.
//!
//! The caches live for one process and are rebuilt per run; no eviction
//! policy is needed at that lifetime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::template::expr::RenderWarning;
use crate::template::token::Token;

/// Hex-encoded SHA-256 of template content, the identity half of every
/// cache key.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key for the parsed-token-stream cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TokenKey {
    id: String,
    content_hash: String,
}

/// Key for the rendered-output cache; additionally pins the variable
/// context fingerprint so the same content with different variables
/// caches separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RenderKey {
    id: String,
    content_hash: String,
    context_fingerprint: u64,
}

/// A memoized render: content plus the warnings the original pass
/// produced. Timing is not cached; a hit reports its own (near-zero)
/// elapsed time.
#[derive(Debug)]
pub struct CachedRender {
    pub content: String,
    pub warnings: Vec<RenderWarning>,
}

/// Hit/miss counters, observable by tests and health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Concurrent template cache shared by the engine and the generator's
/// worker pool.
#[derive(Debug, Default)]
pub struct TemplateCache {
    tokens: DashMap<TokenKey, Arc<Vec<Token>>>,
    rendered: DashMap<RenderKey, Arc<CachedRender>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token stream for `(id, content)`, if the content hash
    /// matches what was inserted.
    pub fn get_tokens(&self, id: &str, hash: &str) -> Option<Arc<Vec<Token>>> {
        let key = TokenKey {
            id: id.to_string(),
            content_hash: hash.to_string(),
        };
        self.tokens.get(&key).map(|entry| Arc::clone(&entry))
    }

    /// Insert a parsed token stream, dropping any stale entry for the
    /// same id with a different content hash.
    pub fn insert_tokens(&self, id: &str, hash: &str, tokens: Arc<Vec<Token>>) {
        self.tokens
            .retain(|key, _| !(key.id == id && key.content_hash != hash));
        self.tokens.insert(
            TokenKey {
                id: id.to_string(),
                content_hash: hash.to_string(),
            },
            tokens,
        );
    }

    /// Cached rendered output, counting the lookup as a hit or miss.
    pub fn get_rendered(
        &self,
        id: &str,
        hash: &str,
        context_fingerprint: u64,
    ) -> Option<Arc<CachedRender>> {
        let key = RenderKey {
            id: id.to_string(),
            content_hash: hash.to_string(),
            context_fingerprint,
        };
        match self.rendered.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(id, "render cache hit");
                Some(Arc::clone(&entry))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a rendered result, dropping stale entries for the same id.
    pub fn insert_rendered(
        &self,
        id: &str,
        hash: &str,
        context_fingerprint: u64,
        render: Arc<CachedRender>,
    ) {
        self.rendered
            .retain(|key, _| !(key.id == id && key.content_hash != hash));
        self.rendered.insert(
            RenderKey {
                id: id.to_string(),
                content_hash: hash.to_string(),
                context_fingerprint,
            },
            render,
        );
    }

    /// Render-cache hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop all entries and reset counters.
    pub fn clear(&self) {
        self.tokens.clear();
        self.rendered.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
