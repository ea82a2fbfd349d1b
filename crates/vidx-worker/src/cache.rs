//! Listing-cache invalidation hook.
//!
//! A completed ingest changes what a namespace listing returns, so the
//! orchestrator signals the cache after persisting the result. The cache
//! itself lives in the serving layer; this seam only notifies it.

use async_trait::async_trait;
use tracing::debug;
use vidx_models::Namespace;

/// Invalidation hook for cached namespace listings.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Drop any cached pages for `namespace`. Best effort.
    async fn invalidate(&self, namespace: &Namespace);
}

/// Cache hook used when no cache is deployed.
#[derive(Debug, Default)]
pub struct NoopResultCache;

#[async_trait]
impl ResultCache for NoopResultCache {
    async fn invalidate(&self, namespace: &Namespace) {
        debug!(
            cache_key = %namespace.cache_key(),
            "no result cache configured, skipping invalidation"
        );
    }
}
