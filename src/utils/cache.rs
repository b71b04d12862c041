use moka::future::Cache as MokaCache;
use std::time::Duration;

#[derive(Clone)]
pub struct Cache {
    /// Published page documents keyed by page id
    pub page_document_cache: MokaCache<String, String>,
}

impl Cache {
    pub fn new(ttl: u64, max_capacity: u64) -> Self {
        Self {
            page_document_cache: MokaCache::builder()
                .time_to_live(Duration::from_secs(ttl))
                .max_capacity(max_capacity)
                .build(),
        }
    }
}
