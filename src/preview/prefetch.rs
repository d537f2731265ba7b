//! Background warming of neighbouring pages

use tokio::task::JoinHandle;
use tracing::debug;

use super::cache::PageCache;

/// Pages adjacent to `page` that exist in a document of `page_count` pages
pub fn neighbours(page: usize, page_count: usize) -> Vec<usize> {
    let mut pages = Vec::with_capacity(2);
    if page + 1 < page_count {
        pages.push(page + 1);
    }
    if page > 0 && page - 1 < page_count {
        pages.push(page - 1);
    }
    pages
}

#[derive(Clone)]
pub struct Prefetcher {
    cache: PageCache,
}

impl Prefetcher {
    pub fn new(cache: PageCache) -> Self {
        Self { cache }
    }

    /// Fire-and-forget renders of the pages around `page`
    ///
    /// Failures are logged and dropped; they never reach the caller.
    pub fn warm_around(&self, page: usize, page_count: usize) -> Vec<JoinHandle<()>> {
        neighbours(page, page_count)
            .into_iter()
            .map(|neighbour| {
                let cache = self.cache.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.get(neighbour).await {
                        debug!(page = neighbour, error = %e, "Prefetch failed");
                    }
                })
            })
            .collect()
    }
}
