//! Two-tier preview cache
//!
//! Memory tier: bounded LRU of artifacts. Disk tier: one PNG per page under
//! the project's cache namespace. Renders are serialized by one lock and
//! re-check both tiers after acquiring it, so concurrent requests for the
//! same page cost a single render.
//!
//! Invalidation and stores both run under the memory-tier write lock. Each
//! page carries a generation stamp that invalidation bumps; a render whose
//! stamp changed while it ran is handed to its caller but never stored, so a
//! stale bitmap cannot outlive the invalidation that made it stale.
//!
//! A render that overruns its timeout fails the request but keeps the render
//! lock until the blocking task actually finishes. Placeholder renders (page
//! failed to rasterize) are returned but never cached.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::config::DEFAULT_CACHE_PAGES;
use crate::project::PageSet;
use crate::session::FALLBACK_DISPLAY_SIZE;

use super::disk::DiskTier;
use super::error::{PreviewError, PreviewResult};
use super::types::{BitmapRef, PageSource, PreviewArtifact, RenderWarning};

/// Upper bound on a single page render
const RENDER_TIMEOUT_SECS: u64 = 60;

/// Which previews a mutation made stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Pages(PageSet),
    All,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        matches!(self, Invalidation::Pages(pages) if pages.is_empty())
    }
}

impl From<PageSet> for Invalidation {
    fn from(pages: PageSet) -> Self {
        Invalidation::Pages(pages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub renders: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    epoch: u64,
    page: u64,
}

struct MemoryTier {
    entries: LruCache<usize, PreviewArtifact>,
    epoch: u64,
    page_generations: HashMap<usize, u64>,
}

impl MemoryTier {
    fn stamp(&self, page: usize) -> Stamp {
        Stamp {
            epoch: self.epoch,
            page: self.page_generations.get(&page).copied().unwrap_or(0),
        }
    }
}

#[derive(Clone)]
pub struct PageCache {
    inner: Arc<PageCacheInner>,
}

struct PageCacheInner {
    source: Arc<dyn PageSource>,
    memory: RwLock<MemoryTier>,
    disk: DiskTier,
    render_lock: Arc<Mutex<()>>,
    render_timeout: Duration,
    renders: AtomicU64,
    capacity: usize,
}

impl PageCache {
    pub fn new(source: Arc<dyn PageSource>, disk: DiskTier, capacity: usize) -> Self {
        let size = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CACHE_PAGES))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(PageCacheInner {
                source,
                memory: RwLock::new(MemoryTier {
                    entries: LruCache::new(size),
                    epoch: 0,
                    page_generations: HashMap::new(),
                }),
                disk,
                render_lock: Arc::new(Mutex::new(())),
                render_timeout: Duration::from_secs(RENDER_TIMEOUT_SECS),
                renders: AtomicU64::new(0),
                capacity: size.get(),
            }),
        }
    }

    /// Same cache with a different per-render timeout; call before sharing
    pub fn with_render_timeout(mut self, render_timeout: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.render_timeout = render_timeout;
        }
        self
    }

    pub fn disk(&self) -> &DiskTier {
        &self.inner.disk
    }

    /// Preview of `page`, rendering at most once however many callers ask
    pub async fn get(&self, page: usize) -> PreviewResult<PreviewArtifact> {
        if let Some(artifact) = self.lookup(page).await {
            return Ok(artifact);
        }

        let render_guard = self.inner.render_lock.clone().lock_owned().await;

        // Another caller may have rendered while we waited
        if let Some(artifact) = self.lookup(page).await {
            return Ok(artifact);
        }

        let stamp = self.inner.memory.read().await.stamp(page);
        let source = self.inner.source.clone();
        let mut handle = tokio::task::spawn_blocking(move || source.render_page(page));

        let rendered = match timeout(self.inner.render_timeout, &mut handle).await {
            Ok(join_result) => {
                join_result.map_err(|e| PreviewError::TaskJoin(e.to_string()))??
            }
            Err(_) => {
                warn!(page, "Render timed out");
                hold_until_finished(render_guard, handle);
                return Err(PreviewError::Timeout(self.inner.render_timeout.as_secs()));
            }
        };
        self.inner.renders.fetch_add(1, Ordering::Relaxed);
        debug!(
            page,
            width = rendered.width,
            height = rendered.height,
            warnings = rendered.warnings.len(),
            "Rendered preview"
        );

        let placeholder = rendered
            .warnings
            .iter()
            .any(|w| matches!(w, RenderWarning::PagePlaceholder { .. }));
        let artifact = PreviewArtifact {
            page_index: page,
            bitmap: BitmapRef::Png(Arc::new(rendered.png)),
            width_px: rendered.width,
            height_px: rendered.height,
        };
        if placeholder {
            debug!(page, "Not caching placeholder preview");
        } else {
            self.store(page, stamp, &artifact).await;
        }

        Ok(artifact)
    }

    /// Memory tier, then disk tier; a disk hit is promoted into memory
    async fn lookup(&self, page: usize) -> Option<PreviewArtifact> {
        let stamp = {
            let mut memory = self.inner.memory.write().await;
            if let Some(artifact) = memory.entries.get(&page) {
                return Some(artifact.clone());
            }
            memory.stamp(page)
        };

        if !self.inner.disk.contains(page).await {
            return None;
        }

        let source = self.inner.source.clone();
        let (width_px, height_px) = tokio::task::spawn_blocking(move || source.display_size(page))
            .await
            .unwrap_or(FALLBACK_DISPLAY_SIZE);

        let artifact = PreviewArtifact {
            page_index: page,
            bitmap: BitmapRef::File(self.inner.disk.page_path(page)),
            width_px,
            height_px,
        };

        let mut memory = self.inner.memory.write().await;
        if memory.stamp(page) != stamp {
            // Invalidated while we looked; the file is gone
            return None;
        }
        if let Some(existing) = memory.entries.get(&page) {
            return Some(existing.clone());
        }
        memory.entries.put(page, artifact.clone());
        debug!(page, "Promoted disk preview to memory");
        Some(artifact)
    }

    async fn store(&self, page: usize, stamp: Stamp, artifact: &PreviewArtifact) {
        let mut memory = self.inner.memory.write().await;
        if memory.stamp(page) != stamp {
            debug!(page, "Discarding render made stale during rendering");
            return;
        }

        if let BitmapRef::Png(png) = &artifact.bitmap {
            if let Err(e) = self.inner.disk.write(page, png).await {
                warn!(page, error = %e, "Failed to write preview to disk cache");
            }
        }
        memory.entries.put(page, artifact.clone());
    }

    /// Drop stale previews from both tiers
    pub async fn invalidate(&self, scope: &Invalidation) {
        if scope.is_empty() {
            return;
        }

        let mut memory = self.inner.memory.write().await;
        match scope {
            Invalidation::Pages(pages) => {
                for &page in pages {
                    *memory.page_generations.entry(page).or_insert(0) += 1;
                    memory.entries.pop(&page);
                    if let Err(e) = self.inner.disk.remove(page).await {
                        warn!(page, error = %e, "Failed to remove cached preview");
                    }
                }
                debug!(pages = ?pages, "Invalidated previews");
            }
            Invalidation::All => {
                memory.epoch += 1;
                memory.page_generations.clear();
                memory.entries.clear();
                match self.inner.disk.clear().await {
                    Ok(removed) => debug!(removed, "Invalidated all previews"),
                    Err(e) => warn!(error = %e, "Failed to clear disk cache"),
                }
            }
        }
    }

    /// Whether the memory tier holds `page` (does not touch LRU order)
    pub async fn in_memory(&self, page: usize) -> bool {
        self.inner.memory.read().await.entries.contains(&page)
    }

    pub async fn stats(&self) -> CacheStats {
        let memory = self.inner.memory.read().await;
        CacheStats {
            memory_entries: memory.entries.len(),
            memory_capacity: self.inner.capacity,
            renders: self.inner.renders.load(Ordering::Relaxed),
        }
    }
}

/// Keep the render lock until an abandoned render really ends
fn hold_until_finished<T: Send + 'static>(
    guard: OwnedMutexGuard<()>,
    handle: tokio::task::JoinHandle<T>,
) {
    tokio::spawn(async move {
        let _ = handle.await;
        drop(guard);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::types::RenderedPage;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct FakeSource {
        delay: Duration,
        renders: AtomicUsize,
        version: AtomicU64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        broken_page: AtomicBool,
        /// Only this page is slow when set
        slow_page: Option<usize>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                renders: AtomicUsize::new(0),
                version: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                broken_page: AtomicBool::new(false),
                slow_page: None,
            }
        }

        fn slow_on(page: usize, delay: Duration) -> Self {
            Self {
                slow_page: Some(page),
                ..Self::with_delay(delay)
            }
        }
    }

    impl PageSource for FakeSource {
        fn display_size(&self, _page: usize) -> (u32, u32) {
            (10, 20)
        }

        fn render_page(&self, page: usize) -> PreviewResult<RenderedPage> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            let version = self.version.load(Ordering::SeqCst);
            if self.slow_page.map_or(true, |slow| slow == page) {
                std::thread::sleep(self.delay);
            }
            self.renders.fetch_add(1, Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut warnings = Vec::new();
            if self.broken_page.load(Ordering::SeqCst) {
                warnings.push(RenderWarning::PagePlaceholder {
                    page,
                    reason: "broken".to_string(),
                });
            }
            Ok(RenderedPage {
                png: format!("page{page}-v{version}").into_bytes(),
                width: 10,
                height: 20,
                warnings,
            })
        }
    }

    fn cache_for(source: Arc<FakeSource>, root: &tempfile::TempDir) -> PageCache {
        let disk = DiskTier::for_project(root.path(), &root.path().join("project"));
        PageCache::new(source, disk, DEFAULT_CACHE_PAGES)
    }

    fn content(artifact: &PreviewArtifact) -> String {
        String::from_utf8(artifact.bitmap.load().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_repeat_requests_share_one_render() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let cache = cache_for(source.clone(), &root);

        let first = cache.get(1).await.unwrap();
        let second = cache.get(1).await.unwrap();
        assert!(first.bitmap.same_as(&second.bitmap));
        assert_eq!(source.renders.load(Ordering::SeqCst), 1);
        assert_eq!(content(&first), "page1-v0");
        assert!(cache.disk().contains(1).await);
    }

    #[tokio::test]
    async fn test_invalidation_only_touches_named_pages() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let cache = cache_for(source.clone(), &root);

        let page0 = cache.get(0).await.unwrap();
        cache.get(1).await.unwrap();

        source.version.store(1, Ordering::SeqCst);
        cache
            .invalidate(&Invalidation::Pages(PageSet::from([1])))
            .await;
        assert!(!cache.in_memory(1).await);
        assert!(!cache.disk().contains(1).await);

        assert_eq!(content(&cache.get(1).await.unwrap()), "page1-v1");
        assert!(cache.get(0).await.unwrap().bitmap.same_as(&page0.bitmap));
        assert_eq!(source.renders.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_memory_tier_is_bounded_and_disk_keeps_the_rest() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let cache = cache_for(source.clone(), &root);

        for page in 0..20 {
            cache.get(page).await.unwrap();
        }
        let stats = cache.stats().await;
        assert_eq!(stats.memory_entries, DEFAULT_CACHE_PAGES);
        assert_eq!(stats.renders, 20);
        assert!(!cache.in_memory(0).await);

        let evicted = cache.get(0).await.unwrap();
        assert!(matches!(evicted.bitmap, BitmapRef::File(_)));
        assert_eq!((evicted.width_px, evicted.height_px), (10, 20));
        assert_eq!(content(&evicted), "page0-v0");
        assert_eq!(source.renders.load(Ordering::SeqCst), 20);
        assert!(cache.in_memory(0).await);
    }

    #[tokio::test]
    async fn test_disk_tier_survives_a_new_cache() {
        let root = tempfile::tempdir().unwrap();
        let first = Arc::new(FakeSource::new());
        cache_for(first, &root).get(1).await.unwrap();

        let second = Arc::new(FakeSource::new());
        let cache = cache_for(second.clone(), &root);
        let artifact = cache.get(1).await.unwrap();
        assert_eq!(content(&artifact), "page1-v0");
        assert_eq!(second.renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_both_tiers() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let cache = cache_for(source.clone(), &root);
        cache.get(0).await.unwrap();
        cache.get(1).await.unwrap();

        cache.invalidate(&Invalidation::All).await;
        assert_eq!(cache.stats().await.memory_entries, 0);
        assert!(!cache.disk().contains(0).await);
        assert!(!cache.disk().contains(1).await);

        cache.get(0).await.unwrap();
        assert_eq!(source.renders.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_render_once() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::with_delay(Duration::from_millis(50)));
        let cache = cache_for(source.clone(), &root);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(0).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(content(&task.await.unwrap().unwrap()), "page0-v0");
        }
        assert_eq!(source.renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_render_made_stale_is_not_stored() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::with_delay(Duration::from_millis(300)));
        let cache = cache_for(source.clone(), &root);

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(0).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        source.version.store(1, Ordering::SeqCst);
        cache
            .invalidate(&Invalidation::Pages(PageSet::from([0])))
            .await;

        let stale = pending.await.unwrap().unwrap();
        assert_eq!(content(&stale), "page0-v0");
        assert!(!cache.in_memory(0).await);
        assert!(!cache.disk().contains(0).await);

        assert_eq!(content(&cache.get(0).await.unwrap()), "page0-v1");
        assert_eq!(source.renders.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_render_still_blocks_the_next_one() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::slow_on(0, Duration::from_millis(300)));
        let cache =
            cache_for(source.clone(), &root).with_render_timeout(Duration::from_millis(50));

        let err = cache.get(0).await.unwrap_err();
        assert!(matches!(err, PreviewError::Timeout(_)));
        assert!(!cache.in_memory(0).await);

        assert_eq!(content(&cache.get(1).await.unwrap()), "page1-v0");
        assert_eq!(source.renders.load(Ordering::SeqCst), 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_placeholder_render_is_not_cached() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let cache = cache_for(source.clone(), &root);

        source.broken_page.store(true, Ordering::SeqCst);
        cache.get(0).await.unwrap();
        assert!(!cache.in_memory(0).await);
        assert!(!cache.disk().contains(0).await);

        source.broken_page.store(false, Ordering::SeqCst);
        cache.get(0).await.unwrap();
        assert!(cache.in_memory(0).await);
        assert!(cache.disk().contains(0).await);
        assert_eq!(source.renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_invalidation() {
        assert!(Invalidation::Pages(PageSet::new()).is_empty());
        assert!(!Invalidation::All.is_empty());
        assert!(!Invalidation::from(PageSet::from([2])).is_empty());
    }
}
