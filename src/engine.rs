//! Fill engine
//!
//! The public façade over project state, the document session, the preview
//! cache and the export merger.
//!
//! Every mutation runs in the same order: update the in-memory state, hand a
//! snapshot to the project store, then invalidate exactly the pages the
//! mutation touched. Mutations and document swaps are serialized by one
//! async mutex; previews run concurrently with them.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::export::{self, ExportMerger, ExportReport};
use crate::preview::disk::document_fingerprint;
use crate::preview::{
    CacheStats, DiskTier, FontBook, Invalidation, OverlayCompositor, PageCache, Prefetcher,
    PreviewArtifact,
};
use crate::project::{
    FieldId, FieldPatch, JsonProjectStore, PageSet, Placement, ProjectError, ProjectResult,
    ProjectState, ProjectStore, Removal,
};
use crate::session::{self, DocumentSession, SessionInfo};

/// A placement together with what it currently shows
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub id: FieldId,
    pub placement: Placement,
    pub value: Option<String>,
    /// Pixel size of the placement's page at preview DPI
    pub display_size: (u32, u32),
}

pub struct FillEngine {
    config: EngineConfig,
    project_dir: PathBuf,
    state: Arc<RwLock<ProjectState>>,
    store: Arc<dyn ProjectStore>,
    session: Arc<DocumentSession>,
    cache: PageCache,
    prefetcher: Prefetcher,
    page_count: AtomicUsize,
    mutation: Mutex<()>,
}

impl FillEngine {
    /// Engine over `state` with nothing bound yet
    pub fn new(
        config: EngineConfig,
        project_dir: impl Into<PathBuf>,
        state: ProjectState,
        store: Arc<dyn ProjectStore>,
    ) -> Self {
        let project_dir = project_dir.into();
        let state = Arc::new(RwLock::new(state));
        let session = Arc::new(DocumentSession::new());
        let fonts = Arc::new(FontBook::discover(&config.fonts));

        let compositor = OverlayCompositor::new(
            session.clone(),
            state.clone(),
            fonts,
            config.preview.dpi,
        );
        let disk = DiskTier::for_project(&config.preview.cache_root, &project_dir);
        debug!(cache_dir = %disk.dir().display(), "Preview disk tier");
        let cache = PageCache::new(Arc::new(compositor), disk, config.preview.cache_pages);
        let prefetcher = Prefetcher::new(cache.clone());

        Self {
            config,
            project_dir,
            state,
            store,
            session,
            cache,
            prefetcher,
            page_count: AtomicUsize::new(0),
            mutation: Mutex::new(()),
        }
    }

    /// Load a project file and bind the document it names
    pub async fn open_project(config: EngineConfig, store: JsonProjectStore) -> Result<Self> {
        let loader = store.clone();
        let state = tokio::task::spawn_blocking(move || loader.load()).await??;
        let project_dir = store.project_dir();

        let engine = Self::new(config, project_dir, state, Arc::new(store));
        let document = engine.document_path();
        engine.open_document(&document).await?;
        Ok(engine)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Pages in the bound document (0 when nothing is bound)
    pub fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Acquire)
    }

    /// Copy of the current project state
    pub fn state(&self) -> ProjectState {
        self.state.read().clone()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Document named by the project state, resolved against the project directory
    fn document_path(&self) -> PathBuf {
        let document = PathBuf::from(&self.state.read().document);
        if document.is_absolute() {
            document
        } else {
            self.project_dir.join(document)
        }
    }

    /// Currently bound document, else the one the project names
    fn bound_path(&self) -> PathBuf {
        self.session.path().unwrap_or_else(|| self.document_path())
    }

    // ========================================================================
    // Document binding
    // ========================================================================

    /// Bind a document, replacing whatever was open
    pub async fn open_document(&self, path: impl AsRef<Path>) -> Result<SessionInfo> {
        let _guard = self.mutation.lock().await;
        self.rebind(path.as_ref().to_path_buf(), false).await
    }

    /// Append every page of another PDF to the bound template
    pub async fn append_document(&self, path: impl AsRef<Path>) -> Result<SessionInfo> {
        let _guard = self.mutation.lock().await;
        let extra = path.as_ref().to_path_buf();
        let template = self.bound_path();
        info!(template = %template.display(), extra = %extra.display(), "Appending document");

        let session = self.session.clone();
        let target = template.clone();
        let merged = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut base = export::pdf::load(&target)?;
            let extra = export::pdf::load(&extra)?;
            let added = export::pdf::append_document(&mut base, extra)?;

            // The handle must be gone before the file is replaced
            session.close();
            replace_file(&target, |file| {
                let mut writer = BufWriter::new(file);
                base.save_to(&mut writer)?;
                writer.flush()?;
                Ok(())
            })?;
            Ok(added)
        })
        .await?;

        match merged {
            Ok(added) => {
                debug!(added, "Appended pages");
                self.rebind(template, true).await
            }
            Err(e) => {
                if !self.session.is_open() {
                    if let Err(reopen) = self.rebind(template, true).await {
                        warn!(error = %reopen, "Failed to reopen template after append failure");
                    }
                }
                Err(e)
            }
        }
    }

    /// Replace the bound template file with another PDF
    pub async fn replace_document(&self, path: impl AsRef<Path>) -> Result<SessionInfo> {
        let _guard = self.mutation.lock().await;
        let source = path.as_ref().to_path_buf();
        let template = self.bound_path();
        info!(template = %template.display(), source = %source.display(), "Replacing document");

        let session = self.session.clone();
        let target = template.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            session::check_pdf_magic(&source).map_err(|reason| EngineError::DocumentOpen {
                path: source.clone(),
                reason,
            })?;

            session.close();
            replace_file(&target, |file| {
                let mut input = File::open(&source)?;
                std::io::copy(&mut input, file)?;
                Ok(())
            })
        })
        .await??;

        self.rebind(template, true).await
    }

    /// Reopen the session on `path` and pull stray placements onto existing
    /// pages. Cached previews are dropped when `changed` is set or the
    /// document fingerprint differs from the one the disk tier was built from.
    async fn rebind(&self, path: PathBuf, changed: bool) -> Result<SessionInfo> {
        let session = self.session.clone();
        let dpi = self.config.preview.dpi;
        let (opened, fingerprint) = tokio::task::spawn_blocking(move || {
            let opened = session.open(&path);
            let fingerprint = document_fingerprint(&path, dpi).ok();
            (opened, fingerprint)
        })
        .await?;

        let info = match opened {
            Ok(info) => info,
            Err(e) => {
                self.page_count.store(0, Ordering::Release);
                self.cache.invalidate(&Invalidation::All).await;
                return Err(e.into());
            }
        };
        self.page_count.store(info.page_count, Ordering::Release);

        let moved = self.state.write().clamp_pages(info.page_count);
        let persisted = if moved > 0 {
            warn!(moved, page_count = info.page_count, "Moved placements onto the last page");
            self.persist_snapshot().await
        } else {
            Ok(())
        };

        let disk = self.cache.disk();
        let unchanged = !changed
            && moved == 0
            && fingerprint.is_some()
            && disk.fingerprint().await == fingerprint;
        if unchanged {
            debug!("Document unchanged, keeping cached previews");
        } else {
            self.cache.invalidate(&Invalidation::All).await;
            if let Some(fingerprint) = &fingerprint {
                if let Err(e) = disk.set_fingerprint(fingerprint).await {
                    warn!(error = %e, "Failed to record document fingerprint");
                }
            }
        }
        persisted?;

        info!(path = %info.path.display(), page_count = info.page_count, "Document bound");
        Ok(info)
    }

    /// Release the document handle
    pub async fn close(&self) {
        let _guard = self.mutation.lock().await;
        let session = self.session.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || session.close()).await {
            warn!(error = %e, "Failed to close document");
        }
        self.page_count.store(0, Ordering::Release);
    }

    // ========================================================================
    // Preview
    // ========================================================================

    /// Preview of `page`, clamped into the document; neighbours are warmed
    /// in the background
    pub async fn get_preview(&self, page: usize) -> Result<PreviewArtifact> {
        let page_count = self.page_count();
        if page_count == 0 {
            return Err(EngineError::NoDocument);
        }
        let page = page.min(page_count - 1);

        let artifact = self.cache.get(page).await?;
        if self.config.preview.prefetch {
            self.prefetcher.warm_around(page, page_count);
        }
        Ok(artifact)
    }

    /// Preview of the page holding a field id, or the first page showing a
    /// tag; page 0 when neither is known
    pub async fn preview_for(&self, tag_or_id: &str) -> Result<PreviewArtifact> {
        let page = {
            let state = self.state.read();
            state
                .placement(&FieldId::from(tag_or_id))
                .map(|placement| placement.page)
                .or_else(|| state.pages_for_tag(tag_or_id.trim()).first().copied())
                .unwrap_or(0)
        };
        self.get_preview(page).await
    }

    pub async fn field_info(&self, id: &FieldId) -> Result<FieldInfo> {
        let (placement, value) = {
            let state = self.state.read();
            let placement = state
                .placement(id)
                .cloned()
                .ok_or_else(|| EngineError::FieldNotFound(id.to_string()))?;
            let value = state.value(&placement.tag).map(str::to_string);
            (placement, value)
        };

        let session = self.session.clone();
        let dpi = self.config.preview.dpi;
        let page = placement.page;
        let display_size =
            tokio::task::spawn_blocking(move || session.display_size(page, dpi)).await?;

        Ok(FieldInfo {
            id: id.clone(),
            placement,
            value,
            display_size,
        })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Apply `f` to the state, persist, then invalidate what it reports
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProjectState, usize) -> ProjectResult<(T, Invalidation)>,
    {
        let _guard = self.mutation.lock().await;
        let page_count = self.page_count();

        let (output, scope) = {
            let mut state = self.state.write();
            f(&mut state, page_count)?
        };

        let persisted = self.persist_snapshot().await;
        self.cache.invalidate(&scope).await;
        persisted?;
        Ok(output)
    }

    async fn persist_snapshot(&self) -> Result<()> {
        let snapshot = self.state.read().clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.persist(&snapshot)).await??;
        Ok(())
    }

    /// Create a placement for `tag`; the tag is registered if new
    pub async fn place_field(
        &self,
        tag: &str,
        page: usize,
        x: f32,
        y: f32,
        font_size: f32,
    ) -> Result<FieldId> {
        if self.page_count() == 0 {
            return Err(EngineError::NoDocument);
        }
        self.mutate(|state, page_count| {
            let id = state.add_placement(tag, page, x, y, font_size, page_count)?;
            Ok((id, Invalidation::Pages(PageSet::from([page]))))
        })
        .await
    }

    pub async fn move_field(&self, id: &FieldId, x: f32, y: f32) -> Result<()> {
        self.mutate(|state, _| {
            let pages = state.move_placement(id, x, y)?;
            Ok(((), pages.into()))
        })
        .await
    }

    /// Patch a placement's style, position, page or tag
    pub async fn update_field_style(&self, id: &FieldId, patch: FieldPatch) -> Result<()> {
        self.mutate(|state, page_count| {
            let pages = state.patch_placement(id, &patch, page_count)?;
            Ok(((), pages.into()))
        })
        .await
    }

    /// Set the value of `tag`; every placement bound to it is refreshed
    pub async fn set_value(&self, tag: &str, text: &str) -> Result<()> {
        self.mutate(|state, _| {
            if tag.trim().is_empty() {
                return Err(ProjectError::MissingTag);
            }
            let pages = state.set_value(tag, text);
            Ok(((), pages.into()))
        })
        .await
    }

    /// Delete placements; tags left without placements lose their value too
    pub async fn delete_fields(&self, ids: &[FieldId]) -> Result<Removal> {
        self.mutate(|state, _| {
            let removal = state.remove_placements(ids);
            let scope = Invalidation::Pages(removal.pages.clone());
            Ok((removal, scope))
        })
        .await
    }

    /// Delete tags with their values and every placement bound to them
    pub async fn delete_tags(&self, tags: &[String]) -> Result<PageSet> {
        self.mutate(|state, _| {
            let pages = state.remove_tags(tags);
            Ok((pages.clone(), pages.into()))
        })
        .await
    }

    /// Replace tags, values and placements wholesale
    pub async fn replace_payload(
        &self,
        tags: Vec<String>,
        values: BTreeMap<String, String>,
        placements: BTreeMap<FieldId, Placement>,
    ) -> Result<()> {
        self.mutate(|state, page_count| {
            state.replace_payload(tags, values, placements);
            if page_count > 0 {
                state.clamp_pages(page_count);
            }
            Ok(((), Invalidation::All))
        })
        .await
    }

    /// Persist the current state without changing it
    pub async fn save(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.persist_snapshot().await
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Write the filled document into the export directory
    pub async fn export(&self) -> Result<ExportReport> {
        let _guard = self.mutation.lock().await;
        let source = self.session.path().ok_or(EngineError::NoDocument)?;
        let export_dir = self.project_dir.join(&self.config.export.dir_name);
        let snapshot = self.state.read().clone();
        let merger = ExportMerger::new(self.config.preview.dpi);

        let report =
            tokio::task::spawn_blocking(move || merger.export(&source, &snapshot, &export_dir))
                .await??;
        Ok(report)
    }
}

/// Replace `target` with what `write` produces, via a temporary file in the
/// same directory
fn replace_file<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = target
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| EngineError::Io(e.error))?;
    Ok(())
}
