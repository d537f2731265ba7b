//! Disk tier of the preview cache
//!
//! PNG files under `<cache_root>/<namespace>/page_NNNN.png`, where the
//! namespace is derived from the project directory so two projects never
//! share files. A `document.fingerprint` file records which template and DPI
//! the stored pages were rendered from.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use super::error::{PreviewError, PreviewResult};

const NAMESPACE_LEN: usize = 16;
const FINGERPRINT_FILE: &str = "document.fingerprint";

#[derive(Debug, Clone)]
pub struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    /// Disk tier for the project rooted at `project_dir`
    pub fn for_project(cache_root: &Path, project_dir: &Path) -> Self {
        Self {
            dir: cache_root.join(namespace(project_dir)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_path(&self, page: usize) -> PathBuf {
        self.dir.join(format!("page_{:04}.png", page))
    }

    pub async fn contains(&self, page: usize) -> bool {
        tokio::fs::try_exists(self.page_path(page))
            .await
            .unwrap_or(false)
    }

    /// Write a page, replacing any previous file atomically
    pub async fn write(&self, page: usize, png: &[u8]) -> PreviewResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PreviewError::CacheError(e.to_string()))?;

        let path = self.page_path(page);
        let partial = path.with_extension("png.part");
        tokio::fs::write(&partial, png)
            .await
            .map_err(|e| PreviewError::CacheError(e.to_string()))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| PreviewError::CacheError(e.to_string()))?;
        Ok(path)
    }

    /// Delete one page; missing files are fine
    pub async fn remove(&self, page: usize) -> PreviewResult<()> {
        match tokio::fs::remove_file(self.page_path(page)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PreviewError::CacheError(e.to_string())),
        }
    }

    /// Fingerprint recorded with the stored pages, if any
    pub async fn fingerprint(&self) -> Option<String> {
        tokio::fs::read_to_string(self.dir.join(FINGERPRINT_FILE))
            .await
            .ok()
            .map(|s| s.trim().to_string())
    }

    pub async fn set_fingerprint(&self, fingerprint: &str) -> PreviewResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PreviewError::CacheError(e.to_string()))?;
        tokio::fs::write(self.dir.join(FINGERPRINT_FILE), fingerprint)
            .await
            .map_err(|e| PreviewError::CacheError(e.to_string()))
    }

    /// Delete every page file of this project; returns how many were removed
    pub async fn clear(&self) -> PreviewResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PreviewError::CacheError(e.to_string())),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PreviewError::CacheError(e.to_string()))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("page_") && name.ends_with(".png")) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PreviewError::CacheError(e.to_string())),
            }
        }
        Ok(removed)
    }
}

/// Stable per-project directory name
pub fn namespace(project_dir: &Path) -> String {
    let resolved =
        std::fs::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(resolved.to_string_lossy().as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(NAMESPACE_LEN);
    digest
}

/// Identity of a rendered document: resolved path, size, mtime and DPI
pub fn document_fingerprint(path: &Path, dpi: f32) -> std::io::Result<String> {
    let resolved = std::fs::canonicalize(path)?;
    let meta = std::fs::metadata(&resolved)?;
    let modified = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(resolved.to_string_lossy().as_bytes());
    hasher.update(meta.len().to_le_bytes());
    hasher.update(modified.to_le_bytes());
    hasher.update(dpi.to_bits().to_le_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_is_stable_and_distinct() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_eq!(namespace(a.path()), namespace(a.path()));
        assert_ne!(namespace(a.path()), namespace(b.path()));
        assert_eq!(namespace(a.path()).len(), NAMESPACE_LEN);
    }

    #[test]
    fn test_page_file_names() {
        let tier = DiskTier::for_project(Path::new("/cache"), Path::new("/nonexistent/project"));
        let path = tier.page_path(7);
        assert_eq!(path.file_name().unwrap(), "page_0007.png");
        assert!(path.starts_with("/cache"));
    }

    #[tokio::test]
    async fn test_write_remove_clear() {
        let root = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let tier = DiskTier::for_project(root.path(), project.path());

        assert!(!tier.contains(0).await);
        assert_eq!(tier.clear().await.unwrap(), 0);

        let path = tier.write(0, b"png-0").await.unwrap();
        tier.write(1, b"png-1").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"png-0");
        assert!(tier.contains(0).await);

        tier.remove(0).await.unwrap();
        tier.remove(0).await.unwrap();
        assert!(!tier.contains(0).await);

        assert_eq!(tier.clear().await.unwrap(), 1);
        assert!(!tier.contains(1).await);
    }

    #[tokio::test]
    async fn test_fingerprint_survives_clear() {
        let root = tempfile::tempdir().unwrap();
        let tier = DiskTier::for_project(root.path(), root.path());
        assert_eq!(tier.fingerprint().await, None);

        tier.set_fingerprint("abc").await.unwrap();
        tier.write(0, b"png").await.unwrap();
        tier.clear().await.unwrap();
        assert_eq!(tier.fingerprint().await.as_deref(), Some("abc"));
    }

    #[test]
    fn test_document_fingerprint_tracks_content_and_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4 one").unwrap();

        let first = document_fingerprint(&path, 150.0).unwrap();
        assert_eq!(first, document_fingerprint(&path, 150.0).unwrap());
        assert_ne!(first, document_fingerprint(&path, 72.0).unwrap());

        std::fs::write(&path, b"%PDF-1.4 longer").unwrap();
        assert_ne!(first, document_fingerprint(&path, 150.0).unwrap());
        assert!(document_fingerprint(&dir.path().join("missing.pdf"), 150.0).is_err());
    }
}
