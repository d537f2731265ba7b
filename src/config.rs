//! Configuration management for the Input Studio engine

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::geometry::PREVIEW_DPI;

/// Memory tier capacity (pages)
pub const DEFAULT_CACHE_PAGES: usize = 12;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub preview: PreviewConfig,
    pub fonts: FontConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    /// Root directory of the disk tier; each project gets a hashed subdirectory
    pub cache_root: PathBuf,
    /// Preview raster resolution, also the placement coordinate system
    pub dpi: f32,
    /// Memory tier capacity
    pub cache_pages: usize,
    /// Warm neighbouring pages after each preview request
    pub prefetch: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FontConfig {
    /// Explicit Latin face; system locations are searched when unset
    pub latin: Option<PathBuf>,
    /// Explicit CJK-capable face; system locations are searched when unset
    pub cjk: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Export directory, relative to the project directory
    pub dir_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            preview: PreviewConfig {
                cache_root: env::temp_dir().join("input-studio").join("cache_pages"),
                dpi: PREVIEW_DPI,
                cache_pages: DEFAULT_CACHE_PAGES,
                prefetch: true,
            },
            fonts: FontConfig {
                latin: None,
                cjk: None,
            },
            export: ExportConfig {
                dir_name: "exports".to_string(),
            },
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = EngineConfig::default();
        Ok(EngineConfig {
            preview: PreviewConfig {
                cache_root: env::var("INPUT_STUDIO_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.preview.cache_root),
                dpi: env::var("INPUT_STUDIO_PREVIEW_DPI")
                    .ok()
                    .and_then(|v| v.parse::<f32>().ok())
                    .filter(|dpi| dpi.is_finite() && *dpi > 0.0)
                    .unwrap_or(PREVIEW_DPI),
                cache_pages: env::var("INPUT_STUDIO_CACHE_PAGES")
                    .unwrap_or_else(|_| DEFAULT_CACHE_PAGES.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_CACHE_PAGES),
                prefetch: match env::var("INPUT_STUDIO_PREFETCH")
                    .unwrap_or_else(|_| "true".to_string())
                    .to_lowercase()
                    .as_str()
                {
                    "0" | "false" | "off" | "no" => false,
                    _ => true,
                },
            },
            fonts: FontConfig {
                latin: env::var("INPUT_STUDIO_LATIN_FONT").ok().map(PathBuf::from),
                cjk: env::var("INPUT_STUDIO_CJK_FONT").ok().map(PathBuf::from),
            },
            export: ExportConfig {
                dir_name: env::var("INPUT_STUDIO_EXPORT_DIR")
                    .unwrap_or(defaults.export.dir_name),
            },
        })
    }

    /// Same configuration with the disk tier rooted at `root`
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.preview.cache_root = root.into();
        self
    }

    /// Same configuration with prefetching switched on or off
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.preview.prefetch = prefetch;
        self
    }
}
