//! Raster faces for preview text
//!
//! One Latin face and one CJK-capable face, each taken from configuration or
//! from the first well-known system location that loads. A bundled DejaVu Sans
//! backs the Latin face when neither is available.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use tracing::{debug, warn};

use crate::config::FontConfig;
use crate::text::Script;

const LATIN_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Default Latin face compiled into the binary
const BUNDLED_LATIN: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

const CJK_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    "/usr/share/fonts/truetype/fonts-japanese-gothic.ttf",
    "/System/Library/Fonts/Hiragino Sans GB.ttc",
    "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
    "C:\\Windows\\Fonts\\msgothic.ttc",
    "C:\\Windows\\Fonts\\YuGothM.ttc",
];

/// Loaded faces shared by every render
#[derive(Clone, Default)]
pub struct FontBook {
    latin: Option<Arc<FontVec>>,
    cjk: Option<Arc<FontVec>>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("latin", &self.latin.is_some())
            .field("cjk", &self.cjk.is_some())
            .finish()
    }
}

impl FontBook {
    /// Load configured faces, falling back to system locations and then to
    /// the bundled Latin face
    pub fn discover(config: &FontConfig) -> Self {
        let latin = load_first(config.latin.as_deref(), LATIN_CANDIDATES).or_else(bundled_latin);
        let cjk = load_first(config.cjk.as_deref(), CJK_CANDIDATES);

        if cjk.is_none() {
            debug!("No CJK font found; CJK text falls back to the Latin face");
        }

        Self { latin, cjk }
    }

    /// Only the bundled Latin face
    pub fn bundled() -> Self {
        Self {
            latin: bundled_latin(),
            cjk: None,
        }
    }

    /// Face for a script; CJK text uses the Latin face when no CJK face exists
    pub fn face(&self, script: Script) -> Option<&FontVec> {
        match script {
            Script::Latin => self.latin.as_deref(),
            Script::Cjk => self.cjk.as_deref().or(self.latin.as_deref()),
        }
    }
}

fn load_first(configured: Option<&Path>, candidates: &[&str]) -> Option<Arc<FontVec>> {
    if let Some(path) = configured {
        match load_face(path) {
            Some(face) => return Some(face),
            None => warn!(path = %path.display(), "Configured font could not be loaded"),
        }
    }
    candidates
        .iter()
        .map(PathBuf::from)
        .filter(|path| path.is_file())
        .find_map(|path| load_face(&path))
}

fn bundled_latin() -> Option<Arc<FontVec>> {
    match FontVec::try_from_vec(BUNDLED_LATIN.to_vec()) {
        Ok(face) => {
            debug!("Using bundled Latin font");
            Some(Arc::new(face))
        }
        Err(e) => {
            warn!(error = %e, "Bundled font rejected; preview text will not be drawn");
            None
        }
    }
}

fn load_face(path: &Path) -> Option<Arc<FontVec>> {
    let data = std::fs::read(path).ok()?;
    match FontVec::try_from_vec_and_index(data, 0) {
        Ok(face) => {
            debug!(path = %path.display(), "Loaded font");
            Some(Arc::new(face))
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Font rejected");
            None
        }
    }
}

/// A face resolved at one pixel size
#[derive(Clone, Copy)]
pub struct SizedFace<'a> {
    pub font: &'a FontVec,
    pub scale: PxScale,
    /// Baseline offset from the top of the line box, in pixels
    pub ascent: f32,
}

impl SizedFace<'_> {
    /// Horizontal advance of one character
    pub fn advance(&self, c: char) -> f32 {
        let scaled = self.font.as_scaled(self.scale);
        scaled.h_advance(self.font.glyph_id(c))
    }
}

/// Faces resolved per (script, size) for the duration of one render
pub struct SizedFaces<'a> {
    book: &'a FontBook,
    memo: HashMap<(Script, u32), SizedFace<'a>>,
}

impl<'a> SizedFaces<'a> {
    pub fn new(book: &'a FontBook) -> Self {
        Self {
            book,
            memo: HashMap::new(),
        }
    }

    /// Face for `script` whose em square is `size_px` pixels tall
    pub fn get(&mut self, script: Script, size_px: f32) -> Option<SizedFace<'a>> {
        let key = (script, size_px.to_bits());
        if let Some(face) = self.memo.get(&key) {
            return Some(*face);
        }

        let font = self.book.face(script)?;
        let units_per_em = font.units_per_em().unwrap_or(1000.0);
        let scale = PxScale::from(size_px * font.height_unscaled() / units_per_em);
        let ascent = font.as_scaled(scale).ascent();

        let face = SizedFace {
            font,
            scale,
            ascent,
        };
        self.memo.insert(key, face);
        Some(face)
    }

    /// Number of distinct sizes resolved so far
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_fonts() -> FontConfig {
        FontConfig {
            latin: None,
            cjk: None,
        }
    }

    fn bundled_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/DejaVuSans.ttf")
    }

    #[test]
    fn test_empty_book_has_no_faces() {
        let book = FontBook::default();
        assert!(book.face(Script::Latin).is_none());
        assert!(book.face(Script::Cjk).is_none());
        assert!(SizedFaces::new(&book).get(Script::Latin, 12.0).is_none());
    }

    #[test]
    fn test_latin_face_is_always_available() {
        assert!(FontBook::bundled().face(Script::Latin).is_some());
        assert!(FontBook::discover(&no_fonts()).face(Script::Latin).is_some());
    }

    #[test]
    fn test_bad_configured_path_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();

        let configured = FontBook::discover(&FontConfig {
            latin: Some(bogus),
            cjk: None,
        });
        assert!(configured.face(Script::Latin).is_some());
    }

    #[test]
    fn test_cjk_text_selects_cjk_face() {
        let latin = bundled_latin().unwrap();
        let cjk = load_face(&bundled_path()).unwrap();

        let book = FontBook {
            latin: Some(latin.clone()),
            cjk: Some(cjk.clone()),
        };
        let mut faces = SizedFaces::new(&book);
        let chosen = faces.get(Script::Cjk, 20.0).unwrap();
        assert!(std::ptr::eq(chosen.font, cjk.as_ref()));
        let chosen = faces.get(Script::Latin, 20.0).unwrap();
        assert!(std::ptr::eq(chosen.font, latin.as_ref()));

        // Without a CJK face the Latin one is used
        let book = FontBook {
            latin: Some(latin.clone()),
            cjk: None,
        };
        let chosen = SizedFaces::new(&book).get(Script::Cjk, 20.0).unwrap();
        assert!(std::ptr::eq(chosen.font, latin.as_ref()));
    }

    #[test]
    fn test_sizes_are_memoized() {
        let book = FontBook::bundled();
        let mut faces = SizedFaces::new(&book);
        let small = faces.get(Script::Latin, 12.0).unwrap();
        let again = faces.get(Script::Latin, 12.0).unwrap();
        let large = faces.get(Script::Latin, 24.0).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(small.scale, again.scale);
        assert!(large.ascent > small.ascent);
        assert!(small.advance('W') > 0.0);
    }
}
