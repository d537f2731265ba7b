//! Export merger
//!
//! Stamps every page of the template with its placements as real PDF text
//! and writes the result atomically into the export directory.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use lopdf::{Document, ObjectId};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::project::ProjectState;
use crate::text::FieldText;

use super::error::{ExportError, ExportResult, ExportWarning};
use super::overlay::{build_overlay, OverlayItem, PageOverlay, CJK_FONT, LATIN_FONT};
use super::pdf;

/// Outcome of a successful export
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output_path: PathBuf,
    pub pages: usize,
    pub warnings: Vec<ExportWarning>,
}

/// Font objects shared by every stamped page, created on first use
#[derive(Default)]
struct SharedFonts {
    latin: Option<ObjectId>,
    cjk: Option<ObjectId>,
}

impl SharedFonts {
    fn for_overlay(
        &mut self,
        doc: &mut Document,
        overlay: &PageOverlay,
    ) -> Vec<(&'static str, ObjectId)> {
        let mut fonts = Vec::with_capacity(2);
        if overlay.uses_latin {
            let id = *self.latin.get_or_insert_with(|| pdf::add_latin_font(doc));
            fonts.push((LATIN_FONT, id));
        }
        if overlay.uses_cjk {
            let id = *self.cjk.get_or_insert_with(|| pdf::add_cjk_font(doc));
            fonts.push((CJK_FONT, id));
        }
        fonts
    }
}

pub struct ExportMerger {
    dpi: f32,
}

impl ExportMerger {
    pub fn new(dpi: f32) -> Self {
        Self { dpi }
    }

    /// Stamp `doc` in place; per-placement and per-page problems become warnings
    pub fn stamp(&self, doc: &mut Document, state: &ProjectState) -> Vec<ExportWarning> {
        let mut warnings = Vec::new();
        let mut fonts = SharedFonts::default();
        let pages = pdf::page_ids(doc);

        for (index, page_id) in pages.iter().copied().enumerate() {
            let items: Vec<OverlayItem<'_>> = state
                .placements_on(index)
                .filter_map(|(id, placement)| {
                    let text = FieldText::parse(state.value(&placement.tag)?)?;
                    Some(OverlayItem {
                        id,
                        placement,
                        text,
                    })
                })
                .collect();
            if items.is_empty() {
                continue;
            }

            let page_box = pdf::page_box(doc, page_id);
            let mut overlay = build_overlay(index, &items, &page_box, self.dpi);
            warnings.append(&mut overlay.warnings);
            if overlay.content.is_empty() {
                continue;
            }

            let page_fonts = fonts.for_overlay(doc, &overlay);
            let attached = pdf::register_fonts(doc, page_id, &page_fonts)
                .and_then(|_| pdf::append_overlay(doc, page_id, overlay.content.as_bytes()));
            if let Err(e) = attached {
                warn!(page = index, error = %e, "Could not attach overlay, page left unchanged");
                warnings.push(ExportWarning::PageUnchanged {
                    page: index,
                    reason: e.to_string(),
                });
            }
        }

        for (id, placement) in &state.placements {
            if placement.page < pages.len() {
                continue;
            }
            let visible = state
                .value(&placement.tag)
                .and_then(FieldText::parse)
                .is_some();
            if visible {
                warnings.push(ExportWarning::PlacementSkipped {
                    field: id.clone(),
                    page: placement.page,
                    reason: format!("document has {} pages", pages.len()),
                });
            }
        }

        warnings
    }

    /// Export `source` filled from `state` into `export_dir`.
    ///
    /// The document is written to a temporary file in `export_dir` first, so
    /// the final path only ever holds a complete file.
    pub fn export(
        &self,
        source: &Path,
        state: &ProjectState,
        export_dir: &Path,
    ) -> ExportResult<ExportReport> {
        info!(source = %source.display(), "Exporting filled document");

        let mut doc = pdf::load(source)?;
        let warnings = self.stamp(&mut doc, state);
        let pages = doc.get_pages().len();

        let destination_error = |path: &Path, reason: String| ExportError::Destination {
            path: path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(export_dir)
            .map_err(|e| destination_error(export_dir, e.to_string()))?;
        let mut temp = NamedTempFile::new_in(export_dir)
            .map_err(|e| destination_error(export_dir, e.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            doc.save_to(&mut writer)
                .map_err(|e| destination_error(export_dir, e.to_string()))?;
            writer
                .flush()
                .map_err(|e| destination_error(export_dir, e.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| destination_error(export_dir, e.to_string()))?;

        let output_path = output_path(export_dir, Local::now());
        temp.persist(&output_path)
            .map_err(|e| destination_error(&output_path, e.error.to_string()))?;

        info!(
            output = %output_path.display(),
            pages,
            warnings = warnings.len(),
            "Export complete"
        );

        Ok(ExportReport {
            output_path,
            pages,
            warnings,
        })
    }
}

/// `filled-<YYYYmmdd-HHMMSS>.pdf`, suffixed when a file of that name exists
fn output_path(export_dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = format!("filled-{}", now.format("%Y%m%d-%H%M%S"));
    let mut candidate = export_dir.join(format!("{stem}.pdf"));
    let mut n = 2;
    while candidate.exists() {
        candidate = export_dir.join(format!("{stem}-{n}.pdf"));
        n += 1;
    }
    candidate
}
