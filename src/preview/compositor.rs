//! Overlay compositor
//!
//! Renders a page's raw content at preview DPI and draws every placement on
//! that page whose tag has a non-blank value. Per-placement failures are
//! reported as warnings; only document-level errors fail the render.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::project::{FieldId, Placement, ProjectState, Rgb};
use crate::session::{DocumentSession, SessionError, SessionResult};
use crate::text::FieldText;

use super::error::{DrawError, PreviewError, PreviewResult};
use super::fonts::{FontBook, SizedFaces};
use super::types::{PageRaster, PageSource, RenderWarning, RenderedPage};

const PLACEHOLDER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A placement with its resolved text, copied out of the project state
struct OverlayItem {
    id: FieldId,
    placement: Placement,
    text: FieldText,
}

/// Composited page before encoding
pub struct Composite {
    pub image: RgbaImage,
    pub warnings: Vec<RenderWarning>,
}

impl PageRaster for DocumentSession {
    fn display_size(&self, page: usize, dpi: f32) -> (u32, u32) {
        DocumentSession::display_size(self, page, dpi)
    }

    fn raw_page_bitmap(&self, page: usize, dpi: f32) -> SessionResult<RgbaImage> {
        DocumentSession::raw_page_bitmap(self, page, dpi)
    }
}

pub struct OverlayCompositor {
    raster: Arc<dyn PageRaster>,
    state: Arc<RwLock<ProjectState>>,
    fonts: Arc<FontBook>,
    dpi: f32,
}

impl OverlayCompositor {
    pub fn new(
        raster: Arc<dyn PageRaster>,
        state: Arc<RwLock<ProjectState>>,
        fonts: Arc<FontBook>,
        dpi: f32,
    ) -> Self {
        Self {
            raster,
            state,
            fonts,
            dpi,
        }
    }

    /// Page content plus overlay, unencoded
    pub fn compose(&self, page: usize) -> PreviewResult<Composite> {
        let mut warnings = Vec::new();

        let mut image = match self.raster.raw_page_bitmap(page, self.dpi) {
            Ok(bitmap) => bitmap,
            Err(SessionError::Render { reason, .. }) => {
                warn!(page, %reason, "Page failed to render, using blank placeholder");
                let (width, height) = self.raster.display_size(page, self.dpi);
                warnings.push(RenderWarning::PagePlaceholder { page, reason });
                RgbaImage::from_pixel(width, height, PLACEHOLDER)
            }
            Err(e) => return Err(e.into()),
        };

        let items = self.overlay_items(page);
        let mut faces = SizedFaces::new(&self.fonts);

        for item in &items {
            if let Err(e) = item.placement.check_drawable() {
                warn!(field = %item.id, error = %e, "Skipping placement");
                warnings.push(RenderWarning::PlacementSkipped {
                    field: item.id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }

            let color = match item.placement.rgb() {
                Ok(color) => color,
                Err(e) => {
                    warn!(field = %item.id, error = %e, "Using default text color");
                    warnings.push(RenderWarning::ColorFallback {
                        field: item.id.clone(),
                        color: item.placement.color.clone(),
                    });
                    Rgb::fallback()
                }
            };

            let drawn = draw_placement(&mut image, &item.placement, &item.text, color, &mut faces);
            if let Err(e) = drawn {
                warn!(field = %item.id, error = %e, "Skipping placement");
                warnings.push(RenderWarning::PlacementSkipped {
                    field: item.id.clone(),
                    reason: e.to_string(),
                });
            }
        }

        debug!(page, drawn = items.len(), faces = faces.len(), "Composited page");
        Ok(Composite { image, warnings })
    }

    /// Snapshot the drawable placements of `page` so no lock is held while drawing
    fn overlay_items(&self, page: usize) -> Vec<OverlayItem> {
        let state = self.state.read();
        state
            .placements_on(page)
            .filter_map(|(id, placement)| {
                let text = FieldText::parse(state.value(&placement.tag)?)?;
                Some(OverlayItem {
                    id: id.clone(),
                    placement: placement.clone(),
                    text,
                })
            })
            .collect()
    }
}

impl PageSource for OverlayCompositor {
    fn display_size(&self, page: usize) -> (u32, u32) {
        self.raster.display_size(page, self.dpi)
    }

    fn render_page(&self, page: usize) -> PreviewResult<RenderedPage> {
        let Composite { image, warnings } = self.compose(page)?;
        let (width, height) = image.dimensions();
        let png = encode_png(image)?;
        Ok(RenderedPage {
            png,
            width,
            height,
            warnings,
        })
    }
}

/// Draw one placement's lines, top line baseline at `placement.y`
fn draw_placement(
    canvas: &mut RgbaImage,
    placement: &Placement,
    text: &FieldText,
    color: Rgb,
    faces: &mut SizedFaces<'_>,
) -> Result<(), DrawError> {
    let face = faces
        .get(text.script, placement.font_size)
        .ok_or(DrawError::NoFont(text.script))?;
    let pixel = Rgba([color.r, color.g, color.b, 255]);
    let advance = placement.line_advance();

    for (i, line) in text.lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline = placement.y + advance * i as f32;
        let top = (baseline - face.ascent).round() as i32;

        if placement.letter_spacing == 0.0 {
            draw_text_mut(
                canvas,
                pixel,
                placement.x.round() as i32,
                top,
                face.scale,
                face.font,
                line,
            );
            continue;
        }

        let mut pen = placement.x;
        let mut buf = [0u8; 4];
        for c in line.chars() {
            draw_text_mut(
                canvas,
                pixel,
                pen.round() as i32,
                top,
                face.scale,
                face.font,
                c.encode_utf8(&mut buf),
            );
            pen += face.advance(c) + placement.letter_spacing;
        }
    }

    Ok(())
}

fn encode_png(image: RgbaImage) -> PreviewResult<Vec<u8>> {
    let mut output = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| PreviewError::ImageError(e.to_string()))?;
    Ok(output)
}
