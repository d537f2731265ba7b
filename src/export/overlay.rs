//! Vector text overlay for one exported page
//!
//! Produces the PDF operators that draw every drawable placement of a page.
//! Latin text uses the standard Helvetica face with WinAnsi encoding; text
//! containing CJK codepoints uses a predefined-CMap Type0 font and UCS-2.

use std::fmt::Write as _;

use tracing::warn;

use crate::geometry::{px_to_pt, PageBox, PagePoint};
use crate::project::{FieldId, Placement, Rgb};
use crate::text::{FieldText, Script};

use super::error::ExportWarning;

/// Resource name of the Latin font
pub const LATIN_FONT: &str = "ISLatin";
/// Resource name of the CJK font
pub const CJK_FONT: &str = "ISCjk";

/// Base font of the CJK Type0 font
pub const CJK_BASE_FONT: &str = "HeiseiKakuGo-W5";
/// Predefined CMap for UCS-2 code units
pub const CJK_ENCODING: &str = "UniJIS-UCS2-H";

const REPLACEMENT: char = '?';

/// One placement with its prepared text
pub struct OverlayItem<'a> {
    pub id: &'a FieldId,
    pub placement: &'a Placement,
    pub text: FieldText,
}

/// Operators for one page plus what they need
#[derive(Debug, Default)]
pub struct PageOverlay {
    pub content: String,
    pub uses_latin: bool,
    pub uses_cjk: bool,
    pub warnings: Vec<ExportWarning>,
}

/// Build the overlay content for `page`.
///
/// Each placement becomes one `BT … ET` block; `Tc` and `TL` are reset per
/// block because text state outlives `ET`.
pub fn build_overlay(
    page: usize,
    items: &[OverlayItem<'_>],
    page_box: &PageBox,
    dpi: f32,
) -> PageOverlay {
    let mut overlay = PageOverlay::default();

    for item in items {
        let placement = item.placement;

        if let Err(e) = placement.check_drawable() {
            warn!(field = %item.id, page, error = %e, "Skipping placement in export");
            overlay.warnings.push(ExportWarning::PlacementSkipped {
                field: item.id.clone(),
                page,
                reason: e.to_string(),
            });
            continue;
        }

        let color = match placement.rgb() {
            Ok(color) => color,
            Err(e) => {
                warn!(field = %item.id, error = %e, "Using default text color in export");
                overlay.warnings.push(ExportWarning::ColorFallback {
                    field: item.id.clone(),
                    color: placement.color.clone(),
                });
                Rgb::fallback()
            }
        };

        let font = match item.text.script {
            Script::Latin => {
                overlay.uses_latin = true;
                LATIN_FONT
            }
            Script::Cjk => {
                overlay.uses_cjk = true;
                CJK_FONT
            }
        };

        let origin = PagePoint::from_preview(placement.x, placement.y, page_box, dpi);
        let [r, g, b] = color.unit();
        let content = &mut overlay.content;

        content.push_str("BT\n");
        let _ = writeln!(content, "/{} {} Tf", font, num(px_to_pt(placement.font_size, dpi)));
        let _ = writeln!(content, "{r:.3} {g:.3} {b:.3} rg");
        let _ = writeln!(content, "{} Tc", num(px_to_pt(placement.letter_spacing, dpi)));
        let _ = writeln!(content, "{} TL", num(px_to_pt(placement.line_advance(), dpi)));
        if page_box.rotate == 0 {
            let _ = writeln!(content, "{} {} Td", num(origin.x), num(origin.y));
        } else {
            // Rotated pages need rotated text space for glyphs to read upright
            let [a, b, c, d] = page_box.upright_axes();
            let _ = writeln!(
                content,
                "{} {} {} {} {} {} Tm",
                num(a),
                num(b),
                num(c),
                num(d),
                num(origin.x),
                num(origin.y)
            );
        }

        let mut replaced = 0;
        for (i, line) in item.text.lines.iter().enumerate() {
            if i > 0 {
                content.push_str("T*\n");
            }
            if line.is_empty() {
                continue;
            }
            let (bytes, missing) = match item.text.script {
                Script::Latin => encode_win_ansi(line),
                Script::Cjk => encode_ucs2(line),
            };
            replaced += missing;
            let _ = writeln!(content, "<{}> Tj", hex::encode_upper(bytes));
        }
        content.push_str("ET\n");

        if replaced > 0 {
            overlay.warnings.push(ExportWarning::TextReplaced {
                field: item.id.clone(),
                replaced,
            });
        }
    }

    overlay
}

/// Format a number for a content stream: three decimals, trailing zeros trimmed
fn num(value: f32) -> String {
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// WinAnsi bytes for `text` plus the number of replaced characters
pub fn encode_win_ansi(text: &str) -> (Vec<u8>, usize) {
    let mut replaced = 0;
    let bytes = text
        .chars()
        .map(|c| {
            win_ansi_byte(c).unwrap_or_else(|| {
                replaced += 1;
                REPLACEMENT as u8
            })
        })
        .collect();
    (bytes, replaced)
}

/// Big-endian UCS-2 bytes for `text` plus the number of replaced characters
pub fn encode_ucs2(text: &str) -> (Vec<u8>, usize) {
    let mut replaced = 0;
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for c in text.chars() {
        let unit = match u16::try_from(c as u32) {
            Ok(unit) if c != '\t' && !c.is_control() => unit,
            _ => {
                replaced += 1;
                REPLACEMENT as u16
            }
        };
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    (bytes, replaced)
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => {
            let byte = match c {
                '€' => 0x80,
                '‚' => 0x82,
                'ƒ' => 0x83,
                '„' => 0x84,
                '…' => 0x85,
                '†' => 0x86,
                '‡' => 0x87,
                'ˆ' => 0x88,
                '‰' => 0x89,
                'Š' => 0x8A,
                '‹' => 0x8B,
                'Œ' => 0x8C,
                'Ž' => 0x8E,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                '˜' => 0x98,
                '™' => 0x99,
                'š' => 0x9A,
                '›' => 0x9B,
                'œ' => 0x9C,
                'ž' => 0x9E,
                'Ÿ' => 0x9F,
                _ => return None,
            };
            Some(byte)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PREVIEW_DPI;

    fn overlay_for(placements: &[(FieldId, Placement, &str)]) -> PageOverlay {
        let items: Vec<OverlayItem<'_>> = placements
            .iter()
            .map(|(id, placement, value)| OverlayItem {
                id,
                placement,
                text: FieldText::parse(value).unwrap(),
            })
            .collect();
        build_overlay(0, &items, &PageBox::default(), PREVIEW_DPI)
    }

    #[test]
    fn test_latin_block_operators() {
        let placement = Placement::new("name", 0, 150.0, 150.0, 14.0);
        let overlay = overlay_for(&[(FieldId::from("f_a"), placement, "Ada")]);

        assert!(overlay.uses_latin);
        assert!(!overlay.uses_cjk);
        assert!(overlay.warnings.is_empty());
        let expected = "BT\n/ISLatin 6.72 Tf\n0.059 0.090 0.165 rg\n0 Tc\n8.064 TL\n\
                        72 720 Td\n<416461> Tj\nET\n";
        assert_eq!(overlay.content, expected);
    }

    #[test]
    fn test_rotated_page_uses_upright_text_matrix() {
        let placement = Placement::new("name", 0, 150.0, 300.0, 14.0);
        let id = FieldId::from("f_a");
        let items = [OverlayItem {
            id: &id,
            placement: &placement,
            text: FieldText::parse("Ada").unwrap(),
        }];

        let page_box = PageBox::default().with_rotation(90);
        let overlay = build_overlay(0, &items, &page_box, PREVIEW_DPI);
        assert!(overlay.content.contains("0 1 -1 0 144 72 Tm\n<416461> Tj\n"));
        assert!(!overlay.content.contains(" Td\n"));

        let page_box = PageBox::default().with_rotation(270);
        let overlay = build_overlay(0, &items, &page_box, PREVIEW_DPI);
        assert!(overlay.content.contains("0 -1 1 0 468 720 Tm\n"));
    }

    #[test]
    fn test_multiline_and_letter_spacing() {
        let mut placement = Placement::new("addr", 0, 0.0, 0.0, 20.0);
        placement.letter_spacing = 5.0;
        placement.color = "#ff0000".to_string();
        let overlay = overlay_for(&[(FieldId::from("f_a"), placement, "a<br><br>b")]);

        assert!(overlay.content.contains("1.000 0.000 0.000 rg\n"));
        assert!(overlay.content.contains("2.4 Tc\n"));
        assert!(overlay.content.contains("0 792 Td\n<61> Tj\nT*\nT*\n<62> Tj\n"));
    }

    #[test]
    fn test_invalid_color_falls_back_and_others_render() {
        let mut bad = Placement::new("a", 0, 10.0, 10.0, 12.0);
        bad.color = "banana".to_string();
        let mut good = Placement::new("b", 0, 10.0, 40.0, 12.0);
        good.color = "#00ff00".to_string();

        let overlay = overlay_for(&[
            (FieldId::from("f_a"), bad, "x"),
            (FieldId::from("f_b"), good, "y"),
        ]);
        assert!(overlay.content.contains("0.059 0.090 0.165 rg"));
        assert!(overlay.content.contains("0.000 1.000 0.000 rg"));
        assert_eq!(overlay.content.matches("BT\n").count(), 2);
        assert_eq!(
            overlay.warnings,
            vec![ExportWarning::ColorFallback {
                field: FieldId::from("f_a"),
                color: "banana".to_string(),
            }]
        );
    }

    #[test]
    fn test_undrawable_geometry_is_skipped() {
        let broken = Placement::new("a", 0, f32::INFINITY, 10.0, 12.0);
        let zero = Placement::new("b", 0, 10.0, 10.0, 0.0);
        let fine = Placement::new("c", 0, 10.0, 10.0, 12.0);

        let overlay = overlay_for(&[
            (FieldId::from("f_a"), broken, "x"),
            (FieldId::from("f_b"), zero, "y"),
            (FieldId::from("f_c"), fine, "z"),
        ]);
        assert_eq!(overlay.content.matches("BT\n").count(), 1);
        assert_eq!(overlay.warnings.len(), 2);
        assert!(overlay
            .warnings
            .iter()
            .all(|w| matches!(w, ExportWarning::PlacementSkipped { page: 0, .. })));
    }

    #[test]
    fn test_cjk_text_uses_type0_font() {
        let placement = Placement::new("name", 0, 10.0, 10.0, 12.0);
        let overlay = overlay_for(&[(FieldId::from("f_a"), placement, "山田A")]);
        assert!(overlay.uses_cjk);
        assert!(!overlay.uses_latin);
        assert!(overlay.content.contains("/ISCjk "));
        assert!(overlay.content.contains("<5C7175300041> Tj\n"));
    }

    #[test]
    fn test_encodings() {
        assert_eq!(encode_win_ansi("Café €"), (vec![b'C', b'a', b'f', 0xE9, b' ', 0x80], 0));
        assert_eq!(encode_win_ansi("a\u{0100}b"), (b"a?b".to_vec(), 1));
        assert_eq!(encode_ucs2("日A"), (vec![0x65, 0xE5, 0x00, 0x41], 0));
        assert_eq!(encode_ucs2("😀"), (vec![0x00, 0x3F], 1));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(num(72.0), "72");
        assert_eq!(num(6.72), "6.72");
        assert_eq!(num(-0.0001), "0");
        assert_eq!(num(0.0), "0");
        assert_eq!(num(-3.5), "-3.5");
    }
}
