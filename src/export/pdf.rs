//! Low-level PDF structure helpers over `lopdf`

use std::path::Path;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::geometry::PageBox;

use super::error::{ExportError, ExportResult};
use super::overlay::{CJK_BASE_FONT, CJK_ENCODING};

/// Page tree nesting limit when resolving inherited attributes
const MAX_INHERIT_DEPTH: usize = 32;

/// Attributes a page may inherit from its ancestors
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Load a readable, unencrypted document
pub fn load(path: &Path) -> ExportResult<Document> {
    let source_error = |reason: String| ExportError::Source {
        path: path.to_path_buf(),
        reason,
    };
    let doc = Document::load(path).map_err(|e| source_error(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(source_error("document is encrypted".to_string()));
    }
    if doc.get_pages().is_empty() {
        return Err(source_error("document has no pages".to_string()));
    }
    Ok(doc)
}

/// Page object ids in page order
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Page attribute, looked up through the page tree when the page lacks it
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn rect(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let items = obj.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(items) {
        *slot = number(resolve(doc, item))?;
    }
    Some(values)
}

/// Visible page box: CropBox, else MediaBox, else Letter, with the page's
/// inherited `/Rotate`
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let rotate = inherited(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);
    inherited(doc, page_id, b"CropBox")
        .and_then(|obj| rect(doc, obj))
        .or_else(|| inherited(doc, page_id, b"MediaBox").and_then(|obj| rect(doc, obj)))
        .map(PageBox::from_rect)
        .unwrap_or_default()
        .with_rotation(rotate)
}

/// Standard Helvetica with WinAnsi encoding
pub fn add_latin_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Non-embedded Japanese gothic Type0 font addressed by UCS-2 codes
pub fn add_cjk_font(doc: &mut Document) -> ObjectId {
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => CJK_BASE_FONT,
        "Flags" => 4,
        "FontBBox" => vec![
            Object::Integer(-92),
            Object::Integer(-250),
            Object::Integer(1010),
            Object::Integer(922),
        ],
        "ItalicAngle" => 0,
        "Ascent" => 880,
        "Descent" => -120,
        "CapHeight" => 880,
        "StemV" => 93,
    });
    let descendant_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => CJK_BASE_FONT,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Japan1"),
            "Supplement" => 5,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
    });
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => CJK_BASE_FONT,
        "Encoding" => CJK_ENCODING,
        "DescendantFonts" => vec![Object::Reference(descendant_id)],
    })
}

/// Make `fonts` available under their resource names on one page.
///
/// Inherited or shared resources are copied onto the page so other pages
/// keep their own resource dictionaries.
pub fn register_fonts(
    doc: &mut Document,
    page_id: ObjectId,
    fonts: &[(&str, ObjectId)],
) -> lopdf::Result<()> {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut font_dict = resources
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_default();

    for (name, id) in fonts {
        font_dict.set(*name, Object::Reference(*id));
    }
    resources.set("Font", Object::Dictionary(font_dict));

    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Wrap the page's existing content in `q … Q` and append `overlay` after it
pub fn append_overlay(doc: &mut Document, page_id: ObjectId, overlay: &[u8]) -> lopdf::Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut body = b"\nQ\nq\n".to_vec();
    body.extend_from_slice(overlay);
    body.extend_from_slice(b"Q\n");
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), body));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(overlay_id));

    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)?
        .set("Contents", contents);
    Ok(())
}

/// Copy inherited attributes onto every page so pages can be re-parented
fn materialize_inherited(doc: &mut Document) {
    for page_id in page_ids(doc) {
        let found: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter_map(|key| Some((*key, inherited(doc, page_id, key)?.clone())))
            .collect();
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in found {
                if !page.has(key) {
                    page.set(key, value);
                }
            }
        }
    }
}

fn root_pages_id(doc: &Document) -> lopdf::Result<ObjectId> {
    let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference)?;
    doc.get_dictionary(catalog_id)?
        .get(b"Pages")
        .and_then(Object::as_reference)
}

/// Append every page of `extra` to the end of `base`
pub fn append_document(base: &mut Document, mut extra: Document) -> ExportResult<usize> {
    materialize_inherited(&mut extra);
    extra.renumber_objects_with(base.max_id + 1);
    let extra_pages = page_ids(&extra);
    let extra_max = extra.max_id;

    let pages_id = root_pages_id(base)?;
    base.objects.extend(extra.objects);
    base.max_id = base.max_id.max(extra_max);

    for page_id in &extra_pages {
        base.get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)?
            .set("Parent", Object::Reference(pages_id));
    }

    let pages = base.get_object_mut(pages_id).and_then(Object::as_dict_mut)?;
    let mut kids = pages
        .get(b"Kids")
        .and_then(Object::as_array)
        .cloned()
        .unwrap_or_default();
    let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(kids.len() as i64);
    kids.extend(extra_pages.iter().map(|id| Object::Reference(*id)));
    pages.set("Kids", kids);
    pages.set("Count", count + extra_pages.len() as i64);

    // Drop the appended document's catalog and page tree root
    base.prune_objects();
    Ok(extra_pages.len())
}
