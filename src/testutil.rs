//! PDF fixtures for unit tests

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

/// Write a Letter-sized PDF with `pages` pages, each marked with a filled
/// square at a page-specific position, and return its path.
pub fn write_pdf(path: &Path, pages: usize) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(pages);
    for i in 0..pages {
        let offset = 72 + 40 * i as i64;
        let content = Content {
            operations: vec![
                Operation::new(
                    "rg",
                    vec![Object::Real(0.2), Object::Real(0.4), Object::Real(0.8)],
                ),
                Operation::new(
                    "re",
                    vec![offset.into(), offset.into(), 60.into(), 60.into()],
                ),
                Operation::new("f", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode fixture content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => dictionary! {},
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    doc.save(path).expect("save fixture pdf");
    path.to_path_buf()
}

/// Set `/Rotate` on one (1-based) page of a PDF on disk
pub fn set_rotation(path: &Path, page_number: u32, degrees: i64) {
    let mut doc = Document::load(path).expect("load pdf");
    let page_id = doc.get_pages()[&page_number];
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .expect("page dictionary")
        .set("Rotate", degrees);
    doc.save(path).expect("save pdf");
}

/// Count pages of a PDF on disk
pub fn page_count(path: &Path) -> usize {
    Document::load(path).expect("load pdf").get_pages().len()
}

/// Concatenated, decoded content streams of one (1-based) page
pub fn page_content(path: &Path, page_number: u32) -> String {
    let doc = Document::load(path).expect("load pdf");
    let pages = doc.get_pages();
    let page_id = pages[&page_number];
    let bytes = doc.get_page_content(page_id).expect("page content");
    String::from_utf8_lossy(&bytes).into_owned()
}
