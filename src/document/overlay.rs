//! Template overlay: draws field text and the verification code on top of
//! the first page of the blank form template.

use crate::core::types::DocumentFieldSet;
use crate::core::{PortalError, PortalResult};
use crate::document::layout::{layout_lines, FONT_SIZE};
use crate::document::qr::{VerificationCode, QUIET_ZONE};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;
use tracing::warn;

pub const A4_WIDTH: f32 = 595.0;
pub const A4_HEIGHT: f32 = 842.0;

/// Side of the QR square, including its quiet zone.
pub const QR_SIZE: f32 = 77.0;
pub const QR_RIGHT_MARGIN: f32 = 60.0;
pub const QR_TOP_MARGIN: f32 = 45.0;

const FONT_RESOURCE: &str = "EmmHelv";

/// Bottom-left corner of the QR square on an A4 page.
pub fn qr_origin() -> (f32, f32) {
    (
        A4_WIDTH - QR_RIGHT_MARGIN - QR_SIZE,
        A4_HEIGHT - QR_TOP_MARGIN - QR_SIZE,
    )
}

/// Helvetica is registered with WinAnsiEncoding; anything outside Latin-1
/// is printed as `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

pub fn overlay_operations(fields: &DocumentFieldSet, code: &VerificationCode) -> Vec<Operation> {
    let mut ops = vec![Operation::new("q", vec![])];

    ops.push(Operation::new("rg", vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)]));
    for line in layout_lines(fields) {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), FONT_SIZE.into()],
        ));
        ops.push(Operation::new("Td", vec![line.x.into(), line.y.into()]));
        ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(&line.text))]));
        ops.push(Operation::new("ET", vec![]));
    }

    let (x0, y0) = qr_origin();
    let module = QR_SIZE / (code.width() + 2 * QUIET_ZONE) as f32;
    let top = y0 + QR_SIZE - QUIET_ZONE as f32 * module;
    let left = x0 + QUIET_ZONE as f32 * module;
    for (col, row) in code.dark_modules() {
        ops.push(Operation::new(
            "re",
            vec![
                (left + col as f32 * module).into(),
                (top - (row + 1) as f32 * module).into(),
                module.into(),
                module.into(),
            ],
        ));
    }
    ops.push(Operation::new("f", vec![]));

    ops.push(Operation::new("Q", vec![]));
    ops
}

/// The blank form every overlay is drawn onto.
#[derive(Debug, Clone)]
pub struct FormTemplate {
    doc: Document,
}

impl FormTemplate {
    pub fn load(path: &Path) -> PortalResult<Self> {
        let doc = Document::load(path)?;
        if doc.get_pages().is_empty() {
            return Err(PortalError::Render(format!("{} has no pages", path.display())));
        }
        Ok(Self { doc })
    }

    /// Falls back to a blank A4 page when the template cannot be read.
    pub fn load_or_blank(path: &Path) -> Self {
        match Self::load(path) {
            Ok(t) => t,
            Err(e) => {
                warn!("⚠️ Form template {} unavailable ({}), using blank A4", path.display(), e);
                Self::blank_a4()
            }
        }
    }

    pub fn blank_a4() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), A4_WIDTH.into(), A4_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => Dictionary::new(),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Self { doc }
    }

    /// A fresh single-form document with `fields` and `code` drawn on page one.
    pub fn render(&self, fields: &DocumentFieldSet, code: &VerificationCode) -> PortalResult<Document> {
        let mut doc = self.doc.clone();
        let page_id = doc
            .get_pages()
            .values()
            .next()
            .copied()
            .ok_or_else(|| PortalError::Render("template has no pages".into()))?;

        register_font(&mut doc, page_id)?;
        isolate_existing_contents(&mut doc, page_id)?;
        let content = Content {
            operations: overlay_operations(fields, code),
        };
        doc.add_page_contents(page_id, content.encode()?)?;
        Ok(doc)
    }

    pub fn render_bytes(&self, fields: &DocumentFieldSet, code: &VerificationCode) -> PortalResult<Vec<u8>> {
        let mut doc = self.render(fields, code)?;
        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

/// Bracket the page's existing content streams in `q`/`Q` so graphics state
/// the template leaves behind (CTM, colours) does not reach the overlay.
fn isolate_existing_contents(doc: &mut Document, page_id: ObjectId) -> PortalResult<()> {
    let existing = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    if existing.is_empty() {
        return Ok(());
    }

    let save = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let restore = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save));
    contents.extend(existing);
    contents.push(Object::Reference(restore));
    doc.get_dictionary_mut(page_id)?.set("Contents", contents);
    Ok(())
}

fn register_font(doc: &mut Document, page_id: ObjectId) -> PortalResult<()> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let shared = {
        let resources = doc.get_or_create_resources(page_id)?.as_dict_mut()?;
        match resources.get(b"Font") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                resources.set("Font", Dictionary::new());
                None
            }
        }
    };

    let fonts = match shared {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc
            .get_or_create_resources(page_id)?
            .as_dict_mut()?
            .get_mut(b"Font")?
            .as_dict_mut()?,
    };
    fonts.set(FONT_RESOURCE, font_id);
    Ok(())
}
