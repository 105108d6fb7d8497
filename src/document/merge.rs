//! Concatenates single-form documents into one output file, preserving
//! input order.

use crate::core::{PortalError, PortalResult};
use lopdf::{dictionary, Document, Object, ObjectId};
use std::path::Path;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy inherited attributes onto the page itself so it survives being
/// re-parented under a new page tree.
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> PortalResult<()> {
    let mut inherited: Vec<(&[u8], Object)> = Vec::new();
    {
        let page = doc.get_dictionary(page_id)?;
        let mut missing: Vec<&[u8]> = INHERITABLE.iter().copied().filter(|k| !page.has(k)).collect();
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut depth = 0;
        while let Some(node_id) = parent {
            if missing.is_empty() || depth > 32 {
                break;
            }
            depth += 1;
            let node = doc.get_dictionary(node_id)?;
            missing.retain(|key| match node.get(key) {
                Ok(value) => {
                    inherited.push((*key, value.clone()));
                    false
                }
                Err(_) => true,
            });
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    for (key, value) in inherited {
        page.set(key.to_vec(), value);
    }
    Ok(())
}

fn is_page_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        .map(|name| name == b"Catalog" || name == b"Pages")
        .unwrap_or(false)
}

/// Merge `docs` page by page, in order, under a single new page tree.
pub fn merge_documents(docs: Vec<Document>) -> PortalResult<Document> {
    if docs.is_empty() {
        return Err(PortalError::Render("nothing to merge".into()));
    }

    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut next_id = pages_id.0 + 1;
    let mut kids: Vec<Object> = Vec::new();

    for mut doc in docs {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &page_ids {
            flatten_inherited(&mut doc, page_id)?;
        }

        for (id, object) in doc.objects {
            if !is_page_tree_node(&object) {
                merged.objects.insert(id, object);
            }
        }
        for page_id in page_ids {
            if let Some(Object::Dictionary(page)) = merged.objects.get_mut(&page_id) {
                page.set("Parent", pages_id);
            }
            kids.push(Object::Reference(page_id));
        }
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    merged.max_id = next_id - 1;
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    Ok(merged)
}

/// Merge the PDF files at `inputs` into `output`. Returns the page count.
pub fn merge_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> PortalResult<usize> {
    let docs = inputs
        .iter()
        .map(|p| Document::load(p.as_ref()).map_err(PortalError::from))
        .collect::<PortalResult<Vec<_>>>()?;
    let mut merged = merge_documents(docs)?;
    let pages = merged.get_pages().len();
    merged.save(output)?;
    Ok(pages)
}
