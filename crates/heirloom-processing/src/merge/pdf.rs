//! Appending the pages of an existing PDF to the output document.

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::OutputDocument;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

/// US Letter, used when neither a page nor its ancestors carry a MediaBox.
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Page trees deeper than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

impl OutputDocument {
    /// Append every page of `bytes`, in the source's page order. Returns the number of
    /// pages added.
    pub(super) fn append_pdf(&mut self, bytes: &[u8]) -> Result<usize, lopdf::Error> {
        let mut source = Document::load_mem(bytes)?;
        source.renumber_objects_with(self.doc.max_id + 1);
        let source_max_id = source.max_id;

        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        let inherited: Vec<Dictionary> = page_ids
            .iter()
            .map(|id| inherited_attributes(&source, *id))
            .collect();

        for (id, object) in source.objects {
            if is_tree_node(&object) {
                continue;
            }
            self.doc.objects.insert(id, object);
        }

        for (page_id, attributes) in page_ids.iter().zip(inherited) {
            let Some(Object::Dictionary(page)) = self.doc.objects.get_mut(page_id) else {
                continue;
            };
            page.set("Parent", self.pages_id);
            for (name, value) in attributes.iter() {
                if page.get(name).is_err() {
                    page.set(name.clone(), value.clone());
                }
            }
            if page.get(b"MediaBox").is_err() {
                let media_box: Vec<Object> = DEFAULT_MEDIA_BOX.iter().map(|v| (*v).into()).collect();
                page.set("MediaBox", media_box);
            }
            self.kids.push(*page_id);
        }

        self.doc.max_id = self.doc.max_id.max(source_max_id);
        Ok(page_ids.len())
    }
}

/// Catalog and intermediate page tree nodes are replaced by the output's own tree.
fn is_tree_node(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => matches!(
            dict.get(b"Type"),
            Ok(Object::Name(name)) if name == b"Catalog" || name == b"Pages"
        ),
        _ => false,
    }
}

/// Inheritable attributes found on the ancestors of `page_id`, nearest ancestor first.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut found = Dictionary::new();
    let mut current = parent_of(doc, page_id);
    let mut depth = 0;

    while let Some(node_id) = current {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            tracing::warn!(?page_id, "Page tree too deep, ignoring further ancestors");
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for name in INHERITABLE {
            if found.get(name).is_err() {
                if let Ok(value) = node.get(name) {
                    found.set(name.to_vec(), value.clone());
                }
            }
        }
        current = parent_of(doc, node_id);
    }

    found
}

fn parent_of(doc: &Document, id: ObjectId) -> Option<ObjectId> {
    doc.get_dictionary(id)
        .ok()?
        .get(b"Parent")
        .ok()?
        .as_reference()
        .ok()
}
