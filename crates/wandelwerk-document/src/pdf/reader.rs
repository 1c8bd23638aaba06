// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open, inspect, merge, split, rotate, extract, and compress
// existing PDF documents using the `lopdf` crate.

use std::collections::HashMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument, warn};
use wandelwerk_core::error::WandelwerkError;
use wandelwerk_core::types::PageSelection;

/// Page attributes a page may inherit from its ancestors in the page tree
/// (ISO 32000-1 §7.7.3.4).
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Reads and manipulates existing PDF files.
///
/// Wraps `lopdf::Document` and provides higher-level operations such as merging
/// multiple files, extracting page selections, and rotating pages. Every
/// operation works on a clone, so one reader can serve several operations.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WandelwerkError> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            WandelwerkError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self { document })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, WandelwerkError> {
        let document = Document::load_mem(data).map_err(|err| {
            WandelwerkError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Extract the text of every page, pages separated by a blank line.
    #[instrument(skip(self))]
    pub fn extract_text(&self) -> Result<String, WandelwerkError> {
        let mut text = String::new();
        for page_number in self.document.get_pages().keys() {
            let page_text = self.document.extract_text(&[*page_number]).map_err(|err| {
                WandelwerkError::PdfError(format!(
                    "failed to extract text from page {}: {}",
                    page_number, err
                ))
            })?;
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(page_text.trim_end());
            text.push('\n');
        }
        Ok(text)
    }

    // -- Extraction -----------------------------------------------------------

    /// Keep only the selected pages, in selection order.
    #[instrument(skip(self, selection))]
    pub fn extract_pages(&self, selection: &PageSelection) -> Result<Vec<u8>, WandelwerkError> {
        let pages = selection.resolve(self.page_count())?;
        info!(selected = pages.len(), total = self.page_count(), "Extracting pages");
        serialise(self.select_pages(&pages)?, "extracted pages")
    }

    /// Split the document at `after_page` (1-indexed, inclusive) producing two
    /// byte-vectors: pages [1..=after_page] and pages [after_page+1..=end].
    #[instrument(skip(self), fields(after_page))]
    pub fn split(&self, after_page: u32) -> Result<(Vec<u8>, Vec<u8>), WandelwerkError> {
        let total = self.page_count();
        if after_page == 0 || after_page >= total {
            return Err(WandelwerkError::invalid_option(
                "split_at",
                format!("split point {} invalid for {} page document", after_page, total),
            ));
        }

        info!(after_page, total, "Splitting PDF");

        let first: Vec<u32> = (1..=after_page).collect();
        let second: Vec<u32> = (after_page + 1..=total).collect();
        Ok((
            serialise(self.select_pages(&first)?, "first part")?,
            serialise(self.select_pages(&second)?, "second part")?,
        ))
    }

    /// Split the document into one single-page PDF per page, in page order.
    #[instrument(skip(self))]
    pub fn split_pages(&self) -> Result<Vec<Vec<u8>>, WandelwerkError> {
        info!(total = self.page_count(), "Splitting PDF into single pages");
        (1..=self.page_count())
            .map(|page| serialise(self.select_pages(&[page])?, "single page"))
            .collect()
    }

    /// Merge this document with one or more other PDF byte-slices, producing a
    /// combined PDF. Pages appear in the order: self, then each supplied
    /// document in order.
    #[instrument(skip_all, fields(additional_count = others.len()))]
    pub fn merge(&self, others: &[&[u8]]) -> Result<Vec<u8>, WandelwerkError> {
        info!(
            base_pages = self.page_count(),
            additional_documents = others.len(),
            "Merging PDFs"
        );

        let all: Vec<u32> = (1..=self.page_count()).collect();
        let mut merged = self.select_pages(&all)?;

        for (index, other_bytes) in others.iter().enumerate() {
            let other_doc = Document::load_mem(other_bytes).map_err(|err| {
                WandelwerkError::PdfError(format!(
                    "failed to load additional PDF #{}: {}",
                    index + 1,
                    err
                ))
            })?;

            // BTreeMap keys are already in page order.
            for page_id in other_doc.get_pages().into_values() {
                clone_page_into(&other_doc, &mut merged, page_id)?;
            }
        }

        serialise(merged, "merged PDF")
    }

    /// Rotate pages by `degrees` (must be a multiple of 90). Without a
    /// selection every page rotates.
    ///
    /// Returns the full document as bytes with the rotation applied.
    #[instrument(skip(self, selection), fields(degrees))]
    pub fn rotate_pages(
        &self,
        degrees: i32,
        selection: Option<&PageSelection>,
    ) -> Result<Vec<u8>, WandelwerkError> {
        if degrees % 90 != 0 {
            return Err(WandelwerkError::invalid_option(
                "rotation",
                format!("rotation must be a multiple of 90, got {}", degrees),
            ));
        }

        let mut doc = self.document.clone();
        let pages = doc.get_pages();
        let targets = match selection {
            Some(selection) => selection.resolve(pages.len() as u32)?,
            None => pages.keys().copied().collect(),
        };

        for page_number in targets {
            let page_id = *pages.get(&page_number).ok_or_else(|| {
                WandelwerkError::PdfError(format!("page {} not found in page tree", page_number))
            })?;

            // /Rotate is inheritable, so the effective value may live on an ancestor.
            let existing_rotation = effective_attribute(&doc, page_id, b"Rotate")
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(0);
            // Both terms are reduced first so neither sum can overflow.
            let new_rotation =
                (existing_rotation.rem_euclid(360) + i64::from(degrees).rem_euclid(360)) % 360;

            doc.get_dictionary_mut(page_id)
                .map_err(|err| WandelwerkError::PdfError(format!("page {}: {}", page_number, err)))?
                .set("Rotate", Object::Integer(new_rotation));

            debug!(page_number, existing_rotation, new_rotation, "Page rotated");
        }

        serialise(doc, "rotated PDF")
    }

    /// Drop unreferenced objects and Flate-compress every stream.
    #[instrument(skip(self))]
    pub fn compress(&self) -> Result<Vec<u8>, WandelwerkError> {
        let mut doc = self.document.clone();
        let pruned = doc.prune_objects();
        doc.delete_zero_length_streams();
        doc.compress();
        doc.renumber_objects();
        info!(pruned_objects = pruned.len(), "PDF compressed");
        serialise(doc, "compressed PDF")
    }

    // -- Helpers --------------------------------------------------------------

    /// Build a copy of the document whose page tree holds exactly `pages`
    /// (1-indexed) in the given order. The tree is flattened, inherited
    /// attributes are copied onto each page, and unreachable objects pruned.
    fn select_pages(&self, pages: &[u32]) -> Result<Document, WandelwerkError> {
        let mut doc = self.document.clone();
        let page_ids = doc.get_pages();
        let root_id = pages_root(&doc)?;

        let mut kids = Vec::with_capacity(pages.len());
        for page_number in pages {
            let page_id = *page_ids.get(page_number).ok_or_else(|| {
                WandelwerkError::PdfError(format!(
                    "page {} not found (document has {} pages)",
                    page_number,
                    page_ids.len()
                ))
            })?;

            let inherited = inherited_attributes(&doc, page_id);
            let page = doc.get_dictionary_mut(page_id).map_err(|err| {
                WandelwerkError::PdfError(format!("page {}: {}", page_number, err))
            })?;
            for (key, value) in inherited {
                page.set(key, value);
            }
            page.set("Parent", Object::Reference(root_id));
            kids.push(Object::Reference(page_id));
        }

        let root = doc
            .get_dictionary_mut(root_id)
            .map_err(|err| WandelwerkError::PdfError(format!("page tree root: {}", err)))?;
        root.set("Count", Object::Integer(kids.len() as i64));
        root.set("Kids", Object::Array(kids));

        doc.prune_objects();
        Ok(doc)
    }
}

/// Serialise a document, naming `what` in any error.
fn serialise(mut doc: Document, what: &str) -> Result<Vec<u8>, WandelwerkError> {
    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(|err| {
        WandelwerkError::PdfError(format!("failed to serialise {}: {}", what, err))
    })?;
    debug!(what, output_bytes = output.len(), "PDF serialised");
    Ok(output)
}

/// Object ID of the root /Pages node.
fn pages_root(doc: &Document) -> Result<ObjectId, WandelwerkError> {
    doc.catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|err| WandelwerkError::PdfError(format!("no /Pages root: {}", err)))
}

/// Value of `key` on the page or the nearest ancestor that defines it.
fn effective_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Inheritable attributes the page does not define itself but an ancestor does.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    INHERITABLE
        .iter()
        .filter(|key| !page.has(key))
        .filter_map(|key| {
            effective_attribute(doc, page_id, key).map(|value| (key.to_vec(), value.clone()))
        })
        .collect()
}

/// Clone a single page object (and its referenced resources) from `source` into
/// `target`, appending it as the last page.
///
/// Stream data, fonts, and images referenced by the page dictionary are
/// copied as new objects in the target document. Inherited attributes are
/// materialised on the copy since its new parent will not provide them.
fn clone_page_into(
    source: &Document,
    target: &mut Document,
    page_id: ObjectId,
) -> Result<(), WandelwerkError> {
    let page_object = source.get_object(page_id).map_err(|err| {
        WandelwerkError::PdfError(format!("cannot read page object {:?}: {}", page_id, err))
    })?;

    let mut cloned_ids = HashMap::new();
    let new_page_id = target.new_object_id();
    cloned_ids.insert(page_id, new_page_id);

    let mut cloned_page = deep_clone_object(source, target, page_object, &mut cloned_ids)?;
    if let Object::Dictionary(dict) = &mut cloned_page {
        for (key, value) in inherited_attributes(source, page_id) {
            let value = deep_clone_object(source, target, &value, &mut cloned_ids)?;
            dict.set(key, value);
        }
    }
    target.objects.insert(new_page_id, cloned_page);

    let pages_id = pages_root(target)?;

    // Add page reference to the /Kids array and bump /Count.
    let pages_dict = target
        .get_dictionary_mut(pages_id)
        .map_err(|err| WandelwerkError::PdfError(format!("page tree root: {}", err)))?;
    if let Ok(Object::Array(kids)) = pages_dict.get_mut(b"Kids") {
        kids.push(Object::Reference(new_page_id));
    }
    let count = pages_dict
        .get(b"Count")
        .and_then(Object::as_i64)
        .unwrap_or(0);
    pages_dict.set("Count", Object::Integer(count + 1));

    if let Ok(page_dict) = target.get_dictionary_mut(new_page_id) {
        page_dict.set("Parent", Object::Reference(pages_id));
    }

    Ok(())
}

/// Deep-clone a single lopdf Object, recursively resolving references.
///
/// /Parent is skipped (the caller patches it). Each source object is copied
/// at most once; `cloned_ids` maps source IDs to their copies, which also
/// terminates reference cycles such as an annotation's /P back to its page.
fn deep_clone_object(
    source: &Document,
    target: &mut Document,
    object: &Object,
    cloned_ids: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object, WandelwerkError> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(clone_dictionary(
            source, target, dict, cloned_ids,
        )?)),
        Object::Array(arr) => {
            let mut new_arr = Vec::with_capacity(arr.len());
            for item in arr {
                new_arr.push(deep_clone_object(source, target, item, cloned_ids)?);
            }
            Ok(Object::Array(new_arr))
        }
        Object::Reference(ref_id) => {
            if let Some(existing) = cloned_ids.get(ref_id) {
                return Ok(Object::Reference(*existing));
            }
            match source.get_object(*ref_id) {
                Ok(referenced) => {
                    let new_id = target.new_object_id();
                    cloned_ids.insert(*ref_id, new_id);
                    let cloned = deep_clone_object(source, target, referenced, cloned_ids)?;
                    target.objects.insert(new_id, cloned);
                    Ok(Object::Reference(new_id))
                }
                Err(err) => {
                    warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                    Ok(Object::Null)
                }
            }
        }
        Object::Stream(stream) => {
            let new_dict = clone_dictionary(source, target, &stream.dict, cloned_ids)?;
            let mut cloned = lopdf::Stream::new(new_dict, stream.content.clone());
            // Keep already-compressed content as-is.
            cloned.allows_compression = stream.allows_compression;
            Ok(Object::Stream(cloned))
        }
        // All other object types (Boolean, Integer, Real, String, Name, Null)
        // are trivially cloneable.
        other => Ok(other.clone()),
    }
}

fn clone_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    cloned_ids: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary, WandelwerkError> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        if key == b"Parent" {
            continue;
        }
        let cloned_value = deep_clone_object(source, target, value, cloned_ids)?;
        new_dict.set(key.clone(), cloned_value);
    }
    Ok(new_dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{marked_pdf, page_markers, page_rotations};

    #[test]
    fn extract_pages_keeps_selection_in_order() {
        let reader = PdfReader::from_bytes(&marked_pdf(5)).unwrap();
        let selection: PageSelection = "2-3".parse().unwrap();
        let output = reader.extract_pages(&selection).unwrap();
        assert_eq!(page_markers(&output), vec![2, 3]);

        let reordered: PageSelection = "4,1".parse().unwrap();
        let output = reader.extract_pages(&reordered).unwrap();
        assert_eq!(page_markers(&output), vec![4, 1]);
    }

    #[test]
    fn extract_pages_rejects_out_of_range() {
        let reader = PdfReader::from_bytes(&marked_pdf(2)).unwrap();
        let selection: PageSelection = "2-3".parse().unwrap();
        assert!(reader.extract_pages(&selection).is_err());
    }

    #[test]
    fn split_produces_two_parts() {
        let reader = PdfReader::from_bytes(&marked_pdf(5)).unwrap();
        let (first, second) = reader.split(2).unwrap();
        assert_eq!(page_markers(&first), vec![1, 2]);
        assert_eq!(page_markers(&second), vec![3, 4, 5]);
        assert!(reader.split(5).is_err());
        assert!(reader.split(0).is_err());
    }

    #[test]
    fn split_pages_yields_one_document_per_page() {
        let reader = PdfReader::from_bytes(&marked_pdf(3)).unwrap();
        let parts = reader.split_pages().unwrap();
        assert_eq!(parts.len(), 3);
        for (index, part) in parts.iter().enumerate() {
            assert_eq!(page_markers(part), vec![index as i64 + 1]);
        }
    }

    #[test]
    fn merge_appends_in_order() {
        let first = PdfReader::from_bytes(&marked_pdf(2)).unwrap();
        let second = marked_pdf(3);
        let merged = first.merge(&[&second]).unwrap();
        assert_eq!(page_markers(&merged), vec![1, 2, 1, 2, 3]);
        assert_eq!(PdfReader::from_bytes(&merged).unwrap().page_count(), 5);
    }

    #[test]
    fn rotate_accumulates_and_respects_selection() {
        let reader = PdfReader::from_bytes(&marked_pdf(3)).unwrap();
        let selection: PageSelection = "2".parse().unwrap();
        let once = reader.rotate_pages(90, Some(&selection)).unwrap();
        assert_eq!(page_rotations(&once), vec![0, 90, 0]);

        let twice = PdfReader::from_bytes(&once)
            .unwrap()
            .rotate_pages(-180, None)
            .unwrap();
        assert_eq!(page_rotations(&twice), vec![180, 270, 180]);

        assert!(reader.rotate_pages(45, None).is_err());
    }

    #[test]
    fn extreme_rotations_wrap_instead_of_overflowing() {
        let reader = PdfReader::from_bytes(&marked_pdf(2)).unwrap();
        let quarter = PdfReader::from_bytes(&reader.rotate_pages(90, None).unwrap()).unwrap();

        // 2_147_483_610 is 90 modulo 360.
        let turned = quarter.rotate_pages(2_147_483_610, None).unwrap();
        assert_eq!(page_rotations(&turned), vec![180, 180]);

        let back = quarter.rotate_pages(-2_147_483_610, None).unwrap();
        assert_eq!(page_rotations(&back), vec![0, 0]);
    }

    #[test]
    fn compress_keeps_pages() {
        let reader = PdfReader::from_bytes(&marked_pdf(4)).unwrap();
        let output = reader.compress().unwrap();
        assert_eq!(page_markers(&output), vec![1, 2, 3, 4]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PdfReader::from_bytes(b"definitely not a pdf").is_err());
    }
}
