//! Reassembly: place each encoded page into a fresh PDF and write it out.
//!
//! Each output page carries exactly one full-bleed image XObject whose
//! `MediaBox` equals the raster's pixel dimensions, so one pixel maps to one
//! point. The JPEG bytes go in untouched with `Filter /DCTDecode`; the final
//! `compress()` pass leaves them alone and deflates everything else (page
//! content streams, object streams).
//!
//! ## Atomic output
//! [`OutputDocument::finish`] serialises into a temporary file in the target
//! directory and renames it over the output path only once every byte is
//! written, so a failed run never leaves a truncated PDF behind.

use super::encode::EncodedPage;
use crate::error::DegradeError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

const IMAGE_NAME: &str = "Im0";

/// The output document under construction.
pub struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    /// Create an empty document. The page tree is filled by [`Self::append_page`].
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append `page` as the next page. The JPEG buffer moves into the document.
    pub fn append_page(&mut self, page: EncodedPage) -> Result<(), DegradeError> {
        let page_number = self.kids.len() + 1;
        let EncodedPage {
            width,
            height,
            jpeg,
        } = page;

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false);
        let image_id = self.doc.add_object(image);

        // Scale the unit image square up to the full page.
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        (width as i64).into(),
                        0.into(),
                        0.into(),
                        (height as i64).into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(|e| DegradeError::EncodeFailed {
            page: page_number,
            detail: format!("content stream: {e}"),
        })?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), (width as i64).into(), (height as i64).into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
        });
        self.kids.push(page_id.into());

        debug!("Inserted page {} ({}x{} pt)", page_number, width, height);
        Ok(())
    }

    /// Close the page tree, clean up and compress.
    fn finalize(mut self) -> Document {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let pruned = self.doc.prune_objects();
        let empty = self.doc.delete_zero_length_streams();
        self.doc.renumber_objects();
        self.doc.compress();
        debug!(
            "Finalised output: {} pages, pruned {} objects, dropped {} empty streams",
            count,
            pruned.len(),
            empty.len()
        );
        self.doc
    }

    /// Finalise and serialise into memory.
    pub fn into_bytes(self) -> Result<Vec<u8>, DegradeError> {
        let mut doc = self.finalize();
        let mut buf = Vec::new();
        doc.save_to(&mut buf).map_err(|e| DegradeError::EncodeFailed {
            page: 0,
            detail: format!("serialise output: {e}"),
        })?;
        Ok(buf)
    }

    /// Finalise and write atomically to `path`. Returns the written size.
    pub fn finish(self, path: &Path) -> Result<u64, DegradeError> {
        let write_err = |source: std::io::Error| DegradeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let mut doc = self.finalize();
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            doc.save_to(&mut writer)
                .map_err(|e| write_err(std::io::Error::other(e.to_string())))?;
            writer.flush().map_err(write_err)?;
        }

        let file = tmp.persist(path).map_err(|e| write_err(e.error))?;
        let size = file.metadata().map(|m| m.len()).map_err(write_err)?;
        Ok(size)
    }
}
