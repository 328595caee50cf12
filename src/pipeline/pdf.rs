//! PDF page engine: merge, split and single-image pages, backed by `lopdf`.
//!
//! The library handle is created lazily on the first PDF operation and cached
//! by [`PdfLibraryLoader`]; later operations reuse the same handle.
//!
//! Every output is assembled the same way: pages are copied out of their
//! source documents into a fresh document with a flat page tree, so inherited
//! page attributes are copied onto each page before the old tree is dropped.

use crate::config::PageRange;
use crate::error::ConvertError;
use crate::output::Artifact;
use crate::pipeline::image::{JpegColour, PdfImage};
use crate::request::InputFile;
use lopdf::content::{Content, Operation as ContentOp};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

const PDF_VERSION: &str = "1.5";
const PDF_MIME: &str = "application/pdf";

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

/// US Letter, used when a page and all its ancestors lack a MediaBox.
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Name of the merged output.
pub const MERGED_NAME: &str = "merged.pdf";

// ── Library handle ───────────────────────────────────────────────────────

/// A loaded PDF library. Cheap to share; all operations take `&self`.
#[derive(Debug)]
pub struct PdfLibrary {
    version: &'static str,
}

impl PdfLibrary {
    fn initialise() -> Self {
        Self {
            version: PDF_VERSION,
        }
    }

    /// PDF version written into every output.
    pub fn output_version(&self) -> &'static str {
        self.version
    }

    /// Parse a document. Encrypted documents are rejected.
    pub fn load(&self, bytes: &[u8]) -> Result<Document, ConvertError> {
        let doc = Document::load_mem(bytes).map_err(ConvertError::pdf)?;
        if doc.is_encrypted() {
            return Err(ConvertError::pdf("encrypted documents are not supported"));
        }
        Ok(doc)
    }

    pub fn page_count(&self, bytes: &[u8]) -> Result<u32, ConvertError> {
        Ok(self.load(bytes)?.get_pages().len() as u32)
    }

    /// Concatenate every page of every input, in selection order.
    pub fn merge(&self, inputs: &[InputFile]) -> Result<Artifact, ConvertError> {
        let mut out = PageAssembler::new(self.version);
        for input in inputs {
            let doc = self.load(&input.bytes)?;
            let added = out.append(doc, |_| true);
            debug!("Merged {} ({added} pages)", input.name);
        }
        info!("Merged {} documents into {} pages", inputs.len(), out.page_count());
        Ok(Artifact::new(MERGED_NAME, PDF_MIME, out.finish()?))
    }

    /// Extract the pages selected by `range` after clamping to the document.
    ///
    /// An empty clamped range yields a valid document with zero pages. The
    /// output is named `<base>_pages_<from>-<to>.pdf` from the clamped bounds.
    pub fn split(&self, input: &InputFile, range: PageRange) -> Result<Artifact, ConvertError> {
        let doc = self.load(&input.bytes)?;
        let total = doc.get_pages().len() as u32;
        let selected = range.page_numbers(total);
        let (from, to) = range.clamped_bounds(total);

        let mut out = PageAssembler::new(self.version);
        let added = out.append(doc, |n| selected.binary_search(&n).is_ok());
        info!("Split {}: pages {from}-{to} of {total} ({added} extracted)", input.name);

        Ok(Artifact::new(
            format!("{}_pages_{from}-{to}.pdf", input.base_name()),
            PDF_MIME,
            out.finish()?,
        ))
    }

    /// A single page exactly the size of the image, with the image drawn over it.
    pub fn image_to_pdf(&self, image: &PdfImage, base_name: &str) -> Result<Artifact, ConvertError> {
        let (width, height) = image.dimensions();
        let mut out = PageAssembler::new(self.version);
        let doc = &mut out.doc;

        let image_id = match image {
            PdfImage::Jpeg { data, colour, .. } => {
                let mut dict = image_dictionary(width, height, colour.colour_space());
                dict.set("Filter", "DCTDecode");
                if let JpegColour::Cmyk { inverted: true } = colour {
                    let decode = [1, 0, 1, 0, 1, 0, 1, 0].into_iter().map(Object::Integer).collect::<Vec<_>>();
                    dict.set("Decode", decode);
                }
                doc.add_object(Stream::new(dict, data.clone()))
            }
            PdfImage::Pixels { rgb, alpha, .. } => {
                let mut dict = image_dictionary(width, height, "DeviceRGB");
                if let Some(alpha) = alpha {
                    let mask = deflated(image_dictionary(width, height, "DeviceGray"), alpha.clone());
                    let mask_id = doc.add_object(mask);
                    dict.set("SMask", mask_id);
                }
                doc.add_object(deflated(dict, rgb.clone()))
            }
        };

        let content = Content {
            operations: vec![
                ContentOp::new("q", vec![]),
                ContentOp::new(
                    "cm",
                    vec![
                        Object::Integer(width as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                ContentOp::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                ContentOp::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().map_err(ConvertError::pdf)?,
        ));

        let page = dictionary! {
            "Type" => "Page",
            "MediaBox" => media_box(width as i64, height as i64),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        };
        out.push_page(page);
        debug!("Placed {width}x{height} image on a single page");

        Ok(Artifact::new(format!("{base_name}.pdf"), PDF_MIME, out.finish()?))
    }
}

fn image_dictionary(width: u32, height: u32, colour_space: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => colour_space,
        "BitsPerComponent" => 8_i64,
    }
}

fn media_box(width: i64, height: i64) -> Vec<Object> {
    [0, 0, width, height].into_iter().map(Object::Integer).collect()
}

fn deflated(dict: Dictionary, samples: Vec<u8>) -> Stream {
    let mut stream = Stream::new(dict, samples);
    // Left uncompressed if deflate fails; the stream is valid either way.
    let _ = stream.compress();
    stream
}

// ── Lazy loader ──────────────────────────────────────────────────────────

/// Loads the PDF library on first use and hands out the cached handle after.
#[derive(Debug, Default)]
pub struct PdfLibraryLoader {
    library: OnceLock<Arc<PdfLibrary>>,
    loads: AtomicUsize,
}

impl PdfLibraryLoader {
    pub const fn new() -> Self {
        Self {
            library: OnceLock::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// The shared library handle, loading it if this is the first call.
    pub fn ensure_loaded(&self) -> Arc<PdfLibrary> {
        self.library
            .get_or_init(|| {
                self.loads.fetch_add(1, Ordering::SeqCst);
                info!("Loading PDF library (lopdf, writing PDF {PDF_VERSION})");
                Arc::new(PdfLibrary::initialise())
            })
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.library.get().is_some()
    }

    /// How many times the library has been initialised. At most one.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

// ── Page assembly ────────────────────────────────────────────────────────

/// Builds a document with a single flat `Pages` node.
struct PageAssembler {
    doc: Document,
    pages: Vec<ObjectId>,
}

impl PageAssembler {
    fn new(version: &str) -> Self {
        Self {
            doc: Document::with_version(version),
            pages: Vec::new(),
        }
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Move the pages of `source` whose 1-based number passes `keep`.
    /// Returns how many were added.
    fn append(&mut self, mut source: Document, keep: impl Fn(u32) -> bool) -> usize {
        source.renumber_objects_with(self.doc.max_id + 1);

        let selected: Vec<ObjectId> = source
            .get_pages()
            .into_iter()
            .filter(|(number, _)| keep(*number))
            .map(|(_, id)| id)
            .collect();
        for &id in &selected {
            materialise_inherited(&mut source, id);
        }

        self.doc.max_id = self.doc.max_id.max(source.max_id);
        self.doc.objects.extend(source.objects);
        self.pages.extend_from_slice(&selected);
        selected.len()
    }

    fn push_page(&mut self, page: Dictionary) {
        let id = self.doc.add_object(page);
        self.pages.push(id);
    }

    /// Write the page tree and catalog, drop unreachable objects, serialise.
    fn finish(mut self) -> Result<Vec<u8>, ConvertError> {
        let pages_id = self.doc.new_object_id();
        for &id in &self.pages {
            if let Ok(Object::Dictionary(page)) = self.doc.get_object_mut(id) {
                page.set("Parent", pages_id);
            }
        }

        let kids: Vec<Object> = self.pages.iter().map(|&id| Object::Reference(id)).collect();
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.pages.len() as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.prune_objects();

        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).map_err(ConvertError::pdf)?;
        Ok(buf)
    }
}

/// Copy inherited attributes onto the page itself.
fn materialise_inherited(doc: &mut Document, page_id: ObjectId) {
    let mut missing: Vec<(&[u8], Object)> = Vec::new();
    if let Ok(page) = doc.get_dictionary(page_id) {
        for key in INHERITABLE {
            if page.has(key) {
                continue;
            }
            match inherited(doc, page, key) {
                Some(value) => missing.push((key, value)),
                None if key == b"MediaBox" => missing.push((
                    key,
                    Object::Array(DEFAULT_MEDIA_BOX.into_iter().map(Object::Integer).collect()),
                )),
                None => {}
            }
        }
    }

    if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
        for (key, value) in missing {
            page.set(key.to_vec(), value);
        }
    }
}

fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
    }
    None
}
