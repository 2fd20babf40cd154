// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler: packages prepared page images into one PDF using
// `lopdf`.
//
// Assembly is two-phase. Each prepared image is first staged to an encoded
// file (JPEG at the configured quality when compression is on, PNG
// otherwise), so a batch never holds more than one decoded page in memory.
// The staged files are then written, in order, one image per page. JPEG
// stages are embedded as-is with `DCTDecode`; PNG stages are decoded and
// embedded as Flate-compressed RGB samples.

use std::fs;
use std::path::{Path, PathBuf};

use bindery_core::{BinderyError, ConversionError, PageConfig};
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument, warn};

use crate::image::ImageProcessor;

/// Name of the image XObject on every page.
const IMAGE_NAME: &str = "Im0";
const PRODUCER: &str = "Bindery";

/// How a staged page was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedEncoding {
    Jpeg,
    Png,
}

/// A prepared image written to an intermediate file, awaiting assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub encoding: StagedEncoding,
}

/// Writes staged pages into a single PDF document.
pub struct DocumentAssembler {
    page_config: PageConfig,
    title: Option<String>,
}

impl DocumentAssembler {
    pub fn new(page_config: PageConfig) -> Self {
        Self {
            page_config,
            title: None,
        }
    }

    /// Set a title for the PDF metadata.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn page_config(&self) -> &PageConfig {
        &self.page_config
    }

    // -- Staging --------------------------------------------------------------

    /// Encode one prepared image into `dir` as `page-<index>.jpg|png`.
    pub fn stage(&self, image: &RgbImage, dir: &Path, index: usize) -> Result<StagedPage, BinderyError> {
        let processor = ImageProcessor::from_rgb(image.clone());
        let (bytes, encoding, ext) = match self.page_config.effective_quality() {
            Some(quality) => (processor.to_jpeg_bytes(quality)?, StagedEncoding::Jpeg, "jpg"),
            None => (processor.to_png_bytes()?, StagedEncoding::Png, "png"),
        };

        let path = dir.join(format!("page-{index:05}.{ext}"));
        fs::write(&path, &bytes)?;
        debug!(index, path = %path.display(), bytes = bytes.len(), "page staged");

        Ok(StagedPage {
            path,
            width: image.width(),
            height: image.height(),
            encoding,
        })
    }

    // -- Assembly -------------------------------------------------------------

    /// Write `pages`, in order, into a PDF at `output`.
    ///
    /// The document is written next to `output` with a `.part` suffix and
    /// renamed into place once complete; on failure no file is left behind.
    #[instrument(skip_all, fields(pages = pages.len(), output = %output.display()))]
    pub fn assemble(&self, pages: &[StagedPage], output: &Path) -> Result<PathBuf, ConversionError> {
        if pages.is_empty() {
            return Err(ConversionError::EmptyInput);
        }

        let mut document = self.build(pages).map_err(ConversionError::AssemblyError)?;
        let part = part_path(output);

        let written = document
            .save(&part)
            .map_err(|err| format!("cannot write {}: {err}", part.display()))
            .and_then(|_| {
                fs::rename(&part, output).map_err(|err| {
                    format!("cannot move document into place at {}: {err}", output.display())
                })
            });

        if let Err(reason) = written {
            if part.exists() {
                if let Err(err) = fs::remove_file(&part) {
                    warn!(path = %part.display(), error = %err, "cannot remove partial document");
                }
            }
            return Err(ConversionError::AssemblyError(reason));
        }

        info!(pages = pages.len(), output = %output.display(), "document assembled");
        Ok(output.to_path_buf())
    }

    /// Stage `images` into a scratch directory and assemble them.
    pub fn assemble_images(&self, images: &[RgbImage], output: &Path) -> Result<PathBuf, ConversionError> {
        let scratch = tempfile::Builder::new()
            .prefix("bindery-assemble-")
            .tempdir()
            .map_err(|err| ConversionError::AssemblyError(format!("cannot create scratch directory: {err}")))?;

        let staged = images
            .iter()
            .enumerate()
            .map(|(index, image)| self.stage(image, scratch.path(), index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ConversionError::AssemblyError(err.to_string()))?;

        self.assemble(&staged, output)
    }

    fn build(&self, pages: &[StagedPage]) -> Result<Document, String> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids = pages
            .iter()
            .enumerate()
            .map(|(number, page)| self.add_page(&mut doc, pages_id, page).map_err(|e| format!("page {}: {e}", number + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info = Dictionary::new();
        info.set("Producer", Object::string_literal(PRODUCER));
        if let Some(title) = &self.title {
            info.set("Title", Object::string_literal(title.as_str()));
        }
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);

        Ok(doc)
    }

    /// Add one page holding `staged` and return its object id.
    fn add_page(&self, doc: &mut Document, pages_id: ObjectId, staged: &StagedPage) -> Result<ObjectId, String> {
        let image = image_xobject(staged)?;
        let image_id = doc.add_object(image);

        let (w, h) = (staged.width as i64, staged.height as i64);
        let (page_w, page_h) = self
            .page_config
            .page_size()
            .dimensions_pt()
            .map(|(pw, ph)| (pw as i64, ph as i64))
            .unwrap_or((w, h));
        let (x, y) = ((page_w - w) / 2, (page_h - h) / 2);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(h),
                        Object::Integer(x),
                        Object::Integer(y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(|e| format!("cannot encode page content: {e}"))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(page_w),
                Object::Integer(page_h),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
        });
        Ok(page_id)
    }
}

/// Image XObject for one staged page.
fn image_xobject(staged: &StagedPage) -> Result<Stream, String> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => staged.width as i64,
        "Height" => staged.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => Object::Integer(8),
    };

    match staged.encoding {
        StagedEncoding::Jpeg => {
            let bytes = fs::read(&staged.path)
                .map_err(|e| format!("cannot read staged page {}: {e}", staged.path.display()))?;
            dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            Ok(Stream::new(dict, bytes).with_compression(false))
        }
        StagedEncoding::Png => {
            let rgb = image::open(&staged.path)
                .map_err(|e| format!("cannot read staged page {}: {e}", staged.path.display()))?
                .to_rgb8();
            if rgb.dimensions() != (staged.width, staged.height) {
                return Err(format!(
                    "staged page {} is {}x{}, expected {}x{}",
                    staged.path.display(),
                    rgb.width(),
                    rgb.height(),
                    staged.width,
                    staged.height
                ));
            }
            let mut stream = Stream::new(dict, rgb.into_raw());
            stream
                .compress()
                .map_err(|e| format!("cannot compress page samples: {e}"))?;
            Ok(stream)
        }
    }
}

/// Temporary path the document is written to before being renamed.
fn part_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}
