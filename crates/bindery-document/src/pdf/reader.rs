// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open and inspect assembled documents using the `lopdf` crate.

use std::path::Path;

use bindery_core::error::BinderyError;
use image::RgbImage;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument};

/// Size of one page's media box, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub width: f32,
    pub height: f32,
}

/// The raster placed on a page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// Stream filter, e.g. `DCTDecode` or `FlateDecode`; `None` for raw samples.
    pub filter: Option<String>,
    /// Encoded bytes for `DCTDecode`, decoded samples otherwise.
    pub data: Vec<u8>,
}

impl PageImage {
    /// Decode the page image into RGB pixels.
    pub fn to_rgb(&self) -> Result<RgbImage, BinderyError> {
        if self.filter.as_deref() == Some("DCTDecode") {
            return image::load_from_memory_with_format(&self.data, image::ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|err| BinderyError::PdfError(format!("page {}: bad JPEG stream: {err}", self.page)));
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            BinderyError::PdfError(format!(
                "page {}: {} sample bytes do not fill {}x{} RGB",
                self.page,
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// Reads existing PDF files.
pub struct PdfReader {
    document: Document,
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BinderyError> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            BinderyError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, BinderyError> {
        let document = Document::load_mem(data).map_err(|err| {
            BinderyError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// `Producer` and `Title` from the document information dictionary.
    pub fn info(&self, key: &str) -> Option<String> {
        let info = self.document.trailer.get(b"Info").ok()?;
        let dict = self.resolve(info).ok()?.as_dict().ok()?;
        let value = dict.get(key.as_bytes()).ok()?.as_str().ok()?;
        Some(String::from_utf8_lossy(value).into_owned())
    }

    /// Media box of every page, in page order. Inherited boxes are resolved
    /// through the page tree.
    pub fn page_sizes(&self) -> Result<Vec<PageBox>, BinderyError> {
        self.document
            .get_pages()
            .into_iter()
            .map(|(number, id)| self.media_box(number, id))
            .collect()
    }

    /// The image XObject drawn on every page, in page order.
    pub fn page_images(&self) -> Result<Vec<PageImage>, BinderyError> {
        self.document
            .get_pages()
            .into_iter()
            .map(|(number, id)| self.page_image(number, id))
            .collect()
    }

    // -- Helpers --------------------------------------------------------------

    fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object, BinderyError> {
        match object {
            Object::Reference(id) => self
                .document
                .get_object(*id)
                .map_err(|err| BinderyError::PdfError(format!("dangling reference {id:?}: {err}"))),
            other => Ok(other),
        }
    }

    fn dict_entry<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        dict.get(key).ok().and_then(|obj| self.resolve(obj).ok())
    }

    fn media_box(&self, number: u32, page_id: ObjectId) -> Result<PageBox, BinderyError> {
        let mut current = Some(page_id);
        while let Some(id) = current {
            let dict = self
                .document
                .get_dictionary(id)
                .map_err(|err| BinderyError::PdfError(format!("page {number}: {err}")))?;

            if let Some(Object::Array(values)) = self.dict_entry(dict, b"MediaBox") {
                let nums: Vec<f32> = values.iter().filter_map(|v| v.as_float().ok()).collect();
                if let [x0, y0, x1, y1] = nums[..] {
                    return Ok(PageBox {
                        width: (x1 - x0).abs(),
                        height: (y1 - y0).abs(),
                    });
                }
                return Err(BinderyError::PdfError(format!("page {number}: malformed MediaBox")));
            }

            current = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
        }
        Err(BinderyError::PdfError(format!("page {number}: no MediaBox")))
    }

    fn page_image(&self, number: u32, page_id: ObjectId) -> Result<PageImage, BinderyError> {
        let missing = |what: &str| BinderyError::PdfError(format!("page {number}: no {what}"));

        let page = self
            .document
            .get_dictionary(page_id)
            .map_err(|err| BinderyError::PdfError(format!("page {number}: {err}")))?;
        let resources = self
            .dict_entry(page, b"Resources")
            .and_then(|r| r.as_dict().ok())
            .ok_or_else(|| missing("Resources"))?;
        let xobjects = self
            .dict_entry(resources, b"XObject")
            .and_then(|x| x.as_dict().ok())
            .ok_or_else(|| missing("XObject resources"))?;

        let stream = xobjects
            .iter()
            .filter_map(|(_, obj)| self.resolve(obj).ok())
            .filter_map(|obj| obj.as_stream().ok())
            .find(|s| {
                s.dict
                    .get(b"Subtype")
                    .and_then(|t| t.as_name())
                    .is_ok_and(|name| name == b"Image")
            })
            .ok_or_else(|| missing("image XObject"))?;

        let dimension = |key: &[u8]| {
            stream
                .dict
                .get(key)
                .and_then(|v| v.as_i64())
                .map(|v| v as u32)
                .map_err(|_| missing("image dimensions"))
        };
        let (width, height) = (dimension(b"Width")?, dimension(b"Height")?);

        let filter = stream
            .dict
            .get(b"Filter")
            .and_then(|f| f.as_name())
            .ok()
            .map(|name| String::from_utf8_lossy(name).into_owned());

        let data = match filter.as_deref() {
            Some("FlateDecode") => stream.decompressed_content().map_err(|err| {
                BinderyError::PdfError(format!("page {number}: cannot inflate image: {err}"))
            })?,
            _ => stream.content.clone(),
        };

        Ok(PageImage {
            page: number,
            width,
            height,
            filter,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::DocumentAssembler;
    use bindery_core::{PageConfig, PageSize};
    use image::Rgb;

    #[test]
    fn reads_back_assembled_pages() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.pdf");
        let images = [
            RgbImage::from_pixel(20, 10, Rgb([250, 0, 0])),
            RgbImage::from_pixel(10, 20, Rgb([0, 0, 250])),
        ];
        DocumentAssembler::new(PageConfig::new(PageSize::Letter, false, 85))
            .assemble_images(&images, &out)
            .unwrap();

        let reader = PdfReader::open(&out).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert_eq!(reader.info("Producer").as_deref(), Some("Bindery"));

        let sizes = reader.page_sizes().unwrap();
        assert!(sizes.iter().all(|b| *b == PageBox { width: 612.0, height: 792.0 }));

        let pages = reader.page_images().unwrap();
        assert_eq!((pages[0].width, pages[0].height), (20, 10));
        assert_eq!(pages[1].filter.as_deref(), Some("FlateDecode"));
        assert_eq!(pages[1].to_rgb().unwrap().get_pixel(0, 0).0, [0, 0, 250]);
    }

    #[test]
    fn jpeg_pages_report_dct_filter() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.pdf");
        DocumentAssembler::new(PageConfig::new(PageSize::A4, true, 90))
            .assemble_images(&[RgbImage::from_pixel(16, 16, Rgb([0, 200, 0]))], &out)
            .unwrap();

        let bytes = std::fs::read(&out).unwrap();
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = &reader.page_images().unwrap()[0];
        assert_eq!(page.filter.as_deref(), Some("DCTDecode"));
        let px = page.to_rgb().unwrap().get_pixel(8, 8).0;
        assert!(px[1] > 150 && px[0] < 60 && px[2] < 60);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PdfReader::from_bytes(b"not a pdf").is_err());
    }
}
