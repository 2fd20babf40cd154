// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bindery-document: the image-to-PDF pipeline.
//
// Normalises source images (format check, colour mode, EXIF orientation),
// runs per-image transforms (enhancement, watermark, effects and plugin
// steps), fits each image to the page policy, and assembles the pages into a
// single PDF with progress reporting and per-image failure isolation.

pub mod context;
pub mod convert;
pub mod fit;
pub mod image;
pub mod pdf;
pub mod plugins;
pub mod transform;

// Re-export the primary structs so callers can use `bindery_document::Converter` etc.
pub use context::AppContext;
pub use convert::{ConvertOptions, Converter, ProgressFn, convert};
pub use fit::{fit_dimensions, fit_image};
pub use crate::image::{
    BatchOp, ImageProcessor, Normalizer, OptimizeOptions, Watermarker, batch_process_folder,
    optimize_for_pdf,
};
pub use pdf::reader::{PageBox, PageImage, PdfReader};
pub use pdf::writer::{DocumentAssembler, StagedEncoding, StagedPage};
pub use transform::{TransformStage, Transformed};
