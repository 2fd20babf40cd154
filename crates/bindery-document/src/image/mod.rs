// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: normalisation, enhancement, watermarks, effects, and batch
// preparation.

pub mod batch;
pub mod effects;
pub mod normalize;
pub mod processor;
pub mod watermark;

pub use batch::{BatchOp, OptimizeOptions, batch_process_folder, optimize_for_pdf};
pub use normalize::{NormalizedImage, Normalizer};
pub use processor::ImageProcessor;
pub use watermark::Watermarker;
