// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Standalone image preparation: shrink-and-recompress for PDF inclusion, and
// a folder batch that runs a fixed list of operations over every image.

use std::path::{Path, PathBuf};

use bindery_core::types::SUPPORTED_EXTENSIONS;
use bindery_core::BinderyError;
use image::RgbImage;
use image::imageops::{self, FilterType};
use tracing::{error, info, instrument};

use crate::fit::bound_dimensions;
use crate::image::ImageProcessor;
use crate::image::normalize::{apply_orientation, read_orientation, to_document_rgb};

/// Size and quality limits for [`optimize_for_pdf`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_width: 2000,
            max_height: 2000,
            quality: 85,
        }
    }
}

/// One step of [`batch_process_folder`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchOp {
    /// Apply the EXIF orientation.
    AutoRotate,
    /// Shrink into a box and write JPEG.
    Optimize(OptimizeOptions),
    /// Enhancement factors, 1.0 leaves a channel unchanged.
    Enhance {
        brightness: f32,
        contrast: f32,
        color: f32,
        sharpness: f32,
    },
}

impl BatchOp {
    pub fn defaults() -> Vec<BatchOp> {
        vec![BatchOp::AutoRotate, BatchOp::Optimize(OptimizeOptions::default())]
    }
}

/// Flatten `input` to RGB on white, shrink it into the configured box with
/// Lanczos resampling, and write it as JPEG. Without `output` the result
/// goes next to the input as `<stem>_optimized.jpg`.
#[instrument(skip_all, fields(input = %input.display()))]
pub fn optimize_for_pdf(
    input: &Path,
    output: Option<&Path>,
    options: &OptimizeOptions,
) -> Result<PathBuf, BinderyError> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => sibling_with_suffix(input, "_optimized", "jpg"),
    };
    let image = load_rgb(input)?;
    let image = shrink(image, options);
    write_jpeg(image, &output, options.quality)?;
    info!(output = %output.display(), "image optimised");
    Ok(output)
}

/// Run `ops` in order over every supported image directly inside
/// `input_dir`, writing results to `output_dir` (created if missing).
///
/// Files with other extensions are skipped. A file that fails is logged and
/// left out; the rest of the folder still runs. Returns the written paths in
/// file-name order.
#[instrument(skip_all, fields(input = %input_dir.display(), output = %output_dir.display()))]
pub fn batch_process_folder(
    input_dir: &Path,
    output_dir: &Path,
    ops: &[BatchOp],
) -> Result<Vec<PathBuf>, BinderyError> {
    std::fs::create_dir_all(output_dir)?;

    let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported(path))
        .collect();
    inputs.sort();

    let mut processed = Vec::with_capacity(inputs.len());
    for input in &inputs {
        match process_one(input, output_dir, ops) {
            Ok(out) => {
                info!(file = %out.display(), "processed");
                processed.push(out);
            }
            Err(err) => error!(file = %input.display(), error = %err, "batch item failed"),
        }
    }
    Ok(processed)
}

fn process_one(input: &Path, output_dir: &Path, ops: &[BatchOp]) -> Result<PathBuf, BinderyError> {
    let file_name = input
        .file_name()
        .ok_or_else(|| BinderyError::ImageError(format!("no file name in {}", input.display())))?;
    let mut output = output_dir.join(file_name);
    let mut image = load_rgb(input)?;
    let mut jpeg_quality = None;

    for op in ops {
        image = match *op {
            BatchOp::AutoRotate => apply_orientation(image, read_orientation(input)),
            BatchOp::Optimize(options) => {
                jpeg_quality = Some(options.quality);
                shrink(image, &options)
            }
            BatchOp::Enhance {
                brightness,
                contrast,
                color,
                sharpness,
            } => ImageProcessor::from_rgb(image)
                .brightness(brightness)
                .contrast(contrast)
                .color(color)
                .sharpness(sharpness)
                .into_rgb(),
        };
    }

    match jpeg_quality {
        Some(quality) => {
            output.set_extension("jpg");
            write_jpeg(image, &output, quality)?;
        }
        None => ImageProcessor::from_rgb(image).save(&output)?,
    }
    Ok(output)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_rgb(path: &Path) -> Result<RgbImage, BinderyError> {
    Ok(to_document_rgb(ImageProcessor::open(path)?.into_dynamic()))
}

fn shrink(image: RgbImage, options: &OptimizeOptions) -> RgbImage {
    let size = (image.width(), image.height());
    let (w, h) = bound_dimensions(size, (options.max_width, options.max_height));
    if (w, h) == size {
        return image;
    }
    imageops::resize(&image, w, h, FilterType::Lanczos3)
}

fn write_jpeg(image: RgbImage, output: &Path, quality: u8) -> Result<(), BinderyError> {
    let bytes = ImageProcessor::from_rgb(image).to_jpeg_bytes(quality)?;
    std::fs::write(output, bytes)?;
    Ok(())
}

fn sibling_with_suffix(path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    fn write_png(path: &Path, w: u32, h: u32) {
        RgbImage::from_pixel(w, h, Rgb([90, 120, 200])).save(path).unwrap();
    }

    #[test]
    fn optimize_shrinks_into_the_box_and_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("poster.png");
        write_png(&input, 400, 100);

        let options = OptimizeOptions {
            max_width: 200,
            max_height: 200,
            quality: 70,
        };
        let out = optimize_for_pdf(&input, None, &options).unwrap();
        assert_eq!(out, dir.path().join("poster_optimized.jpg"));

        let written = image::open(&out).unwrap();
        assert_eq!((written.width(), written.height()), (200, 50));
        assert_eq!(
            image::ImageFormat::from_path(&out).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn optimize_keeps_small_images_and_flattens_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clear.png");
        RgbaImage::from_pixel(30, 20, Rgba([0, 0, 0, 0])).save(&input).unwrap();
        let target = dir.path().join("flat.jpg");

        let out = optimize_for_pdf(&input, Some(&target), &OptimizeOptions::default()).unwrap();
        assert_eq!(out, target);
        let written = image::open(&out).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (30, 20));
        let Rgb([r, g, b]) = *written.get_pixel(15, 10);
        assert!(r > 245 && g > 245 && b > 245, "transparent pixels become white");
    }

    #[test]
    fn optimize_reports_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.png");
        std::fs::write(&input, b"not an image").unwrap();
        assert!(matches!(
            optimize_for_pdf(&input, None, &OptimizeOptions::default()),
            Err(BinderyError::ImageError(_))
        ));
    }

    #[test]
    fn batch_skips_other_files_and_survives_failures() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let out_dir = output.path().join("processed");
        write_png(&input.path().join("b.png"), 3000, 1000);
        write_png(&input.path().join("a.PNG"), 10, 10);
        std::fs::write(input.path().join("notes.txt"), "skip me").unwrap();
        std::fs::write(input.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let written = batch_process_folder(input.path(), &out_dir, &BatchOp::defaults()).unwrap();
        assert_eq!(written, vec![out_dir.join("a.jpg"), out_dir.join("b.jpg")]);

        let big = image::open(out_dir.join("b.jpg")).unwrap();
        assert_eq!((big.width(), big.height()), (2000, 666));
        assert!(!out_dir.join("notes.txt").exists());
    }

    #[test]
    fn batch_without_optimize_keeps_the_file_format() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(&input.path().join("page.png"), 8, 8);

        let ops = [BatchOp::Enhance {
            brightness: 0.0,
            contrast: 1.0,
            color: 1.0,
            sharpness: 1.0,
        }];
        let written = batch_process_folder(input.path(), output.path(), &ops).unwrap();
        assert_eq!(written, vec![output.path().join("page.png")]);
        let page = image::open(&written[0]).unwrap().to_rgb8();
        assert_eq!(*page.get_pixel(4, 4), Rgb([0, 0, 0]));
    }
}
