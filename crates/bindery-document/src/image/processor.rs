// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: resize, rotate, grayscale, and the enhancement family
// (brightness, contrast, colour, sharpness). Operates on in-memory images
// using the `image` and `imageproc` crates.
//
// Every enhancement is a blend between the image and a "degenerate" version
// of it: black for brightness, flat mean grey for contrast, greyscale for
// colour, a smoothed copy for sharpness. A factor of 1.0 returns the image
// unchanged, 0.0 returns the degenerate image, and values above 1.0
// extrapolate.

use std::path::Path;

use bindery_core::BinderyError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::geometric_transformations::{self, Interpolation};
use tracing::{debug, info, instrument};

/// Image processing pipeline operating on a single in-memory image.
///
/// Each method consumes `self` and returns a new `ImageProcessor`, so calls
/// chain:
///
/// ```ignore
/// let page = ImageProcessor::open("scan.png")?
///     .rotate(90.0)
///     .contrast(1.2)
///     .resize_exact(595, 842)
///     .to_jpeg_bytes(85)?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BinderyError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            BinderyError::ImageError(format!("failed to open {}: {}", path.as_ref().display(), err))
        })?;
        debug!(width = img.width(), height = img.height(), "image loaded");
        Ok(Self { image: img })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Consume the processor, converting to 8-bit RGB if needed.
    pub fn into_rgb(self) -> RgbImage {
        match self.image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        }
    }

    // -- Geometry -------------------------------------------------------------

    /// Resize to exactly `width` x `height` with Lanczos3 filtering.
    #[instrument(skip(self))]
    pub fn resize_exact(self, width: u32, height: u32) -> Self {
        if self.image.width() == width && self.image.height() == height {
            return self;
        }
        debug!(
            from_w = self.image.width(),
            from_h = self.image.height(),
            "resizing image"
        );
        Self {
            image: self.image.resize_exact(width, height, FilterType::Lanczos3),
        }
    }

    /// Rotate clockwise by an arbitrary angle in degrees.
    ///
    /// Multiples of 90 are lossless and swap the dimensions as needed. Other
    /// angles rotate about the centre on a canvas of the same size, filling
    /// uncovered corners with white.
    #[instrument(skip(self))]
    pub fn rotate(self, degrees: f32) -> Self {
        let normalised = degrees.rem_euclid(360.0);
        if (normalised - 90.0).abs() < 0.01 {
            return Self {
                image: self.image.rotate90(),
            };
        }
        if (normalised - 180.0).abs() < 0.01 {
            return Self {
                image: self.image.rotate180(),
            };
        }
        if (normalised - 270.0).abs() < 0.01 {
            return Self {
                image: self.image.rotate270(),
            };
        }
        if normalised < 0.01 || (normalised - 360.0).abs() < 0.01 {
            return self;
        }

        info!(degrees, "rotating by arbitrary angle");
        let rgb = self.into_rgb();
        let rotated = geometric_transformations::rotate_about_center(
            &rgb,
            degrees.to_radians(),
            Interpolation::Bilinear,
            Rgb([255u8, 255, 255]),
        );
        Self::from_rgb(rotated)
    }

    // -- Colour ---------------------------------------------------------------

    /// Greyscale, kept in RGB layout.
    pub fn grayscale(self) -> Self {
        Self::from_rgb(grayscale_rgb(&self.into_rgb()))
    }

    /// Scale brightness. 0.0 is black.
    pub fn brightness(self, factor: f32) -> Self {
        if factor == 1.0 {
            return self;
        }
        let rgb = self.into_rgb();
        let black = RgbImage::new(rgb.width(), rgb.height());
        Self::from_rgb(blend(&black, &rgb, factor))
    }

    /// Scale contrast around the mean luminance. 0.0 is flat grey.
    pub fn contrast(self, factor: f32) -> Self {
        if factor == 1.0 {
            return self;
        }
        let rgb = self.into_rgb();
        let mean = mean_luma(&rgb);
        let flat = RgbImage::from_pixel(rgb.width(), rgb.height(), Rgb([mean, mean, mean]));
        Self::from_rgb(blend(&flat, &rgb, factor))
    }

    /// Scale saturation. 0.0 is greyscale.
    pub fn color(self, factor: f32) -> Self {
        if factor == 1.0 {
            return self;
        }
        let rgb = self.into_rgb();
        let grey = grayscale_rgb(&rgb);
        Self::from_rgb(blend(&grey, &rgb, factor))
    }

    /// Scale sharpness. 0.0 is a smoothed image, 2.0 a sharpened one.
    pub fn sharpness(self, factor: f32) -> Self {
        if factor == 1.0 {
            return self;
        }
        let rgb = self.into_rgb();
        let smooth = convolve3x3(&rgb, &SMOOTH_KERNEL, 13, 0);
        Self::from_rgb(blend(&smooth, &rgb, factor))
    }

    // -- Output ---------------------------------------------------------------

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, BinderyError> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| BinderyError::ImageError(format!("PNG encoding failed: {err}")))?;
        Ok(buffer)
    }

    /// Encode as baseline JPEG with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, BinderyError> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        rgb.write_with_encoder(encoder)
            .map_err(|err| BinderyError::ImageError(format!("JPEG encoding failed: {err}")))?;
        Ok(buffer)
    }

    /// Write the image to a file; the format follows the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BinderyError> {
        self.image.save(path.as_ref()).map_err(|err| {
            BinderyError::ImageError(format!(
                "failed to save image to {}: {}",
                path.as_ref().display(),
                err
            ))
        })
    }
}

/// Smoothing kernel used as the sharpness baseline.
pub(crate) const SMOOTH_KERNEL: [i32; 9] = [1, 1, 1, 1, 5, 1, 1, 1, 1];

/// ITU-R 601-2 luma.
pub(crate) fn luma(Rgb([r, g, b]): Rgb<u8>) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

pub(crate) fn grayscale_rgb(image: &RgbImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let l = luma(*image.get_pixel(x, y));
        Rgb([l, l, l])
    })
}

fn mean_luma(image: &RgbImage) -> u8 {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return 0;
    }
    let total: u64 = image.pixels().map(|p| luma(*p) as u64).sum();
    ((total as f64 / count as f64) + 0.5) as u8
}

/// `degenerate * (1 - factor) + image * factor`, clamped per channel.
pub(crate) fn blend(degenerate: &RgbImage, image: &RgbImage, factor: f32) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let d = degenerate.get_pixel(x, y);
        let i = image.get_pixel(x, y);
        let mix = |c: usize| {
            let v = d[c] as f32 + (i[c] as f32 - d[c] as f32) * factor;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb([mix(0), mix(1), mix(2)])
    })
}

/// Apply a 3x3 kernel: `sum / scale + offset`, clamped. Border pixels are
/// copied unchanged.
pub(crate) fn convolve3x3(image: &RgbImage, kernel: &[i32; 9], scale: i32, offset: i32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return image.clone();
    }
    let mut out = image.clone();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0i32; 3];
            for ky in 0..3u32 {
                for kx in 0..3u32 {
                    let weight = kernel[(ky * 3 + kx) as usize];
                    let p = image.get_pixel(x + kx - 1, y + ky - 1);
                    for (c, sum) in acc.iter_mut().enumerate() {
                        *sum += weight * p[c] as i32;
                    }
                }
            }
            let px = acc.map(|sum| {
                let v = (sum as f32 / scale as f32).round() as i32 + offset;
                v.clamp(0, 255) as u8
            });
            out.put_pixel(x, y, Rgb(px));
        }
    }
    out
}
