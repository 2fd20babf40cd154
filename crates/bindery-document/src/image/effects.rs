// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Named photographic effects. Each takes an intensity (nominally 0.1 to 3.0)
// and derives and clamps its own filter parameter from it.

use image::{Rgb, RgbImage, imageops};
use imageproc::filter::median_filter;
use tracing::warn;

use super::processor::{ImageProcessor, blend, convolve3x3, grayscale_rgb};

/// Effect names accepted by [`apply_effect`], `none` included.
pub const EFFECTS: &[&str] = &[
    "none",
    "blur",
    "sharpen",
    "vintage",
    "sepia",
    "black_white",
    "enhance_colors",
    "edge_enhance",
    "emboss",
    "oil_painting",
];

const EDGE_ENHANCE: [i32; 9] = [-1, -1, -1, -1, 10, -1, -1, -1, -1];
const EDGE_ENHANCE_MORE: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];
const EMBOSS: [i32; 9] = [-1, 0, 0, 0, 1, 0, 0, 0, 0];

const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Apply one named effect. Unknown names leave the image unchanged.
pub fn apply_effect(image: &RgbImage, name: &str, intensity: f32) -> RgbImage {
    match name {
        "none" => image.clone(),
        "blur" => blur(image, intensity),
        "sharpen" => ImageProcessor::from_rgb(image.clone())
            .sharpness(1.0 + intensity)
            .into_rgb(),
        "vintage" => vintage(image, intensity),
        "sepia" => sepia(image, intensity),
        "black_white" => grayscale_rgb(image),
        "enhance_colors" => ImageProcessor::from_rgb(image.clone())
            .color(1.0 + (intensity - 1.0) * 0.5)
            .into_rgb(),
        "edge_enhance" => edge_enhance(image, intensity),
        "emboss" => convolve3x3(image, &EMBOSS, 1, 128),
        "oil_painting" => oil_painting(image),
        other => {
            warn!(effect = other, "unknown effect, image left unchanged");
            image.clone()
        }
    }
}

/// Gaussian blur with radius `clamp(2 * intensity, 0.1, 10)`.
pub fn blur(image: &RgbImage, intensity: f32) -> RgbImage {
    let radius = (intensity * 2.0).clamp(0.1, 10.0);
    imageops::blur(image, radius)
}

/// Sepia tone. Below intensity 1.0 the tone is blended with the original.
pub fn sepia(image: &RgbImage, intensity: f32) -> RgbImage {
    let t = intensity.clamp(0.0, 1.0);
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let src = [p[0] as f32, p[1] as f32, p[2] as f32];
        let channel = |row: &[f32; 3], original: f32| {
            let toned = (row[0] * src[0] + row[1] * src[1] + row[2] * src[2]).clamp(0.0, 255.0);
            let mixed = if intensity < 1.0 {
                original * (1.0 - t) + toned * t
            } else {
                toned
            };
            mixed as u8
        };
        Rgb([
            channel(&SEPIA[0], src[0]),
            channel(&SEPIA[1], src[1]),
            channel(&SEPIA[2], src[2]),
        ])
    })
}

/// Sepia at 70% of the intensity, slightly reduced contrast, and a faint blur.
fn vintage(image: &RgbImage, intensity: f32) -> RgbImage {
    let toned = sepia(image, intensity * 0.7);
    let flattened = ImageProcessor::from_rgb(toned).contrast(0.9).into_rgb();
    imageops::blur(&flattened, 0.3)
}

fn edge_enhance(image: &RgbImage, intensity: f32) -> RgbImage {
    let enhanced = if intensity > 1.5 {
        convolve3x3(image, &EDGE_ENHANCE_MORE, 1, 0)
    } else {
        convolve3x3(image, &EDGE_ENHANCE, 2, 0)
    };
    blend(image, &enhanced, (intensity * 0.3).min(1.0))
}

/// Median filter, a soft blur, then a colour boost.
fn oil_painting(image: &RgbImage) -> RgbImage {
    let median = median_filter(image, 1, 1);
    let soft = imageops::blur(&median, 1.0);
    ImageProcessor::from_rgb(soft).color(1.2).into_rgb()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([220, 40, 40])
            } else {
                Rgb([30, 30, 200])
            }
        })
    }

    #[test]
    fn every_listed_effect_runs() {
        let img = checker(12, 10);
        for name in EFFECTS {
            let out = apply_effect(&img, name, 1.0);
            assert_eq!(out.dimensions(), img.dimensions(), "{name}");
        }
    }

    #[test]
    fn unknown_effect_leaves_image_unchanged() {
        let img = checker(4, 4);
        assert_eq!(apply_effect(&img, "glitter", 1.0), img);
    }

    #[test]
    fn none_is_identity() {
        let img = checker(6, 6);
        assert_eq!(apply_effect(&img, "none", 2.0), img);
    }

    #[test]
    fn black_white_is_grey() {
        let out = apply_effect(&checker(6, 6), "black_white", 1.0);
        assert!(out.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }

    #[test]
    fn sepia_matrix_on_white_saturates_red_and_green() {
        let white = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let toned = sepia(&white, 1.0);
        assert_eq!(toned.get_pixel(0, 0).0, [255, 255, 238]);

        let half = sepia(&RgbImage::from_pixel(1, 1, Rgb([0, 0, 0])), 0.5);
        assert_eq!(half.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn blur_smooths_a_checkerboard() {
        let img = checker(16, 16);
        let out = blur(&img, 1.0);
        let spread = |im: &RgbImage| {
            let reds: Vec<u8> = im.pixels().map(|p| p[0]).collect();
            reds.iter().max().unwrap() - reds.iter().min().unwrap()
        };
        assert!(spread(&out) < spread(&img));
    }

    #[test]
    fn emboss_flat_image_is_mid_grey_inside() {
        let flat = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        let out = apply_effect(&flat, "emboss", 1.0);
        assert_eq!(out.get_pixel(2, 2).0, [128, 128, 128]);
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100]);
    }
}
