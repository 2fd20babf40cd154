// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page fitter: target raster size for an image on a page.

use bindery_core::PageSize;
use image::RgbImage;

use crate::image::ImageProcessor;

/// Dimensions an image of `(width, height)` takes on `page`.
///
/// Fixed pages scale the image (up or down) until it touches the page edges
/// on one axis, preserving its aspect ratio. `Fit` keeps the source size.
pub fn fit_dimensions((width, height): (u32, u32), page: PageSize) -> (u32, u32) {
    let Some((page_w, page_h)) = page.dimensions_pt() else {
        return (width, height);
    };
    if width == 0 || height == 0 {
        return (width, height);
    }

    let page_ratio = page_w as f64 / page_h as f64;
    let image_ratio = width as f64 / height as f64;
    if image_ratio > page_ratio {
        (page_w, ((page_w as f64 / image_ratio) as u32).max(1))
    } else {
        (((page_h as f64 * image_ratio) as u32).max(1), page_h)
    }
}

/// Shrink `(width, height)` to fit inside `(max_w, max_h)`, keeping the aspect
/// ratio. Sizes already inside the box are returned unchanged.
pub fn bound_dimensions((width, height): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    (
        ((width as f64 * scale) as u32).max(1),
        ((height as f64 * scale) as u32).max(1),
    )
}

/// Resample `image` to its fitted size. Resamples at most once.
///
/// On `Fit` pages `max_size`, when given, caps the native size.
pub fn fit_image(image: RgbImage, page: PageSize, max_size: Option<(u32, u32)>) -> RgbImage {
    let mut target = fit_dimensions(image.dimensions(), page);
    if page == PageSize::Fit {
        if let Some(max) = max_size {
            target = bound_dimensions(target, max);
        }
    }
    if target == image.dimensions() {
        return image;
    }
    ImageProcessor::from_rgb(image).resize_exact(target.0, target.1).into_rgb()
}
