// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text watermarks: white text drawn on a transparent overlay, composited onto
// the page image.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use bindery_core::{BinderyError, WatermarkPosition};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, info, warn};

/// Distance in pixels between the text box and the image edge.
pub const MARGIN: i32 = 20;

/// Fonts tried when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Side of one glyph cell in the built-in bitmap font.
const CELL: u32 = 8;

enum Glyphs {
    Outline { font: FontVec, source: PathBuf },
    /// 8x8 bitmap glyphs, scaled up by whole pixels.
    Bitmap,
}

/// Renders watermark text with one font.
///
/// Without a configured or installed TrueType font the built-in bitmap font
/// is used, so a watermark step never fails for lack of fonts.
pub struct Watermarker {
    glyphs: Glyphs,
}

impl Watermarker {
    /// Load a TrueType/OpenType font file.
    pub fn from_font_file(path: &Path) -> Result<Self, BinderyError> {
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data).map_err(|e| {
            BinderyError::ImageError(format!("invalid font {}: {e}", path.display()))
        })?;
        debug!(font = %path.display(), "watermark font loaded");
        Ok(Self {
            glyphs: Glyphs::Outline {
                font,
                source: path.to_path_buf(),
            },
        })
    }

    /// The built-in bitmap font.
    pub fn bitmap() -> Self {
        Self { glyphs: Glyphs::Bitmap }
    }

    /// Use the configured font, else the first system font that loads, else
    /// the built-in bitmap font. Only a configured font that cannot be
    /// loaded is an error.
    pub fn discover(configured: Option<&Path>) -> Result<Self, BinderyError> {
        if let Some(path) = configured {
            return Self::from_font_file(path);
        }
        let found = SYSTEM_FONTS
            .iter()
            .map(Path::new)
            .filter(|p| p.is_file())
            .find_map(|p| Self::from_font_file(p).ok());
        Ok(found.unwrap_or_else(|| {
            warn!("no system font found, watermarks use the built-in bitmap font");
            Self::bitmap()
        }))
    }

    /// Path of the loaded font file; `None` for the bitmap font.
    pub fn font_path(&self) -> Option<&Path> {
        match &self.glyphs {
            Glyphs::Outline { source, .. } => Some(source),
            Glyphs::Bitmap => None,
        }
    }

    /// Pixel size of `text` at `font_size`.
    pub fn measure(&self, text: &str, font_size: u32) -> (u32, u32) {
        match &self.glyphs {
            Glyphs::Outline { font, .. } => text_size(PxScale::from(font_size.max(1) as f32), font, text),
            Glyphs::Bitmap => bitmap_size(text, bitmap_scale(font_size)),
        }
    }

    /// Draw `text` onto `image`.
    ///
    /// `opacity` is clamped to [0, 1] and becomes the overlay alpha
    /// `round(255 * opacity)`.
    pub fn apply(
        &self,
        image: &RgbImage,
        text: &str,
        position: WatermarkPosition,
        opacity: f32,
        font_size: u32,
    ) -> RgbImage {
        let (w, h) = image.dimensions();
        let (tw, th) = self.measure(text, font_size);
        let (x, y) = anchor(position, (w, h), (tw, th));
        let alpha = (255.0 * opacity.clamp(0.0, 1.0)).round() as u8;
        let color = Rgba([255, 255, 255, alpha]);

        info!(?position, x, y, alpha, "drawing watermark");

        let mut overlay = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 0]));
        match &self.glyphs {
            Glyphs::Outline { font, .. } => {
                let scale = PxScale::from(font_size.max(1) as f32);
                draw_text_mut(&mut overlay, color, x, y, scale, font, text);
            }
            Glyphs::Bitmap => draw_bitmap_text(&mut overlay, color, (x, y), bitmap_scale(font_size), text),
        }
        composite(image, &overlay)
    }
}

impl std::fmt::Debug for Watermarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let font = match &self.glyphs {
            Glyphs::Outline { source, .. } => source.display().to_string(),
            Glyphs::Bitmap => "built-in bitmap".to_string(),
        };
        f.debug_struct("Watermarker").field("font", &font).finish()
    }
}

fn bitmap_scale(font_size: u32) -> u32 {
    (font_size / CELL).max(1)
}

/// Glyph cells are separated by one scaled pixel column.
fn bitmap_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    let width = if chars == 0 {
        0
    } else {
        chars * CELL * scale + (chars - 1) * scale
    };
    (width, CELL * scale)
}

fn draw_bitmap_text(overlay: &mut RgbaImage, color: Rgba<u8>, (x, y): (i32, i32), scale: u32, text: &str) {
    let (w, h) = overlay.dimensions();
    let mut cursor = x;
    for ch in text.chars() {
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')).unwrap_or([0; 8]);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..CELL {
                if (*bits >> col) & 1 == 0 {
                    continue;
                }
                let left = cursor + (col * scale) as i32;
                let top = y + (row as u32 * scale) as i32;
                for dy in 0..scale as i32 {
                    for dx in 0..scale as i32 {
                        let (px, py) = (left + dx, top + dy);
                        if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
                            overlay.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        cursor += ((CELL + 1) * scale) as i32;
    }
}

/// Top-left corner of the text box for a position.
pub fn anchor(position: WatermarkPosition, (w, h): (u32, u32), (tw, th): (u32, u32)) -> (i32, i32) {
    let (w, h, tw, th) = (w as i32, h as i32, tw as i32, th as i32);
    match position {
        WatermarkPosition::TopLeft => (MARGIN, MARGIN),
        WatermarkPosition::TopRight => (w - tw - MARGIN, MARGIN),
        WatermarkPosition::BottomLeft => (MARGIN, h - th - MARGIN),
        WatermarkPosition::BottomRight => (w - tw - MARGIN, h - th - MARGIN),
        WatermarkPosition::Center => ((w - tw) / 2, (h - th) / 2),
    }
}

/// Alpha-composite the overlay onto an opaque base.
fn composite(base: &RgbImage, overlay: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let b = base.get_pixel(x, y);
        let Rgba([or, og, ob, oa]) = *overlay.get_pixel(x, y);
        let a = oa as u32;
        let mix = |bc: u8, oc: u8| ((bc as u32 * (255 - a) + oc as u32 * a + 127) / 255) as u8;
        Rgb([mix(b[0], or), mix(b[1], og), mix(b[2], ob)])
    })
}
