// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image normalizer: validates source files, reads EXIF orientation, and
// decodes into opaque 8-bit RGB.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use bindery_core::{ColorMode, ConversionError, ImageFormat, SUPPORTED_EXTENSIONS, SourceImage};
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};
use tracing::{debug, instrument, warn};

/// A decoded source image in a document-safe colour mode.
pub struct NormalizedImage {
    pub image: RgbImage,
    /// Whether the EXIF orientation has already been applied.
    pub oriented: bool,
}

/// Validates inputs and decodes them into RGB.
#[derive(Debug, Clone)]
pub struct Normalizer {
    extensions: Vec<String>,
    auto_rotate: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Normalizer {
    pub fn new(auto_rotate: bool) -> Self {
        Self {
            extensions: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            auto_rotate,
        }
    }

    /// Restrict accepted extensions further. Extensions outside the built-in
    /// supported set are ignored.
    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| ImageFormat::from_extension(e).is_some())
            .collect();
        self
    }

    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    /// Check that `path` is a readable image of a supported format, and
    /// record its dimensions, colour mode and orientation. Only the header is
    /// decoded.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn validate(&self, index: usize, path: &Path) -> Result<SourceImage, ConversionError> {
        let invalid = |reason: String| ConversionError::InvalidFormat {
            path: path.to_path_buf(),
            reason,
        };

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.extensions.iter().any(|e| *e == ext) {
            return Err(invalid(format!("unsupported extension '{ext}'")));
        }
        let format = ImageFormat::from_extension(&ext)
            .ok_or_else(|| invalid(format!("unsupported extension '{ext}'")))?;

        if !path.is_file() {
            return Err(invalid("file does not exist".into()));
        }

        let decoder = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| invalid(e.to_string()))?
            .into_decoder()
            .map_err(|e| invalid(e.to_string()))?;
        let dimensions = decoder.dimensions();
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(invalid("image has no pixels".into()));
        }
        let color_mode = color_mode_of(decoder.color_type());
        let orientation = read_orientation(path);

        debug!(?dimensions, ?color_mode, orientation, "image validated");
        Ok(SourceImage::new(
            index,
            path.to_path_buf(),
            format,
            dimensions,
            color_mode,
            orientation,
        ))
    }

    /// Alias for [`Normalizer::validate`].
    pub fn normalize(&self, index: usize, path: &Path) -> Result<SourceImage, ConversionError> {
        self.validate(index, path)
    }

    /// Decode a validated image: composite any alpha onto white, convert to
    /// RGB, and apply the EXIF orientation when auto-rotate is on.
    #[instrument(skip_all, fields(index = source.index()))]
    pub fn load(&self, source: &SourceImage) -> Result<NormalizedImage, ConversionError> {
        let invalid = |reason: String| ConversionError::InvalidFormat {
            path: source.path().to_path_buf(),
            reason,
        };
        let decoded = ImageReader::open(source.path())
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| invalid(e.to_string()))?
            .decode()
            .map_err(|e| invalid(e.to_string()))?;
        let rgb = to_document_rgb(decoded);
        if self.auto_rotate {
            Ok(NormalizedImage {
                image: apply_orientation(rgb, source.orientation()),
                oriented: true,
            })
        } else {
            Ok(NormalizedImage {
                image: rgb,
                oriented: false,
            })
        }
    }
}

fn color_mode_of(color: ColorType) -> ColorMode {
    match color {
        ColorType::L8 => ColorMode::Luma,
        ColorType::La8 => ColorMode::LumaAlpha,
        ColorType::Rgb8 => ColorMode::Rgb,
        ColorType::Rgba8 => ColorMode::Rgba,
        other => ColorMode::Other {
            has_alpha: other.has_alpha(),
        },
    }
}

/// Convert any decoded image to opaque RGB. Transparent pixels are blended
/// onto white using their alpha.
pub fn to_document_rgb(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return match image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        };
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let over_white = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Read the EXIF orientation tag. Missing or unreadable metadata reads as 1.
pub fn read_orientation(path: &Path) -> u32 {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return 1,
    };
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(meta) => meta
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .filter(|v| (1..=8).contains(v))
            .unwrap_or(1),
        Err(exif::Error::NotFound(_)) => 1,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable EXIF data, keeping original orientation");
            1
        }
    }
}

/// Turn the stored pixels upright for the given EXIF orientation.
///
/// 3 rotates 180 degrees, 6 rotates 90 degrees clockwise, 8 rotates 270
/// degrees clockwise. The mirrored variants (2, 4, 5, 7) flip as well.
pub fn apply_orientation(image: RgbImage, orientation: u32) -> RgbImage {
    use image::imageops;
    match orientation {
        2 => imageops::flip_horizontal(&image),
        3 => imageops::rotate180(&image),
        4 => imageops::flip_vertical(&image),
        5 => imageops::flip_horizontal(&imageops::rotate90(&image)),
        6 => imageops::rotate90(&image),
        7 => imageops::flip_horizontal(&imageops::rotate270(&image)),
        8 => imageops::rotate270(&image),
        _ => image,
    }
}
