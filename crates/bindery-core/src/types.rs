// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bindery conversion pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversionError;

/// Unique identifier for a conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Source images ------------------------------------------------------------

/// Extensions accepted as conversion input (lower-case, without the dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "gif"];

/// Supported input image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    Gif,
}

impl ImageFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "tiff" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Gif => "image/gif",
        }
    }
}

/// Pixel layout of a decoded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// Single luminance channel.
    Luma,
    /// Luminance with alpha.
    LumaAlpha,
    Rgb,
    Rgba,
    /// Anything else (16-bit or floating point layouts).
    Other { has_alpha: bool },
}

impl ColorMode {
    pub fn has_alpha(&self) -> bool {
        match self {
            Self::LumaAlpha | Self::Rgba => true,
            Self::Other { has_alpha } => *has_alpha,
            Self::Luma | Self::Rgb => false,
        }
    }

    /// Whether the mode can be written into a PDF page without conversion.
    pub fn is_document_safe(&self) -> bool {
        matches!(self, Self::Rgb)
    }
}

/// A validated source file.
///
/// Created once by the normalizer; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    index: usize,
    path: PathBuf,
    format: ImageFormat,
    width: u32,
    height: u32,
    color_mode: ColorMode,
    /// EXIF orientation tag (1 when absent or unreadable).
    orientation: u32,
}

impl SourceImage {
    pub fn new(
        index: usize,
        path: PathBuf,
        format: ImageFormat,
        (width, height): (u32, u32),
        color_mode: ColorMode,
        orientation: u32,
    ) -> Self {
        Self {
            index,
            path,
            format,
            width,
            height,
            color_mode,
            orientation,
        }
    }

    /// Position in the caller's input list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn orientation(&self) -> u32 {
        self.orientation
    }
}

// -- Page configuration -------------------------------------------------------

/// Target page policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageSize {
    A4,
    Letter,
    Legal,
    Tabloid,
    /// Keep each image at its own dimensions.
    Fit,
}

impl PageSize {
    pub const ALL: [PageSize; 5] = [
        PageSize::A4,
        PageSize::Letter,
        PageSize::Legal,
        PageSize::Tabloid,
        PageSize::Fit,
    ];

    /// Page dimensions in PDF points (1/72 inch), or `None` for `Fit`.
    pub fn dimensions_pt(&self) -> Option<(u32, u32)> {
        match self {
            Self::A4 => Some((595, 842)),
            Self::Letter => Some((612, 792)),
            Self::Legal => Some((612, 1008)),
            Self::Tabloid => Some((792, 1224)),
            Self::Fit => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::Letter => "LETTER",
            Self::Legal => "LEGAL",
            Self::Tabloid => "TABLOID",
            Self::Fit => "FIT",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A4" => Ok(Self::A4),
            "LETTER" => Ok(Self::Letter),
            "LEGAL" => Ok(Self::Legal),
            "TABLOID" => Ok(Self::Tabloid),
            "FIT" => Ok(Self::Fit),
            other => Err(format!(
                "unknown page size '{other}' (expected A4, LETTER, LEGAL, TABLOID or FIT)"
            )),
        }
    }
}

/// Lowest and highest accepted compression quality.
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;
pub const DEFAULT_QUALITY: u8 = 85;

/// Page policy plus compression settings for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPageConfig")]
pub struct PageConfig {
    page_size: PageSize,
    compress: bool,
    quality: u8,
}

impl PageConfig {
    /// Build a config; `quality` is clamped to [1, 100].
    pub fn new(page_size: PageSize, compress: bool, quality: i64) -> Self {
        Self {
            page_size,
            compress,
            quality: clamp_quality(quality),
        }
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Quality to encode with, or `None` when compression is off.
    pub fn effective_quality(&self) -> Option<u8> {
        self.compress.then_some(self.quality)
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self::new(PageSize::A4, false, DEFAULT_QUALITY as i64)
    }
}

/// Unvalidated wire form; deserialization goes through [`PageConfig::new`].
#[derive(Deserialize)]
struct RawPageConfig {
    page_size: PageSize,
    compress: bool,
    quality: i64,
}

impl From<RawPageConfig> for PageConfig {
    fn from(raw: RawPageConfig) -> Self {
        Self::new(raw.page_size, raw.compress, raw.quality)
    }
}

/// Clamp an arbitrary integer into the accepted quality range.
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(MIN_QUALITY as i64, MAX_QUALITY as i64) as u8
}

// -- Transforms ---------------------------------------------------------------

/// Anchor for a text watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl FromStr for WatermarkPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            "center" => Ok(Self::Center),
            other => Err(format!("unknown watermark position '{other}'")),
        }
    }
}

fn unit_factor() -> f32 {
    1.0
}

fn default_opacity() -> f32 {
    0.7
}

fn default_font_size() -> u32 {
    36
}

/// One named operation of a [`TransformSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// Brightness/contrast/saturation/sharpness factors; 1.0 is a no-op.
    Enhance {
        #[serde(default = "unit_factor")]
        brightness: f32,
        #[serde(default = "unit_factor")]
        contrast: f32,
        #[serde(default = "unit_factor")]
        saturation: f32,
        #[serde(default = "unit_factor")]
        sharpness: f32,
    },
    /// Apply the EXIF orientation of the source file.
    AutoRotate,
    /// Rotate clockwise by an arbitrary angle in degrees.
    Rotate { degrees: f32 },
    Watermark {
        text: String,
        #[serde(default)]
        position: WatermarkPosition,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default = "default_font_size")]
        font_size: u32,
    },
    /// A named effect resolved through the plugin registry.
    Effect {
        name: String,
        #[serde(default = "unit_factor")]
        intensity: f32,
    },
    /// Invoke a loaded image-transform plugin directly.
    Plugin {
        name: String,
        #[serde(default)]
        params: serde_json::Map<String, serde_json::Value>,
    },
}

impl TransformOp {
    /// Step label used in logs and failure reports.
    pub fn step_name(&self) -> String {
        match self {
            Self::Enhance { .. } => "enhance".into(),
            Self::AutoRotate => "auto_rotate".into(),
            Self::Rotate { .. } => "rotate".into(),
            Self::Watermark { .. } => "watermark".into(),
            Self::Effect { name, .. } => format!("effect:{name}"),
            Self::Plugin { name, .. } => format!("plugin:{name}"),
        }
    }
}

/// Caller-supplied ordered list of transforms. Never mutated by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformSpec(Vec<TransformOp>);

impl TransformSpec {
    pub fn new(ops: Vec<TransformOp>) -> Self {
        Self(ops)
    }

    /// Parse a JSON array of operations.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn ops(&self) -> &[TransformOp] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Builder-style append.
    pub fn with(mut self, op: TransformOp) -> Self {
        self.0.push(op);
        self
    }

    /// Whether the spec already contains an explicit auto-rotate step.
    pub fn has_auto_rotate(&self) -> bool {
        self.0.iter().any(|op| matches!(op, TransformOp::AutoRotate))
    }
}

// -- Run state and results ----------------------------------------------------

/// Lifecycle of one conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionState {
    Idle,
    Validating,
    Preparing,
    Assembling,
    /// Terminal: document written.
    Done,
    /// Terminal: empty input, cancellation, or assembly failure.
    Failed,
}

impl ConversionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A transform step that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub reason: String,
}

/// What happened to one input image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStatus {
    /// Placed on `page` (1-indexed), possibly with some steps skipped.
    Converted {
        page: usize,
        width: u32,
        height: u32,
        skipped_steps: Vec<StepFailure>,
    },
    /// Dropped from the document.
    Failed(ConversionError),
}

/// Per-image outcome in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub index: usize,
    pub path: PathBuf,
    pub status: ImageStatus,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ImageStatus::Converted { .. })
    }
}

/// Result of one successful `convert` call.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub run_id: RunId,
    pub output_path: PathBuf,
    pub page_count: usize,
    pub outcomes: Vec<ImageOutcome>,
    /// Document-transform plugin steps that failed after assembly.
    pub document_failures: Vec<StepFailure>,
}

impl ConversionResult {
    /// Outcomes of images that were dropped.
    pub fn failures(&self) -> impl Iterator<Item = &ImageOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn converted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.converted_count()
    }
}
