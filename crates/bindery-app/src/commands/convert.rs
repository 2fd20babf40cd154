// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `bindery convert`: flags to PageConfig + TransformSpec, then one run.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bindery_core::{AppConfig, PageConfig, PageSize, TransformOp, TransformSpec, WatermarkPosition};
use bindery_document::AppContext;
use bindery_plugin::Params;
use clap::Args;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Images to bind, in page order.
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Output PDF path.
    #[arg(short, long, default_value = "output.pdf")]
    pub output: PathBuf,

    /// Page size: A4, LETTER, LEGAL, TABLOID, or FIT to keep image sizes.
    #[arg(short = 's', long = "size")]
    pub page_size: Option<PageSize>,

    /// Compress pages as JPEG.
    #[arg(short, long, conflicts_with = "no_compress")]
    pub compress: bool,

    /// Store pages losslessly.
    #[arg(long)]
    pub no_compress: bool,

    /// JPEG quality, 1-100.
    #[arg(short, long)]
    pub quality: Option<i64>,

    /// Watermark text drawn on every page.
    #[arg(long)]
    pub watermark: Option<String>,

    /// top-left, top-right, bottom-left, bottom-right or center.
    #[arg(long, default_value = "bottom-right")]
    pub watermark_position: WatermarkPosition,

    /// Watermark opacity, 0.0-1.0.
    #[arg(long, default_value_t = 0.7)]
    pub opacity: f32,

    /// Watermark font size in pixels.
    #[arg(long, default_value_t = 36)]
    pub font_size: u32,

    /// Effect applied to every image (blur, sharpen, vintage, sepia, ...).
    #[arg(long)]
    pub effect: Option<String>,

    /// Effect intensity, nominally 0.1-3.0.
    #[arg(long, default_value_t = 1.0)]
    pub intensity: f32,

    #[arg(long)]
    pub brightness: Option<f32>,

    #[arg(long)]
    pub contrast: Option<f32>,

    #[arg(long)]
    pub saturation: Option<f32>,

    #[arg(long)]
    pub sharpness: Option<f32>,

    /// Rotate every image clockwise by this many degrees.
    #[arg(long)]
    pub rotate: Option<f32>,

    /// Shrink FIT pages larger than image.max_width x image.max_height.
    #[arg(long)]
    pub cap_native: bool,

    /// Ignore EXIF orientation.
    #[arg(long)]
    pub no_auto_rotate: bool,

    /// Prepare images on a worker pool.
    #[arg(long)]
    pub parallel: bool,

    /// Worker pool size (implies --parallel).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Extra directory to scan for plugins (repeatable).
    #[arg(long = "plugin-dir")]
    pub plugin_dirs: Vec<PathBuf>,

    /// Extra transforms as a JSON array, appended after the flags above.
    #[arg(long)]
    pub transforms: Option<String>,

    /// Document-transform plugin run on the finished PDF (repeatable).
    #[arg(long = "document-plugin")]
    pub document_plugins: Vec<String>,

    /// Title stored in the PDF metadata.
    #[arg(long)]
    pub title: Option<String>,
}

impl ConvertArgs {
    /// Page policy: flags override the settings defaults.
    pub fn page_config(&self, config: &AppConfig) -> PageConfig {
        let defaults = config.page_config();
        let compress = if self.no_compress {
            false
        } else {
            self.compress || defaults.compress()
        };
        PageConfig::new(
            self.page_size.unwrap_or(defaults.page_size()),
            compress,
            self.quality.unwrap_or(defaults.quality() as i64),
        )
    }

    /// Transforms in application order: enhancement, rotation, effect, the
    /// JSON list, then the watermark.
    pub fn transform_spec(&self) -> Result<TransformSpec> {
        let mut spec = TransformSpec::default();

        if self.brightness.is_some() || self.contrast.is_some() || self.saturation.is_some() || self.sharpness.is_some() {
            spec = spec.with(TransformOp::Enhance {
                brightness: self.brightness.unwrap_or(1.0),
                contrast: self.contrast.unwrap_or(1.0),
                saturation: self.saturation.unwrap_or(1.0),
                sharpness: self.sharpness.unwrap_or(1.0),
            });
        }
        if let Some(degrees) = self.rotate {
            spec = spec.with(TransformOp::Rotate { degrees });
        }
        if let Some(name) = &self.effect {
            spec = spec.with(TransformOp::Effect {
                name: name.clone(),
                intensity: self.intensity,
            });
        }
        if let Some(json) = &self.transforms {
            let extra = TransformSpec::from_json(json).context("--transforms is not a valid transform list")?;
            for op in extra.ops() {
                spec = spec.with(op.clone());
            }
        }
        if let Some(text) = &self.watermark {
            if !(0.0..=1.0).contains(&self.opacity) {
                bail!("--opacity must be between 0.0 and 1.0 (got {})", self.opacity);
            }
            spec = spec.with(TransformOp::Watermark {
                text: text.clone(),
                position: self.watermark_position,
                opacity: self.opacity,
                font_size: self.font_size,
            });
        }
        Ok(spec)
    }
}

pub fn run(mut config: AppConfig, args: ConvertArgs, show_progress: bool) -> Result<()> {
    if args.no_auto_rotate {
        config.image.auto_rotate = false;
    }
    if args.parallel || args.workers.is_some() {
        config.performance.parallel = true;
    }
    if let Some(workers) = args.workers {
        config.performance.max_workers = workers.max(1);
    }

    let page_config = args.page_config(&config);
    let transforms = args.transform_spec()?;
    let ctx = AppContext::new(config).with_plugin_dirs(args.plugin_dirs.clone());

    if let Some(report) = ctx.load_report() {
        for failure in &report.failures {
            tracing::warn!(error = %failure, "plugin unavailable");
        }
    }

    let mut options = ctx.convert_options(page_config, transforms);
    options.title = args.title.clone();
    if args.cap_native {
        options.max_size = Some(ctx.native_size_cap());
    }
    options.document_plugins = args
        .document_plugins
        .iter()
        .map(|name| (name.clone(), Params::new()))
        .collect();

    info!(
        images = args.images.len(),
        page_size = %page_config.page_size(),
        compress = page_config.compress(),
        quality = page_config.quality(),
        steps = options.transforms.len(),
        "starting conversion"
    );
    super::run_conversion(ctx.converter(), &args.images, &args.output, &options, show_progress)?;
    Ok(())
}
