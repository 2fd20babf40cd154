// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `bindery optimize`: shrink and recompress images ahead of binding, one
// file or a whole folder.

use std::path::PathBuf;

use anyhow::{Result, bail};
use bindery_core::AppConfig;
use bindery_document::{BatchOp, OptimizeOptions, batch_process_folder, optimize_for_pdf};
use clap::Args;

#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Image file, or a folder of images.
    pub input: PathBuf,

    /// Output file (single image) or folder (required for a folder input).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Longest allowed width and height in pixels.
    #[arg(long, default_value_t = 2000)]
    pub max: u32,

    /// JPEG quality (1-100); defaults to pdf.default_quality.
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Folder mode: skip EXIF orientation.
    #[arg(long)]
    pub no_rotate: bool,
}

pub fn run(config: AppConfig, args: OptimizeArgs) -> Result<()> {
    let options = OptimizeOptions {
        max_width: args.max.max(1),
        max_height: args.max.max(1),
        quality: args.quality.unwrap_or(config.pdf.default_quality).clamp(1, 100),
    };

    if args.input.is_dir() {
        let Some(output) = args.output else {
            bail!("a folder input needs --output <folder>");
        };
        let mut ops = Vec::with_capacity(2);
        if !args.no_rotate {
            ops.push(BatchOp::AutoRotate);
        }
        ops.push(BatchOp::Optimize(options));
        let written = batch_process_folder(&args.input, &output, &ops)?;
        println!("Optimised {} image(s) into {}", written.len(), output.display());
    } else {
        let written = optimize_for_pdf(&args.input, args.output.as_deref(), &options)?;
        println!("Optimised {}", written.display());
    }
    Ok(())
}
