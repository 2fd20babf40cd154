// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `bindery project`: saved image arrangements.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bindery_core::project::{Project, ProjectStore};
use bindery_core::{AppConfig, PageSize, WatermarkPosition};
use bindery_document::AppContext;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Save images and page settings as a named project.
    Save {
        name: String,
        /// Images in page order.
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(short = 's', long = "size")]
        page_size: Option<PageSize>,
        #[arg(short, long)]
        quality: Option<u8>,
        #[arg(long)]
        no_compress: bool,
        #[arg(long)]
        watermark: Option<String>,
        #[arg(long, default_value = "bottom-right")]
        watermark_position: WatermarkPosition,
    },

    /// Convert a saved project into a PDF.
    Load {
        name: String,
        #[arg(short, long, default_value = "output.pdf")]
        output: PathBuf,
        #[arg(long)]
        parallel: bool,
    },

    /// List saved projects, newest first.
    List,

    /// Delete a saved project.
    Delete { name: String },

    /// Print a project overview, or write it to a text file.
    Summary {
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(config: AppConfig, config_dir: &Path, command: ProjectCommand, show_progress: bool) -> Result<()> {
    let store = ProjectStore::open(config_dir.join("projects"))?;

    match command {
        ProjectCommand::Save {
            name,
            images,
            description,
            page_size,
            quality,
            no_compress,
            watermark,
            watermark_position,
        } => {
            let mut project = Project::from_images(name, description, &images);
            if project.image_count() == 0 {
                bail!("none of the given images exist");
            }
            project.settings.page_size = page_size.unwrap_or(config.pdf.default_page_size);
            project.settings.quality = quality.unwrap_or(config.pdf.default_quality).clamp(1, 100);
            project.settings.compress = !no_compress && config.pdf.default_compression;
            project.settings.watermark_text = watermark.unwrap_or_default();
            project.settings.watermark_position = watermark_position;
            project.settings.auto_rotate = config.image.auto_rotate;

            let path = store.save(&mut project, None)?;
            println!("Saved {} image(s) to {}", project.image_count(), path.display());
        }

        ProjectCommand::Load { name, output, parallel } => {
            let project = store
                .load(&name)
                .with_context(|| format!("cannot load project '{name}'"))?;
            let request = project.to_request();

            let mut config = config;
            config.image.auto_rotate = project.settings.auto_rotate;
            config.performance.parallel |= parallel;
            let ctx = AppContext::new(config);

            let mut options = ctx.convert_options(request.page_config, request.transforms);
            options.image_transforms = request.image_transforms;
            options.title = Some(project.metadata.name.clone());
            super::run_conversion(ctx.converter(), &request.paths, &output, &options, show_progress)?;
        }

        ProjectCommand::List => {
            let projects = store.list()?;
            if projects.is_empty() {
                println!("No saved projects in {}", store.dir().display());
            }
            for summary in projects {
                println!(
                    "{}  {} ({} image(s), modified {})",
                    summary.file_name,
                    summary.name,
                    summary.image_count,
                    summary.modified.format("%Y-%m-%d %H:%M")
                );
                if !summary.description.is_empty() {
                    println!("    {}", summary.description);
                }
            }
        }

        ProjectCommand::Delete { name } => {
            if store.delete(&name)? {
                println!("Deleted project '{name}'");
            } else {
                bail!("no project named '{name}'");
            }
        }

        ProjectCommand::Summary { name, output } => {
            let project = store
                .load(&name)
                .with_context(|| format!("cannot load project '{name}'"))?;
            match output {
                Some(path) => {
                    let path = store.export_summary(&project, &path)?;
                    println!("Summary written to {}", path.display());
                }
                None => print!("{}", project.summary()),
            }
        }
    }
    Ok(())
}
