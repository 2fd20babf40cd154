// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bindery: bind images into PDF documents.
//
// Entry point. Parses arguments, loads settings, initialises logging, and
// dispatches to the subcommand handlers.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use bindery_core::AppConfig;
use bindery_core::config::config_dir;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::convert::ConvertArgs;
use commands::optimize::OptimizeArgs;
use commands::project::ProjectCommand;
use commands::settings::SettingsCommand;

/// Convert images into a single PDF, with page fitting, compression,
/// transforms and plugins.
#[derive(Parser, Debug)]
#[command(name = "bindery", version, about, arg_required_else_help = true)]
struct Cli {
    /// Settings directory (defaults to $XDG_CONFIG_HOME/bindery).
    #[arg(long, global = true, env = "BINDERY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors and hide the progress bar.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert images into one PDF.
    Convert(ConvertArgs),

    /// List discovered plugins.
    Plugins {
        /// Extra directory to scan for plugins (repeatable).
        #[arg(long = "plugin-dir")]
        plugin_dirs: Vec<PathBuf>,
    },

    /// Show page count, page sizes and page images of a PDF.
    Inspect {
        pdf: PathBuf,
    },

    /// Save, load, list and delete project files.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Show or change settings, apply presets.
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Shrink and recompress images for binding.
    Optimize(OptimizeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dir = cli.config_dir.clone().unwrap_or_else(config_dir);
    let mut config = AppConfig::load(&dir)
        .with_context(|| format!("cannot load settings from {}", dir.display()))?;
    config.validate();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config_dir = %dir.display(), "settings loaded");

    match cli.command {
        Command::Convert(args) => commands::convert::run(config, args, !cli.quiet),
        Command::Plugins { plugin_dirs } => commands::plugins::run(config, plugin_dirs),
        Command::Inspect { pdf } => commands::inspect::run(&pdf),
        Command::Project(command) => commands::project::run(config, &dir, command, !cli.quiet),
        Command::Settings(command) => commands::settings::run(config, &dir, command),
        Command::Optimize(args) => commands::optimize::run(config, args),
    }
}
