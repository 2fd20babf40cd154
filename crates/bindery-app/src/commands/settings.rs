// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `bindery settings`: show and change the persisted settings.

use std::path::Path;

use anyhow::{Context, Result};
use bindery_core::AppConfig;
use bindery_core::config::Preset;
use clap::Subcommand;
use serde_json::Value;

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the current settings as JSON.
    Show,

    /// Set one value by dotted key, e.g. `pdf.default_quality 90`.
    Set {
        key: String,
        /// Parsed as JSON; anything that is not JSON is taken as a string.
        value: String,
    },

    /// Apply a named preset: performance, quality or minimal.
    Preset { preset: Preset },

    /// Restore the defaults.
    Reset,
}

pub fn run(config: AppConfig, config_dir: &Path, command: SettingsCommand) -> Result<()> {
    let mut config = config;
    match command {
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        SettingsCommand::Set { key, value } => {
            config
                .update_setting(&key, parse_value(&value))
                .with_context(|| format!("cannot set '{key}'"))?;
            println!("{key} updated");
        }
        SettingsCommand::Preset { preset } => {
            config.apply_preset(preset)?;
            println!("Applied the {preset} preset");
        }
        SettingsCommand::Reset => {
            AppConfig::reset(config_dir)?;
            println!("Settings restored to defaults");
            return Ok(());
        }
    }
    config
        .save(config_dir)
        .with_context(|| format!("cannot save settings to {}", config_dir.display()))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
