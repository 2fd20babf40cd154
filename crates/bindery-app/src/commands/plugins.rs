// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `bindery plugins`: discovered plugins and their load state.

use std::path::PathBuf;

use anyhow::Result;
use bindery_core::AppConfig;
use bindery_core::human_errors::humanize_conversion_error;
use bindery_document::AppContext;

pub fn run(config: AppConfig, plugin_dirs: Vec<PathBuf>) -> Result<()> {
    let ctx = AppContext::new(config).with_plugin_dirs(plugin_dirs);
    let registry = ctx.registry();

    let infos = registry.get_plugin_info();
    if infos.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }

    for info in infos {
        let state = match (info.enabled, info.loaded) {
            (_, true) => "loaded",
            (false, false) => "disabled",
            (true, false) => "not loaded",
        };
        let kind = info.kind.map(|k| k.to_string()).unwrap_or_else(|| "-".into());
        println!("{} {} [{kind}] ({state})", info.name, info.version);
        if !info.description.is_empty() {
            println!("    {}", info.description);
        }
        if !info.author.is_empty() {
            println!("    by {}", info.author);
        }
        match &info.directory {
            Some(dir) => println!("    {}", dir.display()),
            None => println!("    built in"),
        }
        if let Ok(schema) = registry.parameters(&info.name) {
            for (name, spec) in schema {
                println!("    --{name}: {}", spec.description);
            }
        }
    }

    if let Some(report) = ctx.load_report() {
        for failure in &report.failures {
            let human = humanize_conversion_error(failure);
            eprintln!("{} ({failure})", human.message);
        }
    }
    Ok(())
}
