// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand handlers. Each one maps its arguments onto the pipeline types
// and prints results; none of them carries conversion logic.

pub mod convert;
pub mod inspect;
pub mod optimize;
pub mod plugins;
pub mod project;
pub mod settings;

use std::path::Path;

use anyhow::anyhow;
use bindery_core::human_errors::humanize_conversion_error;
use bindery_core::{ConversionError, ConversionResult, ImageStatus};
use bindery_document::{ConvertOptions, Converter};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_STEPS: u64 = 1000;

/// Run `converter` with a progress bar (when `show_progress`) and print a
/// summary. Fatal conversion errors become a humanised `anyhow` error.
pub(crate) fn run_conversion(
    mut converter: Converter,
    paths: &[std::path::PathBuf],
    output: &Path,
    options: &ConvertOptions,
    show_progress: bool,
) -> anyhow::Result<ConversionResult> {
    let bar = if show_progress {
        let bar = ProgressBar::new(BAR_STEPS);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {percent:>3}%  {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Binding");
        bar
    } else {
        ProgressBar::hidden()
    };

    let report = |value: f32| bar.set_position((value * BAR_STEPS as f32).round() as u64);
    let outcome = converter.convert(paths, output, options, Some(&report));
    bar.finish_and_clear();

    match outcome {
        Ok(result) => {
            print_summary(&result);
            Ok(result)
        }
        Err(err) => Err(humanized(&err)),
    }
}

fn humanized(err: &ConversionError) -> anyhow::Error {
    let human = humanize_conversion_error(err);
    anyhow!("{}\n  {}\n  ({err})", human.message, human.suggestion)
}

fn print_summary(result: &ConversionResult) {
    println!(
        "Created {} ({} page{})",
        result.output_path.display(),
        result.page_count,
        if result.page_count == 1 { "" } else { "s" }
    );

    for outcome in &result.outcomes {
        match &outcome.status {
            ImageStatus::Failed(err) => {
                let human = humanize_conversion_error(err);
                eprintln!("  skipped {}: {}", outcome.path.display(), human.message);
            }
            ImageStatus::Converted { skipped_steps, .. } => {
                for step in skipped_steps {
                    eprintln!(
                        "  {}: step '{}' skipped ({})",
                        outcome.path.display(),
                        step.step,
                        step.reason
                    );
                }
            }
        }
    }
    for step in &result.document_failures {
        eprintln!("  document step '{}' skipped ({})", step.step, step.reason);
    }
}
