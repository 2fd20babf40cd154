// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language error messages for the command line.
//
// Every technical error maps to a short message and a suggestion. Severity
// decides how the CLI presents it and which exit code it uses.

use crate::error::{BinderyError, ConversionError, PluginError};

/// Severity of an error from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Trying again may work (I/O hiccup, busy file).
    Transient,
    /// The user must change something (input files, settings, plugin dirs).
    ActionRequired,
    /// Retrying will not help.
    Permanent,
}

/// A human-readable error with a message and a suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What to try next.
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable: severity == Severity::Transient,
            severity,
        }
    }
}

/// Convert a `BinderyError` into something a non-programmer can act on.
pub fn humanize_error(err: &BinderyError) -> HumanError {
    match err {
        BinderyError::Conversion(inner) => humanize_conversion_error(inner),
        BinderyError::Plugin(inner) => humanize_plugin_error(inner),

        BinderyError::ImageError(_) => HumanError::new(
            "There's a problem with this image.",
            "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.",
            Severity::Permanent,
        ),

        BinderyError::PdfError(_) => HumanError::new(
            "There's a problem with this PDF file.",
            "The file may be damaged. Try opening it in a PDF viewer to check it works.",
            Severity::Permanent,
        ),

        BinderyError::Config(detail) => HumanError::new(
            "The settings file has an invalid value.",
            format!("Fix or delete the settings file and try again. ({detail})"),
            Severity::ActionRequired,
        ),

        BinderyError::Project(detail) => HumanError::new(
            "That project couldn't be opened.",
            format!("Check the project name with `bindery project list`. ({detail})"),
            Severity::ActionRequired,
        ),

        BinderyError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "The file couldn't be found.",
                "It may have been moved or deleted. Check the path and try again.",
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "Bindery doesn't have permission to use that file.",
                "Check the file permissions, or choose a different output folder.",
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "There was a problem reading or writing a file.",
                "Try again. If this keeps happening, the disk may be full.",
                Severity::Transient,
            ),
        },

        BinderyError::Serialization(_) => HumanError::new(
            "A data file couldn't be read.",
            "The file may have been edited by hand. Check that it is valid JSON.",
            Severity::ActionRequired,
        ),
    }
}

/// Messages for the conversion failure taxonomy.
pub fn humanize_conversion_error(err: &ConversionError) -> HumanError {
    match err {
        ConversionError::InvalidFormat { path, .. } => HumanError::new(
            format!("{} isn't an image Bindery can read.", path.display()),
            "Supported formats are JPEG, PNG, BMP, TIFF and GIF.",
            Severity::Permanent,
        ),
        ConversionError::TransformFailure { step, .. } => HumanError::new(
            format!("The '{step}' step was skipped."),
            "The image was kept without that change. Check the step's settings.",
            Severity::Permanent,
        ),
        ConversionError::PluginLoadFailure { plugin, .. } => HumanError::new(
            format!("The plugin '{plugin}' couldn't be loaded."),
            "Run `bindery plugins` to see which plugins are available.",
            Severity::ActionRequired,
        ),
        ConversionError::EmptyInput => HumanError::new(
            "There are no valid images to convert.",
            "Add at least one JPEG, PNG, BMP, TIFF or GIF file.",
            Severity::ActionRequired,
        ),
        ConversionError::AssemblyError(_) => HumanError::new(
            "The PDF couldn't be written.",
            "Check there is free disk space and the output folder is writable, then try again.",
            Severity::Transient,
        ),
        ConversionError::Cancelled => HumanError::new(
            "The conversion was cancelled.",
            "No PDF was written. Start the conversion again when ready.",
            Severity::Transient,
        ),
        ConversionError::AlreadyFinished(_) => HumanError::new(
            "This conversion has already run.",
            "Start a new conversion instead of reusing the old one.",
            Severity::Permanent,
        ),
    }
}

/// Messages for plugin registry failures.
pub fn humanize_plugin_error(err: &PluginError) -> HumanError {
    match err {
        PluginError::Manifest { path, .. } => HumanError::new(
            "A plugin's manifest couldn't be read.",
            format!("Check {} is valid JSON with a name field.", path.display()),
            Severity::ActionRequired,
        ),
        PluginError::NotFound(name) => HumanError::new(
            format!("No plugin called '{name}' was found."),
            "Run `bindery plugins` to see which plugins are available.",
            Severity::ActionRequired,
        ),
        PluginError::Disabled(name) => HumanError::new(
            format!("The plugin '{name}' is turned off."),
            "Enable it in its manifest or remove it from the disabled list in settings.",
            Severity::ActionRequired,
        ),
        PluginError::NotLoaded(name) => HumanError::new(
            format!("The plugin '{name}' isn't loaded."),
            "Check it is enabled and shows as loaded in `bindery plugins`.",
            Severity::ActionRequired,
        ),
        PluginError::IncompatibleHost { plugin, required, .. } => HumanError::new(
            format!("The plugin '{plugin}' needs a newer Bindery."),
            format!("Upgrade Bindery to version {required} or later."),
            Severity::Permanent,
        ),
        PluginError::Dependency { plugin, dependency, .. } => HumanError::new(
            format!("The plugin '{plugin}' needs '{dependency}', which couldn't be loaded."),
            format!("Install or enable '{dependency}' first."),
            Severity::ActionRequired,
        ),
        PluginError::EntryPoint { plugin, .. }
        | PluginError::CapabilityMismatch { plugin, .. }
        | PluginError::WrongKind { plugin, .. } => HumanError::new(
            format!("The plugin '{plugin}' is set up incorrectly."),
            "Check the plugin's manifest against its documentation.",
            Severity::Permanent,
        ),
        PluginError::InitializeFailed(plugin)
        | PluginError::Panicked { plugin, .. }
        | PluginError::Invoke { plugin, .. } => HumanError::new(
            format!("The plugin '{plugin}' stopped working."),
            "Other plugins keep working. Try reloading it, or disable it in settings.",
            Severity::Transient,
        ),
    }
}
