// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bindery.
//
// Two layers: `ConversionError` carries the per-image / per-batch taxonomy of
// the conversion pipeline (recoverable variants end up inside a
// `ConversionResult`, fatal ones are returned to the caller), and
// `PluginError` covers manifest, load and invocation failures of the plugin
// registry. `BinderyError` is the umbrella used by everything else.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Bindery operations.
#[derive(Debug, Error)]
pub enum BinderyError {
    // -- Pipeline --
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    // -- Media --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    // -- Settings / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("project error: {0}")]
    Project(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure taxonomy of a conversion run.
///
/// `InvalidFormat`, `TransformFailure` and `PluginLoadFailure` are recoverable
/// and only ever reported inside the aggregate result. `EmptyInput`,
/// `AssemblyError` and `Cancelled` end the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The file is missing, unreadable, or not one of the supported formats.
    #[error("invalid image {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// A single transform step failed; the image continues unmodified.
    #[error("transform step '{step}' failed: {reason}")]
    TransformFailure { step: String, reason: String },

    /// A plugin could not be loaded; other plugins are unaffected.
    #[error("plugin '{plugin}' failed to load: {reason}")]
    PluginLoadFailure { plugin: String, reason: String },

    /// No valid images remain after validation (or none were given).
    #[error("no valid images to convert")]
    EmptyInput,

    /// Packaging the final document failed.
    #[error("document assembly failed: {0}")]
    AssemblyError(String),

    /// The run was cancelled between images.
    #[error("conversion cancelled")]
    Cancelled,

    /// The orchestrator already ran to a terminal state.
    #[error("converter already finished in state {0}")]
    AlreadyFinished(String),
}

impl ConversionError {
    /// Whether this error ends the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::AssemblyError(_) | Self::Cancelled | Self::AlreadyFinished(_)
        )
    }
}

/// Errors raised by plugin discovery, loading, and invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("failed to read plugin manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("plugin '{0}' not found")]
    NotFound(String),

    #[error("plugin '{0}' is disabled")]
    Disabled(String),

    #[error("plugin '{0}' is not loaded")]
    NotLoaded(String),

    #[error("plugin '{plugin}': no factory registered for entry point '{entry}'")]
    EntryPoint { plugin: String, entry: String },

    #[error("plugin '{plugin}' declares kind {declared} but provides {provided}")]
    CapabilityMismatch {
        plugin: String,
        declared: String,
        provided: String,
    },

    #[error("plugin '{plugin}' is not an {required} plugin")]
    WrongKind { plugin: String, required: String },

    #[error("plugin '{plugin}' requires host version {required} (running {host})")]
    IncompatibleHost {
        plugin: String,
        required: String,
        host: String,
    },

    #[error("plugin '{plugin}' depends on '{dependency}': {reason}")]
    Dependency {
        plugin: String,
        dependency: String,
        reason: String,
    },

    #[error("plugin '{0}' initialization failed")]
    InitializeFailed(String),

    #[error("plugin '{plugin}' panicked during {operation}")]
    Panicked { plugin: String, operation: String },

    #[error("plugin '{plugin}' failed: {reason}")]
    Invoke { plugin: String, reason: String },
}

impl PluginError {
    /// Name of the plugin the error refers to, where there is one.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::Manifest { .. } => None,
            Self::NotFound(name)
            | Self::Disabled(name)
            | Self::NotLoaded(name)
            | Self::InitializeFailed(name) => Some(name),
            Self::EntryPoint { plugin, .. }
            | Self::CapabilityMismatch { plugin, .. }
            | Self::WrongKind { plugin, .. }
            | Self::IncompatibleHost { plugin, .. }
            | Self::Dependency { plugin, .. }
            | Self::Panicked { plugin, .. }
            | Self::Invoke { plugin, .. } => Some(plugin),
        }
    }

    /// Fold into the pipeline taxonomy as a per-plugin load failure.
    pub fn into_load_failure(self) -> ConversionError {
        let plugin = self.plugin_name().unwrap_or("<unknown>").to_string();
        ConversionError::PluginLoadFailure {
            plugin,
            reason: self.to_string(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BinderyError>;
