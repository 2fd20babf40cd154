// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bindery: Core types, settings, and error definitions shared across all crates.

pub mod cancel;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod project;
pub mod types;

pub use cancel::CancellationToken;
pub use config::AppConfig;
pub use error::{BinderyError, ConversionError, PluginError};
pub use types::*;
