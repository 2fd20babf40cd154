// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bindery plugin system: manifests, capability traits, the loader seam, the
// registry of active plugins, and named hooks.

pub mod hooks;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod version;

pub use hooks::{HookFn, HookId, HookRegistry};
pub use loader::{FactoryLoader, PluginFactory, PluginLoader};
pub use manifest::{DiscoveredPlugin, MANIFEST_FILE, PluginManifest, discover};
pub use plugin::{
    DocumentProcessorPlugin, ImageProcessorPlugin, MenuItem, ParameterSchema, ParameterSpec,
    ParameterType, Params, Plugin, PluginInstance, PluginKind, PluginResult, UiPlugin,
};
pub use registry::{LoadReport, PluginInfo, PluginRegistry};
pub use version::{HOST_VERSION, compare_versions};
