// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Resolving a manifest's entry point to a plugin instance.

use std::collections::HashMap;
use std::sync::Arc;

use bindery_core::PluginError;

use crate::manifest::PluginManifest;
use crate::plugin::PluginInstance;

/// Turns a manifest into a live, uninitialised instance.
///
/// The registry never instantiates plugins itself; whatever mechanism makes
/// code available (a compiled-in table, a dynamic library) sits behind this
/// trait.
pub trait PluginLoader: Send + Sync {
    fn load(&self, manifest: &PluginManifest) -> Result<PluginInstance, PluginError>;
}

/// Constructor registered for an entry point.
pub type PluginFactory = Arc<dyn Fn() -> PluginInstance + Send + Sync>;

/// Loader backed by a table of entry point -> factory.
#[derive(Default, Clone)]
pub struct FactoryLoader {
    factories: HashMap<String, PluginFactory>,
}

impl FactoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `main_module::plugin_class`. Replaces any
    /// previous factory for the same entry point.
    pub fn register<F>(&mut self, entry_point: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> PluginInstance + Send + Sync + 'static,
    {
        self.factories.insert(entry_point.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl PluginLoader for FactoryLoader {
    fn load(&self, manifest: &PluginManifest) -> Result<PluginInstance, PluginError> {
        let entry = manifest.entry_point();
        let factory = self
            .factories
            .get(&entry)
            .ok_or_else(|| PluginError::EntryPoint {
                plugin: manifest.name.clone(),
                entry: entry.clone(),
            })?;
        Ok(factory())
    }
}

impl std::fmt::Debug for FactoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self.entry_points().collect();
        entries.sort_unstable();
        f.debug_struct("FactoryLoader").field("entries", &entries).finish()
    }
}
