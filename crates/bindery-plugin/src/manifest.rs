// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugin manifests and directory discovery.
//
// Each plugin lives in its own folder containing a `manifest.json`. Folders
// without one are not plugins and are skipped silently.

use std::path::{Path, PathBuf};

use bindery_core::PluginError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::plugin::PluginKind;

/// Manifest file name looked for in each plugin folder.
pub const MANIFEST_FILE: &str = "manifest.json";

fn default_version() -> String {
    "1.0.0".into()
}

fn default_main_module() -> String {
    "main".into()
}

fn default_plugin_class() -> String {
    "Plugin".into()
}

fn default_enabled() -> bool {
    true
}

/// Declared identity and load parameters of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_main_module")]
    pub main_module: String,
    #[serde(default = "default_plugin_class")]
    pub plugin_class: String,
    /// Names of plugins that must be loaded first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_version")]
    pub min_app_version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Declared capability. When present it must match what the entry point
    /// provides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PluginKind>,
}

impl PluginManifest {
    /// A manifest with defaults for everything but the name and entry point.
    pub fn new(name: impl Into<String>, main_module: &str, plugin_class: &str) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            description: String::new(),
            author: String::new(),
            main_module: main_module.into(),
            plugin_class: plugin_class.into(),
            dependencies: Vec::new(),
            min_app_version: default_version(),
            enabled: true,
            kind: None,
        }
    }

    /// Identifier the loader resolves, `main_module::plugin_class`.
    pub fn entry_point(&self) -> String {
        format!("{}::{}", self.main_module, self.plugin_class)
    }

    /// Parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self, PluginError> {
        let manifest_error = |reason: String| PluginError::Manifest {
            path: path.to_path_buf(),
            reason,
        };
        let data = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let manifest: PluginManifest =
            serde_json::from_str(&data).map_err(|e| manifest_error(e.to_string()))?;
        if manifest.name.trim().is_empty() {
            return Err(manifest_error("name must not be empty".into()));
        }
        Ok(manifest)
    }
}

/// A manifest together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    /// Plugin folder, or `None` for plugins compiled into the host.
    pub directory: Option<PathBuf>,
}

/// Scan plugin directories for `<folder>/manifest.json`.
///
/// Folders are visited in sorted order so discovery is deterministic.
/// Directories that do not exist are skipped. Unreadable manifests are
/// returned as errors alongside the successful ones.
pub fn discover(directories: &[PathBuf]) -> (Vec<DiscoveredPlugin>, Vec<PluginError>) {
    let mut found = Vec::new();
    let mut errors = Vec::new();

    for dir in directories {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "plugin directory not readable");
                continue;
            }
        };

        let mut folders: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        folders.sort();

        for folder in folders {
            let manifest_path = folder.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }
            match PluginManifest::from_file(&manifest_path) {
                Ok(manifest) => {
                    debug!(plugin = %manifest.name, dir = %folder.display(), "discovered plugin");
                    found.push(DiscoveredPlugin {
                        manifest,
                        directory: Some(folder),
                    });
                }
                Err(err) => {
                    warn!(path = %manifest_path.display(), error = %err, "skipping plugin manifest");
                    errors.push(err);
                }
            }
        }
    }

    (found, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(root: &Path, folder: &str, json: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), json).unwrap();
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let manifest: PluginManifest = serde_json::from_str(r#"{"name": "Minimal"}"#).unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.entry_point(), "main::Plugin");
        assert_eq!(manifest.min_app_version, "1.0.0");
        assert!(manifest.enabled);
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.kind, None);
    }

    #[test]
    fn kind_is_kebab_case() {
        let manifest: PluginManifest =
            serde_json::from_str(r#"{"name": "A", "kind": "document-transform"}"#).unwrap();
        assert_eq!(manifest.kind, Some(PluginKind::DocumentTransform));
    }

    #[test]
    fn discovery_is_sorted_and_skips_plain_folders() {
        let root = tempfile::tempdir().unwrap();
        write_manifest(root.path(), "zeta", r#"{"name": "Zeta"}"#);
        write_manifest(root.path(), "alpha", r#"{"name": "Alpha"}"#);
        std::fs::create_dir_all(root.path().join("not_a_plugin")).unwrap();
        write_manifest(root.path(), "broken", "{ nope");

        let (found, errors) = discover(&[root.path().to_path_buf(), root.path().join("missing")]);
        let names: Vec<_> = found.iter().map(|d| d.manifest.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PluginError::Manifest { .. }));
    }

    #[test]
    fn empty_name_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        write_manifest(root.path(), "blank", r#"{"name": "  "}"#);
        let err = PluginManifest::from_file(&root.path().join("blank").join(MANIFEST_FILE));
        assert!(err.is_err());
    }
}
