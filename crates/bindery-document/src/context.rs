// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application context: settings plus the process-wide plugin registry,
// constructed once at start-up and handed to whoever needs them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bindery_core::{AppConfig, PageConfig, TransformOp, TransformSpec};
use bindery_plugin::{FactoryLoader, LoadReport, PluginRegistry};
use tracing::{info, warn};

use crate::convert::{ConvertOptions, Converter};
use crate::plugins::{builtin_manifests, register_builtin_factories};

pub struct AppContext {
    config: AppConfig,
    extra_plugin_dirs: Vec<PathBuf>,
    registry: OnceLock<Arc<PluginRegistry>>,
    load_report: OnceLock<LoadReport>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            extra_plugin_dirs: Vec::new(),
            registry: OnceLock::new(),
            load_report: OnceLock::new(),
        }
    }

    /// Load settings from `dir` (see [`AppConfig::load`]).
    pub fn from_config_dir(dir: &Path) -> bindery_core::error::Result<Self> {
        let mut config = AppConfig::load(dir)?;
        config.validate();
        Ok(Self::new(config))
    }

    /// Search `dirs` for plugins in addition to the configured directories.
    /// Only effective before the registry is first used.
    pub fn with_plugin_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra_plugin_dirs.extend(dirs);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The plugin registry, built on first access: built-in plugins are
    /// registered, plugin directories scanned, and, when autoload is on,
    /// every enabled plugin loaded.
    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.registry
            .get_or_init(|| {
                let mut loader = FactoryLoader::new();
                register_builtin_factories(&mut loader);

                let directories = self
                    .config
                    .plugins
                    .directories
                    .iter()
                    .chain(&self.extra_plugin_dirs)
                    .cloned();
                let registry = PluginRegistry::new(loader)
                    .with_directories(directories)
                    .with_disabled(self.config.plugins.disabled.iter().cloned());

                for manifest in builtin_manifests() {
                    registry.add_builtin(manifest);
                }
                for err in registry.discover() {
                    warn!(error = %err, "plugin manifest skipped");
                }

                if self.config.plugins.autoload {
                    let report = registry.load_all();
                    info!(
                        loaded = report.loaded.len(),
                        skipped = report.skipped.len(),
                        failed = report.failures.len(),
                        "plugins loaded"
                    );
                    let _ = self.load_report.set(report);
                }
                Arc::new(registry)
            })
            .clone()
    }

    /// What happened when plugins were autoloaded, if they were.
    pub fn load_report(&self) -> Option<&LoadReport> {
        self.registry();
        self.load_report.get()
    }

    pub fn page_config(&self) -> PageConfig {
        self.config.page_config()
    }

    /// Conversion options seeded from settings. FIT pages keep their native
    /// size; see [`AppContext::native_size_cap`] for the opt-in cap.
    pub fn convert_options(&self, page_config: PageConfig, transforms: TransformSpec) -> ConvertOptions {
        let transforms = if self.config.image.auto_rotate && !transforms.has_auto_rotate() {
            TransformSpec::new(
                std::iter::once(TransformOp::AutoRotate)
                    .chain(transforms.ops().iter().cloned())
                    .collect(),
            )
        } else {
            transforms
        };

        ConvertOptions {
            page_config,
            transforms,
            auto_rotate: self.config.image.auto_rotate,
            extensions: Some(self.config.image.supported_formats.clone()),
            parallel: self.config.performance.parallel,
            max_workers: self.config.performance.max_workers,
            font_path: self.config.watermark.font_path.clone(),
            ..ConvertOptions::default()
        }
    }

    /// Largest native page size settings allow, for callers that choose to
    /// shrink FIT pages.
    pub fn native_size_cap(&self) -> (u32, u32) {
        (self.config.image.max_width, self.config.image.max_height)
    }

    /// A fresh converter wired to the registry.
    pub fn converter(&self) -> Converter {
        Converter::new(Some(self.registry()))
    }
}
