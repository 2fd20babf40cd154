// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The plugin registry: known manifests, the active set of loaded plugins,
// and guarded invocation.
//
// Load and unload are serialised by a single mutation lock. Every active
// plugin sits behind its own gate: calls take the gate exclusively unless the
// plugin declares concurrent support, and unload takes it exclusively, so
// cleanup never overlaps a running call.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bindery_core::{ConversionError, PluginError};
use tracing::{debug, info, instrument, warn};

use crate::hooks::HookRegistry;
use crate::loader::PluginLoader;
use crate::manifest::{self, DiscoveredPlugin, MANIFEST_FILE, PluginManifest};
use crate::plugin::{MenuItem, ParameterSchema, Params, PluginInstance, PluginKind};
use crate::version::{HOST_VERSION, compare_versions};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// One loaded plugin.
struct ActivePlugin {
    instance: PluginInstance,
    concurrent: bool,
    gate: RwLock<()>,
    unloaded: AtomicBool,
}

/// Outcome of [`PluginRegistry::load_all`].
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    /// Plugins active after the call, in discovery order.
    pub loaded: Vec<String>,
    /// Plugins disabled by manifest or settings.
    pub skipped: Vec<String>,
    /// Manifest and load failures, one per plugin.
    pub failures: Vec<ConversionError>,
}

/// Listing row for [`PluginRegistry::get_plugin_info`].
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub enabled: bool,
    pub loaded: bool,
    pub directory: Option<PathBuf>,
    /// Kind of the live instance, or the declared kind when not loaded.
    pub kind: Option<PluginKind>,
}

pub struct PluginRegistry {
    loader: Box<dyn PluginLoader>,
    directories: Vec<PathBuf>,
    disabled: HashSet<String>,
    host_version: String,
    known: RwLock<Vec<DiscoveredPlugin>>,
    active: RwLock<HashMap<String, Arc<ActivePlugin>>>,
    mutation: Mutex<()>,
    hooks: HookRegistry,
}

impl PluginRegistry {
    pub fn new(loader: impl PluginLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            directories: Vec::new(),
            disabled: HashSet::new(),
            host_version: HOST_VERSION.into(),
            known: RwLock::new(Vec::new()),
            active: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
            hooks: HookRegistry::new(),
        }
    }

    /// Directories scanned by [`PluginRegistry::discover`].
    pub fn with_directories(mut self, directories: impl IntoIterator<Item = PathBuf>) -> Self {
        self.directories.extend(directories);
        self
    }

    /// Names that are never loaded, whatever their manifest says.
    pub fn with_disabled<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.disabled.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    // -- Discovery ------------------------------------------------------------

    /// Add a manifest for a plugin compiled into the host.
    pub fn add_builtin(&self, manifest: PluginManifest) {
        self.remember(DiscoveredPlugin {
            manifest,
            directory: None,
        });
    }

    fn remember(&self, plugin: DiscoveredPlugin) {
        let mut known = write(&self.known);
        match known.iter_mut().find(|k| k.manifest.name == plugin.manifest.name) {
            Some(existing) => *existing = plugin,
            None => known.push(plugin),
        }
    }

    /// Scan the plugin directories and merge what is found into the known
    /// set. Returns the manifests that could not be read.
    #[instrument(skip(self), fields(dirs = self.directories.len()))]
    pub fn discover(&self) -> Vec<PluginError> {
        let (found, errors) = manifest::discover(&self.directories);
        for plugin in found {
            self.remember(plugin);
        }
        errors
    }

    fn manifest_of(&self, name: &str) -> Option<DiscoveredPlugin> {
        read(&self.known)
            .iter()
            .find(|k| k.manifest.name == name)
            .cloned()
    }

    fn is_enabled(&self, manifest: &PluginManifest) -> bool {
        manifest.enabled && !self.disabled.contains(&manifest.name)
    }

    // -- Load / unload --------------------------------------------------------

    /// Load a known plugin, its dependencies first.
    ///
    /// Loading an already active plugin is a no-op.
    #[instrument(skip(self))]
    pub fn load_plugin(&self, name: &str) -> Result<(), PluginError> {
        let _mutation = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        let mut visiting = Vec::new();
        self.load_locked(name, &mut visiting)
    }

    fn load_locked(&self, name: &str, visiting: &mut Vec<String>) -> Result<(), PluginError> {
        if read(&self.active).contains_key(name) {
            debug!(plugin = name, "already loaded");
            return Ok(());
        }

        let discovered = self
            .manifest_of(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        let manifest = &discovered.manifest;

        if !self.is_enabled(manifest) {
            return Err(PluginError::Disabled(name.to_string()));
        }

        if compare_versions(&manifest.min_app_version, &self.host_version) == CmpOrdering::Greater {
            return Err(PluginError::IncompatibleHost {
                plugin: name.to_string(),
                required: manifest.min_app_version.clone(),
                host: self.host_version.clone(),
            });
        }

        visiting.push(name.to_string());
        for dependency in &manifest.dependencies {
            let dependency_error = |reason: String| PluginError::Dependency {
                plugin: name.to_string(),
                dependency: dependency.clone(),
                reason,
            };
            if visiting.contains(dependency) {
                return Err(dependency_error("dependency cycle".into()));
            }
            self.load_locked(dependency, visiting)
                .map_err(|err| dependency_error(err.to_string()))?;
        }
        visiting.pop();

        let instance = self.loader.load(manifest)?;
        if let Some(declared) = manifest.kind {
            if declared != instance.kind() {
                return Err(PluginError::CapabilityMismatch {
                    plugin: name.to_string(),
                    declared: declared.to_string(),
                    provided: instance.kind().to_string(),
                });
            }
        }

        match catch_unwind(AssertUnwindSafe(|| instance.base().initialize())) {
            Ok(true) => {}
            Ok(false) => return Err(PluginError::InitializeFailed(name.to_string())),
            Err(payload) => {
                warn!(plugin = name, panic = %panic_message(payload.as_ref()), "initialize panicked");
                return Err(PluginError::Panicked {
                    plugin: name.to_string(),
                    operation: "initialize".into(),
                });
            }
        }

        let concurrent = instance.base().supports_concurrency();
        let version = instance.base().version().to_string();
        write(&self.active).insert(
            name.to_string(),
            Arc::new(ActivePlugin {
                instance,
                concurrent,
                gate: RwLock::new(()),
                unloaded: AtomicBool::new(false),
            }),
        );
        info!(plugin = name, version = %version, "plugin loaded");
        Ok(())
    }

    /// Discover, then try to load every known plugin. One plugin failing
    /// never prevents the rest from loading.
    pub fn load_all(&self) -> LoadReport {
        let mut report = LoadReport::default();
        for err in self.discover() {
            report.failures.push(err.into_load_failure());
        }

        let names: Vec<String> = read(&self.known)
            .iter()
            .map(|k| k.manifest.name.clone())
            .collect();
        for name in names {
            match self.load_plugin(&name) {
                Ok(()) => report.loaded.push(name),
                Err(PluginError::Disabled(_)) => {
                    debug!(plugin = %name, "skipping disabled plugin");
                    report.skipped.push(name);
                }
                Err(err) => {
                    warn!(plugin = %name, error = %err, "plugin failed to load");
                    report.failures.push(err.into_load_failure());
                }
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "plugin load pass finished"
        );
        report
    }

    /// Call `cleanup()` and remove the plugin from the active set.
    ///
    /// Waits for in-flight calls into the plugin. Returns `Ok(false)` when
    /// the plugin was not loaded. The plugin is removed even when cleanup
    /// reports failure.
    #[instrument(skip(self))]
    pub fn unload_plugin(&self, name: &str) -> Result<bool, PluginError> {
        let _mutation = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        self.unload_locked(name)
    }

    fn unload_locked(&self, name: &str) -> Result<bool, PluginError> {
        let Some(slot) = read(&self.active).get(name).cloned() else {
            return Ok(false);
        };

        let cleanup = {
            let _gate = write(&slot.gate);
            slot.unloaded.store(true, Ordering::SeqCst);
            catch_unwind(AssertUnwindSafe(|| slot.instance.base().cleanup()))
        };
        write(&self.active).remove(name);

        match cleanup {
            Ok(true) => {
                info!(plugin = name, "plugin unloaded");
                Ok(true)
            }
            Ok(false) => {
                warn!(plugin = name, "plugin cleanup reported failure");
                Ok(true)
            }
            Err(payload) => {
                warn!(plugin = name, panic = %panic_message(payload.as_ref()), "cleanup panicked");
                Err(PluginError::Panicked {
                    plugin: name.to_string(),
                    operation: "cleanup".into(),
                })
            }
        }
    }

    /// Unload, re-read the manifest from disk when there is one, and load
    /// again.
    pub fn reload_plugin(&self, name: &str) -> Result<(), PluginError> {
        let _mutation = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        self.unload_locked(name)?;

        if let Some(DiscoveredPlugin {
            directory: Some(dir),
            ..
        }) = self.manifest_of(name)
        {
            let manifest = PluginManifest::from_file(&dir.join(MANIFEST_FILE))?;
            self.remember(DiscoveredPlugin {
                manifest,
                directory: Some(dir),
            });
        }

        let mut visiting = Vec::new();
        self.load_locked(name, &mut visiting)
    }

    /// Unload every active plugin.
    pub fn unload_all(&self) {
        let names = self.loaded_names();
        for name in names {
            if let Err(err) = self.unload_plugin(&name) {
                warn!(plugin = %name, error = %err, "unload failed");
            }
        }
    }

    // -- Queries --------------------------------------------------------------

    pub fn is_loaded(&self, name: &str) -> bool {
        read(&self.active).contains_key(name)
    }

    /// Names of active plugins, sorted.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.active).keys().cloned().collect();
        names.sort();
        names
    }

    /// Active plugins of one kind, sorted by name.
    pub fn plugins_of_kind(&self, kind: PluginKind) -> Vec<String> {
        let mut names: Vec<String> = read(&self.active)
            .iter()
            .filter(|(_, slot)| slot.instance.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every known plugin, loaded or not, in discovery order.
    pub fn get_plugin_info(&self) -> Vec<PluginInfo> {
        let active = read(&self.active);
        read(&self.known)
            .iter()
            .map(|k| {
                let m = &k.manifest;
                let live = active.get(&m.name);
                PluginInfo {
                    name: m.name.clone(),
                    version: m.version.clone(),
                    description: m.description.clone(),
                    author: m.author.clone(),
                    enabled: self.is_enabled(m),
                    loaded: live.is_some(),
                    directory: k.directory.clone(),
                    kind: live.map(|slot| slot.instance.kind()).or(m.kind),
                }
            })
            .collect()
    }

    // -- Invocation -----------------------------------------------------------

    /// Run `f` against an active plugin while holding its gate.
    fn call<R>(
        &self,
        name: &str,
        operation: &str,
        f: impl FnOnce(&PluginInstance) -> Result<R, PluginError>,
    ) -> Result<R, PluginError> {
        let slot = read(&self.active)
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;

        let run = || {
            if slot.unloaded.load(Ordering::SeqCst) {
                return Err(PluginError::NotLoaded(name.to_string()));
            }
            catch_unwind(AssertUnwindSafe(|| f(&slot.instance))).unwrap_or_else(|payload| {
                warn!(plugin = name, operation, panic = %panic_message(payload.as_ref()), "plugin panicked");
                Err(PluginError::Panicked {
                    plugin: name.to_string(),
                    operation: operation.to_string(),
                })
            })
        };

        if slot.concurrent {
            let _shared = read(&slot.gate);
            run()
        } else {
            let _exclusive = write(&slot.gate);
            run()
        }
    }

    fn wrong_kind(name: &str, required: PluginKind) -> PluginError {
        PluginError::WrongKind {
            plugin: name.to_string(),
            required: required.to_string(),
        }
    }

    /// Run an image-transform plugin on one file.
    pub fn invoke_image(&self, name: &str, input: &Path, params: &Params) -> Result<PathBuf, PluginError> {
        self.call(name, "process_image", |instance| {
            let plugin = instance
                .as_image()
                .ok_or_else(|| Self::wrong_kind(name, PluginKind::ImageTransform))?;
            plugin.process_image(input, params).map_err(|e| PluginError::Invoke {
                plugin: name.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Run a document-transform plugin on an assembled PDF.
    pub fn invoke_document(&self, name: &str, input: &Path, params: &Params) -> Result<PathBuf, PluginError> {
        self.call(name, "process_pdf", |instance| {
            let plugin = instance
                .as_document()
                .ok_or_else(|| Self::wrong_kind(name, PluginKind::DocumentTransform))?;
            plugin.process_pdf(input, params).map_err(|e| PluginError::Invoke {
                plugin: name.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Parameter schema of an image-transform plugin.
    pub fn parameters(&self, name: &str) -> Result<ParameterSchema, PluginError> {
        self.call(name, "get_parameters", |instance| {
            instance
                .as_image()
                .map(|p| p.get_parameters())
                .ok_or_else(|| Self::wrong_kind(name, PluginKind::ImageTransform))
        })
    }

    /// First active image plugin (by name) whose `effect` parameter offers
    /// the given effect.
    pub fn find_effect_provider(&self, effect: &str) -> Option<String> {
        self.plugins_of_kind(PluginKind::ImageTransform)
            .into_iter()
            .find(|name| {
                self.parameters(name)
                    .map(|schema| schema.get("effect").is_some_and(|spec| spec.offers(effect)))
                    .unwrap_or(false)
            })
    }

    /// Menu entries from every UI plugin, tagged with the plugin name.
    pub fn menu_items(&self) -> Vec<(String, MenuItem)> {
        self.ui_items("menu_items", |ui| ui.menu_items())
    }

    pub fn toolbar_items(&self) -> Vec<(String, MenuItem)> {
        self.ui_items("toolbar_items", |ui| ui.toolbar_items())
    }

    fn ui_items(
        &self,
        operation: &str,
        get: impl Fn(&dyn crate::plugin::UiPlugin) -> Vec<MenuItem>,
    ) -> Vec<(String, MenuItem)> {
        let mut items = Vec::new();
        for name in self.plugins_of_kind(PluginKind::UiExtension) {
            let result = self.call(&name, operation, |instance| {
                instance
                    .as_ui()
                    .map(|ui| get(ui.as_ref()))
                    .ok_or_else(|| Self::wrong_kind(&name, PluginKind::UiExtension))
            });
            match result {
                Ok(entries) => items.extend(entries.into_iter().map(|item| (name.clone(), item))),
                Err(err) => warn!(plugin = %name, error = %err, "UI plugin failed"),
            }
        }
        items
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.unload_all();
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("directories", &self.directories)
            .field("known", &read(&self.known).len())
            .field("active", &self.loaded_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FactoryLoader;
    use crate::plugin::{
        DocumentProcessorPlugin, ImageProcessorPlugin, ParameterSpec, Plugin, PluginResult, UiPlugin,
    };
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        name: String,
        init_ok: bool,
        init_panics: bool,
        concurrent: bool,
        cleanups: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Plugin for Probe {
        fn name(&self) -> &str {
            &self.name
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn description(&self) -> &str {
            "test plugin"
        }
        fn author(&self) -> &str {
            "tests"
        }
        fn initialize(&self) -> bool {
            if self.init_panics {
                panic!("initialize exploded");
            }
            self.init_ok
        }
        fn cleanup(&self) -> bool {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            true
        }
        fn supports_concurrency(&self) -> bool {
            self.concurrent
        }
    }

    impl ImageProcessorPlugin for Probe {
        fn process_image(&self, input: &Path, params: &Params) -> PluginResult<PathBuf> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if params.contains_key("fail") {
                return Err("asked to fail".into());
            }
            Ok(input.with_extension("out.png"))
        }

        fn get_parameters(&self) -> ParameterSchema {
            let mut schema = ParameterSchema::new();
            schema.insert("effect".into(), ParameterSpec::select(&["sepia", "blur"], "sepia", ""));
            schema
        }
    }

    struct Stamp;

    impl Plugin for Stamp {
        fn name(&self) -> &str {
            "Stamp"
        }
        fn version(&self) -> &str {
            "0.1.0"
        }
        fn description(&self) -> &str {
            ""
        }
        fn author(&self) -> &str {
            ""
        }
    }

    impl DocumentProcessorPlugin for Stamp {
        fn process_pdf(&self, input: &Path, _params: &Params) -> PluginResult<PathBuf> {
            Ok(input.to_path_buf())
        }
    }

    impl UiPlugin for Stamp {
        fn menu_items(&self) -> Vec<MenuItem> {
            vec![MenuItem {
                label: "Stamp pages".into(),
                action: "stamp".into(),
                shortcut: None,
            }]
        }
        fn toolbar_items(&self) -> Vec<MenuItem> {
            Vec::new()
        }
    }

    fn probe(name: &str) -> Probe {
        Probe {
            name: name.into(),
            init_ok: true,
            ..Probe::default()
        }
    }

    fn image_factory(p: impl Fn() -> Probe + Send + Sync + 'static) -> impl Fn() -> PluginInstance + Send + Sync + 'static {
        move || PluginInstance::Image(Arc::new(p()))
    }

    fn manifest(name: &str, entry_class: &str) -> PluginManifest {
        PluginManifest::new(name, "main", entry_class)
    }

    #[test]
    fn failed_initialize_is_excluded_and_later_plugins_still_load() {
        let mut loader = FactoryLoader::new();
        loader.register(
            "main::Refuses",
            image_factory(|| Probe {
                init_ok: false,
                ..probe("Refuses")
            }),
        );
        loader.register("main::Works", image_factory(|| probe("Works")));

        let registry = PluginRegistry::new(loader);
        registry.add_builtin(manifest("Refuses", "Refuses"));
        registry.add_builtin(manifest("Works", "Works"));

        let report = registry.load_all();
        assert_eq!(report.loaded, vec!["Works".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            ConversionError::PluginLoadFailure { plugin, .. } if plugin == "Refuses"
        ));
        assert!(!registry.is_loaded("Refuses"));
        assert!(registry.is_loaded("Works"));
    }

    #[test]
    fn panicking_initialize_is_isolated() {
        let mut loader = FactoryLoader::new();
        loader.register(
            "main::Boom",
            image_factory(|| Probe {
                init_panics: true,
                ..probe("Boom")
            }),
        );
        let registry = PluginRegistry::new(loader);
        registry.add_builtin(manifest("Boom", "Boom"));

        let err = registry.load_plugin("Boom").unwrap_err();
        assert!(matches!(err, PluginError::Panicked { ref operation, .. } if operation == "initialize"));
        assert!(registry.loaded_names().is_empty());
    }

    #[test]
    fn dependencies_load_first_and_failures_stay_local() {
        let mut loader = FactoryLoader::new();
        loader.register("main::Base", image_factory(|| probe("Base")));
        loader.register("main::Child", image_factory(|| probe("Child")));
        loader.register("main::Orphan", image_factory(|| probe("Orphan")));

        let registry = PluginRegistry::new(loader);
        let mut child = manifest("Child", "Child");
        child.dependencies = vec!["Base".into()];
        let mut orphan = manifest("Orphan", "Orphan");
        orphan.dependencies = vec!["Missing".into()];
        registry.add_builtin(child);
        registry.add_builtin(orphan);
        registry.add_builtin(manifest("Base", "Base"));

        registry.load_plugin("Child").unwrap();
        assert!(registry.is_loaded("Base"));

        let err = registry.load_plugin("Orphan").unwrap_err();
        assert!(matches!(err, PluginError::Dependency { ref dependency, .. } if dependency == "Missing"));
        assert_eq!(registry.loaded_names(), vec!["Base".to_string(), "Child".to_string()]);
    }

    #[test]
    fn dependency_cycles_are_rejected() {
        let mut loader = FactoryLoader::new();
        loader.register("main::A", image_factory(|| probe("A")));
        loader.register("main::B", image_factory(|| probe("B")));
        let registry = PluginRegistry::new(loader);
        let mut a = manifest("A", "A");
        a.dependencies = vec!["B".into()];
        let mut b = manifest("B", "B");
        b.dependencies = vec!["A".into()];
        registry.add_builtin(a);
        registry.add_builtin(b);

        assert!(registry.load_plugin("A").is_err());
        assert!(registry.loaded_names().is_empty());
    }

    #[test]
    fn host_version_disabled_kind_and_entry_point_checks() {
        let mut loader = FactoryLoader::new();
        loader.register("main::P", image_factory(|| probe("P")));
        let registry = PluginRegistry::new(loader).with_disabled(["Muted"]);

        let mut future = manifest("Future", "P");
        future.min_app_version = "1.10.0".into();
        let mut off = manifest("Off", "P");
        off.enabled = false;
        let mut mislabelled = manifest("Mislabelled", "P");
        mislabelled.kind = Some(PluginKind::DocumentTransform);
        for m in [future, off, mislabelled, manifest("Muted", "P"), manifest("Ghost", "Nope")] {
            registry.add_builtin(m);
        }

        assert!(matches!(registry.load_plugin("Future"), Err(PluginError::IncompatibleHost { .. })));
        assert!(matches!(registry.load_plugin("Off"), Err(PluginError::Disabled(_))));
        assert!(matches!(registry.load_plugin("Muted"), Err(PluginError::Disabled(_))));
        assert!(matches!(registry.load_plugin("Mislabelled"), Err(PluginError::CapabilityMismatch { .. })));
        assert!(matches!(registry.load_plugin("Ghost"), Err(PluginError::EntryPoint { .. })));
        assert!(matches!(registry.load_plugin("Unknown"), Err(PluginError::NotFound(_))));

        let report = registry.load_all();
        assert_eq!(report.skipped, vec!["Off".to_string(), "Muted".to_string()]);
        assert!(report.loaded.is_empty());
    }

    #[test]
    fn invoke_unload_and_reload() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleanups);
        let mut loader = FactoryLoader::new();
        loader.register(
            "main::Fx",
            image_factory(move || Probe {
                cleanups: Arc::clone(&counter),
                ..probe("Fx")
            }),
        );
        loader.register("main::Stamp", || PluginInstance::Document(Arc::new(Stamp)));
        let registry = PluginRegistry::new(loader);
        registry.add_builtin(manifest("Fx", "Fx"));
        registry.add_builtin(manifest("Stamp", "Stamp"));
        registry.load_plugin("Fx").unwrap();
        registry.load_plugin("Stamp").unwrap();

        let out = registry.invoke_image("Fx", Path::new("/tmp/in.png"), &Params::new()).unwrap();
        assert_eq!(out, PathBuf::from("/tmp/in.out.png"));

        let mut failing = Params::new();
        failing.insert("fail".into(), true.into());
        assert!(matches!(
            registry.invoke_image("Fx", Path::new("/tmp/in.png"), &failing),
            Err(PluginError::Invoke { .. })
        ));
        assert!(matches!(
            registry.invoke_image("Stamp", Path::new("/tmp/in.png"), &Params::new()),
            Err(PluginError::WrongKind { .. })
        ));
        assert!(registry.invoke_document("Stamp", Path::new("/tmp/a.pdf"), &Params::new()).is_ok());

        assert_eq!(registry.find_effect_provider("blur"), Some("Fx".to_string()));
        assert_eq!(registry.find_effect_provider("emboss"), None);

        registry.reload_plugin("Fx").unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded("Fx"));

        assert!(registry.unload_plugin("Fx").unwrap());
        assert!(!registry.unload_plugin("Fx").unwrap());
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert!(matches!(
            registry.invoke_image("Fx", Path::new("/tmp/in.png"), &Params::new()),
            Err(PluginError::NotLoaded(_))
        ));
    }

    #[test]
    fn calls_into_one_plugin_are_serialised() {
        let max = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&max);
        let mut loader = FactoryLoader::new();
        loader.register(
            "main::Slow",
            image_factory(move || Probe {
                max_in_flight: Arc::clone(&seen),
                ..probe("Slow")
            }),
        );
        let registry = Arc::new(PluginRegistry::new(loader));
        registry.add_builtin(manifest("Slow", "Slow"));
        registry.load_plugin("Slow").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..3 {
                        registry
                            .invoke_image("Slow", Path::new("x.png"), &Params::new())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn discovered_manifests_join_builtins() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("stamp");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            r#"{"name": "Stamp", "plugin_class": "Stamp", "kind": "ui-extension", "author": "me"}"#,
        )
        .unwrap();

        let mut loader = FactoryLoader::new();
        loader.register("main::Stamp", || PluginInstance::Ui(Arc::new(Stamp)));
        loader.register("main::Fx", image_factory(|| probe("Fx")));
        let registry = PluginRegistry::new(loader).with_directories([root.path().to_path_buf()]);
        registry.add_builtin(manifest("Fx", "Fx"));

        let report = registry.load_all();
        assert_eq!(report.loaded, vec!["Fx".to_string(), "Stamp".to_string()]);

        let info = registry.get_plugin_info();
        let stamp = info.iter().find(|i| i.name == "Stamp").unwrap();
        assert_eq!(stamp.author, "me");
        assert_eq!(stamp.directory.as_deref(), Some(dir.as_path()));
        assert_eq!(stamp.kind, Some(PluginKind::UiExtension));
        assert!(stamp.loaded);

        let menu = registry.menu_items();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].0, "Stamp");
        assert_eq!(menu[0].1.action, "stamp");
    }
}
