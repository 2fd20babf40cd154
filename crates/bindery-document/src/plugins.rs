// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugins compiled into Bindery. The "Image Effects" plugin exposes the
// effect filters through the same contract as third-party plugins, so effect
// steps in a transform list resolve through the registry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bindery_plugin::{
    FactoryLoader, ImageProcessorPlugin, ParameterSchema, ParameterSpec, Params, Plugin,
    PluginInstance, PluginKind, PluginManifest, PluginResult,
};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::image::effects::{EFFECTS, apply_effect};
use crate::image::normalize::to_document_rgb;

pub const IMAGE_EFFECTS: &str = "Image Effects";
const IMAGE_EFFECTS_MODULE: &str = "main";
const IMAGE_EFFECTS_CLASS: &str = "ImageEffectsPlugin";

/// Blur, sharpen, sepia, vintage and friends as an image-transform plugin.
///
/// Results are written to a private scratch directory created by
/// `initialize` and removed by `cleanup`.
#[derive(Default)]
pub struct ImageEffectsPlugin {
    workdir: Mutex<Option<TempDir>>,
    counter: AtomicU64,
}

impl ImageEffectsPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn output_path(&self, input: &Path, effect: &str) -> Option<PathBuf> {
        let guard = self.workdir.lock().unwrap_or_else(PoisonError::into_inner);
        let dir = guard.as_ref()?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(dir.path().join(format!("{stem}_{effect}_{n}.png")))
    }
}

impl Plugin for ImageEffectsPlugin {
    fn name(&self) -> &str {
        IMAGE_EFFECTS
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Image effects and filters: blur, sharpen, vintage, sepia, black and white, and more"
    }

    fn author(&self) -> &str {
        "Bindery"
    }

    fn initialize(&self) -> bool {
        match tempfile::Builder::new().prefix("bindery-effects-").tempdir() {
            Ok(dir) => {
                debug!(dir = %dir.path().display(), "effects scratch directory created");
                *self.workdir.lock().unwrap_or_else(PoisonError::into_inner) = Some(dir);
                true
            }
            Err(err) => {
                warn!(error = %err, "cannot create effects scratch directory");
                false
            }
        }
    }

    fn cleanup(&self) -> bool {
        self.workdir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|dir| dir.close().is_ok())
            .unwrap_or(true)
    }

    fn supports_concurrency(&self) -> bool {
        true
    }
}

impl ImageProcessorPlugin for ImageEffectsPlugin {
    fn process_image(&self, input: &Path, params: &Params) -> PluginResult<PathBuf> {
        let effect = params.get("effect").and_then(|v| v.as_str()).unwrap_or("none");
        let intensity = params
            .get("intensity")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0) as f32;

        let image = image::open(input)?;
        let processed = apply_effect(&to_document_rgb(image), effect, intensity);

        let output = self
            .output_path(input, effect)
            .ok_or("plugin is not initialized")?;
        processed.save(&output)?;
        info!(effect, intensity, output = %output.display(), "effect applied");
        Ok(output)
    }

    fn get_parameters(&self) -> ParameterSchema {
        let mut schema = ParameterSchema::new();
        schema.insert(
            "effect".into(),
            ParameterSpec::select(EFFECTS, "none", "Image effect to apply"),
        );
        schema.insert(
            "intensity".into(),
            ParameterSpec::slider(0.1, 3.0, 0.1, 1.0, "Effect intensity"),
        );
        schema
    }
}

/// Manifest under which the built-in effects plugin is registered.
pub fn image_effects_manifest() -> PluginManifest {
    let mut manifest = PluginManifest::new(IMAGE_EFFECTS, IMAGE_EFFECTS_MODULE, IMAGE_EFFECTS_CLASS);
    manifest.description = ImageEffectsPlugin::new().description().to_string();
    manifest.author = "Bindery".into();
    manifest.kind = Some(PluginKind::ImageTransform);
    manifest
}

/// Add factories for every built-in plugin.
pub fn register_builtin_factories(loader: &mut FactoryLoader) {
    loader.register(
        format!("{IMAGE_EFFECTS_MODULE}::{IMAGE_EFFECTS_CLASS}"),
        || PluginInstance::Image(Arc::new(ImageEffectsPlugin::new())),
    );
}

/// Manifests of every built-in plugin.
pub fn builtin_manifests() -> Vec<PluginManifest> {
    vec![image_effects_manifest()]
}
