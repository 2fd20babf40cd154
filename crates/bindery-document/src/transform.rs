// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transform stage: folds an ordered list of operations over one image.
//
// Steps are best-effort. A step that fails is recorded and skipped, and the
// next step receives the image exactly as it was before the failed step.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bindery_core::{SourceImage, StepFailure, TransformOp, TransformSpec};
use bindery_plugin::{Params, PluginRegistry};
use image::RgbImage;
use serde_json::json;
use tracing::{debug, warn};

use crate::image::effects::apply_effect;
use crate::image::normalize::{apply_orientation, to_document_rgb};
use crate::image::{ImageProcessor, Watermarker};

/// Image state threaded through the steps.
struct Working {
    image: RgbImage,
    oriented: bool,
}

/// Result of running a transform list over one image.
pub struct Transformed {
    pub image: RgbImage,
    pub skipped: Vec<StepFailure>,
}

pub struct TransformStage {
    registry: Option<Arc<PluginRegistry>>,
    font_path: Option<PathBuf>,
    watermarker: OnceLock<Result<Arc<Watermarker>, String>>,
}

impl TransformStage {
    /// A stage resolving effects and plugin steps through `registry`.
    ///
    /// Effects no loaded plugin offers run on the built-in filters; plugin
    /// steps without a registry fail (and are skipped).
    pub fn new(registry: Option<Arc<PluginRegistry>>) -> Self {
        Self {
            registry,
            font_path: None,
            watermarker: OnceLock::new(),
        }
    }

    /// Font used for watermark steps instead of the system search.
    pub fn with_font_path(mut self, font_path: Option<PathBuf>) -> Self {
        self.font_path = font_path;
        self
    }

    /// Run `spec` over `image`.
    ///
    /// `oriented` says whether the EXIF orientation of `source` has already
    /// been applied; `auto_rotate` steps apply it at most once. `scratch` is
    /// where plugin steps exchange files.
    pub fn apply(
        &self,
        image: RgbImage,
        oriented: bool,
        source: &SourceImage,
        spec: &TransformSpec,
        scratch: &Path,
    ) -> Transformed {
        let (working, skipped) = spec.ops().iter().enumerate().fold(
            (Working { image, oriented }, Vec::new()),
            |(working, mut skipped), (step_index, op)| {
                match self.apply_op(&working, op, source, scratch, step_index) {
                    Ok(next) => (next, skipped),
                    Err(reason) => {
                        let step = op.step_name();
                        warn!(
                            index = source.index(),
                            path = %source.path().display(),
                            step = %step,
                            error = %reason,
                            "transform step failed, keeping image unchanged"
                        );
                        skipped.push(StepFailure { step, reason });
                        (working, skipped)
                    }
                }
            },
        );
        Transformed {
            image: working.image,
            skipped,
        }
    }

    fn apply_op(
        &self,
        working: &Working,
        op: &TransformOp,
        source: &SourceImage,
        scratch: &Path,
        step_index: usize,
    ) -> Result<Working, String> {
        let image = match op {
            TransformOp::Enhance {
                brightness,
                contrast,
                saturation,
                sharpness,
            } => ImageProcessor::from_rgb(working.image.clone())
                .brightness(*brightness)
                .contrast(*contrast)
                .color(*saturation)
                .sharpness(*sharpness)
                .into_rgb(),

            TransformOp::AutoRotate => {
                if working.oriented {
                    return Ok(Working {
                        image: working.image.clone(),
                        oriented: true,
                    });
                }
                return Ok(Working {
                    image: apply_orientation(working.image.clone(), source.orientation()),
                    oriented: true,
                });
            }

            TransformOp::Rotate { degrees } => ImageProcessor::from_rgb(working.image.clone())
                .rotate(*degrees)
                .into_rgb(),

            TransformOp::Watermark {
                text,
                position,
                opacity,
                font_size,
            } => {
                if text.trim().is_empty() {
                    working.image.clone()
                } else {
                    self.watermarker()?
                        .apply(&working.image, text, *position, *opacity, *font_size)
                }
            }

            TransformOp::Effect { name, intensity } => {
                let provider = self
                    .registry
                    .as_deref()
                    .and_then(|registry| registry.find_effect_provider(name).map(|p| (registry, p)));
                match provider {
                    Some((registry, provider)) => {
                        let mut params = Params::new();
                        params.insert("effect".into(), json!(name));
                        params.insert("intensity".into(), json!(intensity));
                        self.run_plugin(registry, &provider, &params, &working.image, source, scratch, step_index)?
                    }
                    None => {
                        debug!(effect = %name, "no effect plugin loaded, using built-in filter");
                        apply_effect(&working.image, name, *intensity)
                    }
                }
            }

            TransformOp::Plugin { name, params } => {
                let registry = self.registry()?;
                self.run_plugin(registry, name, params, &working.image, source, scratch, step_index)?
            }
        };

        Ok(Working {
            image,
            oriented: working.oriented,
        })
    }

    fn registry(&self) -> Result<&PluginRegistry, String> {
        self.registry
            .as_deref()
            .ok_or_else(|| "no plugin registry available".to_string())
    }

    fn watermarker(&self) -> Result<Arc<Watermarker>, String> {
        self.watermarker
            .get_or_init(|| {
                Watermarker::discover(self.font_path.as_deref())
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
    }

    /// Hand the image to a plugin through a scratch file and read its result
    /// back.
    #[allow(clippy::too_many_arguments)]
    fn run_plugin(
        &self,
        registry: &PluginRegistry,
        plugin: &str,
        params: &Params,
        image: &RgbImage,
        source: &SourceImage,
        scratch: &Path,
        step_index: usize,
    ) -> Result<RgbImage, String> {
        let input = scratch.join(format!("step-{}-{}.png", source.index(), step_index));
        image.save(&input).map_err(|e| format!("cannot stage image for plugin: {e}"))?;

        let result = registry
            .invoke_image(plugin, &input, params)
            .map_err(|e| e.to_string())
            .and_then(|output| {
                let decoded = image::open(&output)
                    .map(to_document_rgb)
                    .map_err(|e| format!("cannot read plugin output {}: {e}", output.display()));
                if output != input {
                    let _ = std::fs::remove_file(&output);
                }
                decoded
            });
        let _ = std::fs::remove_file(&input);

        debug!(plugin, index = source.index(), ok = result.is_ok(), "plugin step finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{builtin_manifests, register_builtin_factories};
    use bindery_core::{ColorMode, ImageFormat, WatermarkPosition};
    use bindery_plugin::FactoryLoader;
    use image::Rgb;

    fn source(orientation: u32) -> SourceImage {
        SourceImage::new(
            0,
            "page.png".into(),
            ImageFormat::Png,
            (2, 1),
            ColorMode::Rgb,
            orientation,
        )
    }

    fn two_pixels() -> RgbImage {
        RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) })
    }

    fn loaded_registry() -> Arc<PluginRegistry> {
        let mut loader = FactoryLoader::new();
        register_builtin_factories(&mut loader);
        let registry = PluginRegistry::new(loader);
        for manifest in builtin_manifests() {
            registry.add_builtin(manifest);
        }
        registry.load_all();
        Arc::new(registry)
    }

    #[test]
    fn auto_rotate_applies_orientation_once() {
        let scratch = tempfile::tempdir().unwrap();
        let spec = TransformSpec::default()
            .with(TransformOp::AutoRotate)
            .with(TransformOp::AutoRotate);
        let out = TransformStage::new(None).apply(two_pixels(), false, &source(6), &spec, scratch.path());
        assert_eq!(out.image.dimensions(), (1, 2));
        assert!(out.skipped.is_empty());

        let already = TransformStage::new(None).apply(two_pixels(), true, &source(6), &spec, scratch.path());
        assert_eq!(already.image.dimensions(), (2, 1));
    }

    #[test]
    fn failed_step_passes_image_through_to_the_next() {
        let scratch = tempfile::tempdir().unwrap();
        let spec = TransformSpec::default()
            .with(TransformOp::Plugin {
                name: "Stamp".into(),
                params: Params::new(),
            })
            .with(TransformOp::Rotate { degrees: 90.0 });

        let out = TransformStage::new(None).apply(two_pixels(), true, &source(1), &spec, scratch.path());
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].step, "plugin:Stamp");
        assert_eq!(out.image.dimensions(), (1, 2));
        assert_eq!(out.image.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn effects_resolve_through_the_registry() {
        let scratch = tempfile::tempdir().unwrap();
        let stage = TransformStage::new(Some(loaded_registry()));
        let spec = TransformSpec::default()
            .with(TransformOp::Effect {
                name: "black_white".into(),
                intensity: 1.0,
            })
            .with(TransformOp::Effect {
                name: "glitter".into(),
                intensity: 1.0,
            })
            .with(TransformOp::Plugin {
                name: "Missing".into(),
                params: Params::new(),
            });

        let out = stage.apply(two_pixels(), true, &source(1), &spec, scratch.path());
        let p = out.image.get_pixel(0, 0);
        assert!(p[0] == p[1] && p[1] == p[2]);
        let failed: Vec<_> = out.skipped.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(failed, vec!["plugin:Missing"]);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn effects_without_a_registry_use_built_in_filters() {
        let scratch = tempfile::tempdir().unwrap();
        let spec = TransformSpec::default()
            .with(TransformOp::Effect {
                name: "black_white".into(),
                intensity: 1.0,
            })
            .with(TransformOp::Effect {
                name: "glitter".into(),
                intensity: 1.0,
            });

        let out = TransformStage::new(None).apply(two_pixels(), true, &source(1), &spec, scratch.path());
        assert!(out.skipped.is_empty());
        let p = out.image.get_pixel(1, 0);
        assert!(p[0] == p[1] && p[1] == p[2]);
        assert_ne!(out.image, two_pixels());
    }

    #[test]
    fn watermark_with_unloadable_font_is_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let stage = TransformStage::new(None).with_font_path(Some("/nonexistent/font.ttf".into()));
        let spec = TransformSpec::default().with(TransformOp::Watermark {
            text: "DRAFT".into(),
            position: WatermarkPosition::Center,
            opacity: 0.7,
            font_size: 36,
        });
        let out = stage.apply(two_pixels(), true, &source(1), &spec, scratch.path());
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.image, two_pixels());
    }

    #[test]
    fn enhance_with_unit_factors_is_identity() {
        let scratch = tempfile::tempdir().unwrap();
        let spec = TransformSpec::from_json(r#"[{"op": "enhance"}]"#).unwrap();
        let out = TransformStage::new(None).apply(two_pixels(), true, &source(1), &spec, scratch.path());
        assert_eq!(out.image, two_pixels());
        assert!(out.skipped.is_empty());
    }
}
