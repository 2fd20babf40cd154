// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end properties of the conversion pipeline, checked by reading the
// produced PDF back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bindery_core::{
    ConversionError, ImageStatus, PageConfig, PageSize, TransformOp, TransformSpec,
};
use bindery_document::plugins::{builtin_manifests, register_builtin_factories};
use bindery_document::{ConvertOptions, Converter, PdfReader, convert};
use bindery_plugin::{FactoryLoader, Plugin, PluginInstance, PluginManifest, PluginRegistry};
use image::{Rgb, RgbImage};
use serde_json::json;

const RED: [u8; 3] = [220, 20, 20];
const GREEN: [u8; 3] = [20, 220, 20];
const BLUE: [u8; 3] = [20, 20, 220];

fn write_image(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(w, h, Rgb(color)).save(&path).unwrap();
    path
}

/// An image with enough detail for JPEG quality to matter.
fn write_photo(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(400, 300, |x, y| {
        let n = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) >> 7;
        Rgb([(x % 256) as u8, (n % 256) as u8, ((x * y) % 256) as u8])
    })
    .save(&path)
    .unwrap();
    path
}

fn centre_pixel(img: &RgbImage) -> [u8; 3] {
    img.get_pixel(img.width() / 2, img.height() / 2).0
}

fn close_to(actual: [u8; 3], expected: [u8; 3]) -> bool {
    actual
        .iter()
        .zip(expected)
        .all(|(a, e)| (*a as i32 - e as i32).abs() < 40)
}

fn page_colours(pdf: &Path) -> Vec<[u8; 3]> {
    PdfReader::open(pdf)
        .unwrap()
        .page_images()
        .unwrap()
        .iter()
        .map(|page| centre_pixel(&page.to_rgb().unwrap()))
        .collect()
}

#[test]
fn page_order_follows_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![
        write_image(dir.path(), "1.png", 60, 40, RED),
        write_image(dir.path(), "2.jpg", 60, 40, GREEN),
        write_image(dir.path(), "3.bmp", 60, 40, BLUE),
    ];
    let out = dir.path().join("ordered.pdf");

    convert(&inputs, &out, PageSize::A4, true, 90, None).unwrap();

    let colours = page_colours(&out);
    assert_eq!(colours.len(), 3);
    for (actual, expected) in colours.into_iter().zip([RED, GREEN, BLUE]) {
        assert!(close_to(actual, expected), "{actual:?} vs {expected:?}");
    }
}

#[test]
fn page_order_survives_parallel_preparation() {
    let dir = tempfile::tempdir().unwrap();
    let colours = [RED, GREEN, BLUE, RED, GREEN, BLUE, RED, GREEN];
    let inputs: Vec<PathBuf> = colours
        .iter()
        .enumerate()
        .map(|(i, c)| write_image(dir.path(), &format!("{i}.png"), 30 + i as u32 * 7, 20, *c))
        .collect();
    let out = dir.path().join("parallel.pdf");

    let mut options = ConvertOptions::new(PageConfig::new(PageSize::Fit, false, 85));
    options.parallel = true;
    options.max_workers = 4;
    let result = Converter::new(None).convert(&inputs, &out, &options, None).unwrap();
    assert_eq!(result.page_count, colours.len());

    let pages = PdfReader::open(&out).unwrap().page_images().unwrap();
    for (i, (page, expected)) in pages.iter().zip(colours).enumerate() {
        assert_eq!(page.width, 30 + i as u32 * 7);
        assert_eq!(centre_pixel(&page.to_rgb().unwrap()), expected);
    }
}

#[test]
fn wide_image_fits_a4_width() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_image(dir.path(), "wide.png", 100, 50, GREEN);
    let out = dir.path().join("fit.pdf");

    let result = Converter::new(None)
        .convert(
            &[input],
            &out,
            &ConvertOptions::new(PageConfig::new(PageSize::A4, false, 85)),
            None,
        )
        .unwrap();

    match &result.outcomes[0].status {
        ImageStatus::Converted { width, height, .. } => assert_eq!((*width, *height), (595, 297)),
        other => panic!("unexpected status {other:?}"),
    }
    let reader = PdfReader::open(&out).unwrap();
    let page = &reader.page_images().unwrap()[0];
    assert_eq!((page.width, page.height), (595, 297));
    let media = reader.page_sizes().unwrap()[0];
    assert_eq!((media.width, media.height), (595.0, 842.0));
}

#[test]
fn lower_quality_never_grows_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_photo(dir.path(), "a.png"), write_photo(dir.path(), "b.png")];

    let size_at = |quality: i64| {
        let out = dir.path().join(format!("q{quality}.pdf"));
        convert(&inputs, &out, PageSize::A4, true, quality, None).unwrap();
        std::fs::metadata(&out).unwrap().len()
    };

    let sizes: Vec<u64> = [90, 50, 10].into_iter().map(size_at).collect();
    assert!(sizes.windows(2).all(|w| w[1] <= w[0]), "{sizes:?}");
}

#[test]
fn progress_is_monotonic_and_ends_at_one() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = (0..5)
        .map(|i| write_image(dir.path(), &format!("{i}.png"), 20, 20, RED))
        .collect();
    let out = dir.path().join("progress.pdf");

    for parallel in [false, true] {
        let seen = Mutex::new(Vec::new());
        let record = |value: f32| seen.lock().unwrap().push(value);
        let mut options = ConvertOptions::default();
        options.parallel = parallel;

        Converter::new(None)
            .convert(&inputs, &out, &options, Some(&record))
            .unwrap();

        let values = seen.into_inner().unwrap();
        assert!(!values.is_empty());
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(*values.last().unwrap(), 1.0);
    }
}

#[test]
fn unsupported_file_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs: Vec<PathBuf> = (0..4)
        .map(|i| write_image(dir.path(), &format!("{i}.png"), 20, 20, BLUE))
        .collect();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "not an image").unwrap();
    inputs.insert(2, notes.clone());
    let out = dir.path().join("isolated.pdf");

    let result = Converter::new(None)
        .convert(&inputs, &out, &ConvertOptions::default(), None)
        .unwrap();

    assert_eq!(result.page_count, 4);
    assert_eq!(PdfReader::open(&out).unwrap().page_count(), 4);
    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, notes);
    assert!(matches!(
        failures[0].status,
        ImageStatus::Failed(ConversionError::InvalidFormat { .. })
    ));
    assert!(matches!(result.outcomes[3].status, ImageStatus::Converted { page: 3, .. }));
}

#[test]
fn empty_batch_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("empty.pdf");

    let err = convert(&[], &out, PageSize::A4, true, 85, None).unwrap_err();
    assert_eq!(err, ConversionError::EmptyInput);
    assert!(!out.exists());

    let only_bad = vec![dir.path().join("missing.png")];
    let err = convert(&only_bad, &out, PageSize::A4, true, 85, None).unwrap_err();
    assert_eq!(err, ConversionError::EmptyInput);
    assert!(!out.exists());
}

// -- Plugins ------------------------------------------------------------------

struct Refusing;

impl Plugin for Refusing {
    fn name(&self) -> &str {
        "Refusing"
    }
    fn version(&self) -> &str {
        "0.1.0"
    }
    fn description(&self) -> &str {
        "fails to initialise"
    }
    fn author(&self) -> &str {
        "tests"
    }
    fn initialize(&self) -> bool {
        false
    }
}

impl bindery_plugin::ImageProcessorPlugin for Refusing {
    fn process_image(&self, input: &Path, _: &bindery_plugin::Params) -> bindery_plugin::PluginResult<PathBuf> {
        Ok(input.to_path_buf())
    }
    fn get_parameters(&self) -> bindery_plugin::ParameterSchema {
        Default::default()
    }
}

fn registry_with_refusing_plugin_first() -> PluginRegistry {
    let mut loader = FactoryLoader::new();
    register_builtin_factories(&mut loader);
    loader.register("refusing::Refusing", || PluginInstance::Image(Arc::new(Refusing)));
    let registry = PluginRegistry::new(loader);
    registry.add_builtin(PluginManifest::new("Refusing", "refusing", "Refusing"));
    for manifest in builtin_manifests() {
        registry.add_builtin(manifest);
    }
    registry
}

#[test]
fn refusing_plugin_is_excluded_and_later_plugins_load() {
    let registry = registry_with_refusing_plugin_first();
    let report = registry.load_all();

    assert!(!registry.is_loaded("Refusing"));
    assert!(registry.is_loaded("Image Effects"));
    assert_eq!(report.loaded, vec!["Image Effects".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        ConversionError::PluginLoadFailure { plugin, .. } if plugin == "Refusing"
    ));
}

#[test]
fn effects_and_hooks_run_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![
        write_image(dir.path(), "a.png", 40, 40, RED),
        write_image(dir.path(), "b.png", 40, 40, BLUE),
    ];
    let out = dir.path().join("effects.pdf");

    let registry = Arc::new(registry_with_refusing_plugin_first());
    registry.load_all();

    let prepared = Arc::new(AtomicUsize::new(0));
    let counter = prepared.clone();
    registry.hooks().register_hook("image_prepared", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!(null))
    });
    registry
        .hooks()
        .register_hook("image_prepared", |_| Err("hook failure".into()));

    let options = ConvertOptions::new(PageConfig::new(PageSize::Fit, false, 85)).with_transforms(
        TransformSpec::default()
            .with(TransformOp::Effect {
                name: "black_white".into(),
                intensity: 1.0,
            })
            .with(TransformOp::Plugin {
                name: "Refusing".into(),
                params: Default::default(),
            }),
    );
    let result = Converter::new(Some(registry.clone()))
        .convert(&inputs, &out, &options, None)
        .unwrap();

    assert_eq!(result.page_count, 2);
    assert_eq!(prepared.load(Ordering::SeqCst), 2);
    for outcome in &result.outcomes {
        match &outcome.status {
            ImageStatus::Converted { skipped_steps, .. } => {
                assert_eq!(skipped_steps.len(), 1);
                assert_eq!(skipped_steps[0].step, "plugin:Refusing");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
    for colour in page_colours(&out) {
        assert!(colour[0] == colour[1] && colour[1] == colour[2], "{colour:?}");
    }
}
