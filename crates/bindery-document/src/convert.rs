// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator: images in, one PDF out.
//
// Idle → Validating → Preparing → Assembling → Done, or Failed on empty
// input, cancellation, or an assembly error. Per-image and per-step failures
// are collected into the result and never end the run. Intermediate files
// live in a scratch directory owned by the run and removed on every exit
// path.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bindery_core::{
    CancellationToken, ConversionError, ConversionResult, ConversionState, ImageOutcome,
    ImageStatus, PageConfig, PageSize, RunId, SourceImage, StepFailure, TransformOp, TransformSpec,
};
use bindery_plugin::{Params, PluginRegistry};
use rayon::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, error, info, instrument, warn};

use crate::fit::fit_image;
use crate::image::Normalizer;
use crate::pdf::writer::{DocumentAssembler, StagedPage};
use crate::transform::TransformStage;

/// Hook fired before validation with the number of input paths.
pub const HOOK_BEFORE_CONVERT: &str = "before_convert";
/// Hook fired after each image is prepared with its index and path.
pub const HOOK_IMAGE_PREPARED: &str = "image_prepared";
/// Hook fired after the document is written with its path and page count.
pub const HOOK_AFTER_CONVERT: &str = "after_convert";

/// Progress sink. Receives values in [0, 1], never decreasing.
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Sync);

/// Everything a run needs besides the input paths and the output path.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub page_config: PageConfig,
    /// Applied to every image, after its own transforms.
    pub transforms: TransformSpec,
    /// Per-image transforms keyed by position in the input list.
    pub image_transforms: HashMap<usize, TransformSpec>,
    /// Document-transform plugins run over the finished PDF, in order.
    pub document_plugins: Vec<(String, Params)>,
    /// Apply EXIF orientation while normalising.
    pub auto_rotate: bool,
    /// Accepted extensions; `None` means the built-in set.
    pub extensions: Option<Vec<String>>,
    /// Cap on native (`FIT`) page size in pixels.
    pub max_size: Option<(u32, u32)>,
    pub parallel: bool,
    pub max_workers: usize,
    pub title: Option<String>,
    pub font_path: Option<PathBuf>,
    /// Parent of the per-run scratch directory; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            page_config: PageConfig::default(),
            transforms: TransformSpec::default(),
            image_transforms: HashMap::new(),
            document_plugins: Vec::new(),
            auto_rotate: true,
            extensions: None,
            max_size: None,
            parallel: false,
            max_workers: 4,
            title: None,
            font_path: None,
            scratch_root: None,
        }
    }
}

impl ConvertOptions {
    pub fn new(page_config: PageConfig) -> Self {
        Self {
            page_config,
            ..Self::default()
        }
    }

    pub fn with_transforms(mut self, transforms: TransformSpec) -> Self {
        self.transforms = transforms;
        self
    }

    /// Transforms for one image: its own list followed by the shared one.
    fn transforms_for(&self, index: usize) -> TransformSpec {
        match self.image_transforms.get(&index) {
            Some(own) => TransformSpec::new(
                own.ops().iter().chain(self.transforms.ops()).cloned().collect::<Vec<TransformOp>>(),
            ),
            None => self.transforms.clone(),
        }
    }
}

/// Outcome of preparing one valid image.
enum Prepared {
    Staged { page: StagedPage, skipped: Vec<StepFailure> },
    Dropped(ConversionError),
}

#[derive(Default)]
struct ProgressState {
    prepared: usize,
    last: f32,
    failed: bool,
}

/// Progress shared by preparation workers. Once the run has failed nothing
/// more is delivered.
struct Progress<'a> {
    sink: Option<ProgressFn<'a>>,
    state: Mutex<ProgressState>,
    total: usize,
}

impl<'a> Progress<'a> {
    fn new(sink: Option<ProgressFn<'a>>, total: usize) -> Self {
        Self {
            sink,
            state: Mutex::new(ProgressState::default()),
            total,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one image as finished and report the prepared fraction.
    fn image_done(&self, prepared: bool) {
        let mut state = self.lock();
        if state.failed {
            return;
        }
        if prepared {
            state.prepared += 1;
        }
        let value = (state.prepared as f32 / self.total.max(1) as f32).clamp(state.last, 1.0);
        state.last = value;
        if let Some(sink) = self.sink {
            sink(value);
        }
    }

    fn fail(&self) {
        self.lock().failed = true;
    }

    fn has_failed(&self) -> bool {
        self.lock().failed
    }

    fn finish(&self) {
        let mut state = self.lock();
        if state.failed {
            return;
        }
        state.last = 1.0;
        if let Some(sink) = self.sink {
            sink(1.0);
        }
    }
}

/// Runs one conversion. A converter is single-use: once it reaches `Done` or
/// `Failed` every further call returns `AlreadyFinished`.
pub struct Converter {
    registry: Option<Arc<PluginRegistry>>,
    cancel: CancellationToken,
    state: ConversionState,
    run_id: RunId,
}

impl Converter {
    pub fn new(registry: Option<Arc<PluginRegistry>>) -> Self {
        Self {
            registry,
            cancel: CancellationToken::new(),
            state: ConversionState::Idle,
            run_id: RunId::new(),
        }
    }

    /// Use `token` for cooperative cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Convert `paths`, in order, into one PDF at `output`.
    #[instrument(skip_all, fields(run = %self.run_id, images = paths.len(), output = %output.display()))]
    pub fn convert(
        &mut self,
        paths: &[PathBuf],
        output: &Path,
        options: &ConvertOptions,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ConversionResult, ConversionError> {
        if self.state != ConversionState::Idle {
            return Err(ConversionError::AlreadyFinished(self.state.to_string()));
        }

        let result = self.run(paths, output, options, progress);
        match &result {
            Ok(done) => {
                self.state = ConversionState::Done;
                info!(
                    pages = done.page_count,
                    failed = done.failed_count(),
                    output = %done.output_path.display(),
                    "conversion finished"
                );
            }
            Err(err) => {
                self.state = ConversionState::Failed;
                error!(error = %err, "conversion failed");
            }
        }
        result
    }

    fn run(
        &mut self,
        paths: &[PathBuf],
        output: &Path,
        options: &ConvertOptions,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ConversionResult, ConversionError> {
        self.fire(HOOK_BEFORE_CONVERT, &[json!(paths.len())]);

        // -- Validating -------------------------------------------------------
        self.state = ConversionState::Validating;
        let mut normalizer = Normalizer::new(options.auto_rotate);
        if let Some(extensions) = &options.extensions {
            normalizer = normalizer.with_extensions(extensions);
        }

        let mut statuses: Vec<Option<ImageStatus>> = vec![None; paths.len()];
        let mut valid = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            match normalizer.validate(index, path) {
                Ok(source) => valid.push(source),
                Err(err) => {
                    warn!(index, path = %path.display(), error = %err, "dropping invalid image");
                    statuses[index] = Some(ImageStatus::Failed(err));
                }
            }
        }
        if valid.is_empty() {
            return Err(ConversionError::EmptyInput);
        }
        debug!(valid = valid.len(), rejected = paths.len() - valid.len(), "validation finished");

        // -- Preparing --------------------------------------------------------
        self.state = ConversionState::Preparing;
        let mut builder = tempfile::Builder::new();
        builder.prefix("bindery-run-");
        let scratch = match &options.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|err| ConversionError::AssemblyError(format!("cannot create scratch directory: {err}")))?;

        let stage = TransformStage::new(self.registry.clone()).with_font_path(options.font_path.clone());
        let mut assembler = DocumentAssembler::new(options.page_config);
        if let Some(title) = &options.title {
            assembler.set_title(title.clone());
        }
        let tracker = Progress::new(progress, valid.len());
        let worker = PrepareWorker {
            normalizer: &normalizer,
            stage: &stage,
            assembler: &assembler,
            options,
            scratch: scratch.path(),
            cancel: &self.cancel,
            progress: &tracker,
            registry: self.registry.as_deref(),
        };

        let prepared = worker.prepare_all(&valid)?;

        // -- Assembling -------------------------------------------------------
        self.state = ConversionState::Assembling;
        if self.cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        let mut pages = Vec::new();
        for (source, outcome) in valid.iter().zip(prepared) {
            let status = match outcome {
                Prepared::Staged { page, skipped } => {
                    let (width, height) = (page.width, page.height);
                    pages.push(page);
                    ImageStatus::Converted {
                        page: pages.len(),
                        width,
                        height,
                        skipped_steps: skipped,
                    }
                }
                Prepared::Dropped(err) => ImageStatus::Failed(err),
            };
            statuses[source.index()] = Some(status);
        }

        let output_path = assembler.assemble(&pages, output)?;
        let document_failures = self.run_document_plugins(&output_path, &options.document_plugins);
        self.fire(
            HOOK_AFTER_CONVERT,
            &[json!(output_path.display().to_string()), json!(pages.len())],
        );
        tracker.finish();
        close_scratch(scratch);

        let outcomes = paths
            .iter()
            .zip(statuses)
            .enumerate()
            .map(|(index, (path, status))| ImageOutcome {
                index,
                path: path.clone(),
                status: status.unwrap_or(ImageStatus::Failed(ConversionError::Cancelled)),
            })
            .collect();

        Ok(ConversionResult {
            run_id: self.run_id,
            output_path,
            page_count: pages.len(),
            outcomes,
            document_failures,
        })
    }

    /// Run document-transform plugins over the finished PDF. A failing plugin
    /// leaves the document as it was.
    fn run_document_plugins(&self, output: &Path, plugins: &[(String, Params)]) -> Vec<StepFailure> {
        let mut failures = Vec::new();
        for (name, params) in plugins {
            let step = format!("document:{name}");
            let outcome = match self.registry.as_deref() {
                None => Err("no plugin registry available".to_string()),
                Some(registry) => registry
                    .invoke_document(name, output, params)
                    .map_err(|e| e.to_string())
                    .and_then(|result| adopt_document(&result, output)),
            };
            if let Err(reason) = outcome {
                warn!(plugin = %name, error = %reason, "document plugin failed, keeping document");
                failures.push(StepFailure { step, reason });
            }
        }
        failures
    }

    fn fire(&self, hook: &str, args: &[serde_json::Value]) {
        if let Some(registry) = &self.registry {
            registry.hooks().execute_hook(hook, args);
        }
    }
}

/// Shared, read-only context for preparing images, possibly on several threads.
struct PrepareWorker<'a> {
    normalizer: &'a Normalizer,
    stage: &'a TransformStage,
    assembler: &'a DocumentAssembler,
    options: &'a ConvertOptions,
    scratch: &'a Path,
    cancel: &'a CancellationToken,
    progress: &'a Progress<'a>,
    registry: Option<&'a PluginRegistry>,
}

impl PrepareWorker<'_> {
    /// Prepare every valid image; results come back in input order.
    fn prepare_all(&self, valid: &[SourceImage]) -> Result<Vec<Prepared>, ConversionError> {
        let workers = self.options.max_workers.max(1);
        if self.options.parallel && workers > 1 && valid.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => {
                    debug!(workers, "preparing in parallel");
                    return pool.install(|| valid.par_iter().map(|source| self.prepare(source)).collect());
                }
                Err(err) => warn!(error = %err, "cannot start worker pool, preparing sequentially"),
            }
        }
        valid.iter().map(|source| self.prepare(source)).collect()
    }

    /// Normalise, transform, fit and stage one image.
    ///
    /// `Err` is reserved for run-ending conditions; per-image problems come
    /// back as `Prepared::Dropped`.
    fn prepare(&self, source: &SourceImage) -> Result<Prepared, ConversionError> {
        if self.progress.has_failed() {
            // Another worker already ended the run; its error is the one reported.
            return Ok(Prepared::Dropped(ConversionError::Cancelled));
        }
        if self.cancel.is_cancelled() {
            self.progress.fail();
            return Err(ConversionError::Cancelled);
        }

        let normalized = match self.normalizer.load(source) {
            Ok(normalized) => normalized,
            Err(err) => {
                warn!(index = source.index(), path = %source.path().display(), error = %err, "dropping unreadable image");
                self.progress.image_done(false);
                return Ok(Prepared::Dropped(err));
            }
        };

        let spec = self.options.transforms_for(source.index());
        let transformed = self
            .stage
            .apply(normalized.image, normalized.oriented, source, &spec, self.scratch);

        let page_size: PageSize = self.options.page_config.page_size();
        let fitted = fit_image(transformed.image, page_size, self.options.max_size);

        let page = match self.assembler.stage(&fitted, self.scratch, source.index()) {
            Ok(page) => page,
            Err(err) => {
                self.progress.fail();
                return Err(ConversionError::AssemblyError(format!(
                    "cannot stage {}: {err}",
                    source.path().display()
                )));
            }
        };

        debug!(
            index = source.index(),
            width = page.width,
            height = page.height,
            skipped = transformed.skipped.len(),
            "image prepared"
        );
        if let Some(registry) = self.registry {
            registry.hooks().execute_hook(
                HOOK_IMAGE_PREPARED,
                &[json!(source.index()), json!(source.path().display().to_string())],
            );
        }
        self.progress.image_done(true);

        Ok(Prepared::Staged {
            page,
            skipped: transformed.skipped,
        })
    }
}

/// Move a document plugin's result over the output, unless it wrote in place.
fn adopt_document(result: &Path, output: &Path) -> Result<(), String> {
    if result == output {
        return Ok(());
    }
    if fs::rename(result, output).is_ok() {
        return Ok(());
    }
    fs::copy(result, output)
        .map(|_| {
            let _ = fs::remove_file(result);
        })
        .map_err(|err| format!("cannot adopt plugin output {}: {err}", result.display()))
}

fn close_scratch(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    if let Err(err) = scratch.close() {
        warn!(path = %path.display(), error = %err, "cannot remove scratch directory");
    }
}

/// One-shot conversion with no plugins, matching the classic entry point.
pub fn convert(
    paths: &[PathBuf],
    output: &Path,
    page_size: PageSize,
    compress: bool,
    quality: i64,
    progress: Option<ProgressFn<'_>>,
) -> Result<PathBuf, ConversionError> {
    let options = ConvertOptions::new(PageConfig::new(page_size, compress, quality))
        .with_transforms(TransformSpec::default().with(TransformOp::AutoRotate));
    Converter::new(None)
        .convert(paths, output, &options, progress)
        .map(|result| result.output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(w, h, Rgb(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn converter_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "a.png", 8, 8, [1, 2, 3]);
        let out = dir.path().join("out.pdf");

        let mut converter = Converter::new(None);
        converter
            .convert(&[input.clone()], &out, &ConvertOptions::default(), None)
            .unwrap();
        assert_eq!(converter.state(), ConversionState::Done);

        let again = converter.convert(&[input], &out, &ConvertOptions::default(), None);
        assert_eq!(again.unwrap_err(), ConversionError::AlreadyFinished("Done".into()));
    }

    #[test]
    fn cancelled_run_fails_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "a.png", 8, 8, [1, 2, 3]);
        let out = dir.path().join("out.pdf");

        let token = CancellationToken::new();
        token.cancel();
        let mut converter = Converter::new(None).with_cancellation(token);
        let err = converter
            .convert(&[input], &out, &ConvertOptions::default(), None)
            .unwrap_err();
        assert_eq!(err, ConversionError::Cancelled);
        assert_eq!(converter.state(), ConversionState::Failed);
        assert!(!out.exists());
    }

    #[test]
    fn scratch_directory_is_removed_on_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "a.png", 8, 8, [1, 2, 3]);
        let root = tempfile::tempdir().unwrap();
        let options = ConvertOptions {
            scratch_root: Some(root.path().to_path_buf()),
            ..ConvertOptions::default()
        };
        let leftovers = || std::fs::read_dir(root.path()).unwrap().count();

        Converter::new(None)
            .convert(&[input.clone()], &dir.path().join("out.pdf"), &options, None)
            .unwrap();
        assert_eq!(leftovers(), 0);

        let err = Converter::new(None)
            .convert(&[input.clone()], &dir.path().join("missing").join("out.pdf"), &options, None)
            .unwrap_err();
        assert!(matches!(err, ConversionError::AssemblyError(_)));
        assert_eq!(leftovers(), 0);

        let token = CancellationToken::new();
        token.cancel();
        let err = Converter::new(None)
            .with_cancellation(token)
            .convert(&[input], &dir.path().join("cancelled.pdf"), &options, None)
            .unwrap_err();
        assert_eq!(err, ConversionError::Cancelled);
        assert_eq!(leftovers(), 0);
    }

    #[test]
    fn progress_goes_quiet_after_failure() {
        let seen = Mutex::new(Vec::new());
        let sink: ProgressFn<'_> = &|v: f32| seen.lock().unwrap().push(v);
        let progress = Progress::new(Some(sink), 4);

        progress.image_done(true);
        progress.fail();
        progress.image_done(true);
        progress.finish();

        assert!(progress.has_failed());
        assert_eq!(*seen.lock().unwrap(), vec![0.25]);
    }

    #[test]
    fn image_transforms_run_before_shared_ones() {
        let mut options = ConvertOptions::default().with_transforms(
            TransformSpec::default().with(TransformOp::AutoRotate),
        );
        options
            .image_transforms
            .insert(1, TransformSpec::default().with(TransformOp::Rotate { degrees: 90.0 }));

        assert_eq!(options.transforms_for(0).ops(), &[TransformOp::AutoRotate]);
        assert_eq!(
            options.transforms_for(1).ops(),
            &[TransformOp::Rotate { degrees: 90.0 }, TransformOp::AutoRotate]
        );
    }

    #[test]
    fn unreadable_image_is_dropped_after_validation() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_png(dir.path(), "good.png", 8, 8, [9, 9, 9]);
        let noisy = dir.path().join("noisy.png");
        RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 37 % 256) as u8, (y * 91 % 256) as u8, (x * y % 256) as u8]))
            .save(&noisy)
            .unwrap();
        let truncated = dir.path().join("broken.png");
        let bytes = std::fs::read(&noisy).unwrap();
        std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();
        let out = dir.path().join("out.pdf");

        let result = Converter::new(None)
            .convert(&[truncated, good], &out, &ConvertOptions::default(), None)
            .unwrap();
        assert_eq!(result.page_count, 1);
        assert_eq!(result.failed_count(), 1);
        assert!(matches!(
            result.outcomes[1].status,
            ImageStatus::Converted { page: 1, .. }
        ));
    }

    #[test]
    fn missing_document_plugin_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_png(dir.path(), "a.png", 8, 8, [1, 2, 3]);
        let out = dir.path().join("out.pdf");
        let mut options = ConvertOptions::default();
        options.document_plugins.push(("Stamp".into(), Params::new()));

        let result = Converter::new(None).convert(&[input], &out, &options, None).unwrap();
        assert!(out.exists());
        assert_eq!(result.document_failures.len(), 1);
        assert_eq!(result.document_failures[0].step, "document:Stamp");
    }
}
