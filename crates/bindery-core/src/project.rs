// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Saved image arrangements ("projects"), stored as pretty JSON files in a
// projects directory. A project turns into an ordered path list, a page
// policy, and the transforms to apply.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BinderyError, Result};
use crate::types::{
    DEFAULT_QUALITY, PageConfig, PageSize, TransformOp, TransformSpec, WatermarkPosition,
};

/// Descriptive information about a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".into()
}

/// Conversion settings stored with a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub page_size: PageSize,
    pub compress: bool,
    pub quality: u8,
    pub watermark_text: String,
    pub watermark_position: WatermarkPosition,
    pub auto_rotate: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            compress: false,
            quality: DEFAULT_QUALITY,
            watermark_text: String::new(),
            watermark_position: WatermarkPosition::BottomRight,
            auto_rotate: true,
        }
    }
}

/// One image in a project, with its per-image adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectImage {
    pub path: PathBuf,
    pub order: usize,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Clockwise rotation in degrees.
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "unit")]
    pub brightness: f32,
    #[serde(default = "unit")]
    pub contrast: f32,
    #[serde(default = "unit")]
    pub saturation: f32,
}

fn enabled_default() -> bool {
    true
}

fn unit() -> f32 {
    1.0
}

impl ProjectImage {
    pub fn new(path: PathBuf, order: usize) -> Self {
        Self {
            path,
            order,
            enabled: true,
            rotation: 0.0,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }

    /// Per-image transforms implied by the adjustments.
    pub fn transforms(&self) -> TransformSpec {
        let mut spec = TransformSpec::default();
        if self.rotation.rem_euclid(360.0).abs() > f32::EPSILON {
            spec = spec.with(TransformOp::Rotate {
                degrees: self.rotation,
            });
        }
        if self.brightness != 1.0 || self.contrast != 1.0 || self.saturation != 1.0 {
            spec = spec.with(TransformOp::Enhance {
                brightness: self.brightness,
                contrast: self.contrast,
                saturation: self.saturation,
                sharpness: 1.0,
            });
        }
        spec
    }
}

/// A complete saved arrangement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub images: Vec<ProjectImage>,
}

/// Everything a conversion needs, derived from a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRequest {
    /// Enabled images in project order.
    pub paths: Vec<PathBuf>,
    pub page_config: PageConfig,
    /// Transforms applied to every image.
    pub transforms: TransformSpec,
    /// Extra transforms keyed by position in `paths`.
    pub image_transforms: HashMap<usize, TransformSpec>,
}

impl Project {
    /// Start a project from an ordered list of images. Paths that do not
    /// exist are skipped.
    pub fn from_images(name: impl Into<String>, description: impl Into<String>, paths: &[PathBuf]) -> Self {
        let now = Utc::now();
        let images = paths
            .iter()
            .filter(|p| {
                let exists = p.exists();
                if !exists {
                    warn!(path = %p.display(), "skipping missing image");
                }
                exists
            })
            .enumerate()
            .map(|(order, p)| ProjectImage::new(p.clone(), order))
            .collect();

        Self {
            metadata: ProjectMetadata {
                name: name.into(),
                description: description.into(),
                created: now,
                modified: now,
                version: default_version(),
            },
            settings: ProjectSettings::default(),
            images,
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Plain-text overview: metadata, page settings, and images in order
    /// with `[x]` for enabled and `[ ]` for skipped entries.
    pub fn summary(&self) -> String {
        let on_off = |flag: bool| if flag { "enabled" } else { "disabled" };
        let settings = &self.settings;
        let mut out = String::new();

        let _ = writeln!(out, "Project: {}", self.metadata.name);
        if !self.metadata.description.is_empty() {
            let _ = writeln!(out, "Description: {}", self.metadata.description);
        }
        let _ = writeln!(out, "Created: {}", self.metadata.created.format("%Y-%m-%d %H:%M"));
        let _ = writeln!(out, "Modified: {}", self.metadata.modified.format("%Y-%m-%d %H:%M"));
        let _ = writeln!(out, "Version: {}", self.metadata.version);
        let _ = writeln!(out);
        let _ = writeln!(out, "Page size: {}", settings.page_size);
        let _ = writeln!(out, "Compression: {}", on_off(settings.compress));
        let _ = writeln!(out, "Quality: {}%", settings.quality);
        let _ = writeln!(out, "Auto-rotate: {}", on_off(settings.auto_rotate));
        let watermark = if settings.watermark_text.is_empty() {
            "none"
        } else {
            settings.watermark_text.as_str()
        };
        let _ = writeln!(out, "Watermark: {watermark}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Images ({}):", self.images.len());

        let mut ordered: Vec<&ProjectImage> = self.images.iter().collect();
        ordered.sort_by_key(|i| i.order);
        for (n, image) in ordered.iter().enumerate() {
            let mark = if image.enabled { "[x]" } else { "[ ]" };
            let name = image
                .path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| image.path.display().to_string());
            let _ = writeln!(out, "{:3}. {mark} {name}", n + 1);
        }
        out
    }

    /// Build the conversion inputs for this project.
    pub fn to_request(&self) -> ProjectRequest {
        let mut ordered: Vec<&ProjectImage> = self.images.iter().filter(|i| i.enabled).collect();
        ordered.sort_by_key(|i| i.order);

        let mut transforms = TransformSpec::default();
        if self.settings.auto_rotate {
            transforms = transforms.with(TransformOp::AutoRotate);
        }
        if !self.settings.watermark_text.is_empty() {
            transforms = transforms.with(TransformOp::Watermark {
                text: self.settings.watermark_text.clone(),
                position: self.settings.watermark_position,
                opacity: 0.7,
                font_size: 36,
            });
        }

        let image_transforms = ordered
            .iter()
            .enumerate()
            .filter_map(|(pos, image)| {
                let spec = image.transforms();
                (!spec.is_empty()).then_some((pos, spec))
            })
            .collect();

        ProjectRequest {
            paths: ordered.iter().map(|i| i.path.clone()).collect(),
            page_config: PageConfig::new(
                self.settings.page_size,
                self.settings.compress,
                self.settings.quality as i64,
            ),
            transforms,
            image_transforms,
        }
    }
}

/// Summary row returned by [`ProjectStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub file_name: String,
    pub name: String,
    pub description: String,
    pub modified: DateTime<Utc>,
    pub image_count: usize,
}

/// Directory of saved projects.
pub struct ProjectStore {
    dir: PathBuf,
}

impl ProjectStore {
    /// Open (and create if needed) the projects directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a project, updating its modification time. Without a file name,
    /// one is derived from the project name.
    pub fn save(&self, project: &mut Project, file_name: Option<&str>) -> Result<PathBuf> {
        project.metadata.modified = Utc::now();
        let file_name = match file_name {
            Some(name) => with_json_extension(name),
            None => with_json_extension(&safe_file_stem(&project.metadata.name)),
        };
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(project)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), images = project.image_count(), "project saved");
        Ok(path)
    }

    pub fn load(&self, file_name: &str) -> Result<Project> {
        let path = self.dir.join(with_json_extension(file_name));
        if !path.exists() {
            return Err(BinderyError::Project(format!(
                "project file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(&path)?;
        let project = serde_json::from_str(&data)?;
        debug!(path = %path.display(), "project loaded");
        Ok(project)
    }

    /// All readable projects, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<ProjectSummary>> {
        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(BinderyError::from)
                .and_then(|data| serde_json::from_str::<Project>(&data).map_err(BinderyError::from));
            match parsed {
                Ok(project) => summaries.push(ProjectSummary {
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    name: project.metadata.name,
                    description: project.metadata.description,
                    modified: project.metadata.modified,
                    image_count: project.images.len(),
                }),
                Err(err) => warn!(path = %path.display(), error = %err, "unreadable project"),
            }
        }
        summaries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(summaries)
    }

    /// Write [`Project::summary`] to `output`.
    pub fn export_summary(&self, project: &Project, output: &Path) -> Result<PathBuf> {
        std::fs::write(output, project.summary())?;
        info!(path = %output.display(), project = %project.metadata.name, "project summary exported");
        Ok(output.to_path_buf())
    }

    /// Delete a project file. Returns `false` when it did not exist.
    pub fn delete(&self, file_name: &str) -> Result<bool> {
        let path = self.dir.join(with_json_extension(file_name));
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }
}

fn with_json_extension(name: &str) -> String {
    if name.ends_with(".json") {
        name.to_string()
    } else {
        format!("{name}.json")
    }
}

/// Keep alphanumerics, spaces, dashes and underscores.
fn safe_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let stem = stem.trim_end().to_string();
    if stem.is_empty() { "project".into() } else { stem }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn from_images_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.png");
        let b = touch(dir.path(), "b.png");
        let missing = dir.path().join("missing.png");

        let project = Project::from_images("Holiday", "", &[a.clone(), missing, b.clone()]);
        assert_eq!(project.image_count(), 2);
        assert_eq!(project.images[0].path, a);
        assert_eq!(project.images[1].order, 1);
    }

    #[test]
    fn save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::open(dir.path().join("projects")).unwrap();
        let mut project = Project::from_images("My/Scans!", "receipts", &[]);

        let path = store.save(&mut project, None).unwrap();
        assert_eq!(path.file_name().unwrap(), "MyScans.json");

        let loaded = store.load("MyScans").unwrap();
        assert_eq!(loaded.metadata.name, "My/Scans!");
        assert_eq!(loaded.metadata.description, "receipts");

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, "MyScans.json");

        assert!(store.delete("MyScans").unwrap());
        assert!(!store.delete("MyScans").unwrap());
        assert!(store.load("MyScans").is_err());
    }

    #[test]
    fn summary_lists_settings_and_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::open(dir.path()).unwrap();
        let mut project = Project::from_images("Receipts", "March", &[]);
        project.settings.page_size = PageSize::Letter;
        project.settings.watermark_text = "COPY".into();
        project.images = vec![
            ProjectImage {
                enabled: false,
                ..ProjectImage::new("scans/b.png".into(), 1)
            },
            ProjectImage::new("scans/a.png".into(), 0),
        ];

        let out = store
            .export_summary(&project, &dir.path().join("summary.txt"))
            .unwrap();
        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.starts_with("Project: Receipts\nDescription: March\n"));
        assert!(text.contains("Page size: LETTER\n"));
        assert!(text.contains("Compression: disabled\n"));
        assert!(text.contains("Watermark: COPY\n"));
        assert!(text.ends_with("Images (2):\n  1. [x] a.png\n  2. [ ] b.png\n"));
    }

    #[test]
    fn request_orders_enabled_images_and_maps_adjustments() {
        let mut project = Project::from_images("p", "", &[]);
        project.images = vec![
            ProjectImage::new("second.png".into(), 1),
            ProjectImage {
                enabled: false,
                ..ProjectImage::new("skipped.png".into(), 2)
            },
            ProjectImage {
                rotation: 90.0,
                brightness: 1.2,
                ..ProjectImage::new("first.png".into(), 0)
            },
        ];
        project.settings.watermark_text = "DRAFT".into();

        let request = project.to_request();
        assert_eq!(
            request.paths,
            vec![PathBuf::from("first.png"), PathBuf::from("second.png")]
        );
        assert!(request.transforms.has_auto_rotate());
        assert_eq!(request.transforms.len(), 2);

        let first = &request.image_transforms[&0];
        assert_eq!(first.ops()[0], TransformOp::Rotate { degrees: 90.0 });
        assert!(matches!(first.ops()[1], TransformOp::Enhance { brightness, .. } if brightness == 1.2));
        assert!(!request.image_transforms.contains_key(&1));
    }
}
