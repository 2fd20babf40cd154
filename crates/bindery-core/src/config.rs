// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application settings, persisted as `settings.json` in the config directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{BinderyError, Result};
use crate::types::{DEFAULT_QUALITY, PageConfig, PageSize, SUPPORTED_EXTENSIONS, clamp_quality};

/// File name of the settings document inside the config directory.
pub const SETTINGS_FILE: &str = "settings.json";
/// Where a corrupt settings file is moved before defaults are written.
pub const BACKUP_FILE: &str = "settings.backup.json";
/// Environment override for the config directory.
pub const CONFIG_DIR_ENV: &str = "BINDERY_CONFIG_DIR";

/// PDF output defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    pub default_page_size: PageSize,
    pub default_compression: bool,
    pub default_quality: u8,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            default_page_size: PageSize::A4,
            default_compression: true,
            default_quality: DEFAULT_QUALITY,
        }
    }
}

/// Image handling defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Apply EXIF orientation during normalization.
    pub auto_rotate: bool,
    pub max_width: u32,
    pub max_height: u32,
    /// Accepted extensions, lower-case without the dot.
    pub supported_formats: Vec<String>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            auto_rotate: true,
            max_width: 2048,
            max_height: 2048,
            supported_formats: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Plugin discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Directories scanned for `<plugin>/manifest.json`.
    pub directories: Vec<PathBuf>,
    /// Plugin names never loaded, whatever their manifest says.
    pub disabled: Vec<String>,
    /// Load every discovered plugin when the registry is first used.
    pub autoload: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            disabled: Vec::new(),
            autoload: true,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Prepare images on a worker pool instead of sequentially.
    pub parallel: bool,
    pub max_workers: usize,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: 4,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Watermark rendering settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    /// TrueType/OpenType font used for watermark text. When unset, a set of
    /// well-known system font locations is searched.
    pub font_path: Option<PathBuf>,
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub config_version: String,
    pub pdf: PdfSettings,
    pub image: ImageSettings,
    pub plugins: PluginSettings,
    pub performance: PerformanceSettings,
    pub logging: LoggingSettings,
    pub watermark: WatermarkSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: "1.0".into(),
            pdf: PdfSettings::default(),
            image: ImageSettings::default(),
            plugins: PluginSettings::default(),
            performance: PerformanceSettings::default(),
            logging: LoggingSettings::default(),
            watermark: WatermarkSettings::default(),
        }
    }
}

/// Named bundles of settings, applied on top of the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Smaller files, more workers.
    Performance,
    /// Lossless pages, large native sizes.
    Quality,
    /// No plugins, no worker pool.
    Minimal,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Performance, Preset::Quality, Preset::Minimal];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Performance => "performance",
            Preset::Quality => "quality",
            Preset::Minimal => "minimal",
        }
    }

    /// The dotted keys this preset sets, with their values.
    pub fn settings(self) -> Vec<(&'static str, Value)> {
        match self {
            Preset::Performance => vec![
                ("pdf.default_compression", json!(true)),
                ("pdf.default_quality", json!(75)),
                ("image.max_width", json!(1920)),
                ("image.max_height", json!(1920)),
                ("performance.max_workers", json!(6)),
            ],
            Preset::Quality => vec![
                ("pdf.default_compression", json!(false)),
                ("pdf.default_quality", json!(95)),
                ("image.max_width", json!(4096)),
                ("image.max_height", json!(4096)),
                ("performance.max_workers", json!(2)),
            ],
            Preset::Minimal => vec![
                ("plugins.autoload", json!(false)),
                ("performance.parallel", json!(false)),
                ("performance.max_workers", json!(1)),
            ],
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown preset '{s}' (expected performance, quality or minimal)"))
    }
}

impl AppConfig {
    /// Load settings from `dir/settings.json`.
    ///
    /// A missing file yields defaults. A file that fails to parse is moved to
    /// `settings.backup.json` and defaults are returned.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<AppConfig>(&data) {
            Ok(mut config) => {
                if config.config_version != "1.0" {
                    warn!(
                        found = %config.config_version,
                        "settings version mismatch, expected 1.0"
                    );
                }
                config.validate();
                info!(path = %path.display(), "settings loaded");
                Ok(config)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt settings file, backing up");
                std::fs::rename(&path, dir.join(BACKUP_FILE))?;
                Ok(Self::default())
            }
        }
    }

    /// Write settings as pretty JSON to `dir/settings.json`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.export(&dir.join(SETTINGS_FILE))
    }

    /// Restore defaults and persist them to `dir`.
    pub fn reset(dir: &Path) -> Result<Self> {
        let config = Self::default();
        config.save(dir)?;
        info!(dir = %dir.display(), "settings reset to defaults");
        Ok(config)
    }

    /// Write settings to an arbitrary file.
    pub fn export(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "settings written");
        Ok(())
    }

    /// Read settings from an arbitrary file; unlike [`AppConfig::load`] a
    /// parse failure is an error.
    pub fn import(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&data)?;
        config.validate();
        Ok(config)
    }

    /// Set one value by dotted key, e.g. `pdf.default_quality`. The key must
    /// name an existing setting and the value must fit its type; on error
    /// nothing changes.
    pub fn update_setting(&mut self, key: &str, value: Value) -> Result<()> {
        let mut tree = serde_json::to_value(&*self)?;
        let pointer = format!("/{}", key.replace('.', "/"));
        let slot = tree
            .pointer_mut(&pointer)
            .ok_or_else(|| BinderyError::Config(format!("unknown setting '{key}'")))?;
        *slot = value;

        let mut updated: AppConfig = serde_json::from_value(tree)
            .map_err(|e| BinderyError::Config(format!("invalid value for '{key}': {e}")))?;
        updated.validate();
        *self = updated;
        debug!(key, "setting updated");
        Ok(())
    }

    pub fn apply_preset(&mut self, preset: Preset) -> Result<()> {
        for (key, value) in preset.settings() {
            self.update_setting(key, value)?;
        }
        info!(%preset, "settings preset applied");
        Ok(())
    }

    /// Clamp out-of-range values in place.
    pub fn validate(&mut self) {
        self.pdf.default_quality = clamp_quality(self.pdf.default_quality as i64);
        self.performance.max_workers = self.performance.max_workers.max(1);
        self.image.max_width = self.image.max_width.max(1);
        self.image.max_height = self.image.max_height.max(1);
        for ext in &mut self.image.supported_formats {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
    }

    /// Page policy derived from the PDF defaults.
    pub fn page_config(&self) -> PageConfig {
        PageConfig::new(
            self.pdf.default_page_size,
            self.pdf.default_compression,
            self.pdf.default_quality as i64,
        )
    }

    /// Whether a plugin has been switched off in settings.
    pub fn is_plugin_disabled(&self, name: &str) -> bool {
        self.plugins.disabled.iter().any(|n| n == name)
    }
}

/// Resolve the configuration directory.
///
/// `BINDERY_CONFIG_DIR` wins, then `XDG_CONFIG_HOME`, then `$HOME/.config`,
/// then the system temp directory.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config")
    } else {
        std::env::temp_dir()
    };
    base.join("bindery")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_a4_compressed_at_85() {
        let config = AppConfig::default();
        assert_eq!(config.pdf.default_page_size, PageSize::A4);
        assert!(config.pdf.default_compression);
        assert_eq!(config.pdf.default_quality, 85);
        assert!(config.image.auto_rotate);
        assert_eq!(config.performance.max_workers, 4);
        assert_eq!(config.image.supported_formats.len(), SUPPORTED_EXTENSIONS.len());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.pdf.default_page_size = PageSize::Legal;
        config.plugins.disabled.push("Noisy".into());
        config.save(dir.path()).unwrap();

        let loaded = AppConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.pdf.default_page_size, PageSize::Legal);
        assert!(loaded.is_plugin_disabled("Noisy"));
    }

    #[test]
    fn reset_overwrites_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.pdf.default_quality = 40;
        config.save(dir.path()).unwrap();

        let reset = AppConfig::reset(dir.path()).unwrap();
        assert_eq!(reset, AppConfig::default());
        assert_eq!(AppConfig::load(dir.path()).unwrap().pdf.default_quality, 85);
    }

    #[test]
    fn update_setting_by_dotted_key() {
        let mut config = AppConfig::default();
        config.update_setting("pdf.default_page_size", json!("LETTER")).unwrap();
        config.update_setting("performance.max_workers", json!(0)).unwrap();
        assert_eq!(config.pdf.default_page_size, PageSize::Letter);
        assert_eq!(config.performance.max_workers, 1);

        let before = config.clone();
        assert!(config.update_setting("pdf.nonsense", json!(1)).is_err());
        assert!(config.update_setting("pdf.default_quality", json!("high")).is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn presets_apply_their_keys() {
        let mut config = AppConfig::default();
        config.apply_preset(Preset::Performance).unwrap();
        assert_eq!(config.pdf.default_quality, 75);
        assert_eq!((config.image.max_width, config.image.max_height), (1920, 1920));
        assert_eq!(config.performance.max_workers, 6);

        config.apply_preset("quality".parse().unwrap()).unwrap();
        assert!(!config.pdf.default_compression);
        assert_eq!(config.image.max_width, 4096);

        config.apply_preset(Preset::Minimal).unwrap();
        assert!(!config.plugins.autoload);
        assert_eq!(config.performance.max_workers, 1);
        assert!("turbo".parse::<Preset>().is_err());
    }

    #[test]
    fn corrupt_file_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();

        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(dir.path().join(BACKUP_FILE).exists());
        assert!(!dir.path().join(SETTINGS_FILE).exists());
    }

    #[test]
    fn partial_file_fills_defaults_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"pdf": {"default_quality": 0}, "performance": {"max_workers": 0}}"#,
        )
        .unwrap();

        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config.pdf.default_quality, 1);
        assert_eq!(config.performance.max_workers, 1);
        assert_eq!(config.pdf.default_page_size, PageSize::A4);
    }

    #[test]
    fn page_config_follows_pdf_defaults() {
        let mut config = AppConfig::default();
        config.pdf.default_page_size = PageSize::Fit;
        config.pdf.default_compression = false;
        let page = config.page_config();
        assert_eq!(page.page_size(), PageSize::Fit);
        assert_eq!(page.effective_quality(), None);
    }
}
