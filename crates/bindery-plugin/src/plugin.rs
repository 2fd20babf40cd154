// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability traits every plugin implements, and the parameter schema that
// image plugins publish.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named parameters passed to a plugin invocation.
pub type Params = serde_json::Map<String, Value>;

/// Error type plugins report from their operations.
pub type PluginResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Capability set a plugin belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    ImageTransform,
    DocumentTransform,
    UiExtension,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageTransform => "image-transform",
            Self::DocumentTransform => "document-transform",
            Self::UiExtension => "ui-extension",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and lifecycle shared by all plugins.
///
/// Methods take `&self`; plugins that keep state use interior mutability.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn description(&self) -> &str;
    fn author(&self) -> &str;

    /// Called once after instantiation. Returning `false` rejects the load.
    fn initialize(&self) -> bool {
        true
    }

    /// Called before the plugin leaves the active set.
    fn cleanup(&self) -> bool {
        true
    }

    /// Whether calls into this instance may overlap. When `false` the
    /// registry serialises every call.
    fn supports_concurrency(&self) -> bool {
        false
    }
}

/// Transforms one image file into another.
pub trait ImageProcessorPlugin: Plugin {
    /// Process `input` and return the path of the result. The plugin chooses
    /// where the result is written.
    fn process_image(&self, input: &Path, params: &Params) -> PluginResult<PathBuf>;

    /// Parameters this plugin understands.
    fn get_parameters(&self) -> ParameterSchema;
}

/// Transforms an assembled PDF.
pub trait DocumentProcessorPlugin: Plugin {
    fn process_pdf(&self, input: &Path, params: &Params) -> PluginResult<PathBuf>;
}

/// Entry contributed to a front end's menu or toolbar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub label: String,
    /// Action identifier the front end dispatches on.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
}

/// Extends a front end with menu and toolbar entries.
pub trait UiPlugin: Plugin {
    fn menu_items(&self) -> Vec<MenuItem>;
    fn toolbar_items(&self) -> Vec<MenuItem>;
}

// -- Parameter schema ---------------------------------------------------------

/// Widget type and constraints of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterType {
    Select { options: Vec<String> },
    Slider { min: f64, max: f64, step: f64 },
    Toggle,
    Text,
}

/// Description of one plugin parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(flatten)]
    pub kind: ParameterType,
    pub default: Value,
    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    pub fn select(options: &[&str], default: &str, description: &str) -> Self {
        Self {
            kind: ParameterType::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            default: Value::from(default),
            description: description.into(),
        }
    }

    pub fn slider(min: f64, max: f64, step: f64, default: f64, description: &str) -> Self {
        Self {
            kind: ParameterType::Slider { min, max, step },
            default: Value::from(default),
            description: description.into(),
        }
    }

    /// Whether a select parameter offers `option`.
    pub fn offers(&self, option: &str) -> bool {
        match &self.kind {
            ParameterType::Select { options } => options.iter().any(|o| o == option),
            _ => false,
        }
    }
}

/// Parameter name to spec, in name order.
pub type ParameterSchema = BTreeMap<String, ParameterSpec>;

// -- Instances ----------------------------------------------------------------

/// A loaded plugin, tagged by capability.
#[derive(Clone)]
pub enum PluginInstance {
    Image(Arc<dyn ImageProcessorPlugin>),
    Document(Arc<dyn DocumentProcessorPlugin>),
    Ui(Arc<dyn UiPlugin>),
}

impl PluginInstance {
    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Image(_) => PluginKind::ImageTransform,
            Self::Document(_) => PluginKind::DocumentTransform,
            Self::Ui(_) => PluginKind::UiExtension,
        }
    }

    /// The shared identity and lifecycle surface.
    pub fn base(&self) -> &dyn Plugin {
        match self {
            Self::Image(p) => p.as_ref(),
            Self::Document(p) => p.as_ref(),
            Self::Ui(p) => p.as_ref(),
        }
    }

    pub fn as_image(&self) -> Option<&Arc<dyn ImageProcessorPlugin>> {
        match self {
            Self::Image(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Arc<dyn DocumentProcessorPlugin>> {
        match self {
            Self::Document(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ui(&self) -> Option<&Arc<dyn UiPlugin>> {
        match self {
            Self::Ui(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.base();
        f.debug_struct("PluginInstance")
            .field("kind", &self.kind())
            .field("name", &base.name())
            .field("version", &base.version())
            .finish()
    }
}
