//! Configuration for the worksheet compiler.
//!
//! Every field has a default, so a missing config file behaves exactly like
//! `Config::default()`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::page::PageSpec;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub self_check: SelfCheckConfig,

    #[serde(default)]
    pub export: PageSpec,
}

/// Where registry and curriculum overrides come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory of JSON model schemas overlaid on the built-in registry
    #[serde(default)]
    pub models_dir: Option<PathBuf>,

    /// JSON file with curriculum nodes overlaid on the built-in catalog
    #[serde(default)]
    pub curriculum_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Default artifact directory when the CLI is not given one
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Render questions on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_true() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            parallel: true,
        }
    }
}

/// Tolerances for the visual self-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfCheckConfig {
    /// Overlap smaller than this (in renderer pixels) is ignored
    #[serde(default = "default_overlap_epsilon")]
    pub overlap_epsilon: f64,

    /// Labels may extend this far past the canvas edge
    #[serde(default = "default_label_tolerance")]
    pub label_tolerance: f64,

    /// Primitive types allowed to overlap others of the same type
    #[serde(default = "default_exempt_types")]
    pub exempt_types: Vec<String>,
}

fn default_overlap_epsilon() -> f64 {
    0.5
}

fn default_label_tolerance() -> f64 {
    2.0
}

fn default_exempt_types() -> Vec<String> {
    vec!["arrow".to_string(), "sector".to_string()]
}

impl Default for SelfCheckConfig {
    fn default() -> Self {
        Self {
            overlap_epsilon: default_overlap_epsilon(),
            label_tolerance: default_label_tolerance(),
            exempt_types: default_exempt_types(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.export
            .validate()
            .map_err(|msg| ConfigError::Invalid(format!("[export] {msg}")))?;
        if self.self_check.overlap_epsilon < 0.0 || self.self_check.label_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "[self_check] tolerances must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub const EXAMPLE_CONFIG: &str = r#"# worksheet-cli configuration file

[catalog]
# models_dir = "models"            # JSON schemas overlaid on the built-in registry
# curriculum_file = "nodes.json"   # JSON node list overlaid on the built-in catalog

[render]
output_dir = "artifacts"
parallel = true

[self_check]
overlap_epsilon = 0.5
label_tolerance = 2.0
exempt_types = ["arrow", "sector"]

[export]
page_size = "letter"   # or "a4"
margin = 54.0
font_size = 11.0
max_graphic_height = 260.0
answer_key = true
"#;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
