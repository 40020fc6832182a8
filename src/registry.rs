//! Visual Model Registry - parameter contracts for every drawable model
//!
//! The registry is an explicitly constructed, immutable value handed to the
//! allocator and the renderers. There is no process-wide instance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ParameterError;
use crate::models::VisualSpec;
use crate::ENGINE_VERSION;

pub const BASE_TEN_REGROUPING: &str = "BASE_TEN_REGROUPING";
pub const NUMBER_LINE: &str = "NUMBER_LINE";
pub const ARRAYS: &str = "ARRAYS";
pub const FRACTION_STRIPS: &str = "FRACTION_STRIPS";
pub const FRACTION_SHAPES: &str = "FRACTION_SHAPES";

/// Models whose renderers ship with the engine. Their bounds are fixed.
pub const BUILTIN_MODELS: [&str; 5] = [BASE_TEN_REGROUPING, NUMBER_LINE, ARRAYS, FRACTION_STRIPS, FRACTION_SHAPES];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Integer,
    Number,
    Boolean,
    String,
    IntegerList,
    NumberList,
    Object,
    ObjectList,
}

impl ParamKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::String => "a string",
            Self::IntegerList => "a list of integers",
            Self::NumberList => "a list of numbers",
            Self::Object => "an object",
            Self::ObjectList => "a list of objects",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Integer => is_integer(value),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::String => value.is_string(),
            Self::IntegerList => value.as_array().map_or(false, |a| a.iter().all(is_integer)),
            Self::NumberList => value.as_array().map_or(false, |a| a.iter().all(Value::is_number)),
            Self::Object => value.is_object(),
            Self::ObjectList => value.as_array().map_or(false, |a| a.iter().all(Value::is_object)),
        }
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64() || value.as_f64().map_or(false, |f| f.fract() == 0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Permitted values for string parameters; empty means any
    #[serde(default)]
    pub allowed: Vec<String>,
}

impl ParamSchema {
    fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            min: None,
            max: None,
            allowed: vec![],
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSchema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_engine_min")]
    pub engine_min_version: String,
    pub params: Vec<ParamSchema>,
}

fn default_engine_min() -> String {
    "1.0.0".to_string()
}

impl ModelSchema {
    pub fn param(&self, name: &str) -> Option<&ParamSchema> {
        self.params.iter().find(|p| p.name == name)
    }

    fn is_compatible(&self) -> bool {
        match (
            semver::Version::parse(ENGINE_VERSION),
            semver::Version::parse(&self.engine_min_version),
        ) {
            (Ok(engine), Ok(min)) => engine >= min,
            _ => false,
        }
    }
}

/// Registry of known visual models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSchema>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self { models: BTreeMap::new() }
    }

    /// The five built-in educational models.
    pub fn builtin() -> Self {
        use ParamKind::*;

        let mut registry = Self::empty();
        registry.register(ModelSchema {
            id: BASE_TEN_REGROUPING.to_string(),
            name: "Base-ten blocks with regrouping".to_string(),
            description: "Minuend, crossed-out subtrahend and optional after-regrouping panel".to_string(),
            engine_min_version: default_engine_min(),
            params: vec![
                ParamSchema::new("minuend", Integer).required().range(0.0, 999.0),
                ParamSchema::new("subtrahend", Integer).required().range(0.0, 999.0),
                ParamSchema::new("regroup_steps", ObjectList),
            ],
        });
        registry.register(ModelSchema {
            id: NUMBER_LINE.to_string(),
            name: "Number line".to_string(),
            description: "Rounding, fraction or jump number line".to_string(),
            engine_min_version: default_engine_min(),
            params: vec![
                ParamSchema::new("min", Integer).range(-1000.0, 1000.0),
                ParamSchema::new("max", Integer).range(-1000.0, 1000.0),
                ParamSchema::new("tick_step", Number).range(0.001, 1000.0),
                ParamSchema::new("highlight", Number),
                ParamSchema::new("target", Number),
                ParamSchema::new("denominator", Integer).range(1.0, 24.0),
                ParamSchema::new("point", Object),
                ParamSchema::new("jumps", NumberList).range(-1000.0, 1000.0),
                ParamSchema::new("start", Number),
            ],
        });
        registry.register(ModelSchema {
            id: ARRAYS.to_string(),
            name: "Arrays and equal groups".to_string(),
            description: "rows x cols grid or groups of equal size".to_string(),
            engine_min_version: default_engine_min(),
            params: vec![
                ParamSchema::new("rows", Integer).range(1.0, 12.0),
                ParamSchema::new("cols", Integer).range(1.0, 12.0),
                ParamSchema::new("show_labels", Boolean),
                ParamSchema::new("highlight_row", Integer).range(1.0, 12.0),
                ParamSchema::new("highlight_col", Integer).range(1.0, 12.0),
                ParamSchema::new("show_equation", Boolean),
                ParamSchema::new("groups", Integer).range(1.0, 10.0),
                ParamSchema::new("items_per_group", Integer).range(1.0, 12.0),
                ParamSchema::new("layout", String).one_of(&["rows", "grid"]),
                ParamSchema::new("groups_per_row", Integer).range(1.0, 5.0),
                ParamSchema::new("show_borders", Boolean),
            ],
        });
        registry.register(ModelSchema {
            id: FRACTION_STRIPS.to_string(),
            name: "Fraction strips".to_string(),
            description: "Horizontal bars split into equal shaded segments".to_string(),
            engine_min_version: default_engine_min(),
            params: vec![
                ParamSchema::new("whole_count", Integer).required().range(1.0, 6.0),
                ParamSchema::new("denominator", Integer).required().range(1.0, 12.0),
                ParamSchema::new("numerators", IntegerList).required(),
                ParamSchema::new("show_labels", Boolean),
            ],
        });
        registry.register(ModelSchema {
            id: FRACTION_SHAPES.to_string(),
            name: "Fraction shapes".to_string(),
            description: "Circles, rectangles or squares split into equal parts".to_string(),
            engine_min_version: default_engine_min(),
            params: vec![
                ParamSchema::new("shape", String).one_of(&["circle", "rectangle", "square"]),
                ParamSchema::new("shape_count", Integer).required().range(1.0, 6.0),
                ParamSchema::new("denominator", Integer).required().range(1.0, 12.0),
                ParamSchema::new("numerators", IntegerList).required(),
                ParamSchema::new("show_labels", Boolean),
            ],
        });
        registry
    }

    /// Built-in models overlaid with every `*.json` schema in `dir`.
    ///
    /// Unreadable or engine-incompatible schema files are skipped, and so are
    /// files that try to redefine a built-in model.
    pub fn load_from_dir(dir: &Path) -> Result<Self, std::io::Error> {
        let mut registry = Self::builtin();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map_or(false, |e| e == "json") {
                    let parsed = fs::read_to_string(&path)
                        .map_err(|e| e.to_string())
                        .and_then(|c| serde_json::from_str::<ModelSchema>(&c).map_err(|e| e.to_string()));
                    match parsed {
                        Ok(schema) if BUILTIN_MODELS.contains(&schema.id.as_str()) => warn!(
                            model = %schema.id,
                            path = %path.display(),
                            "Skipping schema that redefines a built-in model"
                        ),
                        Ok(schema) if schema.is_compatible() => {
                            debug!(model = %schema.id, path = %path.display(), "Loaded model schema");
                            registry.register(schema);
                        }
                        Ok(schema) => warn!(
                            model = %schema.id,
                            requires = %schema.engine_min_version,
                            "Skipping schema for a newer engine"
                        ),
                        Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable schema"),
                    }
                }
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, schema: ModelSchema) {
        self.models.insert(schema.id.clone(), schema);
    }

    pub fn get(&self, id: &str) -> Option<&ModelSchema> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn list(&self) -> Vec<&ModelSchema> {
        self.models.values().collect()
    }

    pub fn known_model_ids(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    /// Check a spec against its model's declared parameters.
    ///
    /// Catches unknown models, unknown or missing parameters, wrong kinds and
    /// values outside declared bounds. Cross-parameter constraints (list
    /// lengths, numerator <= denominator) are left to the renderer.
    pub fn check_spec(&self, spec: &VisualSpec) -> Result<&ModelSchema, ParameterError> {
        let schema = self
            .get(&spec.model_id)
            .ok_or_else(|| ParameterError::UnknownModel(spec.model_id.clone()))?;
        let model = spec.model_id.as_str();

        for param in &schema.params {
            if param.required && !spec.params.contains_key(&param.name) {
                return Err(ParameterError::Missing {
                    model: model.to_string(),
                    param: param.name.clone(),
                });
            }
        }

        for (name, value) in &spec.params {
            let param = schema.param(name).ok_or_else(|| {
                ParameterError::invalid(model, format!("unknown parameter '{name}'"))
            })?;
            if !param.kind.accepts(value) {
                return Err(ParameterError::WrongType {
                    model: model.to_string(),
                    param: name.clone(),
                    expected: param.kind.describe().to_string(),
                });
            }
            if let Some(s) = value.as_str() {
                if !param.allowed.is_empty() && !param.allowed.iter().any(|a| a == s) {
                    return Err(ParameterError::invalid(
                        model,
                        format!("'{name}' must be one of {}", param.allowed.join(", ")),
                    ));
                }
            }
            let numbers: Vec<f64> = match value {
                Value::Array(items) => items.iter().filter_map(Value::as_f64).collect(),
                other => other.as_f64().into_iter().collect(),
            };
            let (min, max) = (param.min.unwrap_or(f64::MIN), param.max.unwrap_or(f64::MAX));
            if let Some(bad) = numbers.into_iter().find(|v| *v < min || *v > max) {
                return Err(ParameterError::OutOfBounds {
                    model: model.to_string(),
                    param: name.clone(),
                    value: bad,
                    min,
                    max,
                });
            }
        }

        Ok(schema)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
