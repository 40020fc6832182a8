//! Typed access to a checked parameter map.
//!
//! `ModelRegistry::check_spec` has already verified kinds and bounds, so the
//! accessors here only fail on missing values or on values of the wrong kind.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ParameterError;

pub struct Params<'a> {
    model: &'a str,
    values: &'a BTreeMap<String, Value>,
}

fn as_int(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

impl<'a> Params<'a> {
    pub fn new(model: &'a str, values: &'a BTreeMap<String, Value>) -> Self {
        Self { model, values }
    }

    pub fn model(&self) -> &str {
        self.model
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.get(name).map_or(false, |v| !v.is_null())
    }

    fn missing(&self, name: &str) -> ParameterError {
        ParameterError::Missing {
            model: self.model.to_string(),
            param: name.to_string(),
        }
    }

    fn wrong_type(&self, name: &str, expected: &str) -> ParameterError {
        ParameterError::WrongType {
            model: self.model.to_string(),
            param: name.to_string(),
            expected: expected.to_string(),
        }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, ParameterError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => as_int(v).map(Some).ok_or_else(|| self.wrong_type(name, "an integer")),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ParameterError> {
        self.opt_int(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, ParameterError> {
        Ok(self.opt_int(name)?.unwrap_or(default))
    }

    pub fn opt_num(&self, name: &str) -> Result<Option<f64>, ParameterError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| self.wrong_type(name, "a number")),
        }
    }

    pub fn num(&self, name: &str) -> Result<f64, ParameterError> {
        self.opt_num(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn flag(&self, name: &str, default: bool) -> Result<bool, ParameterError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| self.wrong_type(name, "a boolean")),
        }
    }

    pub fn str_or(&self, name: &str, default: &'a str) -> Result<&'a str, ParameterError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| self.wrong_type(name, "a string")),
        }
    }

    pub fn int_list(&self, name: &str) -> Result<Vec<i64>, ParameterError> {
        let items = self.get(name).ok_or_else(|| self.missing(name))?;
        let items = items.as_array().ok_or_else(|| self.wrong_type(name, "a list of integers"))?;
        items
            .iter()
            .map(|v| as_int(v).ok_or_else(|| self.wrong_type(name, "a list of integers")))
            .collect()
    }

    pub fn num_list(&self, name: &str) -> Result<Vec<f64>, ParameterError> {
        let items = self.get(name).ok_or_else(|| self.missing(name))?;
        let items = items.as_array().ok_or_else(|| self.wrong_type(name, "a list of numbers"))?;
        items
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| self.wrong_type(name, "a list of numbers")))
            .collect()
    }

    pub fn object(&self, name: &str) -> Result<Option<&'a Map<String, Value>>, ParameterError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_object().map(Some).ok_or_else(|| self.wrong_type(name, "an object")),
        }
    }

    /// Objects of a list parameter; absent means empty.
    pub fn objects(&self, name: &str) -> Result<Vec<&'a Map<String, Value>>, ParameterError> {
        let Some(items) = self.get(name) else {
            return Ok(vec![]);
        };
        let items = items.as_array().ok_or_else(|| self.wrong_type(name, "a list of objects"))?;
        items
            .iter()
            .map(|v| v.as_object().ok_or_else(|| self.wrong_type(name, "a list of objects")))
            .collect()
    }

    pub fn invalid(&self, message: impl Into<String>) -> ParameterError {
        ParameterError::invalid(self.model, message)
    }
}
