//! Script requests.
//!
//! A `Script` is the body text sent to the console plus named parameters.
//! Parameters never get spliced into the body: each one is serialized to JSON
//! and handed to the interpreter through an environment variable, where the
//! prelude's `get_parameter(name)` reads it back.

use serde_json::Value;
use std::collections::BTreeMap;

/// Environment variable prefix for script parameters
pub const PARAM_ENV_PREFIX: &str = "__param_";

/// A script body with its JSON parameters
#[derive(Debug, Clone, Default)]
pub struct Script {
    body: String,
    params: BTreeMap<String, Value>,
}

impl Script {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            params: BTreeMap::new(),
        }
    }

    /// Attach a parameter. A later value for the same name replaces the earlier one.
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// `(variable, json)` pairs to place in the child environment.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(name, value)| (format!("{}{}", PARAM_ENV_PREFIX, name), value.to_string()))
            .collect()
    }
}

impl From<&str> for Script {
    fn from(body: &str) -> Self {
        Script::new(body)
    }
}

impl From<String> for Script {
    fn from(body: String) -> Self {
        Script::new(body)
    }
}
