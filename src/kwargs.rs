// src/kwargs.rs

//! Named arguments passed to module handlers.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

/// String-keyed handler arguments (`text = "hi"`, `x = 5`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs(Map<String, Value>);

impl Kwargs {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert. Values that fail to serialize are stored as
    /// `null` with a warning; use [`Kwargs::try_with`] to get the error.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn try_with(mut self, key: &str, value: impl Serialize) -> serde_json::Result<Self> {
        self.try_insert(key, value)?;
        Ok(self)
    }

    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        if let Err(e) = self.try_insert(key, &value) {
            warn!(key, error = %e, "argument could not be serialized; passing null");
            self.0.insert(key.to_string(), Value::Null);
        }
    }

    pub fn try_insert(&mut self, key: &str, value: impl Serialize) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.0.insert(key.to_string(), value);
        Ok(())
    }

    /// Raw access to a single argument.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Typed access to a single argument; `None` if missing or of the wrong
    /// shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed access that reports which argument was missing or malformed.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("missing argument `{key}`"))?;
        serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("argument `{key}` has unexpected type: {e}"))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Kwargs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Objects become their fields; `null` becomes no arguments; any other value
/// is passed as a single `value` argument.
impl From<Value> for Kwargs {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::new(),
            other => Self::new().with("value", other),
        }
    }
}

impl fmt::Display for Kwargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}
