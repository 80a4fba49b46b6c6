use std::{collections::BTreeMap, time::Duration};

use serde_json::{Map, Value};
use thiserror::Error;

pub const HEADERS: &str = "headers";
pub const QUERY: &str = "query";
pub const BODY: &str = "body";
pub const JSON: &str = "json";
pub const TIMEOUT: &str = "timeout";
pub const DELAY: &str = "delay";

#[derive(Debug, Error)]
pub enum OptionError {
    #[error("Option '{key}' must be {expected}")]
    InvalidValue { key: String, expected: &'static str },
}

/// Transport options for one request.
///
/// Recognised keys are typed fields; anything else lands in `extensions` so
/// custom transports can pick it up. Setting a key replaces its previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Raw request body. Takes precedence over `json`.
    pub body: Option<String>,
    pub json: Option<Value>,
    /// Seconds; `0.0` disables the timeout.
    pub timeout: Option<f64>,
    /// Milliseconds to wait before the request is sent.
    pub delay: Option<u64>,
    pub extensions: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a generic key/value map, e.g. one read from
    /// configuration.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, OptionError> {
        let mut options = Self::default();
        for (key, value) in map {
            options.set(&key, value)?;
        }
        Ok(options)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), OptionError> {
        match key {
            HEADERS => self.headers = string_map(key, value)?,
            QUERY => self.query = string_map(key, value)?,
            BODY => {
                self.body = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    _ => return Err(invalid(key, "a string")),
                }
            },
            JSON => self.json = (!value.is_null()).then_some(value),
            TIMEOUT => {
                let timeout = non_negative(key, &value)?;
                if timeout.is_some_and(|secs| !is_valid_seconds(secs)) {
                    return Err(invalid(key, "a number of seconds that fits a duration"));
                }
                self.timeout = timeout;
            },
            DELAY => self.delay = non_negative(key, &value)?.map(|ms| ms.round() as u64),
            _ => {
                self.extensions.insert(key.to_string(), value);
            },
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            HEADERS => (!self.headers.is_empty()).then(|| map_value(&self.headers)),
            QUERY => (!self.query.is_empty()).then(|| map_value(&self.query)),
            BODY => self.body.clone().map(Value::String),
            JSON => self.json.clone(),
            TIMEOUT => self.timeout.map(Value::from),
            DELAY => self.delay.map(Value::from),
            _ => self.extensions.get(key).cloned(),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let previous = self.get(key);
        match key {
            HEADERS => self.headers.clear(),
            QUERY => self.query.clear(),
            BODY => self.body = None,
            JSON => self.json = None,
            TIMEOUT => self.timeout = None,
            DELAY => self.delay = None,
            _ => {
                self.extensions.remove(key);
            },
        }
        previous
    }

    /// Generic view of every key that is set.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for key in [HEADERS, QUERY, BODY, JSON, TIMEOUT, DELAY] {
            if let Some(value) = self.get(key) {
                map.insert(key.to_string(), value);
            }
        }
        for (key, value) in &self.extensions {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// The timeout as a [`Duration`], `None` when unset or `0.0`.
    ///
    /// Fails when the field was set directly to a value no `Duration` can hold.
    pub fn timeout_duration(&self) -> Result<Option<Duration>, OptionError> {
        match self.timeout.filter(|secs| *secs != 0.0) {
            None => Ok(None),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|_| invalid(TIMEOUT, "a number of seconds that fits a duration")),
        }
    }

    pub fn delay_duration(&self) -> Option<Duration> {
        self.delay.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// Whether `secs` is a non-negative number of seconds that converts to a
/// [`Duration`] without overflowing.
pub fn is_valid_seconds(secs: f64) -> bool {
    Duration::try_from_secs_f64(secs).is_ok()
}

fn invalid(key: &str, expected: &'static str) -> OptionError {
    OptionError::InvalidValue {
        key: key.to_string(),
        expected,
    }
}

fn non_negative(key: &str, value: &Value) -> Result<Option<f64>, OptionError> {
    if value.is_null() {
        return Ok(None);
    }
    match value.as_f64() {
        Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
        _ => Err(invalid(key, "a non-negative number")),
    }
}

fn string_map(key: &str, value: Value) -> Result<BTreeMap<String, String>, OptionError> {
    let object = match value {
        Value::Object(object) => object,
        Value::Null => return Ok(BTreeMap::new()),
        _ => return Err(invalid(key, "an object")),
    };

    object
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                // Multi-valued headers are folded into one comma-separated value.
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        Value::Number(n) => Ok(n.to_string()),
                        _ => Err(invalid(key, "an object of scalar values")),
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", "),
                _ => return Err(invalid(key, "an object of scalar values")),
            };
            Ok((name, value))
        })
        .collect()
}

fn map_value(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
