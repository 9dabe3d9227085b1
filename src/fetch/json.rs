//! JSON payload validation
//!
//! Throttled or half-broken API endpoints often answer with a 200 and a body
//! that is empty, `null`, or carries an error flag. Every JSON fetch is
//! checked here and a failed check counts as a transient failure.

use crate::CrawlError;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::{Map, Value};
use url::Url;

/// What a JSON response must look like to be accepted
#[derive(Debug, Clone, PartialEq)]
pub struct JsonExpectations {
    /// Require a `Content-Type` of `application/json`
    pub require_json_content_type: bool,

    /// Top-level fields that must be present with exactly these values
    pub fields: Map<String, Value>,
}

impl Default for JsonExpectations {
    fn default() -> Self {
        Self {
            require_json_content_type: true,
            fields: Map::new(),
        }
    }
}

impl JsonExpectations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts any content type and parses the body regardless
    pub fn any_content_type(mut self) -> Self {
        self.require_json_content_type = false;
        self
    }

    /// Requires `key` to be present at the top level with exactly `value`
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub(crate) fn check_content_type(&self, url: &Url, headers: &HeaderMap) -> Result<(), CrawlError> {
        if !self.require_json_content_type {
            return Ok(());
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let essence = content_type.split(';').next().unwrap_or("").trim();

        if essence.eq_ignore_ascii_case("application/json") {
            Ok(())
        } else {
            Err(CrawlError::ContentType {
                url: url.to_string(),
                content_type: content_type.to_string(),
            })
        }
    }

    pub(crate) fn check_fields(&self, url: &Url, value: &Value) -> Result<(), CrawlError> {
        for (key, expected) in &self.fields {
            let actual = value.get(key).cloned().unwrap_or(Value::Null);
            if actual != *expected {
                return Err(CrawlError::AssertionMismatch {
                    url: url.to_string(),
                    key: key.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Parses a body as JSON, rejecting empty bodies and empty results
pub(crate) fn parse_json(url: &Url, body: &[u8]) -> Result<Value, CrawlError> {
    let malformed = |message: String| CrawlError::MalformedJson {
        url: url.to_string(),
        message,
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(malformed("empty body".to_string()));
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;

    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Err(malformed(format!("empty JSON result: {}", value)));
    }

    Ok(value)
}
