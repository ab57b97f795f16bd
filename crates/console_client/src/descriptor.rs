//! Replayable request descriptors.
//!
//! A descriptor captures everything needed to re-issue a request after a
//! step-up verification: method, path, headers, and an optional JSON body.
//! It is immutable once captured and serializable, so the gate can hold it
//! opaquely for as long as verification takes.

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    method: String,
    path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method: method.as_str().to_string(),
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Parsed HTTP method.
    ///
    /// # Errors
    /// Returns `ClientError::Serialization` if the stored method string is
    /// not a valid HTTP method (possible after deserializing a descriptor
    /// from an untrusted source).
    pub fn method(&self) -> Result<Method, ClientError> {
        Method::from_bytes(self.method.as_bytes())
            .map_err(|_| ClientError::Serialization(format!("invalid method: {}", self.method)))
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}
