use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshgateError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for MeshgateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MeshgateError>;

/// Outcome of a sub-operation whose failure must not abort the caller.
///
/// Serializes as `{"status": "ok", "value": ..}` or `{"status": "error", "error": ..}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BestEffort<T> {
    pub value: Option<T>,
    pub error: Option<String>,
}

impl<T> BestEffort<T> {
    pub fn ok(value: Option<T>) -> Self {
        Self { value, error: None }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            value: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from_result(result: Result<Option<T>>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(err) => Self::failed(err),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T: Serialize> Serialize for BestEffort<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        match &self.error {
            Some(error) => {
                map.serialize_entry("status", "error")?;
                map.serialize_entry("error", error)?;
            }
            None => {
                map.serialize_entry("status", "ok")?;
                map.serialize_entry("value", &self.value)?;
            }
        }
        map.end()
    }
}
