//! GraphQL request and response envelopes

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::GraphQLBatchError;

/// A GraphQL document with its variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    /// Query or mutation text
    pub query: String,

    /// Variable values
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Operation to run when the document defines several
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    /// Create a request without variables
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
        }
    }

    /// Set one variable
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Select the operation by name
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// One element of a GraphQL error path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Field name
    Field(String),
    /// List index
    Index(usize),
}

/// Source position of a GraphQL error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

/// An application-level error reported inside a GraphQL response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable description
    pub message: String,

    /// Response field the error belongs to
    #[serde(default, deserialize_with = "null_as_empty")]
    pub path: Vec<PathSegment>,

    /// Positions in the document
    #[serde(default, deserialize_with = "null_as_empty")]
    pub locations: Vec<Location>,

    /// Server-specific details such as an error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// Result of one GraphQL document
///
/// Errors here are data returned by the server with HTTP 200, not transport
/// failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<GraphQLError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Whether the server reported any application errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Decode `data` into a typed value; `None` when data is absent or null
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, GraphQLBatchError> {
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(data) => serde_json::from_value(data.clone())
                .map(Some)
                .map_err(|e| GraphQLBatchError::InvalidResponse(e.to_string())),
        }
    }

    /// Error messages joined for logging
    pub fn error_messages(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Servers send `null` as well as omitting empty lists
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
