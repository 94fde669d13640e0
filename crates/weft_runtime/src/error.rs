//! Error types for weft execution.
//!
//! Two kinds of failure flow through the engine. `RequestError` is raised for
//! malformed queries detected during collection and aborts the whole
//! operation. `FieldError` is accumulated per field into an `ErrorBag` and
//! never unwinds past a field boundary; the violating field becomes `null`
//! and non-null bubbling takes it from there.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use weft_syntax::Span;

/// A step in a response path: a field's response name or a list index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// A field error.
///
/// Locations are byte-offset spans into the query source; mapping them to
/// line/column pairs is left to the transport layer, which owns the source
/// text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// Source locations of the AST nodes involved.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Span>,
    /// The response path to the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Error extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Adds a source location.
    pub fn with_location(mut self, span: Span) -> Self {
        self.locations.push(span);
        self
    }

    /// Adds several source locations.
    pub fn with_locations(mut self, spans: impl IntoIterator<Item = Span>) -> Self {
        self.locations.extend(spans);
        self
    }

    /// Sets the response path.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension entry.
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", serde_json::Value::String(code.into()))
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A malformed-query condition detected while collecting fields.
///
/// These abort the whole operation, unlike `FieldError`s, which degrade a
/// single field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// A selection references a field the concrete type does not declare.
    #[error("field `{field}` does not exist on type `{type_name}`")]
    FieldNotFound {
        type_name: String,
        field: String,
        span: Span,
    },

    /// A `@skip`/`@include` condition that is neither a boolean literal nor
    /// a boolean variable.
    #[error("the @{directive} `if` argument value has to be a Boolean")]
    NonBooleanCondition { directive: String, span: Span },

    /// The document holds several operations and no name was given.
    #[error("document contains multiple operations but no operation name was provided")]
    MultipleOperationsProvided,

    /// The requested operation name does not exist in the document.
    #[error("unknown operation name `{0}`")]
    UnknownOperationName(String),

    /// The document holds no operation at all.
    #[error("document contains no executable operation")]
    NoOperationProvided,

    /// The schema does not define the root type this operation needs.
    #[error("schema does not define a {0} root type")]
    MissingRootType(String),
}

impl RequestError {
    /// Returns the source span this error points at, if any.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::FieldNotFound { span, .. }
            | Self::NonBooleanCondition { span, .. } => Some(*span),
            _ => None,
        }
    }
}

impl From<RequestError> for FieldError {
    fn from(error: RequestError) -> Self {
        let mut field_error = FieldError::new(error.to_string());
        if let Some(span) = error.span() {
            field_error = field_error.with_location(span);
        }
        field_error
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// The errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates a response carrying data and accumulated field errors.
    pub fn partial(data: serde_json::Value, errors: Vec<FieldError>) -> Self {
        Self {
            data: Some(data),
            errors: if errors.is_empty() {
                None
            } else {
                Some(errors)
            },
        }
    }

    /// Creates an error response.
    pub fn error(error: impl Into<FieldError>) -> Self {
        Self {
            data: None,
            errors: Some(vec![error.into()]),
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Returns true if the response has data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// The execution-wide error collection.
///
/// Appended to concurrently by in-flight resolver tasks; the lock is held
/// only for the push itself.
#[derive(Debug, Clone, Default)]
pub struct ErrorBag {
    errors: Arc<Mutex<Vec<FieldError>>>,
}

impl ErrorBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one error.
    pub fn report(&self, error: FieldError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error);
        }
    }

    /// Appends several errors.
    pub fn report_all(&self, batch: impl IntoIterator<Item = FieldError>) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.extend(batch);
        }
    }

    /// Returns the number of accumulated errors.
    pub fn len(&self) -> usize {
        self.errors.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if no errors were reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes a snapshot of the accumulated errors in report order.
    pub fn snapshot(&self) -> Vec<FieldError> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}
