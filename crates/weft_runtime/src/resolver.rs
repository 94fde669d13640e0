//! Resolver registration and invocation for weft.
//!
//! Resolvers are keyed `"Type.field"` in a `ResolverMap`. Fields without an
//! entry fall through to the default resolver, which reads a property off
//! the parent object.

use crate::error::FieldError;
use crate::task::ResolverContext;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// What a resolver hands back to the engine.
#[derive(Debug, Clone)]
pub enum ResolverOutcome {
    /// A raw value, to be completed against the field's type.
    Value(Value),
    /// A single field error; the field becomes null.
    Error(FieldError),
    /// Several field errors; the field becomes null.
    Errors(Vec<FieldError>),
}

impl ResolverOutcome {
    /// Returns true for the error variants.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Errors(_))
    }
}

impl From<Value> for ResolverOutcome {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<FieldError> for ResolverOutcome {
    fn from(error: FieldError) -> Self {
        Self::Error(error)
    }
}

impl From<ResolverResult> for ResolverOutcome {
    fn from(result: ResolverResult) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Error(error.into()),
        }
    }
}

/// Resolver-side failure.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    #[error("field not found")]
    FieldNotFound,

    #[error("missing required argument `{0}`")]
    MissingArgument(String),

    #[error("invalid argument `{name}`: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("{0}")]
    Custom(String),

    #[error("internal resolver error: {0}")]
    Internal(String),
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        Self::Custom(message)
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        Self::Custom(message.to_string())
    }
}

impl From<ResolverError> for FieldError {
    fn from(error: ResolverError) -> Self {
        FieldError::new(error.to_string())
    }
}

/// Result type for synchronous resolver bodies.
pub type ResolverResult = Result<Value, ResolverError>;

/// Boxed resolver future, borrowing the context for the call.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverOutcome> + Send + 'a>>;

/// A field resolver.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(&'a self, ctx: &'a ResolverContext) -> ResolverFuture<'a>;
}

/// A resolver from a synchronous closure.
pub struct FnResolver<F>(pub F);

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&ResolverContext) -> ResolverResult + Send + Sync,
{
    fn resolve<'a>(&'a self, ctx: &'a ResolverContext) -> ResolverFuture<'a> {
        let outcome = ResolverOutcome::from((self.0)(ctx));
        Box::pin(async move { outcome })
    }
}

/// A resolver from an async closure returning a boxed future.
pub struct AsyncFnResolver(
    #[allow(clippy::type_complexity)]
    pub  Arc<dyn for<'a> Fn(&'a ResolverContext) -> ResolverFuture<'a> + Send + Sync>,
);

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(&'a self, ctx: &'a ResolverContext) -> ResolverFuture<'a> {
        (self.0)(ctx)
    }
}

/// The default resolver: property access on the parent object.
///
/// Looks up the field name on the parent value, falling back to the
/// snake_case spelling for camelCase field names. A null or missing parent
/// resolves to null.
pub struct DefaultResolver;

impl DefaultResolver {
    fn lookup(parent: &Value, field: &str) -> Value {
        if let Some(value) = parent.get(field) {
            return value.clone();
        }
        let snake = to_snake_case(field);
        if snake != field {
            if let Some(value) = parent.get(&snake) {
                return value.clone();
            }
        }
        Value::Null
    }
}

impl Resolver for DefaultResolver {
    fn resolve<'a>(&'a self, ctx: &'a ResolverContext) -> ResolverFuture<'a> {
        let value = match ctx.parent_value() {
            Some(parent) => Self::lookup(parent, ctx.field_name()),
            None => Value::Null,
        };
        Box::pin(async move { ResolverOutcome::Value(value) })
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Resolver registry keyed by `"Type.field"`.
pub struct ResolverMap {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
    default: Arc<dyn Resolver>,
}

impl ResolverMap {
    /// Creates an empty map with the property-access default resolver.
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            default: Arc::new(DefaultResolver),
        }
    }

    /// Registers a resolver for `Type.field`.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) {
        self.resolvers
            .insert(key(type_name.into(), field_name.into()), resolver);
    }

    /// Registers a synchronous closure resolver.
    pub fn register_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(&ResolverContext) -> ResolverResult + Send + Sync + 'static,
    {
        self.register(type_name, field_name, Arc::new(FnResolver(f)));
    }

    /// Registers an async closure resolver. The closure must box its future:
    /// `|ctx| Box::pin(async move { ... })`.
    pub fn register_async<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: for<'a> Fn(&'a ResolverContext) -> ResolverFuture<'a> + Send + Sync + 'static,
    {
        self.register(type_name, field_name, Arc::new(AsyncFnResolver(Arc::new(f))));
    }

    /// Looks up the resolver for a field, falling back to the default.
    pub fn get(&self, type_name: &str, field_name: &str) -> Arc<dyn Resolver> {
        self.resolvers
            .get(&key(type_name.to_string(), field_name.to_string()))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Returns true if an explicit resolver is registered for the field.
    pub fn has(&self, type_name: &str, field_name: &str) -> bool {
        self.resolvers
            .contains_key(&key(type_name.to_string(), field_name.to_string()))
    }

    /// Replaces the fallback resolver.
    pub fn set_default(&mut self, resolver: Arc<dyn Resolver>) {
        self.default = resolver;
    }
}

impl Default for ResolverMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolverMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverMap")
            .field("registered", &self.resolvers.len())
            .finish()
    }
}

fn key(type_name: String, field_name: String) -> String {
    format!("{type_name}.{field_name}")
}
