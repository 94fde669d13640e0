//! Value completion for weft.
//!
//! Completion takes a resolver's raw outcome and the field's declared type
//! and produces the response value: leaves are serialized, lists completed
//! element-wise, composites recurse into their sub-selections. Null handling
//! follows the propagation rule: a non-null position that ends up null
//! reports an error and bubbles, nulling ancestors until a nullable position
//! absorbs it.
//!
//! The boolean travelling alongside each completed value means "this value
//! is null because of an already-reported error"; non-null wrappers pass it
//! through silently instead of reporting a second time.

use crate::collect::FieldSelection;
use crate::error::FieldError;
use crate::executor::{execute_selection_set, ExecutionContext};
use crate::resolver::ResolverOutcome;
use crate::schema::{TypeDef, TypeRef};
use crate::task::{ResponsePath, ScopedData, SourceStack};
use crate::variables::convert_scalar;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Where in the response a value is being completed.
#[derive(Clone)]
pub(crate) struct CompletionScope {
    pub path: ResponsePath,
    pub source: SourceStack,
    pub scoped: ScopedData,
}

impl CompletionScope {
    fn at_index(&self, index: usize) -> Self {
        Self {
            path: self.path.push_index(index),
            source: self.source.clone(),
            scoped: self.scoped.clone(),
        }
    }
}

type Completed = (Value, bool);

/// Completes a resolver outcome against the field's declared type.
pub(crate) fn complete_outcome<'a>(
    exec: &'a ExecutionContext,
    object_type: &'a str,
    selection: &'a Arc<FieldSelection>,
    scope: CompletionScope,
    outcome: ResolverOutcome,
) -> Pin<Box<dyn Future<Output = Completed> + Send + 'a>> {
    Box::pin(async move {
        match outcome {
            ResolverOutcome::Value(value) => {
                complete_value(exec, object_type, selection, selection.ty(), scope, value).await
            }
            ResolverOutcome::Error(error) => {
                report(exec, selection, &scope, error);
                (Value::Null, true)
            }
            ResolverOutcome::Errors(errors) => {
                for error in errors {
                    report(exec, selection, &scope, error);
                }
                (Value::Null, true)
            }
        }
    })
}

fn complete_value<'a>(
    exec: &'a ExecutionContext,
    object_type: &'a str,
    selection: &'a Arc<FieldSelection>,
    ty: &'a TypeRef,
    scope: CompletionScope,
    value: Value,
) -> Pin<Box<dyn Future<Output = Completed> + Send + 'a>> {
    Box::pin(async move {
        match ty {
            TypeRef::NonNull(inner) => {
                let (completed, errored) =
                    complete_value(exec, object_type, selection, inner, scope.clone(), value)
                        .await;
                if completed.is_null() {
                    if !errored {
                        report(
                            exec,
                            selection,
                            &scope,
                            FieldError::new(format!(
                                "Cannot return null for non-nullable field {object_type}.{}.",
                                selection.field.name
                            )),
                        );
                    }
                    return (Value::Null, true);
                }
                (completed, false)
            }
            TypeRef::List(element) => {
                if value.is_null() {
                    return (Value::Null, false);
                }
                let Value::Array(items) = value else {
                    report(
                        exec,
                        selection,
                        &scope,
                        FieldError::new(format!(
                            "expected a list for field {object_type}.{}",
                            selection.field.name
                        )),
                    );
                    return (Value::Null, true);
                };
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let (completed, errored) = complete_value(
                        exec,
                        object_type,
                        selection,
                        element,
                        scope.at_index(index),
                        item,
                    )
                    .await;
                    // a violated non-null element collapses the whole list
                    if errored && element.is_non_null() {
                        return (Value::Null, true);
                    }
                    out.push(completed);
                }
                (Value::Array(out), false)
            }
            TypeRef::Named(name) => {
                if value.is_null() {
                    return (Value::Null, false);
                }
                complete_named(exec, object_type, selection, name, scope, value).await
            }
        }
    })
}

async fn complete_named(
    exec: &ExecutionContext,
    object_type: &str,
    selection: &Arc<FieldSelection>,
    type_name: &str,
    scope: CompletionScope,
    value: Value,
) -> Completed {
    match exec.schema.get_type(type_name) {
        Some(TypeDef::Scalar(scalar)) => {
            let serialized = match &scalar.serialize {
                Some(serialize) => serialize(&value),
                None => convert_scalar(type_name, &value),
            };
            match serialized {
                Ok(serialized) => (serialized, false),
                Err(message) => {
                    report(exec, selection, &scope, FieldError::new(message));
                    (Value::Null, true)
                }
            }
        }
        Some(TypeDef::Enum(def)) => match &value {
            Value::String(s) if def.has_value(s) => (value, false),
            _ => {
                report(
                    exec,
                    selection,
                    &scope,
                    FieldError::new(format!(
                        "enum `{type_name}` cannot represent value: {value}"
                    )),
                );
                (Value::Null, true)
            }
        },
        Some(def) if def.is_composite() => {
            let concrete = if def.is_abstract() {
                match exec.schema.resolve_abstract(type_name, &value) {
                    Some(concrete) => concrete,
                    None => {
                        report(
                            exec,
                            selection,
                            &scope,
                            FieldError::new(format!(
                                "could not resolve the concrete type of abstract type \
                                 `{type_name}` for field {object_type}.{}",
                                selection.field.name
                            )),
                        );
                        return (Value::Null, true);
                    }
                }
            } else {
                type_name.to_string()
            };
            let Some(sub) = selection.sub_selections() else {
                report(
                    exec,
                    selection,
                    &scope,
                    FieldError::new(format!(
                        "field {object_type}.{} of type `{type_name}` must have a \
                         selection of subfields",
                        selection.field.name
                    )),
                );
                return (Value::Null, true);
            };
            let scope = CompletionScope {
                path: scope.path,
                source: scope.source.push(value),
                scoped: scope.scoped,
            };
            let (object, errored) =
                execute_selection_set(exec, &concrete, sub, scope, false).await;
            if errored {
                return (Value::Null, true);
            }
            (object, false)
        }
        _ => {
            report(
                exec,
                selection,
                &scope,
                FieldError::new(format!("unknown type `{type_name}` in field position")),
            );
            (Value::Null, true)
        }
    }
}

fn report(
    exec: &ExecutionContext,
    selection: &Arc<FieldSelection>,
    scope: &CompletionScope,
    error: FieldError,
) {
    let mut error = error;
    if error.path.is_none() {
        error.path = Some(scope.path.to_vec());
    }
    if error.locations.is_empty() {
        error.locations = selection.occurrences.clone();
    }
    exec.errors.report(error);
}
