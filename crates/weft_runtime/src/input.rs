//! Input coercion for weft.
//!
//! Arguments are coerced once, when a field selection is collected. A value
//! that fails to coerce does not fail collection: the failure is parked in
//! the `ArgumentValue` and surfaces as a `FieldError` only when a resolver
//! actually reads that argument. Variable-backed arguments stay deferred
//! because the error depends on the value supplied at execution time.

use crate::error::FieldError;
use crate::schema::{Schema, FieldDef, TypeDef, TypeRef};
use crate::variables::{convert_scalar, Variables};
use indexmap::IndexMap;
use serde_json::Value;
use weft_syntax::{FieldNode, Span, ValueNode};

/// A reference to an operation variable, as supplied for an argument.
#[derive(Debug, Clone)]
pub struct VariableRef {
    pub name: String,
    /// The argument's declared default, applied when the variable is absent.
    pub default: Option<Value>,
    pub span: Span,
}

/// A coerced argument.
///
/// Exactly one of `value`, `variable` or `error` drives `resolve`.
#[derive(Debug, Clone)]
pub struct ArgumentValue {
    pub ty: TypeRef,
    value: Option<Value>,
    variable: Option<VariableRef>,
    error: Option<FieldError>,
}

impl ArgumentValue {
    /// An argument with an already-coerced constant value.
    pub fn constant(ty: TypeRef, value: Value) -> Self {
        Self {
            ty,
            value: Some(value),
            variable: None,
            error: None,
        }
    }

    /// An argument bound to an operation variable.
    pub fn variable(ty: TypeRef, variable: VariableRef) -> Self {
        Self {
            ty,
            value: None,
            variable: Some(variable),
            error: None,
        }
    }

    /// An argument whose literal failed coercion; the error is reported when
    /// the argument is read.
    pub fn deferred_error(ty: TypeRef, error: FieldError) -> Self {
        Self {
            ty,
            value: None,
            variable: None,
            error: Some(error),
        }
    }

    /// Resolves the argument against the execution's variables.
    pub fn resolve(&self, schema: &Schema, variables: &Variables) -> Result<Value, FieldError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Some(var) = &self.variable {
            let supplied = match variables.try_get(&var.name) {
                Some(value) => Some(value.clone()),
                None => var.default.clone(),
            };
            let value = supplied.unwrap_or(Value::Null);
            return coerce_runtime(schema, &self.ty, &value).map_err(|message| {
                FieldError::new(message)
                    .with_location(var.span)
                    .with_extension("variableName", Value::String(var.name.clone()))
            });
        }
        Ok(self.value.clone().unwrap_or(Value::Null))
    }
}

/// Coerces all of a field's arguments against its definition.
///
/// Missing arguments fall back to their declared default, or null. Literal
/// coercion failures become deferred errors carrying the argument name.
pub fn coerce_arguments(
    schema: &Schema,
    field_def: &FieldDef,
    node: &FieldNode,
    variables: &Variables,
) -> IndexMap<String, ArgumentValue> {
    let mut out = IndexMap::with_capacity(field_def.arguments.len());
    for (name, input) in &field_def.arguments {
        let argument = match node.argument(name) {
            Some(supplied) => match &supplied.value {
                ValueNode::Variable(var) => ArgumentValue::variable(
                    input.ty.clone(),
                    VariableRef {
                        name: var.as_str().to_string(),
                        default: input.default_value.clone(),
                        span: var.span,
                    },
                ),
                literal => match parse_literal(schema, &input.ty, literal, variables) {
                    Ok(value) => ArgumentValue::constant(input.ty.clone(), value),
                    Err(message) => ArgumentValue::deferred_error(
                        input.ty.clone(),
                        FieldError::new(message)
                            .with_location(literal.span())
                            .with_extension("argumentName", Value::String(name.clone())),
                    ),
                },
            },
            None => match &input.default_value {
                Some(default) => ArgumentValue::constant(input.ty.clone(), default.clone()),
                None if input.ty.is_non_null() => ArgumentValue::deferred_error(
                    input.ty.clone(),
                    FieldError::new(format!(
                        "argument `{name}` of type `{}` is required but was not provided",
                        input.ty
                    ))
                    .with_location(node.span)
                    .with_extension("argumentName", Value::String(name.clone())),
                ),
                None => ArgumentValue::constant(input.ty.clone(), Value::Null),
            },
        };
        out.insert(name.clone(), argument);
    }
    out
}

/// Coerces a literal value node to a runtime value of the given type.
///
/// Variables nested inside lists and objects are resolved immediately from
/// the supplied set; only top-level variable arguments stay deferred.
pub fn parse_literal(
    schema: &Schema,
    ty: &TypeRef,
    node: &ValueNode,
    variables: &Variables,
) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            let value = parse_literal(schema, inner, node, variables)?;
            if value.is_null() {
                return Err(format!("expected non-null value of type `{ty}`"));
            }
            Ok(value)
        }
        TypeRef::List(element) => match node {
            ValueNode::Null(_) => Ok(Value::Null),
            ValueNode::List(items, _) => items
                .iter()
                .map(|item| parse_literal(schema, element, item, variables))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            // a single value coerces to a one-element list
            single => Ok(Value::Array(vec![parse_literal(
                schema, element, single, variables,
            )?])),
        },
        TypeRef::Named(name) => parse_named_literal(schema, name, node, variables),
    }
}

fn parse_named_literal(
    schema: &Schema,
    name: &str,
    node: &ValueNode,
    variables: &Variables,
) -> Result<Value, String> {
    if let ValueNode::Null(_) = node {
        return Ok(Value::Null);
    }
    if let ValueNode::Variable(var) = node {
        let value = variables
            .try_get(var.as_str())
            .cloned()
            .unwrap_or(Value::Null);
        return coerce_runtime(schema, &TypeRef::named(name), &value);
    }
    match schema.get_type(name) {
        Some(TypeDef::Scalar(scalar)) => {
            let raw = literal_to_value(node)?;
            match &scalar.parse {
                Some(parse) => parse(&raw),
                None => convert_scalar(name, &raw),
            }
        }
        Some(TypeDef::Enum(def)) => match node {
            ValueNode::Enum(value) => {
                if def.has_value(value.as_str()) {
                    Ok(Value::String(value.as_str().to_string()))
                } else {
                    Err(format!(
                        "value `{}` does not exist in `{name}` enum",
                        value.as_str()
                    ))
                }
            }
            ValueNode::String(value, _) => {
                if def.has_value(value) {
                    Ok(Value::String(value.clone()))
                } else {
                    Err(format!("value `{value}` does not exist in `{name}` enum"))
                }
            }
            other => Err(format!(
                "enum `{name}` cannot represent value: {:?}",
                other.span()
            )),
        },
        Some(TypeDef::InputObject(def)) => match node {
            ValueNode::Object(entries, _) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    let input = def.fields.get(key.as_str()).ok_or_else(|| {
                        format!("field `{}` is not defined by type `{name}`", key.as_str())
                    })?;
                    out.insert(
                        key.as_str().to_string(),
                        parse_literal(schema, &input.ty, value, variables)?,
                    );
                }
                for (key, input) in &def.fields {
                    if out.contains_key(key) {
                        continue;
                    }
                    if let Some(default) = &input.default_value {
                        out.insert(key.clone(), default.clone());
                    } else if input.ty.is_non_null() {
                        return Err(format!(
                            "field `{key}` of type `{name}` is required but was not provided"
                        ));
                    }
                }
                Ok(Value::Object(out))
            }
            _ => Err(format!("expected input object of type `{name}`")),
        },
        _ => literal_to_value(node),
    }
}

/// Coerces an already-runtime value (a variable's supplied value) to a type.
pub fn coerce_runtime(schema: &Schema, ty: &TypeRef, value: &Value) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            let coerced = coerce_runtime(schema, inner, value)?;
            if coerced.is_null() {
                return Err(format!("expected non-null value of type `{ty}`"));
            }
            Ok(coerced)
        }
        TypeRef::List(element) => match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_runtime(schema, element, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![coerce_runtime(
                schema, element, single,
            )?])),
        },
        TypeRef::Named(name) => {
            if value.is_null() {
                return Ok(Value::Null);
            }
            match schema.get_type(name) {
                Some(TypeDef::Scalar(scalar)) => match &scalar.parse {
                    Some(parse) => parse(value),
                    None => convert_scalar(name, value),
                },
                Some(TypeDef::Enum(def)) => match value {
                    Value::String(s) if def.has_value(s) => Ok(value.clone()),
                    _ => Err(format!("value `{value}` does not exist in `{name}` enum")),
                },
                Some(TypeDef::InputObject(def)) => match value {
                    Value::Object(entries) => {
                        let mut out = serde_json::Map::new();
                        for (key, item) in entries {
                            let input = def.fields.get(key).ok_or_else(|| {
                                format!("field `{key}` is not defined by type `{name}`")
                            })?;
                            out.insert(key.clone(), coerce_runtime(schema, &input.ty, item)?);
                        }
                        for (key, input) in &def.fields {
                            if out.contains_key(key) {
                                continue;
                            }
                            if let Some(default) = &input.default_value {
                                out.insert(key.clone(), default.clone());
                            } else if input.ty.is_non_null() {
                                return Err(format!(
                                    "field `{key}` of type `{name}` is required but was not provided"
                                ));
                            }
                        }
                        Ok(Value::Object(out))
                    }
                    _ => Err(format!("expected input object of type `{name}`")),
                },
                _ => Ok(value.clone()),
            }
        }
    }
}

pub(crate) fn literal_to_value(node: &ValueNode) -> Result<Value, String> {
    match node {
        ValueNode::Int(i, _) => Ok(Value::Number((*i).into())),
        ValueNode::Float(f, span) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| format!("non-finite float literal at offset {}", span.start)),
        ValueNode::String(s, _) => Ok(Value::String(s.clone())),
        ValueNode::Boolean(b, _) => Ok(Value::Bool(*b)),
        ValueNode::Null(_) => Ok(Value::Null),
        ValueNode::Enum(name) => Ok(Value::String(name.as_str().to_string())),
        ValueNode::List(items, _) => items
            .iter()
            .map(literal_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ValueNode::Object(entries, _) => {
            let mut out = serde_json::Map::new();
            for (key, value) in entries {
                out.insert(key.as_str().to_string(), literal_to_value(value)?);
            }
            Ok(Value::Object(out))
        }
        ValueNode::Variable(name) => Err(format!(
            "variable `${}` cannot appear in a constant position",
            name.as_str()
        )),
    }
}
