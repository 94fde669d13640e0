//! `@skip`/`@include` visibility evaluation for weft.
//!
//! A field nested under fragments accumulates a chain of conditions: its own
//! directives plus those of every enclosing spread or inline fragment. The
//! chain is a persistent parent-linked list so sibling fields share their
//! common ancestors.

use crate::error::RequestError;
use crate::variables::Variables;
use serde_json::Value;
use std::sync::Arc;
use weft_syntax::{DirectiveNode, Span, ValueNode};

/// One level of visibility conditions with a link to the enclosing level.
#[derive(Debug, Clone, Default)]
pub struct FieldVisibility {
    skip: Option<ValueNode>,
    include: Option<ValueNode>,
    parent: Option<Arc<FieldVisibility>>,
}

impl FieldVisibility {
    /// The root visibility: always visible.
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Extracts `@skip`/`@include` conditions from a directive list, chained
    /// onto `parent`. A directive missing its `if` argument keeps a marker
    /// that fails evaluation with a clear error.
    pub fn from_directives(directives: &[DirectiveNode], parent: Option<Arc<Self>>) -> Arc<Self> {
        let mut visibility = Self {
            skip: None,
            include: None,
            parent,
        };
        for directive in directives {
            let condition = directive
                .argument("if")
                .cloned()
                .unwrap_or(ValueNode::Null(directive.span));
            match directive.name.as_str() {
                "skip" => visibility.skip = Some(condition),
                "include" => visibility.include = Some(condition),
                _ => {}
            }
        }
        Arc::new(visibility)
    }

    /// Returns true when this level carries no conditions of its own.
    pub fn is_unconditional(&self) -> bool {
        self.skip.is_none() && self.include.is_none()
    }

    /// Evaluates the whole chain against the supplied variables.
    ///
    /// Ancestors are checked first so an invisible fragment hides everything
    /// under it without touching inner conditions. `@skip` wins over
    /// `@include` at the same level.
    pub fn is_visible(&self, variables: &Variables) -> Result<bool, RequestError> {
        if let Some(parent) = &self.parent {
            if !parent.is_visible(variables)? {
                return Ok(false);
            }
        }
        if let Some(condition) = &self.skip {
            if evaluate_condition("skip", condition, variables)? {
                return Ok(false);
            }
        }
        if let Some(condition) = &self.include {
            if !evaluate_condition("include", condition, variables)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn evaluate_condition(
    directive: &str,
    condition: &ValueNode,
    variables: &Variables,
) -> Result<bool, RequestError> {
    match condition {
        ValueNode::Boolean(value, _) => Ok(*value),
        ValueNode::Variable(name) => match variables.try_get(name.as_str()) {
            Some(Value::Bool(value)) => Ok(*value),
            _ => Err(non_boolean(directive, name.span)),
        },
        other => Err(non_boolean(directive, other.span())),
    }
}

fn non_boolean(directive: &str, span: Span) -> RequestError {
    RequestError::NonBooleanCondition {
        directive: directive.to_string(),
        span,
    }
}
