//! Syntax layer for weft.
//!
//! This crate provides the read-only document model the execution engine
//! consumes:
//! - `span`: Source location tracking
//! - `ast`: Executable-document AST (operations, fragments, selections)

pub mod ast;
pub mod span;

pub use ast::{
    ArgumentNode, Definition, DirectiveNode, Document, FieldNode, FragmentDefinition,
    FragmentSpreadNode, InlineFragmentNode, Name, OperationDefinition, OperationKind, Selection,
    SelectionSet, TypeNode, ValueNode, VariableDefinition,
};
pub use span::Span;
