//! Executable-document AST for weft.
//!
//! Only the executable half of the GraphQL grammar lives here: operations,
//! fragments, selections and value literals. Type definitions are not
//! represented; the runtime schema is built programmatically.
//!
//! Nodes are owned (`String` names, no arena lifetimes) because the executor
//! caches merged selection nodes across async task boundaries. Documents are
//! immutable once constructed; the runtime never mutates them.

use crate::span::Span;

/// A complete executable document.
#[derive(Debug, Clone)]
pub struct Document {
    pub definitions: Vec<Definition>,
    pub span: Span,
}

impl Document {
    /// Creates a document from its definitions.
    pub fn new(definitions: Vec<Definition>) -> Self {
        let span = definitions
            .iter()
            .map(Definition::span)
            .reduce(Span::merge)
            .unwrap_or_default();
        Self { definitions, span }
    }

    /// Iterates over the operation definitions.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
    }

    /// Iterates over the fragment definitions.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Fragment(frag) => Some(frag),
            Definition::Operation(_) => None,
        })
    }

    /// Looks up a fragment definition by name.
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments().find(|f| f.name.as_str() == name)
    }
}

/// A top-level executable definition.
#[derive(Debug, Clone)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

impl Definition {
    /// Returns the span of this definition.
    pub fn span(&self) -> Span {
        match self {
            Self::Operation(op) => op.span,
            Self::Fragment(frag) => frag.span,
        }
    }
}

/// Type of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// Operation definition.
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Variable definition.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: TypeNode,
    pub default_value: Option<ValueNode>,
    pub span: Span,
}

/// Type reference as written in a query document.
#[derive(Debug, Clone)]
pub enum TypeNode {
    /// Named type: `User`
    Named(Name),
    /// List type: `[User]`
    List(Box<TypeNode>, Span),
    /// Non-null type: `User!`
    NonNull(Box<TypeNode>, Span),
}

/// Fragment definition.
#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub name: Name,
    pub type_condition: Name,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Selection set.
#[derive(Debug, Clone)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
    pub span: Span,
}

/// Selection.
#[derive(Debug, Clone)]
pub enum Selection {
    Field(FieldNode),
    FragmentSpread(FragmentSpreadNode),
    InlineFragment(InlineFragmentNode),
}

/// Field selection.
#[derive(Debug, Clone)]
pub struct FieldNode {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<ArgumentNode>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: Option<SelectionSet>,
    pub span: Span,
}

impl FieldNode {
    /// The key under which this field's value appears in the response:
    /// the alias if one was given, otherwise the field name.
    pub fn response_name(&self) -> &str {
        self.alias
            .as_ref()
            .map(Name::as_str)
            .unwrap_or_else(|| self.name.as_str())
    }

    /// Looks up a supplied argument by name.
    pub fn argument(&self, name: &str) -> Option<&ArgumentNode> {
        self.arguments.iter().find(|a| a.name.as_str() == name)
    }
}

/// Fragment spread.
#[derive(Debug, Clone)]
pub struct FragmentSpreadNode {
    pub name: Name,
    pub directives: Vec<DirectiveNode>,
    pub span: Span,
}

/// Inline fragment.
#[derive(Debug, Clone)]
pub struct InlineFragmentNode {
    pub type_condition: Option<Name>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Directive usage.
#[derive(Debug, Clone)]
pub struct DirectiveNode {
    pub name: Name,
    pub arguments: Vec<ArgumentNode>,
    pub span: Span,
}

impl DirectiveNode {
    /// Looks up a supplied argument value by name.
    pub fn argument(&self, name: &str) -> Option<&ValueNode> {
        self.arguments
            .iter()
            .find(|a| a.name.as_str() == name)
            .map(|a| &a.value)
    }
}

/// Argument.
#[derive(Debug, Clone)]
pub struct ArgumentNode {
    pub name: Name,
    pub value: ValueNode,
    pub span: Span,
}

/// Value literal.
#[derive(Debug, Clone)]
pub enum ValueNode {
    Variable(Name),
    Int(i64, Span),
    Float(f64, Span),
    String(String, Span),
    Boolean(bool, Span),
    Null(Span),
    Enum(Name),
    List(Vec<ValueNode>, Span),
    Object(Vec<(Name, ValueNode)>, Span),
}

impl ValueNode {
    /// Returns the span of this value.
    pub fn span(&self) -> Span {
        match self {
            Self::Variable(name) | Self::Enum(name) => name.span,
            Self::Int(_, span)
            | Self::Float(_, span)
            | Self::String(_, span)
            | Self::Boolean(_, span)
            | Self::Null(span)
            | Self::List(_, span)
            | Self::Object(_, span) => *span,
        }
    }

    /// Returns true if this is the `null` literal.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }
}

/// Name with span.
#[derive(Debug, Clone)]
pub struct Name {
    pub value: String,
    pub span: Span,
}

impl Name {
    /// Creates a new name.
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}
