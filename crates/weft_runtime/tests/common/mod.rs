//! Hand-built document helpers for executor tests.
//!
//! Every node gets a fresh span from a global counter: the runtime memoizes
//! collected selection sets by span, so two distinct nodes must never share
//! one.

use std::sync::atomic::{AtomicU32, Ordering};
use weft_syntax::{
    ArgumentNode, Definition, DirectiveNode, Document, FieldNode, FragmentDefinition,
    FragmentSpreadNode, InlineFragmentNode, Name, OperationDefinition, OperationKind, Selection,
    SelectionSet, Span, TypeNode, ValueNode, VariableDefinition,
};

static NEXT_SPAN: AtomicU32 = AtomicU32::new(1);

pub fn span() -> Span {
    let at = NEXT_SPAN.fetch_add(8, Ordering::Relaxed);
    Span::new(at, at + 7)
}

pub fn name(value: &str) -> Name {
    Name::new(value, span())
}

pub fn sel_set(selections: Vec<Selection>) -> SelectionSet {
    SelectionSet {
        selections,
        span: span(),
    }
}

/// Builder for field selections.
pub struct FieldBuilder {
    node: FieldNode,
}

pub fn field(field_name: &str) -> FieldBuilder {
    FieldBuilder {
        node: FieldNode {
            alias: None,
            name: name(field_name),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: None,
            span: span(),
        },
    }
}

impl FieldBuilder {
    pub fn alias(mut self, alias: &str) -> Self {
        self.node.alias = Some(name(alias));
        self
    }

    pub fn arg(mut self, arg_name: &str, value: ValueNode) -> Self {
        self.node.arguments.push(ArgumentNode {
            name: name(arg_name),
            value,
            span: span(),
        });
        self
    }

    pub fn var_arg(self, arg_name: &str, var: &str) -> Self {
        let value = ValueNode::Variable(name(var));
        self.arg(arg_name, value)
    }

    pub fn directive(mut self, directive: DirectiveNode) -> Self {
        self.node.directives.push(directive);
        self
    }

    pub fn skip(self, condition: bool) -> Self {
        let directive = bool_directive("skip", ValueNode::Boolean(condition, span()));
        self.directive(directive)
    }

    pub fn skip_var(self, var: &str) -> Self {
        let directive = bool_directive("skip", ValueNode::Variable(name(var)));
        self.directive(directive)
    }

    pub fn include(self, condition: bool) -> Self {
        let directive = bool_directive("include", ValueNode::Boolean(condition, span()));
        self.directive(directive)
    }

    pub fn include_var(self, var: &str) -> Self {
        let directive = bool_directive("include", ValueNode::Variable(name(var)));
        self.directive(directive)
    }

    pub fn sub(mut self, selections: Vec<Selection>) -> Self {
        self.node.selection_set = Some(sel_set(selections));
        self
    }

    pub fn done(self) -> Selection {
        Selection::Field(self.node)
    }
}

pub fn bool_directive(directive_name: &str, condition: ValueNode) -> DirectiveNode {
    DirectiveNode {
        name: name(directive_name),
        arguments: vec![ArgumentNode {
            name: name("if"),
            value: condition,
            span: span(),
        }],
        span: span(),
    }
}

pub fn bare_directive(directive_name: &str) -> DirectiveNode {
    DirectiveNode {
        name: name(directive_name),
        arguments: Vec::new(),
        span: span(),
    }
}

pub fn spread(fragment_name: &str) -> Selection {
    Selection::FragmentSpread(FragmentSpreadNode {
        name: name(fragment_name),
        directives: Vec::new(),
        span: span(),
    })
}

pub fn spread_with(fragment_name: &str, directives: Vec<DirectiveNode>) -> Selection {
    Selection::FragmentSpread(FragmentSpreadNode {
        name: name(fragment_name),
        directives,
        span: span(),
    })
}

pub fn inline(on: Option<&str>, selections: Vec<Selection>) -> Selection {
    Selection::InlineFragment(InlineFragmentNode {
        type_condition: on.map(name),
        directives: Vec::new(),
        selection_set: sel_set(selections),
        span: span(),
    })
}

pub fn fragment(fragment_name: &str, on: &str, selections: Vec<Selection>) -> Definition {
    Definition::Fragment(FragmentDefinition {
        name: name(fragment_name),
        type_condition: name(on),
        directives: Vec::new(),
        selection_set: sel_set(selections),
        span: span(),
    })
}

pub fn operation(
    kind: OperationKind,
    op_name: Option<&str>,
    selections: Vec<Selection>,
) -> Definition {
    Definition::Operation(OperationDefinition {
        kind,
        name: op_name.map(name),
        variable_definitions: Vec::new(),
        directives: Vec::new(),
        selection_set: sel_set(selections),
        span: span(),
    })
}

pub fn var_def(var_name: &str, ty: &str, default: Option<ValueNode>) -> VariableDefinition {
    VariableDefinition {
        name: name(var_name),
        ty: TypeNode::Named(name(ty)),
        default_value: default,
        span: span(),
    }
}

pub fn operation_with_vars(
    kind: OperationKind,
    op_name: Option<&str>,
    variable_definitions: Vec<VariableDefinition>,
    selections: Vec<Selection>,
) -> Definition {
    Definition::Operation(OperationDefinition {
        kind,
        name: op_name.map(name),
        variable_definitions,
        directives: Vec::new(),
        selection_set: sel_set(selections),
        span: span(),
    })
}

/// An anonymous query document.
pub fn query(selections: Vec<Selection>) -> Document {
    Document::new(vec![operation(OperationKind::Query, None, selections)])
}

/// An anonymous mutation document.
pub fn mutation(selections: Vec<Selection>) -> Document {
    Document::new(vec![operation(OperationKind::Mutation, None, selections)])
}
