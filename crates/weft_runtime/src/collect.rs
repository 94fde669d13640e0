//! Field collection for weft.
//!
//! Collection flattens a selection set against a concrete object type:
//! fragments are expanded, invisible selections dropped, and fields sharing
//! a response name merged into one `FieldSelection` whose sub-selections are
//! the concatenation of every occurrence's, in document order. The result is
//! memoized per execution by `(selection-set span, type name)` — spans double
//! as node identities, so two walks of the same set on the same type share
//! one collected list.

use crate::error::RequestError;
use crate::fragments::{Fragment, FragmentResolver};
use crate::input::{coerce_arguments, ArgumentValue};
use crate::middleware::{DirectiveRegistry, FieldPipeline, MiddlewareCache};
use crate::schema::{FieldDef, Schema, TypeRef};
use crate::variables::Variables;
use crate::visibility::FieldVisibility;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};
use weft_syntax::{FieldNode, Selection, SelectionSet, Span};

/// A collected field: everything the executor needs to run one entry of a
/// selection set.
#[derive(Debug, Clone)]
pub struct FieldSelection {
    /// The key this field's value appears under in the response.
    pub response_name: String,
    /// The field definition; synthesized for `__typename`.
    pub field: FieldDef,
    /// The merged field node. Its selection set concatenates the
    /// sub-selections of every occurrence.
    pub selection: FieldNode,
    /// Source spans of the original occurrences.
    pub occurrences: Vec<Span>,
    /// Coerced arguments, from the first occurrence.
    pub arguments: IndexMap<String, ArgumentValue>,
    /// The visibility chain, extended with each later occurrence's own
    /// conditions as occurrences merge.
    pub visibility: Arc<FieldVisibility>,
    /// The compiled directive middleware chain.
    pub pipeline: Arc<FieldPipeline>,
}

impl FieldSelection {
    /// The field's declared type.
    pub fn ty(&self) -> &TypeRef {
        &self.field.ty
    }

    /// Returns true for the `__typename` meta field.
    pub fn is_typename(&self) -> bool {
        self.field.name == "__typename"
    }

    /// The merged sub-selection set, if the field has one.
    pub fn sub_selections(&self) -> Option<&SelectionSet> {
        self.selection.selection_set.as_ref()
    }
}

/// Per-execution memo of collected selection sets.
///
/// First writer wins: when two sibling tasks race to collect the same set,
/// both end up holding the same `Arc`.
#[derive(Debug, Default)]
pub struct SelectionCache {
    entries: RwLock<FxHashMap<(Span, String), Arc<Vec<Arc<FieldSelection>>>>>,
}

impl SelectionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &(Span, String)) -> Option<Arc<Vec<Arc<FieldSelection>>>> {
        self.entries.read().ok().and_then(|e| e.get(key).cloned())
    }

    fn insert(
        &self,
        key: (Span, String),
        value: Arc<Vec<Arc<FieldSelection>>>,
    ) -> Arc<Vec<Arc<FieldSelection>>> {
        match self.entries.write() {
            Ok(mut entries) => entries.entry(key).or_insert(value).clone(),
            Err(_) => value,
        }
    }
}

/// Walks selection sets into collected field lists.
pub struct FieldCollector<'a> {
    schema: &'a Schema,
    fragments: &'a FragmentResolver,
    registry: &'a DirectiveRegistry,
    middleware: &'a MiddlewareCache,
    variables: &'a Variables,
    cache: &'a SelectionCache,
}

struct MergedField {
    field: FieldDef,
    node: FieldNode,
    occurrences: Vec<Span>,
    arguments: IndexMap<String, ArgumentValue>,
    visibility: Arc<FieldVisibility>,
}

impl<'a> FieldCollector<'a> {
    /// Creates a collector over one execution's caches.
    pub fn new(
        schema: &'a Schema,
        fragments: &'a FragmentResolver,
        registry: &'a DirectiveRegistry,
        middleware: &'a MiddlewareCache,
        variables: &'a Variables,
        cache: &'a SelectionCache,
    ) -> Self {
        Self {
            schema,
            fragments,
            registry,
            middleware,
            variables,
            cache,
        }
    }

    /// Collects a selection set against a concrete object type.
    ///
    /// Unknown fields and malformed `@skip`/`@include` conditions abort the
    /// request; a spread naming an undefined fragment is skipped. Only
    /// successful results enter the memo.
    pub fn collect(
        &self,
        type_name: &str,
        selection_set: &SelectionSet,
    ) -> Result<Arc<Vec<Arc<FieldSelection>>>, RequestError> {
        let key = (selection_set.span, type_name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let mut merged: IndexMap<String, MergedField> = IndexMap::new();
        self.walk(type_name, selection_set, None, &mut merged)?;

        let fields = merged
            .into_iter()
            .map(|(response_name, m)| {
                let type_stages =
                    self.middleware
                        .type_system_stages(self.registry, type_name, &m.field);
                let pipeline = FieldPipeline::compile_with_stages(
                    self.registry,
                    &type_stages,
                    &m.node.directives,
                    self.variables,
                );
                Arc::new(FieldSelection {
                    response_name,
                    field: m.field,
                    selection: m.node,
                    occurrences: m.occurrences,
                    arguments: m.arguments,
                    visibility: m.visibility,
                    pipeline,
                })
            })
            .collect::<Vec<_>>();

        Ok(self.cache.insert(key, Arc::new(fields)))
    }

    fn walk(
        &self,
        type_name: &str,
        selection_set: &SelectionSet,
        parent: Option<Arc<FieldVisibility>>,
        out: &mut IndexMap<String, MergedField>,
    ) -> Result<(), RequestError> {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(node) => {
                    let visibility =
                        FieldVisibility::from_directives(&node.directives, parent.clone());
                    if !visibility.is_visible(self.variables)? {
                        continue;
                    }
                    self.merge_field(type_name, node, visibility, out)?;
                }
                Selection::FragmentSpread(spread) => {
                    let visibility =
                        FieldVisibility::from_directives(&spread.directives, parent.clone());
                    if !visibility.is_visible(self.variables)? {
                        continue;
                    }
                    // a spread naming an undefined fragment contributes nothing
                    let Some(fragment) = self.fragments.named(spread.name.as_str()) else {
                        continue;
                    };
                    self.walk_fragment(type_name, &fragment, visibility, out)?;
                }
                Selection::InlineFragment(inline) => {
                    let visibility =
                        FieldVisibility::from_directives(&inline.directives, parent.clone());
                    if !visibility.is_visible(self.variables)? {
                        continue;
                    }
                    let fragment = self.fragments.inline(type_name, inline);
                    self.walk_fragment(type_name, &fragment, visibility, out)?;
                }
            }
        }
        Ok(())
    }

    fn walk_fragment(
        &self,
        type_name: &str,
        fragment: &Fragment,
        visibility: Arc<FieldVisibility>,
        out: &mut IndexMap<String, MergedField>,
    ) -> Result<(), RequestError> {
        if !self.fragments.applies(self.schema, fragment, type_name) {
            return Ok(());
        }
        let visibility = if fragment.directives.is_empty() {
            visibility
        } else {
            FieldVisibility::from_directives(&fragment.directives, Some(visibility))
        };
        if !visibility.is_visible(self.variables)? {
            return Ok(());
        }
        self.walk(type_name, &fragment.selection_set, Some(visibility), out)
    }

    fn merge_field(
        &self,
        type_name: &str,
        node: &FieldNode,
        visibility: Arc<FieldVisibility>,
        out: &mut IndexMap<String, MergedField>,
    ) -> Result<(), RequestError> {
        let field_def = if node.name == "__typename" {
            FieldDef::new("__typename", TypeRef::non_null(TypeRef::named("String")))
        } else {
            self.schema
                .field(type_name, node.name.as_str())
                .cloned()
                .ok_or_else(|| RequestError::FieldNotFound {
                    type_name: type_name.to_string(),
                    field: node.name.as_str().to_string(),
                    span: node.span,
                })?
        };

        match out.get_mut(node.response_name()) {
            Some(existing) => {
                existing.occurrences.push(node.span);
                let extended =
                    FieldVisibility::from_directives(&node.directives, Some(existing.visibility.clone()));
                if !extended.is_unconditional() {
                    existing.visibility = extended;
                }
                existing.node.directives.extend(node.directives.iter().cloned());
                if let Some(sub) = &node.selection_set {
                    match &mut existing.node.selection_set {
                        Some(merged) => {
                            merged.selections.extend(sub.selections.iter().cloned());
                            merged.span = merged.span.merge(sub.span);
                        }
                        None => existing.node.selection_set = Some(sub.clone()),
                    }
                }
            }
            None => {
                let arguments =
                    coerce_arguments(self.schema, &field_def, node, self.variables);
                out.insert(
                    node.response_name().to_string(),
                    MergedField {
                        field: field_def,
                        node: node.clone(),
                        occurrences: vec![node.span],
                        arguments,
                        visibility,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{InterfaceDef, ObjectDef, SchemaBuilder, TypeDef};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use weft_syntax::{
        ArgumentNode, Definition, DirectiveNode, Document, FragmentDefinition,
        InlineFragmentNode, Name, ValueNode,
    };

    static NEXT_SPAN: AtomicU32 = AtomicU32::new(1);

    // every node needs a distinct span: spans are cache identities
    fn span() -> Span {
        let at = NEXT_SPAN.fetch_add(4, Ordering::Relaxed);
        Span::new(at, at + 3)
    }

    fn name(s: &str) -> Name {
        Name::new(s, span())
    }

    fn field(field_name: &str, sub: Option<SelectionSet>) -> Selection {
        Selection::Field(FieldNode {
            alias: None,
            name: name(field_name),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: sub,
            span: span(),
        })
    }

    fn set(selections: Vec<Selection>) -> SelectionSet {
        SelectionSet {
            selections,
            span: span(),
        }
    }

    fn schema() -> Schema {
        let mut user_fields = IndexMap::new();
        user_fields.insert(
            "id".to_string(),
            FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))),
        );
        user_fields.insert(
            "name".to_string(),
            FieldDef::new("name", TypeRef::named("String")),
        );
        user_fields.insert(
            "email".to_string(),
            FieldDef::new("email", TypeRef::named("String")),
        );
        let mut query_fields = IndexMap::new();
        query_fields.insert(
            "user".to_string(),
            FieldDef::new("user", TypeRef::named("User")),
        );
        SchemaBuilder::new()
            .query_type("Query")
            .add_type(TypeDef::Object(ObjectDef {
                name: "User".to_string(),
                description: None,
                fields: user_fields,
                implements: vec!["Node".to_string()],
            }))
            .add_type(TypeDef::Interface(InterfaceDef {
                name: "Node".to_string(),
                description: None,
                fields: IndexMap::new(),
                implements: Vec::new(),
            }))
            .add_type(TypeDef::Object(ObjectDef {
                name: "Query".to_string(),
                description: None,
                fields: query_fields,
                implements: Vec::new(),
            }))
            .build()
    }

    struct Fixture {
        schema: Schema,
        fragments: FragmentResolver,
        registry: DirectiveRegistry,
        middleware: MiddlewareCache,
        variables: Variables,
        cache: SelectionCache,
    }

    impl Fixture {
        fn new(document: Document) -> Self {
            Self {
                schema: schema(),
                fragments: FragmentResolver::new(Arc::new(document)),
                registry: DirectiveRegistry::new(),
                middleware: MiddlewareCache::new(),
                variables: Variables::new(),
                cache: SelectionCache::new(),
            }
        }

        fn collector(&self) -> FieldCollector<'_> {
            FieldCollector::new(
                &self.schema,
                &self.fragments,
                &self.registry,
                &self.middleware,
                &self.variables,
                &self.cache,
            )
        }
    }

    #[test]
    fn test_merges_by_response_name() {
        let selections = set(vec![
            field("name", None),
            field("id", None),
            field("name", None),
        ]);
        let fixture = Fixture::new(Document::new(vec![]));
        let fields = fixture.collector().collect("User", &selections).unwrap();

        let names: Vec<&str> = fields.iter().map(|f| f.response_name.as_str()).collect();
        assert_eq!(names, vec!["name", "id"]);
        assert_eq!(fields[0].occurrences.len(), 2);
    }

    #[test]
    fn test_memoizes_by_span_and_type() {
        let selections = set(vec![field("id", None)]);
        let fixture = Fixture::new(Document::new(vec![]));
        let collector = fixture.collector();

        let first = collector.collect("User", &selections).unwrap();
        let second = collector.collect("User", &selections).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_field_aborts() {
        let selections = set(vec![field("nope", None)]);
        let fixture = Fixture::new(Document::new(vec![]));
        let err = fixture
            .collector()
            .collect("User", &selections)
            .unwrap_err();
        assert!(matches!(err, RequestError::FieldNotFound { .. }));
    }

    #[test]
    fn test_typename_synthesized() {
        let selections = set(vec![field("__typename", None)]);
        let fixture = Fixture::new(Document::new(vec![]));
        let fields = fixture.collector().collect("User", &selections).unwrap();
        assert!(fields[0].is_typename());
        assert_eq!(fields[0].ty().to_string(), "String!");
    }

    #[test]
    fn test_named_fragment_expansion() {
        let fragment = FragmentDefinition {
            name: name("UserParts"),
            type_condition: name("User"),
            directives: Vec::new(),
            selection_set: set(vec![field("email", None)]),
            span: span(),
        };
        let document = Document::new(vec![Definition::Fragment(fragment)]);
        let fixture = Fixture::new(document);

        let selections = set(vec![
            field("id", None),
            Selection::FragmentSpread(weft_syntax::FragmentSpreadNode {
                name: name("UserParts"),
                directives: Vec::new(),
                span: span(),
            }),
        ]);
        let fields = fixture.collector().collect("User", &selections).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.response_name.as_str()).collect();
        assert_eq!(names, vec!["id", "email"]);
    }

    #[test]
    fn test_unknown_fragment_contributes_nothing() {
        let fixture = Fixture::new(Document::new(vec![]));
        let selections = set(vec![
            field("id", None),
            Selection::FragmentSpread(weft_syntax::FragmentSpreadNode {
                name: name("Ghost"),
                directives: Vec::new(),
                span: span(),
            }),
        ]);
        let fields = fixture.collector().collect("User", &selections).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.response_name.as_str()).collect();
        assert_eq!(names, vec!["id"]);
    }

    #[test]
    fn test_inline_fragment_type_gate() {
        let fixture = Fixture::new(Document::new(vec![]));
        let selections = set(vec![
            field("id", None),
            // interface condition applies to User
            Selection::InlineFragment(InlineFragmentNode {
                type_condition: Some(name("Node")),
                directives: Vec::new(),
                selection_set: set(vec![field("name", None)]),
                span: span(),
            }),
            // unrelated condition does not
            Selection::InlineFragment(InlineFragmentNode {
                type_condition: Some(name("Query")),
                directives: Vec::new(),
                selection_set: set(vec![field("user", None)]),
                span: span(),
            }),
        ]);
        let fields = fixture.collector().collect("User", &selections).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.response_name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_merged_sub_selections_concatenate() {
        let selections = set(vec![
            field("user", Some(set(vec![field("id", None)]))),
            field("user", Some(set(vec![field("name", None)]))),
        ]);
        let fixture = Fixture::new(Document::new(vec![]));
        let fields = fixture.collector().collect("Query", &selections).unwrap();

        assert_eq!(fields.len(), 1);
        let sub = fields[0].sub_selections().unwrap();
        assert_eq!(sub.selections.len(), 2);
    }

    #[test]
    fn test_merge_extends_visibility_with_later_conditions() {
        let conditional = Selection::Field(FieldNode {
            alias: None,
            name: name("name"),
            arguments: Vec::new(),
            directives: vec![DirectiveNode {
                name: name("include"),
                arguments: vec![ArgumentNode {
                    name: name("if"),
                    value: ValueNode::Variable(name("flag")),
                    span: span(),
                }],
                span: span(),
            }],
            selection_set: None,
            span: span(),
        });
        let selections = set(vec![field("name", None), conditional]);

        let mut fixture = Fixture::new(Document::new(vec![]));
        fixture.variables = Variables::from(json!({"flag": true}));
        let fields = fixture.collector().collect("User", &selections).unwrap();

        assert_eq!(fields[0].occurrences.len(), 2);
        // the merged record carries the second occurrence's condition
        assert!(!fields[0].visibility.is_unconditional());
        assert!(fields[0].visibility.is_visible(&fixture.variables).unwrap());
    }
}
