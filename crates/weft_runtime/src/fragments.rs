//! Fragment resolution for weft.
//!
//! Named fragments and inline fragments normalize to the same `Fragment`
//! shape so the collector walks them uniformly. Lookups are memoized per
//! execution; negative named lookups are cached too, so a misspelled spread
//! costs one document scan rather than one per occurrence.

use crate::schema::Schema;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};
use weft_syntax::{Document, DirectiveNode, InlineFragmentNode, SelectionSet, Span};

/// A normalized fragment: a type condition plus the selections under it.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// The type condition; inline fragments without one inherit the
    /// enclosing type.
    pub type_condition: String,
    pub selection_set: SelectionSet,
    pub directives: Vec<DirectiveNode>,
}

/// Per-execution fragment resolver.
#[derive(Debug)]
pub struct FragmentResolver {
    document: Arc<Document>,
    named: RwLock<FxHashMap<String, Option<Arc<Fragment>>>>,
    inline: RwLock<FxHashMap<Span, Arc<Fragment>>>,
}

impl FragmentResolver {
    /// Creates a resolver over a document.
    pub fn new(document: Arc<Document>) -> Self {
        Self {
            document,
            named: RwLock::new(FxHashMap::default()),
            inline: RwLock::new(FxHashMap::default()),
        }
    }

    /// Resolves a named fragment.
    ///
    /// Returns `None` when the fragment does not exist in the document.
    pub fn named(&self, name: &str) -> Option<Arc<Fragment>> {
        if let Ok(cache) = self.named.read() {
            if let Some(entry) = cache.get(name) {
                return entry.clone();
            }
        }
        let resolved = self.document.fragment(name).map(|def| {
            Arc::new(Fragment {
                type_condition: def.type_condition.as_str().to_string(),
                selection_set: def.selection_set.clone(),
                directives: def.directives.clone(),
            })
        });
        if let Ok(mut cache) = self.named.write() {
            cache.insert(name.to_string(), resolved.clone());
        }
        resolved
    }

    /// Normalizes an inline fragment, inheriting `parent_type` when it has
    /// no type condition of its own. Cached by the node's span.
    pub fn inline(&self, parent_type: &str, node: &InlineFragmentNode) -> Arc<Fragment> {
        if let Ok(cache) = self.inline.read() {
            if let Some(fragment) = cache.get(&node.span) {
                return fragment.clone();
            }
        }
        let fragment = Arc::new(Fragment {
            type_condition: node
                .type_condition
                .as_ref()
                .map(|n| n.as_str().to_string())
                .unwrap_or_else(|| parent_type.to_string()),
            selection_set: node.selection_set.clone(),
            directives: node.directives.clone(),
        });
        if let Ok(mut cache) = self.inline.write() {
            cache.insert(node.span, fragment.clone());
        }
        fragment
    }

    /// Returns true if the fragment's condition lets it spread into the
    /// given concrete object type.
    pub fn applies(&self, schema: &Schema, fragment: &Fragment, object_type: &str) -> bool {
        schema.fragment_applies(&fragment.type_condition, object_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_syntax::{Definition, FragmentDefinition, Name};

    fn doc_with_fragment() -> Arc<Document> {
        Arc::new(Document::new(vec![Definition::Fragment(
            FragmentDefinition {
                name: Name::new("UserParts", Span::new(9, 18)),
                type_condition: Name::new("User", Span::new(22, 26)),
                directives: Vec::new(),
                selection_set: SelectionSet {
                    selections: Vec::new(),
                    span: Span::new(27, 29),
                },
                span: Span::new(0, 29),
            },
        )]))
    }

    #[test]
    fn test_named_fragment_resolution() {
        let resolver = FragmentResolver::new(doc_with_fragment());
        let fragment = resolver.named("UserParts").unwrap();
        assert_eq!(fragment.type_condition, "User");

        // second lookup hits the cache and returns the same allocation
        let again = resolver.named("UserParts").unwrap();
        assert!(Arc::ptr_eq(&fragment, &again));
    }

    #[test]
    fn test_missing_fragment_cached_negative() {
        let resolver = FragmentResolver::new(doc_with_fragment());
        assert!(resolver.named("Nope").is_none());
        assert!(resolver.named("Nope").is_none());
        let cache = resolver.named.read().unwrap();
        assert!(cache.contains_key("Nope"));
    }

    #[test]
    fn test_inline_fragment_inherits_parent_type() {
        let resolver = FragmentResolver::new(doc_with_fragment());
        let node = InlineFragmentNode {
            type_condition: None,
            directives: Vec::new(),
            selection_set: SelectionSet {
                selections: Vec::new(),
                span: Span::new(40, 42),
            },
            span: Span::new(35, 42),
        };
        let fragment = resolver.inline("Query", &node);
        assert_eq!(fragment.type_condition, "Query");

        let cached = resolver.inline("Query", &node);
        assert!(Arc::ptr_eq(&fragment, &cached));
    }
}
