//! Directive middleware for weft.
//!
//! Executable directives other than `@skip`/`@include` run as an onion
//! around the field's resolver: type-system directives from the field
//! definition first, then query directives in document order. Each handler
//! receives a `next` continuation; not calling it short-circuits the field.

use crate::input::literal_to_value;
use crate::resolver::{Resolver, ResolverFuture};
use crate::schema::{AppliedDirective, FieldDef};
use crate::task::ResolverContext;
use crate::variables::Variables;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use weft_syntax::{DirectiveNode, ValueNode};

/// Future returned by a middleware stage.
pub type MiddlewareFuture<'a> = ResolverFuture<'a>;

/// The continuation to the next stage (ultimately the resolver).
pub type NextFn<'a> = Box<dyn FnOnce() -> MiddlewareFuture<'a> + Send + 'a>;

/// A directive's runtime behavior.
///
/// Handlers are registered as shared `Arc`s and receive their compiled
/// arguments the same way, so the returned future owns everything it
/// captures except the resolver context it runs against.
pub trait DirectiveHandler: Send + Sync {
    fn invoke<'a>(
        self: Arc<Self>,
        arguments: Arc<IndexMap<String, Value>>,
        ctx: &'a ResolverContext,
        next: NextFn<'a>,
    ) -> MiddlewareFuture<'a>;
}

struct Registration {
    handler: Arc<dyn DirectiveHandler>,
    repeatable: bool,
}

/// Registry of directive handlers, keyed by directive name.
#[derive(Default)]
pub struct DirectiveRegistry {
    handlers: HashMap<String, Registration>,
}

impl DirectiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. `repeatable` controls whether several
    /// applications of the directive stack or the last one wins.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        repeatable: bool,
        handler: Arc<dyn DirectiveHandler>,
    ) {
        self.handlers
            .insert(name.into(), Registration { handler, repeatable });
    }

    fn get(&self, name: &str) -> Option<&Registration> {
        self.handlers.get(name)
    }

    /// Returns true if a handler is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl std::fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveRegistry")
            .field("registered", &self.handlers.len())
            .finish()
    }
}

/// One compiled stage: a directive application bound to its handler.
#[derive(Clone)]
pub struct PipelineStage {
    pub directive: String,
    pub arguments: Arc<IndexMap<String, Value>>,
    handler: Arc<dyn DirectiveHandler>,
}

/// The middleware chain compiled for one field selection.
#[derive(Clone, Default)]
pub struct FieldPipeline {
    stages: Vec<PipelineStage>,
}

impl FieldPipeline {
    /// A pipeline with no stages; the resolver runs directly.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Compiles the chain for a field: pre-compiled type-system stages
    /// first (see `compile_type_system` and `MiddlewareCache`), then query
    /// directives in document order. `@skip`/`@include` and directives
    /// without a handler are not stages. A non-repeatable directive applied
    /// again replaces its earlier stage and moves to the new position.
    pub fn compile_with_stages(
        registry: &DirectiveRegistry,
        type_system: &[PipelineStage],
        query_directives: &[DirectiveNode],
        variables: &Variables,
    ) -> Arc<Self> {
        let mut stages: Vec<PipelineStage> = type_system.to_vec();
        for node in query_directives {
            let name = node.name.as_str();
            if matches!(name, "skip" | "include") {
                continue;
            }
            let Some(registration) = registry.get(name) else {
                continue;
            };
            if !registration.repeatable {
                stages.retain(|s| s.directive != name);
            }
            stages.push(PipelineStage {
                directive: name.to_string(),
                arguments: Arc::new(node_arguments(node, variables)),
                handler: registration.handler.clone(),
            });
        }
        Arc::new(Self { stages })
    }

    /// Compiles only the schema-applied half, for caching across executions.
    pub fn compile_type_system(
        registry: &DirectiveRegistry,
        applied: &[AppliedDirective],
    ) -> Vec<PipelineStage> {
        let mut stages: Vec<PipelineStage> = Vec::new();
        for directive in applied {
            if matches!(directive.name.as_str(), "skip" | "include") {
                continue;
            }
            let Some(registration) = registry.get(&directive.name) else {
                continue;
            };
            if !registration.repeatable {
                stages.retain(|s| s.directive != directive.name);
            }
            stages.push(PipelineStage {
                directive: directive.name.clone(),
                arguments: Arc::new(directive.arguments.clone()),
                handler: registration.handler.clone(),
            });
        }
        stages
    }

    /// Number of compiled stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the chain around `base`, the field's resolver.
    ///
    /// An error already parked on the context short-circuits the remaining
    /// stages; a value stored by a stage replaces the resolver's output.
    pub fn invoke<'a>(
        self: Arc<Self>,
        ctx: &'a ResolverContext,
        base: Arc<dyn Resolver>,
    ) -> MiddlewareFuture<'a> {
        self.invoke_at(0, ctx, base)
    }

    fn invoke_at<'a>(
        self: Arc<Self>,
        index: usize,
        ctx: &'a ResolverContext,
        base: Arc<dyn Resolver>,
    ) -> MiddlewareFuture<'a> {
        if let Some(outcome) = ctx.result_if_error() {
            return Box::pin(async move { outcome });
        }
        match self.stages.get(index) {
            Some(stage) => {
                let handler = stage.handler.clone();
                let arguments = stage.arguments.clone();
                let next: NextFn<'a> = Box::new(move || self.invoke_at(index + 1, ctx, base));
                handler.invoke(arguments, ctx, next)
            }
            None => Box::pin(async move {
                if let Some(outcome) = ctx.take_result() {
                    return outcome;
                }
                base.resolve(ctx).await
            }),
        }
    }
}

impl std::fmt::Debug for FieldPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.directive.as_str()).collect();
        f.debug_struct("FieldPipeline").field("stages", &names).finish()
    }
}

fn node_arguments(node: &DirectiveNode, variables: &Variables) -> IndexMap<String, Value> {
    let mut out = IndexMap::with_capacity(node.arguments.len());
    for argument in &node.arguments {
        let value = match &argument.value {
            ValueNode::Variable(name) => variables
                .try_get(name.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            literal => literal_to_value(literal).unwrap_or(Value::Null),
        };
        out.insert(argument.name.as_str().to_string(), value);
    }
    out
}

/// Schema-lifetime cache for type-system directive stages, keyed by
/// `(type, field)`.
#[derive(Default)]
pub struct MiddlewareCache {
    stages: RwLock<FxHashMap<(String, String), Arc<Vec<PipelineStage>>>>,
}

impl MiddlewareCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or compiles the type-system stages for a field.
    pub fn type_system_stages(
        &self,
        registry: &DirectiveRegistry,
        type_name: &str,
        field_def: &FieldDef,
    ) -> Arc<Vec<PipelineStage>> {
        let key = (type_name.to_string(), field_def.name.clone());
        if let Ok(cache) = self.stages.read() {
            if let Some(stages) = cache.get(&key) {
                return stages.clone();
            }
        }
        let stages = Arc::new(FieldPipeline::compile_type_system(
            registry,
            &field_def.directives,
        ));
        if let Ok(mut cache) = self.stages.write() {
            cache.entry(key).or_insert_with(|| stages.clone());
        }
        stages
    }
}
