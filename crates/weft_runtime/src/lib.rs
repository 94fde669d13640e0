//! Runtime for weft.
//!
//! This crate provides the GraphQL execution runtime:
//! - `schema`: Schema definition and building
//! - `executor`: Query execution
//! - `collect`: Field collection and selection merging
//! - `fragments`: Fragment resolution
//! - `visibility`: `@skip`/`@include` evaluation
//! - `input`: Argument and input coercion
//! - `resolver`: Resolver registration
//! - `middleware`: Directive middleware
//! - `task`: Resolver contexts and pooling
//! - `batch`: Batch coordination and DataLoader
//! - `error`: Errors and response shapes
//! - `variables`: Operation variables

pub mod batch;
pub mod collect;
mod complete;
pub mod error;
pub mod executor;
pub mod fragments;
pub mod input;
pub mod middleware;
pub mod resolver;
pub mod schema;
pub mod task;
pub mod variables;
pub mod visibility;

pub use batch::{BatchCoordinator, BatchOperation, DataLoader};
pub use collect::{FieldCollector, FieldSelection, SelectionCache};
pub use error::{ErrorBag, FieldError, PathSegment, RequestError, Response};
pub use executor::{CancelSignal, Context, Executor, ExecutorConfig};
pub use fragments::{Fragment, FragmentResolver};
pub use input::ArgumentValue;
pub use middleware::{
    DirectiveHandler, DirectiveRegistry, FieldPipeline, MiddlewareCache, MiddlewareFuture, NextFn,
};
pub use resolver::{
    AsyncFnResolver, DefaultResolver, FnResolver, Resolver, ResolverError, ResolverMap,
    ResolverOutcome, ResolverResult,
};
pub use schema::{
    AppliedDirective, DirectiveDef, DirectiveLocation, EnumDef, EnumValueDef, FieldDef,
    InputObjectDef, InputValueDef, InterfaceDef, ObjectDef, ScalarDef, Schema, SchemaBuilder,
    TypeDef, TypeRef, UnionDef,
};
pub use task::{
    ContextPool, ResolverContext, ResponsePath, ScopedData, SourceStack, TaskInit, TaskState,
};
pub use variables::Variables;
pub use visibility::FieldVisibility;
