//! Query execution for weft.
//!
//! The `Executor` ties a schema, a resolver map and a directive registry
//! together and runs operations against them. Sibling fields of a query
//! execute concurrently under a semaphore cap; mutation root fields run one
//! after another. A `CancelSignal` stops further resolver work mid-flight,
//! leaving already-resolved fields in place and the rest null.

use crate::collect::{FieldCollector, FieldSelection, SelectionCache};
use crate::complete::{complete_outcome, CompletionScope};
use crate::error::{ErrorBag, FieldError, RequestError, Response};
use crate::fragments::FragmentResolver;
use crate::input::literal_to_value;
use crate::middleware::{DirectiveRegistry, MiddlewareCache};
use crate::resolver::ResolverMap;
use crate::schema::Schema;
use crate::task::{ContextPool, ResponsePath, ScopedData, SourceStack, TaskInit, TaskState};
use crate::variables::Variables;
use futures::future::join_all;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use weft_syntax::{Document, OperationDefinition, OperationKind, SelectionSet};

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on resolvers running at once within one operation.
    pub max_concurrent_fields: usize,
    /// Idle resolver contexts retained for reuse.
    pub context_pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fields: 64,
            context_pool_size: 64,
        }
    }
}

/// Request-scoped context shared by every resolver of one execution.
///
/// Carries loose key/value data plus typed services looked up by their Rust
/// type.
#[derive(Default)]
pub struct Context {
    data: HashMap<String, Value>,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data entry.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Looks up a data entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Registers a typed service.
    pub fn with_service<T: Send + Sync + 'static>(mut self, service: T) -> Self {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    /// Looks up a typed service.
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|s| s.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("data_keys", &self.data.len())
            .field("services", &self.services.len())
            .finish()
    }
}

/// Cooperative cancellation for an in-flight execution.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Creates an un-cancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; fields not yet started resolve to null.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Everything one execution carries: schema, caches, variables, errors.
pub(crate) struct ExecutionContext {
    pub(crate) schema: Arc<Schema>,
    pub(crate) resolvers: Arc<ResolverMap>,
    pub(crate) registry: Arc<DirectiveRegistry>,
    pub(crate) middleware: Arc<MiddlewareCache>,
    pub(crate) pool: Arc<ContextPool>,
    pub(crate) fragments: FragmentResolver,
    pub(crate) cache: SelectionCache,
    pub(crate) variables: Arc<Variables>,
    pub(crate) request: Arc<Context>,
    pub(crate) errors: ErrorBag,
    pub(crate) cancel: CancelSignal,
    pub(crate) semaphore: Arc<Semaphore>,
    abort: Mutex<Option<RequestError>>,
}

impl ExecutionContext {
    /// Records a request-aborting error; the first one wins.
    pub(crate) fn set_abort(&self, error: RequestError) {
        if let Ok(mut abort) = self.abort.lock() {
            abort.get_or_insert(error);
        }
    }

    fn take_abort(&self) -> Option<RequestError> {
        self.abort.lock().ok().and_then(|mut a| a.take())
    }
}

/// Executes an object type's selection set, returning the assembled object
/// and whether a non-null violation is still bubbling.
pub(crate) fn execute_selection_set<'a>(
    exec: &'a ExecutionContext,
    object_type: &'a str,
    selection_set: &'a SelectionSet,
    scope: CompletionScope,
    serial: bool,
) -> Pin<Box<dyn Future<Output = (Value, bool)> + Send + 'a>> {
    Box::pin(async move {
        let collector = FieldCollector::new(
            &exec.schema,
            &exec.fragments,
            &exec.registry,
            &exec.middleware,
            &exec.variables,
            &exec.cache,
        );
        let fields = match collector.collect(object_type, selection_set) {
            Ok(fields) => fields,
            Err(error) => {
                exec.set_abort(error);
                return (Value::Null, true);
            }
        };

        let mut object = serde_json::Map::with_capacity(fields.len());
        let mut errored = false;
        if serial {
            for selection in fields.iter() {
                let (name, value, violated) =
                    execute_field(exec, object_type, selection.clone(), scope.clone()).await;
                errored |= violated;
                object.insert(name, value);
            }
        } else {
            let tasks: Vec<_> = fields
                .iter()
                .map(|selection| {
                    execute_field(exec, object_type, selection.clone(), scope.clone())
                })
                .collect();
            for (name, value, violated) in join_all(tasks).await {
                errored |= violated;
                object.insert(name, value);
            }
        }

        if errored {
            (Value::Null, true)
        } else {
            (Value::Object(object), false)
        }
    })
}

/// Resolves and completes one collected field.
async fn execute_field(
    exec: &ExecutionContext,
    object_type: &str,
    selection: Arc<FieldSelection>,
    scope: CompletionScope,
) -> (String, Value, bool) {
    let response_name = selection.response_name.clone();
    if exec.cancel.is_cancelled() {
        return (response_name, Value::Null, false);
    }
    if selection.is_typename() {
        return (
            response_name,
            Value::String(object_type.to_string()),
            false,
        );
    }

    let path = scope.path.push_field(response_name.as_str());

    // the permit caps resolver concurrency only; completion recurses into
    // child fields that take their own permits
    let permit = exec.semaphore.clone().acquire_owned().await.ok();
    let mut ctx = exec.pool.rent(TaskInit {
        object_type: object_type.to_string(),
        selection: selection.clone(),
        path: path.clone(),
        source: scope.source.clone(),
        scoped: scope.scoped.clone(),
        request: exec.request.clone(),
        schema: exec.schema.clone(),
        variables: exec.variables.clone(),
        errors: exec.errors.clone(),
    });

    ctx.set_state(TaskState::Resolving);
    let resolver = exec.resolvers.get(object_type, &selection.field.name);
    let outcome = selection.pipeline.clone().invoke(&ctx, resolver).await;
    ctx.set_state(TaskState::Resolved);
    drop(permit);

    ctx.set_state(TaskState::Completing);
    let child_scope = CompletionScope {
        path,
        source: scope.source.clone(),
        scoped: ctx.child_scope(),
    };
    let (value, errored) =
        complete_outcome(exec, object_type, &selection, child_scope, outcome).await;
    ctx.set_state(TaskState::Integrated);
    exec.pool.hand_back(ctx);

    // a nullable field absorbs the bubble; a non-null one passes it up
    let violated = errored && selection.ty().is_non_null();
    (response_name, value, violated)
}

/// The execution engine.
pub struct Executor {
    config: ExecutorConfig,
    schema: Arc<Schema>,
    resolvers: Arc<ResolverMap>,
    registry: Arc<DirectiveRegistry>,
    middleware: Arc<MiddlewareCache>,
    pool: Arc<ContextPool>,
}

impl Executor {
    /// Creates an executor with the default configuration.
    pub fn new(schema: Schema, resolvers: ResolverMap) -> Self {
        Self::with_config(schema, resolvers, ExecutorConfig::default())
    }

    /// Creates an executor with an explicit configuration.
    pub fn with_config(schema: Schema, resolvers: ResolverMap, config: ExecutorConfig) -> Self {
        let pool = Arc::new(ContextPool::new(config.context_pool_size));
        Self {
            config,
            schema: Arc::new(schema),
            resolvers: Arc::new(resolvers),
            registry: Arc::new(DirectiveRegistry::new()),
            middleware: Arc::new(MiddlewareCache::new()),
            pool,
        }
    }

    /// Installs the directive middleware registry.
    pub fn with_directives(mut self, registry: DirectiveRegistry) -> Self {
        self.registry = Arc::new(registry);
        self.middleware = Arc::new(MiddlewareCache::new());
        self
    }

    /// Executes an operation from the document.
    pub async fn execute(
        &self,
        document: Arc<Document>,
        operation_name: Option<&str>,
        variables: Variables,
        request: Context,
    ) -> Response {
        self.execute_cancellable(
            document,
            operation_name,
            variables,
            request,
            CancelSignal::new(),
        )
        .await
    }

    /// Executes an operation with an external cancellation signal.
    pub async fn execute_cancellable(
        &self,
        document: Arc<Document>,
        operation_name: Option<&str>,
        variables: Variables,
        request: Context,
        cancel: CancelSignal,
    ) -> Response {
        let operation = match select_operation(&document, operation_name) {
            Ok(operation) => operation,
            Err(error) => {
                warn!(%error, "operation selection failed");
                return Response::error(FieldError::from(error));
            }
        };
        let root_type = match self.root_type(operation.kind) {
            Ok(root_type) => root_type.to_string(),
            Err(error) => {
                warn!(%error, "missing root type");
                return Response::error(FieldError::from(error));
            }
        };
        debug!(
            operation = operation.name.as_ref().map(|n| n.as_str()).unwrap_or("<anonymous>"),
            kind = ?operation.kind,
            root = %root_type,
            "executing operation"
        );

        let variables = apply_variable_defaults(operation, variables);
        let exec = ExecutionContext {
            schema: self.schema.clone(),
            resolvers: self.resolvers.clone(),
            registry: self.registry.clone(),
            middleware: self.middleware.clone(),
            pool: self.pool.clone(),
            fragments: FragmentResolver::new(document.clone()),
            cache: SelectionCache::new(),
            variables: Arc::new(variables),
            request: Arc::new(request),
            errors: ErrorBag::new(),
            cancel,
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrent_fields)),
            abort: Mutex::new(None),
        };

        let scope = CompletionScope {
            path: ResponsePath::root(),
            source: SourceStack::root(),
            scoped: ScopedData::new(),
        };
        let serial = operation.kind == OperationKind::Mutation;
        let (data, _) =
            execute_selection_set(&exec, &root_type, &operation.selection_set, scope, serial)
                .await;

        if let Some(error) = exec.take_abort() {
            return Response::error(FieldError::from(error));
        }
        Response::partial(data, exec.errors.snapshot())
    }

    fn root_type(&self, kind: OperationKind) -> Result<&str, RequestError> {
        let (slot, label) = match kind {
            OperationKind::Query => (&self.schema.query_type, "query"),
            OperationKind::Mutation => (&self.schema.mutation_type, "mutation"),
            OperationKind::Subscription => (&self.schema.subscription_type, "subscription"),
        };
        slot.as_deref()
            .ok_or_else(|| RequestError::MissingRootType(label.to_string()))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("schema", &self.schema)
            .finish()
    }
}

fn select_operation<'a>(
    document: &'a Document,
    name: Option<&str>,
) -> Result<&'a OperationDefinition, RequestError> {
    match name {
        Some(name) => document
            .operations()
            .find(|op| op.name.as_ref().is_some_and(|n| n.as_str() == name))
            .ok_or_else(|| RequestError::UnknownOperationName(name.to_string())),
        None => {
            let mut operations = document.operations();
            let first = operations.next().ok_or(RequestError::NoOperationProvided)?;
            if operations.next().is_some() {
                return Err(RequestError::MultipleOperationsProvided);
            }
            Ok(first)
        }
    }
}

/// Fills in defaults declared on the operation's variable definitions for
/// variables the caller did not supply.
fn apply_variable_defaults(operation: &OperationDefinition, mut variables: Variables) -> Variables {
    for definition in &operation.variable_definitions {
        if variables.contains(definition.name.as_str()) {
            continue;
        }
        if let Some(default) = &definition.default_value {
            if let Ok(value) = literal_to_value(default) {
                variables.insert(definition.name.as_str(), value);
            }
        }
    }
    variables
}
