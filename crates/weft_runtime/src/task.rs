//! Per-field resolver tasks for weft.
//!
//! Each field execution gets a `ResolverContext`: the merged selection, the
//! response path, the stack of ancestor source values, scoped data inherited
//! down the tree and a slot for the in-flight result. Contexts are rented
//! from a `ContextPool` and handed back once the field's value is
//! integrated, so deep queries do not allocate one context per field.

use crate::collect::FieldSelection;
use crate::error::{ErrorBag, FieldError, PathSegment};
use crate::executor::Context;
use crate::resolver::{ResolverError, ResolverOutcome};
use crate::schema::Schema;
use crate::variables::Variables;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A persistent response path.
///
/// Pushing returns a new path sharing its tail with the parent, so sibling
/// tasks never copy ancestor segments.
#[derive(Debug, Clone, Default)]
pub struct ResponsePath {
    node: Option<Arc<PathNode>>,
}

#[derive(Debug)]
struct PathNode {
    segment: PathSegment,
    parent: Option<Arc<PathNode>>,
}

impl ResponsePath {
    /// The empty path at the response root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Extends the path with a field's response name.
    pub fn push_field(&self, name: impl Into<String>) -> Self {
        self.push(PathSegment::Field(name.into()))
    }

    /// Extends the path with a list index.
    pub fn push_index(&self, index: usize) -> Self {
        self.push(PathSegment::Index(index))
    }

    fn push(&self, segment: PathSegment) -> Self {
        Self {
            node: Some(Arc::new(PathNode {
                segment,
                parent: self.node.clone(),
            })),
        }
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.node.is_none()
    }

    /// Materializes the path root-first.
    pub fn to_vec(&self) -> Vec<PathSegment> {
        let mut out = Vec::new();
        let mut cursor = self.node.as_deref();
        while let Some(node) = cursor {
            out.push(node.segment.clone());
            cursor = node.parent.as_deref();
        }
        out.reverse();
        out
    }
}

/// The stack of source values above the current field, innermost last.
#[derive(Debug, Clone, Default)]
pub struct SourceStack {
    node: Option<Arc<SourceNode>>,
}

#[derive(Debug)]
struct SourceNode {
    value: Value,
    parent: Option<Arc<SourceNode>>,
}

impl SourceStack {
    /// The empty stack at the operation root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Pushes a source value, returning the extended stack.
    pub fn push(&self, value: Value) -> Self {
        Self {
            node: Some(Arc::new(SourceNode {
                value,
                parent: self.node.clone(),
            })),
        }
    }

    /// The innermost source value, i.e. the current field's parent object.
    pub fn peek(&self) -> Option<&Value> {
        self.node.as_deref().map(|n| &n.value)
    }

    /// The source value `depth` levels up; `ancestor(0)` is `peek`.
    pub fn ancestor(&self, depth: usize) -> Option<&Value> {
        let mut cursor = self.node.as_deref();
        for _ in 0..depth {
            cursor = cursor?.parent.as_deref();
        }
        cursor.map(|n| &n.value)
    }
}

/// Immutable data a field inherits from its ancestors.
///
/// Writes create a new map shared with all descendants; siblings never see
/// each other's entries.
#[derive(Debug, Clone, Default)]
pub struct ScopedData {
    inherited: Arc<HashMap<String, Value>>,
}

impl ScopedData {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a scoped entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inherited.get(key)
    }

    /// Returns a child scope with one entry added.
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut map = (*self.inherited).clone();
        map.insert(key.into(), value);
        Self {
            inherited: Arc::new(map),
        }
    }
}

/// Lifecycle of a resolver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Resolving,
    Resolved,
    Completing,
    Integrated,
    Returned,
}

/// Everything a resolver can see while producing one field's value.
pub struct ResolverContext {
    object_type: String,
    selection: Option<Arc<FieldSelection>>,
    path: ResponsePath,
    source: SourceStack,
    scoped: ScopedData,
    local: Mutex<HashMap<String, Value>>,
    scoped_writes: Mutex<Vec<(String, Value)>>,
    request: Arc<Context>,
    schema: Arc<Schema>,
    variables: Arc<Variables>,
    errors: ErrorBag,
    state: TaskState,
    result: Mutex<Option<ResolverOutcome>>,
}

/// The per-field values a pooled context is initialized with.
pub struct TaskInit {
    pub object_type: String,
    pub selection: Arc<FieldSelection>,
    pub path: ResponsePath,
    pub source: SourceStack,
    pub scoped: ScopedData,
    pub request: Arc<Context>,
    pub schema: Arc<Schema>,
    pub variables: Arc<Variables>,
    pub errors: ErrorBag,
}

impl ResolverContext {
    fn empty() -> Self {
        Self {
            object_type: String::new(),
            selection: None,
            path: ResponsePath::root(),
            source: SourceStack::root(),
            scoped: ScopedData::new(),
            local: Mutex::new(HashMap::new()),
            scoped_writes: Mutex::new(Vec::new()),
            request: Arc::new(Context::new()),
            schema: Arc::new(Schema::new()),
            variables: Arc::new(Variables::new()),
            errors: ErrorBag::new(),
            state: TaskState::Created,
            result: Mutex::new(None),
        }
    }

    fn init(&mut self, init: TaskInit) {
        self.object_type = init.object_type;
        self.selection = Some(init.selection);
        self.path = init.path;
        self.source = init.source;
        self.scoped = init.scoped;
        self.request = init.request;
        self.schema = init.schema;
        self.variables = init.variables;
        self.errors = init.errors;
        self.state = TaskState::Created;
    }

    /// Resets per-field state before the context returns to the pool.
    fn clean(&mut self) {
        self.object_type.clear();
        self.selection = None;
        self.path = ResponsePath::root();
        self.source = SourceStack::root();
        self.scoped = ScopedData::new();
        if let Ok(mut local) = self.local.lock() {
            local.clear();
        }
        if let Ok(mut writes) = self.scoped_writes.lock() {
            writes.clear();
        }
        self.variables = Arc::new(Variables::new());
        self.errors = ErrorBag::new();
        if let Ok(mut result) = self.result.lock() {
            *result = None;
        }
        self.state = TaskState::Returned;
    }

    /// The concrete object type the field is being resolved on.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// The merged selection this task resolves.
    pub fn selection(&self) -> Option<&Arc<FieldSelection>> {
        self.selection.as_ref()
    }

    /// The schema field name (not the alias).
    pub fn field_name(&self) -> &str {
        self.selection
            .as_ref()
            .map(|s| s.field.name.as_str())
            .unwrap_or("")
    }

    /// The response path of this field.
    pub fn path(&self) -> &ResponsePath {
        &self.path
    }

    /// The request-wide context.
    pub fn request(&self) -> &Context {
        &self.request
    }

    /// The schema in effect.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The operation's variables.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// The current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    /// Reads an argument, deserialized into `T`.
    ///
    /// A coercion failure parked at collection time surfaces here, as does a
    /// variable that fails coercion at execution time.
    pub fn argument<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        let value = self.argument_value(name)?;
        serde_json::from_value(value).map_err(|e| ResolverError::InvalidArgument {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Reads an argument as a raw value.
    pub fn argument_value(&self, name: &str) -> Result<Value, ResolverError> {
        let selection = self
            .selection
            .as_ref()
            .ok_or_else(|| ResolverError::Internal("context not initialized".to_string()))?;
        let argument = selection
            .arguments
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))?;
        argument
            .resolve(&self.schema, &self.variables)
            .map_err(|e| ResolverError::InvalidArgument {
                name: name.to_string(),
                message: e.message,
            })
    }

    /// The parent object's resolved value, if any.
    pub fn parent_value(&self) -> Option<&Value> {
        self.source.peek()
    }

    /// The parent object deserialized into `T`.
    pub fn parent_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.source
            .peek()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The source value `depth` levels above the parent.
    pub fn ancestor(&self, depth: usize) -> Option<&Value> {
        self.source.ancestor(depth)
    }

    /// Data inherited from ancestor fields.
    pub fn scoped(&self) -> &ScopedData {
        &self.scoped
    }

    /// Adds a scoped entry visible to this field's descendants only.
    pub fn set_scoped(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut writes) = self.scoped_writes.lock() {
            writes.push((key.into(), value));
        }
    }

    /// The scope handed to sub-selections: inherited data plus any entries
    /// written during this field's resolution.
    pub(crate) fn child_scope(&self) -> ScopedData {
        let writes = match self.scoped_writes.lock() {
            Ok(writes) if !writes.is_empty() => writes.clone(),
            _ => return self.scoped.clone(),
        };
        let mut scope = self.scoped.clone();
        for (key, value) in writes {
            scope = scope.with(key, value);
        }
        scope
    }

    /// Reads a task-local entry.
    pub fn local(&self, key: &str) -> Option<Value> {
        self.local.lock().ok().and_then(|m| m.get(key).cloned())
    }

    /// Writes a task-local entry, visible to middleware around this field.
    pub fn set_local(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut local) = self.local.lock() {
            local.insert(key.into(), value);
        }
    }

    /// Reports a field error, attaching this field's path.
    pub fn report_error(&self, error: impl Into<FieldError>) {
        let mut error = error.into();
        if error.path.is_none() {
            error.path = Some(self.path.to_vec());
        }
        self.errors.report(error);
    }

    /// Stores the in-flight result, letting middleware short-circuit the
    /// stages after it.
    pub fn set_result(&self, outcome: ResolverOutcome) {
        if let Ok(mut result) = self.result.lock() {
            *result = Some(outcome);
        }
    }

    /// Takes the in-flight result, if one was stored.
    pub fn take_result(&self) -> Option<ResolverOutcome> {
        self.result.lock().ok().and_then(|mut r| r.take())
    }

    /// Peeks at the in-flight result if it is an error.
    pub fn result_if_error(&self) -> Option<ResolverOutcome> {
        let guard = self.result.lock().ok()?;
        match guard.as_ref() {
            Some(outcome) if outcome.is_error() => Some(outcome.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverContext")
            .field("object_type", &self.object_type)
            .field("field", &self.field_name())
            .field("state", &self.state)
            .finish()
    }
}

/// A bounded pool of resolver contexts.
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Box<ResolverContext>>>,
    capacity: usize,
}

impl ContextPool {
    /// Creates a pool retaining at most `capacity` idle contexts.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Rents a context, initialized for one field execution.
    pub fn rent(&self, init: TaskInit) -> Box<ResolverContext> {
        let mut ctx = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| Box::new(ResolverContext::empty()));
        ctx.init(init);
        ctx
    }

    /// Returns a context to the pool; dropped when the pool is full.
    pub fn hand_back(&self, mut ctx: Box<ResolverContext>) {
        ctx.clean();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.capacity {
                free.push(ctx);
            }
        }
    }

    /// Number of idle contexts currently held.
    pub fn idle(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}
