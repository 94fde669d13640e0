//! Runtime schema definition for weft.
//!
//! The execution core consumes the schema through type predicates, structural
//! navigation and field/argument lookup; `SchemaBuilder` is how a schema is
//! put together programmatically (SDL parsing is out of scope).

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Type reference.
///
/// Named and list types are nullable by default; `NonNull` wraps them, as in
/// GraphQL's type grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Returns true if this type is wrapped in non-null.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Returns true if this type, after stripping non-null, is a list.
    pub fn is_list(&self) -> bool {
        matches!(self.inner(), Self::List(_))
    }

    /// Strips one level of non-null wrapping.
    pub fn inner(&self) -> &TypeRef {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }

    /// Returns the element type of a list, looking through non-null.
    pub fn element(&self) -> Option<&TypeRef> {
        match self.inner() {
            Self::List(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Custom scalar serialization hook: raw resolver value to wire value.
pub type ScalarSerializeFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Custom scalar parse hook: input value to runtime value.
pub type ScalarParseFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Runtime type resolution for abstract types: raw value to concrete object
/// type name.
pub type TypeResolverFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A type definition.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    /// Returns the type's name.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => &def.name,
            Self::Object(def) => &def.name,
            Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    /// Returns true for object, interface and union types.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }

    /// Returns true for interface and union types.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Returns true for scalar and enum types.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }
}

/// Scalar type definition.
#[derive(Clone)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    /// Custom serialization; built-in coercion applies when absent.
    pub serialize: Option<ScalarSerializeFn>,
    /// Custom input parsing; built-in coercion applies when absent.
    pub parse: Option<ScalarParseFn>,
}

impl ScalarDef {
    /// Creates a scalar with built-in coercion.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            serialize: None,
            parse: None,
        }
    }

    /// Sets the custom serialize hook.
    pub fn with_serialize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(f));
        self
    }

    /// Sets the custom parse hook.
    pub fn with_parse<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ScalarDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarDef")
            .field("name", &self.name)
            .field("custom_serialize", &self.serialize.is_some())
            .field("custom_parse", &self.parse.is_some())
            .finish()
    }
}

/// Object type definition.
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Interface type definition.
#[derive(Debug, Clone)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Union type definition.
#[derive(Debug, Clone)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

/// Enum type definition.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

impl EnumDef {
    /// Returns true if `name` is one of this enum's values.
    pub fn has_value(&self, name: &str) -> bool {
        self.values.iter().any(|v| v.name == name)
    }
}

/// Enum value definition.
#[derive(Debug, Clone)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

impl EnumValueDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            deprecated: false,
            deprecation_reason: None,
        }
    }
}

/// Input object type definition.
#[derive(Debug, Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDef>,
}

/// Field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDef>,
    /// Executable directives applied in the schema, outermost first.
    pub directives: Vec<AppliedDirective>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

impl FieldDef {
    /// Creates a field with no arguments or directives.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            directives: Vec::new(),
            deprecated: false,
            deprecation_reason: None,
        }
    }

    /// Adds an argument definition.
    pub fn with_argument(mut self, argument: InputValueDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Adds an applied executable directive.
    pub fn with_directive(mut self, directive: AppliedDirective) -> Self {
        self.directives.push(directive);
        self
    }
}

/// Input value definition (arguments, input fields).
#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl InputValueDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// A directive instance applied in the schema, arguments already constant.
#[derive(Debug, Clone)]
pub struct AppliedDirective {
    pub name: String,
    pub arguments: IndexMap<String, Value>,
}

impl AppliedDirective {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }
}

/// Directive definition.
#[derive(Debug, Clone)]
pub struct DirectiveDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, InputValueDef>,
    pub locations: Vec<DirectiveLocation>,
    pub repeatable: bool,
}

/// Directive location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Subscription,
    Field,
    FragmentDefinition,
    FragmentSpread,
    InlineFragment,
    VariableDefinition,
    FieldDefinition,
}

/// A GraphQL schema.
///
/// Immutable once built; shared across requests behind an `Arc`.
#[derive(Clone, Default)]
pub struct Schema {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: IndexMap<String, TypeDef>,
    pub directives: IndexMap<String, DirectiveDef>,
    type_resolvers: FxHashMap<String, TypeResolverFn>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Gets an object type by name.
    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::Object(def)) => Some(def),
            _ => None,
        }
    }

    /// Gets a scalar type by name.
    pub fn scalar(&self, name: &str) -> Option<&ScalarDef> {
        match self.types.get(name) {
            Some(TypeDef::Scalar(def)) => Some(def),
            _ => None,
        }
    }

    /// Gets an input object type by name.
    pub fn input_object(&self, name: &str) -> Option<&InputObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::InputObject(def)) => Some(def),
            _ => None,
        }
    }

    /// Looks up a field on an object or interface type.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        match self.types.get(type_name)? {
            TypeDef::Object(def) => def.fields.get(field_name),
            TypeDef::Interface(def) => def.fields.get(field_name),
            _ => None,
        }
    }

    /// Returns true if the named type is a scalar or enum.
    pub fn is_leaf(&self, name: &str) -> bool {
        self.types.get(name).map(TypeDef::is_leaf).unwrap_or(false)
    }

    /// Returns true if the named type is an interface or union.
    pub fn is_abstract(&self, name: &str) -> bool {
        self.types
            .get(name)
            .map(TypeDef::is_abstract)
            .unwrap_or(false)
    }

    /// Returns true if a fragment with the given type condition applies to a
    /// concrete object type: exact match for objects, implements check for
    /// interfaces, membership check for unions. Unknown conditions apply to
    /// nothing.
    pub fn fragment_applies(&self, condition: &str, object_type: &str) -> bool {
        if condition == object_type {
            return true;
        }
        match self.types.get(condition) {
            Some(TypeDef::Interface(_)) => self
                .object(object_type)
                .map(|o| o.implements.iter().any(|i| i == condition))
                .unwrap_or(false),
            Some(TypeDef::Union(def)) => def.members.iter().any(|m| m == object_type),
            _ => false,
        }
    }

    /// Resolves the concrete object type for a value of an abstract type.
    ///
    /// A registered type resolver takes precedence; otherwise the value's
    /// `__typename` discriminator is consulted. The resolved name must be an
    /// object type to which the abstract type's condition applies.
    pub fn resolve_abstract(&self, abstract_type: &str, value: &Value) -> Option<String> {
        let candidate = match self.type_resolvers.get(abstract_type) {
            Some(resolver) => resolver(value)?,
            None => value.get("__typename")?.as_str()?.to_string(),
        };
        if self.object(&candidate).is_some() && self.fragment_applies(abstract_type, &candidate) {
            Some(candidate)
        } else {
            None
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("subscription_type", &self.subscription_type)
            .field("type_count", &self.types.len())
            .field("directive_count", &self.directives.len())
            .finish()
    }
}

/// Schema builder.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Creates a new schema builder with built-in scalars and the
    /// `@skip`/`@include` directives pre-registered.
    pub fn new() -> Self {
        let mut builder = Self::default();
        for name in ["Int", "Float", "String", "Boolean", "ID"] {
            builder.schema.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: Some(format!("Built-in {name} scalar")),
                    serialize: None,
                    parse: None,
                }),
            );
        }
        for name in ["skip", "include"] {
            let mut arguments = IndexMap::new();
            arguments.insert(
                "if".to_string(),
                InputValueDef::new("if", TypeRef::non_null(TypeRef::named("Boolean"))),
            );
            builder.schema.directives.insert(
                name.to_string(),
                DirectiveDef {
                    name: name.to_string(),
                    description: None,
                    arguments,
                    locations: vec![
                        DirectiveLocation::Field,
                        DirectiveLocation::FragmentSpread,
                        DirectiveLocation::InlineFragment,
                    ],
                    repeatable: false,
                },
            );
        }
        builder
    }

    /// Sets the query root type.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.schema.query_type = Some(name.into());
        self
    }

    /// Sets the mutation root type.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.schema.mutation_type = Some(name.into());
        self
    }

    /// Sets the subscription root type.
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.schema.subscription_type = Some(name.into());
        self
    }

    /// Adds a type.
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    /// Adds a directive definition.
    pub fn add_directive(mut self, directive: DirectiveDef) -> Self {
        self.schema
            .directives
            .insert(directive.name.clone(), directive);
        self
    }

    /// Registers a runtime type resolver for an abstract type.
    pub fn type_resolver<F>(mut self, abstract_type: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.schema
            .type_resolvers
            .insert(abstract_type.into(), Arc::new(resolver));
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_animals() -> Schema {
        let mut cat_fields = IndexMap::new();
        cat_fields.insert(
            "name".to_string(),
            FieldDef::new("name", TypeRef::named("String")),
        );
        SchemaBuilder::new()
            .query_type("Query")
            .add_type(TypeDef::Interface(InterfaceDef {
                name: "Animal".to_string(),
                description: None,
                fields: IndexMap::new(),
                implements: Vec::new(),
            }))
            .add_type(TypeDef::Object(ObjectDef {
                name: "Cat".to_string(),
                description: None,
                fields: cat_fields,
                implements: vec!["Animal".to_string()],
            }))
            .add_type(TypeDef::Object(ObjectDef {
                name: "Dog".to_string(),
                description: None,
                fields: IndexMap::new(),
                implements: vec!["Animal".to_string()],
            }))
            .add_type(TypeDef::Union(UnionDef {
                name: "Pet".to_string(),
                description: None,
                members: vec!["Cat".to_string(), "Dog".to_string()],
            }))
            .build()
    }

    #[test]
    fn test_type_ref_navigation() {
        let ty = TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("User"))));
        assert!(ty.is_non_null());
        assert!(ty.is_list());
        assert_eq!(ty.named_type(), "User");
        assert_eq!(ty.to_string(), "[User!]!");

        let element = ty.element().unwrap();
        assert!(element.is_non_null());
        assert_eq!(element.inner(), &TypeRef::named("User"));
    }

    #[test]
    fn test_builtin_scalars_registered() {
        let schema = SchemaBuilder::new().build();
        for name in ["Int", "Float", "String", "Boolean", "ID"] {
            assert!(schema.scalar(name).is_some(), "missing scalar {name}");
        }
        assert!(schema.directives.contains_key("skip"));
        assert!(schema.directives.contains_key("include"));
    }

    #[test]
    fn test_fragment_applies() {
        let schema = schema_with_animals();
        assert!(schema.fragment_applies("Cat", "Cat"));
        assert!(!schema.fragment_applies("Cat", "Dog"));
        assert!(schema.fragment_applies("Animal", "Cat"));
        assert!(schema.fragment_applies("Pet", "Dog"));
        assert!(!schema.fragment_applies("Ghost", "Cat"));
    }

    #[test]
    fn test_resolve_abstract_via_typename() {
        let schema = schema_with_animals();
        let value = serde_json::json!({"__typename": "Cat", "name": "Momo"});
        assert_eq!(
            schema.resolve_abstract("Animal", &value),
            Some("Cat".to_string())
        );

        let unknown = serde_json::json!({"__typename": "Fish"});
        assert_eq!(schema.resolve_abstract("Animal", &unknown), None);
    }

    #[test]
    fn test_resolve_abstract_via_registered_resolver() {
        let mut cat_fields = IndexMap::new();
        cat_fields.insert(
            "name".to_string(),
            FieldDef::new("name", TypeRef::named("String")),
        );
        let schema = SchemaBuilder::new()
            .add_type(TypeDef::Interface(InterfaceDef {
                name: "Animal".to_string(),
                description: None,
                fields: IndexMap::new(),
                implements: Vec::new(),
            }))
            .add_type(TypeDef::Object(ObjectDef {
                name: "Cat".to_string(),
                description: None,
                fields: cat_fields,
                implements: vec!["Animal".to_string()],
            }))
            .type_resolver("Animal", |value| {
                value.get("meows").and_then(Value::as_bool).and_then(|m| {
                    if m {
                        Some("Cat".to_string())
                    } else {
                        None
                    }
                })
            })
            .build();

        let cat = serde_json::json!({"meows": true});
        assert_eq!(
            schema.resolve_abstract("Animal", &cat),
            Some("Cat".to_string())
        );
        let silent = serde_json::json!({"meows": false});
        assert_eq!(schema.resolve_abstract("Animal", &silent), None);
    }
}
