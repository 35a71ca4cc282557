//! Schema definition.
//!
//! A schema is assembled with [`SchemaBuilder`] and frozen by
//! [`SchemaBuilder::build`]. The built [`Schema`] exposes no mutating API,
//! so compiled plans can hold on to its field definitions for as long as
//! they live.

use crate::broadcast::Broadcaster;
use crate::error::SchemaError;
use crate::resolver::{IdentityResolver, PropertyResolver, Resolver};
use indexmap::IndexMap;
use serde_json::Value;
use shapeql_syntax::OperationKind;
use std::fmt;
use std::sync::Arc;

/// A reference to a type.
///
/// Output fields are always nullable. Whether an argument may be omitted is
/// recorded on [`InputFieldDef::required`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// The named type at the bottom of any list wrappers.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) => inner.base_name(),
        }
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int,
    Float,
    String,
    Boolean,
    Id,
}

impl ScalarType {
    pub const ALL: [Self; 5] = [Self::Int, Self::Float, Self::String, Self::Boolean, Self::Id];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Id => "ID",
        }
    }
}

/// An argument or input object field.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub required: bool,
    pub default_value: Option<Value>,
}

impl InputFieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            required: false,
            default_value: None,
        }
    }

    /// Marks the value as one the caller must supply.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Type as written in a request, e.g. `String!`.
    pub fn type_display(&self) -> String {
        if self.required {
            format!("{}!", self.ty)
        } else {
            self.ty.to_string()
        }
    }
}

/// A field of an object type.
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputFieldDef>,
    pub resolver: Arc<dyn Resolver>,
    /// Channel feeding this field when it is a subscription root field.
    pub event_source: Option<Broadcaster<Value>>,
}

impl FieldDef {
    /// Creates a field that reads the property of the same name from its
    /// source object.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        Self {
            resolver: Arc::new(PropertyResolver::new(name.clone())),
            name,
            description: None,
            ty,
            arguments: IndexMap::new(),
            event_source: None,
        }
    }

    #[must_use]
    pub fn argument(mut self, argument: InputFieldDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Feeds the field from `source`. Each published event becomes the
    /// field's value; a later [`FieldDef::resolver`] call can replace that.
    #[must_use]
    pub fn event_source(mut self, source: Broadcaster<Value>) -> Self {
        self.event_source = Some(source);
        self.resolver = Arc::new(IdentityResolver);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("arguments", &self.arguments)
            .field("event_source", &self.event_source.is_some())
            .finish_non_exhaustive()
    }
}

/// An object type.
#[derive(Debug)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, Arc<FieldDef>>,
}

impl ObjectDef {
    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef>> {
        self.fields.get(name)
    }
}

/// An input object type.
#[derive(Debug)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldDef>,
}

/// A type definition.
#[derive(Debug)]
pub enum TypeDef {
    Scalar(ScalarType),
    Object(ObjectDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(scalar) => scalar.name(),
            Self::Object(object) => &object.name,
            Self::InputObject(input) => &input.name,
        }
    }

    pub const fn is_output(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Object(_))
    }

    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::InputObject(_))
    }
}

/// A frozen schema.
#[derive(Debug)]
pub struct Schema {
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: IndexMap<String, TypeDef>,
}

impl Schema {
    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub fn input_object(&self, name: &str) -> Option<&InputObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::InputObject(input)) => Some(input),
            _ => None,
        }
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&Arc<FieldDef>> {
        self.object(type_name).and_then(|object| object.field(field_name))
    }

    /// Root type serving operations of `kind`.
    pub fn root_type(&self, kind: OperationKind) -> Option<&ObjectDef> {
        let name = match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }?;
        self.object(name)
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    pub fn subscription_type(&self) -> Option<&str> {
        self.subscription_type.as_deref()
    }

    /// Returns all types.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDef)> {
        self.types.iter()
    }
}

/// Schema builder.
#[derive(Debug)]
pub struct SchemaBuilder {
    query_type: String,
    mutation_type: String,
    subscription_type: String,
    types: IndexMap<String, TypeDef>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a new schema builder with the built-in scalars registered.
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        for scalar in ScalarType::ALL {
            types.insert(scalar.name().to_string(), TypeDef::Scalar(scalar));
        }
        Self {
            query_type: "Query".to_string(),
            mutation_type: "Mutation".to_string(),
            subscription_type: "Subscription".to_string(),
            types,
        }
    }

    /// Overrides the name of the root query type.
    #[must_use]
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = name.into();
        self
    }

    #[must_use]
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = name.into();
        self
    }

    #[must_use]
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = name.into();
        self
    }

    /// Declares a new object type.
    pub fn add_type(&mut self, name: impl Into<String>) -> Result<ObjectTypeBuilder<'_>, SchemaError> {
        let name = name.into();
        let slot = self.declare(name.clone(), |name| {
            TypeDef::Object(ObjectDef {
                name,
                description: None,
                fields: IndexMap::new(),
            })
        })?;
        match slot {
            TypeDef::Object(object) => Ok(ObjectTypeBuilder { object }),
            _ => Err(SchemaError::DuplicateType(name)),
        }
    }

    /// Declares a new input object type.
    pub fn add_input_type(
        &mut self,
        name: impl Into<String>,
    ) -> Result<InputTypeBuilder<'_>, SchemaError> {
        let name = name.into();
        let slot = self.declare(name.clone(), |name| {
            TypeDef::InputObject(InputObjectDef {
                name,
                description: None,
                fields: IndexMap::new(),
            })
        })?;
        match slot {
            TypeDef::InputObject(input) => Ok(InputTypeBuilder { input }),
            _ => Err(SchemaError::DuplicateType(name)),
        }
    }

    /// Adds a field to an object type declared earlier.
    pub fn add_field(
        &mut self,
        type_name: &str,
        field: FieldDef,
    ) -> Result<&mut Self, SchemaError> {
        match self.types.get_mut(type_name) {
            Some(TypeDef::Object(object)) => insert_field(object, field)?,
            _ => {
                return Err(SchemaError::UnknownType {
                    type_name: type_name.to_string(),
                    referenced_by: format!("{type_name}.{}", field.name),
                })
            }
        }
        Ok(self)
    }

    fn declare(
        &mut self,
        name: String,
        make: impl FnOnce(String) -> TypeDef,
    ) -> Result<&mut TypeDef, SchemaError> {
        if self.types.contains_key(&name) {
            return Err(SchemaError::DuplicateType(name));
        }
        let entry = self.types.entry(name.clone());
        Ok(entry.or_insert_with(|| make(name)))
    }

    /// Checks every type reference and freezes the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        for def in self.types.values() {
            match def {
                TypeDef::Scalar(_) => {}
                TypeDef::Object(object) => {
                    for field in object.fields.values() {
                        let owner = format!("{}.{}", object.name, field.name);
                        self.check_reference(&field.ty, &owner, TypeDef::is_output, false)?;
                        for argument in field.arguments.values() {
                            let owner = format!("{owner}({})", argument.name);
                            self.check_reference(&argument.ty, &owner, TypeDef::is_input, true)?;
                        }
                    }
                }
                TypeDef::InputObject(input) => {
                    for field in input.fields.values() {
                        let owner = format!("{}.{}", input.name, field.name);
                        self.check_reference(&field.ty, &owner, TypeDef::is_input, true)?;
                    }
                }
            }
        }

        if !matches!(self.types.get(&self.query_type), Some(TypeDef::Object(_))) {
            return Err(SchemaError::MissingQueryType(self.query_type));
        }

        let is_object = |name: &str| matches!(self.types.get(name), Some(TypeDef::Object(_)));
        let mutation_type = is_object(&self.mutation_type).then(|| self.mutation_type.clone());
        let subscription_type =
            is_object(&self.subscription_type).then(|| self.subscription_type.clone());

        if let Some(TypeDef::Object(subscription)) =
            subscription_type.as_ref().and_then(|name| self.types.get(name))
        {
            if let Some(field) = subscription.fields.values().find(|f| f.event_source.is_none()) {
                return Err(SchemaError::MissingEventSource(format!(
                    "{}.{}",
                    subscription.name, field.name
                )));
            }
        }

        Ok(Schema {
            query_type: self.query_type,
            mutation_type,
            subscription_type,
            types: self.types,
        })
    }

    fn check_reference(
        &self,
        ty: &TypeRef,
        owner: &str,
        allowed: fn(&TypeDef) -> bool,
        input: bool,
    ) -> Result<(), SchemaError> {
        let type_name = ty.base_name();
        match self.types.get(type_name) {
            None => Err(SchemaError::UnknownType {
                type_name: type_name.to_string(),
                referenced_by: owner.to_string(),
            }),
            Some(def) if !allowed(def) => {
                let type_name = type_name.to_string();
                let referenced_by = owner.to_string();
                Err(if input {
                    SchemaError::InvalidInputType {
                        type_name,
                        referenced_by,
                    }
                } else {
                    SchemaError::InvalidOutputType {
                        type_name,
                        referenced_by,
                    }
                })
            }
            Some(_) => Ok(()),
        }
    }
}

fn insert_field(object: &mut ObjectDef, field: FieldDef) -> Result<(), SchemaError> {
    if object.fields.contains_key(&field.name) {
        return Err(SchemaError::DuplicateField {
            type_name: object.name.clone(),
            field: field.name,
        });
    }
    if let Some(declared) = field.resolver.source_type() {
        if declared != object.name {
            return Err(SchemaError::ResolverSourceMismatch {
                type_name: object.name.clone(),
                field: field.name.clone(),
                declared: declared.to_string(),
            });
        }
    }
    object.fields.insert(field.name.clone(), Arc::new(field));
    Ok(())
}

/// Adds fields to an object type.
pub struct ObjectTypeBuilder<'a> {
    object: &'a mut ObjectDef,
}

impl ObjectTypeBuilder<'_> {
    pub fn field(self, field: FieldDef) -> Result<Self, SchemaError> {
        insert_field(self.object, field)?;
        Ok(self)
    }

    #[must_use]
    pub fn description(self, description: impl Into<String>) -> Self {
        self.object.description = Some(description.into());
        self
    }
}

/// Adds fields to an input object type.
pub struct InputTypeBuilder<'a> {
    input: &'a mut InputObjectDef,
}

impl InputTypeBuilder<'_> {
    pub fn field(self, field: InputFieldDef) -> Result<Self, SchemaError> {
        if self.input.fields.contains_key(&field.name) {
            return Err(SchemaError::DuplicateField {
                type_name: self.input.name.clone(),
                field: field.name,
            });
        }
        self.input.fields.insert(field.name.clone(), field);
        Ok(self)
    }

    #[must_use]
    pub fn description(self, description: impl Into<String>) -> Self {
        self.input.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FnResolver;
    use serde_json::json;

    fn person_builder() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        builder
            .add_type("Person")
            .unwrap()
            .field(FieldDef::new("id", TypeRef::named("Int")))
            .unwrap()
            .field(FieldDef::new("name", TypeRef::named("String")))
            .unwrap();
        builder
            .add_type("Query")
            .unwrap()
            .field(FieldDef::new("people", TypeRef::list(TypeRef::named("Person"))))
            .unwrap();
        builder
    }

    #[test]
    fn test_builtin_scalars() {
        let schema = person_builder().build().unwrap();
        for scalar in ScalarType::ALL {
            assert!(matches!(
                schema.get_type(scalar.name()),
                Some(TypeDef::Scalar(s)) if *s == scalar
            ));
        }
    }

    #[test]
    fn test_build_resolves_roots() {
        let schema = person_builder().build().unwrap();
        assert_eq!(schema.query_type(), "Query");
        assert_eq!(schema.mutation_type(), None);
        assert!(schema.root_type(OperationKind::Query).is_some());
        assert!(schema.root_type(OperationKind::Mutation).is_none());
        assert_eq!(schema.field("Person", "name").unwrap().ty, TypeRef::named("String"));
        assert!(schema.field("Person", "age").is_none());
    }

    #[test]
    fn test_type_ref_display() {
        let ty = TypeRef::list(TypeRef::list(TypeRef::named("Int")));
        assert_eq!(ty.to_string(), "[[Int]]");
        assert_eq!(ty.base_name(), "Int");
        assert!(ty.is_list());
        let arg = InputFieldDef::new("id", TypeRef::named("Int")).required();
        assert_eq!(arg.type_display(), "Int!");
    }

    #[test]
    fn test_duplicate_type_and_field() {
        let mut builder = person_builder();
        assert_eq!(
            builder.add_type("Person").err(),
            Some(SchemaError::DuplicateType("Person".into()))
        );
        assert_eq!(
            builder.add_input_type("Int").err(),
            Some(SchemaError::DuplicateType("Int".into()))
        );
        let err = builder
            .add_field("Person", FieldDef::new("id", TypeRef::named("Int")))
            .err();
        assert_eq!(
            err,
            Some(SchemaError::DuplicateField {
                type_name: "Person".into(),
                field: "id".into()
            })
        );
    }

    #[test]
    fn test_add_field_to_unknown_type() {
        let mut builder = SchemaBuilder::new();
        let err = builder
            .add_field("Ghost", FieldDef::new("id", TypeRef::named("Int")))
            .err();
        assert!(matches!(err, Some(SchemaError::UnknownType { .. })));
    }

    #[test]
    fn test_resolver_source_mismatch() {
        let mut builder = person_builder();
        let resolver = FnResolver::new(|_, _, _| Ok(json!(1).into())).on_type("Person");
        let err = builder
            .add_field("Query", FieldDef::new("count", TypeRef::named("Int")).resolver(resolver))
            .err();
        assert_eq!(
            err,
            Some(SchemaError::ResolverSourceMismatch {
                type_name: "Query".into(),
                field: "count".into(),
                declared: "Person".into()
            })
        );
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut builder = person_builder();
        builder
            .add_field("Person", FieldDef::new("pet", TypeRef::named("Pet")))
            .unwrap();
        assert_eq!(
            builder.build().err(),
            Some(SchemaError::UnknownType {
                type_name: "Pet".into(),
                referenced_by: "Person.pet".into()
            })
        );
    }

    #[test]
    fn test_input_and_output_positions() {
        let mut builder = person_builder();
        builder.add_input_type("PersonInput").unwrap();
        builder
            .add_field("Person", FieldDef::new("input", TypeRef::named("PersonInput")))
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(SchemaError::InvalidOutputType { .. })
        ));

        let mut builder = person_builder();
        builder
            .add_field(
                "Query",
                FieldDef::new("find", TypeRef::named("Person"))
                    .argument(InputFieldDef::new("who", TypeRef::named("Person"))),
            )
            .unwrap();
        assert_eq!(
            builder.build().err(),
            Some(SchemaError::InvalidInputType {
                type_name: "Person".into(),
                referenced_by: "Query.find(who)".into()
            })
        );
    }

    #[test]
    fn test_missing_query_type() {
        let builder = SchemaBuilder::new().query_type("Root");
        assert_eq!(
            builder.build().err(),
            Some(SchemaError::MissingQueryType("Root".into()))
        );
    }

    #[test]
    fn test_subscription_fields_need_event_source() {
        let mut builder = person_builder();
        builder
            .add_type("Subscription")
            .unwrap()
            .field(FieldDef::new("onPerson", TypeRef::named("Person")))
            .unwrap();
        assert_eq!(
            builder.build().err(),
            Some(SchemaError::MissingEventSource("Subscription.onPerson".into()))
        );

        let mut builder = person_builder();
        builder
            .add_type("Subscription")
            .unwrap()
            .field(
                FieldDef::new("onPerson", TypeRef::named("Person"))
                    .event_source(Broadcaster::new()),
            )
            .unwrap();
        let schema = builder.build().unwrap();
        assert_eq!(schema.subscription_type(), Some("Subscription"));
    }
}
