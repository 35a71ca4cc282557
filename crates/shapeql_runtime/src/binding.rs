//! Argument binding.
//!
//! Turns the arguments written in a request into the JSON values a resolver
//! receives, coerced against the declared argument types. Variables are
//! substituted here, so a bound plan no longer refers to them.

use crate::error::CompileError;
use crate::resolver::ResolverArgs;
use crate::schema::{FieldDef, InputFieldDef, InputObjectDef, ScalarType, Schema, TypeDef, TypeRef};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use shapeql_core::ArgumentTracker;
use shapeql_syntax::{self as ast, Argument, Directive, Operation};

/// Variables in effect for an operation: the caller's values, plus declared
/// defaults for variables the caller left out.
pub(crate) fn effective_variables(operation: &Operation, provided: &Map<String, Value>) -> Map<String, Value> {
    let mut variables = provided.clone();
    for definition in &operation.variables {
        let name = definition.name.as_str();
        if variables.contains_key(name) {
            continue;
        }
        if let Some(default) = &definition.default_value {
            if let Ok(Some(value)) = literal_to_json(default, provided) {
                variables.insert(name.to_string(), value);
            }
        }
    }
    variables
}

/// Converts a literal to JSON. `Ok(None)` means a variable the caller did
/// not supply.
fn literal_to_json(
    value: &ast::Value,
    variables: &Map<String, Value>,
) -> Result<Option<Value>, &'static str> {
    Ok(Some(match value {
        ast::Value::Variable(name) => return Ok(variables.get(name.as_str()).cloned()),
        ast::Value::Int(i, _) => Value::from(*i),
        ast::Value::Float(f, _) => {
            Value::Number(Number::from_f64(*f).ok_or("non-finite float")?)
        }
        ast::Value::String(s, _) => Value::String(s.clone()),
        ast::Value::Boolean(b, _) => Value::Bool(*b),
        ast::Value::Null(_) => Value::Null,
        ast::Value::Enum(_) => return Err(value.kind_name()),
        ast::Value::List(items, _) => Value::Array(
            items
                .iter()
                .map(|item| literal_to_json(item, variables).map(Option::unwrap_or_default))
                .collect::<Result<_, _>>()?,
        ),
        ast::Value::Object(fields, _) => {
            let mut map = Map::new();
            for (name, field) in fields {
                if let Some(value) = literal_to_json(field, variables)? {
                    map.insert(name.value.clone(), value);
                }
            }
            Value::Object(map)
        }
    }))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

enum CoerceError {
    Type {
        at: String,
        expected: String,
        found: &'static str,
    },
    Missing(String),
    Unknown(String),
}

impl CoerceError {
    fn into_compile_error(self, path: &[String]) -> CompileError {
        let path = path.to_vec();
        match self {
            Self::Type {
                at,
                expected,
                found,
            } => CompileError::ArgumentType {
                path,
                argument: at,
                expected,
                found: found.to_string(),
            },
            Self::Missing(argument) => CompileError::MissingRequiredArgument { path, argument },
            Self::Unknown(argument) => CompileError::UnknownArgument { path, argument },
        }
    }
}

type Trackers = IndexMap<String, ArgumentTracker>;

pub(crate) struct ArgumentBinder<'a> {
    schema: &'a Schema,
    variables: &'a Map<String, Value>,
}

impl<'a> ArgumentBinder<'a> {
    pub(crate) fn new(schema: &'a Schema, variables: &'a Map<String, Value>) -> Self {
        Self { schema, variables }
    }

    /// Binds the arguments requested for `field`.
    ///
    /// Explicit values are marked as set; declared defaults fill the gaps
    /// unmarked. Problems are pushed to `errors` and the offending argument
    /// is left out.
    pub(crate) fn bind(
        &self,
        field: &FieldDef,
        requested: &[Argument],
        path: &[String],
        errors: &mut Vec<CompileError>,
    ) -> ResolverArgs {
        for argument in requested {
            if !field.arguments.contains_key(argument.name.as_str()) {
                errors.push(CompileError::UnknownArgument {
                    path: path.to_vec(),
                    argument: argument.name.value.clone(),
                });
            }
        }

        let mut args = ResolverArgs::new();
        let mut trackers = Trackers::new();
        for (name, definition) in &field.arguments {
            let supplied = match requested.iter().find(|a| a.name.as_str() == name.as_str()) {
                Some(argument) => match literal_to_json(&argument.value, self.variables) {
                    Ok(value) => value,
                    Err(found) => {
                        errors.push(CompileError::ArgumentType {
                            path: path.to_vec(),
                            argument: name.clone(),
                            expected: definition.type_display(),
                            found: found.to_string(),
                        });
                        continue;
                    }
                },
                None => None,
            };

            match self.bind_value(definition, name, supplied, &mut trackers) {
                Ok(Some(Bound::Explicit(value))) => args.set(name.clone(), value),
                Ok(Some(Bound::Default(value))) => args.set_default(name.clone(), value),
                Ok(None) => {}
                Err(error) => errors.push(error.into_compile_error(path)),
            }
        }

        for (name, tracker) in trackers {
            args.track_input(name, tracker);
        }
        args
    }

    fn bind_value(
        &self,
        definition: &InputFieldDef,
        at: &str,
        supplied: Option<Value>,
        trackers: &mut Trackers,
    ) -> Result<Option<Bound>, CoerceError> {
        match supplied {
            Some(Value::Null) if definition.required => Err(CoerceError::Type {
                at: at.to_string(),
                expected: definition.type_display(),
                found: "null",
            }),
            Some(value) => self
                .coerce(value, &definition.ty, at, Some(trackers))
                .map(|value| Some(Bound::Explicit(value))),
            None => match &definition.default_value {
                Some(default) => Ok(Some(Bound::Default(default.clone()))),
                None if definition.required => Err(CoerceError::Missing(at.to_string())),
                None => Ok(None),
            },
        }
    }

    fn coerce(
        &self,
        value: Value,
        ty: &TypeRef,
        at: &str,
        trackers: Option<&mut Trackers>,
    ) -> Result<Value, CoerceError> {
        match ty {
            TypeRef::List(inner) => match value {
                Value::Null => Ok(Value::Null),
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| self.coerce(item, inner, at, None))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                // A single value where a list is expected is a list of one.
                single => Ok(Value::Array(vec![self.coerce(single, inner, at, None)?])),
            },
            TypeRef::Named(name) => match self.schema.get_type(name) {
                Some(TypeDef::Scalar(scalar)) => coerce_scalar(*scalar, value).map_err(|found| {
                    CoerceError::Type {
                        at: at.to_string(),
                        expected: name.clone(),
                        found,
                    }
                }),
                Some(TypeDef::InputObject(input)) => self.coerce_input(input, value, at, trackers),
                _ => Err(CoerceError::Type {
                    at: at.to_string(),
                    expected: name.clone(),
                    found: json_kind(&value),
                }),
            },
        }
    }

    fn coerce_input(
        &self,
        input: &InputObjectDef,
        value: Value,
        at: &str,
        mut trackers: Option<&mut Trackers>,
    ) -> Result<Value, CoerceError> {
        let mut fields = match value {
            Value::Null => return Ok(Value::Null),
            Value::Object(fields) => fields,
            other => {
                return Err(CoerceError::Type {
                    at: at.to_string(),
                    expected: input.name.clone(),
                    found: json_kind(&other),
                })
            }
        };

        if let Some(unknown) = fields.keys().find(|key| !input.fields.contains_key(*key)) {
            return Err(CoerceError::Unknown(format!("{at}.{unknown}")));
        }

        let mut tracker = ArgumentTracker::new();
        let mut coerced = Map::new();
        for (name, definition) in &input.fields {
            let field_at = format!("{at}.{name}");
            let supplied = fields.remove(name);
            if supplied.is_some() {
                tracker.mark_as_set(name);
            }
            let bound = match supplied {
                Some(Value::Null) if definition.required => {
                    return Err(CoerceError::Type {
                        at: field_at,
                        expected: definition.type_display(),
                        found: "null",
                    })
                }
                Some(value) => Some(self.coerce(
                    value,
                    &definition.ty,
                    &field_at,
                    trackers.as_deref_mut(),
                )?),
                None => match &definition.default_value {
                    Some(default) => Some(default.clone()),
                    None if definition.required => return Err(CoerceError::Missing(field_at)),
                    None => None,
                },
            };
            if let Some(value) = bound {
                coerced.insert(name.clone(), value);
            }
        }

        if let Some(trackers) = trackers {
            trackers.insert(at.to_string(), tracker);
        }
        Ok(Value::Object(coerced))
    }

    /// Evaluates `@skip` and `@include`. Returns whether the field stays in
    /// the plan.
    pub(crate) fn included(
        &self,
        directives: &[Directive],
        path: &[String],
        errors: &mut Vec<CompileError>,
    ) -> bool {
        let mut included = true;
        for directive in directives {
            let skip_when = match directive.name.as_str() {
                "skip" => true,
                "include" => false,
                other => {
                    errors.push(CompileError::UnknownDirective {
                        path: path.to_vec(),
                        directive: other.to_string(),
                    });
                    continue;
                }
            };
            if let Some(condition) = self.condition(directive, path, errors) {
                if condition == skip_when {
                    included = false;
                }
            }
        }
        included
    }

    fn condition(
        &self,
        directive: &Directive,
        path: &[String],
        errors: &mut Vec<CompileError>,
    ) -> Option<bool> {
        let argument_name = format!("@{}(if)", directive.name.as_str());
        for argument in &directive.arguments {
            if argument.name.as_str() != "if" {
                errors.push(CompileError::UnknownArgument {
                    path: path.to_vec(),
                    argument: format!("@{}({})", directive.name.as_str(), argument.name.as_str()),
                });
            }
        }
        let Some(argument) = directive.arguments.iter().find(|a| a.name.as_str() == "if") else {
            errors.push(CompileError::MissingRequiredArgument {
                path: path.to_vec(),
                argument: argument_name,
            });
            return None;
        };

        let found = match literal_to_json(&argument.value, self.variables) {
            Ok(Some(Value::Bool(condition))) => return Some(condition),
            Ok(Some(other)) => json_kind(&other),
            Ok(None) => {
                errors.push(CompileError::MissingRequiredArgument {
                    path: path.to_vec(),
                    argument: argument_name,
                });
                return None;
            }
            Err(found) => found,
        };
        errors.push(CompileError::ArgumentType {
            path: path.to_vec(),
            argument: argument_name,
            expected: "Boolean!".to_string(),
            found: found.to_string(),
        });
        None
    }
}

enum Bound {
    Explicit(Value),
    Default(Value),
}

fn coerce_scalar(scalar: ScalarType, value: Value) -> Result<Value, &'static str> {
    match (scalar, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ScalarType::Int, Value::Number(n)) if n.is_i64() => Ok(Value::Number(n)),
        (ScalarType::Float, Value::Number(n)) => Ok(n
            .as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Number(n), Value::Number)),
        (ScalarType::String | ScalarType::Id, Value::String(s)) => Ok(Value::String(s)),
        (ScalarType::Id, Value::Number(n)) if n.is_i64() => Ok(Value::String(n.to_string())),
        (ScalarType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (_, other) => Err(json_kind(&other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, SchemaBuilder};
    use serde_json::json;
    use shapeql_syntax::parse;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_input_type("MessageInput")
            .unwrap()
            .field(InputFieldDef::new("text", TypeRef::named("String")).required())
            .unwrap()
            .field(InputFieldDef::new("pinned", TypeRef::named("Boolean")).with_default(json!(false)))
            .unwrap()
            .field(InputFieldDef::new("tags", TypeRef::list(TypeRef::named("String"))))
            .unwrap();
        builder
            .add_type("Query")
            .unwrap()
            .field(
                FieldDef::new("search", TypeRef::named("String"))
                    .argument(InputFieldDef::new("id", TypeRef::named("Int")).required())
                    .argument(InputFieldDef::new("limit", TypeRef::named("Int")).with_default(json!(10)))
                    .argument(InputFieldDef::new("ratio", TypeRef::named("Float")))
                    .argument(InputFieldDef::new("key", TypeRef::named("ID")))
                    .argument(InputFieldDef::new("input", TypeRef::named("MessageInput"))),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn bind_with(request: &str, variables: &Map<String, Value>) -> (ResolverArgs, Vec<CompileError>) {
        let schema = schema();
        let operation = parse(request).unwrap();
        let variables = effective_variables(&operation, variables);
        let binder = ArgumentBinder::new(&schema, &variables);
        let field = schema.field("Query", "search").unwrap();
        let mut errors = Vec::new();
        let args = binder.bind(field, &operation.selection[0].arguments, &[], &mut errors);
        (args, errors)
    }

    fn bind(request: &str) -> (ResolverArgs, Vec<CompileError>) {
        bind_with(request, &Map::new())
    }

    #[test]
    fn test_defaults_are_not_marked_set() {
        let (args, errors) = bind("{ search(id: 1) }");
        assert!(errors.is_empty());
        assert_eq!(args.get("id"), Some(&json!(1)));
        assert_eq!(args.get("limit"), Some(&json!(10)));
        assert!(args.is_set("id"));
        assert!(!args.is_set("limit"));
        assert!(args.get("ratio").is_none());

        let (args, _) = bind("{ search(id: 1, limit: 10) }");
        assert!(args.is_set("limit"));
    }

    #[test]
    fn test_scalar_coercion() {
        let (args, errors) = bind("{ search(id: 1, ratio: 2, key: 7) }");
        assert!(errors.is_empty());
        assert_eq!(args.get("ratio"), Some(&json!(2.0)));
        assert_eq!(args.get("key"), Some(&json!("7")));
    }

    #[test]
    fn test_argument_type_errors() {
        let (_, errors) = bind("{ search(id: \"one\") }");
        assert_eq!(
            errors,
            vec![CompileError::ArgumentType {
                path: vec![],
                argument: "id".into(),
                expected: "Int".into(),
                found: "String".into()
            }]
        );

        let (_, errors) = bind("{ search(id: null) }");
        assert!(matches!(
            &errors[..],
            [CompileError::ArgumentType { expected, found, .. }] if expected == "Int!" && found == "null"
        ));

        let (_, errors) = bind("{ search(id: RED) }");
        assert!(matches!(
            &errors[..],
            [CompileError::ArgumentType { found, .. }] if found == "enum value"
        ));
    }

    #[test]
    fn test_non_finite_float_is_a_type_error() {
        let schema = schema();
        let mut operation = parse("{ search(id: 1, ratio: 1.5) }").unwrap();
        operation.selection[0].arguments[1].value =
            ast::Value::Float(f64::INFINITY, shapeql_core::Span::new(16, 21));

        let variables = Map::new();
        let binder = ArgumentBinder::new(&schema, &variables);
        let field = schema.field("Query", "search").unwrap();
        let mut errors = Vec::new();
        let args = binder.bind(field, &operation.selection[0].arguments, &[], &mut errors);

        assert!(args.get("ratio").is_none());
        assert!(!args.is_set("ratio"));
        assert!(matches!(
            &errors[..],
            [CompileError::ArgumentType { argument, found, .. }]
                if argument == "ratio" && found == "non-finite float"
        ));
    }

    #[test]
    fn test_missing_and_unknown_arguments() {
        let (_, errors) = bind("{ search(limit: 1, color: 2) }");
        assert_eq!(
            errors,
            vec![
                CompileError::UnknownArgument {
                    path: vec![],
                    argument: "color".into()
                },
                CompileError::MissingRequiredArgument {
                    path: vec![],
                    argument: "id".into()
                },
            ]
        );
    }

    #[test]
    fn test_variables_and_defaults() {
        let request = "query($id: Int, $limit: Int = 5) { search(id: $id, limit: $limit) }";
        let mut variables = Map::new();
        variables.insert("id".into(), json!(3));
        let (args, errors) = bind_with(request, &variables);
        assert!(errors.is_empty());
        assert_eq!(args.get("id"), Some(&json!(3)));
        assert_eq!(args.get("limit"), Some(&json!(5)));

        let (_, errors) = bind("query($id: Int) { search(id: $id) }");
        assert!(matches!(
            &errors[..],
            [CompileError::MissingRequiredArgument { argument, .. }] if argument == "id"
        ));
    }

    #[test]
    fn test_input_object_tracking() {
        let (args, errors) = bind(r#"{ search(id: 1, input: { text: "hi", tags: "a" }) }"#);
        assert!(errors.is_empty());
        assert_eq!(
            args.get("input"),
            Some(&json!({ "text": "hi", "pinned": false, "tags": ["a"] }))
        );
        assert!(args.input_is_set("input", "text"));
        assert!(args.input_is_set("input", "tags"));
        assert!(!args.input_is_set("input", "pinned"));
    }

    #[test]
    fn test_input_object_errors() {
        let (_, errors) = bind("{ search(id: 1, input: { pinned: true }) }");
        assert!(matches!(
            &errors[..],
            [CompileError::MissingRequiredArgument { argument, .. }] if argument == "input.text"
        ));

        let (_, errors) = bind(r#"{ search(id: 1, input: { text: "x", mood: 1 }) }"#);
        assert!(matches!(
            &errors[..],
            [CompileError::UnknownArgument { argument, .. }] if argument == "input.mood"
        ));

        let (_, errors) = bind("{ search(id: 1, input: 4) }");
        assert!(matches!(
            &errors[..],
            [CompileError::ArgumentType { expected, found, .. }] if expected == "MessageInput" && found == "Int"
        ));
    }

    #[test]
    fn test_skip_and_include() {
        let schema = schema();
        let operation = parse(
            "query($hide: Boolean) { a @skip(if: true) b @include(if: false) c @skip(if: $hide) d @defer }",
        )
        .unwrap();
        let mut variables = Map::new();
        variables.insert("hide".into(), json!(false));
        let variables = effective_variables(&operation, &variables);
        let binder = ArgumentBinder::new(&schema, &variables);

        let mut errors = Vec::new();
        let included: Vec<bool> = operation
            .selection
            .iter()
            .map(|field| binder.included(&field.directives, &[], &mut errors))
            .collect();
        assert_eq!(included, [false, false, true, true]);
        assert_eq!(
            errors,
            vec![CompileError::UnknownDirective {
                path: vec![],
                directive: "defer".into()
            }]
        );
    }

    #[test]
    fn test_directive_condition_must_be_boolean() {
        let schema = schema();
        let operation = parse("{ a @skip(if: 1) b @include }").unwrap();
        let variables = Map::new();
        let binder = ArgumentBinder::new(&schema, &variables);
        let mut errors = Vec::new();
        for field in &operation.selection {
            assert!(binder.included(&field.directives, &[], &mut errors));
        }
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code(), shapeql_core::diagnostics::codes::ARGUMENT_TYPE);
        assert_eq!(
            errors[1].code(),
            shapeql_core::diagnostics::codes::MISSING_REQUIRED_ARGUMENT
        );
    }
}
