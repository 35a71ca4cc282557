//! Plan compilation.
//!
//! Validates a parsed request against a schema and produces a
//! [`ProjectionPlan`]. Compilation does not stop at the first problem:
//! every error found in the request is reported together.

use crate::binding::{effective_variables, ArgumentBinder};
use crate::error::CompileError;
use crate::plan::{PlanNode, ProjectionPlan, ResultKind};
use crate::schema::{ObjectDef, Schema, TypeDef, TypeRef};
use crate::shape::{Shape, ShapeCache, ShapeField};
use serde_json::{Map, Value};
use shapeql_syntax::{format_value, Operation, OperationKind, RequestedField};
use std::sync::Arc;
use tracing::debug;

/// Compiles requests against one schema.
#[derive(Debug, Clone, Copy)]
pub struct PlanCompiler<'a> {
    schema: &'a Schema,
    shapes: &'a ShapeCache,
}

enum FieldType<'a> {
    Scalar,
    Object(&'a ObjectDef),
}

impl<'a> PlanCompiler<'a> {
    pub fn new(schema: &'a Schema, shapes: &'a ShapeCache) -> Self {
        Self { schema, shapes }
    }

    /// Compiles `operation` with the caller's `variables`.
    pub fn compile(
        &self,
        operation: &Operation,
        variables: &Map<String, Value>,
    ) -> Result<ProjectionPlan, Vec<CompileError>> {
        let Some(root) = self.schema.root_type(operation.kind) else {
            return Err(vec![CompileError::UnsupportedOperation {
                operation: operation.kind,
            }]);
        };

        let variables = effective_variables(operation, variables);
        let binder = ArgumentBinder::new(self.schema, &variables);
        let mut errors = Vec::new();
        let (fields, shape) =
            self.compile_selection(&binder, root, &operation.selection, &[], &mut errors);

        if operation.kind == OperationKind::Subscription {
            check_subscription(&fields, &mut errors);
        }

        if !errors.is_empty() {
            debug!(
                operation = %operation.kind,
                errors = errors.len(),
                "request failed validation"
            );
            return Err(errors);
        }

        let plan = ProjectionPlan {
            kind: operation.kind,
            name: operation.name.as_ref().map(|name| name.value.clone()),
            root_type: root.name.clone(),
            fields: fields.into_iter().map(Arc::new).collect(),
            shape,
        };
        debug!(
            operation = %plan.kind,
            name = plan.name.as_deref().unwrap_or(""),
            nodes = plan.node_count(),
            "compiled projection plan"
        );
        Ok(plan)
    }

    fn compile_selection(
        &self,
        binder: &ArgumentBinder<'_>,
        parent: &ObjectDef,
        selection: &[RequestedField],
        path: &[String],
        errors: &mut Vec<CompileError>,
    ) -> (Vec<PlanNode>, Arc<Shape>) {
        let mut nodes: Vec<PlanNode> = Vec::with_capacity(selection.len());
        let mut accepted: Vec<&RequestedField> = Vec::with_capacity(selection.len());

        for requested in selection {
            let mut field_path = path.to_vec();
            field_path.push(requested.response_name().to_string());

            if !binder.included(&requested.directives, &field_path, errors) {
                continue;
            }

            if let Some(index) = accepted
                .iter()
                .position(|seen| seen.response_name() == requested.response_name())
            {
                if !same_leaf(accepted[index], requested) {
                    errors.push(CompileError::ConflictingFields {
                        path: field_path,
                        response_name: requested.response_name().to_string(),
                    });
                }
                continue;
            }

            if let Some(node) = self.compile_field(binder, parent, requested, field_path, errors) {
                nodes.push(node);
                accepted.push(requested);
            }
        }

        let shape = self.shapes.get_or_create(
            &parent.name,
            nodes
                .iter()
                .map(|node| ShapeField::new(node.response_name.clone(), node.field.ty.clone()))
                .collect(),
        );
        (nodes, shape)
    }

    fn compile_field(
        &self,
        binder: &ArgumentBinder<'_>,
        parent: &ObjectDef,
        requested: &RequestedField,
        path: Vec<String>,
        errors: &mut Vec<CompileError>,
    ) -> Option<PlanNode> {
        let Some(field) = parent.field(requested.name.as_str()) else {
            errors.push(CompileError::FieldNotFound {
                path,
                type_name: parent.name.clone(),
                field_name: requested.name.value.clone(),
            });
            return None;
        };

        let arguments = binder.bind(field, &requested.arguments, &path, errors);
        let (kind, field_type) = self.classify(&field.ty)?;

        let (children, shape) = match field_type {
            FieldType::Scalar => {
                if requested.has_selection() {
                    errors.push(CompileError::UnexpectedSelection {
                        path,
                        type_name: parent.name.clone(),
                        field_name: field.name.clone(),
                    });
                    return None;
                }
                (Vec::new(), None)
            }
            FieldType::Object(object) => {
                if !requested.has_selection() {
                    errors.push(CompileError::MissingSelection {
                        path,
                        type_name: parent.name.clone(),
                        field_name: field.name.clone(),
                    });
                    return None;
                }
                let (children, shape) =
                    self.compile_selection(binder, object, &requested.selection, &path, errors);
                (children, Some(shape))
            }
        };

        Some(PlanNode {
            response_name: requested.response_name().to_string(),
            parent_type: parent.name.clone(),
            field: Arc::clone(field),
            arguments,
            kind,
            children,
            shape,
        })
    }

    fn classify(&self, ty: &TypeRef) -> Option<(ResultKind, FieldType<'a>)> {
        match ty {
            TypeRef::List(inner) => {
                let (kind, field_type) = self.classify(inner)?;
                Some((ResultKind::List(Box::new(kind)), field_type))
            }
            TypeRef::Named(name) => match self.schema.get_type(name)? {
                TypeDef::Scalar(_) => Some((ResultKind::Scalar, FieldType::Scalar)),
                TypeDef::Object(object) => Some((ResultKind::Object, FieldType::Object(object))),
                TypeDef::InputObject(_) => None,
            },
        }
    }
}

/// Two requests under one response name merge when they are the same leaf
/// field with the same arguments.
fn same_leaf(a: &RequestedField, b: &RequestedField) -> bool {
    a.name.value == b.name.value
        && !a.has_selection()
        && !b.has_selection()
        && a.arguments.len() == b.arguments.len()
        && a.arguments.iter().all(|x| {
            b.arguments
                .iter()
                .any(|y| x.name.value == y.name.value && same_literal(&x.value, &y.value))
        })
}

fn same_literal(a: &shapeql_syntax::Value, b: &shapeql_syntax::Value) -> bool {
    // Spans differ between the two occurrences; compare the printed form.
    format_value(a) == format_value(b)
}

fn check_subscription(fields: &[PlanNode], errors: &mut Vec<CompileError>) {
    match fields {
        [node] if node.field.event_source.is_some() => {}
        [node] => errors.push(CompileError::InvalidSubscription {
            path: vec![node.response_name.clone()],
            reason: format!("field `{}` has no event source", node.field.name),
        }),
        _ => errors.push(CompileError::InvalidSubscription {
            path: Vec::new(),
            reason: format!(
                "a subscription selects exactly one top-level field, found {}",
                fields.len()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::schema::{FieldDef, InputFieldDef, SchemaBuilder};
    use serde_json::json;
    use shapeql_syntax::parse;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_type("Person")
            .unwrap()
            .field(FieldDef::new("id", TypeRef::named("Int")))
            .unwrap()
            .field(FieldDef::new("name", TypeRef::named("String")))
            .unwrap()
            .field(FieldDef::new("friends", TypeRef::list(TypeRef::named("Person"))))
            .unwrap();
        builder
            .add_type("Query")
            .unwrap()
            .field(FieldDef::new("people", TypeRef::list(TypeRef::named("Person"))))
            .unwrap()
            .field(
                FieldDef::new("person", TypeRef::named("Person"))
                    .argument(InputFieldDef::new("id", TypeRef::named("Int")).required()),
            )
            .unwrap()
            .field(FieldDef::new("count", TypeRef::named("Int")))
            .unwrap();
        builder
            .add_type("Subscription")
            .unwrap()
            .field(
                FieldDef::new("onPerson", TypeRef::named("Person"))
                    .event_source(Broadcaster::new()),
            )
            .unwrap()
            .field(
                FieldDef::new("onCount", TypeRef::named("Int")).event_source(Broadcaster::new()),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn compile(schema: &Schema, shapes: &ShapeCache, request: &str) -> Result<ProjectionPlan, Vec<CompileError>> {
        let operation = parse(request).unwrap();
        PlanCompiler::new(schema, shapes).compile(&operation, &Map::new())
    }

    #[test]
    fn test_compiles_nested_selection() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let plan = compile(&schema, &shapes, "query People { people { id friends { name } } }").unwrap();

        assert_eq!(plan.kind, OperationKind::Query);
        assert_eq!(plan.name.as_deref(), Some("People"));
        assert_eq!(plan.root_type, "Query");
        assert_eq!(plan.node_count(), 4);

        let people = plan.node(&["people"]).unwrap();
        assert_eq!(
            people.kind,
            ResultKind::List(Box::new(ResultKind::Object))
        );
        let shape = people.shape.as_ref().unwrap();
        assert_eq!(shape.type_name(), "Person");
        assert_eq!(shape.field_names().collect::<Vec<_>>(), ["id", "friends"]);

        let friends = plan.node(&["people", "friends"]).unwrap();
        assert_eq!(friends.parent_type, "Person");
        assert_eq!(
            friends.shape.as_ref().unwrap().field_names().collect::<Vec<_>>(),
            ["name"]
        );
    }

    #[test]
    fn test_aliases_name_the_output() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let plan = compile(&schema, &shapes, "{ first: person(id: 1) { id } second: person(id: 2) { id } }")
            .unwrap();
        assert_eq!(
            plan.shape.field_names().collect::<Vec<_>>(),
            ["first", "second"]
        );
        assert_eq!(plan.node(&["second"]).unwrap().arguments.get("id"), Some(&json!(2)));
    }

    #[test]
    fn test_collects_every_error() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let errors = compile(
            &schema,
            &shapes,
            "{ people { id age } person { id } count { id } friends }",
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec![
                CompileError::FieldNotFound {
                    path: vec!["people".into(), "age".into()],
                    type_name: "Person".into(),
                    field_name: "age".into()
                },
                CompileError::MissingRequiredArgument {
                    path: vec!["person".into()],
                    argument: "id".into()
                },
                CompileError::UnexpectedSelection {
                    path: vec!["count".into()],
                    type_name: "Query".into(),
                    field_name: "count".into()
                },
                CompileError::FieldNotFound {
                    path: vec!["friends".into()],
                    type_name: "Query".into(),
                    field_name: "friends".into()
                },
            ]
        );
    }

    #[test]
    fn test_missing_selection() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let errors = compile(&schema, &shapes, "{ people }").unwrap_err();
        assert!(matches!(
            &errors[..],
            [CompileError::MissingSelection { field_name, .. }] if field_name == "people"
        ));
    }

    #[test]
    fn test_unsupported_operation() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let errors = compile(&schema, &shapes, "mutation { count }").unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::UnsupportedOperation {
                operation: OperationKind::Mutation
            }]
        );
    }

    #[test]
    fn test_subscription_needs_one_field() {
        let schema = schema();
        let shapes = ShapeCache::new();
        assert!(compile(&schema, &shapes, "subscription { onPerson { id } }").is_ok());

        let errors = compile(&schema, &shapes, "subscription { onPerson { id } onCount }").unwrap_err();
        assert!(matches!(
            &errors[..],
            [CompileError::InvalidSubscription { .. }]
        ));
    }

    #[test]
    fn test_identical_selections_share_shapes() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let a = compile(&schema, &shapes, "{ people { id name } }").unwrap();
        let b = compile(&schema, &shapes, "query Other { people { id name } }").unwrap();
        let c = compile(&schema, &shapes, "{ people { name id } }").unwrap();

        let shape = |plan: &ProjectionPlan| Arc::clone(plan.node(&["people"]).unwrap().shape.as_ref().unwrap());
        assert!(Arc::ptr_eq(&shape(&a), &shape(&b)));
        assert!(!Arc::ptr_eq(&shape(&a), &shape(&c)));
        assert!(Arc::ptr_eq(&a.shape, &b.shape));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let request = "{ people { id friends { id name } } person(id: 4) { name } }";
        let first = compile(&schema, &shapes, request).unwrap();
        let second = compile(&schema, &shapes, request).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_skipped_fields_leave_the_shape() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let plan = compile(&schema, &shapes, "{ people { id name @skip(if: true) } }").unwrap();
        assert_eq!(
            plan.node(&["people"]).unwrap().shape.as_ref().unwrap().field_names().collect::<Vec<_>>(),
            ["id"]
        );
    }

    #[test]
    fn test_duplicate_response_names() {
        let schema = schema();
        let shapes = ShapeCache::new();
        let plan = compile(&schema, &shapes, "{ count count }").unwrap();
        assert_eq!(plan.fields.len(), 1);

        let errors = compile(&schema, &shapes, "{ count: people { id } count }").unwrap_err();
        assert!(matches!(
            &errors[..],
            [CompileError::ConflictingFields { response_name, .. }] if response_name == "count"
        ));
    }
}
