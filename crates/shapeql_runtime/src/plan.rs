//! Projection plans.
//!
//! A plan is the compiled form of a request: a tree of nodes, one per
//! requested field, each carrying its field definition, bound arguments,
//! and the shape its object results take. Plans are immutable and may be
//! executed any number of times, concurrently.

use crate::resolver::ResolverArgs;
use crate::schema::FieldDef;
use crate::shape::Shape;
use shapeql_syntax::OperationKind;
use std::sync::Arc;

/// What kind of value a field produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Scalar,
    Object,
    /// A list whose elements are of the inner kind.
    List(Box<ResultKind>),
}

impl ResultKind {
    /// The kind at the bottom of any list wrappers.
    pub fn element(&self) -> &ResultKind {
        match self {
            Self::List(inner) => inner.element(),
            other => other,
        }
    }

    pub fn is_object_like(&self) -> bool {
        matches!(self.element(), Self::Object)
    }
}

/// One requested field.
#[derive(Debug, Clone)]
pub struct PlanNode {
    /// Output name, the alias if one was given.
    pub response_name: String,
    pub parent_type: String,
    pub field: Arc<FieldDef>,
    pub arguments: ResolverArgs,
    pub kind: ResultKind,
    /// Sub-plan for object results, in request order.
    pub children: Vec<PlanNode>,
    /// Layout of object results. Set exactly when `kind` is object-like.
    pub shape: Option<Arc<Shape>>,
}

impl PlanNode {
    pub fn field_name(&self) -> &str {
        &self.field.name
    }

    /// Number of nodes in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PlanNode::node_count).sum::<usize>()
    }
}

impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        self.response_name == other.response_name
            && self.parent_type == other.parent_type
            && Arc::ptr_eq(&self.field, &other.field)
            && self.arguments == other.arguments
            && self.kind == other.kind
            && self.children == other.children
            && match (&self.shape, &other.shape) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// A compiled request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPlan {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub root_type: String,
    pub fields: Vec<Arc<PlanNode>>,
    /// Layout of the top-level `data` object.
    pub shape: Arc<Shape>,
}

impl ProjectionPlan {
    pub fn node_count(&self) -> usize {
        self.fields.iter().map(|node| node.node_count()).sum()
    }

    /// Finds a node by its response path.
    pub fn node(&self, path: &[&str]) -> Option<&PlanNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self
            .fields
            .iter()
            .find(|node| node.response_name == *first)?
            .as_ref();
        for name in rest {
            node = node.children.iter().find(|child| child.response_name == *name)?;
        }
        Some(node)
    }
}
