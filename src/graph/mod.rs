//! Resource graph: the forest of bound resources
//!
//! ```text
//! users                 /users, /users/{id}
//! └── posts (user)      /users/{id}/posts, /users/{id}/posts/{id}
//!     └── comments (post)
//! ```
//!
//! The graph is built once at startup and is read-only afterwards, so it is
//! shared between requests without locking.

pub mod conf;
pub mod resolver;
pub mod resource;

pub use conf::{Conf, Mode, TotalPolicy};
pub use resolver::{Plan, Resolver};
pub use resource::Resource;

use crate::core::error::{ConfigError, GraphError, GraphResult, ResourceError};
use crate::core::field::Field;
use crate::core::query::Predicate;
use crate::core::schema::Schema;
use crate::core::store::Storer;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Root of the resource forest
#[derive(Debug, Default)]
pub struct ResourceGraph {
    roots: IndexMap<String, Resource>,
}

/// An ancestor on a resolved path: a resource and the id of one of its items
#[derive(Debug, Clone)]
pub struct PathComponent<'a> {
    pub resource: &'a Resource,
    pub id: Value,
}

/// Result of walking a request path through the graph
#[derive(Debug, Clone)]
pub struct ResolvedPath<'a> {
    /// Resource targeted by the path
    pub resource: &'a Resource,
    /// Item id when the path ends with one
    pub id: Option<Value>,
    /// Parent items from the root down, each scoping the next
    pub ancestors: Vec<PathComponent<'a>>,
}

impl<'a> ResolvedPath<'a> {
    /// Implicit filter scoping the target to its direct parent item
    pub fn parent_predicate(&self) -> Predicate {
        match self.ancestors.last() {
            Some(parent) => Predicate::Equal {
                field: self.resource.parent_field().to_string(),
                value: parent.id.clone(),
            },
            None => Predicate::all(),
        }
    }

    /// Link fields to set on items created under this path
    pub fn link_values(&self) -> Map<String, Value> {
        let mut links = Map::new();
        if let Some(parent) = self.ancestors.last() {
            links.insert(self.resource.parent_field().to_string(), parent.id.clone());
        }
        links
    }

    /// Filter matching the ancestor at `index` within its own scope
    pub fn ancestor_predicate(&self, index: usize) -> Option<Predicate> {
        let component = self.ancestors.get(index)?;
        let by_id = Predicate::Equal {
            field: "id".to_string(),
            value: component.id.clone(),
        };
        Some(match index.checked_sub(1).and_then(|i| self.ancestors.get(i)) {
            Some(parent) => by_id.and(Predicate::Equal {
                field: component.resource.parent_field().to_string(),
                value: parent.id.clone(),
            }),
            None => by_id,
        })
    }
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a root resource
    pub fn bind(
        &mut self,
        name: &str,
        schema: Schema,
        storer: Arc<dyn Storer>,
        conf: Conf,
    ) -> GraphResult<&mut Resource> {
        if self.roots.contains_key(name) {
            return Err(ConfigError::InvalidBinding {
                resource: name.to_string(),
                message: "name already bound".to_string(),
            }
            .into());
        }
        let resource = Resource::new(name, name.to_string(), "", schema, storer, conf)?;
        tracing::debug!(resource = %name, "bound resource");
        Ok(self.roots.entry(name.to_string()).or_insert(resource))
    }

    /// Mutable access to a bound resource, for binding children and hooks
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Resource> {
        let mut parts = path.split('.');
        let mut current = self.roots.get_mut(parts.next()?)?;
        for part in parts {
            current = current.child_mut(part)?;
        }
        Some(current)
    }

    /// Resource at a dotted path such as `users.posts`
    pub fn get(&self, path: &str) -> Option<&Resource> {
        let mut parts = path.split('.');
        let mut current = self.roots.get(parts.next()?)?;
        for part in parts {
            current = current.child(part)?;
        }
        Some(current)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Resource> {
        self.roots.values()
    }

    /// Walk request path segments: `name`, then alternately `id` and child name
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> GraphResult<ResolvedPath<'_>> {
        let not_found = || -> GraphError {
            ResourceError::RouteNotFound {
                path: segments
                    .iter()
                    .map(|s| s.as_ref())
                    .collect::<Vec<_>>()
                    .join("/"),
            }
            .into()
        };

        let mut iter = segments.iter().map(|s| s.as_ref());
        let mut resource = iter
            .next()
            .and_then(|name| self.roots.get(name))
            .ok_or_else(not_found)?;
        let mut ancestors = Vec::new();

        loop {
            let Some(id) = iter.next() else {
                return Ok(ResolvedPath {
                    resource,
                    id: None,
                    ancestors,
                });
            };
            if id.is_empty() {
                return Err(not_found());
            }
            let id = resource.path_id(id).ok_or_else(not_found)?;
            let Some(child) = iter.next() else {
                return Ok(ResolvedPath {
                    resource,
                    id: Some(id),
                    ancestors,
                });
            };
            ancestors.push(PathComponent { resource, id });
            resource = resource.child(child).ok_or_else(not_found)?;
        }
    }

    /// Check that every reference field points to a bound resource
    pub fn check_references(&self) -> GraphResult<()> {
        fn walk(graph: &ResourceGraph, resource: &Resource) -> GraphResult<()> {
            check_schema(graph, resource.path(), resource.schema())?;
            resource.children().try_for_each(|child| walk(graph, child))
        }
        fn check_schema(graph: &ResourceGraph, owner: &str, schema: &Schema) -> GraphResult<()> {
            for (name, field) in schema.fields() {
                check_field(graph, owner, name, field)?;
            }
            Ok(())
        }
        fn check_field(graph: &ResourceGraph, owner: &str, name: &str, field: &Field) -> GraphResult<()> {
            if let Some(path) = field.reference()
                && graph.get(path).is_none()
            {
                return Err(ConfigError::InvalidBinding {
                    resource: owner.to_string(),
                    message: format!("field '{}' references unknown resource '{}'", name, path),
                }
                .into());
            }
            if let Some(schema) = field.sub_schema() {
                check_schema(graph, owner, schema)?;
            }
            if let Some(element) = field.element()
                && let Some(schema) = element.sub_schema()
            {
                check_schema(graph, owner, schema)?;
            }
            Ok(())
        }
        self.roots.values().try_for_each(|root| walk(self, root))
    }
}
