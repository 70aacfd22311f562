//! Structural+attribute export and best-effort reconstruction.
//!
//! A snapshot is a plain nested record: any serde format can persist it,
//! and nothing in it references runtime ids. The runtime never interprets
//! attribute contents; each entity type enumerates its own exportable state
//! through [`Entity::attributes`](crate::entity::Entity::attributes) and
//! re-applies it through `set_attribute` on restore.

use serde::{Deserialize, Serialize};

use crate::attr::{AttrError, Attrs};
use crate::entity::Entity;
use crate::error::{CoreError, ErrorSeverity};
use crate::graph::{HierarchyError, NodeId};
use crate::sim::{Context, Sim};

/// One exported node: identity, type tag, attributes, children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attributes: Attrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Total number of nodes in this snapshot, itself included.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NodeSnapshot::node_count)
            .sum::<usize>()
    }
}

/// The `type name -> factory` lookup `restore` consumes.
///
/// Concrete registries belong to the scene loader; the runtime only asks
/// them to produce a blank entity for a tag.
pub trait EntityRegistry {
    fn create(&self, type_name: &str) -> Option<Box<dyn Entity>>;
}

/// A problem encountered while rebuilding from a snapshot.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RestoreError {
    #[error("no factory registered for node type `{type_name}` (node `{name}`)")]
    UnknownType { name: String, type_name: String },

    #[error("node `{name}`: {source}")]
    Attribute {
        name: String,
        #[source]
        source: AttrError,
    },
}

impl CoreError for RestoreError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Recoverable
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownType { .. } => "restore/unknown-type",
            Self::Attribute { .. } => "restore/attribute",
        }
    }
}

/// Partial-result report returned by [`Sim::restore`].
#[derive(Debug)]
pub struct RestoreReport {
    /// Root of the rebuilt (detached) tree; `None` if the root node itself
    /// could not be resolved.
    pub root: Option<NodeId>,
    /// Every problem encountered, in traversal order.
    pub errors: Vec<RestoreError>,
}

impl RestoreReport {
    /// True when the whole snapshot was rebuilt without a hitch.
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.errors.is_empty()
    }
}

impl Sim {
    /// Exports `root` and its subtree depth-first.
    ///
    /// Attribute order is whatever each entity declares; child order is
    /// tree order. The output is deterministic for deterministic entities.
    pub fn snapshot(&self, root: NodeId) -> Result<NodeSnapshot, HierarchyError> {
        if !self.graph().contains(root) {
            return Err(HierarchyError::NodeNotFound(root));
        }
        Ok(self.snapshot_node(root))
    }

    fn snapshot_node(&self, id: NodeId) -> NodeSnapshot {
        let graph = self.graph();
        NodeSnapshot {
            name: graph.name(id).unwrap_or("").to_owned(),
            type_name: graph.type_name(id).unwrap_or("").to_owned(),
            attributes: graph
                .entity_ref(id)
                .map(|e| e.attributes())
                .unwrap_or_default(),
            children: graph
                .children(id)
                .iter()
                .map(|&child| self.snapshot_node(child))
                .collect(),
        }
    }

    /// Rebuilds a detached tree from `snapshot`, resolving each node's type
    /// through `registry`.
    ///
    /// Best-effort: a node whose type cannot be resolved is reported and
    /// skipped together with its subtree (there is no parent to attach the
    /// grandchildren to); rejected attributes are reported but keep their
    /// node. After the tree is built, every restored entity gets an
    /// `on_restore` call, depth-first, to resolve cross-node references.
    /// Attaching the returned root somewhere is the caller's decision.
    pub fn restore(
        &mut self,
        snapshot: &NodeSnapshot,
        registry: &dyn EntityRegistry,
    ) -> RestoreReport {
        let mut errors = Vec::new();
        let root = self.restore_node(snapshot, registry, &mut errors);
        if let Some(root) = root {
            self.run_restore_hooks(root);
        }
        RestoreReport { root, errors }
    }

    fn restore_node(
        &mut self,
        snapshot: &NodeSnapshot,
        registry: &dyn EntityRegistry,
        errors: &mut Vec<RestoreError>,
    ) -> Option<NodeId> {
        let Some(mut entity) = registry.create(&snapshot.type_name) else {
            tracing::debug!(
                name = %snapshot.name,
                type_name = %snapshot.type_name,
                "skipping snapshot node with unresolvable type"
            );
            errors.push(RestoreError::UnknownType {
                name: snapshot.name.clone(),
                type_name: snapshot.type_name.clone(),
            });
            return None;
        };
        for (key, value) in snapshot.attributes.iter() {
            if let Err(source) = entity.set_attribute(key, value) {
                errors.push(RestoreError::Attribute {
                    name: snapshot.name.clone(),
                    source,
                });
            }
        }
        let id = self.graph_mut().spawn_boxed(snapshot.name.clone(), entity);
        for child_snapshot in &snapshot.children {
            if let Some(child) = self.restore_node(child_snapshot, registry, errors) {
                // Both nodes are freshly spawned and unparented; this attach
                // cannot violate any structural precondition.
                let _ = self.add_child(id, child);
            }
        }
        Some(id)
    }

    fn run_restore_hooks(&mut self, root: NodeId) {
        let order: Vec<NodeId> = self.graph().descendants(root).collect();
        for id in order {
            let Some(mut entity) = self.graph_mut().checkout(id) else {
                continue;
            };
            {
                let mut ctx = Context {
                    sim: &mut *self,
                    node: id,
                };
                entity.on_restore(&mut ctx);
            }
            self.graph_mut().checkin(id, entity);
        }
    }
}
