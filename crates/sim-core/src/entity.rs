//! The behavior surface domain nodes implement.
//!
//! The runtime treats entity internals as opaque: it stores one boxed
//! [`Entity`] per node, calls [`Entity::update`] during traversal, and uses
//! the attribute export/import hooks for snapshots. Everything else an
//! entity does happens through the [`Context`] it receives.

use std::any::Any;

use crate::attr::{AttrError, AttrValue, Attrs};
use crate::sim::Context;

/// Trait implemented by every simulated entity.
///
/// # Contract
/// - `update` must go through `ctx` for all interaction with the rest of
///   the tree (emitting events, spawning or removing nodes, scheduling).
/// - `attributes` must enumerate exportable state deterministically: the
///   same state yields the same keys in the same order.
/// - While a node's `update` runs, the entity is checked out of its slot;
///   handlers that look the node up through the graph observe it as absent
///   rather than aliasing it.
pub trait Entity: Any {
    /// Stable type tag recorded in snapshots and resolved by the registry
    /// on restore.
    fn type_name(&self) -> &'static str;

    /// Advance internal state by `dt` simulated seconds.
    fn update(&mut self, _ctx: &mut Context<'_>, _dt: f64) {}

    /// Enumerate exportable state as an ordered key/value list.
    fn attributes(&self) -> Attrs {
        Attrs::new()
    }

    /// Re-apply one exported attribute during restore.
    ///
    /// The default accepts and ignores everything, which is correct for
    /// entities with no exportable state.
    fn set_attribute(&mut self, _key: &str, _value: &AttrValue) -> Result<(), AttrError> {
        Ok(())
    }

    /// Called once per restored node after the whole tree has been rebuilt.
    ///
    /// This is where entities resolve references to other nodes (by name or
    /// path) that could not exist while the tree was still partial.
    fn on_restore(&mut self, _ctx: &mut Context<'_>) {}

    /// Downcast support for inspection.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A plain structural entity with no behavior or state.
///
/// Used for grouping nodes that exist only to shape the tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct Group;

impl Entity for Group {
    fn type_name(&self) -> &'static str {
        "Group"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
