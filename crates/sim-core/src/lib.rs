//! Deterministic entity-tree runtime for step-driven simulations.
//!
//! `sim-core` maintains a hierarchical graph of simulation entities, routes
//! named events up and down that hierarchy, advances entity state once per
//! simulation step, and lets individual nodes opt out of the per-step
//! traversal in favor of their own update cadence. Scenario crates (farms,
//! wars, cities) build their domain nodes on top of these primitives; this
//! crate contains no domain logic of its own.
//!
//! Everything runs on a single thread. "Concurrency" here means reentrancy:
//! an update or event handler may freely add and remove nodes, register and
//! unregister handlers, or emit further events while a pass is in flight.
//! Every traversal iterates a stable snapshot taken at the start of the
//! pass, so in-flight mutation takes effect on the next pass instead of
//! corrupting the current one.
//!
//! Modules are organized by responsibility:
//! - [`graph`] owns the tree structure and structural operations
//! - [`event`] defines event records, handler registration, and faults
//! - [`schedule`] decouples a node's update cadence from the global step
//! - [`snapshot`] exports and rebuilds structural+attribute dumps
//! - [`sim`] hosts the facade that wires the components together
//! - [`entity`] and [`attr`] define the domain-facing behavior surface
pub mod attr;
pub mod entity;
pub mod error;
pub mod event;
pub mod graph;
pub mod schedule;
pub mod sim;
pub mod snapshot;

pub use attr::{AttrError, AttrValue, Attrs};
pub use entity::{Entity, Group};
pub use error::{CoreError, ErrorSeverity};
pub use event::{
    DispatchReport, Event, EventId, HandlerError, HandlerFault, HandlerId, HandlerResult,
    Propagation,
};
pub use graph::{Descendants, Graph, HierarchyError, NodeId};
pub use schedule::{ScheduleError, Scheduler};
pub use sim::{Context, Sim};
pub use snapshot::{EntityRegistry, NodeSnapshot, RestoreError, RestoreReport};
