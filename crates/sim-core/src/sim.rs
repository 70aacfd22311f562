//! The simulation facade: one graph, one scheduler, one clock.
//!
//! [`Sim`] wires the components together and hosts the two traversals that
//! need all of them at once: the per-step update pass and event dispatch.
//! Entity code and handlers interact with the running simulation through
//! [`Context`], which scopes every capability to the node currently being
//! served.
//!
//! # Reentrancy
//!
//! All traversal here follows one rule: snapshot, then iterate. Child lists
//! and handler lists are copied at the start of a pass, so a handler that
//! rewires the tree or the registrations mid-pass affects the next pass,
//! never the current one. The entity whose `update` is running is checked
//! out of its slot for the duration of the call; recursive lookups observe
//! it as absent instead of aliasing it.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::attr::Attrs;
use crate::entity::Entity;
use crate::event::{
    DispatchReport, Event, EventId, EventIdGen, HandlerEntry, HandlerFault, HandlerId,
    HandlerResult, Propagation,
};
use crate::graph::{Graph, HierarchyError, NodeId};
use crate::schedule::{ScheduleError, Scheduler};

struct PendingEmit {
    origin: NodeId,
    event: Event,
}

/// A single simulation instance.
///
/// `Sim` is single-threaded by design; one logical thread drives every
/// `update`/`tick`/`emit` call. Run several simulations in one process by
/// constructing several `Sim`s; each owns its own scheduler and clock.
pub struct Sim {
    graph: Graph,
    scheduler: Scheduler,
    event_ids: EventIdGen,
    next_handler: u64,
    /// Simulated seconds since construction; stamps emitted events.
    time: f64,
    /// Reentrancy depth of update/dispatch passes. The deferred queue
    /// drains when the outermost pass unwinds.
    depth: u32,
    queue: VecDeque<PendingEmit>,
}

impl Sim {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            scheduler: Scheduler::new(),
            event_ids: EventIdGen::default(),
            next_handler: 0,
            time: 0.0,
            depth: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Current simulated time in seconds.
    pub fn now(&self) -> f64 {
        self.time
    }

    /// Advances the clock without running a pass. [`step`](Self::step)
    /// already advances it; manual drivers that call `update`/`tick`
    /// directly use this.
    pub fn advance(&mut self, dt: f64) {
        self.time += dt;
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn spawn(&mut self, name: impl Into<String>, entity: impl Entity) -> NodeId {
        self.graph.spawn(name, entity)
    }

    pub fn spawn_boxed(&mut self, name: String, entity: Box<dyn Entity>) -> NodeId {
        self.graph.spawn_boxed(name, entity)
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        self.graph.add_child(parent, child)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        self.graph.remove_child(parent, child)
    }

    /// Destroys `id` and its subtree, dropping any schedule entries that
    /// pointed into it.
    pub fn despawn(&mut self, id: NodeId) -> Result<usize, HierarchyError> {
        let freed = self.graph.despawn(id)?;
        self.scheduler.prune(&self.graph);
        Ok(freed)
    }

    // ------------------------------------------------------------------
    // Event channel
    // ------------------------------------------------------------------

    /// Registers `callback` for `event` on `node`. Higher priorities run
    /// first; equal priorities run in registration order.
    pub fn on<F>(
        &mut self,
        node: NodeId,
        event: &str,
        priority: i32,
        callback: F,
    ) -> Result<HandlerId, HierarchyError>
    where
        F: Fn(&mut Context<'_>, &Event) -> HandlerResult + 'static,
    {
        if !self.graph.contains(node) {
            return Err(HierarchyError::NodeNotFound(node));
        }
        let id = HandlerId::new(self.next_handler);
        self.next_handler += 1;
        self.graph.add_handler(
            node,
            event,
            HandlerEntry {
                id,
                priority,
                callback: Rc::new(callback),
            },
        );
        Ok(id)
    }

    /// Unregisters a handler. Returns whether anything was removed;
    /// absence is not an error because concurrent removal is expected.
    pub fn off(&mut self, node: NodeId, event: &str, handler: HandlerId) -> bool {
        self.graph.remove_handler(node, event, handler)
    }

    /// Emits an event from `origin` and dispatches it synchronously,
    /// including any propagation, before returning.
    pub fn emit(
        &mut self,
        origin: NodeId,
        name: &str,
        payload: Attrs,
        direction: Propagation,
    ) -> Result<DispatchReport, HierarchyError> {
        if !self.graph.contains(origin) {
            return Err(HierarchyError::NodeNotFound(origin));
        }
        let event = Event::new(
            self.event_ids.next_id(),
            name.to_owned(),
            payload,
            direction,
            self.time,
        );
        self.depth += 1;
        let report = self.dispatch(origin, &event);
        self.unwind();
        Ok(report)
    }

    /// Enqueues an event for delivery after the current call stack
    /// unwinds. Deliveries preserve enqueue order across all deferred
    /// emissions. Called outside any pass, the queue drains immediately.
    pub fn emit_async(
        &mut self,
        origin: NodeId,
        name: &str,
        payload: Attrs,
        direction: Propagation,
    ) -> Result<EventId, HierarchyError> {
        if !self.graph.contains(origin) {
            return Err(HierarchyError::NodeNotFound(origin));
        }
        let id = self.enqueue(origin, name, payload, direction);
        if self.depth == 0 {
            self.depth += 1;
            self.unwind();
        }
        Ok(id)
    }

    fn enqueue(
        &mut self,
        origin: NodeId,
        name: &str,
        payload: Attrs,
        direction: Propagation,
    ) -> EventId {
        let id = self.event_ids.next_id();
        self.queue.push_back(PendingEmit {
            origin,
            event: Event::new(id, name.to_owned(), payload, direction, self.time),
        });
        id
    }

    // ------------------------------------------------------------------
    // Update traversal
    // ------------------------------------------------------------------

    /// Runs an update pass over `node` and its subtree.
    ///
    /// Each node updates itself first, then its children in insertion
    /// order, iterating a snapshot of the child list taken at the start of
    /// that node's pass: children added mid-pass wait for the next pass,
    /// children removed mid-pass are skipped when reached. Children under
    /// scheduler management are withheld entirely.
    pub fn update(&mut self, node: NodeId, dt: f64) -> Result<(), HierarchyError> {
        if !self.graph.contains(node) {
            return Err(HierarchyError::NodeNotFound(node));
        }
        self.depth += 1;
        self.update_node(node, dt);
        self.unwind();
        Ok(())
    }

    fn update_node(&mut self, node: NodeId, dt: f64) {
        // The snapshot precedes the entity's own update so that children it
        // adds are not visited until the next pass.
        let children = self.graph.children_snapshot(node);
        let Some(mut entity) = self.graph.checkout(node) else {
            return;
        };
        {
            let mut ctx = Context {
                sim: &mut *self,
                node,
            };
            entity.update(&mut ctx, dt);
        }
        self.graph.checkin(node, entity);
        for child in children {
            if self.graph.parent(child) != Some(node) {
                continue;
            }
            if self.graph.is_scheduled(child) {
                continue;
            }
            self.update_node(child, dt);
        }
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    /// Hands `node`'s update cadence to the scheduler; see
    /// [`Scheduler::register`].
    pub fn schedule(&mut self, node: NodeId, interval: f64) -> Result<(), ScheduleError> {
        self.scheduler.register(&mut self.graph, node, interval)
    }

    pub fn unschedule(&mut self, node: NodeId) -> Result<(), ScheduleError> {
        self.scheduler.unregister(&mut self.graph, node)
    }

    /// Advances every schedule entry by `dt` and updates the nodes that
    /// came due, each with its exact accrued elapsed time.
    pub fn tick(&mut self, dt: f64) {
        self.depth += 1;
        self.tick_inner(dt);
        self.unwind();
    }

    fn tick_inner(&mut self, dt: f64) {
        self.scheduler.prune(&self.graph);
        let due = self.scheduler.accrue(dt);
        for (node, elapsed) in due {
            // An earlier fire this tick may have unregistered or despawned
            // a later entry.
            if !self.scheduler.contains(node) || !self.graph.contains(node) {
                continue;
            }
            self.update_node(node, elapsed);
        }
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    /// One full simulation step: advance the clock, update the tree from
    /// `root`, tick the scheduler, drain deferred events.
    pub fn step(&mut self, root: NodeId, dt: f64) -> Result<(), HierarchyError> {
        if !self.graph.contains(root) {
            return Err(HierarchyError::NodeNotFound(root));
        }
        self.time += dt;
        self.depth += 1;
        self.update_node(root, dt);
        self.tick_inner(dt);
        self.unwind();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch engine
    // ------------------------------------------------------------------

    /// Leaves one pass level; the outermost leave drains the deferred
    /// queue. The depth is held during the drain so nested passes started
    /// by drained events cannot re-enter it.
    fn unwind(&mut self) {
        if self.depth == 1 {
            while let Some(pending) = self.queue.pop_front() {
                if self.graph.contains(pending.origin) {
                    self.dispatch(pending.origin, &pending.event);
                } else {
                    tracing::trace!(
                        event = %pending.event.id,
                        origin = %pending.origin,
                        "dropping deferred event from removed origin"
                    );
                }
            }
        }
        self.depth -= 1;
    }

    fn dispatch(&mut self, origin: NodeId, event: &Event) -> DispatchReport {
        tracing::trace!(
            event = %event.id,
            name = %event.name,
            origin = %origin,
            direction = %event.direction,
            "dispatching event"
        );
        let mut report = DispatchReport::new(event.id);
        let children = self.graph.children_snapshot(origin);
        self.deliver_local(origin, event, &mut report);
        let stopped = event.take_stopped();
        match event.direction {
            Propagation::Local => {}
            Propagation::Up if !stopped => self.ascend(origin, event, &mut report),
            Propagation::Down if !stopped => self.descend(children, origin, event, &mut report),
            Propagation::Both if !stopped => {
                self.ascend(origin, event, &mut report);
                self.descend(children, origin, event, &mut report);
            }
            _ => {}
        }
        report
    }

    /// Walks the parent chain; a stop at any ancestor ends the walk.
    fn ascend(&mut self, origin: NodeId, event: &Event, report: &mut DispatchReport) {
        let mut cursor = self.graph.parent(origin);
        while let Some(node) = cursor {
            self.deliver_local(node, event, report);
            if event.take_stopped() {
                break;
            }
            cursor = self.graph.parent(node);
        }
    }

    /// Depth-first delivery to `parent`'s children, iterating the snapshot
    /// taken before `parent`'s own handlers ran. A stop at a child prunes
    /// that child's subtree only; its siblings still receive the event.
    fn descend(
        &mut self,
        children: Vec<NodeId>,
        parent: NodeId,
        event: &Event,
        report: &mut DispatchReport,
    ) {
        for child in children {
            if self.graph.parent(child) != Some(parent) {
                continue;
            }
            let grandchildren = self.graph.children_snapshot(child);
            self.deliver_local(child, event, report);
            if event.take_stopped() {
                continue;
            }
            self.descend(grandchildren, child, event, report);
        }
    }

    /// Runs one node's handlers for the event, over a snapshot of its
    /// registration list. A failing handler is recorded and logged; the
    /// remaining handlers still run.
    fn deliver_local(&mut self, node: NodeId, event: &Event, report: &mut DispatchReport) {
        let Some(entries) = self.graph.handler_snapshot(node, &event.name) else {
            return;
        };
        for entry in entries {
            let mut ctx = Context {
                sim: &mut *self,
                node,
            };
            match (entry.callback)(&mut ctx, event) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    tracing::warn!(
                        node = %node,
                        handler = %entry.id,
                        event = %event.id,
                        %error,
                        "event handler failed"
                    );
                    report.faults.push(HandlerFault {
                        node,
                        handler: entry.id,
                        event: event.id,
                        error,
                    });
                }
            }
        }
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

/// Capabilities handed to entity updates and event handlers.
///
/// A context is scoped to the node being served but grants access to the
/// whole simulation; every structural or dispatch call made through it
/// follows the same reentrancy rules as the top-level API.
pub struct Context<'a> {
    pub(crate) sim: &'a mut Sim,
    pub(crate) node: NodeId,
}

impl Context<'_> {
    /// The node whose update or handler is currently running.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn now(&self) -> f64 {
        self.sim.now()
    }

    /// Escape hatch to the full simulation API.
    pub fn sim(&mut self) -> &mut Sim {
        self.sim
    }

    pub fn graph(&self) -> &Graph {
        self.sim.graph()
    }

    // -- structure ------------------------------------------------------

    pub fn spawn(&mut self, name: impl Into<String>, entity: impl Entity) -> NodeId {
        self.sim.spawn(name, entity)
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        self.sim.add_child(parent, child)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        self.sim.remove_child(parent, child)
    }

    pub fn despawn(&mut self, id: NodeId) -> Result<usize, HierarchyError> {
        self.sim.despawn(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.sim.graph.parent(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.sim.graph.children(id)
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.sim.graph.find_child(parent, name)
    }

    pub fn find(&self, root: NodeId, path: &str) -> Option<NodeId> {
        self.sim.graph.find(root, path)
    }

    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        self.sim.graph.root_of(id)
    }

    pub fn entity<T: Entity>(&self, id: NodeId) -> Option<&T> {
        self.sim.graph.entity(id)
    }

    pub fn entity_mut<T: Entity>(&mut self, id: NodeId) -> Option<&mut T> {
        self.sim.graph.entity_mut(id)
    }

    // -- events ---------------------------------------------------------

    /// Emits synchronously from the current node.
    ///
    /// Unlike [`Sim::emit`] this is infallible: if the current node was
    /// detached and destroyed earlier in the same pass, there is nobody to
    /// deliver to and the report comes back empty.
    pub fn emit(&mut self, name: &str, payload: Attrs, direction: Propagation) -> DispatchReport {
        let event = Event::new(
            self.sim.event_ids.next_id(),
            name.to_owned(),
            payload,
            direction,
            self.sim.time,
        );
        self.sim.depth += 1;
        let report = if self.sim.graph.contains(self.node) {
            self.sim.dispatch(self.node, &event)
        } else {
            DispatchReport::new(event.id)
        };
        self.sim.unwind();
        report
    }

    /// Defers an emission from the current node until the outermost pass
    /// unwinds. If the node is gone by then, the event is dropped.
    pub fn emit_async(&mut self, name: &str, payload: Attrs, direction: Propagation) -> EventId {
        self.sim.enqueue(self.node, name, payload, direction)
    }

    pub fn on<F>(
        &mut self,
        node: NodeId,
        event: &str,
        priority: i32,
        callback: F,
    ) -> Result<HandlerId, HierarchyError>
    where
        F: Fn(&mut Context<'_>, &Event) -> HandlerResult + 'static,
    {
        self.sim.on(node, event, priority, callback)
    }

    pub fn off(&mut self, node: NodeId, event: &str, handler: HandlerId) -> bool {
        self.sim.off(node, event, handler)
    }

    // -- scheduling -----------------------------------------------------

    pub fn schedule(&mut self, node: NodeId, interval: f64) -> Result<(), ScheduleError> {
        self.sim.schedule(node, interval)
    }

    pub fn unschedule(&mut self, node: NodeId) -> Result<(), ScheduleError> {
        self.sim.unschedule(node)
    }
}
