//! Event records, handler registration, and dispatch outcomes.
//!
//! Events are immutable records routed to per-node handler lists by the
//! dispatch engine in [`crate::sim`]. Handlers run in priority order over a
//! snapshot of the registration list, so registering or removing handlers
//! mid-dispatch never affects the in-flight pass.

use std::cell::Cell;
use std::rc::Rc;

use crate::attr::Attrs;
use crate::error::{CoreError, ErrorSeverity};
use crate::graph::NodeId;
use crate::sim::Context;

/// A monotonically increasing event identifier.
///
/// Ids reflect creation order across both synchronous and deferred
/// emissions, which makes event logs totally ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Per-simulation event id counter.
#[derive(Debug, Default)]
pub(crate) struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub(crate) fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

/// How far beyond its origin node an event travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Propagation {
    /// Origin handlers only.
    Local,
    /// Origin, then the parent chain toward the root.
    Up,
    /// Origin, then all descendants depth-first.
    Down,
    /// Origin, then ancestors, then descendants.
    Both,
}

/// A single dispatched event.
///
/// The record itself never changes after construction; the stop flag is the
/// one piece of interior mutability, letting handlers truncate propagation
/// through the shared reference they are given.
#[derive(Clone, Debug)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub payload: Attrs,
    pub direction: Propagation,
    /// Simulated time at emission.
    pub timestamp: f64,
    stopped: Cell<bool>,
}

impl Event {
    pub(crate) fn new(
        id: EventId,
        name: String,
        payload: Attrs,
        direction: Propagation,
        timestamp: f64,
    ) -> Self {
        Self {
            id,
            name,
            payload,
            direction,
            timestamp,
            stopped: Cell::new(false),
        }
    }

    /// Prevents the event from travelling past the node whose handlers are
    /// currently running. Remaining handlers on that node still run.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    /// Whether a handler has requested propagation to stop.
    pub fn propagation_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// Reads and clears the stop flag.
    ///
    /// The dispatch engine consumes the flag at each pruning decision so a
    /// stop inside one subtree does not leak into its siblings.
    pub(crate) fn take_stopped(&self) -> bool {
        self.stopped.replace(false)
    }
}

/// Handle returned by handler registration, used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "H{}", self.0)
    }
}

/// What a handler returns.
pub type HandlerResult = Result<(), HandlerError>;

/// The callback shape stored per registration.
///
/// Handlers are shared immutable closures; captured state goes through
/// `Cell`/`RefCell` in the caller. This is what lets a dispatch pass clone
/// the registration list cheaply and keep running handlers that were
/// removed mid-pass.
pub type HandlerFn = dyn Fn(&mut Context<'_>, &Event) -> HandlerResult;

/// An error raised by a handler during dispatch.
///
/// Contained at the dispatch boundary: logged, reported as a
/// [`HandlerFault`], and never allowed to abort the remaining handlers or
/// the enclosing pass.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<crate::graph::HierarchyError> for HandlerError {
    fn from(err: crate::graph::HierarchyError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<crate::schedule::ScheduleError> for HandlerError {
    fn from(err: crate::schedule::ScheduleError) -> Self {
        Self::new(err.to_string())
    }
}

impl CoreError for HandlerError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Recoverable
    }

    fn error_code(&self) -> &'static str {
        "handler/fault"
    }
}

/// A registered handler: callback plus ordering metadata.
///
/// Lists are kept sorted by descending priority; ties keep registration
/// order because new entries are inserted after existing equals.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) id: HandlerId,
    pub(crate) priority: i32,
    pub(crate) callback: Rc<HandlerFn>,
}

/// A contained handler failure, attributed to its node and registration.
#[derive(Clone, Debug)]
pub struct HandlerFault {
    pub node: NodeId,
    pub handler: HandlerId,
    pub event: EventId,
    pub error: HandlerError,
}

/// Outcome of one `emit` call.
#[derive(Clone, Debug)]
pub struct DispatchReport {
    pub event: EventId,
    /// Number of handler invocations that completed without error.
    pub delivered: u32,
    pub faults: Vec<HandlerFault>,
}

impl DispatchReport {
    pub(crate) fn new(event: EventId) -> Self {
        Self {
            event,
            delivered: 0,
            faults: Vec::new(),
        }
    }

    /// True when every invoked handler succeeded.
    pub fn ok(&self) -> bool {
        self.faults.is_empty()
    }
}
