//! Per-node update cadences decoupled from the global step.
//!
//! A [`Scheduler`] tracks nodes that asked to be updated every `interval`
//! simulated seconds instead of once per step. Registration flips the
//! node's scheduler-ownership flag in the graph, which makes the default
//! per-step traversal of its parent withhold the update call; from then on
//! only the scheduler invokes it.
//!
//! One scheduler exists per simulation instance, constructed and torn down
//! with it, so several simulations can share a process without cross-talk.

use crate::error::{CoreError, ErrorSeverity};
use crate::graph::{Graph, NodeId};

/// Invalid scheduling requests.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid update interval {interval}; intervals must be positive and finite")]
    InvalidInterval { interval: f64 },

    #[error("node {0} is not registered with the scheduler")]
    NotRegistered(NodeId),

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
}

impl CoreError for ScheduleError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInterval { .. } => "schedule/invalid-interval",
            Self::NotRegistered(_) => "schedule/not-registered",
            Self::UnknownNode(_) => "schedule/unknown-node",
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ScheduleEntry {
    node: NodeId,
    interval: f64,
    /// Simulated time accrued since this entry last fired.
    acc: f64,
    /// Overshoot from the previous fire, credited toward the next due test.
    carry: f64,
}

/// Tracks scheduled entries in registration order.
///
/// # Fire accounting
///
/// An entry fires when `acc + carry >= interval`. The node's update
/// receives the full `acc` (the exact simulated time since its last fire)
/// and the overshoot `acc + carry - interval` carries into the next window.
/// Total delivered time therefore always equals total ticked time (nothing
/// is lost), and the carry pulls the next due point forward so the long-run
/// rate stays at one fire per `interval` (nothing drifts). At most one fire
/// per entry per tick: a single fire already delivers all accrued time.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    /// The interval `node` is registered at, if any.
    pub fn interval_of(&self, node: NodeId) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.node == node)
            .map(|e| e.interval)
    }

    /// Registers `node` to be updated every `interval` simulated seconds,
    /// or replaces its interval if already registered. Accrued time is
    /// kept on replacement so elapsed accounting survives retuning.
    pub fn register(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        interval: f64,
    ) -> Result<(), ScheduleError> {
        if !(interval > 0.0) || !interval.is_finite() {
            return Err(ScheduleError::InvalidInterval { interval });
        }
        if !graph.contains(node) {
            return Err(ScheduleError::UnknownNode(node));
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.node == node) {
            entry.interval = interval;
            tracing::debug!(node = %node, interval, "rescheduled node");
        } else {
            self.entries.push(ScheduleEntry {
                node,
                interval,
                acc: 0.0,
                carry: 0.0,
            });
            graph.set_scheduled(node, true);
            tracing::debug!(node = %node, interval, "scheduled node");
        }
        Ok(())
    }

    /// Removes `node`'s entry; it reverts to default per-step updates via
    /// its parent's traversal.
    pub fn unregister(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), ScheduleError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.node == node)
            .ok_or(ScheduleError::NotRegistered(node))?;
        self.entries.remove(pos);
        graph.set_scheduled(node, false);
        tracing::debug!(node = %node, "unscheduled node");
        Ok(())
    }

    /// Accrues `dt` on every entry and returns `(node, elapsed)` pairs for
    /// the entries that came due, in registration order.
    pub(crate) fn accrue(&mut self, dt: f64) -> Vec<(NodeId, f64)> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            entry.acc += dt;
            if entry.acc + entry.carry >= entry.interval {
                let elapsed = entry.acc;
                entry.carry = entry.acc + entry.carry - entry.interval;
                entry.acc = 0.0;
                due.push((entry.node, elapsed));
            }
        }
        due
    }

    /// Drops entries whose node no longer exists.
    pub(crate) fn prune(&mut self, graph: &Graph) {
        self.entries.retain(|e| graph.contains(e.node));
    }
}
