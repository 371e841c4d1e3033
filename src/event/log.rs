//! EventLog - append-only record of a DAG execution
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: DAG, node and edge level events
//! - EventLog: thread-safe, shared by clones

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transform::ErrorKind;

/// Single event in the execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since execution start (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// Execution events
///
/// Uses Arc<str> for node/edge names so clones are cheap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // DAG LEVEL
    // ═══════════════════════════════════════════
    DagStarted {
        dag: Arc<str>,
        execution_date: String,
        source_nodes: Vec<Arc<str>>,
    },
    DagCompleted {
        dag: Arc<str>,
        edges_run: usize,
        failed_edges: usize,
        failed_nodes: usize,
        total_duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // NODE LEVEL
    // ═══════════════════════════════════════════
    NodeStarted {
        node: Arc<str>,
        batch_num: u64,
    },
    NodeCompleted {
        node: Arc<str>,
        batches: usize,
        duration_ms: u64,
    },
    NodeFailed {
        node: Arc<str>,
        error: String,
    },
    /// Asynchronous destination handed to a background task
    AsyncDispatched {
        node: Arc<str>,
        edge: Arc<str>,
    },

    // ═══════════════════════════════════════════
    // EDGE LEVEL
    // ═══════════════════════════════════════════
    EdgeEvaluated {
        edge: Arc<str>,
        batch_num: u64,
        steps: usize,
        /// Final value of the chain, error record included
        output: Arc<Value>,
        success: bool,
    },
    StepFailed {
        edge: Arc<str>,
        batch_num: u64,
        /// 1-based position in the chain; 0 for the adapter
        step: usize,
        error_kind: ErrorKind,
        message: String,
    },
}

impl EventKind {
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node, .. }
            | Self::NodeCompleted { node, .. }
            | Self::NodeFailed { node, .. }
            | Self::AsyncDispatched { node, .. } => Some(node),
            _ => None,
        }
    }

    pub fn edge(&self) -> Option<&str> {
        match self {
            Self::EdgeEvaluated { edge, .. }
            | Self::StepFailed { edge, .. }
            | Self::AsyncDispatched { edge, .. } => Some(edge),
            _ => None,
        }
    }

    pub fn is_dag_event(&self) -> bool {
        matches!(self, Self::DagStarted { .. } | Self::DagCompleted { .. })
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at execution start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Milliseconds since the log was created
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds the read lock for the duration of the callback.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    pub fn filter_node(&self, node: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.node() == Some(node))
                .cloned()
                .collect()
        })
    }

    pub fn filter_edge(&self, edge: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.edge() == Some(edge))
                .cloned()
                .collect()
        })
    }

    /// Serialize to JSON for export
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
