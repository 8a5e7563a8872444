//! Progress reporting.
//!
//! Research execution is decoupled from whatever consumes progress through
//! a single injected `ProgressSink`. Reporting is fire-and-forget: sinks
//! must never block research and have no way to fail the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::model::{NodeStatus, ResearchNode};

/// Where in a node's lifecycle a progress event was emitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// The branch started executing.
    Started,
    /// Retrieval finished (possibly degraded to zero sources).
    Retrieved,
    /// Learning/sub-query extraction finished.
    Extracted,
    /// The branch finished.
    Finished,
}

/// A structured progress event. Immutable; emitted and forgotten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub node_id: Uuid,
    /// Depth of the node below the root (root is 0).
    pub depth: usize,
    /// Position among siblings (0-based).
    pub breadth_index: usize,
    /// Number of siblings at this level.
    pub total_breadth: usize,
    pub query: String,
    pub stage: ProgressStage,
    pub status: NodeStatus,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Build an event for a node at the given stage.
    pub fn for_node(
        node: &ResearchNode,
        max_depth: usize,
        stage: ProgressStage,
        status: NodeStatus,
    ) -> Self {
        Self {
            node_id: node.id,
            depth: node.level(max_depth),
            breadth_index: node.breadth_index,
            total_breadth: node.total_breadth,
            query: node.query.text.clone(),
            stage,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Receives progress events from research branches.
///
/// Implementations must not block and must swallow their own transport
/// errors; the engine calls `report` inline from branch execution.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A sink that discards every event.
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// A sink that appends events to an in-memory list.
///
/// Useful for tests and for embedders that want to inspect a run after the
/// fact.
#[derive(Default)]
pub struct CollectingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events reported so far, in emission order.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectingProgressSink {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A sink that forwards events to `tracing`.
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report(&self, event: ProgressEvent) {
        tracing::info!(
            node_id = %event.node_id,
            depth = event.depth,
            breadth_index = event.breadth_index,
            total_breadth = event.total_breadth,
            stage = ?event.stage,
            status = ?event.status,
            query = %event.query,
            "research progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResearchQuery;

    #[test]
    fn test_collecting_sink_preserves_order() {
        let node = ResearchNode::root(ResearchQuery::root("q"), 2, 4);
        let sink = CollectingProgressSink::new();

        sink.report(ProgressEvent::for_node(
            &node,
            2,
            ProgressStage::Started,
            NodeStatus::Running,
        ));
        sink.report(ProgressEvent::for_node(
            &node,
            2,
            ProgressStage::Finished,
            NodeStatus::Completed,
        ));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, ProgressStage::Started);
        assert_eq!(events[1].stage, ProgressStage::Finished);
        assert_eq!(events[0].depth, 0);
        assert_eq!(events[0].node_id, node.id);
    }

    #[test]
    fn test_event_depth_from_remaining() {
        let root = ResearchNode::root(ResearchQuery::root("q"), 3, 2);
        let child = root.child(ResearchQuery::root("sub"), 2, 0, 2);
        let event =
            ProgressEvent::for_node(&child, 3, ProgressStage::Started, NodeStatus::Running);
        assert_eq!(event.depth, 1);
    }
}
