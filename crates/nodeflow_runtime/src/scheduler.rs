// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background interpretation scheduling.
//!
//! Change notifications arrive on the mutating thread, so the subscriber only
//! records a request here. Each graph has at most one interpretation in
//! flight; requests arriving while it runs are coalesced into a single rerun
//! once it completes. The interpretation itself
//! runs on tokio's blocking pool, bounded by a semaphore across graphs.

use crate::event::GraphChange;
use crate::manager::{GraphManager, ManagerError};
use crate::output::OutputDispatcher;
use crate::subscriber::{GraphSubscriber, SubscriberError};
use nodeflow_graph::{EvaluationScope, GraphId, InterpretationReport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Running,
    RunningDirty,
}

/// What happened to an interpretation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new interpretation was spawned
    Started,
    /// An interpretation is already in flight and will run again
    Coalesced,
}

/// Runs interpretations off the mutating thread, one in flight per graph
pub struct InterpretationScheduler {
    manager: Weak<GraphManager>,
    outputs: Arc<OutputDispatcher>,
    handle: Handle,
    permits: Arc<Semaphore>,
    slots: Mutex<HashMap<GraphId, SlotState>>,
    idle: Notify,
    completed: AtomicU64,
}

impl InterpretationScheduler {
    /// Create a scheduler spawning onto the given runtime
    pub fn new(
        manager: Weak<GraphManager>,
        outputs: Arc<OutputDispatcher>,
        handle: Handle,
        max_concurrent: usize,
    ) -> Self {
        Self {
            manager,
            outputs,
            handle,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            slots: Mutex::new(HashMap::new()),
            idle: Notify::new(),
            completed: AtomicU64::new(0),
        }
    }

    /// Ask for a graph to be interpreted
    pub fn request(self: &Arc<Self>, graph_id: GraphId) -> RequestOutcome {
        let mut slots = self.slots.lock();
        if let Some(state) = slots.get_mut(&graph_id) {
            *state = SlotState::RunningDirty;
            tracing::trace!("Graph {}: interpretation coalesced", graph_id);
            return RequestOutcome::Coalesced;
        }
        slots.insert(graph_id, SlotState::Running);
        drop(slots);

        let scheduler = Arc::clone(self);
        self.handle.spawn(async move { scheduler.drive(graph_id).await });
        RequestOutcome::Started
    }

    /// Whether no interpretation is in flight
    pub fn is_idle(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Number of interpretation passes run so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Wait until every requested interpretation, reruns included, has finished
    pub async fn flush(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    async fn drive(self: Arc<Self>, graph_id: GraphId) {
        loop {
            let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
                tracing::warn!("Interpretation permits closed, dropping graph {}", graph_id);
                self.slots.lock().remove(&graph_id);
                self.idle.notify_waiters();
                return;
            };

            if let Some(manager) = self.manager.upgrade() {
                let outcome = tokio::task::spawn_blocking(move || {
                    manager.interpret(graph_id, EvaluationScope::Sinks)
                })
                .await;

                match outcome {
                    Ok(result) => self.deliver(graph_id, result),
                    Err(e) => tracing::error!("Interpretation of graph {} panicked: {}", graph_id, e),
                }
                self.completed.fetch_add(1, Ordering::AcqRel);
            }

            if !self.finish(graph_id) {
                return;
            }
        }
    }

    fn deliver(
        &self,
        graph_id: GraphId,
        result: Result<InterpretationReport, ManagerError>,
    ) {
        match result {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::warn!(
                        "Graph {}: node {} failed: {}",
                        graph_id,
                        failure.node,
                        failure.error
                    );
                }
                let delivered = self.outputs.dispatch(graph_id, &report);
                tracing::debug!(
                    "Graph {}: evaluated {} node(s), reused {}, {} sink delivery(ies)",
                    graph_id,
                    report.evaluated.len(),
                    report.reused.len(),
                    delivered
                );
            }
            Err(ManagerError::GraphNotFound(_)) => {
                tracing::debug!("Graph {} closed before interpretation", graph_id);
            }
            Err(e) => tracing::warn!("Interpretation of graph {} failed: {}", graph_id, e),
        }
    }

    /// Clear the slot after a pass; returns whether another pass is due
    fn finish(&self, graph_id: GraphId) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&graph_id).copied() {
            Some(SlotState::RunningDirty) => {
                slots.insert(graph_id, SlotState::Running);
                true
            }
            _ => {
                slots.remove(&graph_id);
                let idle = slots.is_empty();
                drop(slots);
                if idle {
                    self.idle.notify_waiters();
                }
                false
            }
        }
    }
}

/// Subscriber turning graph changes into interpretation requests
pub struct InterpretationSubscriber {
    scheduler: Arc<InterpretationScheduler>,
}

impl InterpretationSubscriber {
    /// Wrap a scheduler
    pub fn new(scheduler: Arc<InterpretationScheduler>) -> Self {
        Self { scheduler }
    }
}

impl GraphSubscriber for InterpretationSubscriber {
    fn on_graph_changed(&self, change: &GraphChange<'_>) -> Result<(), SubscriberError> {
        self.scheduler.request(change.graph_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_graph::builtins::create_builtin_registry;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_flush_when_idle_returns() {
        let manager = Arc::new(GraphManager::new(Arc::new(create_builtin_registry())));
        let scheduler = InterpretationScheduler::new(
            Arc::downgrade(&manager),
            Arc::new(OutputDispatcher::new()),
            Handle::current(),
            1,
        );
        scheduler.flush().await;
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.completed(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_on_closed_graph_finishes() {
        let manager = Arc::new(GraphManager::new(Arc::new(create_builtin_registry())));
        let scheduler = Arc::new(InterpretationScheduler::new(
            Arc::downgrade(&manager),
            Arc::new(OutputDispatcher::new()),
            Handle::current(),
            1,
        ));

        assert_eq!(scheduler.request(GraphId::new()), RequestOutcome::Started);
        scheduler.flush().await;
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.completed(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_manager_is_skipped() {
        let manager = Arc::new(GraphManager::new(Arc::new(create_builtin_registry())));
        let scheduler = Arc::new(InterpretationScheduler::new(
            Arc::downgrade(&manager),
            Arc::new(OutputDispatcher::new()),
            Handle::current(),
            1,
        ));
        drop(manager);

        scheduler.request(GraphId::new());
        scheduler.flush().await;
        assert_eq!(scheduler.completed(), 0);
    }
}
