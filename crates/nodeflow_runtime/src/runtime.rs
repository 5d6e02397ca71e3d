// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime facade wiring the manager, the scheduler and the output sinks.

use crate::event::{GraphEvent, SubscriberScope};
use crate::manager::{GraphManager, ManagerError};
use crate::output::OutputDispatcher;
use crate::scheduler::{InterpretationScheduler, InterpretationSubscriber};
use crate::subscriber::Subscription;
use nodeflow_graph::{EvaluationScope, GraphId, InterpretationReport, OperationRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Tunables for a [`GraphRuntime`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Interpretations allowed to run at once across all graphs
    pub max_concurrent_interpretations: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_concurrent_interpretations: 4,
        }
    }
}

/// A graph manager whose changes are interpreted in the background
pub struct GraphRuntime {
    manager: Arc<GraphManager>,
    outputs: Arc<OutputDispatcher>,
    scheduler: Arc<InterpretationScheduler>,
}

impl GraphRuntime {
    /// Build a runtime spawning interpretations onto `handle`
    pub fn new(operations: OperationRegistry, options: RuntimeOptions, handle: Handle) -> Self {
        let manager = Arc::new(GraphManager::new(Arc::new(operations)));
        let outputs = Arc::new(OutputDispatcher::new());
        let scheduler = Arc::new(InterpretationScheduler::new(
            Arc::downgrade(&manager),
            Arc::clone(&outputs),
            handle,
            options.max_concurrent_interpretations,
        ));

        manager.subscribe(
            SubscriberScope::All,
            Subscription::new([GraphEvent::GraphUpdated, GraphEvent::UiInputsUpdated]),
            Arc::new(InterpretationSubscriber::new(Arc::clone(&scheduler))),
        );
        tracing::info!(
            "Graph runtime started ({} operation(s), {} concurrent interpretation(s))",
            manager.operations().len(),
            options.max_concurrent_interpretations
        );

        Self {
            manager,
            outputs,
            scheduler,
        }
    }

    /// The graph manager
    pub fn manager(&self) -> &Arc<GraphManager> {
        &self.manager
    }

    /// The output dispatcher
    pub fn outputs(&self) -> &Arc<OutputDispatcher> {
        &self.outputs
    }

    /// The interpretation scheduler
    pub fn scheduler(&self) -> &Arc<InterpretationScheduler> {
        &self.scheduler
    }

    /// Interpret a graph on the calling thread and deliver its sink results
    pub fn interpret_now(&self, graph_id: GraphId) -> Result<InterpretationReport, ManagerError> {
        let report = self.manager.interpret(graph_id, EvaluationScope::Sinks)?;
        self.outputs.dispatch(graph_id, &report);
        Ok(report)
    }

    /// Wait for all background interpretations to finish
    pub async fn flush(&self) {
        self.scheduler.flush().await;
    }
}
