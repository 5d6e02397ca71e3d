// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media outputs and the sinks that consume them.
//!
//! An output node whose branch failed, or that has nothing connected, never
//! keeps showing its previous value: the dispatcher forgets it and tells the
//! sinks of that output ID through [`OutputSink::on_cleared`].

use indexmap::IndexMap;
use nodeflow_graph::{GraphId, InterpretationReport, NodeId, Value};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Final value produced by an output node
#[derive(Debug, Clone, PartialEq)]
pub struct MediaOutput {
    /// Graph the value was computed in
    pub graph_id: GraphId,
    /// Output node that produced it
    pub node_id: NodeId,
    /// Output ID configured on the node
    pub output_id: String,
    /// Computed value
    pub value: Value,
}

/// Output node that produced no value in the latest interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCleared {
    /// Graph the output node lives in
    pub graph_id: GraphId,
    /// Output node
    pub node_id: NodeId,
    /// Output ID configured on the node
    pub output_id: String,
}

/// Consumer of media outputs, e.g. a preview panel or exporter
pub trait OutputSink: Send + Sync {
    /// Handle a freshly computed output
    fn on_output(&self, output: &MediaOutput);

    /// The output node failed or lost its input; drop whatever it last showed
    fn on_cleared(&self, _cleared: &OutputCleared) {}
}

impl<F> OutputSink for F
where
    F: Fn(&MediaOutput) + Send + Sync,
{
    fn on_output(&self, output: &MediaOutput) {
        self(output)
    }
}

/// Consumer of the set of live output IDs across all graphs
pub trait OutputIdsListener: Send + Sync {
    /// Called with the full set whenever it changes
    fn on_output_ids_changed(&self, output_ids: &BTreeSet<String>);
}

impl<F> OutputIdsListener for F
where
    F: Fn(&BTreeSet<String>) + Send + Sync,
{
    fn on_output_ids_changed(&self, output_ids: &BTreeSet<String>) {
        self(output_ids)
    }
}

/// Routes media outputs to the sinks registered for their output ID
#[derive(Default)]
pub struct OutputDispatcher {
    sinks: RwLock<IndexMap<String, Vec<Arc<dyn OutputSink>>>>,
    latest: RwLock<HashMap<String, MediaOutput>>,
}

impl OutputDispatcher {
    /// Create a dispatcher with no sinks
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for an output ID
    pub fn add_sink(&self, output_id: impl Into<String>, sink: Arc<dyn OutputSink>) {
        self.sinks.write().entry(output_id.into()).or_default().push(sink);
    }

    /// Deliver the sink results of an interpretation, returning how many sinks were called
    pub fn dispatch(&self, graph_id: GraphId, report: &InterpretationReport) -> usize {
        let mut delivered = 0;
        for value in &report.sinks {
            let output = MediaOutput {
                graph_id,
                node_id: value.node,
                output_id: value.output_id.clone(),
                value: value.value.clone(),
            };

            let sinks = self.sinks_for(&output.output_id);
            for sink in &sinks {
                sink.on_output(&output);
            }
            delivered += sinks.len();

            tracing::debug!(
                "Output {} updated by graph {} ({} sink(s))",
                output.output_id,
                graph_id,
                sinks.len()
            );
            self.latest.write().insert(output.output_id.clone(), output);
        }

        for unresolved in &report.unresolved_sinks {
            let cleared = OutputCleared {
                graph_id,
                node_id: unresolved.node,
                output_id: unresolved.output_id.clone(),
            };

            // Only the node that produced the last value can invalidate it
            let mut latest = self.latest.write();
            if latest
                .get(&cleared.output_id)
                .is_some_and(|o| o.graph_id == graph_id && o.node_id == cleared.node_id)
            {
                latest.remove(&cleared.output_id);
            }
            drop(latest);

            let sinks = self.sinks_for(&cleared.output_id);
            for sink in &sinks {
                sink.on_cleared(&cleared);
            }
            delivered += sinks.len();
            tracing::debug!(
                "Output {} cleared by graph {} ({} sink(s))",
                cleared.output_id,
                graph_id,
                sinks.len()
            );
        }
        delivered
    }

    /// Most recent output delivered under an output ID
    pub fn latest(&self, output_id: &str) -> Option<MediaOutput> {
        self.latest.read().get(output_id).cloned()
    }

    fn sinks_for(&self, output_id: &str) -> Vec<Arc<dyn OutputSink>> {
        self.sinks.read().get(output_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_graph::{SinkValue, UnresolvedSink};
    use parking_lot::Mutex;

    fn report(sinks: Vec<SinkValue>, unresolved_sinks: Vec<UnresolvedSink>) -> InterpretationReport {
        InterpretationReport {
            sinks,
            unresolved_sinks,
            ..InterpretationReport::default()
        }
    }

    #[test]
    fn test_dispatch_routes_by_output_id() {
        let dispatcher = OutputDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        dispatcher.add_sink(
            "preview",
            Arc::new(move |output: &MediaOutput| sink_seen.lock().push(output.value.clone())),
        );

        let graph_id = GraphId::new();
        let values = vec![
            SinkValue {
                node: NodeId::new(),
                output_id: "preview".to_string(),
                value: Value::Float(7.0),
            },
            SinkValue {
                node: NodeId::new(),
                output_id: "export".to_string(),
                value: Value::Float(1.0),
            },
        ];

        assert_eq!(dispatcher.dispatch(graph_id, &report(values, Vec::new())), 1);
        assert_eq!(*seen.lock(), vec![Value::Float(7.0)]);
        assert_eq!(dispatcher.latest("export").map(|o| o.value), Some(Value::Float(1.0)));
        assert!(dispatcher.latest("missing").is_none());
    }

    struct Recording {
        cleared: Mutex<Vec<OutputCleared>>,
    }

    impl OutputSink for Recording {
        fn on_output(&self, _output: &MediaOutput) {}

        fn on_cleared(&self, cleared: &OutputCleared) {
            self.cleared.lock().push(cleared.clone());
        }
    }

    #[test]
    fn test_unresolved_sink_clears_its_own_value() {
        let dispatcher = OutputDispatcher::new();
        let recording = Arc::new(Recording {
            cleared: Mutex::new(Vec::new()),
        });
        dispatcher.add_sink("preview", recording.clone());

        let graph_id = GraphId::new();
        let node = NodeId::new();
        let good = SinkValue {
            node,
            output_id: "preview".to_string(),
            value: Value::Float(5.0),
        };
        dispatcher.dispatch(graph_id, &report(vec![good], Vec::new()));
        assert!(dispatcher.latest("preview").is_some());

        // Another node failing under the same ID leaves the value alone
        let other = UnresolvedSink {
            node: NodeId::new(),
            output_id: "preview".to_string(),
        };
        dispatcher.dispatch(graph_id, &report(Vec::new(), vec![other]));
        assert!(dispatcher.latest("preview").is_some());

        let failed = UnresolvedSink {
            node,
            output_id: "preview".to_string(),
        };
        assert_eq!(dispatcher.dispatch(graph_id, &report(Vec::new(), vec![failed])), 1);
        assert!(dispatcher.latest("preview").is_none());

        let cleared = recording.cleared.lock();
        assert_eq!(cleared.len(), 2);
        assert_eq!(cleared[1].node_id, node);
        assert_eq!(cleared[1].graph_id, graph_id);
    }
}
