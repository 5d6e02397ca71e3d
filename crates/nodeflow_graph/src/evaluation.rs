// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and execution.
//!
//! The [`Interpreter`] walks a graph in topological order and evaluates each
//! node whose output cache is out of date. Only the ancestors of the sink
//! nodes are visited unless [`EvaluationScope::All`] is requested. A failing
//! node stops propagation along its branch: every node depending on it is
//! marked [`NodeStatus::Unresolved`] and its cache cleared, while independent
//! branches still complete. Sinks on such a branch are listed in
//! [`InterpretationReport::unresolved_sinks`] so consumers can drop the value
//! they last showed.

use crate::anchor::AnchorId;
use crate::builtins::{DEFAULT_OUTPUT_ID, OUTPUT_ID_KEY};
use crate::graph::Graph;
use crate::node::{Node, NodeId, NodeStatus};
use crate::operation::{Inputs, OperationError, OperationRegistry, Outputs};
use crate::value::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Which nodes an interpretation visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationScope {
    /// Sink nodes and their ancestors only
    #[default]
    Sinks,
    /// Every node in the graph
    All,
}

/// Value delivered to a sink node
#[derive(Debug, Clone, PartialEq)]
pub struct SinkValue {
    /// Sink node
    pub node: NodeId,
    /// Output ID configured on the sink
    pub output_id: String,
    /// Resolved input value
    pub value: Value,
}

/// Sink node that produced no value in an interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSink {
    /// Sink node
    pub node: NodeId,
    /// Output ID configured on the sink
    pub output_id: String,
}

/// A node that failed to evaluate
#[derive(Debug)]
pub struct NodeFailure {
    /// Failing node
    pub node: NodeId,
    /// What went wrong
    pub error: EvaluationError,
}

/// Result of one interpretation pass
#[derive(Debug, Default)]
pub struct InterpretationReport {
    /// Nodes evaluated, in evaluation order
    pub evaluated: Vec<NodeId>,
    /// Nodes whose cached outputs were reused
    pub reused: Vec<NodeId>,
    /// Nodes whose operation failed
    pub failures: Vec<NodeFailure>,
    /// Nodes left unresolved because an upstream node failed
    pub unresolved: Vec<NodeId>,
    /// Values delivered to sink nodes
    pub sinks: Vec<SinkValue>,
    /// Sinks that failed, were unresolved or had nothing connected
    pub unresolved_sinks: Vec<UnresolvedSink>,
}

impl InterpretationReport {
    /// Whether every visited node evaluated successfully
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.unresolved.is_empty()
    }

    /// Position of a node in the evaluation order
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.evaluated.iter().position(|n| *n == node)
    }
}

/// Evaluates graphs against an operation registry
pub struct Interpreter {
    operations: Arc<OperationRegistry>,
}

impl Interpreter {
    /// Create an interpreter over an operation registry
    pub fn new(operations: Arc<OperationRegistry>) -> Self {
        Self { operations }
    }

    /// The registry operations are resolved against
    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    /// Evaluate the graph, refreshing the output cache of every node that needs it
    pub fn run(
        &self,
        graph: &mut Graph,
        scope: EvaluationScope,
    ) -> Result<InterpretationReport, EvaluationError> {
        let order = graph
            .topological_order()
            .map_err(|_| EvaluationError::MalformedGraph)?;
        let closure = self.closure(graph, scope);

        let mut report = InterpretationReport::default();
        let mut recomputed: HashSet<NodeId> = HashSet::new();
        let mut blocked: HashSet<NodeId> = HashSet::new();

        for node_id in order.into_iter().filter(|id| closure.contains(id)) {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let Some(def) = self.operations.get(&node.signature) else {
                let error = EvaluationError::MissingOperation(node.signature.clone());
                Self::fail(graph, node_id, error, &mut report, &mut blocked);
                continue;
            };
            let is_sink = def.is_sink();
            let sink_output_id = is_sink.then(|| Self::sink_output_id(node));

            let upstream: Vec<NodeId> = graph
                .edges()
                .filter(|e| e.to.node == node_id)
                .map(|e| e.from.node)
                .collect();

            if upstream.iter().any(|id| blocked.contains(id)) {
                if let Some(node) = graph.node_mut(node_id) {
                    node.cache.clear();
                    node.status = NodeStatus::Unresolved;
                }
                blocked.insert(node_id);
                report.unresolved.push(node_id);
                if let Some(output_id) = sink_output_id {
                    report.unresolved_sinks.push(UnresolvedSink { node: node_id, output_id });
                }
                continue;
            }

            let requested: Vec<String> = match scope {
                EvaluationScope::All => node.outputs.iter().map(|a| a.key.clone()).collect(),
                EvaluationScope::Sinks => node
                    .outputs
                    .iter()
                    .filter(|a| {
                        graph.edges().any(|e| {
                            e.from.node == node_id
                                && e.from.key == a.key
                                && closure.contains(&e.to.node)
                        })
                    })
                    .map(|a| a.key.clone())
                    .collect(),
            };

            // A reused cache must hold every output asked of it this pass
            let dirty = is_sink
                || *node.status() != NodeStatus::Fresh
                || upstream.iter().any(|id| recomputed.contains(id))
                || requested.iter().any(|key| node.cached_output(key).is_none());
            if !dirty {
                report.reused.push(node_id);
                continue;
            }

            let inputs = Self::resolve_inputs(graph, node_id);
            let sink_value = is_sink
                .then(|| node.inputs.first().and_then(|anchor| inputs.get(&anchor.key)).cloned())
                .flatten();

            match def.operation.evaluate(&inputs, node.ui_inputs(), &requested) {
                Ok(outputs) => {
                    Self::store(graph, node_id, outputs);
                    recomputed.insert(node_id);
                    report.evaluated.push(node_id);
                    match (sink_output_id, sink_value) {
                        (Some(output_id), Some(value)) => report.sinks.push(SinkValue {
                            node: node_id,
                            output_id,
                            value,
                        }),
                        (Some(output_id), None) => {
                            report.unresolved_sinks.push(UnresolvedSink { node: node_id, output_id })
                        }
                        _ => {}
                    }
                }
                Err(source) => {
                    let error = EvaluationError::Failed {
                        node: node_id,
                        source,
                    };
                    Self::fail(graph, node_id, error, &mut report, &mut blocked);
                    if let Some(output_id) = sink_output_id {
                        report.unresolved_sinks.push(UnresolvedSink { node: node_id, output_id });
                    }
                }
            }
        }

        tracing::debug!(
            "Graph {}: evaluated {} node(s), reused {}, {} failure(s)",
            graph.id,
            report.evaluated.len(),
            report.reused.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Nodes visited for the given scope
    fn closure(&self, graph: &Graph, scope: EvaluationScope) -> HashSet<NodeId> {
        if scope == EvaluationScope::All {
            return graph.node_ids().collect();
        }

        let mut stack: Vec<NodeId> = graph
            .nodes()
            .filter(|n| self.operations.get(&n.signature).is_some_and(|d| d.is_sink()))
            .map(|n| n.id)
            .collect();
        let mut closure = HashSet::new();
        while let Some(node_id) = stack.pop() {
            if closure.insert(node_id) {
                stack.extend(
                    graph
                        .edges()
                        .filter(|e| e.to.node == node_id)
                        .map(|e| e.from.node),
                );
            }
        }
        closure
    }

    fn sink_output_id(node: &Node) -> String {
        node.ui_input(OUTPUT_ID_KEY)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_OUTPUT_ID)
            .to_string()
    }

    /// Resolve each input: upstream output, then own UI value, then anchor default
    fn resolve_inputs(graph: &Graph, node_id: NodeId) -> Inputs {
        let mut inputs = Inputs::new();
        let Some(node) = graph.node(node_id) else {
            return inputs;
        };

        for anchor in &node.inputs {
            let id = AnchorId::new(node_id, anchor.key.clone());
            let value = match graph.incoming_edge(&id) {
                Some(edge) => graph
                    .node(edge.from.node)
                    .and_then(|upstream| upstream.cached_output(&edge.from.key))
                    .cloned(),
                None => node
                    .ui_input(&anchor.key)
                    .or(anchor.default_value.as_ref())
                    .cloned(),
            };
            if let Some(value) = value {
                inputs.insert(anchor.key.clone(), value);
            }
        }
        inputs
    }

    fn store(graph: &mut Graph, node_id: NodeId, outputs: Outputs) {
        if let Some(node) = graph.node_mut(node_id) {
            node.cache = outputs;
            node.status = NodeStatus::Fresh;
        }
    }

    fn fail(
        graph: &mut Graph,
        node_id: NodeId,
        error: EvaluationError,
        report: &mut InterpretationReport,
        blocked: &mut HashSet<NodeId>,
    ) {
        tracing::warn!("Graph {}: {}", graph.id, error);
        if let Some(node) = graph.node_mut(node_id) {
            node.cache.clear();
            node.status = NodeStatus::Failed(error.to_string());
        }
        blocked.insert(node_id);
        report.failures.push(NodeFailure {
            node: node_id,
            error,
        });
    }
}

/// Error during evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Graph contains a cycle; the store should never allow this
    #[error("Malformed graph: cycle found during evaluation")]
    MalformedGraph,

    /// Node signature is not registered
    #[error("No operation registered for signature {0}")]
    MissingOperation(String),

    /// Node operation failed
    #[error("Node {node} failed: {source}")]
    Failed {
        /// Failing node
        node: NodeId,
        /// Error raised by the operation
        source: OperationError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, AnchorType};
    use crate::builtins::{register_builtins, ADD, NUMBER, OUTPUT};
    use crate::graph::{AddedNode, UiInputsUpdate};
    use crate::operation::{OperationCategory, OperationDef, UiInputs};
    use parking_lot::Mutex;

    const RECORD: &str = "test.record";
    const FAIL: &str = "test.fail";
    const PAIR: &str = "test.pair";

    /// Registry with builtins plus a pass-through node that logs its evaluation order
    fn registry(log: Arc<Mutex<Vec<String>>>) -> Arc<OperationRegistry> {
        let mut registry = OperationRegistry::new();
        register_builtins(&mut registry);
        registry.register(
            OperationDef::from_fn(RECORD, "Record", OperationCategory::Utility, move |inputs: &Inputs, ui: &UiInputs, _: &[String]| {
                let label = ui.get("label").and_then(Value::as_str).unwrap_or("?").to_string();
                log.lock().push(label);
                let value = inputs.get("in").cloned().unwrap_or(Value::Float(0.0));
                Ok(Outputs::from([("out".to_string(), value)]))
            })
            .with_input(Anchor::input("in", "In", AnchorType::Any))
            .with_output(Anchor::output("out", "Out", AnchorType::Any)),
        );
        registry.register(
            OperationDef::from_fn(FAIL, "Fail", OperationCategory::Utility, |_: &Inputs, _: &UiInputs, _: &[String]| {
                Err(OperationError::new("boom"))
            })
            .with_input(Anchor::input("in", "In", AnchorType::Any))
            .with_output(Anchor::output("out", "Out", AnchorType::Any)),
        );
        registry.register(
            OperationDef::from_fn(PAIR, "Pair", OperationCategory::Utility, |_: &Inputs, _: &UiInputs, requested: &[String]| {
                let mut outputs = Outputs::new();
                for (key, value) in [("x", 1.0), ("y", 2.0)] {
                    if requested.iter().any(|r| r == key) {
                        outputs.insert(key.to_string(), Value::Float(value));
                    }
                }
                Ok(outputs)
            })
            .with_output(Anchor::output("x", "X", AnchorType::Float))
            .with_output(Anchor::output("y", "Y", AnchorType::Float)),
        );
        Arc::new(registry)
    }

    fn add(graph: &mut Graph, registry: &OperationRegistry, signature: &str) -> AddedNode {
        graph.add_node(registry.get(signature).unwrap())
    }

    fn recorder(graph: &mut Graph, registry: &OperationRegistry, label: &str) -> AddedNode {
        let node = add(graph, registry, RECORD);
        graph
            .update_ui_inputs(node.node_id, UiInputsUpdate::single("label", Value::from(label)))
            .unwrap();
        node
    }

    fn connect(graph: &mut Graph, from: &AddedNode, to: &AddedNode) {
        graph.add_edge(&from.output_anchors[0], &to.input_anchors[0]).unwrap();
    }

    #[test]
    fn test_chain_evaluates_in_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(log.clone());
        let mut graph = Graph::default();
        // Insert downstream first so insertion order cannot hide a bad ordering
        let c = recorder(&mut graph, &registry, "C");
        let b = recorder(&mut graph, &registry, "B");
        let a = recorder(&mut graph, &registry, "A");
        connect(&mut graph, &b, &c);
        connect(&mut graph, &a, &b);

        let interpreter = Interpreter::new(registry);
        let report = interpreter.run(&mut graph, EvaluationScope::All).unwrap();

        assert_eq!(*log.lock(), vec!["A", "B", "C"]);
        assert!(report.position(a.node_id) < report.position(b.node_id));
        assert!(report.position(b.node_id) < report.position(c.node_id));
    }

    #[test]
    fn test_number_to_output_scenario() {
        let registry = registry(Arc::default());
        let mut graph = Graph::default();
        let number = add(&mut graph, &registry, NUMBER);
        let output = add(&mut graph, &registry, OUTPUT);
        connect(&mut graph, &number, &output);
        graph
            .update_ui_inputs(number.node_id, UiInputsUpdate::single("value", Value::Float(7.0)))
            .unwrap();

        let interpreter = Interpreter::new(registry);
        let report = interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();
        assert_eq!(
            report.sinks,
            vec![SinkValue {
                node: output.node_id,
                output_id: DEFAULT_OUTPUT_ID.to_string(),
                value: Value::Float(7.0),
            }]
        );

        graph
            .update_ui_inputs(number.node_id, UiInputsUpdate::single("value", Value::Float(42.0)))
            .unwrap();
        let report = interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();
        assert_eq!(report.sinks[0].value, Value::Float(42.0));
    }

    #[test]
    fn test_lazy_evaluation_skips_unreachable_nodes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(log.clone());
        let mut graph = Graph::default();
        let used = recorder(&mut graph, &registry, "used");
        let _dangling = recorder(&mut graph, &registry, "dangling");
        let output = add(&mut graph, &registry, OUTPUT);
        connect(&mut graph, &used, &output);

        let interpreter = Interpreter::new(registry);
        interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();
        assert_eq!(*log.lock(), vec!["used"]);
    }

    #[test]
    fn test_only_changed_nodes_rerun() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(log.clone());
        let mut graph = Graph::default();
        let a = recorder(&mut graph, &registry, "A");
        let b = recorder(&mut graph, &registry, "B");
        let c = recorder(&mut graph, &registry, "C");
        let output = add(&mut graph, &registry, OUTPUT);
        connect(&mut graph, &a, &b);
        connect(&mut graph, &b, &c);
        connect(&mut graph, &c, &output);

        let interpreter = Interpreter::new(registry);
        interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();
        log.lock().clear();

        graph
            .update_ui_inputs(b.node_id, UiInputsUpdate::single("label", Value::from("B2")))
            .unwrap();
        let report = interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();

        assert_eq!(*log.lock(), vec!["B2", "C"]);
        assert_eq!(report.reused, vec![a.node_id]);
    }

    #[test]
    fn test_failure_marks_downstream_unresolved() {
        let registry = registry(Arc::default());
        let mut graph = Graph::default();
        let source = add(&mut graph, &registry, NUMBER);
        let broken = add(&mut graph, &registry, FAIL);
        let after = recorder(&mut graph, &registry, "after");
        let failed_out = add(&mut graph, &registry, OUTPUT);
        connect(&mut graph, &source, &broken);
        connect(&mut graph, &broken, &after);
        connect(&mut graph, &after, &failed_out);

        let independent = add(&mut graph, &registry, NUMBER);
        let ok_out = add(&mut graph, &registry, OUTPUT);
        connect(&mut graph, &independent, &ok_out);

        let interpreter = Interpreter::new(registry);
        let report = interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node, broken.node_id);
        assert!(report.unresolved.contains(&after.node_id));
        assert!(report.unresolved.contains(&failed_out.node_id));
        assert_eq!(*graph.node(after.node_id).unwrap().status(), NodeStatus::Unresolved);
        assert!(graph.node(after.node_id).unwrap().cached_outputs().is_empty());

        assert_eq!(report.sinks.len(), 1);
        assert_eq!(report.sinks[0].node, ok_out.node_id);
        assert_eq!(*graph.node(source.node_id).unwrap().status(), NodeStatus::Fresh);
    }

    #[test]
    fn test_unconnected_inputs_use_ui_then_default() {
        let registry = registry(Arc::default());
        let mut graph = Graph::default();
        let sum = add(&mut graph, &registry, ADD);
        graph
            .update_ui_inputs(sum.node_id, UiInputsUpdate::single("a", Value::Float(2.5)))
            .unwrap();

        let interpreter = Interpreter::new(registry);
        interpreter.run(&mut graph, EvaluationScope::All).unwrap();
        assert_eq!(
            graph.node(sum.node_id).unwrap().cached_output("sum"),
            Some(&Value::Float(2.5))
        );
    }

    #[test]
    fn test_cycle_is_malformed() {
        let registry = registry(Arc::default());
        let mut graph = Graph::default();
        let a = recorder(&mut graph, &registry, "A");
        let b = recorder(&mut graph, &registry, "B");
        connect(&mut graph, &a, &b);
        graph.force_edge(b.output_anchors[0].clone(), a.input_anchors[0].clone());

        let interpreter = Interpreter::new(registry);
        assert!(matches!(
            interpreter.run(&mut graph, EvaluationScope::All),
            Err(EvaluationError::MalformedGraph)
        ));
    }

    #[test]
    fn test_newly_requested_output_recomputes_reused_node() {
        let registry = registry(Arc::default());
        let mut graph = Graph::default();
        let pair = add(&mut graph, &registry, PAIR);
        let first = add(&mut graph, &registry, OUTPUT);
        graph.add_edge(&pair.output_anchors[0], &first.input_anchors[0]).unwrap();

        let interpreter = Interpreter::new(Arc::clone(&registry));
        interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();
        assert_eq!(graph.node(pair.node_id).unwrap().cached_output("y"), None);

        let second = add(&mut graph, &registry, OUTPUT);
        graph.add_edge(&pair.output_anchors[1], &second.input_anchors[0]).unwrap();
        let report = interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();

        assert!(report.reused.is_empty());
        assert!(report.evaluated.contains(&pair.node_id));
        let value_at = |node: NodeId| {
            report.sinks.iter().find(|s| s.node == node).map(|s| s.value.clone())
        };
        assert_eq!(value_at(first.node_id), Some(Value::Float(1.0)));
        assert_eq!(value_at(second.node_id), Some(Value::Float(2.0)));
        assert!(report.unresolved_sinks.is_empty());
    }

    #[test]
    fn test_sinks_without_value_are_reported() {
        let registry = registry(Arc::default());
        let mut graph = Graph::default();
        let source = add(&mut graph, &registry, NUMBER);
        let broken = add(&mut graph, &registry, FAIL);
        let failed_out = add(&mut graph, &registry, OUTPUT);
        connect(&mut graph, &source, &broken);
        connect(&mut graph, &broken, &failed_out);
        graph
            .update_ui_inputs(failed_out.node_id, UiInputsUpdate::single(OUTPUT_ID_KEY, Value::from("preview")))
            .unwrap();
        let unconnected = add(&mut graph, &registry, OUTPUT);

        let interpreter = Interpreter::new(registry);
        let report = interpreter.run(&mut graph, EvaluationScope::Sinks).unwrap();

        assert!(report.sinks.is_empty());
        assert_eq!(report.unresolved_sinks.len(), 2);
        assert!(report.unresolved_sinks.contains(&UnresolvedSink {
            node: failed_out.node_id,
            output_id: "preview".to_string(),
        }));
        assert!(report.unresolved_sinks.contains(&UnresolvedSink {
            node: unconnected.node_id,
            output_id: DEFAULT_OUTPUT_ID.to_string(),
        }));
    }
}
