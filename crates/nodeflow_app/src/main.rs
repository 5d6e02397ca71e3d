// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nodeflow - headless host for the node graph runtime
//!
//! Loads the runtime configuration, installs logging, and then either imports
//! the graph document named on the command line or builds a small demo graph.
//! `nodeflow --init-config` writes the current configuration out instead.
//! Every output node's value is logged as it is produced, and the final graph
//! is printed in the configured export format.
//!
//! ## Architecture
//!
//! The binary owns the tokio runtime. Graph mutations go through the
//! [`GraphManager`](nodeflow_runtime::GraphManager); interpretation runs in the
//! background and results reach the sinks registered on the output dispatcher.

mod config;

use config::{ConfigError, RuntimeConfig};
use nodeflow_graph::builtins::{create_builtin_registry, DEFAULT_OUTPUT_ID, MULTIPLY, NUMBER, OUTPUT};
use nodeflow_graph::{Format, GraphId, UiInputsUpdate, Value};
use nodeflow_runtime::{GraphRuntime, ManagerError, MediaOutput, Participant};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

fn main() {
    let config = match RuntimeConfig::load_or_default(&RuntimeConfig::default_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Nodeflow v{}", env!("CARGO_PKG_VERSION"));

    let argument = std::env::args().nth(1);
    let result = match argument.as_deref() {
        Some("--init-config") => init_config(&config),
        _ => run(&config, argument),
    };
    if let Err(e) = result {
        tracing::error!("Nodeflow failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &RuntimeConfig, document: Option<String>) -> Result<(), AppError> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("nodeflow-worker");
    if let Some(threads) = config.worker_threads {
        builder.worker_threads(threads.max(1));
    }
    let tokio_runtime = builder.build().map_err(AppError::Runtime)?;

    let graphs = GraphRuntime::new(
        create_builtin_registry(),
        config.runtime_options(),
        tokio_runtime.handle().clone(),
    );
    graphs.outputs().add_sink(
        DEFAULT_OUTPUT_ID,
        Arc::new(|output: &MediaOutput| {
            tracing::info!(
                "Output '{}' from node {}: {:?}",
                output.output_id,
                output.node_id,
                output.value
            );
        }),
    );
    graphs.manager().watch_output_ids(Arc::new(|output_ids: &BTreeSet<String>| {
        tracing::info!("Live outputs: {:?}", output_ids);
    }));

    let graph_id = match document {
        Some(path) => import_document(&graphs, Path::new(&path))?,
        None => build_demo(&graphs)?,
    };
    tokio_runtime.block_on(graphs.flush());

    for output_id in graphs.manager().output_ids() {
        match graphs.outputs().latest(&output_id) {
            Some(output) => tracing::info!("Final value of '{}': {:?}", output_id, output.value),
            None => tracing::info!("Output '{}' produced no value", output_id),
        }
    }

    let exported = graphs.manager().export_graph(graph_id, config.export_format)?;
    println!("{exported}");
    Ok(())
}

fn init_config(config: &RuntimeConfig) -> Result<(), AppError> {
    let path = RuntimeConfig::default_path();
    config.save(&path)?;
    tracing::info!("Wrote configuration to {}", path.display());
    Ok(())
}

fn import_document(graphs: &GraphRuntime, path: &Path) -> Result<GraphId, AppError> {
    let data = std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("ron") => Format::Ron,
        _ => Format::Json,
    };

    let graph_id = graphs.manager().import_graph(format, &data, Participant::Import)?;
    tracing::info!("Imported {} as graph {}", path.display(), graph_id);
    Ok(graph_id)
}

/// number(7) -> output, then number(7) * number(6) -> output
fn build_demo(graphs: &GraphRuntime) -> Result<GraphId, AppError> {
    let manager = graphs.manager();
    let graph_id = manager.create_graph("Demo");

    let seven = manager.add_node(graph_id, NUMBER, Participant::Ui)?;
    let output = manager.add_node(graph_id, OUTPUT, Participant::Ui)?;
    manager.set_node_pos(graph_id, output.node_id, 480.0, 0.0, Participant::Ui)?;
    manager.update_ui_inputs(
        graph_id,
        seven.node_id,
        UiInputsUpdate::single("value", Value::Float(7.0)),
        Participant::Ui,
    )?;
    manager.add_edge(graph_id, &seven.output_anchors[0], &output.input_anchors[0], Participant::Ui)?;
    let report = graphs.interpret_now(graph_id)?;
    tracing::info!("Direct pass evaluated {} node(s)", report.evaluated.len());

    let six = manager.add_node(graph_id, NUMBER, Participant::Ui)?;
    manager.set_node_pos(graph_id, six.node_id, 0.0, 160.0, Participant::Ui)?;
    manager.update_ui_inputs(
        graph_id,
        six.node_id,
        UiInputsUpdate::single("value", Value::Float(6.0)),
        Participant::Ui,
    )?;
    let multiply = manager.add_node(graph_id, MULTIPLY, Participant::Ui)?;
    manager.set_node_pos(graph_id, multiply.node_id, 240.0, 80.0, Participant::Ui)?;

    manager.remove_edge(graph_id, output.input_anchors[0].clone(), Participant::Ui)?;
    manager.add_edge(graph_id, &seven.output_anchors[0], &multiply.input_anchors[0], Participant::Ui)?;
    manager.add_edge(graph_id, &six.output_anchors[0], &multiply.input_anchors[1], Participant::Ui)?;
    manager.add_edge(graph_id, &multiply.output_anchors[0], &output.input_anchors[0], Participant::Ui)?;

    Ok(graph_id)
}
