//! Graph Runtime - action graph execution
//!
//! This crate loads declarative action graphs and drives them from their
//! entry node. A graph is made of nodes wired by two kinds of edges:
//!
//! - **Execution edges** carry control flow from an `exec` output to an
//!   `exec` input
//! - **Data edges** carry typed values from an output to an input and are
//!   resolved lazily when a node asks for an input value
//!
//! # Architecture
//!
//! - [`node`]: the four node capabilities (base, inputs, outputs, executions)
//! - [`registry`]: node type definitions and factories, collected at link time
//! - [`loader`]: builds a [`Graph`] from a document, fail-fast or collecting
//! - [`state`]: per-branch execution state with output caches and cancellation
//! - [`expression`]: the `${{ ... }}` evaluator used on input literals
//! - [`run`]: resolves env, inputs and secrets and starts the entry node
//!
//! # Example
//!
//! ```ignore
//! use graph_runtime::{run_graph, RunOpts};
//!
//! let content = std::fs::read("build.json")?;
//! run_graph("build.json", &content, RunOpts::default(), None).await?;
//! ```

pub mod coerce;
pub mod definition;
pub mod env;
pub mod error;
pub mod expression;
pub mod graph;
pub mod indexable;
pub mod iterable;
pub mod loader;
pub mod node;
pub mod registry;
pub mod run;
pub mod state;
pub mod types;
pub mod value;

// Re-export key types
pub use coerce::{FromValue, Secret, StreamReader};
pub use definition::{AssignmentMode, InputDefinition, InputOption, NodeTypeDefinition, OutputDefinition};
pub use env::merge_env;
pub use error::{render_error, LeafError, Result, RuntimeError, HINT_INTERNAL_ERROR};
pub use graph::Graph;
pub use indexable::Indexable;
pub use iterable::Iterable;
pub use loader::{load_graph, load_graph_with, validate_graph, validate_graph_with, ValidationReport};
pub use node::{
    connect_data_port, execute, input_array_value, input_value, input_value_raw, set_output_value,
    Executions, Inputs, Node, NodeBase, NodeKind, Outputs, SetOutputOpts,
};
pub use registry::{DescriptorFn, GraphScope, NodeDescriptor, NodeFactory, NodeInit, NodeRegistry};
pub use run::{run_graph, run_graph_from_file, run_graph_with, RunConfig, RunOpts};
pub use state::{
    concurrency_enabled, set_concurrency_enabled, CacheType, DebugCallback, ExecutionState,
    OutputSink, StateOptions, Visit,
};
pub use value::{DataStream, Value, ValueHandle};
