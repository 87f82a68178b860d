//! Graph Nodes
//!
//! Built-in node types for the action graph runtime. Every node registers
//! itself with `inventory::submit!`, so linking this crate is enough for
//! [`NodeRegistry::with_builtins`] to find them.
//!
//! # Categories
//!
//! - **Control**: branches, sequences, loops, the concurrent fan-out nodes,
//!   sleeping and ending the run early
//! - **Group**: sub-graph composition and its boundary nodes
//! - **Input**: the start node, constants and environment lookups
//! - **Output**: printing to the run's output sink
//! - **Processing**: arithmetic, comparison, selection, string and array
//!   handling

pub mod control;
pub mod group;
pub mod input;
pub mod output;
pub mod processing;

// Re-export all nodes for convenience
pub use control::*;
pub use group::*;
pub use input::*;
pub use output::*;
pub use processing::*;

use graph_runtime::NodeRegistry;

/// Process-wide registry holding every node of this crate.
///
/// Calling this from a binary or test keeps the crate linked in, which the
/// link-time registration depends on.
pub fn registry() -> &'static NodeRegistry {
    NodeRegistry::global()
}

#[cfg(test)]
mod tests {
    use graph_runtime::NodeRegistry;

    #[test]
    fn test_inventory_collects_all_builtins() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(registry.node_types().len(), 37, "{:?}", registry.node_types());

        // Spot-check known types
        assert!(registry.has_node_type("core/start@v1"));
        assert!(registry.has_node_type("core/print@v1"));
        assert!(registry.has_node_type("core/branch@v1"));
        assert!(registry.has_node_type("core/concurrent-for-loop@v1"));
        assert!(registry.has_node_type("core/group@v1"));
        assert!(registry.has_node_type("core/group-inputs@v1"));
        assert!(registry.has_node_type("core/math-add@v1"));
        assert!(registry.has_node_type("core/wait-for@v1"));
        assert!(registry.has_node_type("core/process-exit@v1"));
        assert!(registry.has_node_type("core/sleep@v1"));
        assert!(registry.has_node_type("core/math-compare@v1"));
        assert!(registry.has_node_type("core/array-get@v1"));
        assert!(registry.has_node_type("core/string-split@v1"));
    }
}
