//! Execution edges and dispatch

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{Node, NodeBase};
use crate::error::{Result, RuntimeError};
use crate::state::ExecutionState;

/// Destination of an execution edge
#[derive(Clone)]
pub struct ExecutionTarget {
    pub dst: Weak<dyn Node>,
    /// Execution input the edge arrives at
    pub port: String,
}

impl std::fmt::Debug for ExecutionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dst = self.dst.upgrade();
        f.debug_struct("ExecutionTarget")
            .field("dst", &dst.as_ref().map(|n| n.base().id().to_string()))
            .field("port", &self.port)
            .finish()
    }
}

/// Outgoing execution edges of a node, one per execution output
#[derive(Default)]
pub struct Executions {
    targets: RwLock<HashMap<String, ExecutionTarget>>,
}

impl Executions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the execution output `src_port` of `src` to `dst_port` of `dst`.
    ///
    /// Both nodes become execution nodes.
    pub fn connect(
        &self,
        src: &NodeBase,
        src_port: &str,
        dst: &Arc<dyn Node>,
        dst_port: &str,
    ) -> Result<()> {
        if dst.executions().is_none() {
            return Err(RuntimeError::leaf(
                None,
                format!("node '{}' has no execution interface", dst.base().node_type()),
            ));
        }

        src.mark_execution_node();
        dst.base().mark_execution_node();

        self.targets.write().insert(
            src_port.to_string(),
            ExecutionTarget {
                dst: Arc::downgrade(dst),
                port: dst_port.to_string(),
            },
        );
        Ok(())
    }

    pub fn target(&self, port: &str) -> Option<ExecutionTarget> {
        self.targets.read().get(port).cloned()
    }

    pub fn has_target(&self, port: &str) -> bool {
        self.targets.read().contains_key(port)
    }

    /// Connected execution outputs, sorted
    pub fn connected_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.targets.read().keys().cloned().collect();
        ports.sort();
        ports
    }
}

/// Fire the execution output `port` of `node`.
///
/// The ephemeral cache of `state` is cleared first. If nothing is connected
/// the call returns, unless `prev` carries an error that nobody handles.
pub async fn execute(
    node: &dyn Node,
    port: &str,
    state: &Arc<ExecutionState>,
    prev: Option<RuntimeError>,
) -> Result<()> {
    state.clear_ephemeral();

    let target = node.executions().and_then(|e| e.target(port));
    match (target, prev) {
        (Some(target), prev) => dispatch(target, Arc::clone(state), prev).await,
        (None, Some(err)) => Err(RuntimeError::create(
            Some(state),
            Some(err),
            "error during execution",
        )),
        (None, None) => Ok(()),
    }
}

/// Run the destination of an execution edge on `state`.
///
/// Takes ownership of its arguments so concurrent nodes can spawn it.
pub async fn dispatch(
    target: ExecutionTarget,
    state: Arc<ExecutionState>,
    prev: Option<RuntimeError>,
) -> Result<()> {
    let Some(dst) = target.dst.upgrade() else {
        return Ok(());
    };

    log::debug!("execute '{}' ({})", dst.base().name(), dst.base().id());

    state.push_visit(&dst, true);
    if state.is_cancelled() {
        return Ok(());
    }

    dst.execute_impl(&state, &target.port, prev).await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::state::{CacheType, StateOptions};
    use crate::value::Value;

    struct Step {
        base: NodeBase,
        executions: Executions,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Node for Step {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn executions(&self) -> Option<&Executions> {
            Some(&self.executions)
        }

        async fn execute_impl(
            &self,
            state: &Arc<ExecutionState>,
            input_id: &str,
            prev: Option<RuntimeError>,
        ) -> Result<()> {
            self.log.lock().push(format!("{}:{}", self.base.id(), input_id));
            // leave something in the ephemeral cache for the next node
            state.cache_output(self.base.cache_id(), "tmp", Value::Int(1), CacheType::Ephemeral);
            execute(self, "exec", state, prev).await
        }
    }

    fn step(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Node> {
        Arc::new(Step {
            base: NodeBase::new(id, id, "core/step@v1", "Step", None),
            executions: Executions::new(),
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = step("a", &log);
        let b = step("b", &log);
        a.executions().unwrap().connect(a.base(), "exec", &b, "exec").unwrap();
        assert!(a.base().is_execution_node());
        assert!(b.base().is_execution_node());

        let state = ExecutionState::new(StateOptions::default());
        dispatch(
            ExecutionTarget {
                dst: Arc::downgrade(&a),
                port: "exec".to_string(),
            },
            Arc::clone(&state),
            None,
        )
        .await
        .unwrap();

        assert_eq!(*log.lock(), vec!["a:exec".to_string(), "b:exec".to_string()]);
        assert!(state
            .cached_output(a.base().cache_id(), "tmp", CacheType::Ephemeral)
            .is_none());
        assert_eq!(state.visit_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_unhandled_error_surfaces() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = step("a", &log);
        let state = ExecutionState::new(StateOptions::default());

        let err = execute(a.as_ref(), "exec-err", &state, Some(RuntimeError::leaf(None, "boom")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "error during execution\n ↳ boom");

        execute(a.as_ref(), "exec", &state, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_state_skips_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = step("a", &log);
        let b = step("b", &log);
        a.executions().unwrap().connect(a.base(), "exec", &b, "exec").unwrap();

        let state = ExecutionState::new(StateOptions::default());
        state.cancel();
        execute(a.as_ref(), "exec", &state, None).await.unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_connected_ports_sorted() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = step("a", &log);
        let b = step("b", &log);
        let execs = a.executions().unwrap();
        execs.connect(a.base(), "exec[1]", &b, "exec").unwrap();
        execs.connect(a.base(), "exec[0]", &b, "exec").unwrap();
        assert_eq!(execs.connected_ports(), vec!["exec[0]", "exec[1]"]);
        assert!(execs.has_target("exec[0]"));
        assert!(!execs.has_target("exec-completed"));
    }
}
