//! Execution state
//!
//! One [`ExecutionState`] exists per logical thread of execution. The root
//! state is created by [`crate::run::run_graph`]; concurrent nodes fork child
//! states so every branch gets its own output caches, visit stack and
//! environment while sharing inputs, secrets and the GitHub context with the
//! parent.
//!
//! Output caches are keyed by `<cache_id>:<port>`. Reads walk the chain of
//! states towards the root and return the first hit, writes always go to the
//! current state.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VisitSnapshot};
use crate::graph::Graph;
use crate::node::Node;
use crate::value::Value;

static CONCURRENCY_ENABLED: AtomicBool = AtomicBool::new(true);

/// Enable or disable parallel dispatch in the concurrent nodes.
///
/// With concurrency disabled every concurrent node runs its branches one
/// after the other, which makes runs deterministic.
pub fn set_concurrency_enabled(enabled: bool) {
    CONCURRENCY_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn concurrency_enabled() -> bool {
    CONCURRENCY_ENABLED.load(Ordering::SeqCst)
}

/// Which output cache a value lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// Survives between execution dispatches. Holds execution node outputs.
    Permanent,
    /// Cleared before every execution node runs. Holds data node outputs.
    Ephemeral,
}

/// Cache key of an output port
pub fn cache_key(cache_id: &str, port: &str) -> String {
    format!("{}:{}", cache_id, port)
}

/// One entry of the visit stack
#[derive(Clone)]
pub struct Visit {
    pub node: Arc<dyn Node>,
    /// `true` if the node was executed, `false` if a value was requested
    pub execute: bool,
}

impl fmt::Debug for Visit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Visit")
            .field("node", &self.node.base().id())
            .field("execute", &self.execute)
            .finish()
    }
}

/// Called synchronously on every visit push
pub type DebugCallback = Arc<dyn Fn(&ExecutionState, &Visit) + Send + Sync>;

/// Destination for text written by nodes such as `print`
#[derive(Clone, Default)]
pub enum OutputSink {
    /// Process standard output
    #[default]
    Stdout,
    /// In-memory buffer, used for embedding and tests
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl OutputSink {
    /// Empty in-memory sink
    pub fn buffer() -> Self {
        OutputSink::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Write `line` followed by a newline
    pub fn write_line(&self, line: &str) -> Result<()> {
        match self {
            OutputSink::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", line)?;
                out.flush()?;
            }
            OutputSink::Buffer(buf) => {
                let mut buf = buf.lock();
                buf.extend_from_slice(line.as_bytes());
                buf.push(b'\n');
            }
        }
        Ok(())
    }

    /// Everything written to a buffer sink so far. Empty for stdout.
    pub fn contents(&self) -> String {
        match self {
            OutputSink::Stdout => String::new(),
            OutputSink::Buffer(buf) => String::from_utf8_lossy(&buf.lock()).into_owned(),
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Stdout => f.write_str("Stdout"),
            OutputSink::Buffer(_) => f.write_str("Buffer"),
        }
    }
}

/// Settings for a root execution state
#[derive(Default)]
pub struct StateOptions {
    pub graph: Option<Arc<Graph>>,
    pub graph_file: String,
    pub env: HashMap<String, String>,
    pub inputs: HashMap<String, Value>,
    pub secrets: HashMap<String, String>,
    pub github: Value,
    pub needs: Value,
    pub matrix: Value,
    pub is_github_workflow: bool,
    pub is_debug_session: bool,
    pub debug_callback: Option<DebugCallback>,
    /// Token the root state derives its own token from
    pub cancel: Option<CancellationToken>,
    pub output: OutputSink,
}

#[derive(Default)]
struct Caches {
    permanent: HashMap<String, Value>,
    ephemeral: HashMap<String, Value>,
}

/// Per-thread execution context
pub struct ExecutionState {
    id: String,
    graph: Option<Arc<Graph>>,
    graph_file: String,

    parent: Option<Arc<ExecutionState>>,
    created_by: Option<Weak<dyn Node>>,

    hierarchy: RwLock<Vec<Arc<dyn Node>>>,
    visited: RwLock<Vec<Visit>>,
    env: RwLock<HashMap<String, String>>,

    inputs: Arc<HashMap<String, Value>>,
    secrets: Arc<HashMap<String, String>>,
    github: Arc<Value>,
    needs: Arc<Value>,
    matrix: Arc<Value>,

    caches: RwLock<Caches>,
    cancel: CancellationToken,
    /// Shared by the whole state tree of a run
    exit_code: Arc<OnceCell<i32>>,

    debug_callback: Option<DebugCallback>,
    is_debug_session: bool,
    is_github_workflow: bool,
    output: OutputSink,
}

impl ExecutionState {
    /// Create a root state
    pub fn new(opts: StateOptions) -> Arc<Self> {
        let cancel = opts
            .cancel
            .map(|token| token.child_token())
            .unwrap_or_default();

        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            graph: opts.graph,
            graph_file: opts.graph_file,
            parent: None,
            created_by: None,
            hierarchy: RwLock::new(Vec::new()),
            visited: RwLock::new(Vec::new()),
            env: RwLock::new(opts.env),
            inputs: Arc::new(opts.inputs),
            secrets: Arc::new(opts.secrets),
            github: Arc::new(opts.github),
            needs: Arc::new(opts.needs),
            matrix: Arc::new(opts.matrix),
            caches: RwLock::new(Caches::default()),
            cancel,
            exit_code: Arc::new(OnceCell::new()),
            debug_callback: opts.debug_callback,
            is_debug_session: opts.is_debug_session,
            is_github_workflow: opts.is_github_workflow,
            output: opts.output,
        })
    }

    /// Fork a child state for a concurrent branch started by `node`.
    ///
    /// The child copies environment, visit stack and hierarchy, shares the
    /// read-only run data and starts with empty caches. Cancelling the
    /// parent cancels the child.
    pub fn fork(self: &Arc<Self>, node: &Arc<dyn Node>) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            graph: self.graph.clone(),
            graph_file: self.graph_file.clone(),
            parent: Some(Arc::clone(self)),
            created_by: Some(Arc::downgrade(node)),
            hierarchy: RwLock::new(self.hierarchy.read().clone()),
            visited: RwLock::new(self.visited.read().clone()),
            env: RwLock::new(self.env.read().clone()),
            inputs: Arc::clone(&self.inputs),
            secrets: Arc::clone(&self.secrets),
            github: Arc::clone(&self.github),
            needs: Arc::clone(&self.needs),
            matrix: Arc::clone(&self.matrix),
            caches: RwLock::new(Caches::default()),
            cancel: self.cancel.child_token(),
            exit_code: Arc::clone(&self.exit_code),
            debug_callback: self.debug_callback.clone(),
            is_debug_session: self.is_debug_session,
            is_github_workflow: self.is_github_workflow,
            output: self.output.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn graph(&self) -> Option<&Arc<Graph>> {
        self.graph.as_ref()
    }

    pub fn graph_file(&self) -> &str {
        &self.graph_file
    }

    pub fn parent(&self) -> Option<&Arc<ExecutionState>> {
        self.parent.as_ref()
    }

    /// Node that forked this state, `None` for the root
    pub fn created_by(&self) -> Option<Arc<dyn Node>> {
        self.created_by.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_debug_session(&self) -> bool {
        self.is_debug_session
    }

    pub fn is_github_workflow(&self) -> bool {
        self.is_github_workflow
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    // -- visit stack --

    pub fn push_visit(&self, node: &Arc<dyn Node>, execute: bool) {
        log::trace!("visit {}, execute: {}", node.base().id(), execute);

        let visit = Visit {
            node: Arc::clone(node),
            execute,
        };
        self.visited.write().push(visit.clone());

        if let Some(callback) = &self.debug_callback {
            callback(self, &visit);
        }
    }

    pub fn pop_visit(&self) {
        self.visited.write().pop();
    }

    /// Most recently pushed visit
    pub fn last_visited(&self) -> Option<Visit> {
        self.visited.read().last().cloned()
    }

    pub fn visits(&self) -> Vec<Visit> {
        self.visited.read().clone()
    }

    /// Plain copy of the visit stack for error reports
    pub fn visit_snapshot(&self) -> Vec<VisitSnapshot> {
        self.visited
            .read()
            .iter()
            .map(|v| VisitSnapshot {
                node_id: v.node.base().id().to_string(),
                node_name: v.node.base().name().to_string(),
                is_execution_node: v.node.base().is_execution_node(),
                execute: v.execute,
            })
            .collect()
    }

    // -- group hierarchy --

    pub fn push_hierarchy(&self, node: Arc<dyn Node>) {
        self.hierarchy.write().push(node);
    }

    pub fn pop_hierarchy(&self) -> Option<Arc<dyn Node>> {
        self.hierarchy.write().pop()
    }

    pub fn hierarchy(&self) -> Vec<Arc<dyn Node>> {
        self.hierarchy.read().clone()
    }

    // -- environment and run data --

    pub fn env_snapshot(&self) -> HashMap<String, String> {
        self.env.read().clone()
    }

    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env.read().get(key).cloned()
    }

    /// Replace the environment of this state
    pub fn set_env(&self, env: HashMap<String, String>) {
        *self.env.write() = env;
    }

    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    pub fn secrets(&self) -> &HashMap<String, String> {
        &self.secrets
    }

    pub fn secret(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }

    pub fn github(&self) -> &Value {
        &self.github
    }

    pub fn needs(&self) -> &Value {
        &self.needs
    }

    pub fn matrix(&self) -> &Value {
        &self.matrix
    }

    // -- output caches --

    /// Look up a cached output, walking towards the root state
    pub fn cached_output(&self, cache_id: &str, port: &str, cache_type: CacheType) -> Option<Value> {
        let key = cache_key(cache_id, port);
        let mut current = Some(self);
        while let Some(state) = current {
            let caches = state.caches.read();
            let map = match cache_type {
                CacheType::Permanent => &caches.permanent,
                CacheType::Ephemeral => &caches.ephemeral,
            };
            if let Some(value) = map.get(&key) {
                return Some(value.clone());
            }
            drop(caches);
            current = state.parent.as_deref();
        }
        None
    }

    /// Store an output value in this state
    pub fn cache_output(&self, cache_id: &str, port: &str, value: Value, cache_type: CacheType) {
        let key = cache_key(cache_id, port);
        let mut caches = self.caches.write();
        match cache_type {
            CacheType::Permanent => caches.permanent.insert(key, value),
            CacheType::Ephemeral => caches.ephemeral.insert(key, value),
        };
    }

    /// Drop every data node output of this state
    pub fn clear_ephemeral(&self) {
        self.caches.write().ephemeral.clear();
    }

    /// Copy of the permanent cache of this state, keyed by cache key
    pub fn permanent_cache_map(&self) -> BTreeMap<String, Value> {
        self.caches
            .read()
            .permanent
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // -- cancellation --

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this state and every state forked from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// End the whole run with `code`.
    ///
    /// The first requested code wins. The root state is cancelled, so every
    /// branch of the run stops at its next cancellation check.
    pub fn request_exit(&self, code: i32) {
        if self.exit_code.set(code).is_err() {
            log::debug!("exit code already set, ignoring {}", code);
        }

        let mut root = self;
        while let Some(parent) = &root.parent {
            root = parent;
        }
        root.cancel();
    }

    /// Exit code requested somewhere in this run
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.get().copied()
    }
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionState")
            .field("id", &self.id)
            .field("graph_file", &self.graph_file)
            .field("has_parent", &self.parent.is_some())
            .field("is_debug_session", &self.is_debug_session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBase;

    struct Dummy {
        base: NodeBase,
    }

    impl Node for Dummy {
        fn base(&self) -> &NodeBase {
            &self.base
        }
    }

    fn dummy(id: &str) -> Arc<dyn Node> {
        Arc::new(Dummy {
            base: NodeBase::new(id, id, "core/dummy@v1", "Dummy", None),
        })
    }

    #[test]
    fn test_cache_lookup_walks_parent_chain() {
        let root = ExecutionState::new(StateOptions::default());
        root.cache_output("n:1", "value", Value::Int(1), CacheType::Permanent);

        let child = root.fork(&dummy("loop"));
        assert_eq!(
            child.cached_output("n:1", "value", CacheType::Permanent),
            Some(Value::Int(1))
        );
        assert_eq!(child.cached_output("n:1", "value", CacheType::Ephemeral), None);

        child.cache_output("n:1", "value", Value::Int(2), CacheType::Permanent);
        assert_eq!(
            child.cached_output("n:1", "value", CacheType::Permanent),
            Some(Value::Int(2))
        );
        assert_eq!(
            root.cached_output("n:1", "value", CacheType::Permanent),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_request_exit_cancels_whole_run() {
        let root = ExecutionState::new(StateOptions::default());
        let branch = root.fork(&dummy("fan"));
        let sibling = root.fork(&dummy("fan"));
        let nested = branch.fork(&dummy("loop"));

        nested.request_exit(3);
        nested.request_exit(7);

        assert_eq!(root.exit_code(), Some(3));
        assert_eq!(sibling.exit_code(), Some(3));
        assert!(root.is_cancelled());
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn test_clear_ephemeral_keeps_permanent() {
        let state = ExecutionState::new(StateOptions::default());
        state.cache_output("a", "x", Value::Int(1), CacheType::Ephemeral);
        state.cache_output("a", "y", Value::Int(2), CacheType::Permanent);
        state.clear_ephemeral();
        assert!(state.cached_output("a", "x", CacheType::Ephemeral).is_none());
        assert!(state.cached_output("a", "y", CacheType::Permanent).is_some());
        assert!(state.permanent_cache_map().contains_key("a:y"));
    }

    #[test]
    fn test_fork_copies_env_and_visits() {
        let mut env = HashMap::new();
        env.insert("A".to_string(), "1".to_string());
        let root = ExecutionState::new(StateOptions {
            env,
            ..Default::default()
        });
        let node = dummy("start");
        root.push_visit(&node, true);

        let child = root.fork(&node);
        child.set_env(HashMap::new());
        assert_eq!(root.env_var("A").as_deref(), Some("1"));
        assert_eq!(child.visit_snapshot().len(), 1);
        assert_eq!(child.created_by().unwrap().base().id(), "start");

        child.pop_visit();
        assert_eq!(root.visit_snapshot().len(), 1);
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let root = ExecutionState::new(StateOptions::default());
        let child = root.fork(&dummy("c"));
        let grandchild = child.fork(&dummy("g"));
        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());

        let other = ExecutionState::new(StateOptions::default());
        let sibling = other.fork(&dummy("s"));
        sibling.cancel();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_debug_callback_fires_on_push() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let state = ExecutionState::new(StateOptions {
            debug_callback: Some(Arc::new(move |_state: &ExecutionState, visit: &Visit| {
                sink.lock().push((visit.node.base().id().to_string(), visit.execute));
            })),
            ..Default::default()
        });
        state.push_visit(&dummy("a"), false);
        state.push_visit(&dummy("b"), true);
        assert_eq!(
            *seen.lock(),
            vec![("a".to_string(), false), ("b".to_string(), true)]
        );
    }

    #[test]
    fn test_buffer_sink() {
        let sink = OutputSink::buffer();
        sink.write_line("hello").unwrap();
        sink.write_line("world").unwrap();
        assert_eq!(sink.contents(), "hello\nworld\n");
        assert_eq!(OutputSink::Stdout.contents(), "");
    }
}
