//! Running a graph
//!
//! [`run_graph`] parses a graph document, loads it, resolves the run values
//! and starts the entry node. Run values come from four sources, lowest
//! precedence first:
//!
//! 1. the JSON config file (`RunOpts::config_file`)
//! 2. bulk JSON in `ACT_INPUT_INPUTS` / `ACT_INPUT_SECRETS`
//! 3. single `ACT_INPUT_INPUT_<KEY>` / `ACT_INPUT_SECRET_<KEY>` variables
//! 4. the overrides in [`RunOpts`]
//!
//! Every other environment variable becomes part of the run environment.
//!
//! ```ignore
//! let opts = RunOpts {
//!     args: vec!["--fast".into()],
//!     ..Default::default()
//! };
//! run_graph("build.act", &bytes, opts, None).await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RuntimeError};
use crate::loader::load_graph_with;
use crate::registry::NodeRegistry;
use crate::state::{DebugCallback, ExecutionState, OutputSink, StateOptions};
use crate::value::Value;

const SOURCE_SHELL: &str = "shell";
const SOURCE_OVERRIDE: &str = "override";
const MAX_LOGGED_VALUE_LEN: usize = 256;
const MASKED_KEY_WORDS: &[&str] = &["key", "access", "secret", "token", "password"];

/// `github` context keys and the variables they are read from
const GITHUB_CONTEXT_VARS: &[(&str, &str)] = &[
    ("action", "GITHUB_ACTION"),
    ("actor", "GITHUB_ACTOR"),
    ("actor_id", "GITHUB_ACTOR_ID"),
    ("api_url", "GITHUB_API_URL"),
    ("base_ref", "GITHUB_BASE_REF"),
    ("event_name", "GITHUB_EVENT_NAME"),
    ("event_path", "GITHUB_EVENT_PATH"),
    ("graphql_url", "GITHUB_GRAPHQL_URL"),
    ("head_ref", "GITHUB_HEAD_REF"),
    ("job", "GITHUB_JOB"),
    ("ref", "GITHUB_REF"),
    ("ref_name", "GITHUB_REF_NAME"),
    ("ref_protected", "GITHUB_REF_PROTECTED"),
    ("ref_type", "GITHUB_REF_TYPE"),
    ("repository", "GITHUB_REPOSITORY"),
    ("repository_id", "GITHUB_REPOSITORY_ID"),
    ("repository_owner", "GITHUB_REPOSITORY_OWNER"),
    ("run_attempt", "GITHUB_RUN_ATTEMPT"),
    ("run_id", "GITHUB_RUN_ID"),
    ("run_number", "GITHUB_RUN_NUMBER"),
    ("server_url", "GITHUB_SERVER_URL"),
    ("sha", "GITHUB_SHA"),
    ("workflow", "GITHUB_WORKFLOW"),
    ("workflow_ref", "GITHUB_WORKFLOW_REF"),
    ("workspace", "GITHUB_WORKSPACE"),
];

/// Options of a single run. Every field is optional.
#[derive(Default)]
pub struct RunOpts {
    /// JSON file with `env`, `inputs` and `secrets` objects
    pub config_file: Option<PathBuf>,
    pub override_secrets: HashMap<String, String>,
    pub override_inputs: HashMap<String, Value>,
    pub override_env: HashMap<String, String>,
    /// Arguments handed to the entry node
    pub args: Vec<String>,
    /// Where `print` and friends write to
    pub stdout: OutputSink,
    /// Cancelling this token cancels the run
    pub cancel: Option<CancellationToken>,
    /// Environment the run starts from. Defaults to the process environment.
    pub env: Option<HashMap<String, String>>,
}

/// Contents of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub env: HashMap<String, String>,
    pub inputs: HashMap<String, serde_json::Value>,
    pub secrets: HashMap<String, String>,
}

impl RunConfig {
    /// Read a config file. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config = serde_json::from_slice(&content).map_err(|e| {
            RuntimeError::create(
                None,
                Some(e.into()),
                format!("failed to load config file '{}'", path.display()),
            )
        })?;
        Ok(Some(config))
    }
}

/// Text used when a run value is logged
fn format_value(key: &str, value: &str, hide: bool) -> String {
    if value.is_empty() {
        return "(empty)".to_string();
    }

    let lower = key.to_lowercase();
    if hide || MASKED_KEY_WORDS.iter().any(|w| lower.contains(w)) {
        return "*".repeat(value.chars().count());
    }

    if value.len() > MAX_LOGGED_VALUE_LEN {
        let cut = (0..=MAX_LOGGED_VALUE_LEN)
            .rev()
            .find(|i| value.is_char_boundary(*i))
            .unwrap_or_default();
        return format!("{}...", &value[..cut]);
    }
    value.to_string()
}

struct Tracked<T> {
    value: T,
    source: String,
    explicit: bool,
}

/// Run values of one category, remembering where each came from
struct ValueTracker<T> {
    category: &'static str,
    hide: bool,
    data: BTreeMap<String, Tracked<T>>,
}

impl<T: fmt::Display> ValueTracker<T> {
    fn new(category: &'static str, hide: bool) -> Self {
        Self {
            category,
            hide,
            data: BTreeMap::new(),
        }
    }

    fn set(&mut self, key: &str, value: T, source: &str, explicit: bool) {
        let new_value = format_value(key, &value.to_string(), self.hide);
        match self.data.get(key) {
            Some(existing) => log::debug!(
                "overwriting {} '{}={}' (from {}) -> '{}' (from {})",
                self.category,
                key,
                format_value(key, &existing.value.to_string(), self.hide),
                existing.source,
                new_value,
                source
            ),
            None => log::debug!(
                "setting {} '{}={}' (from {})",
                self.category,
                key,
                new_value,
                source
            ),
        }
        self.data.insert(
            key.to_string(),
            Tracked {
                value,
                source: source.to_string(),
                explicit,
            },
        );
    }

    /// Set every entry, in key order
    fn set_all(&mut self, values: impl IntoIterator<Item = (String, T)>, source: &str, explicit: bool) {
        let sorted: BTreeMap<String, T> = values.into_iter().collect();
        for (key, value) in sorted {
            self.set(&key, value, source, explicit);
        }
    }

    /// Log the final values that were set explicitly. Shell values are skipped.
    fn log_explicit(&self) {
        for (key, tracked) in &self.data {
            if !tracked.explicit || tracked.source == SOURCE_SHELL {
                continue;
            }
            log::debug!(
                "final {} '{}={}' set by {}",
                self.category,
                key,
                format_value(key, &tracked.value.to_string(), self.hide),
                tracked.source
            );
        }
    }

    fn into_map(self) -> BTreeMap<String, T> {
        self.data.into_iter().map(|(k, t)| (k, t.value)).collect()
    }
}

/// Run values after all sources were applied
#[derive(Debug, Default)]
pub struct RunValues {
    pub env: HashMap<String, String>,
    /// Keys are lower case
    pub inputs: HashMap<String, Value>,
    pub secrets: HashMap<String, String>,
    pub matrix: Value,
    pub needs: Value,
}

fn decode_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    if text.is_empty() {
        return Some(serde_json::Map::new());
    }
    match serde_json::from_str(text) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn json_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Apply the run value sources in precedence order
pub fn resolve_run_values(
    raw_env: HashMap<String, String>,
    opts: &RunOpts,
    is_github_workflow: bool,
) -> Result<RunValues> {
    let mut env = ValueTracker::<String>::new("env", false);
    let mut inputs = ValueTracker::<Value>::new("input", false);
    let mut secrets = ValueTracker::<String>::new("secret", true);
    let mut matrix = ValueTracker::<Value>::new("matrix", true);
    let mut needs = ValueTracker::<Value>::new("needs", true);

    if let Some(path) = &opts.config_file {
        if let Some(config) = RunConfig::load(path)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            env.set_all(config.env, &name, true);
            inputs.set_all(
                config.inputs.into_iter().map(|(k, v)| (k, Value::from_json(v))),
                &name,
                true,
            );
            secrets.set_all(config.secrets, &name, true);
        }
    }

    // inside GitHub Actions the inputs of an action arrive as INPUT_*
    let raw_env: BTreeMap<String, String> = raw_env
        .into_iter()
        .map(|(k, v)| {
            if is_github_workflow && k.starts_with("INPUT_") {
                (format!("ACT_{}", k), v)
            } else {
                (k, v)
            }
        })
        .collect();

    for (key, value) in &raw_env {
        let source = format!("{} ({})", SOURCE_SHELL, key);
        match key.as_str() {
            "ACT_INPUT_INPUTS" => {
                if let Some(map) = decode_json_object(value) {
                    inputs.set_all(map.into_iter().map(|(k, v)| (k, Value::from_json(v))), &source, true);
                }
            }
            "ACT_INPUT_SECRETS" => {
                if let Some(map) = decode_json_object(value) {
                    secrets.set_all(map.into_iter().map(|(k, v)| (k, json_to_string(v))), &source, true);
                }
            }
            _ => {}
        }
    }

    for (key, value) in raw_env {
        let source = format!("{} ({})", SOURCE_SHELL, key);
        if key == "ACT_INPUT_INPUTS" || key == "ACT_INPUT_SECRETS" {
            continue;
        } else if let Some(name) = key.strip_prefix("ACT_INPUT_INPUT_") {
            inputs.set(name, Value::String(value), &source, true);
        } else if let Some(name) = key.strip_prefix("ACT_INPUT_SECRET_") {
            secrets.set(name, value, &source, true);
        } else if is_github_workflow && key == "ACT_INPUT_MATRIX" {
            if let Some(map) = decode_json_object(&value) {
                matrix.set_all(map.into_iter().map(|(k, v)| (k, Value::from_json(v))), SOURCE_SHELL, true);
            }
        } else if is_github_workflow && key == "ACT_INPUT_NEEDS" {
            if let Some(map) = decode_json_object(&value) {
                needs.set_all(map.into_iter().map(|(k, v)| (k, Value::from_json(v))), SOURCE_SHELL, true);
            }
        } else if is_github_workflow && key == "ACT_INPUT_TOKEN" {
            secrets.set("GITHUB_TOKEN", value, SOURCE_SHELL, true);
        } else {
            env.set(&key, value, SOURCE_SHELL, false);
        }
    }

    env.set_all(opts.override_env.clone(), SOURCE_OVERRIDE, true);
    inputs.set_all(opts.override_inputs.clone(), SOURCE_OVERRIDE, true);
    secrets.set_all(opts.override_secrets.clone(), SOURCE_OVERRIDE, true);

    inputs.log_explicit();
    secrets.log_explicit();
    matrix.log_explicit();
    needs.log_explicit();
    env.log_explicit();

    Ok(RunValues {
        env: env.into_map().into_iter().collect(),
        inputs: inputs
            .into_map()
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect(),
        secrets: secrets.into_map().into_iter().collect(),
        matrix: Value::Map(matrix.into_map()),
        needs: Value::Map(needs.into_map()),
    })
}

/// Build the `github` expression context from the run values.
///
/// `github.event` is the JSON payload at `GITHUB_EVENT_PATH` with the run
/// inputs merged into `github.event.inputs`.
pub fn github_context(
    env: &HashMap<String, String>,
    inputs: &HashMap<String, Value>,
    secrets: &HashMap<String, String>,
) -> Result<Value> {
    let mut gh = BTreeMap::new();
    for (key, var) in GITHUB_CONTEXT_VARS {
        if let Some(value) = env.get(*var) {
            gh.insert(key.to_string(), Value::String(value.clone()));
        }
    }

    let mut event = BTreeMap::new();
    if let Some(path) = env.get("GITHUB_EVENT_PATH").filter(|p| !p.is_empty()) {
        match std::fs::read(path) {
            Ok(content) => match serde_json::from_slice::<serde_json::Value>(&content) {
                Ok(json) => {
                    if let Value::Map(map) = Value::from_json(json) {
                        event = map;
                    }
                }
                Err(e) => log::warn!("ignoring unreadable event payload '{}': {}", path, e),
            },
            Err(e) => log::warn!("ignoring event payload '{}': {}", path, e),
        }
    }

    if !inputs.is_empty() {
        let entry = event
            .entry("inputs".to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if !matches!(entry, Value::Map(_)) {
            *entry = Value::Map(BTreeMap::new());
        }
        if let Value::Map(event_inputs) = entry {
            for (k, v) in inputs {
                event_inputs.insert(k.clone(), v.clone());
            }
        }
    }
    gh.insert("event".to_string(), Value::Map(event));

    if let Some(token) = secrets.get("GITHUB_TOKEN") {
        gh.insert("token".to_string(), Value::String(token.clone()));
    }
    Ok(Value::Map(gh))
}

/// Load and run a graph document with the built-in node types
pub async fn run_graph(
    name: &str,
    content: &[u8],
    opts: RunOpts,
    debug_callback: Option<DebugCallback>,
) -> Result<()> {
    run_graph_with(NodeRegistry::global(), name, content, opts, debug_callback).await
}

/// Load and run a graph document with node types from `registry`.
///
/// A node that requested an exit code makes the run return
/// [`RuntimeError::Exit`] with that code.
pub async fn run_graph_with(
    registry: &NodeRegistry,
    name: &str,
    content: &[u8],
    mut opts: RunOpts,
    debug_callback: Option<DebugCallback>,
) -> Result<()> {
    let document: serde_json::Value = serde_json::from_slice(content)
        .map_err(|e| RuntimeError::create(None, Some(e.into()), "failed to parse graph document"))?;
    let document = document
        .as_object()
        .ok_or_else(|| RuntimeError::leaf(None, "graph document is not a map"))?;

    let (graph, errors) = load_graph_with(registry, document, None, "", false);
    if let Some(err) = errors.into_iter().next() {
        return Err(RuntimeError::create(None, Some(err), "failed to load graph"));
    }

    let graph = Arc::new(graph);
    let entry = graph
        .entry()
        .map_err(|e| RuntimeError::create(None, Some(e), "failed to load graph"))?
        .clone();

    let raw_env = opts
        .env
        .take()
        .unwrap_or_else(|| std::env::vars().collect());
    let is_github_workflow = raw_env.get("GITHUB_ACTIONS").is_some_and(|v| v == "true")
        || entry.base().node_type() == "core/gh-start@v1";

    let values = resolve_run_values(raw_env, &opts, is_github_workflow)?;
    let github = if is_github_workflow {
        github_context(&values.env, &values.inputs, &values.secrets)
            .map_err(|e| RuntimeError::create(None, Some(e), "failed to load github context"))?
    } else {
        Value::Null
    };

    log::debug!("running graph '{}' from entry '{}'", name, entry.base().id());

    let state = ExecutionState::new(StateOptions {
        graph: Some(Arc::clone(&graph)),
        graph_file: name.to_string(),
        env: values.env,
        inputs: values.inputs,
        secrets: values.secrets,
        github,
        needs: values.needs,
        matrix: values.matrix,
        is_github_workflow,
        is_debug_session: debug_callback.is_some(),
        debug_callback,
        cancel: opts.cancel.take(),
        output: opts.stdout.clone(),
    });

    state.push_visit(&entry, true);
    let result = entry.execute_entry(&state, opts.args).await;

    // an exit request cancels the run, whatever the branches returned after it
    if let Some(code) = state.exit_code() {
        log::debug!("graph '{}' requested exit with code {}", name, code);
        return Err(RuntimeError::Exit(code));
    }
    result
}

/// Read a graph file and run it
pub async fn run_graph_from_file(
    path: &Path,
    opts: RunOpts,
    debug_callback: Option<DebugCallback>,
) -> Result<()> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| RuntimeError::create(None, Some(e.into()), "failed loading graph"))?;
    run_graph(&path.display().to_string(), &content, opts, debug_callback).await
}
