//! Error types for the graph runtime
//!
//! Every failure surfaced by the loader, the input/output resolution and the
//! scheduler is a [`RuntimeError`]. Most of them are [`LeafError`]s: a message
//! plus a stack of wrapping messages, the root cause, a snapshot of the visit
//! stack at the point the error was created, and an optional hint.
//!
//! Wrapping an existing leaf never nests it. The new message is pushed onto the
//! leaf's stack so the root cause and the captured backtrace survive:
//!
//! ```ignore
//! let err = RuntimeError::leaf(Some(&state), "no such port");
//! let err = err.wrap(Some(&state), "failed to connect data ports");
//! assert_eq!(err.leaf_ref().unwrap().stack.len(), 1);
//! ```

use std::backtrace::Backtrace;
use std::io;

use thiserror::Error;

use crate::state::ExecutionState;

/// Result type alias using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Hint attached to errors that indicate a broken internal invariant.
pub const HINT_INTERNAL_ERROR: &str =
    "This is an internal error. Please report it via email or a GitHub issue.";

/// Errors that can occur while loading or running a graph
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Structured error with a cause chain and a visit snapshot
    #[error("{}", .0.error_with_causes())]
    Leaf(Box<LeafError>),

    /// An input had neither a connection, a literal nor a default
    #[error("{0}")]
    NoInputValue(String),

    /// A node could not provide a value for an output
    #[error("{0}")]
    NoOutputValue(String),

    /// Failures collected from concurrent branches
    #[error("{}", join_messages(.0))]
    Joined(Vec<RuntimeError>),

    /// I/O error
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Plain message without state context
    #[error("{0}")]
    Message(String),

    /// A node ended the run early with a process exit code
    #[error("exit requested with code {0}")]
    Exit(i32),
}

fn join_messages(errors: &[RuntimeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One entry of the visit stack, captured when an error is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitSnapshot {
    pub node_id: String,
    pub node_name: String,
    pub is_execution_node: bool,
    pub execute: bool,
}

/// Structured error with a cause chain
#[derive(Debug)]
pub struct LeafError {
    /// Message of the innermost frame
    pub message: String,
    /// Messages added by callers while the error travelled up, oldest first
    pub stack: Vec<String>,
    /// Root cause, if the leaf was created from another error
    pub cause: Option<RuntimeError>,
    /// Visit stack of the execution state that created the error
    pub context: Option<Vec<VisitSnapshot>>,
    pub hint: Option<String>,
    pub backtrace: Backtrace,
}

impl LeafError {
    /// Render the message chain, highest level first.
    ///
    /// Every line after the first is indented by its depth and prefixed by `↳ `.
    pub fn error_with_causes(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        let push = |lines: &mut Vec<String>, msg: &str| {
            let prefix = if lines.is_empty() {
                String::new()
            } else {
                format!("{}↳ ", " ".repeat(lines.len()))
            };
            lines.push(format!("{}{}", prefix, msg));
        };

        for msg in self.stack.iter().rev() {
            push(&mut lines, msg);
        }
        if !self.message.is_empty() {
            push(&mut lines, &self.message);
        }
        if let Some(cause) = &self.cause {
            let msg = cause.to_string();
            if !msg.is_empty() {
                push(&mut lines, &msg);
            }
        }

        lines.join("\n")
    }
}

impl RuntimeError {
    /// Create an error, or add a frame to an existing one.
    ///
    /// If `cause` is a leaf, `message` is pushed onto its stack and the leaf is
    /// returned. Otherwise a new leaf is created with `cause` as root cause.
    pub fn create(
        state: Option<&ExecutionState>,
        cause: Option<RuntimeError>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        match cause {
            Some(RuntimeError::Leaf(mut leaf)) => {
                leaf.stack.push(message);
                if leaf.context.is_none() {
                    leaf.context = state.map(|s| s.visit_snapshot());
                }
                RuntimeError::Leaf(leaf)
            }
            cause => RuntimeError::Leaf(Box::new(LeafError {
                message,
                stack: Vec::new(),
                cause,
                context: state.map(|s| s.visit_snapshot()),
                hint: None,
                backtrace: Backtrace::capture(),
            })),
        }
    }

    /// Create a new leaf without cause
    pub fn leaf(state: Option<&ExecutionState>, message: impl Into<String>) -> Self {
        Self::create(state, None, message)
    }

    /// Wrap `self` with another message
    pub fn wrap(self, state: Option<&ExecutionState>, message: impl Into<String>) -> Self {
        Self::create(state, Some(self), message)
    }

    /// Leaf error caused by a missing input value
    pub fn no_input_value(state: Option<&ExecutionState>, message: impl Into<String>) -> Self {
        Self::create(state, Some(RuntimeError::NoInputValue(String::new())), message)
    }

    /// Leaf error caused by a missing output value
    pub fn no_output_value(state: Option<&ExecutionState>, message: impl Into<String>) -> Self {
        Self::create(state, Some(RuntimeError::NoOutputValue(String::new())), message)
    }

    /// Create a plain error without any state context
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Attach a hint. Non-leaf errors are promoted to a leaf first.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        let mut err = if matches!(self, RuntimeError::Leaf(_)) {
            self
        } else {
            RuntimeError::create(None, Some(self), "")
        };
        if let RuntimeError::Leaf(leaf) = &mut err {
            leaf.hint = Some(hint.into());
        }
        err
    }

    /// Access the leaf, if this is one
    pub fn leaf_ref(&self) -> Option<&LeafError> {
        match self {
            RuntimeError::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// The root cause of a leaf, or the error itself
    pub fn root_cause(&self) -> &RuntimeError {
        match self {
            RuntimeError::Leaf(leaf) => match &leaf.cause {
                Some(cause) => cause.root_cause(),
                None => self,
            },
            _ => self,
        }
    }

    /// Whether the root cause is a missing input value
    pub fn is_no_input_value(&self) -> bool {
        matches!(self.root_cause(), RuntimeError::NoInputValue(_))
    }

    /// Whether the root cause is a missing output value
    pub fn is_no_output_value(&self) -> bool {
        matches!(self.root_cause(), RuntimeError::NoOutputValue(_))
    }

    /// Exit code requested by a `process-exit` node
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RuntimeError::Exit(code) => Some(*code),
            _ => None,
        }
    }

    /// Combine errors collected from concurrent branches.
    ///
    /// Returns `None` for an empty list and the error itself for a single one.
    pub fn join(mut errors: Vec<RuntimeError>) -> Option<RuntimeError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(RuntimeError::Joined(errors)),
        }
    }
}

impl From<String> for RuntimeError {
    fn from(msg: String) -> Self {
        RuntimeError::Message(msg)
    }
}

impl From<&str> for RuntimeError {
    fn from(msg: &str) -> Self {
        RuntimeError::Message(msg.to_string())
    }
}

/// Look up a human readable hint for an error
pub fn error_hint(err: &RuntimeError) -> Option<String> {
    match err {
        RuntimeError::Leaf(leaf) => {
            if let Some(hint) = &leaf.hint {
                return Some(hint.clone());
            }
            let cause = leaf.cause.as_ref()?;
            if cause.is_no_output_value() {
                return no_output_hint(leaf);
            }
            cause_hint(cause)
        }
        other => cause_hint(other),
    }
}

fn no_output_hint(leaf: &LeafError) -> Option<String> {
    let visits = leaf.context.as_ref()?;
    let last = visits.last()?;
    if last.is_execution_node {
        let executed = visits
            .iter()
            .rev()
            .any(|v| v.node_id == last.node_id && v.execute);
        if !executed {
            return Some(format!(
                "The node '{}' ({}) needs to be executed before it can provide values. It appears this node hasn't been executed yet, or its execution input is not connected.",
                last.node_name, last.node_id
            ));
        }
    }
    Some(format!(
        "No output value provided. Check the settings of '{}' ({}) node",
        last.node_name, last.node_id
    ))
}

fn cause_hint(cause: &RuntimeError) -> Option<String> {
    let hint = match cause.root_cause() {
        RuntimeError::NoInputValue(_) => {
            "No input value provided. Set a value or connect the input with a node"
        }
        RuntimeError::Io(err) => return io_hint(err).map(str::to_string),
        other => return message_hint(&other.to_string()).map(str::to_string),
    };
    Some(hint.to_string())
}

fn io_hint(err: &io::Error) -> Option<&'static str> {
    use io::ErrorKind;

    let hint = match err.kind() {
        ErrorKind::NotFound => {
            "The specified file or directory does not exist. Check the path and try again."
        }
        ErrorKind::PermissionDenied => {
            "You do not have the necessary permissions to perform this action. Try running the command with elevated privileges."
        }
        ErrorKind::AlreadyExists => {
            "The file or directory already exists. Consider renaming or removing the existing one."
        }
        ErrorKind::ConnectionRefused => {
            "Connection refused. Ensure the server is running and accepting connections."
        }
        ErrorKind::ConnectionReset => {
            "Connection reset by peer. The remote server might be down. Try reconnecting later."
        }
        ErrorKind::TimedOut => "Connection timed out. Check your network connection and try again.",
        ErrorKind::AddrInUse => {
            "Address already in use. Ensure the address/port is not being used by another application."
        }
        ErrorKind::HostUnreachable => "Host unreachable. Verify the network configuration and try again.",
        ErrorKind::StorageFull => "No space left on device. Free up some space and try again.",
        ErrorKind::NotADirectory => {
            "A component of the path is not a directory. Check the path and try again."
        }
        ErrorKind::IsADirectory => {
            "The specified path is a directory, not a file. Provide a valid file path."
        }
        ErrorKind::DirectoryNotEmpty => {
            "The directory is not empty. Ensure the directory is empty before performing this action."
        }
        ErrorKind::InvalidInput => "Invalid argument. Check the inputs and try again.",
        ErrorKind::BrokenPipe => "Broken pipe. The connection was closed unexpectedly.",
        _ => return message_hint(&err.to_string()),
    };
    Some(hint)
}

fn message_hint(msg: &str) -> Option<&'static str> {
    let table: [(&str, &str); 7] = [
        ("authentication failed", "Authentication failed. Verify your credentials and try again."),
        (
            "authorization failed",
            "Authorization failed. Ensure you have the necessary permissions to perform this action.",
        ),
        ("syntax error", "Syntax error. Check the syntax of your input and try again."),
        ("parsing error", "Parsing error. Verify the input format and try again."),
        ("timeout", "Operation timed out. Check your network connection or server status."),
        (
            "connection refused",
            "Connection refused. Ensure the server is running and accepting connections.",
        ),
        (
            "no such file or directory",
            "The specified file or directory does not exist. Check the path and try again.",
        ),
    ];
    table
        .iter()
        .find(|(needle, _)| msg.contains(needle))
        .map(|(_, hint)| *hint)
}

fn indent_lines(input: &str, indent: usize, numbering: bool) -> String {
    if input.is_empty() {
        return String::new();
    }
    let pad = " ".repeat(indent);
    input
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if !numbering {
                format!("{}{}", pad, line)
            } else if line.starts_with(' ') || line.starts_with('\t') {
                format!("{}    {}", pad, line)
            } else {
                format!("{}{:>2}: {}", pad, i + 1, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render an error for terminal output.
///
/// Joined errors render each branch failure with its index. With `verbose`
/// the captured backtrace is appended.
pub fn render_error(err: &RuntimeError, verbose: bool) -> String {
    match err {
        RuntimeError::Joined(errors) => errors
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "concurrent error index:\n   {}\n\n{}",
                    i,
                    render_single(e, verbose)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => render_single(other, verbose),
    }
}

fn render_single(err: &RuntimeError, verbose: bool) -> String {
    let mut output = String::new();

    let (body, context, backtrace) = match err {
        RuntimeError::Leaf(leaf) => (
            leaf.error_with_causes(),
            leaf.context.as_deref(),
            Some(&leaf.backtrace),
        ),
        other => (other.to_string(), None, None),
    };

    match context {
        Some(visits) if !visits.is_empty() => {
            let callstack = visits
                .iter()
                .map(|v| {
                    if v.execute {
                        format!("execute '{}' ({})", v.node_name, v.node_id)
                    } else {
                        format!("request input from '{}' ({})", v.node_name, v.node_id)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            output.push_str(&format!(
                "error:\n{}\n{}\n\n",
                indent_lines(&callstack, 2, true),
                indent_lines(&body, 6, false)
            ));
        }
        _ => {
            output.push_str(&format!("error:\n{}", indent_lines(&body, 2, true)));
        }
    }

    if let Some(hint) = error_hint(err) {
        let hint = indent_lines(&hint, 2, false);
        if !hint.is_empty() {
            output.push_str(&format!("\n\nhint:\n{}", hint));
        }
    }

    if verbose {
        if let Some(bt) = backtrace {
            output.push_str(&format!("\n\nstack trace:\n{}", bt));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_pushes_onto_existing_leaf() {
        let err = RuntimeError::leaf(None, "inner");
        let err = err.wrap(None, "middle").wrap(None, "outer");

        let leaf = err.leaf_ref().unwrap();
        assert_eq!(leaf.message, "inner");
        assert_eq!(leaf.stack, vec!["middle".to_string(), "outer".to_string()]);
        assert_eq!(leaf.error_with_causes(), "outer\n ↳ middle\n  ↳ inner");
    }

    #[test]
    fn test_root_cause_is_printed_last() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = RuntimeError::create(None, Some(io.into()), "open failed");
        assert_eq!(err.to_string(), "open failed\n ↳ gone");
        assert_eq!(
            error_hint(&err).as_deref(),
            Some("The specified file or directory does not exist. Check the path and try again.")
        );
    }

    #[test]
    fn test_no_input_value_detection_and_hint() {
        let err = RuntimeError::no_input_value(None, "no value for input 'Path' (path)");
        assert!(err.is_no_input_value());
        assert!(!err.is_no_output_value());
        assert_eq!(err.to_string(), "no value for input 'Path' (path)");
        assert_eq!(
            error_hint(&err).as_deref(),
            Some("No input value provided. Set a value or connect the input with a node")
        );
    }

    #[test]
    fn test_no_output_hint_for_unexecuted_node() {
        let mut err = RuntimeError::no_output_value(None, "output port 'result' has no value");
        if let RuntimeError::Leaf(leaf) = &mut err {
            leaf.context = Some(vec![VisitSnapshot {
                node_id: "run".to_string(),
                node_name: "Run".to_string(),
                is_execution_node: true,
                execute: false,
            }]);
        }
        let hint = error_hint(&err).unwrap();
        assert!(hint.starts_with("The node 'Run' (run) needs to be executed"));
    }

    #[test]
    fn test_explicit_hint_wins() {
        let err = RuntimeError::no_input_value(None, "x").with_hint("custom");
        assert_eq!(error_hint(&err).as_deref(), Some("custom"));
    }

    #[test]
    fn test_message_hint() {
        let err = RuntimeError::create(None, Some(RuntimeError::msg("request timeout")), "call");
        assert_eq!(
            error_hint(&err).as_deref(),
            Some("Operation timed out. Check your network connection or server status.")
        );
    }

    #[test]
    fn test_join() {
        assert!(RuntimeError::join(vec![]).is_none());
        let single = RuntimeError::join(vec![RuntimeError::msg("a")]).unwrap();
        assert!(matches!(single, RuntimeError::Message(_)));
        let joined = RuntimeError::join(vec![RuntimeError::msg("a"), RuntimeError::msg("b")]).unwrap();
        assert_eq!(joined.to_string(), "a\nb");
    }

    #[test]
    fn test_render_with_context() {
        let mut err = RuntimeError::leaf(None, "boom").wrap(None, "failed");
        if let RuntimeError::Leaf(leaf) = &mut err {
            leaf.context = Some(vec![
                VisitSnapshot {
                    node_id: "start".to_string(),
                    node_name: "Start".to_string(),
                    is_execution_node: true,
                    execute: true,
                },
                VisitSnapshot {
                    node_id: "add".to_string(),
                    node_name: "Add".to_string(),
                    is_execution_node: false,
                    execute: false,
                },
            ]);
        }
        let out = render_error(&err, false);
        assert!(out.starts_with("error:\n   1: execute 'Start' (start)\n   2: request input from 'Add' (add)\n"));
        assert!(out.contains("      failed\n       ↳ boom"));
    }

    #[test]
    fn test_render_joined() {
        let err = RuntimeError::Joined(vec![RuntimeError::leaf(None, "a"), RuntimeError::leaf(None, "b")]);
        let out = render_error(&err, false);
        assert!(out.contains("concurrent error index:\n   0"));
        assert!(out.contains("concurrent error index:\n   1"));
        assert!(out.contains("error:\n   1: b"));
    }
}
