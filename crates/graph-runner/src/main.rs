//! # graph-runner
//!
//! Command line driver for action graph files. Runs a graph from its entry
//! node, or validates it and lists every problem found.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use graph_runtime::{
    render_error, run_graph_with, set_concurrency_enabled, validate_graph_with, OutputSink,
    RunOpts, RuntimeError, ValidationReport, Value,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "graph-runner")]
#[command(about = "Run or validate an action graph file", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the graph file (JSON)
    file: PathBuf,

    /// Only load the graph and report every validation error
    #[arg(long)]
    validate: bool,

    /// Debug logging and backtraces in error output
    #[arg(short, long)]
    verbose: bool,

    /// Run concurrent nodes one branch at a time
    #[arg(long)]
    no_concurrency: bool,

    /// Config file with `env`, `inputs` and `secrets` sections
    #[arg(short, long, env = "GRAPH_RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Graph input override, `KEY=VALUE`. Values are parsed as JSON when possible.
    #[arg(long = "input", value_parser = parse_key_val)]
    inputs: Vec<(String, String)>,

    /// Secret override, `KEY=VALUE`
    #[arg(long = "secret", value_parser = parse_key_val)]
    secrets: Vec<(String, String)>,

    /// Environment override, `KEY=VALUE`
    #[arg(long = "env", value_parser = parse_key_val)]
    env: Vec<(String, String)>,

    /// Arguments handed to the start node
    #[arg(last = true)]
    args: Vec<String>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE: no `=` found in `{}`", s)),
    }
}

/// Input overrides keep their JSON type, anything unparsable is a string
fn input_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(json),
        Err(_) => Value::String(raw.to_string()),
    }
}

impl Cli {
    fn run_opts(&self, cancel: CancellationToken) -> RunOpts {
        RunOpts {
            config_file: self.config.clone(),
            override_inputs: self
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), input_value(v)))
                .collect(),
            override_secrets: self.secrets.iter().cloned().collect::<HashMap<_, _>>(),
            override_env: self.env.iter().cloned().collect::<HashMap<_, _>>(),
            args: self.args.clone(),
            stdout: OutputSink::Stdout,
            cancel: Some(cancel),
            env: None,
        }
    }
}

fn validate_file(path: &Path) -> Result<ValidationReport, RuntimeError> {
    let content = std::fs::read(path)
        .map_err(|e| RuntimeError::create(None, Some(e.into()), "failed loading graph"))?;
    let document: serde_json::Value = serde_json::from_slice(&content)
        .map_err(|e| RuntimeError::create(None, Some(e.into()), "failed to parse graph document"))?;
    let document = document
        .as_object()
        .ok_or_else(|| RuntimeError::leaf(None, "graph document is not a map"))?;

    Ok(ValidationReport::new(validate_graph_with(
        graph_nodes::registry(),
        document,
    )))
}

async fn run_file(path: &Path, opts: RunOpts) -> Result<(), RuntimeError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| RuntimeError::create(None, Some(e.into()), "failed loading graph"))?;
    run_graph_with(
        graph_nodes::registry(),
        &path.display().to_string(),
        &content,
        opts,
        None,
    )
    .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    if cli.no_concurrency {
        set_concurrency_enabled(false);
    }

    if cli.validate {
        return match validate_file(&cli.file) {
            Ok(report) if report.is_valid() => {
                println!("{}: graph is valid", cli.file.display());
                ExitCode::SUCCESS
            }
            Ok(report) => {
                eprintln!("{}", report);
                ExitCode::FAILURE
            }
            Err(err) => {
                eprintln!("{}", render_error(&err, cli.verbose));
                ExitCode::FAILURE
            }
        };
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling graph");
            on_signal.cancel();
        }
    });

    log::info!("running graph {}", cli.file.display());
    match run_file(&cli.file, cli.run_opts(cancel)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RuntimeError::Exit(code)) => {
            log::info!("graph requested exit with code {}", code);
            std::process::exit(code)
        }
        Err(err) => {
            eprintln!("{}", render_error(&err, cli.verbose));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("NAME=a=b").unwrap(),
            ("NAME".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_key_val("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from([
            "graph-runner",
            "graph.json",
            "--verbose",
            "--input",
            "count=3",
            "--input",
            "name=world",
            "--secret",
            "TOKEN=abc",
            "--",
            "one",
            "two",
        ])
        .unwrap();

        assert_eq!(cli.file, PathBuf::from("graph.json"));
        assert!(cli.verbose);
        assert!(!cli.validate);
        assert_eq!(cli.args, vec!["one", "two"]);

        let opts = cli.run_opts(CancellationToken::new());
        assert_eq!(opts.override_inputs["count"], Value::Int(3));
        assert_eq!(opts.override_inputs["name"], Value::String("world".into()));
        assert_eq!(opts.override_secrets["TOKEN"], "abc");
        assert_eq!(opts.args, vec!["one", "two"]);
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{
                "entry": "start",
                "nodes": [
                    { "id": "start", "type": "core/start@v1" },
                    { "id": "bad", "type": "core/does-not-exist@v1" }
                ]
            }"#,
        )
        .unwrap();

        let report = validate_file(&path).unwrap();
        assert!(!report.is_valid());
        assert!(report.to_string().contains("unknown node type 'core/does-not-exist@v1'"));

        assert!(validate_file(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{
                "entry": "start",
                "nodes": [
                    { "id": "start", "type": "core/start@v1" },
                    { "id": "print", "type": "core/print@v1", "inputs": { "values[0]": "${{ inputs.name }}" } }
                ],
                "executions": [
                    { "src": { "node": "start", "port": "exec" }, "dst": { "node": "print", "port": "exec" } }
                ]
            }"#,
        )
        .unwrap();

        let sink = OutputSink::buffer();
        let opts = RunOpts {
            stdout: sink.clone(),
            env: Some(HashMap::new()),
            override_inputs: HashMap::from([("name".to_string(), Value::from("runner"))]),
            ..Default::default()
        };
        run_file(&path, opts).await.unwrap();
        assert_eq!(sink.contents(), "runner\n");
    }

    #[tokio::test]
    async fn test_run_file_surfaces_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{
                "entry": "start",
                "nodes": [
                    { "id": "start", "type": "core/start@v1" },
                    { "id": "exit", "type": "core/process-exit@v1", "inputs": { "code": 3 } }
                ],
                "executions": [
                    { "src": { "node": "start", "port": "exec" }, "dst": { "node": "exit", "port": "exec" } }
                ]
            }"#,
        )
        .unwrap();

        let opts = RunOpts {
            stdout: OutputSink::buffer(),
            env: Some(HashMap::new()),
            ..Default::default()
        };
        let err = run_file(&path, opts).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Exit(3)), "{}", err);
    }
}
