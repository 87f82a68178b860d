//! End-to-end runs of small graph documents through the built-in nodes

use std::collections::HashMap;
use std::time::Duration;

use graph_runtime::{run_graph_from_file, run_graph_with, validate_graph_with, OutputSink, RunOpts};
use serde_json::{json, Value as Json};

fn exec(src: &str, src_port: &str, dst: &str, dst_port: &str) -> Json {
    json!({ "src": { "node": src, "port": src_port }, "dst": { "node": dst, "port": dst_port } })
}

fn opts(sink: &OutputSink) -> RunOpts {
    RunOpts {
        stdout: sink.clone(),
        env: Some(HashMap::new()),
        ..Default::default()
    }
}

async fn run(document: Json) -> graph_runtime::Result<String> {
    let sink = OutputSink::buffer();
    let content = serde_json::to_vec(&document).unwrap();
    run_graph_with(graph_nodes::registry(), "test.json", &content, opts(&sink), None).await?;
    Ok(sink.contents())
}

fn lines(output: &str) -> Vec<&str> {
    output.lines().collect()
}

fn hello_document() -> Json {
    json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "print", "type": "core/print@v1", "inputs": { "values[0]": "hello" } }
        ],
        "executions": [exec("start", "exec", "print", "exec")]
    })
}

#[tokio::test]
async fn test_print_hello() {
    let output = run(hello_document()).await.unwrap();
    assert_eq!(output, "hello\n");
}

#[tokio::test]
async fn test_concurrent_exec_then_completed() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "fan", "type": "core/concurrent-exec@v1" },
            { "id": "a", "type": "core/print@v1", "inputs": { "values[0]": "A" } },
            { "id": "b", "type": "core/print@v1", "inputs": { "values[0]": "B" } },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "fan", "exec"),
            exec("fan", "exec[0]", "a", "exec"),
            exec("fan", "exec[1]", "b", "exec"),
            exec("fan", "exec-completed", "done", "exec")
        ]
    }))
    .await
    .unwrap();

    let mut printed = lines(&output);
    assert_eq!(printed.len(), 3);
    assert_eq!(printed.pop(), Some("done"));
    printed.sort_unstable();
    assert_eq!(printed, vec!["A", "B"]);
}

#[tokio::test]
async fn test_for_loop_prints_every_index() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "loop", "type": "core/for-loop@v1", "inputs": { "first_index": 0, "last_index": 2 } },
            { "id": "body", "type": "core/print@v1" },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "loop", "exec"),
            exec("loop", "exec-body", "body", "exec"),
            exec("loop", "exec-completed", "done", "exec")
        ],
        "connections": [exec("loop", "index", "body", "values[0]")]
    }))
    .await
    .unwrap();

    assert_eq!(lines(&output), vec!["0", "1", "2", "done"]);
}

#[tokio::test]
async fn test_branch_on_expression() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "branch", "type": "core/branch@v1", "inputs": { "condition": "${{ 1 == '1' }}" } },
            { "id": "yes", "type": "core/print@v1", "inputs": { "values[0]": "yes" } },
            { "id": "no", "type": "core/print@v1", "inputs": { "values[0]": "no" } }
        ],
        "executions": [
            exec("start", "exec", "branch", "exec"),
            exec("branch", "exec-then", "yes", "exec"),
            exec("branch", "exec-otherwise", "no", "exec")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "yes\n");
}

#[tokio::test]
async fn test_group_adds_one() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            {
                "id": "group",
                "type": "core/group@v1",
                "inputs": { "x": 41 },
                "graph": {
                    "entry": "in",
                    "inputs": {
                        "exec-in": { "name": "Exec", "exec": true, "index": 0 },
                        "x": { "name": "X", "type": "number", "index": 1 }
                    },
                    "outputs": {
                        "exec-out": { "name": "Exec", "exec": true, "index": 0 },
                        "y": { "name": "Y", "type": "number", "index": 1 }
                    },
                    "nodes": [
                        { "id": "in", "type": "core/group-inputs@v1" },
                        { "id": "add", "type": "core/math-add@v1", "inputs": { "inputs[1]": 1 } },
                        { "id": "out", "type": "core/group-outputs@v1" }
                    ],
                    "executions": [exec("in", "exec-in", "out", "exec-out")],
                    "connections": [
                        exec("in", "x", "add", "inputs[0]"),
                        exec("add", "result", "out", "y")
                    ]
                }
            },
            { "id": "print", "type": "core/print@v1" }
        ],
        "executions": [
            exec("start", "exec", "group", "exec-in"),
            exec("group", "exec-out", "print", "exec")
        ],
        "connections": [exec("group", "y", "print", "values[0]")]
    }))
    .await
    .unwrap();

    assert_eq!(output, "42\n");
}

#[tokio::test]
async fn test_concurrent_for_isolates_iterations() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            {
                "id": "loop",
                "type": "core/concurrent-for-loop@v1",
                "inputs": { "first_index": 0, "last_index": 3, "worker_count": 2 }
            },
            { "id": "push", "type": "core/array-add@v1", "inputs": { "array": [] } },
            { "id": "print", "type": "core/print@v1" }
        ],
        "executions": [
            exec("start", "exec", "loop", "exec"),
            exec("loop", "exec-body", "push", "exec"),
            exec("push", "exec", "print", "exec")
        ],
        "connections": [
            exec("loop", "index", "push", "item"),
            exec("push", "array", "print", "values[0]")
        ]
    }))
    .await
    .unwrap();

    let mut printed = lines(&output);
    printed.sort_unstable();
    assert_eq!(printed, vec!["[0]", "[1]", "[2]", "[3]"]);
}

#[tokio::test]
async fn test_concurrent_for_empty_range_still_completes() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "loop", "type": "core/concurrent-for-loop@v1", "inputs": { "first_index": 3, "last_index": 0 } },
            { "id": "body", "type": "core/print@v1", "inputs": { "values[0]": "body" } },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "loop", "exec"),
            exec("loop", "exec-body", "body", "exec"),
            exec("loop", "exec-completed", "done", "exec")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "done\n");
}

#[tokio::test]
async fn test_failing_branch_skips_completed() {
    let err = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "fan", "type": "core/concurrent-exec@v1" },
            { "id": "pick", "type": "core/select-data@v1", "inputs": { "index": 5, "choices[0]": "a", "choices[1]": "b" } },
            { "id": "bad", "type": "core/print@v1" },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "fan", "exec"),
            exec("fan", "exec[0]", "bad", "exec"),
            exec("fan", "exec-completed", "done", "exec")
        ],
        "connections": [exec("pick", "value", "bad", "values[0]")]
    }))
    .await
    .unwrap_err();

    assert!(
        err.to_string().contains("index out of range: 5, expected 0-1"),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_failing_body_stops_large_range() {
    let document = json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            {
                "id": "loop",
                "type": "core/concurrent-for-loop@v1",
                "inputs": { "first_index": 0, "last_index": 10_000_000, "worker_count": 2 }
            },
            { "id": "pick", "type": "core/select-data@v1", "inputs": { "index": 5, "choices[0]": "a" } },
            { "id": "bad", "type": "core/print@v1" },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "loop", "exec"),
            exec("loop", "exec-body", "bad", "exec"),
            exec("loop", "exec-completed", "done", "exec")
        ],
        "connections": [exec("pick", "value", "bad", "values[0]")]
    });

    let err = tokio::time::timeout(Duration::from_secs(30), run(document))
        .await
        .expect("iterations kept running after the first failure")
        .unwrap_err();
    assert!(err.to_string().contains("index out of range: 5"), "{}", err);
}

#[tokio::test]
async fn test_process_exit_stops_downstream_nodes() {
    let document = json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "seq", "type": "core/sequence@v1" },
            { "id": "exit", "type": "core/process-exit@v1", "inputs": { "code": 3 } },
            { "id": "after", "type": "core/print@v1", "inputs": { "values[0]": "after" } }
        ],
        "executions": [
            exec("start", "exec", "seq", "exec"),
            exec("seq", "exec[0]", "exit", "exec"),
            exec("seq", "exec[1]", "after", "exec")
        ]
    });

    let sink = OutputSink::buffer();
    let content = serde_json::to_vec(&document).unwrap();
    let err = run_graph_with(graph_nodes::registry(), "test.json", &content, opts(&sink), None)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(3));
    assert_eq!(sink.contents(), "");
}

#[tokio::test]
async fn test_process_exit_inside_concurrent_branch() {
    let document = json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "fan", "type": "core/concurrent-exec@v1" },
            { "id": "exit", "type": "core/process-exit@v1", "inputs": { "code": 7 } },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "fan", "exec"),
            exec("fan", "exec[0]", "exit", "exec"),
            exec("fan", "exec-completed", "done", "exec")
        ]
    });

    let sink = OutputSink::buffer();
    let content = serde_json::to_vec(&document).unwrap();
    let err = run_graph_with(graph_nodes::registry(), "test.json", &content, opts(&sink), None)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(7));
    assert_eq!(sink.contents(), "");
}

#[tokio::test]
async fn test_for_each_break_after_second_element() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "loop", "type": "core/for-each-loop@v1", "inputs": { "input": ["a", "b", "c", "d"] } },
            { "id": "body", "type": "core/print@v1" },
            { "id": "second", "type": "core/math-compare@v1", "inputs": { "op2": 1, "operator": "==" } },
            { "id": "check", "type": "core/branch@v1" },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "loop", "exec"),
            exec("loop", "exec-body", "body", "exec"),
            exec("body", "exec", "check", "exec"),
            exec("check", "exec-then", "loop", "exec-break"),
            exec("loop", "exec-completed", "done", "exec")
        ],
        "connections": [
            exec("loop", "value", "body", "values[0]"),
            exec("loop", "key", "second", "op1"),
            exec("second", "result", "check", "condition")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(lines(&output), vec!["a", "b", "done"]);
}

#[tokio::test]
async fn test_for_loop_reversed_range_only_completes() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "loop", "type": "core/for-loop@v1", "inputs": { "first_index": 5, "last_index": 2 } },
            { "id": "body", "type": "core/print@v1", "inputs": { "values[0]": "body" } },
            { "id": "done", "type": "core/print@v1", "inputs": { "values[0]": "done" } }
        ],
        "executions": [
            exec("start", "exec", "loop", "exec"),
            exec("loop", "exec-body", "body", "exec"),
            exec("loop", "exec-completed", "done", "exec")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "done\n");
}

#[tokio::test]
async fn test_string_and_array_nodes() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "split", "type": "core/string-split@v1", "inputs": { "string": "x,y,z", "delimiter": "," } },
            { "id": "get", "type": "core/array-get@v1", "inputs": { "index": 2 } },
            { "id": "len", "type": "core/length@v1" },
            { "id": "join", "type": "core/string-join@v1", "inputs": { "segments[0]": "a", "segments[1]": "b", "delimiter": "-" } },
            { "id": "print", "type": "core/print@v1" }
        ],
        "executions": [exec("start", "exec", "print", "exec")],
        "connections": [
            exec("split", "result", "get", "array"),
            exec("split", "result", "len", "input"),
            exec("get", "value", "print", "values[0]"),
            exec("len", "length", "print", "values[1]"),
            exec("join", "result", "print", "values[2]")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(lines(&output), vec!["z", "3", "a-b"]);
}

#[tokio::test]
async fn test_sleep_then_print() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "nap", "type": "core/sleep@v1", "inputs": { "duration": 5, "unit": "milliseconds" } },
            { "id": "print", "type": "core/print@v1", "inputs": { "values[0]": "awake" } }
        ],
        "executions": [
            exec("start", "exec", "nap", "exec"),
            exec("nap", "exec", "print", "exec")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "awake\n");
}

#[tokio::test]
async fn test_sequence_runs_in_index_order() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "seq", "type": "core/sequence@v1" },
            { "id": "a", "type": "core/print@v1", "inputs": { "values[0]": "a" } },
            { "id": "b", "type": "core/print@v1", "inputs": { "values[0]": "b" } },
            { "id": "c", "type": "core/print@v1", "inputs": { "values[0]": "c" } }
        ],
        "executions": [
            exec("start", "exec", "seq", "exec"),
            exec("seq", "exec[2]", "c", "exec"),
            exec("seq", "exec[0]", "a", "exec"),
            exec("seq", "exec[1]", "b", "exec")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "a\nb\nc\n");
}

#[tokio::test]
async fn test_freeze_keeps_value_until_reset() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "seq", "type": "core/sequence@v1" },
            { "id": "freeze", "type": "core/freeze@v1", "inputs": { "init": "first", "replace": "second" } },
            { "id": "before", "type": "core/print@v1" },
            { "id": "after", "type": "core/print@v1" }
        ],
        "executions": [
            exec("start", "exec", "seq", "exec"),
            exec("seq", "exec[0]", "freeze", "exec"),
            exec("freeze", "exec", "before", "exec"),
            exec("seq", "exec[1]", "freeze", "exec-reset"),
            exec("seq", "exec[2]", "after", "exec")
        ],
        "connections": [
            exec("freeze", "value", "before", "values[0]"),
            exec("freeze", "value", "after", "values[0]")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "first\nsecond\n");
}

#[tokio::test]
async fn test_wait_for_joins_branches() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "fan", "type": "core/concurrent-exec@v1" },
            { "id": "a", "type": "core/print@v1", "inputs": { "values[0]": "A" } },
            { "id": "b", "type": "core/print@v1", "inputs": { "values[0]": "B" } },
            { "id": "wait", "type": "core/wait-for@v1", "inputs": { "after": 2 } },
            { "id": "joined", "type": "core/print@v1", "inputs": { "values[0]": "joined" } }
        ],
        "executions": [
            exec("start", "exec", "fan", "exec"),
            exec("fan", "exec[0]", "a", "exec"),
            exec("fan", "exec[1]", "b", "exec"),
            exec("a", "exec", "wait", "exec"),
            exec("b", "exec", "wait", "exec"),
            exec("wait", "exec", "joined", "exec")
        ]
    }))
    .await
    .unwrap();

    let printed = lines(&output);
    assert_eq!(printed.len(), 3);
    assert_eq!(printed.last(), Some(&"joined"));
}

#[tokio::test]
async fn test_string_fmt_and_select_data() {
    let output = run(json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "pick", "type": "core/select-data@v1", "inputs": { "index": 1, "choices[0]": "left", "choices[1]": "right" } },
            { "id": "fmt", "type": "core/string-fmt@v1", "inputs": { "fmt": "go {0} {1} times" , "args[1]": 3 } },
            { "id": "print", "type": "core/print@v1" }
        ],
        "executions": [exec("start", "exec", "print", "exec")],
        "connections": [
            exec("pick", "value", "fmt", "args[0]"),
            exec("fmt", "result", "print", "values[0]")
        ]
    }))
    .await
    .unwrap();

    assert_eq!(output, "go right 3 times\n");
}

#[tokio::test]
async fn test_run_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.json");
    std::fs::write(&path, serde_json::to_vec(&hello_document()).unwrap()).unwrap();

    // keep the node library linked into this binary
    assert!(graph_nodes::registry().has_node_type("core/print@v1"));

    let sink = OutputSink::buffer();
    run_graph_from_file(&path, opts(&sink), None).await.unwrap();
    assert_eq!(sink.contents(), "hello\n");
}

#[test]
fn test_validate_collects_every_error() {
    let document = json!({
        "entry": "start",
        "nodes": [
            { "id": "start", "type": "core/start@v1" },
            { "id": "odd", "type": "core/nope@v1" }
        ],
        "executions": [exec("start", "exec", "missing", "exec")]
    });

    let errors = validate_graph_with(graph_nodes::registry(), document.as_object().unwrap());
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(messages.len(), 2, "{:?}", messages);
    assert_eq!(messages[0], "unknown node type 'core/nope@v1'");
    assert_eq!(messages[1], "connection dst node 'missing' does not exist");

    let valid = hello_document();
    assert!(validate_graph_with(graph_nodes::registry(), valid.as_object().unwrap()).is_empty());
}
