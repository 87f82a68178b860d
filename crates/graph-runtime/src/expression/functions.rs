//! Built-in expression functions

use std::collections::BTreeSet;
use std::fs::File;
use std::io;

use sha2::{Digest, Sha256};

use super::eval::values_equal;
use crate::error::{Result, RuntimeError};
use crate::value::Value;

/// Call the function `name` (lower-case) with evaluated arguments
pub(crate) fn call(name: &str, args: Vec<Value>) -> Result<Value> {
    let value = match name {
        // status functions are constant, there is no job status to track
        "always" | "success" => Value::Bool(true),
        "failure" | "cancelled" => Value::Bool(false),
        "fromjson" => from_json(args)?,
        "tojson" => {
            let arg = args
                .into_iter()
                .next()
                .ok_or_else(|| RuntimeError::msg("toJSON requires 1 argument"))?;
            Value::String(serde_json::to_string_pretty(&arg.to_json())?)
        }
        "contains" => Value::Bool(contains(&args)),
        "startswith" => Value::Bool(match (args.first(), args.get(1)) {
            (Some(s), Some(prefix)) => str_arg(s).starts_with(str_arg(prefix)),
            _ => false,
        }),
        "endswith" => Value::Bool(match (args.first(), args.get(1)) {
            (Some(s), Some(suffix)) => str_arg(s).ends_with(str_arg(suffix)),
            _ => false,
        }),
        "format" => Value::String(format(&args)),
        "join" => Value::String(join(&args)),
        "hashfiles" => {
            let patterns: Vec<&str> = args.iter().filter_map(Value::as_str).collect();
            Value::String(hash_files(&patterns)?)
        }
        _ => return Err(RuntimeError::msg(format!("unknown function: {}", name))),
    };
    Ok(value)
}

/// Non-string arguments map to the empty string
fn str_arg(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn from_json(args: Vec<Value>) -> Result<Value> {
    match args.into_iter().next() {
        None => Err(RuntimeError::msg("fromJSON requires 1 argument")),
        Some(Value::String(text)) => {
            let json: serde_json::Value = serde_json::from_str(&text)?;
            Ok(Value::from_json(json))
        }
        Some(other) => Ok(other),
    }
}

fn contains(args: &[Value]) -> bool {
    let (Some(container), Some(item)) = (args.first(), args.get(1)) else {
        return false;
    };
    match container {
        Value::String(s) => s.contains(&item.to_string()),
        Value::Array(items) => items.iter().any(|v| values_equal(v, item)),
        _ => false,
    }
}

/// Replace `{0}`, `{1}`, ... with the remaining arguments
fn format(args: &[Value]) -> String {
    let Some(template) = args.first() else {
        return String::new();
    };
    let mut out = str_arg(template).to_string();
    for (i, arg) in args[1..].iter().enumerate() {
        out = out.replace(&format!("{{{}}}", i), &arg.to_string());
    }
    out
}

fn join(args: &[Value]) -> String {
    match (args.first(), args.get(1)) {
        (Some(Value::Array(items)), Some(sep)) => items
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(str_arg(sep)),
        _ => String::new(),
    }
}

/// SHA-256 over the contents of every regular file matching one of the
/// glob patterns, in path order. Empty when nothing matches.
pub(crate) fn hash_files(patterns: &[&str]) -> Result<String> {
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let Ok(paths) = glob::glob(pattern) else {
            log::debug!("hashFiles: skipping invalid pattern '{}'", pattern);
            continue;
        };
        for path in paths.flatten() {
            if path.is_file() {
                files.insert(path);
            }
        }
    }

    if files.is_empty() {
        return Ok(String::new());
    }

    let mut hasher = Sha256::new();
    for path in &files {
        let Ok(mut file) = File::open(path) else {
            continue;
        };
        io::copy(&mut file, &mut hasher)?;
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
