//! `${{ ... }}` expressions in input values
//!
//! Literal input strings may embed expressions in the GitHub Actions
//! dialect. A string that consists of exactly one expression evaluates to the
//! native value of that expression; otherwise every part is stringified and
//! concatenated.
//!
//! ```ignore
//! let v = evaluate(&state, "${{ 1 == '1' }}").await?;   // Value::Bool(true)
//! let v = evaluate(&state, "a${{ 1 }}b").await?;         // Value::String("a1b")
//! let v = evaluate(&state, "${{ env.HOME }}").await?;    // case preserved
//! ```
//!
//! Roots: `env`, `secrets`, `github`, `needs`, `steps`, `inputs`, `matrix`,
//! `runner`. Functions: `always`, `success`, `failure`, `cancelled`,
//! `fromJSON`, `toJSON`, `contains`, `startsWith`, `endsWith`, `format`,
//! `join`, `hashFiles`.

mod eval;
mod functions;
mod lexer;
mod parser;

use std::sync::Arc;

pub use parser::{parse, CompareOp, Expr};

use crate::error::{Result, RuntimeError};
use crate::state::ExecutionState;
use crate::value::Value;

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// Evaluate every expression embedded in `input`
pub async fn evaluate(state: &Arc<ExecutionState>, input: &str) -> Result<Value> {
    if !input.contains(OPEN) {
        return Ok(Value::String(input.to_string()));
    }

    let evaluator = eval::Evaluator::new(state);
    let mut parts: Vec<Value> = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let Some(rel_start) = input[pos..].find(OPEN) else {
            parts.push(Value::String(input[pos..].to_string()));
            break;
        };
        let start = pos + rel_start;
        if start > pos {
            parts.push(Value::String(input[pos..start].to_string()));
        }

        let inner_start = start + OPEN.len();
        let Some(rel_end) = input[inner_start..].find(CLOSE) else {
            return Err(RuntimeError::leaf(
                Some(state),
                format!("unclosed expression starting at {}", start),
            ));
        };
        let inner_end = inner_start + rel_end;

        let expr = parse(&input[inner_start..inner_end]).map_err(|e| {
            RuntimeError::leaf(
                Some(state),
                format!("failed to parse expression at {}: {}", start, e.message),
            )
        })?;

        let value = match evaluator.eval(&expr).await {
            Ok(value) => value,
            Err(e) if e.is_no_input_value() || e.is_no_output_value() => Value::Null,
            Err(e @ RuntimeError::Leaf(_)) => {
                return Err(e.wrap(Some(state), format!("failed to parse expression at {}", start)))
            }
            Err(e) => {
                return Err(RuntimeError::leaf(
                    Some(state),
                    format!("failed to parse expression at {}: {}", start, e),
                ))
            }
        };
        parts.push(value);
        pos = inner_end + CLOSE.len();
    }

    if parts.len() == 1 && pos == input.len() && input.starts_with(OPEN) {
        return Ok(parts.remove(0));
    }

    let text: String = parts.iter().map(|part| part.to_string()).collect();
    Ok(Value::String(text))
}
