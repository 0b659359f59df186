//! Interpreter of action strings such as `counter = counter + 1; user.name = 'Ann'`.
//!
//! Statements are separated by `;`. Each one assigns the value of a DSL
//! expression to a dot-separated path of the state document. The expression
//! sees the in-progress document as `state` and each of its top-level keys
//! as a variable.
//! Failures are collected per statement, the remaining statements still run.

use crate::error::ActionError;
use crate::evaluator::{self, RecordingHost};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub state: Value,
    /// At least one assignment succeeded.
    pub changed: bool,
    pub errors: Vec<ActionError>,
}

/// Run `action` against a copy of `state`.
pub fn execute(action: &str, state: &Value) -> ActionOutcome {
    let mut next = state.clone();
    let mut changed = false;
    let mut errors = Vec::new();

    for statement in action.split(';').map(str::trim).filter(|statement| !statement.is_empty()) {
        match apply(statement, &mut next) {
            Ok(()) => changed = true,
            Err(error) => {
                log::warn!("Action error: {error}");
                errors.push(error);
            }
        }
    }

    ActionOutcome {
        state: next,
        changed,
        errors,
    }
}

fn apply(statement: &str, state: &mut Value) -> Result<(), ActionError> {
    let malformed = || ActionError::Malformed {
        statement: statement.to_string(),
    };
    let (path, expression) = statement.split_once('=').ok_or_else(malformed)?;
    let (path, expression) = (path.trim(), expression.trim());
    if path.is_empty() || expression.is_empty() {
        return Err(malformed());
    }

    let segments = path.split('.').map(str::trim).collect::<Vec<_>>();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(ActionError::InvalidPath {
            path: path.to_string(),
        });
    }

    // The expression has no access to `execute` or `log`, whatever it records is dropped.
    let mut host = RecordingHost::default();
    let value = evaluator::evaluate_expression(expression, state, &mut host).map_err(|source| {
        ActionError::Eval {
            statement: statement.to_string(),
            source,
        }
    })?;
    let value = value.to_json().map_err(|kind| ActionError::NotData {
        path: path.to_string(),
        kind,
    })?;

    if !state.is_object() {
        *state = Value::Object(Map::new());
    }
    if let Value::Object(root) = state {
        assign(root, &segments, value);
    }
    Ok(())
}

/// Assign along `segments`, replacing absent or non-object intermediates with empty objects.
fn assign(object: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            object.insert(last.to_string(), value);
        }
        [first, rest @ ..] => {
            let child = object
                .entry(first.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                assign(child, rest, value);
            }
        }
    }
}
