//! Action-creator registry: the only way remote input becomes a dispatch.
//!
//! A monitor's `ACTION` message names a creator and supplies arguments. The
//! registry maps each name to a typed builder function; unregistered names
//! are rejected outright. There is deliberately no expression evaluation of
//! any kind here – remote input never executes, it only selects.

use std::collections::HashMap;

use thiserror::Error;

use statewire_core::Value;

/// Why a remote action request could not be turned into a dispatch.
#[derive(Debug, Error, PartialEq)]
pub enum ActionEvalError {
    #[error("unregistered action creator: {0:?}")]
    Unregistered(String),

    #[error("invalid arguments for {name:?}: {reason}")]
    InvalidArgs { name: String, reason: String },

    #[error("malformed action request: {0}")]
    Malformed(String),
}

/// A typed builder turning remote arguments into an action value.
pub type ActionBuilder = Box<dyn Fn(&[Value]) -> Result<Value, ActionEvalError> + Send + Sync>;

/// Catalog of action creators a monitor may invoke remotely.
#[derive(Default)]
pub struct ActionRegistry {
    builders: HashMap<String, ActionBuilder>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a builder under a creator name, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&[Value]) -> Result<Value, ActionEvalError> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Registered creator names, sorted for stable display.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds an action from a creator name and arguments.
    ///
    /// # Errors
    ///
    /// [`ActionEvalError::Unregistered`] for unknown names; whatever the
    /// builder returns for bad arguments.
    pub fn build(&self, name: &str, args: &[Value]) -> Result<Value, ActionEvalError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| ActionEvalError::Unregistered(name.to_string()))?;
        builder(args)
    }

    /// Evaluates a decoded remote request of the form
    /// `{"name": "...", "args": [...]}`.
    ///
    /// # Errors
    ///
    /// [`ActionEvalError::Malformed`] when the request shape is wrong, plus
    /// everything [`ActionRegistry::build`] can return.
    pub fn eval_request(&self, request: &Value) -> Result<Value, ActionEvalError> {
        let name = request
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionEvalError::Malformed("missing creator name".to_string()))?;
        let args: &[Value] = match request.get("args") {
            None => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ActionEvalError::Malformed("args is not an array".to_string()));
            }
        };
        self.build(name, args)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry").field("names", &self.names()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register("increment", |args| {
            let by = match args {
                [] => 1.0,
                [v] => v.as_f64().ok_or_else(|| ActionEvalError::InvalidArgs {
                    name: "increment".to_string(),
                    reason: "amount must be a number".to_string(),
                })?,
                _ => {
                    return Err(ActionEvalError::InvalidArgs {
                        name: "increment".to_string(),
                        reason: format!("expected at most 1 argument, got {}", args.len()),
                    });
                }
            };
            Ok(Value::object([("type", Value::from("INCREMENT")), ("by", Value::Number(by))]))
        });
        registry
    }

    #[test]
    fn test_build_with_default_argument() {
        let action = registry().build("increment", &[]).unwrap();
        assert_eq!(action.get("type").and_then(Value::as_str), Some("INCREMENT"));
        assert_eq!(action.get("by").and_then(Value::as_f64), Some(1.0));
    }

    #[test]
    fn test_build_with_explicit_argument() {
        let action = registry().build("increment", &[Value::from(5_i64)]).unwrap();
        assert_eq!(action.get("by").and_then(Value::as_f64), Some(5.0));
    }

    #[test]
    fn test_unregistered_name_is_rejected() {
        let result = registry().build("drop_tables", &[]);
        assert_eq!(result, Err(ActionEvalError::Unregistered("drop_tables".to_string())));
    }

    #[test]
    fn test_invalid_arguments_are_rejected() {
        let result = registry().build("increment", &[Value::from("five")]);
        assert!(matches!(result, Err(ActionEvalError::InvalidArgs { .. })));
    }

    #[test]
    fn test_eval_request_happy_path() {
        let request = Value::object([
            ("name", Value::from("increment")),
            ("args", Value::Array(vec![Value::from(2_i64)])),
        ]);
        let action = registry().eval_request(&request).unwrap();
        assert_eq!(action.get("by").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn test_eval_request_without_args_defaults_to_empty() {
        let request = Value::object([("name", Value::from("increment"))]);
        assert!(registry().eval_request(&request).is_ok());
    }

    #[test]
    fn test_eval_request_rejects_missing_name() {
        let request = Value::object([("args", Value::Array(vec![]))]);
        assert!(matches!(
            registry().eval_request(&request),
            Err(ActionEvalError::Malformed(_))
        ));
    }

    #[test]
    fn test_eval_request_rejects_non_array_args() {
        let request = Value::object([
            ("name", Value::from("increment")),
            ("args", Value::from("not-an-array")),
        ]);
        assert!(matches!(
            registry().eval_request(&request),
            Err(ActionEvalError::Malformed(_))
        ));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut r = registry();
        r.register("a_first", |_| Ok(Value::Null));
        assert_eq!(r.names(), ["a_first", "increment"]);
    }
}
