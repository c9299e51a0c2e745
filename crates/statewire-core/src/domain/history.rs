//! The history log: the host's ordered record of dispatched actions and the
//! snapshots they produced.
//!
//! The log is append-only with a single writer (the host). It never evicts:
//! retention past the configured window is *signaled* (the session's excess
//! flag) so the remote observer can do its own trimming. Structural edits
//! (reset, jump, toggle, sweep, import) arrive as [`HistoryCommand`]s
//! forwarded from monitors and re-enter through [`History::apply`].
//!
//! Invariants:
//! - `staged_ids.len() == snapshots.len()` at all times.
//! - `next_id` strictly increases, including across imports.
//! - Ids in `staged_ids` are unique and in insertion order.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::domain::filter::Filter;
use crate::protocol::codec::{self, CodecError, Value};
use crate::protocol::messages::HistoryCommand;

/// Errors from structural history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("state index {index} out of range (history has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no action with id {0}")]
    UnknownAction(u64),

    #[error("malformed history payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One dispatched action, as staged in the log.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Monotonically increasing id, starting at 1.
    pub id: u64,
    /// The action value as the host dispatched it.
    pub action: Value,
    /// Milliseconds since the Unix epoch at dispatch time.
    pub timestamp_ms: u64,
}

impl ActionRecord {
    /// The action's type string, used for filtering.
    ///
    /// An object action uses its `type` entry, a bare string is its own
    /// type, and anything else falls back to `"update"`.
    pub fn action_type(&self) -> &str {
        match &self.action {
            Value::Object(_) => self
                .action
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("update"),
            Value::String(s) => s,
            _ => "update",
        }
    }
}

/// The state computed after one action, with the reducer-error marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: Value,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn ok(state: Value) -> Self {
        Snapshot { state, error: None }
    }

    pub fn failed(state: Value, error: impl Into<String>) -> Self {
        Snapshot { state, error: Some(error.into()) }
    }
}

// ── History ───────────────────────────────────────────────────────────────────

/// The ordered record of dispatched actions and computed snapshots.
#[derive(Debug, Clone)]
pub struct History {
    staged_ids: Vec<u64>,
    by_id: HashMap<u64, ActionRecord>,
    snapshots: Vec<Snapshot>,
    skipped: HashSet<u64>,
    current_index: usize,
    next_id: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            staged_ids: Vec::new(),
            by_id: HashMap::new(),
            snapshots: Vec::new(),
            skipped: HashSet::new(),
            current_index: 0,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.staged_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged_ids.is_empty()
    }

    /// The id the next appended record will receive.
    pub fn next_action_id(&self) -> u64 {
        self.next_id
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn record(&self, id: u64) -> Option<&ActionRecord> {
        self.by_id.get(&id)
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &ActionRecord> {
        self.staged_ids.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn snapshot_at(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// The snapshot at the current-state pointer.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.snapshots.get(self.current_index)
    }

    /// The state at the current-state pointer.
    pub fn current_state(&self) -> Option<&Value> {
        self.current_snapshot().map(|s| &s.state)
    }

    pub fn is_skipped(&self, id: u64) -> bool {
        self.skipped.contains(&id)
    }

    /// Appends a dispatched action and its snapshot; returns the assigned id.
    ///
    /// Amortized O(1). The current-state pointer follows the tip.
    pub fn append(&mut self, action: Value, snapshot: Snapshot, timestamp_ms: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.staged_ids.push(id);
        self.by_id.insert(id, ActionRecord { id, action, timestamp_ms });
        self.snapshots.push(snapshot);
        self.current_index = self.snapshots.len() - 1;
        id
    }

    /// Derived view retaining only records whose action type passes the
    /// filter. The source history is never mutated.
    pub fn filtered(&self, filter: &Filter) -> History {
        if filter.is_permissive() {
            return self.clone();
        }

        let mut view = History::new();
        view.next_id = self.next_id;
        for (pos, id) in self.staged_ids.iter().enumerate() {
            let Some(record) = self.by_id.get(id) else { continue };
            if !filter.allows(record.action_type()) {
                continue;
            }
            view.staged_ids.push(*id);
            view.by_id.insert(*id, record.clone());
            view.snapshots.push(self.snapshots[pos].clone());
            if self.skipped.contains(id) {
                view.skipped.insert(*id);
            }
        }
        view.current_index = view.snapshots.len().saturating_sub(1);
        view
    }

    /// Applies a structural command forwarded from a monitor.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] for out-of-range jumps, unknown action ids,
    /// or malformed import payloads; the history is left untouched on error.
    pub fn apply(&mut self, command: HistoryCommand) -> Result<(), HistoryError> {
        match command {
            HistoryCommand::Reset => {
                self.staged_ids.clear();
                self.by_id.clear();
                self.snapshots.clear();
                self.skipped.clear();
                self.current_index = 0;
                // next_id keeps increasing across resets.
                Ok(())
            }
            HistoryCommand::JumpToState { index } => {
                if index >= self.snapshots.len() {
                    return Err(HistoryError::IndexOutOfRange { index, len: self.snapshots.len() });
                }
                self.current_index = index;
                Ok(())
            }
            HistoryCommand::ToggleAction { id } => {
                if !self.by_id.contains_key(&id) {
                    return Err(HistoryError::UnknownAction(id));
                }
                if !self.skipped.remove(&id) {
                    self.skipped.insert(id);
                }
                Ok(())
            }
            HistoryCommand::Sweep => {
                let skipped = std::mem::take(&mut self.skipped);
                let mut staged = Vec::with_capacity(self.staged_ids.len());
                let mut snapshots = Vec::with_capacity(self.snapshots.len());
                for (pos, id) in self.staged_ids.iter().enumerate() {
                    if skipped.contains(id) {
                        self.by_id.remove(id);
                    } else {
                        staged.push(*id);
                        snapshots.push(self.snapshots[pos].clone());
                    }
                }
                self.staged_ids = staged;
                self.snapshots = snapshots;
                self.current_index = self.snapshots.len().saturating_sub(1);
                Ok(())
            }
            HistoryCommand::ImportState { state } => {
                let value = codec::decode(&state)?;
                let imported = History::from_value(&value)?;
                tracing::debug!("importing history with {} records", imported.len());
                let next_id = self.next_id.max(imported.next_id);
                *self = imported;
                self.next_id = next_id;
                Ok(())
            }
        }
    }

    // ── Payload conversion ────────────────────────────────────────────────────

    /// Serializes the history into the payload shape carried by `STATE`,
    /// `IMPORT`, and `SYNC` messages.
    pub fn to_value(&self) -> Value {
        let staged: Vec<Value> = self.staged_ids.iter().map(|id| Value::from(*id)).collect();
        let skipped: Vec<Value> = self
            .staged_ids
            .iter()
            .filter(|id| self.skipped.contains(id))
            .map(|id| Value::from(*id))
            .collect();
        let actions: Vec<(String, Value)> = self
            .staged_ids
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .map(|record| {
                (
                    record.id.to_string(),
                    Value::object([
                        ("action", record.action.clone()),
                        ("timestamp", Value::from(record.timestamp_ms)),
                    ]),
                )
            })
            .collect();
        let states: Vec<Value> = self
            .snapshots
            .iter()
            .map(|snapshot| {
                let mut entries = vec![("state".to_string(), snapshot.state.clone())];
                if let Some(error) = &snapshot.error {
                    entries.push(("error".to_string(), Value::from(error.as_str())));
                }
                Value::Object(entries)
            })
            .collect();

        Value::object([
            ("stagedActionIds", Value::Array(staged)),
            ("actionsById", Value::Object(actions)),
            ("computedStates", Value::Array(states)),
            ("skippedActionIds", Value::Array(skipped)),
            ("currentStateIndex", Value::from(self.current_index as u64)),
            ("nextActionId", Value::from(self.next_id)),
        ])
    }

    /// Rebuilds a history from a payload value.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Malformed`] when required fields are missing,
    /// ids collide, or the staged/snapshot alignment is broken.
    pub fn from_value(value: &Value) -> Result<History, HistoryError> {
        let staged_ids = as_id_array(value.get("stagedActionIds"), "stagedActionIds")?;
        let skipped_ids = as_id_array(value.get("skippedActionIds"), "skippedActionIds")?;

        let Some(Value::Object(action_entries)) = value.get("actionsById") else {
            return Err(HistoryError::Malformed("actionsById missing".to_string()));
        };
        let Some(Value::Array(state_entries)) = value.get("computedStates") else {
            return Err(HistoryError::Malformed("computedStates missing".to_string()));
        };
        if state_entries.len() != staged_ids.len() {
            return Err(HistoryError::Malformed(format!(
                "{} staged ids but {} computed states",
                staged_ids.len(),
                state_entries.len()
            )));
        }

        let mut by_id = HashMap::with_capacity(action_entries.len());
        for (key, entry) in action_entries {
            let id: u64 = key
                .parse()
                .map_err(|_| HistoryError::Malformed(format!("bad action id key {key:?}")))?;
            let action = entry
                .get("action")
                .cloned()
                .ok_or_else(|| HistoryError::Malformed(format!("action {id} has no body")))?;
            let timestamp_ms = entry
                .get("timestamp")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as u64;
            if by_id.insert(id, ActionRecord { id, action, timestamp_ms }).is_some() {
                return Err(HistoryError::Malformed(format!("duplicate action id {id}")));
            }
        }

        let mut seen = HashSet::with_capacity(staged_ids.len());
        for id in &staged_ids {
            if !by_id.contains_key(id) {
                return Err(HistoryError::Malformed(format!("staged id {id} has no action")));
            }
            if !seen.insert(*id) {
                return Err(HistoryError::Malformed(format!("staged id {id} repeats")));
            }
        }

        let mut snapshots = Vec::with_capacity(state_entries.len());
        for entry in state_entries {
            let state = entry
                .get("state")
                .cloned()
                .ok_or_else(|| HistoryError::Malformed("computed state has no state".to_string()))?;
            let error = entry
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
            snapshots.push(Snapshot { state, error });
        }

        let max_id = staged_ids.iter().copied().max().unwrap_or(0);
        let next_id = value
            .get("nextActionId")
            .and_then(Value::as_f64)
            .map(|n| n as u64)
            .unwrap_or(max_id + 1)
            .max(max_id + 1);
        let current_index = value
            .get("currentStateIndex")
            .and_then(Value::as_f64)
            .map(|n| n as usize)
            .unwrap_or_else(|| snapshots.len().saturating_sub(1))
            .min(snapshots.len().saturating_sub(1));

        Ok(History {
            skipped: skipped_ids.into_iter().collect(),
            staged_ids,
            by_id,
            snapshots,
            current_index,
            next_id,
        })
    }
}

fn as_id_array(value: Option<&Value>, field: &str) -> Result<Vec<u64>, HistoryError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_f64()
                    .map(|n| n as u64)
                    .ok_or_else(|| HistoryError::Malformed(format!("{field} holds a non-number")))
            })
            .collect(),
        Some(_) => Err(HistoryError::Malformed(format!("{field} is not an array"))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
