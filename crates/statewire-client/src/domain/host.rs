//! The seam between the relay client and the instrumented application.

use statewire_core::{History, HistoryCommand, HistoryError, Value};

/// What the relay client needs from its host application.
///
/// The client owns the host for the lifetime of the session and is its only
/// caller, so every dispatch – local or remote – funnels through the same
/// path. The client reads the history; it never mutates it directly, only
/// through [`Host::apply`] when forwarding a monitor's structural command.
#[cfg_attr(test, mockall::automock)]
pub trait Host: Send + 'static {
    /// Dispatches an action through the host's normal reducer path. The
    /// host appends the action and its computed snapshot to the history.
    fn dispatch(&mut self, action: Value);

    /// Applies a structural history command (reset, jump, toggle, sweep,
    /// import).
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the command does not fit the current
    /// history; the relay client logs and drops the failure.
    fn apply(&mut self, command: HistoryCommand) -> Result<(), HistoryError>;

    /// Read-only view of the host's history log.
    fn history(&self) -> &History;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
