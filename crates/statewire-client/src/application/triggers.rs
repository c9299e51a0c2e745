//! Trigger evaluation: configured action types that drive automatic
//! relay-client transitions.
//!
//! Evaluated after every host dispatch. The returned effects are *enqueued*
//! by the caller for the next scheduler turn, never executed synchronously –
//! a trigger must not re-enter the host while its reducer call is still on
//! the stack.

use statewire_core::ConnectionState;

use crate::domain::RelayConfig;

/// A deferred transition requested by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEffect {
    /// `start_on` matched while stopped.
    Start,
    /// `stop_on` matched while monitoring.
    Stop,
    /// `send_on` matched.
    Send,
}

/// Evaluates the trigger sets against one dispatched action type.
pub fn evaluate(
    config: &RelayConfig,
    action_type: &str,
    state: ConnectionState,
) -> Vec<TriggerEffect> {
    let mut effects = Vec::new();
    if state == ConnectionState::Stopped && contains(&config.start_on, action_type) {
        effects.push(TriggerEffect::Start);
    }
    if state == ConnectionState::Monitoring && contains(&config.stop_on, action_type) {
        effects.push(TriggerEffect::Stop);
    }
    if contains(&config.send_on, action_type) {
        effects.push(TriggerEffect::Send);
    }
    effects
}

fn contains(patterns: &[String], action_type: &str) -> bool {
    patterns.iter().any(|p| p == action_type)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
