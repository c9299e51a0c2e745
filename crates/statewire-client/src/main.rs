//! statewire demo host – a counter store wired to the relay client.
//!
//! Runs a minimal instrumented application: a counter that increments on a
//! timer, relaying every action and snapshot to a statewire broker. Point a
//! monitor at the same broker to watch the history grow, jump around in it,
//! or dispatch `increment`/`decrement` remotely.
//!
//! # Usage
//!
//! ```text
//! statewire-demo [OPTIONS]
//!
//! Options:
//!   --hostname <HOST>      Broker hostname [default: localhost]
//!   --port <PORT>          Broker port [default: 8000]
//!   --name <NAME>          Instance display name [default: counter-demo]
//!   --interval-ms <MS>     Milliseconds between automatic increments [default: 1000]
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use statewire_client::{ActionRegistry, Host, RelayClient, RelayConfig};
use statewire_core::{History, HistoryCommand, HistoryError, Snapshot, Value};

/// statewire demo host.
#[derive(Debug, Parser)]
#[command(name = "statewire-demo", about = "Counter store relayed to a statewire broker", version)]
struct Cli {
    /// Broker hostname.
    #[arg(long, default_value = "localhost", env = "STATEWIRE_HOSTNAME")]
    hostname: String,

    /// Broker port.
    #[arg(long, default_value_t = 8000, env = "STATEWIRE_PORT")]
    port: u16,

    /// Instance display name shown by monitors.
    #[arg(long, default_value = "counter-demo")]
    name: String,

    /// Milliseconds between automatic increments.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

// ── The instrumented store ────────────────────────────────────────────────────

/// A counter store: the smallest host that exercises the whole relay path.
struct CounterStore {
    history: History,
    count: i64,
}

impl CounterStore {
    fn new() -> Self {
        Self { history: History::new(), count: 0 }
    }

    fn state(&self) -> Value {
        Value::object([("count", Value::from(self.count))])
    }
}

impl Host for CounterStore {
    fn dispatch(&mut self, action: Value) {
        match action.get("type").and_then(Value::as_str) {
            Some("INCREMENT") => {
                let by = action.get("by").and_then(Value::as_f64).unwrap_or(1.0) as i64;
                self.count += by;
            }
            Some("DECREMENT") => {
                let by = action.get("by").and_then(Value::as_f64).unwrap_or(1.0) as i64;
                self.count -= by;
            }
            _ => {}
        }
        self.history.append(action, Snapshot::ok(self.state()), now_ms());
    }

    fn apply(&mut self, command: HistoryCommand) -> Result<(), HistoryError> {
        self.history.apply(command)?;
        // The counter follows wherever the history pointer landed.
        self.count = self
            .history
            .current_state()
            .and_then(|state| state.get("count"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as i64;
        Ok(())
    }

    fn history(&self) -> &History {
        &self.history
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Remote creators a monitor may invoke on this store.
fn registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("increment", |args| {
        Ok(Value::object([
            ("type", Value::from("INCREMENT")),
            ("by", args.first().cloned().unwrap_or(Value::from(1_i64))),
        ]))
    });
    registry.register("decrement", |args| {
        Ok(Value::object([
            ("type", Value::from("DECREMENT")),
            ("by", args.first().cloned().unwrap_or(Value::from(1_i64))),
        ]))
    });
    registry
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = RelayConfig::new(cli.hostname.clone(), cli.port);
    config.name = Some(cli.name.clone());
    config
        .validate()
        .with_context(|| format!("invalid relay configuration for {}:{}", cli.hostname, cli.port))?;

    info!(
        "relaying counter store '{}' to {} every {} ms",
        cli.name,
        config.socket_url(),
        cli.interval_ms
    );

    let handle = RelayClient::connect(config, CounterStore::new(), registry())
        .context("relay client construction failed")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval_ms.max(10)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                handle.dispatch(Value::object([("type", Value::from("INCREMENT"))]));
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                info!("shutting down");
                handle.shutdown();
                break;
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["statewire-demo"]);
        assert_eq!(cli.hostname, "localhost");
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.name, "counter-demo");
        assert_eq!(cli.interval_ms, 1000);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["statewire-demo", "--port", "9010", "--name", "till"]);
        assert_eq!(cli.port, 9010);
        assert_eq!(cli.name, "till");
    }

    #[test]
    fn test_counter_store_reduces_and_appends() {
        let mut store = CounterStore::new();
        store.dispatch(Value::object([("type", Value::from("INCREMENT"))]));
        store.dispatch(Value::object([
            ("type", Value::from("INCREMENT")),
            ("by", Value::from(4_i64)),
        ]));
        store.dispatch(Value::object([("type", Value::from("DECREMENT"))]));
        assert_eq!(store.count, 4);
        assert_eq!(store.history().len(), 3);
    }

    #[test]
    fn test_counter_follows_history_jumps() {
        let mut store = CounterStore::new();
        store.dispatch(Value::object([("type", Value::from("INCREMENT"))]));
        store.dispatch(Value::object([("type", Value::from("INCREMENT"))]));
        store.apply(HistoryCommand::JumpToState { index: 0 }).unwrap();
        assert_eq!(store.count, 1);
    }

    #[test]
    fn test_registry_builds_typed_actions() {
        let registry = registry();
        let action = registry.build("increment", &[Value::from(3_i64)]).unwrap();
        assert_eq!(action.get("by").and_then(Value::as_f64), Some(3.0));
        assert!(registry.build("format_disk", &[]).is_err());
    }
}
