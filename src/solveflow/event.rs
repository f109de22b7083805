//! Agent event system.
//!
//! Provides a callback-based observability layer for agents. Register an
//! [`EventObserver`] on an agent's [`EventBus`] to receive real-time
//! notifications about:
//!
//! - **Log lines**: everything routed through `Agent::log` and its level
//!   shorthands
//! - **Lifecycle**: acquire/release status changes, solve progress
//! - **Tool activity**: LLM, sandbox, and input resource round-trips
//! - **Results**: streamed tokens, progress fractions, the final value of a
//!   solve, and terminal `Done`/`Error` markers
//!
//! # Ordering
//!
//! Every emit stamps the event with the owning agent's name and a monotonic
//! sequence number. Observers are invoked synchronously on the emitting
//! thread, exactly once each, in registration order, so the events received
//! by any observer for a single solve form a prefix of the emitted sequence
//! with no reordering.
//!
//! # Isolation
//!
//! An observer returning `Err` does not abort dispatch: the error is logged
//! at WARN through the process logger and the remaining observers still run.
//!
//! # Example
//!
//! ```rust
//! use solveflow::event::{EventBus, EventPayload, LogLevel};
//!
//! let bus = EventBus::new("analyst");
//! let id = bus.on_log_fn(|event| {
//!     println!("#{} [{}] {:?}", event.seq, event.agent_name, event.payload);
//!     Ok(())
//! });
//!
//! bus.emit(EventPayload::Log {
//!     level: LogLevel::Info,
//!     message: "ready".to_string(),
//! });
//!
//! bus.unregister_log_callback(id);
//! ```

use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Severity levels accepted by `Agent::log` and carried on
/// [`EventPayload::Log`] events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Canonical upper-case name, matching what callers pass over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parse a level name, case-insensitively. Unknown names default to INFO.
    pub fn parse(raw: &str) -> LogLevel {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed payload of an [`AgentEvent`].
///
/// Variants mirror what a host CLI/TUI needs to render live progress: log
/// lines, coarse status, streamed tokens, tool boundaries, a progress
/// fraction, the final result, and terminal markers.
#[derive(Debug, Clone, Serialize)]
pub enum EventPayload {
    /// A log line routed through the agent logger.
    Log { level: LogLevel, message: String },
    /// A coarse lifecycle step changed (e.g. `initialized`, `planning`,
    /// `cleaned_up`). `detail` carries free-form context such as a problem
    /// preview or the selected strategy name.
    Status { step: String, detail: String },
    /// An incremental piece of streamed output.
    Token { text: String },
    /// A resource invocation is starting (`llm`, `coding`, `input`).
    ToolStart { name: String },
    /// A resource invocation finished; `result` is a preview of its output.
    ToolEnd { name: String, result: Value },
    /// Fraction of the current operation completed, in `0.0..=1.0`.
    Progress { fraction: f64 },
    /// The final value of a root-level solve.
    FinalResult { value: Value },
    /// A root-level solve failed; hosts map this to exit code 1.
    Error { message: String },
    /// The current root-level operation is finished; hosts map this to exit
    /// code 0.
    Done,
}

/// An event as delivered to observers: payload plus provenance.
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    /// Name of the agent that emitted the event.
    pub agent_name: String,
    /// Monotonic per-bus sequence number, starting at 0.
    pub seq: u64,
    /// The typed payload.
    pub payload: EventPayload,
}

/// Result type observers return; `Err` is isolated and logged at WARN.
pub type ObserverResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Receives events from an [`EventBus`].
///
/// Implemented automatically for any `Fn(&AgentEvent) -> ObserverResult`
/// closure, so most callers register a plain closure wrapped in `Arc`.
pub trait EventObserver: Send + Sync {
    /// Called once per emitted event, on the emitting thread.
    fn on_event(&self, event: &AgentEvent) -> ObserverResult;
}

impl<F> EventObserver for F
where
    F: Fn(&AgentEvent) -> ObserverResult + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) -> ObserverResult {
        self(event)
    }
}

/// Opaque handle identifying a registered observer, returned by
/// [`EventBus::on_log`] and accepted by
/// [`EventBus::unregister_log_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Per-agent fan-out of events to registered observers.
///
/// The registry is instance-scoped: observers registered on one agent's bus
/// never see another agent's events. Registry mutation serializes with
/// emits through an internal mutex; observers themselves are dispatched
/// outside the lock so a callback may subscribe or unsubscribe without
/// deadlocking.
pub struct EventBus {
    agent_name: String,
    seq: AtomicU64,
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Arc<dyn EventObserver>)>>,
}

impl EventBus {
    /// Create an empty bus for the named agent.
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            seq: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer; it will receive every subsequent emit, in
    /// registration order relative to other observers.
    pub fn on_log(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.push((id, observer));
        id
    }

    /// Register a closure observer. Convenience over [`EventBus::on_log`]
    /// that pins the closure signature for inference.
    pub fn on_log_fn<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&AgentEvent) -> ObserverResult + Send + Sync + 'static,
    {
        self.on_log(Arc::new(observer))
    }

    /// Remove a previously registered observer. Unknown ids are a no-op.
    pub fn unregister_log_callback(&self, id: ObserverId) {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.retain(|(existing, _)| *existing != id);
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Stamp the payload with the agent name and the next sequence number
    /// and dispatch it synchronously to every observer.
    ///
    /// Observer errors are logged at WARN and do not stop dispatch. Returns
    /// the stamped event so producers can reuse it (e.g. for test
    /// assertions).
    pub fn emit(&self, payload: EventPayload) -> AgentEvent {
        let event = AgentEvent {
            agent_name: self.agent_name.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            payload,
        };

        // Snapshot under the lock, dispatch outside it.
        let observers: Vec<(ObserverId, Arc<dyn EventObserver>)> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (_, observer) in observers {
            if let Err(err) = observer.on_event(&event) {
                log::warn!("[{}] log callback error: {}", self.agent_name, err);
            }
        }

        event
    }

    /// Name of the agent this bus belongs to.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn observers_run_in_registration_order() {
        let bus = EventBus::new("a");
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        bus.on_log_fn(move |_| {
            first.lock().unwrap().push(1);
            Ok(())
        });
        let second = Arc::clone(&order);
        bus.on_log_fn(move |_| {
            second.lock().unwrap().push(2);
            Ok(())
        });

        bus.emit(EventPayload::Done);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let bus = EventBus::new("a");
        let first = bus.emit(EventPayload::Done);
        let second = bus.emit(EventPayload::Done);
        assert_eq!(first.seq + 1, second.seq);
    }

    #[test]
    fn failing_observer_does_not_block_later_ones() {
        let bus = EventBus::new("a");
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on_log_fn(|_| Err("boom".into()));
        let counter = Arc::clone(&calls);
        bus.on_log_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(EventPayload::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_unknown_id_is_noop() {
        let bus = EventBus::new("a");
        let id = bus.on_log_fn(|_| Ok(()));
        bus.unregister_log_callback(id);
        bus.unregister_log_callback(id);
        assert_eq!(bus.observer_count(), 0);
    }
}
