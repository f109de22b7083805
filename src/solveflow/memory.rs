//! Per-agent conversation memory.
//!
//! [`ConversationMemory`] is an append-only log of `(user, assistant)` turns
//! with derived statistics. Each agent owns exactly one instance; it is
//! created during `acquire` and emptied during `release`. Nothing here is
//! shared across agents.
//!
//! # Example
//!
//! ```rust
//! use solveflow::memory::ConversationMemory;
//!
//! let mut memory = ConversationMemory::new();
//! memory.add_turn("What is 2+2?", "4");
//! memory.add_turn("And doubled?", "8");
//!
//! let stats = memory.statistics();
//! assert_eq!(stats.total_turns, 2);
//! assert_eq!(stats.total_messages, 4);
//!
//! memory.clear();
//! assert_eq!(memory.statistics().total_turns, 0);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One exchange: what the user said and what the assistant answered.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

/// Derived statistics over a [`ConversationMemory`].
///
/// These are computed on demand from the stored turns, never written
/// directly. `summary_count` stays zero because the core performs no
/// summarization; `session_count` is 1 for the lifetime of the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStatistics {
    /// Total individual messages (two per turn).
    pub total_messages: usize,
    /// Total turns ever appended since the last `clear`.
    pub total_turns: usize,
    /// Turns still available verbatim (all of them, absent summarization).
    pub active_turns: usize,
    /// Number of summarized segments. Always 0 in the core runtime.
    pub summary_count: usize,
    /// Number of sessions this memory has served. Always 1 in the core.
    pub session_count: usize,
}

/// Append-only, ordered turn log for a single agent.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append one `(user, assistant)` exchange, stamped with the current
    /// time. Order is preserved; turns are never mutated after insertion.
    pub fn add_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(ConversationTurn {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        });
    }

    /// The most recent `n` turns, oldest first. Returns everything when `n`
    /// exceeds the stored count.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// All stored turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of stored turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when no turns are stored.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Empty the storage. Statistics derive back to their initial values.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Compute current statistics from the stored turns.
    pub fn statistics(&self) -> MemoryStatistics {
        MemoryStatistics {
            total_messages: self.turns.len() * 2,
            total_turns: self.turns.len(),
            active_turns: self.turns.len(),
            summary_count: 0,
            session_count: 1,
        }
    }
}
