//! Problem context, recursion bookkeeping, and the global action history.
//!
//! This module defines how information flows through recursive solving:
//!
//! - [`ProblemContext`] travels down the solve stack. Each sub-solve gets a
//!   child context with the depth incremented, the root problem preserved,
//!   and constraints/assumptions copied so children can extend them without
//!   mutating their parent.
//! - [`ActionHistory`] is a depth-tagged, append-only record of everything
//!   the agent did across all recursion levels, with derived complexity
//!   indicators and pattern recognition over the successful actions.
//! - [`TurnHistory`] partitions action records by user request, so each new
//!   `solve` call starts a fresh conversation turn and earlier turns can be
//!   folded into the next turn's constraints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Mutex;
use uuid::Uuid;

/// Well-known action type tags recorded in the [`ActionHistory`].
pub mod action_types {
    /// A `solve` invocation, at any depth.
    pub const SOLVE: &str = "agent_solve_call";
    /// A single-shot reasoning (LLM) call.
    pub const REASON: &str = "agent_reason";
    /// A user-input request.
    pub const INPUT: &str = "agent_input";
}

/// Problem-specific information with hierarchical structure.
///
/// A context is owned by the solve-call frame that created it; sub-contexts
/// never outlive their parent frame.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemContext {
    /// The problem this frame is solving.
    pub problem_statement: String,
    /// What this frame is trying to achieve.
    pub objective: String,
    /// The root problem the whole recursion started from.
    pub original_problem: String,
    /// Recursion level; 0 for the root frame.
    pub depth: usize,
    /// Accumulated constraints, copied (not shared) into children.
    pub constraints: Map<String, Value>,
    /// Working assumptions, copied into children.
    pub assumptions: Vec<String>,
    /// The parent frame's problem statement, used for identity-loop
    /// detection. `None` on the root frame.
    pub parent_problem: Option<String>,
}

impl ProblemContext {
    /// Create a root context at depth 0 for a fresh user request.
    pub fn root(problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self {
            objective: format!("Solve: {}", problem),
            original_problem: problem.clone(),
            problem_statement: problem,
            depth: 0,
            constraints: Map::new(),
            assumptions: Vec::new(),
            parent_problem: None,
        }
    }

    /// Override the objective (builder pattern).
    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    /// Create a context for a sub-problem: root problem inherited,
    /// constraints and assumptions copied, depth incremented.
    pub fn sub_context(
        &self,
        sub_problem: impl Into<String>,
        sub_objective: impl Into<String>,
    ) -> Self {
        Self {
            problem_statement: sub_problem.into(),
            objective: sub_objective.into(),
            original_problem: self.original_problem.clone(),
            depth: self.depth + 1,
            constraints: self.constraints.clone(),
            assumptions: self.assumptions.clone(),
            parent_problem: Some(self.problem_statement.clone()),
        }
    }

    /// True when `problem` is the same as the parent frame's problem after
    /// case-folding and whitespace normalization. Root frames have no
    /// parent and always return false.
    pub fn repeats_parent(&self, problem: &str) -> bool {
        match &self.parent_problem {
            Some(parent) => normalize(problem) == normalize(parent),
            None => false,
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// An immutable record of one action taken during problem solving.
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    /// One of the [`action_types`] tags (or a caller-defined tag).
    pub action_type: String,
    /// Human-readable description of the action.
    pub description: String,
    /// Recursion depth at which the action occurred.
    pub depth: usize,
    /// When the action occurred.
    pub timestamp: DateTime<Utc>,
    /// Outcome payload; `Value::Null` when the action failed.
    pub result: Value,
    /// Identifier of the workflow that ran the action, empty outside
    /// workflow execution.
    pub workflow_id: String,
    /// The problem being solved when the action ran.
    pub problem_statement: String,
    /// Did the action succeed?
    pub success: bool,
    /// Wall-clock duration in seconds.
    pub execution_time: f64,
    /// What went wrong, when `success` is false.
    pub error_message: Option<String>,
}

/// Complexity indicators derived from the action history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityIndicators {
    /// Number of recorded solve calls (sub-problems included).
    pub sub_problem_count: usize,
    /// Sum of all execution times, in seconds.
    pub execution_time_total: f64,
    /// Fraction of actions that failed, in `0.0..=1.0`.
    pub error_rate: f64,
    /// Deepest recursion level any action reached.
    pub max_depth_reached: usize,
}

/// Linear, append-only action record across all recursion levels.
///
/// Owned by the root agent; nested frames append through a shared
/// reference. Readers always observe a consistent prefix: entries are never
/// mutated or removed, so `len()` is non-decreasing for the duration of a
/// solve.
#[derive(Debug, Default)]
pub struct ActionHistory {
    actions: Mutex<Vec<Action>>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one action.
    pub fn record(&self, action: Action) {
        self.lock().push(action);
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The most recent `count` actions, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Action> {
        let actions = self.lock();
        let start = actions.len().saturating_sub(count);
        actions[start..].to_vec()
    }

    /// All actions recorded at the given recursion depth.
    pub fn by_depth(&self, depth: usize) -> Vec<Action> {
        self.lock()
            .iter()
            .filter(|a| a.depth == depth)
            .cloned()
            .collect()
    }

    /// All actions with the given type tag.
    pub fn by_type(&self, action_type: &str) -> Vec<Action> {
        self.lock()
            .iter()
            .filter(|a| a.action_type == action_type)
            .cloned()
            .collect()
    }

    /// Derived complexity indicators over everything recorded so far.
    pub fn indicators(&self) -> ComplexityIndicators {
        let actions = self.lock();
        if actions.is_empty() {
            return ComplexityIndicators {
                sub_problem_count: 0,
                execution_time_total: 0.0,
                error_rate: 0.0,
                max_depth_reached: 0,
            };
        }

        let failures = actions.iter().filter(|a| !a.success).count();
        ComplexityIndicators {
            sub_problem_count: actions
                .iter()
                .filter(|a| a.action_type == action_types::SOLVE)
                .count(),
            execution_time_total: actions.iter().map(|a| a.execution_time).sum(),
            error_rate: failures as f64 / actions.len() as f64,
            max_depth_reached: actions.iter().map(|a| a.depth).max().unwrap_or(0),
        }
    }

    /// Failed actions whose error message suggests a constraint violation.
    pub fn constraint_violations(&self) -> Vec<String> {
        const KEYWORDS: [&str; 4] = ["constraint", "limit", "violation", "exceeded"];
        self.lock()
            .iter()
            .filter(|a| !a.success)
            .filter_map(|a| {
                let message = a.error_message.as_ref()?;
                let lowered = message.to_lowercase();
                if KEYWORDS.iter().any(|k| lowered.contains(k)) {
                    Some(format!("{}: {}", a.description, message))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Recognize recurring patterns among the successful actions:
    /// `recursive_decomposition` when more than two solve calls succeeded,
    /// `user_interaction` when any input action ran, and
    /// `reasoning_intensive` when more than three reasoning calls ran.
    pub fn successful_patterns(&self) -> Vec<String> {
        let actions = self.lock();
        let count = |tag: &str| {
            actions
                .iter()
                .filter(|a| a.success && a.action_type == tag)
                .count()
        };

        let mut patterns = Vec::new();
        if count(action_types::SOLVE) > 2 {
            patterns.push("recursive_decomposition".to_string());
        }
        if count(action_types::INPUT) > 0 {
            patterns.push("user_interaction".to_string());
        }
        if count(action_types::REASON) > 3 {
            patterns.push("reasoning_intensive".to_string());
        }
        patterns
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Action>> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One conversation turn: the anchoring user request plus the ordered
/// records produced while serving it.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub id: Uuid,
    /// The user request this turn serves.
    pub problem: String,
    pub started_at: DateTime<Utc>,
    /// Ordered `(label, detail)` entries appended while solving.
    pub entries: Vec<(String, String)>,
}

/// Event history partitioned into conversation turns.
///
/// Each root-level `solve` with a string problem opens a new turn; records
/// appended afterwards land in that turn until the next one starts.
#[derive(Debug, Default)]
pub struct TurnHistory {
    turns: Mutex<Vec<TurnRecord>>,
}

impl TurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new conversation turn anchored on the given request.
    pub fn start_turn(&self, problem: impl Into<String>) -> Uuid {
        let record = TurnRecord {
            id: Uuid::new_v4(),
            problem: problem.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
        };
        let id = record.id;
        self.lock().push(record);
        id
    }

    /// Append a record to the current turn. Dropped silently when no turn
    /// has been started yet.
    pub fn record(&self, label: impl Into<String>, detail: impl Into<String>) {
        if let Some(turn) = self.lock().last_mut() {
            turn.entries.push((label.into(), detail.into()));
        }
    }

    /// Number of turns started so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no turn has been started.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all turns, oldest first.
    pub fn turns(&self) -> Vec<TurnRecord> {
        self.lock().clone()
    }

    /// A compact textual summary of the turns *before* the current one,
    /// suitable for carrying prior conversation into a new problem context.
    /// Returns `None` when there is no earlier turn.
    pub fn conversation_context(&self) -> Option<String> {
        let turns = self.lock();
        if turns.len() < 2 {
            return None;
        }
        let summary = turns[..turns.len() - 1]
            .iter()
            .map(|t| format!("- {}", t.problem))
            .collect::<Vec<_>>()
            .join("\n");
        Some(format!("Earlier requests in this conversation:\n{}", summary))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TurnRecord>> {
        self.turns.lock().unwrap_or_else(|e| e.into_inner())
    }
}
