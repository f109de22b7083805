//! Finite state machines driving workflow execution.
//!
//! An [`Fsm`] is a data structure: a state set, an initial/current state,
//! transitions keyed by `(from_state, event)` pairs, per-state metadata and
//! results, and workflow-level metadata. The workflow engine interprets it;
//! nothing here performs actions on its own.
//!
//! Transitions are stored under a typed [`TransitionKey`] so event strings
//! containing separator characters can never collide; the key's `Display`
//! impl prints the familiar `from:event` form for debugging.
//!
//! # Invariants
//!
//! Constructors and mutators maintain, for every reachable machine:
//! `initial_state ∈ states`, `current_state ∈ states`, and both endpoints
//! of every transition `∈ states`. State status only moves
//! `pending → executing → (completed | failed)`.
//!
//! # Example
//!
//! ```rust
//! use solveflow::fsm::Fsm;
//!
//! let mut fsm = Fsm::linear(vec![
//!     "START".to_string(),
//!     "MEASURE".to_string(),
//!     "COMPLETE".to_string(),
//! ])
//! .unwrap();
//!
//! assert_eq!(fsm.current_state(), "START");
//! assert!(fsm.transition("next"));
//! assert_eq!(fsm.current_state(), "MEASURE");
//! assert!(fsm.transition("next"));
//! assert!(fsm.is_terminal("COMPLETE"));
//! ```

use crate::solveflow::error::{AgentError, AgentResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Reserved entry state, carries no metadata.
pub const START_STATE: &str = "START";
/// Reserved success terminal state.
pub const COMPLETE_STATE: &str = "COMPLETE";
/// Reserved failure terminal state.
pub const ERROR_STATE: &str = "ERROR";
/// The event that advances a linear machine.
pub const NEXT_EVENT: &str = "next";
/// The event fired when a state action fails and an error route exists.
pub const ERROR_EVENT: &str = "error";

/// Typed transition lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    pub from: String,
    pub event: String,
}

impl TransitionKey {
    pub fn new(from: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            event: event.into(),
        }
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from, self.event)
    }
}

/// Execution status of a single state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StateStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl StateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateStatus::Pending => "pending",
            StateStatus::Executing => "executing",
            StateStatus::Completed => "completed",
            StateStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to an executable state.
#[derive(Debug, Clone, Serialize)]
pub struct StateMetadata {
    /// The action the workflow engine hands to the agent.
    pub action: String,
    /// What the action is meant to achieve.
    pub objective: String,
    /// Free-form parameters forwarded to the action.
    pub parameters: Map<String, Value>,
    /// Conditions recorded with the step (informational).
    pub conditions: Map<String, Value>,
    /// Current execution status.
    pub status: StateStatus,
}

impl StateMetadata {
    /// Metadata for an explicit workflow step.
    pub fn for_step(action: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            objective: objective.into(),
            parameters: Map::new(),
            conditions: Map::new(),
            status: StateStatus::Pending,
        }
    }

    /// Default metadata for a user state that declared nothing.
    pub fn default_for(state: &str) -> Self {
        Self::for_step("execute_step", format!("Execute {}", state))
    }

    /// Attach parameters (builder pattern).
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attach conditions (builder pattern).
    pub fn with_conditions(mut self, conditions: Map<String, Value>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Finite state machine with per-state metadata, results, and workflow
/// context.
#[derive(Debug, Clone)]
pub struct Fsm {
    states: Vec<String>,
    initial_state: String,
    current_state: String,
    transitions: HashMap<TransitionKey, String>,
    state_metadata: HashMap<String, StateMetadata>,
    results: HashMap<String, Value>,
    workflow_metadata: Map<String, Value>,
}

impl Fsm {
    /// Linear machine: each state transitions to the next on `"next"`.
    ///
    /// States not named `START`/`COMPLETE`/`ERROR` receive default metadata.
    /// Requires at least two states.
    pub fn linear(states: Vec<String>) -> AgentResult<Self> {
        let metadata = states
            .iter()
            .filter(|s| !is_reserved(s))
            .map(|s| (s.clone(), StateMetadata::default_for(s)))
            .collect();
        Self::linear_with_metadata(states, metadata, Map::new())
    }

    /// Linear machine with explicit per-state metadata and workflow
    /// metadata.
    pub fn linear_with_metadata(
        states: Vec<String>,
        state_metadata: HashMap<String, StateMetadata>,
        workflow_metadata: Map<String, Value>,
    ) -> AgentResult<Self> {
        if states.len() < 2 {
            return Err(AgentError::InvalidArgument(
                "a linear FSM requires at least 2 states".to_string(),
            ));
        }
        let mut transitions = HashMap::new();
        for pair in states.windows(2) {
            transitions.insert(
                TransitionKey::new(pair[0].clone(), NEXT_EVENT),
                pair[1].clone(),
            );
        }
        let initial = states[0].clone();
        Self::build(states, initial, transitions, state_metadata, workflow_metadata)
    }

    /// Branching machine with explicit transitions. States without metadata
    /// that are not `START`/`COMPLETE`/`ERROR` receive defaults.
    pub fn branching(
        states: Vec<String>,
        initial_state: impl Into<String>,
        transitions: HashMap<TransitionKey, String>,
    ) -> AgentResult<Self> {
        let metadata = states
            .iter()
            .filter(|s| !is_reserved(s))
            .map(|s| (s.clone(), StateMetadata::default_for(s)))
            .collect();
        Self::branching_with_metadata(states, initial_state, transitions, metadata, Map::new())
    }

    /// Branching machine with explicit transitions and metadata.
    pub fn branching_with_metadata(
        states: Vec<String>,
        initial_state: impl Into<String>,
        transitions: HashMap<TransitionKey, String>,
        state_metadata: HashMap<String, StateMetadata>,
        workflow_metadata: Map<String, Value>,
    ) -> AgentResult<Self> {
        Self::build(
            states,
            initial_state.into(),
            transitions,
            state_metadata,
            workflow_metadata,
        )
    }

    /// The canned `START → PROCESSING → COMPLETE` machine used when a
    /// workflow needs an FSM but declared none.
    pub fn simple_workflow(workflow_metadata: Map<String, Value>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            "PROCESSING".to_string(),
            StateMetadata::for_step("execute_workflow", "Execute the main workflow logic"),
        );
        // The fixed three-state shape cannot fail validation.
        Self::linear_with_metadata(
            vec![
                START_STATE.to_string(),
                "PROCESSING".to_string(),
                COMPLETE_STATE.to_string(),
            ],
            metadata,
            workflow_metadata,
        )
        .unwrap_or_else(|_| unreachable!("static simple-workflow FSM is always valid"))
    }

    /// A branching machine with retry semantics:
    ///
    /// ```text
    /// START --begin--> PROCESSING --success--> COMPLETE
    ///                  PROCESSING --error----> ERROR --retry--> RETRY --begin--> PROCESSING
    ///                                          ERROR --abort--> COMPLETE
    /// ```
    pub fn error_handling(workflow_metadata: Map<String, Value>) -> Self {
        let states: Vec<String> = ["START", "PROCESSING", "COMPLETE", "ERROR", "RETRY"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut transitions = HashMap::new();
        for (from, event, to) in [
            ("START", "begin", "PROCESSING"),
            ("PROCESSING", "success", "COMPLETE"),
            ("PROCESSING", "error", "ERROR"),
            ("ERROR", "retry", "RETRY"),
            ("RETRY", "begin", "PROCESSING"),
            ("ERROR", "abort", "COMPLETE"),
        ] {
            transitions.insert(TransitionKey::new(from, event), to.to_string());
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "PROCESSING".to_string(),
            StateMetadata::for_step("execute_workflow", "Execute the main workflow logic"),
        );
        metadata.insert(
            "RETRY".to_string(),
            StateMetadata::for_step("retry_execution", "Retry the failed execution"),
        );

        Self::branching_with_metadata(states, START_STATE, transitions, metadata, workflow_metadata)
            .unwrap_or_else(|_| unreachable!("static error-handling FSM is always valid"))
    }

    fn build(
        states: Vec<String>,
        initial_state: String,
        transitions: HashMap<TransitionKey, String>,
        state_metadata: HashMap<String, StateMetadata>,
        workflow_metadata: Map<String, Value>,
    ) -> AgentResult<Self> {
        if !states.contains(&initial_state) {
            return Err(AgentError::InvalidArgument(format!(
                "initial state '{}' is not in the state set",
                initial_state
            )));
        }
        for (key, to) in &transitions {
            if !states.contains(&key.from) {
                return Err(AgentError::InvalidArgument(format!(
                    "transition '{}' starts from unknown state '{}'",
                    key, key.from
                )));
            }
            if !states.contains(to) {
                return Err(AgentError::InvalidArgument(format!(
                    "transition '{}' targets unknown state '{}'",
                    key, to
                )));
            }
        }
        for state in state_metadata.keys() {
            if !states.contains(state) {
                return Err(AgentError::InvalidArgument(format!(
                    "metadata attached to unknown state '{}'",
                    state
                )));
            }
        }

        Ok(Self {
            current_state: initial_state.clone(),
            initial_state,
            states,
            transitions,
            state_metadata,
            results: HashMap::new(),
            workflow_metadata,
        })
    }

    // ---- Inspection ----

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn contains_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    /// Is a transition registered for `(from, event)`?
    pub fn can_transition(&self, from: &str, event: &str) -> bool {
        self.transitions
            .contains_key(&TransitionKey::new(from, event))
    }

    /// Target of `(from, event)`, if registered.
    pub fn next_state(&self, from: &str, event: &str) -> Option<&str> {
        self.transitions
            .get(&TransitionKey::new(from, event))
            .map(String::as_str)
    }

    /// Events with a registered transition out of `state`.
    pub fn available_events(&self, state: &str) -> Vec<String> {
        self.transitions
            .keys()
            .filter(|k| k.from == state)
            .map(|k| k.event.clone())
            .collect()
    }

    /// A state with no outgoing transitions is terminal.
    pub fn is_terminal(&self, state: &str) -> bool {
        !self.transitions.keys().any(|k| k.from == state)
    }

    // ---- Mutation ----

    /// Attempt to move the current state along `event`. Returns whether a
    /// transition fired.
    pub fn transition(&mut self, event: &str) -> bool {
        let key = TransitionKey::new(self.current_state.clone(), event);
        match self.transitions.get(&key) {
            Some(next) => {
                self.current_state = next.clone();
                true
            }
            None => false,
        }
    }

    /// Return the machine to its initial state. Metadata, results, and
    /// statuses are left untouched.
    pub fn reset(&mut self) {
        self.current_state = self.initial_state.clone();
    }

    /// Register an additional transition; both endpoints must already be
    /// states.
    pub fn add_transition(
        &mut self,
        from: impl Into<String>,
        event: impl Into<String>,
        to: impl Into<String>,
    ) -> AgentResult<()> {
        let key = TransitionKey::new(from, event);
        let to = to.into();
        if !self.contains_state(&key.from) {
            return Err(AgentError::InvalidArgument(format!(
                "unknown source state '{}'",
                key.from
            )));
        }
        if !self.contains_state(&to) {
            return Err(AgentError::InvalidArgument(format!(
                "unknown target state '{}'",
                to
            )));
        }
        self.transitions.insert(key, to);
        Ok(())
    }

    // ---- Metadata, status, results ----

    pub fn state_metadata(&self, state: &str) -> Option<&StateMetadata> {
        self.state_metadata.get(state)
    }

    /// Metadata of the current state, when it has any.
    pub fn current_metadata(&self) -> Option<&StateMetadata> {
        self.state_metadata.get(&self.current_state)
    }

    /// Update the status of a state. Unknown states are ignored.
    pub fn set_status(&mut self, state: &str, status: StateStatus) {
        if let Some(metadata) = self.state_metadata.get_mut(state) {
            metadata.status = status;
        }
    }

    pub fn status(&self, state: &str) -> Option<StateStatus> {
        self.state_metadata.get(state).map(|m| m.status)
    }

    /// Record a state's result. Does not change the state's status.
    pub fn set_result(&mut self, state: impl Into<String>, result: Value) {
        self.results.insert(state.into(), result);
    }

    pub fn result(&self, state: &str) -> Option<&Value> {
        self.results.get(state)
    }

    pub fn results(&self) -> &HashMap<String, Value> {
        &self.results
    }

    pub fn workflow_metadata(&self) -> &Map<String, Value> {
        &self.workflow_metadata
    }

    /// Merge entries into the workflow metadata, overwriting on collision.
    pub fn merge_workflow_metadata(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.workflow_metadata.insert(key, value);
        }
    }
}

fn is_reserved(state: &str) -> bool {
    state == START_STATE || state == COMPLETE_STATE || state == ERROR_STATE
}
