// src/lib.rs

//! An agent runtime that solves natural-language problems by orchestrating
//! LLM calls, sandboxed code execution, and finite-state workflows.
//!
//! A caller submits a problem string; the runtime plans (asking an LLM for
//! a structured plan and parsing it), executes (dispatching to a direct
//! answer, a code run, a delegated agent, a human escalation, or a
//! workflow FSM whose steps recursively re-enter `solve`), and returns a
//! validated result. Agents persist conversation history and metrics
//! across calls and stream log/lifecycle events to subscribed observers.
//!
//! Start at [`Agent`], wire in transports through
//! [`resource`](crate::resource), and observe progress through
//! [`event`](crate::event).

// Import the top-level `solveflow` module.
pub mod solveflow;

// Re-export the crate surface at the root for ergonomic paths.
pub use solveflow::agent::{self, Agent, AgentMetrics, SolveInput};
pub use solveflow::context;
pub use solveflow::error;
pub use solveflow::event;
pub use solveflow::executor;
pub use solveflow::fsm;
pub use solveflow::memory;
pub use solveflow::plan;
pub use solveflow::promise;
pub use solveflow::resource;
pub use solveflow::strategy;
pub use solveflow::workflow;
pub use solveflow::workflow_factory;
