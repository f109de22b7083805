//! Pluggable planning strategies and the selector that picks one.
//!
//! A [`Strategy`] scores its fit for a problem and, once selected, produces
//! a [`StrategyPlan`] by talking to the agent's LLM resource. Three
//! strategies ship with the runtime:
//!
//! - [`PlannerStrategy`] — plan-then-execute; asks the model to classify
//!   the problem into a plan kind and supply the solution. Constant high
//!   confidence, so it is the default path.
//! - [`RecursiveStrategy`] — decomposes a problem into a workflow whose
//!   steps re-enter `solve`; guards against identity loops and deep
//!   recursion with a base-case plan.
//! - [`IterativeStrategy`] — refines a candidate solution over bounded
//!   iterations, truncating on identical repeats.
//!
//! Selection is by highest confidence; ties resolve to the earliest
//! registration, and an all-zero field falls back to the recursive
//! strategy.

mod iterative;
mod planner;
pub mod prompts;
mod recursive;

pub use iterative::IterativeStrategy;
pub use planner::PlannerStrategy;
pub use recursive::RecursiveStrategy;

use crate::solveflow::agent::Agent;
use crate::solveflow::context::ProblemContext;
use crate::solveflow::error::AgentResult;
use crate::solveflow::plan::StrategyPlan;
use async_trait::async_trait;
use std::sync::Arc;

/// A pluggable planner.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable identifier (`planner`, `recursive`, `iterative`, ...).
    fn name(&self) -> &str;

    /// Confidence in `0.0..=1.0` that this strategy fits the problem.
    fn confidence(&self, problem: &str, ctx: &ProblemContext) -> f64;

    /// Produce a plan, using the agent's resources as needed. Transport
    /// failures propagate; parse-class failures are handled internally.
    async fn create_plan(
        &self,
        agent: &Agent,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<StrategyPlan>;
}

/// Ordered strategy registry with confidence-based selection.
pub struct StrategySelector {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategySelector {
    /// An empty selector. [`StrategySelector::select`] on an empty selector
    /// falls back to a default [`RecursiveStrategy`].
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The standard set: planner, recursive, iterative — in that order.
    pub fn with_defaults() -> Self {
        let mut selector = Self::new();
        selector.register(Arc::new(PlannerStrategy::default()));
        selector.register(Arc::new(RecursiveStrategy::default()));
        selector.register(Arc::new(IterativeStrategy::default()));
        selector
    }

    /// Append a strategy. Registration order breaks confidence ties.
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    /// Registered strategies, in registration order.
    pub fn strategies(&self) -> &[Arc<dyn Strategy>] {
        &self.strategies
    }

    /// Pick the strategy with the highest confidence for the problem.
    ///
    /// Ties go to the earliest registration. When every strategy scores
    /// zero (or none is registered), the recursive strategy is the
    /// default — the registered one when present, a fresh default
    /// otherwise.
    pub fn select(&self, problem: &str, ctx: &ProblemContext) -> Arc<dyn Strategy> {
        let mut best: Option<(f64, &Arc<dyn Strategy>)> = None;
        for strategy in &self.strategies {
            let score = strategy.confidence(problem, ctx).clamp(0.0, 1.0);
            match &best {
                Some((best_score, _)) if score <= *best_score => {}
                _ if score > 0.0 => best = Some((score, strategy)),
                _ => {}
            }
        }

        match best {
            Some((_, strategy)) => Arc::clone(strategy),
            None => self
                .strategies
                .iter()
                .find(|s| s.name() == "recursive")
                .cloned()
                .unwrap_or_else(|| Arc::new(RecursiveStrategy::default())),
        }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::with_defaults()
    }
}
