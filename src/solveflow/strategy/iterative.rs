//! Iterative refinement strategy.
//!
//! Produces an initial solution and refines it across bounded iterations,
//! truncating as soon as a refinement round repeats the previous solution
//! verbatim. Intentionally minimal: richer mid-iteration semantics are a
//! future extension, and the final text is simply returned as a direct
//! plan.

use crate::solveflow::agent::Agent;
use crate::solveflow::context::ProblemContext;
use crate::solveflow::error::AgentResult;
use crate::solveflow::event::LogLevel;
use crate::solveflow::plan::{Complexity, Plan, PlanMetadata, StrategyPlan};
use crate::solveflow::strategy::prompts::{refinement_prompt, ANALYST_SYSTEM_MESSAGE};
use crate::solveflow::strategy::Strategy;
use async_trait::async_trait;

/// Default bound on refinement iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

const REFINEMENT_CUES: [&str; 5] = ["refine", "improve", "iterate", "revise", "polish"];

/// Strategy that solves problems through iterative refinement.
pub struct IterativeStrategy {
    max_iterations: usize,
}

impl IterativeStrategy {
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Override the iteration bound (builder pattern).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

impl Default for IterativeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for IterativeStrategy {
    fn name(&self) -> &str {
        "iterative"
    }

    fn confidence(&self, problem: &str, ctx: &ProblemContext) -> f64 {
        if ctx.repeats_parent(problem) {
            return 0.0;
        }
        let lowered = problem.to_lowercase();
        if REFINEMENT_CUES.iter().any(|cue| lowered.contains(cue)) {
            0.7
        } else {
            0.4
        }
    }

    async fn create_plan(
        &self,
        agent: &Agent,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<StrategyPlan> {
        let mut current = agent
            .reason(
                &refinement_prompt(problem, None, 1),
                Some(ANALYST_SYSTEM_MESSAGE),
            )
            .await?;
        let mut iterations = 1;

        for iteration in 2..=self.max_iterations {
            let next = agent
                .reason(
                    &refinement_prompt(problem, Some(&current), iteration),
                    Some(ANALYST_SYSTEM_MESSAGE),
                )
                .await?;
            iterations = iteration;

            if next.trim() == current.trim() {
                agent.log(
                    &format!("refinement repeated itself at iteration {}, truncating", iteration),
                    LogLevel::Debug,
                );
                break;
            }
            current = next;
        }

        Ok(StrategyPlan {
            plan: Plan::Direct { content: current },
            metadata: PlanMetadata {
                strategy: "iterative".to_string(),
                confidence: self.confidence(problem, ctx),
                reasoning: format!("converged after {} iterations", iterations),
                complexity: Complexity::Moderate,
                estimated_duration: "minutes".to_string(),
            },
        })
    }
}
