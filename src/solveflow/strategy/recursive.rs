//! Recursive decomposition strategy.
//!
//! Breaks a problem into a workflow whose state actions re-enter `solve`
//! at the next depth. Two guards keep the recursion finite: an identity
//! check (a sub-problem identical to its parent, case-insensitively and
//! whitespace-normalized, is an obvious loop) and a depth cap. Both
//! produce a base-case plan whose execution returns the canonical
//! base-case message instead of recursing further.

use crate::solveflow::agent::Agent;
use crate::solveflow::context::ProblemContext;
use crate::solveflow::error::AgentResult;
use crate::solveflow::event::LogLevel;
use crate::solveflow::plan::{Complexity, Plan, PlanMetadata, StrategyPlan, WorkflowSource};
use crate::solveflow::strategy::prompts::{decomposition_prompt, ANALYST_SYSTEM_MESSAGE};
use crate::solveflow::strategy::Strategy;
use crate::solveflow::workflow_factory::WorkflowFactory;
use async_trait::async_trait;

/// Default recursion depth cap.
pub const DEFAULT_MAX_DEPTH: usize = 10;

const DECOMPOSITION_CUES: [&str; 6] = ["plan", "organize", "steps", " and ", "then", "build"];

/// Strategy that solves problems by breaking them down recursively.
pub struct RecursiveStrategy {
    max_depth: usize,
}

impl RecursiveStrategy {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the depth cap (builder pattern).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The canonical base-case message for a problem at this cap.
    pub fn base_case_message(&self, problem: &str) -> String {
        format!(
            "Base case reached for: {}. Maximum recursion depth ({}) exceeded.",
            problem, self.max_depth
        )
    }

    fn base_case_plan(&self, problem: &str) -> StrategyPlan {
        StrategyPlan {
            plan: Plan::Direct {
                content: self.base_case_message(problem),
            },
            metadata: PlanMetadata {
                strategy: "recursive".to_string(),
                confidence: 1.0,
                reasoning: "recursion guard triggered base-case handling".to_string(),
                complexity: Complexity::Simple,
                estimated_duration: "immediate".to_string(),
            },
        }
    }
}

impl Default for RecursiveStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for RecursiveStrategy {
    fn name(&self) -> &str {
        "recursive"
    }

    fn confidence(&self, problem: &str, ctx: &ProblemContext) -> f64 {
        if ctx.repeats_parent(problem) {
            return 0.0;
        }
        let lowered = problem.to_lowercase();
        if DECOMPOSITION_CUES.iter().any(|cue| lowered.contains(cue)) {
            0.75
        } else {
            0.6
        }
    }

    async fn create_plan(
        &self,
        agent: &Agent,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<StrategyPlan> {
        if ctx.depth >= self.max_depth {
            agent.log(
                &format!(
                    "depth {} reached the recursive cap of {}, substituting base case",
                    ctx.depth, self.max_depth
                ),
                LogLevel::Info,
            );
            return Ok(self.base_case_plan(problem));
        }
        if ctx.repeats_parent(problem) {
            agent.log(
                "sub-problem repeats its parent, substituting base case",
                LogLevel::Info,
            );
            return Ok(self.base_case_plan(problem));
        }

        let response = agent
            .reason(
                &decomposition_prompt(problem, ctx),
                Some(ANALYST_SYSTEM_MESSAGE),
            )
            .await?;

        let factory = WorkflowFactory::new();
        let instance = match factory.from_yaml(&response) {
            Ok(instance) => instance,
            Err(err) => {
                agent.log(
                    &format!(
                        "decomposition output was not a workflow ({}), using the standard breakdown",
                        err
                    ),
                    LogLevel::Warning,
                );
                factory.simple(
                    "recursive_decomposition",
                    &["Analyze Problem", "Execute Solution", "Synthesize Results"],
                    &format!("Recursive breakdown of: {}", problem),
                )?
            }
        };

        Ok(StrategyPlan {
            plan: Plan::Workflow(WorkflowSource::Instance(Box::new(instance))),
            metadata: PlanMetadata {
                strategy: "recursive".to_string(),
                confidence: self.confidence(problem, ctx),
                reasoning: "problem decomposes into independent steps".to_string(),
                complexity: Complexity::Complex,
                estimated_duration: "minutes".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_loop_zeroes_confidence() {
        let strategy = RecursiveStrategy::new();
        let root = ProblemContext::root("Plan the launch");
        let child = root.sub_context("something", "obj");

        assert_eq!(strategy.confidence("plan the launch", &child), 0.0);
        assert!(strategy.confidence("a different problem", &child) > 0.0);
    }

    #[test]
    fn decomposition_cues_raise_confidence() {
        let strategy = RecursiveStrategy::new();
        let ctx = ProblemContext::root("x");
        assert!(
            strategy.confidence("plan the conference and book rooms", &ctx)
                > strategy.confidence("what is 2+2?", &ctx)
        );
    }

    #[test]
    fn base_case_message_format() {
        let strategy = RecursiveStrategy::new().with_max_depth(3);
        assert_eq!(
            strategy.base_case_message("loop me"),
            "Base case reached for: loop me. Maximum recursion depth (3) exceeded."
        );
    }
}
