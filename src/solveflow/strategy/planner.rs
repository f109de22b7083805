//! Plan-then-execute strategy.
//!
//! Asks the LLM to classify the problem into one of the permitted plan
//! kinds and to supply the actual solution in the same response, then
//! builds the typed [`Plan`]. Responses that name a workflow but fail to
//! materialize one count as parse failures: the strategy retries the
//! analysis up to three times before falling back to a manual plan.

use crate::solveflow::agent::Agent;
use crate::solveflow::context::ProblemContext;
use crate::solveflow::error::AgentResult;
use crate::solveflow::event::LogLevel;
use crate::solveflow::plan::{
    clean_code_block, parse_analysis, Plan, PlanAnalysis, PlanKind, PlanMetadata, StrategyPlan,
    WorkflowSource,
};
use crate::solveflow::strategy::prompts::{analysis_prompt, ANALYST_SYSTEM_MESSAGE};
use crate::solveflow::strategy::Strategy;
use crate::solveflow::workflow::{WorkflowInstance, WorkflowType};
use crate::solveflow::workflow_factory::WorkflowFactory;
use async_trait::async_trait;

const MAX_ANALYSIS_ATTEMPTS: usize = 3;

/// Strategy that plans first, then executes based on the plan kind.
pub struct PlannerStrategy {
    base_confidence: f64,
}

impl PlannerStrategy {
    pub fn new() -> Self {
        Self {
            base_confidence: 0.9,
        }
    }

    /// Turn a parsed analysis into a typed plan.
    ///
    /// Returns `None` when the analysis named a workflow whose YAML did not
    /// materialize — the caller treats that as a parse failure and retries.
    fn build_plan(&self, parsed: &PlanAnalysis, problem: &str) -> Option<Plan> {
        let solution = parsed.solution.trim();

        match parsed.kind {
            PlanKind::Direct if !solution.is_empty() => Some(Plan::Direct {
                content: solution.to_string(),
            }),
            PlanKind::Code if !solution.is_empty() => Some(Plan::Code {
                content: clean_code_block(solution),
            }),
            PlanKind::Input => Some(Plan::Input {
                prompt: if solution.is_empty() {
                    problem.to_string()
                } else {
                    solution.to_string()
                },
            }),
            PlanKind::Workflow => {
                if solution.is_empty() {
                    // Nothing to parse: hand back a keyword-typed instance
                    // that runs as a simple flow.
                    let instance = WorkflowInstance::new(workflow_type_for(problem));
                    return Some(Plan::Workflow(WorkflowSource::Instance(Box::new(instance))));
                }
                match WorkflowFactory::new().from_yaml(solution) {
                    Ok(instance) => {
                        Some(Plan::Workflow(WorkflowSource::Instance(Box::new(instance))))
                    }
                    Err(_) => None,
                }
            }
            PlanKind::Delegate => Some(Plan::Delegate {
                target_agent: if solution.is_empty() {
                    "specialist".to_string()
                } else {
                    solution.to_string()
                },
                content: None,
            }),
            PlanKind::Escalate => Some(Plan::Escalate {
                reason: if solution.is_empty() {
                    "ESCALATE".to_string()
                } else {
                    solution.to_string()
                },
            }),
            // Direct/Code with an empty solution, and anything manual, fail
            // over: use whatever the model said, or defer to manual
            // reasoning at execution time.
            _ => {
                if solution.is_empty() {
                    Some(Plan::Manual {
                        content: "Manual handling".to_string(),
                    })
                } else {
                    Some(Plan::Direct {
                        content: solution.to_string(),
                    })
                }
            }
        }
    }

    fn metadata_from(&self, parsed: &PlanAnalysis) -> PlanMetadata {
        PlanMetadata {
            strategy: "planner".to_string(),
            confidence: if parsed.confidence > 0.0 {
                parsed.confidence
            } else {
                self.base_confidence
            },
            reasoning: parsed.reasoning.clone(),
            complexity: parsed.complexity(),
            estimated_duration: parsed.estimated_duration(),
        }
    }
}

impl Default for PlannerStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for PlannerStrategy {
    fn name(&self) -> &str {
        "planner"
    }

    fn confidence(&self, _problem: &str, _ctx: &ProblemContext) -> f64 {
        self.base_confidence
    }

    async fn create_plan(
        &self,
        agent: &Agent,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<StrategyPlan> {
        let prompt = analysis_prompt(problem, ctx);

        for attempt in 1..=MAX_ANALYSIS_ATTEMPTS {
            let analysis = agent.reason(&prompt, Some(ANALYST_SYSTEM_MESSAGE)).await?;
            let parsed = parse_analysis(&analysis);

            match self.build_plan(&parsed, problem) {
                Some(plan) => {
                    agent.log(
                        &format!("plan analysis settled on {} (attempt {})", plan.kind(), attempt),
                        LogLevel::Debug,
                    );
                    return Ok(StrategyPlan {
                        plan,
                        metadata: self.metadata_from(&parsed),
                    });
                }
                None => {
                    agent.log(
                        &format!(
                            "workflow solution failed to materialize on attempt {}, retrying",
                            attempt
                        ),
                        LogLevel::Warning,
                    );
                }
            }
        }

        agent.log(
            "plan analysis exhausted retries, falling back to manual handling",
            LogLevel::Warning,
        );
        Ok(StrategyPlan {
            plan: Plan::Manual {
                content: "Manual handling".to_string(),
            },
            metadata: PlanMetadata {
                strategy: "planner".to_string(),
                confidence: 0.2,
                reasoning: "analysis retries exhausted".to_string(),
                ..PlanMetadata::default()
            },
        })
    }
}

/// Pick a workflow type from problem keywords, falling back to a generic
/// type. The resulting instance has no FSM and runs as a simple flow.
fn workflow_type_for(problem: &str) -> WorkflowType {
    let lowered = problem.to_lowercase();
    let table: [(&[&str], &str, &str); 4] = [
        (
            &["analyze", "data", "sensor"],
            "DataAnalysisWorkflow",
            "Workflow for analyzing sensor data",
        ),
        (
            &["health", "check", "maintenance"],
            "HealthCheckWorkflow",
            "Workflow for checking equipment health",
        ),
        (
            &["pipeline", "process"],
            "PipelineWorkflow",
            "Workflow for data processing pipeline",
        ),
        (
            &["status", "equipment", "line"],
            "EquipmentStatusWorkflow",
            "Workflow for checking equipment status",
        ),
    ];

    for (keywords, name, docstring) in table {
        if keywords.iter().any(|k| lowered.contains(k)) {
            return WorkflowType::new(name).with_docstring(docstring);
        }
    }
    WorkflowType::new("GenericWorkflow").with_docstring("Generic workflow for problem solving")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(kind: PlanKind, solution: &str) -> PlanAnalysis {
        PlanAnalysis {
            kind,
            solution: solution.to_string(),
            confidence: 0.5,
            reasoning: String::new(),
            details: serde_json::Map::new(),
        }
    }

    #[test]
    fn direct_solution_passes_through() {
        let strategy = PlannerStrategy::new();
        let plan = strategy
            .build_plan(&analysis(PlanKind::Direct, "4"), "What is 2+2?")
            .unwrap();
        assert!(matches!(plan, Plan::Direct { content } if content == "4"));
    }

    #[test]
    fn code_solution_is_cleaned() {
        let strategy = PlannerStrategy::new();
        let plan = strategy
            .build_plan(
                &analysis(PlanKind::Code, "```python\nprint(120)\n```"),
                "factorial",
            )
            .unwrap();
        assert!(matches!(plan, Plan::Code { content } if content == "print(120)"));
    }

    #[test]
    fn empty_solution_falls_over_to_manual() {
        let strategy = PlannerStrategy::new();
        let plan = strategy
            .build_plan(&analysis(PlanKind::Direct, "  "), "p")
            .unwrap();
        assert!(matches!(plan, Plan::Manual { .. }));
    }

    #[test]
    fn bad_workflow_yaml_requests_retry() {
        let strategy = PlannerStrategy::new();
        let plan = strategy.build_plan(&analysis(PlanKind::Workflow, "not: workflow"), "p");
        assert!(plan.is_none());
    }

    #[test]
    fn empty_workflow_solution_uses_keyword_type() {
        let strategy = PlannerStrategy::new();
        let plan = strategy
            .build_plan(
                &analysis(PlanKind::Workflow, ""),
                "Check equipment status of Line 3",
            )
            .unwrap();
        match plan {
            Plan::Workflow(WorkflowSource::Instance(instance)) => {
                assert_eq!(instance.name(), "EquipmentStatusWorkflow");
                assert!(instance.fsm().is_none());
            }
            other => panic!("expected workflow plan, got {:?}", other.kind()),
        }
    }

    #[test]
    fn delegate_and_escalate_defaults() {
        let strategy = PlannerStrategy::new();
        let plan = strategy
            .build_plan(&analysis(PlanKind::Delegate, ""), "p")
            .unwrap();
        assert!(matches!(plan, Plan::Delegate { target_agent, .. } if target_agent == "specialist"));

        let plan = strategy
            .build_plan(&analysis(PlanKind::Escalate, ""), "p")
            .unwrap();
        assert!(matches!(plan, Plan::Escalate { reason } if reason == "ESCALATE"));
    }
}
