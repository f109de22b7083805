//! Recursion control: depth caps, identity loops, and the action history
//! they leave behind.

use async_trait::async_trait;
use serde_json::json;
use solveflow::agent::Agent;
use solveflow::context::{action_types, ProblemContext};
use solveflow::error::AgentResult;
use solveflow::fsm::Fsm;
use solveflow::plan::{Plan, StrategyPlan, WorkflowSource};
use solveflow::resource::ScriptedLlmClient;
use solveflow::strategy::{RecursiveStrategy, Strategy};
use solveflow::workflow::{WorkflowInstance, WorkflowType};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A strategy that always answers with a one-step workflow whose action
/// recurses into solve again.
struct AlwaysRecurse;

#[async_trait]
impl Strategy for AlwaysRecurse {
    fn name(&self) -> &str {
        "always-recurse"
    }

    fn confidence(&self, _problem: &str, _ctx: &ProblemContext) -> f64 {
        1.0
    }

    async fn create_plan(
        &self,
        _agent: &Agent,
        _problem: &str,
        _ctx: &ProblemContext,
    ) -> AgentResult<StrategyPlan> {
        let fsm = Fsm::linear(vec![
            "START".to_string(),
            "RECURSE".to_string(),
            "COMPLETE".to_string(),
        ])?;
        let instance = WorkflowInstance::new(WorkflowType::new("LoopWorkflow")).with_fsm(fsm);
        Ok(StrategyPlan::new(Plan::Workflow(WorkflowSource::Instance(
            Box::new(instance),
        ))))
    }
}

#[tokio::test]
async fn depth_cap_substitutes_base_case() {
    init_logging();
    let agent = Arc::new(
        Agent::new("looper")
            .with_llm_client(Arc::new(ScriptedLlmClient::new()))
            .with_strategies(vec![Arc::new(AlwaysRecurse)])
            .with_max_depth(3),
    );
    agent.acquire().await.unwrap();

    let result = agent.solve("loop forever").await.unwrap();
    // The top level completes; the base case sits at the bottom of the
    // nesting.
    assert_eq!(result["status"], json!("completed"));

    let history = agent.action_history();
    let indicators = history.indicators();
    assert_eq!(indicators.max_depth_reached, 3);

    // The deepest solve call resolved to the canonical base-case message.
    let deepest = history
        .by_depth(3)
        .into_iter()
        .find(|a| a.action_type == action_types::SOLVE)
        .expect("a solve action at the cap");
    assert!(deepest.success);
    assert_eq!(
        deepest.result,
        json!(format!(
            "Base case reached for: {}. Maximum recursion depth (3) exceeded.",
            deepest.problem_statement
        ))
    );
}

#[tokio::test]
async fn observed_depth_never_exceeds_the_cap() {
    init_logging();
    for cap in [1usize, 2, 4] {
        let agent = Arc::new(
            Agent::new("looper")
                .with_llm_client(Arc::new(ScriptedLlmClient::new()))
                .with_strategies(vec![Arc::new(AlwaysRecurse)])
                .with_max_depth(cap),
        );
        agent.acquire().await.unwrap();
        agent.solve("loop forever").await.unwrap();
        assert!(agent.action_history().indicators().max_depth_reached <= cap);
    }
}

#[tokio::test]
async fn action_history_is_monotonic_across_a_solve() {
    init_logging();
    let agent = Arc::new(
        Agent::new("looper")
            .with_llm_client(Arc::new(ScriptedLlmClient::new()))
            .with_strategies(vec![Arc::new(AlwaysRecurse)])
            .with_max_depth(2),
    );
    agent.acquire().await.unwrap();

    let before = agent.action_history().len();
    agent.solve("loop forever").await.unwrap();
    let after = agent.action_history().len();
    assert!(after > before);

    agent.solve("loop forever again").await.unwrap();
    assert!(agent.action_history().len() > after);
}

#[tokio::test]
async fn recursive_decomposition_pattern_is_recognized() {
    init_logging();
    let agent = Arc::new(
        Agent::new("looper")
            .with_llm_client(Arc::new(ScriptedLlmClient::new()))
            .with_strategies(vec![Arc::new(AlwaysRecurse)])
            .with_max_depth(4),
    );
    agent.acquire().await.unwrap();
    agent.solve("loop forever").await.unwrap();

    let patterns = agent.action_history().successful_patterns();
    assert!(patterns.contains(&"recursive_decomposition".to_string()));
}

#[tokio::test]
async fn identity_loop_triggers_base_case_in_recursive_strategy() {
    init_logging();
    let client = Arc::new(ScriptedLlmClient::new());
    let agent = Arc::new(Agent::new("planner").with_llm_client(client.clone()));

    let strategy = RecursiveStrategy::new().with_max_depth(5);
    let root = ProblemContext::root("solve the thing");
    let child = root.sub_context("intermediate", "obj");

    // Planning the parent's own problem from a child frame is an obvious
    // loop: no LLM call is made and the base case comes back.
    let plan = strategy
        .create_plan(&agent, "solve the thing", &child)
        .await
        .unwrap();
    match plan.plan {
        Plan::Direct { content } => {
            assert_eq!(
                content,
                "Base case reached for: solve the thing. Maximum recursion depth (5) exceeded."
            );
        }
        other => panic!("expected a direct base-case plan, got {}", other.kind()),
    }
    assert!(client.recorded_prompts().is_empty());
}
