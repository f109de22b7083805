//! The optional prompt-enrichment collaborator: used when it works,
//! harmless when it fails.

use async_trait::async_trait;
use serde_json::json;
use solveflow::agent::Agent;
use solveflow::resource::{PromptEnricher, ScriptedLlmClient};
use std::error::Error;
use std::sync::Arc;

struct PrefixEnricher;

#[async_trait]
impl PromptEnricher for PrefixEnricher {
    async fn assemble(
        &self,
        problem: &str,
        _template: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(format!("[context] {}", problem))
    }
}

struct BrokenEnricher;

#[async_trait]
impl PromptEnricher for BrokenEnricher {
    async fn assemble(
        &self,
        _problem: &str,
        _template: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        Err("enrichment backend offline".into())
    }
}

#[tokio::test]
async fn enriched_problem_reaches_the_planner() {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = Arc::new(ScriptedLlmClient::new());
    client.push_response("plan: DIRECT\nsolution: \"done\"");

    let agent = Arc::new(
        Agent::new("enriched")
            .with_llm_client(client.clone())
            .with_prompt_enricher(Arc::new(PrefixEnricher)),
    );
    agent.acquire().await.unwrap();
    agent.solve("original problem").await.unwrap();

    let prompts = client.recorded_prompts();
    assert!(prompts[0].contains("[context] original problem"));
}

#[tokio::test]
async fn failing_enricher_falls_back_to_the_raw_problem() {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = Arc::new(ScriptedLlmClient::new());
    client.push_response("plan: DIRECT\nsolution: \"done\"");

    let agent = Arc::new(
        Agent::new("enriched")
            .with_llm_client(client.clone())
            .with_prompt_enricher(Arc::new(BrokenEnricher)),
    );
    agent.acquire().await.unwrap();

    let result = agent.solve("original problem").await.unwrap();
    assert_eq!(result, json!("done"));
    assert!(client.recorded_prompts()[0].contains("original problem"));
}
