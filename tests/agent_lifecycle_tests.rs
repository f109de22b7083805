//! Acquire/release semantics, scoped execution, chat memory, and the
//! deferred operation variants.

use serde_json::json;
use solveflow::agent::Agent;
use solveflow::error::AgentError;
use solveflow::resource::ScriptedLlmClient;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scripted_agent() -> (Arc<Agent>, Arc<ScriptedLlmClient>) {
    let client = Arc::new(ScriptedLlmClient::new());
    let agent = Arc::new(Agent::new("assistant").with_llm_client(client.clone()));
    (agent, client)
}

#[tokio::test]
async fn double_release_is_observationally_equivalent_to_one() {
    init_logging();
    let (agent, _client) = scripted_agent();
    agent.acquire().await.unwrap();
    agent.remember("k", json!("v"));

    agent.release().await.unwrap();
    let metrics_after_one = agent.metrics();
    let stats_after_one = agent.conversation_statistics();
    let recall_after_one = agent.recall("k");

    agent.release().await.unwrap();
    assert_eq!(agent.metrics().current_step, metrics_after_one.current_step);
    assert_eq!(agent.metrics().is_running, metrics_after_one.is_running);
    assert_eq!(agent.conversation_statistics(), stats_after_one);
    assert_eq!(agent.recall("k"), recall_after_one);
    assert_eq!(agent.recall("k"), None);
}

#[tokio::test]
async fn scope_releases_on_the_error_path() {
    init_logging();
    let (agent, _client) = scripted_agent();

    let outcome: Result<(), AgentError> = agent
        .scope(|_agent| async move { Err(AgentError::Internal("boom".to_string())) })
        .await;

    assert!(matches!(outcome, Err(AgentError::Internal(_))));
    // Release ran even though the closure failed.
    assert_eq!(agent.metrics().current_step, "cleaned_up");
    assert!(agent.conversation_statistics().is_none());
}

#[tokio::test]
async fn scope_returns_the_closure_value() {
    init_logging();
    let (agent, client) = scripted_agent();
    client.push_response("plan: DIRECT\nsolution: \"7\"");

    let value = agent
        .scope(|agent| async move { agent.solve("seven?").await })
        .await
        .unwrap();
    assert_eq!(value, json!("7"));
}

#[tokio::test]
async fn chat_appends_turns_and_carries_context() {
    init_logging();
    let (agent, client) = scripted_agent();
    agent.acquire().await.unwrap();

    client.push_response("Hi there!");
    client.push_response("As I said: hi!");

    let first = agent.chat("hello").await.unwrap();
    assert_eq!(first, "Hi there!");

    let stats = agent.conversation_statistics().unwrap();
    assert_eq!(stats.total_turns, 1);
    assert_eq!(stats.total_messages, 2);

    // The second call sends the first turn back as context.
    let _ = agent.chat("what did you say?").await.unwrap();
    let prompts = client.recorded_prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(agent.conversation_statistics().unwrap().total_turns, 2);
}

#[tokio::test]
async fn chat_deferred_saves_turn_on_delivery() {
    init_logging();
    let (agent, client) = scripted_agent();
    agent.acquire().await.unwrap();
    client.push_response("deferred reply");

    let promise = agent.chat_deferred("hello");
    let reply = promise.value().await.unwrap();
    assert_eq!(reply, "deferred reply");
    assert_eq!(agent.conversation_statistics().unwrap().total_turns, 1);
}

#[tokio::test]
async fn cancelled_chat_never_touches_memory() {
    init_logging();
    let (agent, client) = scripted_agent();
    agent.acquire().await.unwrap();
    client.push_response("never delivered");

    let promise = agent.chat_deferred("hello");
    promise.cancel();
    assert!(matches!(
        promise.value().await,
        Err(AgentError::CancellationRequested)
    ));
    assert_eq!(agent.conversation_statistics().unwrap().total_turns, 0);
}

#[tokio::test]
async fn solve_deferred_resolves_like_solve() {
    init_logging();
    let (agent, client) = scripted_agent();
    agent.acquire().await.unwrap();
    client.push_response("plan: DIRECT\nsolution: \"42\"");

    let promise = agent.solve_deferred("the ultimate question");
    assert_eq!(promise.value().await.unwrap(), json!("42"));
}

#[tokio::test]
async fn remember_and_recall_deferred_round_trip() {
    init_logging();
    let (agent, _client) = scripted_agent();

    agent
        .remember_deferred("color", json!("blue"))
        .value()
        .await
        .unwrap();
    let recalled = agent.recall_deferred("color").value().await.unwrap();
    assert_eq!(recalled, Some(json!("blue")));

    let missing = agent.recall_deferred("shape").value().await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn reason_records_an_action() {
    init_logging();
    let (agent, client) = scripted_agent();
    agent.acquire().await.unwrap();
    client.push_response("because it is");

    let text = agent.reason("why?", Some("be brief")).await.unwrap();
    assert_eq!(text, "because it is");
    assert_eq!(
        agent
            .action_history()
            .by_type(solveflow::context::action_types::REASON)
            .len(),
        1
    );
}
