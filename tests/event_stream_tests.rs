//! Event-bus behavior observed through a full solve: ordering, isolation,
//! and lifecycle markers.

use serde_json::json;
use solveflow::agent::Agent;
use solveflow::event::{AgentEvent, EventObserver, EventPayload, LogLevel, ObserverResult};
use solveflow::resource::ScriptedLlmClient;
use std::sync::{Arc, Mutex};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Collector {
    seen: Arc<Mutex<Vec<AgentEvent>>>,
}

impl EventObserver for Collector {
    fn on_event(&self, event: &AgentEvent) -> ObserverResult {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct Exploding;

impl EventObserver for Exploding {
    fn on_event(&self, _event: &AgentEvent) -> ObserverResult {
        Err("observer exploded".into())
    }
}

fn collector() -> (Arc<Mutex<Vec<AgentEvent>>>, Arc<dyn EventObserver>) {
    let seen: Arc<Mutex<Vec<AgentEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let observer: Arc<dyn EventObserver> = Arc::new(Collector {
        seen: Arc::clone(&seen),
    });
    (seen, observer)
}

#[tokio::test]
async fn solve_emits_events_in_program_order() {
    init_logging();
    let client = Arc::new(ScriptedLlmClient::new());
    client.push_response("plan: DIRECT\nsolution: \"4\"");

    let agent = Arc::new(Agent::new("observed").with_llm_client(client));
    let (seen, observer) = collector();
    agent.on_log(observer);

    agent.acquire().await.unwrap();
    agent.solve("What is 2+2?").await.unwrap();

    let events = seen.lock().unwrap();
    assert!(!events.is_empty());

    // Strictly increasing sequence numbers: a prefix with no reordering.
    for pair in events.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
    }

    // The lifecycle markers appear where expected.
    assert!(events.iter().any(
        |e| matches!(&e.payload, EventPayload::Status { step, .. } if step == "initialized")
    ));
    assert!(events
        .iter()
        .any(|e| matches!(&e.payload, EventPayload::Status { step, .. } if step == "solving")));
    assert!(events
        .iter()
        .any(|e| matches!(&e.payload, EventPayload::FinalResult { value } if value == &json!("4"))));
    assert!(matches!(
        events.last().map(|e| &e.payload),
        Some(EventPayload::Done)
    ));

    // Every event names the emitting agent.
    assert!(events.iter().all(|e| e.agent_name == "observed"));
}

#[tokio::test]
async fn release_emits_cleanup_status() {
    init_logging();
    let agent =
        Arc::new(Agent::new("observed").with_llm_client(Arc::new(ScriptedLlmClient::new())));
    let (seen, observer) = collector();
    agent.on_log(observer);

    agent.acquire().await.unwrap();
    agent.release().await.unwrap();

    let events = seen.lock().unwrap();
    assert!(events.iter().any(
        |e| matches!(&e.payload, EventPayload::Status { step, .. } if step == "cleaned_up")
    ));
}

#[tokio::test]
async fn throwing_observer_does_not_starve_the_next_one() {
    init_logging();
    let client = Arc::new(ScriptedLlmClient::new());
    client.push_response("plan: DIRECT\nsolution: \"ok\"");
    let agent = Arc::new(Agent::new("observed").with_llm_client(client));

    agent.on_log(Arc::new(Exploding));
    let (seen, observer) = collector();
    agent.on_log(observer);

    agent.acquire().await.unwrap();
    agent.solve("anything").await.unwrap();

    assert!(!seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unregistered_observer_stops_receiving() {
    init_logging();
    let agent =
        Arc::new(Agent::new("observed").with_llm_client(Arc::new(ScriptedLlmClient::new())));
    let (seen, observer) = collector();
    let id = agent.on_log(observer);

    agent.log("before", LogLevel::Info);
    let count_before = seen.lock().unwrap().len();
    assert_eq!(count_before, 1);

    agent.unregister_log_callback(id);
    agent.log("after", LogLevel::Info);
    assert_eq!(seen.lock().unwrap().len(), count_before);
}
