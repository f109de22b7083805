//! The agent core.
//!
//! An [`Agent`] owns its key-value memory, conversation memory, event
//! history, action history, resource handles, metrics, and strategy set,
//! and exposes the public problem-solving operations:
//!
//! - [`solve`](Agent::solve) — plan a problem (or take a pre-built
//!   workflow) and execute it; workflow state actions re-enter `solve` at
//!   the next recursion depth
//! - [`plan`](Agent::plan) — planning without execution
//! - [`reason`](Agent::reason) — single-shot LLM call
//! - [`chat`](Agent::chat) — conversational call with rolling context
//! - [`remember`](Agent::remember) / [`recall`](Agent::recall) — key-value
//!   memory
//! - [`input`](Agent::input) — defer to the user-input resource
//! - [`log`](Agent::log) — process logger plus the event bus
//!
//! Each suspending operation also has a `*_deferred` variant returning a
//! [`Promise`] that runs the computation on the worker pool.
//!
//! # Lifecycle
//!
//! [`acquire`](Agent::acquire) initializes conversation memory and the LLM
//! resource; [`release`](Agent::release) stops and cleans up the LLM
//! resource and empties all memory. Both are idempotent, and
//! [`scope`](Agent::scope) brackets a closure between them with release
//! guaranteed on the error path (the error propagates after release).
//!
//! # Example
//!
//! ```rust,no_run
//! use solveflow::agent::Agent;
//! use solveflow::resource::ScriptedLlmClient;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), solveflow::error::AgentError> {
//! let client = Arc::new(ScriptedLlmClient::new());
//! client.push_response("plan: DIRECT\nconfidence: 1.0\nsolution: \"4\"");
//!
//! let agent = Arc::new(Agent::new("analyst").with_llm_client(client));
//! agent.acquire().await?;
//! let answer = agent.solve("What is 2+2?").await?;
//! assert_eq!(answer.as_str(), Some("4"));
//! agent.release().await?;
//! # Ok(())
//! # }
//! ```

use crate::solveflow::context::{
    action_types, Action, ActionHistory, ProblemContext, TurnHistory,
};
use crate::solveflow::error::{AgentError, AgentResult};
use crate::solveflow::event::{EventBus, EventObserver, EventPayload, LogLevel, ObserverId};
use crate::solveflow::executor;
use crate::solveflow::memory::{ConversationMemory, MemoryStatistics};
use crate::solveflow::plan::{Plan, StrategyPlan, WorkflowSource};
use crate::solveflow::promise::{DeliveryCallback, Promise};
use crate::solveflow::resource::{
    ChatMessage, CodeSandbox, CodingResource, InputProvider, InputResource, LlmClient,
    LlmResource, PromptEnricher, Resource, ResourceKind, ResourceRegistry, ResourceRequest,
};
use crate::solveflow::strategy::{Strategy, StrategySelector};
use crate::solveflow::workflow::{ActionExecutor, WorkflowInstance, WorkflowType};
use crate::solveflow::workflow_factory::WorkflowFactory;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

/// Default recursion depth cap enforced by the planning pipeline.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Live metrics for host UIs.
#[derive(Debug, Clone, Serialize)]
pub struct AgentMetrics {
    /// Whether the agent is currently processing.
    pub is_running: bool,
    /// Current processing step (`idle`, `solving`, `initialized`, ...).
    pub current_step: String,
    /// Wall-clock seconds of the most recent operation.
    pub elapsed_time: f64,
    /// Token throughput; stays 0.0 until a transport reports usage.
    pub tokens_per_sec: f64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            is_running: false,
            current_step: "idle".to_string(),
            elapsed_time: 0.0,
            tokens_per_sec: 0.0,
        }
    }
}

/// What [`Agent::solve`] accepts: a problem statement or a pre-built
/// workflow.
pub enum SolveInput {
    Problem(String),
    Workflow(Box<WorkflowInstance>),
}

impl From<&str> for SolveInput {
    fn from(problem: &str) -> Self {
        SolveInput::Problem(problem.to_string())
    }
}

impl From<String> for SolveInput {
    fn from(problem: String) -> Self {
        SolveInput::Problem(problem)
    }
}

impl From<WorkflowInstance> for SolveInput {
    fn from(workflow: WorkflowInstance) -> Self {
        SolveInput::Workflow(Box::new(workflow))
    }
}

/// An LLM-driven problem-solving agent.
pub struct Agent {
    name: String,
    memory: Mutex<HashMap<String, Value>>,
    conversation: Mutex<Option<ConversationMemory>>,
    turns: TurnHistory,
    history: ActionHistory,
    resources: ResourceRegistry,
    bus: EventBus,
    metrics: Mutex<AgentMetrics>,
    selector: StrategySelector,
    max_depth: usize,
    enricher: Option<Arc<dyn PromptEnricher>>,
}

impl Agent {
    /// Create an agent with the default strategy set and an unconfigured
    /// LLM resource (the mock transport installs itself on `acquire` when
    /// the mock environment toggle is set).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let resources = ResourceRegistry::new();
        resources.register(Arc::new(LlmResource::unconfigured()));
        Self {
            bus: EventBus::new(name.clone()),
            name,
            memory: Mutex::new(HashMap::new()),
            conversation: Mutex::new(None),
            turns: TurnHistory::new(),
            history: ActionHistory::new(),
            resources,
            metrics: Mutex::new(AgentMetrics::default()),
            selector: StrategySelector::with_defaults(),
            max_depth: DEFAULT_MAX_DEPTH,
            enricher: None,
        }
    }

    // ---- Builder configuration ----

    /// Back the agent's LLM resource with the given transport.
    pub fn with_llm_client(self, client: Arc<dyn LlmClient>) -> Self {
        self.resources.register(Arc::new(LlmResource::new(client)));
        self
    }

    /// Attach a code-execution sandbox.
    pub fn with_sandbox(self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.resources.register(Arc::new(CodingResource::new(sandbox)));
        self
    }

    /// Attach a user-input provider.
    pub fn with_input_provider(self, provider: Arc<dyn InputProvider>) -> Self {
        self.resources.register(Arc::new(InputResource::new(provider)));
        self
    }

    /// Register (or replace) an arbitrary resource.
    pub fn with_resource(self, resource: Arc<dyn Resource>) -> Self {
        self.resources.register(resource);
        self
    }

    /// Append a strategy to the selector.
    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.selector.register(strategy);
        self
    }

    /// Replace the whole strategy set.
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn Strategy>>) -> Self {
        let mut selector = StrategySelector::new();
        for strategy in strategies {
            selector.register(strategy);
        }
        self.selector = selector;
        self
    }

    /// Override the recursion depth cap.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Attach a prompt enricher. Failures are tolerated at solve time.
    pub fn with_prompt_enricher(mut self, enricher: Arc<dyn PromptEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    // ---- Accessors ----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Register an event observer on this agent's bus.
    pub fn on_log(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
        self.bus.on_log(observer)
    }

    /// Remove a previously registered event observer.
    pub fn unregister_log_callback(&self, id: ObserverId) {
        self.bus.unregister_log_callback(id);
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn action_history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn turn_history(&self) -> &TurnHistory {
        &self.turns
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Snapshot of the live metrics.
    pub fn metrics(&self) -> AgentMetrics {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Statistics of the conversation memory; `None` before `acquire`.
    pub fn conversation_statistics(&self) -> Option<MemoryStatistics> {
        self.conversation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(ConversationMemory::statistics)
    }

    /// Clear the conversation memory. Returns false when it was never
    /// initialized.
    pub fn clear_conversation_memory(&self) -> bool {
        match &mut *self.conversation.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(memory) => {
                memory.clear();
                true
            }
            None => false,
        }
    }

    // ---- Lifecycle ----

    /// Initialize conversation memory and every registered resource
    /// (the LLM resource included). Idempotent.
    pub async fn acquire(&self) -> AgentResult<()> {
        {
            let mut conversation = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
            if conversation.is_none() {
                *conversation = Some(ConversationMemory::new());
            }
        }
        self.resources.initialize_all().await?;
        self.set_step("initialized");
        self.bus.emit(EventPayload::Status {
            step: "initialized".to_string(),
            detail: String::new(),
        });
        self.log("Agent resources initialized", LogLevel::Info);
        Ok(())
    }

    /// Stop and clean up every registered resource, empty conversation and
    /// key-value memory, and mark the agent torn down. Idempotent: a second
    /// release is observationally equivalent to one.
    pub async fn release(&self) -> AgentResult<()> {
        self.resources.shutdown_all().await;

        {
            let mut conversation = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(memory) = conversation.as_mut() {
                memory.clear();
            }
            *conversation = None;
        }
        self.memory.lock().unwrap_or_else(|e| e.into_inner()).clear();

        {
            let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
            metrics.is_running = false;
            metrics.current_step = "cleaned_up".to_string();
            metrics.elapsed_time = 0.0;
            metrics.tokens_per_sec = 0.0;
        }
        self.bus.emit(EventPayload::Status {
            step: "cleaned_up".to_string(),
            detail: String::new(),
        });
        self.log("Agent resources cleaned up", LogLevel::Info);
        Ok(())
    }

    /// Run `f` bracketed by `acquire`/`release`. The release runs on every
    /// exit path; an error from `f` propagates after release completes.
    pub async fn scope<T, Fut>(
        self: &Arc<Self>,
        f: impl FnOnce(Arc<Agent>) -> Fut,
    ) -> AgentResult<T>
    where
        Fut: std::future::Future<Output = AgentResult<T>>,
    {
        self.acquire().await?;
        let result = f(Arc::clone(self)).await;
        let released = self.release().await;
        match (result, released) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    // ---- Core operations ----

    /// Solve a problem (or execute a pre-built workflow) and return the
    /// result payload.
    ///
    /// String input starts a new conversation turn. The result is either a
    /// successful payload or the error-shaped mapping
    /// `{error, status: "failed", workflow_type}` — workflow failures do
    /// not surface as `Err` unless the workflow was built strict.
    pub async fn solve(&self, input: impl Into<SolveInput>) -> AgentResult<Value> {
        let outcome = match input.into() {
            SolveInput::Problem(problem) => {
                self.turns.start_turn(&problem);
                let ctx = self.root_context(&problem);
                self.solve_internal(&problem, &ctx).await
            }
            SolveInput::Workflow(workflow) => {
                let problem = format!("Execute workflow '{}'", workflow.name());
                self.turns.start_turn(&problem);
                let ctx = self.root_context(&problem);
                self.execute_workflow(*workflow, &problem, &ctx).await
            }
        };

        match &outcome {
            Ok(value) => {
                self.bus.emit(EventPayload::FinalResult {
                    value: value.clone(),
                });
                self.bus.emit(EventPayload::Done);
            }
            Err(err) => {
                self.bus.emit(EventPayload::Error {
                    message: err.to_string(),
                });
            }
        }
        outcome
    }

    /// Deferred [`solve`](Agent::solve).
    pub fn solve_deferred(self: &Arc<Self>, input: impl Into<SolveInput>) -> Promise<Value> {
        let agent = Arc::clone(self);
        let input = input.into();
        Promise::spawn(async move { agent.solve(input).await })
    }

    /// Plan without executing: returns the workflow `solve` would run.
    /// A pre-built workflow is returned as-is.
    pub async fn plan(&self, input: impl Into<SolveInput>) -> AgentResult<WorkflowInstance> {
        match input.into() {
            SolveInput::Workflow(workflow) => Ok(*workflow),
            SolveInput::Problem(problem) => {
                let ctx = self.root_context(&problem);
                self.plan_internal(&problem, &ctx).await
            }
        }
    }

    /// Deferred [`plan`](Agent::plan).
    pub fn plan_deferred(
        self: &Arc<Self>,
        input: impl Into<SolveInput>,
    ) -> Promise<WorkflowInstance> {
        let agent = Arc::clone(self);
        let input = input.into();
        Promise::spawn(async move { agent.plan(input).await })
    }

    /// Single-shot LLM call with an optional system message.
    pub async fn reason(&self, premise: &str, system: Option<&str>) -> AgentResult<String> {
        let started = Instant::now();
        self.bus.emit(EventPayload::ToolStart {
            name: "llm".to_string(),
        });

        let outcome = self.reason_inner(premise, system).await;

        let elapsed = started.elapsed().as_secs_f64();
        self.bus.emit(EventPayload::ToolEnd {
            name: "llm".to_string(),
            result: json!({ "success": outcome.is_ok() }),
        });
        self.history.record(Action {
            action_type: action_types::REASON.to_string(),
            description: format!("reason '{}'", preview(premise)),
            depth: 0,
            timestamp: Utc::now(),
            result: outcome
                .as_ref()
                .map(|text| Value::String(preview(text)))
                .unwrap_or(Value::Null),
            workflow_id: String::new(),
            problem_statement: premise.to_string(),
            success: outcome.is_ok(),
            execution_time: elapsed,
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
        });
        outcome
    }

    async fn reason_inner(&self, premise: &str, system: Option<&str>) -> AgentResult<String> {
        let llm = self
            .resources
            .get_by_kind(ResourceKind::Llm)
            .ok_or_else(|| {
                AgentError::ResourceUnavailable("no LLM resource registered".to_string())
            })?;

        let request = match system {
            Some(system) => ResourceRequest::prompt_with_system(premise, system),
            None => ResourceRequest::prompt(premise),
        };
        let response = llm.query(request).await?;
        if response.success {
            Ok(response.content_text())
        } else {
            Err(AgentError::Internal(format!(
                "LLM call failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }

    /// Deferred [`reason`](Agent::reason).
    pub fn reason_deferred(
        self: &Arc<Self>,
        premise: impl Into<String>,
        system: Option<String>,
    ) -> Promise<String> {
        let agent = Arc::clone(self);
        let premise = premise.into();
        Promise::spawn(async move { agent.reason(&premise, system.as_deref()).await })
    }

    /// Conversational call carrying the last five memory turns as context.
    /// The resulting turn is appended to conversation memory. Always
    /// resolves to a string; LLM-side failures come back as an error text.
    pub async fn chat(&self, message: &str) -> AgentResult<String> {
        self.chat_with_context(message, 5).await
    }

    /// [`chat`](Agent::chat) with an explicit context window.
    pub async fn chat_with_context(
        &self,
        message: &str,
        max_context_turns: usize,
    ) -> AgentResult<String> {
        let reply = self.chat_inner(message, max_context_turns).await?;
        self.save_turn(message, &reply);
        Ok(reply)
    }

    async fn chat_inner(&self, message: &str, max_context_turns: usize) -> AgentResult<String> {
        let llm = self
            .resources
            .get_by_kind(ResourceKind::Llm)
            .ok_or_else(|| {
                AgentError::ResourceUnavailable("no LLM resource registered".to_string())
            })?;

        let mut messages = Vec::new();
        {
            let conversation = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(memory) = conversation.as_ref() {
                for turn in memory.recent(max_context_turns) {
                    messages.push(ChatMessage::new("user", &turn.user));
                    messages.push(ChatMessage::new("assistant", &turn.assistant));
                }
            }
        }
        messages.push(ChatMessage::new("user", message));

        let response = llm.query(ResourceRequest::Messages { messages }).await?;
        if response.success {
            Ok(response.content_text())
        } else {
            Ok(format!(
                "Error calling LLM: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    }

    /// Deferred [`chat`](Agent::chat): the turn is appended to conversation
    /// memory on delivery, and not at all when the promise is cancelled.
    pub fn chat_deferred(self: &Arc<Self>, message: impl Into<String>) -> Promise<String> {
        let agent = Arc::clone(self);
        let message = message.into();
        let saver = Arc::clone(self);
        let user_message = message.clone();
        let callback: DeliveryCallback<String> = Box::new(move |reply: &String| {
            saver.save_turn(&user_message, reply);
        });
        Promise::spawn_with_callback(
            async move { agent.chat_inner(&message, 5).await },
            Some(callback),
        )
    }

    fn save_turn(&self, user: &str, assistant: &str) {
        let mut conversation = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(memory) = conversation.as_mut() {
            memory.add_turn(user, assistant);
        }
    }

    /// Store a value under `key`; last write wins.
    pub fn remember(&self, key: impl Into<String>, value: Value) {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    /// Deferred [`remember`](Agent::remember); resolves to the stored
    /// value.
    pub fn remember_deferred(
        self: &Arc<Self>,
        key: impl Into<String>,
        value: Value,
    ) -> Promise<Value> {
        let agent = Arc::clone(self);
        let key = key.into();
        Promise::spawn(async move {
            agent.remember(key, value.clone());
            Ok(value)
        })
    }

    /// Retrieve a value stored with [`remember`](Agent::remember); `None`
    /// when absent.
    pub fn recall(&self, key: &str) -> Option<Value> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Deferred [`recall`](Agent::recall).
    pub fn recall_deferred(self: &Arc<Self>, key: impl Into<String>) -> Promise<Option<Value>> {
        let agent = Arc::clone(self);
        let key = key.into();
        Promise::spawn(async move { Ok(agent.recall(&key)) })
    }

    /// Ask the user for input through the input resource. Blocks the
    /// current frame until a value is produced; a cancelled prompt yields
    /// [`AgentError::CancellationRequested`].
    pub async fn input(&self, prompt: &str) -> AgentResult<String> {
        let started = Instant::now();
        self.bus.emit(EventPayload::ToolStart {
            name: "input".to_string(),
        });

        let outcome = match self.resources.get_by_kind(ResourceKind::Input) {
            None => Err(AgentError::ResourceUnavailable(
                "no input resource registered".to_string(),
            )),
            Some(resource) => {
                let response = resource.query(ResourceRequest::prompt(prompt)).await?;
                if response.success {
                    Ok(response.content_text())
                } else {
                    Err(AgentError::CancellationRequested)
                }
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.bus.emit(EventPayload::ToolEnd {
            name: "input".to_string(),
            result: json!({ "success": outcome.is_ok() }),
        });
        self.history.record(Action {
            action_type: action_types::INPUT.to_string(),
            description: format!("input '{}'", preview(prompt)),
            depth: 0,
            timestamp: Utc::now(),
            result: outcome
                .as_ref()
                .map(|text| Value::String(text.clone()))
                .unwrap_or(Value::Null),
            workflow_id: String::new(),
            problem_statement: prompt.to_string(),
            success: outcome.is_ok(),
            execution_time: elapsed,
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
        });
        outcome
    }

    /// Route a message through the process logger and the event bus.
    pub fn log(&self, message: &str, level: LogLevel) {
        let line = format!("[{}] {}", self.name, message);
        match level {
            LogLevel::Debug => log::debug!("{}", line),
            LogLevel::Info => log::info!("{}", line),
            LogLevel::Warning => log::warn!("{}", line),
            LogLevel::Error => log::error!("{}", line),
        }
        self.bus.emit(EventPayload::Log {
            level,
            message: message.to_string(),
        });
    }

    pub fn debug(&self, message: &str) {
        self.log(message, LogLevel::Debug);
    }

    pub fn info(&self, message: &str) {
        self.log(message, LogLevel::Info);
    }

    pub fn warning(&self, message: &str) {
        self.log(message, LogLevel::Warning);
    }

    pub fn error(&self, message: &str) {
        self.log(message, LogLevel::Error);
    }

    // ---- Internals ----

    fn root_context(&self, problem: &str) -> ProblemContext {
        let mut ctx = ProblemContext::root(problem);
        if let Some(summary) = self.turns.conversation_context() {
            ctx.constraints
                .insert("conversation_history".to_string(), json!(summary));
        }
        ctx
    }

    async fn enrich(&self, problem: &str) -> String {
        match &self.enricher {
            None => problem.to_string(),
            Some(enricher) => match enricher.assemble(problem, "problem_solving").await {
                Ok(rich) => rich,
                Err(err) => {
                    self.log(
                        &format!("prompt enrichment failed, using the raw problem: {}", err),
                        LogLevel::Warning,
                    );
                    problem.to_string()
                }
            },
        }
    }

    /// One solve frame: enrich, plan, execute, record.
    async fn solve_internal(&self, problem: &str, ctx: &ProblemContext) -> AgentResult<Value> {
        let started = Instant::now();
        self.set_running(true);
        self.set_step("solving");
        self.bus.emit(EventPayload::Status {
            step: "solving".to_string(),
            detail: preview(problem),
        });
        self.turns.record("solve", preview(problem));

        let enriched = self.enrich(problem).await;

        let (workflow_id, outcome) = match self.plan_internal(&enriched, ctx).await {
            Ok(workflow) => {
                let id = workflow.id().to_string();
                (id, self.execute_workflow(workflow, &enriched, ctx).await)
            }
            Err(err) => (String::new(), Err(err)),
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.set_running(false);
        self.set_step("idle");
        self.set_elapsed(elapsed);

        self.history.record(Action {
            action_type: action_types::SOLVE.to_string(),
            description: format!("solve '{}'", preview(problem)),
            depth: ctx.depth,
            timestamp: Utc::now(),
            result: outcome.as_ref().cloned().unwrap_or(Value::Null),
            workflow_id,
            problem_statement: problem.to_string(),
            success: outcome.is_ok(),
            execution_time: elapsed,
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
        });

        outcome
    }

    async fn execute_workflow(
        &self,
        mut workflow: WorkflowInstance,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<Value> {
        let mut data = Map::new();
        data.insert("problem".to_string(), json!(problem));
        workflow.execute(self, data, ctx).await
    }

    /// Planning pipeline: depth cap, strategy selection, plan wrapping.
    async fn plan_internal(
        &self,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<WorkflowInstance> {
        if ctx.depth >= self.max_depth {
            self.log(
                &format!(
                    "recursion depth {} reached the cap of {}, substituting base case",
                    ctx.depth, self.max_depth
                ),
                LogLevel::Info,
            );
            return Ok(self.base_case_workflow(problem));
        }

        let strategy = self.selector.select(problem, ctx);
        self.bus.emit(EventPayload::Status {
            step: "planning".to_string(),
            detail: strategy.name().to_string(),
        });

        let strategy_plan = strategy.create_plan(self, problem, ctx).await?;
        self.wrap_plan(strategy_plan, problem)
    }

    /// Turn a strategy's plan into the workflow instance `solve` executes.
    fn wrap_plan(
        &self,
        strategy_plan: StrategyPlan,
        problem: &str,
    ) -> AgentResult<WorkflowInstance> {
        let StrategyPlan { plan, metadata } = strategy_plan;
        match plan {
            Plan::Workflow(WorkflowSource::Instance(instance)) => Ok(*instance),
            Plan::Workflow(WorkflowSource::Yaml(yaml)) => {
                match WorkflowFactory::new().from_yaml(&yaml) {
                    Ok(instance) => Ok(instance),
                    Err(err) => {
                        // Leave materialization to the executor, which will
                        // fold the failure into an error payload.
                        self.log(
                            &format!("raw workflow YAML did not materialize: {}", err),
                            LogLevel::Warning,
                        );
                        Ok(self.plan_workflow(
                            StrategyPlan {
                                plan: Plan::Workflow(WorkflowSource::Yaml(yaml)),
                                metadata,
                            },
                            problem,
                        ))
                    }
                }
            }
            other => Ok(self.plan_workflow(
                StrategyPlan {
                    plan: other,
                    metadata,
                },
                problem,
            )),
        }
    }

    fn plan_workflow(&self, strategy_plan: StrategyPlan, problem: &str) -> WorkflowInstance {
        let short_id = Uuid::new_v4().simple().to_string();
        let workflow_type =
            WorkflowType::new(format!("AgentWorkflow_{}", &short_id[..8])).with_docstring(
                format!("Agent workflow for solving: {}", preview(problem)),
            );
        WorkflowInstance::new(workflow_type).with_plan(strategy_plan)
    }

    fn base_case_workflow(&self, problem: &str) -> WorkflowInstance {
        let content = format!(
            "Base case reached for: {}. Maximum recursion depth ({}) exceeded.",
            problem, self.max_depth
        );
        let workflow_type = WorkflowType::new("BaseCaseWorkflow")
            .with_docstring("Terminates recursion at the configured depth cap");
        WorkflowInstance::new(workflow_type)
            .with_plan(StrategyPlan::new(Plan::Direct { content }))
    }

    fn set_running(&self, running: bool) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_running = running;
    }

    fn set_step(&self, step: &str) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_step = step.to_string();
    }

    fn set_elapsed(&self, elapsed: f64) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed_time = elapsed;
    }
}

#[async_trait]
impl ActionExecutor for Agent {
    async fn run_action(
        &self,
        action: &str,
        objective: &str,
        _parameters: &Map<String, Value>,
        data: &Map<String, Value>,
        ctx: &ProblemContext,
    ) -> AgentResult<Value> {
        let sub_problem = format!("Execute action: {} with objective: {}", action, objective);
        let mut sub_ctx = ctx.sub_context(sub_problem.clone(), objective);
        sub_ctx
            .constraints
            .insert("workflow_data".to_string(), Value::Object(data.clone()));
        self.solve_internal(&sub_problem, &sub_ctx).await
    }

    async fn run_plan(
        &self,
        plan: &StrategyPlan,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<Value> {
        executor::dispatch(self, &plan.plan, problem, ctx).await
    }
}

/// First ~120 characters of a string, on a char boundary.
fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 120;
    match text.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
