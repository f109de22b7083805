//! Resource registry and the collaborator boundaries.
//!
//! A *resource* is a named, initializable handle to an external capability.
//! The runtime recognizes three kinds out of the box — an LLM transport, a
//! code-execution sandbox, and a user-input provider — plus a `Custom`
//! escape hatch. Resources share one uniform surface ([`Resource`]):
//! `initialize`, `query`, `list_tools`, `stop`, `cleanup`.
//!
//! The external systems themselves stay behind narrow collaborator traits
//! ([`LlmClient`], [`CodeSandbox`], [`InputProvider`], [`PromptEnricher`]):
//! this crate specifies their contracts and adapts them into resources, but
//! deliberately ships no vendor SDK, no sandbox implementation, and no
//! terminal I/O. [`ScriptedLlmClient`] is the one concrete transport
//! included, used for deterministic tests and for the mock mode enabled by
//! the `DANA_MOCK_LLM` environment variable.
//!
//! # Query contract
//!
//! `query` takes one of three request shapes and always answers with
//! `{success, content, error?}`:
//!
//! ```text
//! {prompt, system?}       → LLM one-shot / input prompt / code source
//! {messages: [...]}       → LLM chat completion
//! {tool, arguments}       → capability-specific call (e.g. coding "execute")
//! ```
//!
//! Querying a resource that was never initialized fails with
//! `ResourceUnavailable`.

use crate::solveflow::error::{AgentError, AgentResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Environment variable that switches LLM resources into deterministic mock
/// mode (`true`/`false`, default false).
pub const MOCK_LLM_ENV: &str = "DANA_MOCK_LLM";

/// Default deadline for sandboxed code execution.
pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(30);

/// True when the mock-LLM environment toggle is set.
pub fn mock_llm_enabled() -> bool {
    std::env::var(MOCK_LLM_ENV)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Capability tag attached to every resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Llm,
    Coding,
    Input,
    Custom,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Llm => "llm",
            ResourceKind::Coding => "coding",
            ResourceKind::Input => "input",
            ResourceKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a chat-shaped LLM request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// The uniform request accepted by [`Resource::query`].
#[derive(Debug, Clone, Serialize)]
pub enum ResourceRequest {
    /// A single prompt with an optional system message.
    Prompt {
        prompt: String,
        system: Option<String>,
    },
    /// A full chat transcript.
    Messages { messages: Vec<ChatMessage> },
    /// A capability-specific call, e.g. `execute` on a coding resource.
    ToolCall { tool: String, arguments: Value },
}

impl ResourceRequest {
    /// Shorthand for a plain prompt without a system message.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        ResourceRequest::Prompt {
            prompt: prompt.into(),
            system: None,
        }
    }

    /// Shorthand for a prompt with a system message.
    pub fn prompt_with_system(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        ResourceRequest::Prompt {
            prompt: prompt.into(),
            system: Some(system.into()),
        }
    }
}

/// The uniform answer shape produced by [`Resource::query`].
#[derive(Debug, Clone, Serialize)]
pub struct ResourceResponse {
    pub success: bool,
    pub content: Value,
    pub error: Option<String>,
}

impl ResourceResponse {
    pub fn success(content: Value) -> Self {
        Self {
            success: true,
            content,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: Value::Null,
            error: Some(error.into()),
        }
    }

    /// The content rendered as text: strings verbatim, everything else via
    /// its JSON representation.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Descriptor of a tool exposed by a resource (for LLMs that do tool
/// calling).
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the accepted arguments.
    pub parameters_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema: json!({"type": "object", "properties": {}}),
        }
    }
}

/// A named handle to an external capability.
///
/// `initialize` is idempotent; `stop` then `cleanup` are always called on
/// agent teardown and must tolerate being called twice or without a prior
/// `initialize`.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Stable name the resource is registered under.
    fn name(&self) -> &str;

    /// Capability tag.
    fn kind(&self) -> ResourceKind;

    /// True once `initialize` has succeeded (and until `stop`).
    fn is_initialized(&self) -> bool;

    /// Acquire external dependencies. Calling this twice is a no-op.
    async fn initialize(&self) -> AgentResult<()>;

    /// The only uniform call into the resource.
    async fn query(&self, request: ResourceRequest) -> AgentResult<ResourceResponse>;

    /// Tools this resource exposes. Empty by default.
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        Vec::new()
    }

    /// Stop serving queries. Idempotent.
    async fn stop(&self) -> AgentResult<()> {
        Ok(())
    }

    /// Release remaining external state. Idempotent.
    async fn cleanup(&self) -> AgentResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// LLM transport boundary.
///
/// Implementations translate a [`ResourceRequest`] into a provider call and
/// return the raw reply as a JSON value. The adapting [`LlmResource`]
/// normalizes that value to assistant text and rejects shapes that carry no
/// `content` string.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Perform one completion round-trip.
    async fn complete(
        &self,
        request: &ResourceRequest,
    ) -> Result<Value, Box<dyn Error + Send + Sync>>;

    /// Identifier of the upstream model, for logging.
    fn model_name(&self) -> &str {
        "unspecified"
    }

    /// Tool descriptors the transport advertises to the model.
    async fn available_tools(&self) -> Vec<ToolDescriptor> {
        Vec::new()
    }
}

/// Code-execution sandbox boundary.
///
/// `execute` must terminate by the given deadline and must not share state
/// between calls. The adapting [`CodingResource`] enforces the deadline a
/// second time from the outside, so a misbehaving sandbox still cannot hold
/// the runtime hostage.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn execute(
        &self,
        source: &str,
        timeout: Duration,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// User-input boundary. An `Err` from `prompt` is treated as cancellation.
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn prompt(&self, text: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Optional prompt-optimization collaborator.
///
/// When attached to an agent, `assemble` enriches the raw problem before
/// planning. Absence or failure of the enricher never fails the pipeline;
/// the agent falls back to the raw problem.
#[async_trait]
pub trait PromptEnricher: Send + Sync {
    async fn assemble(
        &self,
        problem: &str,
        template: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// Deterministic in-memory LLM transport.
///
/// Replies are popped from a scripted queue; once the queue is empty the
/// fallback reply is returned forever. Every prompt received is recorded so
/// tests can assert on what the runtime actually sent.
///
/// # Example
///
/// ```rust
/// use solveflow::resource::ScriptedLlmClient;
///
/// let client = ScriptedLlmClient::new();
/// client.push_response("plan: DIRECT\nsolution: \"4\"");
/// ```
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    /// Create a client whose fallback reply is a direct plan answering
    /// `"OK"`.
    pub fn new() -> Self {
        Self::with_fallback(
            "plan: DIRECT\nconfidence: 1.0\nreasoning: deterministic mock reply\nsolution: \"OK\"",
        )
    }

    /// Create a client with a custom fallback reply.
    pub fn with_fallback(fallback: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next scripted reply.
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response.into());
    }

    /// Every prompt text received so far, in order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, request: &ResourceRequest) {
        let text = match request {
            ResourceRequest::Prompt { prompt, .. } => prompt.clone(),
            ResourceRequest::Messages { messages } => messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            ResourceRequest::ToolCall { tool, .. } => format!("tool:{}", tool),
        };
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text);
    }
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        request: &ResourceRequest,
    ) -> Result<Value, Box<dyn Error + Send + Sync>> {
        self.record(request);
        let reply = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(json!({ "content": reply }))
    }

    fn model_name(&self) -> &str {
        "scripted-mock"
    }
}

// ---------------------------------------------------------------------------
// LLM resource
// ---------------------------------------------------------------------------

/// Adapter exposing an [`LlmClient`] through the [`Resource`] surface.
///
/// Construct it with a transport, or leave it unconfigured: on
/// `initialize`, an unconfigured resource installs a [`ScriptedLlmClient`]
/// when [`mock_llm_enabled`] is set and otherwise stays unavailable (all
/// queries fail with `ResourceUnavailable`).
pub struct LlmResource {
    name: String,
    client: RwLock<Option<Arc<dyn LlmClient>>>,
    initialized: AtomicBool,
}

impl LlmResource {
    /// Create a resource backed by the given transport.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            name: "llm".to_string(),
            client: RwLock::new(Some(client)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Create a resource with no transport configured yet.
    pub fn unconfigured() -> Self {
        Self {
            name: "llm".to_string(),
            client: RwLock::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Replace the transport at runtime (only meaningful before queries).
    pub fn set_client(&self, client: Arc<dyn LlmClient>) {
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = Some(client);
    }

    fn current_client(&self) -> Option<Arc<dyn LlmClient>> {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Normalize a transport reply to assistant text.
    ///
    /// Accepts a bare string or a mapping with a string `content` field;
    /// every other shape is rejected with `InvalidFormat` instead of being
    /// silently stringified.
    fn normalize_reply(value: Value) -> AgentResult<String> {
        match value {
            Value::String(text) => Ok(text),
            Value::Object(map) => match map.get("content") {
                Some(Value::String(text)) => Ok(text.clone()),
                _ => Err(AgentError::InvalidFormat(
                    "LLM reply object carries no string 'content' field".to_string(),
                )),
            },
            other => Err(AgentError::InvalidFormat(format!(
                "unexpected LLM reply shape: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl Resource for LlmResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Llm
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AgentResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.current_client().is_none() && mock_llm_enabled() {
            self.set_client(Arc::new(ScriptedLlmClient::new()));
            log::debug!("[{}] installed mock LLM transport", self.name);
        }
        if self.current_client().is_some() {
            self.initialized.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn query(&self, request: ResourceRequest) -> AgentResult<ResourceResponse> {
        if !self.is_initialized() {
            return Err(AgentError::ResourceUnavailable(
                "LLM resource is not initialized".to_string(),
            ));
        }
        let client = self.current_client().ok_or_else(|| {
            AgentError::ResourceUnavailable("no LLM transport configured".to_string())
        })?;

        match client.complete(&request).await {
            Ok(raw) => {
                let content = Self::normalize_reply(raw)?;
                Ok(ResourceResponse::success(Value::String(content)))
            }
            Err(err) => Ok(ResourceResponse::failure(err.to_string())),
        }
    }

    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        match self.current_client() {
            Some(client) => client.available_tools().await,
            None => Vec::new(),
        }
    }

    async fn stop(&self) -> AgentResult<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) -> AgentResult<()> {
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Coding resource
// ---------------------------------------------------------------------------

/// Adapter exposing a [`CodeSandbox`] through the [`Resource`] surface.
///
/// Accepts either `{prompt: source}` or
/// `{tool: "execute", arguments: {source, timeout_seconds?}}`. Sandbox
/// failures and deadline overruns come back as failure responses (not
/// errors) so the executor can fold them into a plan-execution failure
/// string.
pub struct CodingResource {
    name: String,
    sandbox: Option<Arc<dyn CodeSandbox>>,
    default_timeout: Duration,
    initialized: AtomicBool,
}

impl CodingResource {
    pub fn new(sandbox: Arc<dyn CodeSandbox>) -> Self {
        Self {
            name: "coding".to_string(),
            sandbox: Some(sandbox),
            default_timeout: DEFAULT_CODE_TIMEOUT,
            initialized: AtomicBool::new(false),
        }
    }

    /// Override the default execution deadline (builder pattern).
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run `source` in the sandbox with the given (or default) deadline.
    pub async fn execute(
        &self,
        source: &str,
        timeout: Option<Duration>,
    ) -> AgentResult<ResourceResponse> {
        if !self.is_initialized() {
            return Err(AgentError::ResourceUnavailable(
                "coding resource is not initialized".to_string(),
            ));
        }
        let sandbox = match &self.sandbox {
            Some(sandbox) => Arc::clone(sandbox),
            None => {
                return Err(AgentError::ResourceUnavailable(
                    "no code sandbox configured".to_string(),
                ))
            }
        };

        let deadline = timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(deadline, sandbox.execute(source, deadline)).await {
            Ok(Ok(output)) => Ok(ResourceResponse::success(Value::String(output))),
            Ok(Err(err)) => Ok(ResourceResponse::failure(err.to_string())),
            Err(_) => Ok(ResourceResponse::failure(format!(
                "execution timed out after {:.1}s",
                deadline.as_secs_f64()
            ))),
        }
    }
}

#[async_trait]
impl Resource for CodingResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Coding
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AgentResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, request: ResourceRequest) -> AgentResult<ResourceResponse> {
        match request {
            ResourceRequest::Prompt { prompt, .. } => self.execute(&prompt, None).await,
            ResourceRequest::ToolCall { tool, arguments } if tool == "execute" => {
                let source = arguments
                    .get("source")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AgentError::InvalidArgument(
                            "execute call requires a string 'source' argument".to_string(),
                        )
                    })?
                    .to_string();
                let timeout = arguments
                    .get("timeout_seconds")
                    .and_then(Value::as_f64)
                    .map(Duration::from_secs_f64);
                self.execute(&source, timeout).await
            }
            ResourceRequest::ToolCall { tool, .. } => Err(AgentError::InvalidArgument(format!(
                "coding resource has no tool '{}'",
                tool
            ))),
            ResourceRequest::Messages { .. } => Err(AgentError::InvalidArgument(
                "coding resource does not accept chat requests".to_string(),
            )),
        }
    }

    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "execute",
            "Run source code in the sandbox and return its output",
        )]
    }

    async fn stop(&self) -> AgentResult<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Input resource
// ---------------------------------------------------------------------------

/// Adapter exposing an [`InputProvider`] through the [`Resource`] surface.
pub struct InputResource {
    name: String,
    provider: Arc<dyn InputProvider>,
    initialized: AtomicBool,
}

impl InputResource {
    pub fn new(provider: Arc<dyn InputProvider>) -> Self {
        Self {
            name: "input".to_string(),
            provider,
            initialized: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Resource for InputResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Input
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AgentResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, request: ResourceRequest) -> AgentResult<ResourceResponse> {
        if !self.is_initialized() {
            return Err(AgentError::ResourceUnavailable(
                "input resource is not initialized".to_string(),
            ));
        }
        let text = match request {
            ResourceRequest::Prompt { prompt, .. } => prompt,
            _ => {
                return Err(AgentError::InvalidArgument(
                    "input resource only accepts prompt requests".to_string(),
                ))
            }
        };
        match self.provider.prompt(&text).await {
            Ok(answer) => Ok(ResourceResponse::success(Value::String(answer))),
            Err(err) => Ok(ResourceResponse::failure(format!("cancelled: {}", err))),
        }
    }

    async fn stop(&self) -> AgentResult<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Named handles to the agent's resources.
///
/// Registration replaces any existing resource with the same name. Handles
/// are mutable only through their own `initialize`/`stop`; the registry map
/// itself is read-mostly.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<HashMap<String, Arc<dyn Resource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a resource under its own name.
    pub fn register(&self, resource: Arc<dyn Resource>) {
        let name = resource.name().to_string();
        self.resources
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, resource);
    }

    /// Look a resource up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Resource>> {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// First resource with the given capability tag, if any.
    pub fn get_by_kind(&self, kind: ResourceKind) -> Option<Arc<dyn Resource>> {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|r| r.kind() == kind)
            .cloned()
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Initialize every registered resource, stopping at the first failure.
    pub async fn initialize_all(&self) -> AgentResult<()> {
        for resource in self.snapshot() {
            resource.initialize().await?;
        }
        Ok(())
    }

    /// Stop and clean up every registered resource. Failures are logged at
    /// WARN and do not prevent teardown of the remaining resources.
    pub async fn shutdown_all(&self) {
        for resource in self.snapshot() {
            if let Err(err) = resource.stop().await {
                log::warn!("failed to stop resource '{}': {}", resource.name(), err);
            }
            if let Err(err) = resource.cleanup().await {
                log::warn!("failed to clean up resource '{}': {}", resource.name(), err);
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Resource>> {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uninitialized_llm_is_unavailable() {
        let resource = LlmResource::new(Arc::new(ScriptedLlmClient::new()));
        let result = resource.query(ResourceRequest::prompt("hello")).await;
        assert!(matches!(result, Err(AgentError::ResourceUnavailable(_))));
    }

    #[tokio::test]
    async fn scripted_replies_drain_then_fall_back() {
        let client = Arc::new(ScriptedLlmClient::with_fallback("fallback"));
        client.push_response("first");

        let resource = LlmResource::new(client.clone());
        resource.initialize().await.unwrap();

        let first = resource
            .query(ResourceRequest::prompt("a"))
            .await
            .unwrap();
        assert_eq!(first.content_text(), "first");

        let second = resource
            .query(ResourceRequest::prompt("b"))
            .await
            .unwrap();
        assert_eq!(second.content_text(), "fallback");

        assert_eq!(client.recorded_prompts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let resource = LlmResource::new(Arc::new(ScriptedLlmClient::new()));
        resource.initialize().await.unwrap();
        resource.initialize().await.unwrap();
        assert!(resource.is_initialized());
    }

    #[test]
    fn reply_normalization_rejects_odd_shapes() {
        assert!(LlmResource::normalize_reply(json!("plain")).is_ok());
        assert!(LlmResource::normalize_reply(json!({"content": "x"})).is_ok());
        assert!(matches!(
            LlmResource::normalize_reply(json!(42)),
            Err(AgentError::InvalidFormat(_))
        ));
        assert!(matches!(
            LlmResource::normalize_reply(json!({"content": 42})),
            Err(AgentError::InvalidFormat(_))
        ));
    }

    struct SlowSandbox;

    #[async_trait]
    impl CodeSandbox for SlowSandbox {
        async fn execute(
            &self,
            _source: &str,
            _timeout: Duration,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        }
    }

    #[tokio::test]
    async fn coding_timeout_is_enforced() {
        let resource = CodingResource::new(Arc::new(SlowSandbox))
            .with_default_timeout(Duration::from_millis(50));
        resource.initialize().await.unwrap();

        let started = std::time::Instant::now();
        let response = resource.execute("loop forever", None).await.unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn registry_finds_by_kind() {
        let registry = ResourceRegistry::new();
        registry.register(Arc::new(LlmResource::new(Arc::new(
            ScriptedLlmClient::new(),
        ))));

        assert!(registry.get_by_kind(ResourceKind::Llm).is_some());
        assert!(registry.get_by_kind(ResourceKind::Coding).is_none());
        assert!(registry.get("llm").is_some());
    }
}
