//! Workflow instances and the FSM execution engine.
//!
//! A [`WorkflowInstance`] owns exactly one optional [`Fsm`] plus an optional
//! wrapped plan, and records everything that happens to it in an execution
//! history. Execution is driven through the [`ActionExecutor`] seam: the
//! engine never calls back into a concrete agent type, it only knows that
//! *something* can run a state action or dispatch a plan. The agent
//! implements the trait, which is what lets a workflow step re-enter
//! `solve` recursively without an import cycle — the recursion depth rides
//! along in the [`ProblemContext`] the caller passes down.
//!
//! # Execution shapes
//!
//! 1. **FSM present** — the engine walks states from the current state
//!    until `COMPLETE`/`ERROR`: metadata-less states (like `START`) are
//!    skipped over via `"next"`, every other state is marked `executing`,
//!    its action runs through the executor, the result is recorded *before*
//!    the transition fires, and the state is marked `completed`. A failing
//!    action marks the state `failed` and takes the `"error"` route when
//!    one exists.
//! 2. **Wrapped plan** — the instance was built around a [`StrategyPlan`];
//!    executing it dispatches the plan.
//! 3. **Neither** — a keyword-matched simple flow runs based on the
//!    [`WorkflowType`] name, with a generic fallback.
//!
//! Failures never panic and, unless `strict` is set, never surface as
//! `Err`: the instance returns the error-shaped mapping
//! `{error, status: "failed", workflow_type}`.

use crate::solveflow::context::ProblemContext;
use crate::solveflow::error::{AgentError, AgentResult};
use crate::solveflow::fsm::{
    Fsm, StateStatus, COMPLETE_STATE, ERROR_EVENT, ERROR_STATE, NEXT_EVENT,
};
use crate::solveflow::plan::StrategyPlan;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Executes the work a workflow delegates outward.
///
/// The agent implements this; workflows and the executor module only ever
/// see the trait.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run one FSM state action. Implementations re-enter `solve` with a
    /// sub-context at `ctx.depth + 1`.
    async fn run_action(
        &self,
        action: &str,
        objective: &str,
        parameters: &Map<String, Value>,
        data: &Map<String, Value>,
        ctx: &ProblemContext,
    ) -> AgentResult<Value>;

    /// Dispatch a plan produced by a strategy.
    async fn run_plan(
        &self,
        plan: &StrategyPlan,
        problem: &str,
        ctx: &ProblemContext,
    ) -> AgentResult<Value>;
}

/// Schema metadata describing a workflow shape: named fields with declared
/// types, defaults, ordering, and a docstring.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowType {
    pub name: String,
    pub fields: HashMap<String, String>,
    pub field_order: Vec<String>,
    pub field_defaults: Map<String, Value>,
    pub field_comments: HashMap<String, String>,
    pub docstring: String,
}

impl WorkflowType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
            field_order: Vec::new(),
            field_defaults: Map::new(),
            field_comments: HashMap::new(),
            docstring: String::new(),
        }
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = docstring.into();
        self
    }

    /// Declare a field; ordering follows declaration order.
    pub fn with_field(mut self, name: impl Into<String>, field_type: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.insert(name.clone(), field_type.into());
        self.field_order.push(name);
        self
    }

    pub fn with_field_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.field_defaults.insert(name.into(), default);
        self
    }

    pub fn with_field_comment(
        mut self,
        name: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        self.field_comments.insert(name.into(), comment.into());
        self
    }
}

/// Lifecycle of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Created,
    Executing,
    Completed,
    Error,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Created => "created",
            ExecutionState::Executing => "executing",
            ExecutionState::Completed => "completed",
            ExecutionState::Error => "error",
        }
    }
}

/// One entry in a workflow's execution history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// `start`, `complete`, or `error`.
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

/// A runnable workflow: one optional FSM, one optional wrapped plan, and
/// the record of what happened.
#[derive(Debug, Clone)]
pub struct WorkflowInstance {
    id: Uuid,
    workflow_type: WorkflowType,
    fsm: Option<Fsm>,
    plan: Option<StrategyPlan>,
    execution_state: ExecutionState,
    execution_history: Vec<HistoryEntry>,
    original_yaml: Option<String>,
    parent_id: Option<Uuid>,
    strict: bool,
}

impl WorkflowInstance {
    pub fn new(workflow_type: WorkflowType) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_type,
            fsm: None,
            plan: None,
            execution_state: ExecutionState::Created,
            execution_history: Vec::new(),
            original_yaml: None,
            parent_id: None,
            strict: false,
        }
    }

    pub fn with_fsm(mut self, fsm: Fsm) -> Self {
        self.fsm = Some(fsm);
        self
    }

    /// Wrap a plan: executing the instance dispatches the plan.
    pub fn with_plan(mut self, plan: StrategyPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Preserve the YAML text this instance was built from.
    pub fn with_original_yaml(mut self, yaml: impl Into<String>) -> Self {
        self.original_yaml = Some(yaml.into());
        self
    }

    /// Mark this instance as a child of another workflow.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// In strict mode execution failures surface as `Err` instead of the
    /// error-shaped mapping.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    // ---- Inspection ----

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.workflow_type.name
    }

    pub fn workflow_type(&self) -> &WorkflowType {
        &self.workflow_type
    }

    pub fn fsm(&self) -> Option<&Fsm> {
        self.fsm.as_ref()
    }

    pub fn fsm_mut(&mut self) -> Option<&mut Fsm> {
        self.fsm.as_mut()
    }

    pub fn plan(&self) -> Option<&StrategyPlan> {
        self.plan.as_ref()
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.execution_state
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.execution_history
    }

    pub fn original_yaml(&self) -> Option<&str> {
        self.original_yaml.as_deref()
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    /// Validate workflow input data: a mapping with a non-empty string
    /// `problem`; `parameters` must be a mapping and `resources` a list
    /// when present.
    pub fn validate(data: &Map<String, Value>) -> AgentResult<()> {
        match data.get("problem") {
            Some(Value::String(problem)) if !problem.trim().is_empty() => {}
            Some(Value::String(_)) => {
                return Err(AgentError::InvalidArgument(
                    "workflow data field 'problem' must be non-empty".to_string(),
                ))
            }
            Some(_) => {
                return Err(AgentError::InvalidArgument(
                    "workflow data field 'problem' must be a string".to_string(),
                ))
            }
            None => {
                return Err(AgentError::InvalidArgument(
                    "workflow data requires a 'problem' field".to_string(),
                ))
            }
        }
        if let Some(parameters) = data.get("parameters") {
            if !parameters.is_object() {
                return Err(AgentError::InvalidArgument(
                    "workflow data field 'parameters' must be a mapping".to_string(),
                ));
            }
        }
        if let Some(resources) = data.get("resources") {
            if !resources.is_array() {
                return Err(AgentError::InvalidArgument(
                    "workflow data field 'resources' must be a list".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Execute the workflow with the given data.
    ///
    /// Returns the execution payload: the FSM summary mapping, the wrapped
    /// plan's result, or the simple-flow mapping. Failures return the
    /// error-shaped mapping unless `strict` is set.
    pub async fn execute(
        &mut self,
        executor: &dyn ActionExecutor,
        data: Map<String, Value>,
        ctx: &ProblemContext,
    ) -> AgentResult<Value> {
        if let Err(err) = Self::validate(&data) {
            self.execution_state = ExecutionState::Error;
            self.push_history("error", json!({ "message": err.to_string() }));
            return self.fail(err);
        }

        self.execution_state = ExecutionState::Executing;
        self.push_history("start", Value::Object(data.clone()));

        let problem = data
            .get("problem")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let outcome = self.run(executor, &problem, &data, ctx).await;
        match outcome {
            Ok(result) => {
                self.execution_state = ExecutionState::Completed;
                self.push_history("complete", result.clone());
                Ok(result)
            }
            Err(err) => {
                self.execution_state = ExecutionState::Error;
                self.push_history("error", json!({ "message": err.to_string() }));
                self.fail(err)
            }
        }
    }

    async fn run(
        &mut self,
        executor: &dyn ActionExecutor,
        problem: &str,
        data: &Map<String, Value>,
        ctx: &ProblemContext,
    ) -> AgentResult<Value> {
        if let Some(mut fsm) = self.fsm.take() {
            let outcome = run_fsm(&mut fsm, executor, data, ctx).await;
            self.fsm = Some(fsm);
            return outcome;
        }
        if let Some(plan) = &self.plan {
            return executor.run_plan(plan, problem, ctx).await;
        }
        Ok(self.run_simple(problem, data))
    }

    /// Keyword-matched simple flow for instances without an FSM or plan.
    fn run_simple(&self, problem: &str, data: &Map<String, Value>) -> Value {
        let params = data
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let name = self.workflow_type.name.to_lowercase();

        if name.contains("health") {
            json!({
                "health": "good",
                "issues": [],
                "recommendations": ["schedule maintenance in 2 weeks"],
                "equipment_id": params.get("equipment_id").cloned().unwrap_or(json!("Line 3")),
                "workflow_type": self.workflow_type.name,
            })
        } else if name.contains("pipeline") {
            json!({
                "processed": true,
                "anomalies_found": 2,
                "output_file": "analysis_results.json",
                "data_file": params.get("data_file").cloned().unwrap_or(json!("sensors.csv")),
                "workflow_type": self.workflow_type.name,
            })
        } else if name.contains("analysis") || name.contains("data") {
            json!({
                "mean_temp": 42.1,
                "max_temp": 67.8,
                "anomalies": 3,
                "data_source": params.get("data_source").cloned().unwrap_or(json!("sensors.csv")),
                "workflow_type": self.workflow_type.name,
            })
        } else if name.contains("equipment") || name.contains("status") {
            json!({
                "status": "operational",
                "temperature": 45.2,
                "last_check": Utc::now().to_rfc3339(),
                "equipment_id": params.get("equipment_id").cloned().unwrap_or(json!("Line 3")),
                "workflow_type": self.workflow_type.name,
            })
        } else {
            json!({
                "status": "completed",
                "problem": problem,
                "params": params,
                "resources_used": data.get("resources").and_then(Value::as_array).map(Vec::len).unwrap_or(0),
                "workflow_type": self.workflow_type.name,
            })
        }
    }

    fn fail(&self, err: AgentError) -> AgentResult<Value> {
        if self.strict {
            Err(err)
        } else {
            Ok(json!({
                "error": err.to_string(),
                "status": "failed",
                "workflow_type": self.workflow_type.name,
            }))
        }
    }

    fn push_history(&mut self, step: &str, payload: Value) {
        self.execution_history.push(HistoryEntry {
            step: step.to_string(),
            timestamp: Utc::now(),
            payload,
        });
    }
}

/// Walk the FSM until a terminal state, running each state's action through
/// the executor.
async fn run_fsm(
    fsm: &mut Fsm,
    executor: &dyn ActionExecutor,
    data: &Map<String, Value>,
    ctx: &ProblemContext,
) -> AgentResult<Value> {
    let mut step_results = Map::new();

    while fsm.current_state() != COMPLETE_STATE && fsm.current_state() != ERROR_STATE {
        let state = fsm.current_state().to_string();

        let metadata = match fsm.state_metadata(&state) {
            Some(metadata) => metadata.clone(),
            None => {
                // START and other bare states just advance.
                if fsm.transition(NEXT_EVENT) {
                    continue;
                }
                break;
            }
        };

        fsm.set_status(&state, StateStatus::Executing);

        let mut action_data = data.clone();
        if !metadata.parameters.is_empty() {
            action_data.insert(
                "fsm_parameters".to_string(),
                Value::Object(metadata.parameters.clone()),
            );
        }

        match executor
            .run_action(
                &metadata.action,
                &metadata.objective,
                &metadata.parameters,
                &action_data,
                ctx,
            )
            .await
        {
            Ok(result) => {
                // Result is observable before the transition fires.
                fsm.set_result(state.clone(), result.clone());
                step_results.insert(state.clone(), result);
                fsm.set_status(&state, StateStatus::Completed);
                if !fsm.transition(NEXT_EVENT) {
                    break;
                }
            }
            Err(err) => {
                fsm.set_status(&state, StateStatus::Failed);
                if fsm.transition(ERROR_EVENT) {
                    continue;
                }
                return Err(err);
            }
        }
    }

    Ok(json!({
        "status": if fsm.current_state() == COMPLETE_STATE { "completed" } else { "failed" },
        "final_state": fsm.current_state(),
        "results": step_results,
        "fsm_results": fsm.results(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor;

    #[async_trait]
    impl ActionExecutor for EchoExecutor {
        async fn run_action(
            &self,
            action: &str,
            _objective: &str,
            _parameters: &Map<String, Value>,
            _data: &Map<String, Value>,
            _ctx: &ProblemContext,
        ) -> AgentResult<Value> {
            Ok(json!(format!("ran {}", action)))
        }

        async fn run_plan(
            &self,
            _plan: &StrategyPlan,
            problem: &str,
            _ctx: &ProblemContext,
        ) -> AgentResult<Value> {
            Ok(json!(format!("planned {}", problem)))
        }
    }

    fn problem_data(problem: &str) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("problem".to_string(), json!(problem));
        data
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        assert!(WorkflowInstance::validate(&problem_data("p")).is_ok());

        let empty = Map::new();
        assert!(WorkflowInstance::validate(&empty).is_err());

        let mut blank = Map::new();
        blank.insert("problem".to_string(), json!("   "));
        assert!(WorkflowInstance::validate(&blank).is_err());

        let mut bad_params = problem_data("p");
        bad_params.insert("parameters".to_string(), json!("not a map"));
        assert!(WorkflowInstance::validate(&bad_params).is_err());

        let mut bad_resources = problem_data("p");
        bad_resources.insert("resources".to_string(), json!({}));
        assert!(WorkflowInstance::validate(&bad_resources).is_err());
    }

    #[tokio::test]
    async fn invalid_data_yields_error_mapping() {
        let mut workflow = WorkflowInstance::new(WorkflowType::new("Anything"));
        let ctx = ProblemContext::root("p");
        let result = workflow
            .execute(&EchoExecutor, Map::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], json!("failed"));
        assert_eq!(workflow.execution_state(), ExecutionState::Error);
    }

    #[tokio::test]
    async fn strict_mode_propagates_errors() {
        let mut workflow =
            WorkflowInstance::new(WorkflowType::new("Anything")).with_strict(true);
        let ctx = ProblemContext::root("p");
        let result = workflow.execute(&EchoExecutor, Map::new(), &ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fsm_execution_completes_all_states() {
        let fsm = Fsm::linear(vec![
            "START".to_string(),
            "MEASURE".to_string(),
            "REPORT".to_string(),
            "COMPLETE".to_string(),
        ])
        .unwrap();
        let mut workflow = WorkflowInstance::new(WorkflowType::new("Measurement")).with_fsm(fsm);
        let ctx = ProblemContext::root("measure the line");

        let result = workflow
            .execute(&EchoExecutor, problem_data("measure the line"), &ctx)
            .await
            .unwrap();

        assert_eq!(result["status"], json!("completed"));
        assert_eq!(result["final_state"], json!("COMPLETE"));
        assert!(result["results"].get("MEASURE").is_some());
        assert!(result["results"].get("REPORT").is_some());

        let fsm = workflow.fsm().unwrap();
        for state in ["MEASURE", "REPORT"] {
            assert_eq!(fsm.status(state), Some(StateStatus::Completed));
            assert!(fsm.result(state).is_some());
        }
        assert_eq!(workflow.execution_state(), ExecutionState::Completed);
        assert_eq!(workflow.history().first().unwrap().step, "start");
        assert_eq!(workflow.history().last().unwrap().step, "complete");
    }

    #[tokio::test]
    async fn plan_carrying_instance_dispatches() {
        use crate::solveflow::plan::Plan;
        let plan = StrategyPlan::new(Plan::Direct {
            content: "42".to_string(),
        });
        let mut workflow = WorkflowInstance::new(WorkflowType::new("Wrapped")).with_plan(plan);
        let ctx = ProblemContext::root("p");

        let result = workflow
            .execute(&EchoExecutor, problem_data("p"), &ctx)
            .await
            .unwrap();
        assert_eq!(result, json!("planned p"));
    }

    #[tokio::test]
    async fn simple_flow_matches_keywords() {
        let mut workflow = WorkflowInstance::new(WorkflowType::new("EquipmentStatusWorkflow"));
        let ctx = ProblemContext::root("check line 3");
        let result = workflow
            .execute(&EchoExecutor, problem_data("check line 3"), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], json!("operational"));
        assert_eq!(result["workflow_type"], json!("EquipmentStatusWorkflow"));

        let mut generic = WorkflowInstance::new(WorkflowType::new("SomethingElse"));
        let result = generic
            .execute(&EchoExecutor, problem_data("do it"), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], json!("completed"));
    }

    struct FailingExecutor;

    #[async_trait]
    impl ActionExecutor for FailingExecutor {
        async fn run_action(
            &self,
            _action: &str,
            _objective: &str,
            _parameters: &Map<String, Value>,
            _data: &Map<String, Value>,
            _ctx: &ProblemContext,
        ) -> AgentResult<Value> {
            Err(AgentError::Internal("action blew up".to_string()))
        }

        async fn run_plan(
            &self,
            _plan: &StrategyPlan,
            _problem: &str,
            _ctx: &ProblemContext,
        ) -> AgentResult<Value> {
            Err(AgentError::Internal("plan blew up".to_string()))
        }
    }

    #[tokio::test]
    async fn failing_state_yields_error_mapping_and_failed_status() {
        let fsm = Fsm::linear(vec![
            "START".to_string(),
            "WORK".to_string(),
            "COMPLETE".to_string(),
        ])
        .unwrap();
        let mut workflow = WorkflowInstance::new(WorkflowType::new("Fragile")).with_fsm(fsm);
        let ctx = ProblemContext::root("p");

        let result = workflow
            .execute(&FailingExecutor, problem_data("p"), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], json!("failed"));
        assert_eq!(result["workflow_type"], json!("Fragile"));
        assert_eq!(
            workflow.fsm().unwrap().status("WORK"),
            Some(StateStatus::Failed)
        );
        assert_eq!(workflow.execution_state(), ExecutionState::Error);
    }
}
