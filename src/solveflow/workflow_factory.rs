//! Building workflow instances from YAML definitions.
//!
//! The factory accepts a workflow spec in fenced or raw YAML:
//!
//! ```text
//! workflow:
//!   name: <string, required>
//!   description: <string>
//!   steps:                          # ordered
//!     - id: <string, default step_<n>>
//!       name: <string>
//!       action: <string>
//!       objective: <string>
//!       parameters: <mapping>
//!       conditions: <mapping>
//!       error_step: <step id>       # optional
//!   fsm: <mapping>                  # optional overrides
//!   metadata: <mapping>
//! ```
//!
//! Every step becomes an FSM state named `STEP_<id>` carrying the step's
//! action, objective, parameters, and conditions. States are linked
//! linearly with `"next"`, `error_step` adds an `"error"` route, and
//! `START`/`COMPLETE` bracket the chain. Missing `workflow` key, missing
//! `name`, or a non-list `steps` rejects the input with `InvalidFormat`.
//! Unknown keys under `workflow` are ignored for execution but retained in
//! the definition's metadata, and the instance preserves the original YAML
//! text byte-for-byte.
//!
//! # Example
//!
//! ```rust
//! use solveflow::workflow_factory::WorkflowFactory;
//!
//! let yaml = "workflow:\n  name: check\n  steps:\n    - action: read_sensor\n    - action: report\n";
//! let instance = WorkflowFactory::new().from_yaml(yaml).unwrap();
//!
//! let states: Vec<&str> = instance.fsm().unwrap().states().iter().map(|s| s.as_str()).collect();
//! assert_eq!(states, vec!["START", "STEP_step_1", "STEP_step_2", "COMPLETE"]);
//! assert_eq!(instance.original_yaml(), Some(yaml));
//! ```

use crate::solveflow::error::{AgentError, AgentResult};
use crate::solveflow::fsm::{Fsm, StateMetadata, TransitionKey, COMPLETE_STATE, START_STATE};
use crate::solveflow::workflow::{WorkflowInstance, WorkflowType};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Keys under `workflow` with defined meaning; everything else is retained
/// as metadata.
const KNOWN_KEYS: [&str; 5] = ["name", "description", "steps", "fsm", "metadata"];

/// Individual workflow step definition.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub action: String,
    pub objective: String,
    pub parameters: Map<String, Value>,
    pub conditions: Map<String, Value>,
    pub next_step: Option<String>,
    pub error_step: Option<String>,
}

impl WorkflowStep {
    /// The FSM state name this step maps to.
    pub fn state_name(&self) -> String {
        format!("STEP_{}", self.id)
    }
}

/// Structured workflow definition produced from parsed YAML.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub fsm_config: Map<String, Value>,
    pub metadata: Map<String, Value>,
    /// The input text, preserved verbatim.
    pub original_yaml: String,
}

impl WorkflowDefinition {
    /// Schema metadata for instances of this definition. The original YAML
    /// travels along as a defaulted field so round-tripping survives
    /// instantiation.
    pub fn to_workflow_type(&self) -> WorkflowType {
        WorkflowType::new(self.name.clone())
            .with_docstring(self.description.clone())
            .with_field("original_yaml", "str")
            .with_field_default("original_yaml", json!(self.original_yaml))
            .with_field_comment("original_yaml", "Original YAML workflow definition")
    }

    /// Materialize a runnable instance with a generated FSM.
    pub fn to_instance(&self) -> AgentResult<WorkflowInstance> {
        let fsm = self.build_fsm()?;
        Ok(WorkflowInstance::new(self.to_workflow_type())
            .with_fsm(fsm)
            .with_original_yaml(self.original_yaml.clone()))
    }

    fn build_fsm(&self) -> AgentResult<Fsm> {
        let mut states = vec![START_STATE.to_string()];
        let mut state_metadata = HashMap::new();

        for step in &self.steps {
            let state = step.state_name();
            states.push(state.clone());
            state_metadata.insert(
                state,
                StateMetadata::for_step(step.action.clone(), step.objective.clone())
                    .with_parameters(step.parameters.clone())
                    .with_conditions(step.conditions.clone()),
            );
        }
        states.push(COMPLETE_STATE.to_string());

        let mut transitions = HashMap::new();
        for pair in states.windows(2) {
            transitions.insert(TransitionKey::new(pair[0].clone(), "next"), pair[1].clone());
        }
        for step in &self.steps {
            if let Some(error_step) = &step.error_step {
                transitions.insert(
                    TransitionKey::new(step.state_name(), "error"),
                    format!("STEP_{}", error_step),
                );
            }
        }

        let mut workflow_metadata = Map::new();
        workflow_metadata.insert("name".to_string(), json!(self.name));
        workflow_metadata.insert("description".to_string(), json!(self.description));
        workflow_metadata.insert("total_steps".to_string(), json!(self.steps.len()));
        workflow_metadata.insert("fsm_config".to_string(), Value::Object(self.fsm_config.clone()));

        Fsm::branching_with_metadata(
            states,
            START_STATE,
            transitions,
            state_metadata,
            workflow_metadata,
        )
        .map_err(|err| AgentError::InvalidFormat(format!("workflow FSM is inconsistent: {}", err)))
    }
}

/// Factory for creating [`WorkflowInstance`]s from textual definitions.
#[derive(Debug, Default)]
pub struct WorkflowFactory;

impl WorkflowFactory {
    pub fn new() -> Self {
        Self
    }

    /// Parse YAML and materialize a runnable instance.
    pub fn from_yaml(&self, text: &str) -> AgentResult<WorkflowInstance> {
        self.parse(text)?.to_instance()
    }

    /// Parse YAML into a structured definition without instantiating.
    pub fn parse(&self, text: &str) -> AgentResult<WorkflowDefinition> {
        let yaml_text = extract_workflow_yaml(text);

        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml_text)
            .map_err(|err| AgentError::InvalidFormat(format!("invalid YAML: {}", err)))?;
        let root = serde_json::to_value(parsed)
            .map_err(|err| AgentError::InvalidFormat(format!("unsupported YAML shape: {}", err)))?;

        let workflow = root
            .as_object()
            .and_then(|map| map.get("workflow"))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                AgentError::InvalidFormat("definition requires a 'workflow' mapping".to_string())
            })?;

        let name = workflow
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AgentError::InvalidFormat("workflow definition requires a 'name'".to_string())
            })?;

        let description = workflow
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let steps = match workflow.get("steps") {
            None => Vec::new(),
            Some(Value::Array(items)) => parse_steps(items),
            Some(_) => {
                return Err(AgentError::InvalidFormat(
                    "'steps' must be a list".to_string(),
                ))
            }
        };

        let fsm_config = workflow
            .get("fsm")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut metadata = workflow
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (key, value) in workflow {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                metadata.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        Ok(WorkflowDefinition {
            name,
            description,
            steps,
            fsm_config,
            metadata,
            original_yaml: text.to_string(),
        })
    }

    /// Build a simple linear workflow from bare step names. The generated
    /// YAML is preserved on the instance like any parsed definition.
    pub fn simple(
        &self,
        name: impl Into<String>,
        steps: &[&str],
        description: impl Into<String>,
    ) -> AgentResult<WorkflowInstance> {
        let name = name.into();
        let description = description.into();

        let workflow_steps: Vec<WorkflowStep> = steps
            .iter()
            .enumerate()
            .map(|(i, step_name)| WorkflowStep {
                id: format!("step_{}", i + 1),
                name: step_name.to_string(),
                action: step_name.to_lowercase().replace(' ', "_"),
                objective: format!("Execute {}", step_name),
                parameters: Map::new(),
                conditions: Map::new(),
                next_step: None,
                error_step: None,
            })
            .collect();

        let definition = WorkflowDefinition {
            original_yaml: generate_simple_yaml(&name, &description, steps),
            name,
            description,
            steps: workflow_steps,
            fsm_config: Map::new(),
            metadata: Map::new(),
        };
        definition.to_instance()
    }

    /// Check whether text parses as a workflow definition.
    pub fn validate_text(&self, text: &str) -> bool {
        self.parse(text).is_ok()
    }
}

fn parse_steps(items: &[Value]) -> Vec<WorkflowStep> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let map = item.as_object().cloned().unwrap_or_default();
            let lookup = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

            let id = lookup("id").unwrap_or_else(|| format!("step_{}", i + 1));
            let action = lookup("action").unwrap_or_default();
            let name = lookup("name")
                .or_else(|| if action.is_empty() { None } else { Some(action.clone()) })
                .unwrap_or_else(|| format!("Step {}", i + 1));

            WorkflowStep {
                name,
                objective: lookup("objective").unwrap_or_default(),
                parameters: map
                    .get("parameters")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
                conditions: map
                    .get("conditions")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
                next_step: lookup("next_step"),
                error_step: lookup("error_step"),
                id,
                action,
            }
        })
        .collect()
}

/// Strip an optional leading ```yaml / ``` fence and trailing fence.
fn extract_workflow_yaml(text: &str) -> String {
    let mut trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```yaml") {
        trimmed = rest;
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        trimmed = rest;
    }
    if let Some(rest) = trimmed.strip_suffix("```") {
        trimmed = rest;
    }
    trimmed.trim().to_string()
}

fn generate_simple_yaml(name: &str, description: &str, steps: &[&str]) -> String {
    let mut lines = vec![
        "workflow:".to_string(),
        format!("  name: \"{}\"", name),
        format!("  description: \"{}\"", description),
        "  steps:".to_string(),
    ];
    for (i, step) in steps.iter().enumerate() {
        lines.push(format!("    - id: step_{}", i + 1));
        lines.push(format!(
            "      action: \"{}\"",
            step.to_lowercase().replace(' ', "_")
        ));
        lines.push(format!("      objective: \"Execute {}\"", step));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solveflow::fsm::StateStatus;

    const TWO_STEP: &str = "workflow:\n\
                            \x20 name: equipment_check\n\
                            \x20 description: Check one production line\n\
                            \x20 steps:\n\
                            \x20   - id: read\n\
                            \x20     action: read_sensor\n\
                            \x20     objective: Read the line sensor\n\
                            \x20     parameters:\n\
                            \x20       line: 3\n\
                            \x20   - id: report\n\
                            \x20     action: report\n";

    #[test]
    fn parses_steps_and_builds_linear_fsm() {
        let instance = WorkflowFactory::new().from_yaml(TWO_STEP).unwrap();
        let fsm = instance.fsm().unwrap();

        assert_eq!(
            fsm.states(),
            &[
                "START".to_string(),
                "STEP_read".to_string(),
                "STEP_report".to_string(),
                "COMPLETE".to_string()
            ]
        );
        assert_eq!(fsm.next_state("START", "next"), Some("STEP_read"));
        assert_eq!(fsm.next_state("STEP_read", "next"), Some("STEP_report"));
        assert_eq!(fsm.next_state("STEP_report", "next"), Some("COMPLETE"));

        let metadata = fsm.state_metadata("STEP_read").unwrap();
        assert_eq!(metadata.action, "read_sensor");
        assert_eq!(metadata.status, StateStatus::Pending);
        assert_eq!(metadata.parameters.get("line"), Some(&json!(3)));

        assert_eq!(fsm.workflow_metadata().get("total_steps"), Some(&json!(2)));
    }

    #[test]
    fn preserves_original_yaml_byte_identical() {
        let instance = WorkflowFactory::new().from_yaml(TWO_STEP).unwrap();
        assert_eq!(instance.original_yaml(), Some(TWO_STEP));
    }

    #[test]
    fn accepts_fenced_input() {
        let fenced = format!("```yaml\n{}\n```", TWO_STEP);
        let instance = WorkflowFactory::new().from_yaml(&fenced).unwrap();
        assert_eq!(instance.name(), "equipment_check");
        // The original text (fences included) is what round-trips.
        assert_eq!(instance.original_yaml(), Some(fenced.as_str()));
    }

    #[test]
    fn default_step_ids_are_generated() {
        let yaml = "workflow:\n  name: n\n  steps:\n    - action: a\n    - action: b\n";
        let instance = WorkflowFactory::new().from_yaml(yaml).unwrap();
        assert!(instance.fsm().unwrap().contains_state("STEP_step_1"));
        assert!(instance.fsm().unwrap().contains_state("STEP_step_2"));
    }

    #[test]
    fn error_step_adds_error_transition() {
        let yaml = "workflow:\n\
                    \x20 name: n\n\
                    \x20 steps:\n\
                    \x20   - id: a\n\
                    \x20     action: act_a\n\
                    \x20     error_step: recover\n\
                    \x20   - id: recover\n\
                    \x20     action: act_r\n";
        let instance = WorkflowFactory::new().from_yaml(yaml).unwrap();
        let fsm = instance.fsm().unwrap();
        assert_eq!(fsm.next_state("STEP_a", "error"), Some("STEP_recover"));
    }

    #[test]
    fn rejects_malformed_definitions() {
        let factory = WorkflowFactory::new();
        for bad in [
            "not yaml at [all",
            "steps:\n  - action: a",                   // missing workflow key
            "workflow:\n  description: no name",       // missing name
            "workflow:\n  name: n\n  steps: oops",     // steps not a list
        ] {
            assert!(
                matches!(factory.from_yaml(bad), Err(AgentError::InvalidFormat(_))),
                "expected InvalidFormat for {:?}",
                bad
            );
        }
    }

    #[test]
    fn unknown_keys_are_retained_in_metadata() {
        let yaml = "workflow:\n  name: n\n  owner: maintenance-team\n  steps: []\n";
        let definition = WorkflowFactory::new().parse(yaml).unwrap();
        assert_eq!(
            definition.metadata.get("owner"),
            Some(&json!("maintenance-team"))
        );
    }

    #[test]
    fn simple_builds_linear_workflow_with_yaml() {
        let instance = WorkflowFactory::new()
            .simple("triage", &["Collect Logs", "Summarize"], "triage flow")
            .unwrap();
        let fsm = instance.fsm().unwrap();
        assert!(fsm.contains_state("STEP_step_1"));
        assert_eq!(
            fsm.state_metadata("STEP_step_1").unwrap().action,
            "collect_logs"
        );
        let yaml = instance.original_yaml().unwrap();
        assert!(WorkflowFactory::new().validate_text(yaml));
    }
}
