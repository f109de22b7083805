//! Plan execution: one exhaustive dispatch over the plan kinds.
//!
//! | Plan kind | Action |
//! |-----------|--------|
//! | Direct    | Return the content verbatim. |
//! | Code      | Run through the coding resource (30 s default deadline); failures fold into a text result carrying the offending source. |
//! | Workflow  | Execute the instance, materializing raw YAML through the factory first. |
//! | Delegate  | Format the delegation notice (inter-agent calls are an extension point). |
//! | Escalate  | Format the human-escalation notice. |
//! | Input     | Prompt the user through the input resource. |
//! | Manual    | Ask the LLM to solve directly. |
//!
//! [`route_untyped`] maps legacy string plans onto the same dispatch:
//! `agent:` prefixes delegate, the `TYPE_ESCALATE` sentinel escalates, and
//! anything else is handled manually.

use crate::solveflow::agent::Agent;
use crate::solveflow::context::ProblemContext;
use crate::solveflow::error::AgentResult;
use crate::solveflow::event::{EventPayload, LogLevel};
use crate::solveflow::plan::{Plan, WorkflowSource};
use crate::solveflow::resource::{ResourceKind, ResourceRequest};
use crate::solveflow::strategy::prompts::{manual_solution_prompt, ANALYST_SYSTEM_MESSAGE};
use crate::solveflow::workflow_factory::WorkflowFactory;
use serde_json::{json, Map, Value};

/// Execute a plan for `problem`, returning the result payload.
pub async fn dispatch(
    agent: &Agent,
    plan: &Plan,
    problem: &str,
    ctx: &ProblemContext,
) -> AgentResult<Value> {
    match plan {
        Plan::Direct { content } => Ok(Value::String(content.clone())),

        Plan::Code { content } => Ok(Value::String(execute_code(agent, content, problem).await)),

        Plan::Workflow(source) => {
            let mut instance = match source {
                WorkflowSource::Instance(instance) => (**instance).clone(),
                WorkflowSource::Yaml(yaml) => WorkflowFactory::new().from_yaml(yaml)?,
            };
            let mut data = Map::new();
            data.insert("problem".to_string(), json!(problem));
            instance.execute(agent, data, ctx).await
        }

        Plan::Delegate { target_agent, .. } => {
            let name = target_agent
                .strip_prefix("agent:")
                .unwrap_or(target_agent.as_str());
            agent.log(&format!("delegating to agent: {}", name), LogLevel::Debug);
            Ok(Value::String(format!(
                "Delegated problem '{}' to agent: {}",
                problem, name
            )))
        }

        Plan::Escalate { reason } => {
            agent.log(&format!("escalating to human: {}", reason), LogLevel::Debug);
            Ok(Value::String(format!(
                "Problem '{}' escalated to human for manual intervention",
                problem
            )))
        }

        Plan::Input { prompt } => {
            let question = if prompt.trim().is_empty() {
                problem
            } else {
                prompt.as_str()
            };
            let response = agent.input(question).await?;
            Ok(Value::String(format!("User response is '{}'", response)))
        }

        Plan::Manual { .. } => {
            let solution = agent
                .reason(
                    &manual_solution_prompt(problem, ctx),
                    Some(ANALYST_SYSTEM_MESSAGE),
                )
                .await?;
            Ok(Value::String(format!("Manual solution: {}", solution)))
        }
    }
}

/// Interpret a legacy untyped string plan.
pub fn route_untyped(raw: &str) -> Plan {
    let trimmed = raw.trim();
    if trimmed.starts_with("agent:") {
        Plan::Delegate {
            target_agent: trimmed.to_string(),
            content: None,
        }
    } else if trimmed == "TYPE_ESCALATE" {
        Plan::Escalate {
            reason: trimmed.to_string(),
        }
    } else {
        Plan::Manual {
            content: trimmed.to_string(),
        }
    }
}

/// Run source through the coding resource, folding every failure mode into
/// a result string that includes the offending source.
async fn execute_code(agent: &Agent, source: &str, problem: &str) -> String {
    agent.events().emit(EventPayload::ToolStart {
        name: "coding".to_string(),
    });

    let outcome = match agent.resources().get_by_kind(ResourceKind::Coding) {
        None => Err("no coding resource registered".to_string()),
        Some(resource) => {
            let request = ResourceRequest::ToolCall {
                tool: "execute".to_string(),
                arguments: json!({ "source": source }),
            };
            match resource.query(request).await {
                Ok(response) if response.success => Ok(response.content_text()),
                Ok(response) => Err(response
                    .error
                    .unwrap_or_else(|| "unknown execution error".to_string())),
                Err(err) => Err(err.to_string()),
            }
        }
    };

    let (success, text) = match outcome {
        Ok(output) => (true, output),
        Err(err) => (
            false,
            format!(
                "Code execution failed for '{}': {}\n\nCode was:\n{}",
                problem, err, source
            ),
        ),
    };

    agent.events().emit(EventPayload::ToolEnd {
        name: "coding".to_string(),
        result: json!({ "success": success }),
    });

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solveflow::plan::PlanKind;

    #[test]
    fn untyped_strings_route_by_shape() {
        assert_eq!(route_untyped("agent:finance").kind(), PlanKind::Delegate);
        assert_eq!(route_untyped("TYPE_ESCALATE").kind(), PlanKind::Escalate);
        assert_eq!(route_untyped("anything else").kind(), PlanKind::Manual);
    }

    #[test]
    fn delegate_prefix_is_stripped_later() {
        match route_untyped("agent:finance") {
            Plan::Delegate { target_agent, .. } => assert_eq!(target_agent, "agent:finance"),
            _ => unreachable!(),
        }
    }
}
