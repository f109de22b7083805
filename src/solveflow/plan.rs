//! Plan model and the LLM plan parser.
//!
//! A [`Plan`] is the structured instruction the planner produces for a
//! problem: answer directly, run code, drive a workflow, delegate, escalate,
//! prompt the user, or fall back to manual reasoning. The executor
//! dispatches exhaustively on the tag, so there is exactly one switch in the
//! system and no stringly-typed routing.
//!
//! [`parse_analysis`] turns raw LLM output into a [`PlanAnalysis`]. It is
//! **total**: any input string produces an analysis. Fenced YAML is
//! extracted (preferring a ```yaml fence, up to the last closing fence),
//! parse failures degrade to treating the whole text as the plan field, and
//! unknown plan names default to [`PlanKind::Direct`].
//!
//! # Example
//!
//! ```rust
//! use solveflow::plan::{parse_analysis, PlanKind};
//!
//! let analysis = parse_analysis(
//!     "```yaml\nplan: CODE\nconfidence: 0.9\nsolution: \"print(120)\"\n```",
//! );
//! assert_eq!(analysis.kind, PlanKind::Code);
//! assert_eq!(analysis.solution, "print(120)");
//!
//! // Garbage never fails, it just routes to a Direct plan.
//! assert_eq!(parse_analysis("no yaml here").kind, PlanKind::Direct);
//! ```

use crate::solveflow::workflow::WorkflowInstance;
use serde_json::{Map, Value};
use std::fmt;

/// Problem complexity reported by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Critical,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::Critical => "critical",
        }
    }

    /// Parse a complexity name, case-insensitively; unknown values default
    /// to `Moderate`.
    pub fn parse(raw: &str) -> Complexity {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            "critical" => Complexity::Critical,
            _ => Complexity::Moderate,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The discriminant of a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Direct,
    Code,
    Workflow,
    Delegate,
    Escalate,
    Input,
    Manual,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Direct => "DIRECT",
            PlanKind::Code => "CODE",
            PlanKind::Workflow => "WORKFLOW",
            PlanKind::Delegate => "DELEGATE",
            PlanKind::Escalate => "ESCALATE",
            PlanKind::Input => "INPUT",
            PlanKind::Manual => "MANUAL",
        }
    }

    /// Normalize a plan name from LLM output.
    ///
    /// Case-insensitive. Accepts the canonical names, legacy `TYPE_*`
    /// prefixed forms, and the synonym families the original planner
    /// tolerated (`python` → Code, `user` → Input, `human` → Escalate,
    /// `specialist`/`agent` → Delegate, `process` → Workflow,
    /// `solution` → Direct). Anything unrecognized defaults to `Direct`.
    pub fn parse(raw: &str) -> PlanKind {
        let value = raw.trim().to_ascii_uppercase();

        for kind in [
            PlanKind::Direct,
            PlanKind::Code,
            PlanKind::Workflow,
            PlanKind::Delegate,
            PlanKind::Escalate,
            PlanKind::Input,
            PlanKind::Manual,
        ] {
            if value == kind.as_str() {
                return kind;
            }
        }

        if value.contains("DIRECT") || value.contains("SOLUTION") {
            PlanKind::Direct
        } else if value.contains("PYTHON") || value.contains("CODE") {
            PlanKind::Code
        } else if value.contains("WORKFLOW") || value.contains("PROCESS") {
            PlanKind::Workflow
        } else if value.contains("DELEGATE")
            || value.contains("SPECIALIST")
            || value.contains("AGENT")
        {
            PlanKind::Delegate
        } else if value.contains("ESCALATE") || value.contains("HUMAN") {
            PlanKind::Escalate
        } else if value.contains("INPUT") || value.contains("USER") {
            PlanKind::Input
        } else if value.contains("MANUAL") {
            PlanKind::Manual
        } else {
            PlanKind::Direct
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a workflow plan gets its workflow from: an already materialized
/// instance, or YAML still to be fed through the factory.
#[derive(Debug, Clone)]
pub enum WorkflowSource {
    Instance(Box<WorkflowInstance>),
    Yaml(String),
}

/// Structured instruction describing how to solve a problem.
#[derive(Debug, Clone)]
pub enum Plan {
    /// The answer itself; returned verbatim.
    Direct { content: String },
    /// Sandbox-executable source code.
    Code { content: String },
    /// A multi-step workflow.
    Workflow(WorkflowSource),
    /// Hand the problem to another agent.
    Delegate {
        target_agent: String,
        content: Option<String>,
    },
    /// Hand the problem to a human.
    Escalate { reason: String },
    /// Ask the user for information.
    Input { prompt: String },
    /// No structured solution; reason it out directly.
    Manual { content: String },
}

impl Plan {
    pub fn kind(&self) -> PlanKind {
        match self {
            Plan::Direct { .. } => PlanKind::Direct,
            Plan::Code { .. } => PlanKind::Code,
            Plan::Workflow(_) => PlanKind::Workflow,
            Plan::Delegate { .. } => PlanKind::Delegate,
            Plan::Escalate { .. } => PlanKind::Escalate,
            Plan::Input { .. } => PlanKind::Input,
            Plan::Manual { .. } => PlanKind::Manual,
        }
    }
}

/// Metadata a strategy attaches to the plan it produced.
#[derive(Debug, Clone)]
pub struct PlanMetadata {
    /// Name of the strategy that produced the plan.
    pub strategy: String,
    /// Planner confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Why this plan was chosen.
    pub reasoning: String,
    pub complexity: Complexity,
    /// `immediate`, `minutes`, `hours`, `days`, or `unknown`.
    pub estimated_duration: String,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            strategy: String::new(),
            confidence: 0.0,
            reasoning: String::new(),
            complexity: Complexity::Moderate,
            estimated_duration: "unknown".to_string(),
        }
    }
}

/// A plan plus the metadata of the strategy that produced it.
#[derive(Debug, Clone)]
pub struct StrategyPlan {
    pub plan: Plan,
    pub metadata: PlanMetadata,
}

impl StrategyPlan {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            metadata: PlanMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: PlanMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn kind(&self) -> PlanKind {
        self.plan.kind()
    }
}

/// The fields read out of an LLM plan response.
#[derive(Debug, Clone)]
pub struct PlanAnalysis {
    pub kind: PlanKind,
    /// The `solution` field, stringified; empty when absent.
    pub solution: String,
    /// Clamped to `0.0..=1.0`; 0.0 when absent.
    pub confidence: f64,
    pub reasoning: String,
    /// The `details` mapping, verbatim.
    pub details: Map<String, Value>,
}

impl PlanAnalysis {
    /// Complexity from `details.complexity`, defaulting to moderate.
    pub fn complexity(&self) -> Complexity {
        self.details
            .get("complexity")
            .and_then(Value::as_str)
            .map(Complexity::parse)
            .unwrap_or(Complexity::Moderate)
    }

    /// Duration estimate from `details.estimated_duration`.
    pub fn estimated_duration(&self) -> String {
        self.details
            .get("estimated_duration")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}

/// Parse raw LLM output into a [`PlanAnalysis`]. Never fails.
pub fn parse_analysis(raw: &str) -> PlanAnalysis {
    let yaml_text = extract_yaml_block(raw);

    let mapping = serde_yaml::from_str::<serde_yaml::Value>(&yaml_text)
        .ok()
        .and_then(|value| serde_json::to_value(value).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    let map = match mapping {
        Some(map) => map,
        None => {
            // Not YAML at all (or not a mapping): the whole text is treated
            // as the plan field.
            return PlanAnalysis {
                kind: PlanKind::parse(raw),
                solution: String::new(),
                confidence: 0.0,
                reasoning: String::new(),
                details: Map::new(),
            };
        }
    };

    let kind = PlanKind::parse(map.get("plan").and_then(Value::as_str).unwrap_or_default());
    let solution = match map.get("solution") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let reasoning = map
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let details = map
        .get("details")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    PlanAnalysis {
        kind,
        solution,
        confidence,
        reasoning,
        details,
    }
}

/// Extract the YAML body from possibly fenced LLM output.
///
/// Prefers a ```yaml fence and takes everything up to the *last* closing
/// fence so nested fences inside the payload survive; falls back to a bare
/// fence, then to the trimmed text.
pub fn extract_yaml_block(text: &str) -> String {
    if let Some(after) = split_after(text, "```yaml") {
        return strip_to_last_fence(after);
    }
    if let Some(after) = split_after(text, "```") {
        return strip_to_last_fence(after);
    }
    text.trim().to_string()
}

fn split_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.find(marker).map(|idx| &text[idx + marker.len()..])
}

fn strip_to_last_fence(content: &str) -> String {
    match content.rfind("```") {
        Some(idx) => content[..idx].trim().to_string(),
        None => content.trim().to_string(),
    }
}

/// Remove leading/trailing fence marker lines from a code solution.
pub fn clean_code_block(code: &str) -> String {
    let mut lines: Vec<&str> = code.trim().lines().collect();
    if matches!(lines.first(), Some(first) if first.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if matches!(lines.last(), Some(last) if last.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}
