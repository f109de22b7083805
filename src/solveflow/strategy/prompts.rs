//! Prompt templates used by the planning strategies.
//!
//! Centralized here so the strategies stay focused on control flow. The
//! analysis template demands a YAML response whose fields line up with what
//! [`crate::plan::parse_analysis`] reads back out.

use crate::solveflow::context::ProblemContext;

/// System message priming the model for plan analysis.
pub const ANALYST_SYSTEM_MESSAGE: &str =
    "You are an AI agent specialized in problem analysis and solution planning. \
     Always answer with a single YAML document and nothing else.";

fn context_json(ctx: &ProblemContext) -> String {
    serde_json::to_string(ctx).unwrap_or_else(|_| "{}".to_string())
}

/// The analysis prompt: enumerate the permitted plan kinds and demand the
/// structured YAML response.
pub fn analysis_prompt(problem: &str, ctx: &ProblemContext) -> String {
    format!(
        "Analyze the given problem and determine the best plan.\n\
         \n\
         task:\n\
         \x20 problem: \"{problem}\"\n\
         \x20 context: {context}\n\
         \n\
         requirements:\n\
         \x20 - Choose the best plan from: DIRECT, CODE, WORKFLOW, DELEGATE, ESCALATE, INPUT\n\
         \x20 - Provide the actual solution, code, or action\n\
         \x20 - Return the response in YAML format\n\
         \n\
         plan_types:\n\
         \x20 DIRECT: For simple problems (arithmetic, facts, calculations) - provide the direct answer\n\
         \x20 CODE: For problems needing code generation - provide complete, executable code\n\
         \x20 WORKFLOW: For complex processes requiring multiple steps - provide a workflow definition\n\
         \x20 DELEGATE: For problems needing specialized agents - name the agent that should handle this\n\
         \x20 ESCALATE: For problems too complex for current capabilities - explain why human intervention is needed\n\
         \x20 INPUT: For problems that cannot proceed without information from the user - provide the question to ask\n\
         \n\
         response_format:\n\
         \x20 plan: PLAN_TYPE\n\
         \x20 confidence: 0.95\n\
         \x20 reasoning: Why this plan is best for this problem\n\
         \x20 solution: The actual solution, code, or action\n\
         \x20 details:\n\
         \x20   complexity: SIMPLE|MODERATE|COMPLEX|CRITICAL\n\
         \x20   estimated_duration: immediate|minutes|hours|days\n\
         \x20   required_resources: [list, of, resources]\n\
         \x20   risks: Any potential risks or limitations\n",
        problem = problem,
        context = context_json(ctx),
    )
}

/// Prompt for solving a problem directly when no structured plan applies.
pub fn manual_solution_prompt(problem: &str, ctx: &ProblemContext) -> String {
    format!(
        "Provide a clear, actionable solution to the given problem.\n\
         \n\
         task:\n\
         \x20 problem: \"{problem}\"\n\
         \x20 context: {context}\n",
        problem = problem,
        context = context_json(ctx),
    )
}

/// Prompt asking for a decomposition of the problem as a workflow
/// definition whose steps can be solved independently.
pub fn decomposition_prompt(problem: &str, ctx: &ProblemContext) -> String {
    format!(
        "Break the given problem down into a short sequence of independent steps.\n\
         \n\
         task:\n\
         \x20 problem: \"{problem}\"\n\
         \x20 objective: \"{objective}\"\n\
         \x20 depth: {depth}\n\
         \n\
         Respond with ONLY a workflow definition in YAML:\n\
         \n\
         workflow:\n\
         \x20 name: <short_name>\n\
         \x20 description: <what the workflow achieves>\n\
         \x20 steps:\n\
         \x20   - id: step_1\n\
         \x20     action: <verb_phrase>\n\
         \x20     objective: <what this step achieves>\n",
        problem = problem,
        objective = ctx.objective,
        depth = ctx.depth,
    )
}

/// Prompt for one round of iterative refinement. `previous` is `None` on
/// the first iteration.
pub fn refinement_prompt(problem: &str, previous: Option<&str>, iteration: usize) -> String {
    match previous {
        None => format!(
            "Produce an initial solution for the problem below. It will be refined in later passes.\n\
             \n\
             problem: \"{}\"\n",
            problem
        ),
        Some(previous) => format!(
            "Refine the current solution to the problem below (iteration {}).\n\
             Improve correctness and completeness; if nothing can be improved, repeat the solution unchanged.\n\
             \n\
             problem: \"{}\"\n\
             \n\
             current_solution: |\n\
             \x20 {}\n",
            iteration,
            problem,
            previous.replace('\n', "\n  "),
        ),
    }
}
