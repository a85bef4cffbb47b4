//! Prompt construction for seed generation and mutation-strategy requests.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::FeedbackIssue;

/// System message for mutation-strategy requests.
pub const STRATEGY_SYSTEM_PROMPT: &str = "You are a smart contract analysis expert. \
Your goal is to propose changes to the test case parameters that are likely to alter the \
control flow seen in the execution trace (e.g., make a JUMPI branch go the other way). \
You must provide your response in the requested JSON format.";

const BASIC_PROMPT: &str = include_str!("../prompts/basic_prompt.txt");
const COT_PROMPT: &str = include_str!("../prompts/cot_better_prompt.txt");
const NEW_IDEA_PROMPT: &str = include_str!("../prompts/new_idea_prompt.txt");

/// Built-in seed-generation prompt styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    #[default]
    Basic,
    #[serde(rename = "cot")]
    ChainOfThought,
    NewIdea,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Basic => "basic",
            PromptMode::ChainOfThought => "cot",
            PromptMode::NewIdea => "new_idea",
        }
    }
}

/// A prompt with `{name}` placeholders. `{{` and `}}` render as literal
/// braces; placeholders without a value are left as they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn builtin(mode: PromptMode) -> Self {
        match mode {
            PromptMode::Basic => Self::new(BASIC_PROMPT),
            PromptMode::ChainOfThought => Self::new(COT_PROMPT),
            PromptMode::NewIdea => Self::new(NEW_IDEA_PROMPT),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template {}", path.display()))?;
        Ok(Self::new(text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn render(&self, vars: &BTreeMap<&str, String>) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('{') {
                if let Some(end) = tail.find('}') {
                    let name = &tail[1..end];
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                        rest = &tail[end + 1..];
                        continue;
                    }
                }
            }
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
        out.push_str(rest);
        out
    }
}

/// What the fuzzer observed for the individual that triggered new coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub logs: String,
    pub test_case: String,
    pub execution_order: String,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            logs: "No logs available".to_string(),
            test_case: String::new(),
            execution_order: "Unknown order".to_string(),
        }
    }
}

impl ExecutionContext {
    pub fn new(
        logs: impl Into<String>,
        test_case: impl Into<String>,
        execution_order: impl Into<String>,
    ) -> Self {
        Self {
            logs: logs.into(),
            test_case: test_case.into(),
            execution_order: execution_order.into(),
        }
    }
}

/// Renders the accumulated reminders as one block of text.
pub fn render_reminders(reminders: &[FeedbackIssue]) -> String {
    reminders
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The user message of a mutation-strategy request.
///
/// `listing` is the state-function listing, e.g.
/// `1:deposit(uint256 amount),2:withdraw(uint256 value)`.
pub fn strategy_prompt(
    context: &ExecutionContext,
    contract_source: &str,
    listing: &str,
    reminders: &[FeedbackIssue],
) -> String {
    let mut prompt = format!(
        "I am fuzzing a smart contract and need to know which parameters of its state functions \
to mutate next, based on the execution below.\n\n\
Execution logs: {logs}\n\
Functions were executed in this order: {order}\n\
Test case that produced this execution: {test_case}\n\n\
Contract:\n{contract_source}\n\n\
Use the exact parameter names of these state functions: {listing}\n\n\
Identify the parameters that are the most promising mutation targets for reaching new \
behaviour. Answer with one JSON object whose keys are function names and whose values are \
lists of parameter names to prioritize. Include every state function; use an empty list when \
none of its parameters look promising.\n\n\
Example:\n\
{{\n  \"transfer\": [\"amount\"],\n  \"approve\": [\"spender\", \"amount\"],\n  \"withdraw\": []\n}}\n",
        logs = context.logs,
        order = context.execution_order,
        test_case = context.test_case,
    );
    if !reminders.is_empty() {
        prompt.push_str(
            "\nIMPORTANT: Your previous response had errors. Please correct them. \
Here are the issues I found: ",
        );
        prompt.push_str(&render_reminders(reminders));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("num_cases", "5".to_string()),
            ("contract", "Token".to_string()),
        ])
    }

    #[test]
    fn renders_placeholders_and_escapes() {
        let template = PromptTemplate::new("make {num_cases} for {contract}: {{\"a\": {unknown}}}");
        assert_eq!(
            template.render(&vars()),
            "make 5 for Token: {\"a\": {unknown}}"
        );
    }

    #[test]
    fn builtin_templates_render_fully() {
        let mut vars = vars();
        vars.insert("abi", "[]".to_string());
        vars.insert("current_time", "1700000000".to_string());
        for mode in [PromptMode::Basic, PromptMode::ChainOfThought, PromptMode::NewIdea] {
            let rendered = PromptTemplate::builtin(mode).render(&vars);
            assert!(rendered.contains("5"));
            assert!(rendered.contains("\"transactions\""));
            assert!(!rendered.contains("{num_cases}"));
            assert!(!rendered.contains("{{"));
        }
    }

    #[test]
    fn strategy_prompt_carries_reminders() {
        let context = ExecutionContext::default();
        let plain = strategy_prompt(&context, "contract A {}", "1:deposit(uint256 amount)", &[]);
        assert!(plain.contains("No logs available"));
        assert!(plain.contains("1:deposit(uint256 amount)"));
        assert!(!plain.contains("IMPORTANT"));

        let reminders = vec![
            FeedbackIssue::MissingFunction {
                function: "deposit".to_string(),
            },
            FeedbackIssue::Incomplete,
        ];
        let retry = strategy_prompt(&context, "contract A {}", "1:deposit(uint256 amount)", &reminders);
        assert!(retry.contains("IMPORTANT: Your previous response had errors."));
        assert!(retry.contains("The function 'deposit' is missing from your JSON response."));
    }
}
