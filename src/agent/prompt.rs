//! System prompt templates for the agent.

use crate::tools::ToolDescriptor;

/// Task used when none is configured.
pub const DEFAULT_TASK: &str = "\
You are an agricultural research assistant. I am researching the impact of climate change on crop yields.
I need you to help me analyze some research data stored in the file system.

Please first list the files in the `fs://data/` directory,
Then you must read the file `README.txt` to understand the data,
then read the necessary CSV files, and summarize the main findings.
";

/// Think/act/observe instructions. `{tool_desc}` and `{tool_names}` are
/// filled in by [`build_system_prompt`].
pub const REACT_TEMPLATE: &str = r#"You are designed to help with a variety of tasks, from answering questions to summarizing data to other kinds of analysis.

## Tools

You have access to a set of tools. You decide which of them to use and in which order to complete the task. This may mean breaking the task into smaller steps and using a different tool for each one.

You have access to the following tools:
{tool_desc}

## Output Format

Please answer using the following format:

```
Thought: I need to use a tool to help me answer the question.
Action: tool name (one of {tool_names}) if using a tool.
Action Input: the input to the tool, as a JSON object, e.g. {"path": "data/"}
```

Always start with a Thought.

The Action Input MUST be a valid JSON object. Do NOT write {'path': 'data/'} with single quotes.

When you use this format, the system will reply with:

```
Observation: tool response
```

Repeat the format above until you have enough information to answer the question without using any more tools. At that point you MUST reply in one of the following two formats:

```
Thought: I can answer without using any more tools.
Answer: [your answer here]
```

```
Thought: I cannot answer the question with the provided tools.
Answer: [your answer here]
```

## Current Conversation

Below is the current conversation, made of interleaved user and assistant messages.
"#;

/// Render the tool list section of the prompt.
pub fn render_tools(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .map(|t| {
            format!(
                "> Tool Name: {}\nTool Description: {}\nTool Args: {}\n",
                t.name, t.description, t.parameter_schema
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the system prompt: task description followed by the template with
/// the tool vocabulary substituted in.
///
/// Substitution is single-pass, so placeholder-looking text inside tool
/// descriptions is left alone.
pub fn build_system_prompt(task: &str, tools: &[ToolDescriptor], template: &str) -> String {
    let tool_desc = render_tools(tools);
    let tool_names = tools
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let body = template
        .split("{tool_desc}")
        .map(|part| part.replace("{tool_names}", &tool_names))
        .collect::<Vec<_>>()
        .join(&tool_desc);

    format!("{}\n{}", task, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "list_directory".to_string(),
                description: "List a directory".to_string(),
                parameter_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
            },
            ToolDescriptor {
                name: "read_file".to_string(),
                description: "Read a file, see {tool_names}".to_string(),
                parameter_schema: json!({"type": "object"}),
            },
        ]
    }

    #[test]
    fn formatting_is_idempotent() {
        let first = build_system_prompt(DEFAULT_TASK, &tools(), REACT_TEMPLATE);
        let second = build_system_prompt(DEFAULT_TASK, &tools(), REACT_TEMPLATE);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn prompt_starts_with_task_and_lists_every_tool() {
        let prompt = build_system_prompt("Be helpful.", &tools(), REACT_TEMPLATE);
        assert!(prompt.starts_with("Be helpful.\nYou are designed"));
        assert!(prompt.contains("> Tool Name: list_directory\nTool Description: List a directory\n"));
        assert!(prompt.contains(r#"Tool Args: {"properties":{"path":{"type":"string"}},"type":"object"}"#));
        assert!(prompt.contains("(one of list_directory, read_file)"));
        assert!(!prompt.contains("{tool_desc}"));
    }

    #[test]
    fn placeholders_inside_descriptions_are_not_expanded() {
        let prompt = build_system_prompt("t", &tools(), "{tool_desc}|{tool_names}");
        assert!(prompt.contains("Read a file, see {tool_names}"));
        assert!(prompt.ends_with("|list_directory, read_file"));
    }

    #[test]
    fn empty_tool_list_still_formats() {
        let prompt = build_system_prompt("t", &[], "[{tool_desc}] [{tool_names}]");
        assert_eq!(prompt, "t\n[] []");
    }
}
