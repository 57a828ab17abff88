//! System prompt advertising the available tools.

use std::collections::HashMap;

use tracing::trace;

use crate::template::{PromptTemplate, TemplateResult};

/// Placeholder replaced by the rendered tool signatures.
pub const FUNCTIONS_SCHEMA_VAR: &str = "functions_schema";

/// Default instructions: answer with Python-style calls to the listed tools.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert AI assistant that specializes in providing Python code to solve the task/problem at hand provided by the user.

You can use Python code freely, including the following available functions:

<|functions_schema|>
{{functions_schema}}
<|end_functions_schema|>

The following dangerous builtins are restricted for security:
- exec
- eval
- execfile
- compile
- importlib
- input
- exit

Think step by step and provide your reasoning, outside of the function calls.
You can write Python code and use the available functions. Provide all your python code in a SINGLE markdown code block like the following:

```python
result = example_function(arg1="value1", arg2=2)
other = another_function(result)
```

Assign each call you need to reuse to a variable, and pass that variable as an argument to later calls.
Call only the functions listed above. Do NOT use print() and do NOT define new functions.
If none of the functions can help, answer in plain text without a code block."#;

/// The system message sent ahead of every conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    template: PromptTemplate,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl SystemPrompt {
    /// Creates a system prompt from custom text. The text should contain a
    /// `{{functions_schema}}` placeholder, otherwise the model never sees the
    /// tool list.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            template: PromptTemplate::new(text).with_required_variable(FUNCTIONS_SCHEMA_VAR),
        }
    }

    /// Returns whether the prompt lists tools anywhere.
    #[must_use]
    pub fn advertises_tools(&self) -> bool {
        self.template.placeholders().contains(&FUNCTIONS_SCHEMA_VAR)
    }

    /// Renders the prompt with one signature block per tool.
    ///
    /// # Errors
    ///
    /// Propagates template rendering errors.
    pub fn render(&self, signatures: &[String]) -> TemplateResult<String> {
        let mut vars = HashMap::new();
        vars.insert(FUNCTIONS_SCHEMA_VAR, signatures.join("\n\n"));
        trace!(tools = signatures.len(), "rendering system prompt");
        self.template.render_with(&vars)
    }
}
