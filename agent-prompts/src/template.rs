//! Prompt templates with `{{variable}}` substitution.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A required variable was not provided.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },
}

/// A prompt template. Placeholders are written `{{name}}`; whitespace inside
/// the braces is ignored. Placeholders without a value render as empty text
/// unless declared required.
///
/// # Examples
///
/// ```
/// use agent_prompts::template::PromptTemplate;
///
/// let template = PromptTemplate::new("You are {{ role }}.").with_variable("role", "terse");
/// assert_eq!(template.render().unwrap(), "You are terse.");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    #[serde(default)]
    variables: HashMap<String, String>,
    #[serde(default)]
    required: Vec<String>,
}

impl PromptTemplate {
    /// Creates a new template with the supplied text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: HashMap::new(),
            required: Vec::new(),
        }
    }

    /// Sets a default value for a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Declares a variable that must have a value at render time.
    #[must_use]
    pub fn with_required_variable(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Returns the placeholder names in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in segments(&self.template) {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Renders the template with its default variables.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a required variable is not set.
    pub fn render(&self) -> TemplateResult<String> {
        self.render_with(&HashMap::new())
    }

    /// Renders the template; `overrides` take precedence over defaults.
    ///
    /// Substitution is a single pass, so values containing `{{...}}` are
    /// inserted verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a required variable is not set.
    pub fn render_with(&self, overrides: &HashMap<&str, String>) -> TemplateResult<String> {
        for name in &self.required {
            if !overrides.contains_key(name.as_str()) && !self.variables.contains_key(name) {
                return Err(TemplateError::MissingVariable { name: name.clone() });
            }
        }

        let mut out = String::with_capacity(self.template.len());
        for segment in segments(&self.template) {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = overrides
                        .get(name)
                        .or_else(|| self.variables.get(name))
                        .map_or("", String::as_str);
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Splits a template into literal text and placeholders. An opening `{{`
/// without a matching `}}` is kept as text.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            out.push(Segment::Text(&rest[..open]));
        }
        let name = rest[open + 2..open + 2 + close].trim();
        out.push(Segment::Placeholder(name));
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}
