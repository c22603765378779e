//! Prompt types for Ark Study.
//!
//! This module defines the domain entities for the prompt system.

use ark_llm::ChatMessage;
use serde::{Deserialize, Serialize};

/// Identifier of the built-in answer prompt.
pub const DEFAULT_ASK_PROMPT_ID: &str = "rag.ask.default";

const DEFAULT_SYSTEM: &str =
    "You are a helpful study assistant. Answer concisely using the provided context.";
const DEFAULT_TEMPLATE: &str = "Question: {{question}}\n\nContext:\n{{context}}";

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,

    /// Fixed system instruction
    pub system: String,

    /// Final user turn with Handlebars syntax.
    ///
    /// Available variables: `question`, `context`.
    pub template: String,
}

fn default_api_version() -> String {
    "1.0".to_string()
}

impl Default for PromptDefinition {
    fn default() -> Self {
        Self {
            id: DEFAULT_ASK_PROMPT_ID.to_string(),
            title: "Grounded answer".to_string(),
            api_version: default_api_version(),
            system: DEFAULT_SYSTEM.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message, prior turns, then the final user turn
    pub messages: Vec<ChatMessage>,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Number of prior conversation messages included
    #[serde(rename = "historyMessages")]
    pub history_messages: usize,

    /// Number of retrieved snippets embedded in the final turn
    #[serde(rename = "snippetCount")]
    pub snippet_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: test.prompt
title: Test Prompt
system: "Be terse."
template: "Q: {{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "test.prompt");
        assert_eq!(def.api_version, "1.0");
        assert_eq!(def.system, "Be terse.");
    }

    #[test]
    fn test_default_definition() {
        let def = PromptDefinition::default();
        assert_eq!(def.id, DEFAULT_ASK_PROMPT_ID);
        assert!(def.template.contains("{{question}}"));
        assert!(def.template.contains("{{context}}"));
    }
}
