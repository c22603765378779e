//! Prompt builder for assembling the chat sent to the generation backend.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use ark_core::{AppError, AppResult};
use ark_llm::ChatMessage;
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build the chat prompt for a grounded answer.
///
/// The result is the definition's system instruction, then `history` in
/// order, then one user turn rendered from the template with the question
/// and the snippets joined by blank lines.
///
/// # Example
/// ```no_run
/// use ark_prompt::{build_chat_prompt, PromptDefinition};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = PromptDefinition::default();
/// let snippets = vec!["Rust is a systems language.".to_string()];
/// let built = build_chat_prompt(&def, "What is Rust?", &[], &snippets)?;
/// assert_eq!(built.messages.len(), 2);
/// # Ok(())
/// # }
/// ```
pub fn build_chat_prompt(
    definition: &PromptDefinition,
    question: &str,
    history: &[ChatMessage],
    snippets: &[String],
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        "Building prompt {} with {} history messages and {} snippets",
        definition.id,
        history.len(),
        snippets.len()
    );

    let mut variables = HashMap::new();
    variables.insert("question", question.to_string());
    variables.insert("context", snippets.join("\n\n"));

    let user_turn = render_template(&definition.template, &variables)?;

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(definition.system.clone()));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(user_turn));

    Ok(BuiltPrompt {
        messages,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            history_messages: history.len(),
            snippet_count: snippets.len(),
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<&str, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
