//! Persona enhancement
//!
//! Asks a text backend to rewrite a Gem's name and instructions into a
//! more specific persona. The model must answer with a JSON object holding
//! `name` and `instructions`; code fences around it are tolerated.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GenerationError;
use crate::generation::TextBackend;

/// Rewritten persona as returned by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancedGem {
    pub name: String,
    pub instructions: String,
}

fn enhance_prompt(name: &str, instructions: &str) -> String {
    format!(
        "You are an expert AI Persona Designer. Your goal is to take a rough draft of a persona's name \
and system instructions and enhance them to be more effective, detailed, and engaging.\n\n\
Current Name: {name}\n\
Current Instructions: {instructions}\n\n\
Please analyze the intent of the persona and rewrite the System Instructions to be:\n\
1. More specific about tone, style, and behavior.\n\
2. Clearer about constraints and rules.\n\
3. More conducive to generating high-quality social media content.\n\n\
Also, suggest a better Name if the current one is generic.\n\n\
Return the result as a JSON object with the keys \"name\" and \"instructions\". \
Do not include markdown formatting. Just the raw JSON string."
    )
}

/// Enhance a persona draft
///
/// # Errors
///
/// `Enhance` if the backend call fails, `MalformedResponse` if the reply
/// is not the expected JSON object.
pub async fn enhance_persona(
    backend: &dyn TextBackend,
    name: &str,
    instructions: &str,
) -> Result<EnhancedGem, GenerationError> {
    let text = backend
        .invoke(None, &enhance_prompt(name, instructions), &[])
        .await
        .map_err(GenerationError::Enhance)?;

    parse_enhanced(&text).inspect_err(|_| warn!("Failed to parse enhanced persona: {}", text))
}

/// Parse the model reply, stripping any markdown fences
pub fn parse_enhanced(text: &str) -> Result<EnhancedGem, GenerationError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let enhanced: EnhancedGem = serde_json::from_str(cleaned.trim())
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    if enhanced.instructions.trim().is_empty() {
        return Err(GenerationError::MalformedResponse(
            "enhanced instructions are empty".to_string(),
        ));
    }

    Ok(enhanced)
}
