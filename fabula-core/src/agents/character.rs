//! Character agent: proposes one turn of dialogue, actions, and a
//! self-update.

use super::{extract_json_object, prompts, AgentError};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::model::{Character, WorldView};
use crate::update::SelfUpdate;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// One proposed turn, validated and normalized from backend output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnProposal {
    pub dialogue: String,
    pub actions: Vec<String>,
    pub self_update: SelfUpdate,
    /// Boundary-validation warnings collected while parsing.
    pub warnings: Vec<String>,
}

/// Agent that speaks for one character per turn.
pub struct CharacterAgent {
    backend: Arc<dyn GenerationBackend>,
    /// Additional attempts after the first, with the strict formatting
    /// instruction.
    max_retries: u32,
}

impl CharacterAgent {
    pub fn new(backend: Arc<dyn GenerationBackend>, max_retries: u32) -> Self {
        Self {
            backend,
            max_retries,
        }
    }

    /// Request a turn proposal for the given character.
    ///
    /// The character sees only its own profile and state, its world
    /// view projection, and the recent dialogue window. Unparsable
    /// responses are retried up to the bound with a stricter format
    /// instruction; exhausting retries is a recoverable failure the
    /// simulator turns into a skipped turn.
    pub async fn propose_turn(
        &self,
        character: &Character,
        view: &WorldView,
        recent_dialogue: &str,
    ) -> Result<TurnProposal, AgentError> {
        let attempts = self.max_retries + 1;
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            let strict = attempt > 0;
            let request = GenerationRequest::new(
                prompts::character_system_prompt(character, view, recent_dialogue, strict),
                prompts::character_user_prompt(),
            );
            let request = if strict { request.strict() } else { request };

            let raw = match self.backend.generate(request).await {
                Ok(raw) => raw,
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(
                        character_id = %character.character_id,
                        attempt,
                        error = %last_reason,
                        "character generation request failed"
                    );
                    continue;
                }
            };

            match extract_json_object(&raw) {
                Some(value) => return Ok(parse_proposal(&value)),
                None => {
                    last_reason = "response is not a JSON object".to_string();
                    warn!(
                        character_id = %character.character_id,
                        attempt,
                        "unparsable character response, retrying with strict format"
                    );
                }
            }
        }

        Err(AgentError::Exhausted {
            attempts,
            reason: last_reason,
        })
    }
}

/// Normalize a parsed JSON object into a TurnProposal.
fn parse_proposal(value: &Value) -> TurnProposal {
    let mut warnings = Vec::new();

    let dialogue = match value.get("dialogue") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => {
            warnings.push("ignored non-string `dialogue`".to_string());
            String::new()
        }
    };

    let actions = match value.get("actions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut actions = Vec::new();
            for item in items {
                match item.as_str() {
                    Some(s) if !s.trim().is_empty() => actions.push(s.trim().to_string()),
                    _ => warnings.push("ignored non-string entry in `actions`".to_string()),
                }
            }
            actions
        }
        Some(_) => {
            warnings.push("ignored non-array `actions`".to_string());
            Vec::new()
        }
    };

    let (self_update, update_warnings) =
        SelfUpdate::from_value(value.get("self_updates").unwrap_or(&Value::Null));
    warnings.extend(update_warnings);

    TurnProposal {
        dialogue,
        actions,
        self_update,
        warnings,
    }
}
