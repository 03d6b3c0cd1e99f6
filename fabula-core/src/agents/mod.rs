//! Character and author agents.
//!
//! Both agents follow the same shape: render a prompt, call the
//! generation backend, parse the returned text into a structured
//! decision, and retry with a stricter formatting instruction when the
//! response does not parse. Exhausted retries are a recoverable
//! condition surfaced to the simulator, never an episode abort.

mod author;
mod character;
pub(crate) mod prompts;

pub use author::{AuthorAgent, AuthorDecision, ClaimDraft, CommitOutcome};
pub use character::{CharacterAgent, TurnProposal};

use crate::backend::BackendError;
use serde_json::Value;
use thiserror::Error;

/// Errors from agent turn generation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Recoverable: the backend never produced a parsable structured
    /// response within the retry bound.
    #[error("turn generation failed after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

/// Extract the first JSON object from raw model output.
///
/// Tolerates markdown code fences and prose before or after the
/// object. Returns None when no parsable object is present.
pub(crate) fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    // Fenced block, e.g. ```json ... ```
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_tag = after_fence
            .strip_prefix("json")
            .unwrap_or(after_fence)
            .trim_start();
        if let Some(end) = after_tag.find("```") {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(after_tag[..end].trim()) {
                return Some(value);
            }
        }
    }

    // Widest brace span.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let value = extract_json_object(r#"{"dialogue": "hello"}"#).unwrap();
        assert_eq!(value["dialogue"], "hello");
    }

    #[test]
    fn test_extract_fenced_object() {
        let text = "Here is my response:\n```json\n{\"dialogue\": \"hi\"}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["dialogue"], "hi");
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "Sure! {\"actions\": [\"wave\"]} hope that helps";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["actions"][0], "wave");
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{broken").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
