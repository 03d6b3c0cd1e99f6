//! Author agent: owns world-state mutation and the claim ledger.
//!
//! The author observes each committed character turn, decides which
//! facts became newly known and to whom, and commits validated claims
//! with normalized visibility.

use super::{extract_json_object, prompts, AgentError, TurnProposal};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::model::{Episode, EpisodeError, NARRATOR};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// A claim as drafted by the generation backend, before visibility
/// normalization and deduplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimDraft {
    pub text: String,
    pub kind: String,
    pub truth_value: Option<bool>,
    /// May be empty or reference unknown ids; the commit path
    /// normalizes.
    pub visible_to: Vec<String>,
}

/// The author's decision for one observed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorDecision {
    /// World facts to add (set semantics; duplicates are no-ops).
    pub facts_add: Vec<String>,
    /// History lines to append.
    pub history_add: Vec<String>,
    pub new_claims: Vec<ClaimDraft>,
    /// Boundary-validation warnings collected while parsing.
    pub warnings: Vec<String>,
}

/// What a committed author decision actually changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub facts_added: Vec<String>,
    pub history_added: Vec<String>,
    /// Ids of claims newly appended to the ledger.
    pub claim_ids: Vec<u64>,
    /// Ids of existing claims whose visibility was extended instead of
    /// duplicating the entry.
    pub claims_extended: Vec<u64>,
    pub warnings: Vec<String>,
}

/// Agent that narrates the omniscient record.
pub struct AuthorAgent {
    backend: Arc<dyn GenerationBackend>,
    max_retries: u32,
}

impl AuthorAgent {
    pub fn new(backend: Arc<dyn GenerationBackend>, max_retries: u32) -> Self {
        Self {
            backend,
            max_retries,
        }
    }

    /// Observe a committed character turn and decide world-state
    /// changes and new claims.
    pub async fn observe_turn(
        &self,
        episode: &Episode,
        proposal: &TurnProposal,
        speaker_id: &str,
        recent_dialogue: &str,
    ) -> Result<AuthorDecision, AgentError> {
        let attempts = self.max_retries + 1;
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            let strict = attempt > 0;
            let request = GenerationRequest::new(
                prompts::author_system_prompt(episode, recent_dialogue, strict),
                prompts::author_user_prompt(speaker_id, &proposal.dialogue, &proposal.actions),
            );
            let request = if strict { request.strict() } else { request };

            let raw = match self.backend.generate(request).await {
                Ok(raw) => raw,
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(speaker_id, attempt, error = %last_reason, "author generation request failed");
                    continue;
                }
            };

            match extract_json_object(&raw) {
                Some(value) => return Ok(parse_decision(&value)),
                None => {
                    last_reason = "response is not a JSON object".to_string();
                    warn!(speaker_id, attempt, "unparsable author response, retrying with strict format");
                }
            }
        }

        Err(AgentError::Exhausted {
            attempts,
            reason: last_reason,
        })
    }

    /// Commit an author decision to the episode.
    ///
    /// This is the single mutation path for world state and the claim
    /// ledger during a run. `dialogue_spoken` widens default claim
    /// visibility to everyone in the scene.
    pub fn commit_decision(
        episode: &mut Episode,
        decision: &AuthorDecision,
        speaker_id: &str,
        turn_id: u64,
        dialogue_spoken: bool,
    ) -> Result<CommitOutcome, EpisodeError> {
        let mut outcome = CommitOutcome {
            warnings: decision.warnings.clone(),
            ..Default::default()
        };

        for fact in &decision.facts_add {
            if episode.world_state.add_fact(fact.clone()) {
                outcome.facts_added.push(fact.clone());
            }
        }
        for line in &decision.history_add {
            episode.world_state.add_history(line.clone());
            outcome.history_added.push(line.clone());
        }

        for draft in &decision.new_claims {
            if draft.text.trim().is_empty() {
                outcome
                    .warnings
                    .push("dropped claim with empty text".to_string());
                continue;
            }

            let (visible_to, mut vis_warnings) =
                normalize_visibility(episode, &draft.visible_to, speaker_id, dialogue_spoken);
            outcome.warnings.append(&mut vis_warnings);

            // Exact-text dedup: extend visibility instead of creating
            // a duplicate claim id.
            if let Some(existing) = episode.find_matching_claim_mut(&draft.text, draft.truth_value)
            {
                for member in visible_to {
                    existing.grant_visibility(member);
                }
                outcome.claims_extended.push(existing.claim_id);
                continue;
            }

            let claim_id = episode.add_claim(
                draft.text.clone(),
                draft.kind.clone(),
                draft.truth_value,
                visible_to,
                turn_id,
            )?;
            outcome.claim_ids.push(claim_id);
        }

        Ok(outcome)
    }
}

/// Normalize a drafted visibility list against the episode's cast.
///
/// Unknown ids are dropped with a warning. A narrator-only draft stays
/// narrator-only. An empty result defaults to everyone in the scene
/// when the line was spoken aloud, otherwise to the speaker; the
/// speaker is always included in non-narrator-only claims.
fn normalize_visibility(
    episode: &Episode,
    drafted: &[String],
    speaker_id: &str,
    dialogue_spoken: bool,
) -> (BTreeSet<String>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut visible_to = BTreeSet::new();

    for member in drafted {
        if member == NARRATOR || episode.is_known_character(member) {
            visible_to.insert(member.clone());
        } else {
            warnings.push(format!(
                "dropped unknown character `{member}` from claim visibility"
            ));
        }
    }

    if visible_to.len() == 1 && visible_to.contains(NARRATOR) {
        return (visible_to, warnings);
    }

    if visible_to.is_empty() {
        if dialogue_spoken {
            visible_to.extend(episode.character_ids());
        } else {
            visible_to.insert(speaker_id.to_string());
        }
    } else {
        visible_to.insert(speaker_id.to_string());
    }

    (visible_to, warnings)
}

/// Normalize a parsed JSON object into an AuthorDecision.
fn parse_decision(value: &Value) -> AuthorDecision {
    let mut decision = AuthorDecision::default();

    decision.facts_add = parse_strings(value.get("facts_add"), "facts_add", &mut decision.warnings);
    decision.history_add = parse_strings(
        value.get("history_add"),
        "history_add",
        &mut decision.warnings,
    );

    match value.get("new_claims") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                match parse_claim_draft(item) {
                    Some(draft) => decision.new_claims.push(draft),
                    None => decision
                        .warnings
                        .push("dropped malformed entry in `new_claims`".to_string()),
                }
            }
        }
        Some(_) => decision
            .warnings
            .push("ignored non-array `new_claims`".to_string()),
    }

    decision
}

fn parse_claim_draft(value: &Value) -> Option<ClaimDraft> {
    let object = value.as_object()?;
    let text = object.get("text")?.as_str()?.trim().to_string();

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("event")
        .to_string();

    let truth_value = match object.get("truth_value") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return None,
    };

    let visible_to = match object.get("visible_to") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => return None,
    };

    Some(ClaimDraft {
        text,
        kind,
        truth_value,
        visible_to,
    })
}

fn parse_strings(value: Option<&Value>, field: &str, warnings: &mut Vec<String>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut strings = Vec::new();
            for item in items {
                match item.as_str() {
                    Some(s) if !s.trim().is_empty() => strings.push(s.trim().to_string()),
                    _ => warnings.push(format!("ignored non-string entry in `{field}`")),
                }
            }
            strings
        }
        Some(_) => {
            warnings.push(format!("ignored non-array `{field}`"));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Character, CharacterProfile, CharacterState, WorldState};
    use serde_json::json;

    fn episode() -> Episode {
        let alice = Character::new(
            "alice",
            CharacterProfile::new(30, "female", "Irish-American", "detective"),
            CharacterState::new("focused", "crime_scene"),
        );
        let bob = Character::new(
            "bob",
            CharacterProfile::new(35, "male", "Hispanic", "security_guard"),
            CharacterState::new("alert", "lobby"),
        );
        Episode::new(
            "ep",
            "The Window Mystery",
            "crime",
            vec![alice, bob],
            WorldState::new("INT. APARTMENT - NIGHT"),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_decision() {
        let decision = parse_decision(&json!({
            "facts_add": ["the window was forced"],
            "history_add": ["alice examined the window"],
            "new_claims": [
                {"text": "the window was forced", "type": "evidence", "truth_value": true, "visible_to": ["alice"]},
                {"bogus": true}
            ]
        }));

        assert_eq!(decision.facts_add.len(), 1);
        assert_eq!(decision.new_claims.len(), 1);
        assert_eq!(decision.new_claims[0].kind, "evidence");
        assert_eq!(decision.warnings.len(), 1);
    }

    #[test]
    fn test_visibility_unknown_ids_dropped() {
        let episode = episode();
        let (visible_to, warnings) = normalize_visibility(
            &episode,
            &["alice".to_string(), "mallory".to_string()],
            "bob",
            false,
        );

        assert!(visible_to.contains("alice"));
        assert!(!visible_to.contains("mallory"));
        // Speaker always included in non-narrator-only claims.
        assert!(visible_to.contains("bob"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_visibility_defaults() {
        let episode = episode();

        // Silent turn: private to the speaker.
        let (visible_to, _) = normalize_visibility(&episode, &[], "alice", false);
        assert_eq!(visible_to.len(), 1);
        assert!(visible_to.contains("alice"));

        // Spoken aloud: everyone in the scene.
        let (visible_to, _) = normalize_visibility(&episode, &[], "alice", true);
        assert_eq!(visible_to.len(), 2);
        assert!(visible_to.contains("bob"));
    }

    #[test]
    fn test_visibility_narrator_only_preserved() {
        let episode = episode();
        let (visible_to, warnings) =
            normalize_visibility(&episode, &[NARRATOR.to_string()], "alice", true);

        assert_eq!(visible_to.len(), 1);
        assert!(visible_to.contains(NARRATOR));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_commit_dedup_extends_visibility() {
        let mut episode = episode();
        episode
            .add_claim("the door was unlocked", "evidence", Some(true), ["alice"], 0)
            .unwrap();

        let decision = AuthorDecision {
            new_claims: vec![ClaimDraft {
                text: "the door was unlocked".to_string(),
                kind: "evidence".to_string(),
                truth_value: Some(true),
                visible_to: vec!["bob".to_string()],
            }],
            ..Default::default()
        };

        let outcome =
            AuthorAgent::commit_decision(&mut episode, &decision, "bob", 1, false).unwrap();

        assert_eq!(episode.claim_ledger.len(), 1);
        assert!(outcome.claim_ids.is_empty());
        assert_eq!(outcome.claims_extended, vec![0]);
        assert!(episode.claim_ledger[0].is_visible("bob"));
        assert!(episode.claim_ledger[0].is_visible("alice"));
    }

    #[test]
    fn test_commit_different_truth_value_appends_new_claim() {
        let mut episode = episode();
        episode
            .add_claim("the butler did it", "hypothesis", Some(true), ["alice"], 0)
            .unwrap();

        let decision = AuthorDecision {
            new_claims: vec![ClaimDraft {
                text: "the butler did it".to_string(),
                kind: "hypothesis".to_string(),
                truth_value: Some(false),
                visible_to: vec!["bob".to_string()],
            }],
            ..Default::default()
        };

        let outcome =
            AuthorAgent::commit_decision(&mut episode, &decision, "bob", 1, false).unwrap();

        // Contradictory claims are both preserved.
        assert_eq!(episode.claim_ledger.len(), 2);
        assert_eq!(outcome.claim_ids, vec![1]);
    }

    #[test]
    fn test_commit_facts_are_set_like() {
        let mut episode = episode();
        episode.world_state.add_fact("the lights are out");

        let decision = AuthorDecision {
            facts_add: vec![
                "the lights are out".to_string(),
                "a storm is coming".to_string(),
            ],
            history_add: vec!["thunder rolls".to_string()],
            ..Default::default()
        };

        let outcome =
            AuthorAgent::commit_decision(&mut episode, &decision, "alice", 0, true).unwrap();

        assert_eq!(outcome.facts_added, vec!["a storm is coming"]);
        assert_eq!(episode.world_state.facts.len(), 2);
        assert_eq!(episode.world_state.history, vec!["thunder rolls"]);
    }
}
