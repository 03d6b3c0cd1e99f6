//! The episode aggregate: world state, turn history, claim ledger.

use super::character::Character;
use super::claim::{Claim, NARRATOR};
use crate::update::AppliedUpdate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors from episode construction and ledger commits.
#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error("duplicate character id `{0}`")]
    DuplicateCharacter(String),

    #[error("claim visible_to references unknown character `{0}`")]
    UnknownCharacter(String),

    #[error("claim visible_to must not be empty")]
    EmptyVisibility,

    #[error("claim ledger conflict: claim id {0} already assigned")]
    ClaimLedgerConflict(u64),
}

/// Shared scene, facts, and history. Owned by the author agent's
/// commit path; characters never mutate it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub scene: String,
    /// Facts with set semantics: append-only, duplicate add is a no-op.
    #[serde(default)]
    pub facts: Vec<String>,
    /// Ordered history log.
    #[serde(default)]
    pub history: Vec<String>,
}

impl WorldState {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            facts: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_facts(mut self, facts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for fact in facts {
            self.add_fact(fact.into());
        }
        self
    }

    pub fn with_history(mut self, history: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.history = history.into_iter().map(Into::into).collect();
        self
    }

    /// Add a fact. Returns false if an identical fact already exists.
    pub fn add_fact(&mut self, fact: impl Into<String>) -> bool {
        let fact = fact.into();
        if self.facts.contains(&fact) {
            return false;
        }
        self.facts.push(fact);
        true
    }

    /// Append a history line.
    pub fn add_history(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
    }
}

/// One atomic simulation step: one speaker, one dialogue/action output,
/// one set of committed state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Sequential from 0, contiguous.
    pub turn_id: u64,
    pub speaker_id: String,
    pub dialogue: String,
    #[serde(default)]
    pub actions: Vec<String>,
    /// The structured diff that was actually applied to the speaker's
    /// state this turn.
    #[serde(default)]
    pub self_updates: AppliedUpdate,
    pub timestamp: DateTime<Utc>,
    /// Error marker for skipped turns (generation failed after all
    /// retries). Such turns carry empty dialogue and no actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Turn {
    /// Record for a turn that could not be generated.
    pub fn skipped(turn_id: u64, speaker_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            turn_id,
            speaker_id: speaker_id.into(),
            dialogue: String::new(),
            actions: Vec::new(),
            self_updates: AppliedUpdate::default(),
            timestamp: Utc::now(),
            error: Some(reason.into()),
        }
    }
}

/// A character's read-only projection of the episode.
///
/// Contains only what the character is entitled to see: the public
/// scene, public world facts, the shared history window, and the
/// claims visible to that character.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldView {
    pub scene: String,
    pub location: String,
    pub facts: Vec<String>,
    pub known_claims: Vec<Claim>,
    pub recent_history: Vec<String>,
}

/// The complete unit of generated dialogue + state + claims for one
/// scenario run.
///
/// Constructed fully formed before simulation starts; the simulator is
/// the sole mutator during a run; frozen and exported afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: String,
    pub title: String,
    pub genre: String,
    pub creation_time: DateTime<Utc>,
    pub characters: Vec<Character>,
    pub world_state: WorldState,
    #[serde(default)]
    pub claim_ledger: Vec<Claim>,
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Next claim id to assign. Serialized so a round-tripped episode
    /// continues the same id sequence.
    #[serde(default)]
    next_claim_id: u64,
}

impl Episode {
    /// Build an episode from its initial characters and world state.
    ///
    /// Character ids must be unique; the simulator and the claim
    /// ledger key on them.
    pub fn new(
        episode_id: impl Into<String>,
        title: impl Into<String>,
        genre: impl Into<String>,
        characters: Vec<Character>,
        world_state: WorldState,
    ) -> Result<Self, EpisodeError> {
        let mut seen = BTreeSet::new();
        for character in &characters {
            if !seen.insert(character.character_id.clone()) {
                return Err(EpisodeError::DuplicateCharacter(
                    character.character_id.clone(),
                ));
            }
        }

        Ok(Self {
            episode_id: episode_id.into(),
            title: title.into(),
            genre: genre.into(),
            creation_time: Utc::now(),
            characters,
            world_state,
            claim_ledger: Vec::new(),
            turns: Vec::new(),
            next_claim_id: 0,
        })
    }

    /// Look up a character by id.
    pub fn character(&self, character_id: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.character_id == character_id)
    }

    /// Mutable character lookup. Restricted to the crate so only the
    /// simulator's commit path can write character state.
    pub(crate) fn character_mut(&mut self, character_id: &str) -> Option<&mut Character> {
        self.characters
            .iter_mut()
            .find(|c| c.character_id == character_id)
    }

    /// All character ids, in episode order.
    pub fn character_ids(&self) -> Vec<String> {
        self.characters
            .iter()
            .map(|c| c.character_id.clone())
            .collect()
    }

    /// Whether the id names a character in this episode.
    pub fn is_known_character(&self, character_id: &str) -> bool {
        self.character(character_id).is_some()
    }

    /// Append a claim to the ledger, assigning the next claim id.
    ///
    /// This is the single id-assignment path. Every member of
    /// `visible_to` must be a known character id or [`NARRATOR`], and
    /// the set must be non-empty.
    pub fn add_claim(
        &mut self,
        text: impl Into<String>,
        kind: impl Into<String>,
        truth_value: Option<bool>,
        visible_to: impl IntoIterator<Item = impl Into<String>>,
        introduced_at_turn: u64,
    ) -> Result<u64, EpisodeError> {
        let visible_to: BTreeSet<String> = visible_to.into_iter().map(Into::into).collect();
        if visible_to.is_empty() {
            return Err(EpisodeError::EmptyVisibility);
        }
        for member in &visible_to {
            if member != NARRATOR && !self.is_known_character(member) {
                return Err(EpisodeError::UnknownCharacter(member.clone()));
            }
        }

        let claim_id = self.next_claim_id;
        // Guards id-assignment consistency; can only trip if the
        // counter was tampered with (e.g. a hand-edited export).
        if self.claim_ledger.iter().any(|c| c.claim_id == claim_id) {
            return Err(EpisodeError::ClaimLedgerConflict(claim_id));
        }

        self.claim_ledger.push(Claim {
            claim_id,
            text: text.into(),
            kind: kind.into(),
            truth_value,
            visible_to,
            introduced_at_turn,
        });
        self.next_claim_id += 1;
        Ok(claim_id)
    }

    /// Claims visible to the given character, in ledger order.
    pub fn claims_visible_to(&self, character_id: &str) -> Vec<&Claim> {
        self.claim_ledger
            .iter()
            .filter(|c| c.is_visible(character_id))
            .collect()
    }

    /// Find a ledger entry with identical text and truth value.
    pub fn find_matching_claim_mut(
        &mut self,
        text: &str,
        truth_value: Option<bool>,
    ) -> Option<&mut Claim> {
        self.claim_ledger
            .iter_mut()
            .find(|c| c.text == text && c.truth_value == truth_value)
    }

    /// Build a character's read-only projection of the world.
    ///
    /// Returns None for an unknown character id.
    pub fn world_view(&self, character_id: &str, history_window: usize) -> Option<WorldView> {
        let character = self.character(character_id)?;
        let history = &self.world_state.history;
        let start = history.len().saturating_sub(history_window);

        Some(WorldView {
            scene: self.world_state.scene.clone(),
            location: character.state.location.clone(),
            facts: self.world_state.facts.clone(),
            known_claims: self
                .claims_visible_to(character_id)
                .into_iter()
                .cloned()
                .collect(),
            recent_history: history[start..].to_vec(),
        })
    }

    /// Serialize to pretty JSON (the structured export format).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from the structured export format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::character::{CharacterProfile, CharacterState};

    fn two_character_episode() -> Episode {
        let alice = Character::new(
            "alice",
            CharacterProfile::new(30, "female", "Irish-American", "detective")
                .with_core_traits(["analytical"]),
            CharacterState::new("focused", "crime_scene"),
        );
        let bob = Character::new(
            "bob",
            CharacterProfile::new(35, "male", "Hispanic", "security_guard"),
            CharacterState::new("alert", "lobby"),
        );
        let world = WorldState::new("INT. APARTMENT - NIGHT")
            .with_facts(["victim found at 21:30", "window is broken"]);

        Episode::new("ep_test", "The Window Mystery", "crime", vec![alice, bob], world).unwrap()
    }

    #[test]
    fn test_duplicate_character_rejected() {
        let profile = CharacterProfile::new(30, "female", "x", "y");
        let state = CharacterState::new("calm", "here");
        let result = Episode::new(
            "ep",
            "t",
            "g",
            vec![
                Character::new("alice", profile.clone(), state.clone()),
                Character::new("alice", profile, state),
            ],
            WorldState::new("scene"),
        );
        assert!(matches!(result, Err(EpisodeError::DuplicateCharacter(_))));
    }

    #[test]
    fn test_add_claim_assigns_increasing_ids() {
        let mut episode = two_character_episode();
        let a = episode
            .add_claim("claim one", "event", Some(true), ["alice"], 0)
            .unwrap();
        let b = episode
            .add_claim("claim two", "belief", None, ["bob", NARRATOR], 1)
            .unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(episode.claim_ledger.len(), 2);
    }

    #[test]
    fn test_add_claim_validates_visibility() {
        let mut episode = two_character_episode();

        let unknown = episode.add_claim("c", "event", Some(true), ["mallory"], 0);
        assert!(matches!(unknown, Err(EpisodeError::UnknownCharacter(_))));

        let empty = episode.add_claim("c", "event", Some(true), Vec::<String>::new(), 0);
        assert!(matches!(empty, Err(EpisodeError::EmptyVisibility)));

        // Nothing committed by the failed attempts.
        assert!(episode.claim_ledger.is_empty());
    }

    #[test]
    fn test_claim_ledger_conflict_guard() {
        let mut episode = two_character_episode();
        episode
            .add_claim("original", "event", Some(true), ["alice"], 0)
            .unwrap();

        // Simulate a tampered export: rewind the counter and round-trip.
        let mut json: serde_json::Value =
            serde_json::from_str(&episode.to_json().unwrap()).unwrap();
        json["next_claim_id"] = serde_json::json!(0);
        let mut tampered = Episode::from_json(&json.to_string()).unwrap();

        let conflict = tampered.add_claim("another", "event", Some(true), ["alice"], 1);
        assert!(matches!(conflict, Err(EpisodeError::ClaimLedgerConflict(0))));
    }

    #[test]
    fn test_world_facts_set_semantics() {
        let mut world = WorldState::new("scene");
        assert!(world.add_fact("the door is locked"));
        assert!(!world.add_fact("the door is locked"));
        assert_eq!(world.facts.len(), 1);
    }

    #[test]
    fn test_world_view_filters_claims() {
        let mut episode = two_character_episode();
        episode
            .add_claim("alice-only", "evidence", Some(true), ["alice"], 0)
            .unwrap();
        episode
            .add_claim("narrator-only", "hypothesis", Some(false), [NARRATOR], 0)
            .unwrap();
        episode.world_state.add_history("police arrived");
        episode.world_state.add_history("witnesses gathered");

        let view = episode.world_view("alice", 1).unwrap();
        assert_eq!(view.known_claims.len(), 1);
        assert_eq!(view.known_claims[0].text, "alice-only");
        assert_eq!(view.recent_history, vec!["witnesses gathered"]);
        assert_eq!(view.location, "crime_scene");

        let view = episode.world_view("bob", 10).unwrap();
        assert!(view.known_claims.is_empty());
        assert_eq!(view.recent_history.len(), 2);

        assert!(episode.world_view("mallory", 1).is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let mut episode = two_character_episode();
        episode
            .add_claim("Victim knew their killer", "hypothesis", Some(true), ["alice"], 0)
            .unwrap();
        episode.turns.push(Turn::skipped(0, "alice", "backend offline"));

        let json = episode.to_json().unwrap();
        let restored = Episode::from_json(&json).unwrap();
        assert_eq!(episode, restored);

        // Id assignment continues where the original left off.
        let mut restored = restored;
        let next = restored
            .add_claim("follow-up", "evidence", None, ["bob"], 1)
            .unwrap();
        assert_eq!(next, 1);
    }
}
