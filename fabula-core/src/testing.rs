//! Test doubles and fixtures for exercising the engine without a live
//! generation API.

use crate::backend::{BackendError, GenerationBackend, GenerationRequest};
use crate::model::{
    Character, CharacterProfile, CharacterState, Episode, WorldState, NARRATOR,
};
use crate::simulator::{EpisodeSimulator, SimulationError, SimulationResult, SimulatorConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Scripted generation backend.
///
/// Replies are consumed in push order; once the queue is exhausted,
/// every call returns `"{}"`, which parses as an empty proposal or
/// decision.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<usize>,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful raw-text reply.
    pub fn push_text(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(text.into()));
    }

    /// Queue a backend failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(message.into()));
    }

    /// Number of generate calls received so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// The most recent request, if any call was made.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        *self.calls.lock().unwrap() += 1;
        *self.last_request.lock().unwrap() = Some(request);

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(BackendError::Provider(message)),
            None => Ok("{}".to_string()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A two-character murder-mystery episode used across the test suite.
pub fn sample_episode() -> Episode {
    let alice = Character::new(
        "alice",
        CharacterProfile::new(34, "female", "Irish-American", "homicide detective")
            .with_core_traits(["analytical", "persistent"])
            .with_lt_memory(["solved the harbor case alone"]),
        CharacterState::new("focused", "crime_scene")
            .with_goals(["identify the killer"]),
    );
    let bob = Character::new(
        "bob",
        CharacterProfile::new(51, "male", "Hispanic", "night guard")
            .with_core_traits(["cautious"]),
        CharacterState::new("nervous", "crime_scene"),
    );

    let episode = Episode::new(
        Uuid::new_v4().to_string(),
        "The Locked Apartment",
        "mystery",
        vec![alice, bob],
        WorldState::new("INT. APARTMENT - NIGHT")
            .with_facts(["the front door was locked from inside"]),
    );
    match episode {
        Ok(episode) => episode,
        Err(e) => panic!("sample episode must construct: {e}"),
    }
}

/// Drives full simulations against a scripted backend.
///
/// Each committed turn consumes two backend replies: the character
/// proposal, then the author decision. Push them as pairs in speaker
/// order.
pub struct TestHarness {
    backend: Arc<MockBackend>,
    config: SimulatorConfig,
}

impl TestHarness {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            backend: Arc::new(MockBackend::new()),
            config,
        }
    }

    pub fn backend(&self) -> Arc<MockBackend> {
        self.backend.clone()
    }

    /// Queue one turn: the character's proposal and the author's
    /// decision, as raw JSON text.
    pub fn push_turn(&self, character_reply: &str, author_reply: &str) {
        self.backend.push_text(character_reply);
        self.backend.push_text(author_reply);
    }

    /// Build a simulator wired to the scripted backend.
    pub fn simulator(&self) -> EpisodeSimulator {
        EpisodeSimulator::new(self.backend.clone(), self.config.clone())
    }

    /// Run one full simulation of the episode.
    pub async fn run(&self, episode: Episode) -> Result<SimulationResult, SimulationError> {
        self.simulator().simulate_episode(episode).await
    }
}

/// Assert turn ids are 0-based and contiguous.
#[track_caller]
pub fn assert_contiguous_turns(episode: &Episode) {
    for (index, turn) in episode.turns.iter().enumerate() {
        assert_eq!(
            turn.turn_id, index as u64,
            "turn at position {index} has id {}",
            turn.turn_id
        );
    }
}

/// Assert claim ids are strictly increasing in ledger order.
#[track_caller]
pub fn assert_claim_ids_strictly_increasing(episode: &Episode) {
    for pair in episode.claim_ledger.windows(2) {
        assert!(
            pair[0].claim_id < pair[1].claim_id,
            "claim id {} is not greater than preceding id {}",
            pair[1].claim_id,
            pair[0].claim_id
        );
    }
}

/// Assert every claim's visibility set is non-empty and names only
/// known characters or the narrator.
#[track_caller]
pub fn assert_visibility_well_formed(episode: &Episode) {
    for claim in &episode.claim_ledger {
        assert!(
            !claim.visible_to.is_empty(),
            "claim {} has an empty visibility set",
            claim.claim_id
        );
        for id in &claim.visible_to {
            assert!(
                id == NARRATOR || episode.is_known_character(id),
                "claim {} is visible to unknown id `{id}`",
                claim.claim_id
            );
        }
    }
}
