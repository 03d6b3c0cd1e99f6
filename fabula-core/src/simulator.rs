//! Episode simulator: drives the turn loop and produces the result
//! bundle.
//!
//! Execution is strictly sequential: each turn's author decision
//! depends on the previous turn's committed world state and claim
//! ledger, so turns commit one at a time in a deterministic order.
//! The only suspension points are the generation backend calls.

use crate::agents::{AuthorAgent, AuthorDecision, CharacterAgent};
use crate::backend::GenerationBackend;
use crate::model::{CharacterState, Episode, EpisodeError, Turn};
use crate::transcript;
use crate::update::AppliedUpdate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort a run before any turn commits.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("episode has no characters")]
    NoCharacters,

    #[error("max_turns must be greater than zero")]
    InvalidMaxTurns,

    #[error("character_order must not be empty")]
    EmptyCharacterOrder,

    #[error("character_order references unknown character `{0}`")]
    UnknownCharacter(String),

    #[error("simulator has already run; terminal states are immutable")]
    AlreadyRun,

    #[error("internal consistency error: {0}")]
    Internal(#[from] EpisodeError),
}

/// Configuration for an episode run.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Turn budget. Must be greater than zero.
    pub max_turns: u64,
    /// Explicit speaker order; defaults to round-robin over the
    /// episode's character list.
    pub character_order: Option<Vec<String>>,
    /// Whether to populate the structured run logs.
    pub enable_logging: bool,
    /// Additional generation attempts after the first, per agent call.
    pub max_retries: u32,
    /// Action labels that end the scene.
    pub termination_actions: Vec<String>,
    /// How many recent turns and history lines agents see.
    pub history_window: usize,
}

impl SimulatorConfig {
    pub fn new(max_turns: u64) -> Self {
        Self {
            max_turns,
            character_order: None,
            enable_logging: true,
            max_retries: 2,
            termination_actions: vec!["end_scene".to_string()],
            history_window: 10,
        }
    }

    pub fn with_character_order(
        mut self,
        order: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.character_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_termination_actions(
        mut self,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.termination_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }
}

/// Cooperative cancellation: stops the run after the current turn
/// commits. No rollback of committed turns.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Simulator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

/// Why a run reached Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The turn budget was exhausted.
    MaxTurns,
    /// A turn carried a recognized termination action label.
    TerminationAction,
    /// The stop handle was signaled.
    Stopped,
}

/// One character-state mutation, as recorded in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub turn_id: u64,
    pub character_id: String,
    pub before: CharacterState,
    pub after: CharacterState,
    pub updates_applied: AppliedUpdate,
    pub timestamp: DateTime<Utc>,
}

/// One completed (or skipped) turn, as recorded in the run log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnLog {
    pub turn_id: u64,
    pub speaker_id: String,
    pub dialogue: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims_added: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims_extended: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered structured run logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLogs {
    pub state_history: Vec<StateChange>,
    pub turn_logs: Vec<TurnLog>,
}

/// Final run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub episode_id: String,
    pub termination: TerminationReason,
    pub turn_count: u64,
    pub claim_count: u64,
    pub character_count: u64,
    pub world_fact_count: u64,
    pub state_change_count: u64,
    pub turns_by_character: BTreeMap<String, u64>,
}

/// The fixed result bundle of a completed run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// The frozen episode.
    pub episode: Episode,
    /// Speaker + dialogue only.
    pub dialogue_transcript: String,
    /// Dialogue, actions, and state diffs.
    pub detailed_transcript: String,
    pub summary: RunSummary,
    pub simulation_logs: RunLogs,
}

/// Orchestrates one episode run.
pub struct EpisodeSimulator {
    config: SimulatorConfig,
    character_agent: CharacterAgent,
    author_agent: AuthorAgent,
    stop: Arc<AtomicBool>,
    phase: RunPhase,
}

impl EpisodeSimulator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: SimulatorConfig) -> Self {
        let character_agent = CharacterAgent::new(backend.clone(), config.max_retries);
        let author_agent = AuthorAgent::new(backend, config.max_retries);
        Self {
            config,
            character_agent,
            author_agent,
            stop: Arc::new(AtomicBool::new(false)),
            phase: RunPhase::NotStarted,
        }
    }

    /// Handle for cooperative early stop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop.clone(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Run a complete episode simulation.
    ///
    /// Takes ownership of the episode; the frozen episode is returned
    /// inside the result bundle. Setup errors abort before any turn;
    /// mid-run generation failures degrade to skipped turns.
    pub async fn simulate_episode(
        &mut self,
        mut episode: Episode,
    ) -> Result<SimulationResult, SimulationError> {
        if self.phase != RunPhase::NotStarted {
            return Err(SimulationError::AlreadyRun);
        }

        let order = match self.validate_setup(&episode) {
            Ok(order) => order,
            Err(e) => {
                self.phase = RunPhase::Aborted;
                return Err(e);
            }
        };

        self.phase = RunPhase::Running;
        info!(
            episode_id = %episode.episode_id,
            title = %episode.title,
            max_turns = self.config.max_turns,
            "starting simulation"
        );

        let mut logs = RunLogs::default();
        let mut termination = TerminationReason::MaxTurns;

        for turn_id in 0..self.config.max_turns {
            if self.stop.load(Ordering::Relaxed) {
                info!(turn_id, "stop signaled; halting before next turn");
                termination = TerminationReason::Stopped;
                break;
            }

            let speaker_id = order[turn_id as usize % order.len()].clone();
            let view = episode
                .world_view(&speaker_id, self.config.history_window)
                .ok_or_else(|| SimulationError::UnknownCharacter(speaker_id.clone()))?;
            let recent = recent_dialogue(&episode, self.config.history_window);

            info!(turn_id, speaker_id = %speaker_id, "turn start");

            let character = episode
                .character(&speaker_id)
                .ok_or_else(|| SimulationError::UnknownCharacter(speaker_id.clone()))?;
            let proposal = match self
                .character_agent
                .propose_turn(character, &view, &recent)
                .await
            {
                Ok(proposal) => proposal,
                Err(e) => {
                    warn!(turn_id, speaker_id = %speaker_id, error = %e, "turn generation failed; recording skipped turn");
                    episode
                        .turns
                        .push(Turn::skipped(turn_id, &speaker_id, e.to_string()));
                    if self.config.enable_logging {
                        logs.turn_logs.push(TurnLog {
                            turn_id,
                            speaker_id,
                            error: Some(e.to_string()),
                            ..Default::default()
                        });
                    }
                    continue;
                }
            };

            let dialogue_spoken = !proposal.dialogue.trim().is_empty();

            // Exclusive write: only this path mutates character state,
            // at most once per turn.
            let (before, after, applied) = {
                let character = episode
                    .character_mut(&speaker_id)
                    .ok_or_else(|| SimulationError::UnknownCharacter(speaker_id.clone()))?;
                let before = character.state.clone();
                let applied = proposal.self_update.apply(&mut character.state);
                (before, character.state.clone(), applied)
            };

            for warning in &applied.warnings {
                warn!(turn_id, speaker_id = %speaker_id, "{warning}");
            }

            if self.config.enable_logging && !(applied.is_empty() && applied.warnings.is_empty()) {
                logs.state_history.push(StateChange {
                    turn_id,
                    character_id: speaker_id.clone(),
                    before,
                    after,
                    updates_applied: applied.clone(),
                    timestamp: Utc::now(),
                });
            }

            // Author failures degrade to an empty decision; the turn
            // itself still commits.
            let decision = match self
                .author_agent
                .observe_turn(&episode, &proposal, &speaker_id, &recent)
                .await
            {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(turn_id, speaker_id = %speaker_id, error = %e, "author decision failed; committing turn without world changes");
                    AuthorDecision {
                        warnings: vec![format!("author decision skipped: {e}")],
                        ..Default::default()
                    }
                }
            };

            let outcome = AuthorAgent::commit_decision(
                &mut episode,
                &decision,
                &speaker_id,
                turn_id,
                dialogue_spoken,
            )?;

            episode.turns.push(Turn {
                turn_id,
                speaker_id: speaker_id.clone(),
                dialogue: proposal.dialogue.clone(),
                actions: proposal.actions.clone(),
                self_updates: applied.clone(),
                timestamp: Utc::now(),
                error: None,
            });

            if self.config.enable_logging {
                let mut warnings = proposal.warnings.clone();
                warnings.extend(applied.warnings.clone());
                warnings.extend(outcome.warnings.clone());
                logs.turn_logs.push(TurnLog {
                    turn_id,
                    speaker_id: speaker_id.clone(),
                    dialogue: proposal.dialogue.clone(),
                    actions: proposal.actions.clone(),
                    facts_added: outcome.facts_added,
                    history_added: outcome.history_added,
                    claims_added: outcome.claim_ids,
                    claims_extended: outcome.claims_extended,
                    warnings,
                    error: None,
                });
            }

            if proposal
                .actions
                .iter()
                .any(|a| self.config.termination_actions.contains(a))
            {
                info!(turn_id, speaker_id = %speaker_id, "termination action; ending scene");
                termination = TerminationReason::TerminationAction;
                break;
            }
        }

        self.phase = RunPhase::Completed;

        let summary = build_summary(&episode, &logs, termination);
        info!(
            episode_id = %episode.episode_id,
            turns = summary.turn_count,
            claims = summary.claim_count,
            "simulation completed"
        );

        Ok(SimulationResult {
            dialogue_transcript: transcript::dialogue_transcript(&episode),
            detailed_transcript: transcript::detailed_transcript(&episode, &logs),
            summary,
            simulation_logs: logs,
            episode,
        })
    }

    /// Validate setup and resolve the speaker order. Fatal errors
    /// abort before any turn runs.
    fn validate_setup(&self, episode: &Episode) -> Result<Vec<String>, SimulationError> {
        if episode.characters.is_empty() {
            return Err(SimulationError::NoCharacters);
        }
        if self.config.max_turns == 0 {
            return Err(SimulationError::InvalidMaxTurns);
        }

        match &self.config.character_order {
            Some(order) => {
                if order.is_empty() {
                    return Err(SimulationError::EmptyCharacterOrder);
                }
                for id in order {
                    if !episode.is_known_character(id) {
                        return Err(SimulationError::UnknownCharacter(id.clone()));
                    }
                }
                Ok(order.clone())
            }
            None => Ok(episode.character_ids()),
        }
    }
}

/// Recent dialogue lines for agent context.
fn recent_dialogue(episode: &Episode, window: usize) -> String {
    let start = episode.turns.len().saturating_sub(window);
    episode.turns[start..]
        .iter()
        .filter(|t| !t.dialogue.trim().is_empty())
        .map(|t| format!("{}: {}", t.speaker_id, t.dialogue))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_summary(
    episode: &Episode,
    logs: &RunLogs,
    termination: TerminationReason,
) -> RunSummary {
    let mut turns_by_character: BTreeMap<String, u64> = BTreeMap::new();
    for turn in &episode.turns {
        *turns_by_character.entry(turn.speaker_id.clone()).or_default() += 1;
    }

    RunSummary {
        episode_id: episode.episode_id.clone(),
        termination,
        turn_count: episode.turns.len() as u64,
        claim_count: episode.claim_ledger.len() as u64,
        character_count: episode.characters.len() as u64,
        world_fact_count: episode.world_state.facts.len() as u64,
        state_change_count: logs.state_history.len() as u64,
        turns_by_character,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, GenerationRequest};
    use crate::testing::{sample_episode, MockBackend};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn simulator(max_turns: u64) -> EpisodeSimulator {
        EpisodeSimulator::new(Arc::new(MockBackend::new()), SimulatorConfig::new(max_turns))
    }

    #[tokio::test]
    async fn test_empty_character_list_aborts() {
        let episode = Episode::new(
            "ep",
            "t",
            "g",
            Vec::new(),
            crate::model::WorldState::new("scene"),
        )
        .unwrap();

        let mut simulator = simulator(4);
        let error = simulator.simulate_episode(episode).await.unwrap_err();

        assert!(matches!(error, SimulationError::NoCharacters));
        assert_eq!(simulator.phase(), RunPhase::Aborted);
    }

    #[tokio::test]
    async fn test_zero_max_turns_aborts() {
        let mut simulator = simulator(0);
        let error = simulator
            .simulate_episode(sample_episode())
            .await
            .unwrap_err();

        assert!(matches!(error, SimulationError::InvalidMaxTurns));
        assert_eq!(simulator.phase(), RunPhase::Aborted);
    }

    #[tokio::test]
    async fn test_unknown_character_order_aborts() {
        let backend = Arc::new(MockBackend::new());
        let config = SimulatorConfig::new(4).with_character_order(["alice", "mallory"]);
        let mut simulator = EpisodeSimulator::new(backend, config);

        let error = simulator
            .simulate_episode(sample_episode())
            .await
            .unwrap_err();
        assert!(matches!(error, SimulationError::UnknownCharacter(id) if id == "mallory"));
    }

    #[tokio::test]
    async fn test_stop_handle_halts_before_first_turn() {
        let mut simulator = simulator(8);
        simulator.stop_handle().stop();

        let result = simulator.simulate_episode(sample_episode()).await.unwrap();

        assert!(result.episode.turns.is_empty());
        assert_eq!(result.summary.termination, TerminationReason::Stopped);
        assert_eq!(simulator.phase(), RunPhase::Completed);
    }

    /// Delegates to a scripted backend and signals the stop handle
    /// once a given number of calls has been served.
    struct StopAfterCalls {
        inner: MockBackend,
        handle: Mutex<Option<StopHandle>>,
        stop_after: usize,
    }

    #[async_trait]
    impl GenerationBackend for StopAfterCalls {
        async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
            let result = self.inner.generate(request).await;
            if self.inner.calls() >= self.stop_after {
                if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                    handle.stop();
                }
            }
            result
        }

        fn name(&self) -> &str {
            "stop-after"
        }
    }

    #[tokio::test]
    async fn test_stop_mid_run_keeps_committed_turns() {
        let backend = Arc::new(StopAfterCalls {
            inner: MockBackend::new(),
            handle: Mutex::new(None),
            // Turn 0 consumes two calls: character, then author.
            stop_after: 2,
        });
        backend.inner.push_text(r#"{"dialogue": "Check the ledger."}"#);
        backend.inner.push_text(
            r#"{"new_claims": [{"text": "the ledger was altered", "type": "evidence", "truth_value": true, "visible_to": ["alice"]}]}"#,
        );

        let mut simulator = EpisodeSimulator::new(backend.clone(), SimulatorConfig::new(8));
        *backend.handle.lock().unwrap() = Some(simulator.stop_handle());

        let result = simulator.simulate_episode(sample_episode()).await.unwrap();

        // The in-flight turn commits in full; the stop takes effect
        // before the next one starts, with no rollback.
        assert_eq!(result.episode.turns.len(), 1);
        assert_eq!(result.episode.turns[0].dialogue, "Check the ledger.");
        assert_eq!(result.episode.claim_ledger.len(), 1);
        assert_eq!(result.episode.claim_ledger[0].text, "the ledger was altered");
        assert_eq!(result.summary.termination, TerminationReason::Stopped);
        assert_eq!(simulator.phase(), RunPhase::Completed);
        assert_eq!(backend.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_terminal_simulator_rejects_reuse() {
        let mut simulator = simulator(1);
        simulator.stop_handle().stop();
        simulator
            .simulate_episode(sample_episode())
            .await
            .unwrap();

        let error = simulator
            .simulate_episode(sample_episode())
            .await
            .unwrap_err();
        assert!(matches!(error, SimulationError::AlreadyRun));
    }
}
