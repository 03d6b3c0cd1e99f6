//! Synthetic dialogue episode engine with claim tracking.
//!
//! This crate generates multi-party dialogue episodes for evaluating
//! text-summarization faithfulness. Each episode records which
//! character believes or knows which factual claim at which point in
//! the conversation, so downstream evaluators can check whether a
//! summary attributes knowledge correctly.
//!
//! The engine is built from:
//! - A data model (characters, world state, claims, turns, episodes)
//!   with append-only claim and turn ledgers
//! - A character agent that turns backend output into validated
//!   self-updates
//! - An author agent that owns world-state mutation and the claim
//!   ledger, including visibility assignment and deduplication
//! - A simulator that drives the turn loop and produces a replayable
//!   result bundle
//!
//! # Quick Start
//!
//! ```ignore
//! use fabula_core::{ClaudeBackend, EpisodeSimulator, SimulatorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(ClaudeBackend::from_env()?);
//!     let config = SimulatorConfig::new(8);
//!     let mut simulator = EpisodeSimulator::new(backend, config);
//!
//!     let episode = fabula_core::testing::sample_episode();
//!     let result = simulator.simulate_episode(episode).await?;
//!     println!("{}", result.dialogue_transcript);
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod backend;
pub mod model;
pub mod simulator;
pub mod testing;
pub mod transcript;
pub mod update;

// Primary public API
pub use agents::{AgentError, AuthorAgent, AuthorDecision, CharacterAgent, ClaimDraft, TurnProposal};
pub use backend::{BackendError, ClaudeBackend, GenerationBackend, GenerationRequest};
pub use model::{
    Character, CharacterProfile, CharacterState, Claim, Episode, EpisodeError, Plan, PlanStatus,
    Turn, WorldState, WorldView, NARRATOR,
};
pub use simulator::{
    EpisodeSimulator, RunLogs, RunPhase, RunSummary, SimulationError, SimulationResult,
    SimulatorConfig, StateChange, StopHandle, TerminationReason, TurnLog,
};
pub use testing::{MockBackend, TestHarness};
pub use update::{AppliedUpdate, PlanStatusChange, SelfUpdate};
