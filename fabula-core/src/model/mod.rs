//! Data model for dialogue episodes.
//!
//! The aggregate root is [`Episode`], which owns its characters, world
//! state, claim ledger, and turn history. Claims and turns are
//! append-only; character state is mutated only through validated
//! self-updates applied by the simulator.

mod character;
mod claim;
mod episode;

pub use character::{Character, CharacterProfile, CharacterState, Plan, PlanStatus};
pub use claim::{Claim, NARRATOR};
pub use episode::{Episode, EpisodeError, Turn, WorldState, WorldView};
