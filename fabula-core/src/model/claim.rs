//! Claims: discrete factual assertions with recorded visibility.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel member of `visible_to` marking a claim as visible only to
/// the omniscient record, not to any character.
pub const NARRATOR: &str = "narrator";

/// A factual assertion tracked by the episode's append-only ledger.
///
/// Claims are never deleted. Later claims may supersede or contradict
/// earlier ones; the engine preserves both and leaves contradiction
/// resolution to downstream evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Unique within the episode, assigned monotonically by the
    /// episode's commit path.
    pub claim_id: u64,
    pub text: String,
    /// Free-form tag, e.g. "hypothesis" or "evidence".
    #[serde(rename = "type")]
    pub kind: String,
    /// `None` means the truth value is unknown.
    pub truth_value: Option<bool>,
    /// Character ids entitled to know this claim, or [`NARRATOR`].
    /// Never empty.
    pub visible_to: BTreeSet<String>,
    /// Turn at which the claim entered the ledger.
    pub introduced_at_turn: u64,
}

impl Claim {
    /// Whether the given character is entitled to know this claim.
    ///
    /// Narrator-only claims are visible to no character.
    pub fn is_visible(&self, character_id: &str) -> bool {
        character_id != NARRATOR && self.visible_to.contains(character_id)
    }

    /// Whether this claim is visible only to the omniscient record.
    pub fn is_narrator_only(&self) -> bool {
        self.visible_to.len() == 1 && self.visible_to.contains(NARRATOR)
    }

    /// Extend visibility to another character. Idempotent.
    pub fn grant_visibility(&mut self, character_id: impl Into<String>) {
        self.visible_to.insert(character_id.into());
    }
}
