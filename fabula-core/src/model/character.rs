//! Characters: immutable profiles plus mutable per-episode state.

use serde::{Deserialize, Serialize};

/// Static character background and traits. Immutable after creation:
/// the engine never writes to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub age: u32,
    pub gender: String,
    pub ethnicity: String,
    pub occupation: String,
    /// Core personality traits, in authoring order.
    pub core_traits: Vec<String>,
    /// Intrinsic preferences, in authoring order.
    pub intrinsic_prefs: Vec<String>,
    /// Long-term memory facts, in authoring order.
    #[serde(default)]
    pub lt_memory: Vec<String>,
}

impl CharacterProfile {
    /// Create a profile with empty trait/preference/memory lists.
    pub fn new(
        age: u32,
        gender: impl Into<String>,
        ethnicity: impl Into<String>,
        occupation: impl Into<String>,
    ) -> Self {
        Self {
            age,
            gender: gender.into(),
            ethnicity: ethnicity.into(),
            occupation: occupation.into(),
            core_traits: Vec::new(),
            intrinsic_prefs: Vec::new(),
            lt_memory: Vec::new(),
        }
    }

    pub fn with_core_traits(mut self, traits: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.core_traits = traits.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_intrinsic_prefs(
        mut self,
        prefs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.intrinsic_prefs = prefs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lt_memory(mut self, memory: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.lt_memory = memory.into_iter().map(Into::into).collect();
        self
    }
}

/// Status of a plan in a character's plan list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Done,
    Abandoned,
}

impl PlanStatus {
    /// Display name matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Done => "done",
            PlanStatus::Abandoned => "abandoned",
        }
    }
}

/// A planned action with its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Action label identifying the plan within a character's state.
    pub action: String,
    pub status: PlanStatus,
}

impl Plan {
    /// Create a pending plan.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: PlanStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = status;
        self
    }
}

/// Dynamic character state.
///
/// Belief and goal lists have set semantics: duplicates are forbidden
/// and insertion order is preserved but not meaningful. State is only
/// mutated through validated self-updates, never directly by
/// narrative text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub emotion: String,
    pub location: String,
    #[serde(default)]
    pub short_term_beliefs: Vec<String>,
    #[serde(default)]
    pub short_term_goals: Vec<String>,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

impl CharacterState {
    pub fn new(emotion: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            location: location.into(),
            short_term_beliefs: Vec::new(),
            short_term_goals: Vec::new(),
            plans: Vec::new(),
        }
    }

    pub fn with_beliefs(mut self, beliefs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for belief in beliefs {
            self.add_belief(belief.into());
        }
        self
    }

    pub fn with_goals(mut self, goals: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for goal in goals {
            self.add_goal(goal.into());
        }
        self
    }

    pub fn with_plans(mut self, plans: impl IntoIterator<Item = Plan>) -> Self {
        for plan in plans {
            self.add_plan(plan);
        }
        self
    }

    /// Add a belief. Returns false if it was already present (no-op).
    pub fn add_belief(&mut self, belief: impl Into<String>) -> bool {
        let belief = belief.into();
        if self.short_term_beliefs.contains(&belief) {
            return false;
        }
        self.short_term_beliefs.push(belief);
        true
    }

    /// Remove a belief. Returns false if it was not present (no-op).
    pub fn remove_belief(&mut self, belief: &str) -> bool {
        let before = self.short_term_beliefs.len();
        self.short_term_beliefs.retain(|b| b != belief);
        self.short_term_beliefs.len() != before
    }

    /// Add a goal. Returns false if it was already present (no-op).
    pub fn add_goal(&mut self, goal: impl Into<String>) -> bool {
        let goal = goal.into();
        if self.short_term_goals.contains(&goal) {
            return false;
        }
        self.short_term_goals.push(goal);
        true
    }

    /// Remove a goal. Returns false if it was not present (no-op).
    pub fn remove_goal(&mut self, goal: &str) -> bool {
        let before = self.short_term_goals.len();
        self.short_term_goals.retain(|g| g != goal);
        self.short_term_goals.len() != before
    }

    /// Add a plan. Returns false if a plan with the same action label
    /// already exists (no-op).
    pub fn add_plan(&mut self, plan: Plan) -> bool {
        if self.plans.iter().any(|p| p.action == plan.action) {
            return false;
        }
        self.plans.push(plan);
        true
    }

    /// Update the status of an existing plan. Returns false if no plan
    /// carries the given action label.
    pub fn set_plan_status(&mut self, action: &str, status: PlanStatus) -> bool {
        match self.plans.iter_mut().find(|p| p.action == action) {
            Some(plan) => {
                plan.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove a plan by action label. Returns false if not present.
    pub fn remove_plan(&mut self, action: &str) -> bool {
        let before = self.plans.len();
        self.plans.retain(|p| p.action != action);
        self.plans.len() != before
    }
}

/// A character: immutable profile + mutable state + identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Unique within an episode.
    pub character_id: String,
    pub profile: CharacterProfile,
    pub state: CharacterState,
}

impl Character {
    pub fn new(
        character_id: impl Into<String>,
        profile: CharacterProfile,
        state: CharacterState,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            profile,
            state,
        }
    }
}
