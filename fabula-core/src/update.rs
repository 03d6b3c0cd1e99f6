//! Self-updates: a character's requested mutation to its own state.
//!
//! Generator output is untrusted, so the update payload is a fixed
//! tagged structure rather than an open-ended mapping. Parsing is
//! strict at the boundary: unrecognized fields become warnings, never
//! silent state. Application favors graceful degradation: duplicate
//! adds are idempotent no-ops and removals of absent items are
//! warnings, not errors.

use crate::model::{CharacterState, Plan, PlanStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A requested status change for an existing plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatusChange {
    pub action: String,
    pub status: PlanStatus,
}

/// A validated self-update request. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beliefs_add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beliefs_remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals_add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals_remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans_add: Vec<Plan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan_updates: Vec<PlanStatusChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans_remove: Vec<String>,
}

const KNOWN_FIELDS: &[&str] = &[
    "emotion",
    "location",
    "beliefs_add",
    "beliefs_remove",
    "goals_add",
    "goals_remove",
    "plans_add",
    "plan_updates",
    "plans_remove",
];

impl SelfUpdate {
    /// Whether this update requests any change at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse an untrusted JSON payload into a validated update.
    ///
    /// Unrecognized fields, wrong-typed values, and empty
    /// emotion/location strings are dropped and reported as warnings.
    pub fn from_value(value: &Value) -> (Self, Vec<String>) {
        let mut update = SelfUpdate::default();
        let mut warnings = Vec::new();

        let Some(object) = value.as_object() else {
            if !value.is_null() {
                warnings.push("self_updates is not a JSON object; ignored".to_string());
            }
            return (update, warnings);
        };

        for key in object.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                warnings.push(format!("ignored unrecognized self_updates field `{key}`"));
            }
        }

        update.emotion = parse_label(object.get("emotion"), "emotion", &mut warnings);
        update.location = parse_label(object.get("location"), "location", &mut warnings);
        update.beliefs_add = parse_strings(object.get("beliefs_add"), "beliefs_add", &mut warnings);
        update.beliefs_remove =
            parse_strings(object.get("beliefs_remove"), "beliefs_remove", &mut warnings);
        update.goals_add = parse_strings(object.get("goals_add"), "goals_add", &mut warnings);
        update.goals_remove =
            parse_strings(object.get("goals_remove"), "goals_remove", &mut warnings);
        update.plans_add = parse_list(object.get("plans_add"), "plans_add", &mut warnings);
        update.plan_updates = parse_list(object.get("plan_updates"), "plan_updates", &mut warnings);
        update.plans_remove =
            parse_strings(object.get("plans_remove"), "plans_remove", &mut warnings);

        (update, warnings)
    }

    /// Apply this update to a character's state, returning the
    /// effective diff.
    ///
    /// Adds are idempotent: an item already present is skipped, so
    /// replaying the same add-set leaves state unchanged. Removals of
    /// absent items are no-ops recorded as warnings.
    pub fn apply(&self, state: &mut CharacterState) -> AppliedUpdate {
        let mut applied = AppliedUpdate::default();

        if let Some(ref emotion) = self.emotion {
            state.emotion = emotion.clone();
            applied.emotion = Some(emotion.clone());
        }
        if let Some(ref location) = self.location {
            state.location = location.clone();
            applied.location = Some(location.clone());
        }

        for belief in &self.beliefs_add {
            if state.add_belief(belief.clone()) {
                applied.beliefs_added.push(belief.clone());
            }
        }
        for belief in &self.beliefs_remove {
            if state.remove_belief(belief) {
                applied.beliefs_removed.push(belief.clone());
            } else {
                applied
                    .warnings
                    .push(format!("no-op removal of absent belief `{belief}`"));
            }
        }

        for goal in &self.goals_add {
            if state.add_goal(goal.clone()) {
                applied.goals_added.push(goal.clone());
            }
        }
        for goal in &self.goals_remove {
            if state.remove_goal(goal) {
                applied.goals_removed.push(goal.clone());
            } else {
                applied
                    .warnings
                    .push(format!("no-op removal of absent goal `{goal}`"));
            }
        }

        for plan in &self.plans_add {
            if state.add_plan(plan.clone()) {
                applied.plans_added.push(plan.clone());
            }
        }
        for change in &self.plan_updates {
            if state.set_plan_status(&change.action, change.status) {
                applied.plans_updated.push(change.clone());
            } else {
                applied.warnings.push(format!(
                    "no-op status change for unknown plan `{}`",
                    change.action
                ));
            }
        }
        for action in &self.plans_remove {
            if state.remove_plan(action) {
                applied.plans_removed.push(action.clone());
            } else {
                applied
                    .warnings
                    .push(format!("no-op removal of absent plan `{action}`"));
            }
        }

        applied
    }
}

/// The diff a self-update actually produced, as committed to a turn
/// record. Skipped no-ops appear only in `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beliefs_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beliefs_removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals_removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans_added: Vec<Plan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans_updated: Vec<PlanStatusChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans_removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AppliedUpdate {
    /// Whether the update changed any state.
    pub fn is_empty(&self) -> bool {
        self.emotion.is_none()
            && self.location.is_none()
            && self.beliefs_added.is_empty()
            && self.beliefs_removed.is_empty()
            && self.goals_added.is_empty()
            && self.goals_removed.is_empty()
            && self.plans_added.is_empty()
            && self.plans_updated.is_empty()
            && self.plans_removed.is_empty()
    }
}

fn parse_label(value: Option<&Value>, field: &str, warnings: &mut Vec<String>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                warnings.push(format!("ignored empty `{field}` in self_updates"));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            warnings.push(format!("ignored non-string `{field}` in self_updates"));
            None
        }
    }
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
            warnings.push(format!("ignored non-array `{field}` in self_updates"));
            Vec::new()
        }
    }
}

fn parse_list<T: serde::de::DeserializeOwned>(
    value: Option<&Value>,
    field: &str,
    warnings: &mut Vec<String>,
) -> Vec<T> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut parsed = Vec::new();
            for item in items {
                match serde_json::from_value(item.clone()) {
                    Ok(entry) => parsed.push(entry),
                    Err(e) => warnings.push(format!("ignored malformed entry in `{field}`: {e}")),
                }
            }
            parsed
        }
        Some(_) => {
            warnings.push(format!("ignored non-array `{field}` in self_updates"));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> CharacterState {
        CharacterState::new("alert", "security_office")
            .with_beliefs(["heard strange noise"])
            .with_goals(["investigate sound"])
            .with_plans([Plan::new("check_cameras")])
    }

    #[test]
    fn test_parse_full_update() {
        let (update, warnings) = SelfUpdate::from_value(&json!({
            "emotion": "worried",
            "beliefs_add": ["someone is in the building"],
            "goals_remove": ["investigate sound"],
            "plans_add": [{"action": "call_police", "status": "pending"}],
            "plan_updates": [{"action": "check_cameras", "status": "in_progress"}]
        }));

        assert!(warnings.is_empty());
        assert_eq!(update.emotion.as_deref(), Some("worried"));
        assert_eq!(update.beliefs_add, vec!["someone is in the building"]);
        assert_eq!(update.plans_add[0].action, "call_police");
        assert_eq!(update.plan_updates[0].status, PlanStatus::InProgress);
    }

    #[test]
    fn test_unrecognized_field_warns_not_absorbed() {
        let (update, warnings) = SelfUpdate::from_value(&json!({
            "emotion": "calm",
            "hit_points": 12
        }));

        assert_eq!(update.emotion.as_deref(), Some("calm"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("hit_points"));
    }

    #[test]
    fn test_empty_and_wrong_typed_fields_warn() {
        let (update, warnings) = SelfUpdate::from_value(&json!({
            "emotion": "",
            "location": 7,
            "beliefs_add": "not an array"
        }));

        assert!(update.is_empty());
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_non_object_payload() {
        let (update, warnings) = SelfUpdate::from_value(&json!("nonsense"));
        assert!(update.is_empty());
        assert_eq!(warnings.len(), 1);

        let (update, warnings) = SelfUpdate::from_value(&Value::Null);
        assert!(update.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_apply_updates_state() {
        let mut state = state();
        let update = SelfUpdate {
            emotion: Some("worried".to_string()),
            beliefs_add: vec!["someone is in the building".to_string()],
            goals_remove: vec!["investigate sound".to_string()],
            plans_add: vec![Plan::new("call_police")],
            ..Default::default()
        };

        let applied = update.apply(&mut state);

        assert_eq!(state.emotion, "worried");
        assert!(state
            .short_term_beliefs
            .contains(&"someone is in the building".to_string()));
        assert!(state.short_term_goals.is_empty());
        assert_eq!(state.plans.len(), 2);
        assert!(applied.warnings.is_empty());
        assert_eq!(applied.goals_removed, vec!["investigate sound"]);
    }

    #[test]
    fn test_add_is_idempotent_on_replay() {
        let mut state = state();
        let update = SelfUpdate {
            beliefs_add: vec!["someone is in the building".to_string()],
            goals_add: vec!["lock the doors".to_string()],
            plans_add: vec![Plan::new("call_police")],
            ..Default::default()
        };

        let first = update.apply(&mut state);
        assert_eq!(first.beliefs_added.len(), 1);
        let after_first = state.clone();

        let second = update.apply(&mut state);
        assert_eq!(state, after_first);
        assert!(second.beliefs_added.is_empty());
        assert!(second.goals_added.is_empty());
        assert!(second.plans_added.is_empty());
    }

    #[test]
    fn test_remove_of_absent_item_is_warned_noop() {
        let mut state = state();
        let before = state.clone();
        let update = SelfUpdate {
            beliefs_remove: vec!["killer knew victim".to_string()],
            ..Default::default()
        };

        let applied = update.apply(&mut state);

        assert_eq!(state, before);
        assert!(applied.beliefs_removed.is_empty());
        assert_eq!(applied.warnings.len(), 1);
        assert!(applied.warnings[0].contains("no-op removal"));
        assert!(applied.warnings[0].contains("killer knew victim"));
    }

    #[test]
    fn test_applied_update_serialization_is_sparse() {
        let applied = AppliedUpdate {
            emotion: Some("tense".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&applied).unwrap();
        assert_eq!(json, json!({"emotion": "tense"}));
    }
}
