//! Prompt construction for the character and author agents.
//!
//! Static rule sections live in `prompts/*.txt`; dynamic context is
//! appended per call.

use crate::model::{Character, Episode, WorldView};

/// Build the character agent's system prompt.
pub(crate) fn character_system_prompt(
    character: &Character,
    view: &WorldView,
    recent_dialogue: &str,
    strict: bool,
) -> String {
    let profile = &character.profile;
    let state = &character.state;
    let mut prompt = String::new();

    prompt.push_str(&format!("You are {}.\n\n", character.character_id));

    prompt.push_str("STABLE ATTRIBUTES:\n");
    prompt.push_str(&format!("Age: {}\n", profile.age));
    prompt.push_str(&format!("Gender: {}\n", profile.gender));
    prompt.push_str(&format!("Ethnicity: {}\n", profile.ethnicity));
    prompt.push_str(&format!("Occupation: {}\n", profile.occupation));
    prompt.push_str(&format!("Core traits: {}\n", profile.core_traits.join(", ")));
    prompt.push_str(&format!(
        "Intrinsic preferences: {}\n",
        profile.intrinsic_prefs.join(", ")
    ));
    prompt.push_str(&format!(
        "Long-term memories: {}\n",
        profile.lt_memory.join("; ")
    ));

    prompt.push_str("\nCURRENT STATE:\n");
    prompt.push_str(&format!("Emotion: {}\n", state.emotion));
    prompt.push_str(&format!("Location: {}\n", state.location));
    prompt.push_str(&format!(
        "Short-term beliefs: {}\n",
        state.short_term_beliefs.join("; ")
    ));
    prompt.push_str(&format!(
        "Short-term goals: {}\n",
        state.short_term_goals.join("; ")
    ));
    let plans: Vec<String> = state
        .plans
        .iter()
        .map(|p| format!("{} ({})", p.action, p.status.name()))
        .collect();
    prompt.push_str(&format!("Active plans: {}\n", plans.join("; ")));

    prompt.push_str("\nCURRENT SITUATION:\n");
    prompt.push_str(&format!("Scene: {}\n", view.scene));
    prompt.push_str(&format!("You are at: {}\n", view.location));
    if !view.facts.is_empty() {
        prompt.push_str(&format!("Apparent facts: {}\n", view.facts.join("; ")));
    }
    if !view.known_claims.is_empty() {
        prompt.push_str("Things you know:\n");
        for claim in &view.known_claims {
            prompt.push_str(&format!("- {}\n", claim.text));
        }
    }
    if !view.recent_history.is_empty() {
        prompt.push_str(&format!(
            "Recent events: {}\n",
            view.recent_history.join("; ")
        ));
    }

    prompt.push_str("\nRECENT DIALOGUE:\n");
    if recent_dialogue.is_empty() {
        prompt.push_str("No previous dialogue.\n");
    } else {
        prompt.push_str(recent_dialogue);
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(include_str!("prompts/character_base.txt"));

    if strict {
        prompt.push('\n');
        prompt.push_str(include_str!("prompts/strict_format.txt"));
    }

    prompt
}

/// The character agent's per-turn user message.
pub(crate) fn character_user_prompt() -> String {
    "What do you do or say next? Respond with a single JSON object.".to_string()
}

/// Build the author agent's system prompt.
pub(crate) fn author_system_prompt(episode: &Episode, recent_dialogue: &str, strict: bool) -> String {
    let world = &episode.world_state;
    let mut prompt = String::new();

    prompt.push_str(include_str!("prompts/author_base.txt"));

    prompt.push_str("\nCURRENT WORLD STATE:\n");
    prompt.push_str(&format!("Scene: {}\n", world.scene));
    prompt.push_str(&format!("Facts: {}\n", world.facts.join("; ")));
    let history_tail: Vec<&str> = world
        .history
        .iter()
        .rev()
        .take(5)
        .rev()
        .map(String::as_str)
        .collect();
    prompt.push_str(&format!("Recent history: {}\n", history_tail.join("; ")));

    prompt.push_str("\nCHARACTERS:\n");
    for character in &episode.characters {
        prompt.push_str(&format!(
            "- {}: {} at {}\n",
            character.character_id, character.state.emotion, character.state.location
        ));
    }

    if !recent_dialogue.is_empty() {
        prompt.push_str("\nRECENT EVENTS:\n");
        prompt.push_str(recent_dialogue);
        prompt.push('\n');
    }

    if strict {
        prompt.push('\n');
        prompt.push_str(include_str!("prompts/strict_format.txt"));
    }

    prompt
}

/// The author agent's per-turn user message describing the observed turn.
pub(crate) fn author_user_prompt(speaker_id: &str, dialogue: &str, actions: &[String]) -> String {
    format!(
        "Character {speaker_id} just acted.\nDialogue: {dialogue}\nActions: [{}]\n\nUpdate the world state and extract any claims that emerged. Respond with a single JSON object.",
        actions.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CharacterProfile, CharacterState, WorldState};

    #[test]
    fn test_character_prompt_includes_state_and_rules() {
        let character = Character::new(
            "alice",
            CharacterProfile::new(30, "female", "Irish-American", "detective")
                .with_core_traits(["analytical"]),
            CharacterState::new("focused", "crime_scene")
                .with_beliefs(["killer left through window"]),
        );
        let view = WorldView {
            scene: "INT. APARTMENT - NIGHT".to_string(),
            location: "crime_scene".to_string(),
            facts: vec!["window is broken".to_string()],
            known_claims: Vec::new(),
            recent_history: Vec::new(),
        };

        let prompt = character_system_prompt(&character, &view, "", false);
        assert!(prompt.contains("You are alice."));
        assert!(prompt.contains("killer left through window"));
        assert!(prompt.contains("window is broken"));
        assert!(prompt.contains("self_updates"));
        assert!(!prompt.contains("FORMAT REMINDER"));

        let strict = character_system_prompt(&character, &view, "", true);
        assert!(strict.contains("FORMAT REMINDER"));
    }

    #[test]
    fn test_author_prompt_lists_characters() {
        let episode = Episode::new(
            "ep",
            "t",
            "g",
            vec![Character::new(
                "bob",
                CharacterProfile::new(35, "male", "Hispanic", "guard"),
                CharacterState::new("alert", "lobby"),
            )],
            WorldState::new("scene").with_facts(["the lights are out"]),
        )
        .unwrap();

        let prompt = author_system_prompt(&episode, "bob: who's there?", false);
        assert!(prompt.contains("- bob: alert at lobby"));
        assert!(prompt.contains("the lights are out"));
        assert!(prompt.contains("new_claims"));
    }
}
