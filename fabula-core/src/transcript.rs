//! Transcript rendering for completed episodes.

use crate::model::Episode;
use crate::simulator::RunLogs;
use std::fmt::Write;

/// Render the plain dialogue transcript: spoken lines plus
/// parenthetical action lines. Skipped turns are omitted.
pub fn dialogue_transcript(episode: &Episode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", episode.title);
    let _ = writeln!(out, "Genre: {}", episode.genre);
    let _ = writeln!(out, "Scene: {}", episode.world_state.scene);
    out.push('\n');

    for turn in &episode.turns {
        if turn.error.is_some() {
            continue;
        }
        if !turn.dialogue.trim().is_empty() {
            let _ = writeln!(out, "{}: {}", turn.speaker_id, turn.dialogue);
        }
        if !turn.actions.is_empty() {
            let _ = writeln!(out, "({} {})", turn.speaker_id, turn.actions.join(", "));
        }
    }

    out
}

/// Render the detailed transcript: character roster, every turn with
/// actions, applied state changes, and error markers for skipped
/// turns, then the final per-character state and claim total. World
/// changes come from the run logs when available.
pub fn detailed_transcript(episode: &Episode, logs: &RunLogs) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} (detailed) ===", episode.title);
    let _ = writeln!(out, "Genre: {}", episode.genre);
    let _ = writeln!(out, "Scene: {}", episode.world_state.scene);

    let _ = writeln!(out, "Characters:");
    for character in &episode.characters {
        let _ = writeln!(
            out,
            "- {} ({})",
            character.character_id, character.profile.occupation
        );
    }

    for turn in &episode.turns {
        out.push('\n');
        let _ = writeln!(out, "--- Turn {} [{}] ---", turn.turn_id, turn.speaker_id);

        if let Some(error) = &turn.error {
            let _ = writeln!(out, "(turn skipped: {error})");
            continue;
        }

        if turn.dialogue.trim().is_empty() {
            let _ = writeln!(out, "(no dialogue)");
        } else {
            let _ = writeln!(out, "{}: {}", turn.speaker_id, turn.dialogue);
        }
        if !turn.actions.is_empty() {
            let _ = writeln!(out, "Actions: {}", turn.actions.join(", "));
        }

        let updates = &turn.self_updates;
        if let Some(emotion) = &updates.emotion {
            let _ = writeln!(out, "Emotion -> {emotion}");
        }
        if let Some(location) = &updates.location {
            let _ = writeln!(out, "Location -> {location}");
        }
        for belief in &updates.beliefs_added {
            let _ = writeln!(out, "+ belief: {belief}");
        }
        for belief in &updates.beliefs_removed {
            let _ = writeln!(out, "- belief: {belief}");
        }
        for goal in &updates.goals_added {
            let _ = writeln!(out, "+ goal: {goal}");
        }
        for goal in &updates.goals_removed {
            let _ = writeln!(out, "- goal: {goal}");
        }
        for plan in &updates.plans_added {
            let _ = writeln!(out, "+ plan: {} ({})", plan.action, plan.status.name());
        }
        for change in &updates.plans_updated {
            let _ = writeln!(out, "~ plan: {} -> {}", change.action, change.status.name());
        }
        for plan in &updates.plans_removed {
            let _ = writeln!(out, "- plan: {plan}");
        }

        if let Some(log) = logs.turn_logs.iter().find(|l| l.turn_id == turn.turn_id) {
            for fact in &log.facts_added {
                let _ = writeln!(out, "+ fact: {fact}");
            }
            for event in &log.history_added {
                let _ = writeln!(out, "+ history: {event}");
            }
            for claim_id in &log.claims_added {
                if let Some(claim) = episode.claim_ledger.iter().find(|c| c.claim_id == *claim_id)
                {
                    let _ = writeln!(out, "+ claim #{}: {}", claim.claim_id, claim.text);
                }
            }
            for warning in &log.warnings {
                let _ = writeln!(out, "! {warning}");
            }
        }
    }

    out.push('\n');
    let _ = writeln!(out, "--- Final state ---");
    for character in &episode.characters {
        let state = &character.state;
        let _ = writeln!(
            out,
            "{}: {} at {}",
            character.character_id, state.emotion, state.location
        );
        if !state.short_term_beliefs.is_empty() {
            let _ = writeln!(out, "  beliefs: {}", state.short_term_beliefs.join("; "));
        }
        if !state.short_term_goals.is_empty() {
            let _ = writeln!(out, "  goals: {}", state.short_term_goals.join("; "));
        }
    }
    let _ = writeln!(out, "Claims recorded: {}", episode.claim_ledger.len());

    out
}
