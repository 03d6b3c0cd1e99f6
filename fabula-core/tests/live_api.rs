//! Live generation smoke test.
//!
//! Requires ANTHROPIC_API_KEY (a `.env` file works). Run with:
//! `cargo test --test live_api -- --ignored`

use fabula_core::testing::sample_episode;
use fabula_core::{ClaudeBackend, EpisodeSimulator, SimulatorConfig};
use std::sync::Arc;

fn has_api_key() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_live_two_character_episode() {
    if !has_api_key() {
        eprintln!("skipping: ANTHROPIC_API_KEY not set");
        return;
    }
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let backend = Arc::new(ClaudeBackend::from_env().unwrap());
    let mut simulator = EpisodeSimulator::new(backend, SimulatorConfig::new(2));

    let result = simulator
        .simulate_episode(sample_episode())
        .await
        .unwrap();

    assert_eq!(result.episode.turns.len(), 2);
    println!("{}", result.dialogue_transcript);
    println!("{}", result.detailed_transcript);
}
