//! Tantrumn Server
//!
//! Runs a demo match: one authority, three predicted clients over
//! latency-modelling channels. Pass a JSON config path to override tuning.

use std::collections::BTreeMap;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tantrumn::{
    game::services::LogServices,
    GameConfig, InputFrame, PlayerId, PlayerInputBuffer, Session, TICK_RATE, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Tantrumn Server v{}", VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => GameConfig::load(&path).with_context(|| format!("loading config from {}", path))?,
        None => GameConfig::default(),
    };
    if config.tick_rate != TICK_RATE {
        info!("Tick Rate: {} Hz (default {})", config.tick_rate, TICK_RATE);
    } else {
        info!("Tick Rate: {} Hz", config.tick_rate);
    }

    demo_match(config).await
}

/// Three players: one pulls and throws, two race for the goal.
async fn demo_match(config: GameConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let countdown = config.seconds_to_ticks(config.match_flow.countdown_duration);
    let start = countdown + 2 * config.net.latency_ticks + 5;
    let total = start + config.seconds_to_ticks(8.0);

    let mut session: Session<LogServices> = Session::new(config);
    let players: Vec<PlayerId> = (0..3).map(|_| PlayerId::random()).collect();
    for id in &players {
        session.join(*id)?;
        info!("Added player {} ({})", id, id.to_uuid_string());
    }

    let mut scripts = BTreeMap::new();

    // Pull the nearest object, then throw it
    let mut thrower = PlayerInputBuffer::new(players[0]);
    thrower.record(0, InputFrame::new());
    thrower.record(start, InputFrame::new().holding(InputFrame::FLAG_PULL_OR_AIM));
    thrower.record(start + 60, InputFrame::new().holding(InputFrame::FLAG_THROW));
    thrower.record(start + 61, InputFrame::new());
    scripts.insert(players[0], thrower);

    // Run for the goal
    for id in &players[1..] {
        let mut runner = PlayerInputBuffer::new(*id);
        runner.record(0, InputFrame::new());
        runner.record(start, InputFrame::with_movement(127, 0));
        scripts.insert(*id, runner);
    }

    info!("Running {} ticks...", total);
    session.run(&scripts, total).await?;

    info!("=== Match Results ===");
    let results = session.authority().game_mode().results();
    for (place, id) in results.iter().enumerate() {
        info!("#{}: Player {}", place + 1, id);
    }

    let events = session.take_authority_events();
    info!("Total events: {}", events.len());

    let authority_hash = session.authority().state_hash();
    info!("Authority State Hash: {}", hex::encode(authority_hash));
    for (id, hash) in session.hashes() {
        info!("Player {} State Hash: {}", id, hex::encode(hash));
    }

    if session.converged() {
        info!("REPLICAS CONVERGED: Hashes match!");
    } else {
        warn!("REPLICAS DIVERGED: Hashes differ!");
    }
    Ok(())
}
