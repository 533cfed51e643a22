//! Match Session
//!
//! Wires one authority to its clients through latency-modelling channels.
//! Each client owns an observer replica plus its presentation services;
//! the session advances everything in a fixed order so a run is
//! reproducible tick for tick.
//!
//! ## Step order
//!
//! 1. Clients receive broadcasts that became visible this tick
//! 2. Clients process input, predict, and send intents
//! 3. The authority receives and validates intents
//! 4. The authority steps and routes its broadcasts

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::GameConfig;
use crate::core::hash::StateHash;
use crate::core::vec3::Vec3;
use crate::game::events::GameEvent;
use crate::game::input::{InputFrame, PlayerInputBuffer};
use crate::game::match_flow::PlayerKind;
use crate::game::services::{dispatch, FeedbackService, HudService, RecordingServices};
use crate::game::state::PlayerId;
use crate::network::authority::{Authority, Outgoing, Recipient};
use crate::network::channel::{reliable_channel, ChannelError, ChannelReceiver, ChannelSender};
use crate::network::observer::Observer;
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Session is full.
    #[error("Session is full")]
    SessionFull,

    /// Player already in session.
    #[error("Already in session")]
    AlreadyInSession,

    /// Player not found.
    #[error("Player not found")]
    PlayerNotFound,

    /// Transport failure.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// One connected client: its replica, both channel directions, and its
/// presentation services.
struct ClientLink<S> {
    observer: Observer,
    /// Client → authority
    uplink: ChannelSender,
    uplink_rx: ChannelReceiver,
    /// Authority → client
    downlink: ChannelSender,
    downlink_rx: ChannelReceiver,
    services: S,
    events: Vec<GameEvent>,
}

/// A running match.
pub struct Session<S = RecordingServices>
where
    S: FeedbackService + HudService + Default,
{
    config: GameConfig,
    authority: Authority,
    clients: BTreeMap<PlayerId, ClientLink<S>>,
    ai: BTreeSet<PlayerId>,
    authority_events: Vec<GameEvent>,
    tick: u32,
}

impl<S> Session<S>
where
    S: FeedbackService + HudService + Default,
{
    /// Create an empty session.
    pub fn new(config: GameConfig) -> Self {
        Self {
            authority: Authority::new(config.clone()),
            config,
            clients: BTreeMap::new(),
            ai: BTreeSet::new(),
            authority_events: Vec::new(),
            tick: 0,
        }
    }

    /// Ticks stepped so far.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Session configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The authority.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// A client's replica.
    pub fn observer(&self, player: &PlayerId) -> Option<&Observer> {
        self.clients.get(player).map(|l| &l.observer)
    }

    /// A client's presentation services.
    pub fn services(&self, player: &PlayerId) -> Option<&S> {
        self.clients.get(player).map(|l| &l.services)
    }

    /// Drain a client's replica and presentation events.
    pub fn take_client_events(&mut self, player: &PlayerId) -> Vec<GameEvent> {
        self.clients
            .get_mut(player)
            .map(|l| std::mem::take(&mut l.events))
            .unwrap_or_default()
    }

    /// Drain the authority's committed events.
    pub fn take_authority_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.authority_events)
    }

    /// Connected humans plus AI agents.
    pub fn player_count(&self) -> usize {
        self.clients.len() + self.ai.len()
    }

    fn check_join(&self, player: &PlayerId) -> Result<(), SessionError> {
        if self.clients.contains_key(player) || self.ai.contains(player) {
            return Err(SessionError::AlreadyInSession);
        }
        if self.player_count() >= self.config.net.max_players {
            return Err(SessionError::SessionFull);
        }
        Ok(())
    }

    // =========================================================================
    // Roster
    // =========================================================================

    /// Connect a human player.
    pub fn join(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.connect(player, false)
    }

    /// Connect a spectator: it replicates the match but has no character.
    pub fn join_spectator(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.connect(player, true)
    }

    fn connect(&mut self, player: PlayerId, spectator: bool) -> Result<(), SessionError> {
        self.check_join(&player)?;

        let latency = self.config.net.latency_ticks;
        let (uplink, uplink_rx) = reliable_channel(latency);
        let (downlink, downlink_rx) = reliable_channel(latency);

        // Late joiners see the world before their own spawn
        for message in self.authority.snapshot_messages() {
            downlink.send(self.tick, &message)?;
        }

        self.clients.insert(
            player,
            ClientLink {
                observer: Observer::new(player, self.config.clone()),
                uplink,
                uplink_rx,
                downlink,
                downlink_rx,
                services: S::default(),
                events: Vec::new(),
            },
        );

        if !self.authority.join(player, PlayerKind::Human, spectator) {
            self.clients.remove(&player);
            return Err(SessionError::AlreadyInSession);
        }
        info!(player = %player, spectator, tick = self.tick, "client connected");
        self.route()
    }

    /// Add a server-driven agent.
    pub fn add_ai(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.check_join(&player)?;
        if !self.authority.add_ai(player) {
            return Err(SessionError::AlreadyInSession);
        }
        self.ai.insert(player);
        self.route()
    }

    /// Have an agent pull whatever lies toward `location`.
    pub fn ai_pull_at(&mut self, player: PlayerId, location: Vec3) -> Result<bool, SessionError> {
        if !self.ai.contains(&player) {
            return Err(SessionError::PlayerNotFound);
        }
        let pulled = self.authority.ai_pull_at(player, location);
        self.route()?;
        Ok(pulled)
    }

    /// Stun a player from a scripted hazard.
    pub fn stun(&mut self, player: PlayerId, ratio: f32) -> Result<bool, SessionError> {
        let begun = self.authority.stun(player, ratio);
        self.route()?;
        Ok(begun)
    }

    /// Disconnect a player or agent.
    pub fn leave(&mut self, player: PlayerId) -> Result<(), SessionError> {
        let known = self.clients.remove(&player).is_some() | self.ai.remove(&player);
        if !known {
            return Err(SessionError::PlayerNotFound);
        }
        self.authority.leave(player);
        info!(player = %player, tick = self.tick, "player disconnected");
        self.route()
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advance every replica one tick. Players missing from `inputs` hold
    /// nothing this tick.
    pub fn step(&mut self, inputs: &BTreeMap<PlayerId, InputFrame>) -> Result<(), SessionError> {
        let now = self.tick;
        let dt = self.config.delta_time();

        for (player, link) in self.clients.iter_mut() {
            for message in link.downlink_rx.receive::<ServerMessage>(now) {
                link.observer.handle_server(message);
            }

            let frame = inputs.get(player).copied().unwrap_or_default();
            let events = link.observer.tick(frame, dt);
            dispatch(&events, &mut link.services);
            link.events.extend(events);

            for message in link.observer.take_outgoing() {
                link.uplink.send(now, &message)?;
            }
        }

        for (player, link) in self.clients.iter_mut() {
            for message in link.uplink_rx.receive::<ClientMessage>(now) {
                if message.player != *player {
                    warn!(from = %player, claimed = %message.player, "intent for another player dropped");
                    continue;
                }
                self.authority.handle(message);
            }
        }

        self.authority.step(dt);
        self.route()?;
        self.tick += 1;
        Ok(())
    }

    /// Send the authority's queued broadcasts.
    fn route(&mut self) -> Result<(), SessionError> {
        let now = self.tick;
        for Outgoing { to, message } in self.authority.take_outgoing() {
            match to {
                Recipient::All => {
                    for link in self.clients.values() {
                        link.downlink.send(now, &message)?;
                    }
                }
                Recipient::Only(player) => {
                    if let Some(link) = self.clients.get(&player) {
                        link.downlink.send(now, &message)?;
                    }
                }
            }
        }
        self.authority_events.extend(self.authority.take_events());
        Ok(())
    }

    /// Step at the configured tick rate, feeding each player's scripted
    /// input for the current tick.
    #[instrument(skip(self, scripts))]
    pub async fn run(
        &mut self,
        scripts: &BTreeMap<PlayerId, PlayerInputBuffer>,
        ticks: u32,
    ) -> Result<(), SessionError> {
        let tick_rate = self.config.tick_rate.max(1);
        let tick_duration = Duration::from_micros(1_000_000 / tick_rate as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        for _ in 0..ticks {
            tick_interval.tick().await;
            let inputs: BTreeMap<PlayerId, InputFrame> = scripts
                .iter()
                .map(|(player, buffer)| (*player, buffer.get_input_at(self.tick)))
                .collect();
            self.step(&inputs)?;
        }

        debug!(tick = self.tick, phase = ?self.authority.world.phase, "run finished");
        Ok(())
    }

    // =========================================================================
    // Convergence
    // =========================================================================

    /// State hash of every client replica.
    pub fn hashes(&self) -> BTreeMap<PlayerId, StateHash> {
        self.clients
            .iter()
            .map(|(player, link)| (*player, link.observer.state_hash()))
            .collect()
    }

    /// Do all replicas agree with the authority?
    pub fn converged(&self) -> bool {
        let expected = self.authority.state_hash();
        self.hashes().values().all(|h| *h == expected)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::GameEventData;
    use crate::game::services::ServiceCall;
    use crate::game::state::{MatchPhase, ObjectId, ThrowState};

    fn player(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn solo_config() -> GameConfig {
        let mut config = GameConfig::default();
        config.match_flow.expected_players = 1;
        config.match_flow.countdown_duration = 0.0;
        config
    }

    fn idle(session: &mut Session, ticks: u32) {
        for _ in 0..ticks {
            session.step(&BTreeMap::new()).unwrap();
        }
    }

    fn hold(session: &mut Session, who: PlayerId, frame: InputFrame) {
        let inputs = BTreeMap::from([(who, frame)]);
        session.step(&inputs).unwrap();
    }

    #[tokio::test]
    async fn test_join_errors() {
        let mut config = GameConfig::default();
        config.net.max_players = 2;
        let mut session: Session = Session::new(config);

        session.join(player(1)).unwrap();
        assert!(matches!(session.join(player(1)), Err(SessionError::AlreadyInSession)));
        session.add_ai(player(2)).unwrap();
        assert!(matches!(session.join(player(3)), Err(SessionError::SessionFull)));
        assert!(matches!(session.leave(player(9)), Err(SessionError::PlayerNotFound)));

        session.leave(player(2)).unwrap();
        assert_eq!(session.player_count(), 1);
        session.join(player(3)).unwrap();
    }

    #[tokio::test]
    async fn test_countdown_waits_for_expected_players() {
        let mut session: Session = Session::new(GameConfig::default());
        session.join(player(1)).unwrap();
        session.join(player(2)).unwrap();
        idle(&mut session, 10);

        assert_eq!(session.authority().world.phase, MatchPhase::Waiting);
        assert!(session
            .services(&player(1))
            .unwrap()
            .calls
            .iter()
            .all(|c| !matches!(c, ServiceCall::Countdown(..))));

        session.join(player(3)).unwrap();
        idle(&mut session, 10);

        assert!(matches!(session.authority().world.phase, MatchPhase::Countdown { .. }));
        for n in 1..=3 {
            let calls = &session.services(&player(n)).unwrap().calls;
            assert!(calls.contains(&ServiceCall::Countdown(player(n), 4.0)));
        }
        assert!(matches!(
            session.observer(&player(2)).unwrap().world.phase,
            MatchPhase::Countdown { .. }
        ));
    }

    #[tokio::test]
    async fn test_replicas_converge_after_start() {
        let mut session: Session = Session::new(GameConfig::default());
        for n in 1..=3 {
            session.join(player(n)).unwrap();
        }
        idle(&mut session, 260);

        assert_eq!(session.authority().world.phase, MatchPhase::Playing);
        assert!(session.converged());
    }

    #[tokio::test]
    async fn test_pull_and_throw_over_latency() {
        let mut session: Session = Session::new(solo_config());
        let me = player(1);
        session.join(me).unwrap();
        idle(&mut session, 5);
        assert_eq!(session.authority().world.phase, MatchPhase::Playing);

        let pull = InputFrame::new().holding(InputFrame::FLAG_PULL_OR_AIM);
        for _ in 0..120 {
            hold(&mut session, me, pull);
            let local = session.observer(&me).unwrap().world.character(&me).unwrap().throw.state();
            if local == ThrowState::Attached {
                break;
            }
        }
        let authority_state = session.authority().world.character(&me).unwrap().throw.state();
        assert_eq!(authority_state, ThrowState::Attached);
        assert_eq!(
            session.authority().world.character(&me).unwrap().throw.held(),
            Some(ObjectId(1))
        );

        hold(&mut session, me, InputFrame::new().holding(InputFrame::FLAG_THROW));
        idle(&mut session, 200);

        let events = session.take_authority_events();
        let started = events
            .iter()
            .position(|e| matches!(e.data, GameEventData::ThrowStarted { .. }))
            .unwrap();
        let launches: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.data, GameEventData::ObjectLaunched { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(launches.len(), 1);
        assert!(started < launches[0]);
        assert_eq!(session.authority().world.character(&me).unwrap().throw.state(), ThrowState::None);
        assert!(session.converged());
    }

    #[tokio::test]
    async fn test_spectator_replicates_without_character() {
        let mut session: Session = Session::new(solo_config());
        session.join(player(1)).unwrap();
        session.join_spectator(player(7)).unwrap();
        idle(&mut session, 10);

        let spectator = session.observer(&player(7)).unwrap();
        assert!(spectator.world.character(&player(7)).is_none());
        assert!(spectator.world.character(&player(1)).is_some());
        assert!(session.converged());
    }

    #[tokio::test]
    async fn test_run_follows_scripts() {
        let mut config = solo_config();
        config.tick_rate = 1000;
        let mut session: Session = Session::new(config);
        let me = player(1);
        session.join(me).unwrap();

        let mut script = PlayerInputBuffer::new(me);
        script.record(0, InputFrame::new());
        script.record(10, InputFrame::with_movement(127, 0));
        let scripts = BTreeMap::from([(me, script)]);

        session.run(&scripts, 40).await.unwrap();

        assert_eq!(session.tick(), 40);
        let position = session.authority().world.character(&me).unwrap().position;
        assert!(position.x > 0.0);
    }
}
