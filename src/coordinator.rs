//! Session coordinator
//!
//! A single task owns the connection registry and the game. Connection
//! adapters only talk to it through [`CoordinatorHandle`], which enqueues
//! [`Event`]s; the coordinator applies them one at a time, so no two
//! mutations ever interleave. Handlers never await: their only side effects
//! are registry and game mutation and queueing outbound messages.

use std::collections::{HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio_util::sync::CancellationToken;

use crate::config::GameConfig;
use crate::error::{CoordinatorError, GameError, JoinError};
use crate::game::{Game, Progress};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::questions::MIN_PLAYERS;
use crate::registry::{Connection, Dropped, Registry};
use crate::types::*;

/// Name the host is registered under.
const HOST_NAME: &str = "HOST";

/// Query parameters a player connects with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinRequest {
    pub name: String,
    pub user_id: Option<ParticipantId>,
    pub session_id: Option<u32>,
}

/// What an accepted transport needs to know about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub participant: ParticipantId,
    pub connection: ConnectionId,
    pub session_id: u32,
    /// The claimed user id was honoured
    pub reconnected: bool,
}

#[derive(Debug)]
pub enum Event {
    HostConnected {
        outbound: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Accepted>,
    },
    PlayerConnected {
        request: JoinRequest,
        outbound: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<Accepted, JoinError>>,
    },
    Disconnected {
        participant: ParticipantId,
        connection: ConnectionId,
    },
    Inbound {
        participant: ParticipantId,
        connection: ConnectionId,
        message: ClientMessage,
    },
    Broadcast(ServerMessage),
}

impl From<Progress> for ServerMessage {
    fn from(progress: Progress) -> Self {
        match progress {
            Progress::Dealt(question) => ServerMessage::Question { question },
            Progress::Revealed(results) => ServerMessage::Results { results },
            Progress::Finished(players) => ServerMessage::Finish { players },
        }
    }
}

/// Cloneable sending side of the coordinator's event queue.
///
/// Every method enqueues without waiting for space; a full queue is reported
/// as [`CoordinatorError::Unavailable`] so callers can drop their connection
/// instead of stalling.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: mpsc::Sender<Event>,
}

impl CoordinatorHandle {
    fn submit(&self, event: Event) -> Result<(), CoordinatorError> {
        self.events.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => CoordinatorError::Unavailable,
            TrySendError::Closed(_) => CoordinatorError::Closed,
        })
    }

    pub async fn connect_host(
        &self,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Accepted, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Event::HostConnected { outbound, reply })?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    pub async fn connect_player(
        &self,
        request: JoinRequest,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Accepted, JoinError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Event::PlayerConnected {
            request,
            outbound,
            reply,
        })?;
        rx.await.map_err(|_| JoinError::Unavailable)?
    }

    pub fn disconnected(
        &self,
        participant: ParticipantId,
        connection: ConnectionId,
    ) -> Result<(), CoordinatorError> {
        self.submit(Event::Disconnected {
            participant,
            connection,
        })
    }

    pub fn inbound(
        &self,
        participant: ParticipantId,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), CoordinatorError> {
        self.submit(Event::Inbound {
            participant,
            connection,
            message,
        })
    }

    pub fn broadcast(&self, message: ServerMessage) -> Result<(), CoordinatorError> {
        self.submit(Event::Broadcast(message))
    }
}

pub struct Coordinator<R = StdRng> {
    events: mpsc::Receiver<Event>,
    registry: Registry,
    game: Option<Game>,
    session: Option<SessionToken>,
    /// Player ids handed out under the current session token
    issued: HashSet<ParticipantId>,
    next_participant: ParticipantId,
    next_connection: ConnectionId,
    config: GameConfig,
    rng: R,
}

impl Coordinator<StdRng> {
    pub fn new(event_queue: usize, config: GameConfig) -> (Self, CoordinatorHandle) {
        Self::with_rng(event_queue, config, StdRng::from_os_rng())
    }
}

impl<R: Rng> Coordinator<R> {
    /// Build a coordinator drawing session ids and question pools from `rng`.
    pub fn with_rng(event_queue: usize, config: GameConfig, rng: R) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(event_queue);
        let coordinator = Self {
            events: rx,
            registry: Registry::new(),
            game: None,
            session: None,
            issued: HashSet::new(),
            next_participant: 0,
            next_connection: 0,
            config,
            rng,
        };
        (coordinator, CoordinatorHandle { events: tx })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    pub fn session(&self) -> Option<&SessionToken> {
        self.session.as_ref()
    }

    /// Process events until `shutdown` fires or every handle is dropped, then
    /// drain what is already queued and close all transports.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Coordinator running");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        self.events.close();
        let mut drained = 0;
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(event);
            drained += 1;
        }

        tracing::info!("Coordinator shutting down, drained {} events", drained);
    }

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::HostConnected { outbound, reply } => {
                let accepted = self.accept_host(outbound);
                if reply.send(accepted).is_err() {
                    tracing::debug!("Host handshake went away before accept");
                }
            }
            Event::PlayerConnected {
                request,
                outbound,
                reply,
            } => {
                let result = self.accept_player(request, outbound);
                if reply.send(result).is_err() {
                    tracing::debug!("Player handshake went away before accept");
                }
            }
            Event::Disconnected {
                participant,
                connection,
            } => self.disconnect(participant, connection),
            Event::Inbound {
                participant,
                connection,
                message,
            } => self.handle_message(participant, connection, message),
            Event::Broadcast(message) => self.broadcast(message),
        }
    }

    fn next_participant_id(&mut self) -> ParticipantId {
        self.next_participant += 1;
        self.next_participant
    }

    fn next_connection_id(&mut self) -> ConnectionId {
        self.next_connection += 1;
        self.next_connection
    }

    fn mint_session(&mut self) -> SessionToken {
        let previous = self.session.as_ref().map(|s| s.session_id);
        let session_id = loop {
            let id: u32 = self.rng.random();
            if id != 0 && Some(id) != previous {
                break id;
            }
        };
        SessionToken::new(session_id)
    }

    /// Install a new host. Discards the previous host, every player
    /// connection and the game, and issues a new session token.
    pub fn accept_host(&mut self, outbound: mpsc::Sender<ServerMessage>) -> Accepted {
        let token = self.mint_session();
        let session_id = token.session_id;
        tracing::info!("New session: {}", session_id);
        self.session = Some(token);

        let participant = self.next_participant_id();
        let connection = self.next_connection_id();

        let dropped = self.registry.clear_players();
        if dropped > 0 {
            tracing::info!("Dropped {} player connections from the old session", dropped);
        }
        self.issued.clear();
        self.game = None;

        let host = Connection::new(participant, connection, HOST_NAME, Role::Host, outbound);
        if let Some(old) = self.registry.register_host(host) {
            tracing::info!("Host {} replaced by {}", old.participant, participant);
        }
        tracing::info!("Host connected: {}", participant);

        self.send_to(
            participant,
            ServerMessage::Welcome {
                session_id,
                user_id: participant,
            },
        );

        Accepted {
            participant,
            connection,
            session_id,
            reconnected: false,
        }
    }

    /// Admit a player. A current session id with a user id issued under it is
    /// a reconnect and keeps the id; anything else gets a fresh id.
    pub fn accept_player(
        &mut self,
        request: JoinRequest,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Accepted, JoinError> {
        if !self.registry.has_host() {
            tracing::warn!("Rejected player {:?}: no host", request.name);
            return Err(JoinError::HostMissing);
        }
        let name = request.name.trim();
        if name.is_empty() {
            return Err(JoinError::MissingName);
        }
        let token = self.session.as_ref().ok_or(JoinError::HostMissing)?;
        let session_id = token.session_id;

        let claimed = match (request.session_id, request.user_id) {
            (Some(sid), Some(uid)) if token.matches(sid) && self.issued.contains(&uid) => {
                Some(uid)
            }
            _ => None,
        };

        let reconnected = claimed.is_some();
        let participant = match claimed {
            Some(id) => {
                tracing::info!("Player {} reconnected with valid session", id);
                id
            }
            None => {
                if request.session_id.is_some() {
                    tracing::info!("Player attempted invalid/expired session");
                }
                let id = self.next_participant_id();
                self.issued.insert(id);
                id
            }
        };
        let connection = self.next_connection_id();

        let conn = Connection::new(participant, connection, name, Role::Player, outbound);
        if let Some(old) = self.registry.register_player(conn) {
            tracing::info!(
                "Player {} replaced transport {} with {}",
                participant,
                old.connection,
                connection
            );
        }

        let player = match self.game.as_mut() {
            Some(game) if game.contains(participant) => game
                .rejoin(participant, name)
                .map(Player::clone)
                .unwrap_or_else(|_| Player::new(participant, name)),
            _ => Player::new(participant, name),
        };
        tracing::info!("Player {} connected: {}", participant, player.name);

        self.send_to(
            participant,
            ServerMessage::Welcome {
                session_id,
                user_id: participant,
            },
        );
        if let Some(dropped) = self.registry.send_to_host(ServerMessage::Joined { player }) {
            self.transport_lost(dropped);
        }
        if reconnected {
            self.catch_up(participant);
        }

        Ok(Accepted {
            participant,
            connection,
            session_id,
            reconnected,
        })
    }

    /// Bring a returning game player back to where the game is.
    fn catch_up(&mut self, participant: ParticipantId) {
        let Some(game) = self.game.as_ref() else {
            return;
        };
        if !game.contains(participant) {
            return;
        }

        let msg = match game.phase() {
            GamePhase::Setup => ServerMessage::setup(game.players().to_vec()),
            GamePhase::Question => match game.current_question() {
                Some(question) => ServerMessage::Question {
                    question: question.clone(),
                },
                None => return,
            },
            GamePhase::Results => ServerMessage::Results {
                results: game.results(),
            },
            GamePhase::Finished => ServerMessage::Finish {
                players: game.standings(),
            },
        };
        self.send_to(participant, msg);
    }

    /// A reader task ended. Only acts if the transport is still the live one.
    pub fn disconnect(&mut self, participant: ParticipantId, connection: ConnectionId) {
        let Some(conn) = self.registry.remove(participant, connection) else {
            tracing::debug!(
                "Ignoring disconnect of stale transport {} for {}",
                connection,
                participant
            );
            return;
        };

        tracing::info!("{:?} {} disconnected: {}", conn.role, participant, conn.name);
        if conn.role == Role::Player {
            if let Some(progress) = self.player_left(participant) {
                self.broadcast(progress.into());
            }
        }
    }

    fn player_left(&mut self, participant: ParticipantId) -> Option<Progress> {
        let game = self.game.as_mut().filter(|g| g.contains(participant))?;
        match game.remove(participant, &mut self.rng) {
            Ok(progress) => progress,
            Err(e) => {
                tracing::warn!("Failed to remove player {}: {}", participant, e);
                None
            }
        }
    }

    fn transport_lost(&mut self, dropped: Dropped) -> Option<Progress> {
        tracing::warn!(
            "Dropped {:?} {} after failed send",
            dropped.role,
            dropped.participant
        );
        match dropped.role {
            Role::Player => self.player_left(dropped.participant),
            Role::Host => None,
        }
    }

    /// Deliver to everyone. Transports that fail are treated as disconnects,
    /// which can in turn complete the current question.
    pub fn broadcast(&mut self, msg: ServerMessage) {
        let mut pending = VecDeque::from([msg]);
        while let Some(msg) = pending.pop_front() {
            for dropped in self.registry.broadcast(&msg) {
                if let Some(progress) = self.transport_lost(dropped) {
                    pending.push_back(progress.into());
                }
            }
        }
    }

    fn send_to(&mut self, participant: ParticipantId, msg: ServerMessage) {
        if let Some(dropped) = self.registry.send_to(participant, msg) {
            if let Some(progress) = self.transport_lost(dropped) {
                self.broadcast(progress.into());
            }
        }
    }

    /// Apply one client message. Game errors go back to the sender only.
    pub fn handle_message(
        &mut self,
        participant: ParticipantId,
        connection: ConnectionId,
        msg: ClientMessage,
    ) {
        let Some(role) = self.registry.current_role(participant, connection) else {
            tracing::debug!(
                "Ignoring message from stale transport {} for {}",
                connection,
                participant
            );
            return;
        };

        if msg.is_host_only() && role != Role::Host {
            self.send_to(
                participant,
                ServerMessage::error("UNAUTHORIZED", "Only the host can do that"),
            );
            return;
        }
        if !msg.is_host_only() && role != Role::Player {
            self.send_to(
                participant,
                ServerMessage::error("UNAUTHORIZED", "Only players can do that"),
            );
            return;
        }

        let result = match msg {
            ClientMessage::Begin => self.begin(),
            ClientMessage::Purge => {
                self.purge();
                Ok(None)
            }
            ClientMessage::Next => self.with_game(|game, _| game.next_question().map(Some)),
            ClientMessage::Timer => self.with_game(|game, _| {
                game.reveal().map(|results| Some(Progress::Revealed(results)))
            }),
            ClientMessage::Ready { prompts } => {
                self.with_game(|game, rng| game.ready(participant, prompts, rng))
            }
            ClientMessage::Answer { choice } => {
                self.with_game(|game, _| game.answer(participant, choice))
            }
        };

        match result {
            Ok(Some(msg)) => self.broadcast(msg),
            Ok(None) => {}
            Err(e) => {
                tracing::info!("Rejected message from {}: {}", participant, e);
                self.send_to(participant, ServerMessage::error(e.code(), e.to_string()));
            }
        }
    }

    fn with_game(
        &mut self,
        f: impl FnOnce(&mut Game, &mut R) -> Result<Option<Progress>, GameError>,
    ) -> Result<Option<ServerMessage>, GameError> {
        let game = self.game.as_mut().ok_or(GameError::NoGame)?;
        Ok(f(game, &mut self.rng)?.map(ServerMessage::from))
    }

    /// Start a game with every connected player, in join order.
    fn begin(&mut self) -> Result<Option<ServerMessage>, GameError> {
        if self
            .game
            .as_ref()
            .is_some_and(|g| g.phase() != GamePhase::Finished)
        {
            return Err(GameError::GameInProgress);
        }

        let players: Vec<Player> = self
            .registry
            .players()
            .map(|c| Player::new(c.participant, c.name.clone()))
            .collect();
        if players.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers {
                required: MIN_PLAYERS,
                actual: players.len(),
            });
        }

        tracing::info!("Starting game with {} players", players.len());
        self.game = Some(Game::new(players.clone(), self.config.clone()));
        Ok(Some(ServerMessage::setup(players)))
    }

    /// Drop every player connection and the game; the host and session stay.
    fn purge(&mut self) {
        let dropped = self.registry.clear_players();
        self.game = None;
        tracing::info!("Purged {} player connections", dropped);
    }
}
