//! Connection registry
//!
//! Maps participant ids to the outbound queue of their live transport. Owned
//! by the coordinator; sends never block, a transport that cannot keep up or
//! has gone away is dropped instead.

use std::collections::BTreeMap;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, ParticipantId, Role};

/// One live transport.
#[derive(Debug)]
pub struct Connection {
    pub participant: ParticipantId,
    pub connection: ConnectionId,
    pub name: String,
    pub role: Role,
    outbound: mpsc::Sender<ServerMessage>,
}

impl Connection {
    pub fn new(
        participant: ParticipantId,
        connection: ConnectionId,
        name: impl Into<String>,
        role: Role,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            participant,
            connection,
            name: name.into(),
            role,
            outbound,
        }
    }

    /// Queue a message for the writer task.
    ///
    /// Returns `false` if the queue is full or the writer is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "Outbound queue full for {:?} {}",
                    self.role,
                    self.participant
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(
                    "Outbound queue closed for {:?} {}",
                    self.role,
                    self.participant
                );
                false
            }
        }
    }
}

/// A transport removed because a send to it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dropped {
    pub participant: ParticipantId,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct Registry {
    host: Option<Connection>,
    players: BTreeMap<ParticipantId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the host, returning the one it replaces.
    pub fn register_host(&mut self, conn: Connection) -> Option<Connection> {
        self.host.replace(conn)
    }

    /// Install a player transport, returning an older transport for the same
    /// participant.
    pub fn register_player(&mut self, conn: Connection) -> Option<Connection> {
        self.players.insert(conn.participant, conn)
    }

    pub fn host(&self) -> Option<&Connection> {
        self.host.as_ref()
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn player(&self, id: ParticipantId) -> Option<&Connection> {
        self.players.get(&id)
    }

    /// Player transports in ascending id, which is join order.
    pub fn players(&self) -> impl Iterator<Item = &Connection> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Role of the participant if `connection` is its live transport.
    pub fn current_role(&self, id: ParticipantId, connection: ConnectionId) -> Option<Role> {
        match &self.host {
            Some(host) if host.participant == id => {
                (host.connection == connection).then_some(Role::Host)
            }
            _ => self
                .players
                .get(&id)
                .filter(|c| c.connection == connection)
                .map(|c| c.role),
        }
    }

    /// Remove a transport, but only if it is still the one registered for the
    /// participant. A reader that outlived a reconnect must not evict its
    /// replacement.
    pub fn remove(&mut self, id: ParticipantId, connection: ConnectionId) -> Option<Connection> {
        if self
            .host
            .as_ref()
            .is_some_and(|h| h.participant == id && h.connection == connection)
        {
            return self.host.take();
        }

        match self.players.get(&id) {
            Some(conn) if conn.connection == connection => self.players.remove(&id),
            _ => None,
        }
    }

    /// Drop every player transport. Their writers see the queue close and shut
    /// the sockets.
    pub fn clear_players(&mut self) -> usize {
        let count = self.players.len();
        self.players.clear();
        count
    }

    /// Send to one participant, dropping the transport on failure.
    pub fn send_to(&mut self, id: ParticipantId, msg: ServerMessage) -> Option<Dropped> {
        if self.host.as_ref().is_some_and(|h| h.participant == id) {
            return self.send_to_host(msg);
        }

        let conn = self.players.get(&id)?;
        if conn.send(msg) {
            return None;
        }
        self.players.remove(&id).map(|c| Dropped {
            participant: c.participant,
            role: c.role,
        })
    }

    pub fn send_to_host(&mut self, msg: ServerMessage) -> Option<Dropped> {
        let host = self.host.as_ref()?;
        if host.send(msg) {
            return None;
        }
        self.host.take().map(|c| Dropped {
            participant: c.participant,
            role: c.role,
        })
    }

    /// Deliver to every player and the host. A failed transport is dropped and
    /// reported; it never stops delivery to the rest.
    pub fn broadcast(&mut self, msg: &ServerMessage) -> Vec<Dropped> {
        tracing::debug!("Broadcasting {:?}", msg);

        let failed: Vec<ParticipantId> = self
            .players
            .values()
            .filter(|c| !c.send(msg.clone()))
            .map(|c| c.participant)
            .collect();

        let mut dropped: Vec<Dropped> = failed
            .into_iter()
            .filter_map(|id| self.players.remove(&id))
            .map(|c| Dropped {
                participant: c.participant,
                role: c.role,
            })
            .collect();

        dropped.extend(self.send_to_host(msg.clone()));
        dropped
    }
}
