use crate::error::ProtocolError;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Lead-ins shown during setup, one per phrase a player has to write.
pub const SETUP_PROMPTS: [&str; 2] = ["Who is most likely to...", "Would you rather..."];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Player finished setup
    Ready { prompts: Prompts },
    /// Player's vote, an index into the current question's options
    Answer { choice: usize },
    // Host-only messages
    Begin,
    Next,
    /// Timer ran out, reveal now
    Timer,
    /// Drop every player connection and start over
    Purge,
}

impl ClientMessage {
    pub fn is_host_only(&self) -> bool {
        matches!(
            self,
            ClientMessage::Begin | ClientMessage::Next | ClientMessage::Timer | ClientMessage::Purge
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent to every participant on connect; both ids are needed to reconnect
    Welcome {
        session_id: u32,
        user_id: ParticipantId,
    },
    Setup {
        prompts: [String; 2],
        players: Vec<Player>,
    },
    /// A new player has joined (host only)
    Joined {
        player: Player,
    },
    Question {
        question: Question,
    },
    /// Vote count per option index
    Results {
        results: Vec<u32>,
    },
    /// Game over, final standings
    Finish {
        players: Vec<Player>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn setup(players: Vec<Player>) -> Self {
        ServerMessage::Setup {
            prompts: SETUP_PROMPTS.map(String::from),
            players,
        }
    }

    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            msg: msg.into(),
        }
    }
}

pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

pub fn encode(msg: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}
