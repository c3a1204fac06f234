use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant ids are handed out by the coordinator and never reused.
pub type ParticipantId = u64;
pub type PlayerId = ParticipantId;

/// Identifies one physical transport. A participant that reconnects gets a
/// new connection id while keeping its participant id.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
}

/// Identifies one game instance; minted again every time a host connects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub session_id: u32,
    pub issued_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(session_id: u32) -> Self {
        Self {
            session_id,
            issued_at: Utc::now(),
        }
    }

    pub fn matches(&self, session_id: u32) -> bool {
        self.session_id == session_id
    }
}

/// Phrases a player writes during setup, later turned into questions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Prompts {
    pub most_likely: String,
    pub would_you_rather: String,
    /// Stored with the rest of the prompts but not used for questions yet.
    pub take_a_shot: Option<PlayerId>,
    pub blind_answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub points: u32,
    #[serde(skip)]
    pub prompts: Prompts,
    #[serde(skip)]
    pub connected: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            points: 0,
            prompts: Prompts::default(),
            connected: true,
        }
    }
}

/// One selectable answer. The owner stays on the server; clients only learn
/// who it belonged to through the tally and their own score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerOption {
    pub text: String,
    #[serde(skip)]
    pub vote_count: u32,
    #[serde(skip)]
    pub owner: PlayerId,
}

impl AnswerOption {
    pub fn new(text: impl Into<String>, owner: PlayerId) -> Self {
        Self {
            text: text.into(),
            vote_count: 0,
            owner,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub text: String,
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    /// Waiting for every player to send their prompts.
    Setup,
    Question,
    Results,
    Finished,
}
