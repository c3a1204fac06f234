//! Error families for the coordinator and its adapters

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::types::{GamePhase, PlayerId};

/// Errors raised by the round state machine and question generator.
///
/// These are reported back to whoever sent the offending message; they never
/// close a connection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("at least {required} players are needed, got {actual}")]
    NotEnoughPlayers { required: usize, actual: usize },

    #[error("not allowed while the game is in {0:?}")]
    WrongPhase(GamePhase),

    #[error("invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: GamePhase, to: GamePhase },

    #[error("player {0} is not part of this game")]
    UnknownPlayer(PlayerId),

    #[error("choice {choice} is out of range for {options} options")]
    InvalidChoice { choice: usize, options: usize },

    #[error("player {0} already answered this question")]
    AlreadyAnswered(PlayerId),

    #[error("no game in progress")]
    NoGame,

    #[error("a game is already in progress")]
    GameInProgress,
}

impl GameError {
    /// Stable code sent in `error` messages.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotEnoughPlayers { .. } => "NOT_ENOUGH_PLAYERS",
            GameError::WrongPhase(_) => "WRONG_PHASE",
            GameError::InvalidTransition { .. } => "INVALID_TRANSITION",
            GameError::UnknownPlayer(_) => "UNKNOWN_PLAYER",
            GameError::InvalidChoice { .. } => "INVALID_CHOICE",
            GameError::AlreadyAnswered(_) => "ALREADY_ANSWERED",
            GameError::NoGame => "NO_GAME",
            GameError::GameInProgress => "GAME_IN_PROGRESS",
        }
    }
}

/// Handshake rejections, turned into an HTTP response before any upgrade.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoinError {
    #[error("Host must be connected to join game")]
    HostMissing,

    #[error("must have name")]
    MissingName,

    #[error("server is busy, try again")]
    Unavailable,
}

impl IntoResponse for JoinError {
    fn into_response(self) -> Response {
        let status = match self {
            JoinError::HostMissing | JoinError::MissingName => StatusCode::BAD_REQUEST,
            JoinError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Wire encoding failures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failures talking to the coordinator task from outside.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator queue is full")]
    Unavailable,

    #[error("coordinator has shut down")]
    Closed,
}

impl From<CoordinatorError> for JoinError {
    fn from(_: CoordinatorError) -> Self {
        JoinError::Unavailable
    }
}
