//! Round state machine
//!
//! Owns the players of one game, their scores and the question queue. Every
//! method is synchronous; the coordinator is the only caller.

use std::collections::{HashSet, VecDeque};

use rand::Rng;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::questions::{make_questions, MIN_PLAYERS};
use crate::types::*;

/// Something the caller has to announce after a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// A new question is up
    Dealt(Question),
    /// Tally of the current question, one count per option index
    Revealed(Vec<u32>),
    /// Pool exhausted, final standings
    Finished(Vec<Player>),
}

#[derive(Debug)]
pub struct Game {
    phase: GamePhase,
    players: Vec<Player>,
    config: GameConfig,
    ready: HashSet<PlayerId>,
    current: Option<Question>,
    remaining: VecDeque<Question>,
    answered: HashSet<PlayerId>,
    answered_count: usize,
}

impl Game {
    /// Start a game in `Setup` with the given roster, kept in the given order.
    pub fn new(players: Vec<Player>, config: GameConfig) -> Self {
        Self {
            phase: GamePhase::Setup,
            players,
            config,
            ready: HashSet::new(),
            current: None,
            remaining: VecDeque::new(),
            answered: HashSet::new(),
            answered_count: 0,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn answered_count(&self) -> usize {
        self.answered_count
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, GameError> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(GameError::UnknownPlayer(id))
    }

    fn is_valid_transition(from: GamePhase, to: GamePhase) -> bool {
        use GamePhase::*;

        matches!(
            (from, to),
            (Setup, Question)
                | (Setup, Finished)
                | (Question, Results)
                | (Question, Question)
                | (Results, Question)
                | (Question, Finished)
                | (Results, Finished)
        )
    }

    fn transition(&mut self, to: GamePhase) -> Result<(), GameError> {
        if !Self::is_valid_transition(self.phase, to) {
            return Err(GameError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::info!("Game phase {:?} -> {:?}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn require_phase(&self, phase: GamePhase) -> Result<(), GameError> {
        if self.phase != phase {
            return Err(GameError::WrongPhase(self.phase));
        }
        Ok(())
    }

    /// Store a player's prompts. Once every connected player is ready the
    /// question pool is built and the first question dealt.
    pub fn ready<R: Rng + ?Sized>(
        &mut self,
        id: PlayerId,
        prompts: Prompts,
        rng: &mut R,
    ) -> Result<Option<Progress>, GameError> {
        self.require_phase(GamePhase::Setup)?;
        self.player_mut(id)?.prompts = prompts;
        self.ready.insert(id);
        tracing::info!(
            "Player {} ready ({}/{})",
            id,
            self.ready.len(),
            self.players.len()
        );

        self.try_start(rng)
    }

    fn connected(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.connected)
    }

    fn all_ready(&self) -> bool {
        let mut connected = self.connected().peekable();
        connected.peek().is_some() && connected.all(|p| self.ready.contains(&p.id))
    }

    fn all_answered(&self) -> bool {
        let mut connected = self.connected().peekable();
        connected.peek().is_some() && connected.all(|p| self.answered.contains(&p.id))
    }

    fn try_start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<Progress>, GameError> {
        if self.phase != GamePhase::Setup || !self.all_ready() {
            return Ok(None);
        }

        // Players who left before sending prompts have nothing to ask about
        let contributors: Vec<Player> = self
            .players
            .iter()
            .filter(|p| self.ready.contains(&p.id))
            .cloned()
            .collect();
        if contributors.len() < MIN_PLAYERS {
            tracing::warn!(
                "Only {} players sent prompts, ending game",
                contributors.len()
            );
            self.transition(GamePhase::Finished)?;
            return Ok(Some(Progress::Finished(self.standings())));
        }

        self.remaining = make_questions(&contributors, rng)?;
        tracing::info!("Question pool ready: {} questions", self.remaining.len());
        self.deal().map(Some)
    }

    /// Deal the next question, or finish when the pool is empty.
    fn deal(&mut self) -> Result<Progress, GameError> {
        self.answered.clear();
        self.answered_count = 0;

        match self.remaining.pop_front() {
            Some(question) => {
                self.transition(GamePhase::Question)?;
                self.current = Some(question.clone());
                Ok(Progress::Dealt(question))
            }
            None => {
                self.transition(GamePhase::Finished)?;
                self.current = None;
                Ok(Progress::Finished(self.standings()))
            }
        }
    }

    /// Record a vote. Picking the option you own scores a point. Returns the
    /// tally once every connected player has answered.
    pub fn answer(&mut self, id: PlayerId, choice: usize) -> Result<Option<Progress>, GameError> {
        self.require_phase(GamePhase::Question)?;
        if !self.contains(id) {
            return Err(GameError::UnknownPlayer(id));
        }
        if self.answered.contains(&id) && !self.config.allow_repeat_answers {
            return Err(GameError::AlreadyAnswered(id));
        }

        let question = self.current.as_mut().ok_or(GameError::WrongPhase(self.phase))?;
        let options = question.options.len();
        let option = question
            .options
            .get_mut(choice)
            .ok_or(GameError::InvalidChoice { choice, options })?;

        option.vote_count += 1;
        let owner = option.owner;
        self.answered.insert(id);
        self.answered_count += 1;

        if owner == id {
            let player = self.player_mut(id)?;
            player.points += 1;
            tracing::info!("Player {} picked themselves, now at {}", id, player.points);
        }

        self.try_reveal()
    }

    fn try_reveal(&mut self) -> Result<Option<Progress>, GameError> {
        if self.phase != GamePhase::Question || !self.all_answered() {
            return Ok(None);
        }
        self.reveal().map(|results| Some(Progress::Revealed(results)))
    }

    /// Show the tally now, however many answers are in.
    pub fn reveal(&mut self) -> Result<Vec<u32>, GameError> {
        match self.phase {
            GamePhase::Question => {
                self.transition(GamePhase::Results)?;
                Ok(self.results())
            }
            GamePhase::Results => Ok(self.results()),
            phase => Err(GameError::WrongPhase(phase)),
        }
    }

    /// Move on to the next question. Once the pool is empty this keeps
    /// returning the final standings.
    pub fn next_question(&mut self) -> Result<Progress, GameError> {
        match self.phase {
            GamePhase::Question | GamePhase::Results => self.deal(),
            GamePhase::Finished => Ok(Progress::Finished(self.standings())),
            phase => Err(GameError::WrongPhase(phase)),
        }
    }

    pub fn results(&self) -> Vec<u32> {
        self.current
            .as_ref()
            .map(|q| q.options.iter().map(|o| o.vote_count).collect())
            .unwrap_or_default()
    }

    /// Players by points, highest first; ties keep roster order.
    pub fn standings(&self) -> Vec<Player> {
        let mut players = self.players.clone();
        players.sort_by(|a, b| b.points.cmp(&a.points));
        if let Some(size) = self.config.podium_size {
            players.truncate(size);
        }
        players
    }

    /// Take a disconnected player out of the ready and answer thresholds.
    /// The record, its score and any vote already cast stay. May complete the
    /// setup or the current question.
    pub fn remove<R: Rng + ?Sized>(
        &mut self,
        id: PlayerId,
        rng: &mut R,
    ) -> Result<Option<Progress>, GameError> {
        self.player_mut(id)?.connected = false;
        tracing::info!("Player {} left the game", id);

        match self.phase {
            GamePhase::Setup => self.try_start(rng),
            GamePhase::Question => self.try_reveal(),
            _ => Ok(None),
        }
    }

    /// Re-attach a returning player to their record.
    pub fn rejoin(&mut self, id: PlayerId, name: &str) -> Result<&Player, GameError> {
        let player = self.player_mut(id)?;
        player.connected = true;
        if !name.is_empty() {
            player.name = name.to_string();
        }
        Ok(player)
    }
}
