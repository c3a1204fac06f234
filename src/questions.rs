//! Question pool generation
//!
//! Builds every question of a game from the roster and the prompts each
//! player submitted during setup. Pure apart from the injected RNG, so a
//! seeded generator gives a reproducible pool.

use std::collections::VecDeque;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use crate::error::GameError;
use crate::types::{AnswerOption, Player, Question};

pub const MIN_PLAYERS: usize = 4;

/// Most-likely questions offer up to this many other players as options.
const MOST_LIKELY_OPTIONS: usize = 4;

const MOST_LIKELY_LEAD_IN: &str = "Who is most likely to";
const WOULD_YOU_RATHER_TEXT: &str = "Would you rather...";

const BLIND_LEAD_INS: &[&str] = &[
    "The last thing I say to my mum before bed...",
    "Something you say to a disappointed coach:",
    "The motto of a lone wolf",
    "A quote from a Facebook mom",
    "After the funeral I thought...",
    "At my cousin's tenth birthday I sang...",
];

/// Build the shuffled question queue for one game.
///
/// Produces one most-likely question per player, one would-you-rather
/// question per pair and one blind-answer question per quartet.
pub fn make_questions<R: Rng + ?Sized>(
    players: &[Player],
    rng: &mut R,
) -> Result<VecDeque<Question>, GameError> {
    if players.len() < MIN_PLAYERS {
        return Err(GameError::NotEnoughPlayers {
            required: MIN_PLAYERS,
            actual: players.len(),
        });
    }

    let mut questions = Vec::new();
    questions.extend(most_likely_questions(players, rng));
    questions.extend(would_you_rather_questions(players));
    questions.extend(blind_questions(players, rng));

    questions.shuffle(rng);
    Ok(questions.into())
}

fn most_likely_questions<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Vec<Question> {
    players
        .iter()
        .map(|asker| {
            let others: Vec<&Player> = players.iter().filter(|p| p.id != asker.id).collect();
            let options = others
                .choose_multiple(rng, MOST_LIKELY_OPTIONS)
                .map(|p| AnswerOption::new(p.name.clone(), p.id))
                .collect();

            Question {
                text: most_likely_text(&asker.prompts.most_likely),
                options,
            }
        })
        .collect()
}

/// "Eat a whole pizza?" becomes "Who is most likely to eat a whole pizza?"
fn most_likely_text(phrase: &str) -> String {
    let phrase = phrase.trim().to_lowercase();
    let phrase = phrase.strip_suffix('?').unwrap_or(&phrase).trim_end();
    format!("{} {}?", MOST_LIKELY_LEAD_IN, phrase)
}

/// Each option carries one player's phrase but belongs to the other player of
/// the pair: answering right means guessing who wrote what.
fn would_you_rather_questions(players: &[Player]) -> Vec<Question> {
    // The first player sits out when the roster is odd.
    let paired = if players.len() % 2 != 0 {
        &players[1..]
    } else {
        players
    };

    paired
        .chunks_exact(2)
        .map(|pair| {
            let (p1, p2) = (&pair[0], &pair[1]);
            Question {
                text: WOULD_YOU_RATHER_TEXT.to_string(),
                options: vec![
                    AnswerOption::new(p1.prompts.would_you_rather.clone(), p2.id),
                    AnswerOption::new(p2.prompts.would_you_rather.clone(), p1.id),
                ],
            }
        })
        .collect()
}

fn blind_questions<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Vec<Question> {
    players
        .chunks_exact(4)
        .map(|quartet| Question {
            text: BLIND_LEAD_INS
                .choose(rng)
                .copied()
                .unwrap_or(BLIND_LEAD_INS[0])
                .to_string(),
            options: quartet
                .iter()
                .map(|p| AnswerOption::new(p.prompts.blind_answer.clone(), p.id))
                .collect(),
        })
        .collect()
}
