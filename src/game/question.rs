use std::collections::BTreeMap;

use crate::types::PlayerId;

use super::{CORRECT_POINTS, CREATOR_POINTS};

/// One candidate answer to a question.
///
/// The seed answer from the question bank is the only `correct` one and has
/// no owner; every other answer belongs to the participant who wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub correct: bool,
    pub player: Option<PlayerId>,
    pub votes: Vec<PlayerId>,
}

impl Answer {
    pub fn seed(text: String) -> Self {
        Self {
            text,
            correct: true,
            player: None,
            votes: Vec::new(),
        }
    }

    pub fn owned(text: String, player: PlayerId) -> Self {
        Self {
            text,
            correct: false,
            player: Some(player),
            votes: Vec::new(),
        }
    }

    pub fn is_owned_by(&self, player: &PlayerId) -> bool {
        self.player.as_ref() == Some(player)
    }

    pub fn has_voted(&self, player: &PlayerId) -> bool {
        self.votes.iter().any(|v| v == player)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    pub multiplier: i64,
    /// Kept sorted by text
    pub answers: Vec<Answer>,
}

impl Question {
    pub fn new(text: String, correct_answer: String) -> Self {
        Self {
            text,
            multiplier: 1,
            answers: vec![Answer::seed(correct_answer)],
        }
    }

    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.correct)
    }

    pub(crate) fn insert_answer(&mut self, answer: Answer) {
        self.answers.push(answer);
        self.answers.sort_by(|a, b| a.text.cmp(&b.text));
    }

    /// Answer texts a participant may vote for (everything but their own).
    pub fn votable_by(&self, player: &PlayerId) -> Vec<String> {
        self.answers
            .iter()
            .filter(|a| !a.is_owned_by(player))
            .map(|a| a.text.clone())
            .collect()
    }
}

/// A single score change produced by a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    pub player: PlayerId,
    pub points: i64,
}

/// Point offsets for one finished round, grouped by answer text.
///
/// Answers nobody voted for do not appear, so a round without votes yields
/// an empty set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: BTreeMap<String, Vec<Offset>>,
}

impl ResultSet {
    pub fn new(question: &Question) -> Self {
        let mut entries: BTreeMap<String, Vec<Offset>> = BTreeMap::new();
        for answer in &question.answers {
            let mut creator_points = 0;
            for voter in &answer.votes {
                if answer.correct {
                    entries
                        .entry(answer.text.clone())
                        .or_default()
                        .push(Offset {
                            player: voter.clone(),
                            points: CORRECT_POINTS * question.multiplier,
                        });
                }
                creator_points += CREATOR_POINTS;
            }
            if let (true, Some(owner)) = (creator_points > 0, &answer.player) {
                entries
                    .entry(answer.text.clone())
                    .or_default()
                    .push(Offset {
                        player: owner.clone(),
                        points: creator_points * question.multiplier,
                    });
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Offsets earned through the answer with this text
    pub fn get(&self, answer_text: &str) -> Option<&[Offset]> {
        self.entries.get(answer_text).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Offset])> {
        self.entries
            .iter()
            .map(|(text, offsets)| (text.as_str(), offsets.as_slice()))
    }

    pub fn offsets(&self) -> impl Iterator<Item = &Offset> {
        self.entries.values().flatten()
    }
}
