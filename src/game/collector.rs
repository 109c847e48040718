//! Per-round submission policy.
//!
//! A round either collects answers, collects votes, or accepts nothing.
//! Each collecting phase expects one submission per participant and
//! rejects everything once that quota is used up.

use crate::types::{clean_text, text_len, PlayerId};

use super::question::{Answer, Question};
use super::{GameError, MAX_ANSWER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collector {
    /// Between rounds, before the first round and after the last one
    Inert,
    Answers { remaining: usize },
    Votes { remaining: usize },
}

impl Collector {
    pub fn remaining(&self) -> usize {
        match self {
            Self::Inert => 0,
            Self::Answers { remaining } | Self::Votes { remaining } => *remaining,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Record one submission against `question`. Fails without touching the
    /// question when the submission is not acceptable.
    pub fn collect(
        &mut self,
        question: &mut Question,
        player: &PlayerId,
        text: &str,
    ) -> Result<(), GameError> {
        if self.is_complete() {
            return Err(GameError::Completed);
        }
        match self {
            Self::Inert => return Err(GameError::Completed),
            Self::Answers { .. } => collect_answer(question, player, text)?,
            Self::Votes { .. } => collect_vote(question, player, text)?,
        }
        if let Self::Answers { remaining } | Self::Votes { remaining } = self {
            *remaining -= 1;
        }
        Ok(())
    }
}

fn collect_answer(question: &mut Question, player: &PlayerId, text: &str) -> Result<(), GameError> {
    let text = clean_text(text);
    let len = text_len(&text);
    if len < 1 {
        return Err(GameError::ShortAnswer);
    }
    if len > MAX_ANSWER_LEN {
        return Err(GameError::LongAnswer);
    }
    if question.answers.iter().any(|a| a.text == text) {
        return Err(GameError::DupAnswer);
    }
    if question.answers.iter().any(|a| a.is_owned_by(player)) {
        return Err(GameError::Completed);
    }
    question.insert_answer(Answer::owned(text, player.clone()));
    Ok(())
}

fn collect_vote(question: &mut Question, player: &PlayerId, text: &str) -> Result<(), GameError> {
    if question.answers.iter().any(|a| a.has_voted(player)) {
        return Err(GameError::Completed);
    }
    let text = clean_text(text);
    let answer = question
        .answers
        .iter_mut()
        .find(|a| a.text == text)
        .ok_or(GameError::NoAnswer)?;
    if answer.is_owned_by(player) {
        return Err(GameError::OwnAnswer);
    }
    answer.votes.push(player.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> PlayerId {
        id.to_string()
    }

    #[test]
    fn test_inert_rejects_everything() {
        let mut question = Question::new("Fruit?".to_string(), "APPLE".to_string());
        let mut collector = Collector::Inert;
        assert!(collector.is_complete());
        assert_eq!(
            collector.collect(&mut question, &p("p1"), "Apple"),
            Err(GameError::Completed)
        );
        assert_eq!(question.answers.len(), 1);
    }

    #[test]
    fn test_answer_collector() {
        let mut question = Question::new("Fruit?".to_string(), "APPLE".to_string());
        let mut collector = Collector::Answers { remaining: 2 };

        assert_eq!(
            collector.collect(&mut question, &p("p1"), " "),
            Err(GameError::ShortAnswer)
        );
        assert_eq!(
            collector.collect(&mut question, &p("p1"), &"x".repeat(MAX_ANSWER_LEN + 1)),
            Err(GameError::LongAnswer)
        );
        assert_eq!(
            collector.collect(&mut question, &p("p1"), " apple"),
            Err(GameError::DupAnswer)
        );
        assert_eq!(collector.collect(&mut question, &p("p1"), "Cherry"), Ok(()));
        assert_eq!(collector.remaining(), 1);
        assert_eq!(
            collector.collect(&mut question, &p("p1"), "Banana"),
            Err(GameError::Completed)
        );
        assert_eq!(
            collector.collect(&mut question, &p("p2"), "cherry"),
            Err(GameError::DupAnswer)
        );
        assert_eq!(collector.collect(&mut question, &p("p2"), "Banana"), Ok(()));
        assert_eq!(collector.remaining(), 0);
        assert!(collector.is_complete());
        assert_eq!(
            collector.collect(&mut question, &p("p3"), "Date"),
            Err(GameError::Completed)
        );

        let texts: Vec<_> = question.answers.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["APPLE", "BANANA", "CHERRY"]);
        assert_eq!(question.answers[2].player, Some(p("p1")));
    }

    #[test]
    fn test_answer_at_length_limit_is_accepted() {
        let mut question = Question::new("Fruit?".to_string(), "APPLE".to_string());
        let mut collector = Collector::Answers { remaining: 1 };
        let text = "y".repeat(MAX_ANSWER_LEN);
        assert_eq!(collector.collect(&mut question, &p("p1"), &text), Ok(()));
    }

    #[test]
    fn test_vote_collector() {
        let mut question = Question::new("Fruit?".to_string(), "APPLE".to_string());
        question.insert_answer(Answer {
            text: "BANANA".to_string(),
            correct: false,
            player: None,
            votes: Vec::new(),
        });
        question.insert_answer(Answer::owned("CARROT".to_string(), p("p1")));
        let mut collector = Collector::Votes { remaining: 2 };

        assert_eq!(
            collector.collect(&mut question, &p("p1"), "Carrot"),
            Err(GameError::OwnAnswer)
        );
        assert_eq!(collector.collect(&mut question, &p("p1"), "Apple"), Ok(()));
        assert_eq!(collector.remaining(), 1);
        assert_eq!(
            collector.collect(&mut question, &p("p1"), "Banana"),
            Err(GameError::Completed)
        );
        assert_eq!(
            collector.collect(&mut question, &p("p2"), "Nonexistent"),
            Err(GameError::NoAnswer)
        );
        assert_eq!(collector.collect(&mut question, &p("p2"), " apple "), Ok(()));
        assert_eq!(collector.remaining(), 0);
        assert_eq!(question.answers[0].votes, vec![p("p1"), p("p2")]);
    }

    #[test]
    fn test_remaining_reflects_variant() {
        assert_eq!(Collector::Inert.remaining(), 0);
        assert!(!Collector::Answers { remaining: 2 }.is_complete());
        assert!(Collector::Votes { remaining: 0 }.is_complete());
    }
}
