//! Quiz game state machine
//!
//! A [`Game`] walks a fixed list of questions. Each round first collects one
//! made-up answer per participant, then one vote per participant, then
//! scores the votes. The game never talks to the network itself: every
//! state change queues [`Notification`]s which the owning room drains and
//! delivers.

mod collector;
mod question;
mod repo;

pub use collector::Collector;
pub use question::{Answer, Offset, Question, ResultSet};
pub use repo::{QuestionRepo, RepoError};

use crate::types::PlayerId;

pub const CREATOR_POINTS: i64 = 1000;
pub const CORRECT_POINTS: i64 = 1500;
pub const MAX_PLAYERS: usize = 8;
pub const QUESTIONS_PER_GAME: usize = 7;
pub const MAX_ANSWER_LEN: usize = 50;

/// Validation failures. None of these change game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Already completed")]
    Completed,

    #[error("No such answer")]
    NoAnswer,

    #[error("Answer already exists")]
    DupAnswer,

    #[error("Choose own answer")]
    OwnAnswer,

    #[error("Answer is too short")]
    ShortAnswer,

    #[error("Answer is too long")]
    LongAnswer,

    #[error("Room is full")]
    RoomFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    CollectingAnswers,
    CollectingVotes,
    RoundClosed,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub player: PlayerId,
    pub score: i64,
}

/// Something the host display should show
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Joined(PlayerId),
    Question(Question),
    Vote(Question),
    Collected { player: PlayerId, complete: bool },
    Results {
        standings: Vec<Standing>,
        results: ResultSet,
    },
    Complete { standings: Vec<Standing> },
}

/// Something a single participant's device should show
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    RequestAnswer { question: String },
    RequestVote { question: String, answers: Vec<String> },
    Results {
        standings: Vec<Standing>,
        results: ResultSet,
    },
    Complete { standings: Vec<Standing> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Host(HostEvent),
    Player(PlayerId, PlayerEvent),
}

/// Multiplier for the round at `index`: 1 for the first three, 2 for the
/// next three, 3 from then on.
pub fn multiplier_for(index: usize) -> i64 {
    (index / 3 + 1).min(3) as i64
}

#[derive(Debug)]
pub struct Game {
    questions: Vec<Question>,
    /// Join order
    standings: Vec<Standing>,
    current: usize,
    collector: Collector,
    started: bool,
    complete: bool,
    outbox: Vec<Notification>,
}

impl Game {
    pub fn new(repo: &QuestionRepo) -> Self {
        Self::with_questions(repo.questions(QUESTIONS_PER_GAME))
    }

    pub fn with_questions(mut questions: Vec<Question>) -> Self {
        for (i, question) in questions.iter_mut().enumerate() {
            question.multiplier = multiplier_for(i);
        }
        Self {
            questions,
            standings: Vec::new(),
            current: 0,
            collector: Collector::Inert,
            started: false,
            complete: false,
            outbox: Vec::new(),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current(&self) -> Option<&Question> {
        if self.complete {
            return None;
        }
        self.questions.get(self.current)
    }

    pub fn round(&self) -> usize {
        self.current
    }

    pub fn collector(&self) -> Collector {
        self.collector
    }

    pub fn standings(&self) -> &[Standing] {
        &self.standings
    }

    pub fn score(&self, player: &PlayerId) -> Option<i64> {
        self.standings
            .iter()
            .find(|s| &s.player == player)
            .map(|s| s.score)
    }

    pub fn player_count(&self) -> usize {
        self.standings.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn phase(&self) -> Phase {
        match self.collector {
            _ if self.complete => Phase::Complete,
            Collector::Answers { .. } => Phase::CollectingAnswers,
            Collector::Votes { .. } => Phase::CollectingVotes,
            Collector::Inert if self.started => Phase::RoundClosed,
            Collector::Inert => Phase::NotStarted,
        }
    }

    /// Hand over everything queued since the last call, oldest first.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    pub fn add_player(&mut self, player: PlayerId) -> Result<(), GameError> {
        self.add_players(std::slice::from_ref(&player))
    }

    /// Register participants at zero points. All or nothing: the roster
    /// never grows past [`MAX_PLAYERS`].
    pub fn add_players(&mut self, players: &[PlayerId]) -> Result<(), GameError> {
        if self.standings.len() + players.len() > MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        for player in players {
            self.standings.push(Standing {
                player: player.clone(),
                score: 0,
            });
            self.notify_host(HostEvent::Joined(player.clone()));
        }
        Ok(())
    }

    /// Start collecting answers for the current question.
    pub fn begin(&mut self) {
        if self.current().is_none() {
            tracing::warn!("Begin ignored: game is complete");
            return;
        }
        self.started = true;
        self.collector = Collector::Answers {
            remaining: self.standings.len(),
        };
        self.broadcast_question();
    }

    /// Start collecting votes for the current question.
    pub fn vote(&mut self) {
        if self.current().is_none() {
            tracing::warn!("Vote ignored: game is complete");
            return;
        }
        self.started = true;
        self.collector = Collector::Votes {
            remaining: self.standings.len(),
        };
        self.broadcast_vote();
    }

    pub fn collect(&mut self, player: &PlayerId, text: &str) -> Result<(), GameError> {
        let question = match self.questions.get_mut(self.current) {
            Some(q) if !self.complete => q,
            _ => return Err(GameError::Completed),
        };
        self.collector.collect(question, player, text)?;
        let complete = self.collector.is_complete();
        self.notify_host(HostEvent::Collected {
            player: player.clone(),
            complete,
        });
        Ok(())
    }

    /// Close the current collection. Closing answers always leads into the
    /// vote; closing the vote scores the round. Once the round is scored the
    /// collector is inert, so a second stop is a no-op.
    pub fn stop(&mut self) {
        match self.collector {
            Collector::Answers { .. } => self.vote(),
            Collector::Votes { .. } => self.score_round(),
            Collector::Inert => tracing::debug!("Stop ignored: nothing is being collected"),
        }
    }

    /// Move on to the next question, or finish the game after the last one.
    pub fn next(&mut self) {
        if self.complete {
            tracing::debug!("Next ignored: game is complete");
            return;
        }
        self.started = true;
        self.current += 1;
        if self.current >= self.questions.len() {
            self.finish();
            return;
        }
        self.collector = Collector::Answers {
            remaining: self.standings.len(),
        };
        self.broadcast_question();
    }

    fn score_round(&mut self) {
        self.collector = Collector::Inert;
        let Some(question) = self.questions.get(self.current) else {
            return;
        };
        let results = ResultSet::new(question);
        for offset in results.offsets() {
            if let Some(standing) = self
                .standings
                .iter_mut()
                .find(|s| s.player == offset.player)
            {
                standing.score += offset.points;
            }
        }
        tracing::debug!(round = self.current, entries = results.len(), "Round scored");

        let standings = self.standings.clone();
        self.notify_host(HostEvent::Results {
            standings: standings.clone(),
            results: results.clone(),
        });
        self.notify_players(|_| PlayerEvent::Results {
            standings: standings.clone(),
            results: results.clone(),
        });
    }

    fn finish(&mut self) {
        self.complete = true;
        self.collector = Collector::Inert;
        let standings = self.standings.clone();
        self.notify_host(HostEvent::Complete {
            standings: standings.clone(),
        });
        self.notify_players(|_| PlayerEvent::Complete {
            standings: standings.clone(),
        });
    }

    fn broadcast_question(&mut self) {
        let Some(question) = self.current().cloned() else {
            return;
        };
        let text = question.text.clone();
        self.notify_host(HostEvent::Question(question));
        self.notify_players(|_| PlayerEvent::RequestAnswer {
            question: text.clone(),
        });
    }

    fn broadcast_vote(&mut self) {
        let Some(question) = self.current().cloned() else {
            return;
        };
        self.notify_host(HostEvent::Vote(question.clone()));
        self.notify_players(|player| PlayerEvent::RequestVote {
            question: question.text.clone(),
            answers: question.votable_by(player),
        });
    }

    fn notify_host(&mut self, event: HostEvent) {
        self.outbox.push(Notification::Host(event));
    }

    fn notify_players(&mut self, mut event: impl FnMut(&PlayerId) -> PlayerEvent) {
        for standing in &self.standings {
            self.outbox
                .push(Notification::Player(standing.player.clone(), event(&standing.player)));
        }
    }
}
