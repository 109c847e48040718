//! Room actor
//!
//! Each room runs as its own task and is the only code that ever touches its
//! [`Game`]. Host commands, player submissions and join requests arrive on
//! separate channels and are applied one at a time; whatever the game queues
//! in response is translated into wire messages for the host and players.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::conn::{ConnReceiver, ConnSender};
use crate::game::{
    Game, GameError, HostEvent, Notification, PlayerEvent, Question, ResultSet, Standing,
};
use crate::lobby::{self, Lobby};
use crate::protocol::{
    AnswerInfo, AnswerOffsets, HostCommand, HostMessage, OffsetInfo, PlayerInfo, PlayerMessage,
    PlayerText, PointsInfo, QuestionInfo,
};
use crate::types::{clean_text, new_player_id, text_len, PlayerId, RoomCode};

pub const MAX_NAME_LEN: usize = 10;

/// Join requests queued per room before senders have to wait
pub const JOIN_QUEUE_SIZE: usize = 16;

const SUBMISSION_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Name is too short (min 1)")]
    NameTooShort,

    #[error("Name is too long (max 10)")]
    NameTooLong,

    #[error("Name is taken")]
    NameTaken,

    #[error(transparent)]
    Game(#[from] GameError),
}

/// A new connection asking to play in a room
pub struct JoinRequest {
    pub name: String,
    pub sender: ConnSender,
    pub receiver: ConnReceiver,
}

#[derive(Debug)]
struct Submission {
    player: PlayerId,
    text: String,
}

struct RoomPlayer {
    name: String,
    conn: ConnSender,
}

pub struct Room {
    code: RoomCode,
    game: Game,
    lobby: Arc<Lobby>,
    host: ConnSender,
    host_rx: ConnReceiver,
    players: HashMap<PlayerId, RoomPlayer>,
    submit_tx: mpsc::Sender<Submission>,
    submit_rx: mpsc::Receiver<Submission>,
    /// `None` once the join inbox has been closed by the lobby
    join_rx: Option<mpsc::Receiver<JoinRequest>>,
    detached: bool,
}

impl Room {
    pub fn new(
        code: RoomCode,
        game: Game,
        lobby: Arc<Lobby>,
        host: ConnSender,
        host_rx: ConnReceiver,
        join_rx: mpsc::Receiver<JoinRequest>,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(SUBMISSION_QUEUE_SIZE);
        Self {
            code,
            game,
            lobby,
            host,
            host_rx,
            players: HashMap::new(),
            submit_tx,
            submit_rx,
            join_rx: Some(join_rx),
            detached: false,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(room = %self.code, "Room opened");
        self.send_host(&HostMessage::Create {
            code: self.code.clone(),
        });

        loop {
            tokio::select! {
                env = self.host_rx.recv() => {
                    let Some(env) = env else {
                        tracing::info!(room = %self.code, "Host disconnected");
                        break;
                    };
                    match HostCommand::try_from(&env) {
                        Ok(cmd) => self.handle_host_command(cmd).await,
                        Err(e) => {
                            tracing::warn!(room = %self.code, "Protocol error from host: {}", e);
                            self.host.close();
                            break;
                        }
                    }
                }
                Some(submission) = self.submit_rx.recv() => {
                    self.handle_submission(submission);
                }
                request = recv_join(&mut self.join_rx) => match request {
                    Some(request) => self.handle_join(request),
                    None => self.join_rx = None,
                },
            }
        }

        self.detach().await;
        tracing::info!(room = %self.code, "Room closed");
    }

    async fn handle_host_command(&mut self, cmd: HostCommand) {
        tracing::debug!(room = %self.code, "Host command: {:?}", cmd);
        match cmd {
            HostCommand::Begin => {
                // No late joiners once the game is under way
                self.detach().await;
                self.close_joins();
                self.game.begin();
            }
            HostCommand::Next => self.game.next(),
            HostCommand::Vote => self.game.vote(),
            HostCommand::Stop => self.game.stop(),
        }
        self.flush();
    }

    async fn detach(&mut self) {
        if !self.detached {
            self.lobby.detach(&self.code).await;
            self.detached = true;
        }
    }

    /// Stop taking join requests and turn away any still queued.
    fn close_joins(&mut self) {
        let Some(mut rx) = self.join_rx.take() else {
            return;
        };
        rx.close();
        while let Ok(request) = rx.try_recv() {
            tracing::info!(room = %self.code, "Rejected join {:?}: game has begun", request.name);
            lobby::reject(request);
        }
    }

    fn handle_submission(&mut self, submission: Submission) {
        let Submission { player, text } = submission;
        let reply = match self.game.collect(&player, &text) {
            Ok(()) => PlayerMessage::Ok,
            Err(e) => PlayerMessage::error(e.to_string()),
        };
        self.send_player(&player, &reply);
        self.flush();
    }

    fn handle_join(&mut self, request: JoinRequest) {
        let JoinRequest {
            name,
            sender,
            receiver,
        } = request;

        match self.admit(&name) {
            Ok((id, name)) => {
                tracing::info!(room = %self.code, player = %id, "{} joined", name);
                if let Err(e) = sender.send(&PlayerMessage::Ok) {
                    tracing::debug!(room = %self.code, "Failed to ack join: {}", e);
                }
                tokio::spawn(forward_player(
                    id.clone(),
                    receiver,
                    sender.clone(),
                    self.submit_tx.clone(),
                ));
                self.players.insert(id, RoomPlayer { name, conn: sender });
                self.flush();
            }
            Err(e) => {
                tracing::info!(room = %self.code, "Rejected join {:?}: {}", name, e);
                let _ = sender.send(&PlayerMessage::error(e.to_string()));
                sender.close();
            }
        }
    }

    /// Validate a requested name and register a new participant under it.
    fn admit(&mut self, name: &str) -> Result<(PlayerId, String), JoinError> {
        let name = clean_text(name);
        let len = text_len(&name);
        if len < 1 {
            return Err(JoinError::NameTooShort);
        }
        if len > MAX_NAME_LEN {
            return Err(JoinError::NameTooLong);
        }
        if self.players.values().any(|p| p.name == name) {
            return Err(JoinError::NameTaken);
        }
        let id = new_player_id();
        self.game.add_player(id.clone())?;
        Ok((id, name))
    }

    fn flush(&mut self) {
        for note in self.game.take_notifications() {
            match note {
                Notification::Host(event) => {
                    let msg = self.host_message(event);
                    self.send_host(&msg);
                }
                Notification::Player(id, event) => {
                    let msg = self.player_message(event);
                    self.send_player(&id, &msg);
                }
            }
        }
    }

    fn send_host(&self, msg: &HostMessage) {
        if let Err(e) = self.host.send(msg) {
            tracing::warn!(room = %self.code, "Failed to send to host: {}", e);
        }
    }

    fn send_player(&self, id: &PlayerId, msg: &PlayerMessage) {
        let Some(player) = self.players.get(id) else {
            return;
        };
        if let Err(e) = player.conn.send(msg) {
            tracing::debug!(room = %self.code, player = %id, "Failed to send to player: {}", e);
        }
    }

    fn host_message(&self, event: HostEvent) -> HostMessage {
        match event {
            HostEvent::Joined(id) => HostMessage::Joined {
                player: self.player_info(&id),
            },
            HostEvent::Question(question) => HostMessage::Question {
                question: self.question_info(&question),
            },
            HostEvent::Vote(question) => HostMessage::Vote {
                question: self.question_info(&question),
            },
            HostEvent::Collected { player, complete } => HostMessage::Collected {
                player: self.player_info(&player),
                complete,
            },
            HostEvent::Results { standings, results } => HostMessage::Results {
                points: self.points(&standings),
                offsets: self.offsets(&results),
            },
            HostEvent::Complete { standings } => HostMessage::Complete {
                points: self.points(&standings),
            },
        }
    }

    fn player_message(&self, event: PlayerEvent) -> PlayerMessage {
        match event {
            PlayerEvent::RequestAnswer { question } => PlayerMessage::Answer { text: question },
            PlayerEvent::RequestVote { question, answers } => PlayerMessage::Vote {
                text: question,
                answers,
            },
            PlayerEvent::Results { standings, results } => PlayerMessage::Results {
                points: self.points(&standings),
                offsets: self.offsets(&results),
            },
            PlayerEvent::Complete { standings } => PlayerMessage::Complete {
                points: self.points(&standings),
            },
        }
    }

    fn player_info(&self, id: &PlayerId) -> PlayerInfo {
        PlayerInfo {
            id: id.clone(),
            name: self
                .players
                .get(id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
        }
    }

    fn question_info(&self, question: &Question) -> QuestionInfo {
        QuestionInfo {
            text: question.text.clone(),
            multiplier: question.multiplier,
            answers: question
                .answers
                .iter()
                .map(|a| AnswerInfo {
                    text: a.text.clone(),
                    correct: a.correct,
                    player: a.player.as_ref().map(|p| self.player_info(p)),
                    votes: a.votes.iter().map(|v| self.player_info(v)).collect(),
                })
                .collect(),
        }
    }

    fn points(&self, standings: &[Standing]) -> Vec<PointsInfo> {
        standings
            .iter()
            .map(|s| PointsInfo {
                player: self.player_info(&s.player),
                total: s.score,
            })
            .collect()
    }

    fn offsets(&self, results: &ResultSet) -> Vec<AnswerOffsets> {
        let question = self.game.current().map(|q| self.question_info(q));
        results
            .iter()
            .map(|(text, offsets)| AnswerOffsets {
                answer: question
                    .as_ref()
                    .and_then(|q| q.answers.iter().find(|a| a.text == text).cloned())
                    .unwrap_or_else(|| AnswerInfo {
                        text: text.to_string(),
                        correct: false,
                        player: None,
                        votes: Vec::new(),
                    }),
                offsets: offsets
                    .iter()
                    .map(|o| OffsetInfo {
                        player: self.player_info(&o.player),
                        offset: o.points,
                    })
                    .collect(),
            })
            .collect()
    }
}

async fn recv_join(rx: &mut Option<mpsc::Receiver<JoinRequest>>) -> Option<JoinRequest> {
    match rx {
        Some(rx) => rx.recv().await,
        // Detached: never yields again
        None => std::future::pending().await,
    }
}

/// Feed one player's messages into the room until either side goes away.
async fn forward_player(
    player: PlayerId,
    mut receiver: ConnReceiver,
    conn: ConnSender,
    inbox: mpsc::Sender<Submission>,
) {
    loop {
        let env = tokio::select! {
            env = receiver.recv() => env,
            _ = inbox.closed() => {
                conn.close();
                break;
            }
        };
        let Some(env) = env else { break };
        let text = match PlayerText::try_from(&env) {
            Ok(PlayerText { text }) => text,
            Err(e) => {
                tracing::warn!(player = %player, "Protocol error from player: {}", e);
                conn.close();
                break;
            }
        };
        let submission = Submission {
            player: player.clone(),
            text,
        };
        if inbox.send(submission).await.is_err() {
            conn.close();
            break;
        }
    }
    tracing::debug!(player = %player, "Player forwarder finished");
}
