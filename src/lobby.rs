//! Lobby: the directory of open rooms
//!
//! Maps room codes to each room's join inbox. The map lock is only held for
//! a lookup or an insert/remove, never while sending to a room.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, RwLock};

use crate::conn::{ConnReceiver, ConnSender};
use crate::game::{Game, QuestionRepo};
use crate::protocol::{LobbyRequest, PlayerMessage};
use crate::room::{JoinRequest, Room, JOIN_QUEUE_SIZE};
use crate::types::{clean_text, RoomCode};

const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const CODE_LENGTH: usize = 4;

/// Source of candidate room codes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> RoomCode;
}

/// Uniformly random uppercase codes of [`CODE_LENGTH`] letters
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self) -> RoomCode {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
            .collect()
    }
}

pub struct Lobby {
    repo: Arc<QuestionRepo>,
    codes: Box<dyn CodeGenerator>,
    rooms: RwLock<HashMap<RoomCode, mpsc::Sender<JoinRequest>>>,
}

impl Lobby {
    pub fn new(repo: Arc<QuestionRepo>) -> Self {
        Self::with_code_generator(repo, RandomCodes)
    }

    pub fn with_code_generator(repo: Arc<QuestionRepo>, codes: impl CodeGenerator + 'static) -> Self {
        Self {
            repo,
            codes: Box::new(codes),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Route a fresh connection by its first message.
    pub async fn handle(self: &Arc<Self>, sender: ConnSender, mut receiver: ConnReceiver) {
        let Some(env) = receiver.recv().await else {
            return;
        };
        match LobbyRequest::try_from(&env) {
            Ok(LobbyRequest::Create) => {
                self.create(sender, receiver).await;
            }
            Ok(LobbyRequest::Join { name, code }) => {
                let request = JoinRequest {
                    name,
                    sender,
                    receiver,
                };
                self.join(&code, request).await;
            }
            Err(e) => {
                tracing::warn!(conn = %sender.id(), "Lobby: {}", e);
                sender.close();
            }
        }
    }

    /// Open a new room hosted by this connection and start its event loop.
    pub async fn create(self: &Arc<Self>, host: ConnSender, host_rx: ConnReceiver) -> RoomCode {
        let game = Game::new(&self.repo);
        let (join_tx, join_rx) = mpsc::channel(JOIN_QUEUE_SIZE);

        let code = {
            let mut rooms = self.rooms.write().await;
            let code = loop {
                let candidate = self.codes.generate();
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
                tracing::debug!("Lobby: code collision on {}, retrying", candidate);
            };
            rooms.insert(code.clone(), join_tx);
            code
        };

        let room = Room::new(code.clone(), game, Arc::clone(self), host, host_rx, join_rx);
        tokio::spawn(room.run());
        tracing::info!("Lobby: Created room: {}", code);
        code
    }

    /// Hand a joining connection to the room with this code.
    pub async fn join(&self, code: &str, request: JoinRequest) {
        let code = clean_text(code);
        let room = self.rooms.read().await.get(&code).cloned();

        let Some(room) = room else {
            tracing::info!("Lobby: No such room to join: {}", code);
            reject(request);
            return;
        };
        if let Err(mpsc::error::SendError(request)) = room.send(request).await {
            tracing::info!("Lobby: Room {} stopped accepting players", code);
            reject(request);
        }
    }

    /// Forget a room and close its join inbox. Returns whether it was known.
    pub async fn detach(&self, code: &str) -> bool {
        match self.rooms.write().await.remove(code) {
            Some(_) => {
                tracing::info!("Lobby: Detached room: {}", code);
                true
            }
            None => {
                tracing::warn!("Lobby: No such room to detach: {}", code);
                false
            }
        }
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.rooms.read().await.contains_key(code)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

/// Turn away a join request whose room is gone or closed to players.
pub(crate) fn reject(request: JoinRequest) {
    let _ = request.sender.send(&PlayerMessage::error("No such room"));
    request.sender.close();
}
