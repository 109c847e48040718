//! Wire protocol
//!
//! Every frame is one JSON envelope `{"Type": "...", "Data": {...}}`. Inbound
//! envelopes are decoded in two steps because the meaning of the payload
//! depends on who sent it: the lobby only understands `create`/`join`, a host
//! only sends bare commands, and anything from a joined player is an answer
//! or vote text.

use serde::{Deserialize, Serialize};

use crate::types::PlayerId;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw inbound envelope. The host page spells the keys in lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type", alias = "type")]
    pub kind: String,
    #[serde(
        rename = "Data",
        alias = "data",
        default,
        skip_serializing_if = "serde_json::Value::is_null"
    )]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.data.clone()).map_err(|source| ProtocolError::Payload {
            kind: self.kind.clone(),
            source,
        })
    }
}

/// First message on a fresh connection
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyRequest {
    Create,
    Join { name: String, code: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JoinPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: String,
}

impl TryFrom<&Envelope> for LobbyRequest {
    type Error = ProtocolError;

    fn try_from(env: &Envelope) -> Result<Self, Self::Error> {
        match env.kind.as_str() {
            "create" => Ok(Self::Create),
            "join" => {
                let JoinPayload { name, code } = env.payload()?;
                Ok(Self::Join { name, code })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Begin,
    Next,
    Vote,
    Stop,
}

impl TryFrom<&Envelope> for HostCommand {
    type Error = ProtocolError;

    fn try_from(env: &Envelope) -> Result<Self, Self::Error> {
        match env.kind.as_str() {
            "begin" => Ok(Self::Begin),
            "next" => Ok(Self::Next),
            "vote" => Ok(Self::Vote),
            "stop" => Ok(Self::Stop),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Answer or vote from a joined player. The envelope type is not significant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerText {
    pub text: String,
}

impl TryFrom<&Envelope> for PlayerText {
    type Error = ProtocolError;

    fn try_from(env: &Envelope) -> Result<Self, Self::Error> {
        env.payload()
    }
}

// Outbound snapshots of game state

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    #[serde(rename = "ID")]
    pub id: PlayerId,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnswerInfo {
    pub text: String,
    pub correct: bool,
    pub player: Option<PlayerInfo>,
    pub votes: Vec<PlayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuestionInfo {
    pub text: String,
    pub multiplier: i64,
    pub answers: Vec<AnswerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PointsInfo {
    pub player: PlayerInfo,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OffsetInfo {
    pub player: PlayerInfo,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnswerOffsets {
    pub answer: AnswerInfo,
    pub offsets: Vec<OffsetInfo>,
}

/// Messages for the host display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Data", rename_all = "snake_case")]
pub enum HostMessage {
    Create {
        #[serde(rename = "Code")]
        code: String,
    },
    Joined {
        #[serde(rename = "Player")]
        player: PlayerInfo,
    },
    Question {
        #[serde(rename = "Question")]
        question: QuestionInfo,
    },
    Vote {
        #[serde(rename = "Question")]
        question: QuestionInfo,
    },
    Collected {
        #[serde(rename = "Player")]
        player: PlayerInfo,
        #[serde(rename = "Complete")]
        complete: bool,
    },
    Results {
        #[serde(rename = "Points")]
        points: Vec<PointsInfo>,
        #[serde(rename = "Offsets", default, skip_serializing_if = "Vec::is_empty")]
        offsets: Vec<AnswerOffsets>,
    },
    Complete {
        #[serde(rename = "Points")]
        points: Vec<PointsInfo>,
    },
}

/// Messages for a player's device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Data", rename_all = "snake_case")]
pub enum PlayerMessage {
    Answer {
        #[serde(rename = "Text")]
        text: String,
    },
    Vote {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "Answers")]
        answers: Vec<String>,
    },
    Results {
        #[serde(rename = "Points")]
        points: Vec<PointsInfo>,
        #[serde(rename = "Offsets", default, skip_serializing_if = "Vec::is_empty")]
        offsets: Vec<AnswerOffsets>,
    },
    Complete {
        #[serde(rename = "Points")]
        points: Vec<PointsInfo>,
    },
    Ok,
    Error {
        #[serde(rename = "Text")]
        text: String,
    },
}

impl PlayerMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }
}
