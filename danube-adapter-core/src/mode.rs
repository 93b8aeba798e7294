//! Adapter modes declared by concrete adapters and selected at connect time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of data flow between the resource and the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Host-originated envelopes are pushed to the resource on demand
    Sender,
    /// The resource is polled and its data is published to the bus
    Receiver,
}

/// Name of an adapter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeKind {
    Publish,
    Subscribe,
    SolicitResponse,
    RequestReply,
}

impl ModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeKind::Publish => "Publish",
            ModeKind::Subscribe => "Subscribe",
            ModeKind::SolicitResponse => "SolicitResponse",
            ModeKind::RequestReply => "RequestReply",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeKind {
    type Err = String;

    /// Case-insensitive parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "publish" => Ok(ModeKind::Publish),
            "subscribe" => Ok(ModeKind::Subscribe),
            "solicitresponse" => Ok(ModeKind::SolicitResponse),
            "requestreply" => Ok(ModeKind::RequestReply),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// A mode an adapter can run in: a name plus a direction
///
/// Modes are declared once per concrete adapter and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMode {
    kind: ModeKind,
    direction: Direction,
}

impl AdapterMode {
    pub const fn new(kind: ModeKind, direction: Direction) -> Self {
        Self { kind, direction }
    }

    /// One-way receive: the resource is polled and results go to the bus
    pub const fn publish() -> Self {
        Self::new(ModeKind::Publish, Direction::Receiver)
    }

    /// One-way send: envelopes from the bus are written to the resource
    pub const fn subscribe() -> Self {
        Self::new(ModeKind::Subscribe, Direction::Sender)
    }

    /// Two-way send
    pub const fn solicit_response() -> Self {
        Self::new(ModeKind::SolicitResponse, Direction::Sender)
    }

    /// Two-way receive
    pub const fn request_reply() -> Self {
        Self::new(ModeKind::RequestReply, Direction::Receiver)
    }

    pub fn kind(&self) -> ModeKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether this mode runs the background polling loop
    pub fn is_polling(&self) -> bool {
        self.direction == Direction::Receiver
    }

    /// Case-insensitive name comparison
    pub fn matches(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name.trim())
    }
}

impl fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.kind, self.direction)
    }
}
