//! Scoring core: pose classification, gesture debouncing and the match state machine

pub mod board;
pub mod debounce;
pub mod gesture;
pub mod session;
pub mod snapshot;

pub use board::StateDelta;
pub use session::{SessionHandle, SessionRegistry};
pub use snapshot::ScoreboardSnapshot;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::ws::protocol::ClientMsg;

/// Physical side of the court, as displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Logical team identity, independent of the side it currently plays on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// Team standing on `side` given the current swap flag
    pub fn on_side(side: Side, is_swapped: bool) -> Self {
        match (side, is_swapped) {
            (Side::Left, false) | (Side::Right, true) => Team::Red,
            (Side::Right, false) | (Side::Left, true) => Team::Blue,
        }
    }

    /// Score counter that always belongs to this team.
    /// Red is kept on the left counter, blue on the right one.
    pub fn counter(self) -> Side {
        match self {
            Team::Red => Side::Left,
            Team::Blue => Side::Right,
        }
    }
}

/// One of the four player positions that can hold serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeSlot {
    LeftTop,
    LeftBottom,
    RightTop,
    RightBottom,
}

impl ServeSlot {
    pub fn side(self) -> Side {
        match self {
            ServeSlot::LeftTop | ServeSlot::LeftBottom => Side::Left,
            ServeSlot::RightTop | ServeSlot::RightBottom => Side::Right,
        }
    }

    /// Position after the teams change ends: LT <-> RB, LB <-> RT
    pub fn diagonal(self) -> Self {
        match self {
            ServeSlot::LeftTop => ServeSlot::RightBottom,
            ServeSlot::LeftBottom => ServeSlot::RightTop,
            ServeSlot::RightTop => ServeSlot::LeftBottom,
            ServeSlot::RightBottom => ServeSlot::LeftTop,
        }
    }

    pub fn top(side: Side) -> Self {
        match side {
            Side::Left => ServeSlot::LeftTop,
            Side::Right => ServeSlot::RightTop,
        }
    }

    pub fn bottom(side: Side) -> Self {
        match side {
            Side::Left => ServeSlot::LeftBottom,
            Side::Right => ServeSlot::RightBottom,
        }
    }
}

/// Input received from a connection, queued for the session task
#[derive(Debug)]
pub struct SessionInput {
    pub connection_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
    /// Set by request/response callers (HTTP) that wait for the outcome
    pub reply: Option<oneshot::Sender<ApplyOutcome>>,
}

/// Result of applying one client message
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub delta: StateDelta,
    pub snapshot: ScoreboardSnapshot,
}
