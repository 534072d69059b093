//! WebSocket protocol message definitions
//! These are the wire types for adapter-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::gesture::PoseFrame;
use crate::scoring::{ScoreboardSnapshot, ServeSlot, Side, StateDelta};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Score button pressed
    Increment { side: Side },

    /// Score correction button pressed
    Decrement { side: Side },

    /// Teams change ends
    ToggleSwap,

    /// Thumbs-up already recognized by the client, timed on receipt
    Gesture { side: Side },

    /// Raw hand landmarks for one video frame, classified server side
    PoseFrame(PoseFrame),

    /// Player name edited
    Rename { slot: ServeSlot, name: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { session_id: Uuid, server_time: u64 },

    /// Current scoreboard, sent on connect and after every change
    State {
        snapshot: ScoreboardSnapshot,
        /// Absent on the initial state message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<StateDelta>,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_increment() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"increment","side":"left"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Increment { side: Side::Left }));
    }

    #[test]
    fn test_parse_gesture() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"gesture","side":"right"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Gesture { side: Side::Right }));
    }

    #[test]
    fn test_gesture_client_timestamp_ignored() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"gesture","side":"left","t":81234.5}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Gesture { side: Side::Left }));
    }

    #[test]
    fn test_parse_pose_frame_ignores_depth() {
        let json = r#"{
            "type": "pose_frame",
            "frame_width": 640,
            "hands": [[{"x": 0.1, "y": 0.2, "z": -0.03}]]
        }"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        let ClientMsg::PoseFrame(frame) = msg else {
            panic!("expected pose frame, got {:?}", msg);
        };
        assert_eq!(frame.frame_width, 640.0);
        assert_eq!(frame.hands[0].len(), 1);
    }

    #[test]
    fn test_parse_rename() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"rename","slot":"left_bottom","name":"Kim"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Rename { slot: ServeSlot::LeftBottom, .. }));
    }

    #[test]
    fn test_unknown_side_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"increment","side":"top"}"#).is_err());
    }

    #[test]
    fn test_initial_state_omits_delta() {
        let snapshot = crate::scoring::snapshot::SnapshotBuilder::new()
            .current(&crate::scoring::board::MatchState::new());
        let json = serde_json::to_value(ServerMsg::State { snapshot, delta: None }).unwrap();
        assert_eq!(json["type"], "state");
        assert!(json.get("delta").is_none());
    }
}
