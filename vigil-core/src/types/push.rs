//! Push channel messages.
//!
//! Every frame is a JSON text frame of the form `{"event": "...", "data": ...}`.

use super::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// Event name of snapshot updates.
pub const DATA_UPDATE: &str = "data-update";

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    DataUpdate(Snapshot),
    Pong,
    Error { message: String },
}

impl ServerMessage {
    /// Encode a data update without cloning the snapshot.
    pub fn encode_update(snapshot: &Snapshot) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Frame<'a> {
            event: &'static str,
            data: &'a Snapshot,
        }
        serde_json::to_string(&Frame { event: DATA_UPDATE, data: snapshot })
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    RefreshRequest,
    Ping,
}

impl ClientMessage {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceReport;
    use serde_json::{json, Value};

    #[test]
    fn test_update_frame_shape() {
        let proxmox = SourceReport::Data(json!({"nodes": []}));
        let snapshot = Snapshot::new(7, SourceReport::failed("down"), proxmox);
        let text = ServerMessage::encode_update(&snapshot).unwrap();
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["event"], "data-update");
        assert_eq!(frame["data"]["cycle"], 7);
        assert_eq!(frame["data"]["nextcloud"]["error"], "down");

        // the borrowed encoder and the enum agree
        let parsed: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, ServerMessage::DataUpdate(snapshot));
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(ServerMessage::Pong.encode().unwrap(), r#"{"event":"pong"}"#);
        let err = ServerMessage::Error { message: "bad frame".into() };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"event": "error", "data": {"message": "bad frame"}})
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"event":"refresh-request"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RefreshRequest);
        assert_eq!(ClientMessage::Ping.encode().unwrap(), r#"{"event":"ping"}"#);
    }
}
