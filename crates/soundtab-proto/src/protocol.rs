use serde::{Deserialize, Serialize};

use crate::media::{Direction, SkipResult, TabId, TabsSnapshot};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  The popup checks it in the `Hello` and logs a mismatch.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side will accept.  Snapshots hold tens of tabs, so
/// anything near this is a corrupt length header.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Commands sent from a popup (or the HTTP API) to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    GetMediaTabs,
    TogglePlayPause { tab_id: TabId },
    ToggleMute { tab_id: TabId },
    SkipTrack { tab_id: TabId, direction: Direction },
    FocusTab { tab_id: TabId },
}

impl Command {
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Command::GetMediaTabs => None,
            Command::TogglePlayPause { tab_id }
            | Command::ToggleMute { tab_id }
            | Command::SkipTrack { tab_id, .. }
            | Command::FocusTab { tab_id } => Some(*tab_id),
        }
    }
}

/// A command plus the id the reply will carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Result of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    MediaTabs {
        snapshot: TabsSnapshot,
    },
    PlayPause {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_playing: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Mute {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_muted: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Skip(SkipResult),
    Focus {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Reply {
    pub fn is_success(&self) -> bool {
        match self {
            Reply::MediaTabs { .. } => true,
            Reply::PlayPause { success, .. }
            | Reply::Mute { success, .. }
            | Reply::Focus { success, .. } => *success,
            Reply::Skip(result) => result.success,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Reply::MediaTabs { .. } => None,
            Reply::PlayPause { error, .. } | Reply::Mute { error, .. } | Reply::Focus { error, .. } => {
                error.as_deref()
            }
            Reply::Skip(result) => result.error.as_deref(),
        }
    }

    /// Failure shaped like the reply `command` would have produced.
    pub fn failure(command: &Command, error: impl Into<String>) -> Self {
        let error = Some(error.into());
        match command {
            Command::GetMediaTabs => Reply::MediaTabs {
                snapshot: TabsSnapshot::default(),
            },
            Command::TogglePlayPause { .. } => Reply::PlayPause {
                success: false,
                is_playing: None,
                error,
            },
            Command::ToggleMute { .. } => Reply::Mute {
                success: false,
                is_muted: None,
                error,
            },
            Command::SkipTrack { .. } => Reply::Skip(SkipResult {
                success: false,
                method: crate::media::SkipMethod::None,
                error,
                methods_tried: Vec::new(),
            }),
            Command::FocusTab { .. } => Reply::Focus {
                success: false,
                error,
            },
        }
    }
}

/// Messages sent from daemon to popups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + current snapshot.
    Hello {
        protocol_version: u32,
        snapshot: TabsSnapshot,
    },
    /// Pushed after every cache change.
    TabsChanged { snapshot: TabsSnapshot },
    Response { id: u64, reply: Reply },
    Log { message: String },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Decode one frame from the front of `data`.  `Ok(None)` means more
    /// bytes are needed; an error means the stream is unrecoverable.
    pub fn decode(data: &[u8]) -> anyhow::Result<Option<(Self, usize)>> {
        if data.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds limit", len);
        }
        if data.len() < 4 + len {
            return Ok(None);
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok(Some((msg, 4 + len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encode_decode() {
        let msg = Message::Request(Request {
            id: 7,
            command: Command::SkipTrack {
                tab_id: TabId(42),
                direction: Direction::Previous,
            },
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap().unwrap();
        assert_eq!(len, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_partial_frame_needs_more() {
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            snapshot: TabsSnapshot::default(),
        });
        let encoded = msg.encode().unwrap();
        assert!(Message::decode(&encoded[..2]).unwrap().is_none());
        assert!(Message::decode(&encoded[..encoded.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let data = (u32::MAX).to_be_bytes();
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn test_command_wire_shape() {
        let json = serde_json::to_value(Command::ToggleMute { tab_id: TabId(3) }).unwrap();
        assert_eq!(json, serde_json::json!({"cmd": "toggle_mute", "tab_id": 3}));
    }

    #[test]
    fn test_failure_reply_matches_command() {
        let reply = Reply::failure(
            &Command::SkipTrack {
                tab_id: TabId(1),
                direction: Direction::Next,
            },
            "timed out",
        );
        assert!(!reply.is_success());
        assert_eq!(reply.error(), Some("timed out"));
        match reply {
            Reply::Skip(result) => assert!(result.methods_tried.is_empty()),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
