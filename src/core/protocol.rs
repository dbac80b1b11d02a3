//! Wire records shared by the directory and transfer channels.
//!
//! Every frame is one JSON object. Directory requests and transfer frames use
//! the same flat [`Message`] shape; only the fields that matter for a given
//! `type` are set.

use serde::{Deserialize, Deserializer, Serialize};

/// Reply text for a directory request with an unrecognized `type`.
pub const UNKNOWN_REQUEST: &str = "unknown request";

/// Error text sent when a requested file cannot be resolved.
pub const FILE_NOT_FOUND: &str = "File not found";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // Directory channel
    Register,
    Heartbeat,
    GetPeers,

    // Transfer channel
    Message,
    RequestFile,
    SendFileChunk,
    EndOfFile,
    Error,

    /// Any tag this build does not know, including a missing one.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    #[serde(rename = "type", default, deserialize_with = "null_as_unknown")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "content_base64"
    )]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

impl Message {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            filename: None,
            content: None,
            id: None,
            addr: None,
        }
    }

    pub fn register(id: &str, addr: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            addr: Some(addr.to_string()),
            ..Self::new(MessageType::Register)
        }
    }

    pub fn heartbeat(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::new(MessageType::Heartbeat)
        }
    }

    pub fn get_peers(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::new(MessageType::GetPeers)
        }
    }

    pub fn text(message: &str) -> Self {
        Self {
            content: Some(message.as_bytes().to_vec()),
            ..Self::new(MessageType::Message)
        }
    }

    pub fn request_file(filename: &str) -> Self {
        Self {
            filename: Some(filename.to_string()),
            ..Self::new(MessageType::RequestFile)
        }
    }

    pub fn file_chunk(data: &[u8]) -> Self {
        Self {
            content: Some(data.to_vec()),
            ..Self::new(MessageType::SendFileChunk)
        }
    }

    pub fn end_of_file(filename: &str) -> Self {
        Self {
            filename: Some(filename.to_string()),
            ..Self::new(MessageType::EndOfFile)
        }
    }

    pub fn error(filename: Option<&str>, reason: &str) -> Self {
        Self {
            filename: filename.map(str::to_string),
            content: Some(reason.as_bytes().to_vec()),
            ..Self::new(MessageType::Error)
        }
    }

    /// `content` as text, for `message` and `error` frames.
    pub fn content_text(&self) -> String {
        self.content
            .as_deref()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Directory reply to `register` and to unknown requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReply {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReply {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            error: None,
        }
    }

    pub fn error(reason: &str) -> Self {
        Self {
            status: Status::Error,
            error: Some(reason.to_string()),
        }
    }
}

fn null_as_unknown<'de, D>(deserializer: D) -> Result<MessageType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageType>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw bytes travel as a standard base64 string.
mod content_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(content: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match content {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
