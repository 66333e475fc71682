//! Message entity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChatId;

/// Message identifier.
///
/// An outgoing message gets a `Temp` id from a store-owned sequence until
/// the server assigns a guid; confirmation swaps in `Server`. The two
/// namespaces cannot collide by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum MessageId {
    /// Synthetic id for a not-yet-confirmed outgoing message.
    Temp(u64),
    /// Server-assigned message guid.
    Server(String),
}

impl MessageId {
    pub fn is_temp(&self) -> bool {
        matches!(self, MessageId::Temp(_))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Temp(seq) => write!(f, "temp:{seq}"),
            MessageId::Server(guid) => f.write_str(guid),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub guid: String,
    pub mime_type: Option<String>,
    /// Original file name reported by the sender.
    pub transfer_name: Option<String>,
    pub total_bytes: u64,
}

/// A tapback/reaction attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    /// Handle of the reacting participant.
    pub sender: String,
    /// Reaction kind as reported by the server ("love", "like", ...).
    pub kind: String,
    /// Message part the reaction targets.
    pub part_index: i32,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    /// Sender handle; `None` for the user's own messages.
    pub sender: Option<String>,
    pub text: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_delivered: Option<DateTime<Utc>>,
    pub date_read: Option<DateTime<Utc>>,
    pub date_edited: Option<DateTime<Utc>>,
    /// Terminal send failure. Set once; a retry creates a new message
    /// instead of clearing this.
    pub send_error: Option<String>,
    pub is_from_me: bool,
    /// Group housekeeping event (rename, participant change) rather than
    /// a user message.
    pub is_group_event: bool,
    pub has_attachments: bool,
    /// Expressive send effect requested for this message.
    pub effect: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Build the optimistic local record for an outgoing text message.
    pub fn outgoing(seq: u64, chat_id: ChatId, text: &str, effect: Option<String>) -> Self {
        Self {
            id: MessageId::Temp(seq),
            chat_id,
            sender: None,
            text: Some(text.to_string()),
            date_created: Utc::now(),
            date_delivered: None,
            date_read: None,
            date_edited: None,
            send_error: None,
            is_from_me: true,
            is_group_event: false,
            has_attachments: false,
            effect,
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    /// Text used for conversation-list previews.
    ///
    /// Falls back to an attachment caption or a group-event caption when
    /// the message has no body text.
    pub fn preview_text(&self) -> String {
        if let Some(text) = self.text.as_deref() {
            if !text.is_empty() {
                return text.to_string();
            }
        }
        if self.is_group_event {
            return "Group updated".to_string();
        }
        match self.attachments.len() {
            0 => String::new(),
            1 => attachment_caption(&self.attachments[0]).to_string(),
            n => format!("{n} attachments"),
        }
    }
}

/// Caption for an attachment-only message, by broad media class.
fn attachment_caption(attachment: &Attachment) -> &'static str {
    let mime = attachment.mime_type.as_deref().unwrap_or("");
    if mime == "image/gif" {
        "GIF"
    } else if mime.starts_with("image/") {
        "Image"
    } else if mime.starts_with("video/") {
        "Video"
    } else if mime.starts_with("audio/") {
        "Audio message"
    } else {
        "Attachment"
    }
}
