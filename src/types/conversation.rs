//! Conversation summary types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;
use super::ChatId;

/// Denormalized latest-message preview cached on a conversation for list
/// display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
}

impl Preview {
    pub fn from_message(message: &Message) -> Self {
        Self {
            text: message.preview_text(),
            timestamp: message.date_created,
            is_from_me: message.is_from_me,
        }
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ChatId,
    /// Participant handles, excluding the user.
    pub participants: Vec<String>,
    /// Explicit group name, if the chat has one.
    pub display_name: Option<String>,
    pub preview: Option<Preview>,
    pub unread: bool,
    pub pinned: bool,
    pub muted: bool,
    pub archived: bool,
}

impl ConversationSummary {
    /// Display title: the explicit group name when set, otherwise the
    /// joined participant handles.
    pub fn title(&self) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ if self.participants.is_empty() => "Unknown".to_string(),
            _ => self.participants.join(", "),
        }
    }
}

/// Partial flag update sent to the gateway.
///
/// `None` fields are left untouched by the server. Gateway implementations
/// translate `muted` into whatever mute convention their wire protocol
/// uses (e.g. a `muteType` string).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPatch {
    pub pinned: Option<bool>,
    pub muted: Option<bool>,
    pub archived: Option<bool>,
}

impl ConversationPatch {
    pub fn pin(value: bool) -> Self {
        Self {
            pinned: Some(value),
            ..Default::default()
        }
    }

    pub fn mute(value: bool) -> Self {
        Self {
            muted: Some(value),
            ..Default::default()
        }
    }

    pub fn archive(value: bool) -> Self {
        Self {
            archived: Some(value),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(display_name: Option<&str>, participants: &[&str]) -> ConversationSummary {
        ConversationSummary {
            id: ChatId::new("chat-1"),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            display_name: display_name.map(String::from),
            preview: None,
            unread: false,
            pinned: false,
            muted: false,
            archived: false,
        }
    }

    #[test]
    fn test_title_prefers_display_name() {
        let chat = summary(Some("Family"), &["+15550100", "+15550101"]);
        assert_eq!(chat.title(), "Family");
    }

    #[test]
    fn test_title_falls_back_to_participants() {
        let chat = summary(None, &["+15550100", "+15550101"]);
        assert_eq!(chat.title(), "+15550100, +15550101");

        let empty_name = summary(Some(""), &["+15550100"]);
        assert_eq!(empty_name.title(), "+15550100");

        let nobody = summary(None, &[]);
        assert_eq!(nobody.title(), "Unknown");
    }
}
