use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::prelude::{AttachmentModel, MessageModel, ReactionModel};
use crate::ids::{AttachmentId, MessageId, ThreadId, UserId};

/// One (emoji, user) pair. A user holds at most one of each emoji per message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: UserId,
}

impl Reaction {
    pub fn new(emoji: impl Into<String>, user_id: UserId) -> Self {
        Self {
            emoji: emoji.into(),
            user_id,
        }
    }
}

impl From<ReactionModel> for Reaction {
    fn from(model: ReactionModel) -> Self {
        Self {
            emoji: model.emoji,
            user_id: model.user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: AttachmentId,
    pub message_id: MessageId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_key: String,
}

impl From<AttachmentModel> for AttachmentRef {
    fn from(model: AttachmentModel) -> Self {
        Self {
            id: model.id,
            message_id: model.message_id,
            file_name: model.file_name,
            content_type: model.content_type,
            size_bytes: u64::try_from(model.size_bytes).unwrap_or_default(),
            storage_key: model.storage_key,
        }
    }
}

/// A file waiting to be attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl AttachmentUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// The authoritative record of a thread message, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// `None` for top-level messages.
    pub parent_id: Option<MessageId>,
    pub thread_id: ThreadId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_edited: bool,
    pub reactions: Vec<Reaction>,
    pub attachments: Vec<AttachmentRef>,
}

impl Message {
    pub fn from_parts(
        model: MessageModel,
        reactions: Vec<Reaction>,
        attachments: Vec<AttachmentRef>,
    ) -> Self {
        Self {
            id: model.id,
            parent_id: model.parent_id,
            thread_id: model.thread_id,
            author_id: model.author_id,
            body: model.body,
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_edited: model.is_edited,
            reactions,
            attachments,
        }
    }

    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.author_id == user_id
    }
}
