use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ids::{MessageId, ThreadId, UserId};
use crate::models::{AttachmentRef, AttachmentUpload, Message};
use crate::reactions::ReactionToggle;

/// Authoritative source of thread messages.
///
/// Every mutating call names the acting user explicitly. Implementations are
/// the enforcement point for authorship: the client only hides controls.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Current messages of a thread in canonical (creation) order.
    async fn list_messages(&self, thread_id: ThreadId) -> Result<Vec<Message>, StoreError>;

    async fn post_message(
        &self,
        actor: UserId,
        thread_id: ThreadId,
        body: String,
        parent_id: Option<MessageId>,
    ) -> Result<Message, StoreError>;

    /// Fails with [`StoreError::Unauthorized`] unless `actor` wrote the message.
    async fn edit_message(
        &self,
        actor: UserId,
        message_id: MessageId,
        new_body: String,
    ) -> Result<Message, StoreError>;

    /// Fails with [`StoreError::Unauthorized`] unless `actor` wrote the message.
    async fn delete_message(&self, actor: UserId, message_id: MessageId) -> Result<(), StoreError>;

    async fn toggle_reaction(
        &self,
        actor: UserId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<ReactionToggle, StoreError>;

    async fn upload_attachment(
        &self,
        actor: UserId,
        message_id: MessageId,
        file: AttachmentUpload,
    ) -> Result<AttachmentRef, StoreError>;
}

/// How a message author relates to the person viewing the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    Viewer,
    Connected,
    Pending,
    None,
}

/// Social-graph lookup handed to the renderer instead of ambient state.
pub trait RelationshipLookup: Send + Sync {
    fn relationship(&self, viewer: UserId, other: UserId) -> Relationship;
}

/// Lookup for contexts without a social graph: only the viewer is recognised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelationships;

impl RelationshipLookup for NoRelationships {
    fn relationship(&self, viewer: UserId, other: UserId) -> Relationship {
        if viewer == other {
            Relationship::Viewer
        } else {
            Relationship::None
        }
    }
}
