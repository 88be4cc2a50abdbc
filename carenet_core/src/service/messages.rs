use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DatabaseConnection;

use crate::{
    config::CarenetConfig,
    entity::prelude::*,
    error::StoreError,
    ids::{AttachmentId, MessageId, ThreadId, UserId},
    models::{AttachmentRef, AttachmentUpload, Message, Reaction},
    reactions::{toggle_reaction, ReactionToggle},
    store::MessageStore,
};

/// SQLite-backed message store.
#[derive(Clone)]
pub struct MessagesService {
    db: DatabaseConnection,
    attachment_dir: PathBuf,
    max_attachment_bytes: u64,
}

impl MessagesService {
    pub fn new(db: DatabaseConnection, config: &CarenetConfig) -> Self {
        Self {
            db,
            attachment_dir: config.attachment_dir.clone(),
            max_attachment_bytes: config.max_attachment_bytes,
        }
    }

    /// Create a new discussion thread
    pub async fn create_thread(
        &self,
        author: UserId,
        title: String,
    ) -> Result<ThreadModel, StoreError> {
        let thread = ThreadActiveModel {
            id: Set(ThreadId::new()),
            title: Set(title),
            created_by: Set(author),
            created_at: Set(Utc::now()),
        };

        let result = Thread::insert(thread).exec_with_returning(&self.db).await?;

        tracing::info!(thread_id = %result.id, user_id = %author, "created thread");
        Ok(result)
    }

    /// Get a single message with its reactions and attachments
    pub async fn get_message(&self, message_id: MessageId) -> Result<Message, StoreError> {
        let model = self._get_message(message_id).await?;
        self.load_message(model).await
    }

    async fn _get_message(&self, message_id: MessageId) -> Result<MessageModel, StoreError> {
        MessageEntity::find_by_id(message_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::MessageNotFound)
    }

    /// Fetches a message and checks that `actor` wrote it
    async fn _get_authored(
        &self,
        actor: UserId,
        message_id: MessageId,
    ) -> Result<MessageModel, StoreError> {
        let message = self._get_message(message_id).await?;

        if message.author_id != actor {
            tracing::warn!(message_id = %message_id, user_id = %actor, "rejected change by non-author");
            return Err(StoreError::Unauthorized);
        }

        Ok(message)
    }

    async fn ensure_thread(&self, thread_id: ThreadId) -> Result<(), StoreError> {
        let thread_exists = Thread::find_by_id(thread_id)
            .one(&self.db)
            .await?
            .is_some();

        if !thread_exists {
            return Err(StoreError::ThreadNotFound);
        }
        Ok(())
    }

    async fn load_message(&self, model: MessageModel) -> Result<Message, StoreError> {
        let reactions = ReactionEntity::find()
            .filter(ReactionColumn::MessageId.eq(model.id))
            .order_by_asc(ReactionColumn::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Reaction::from)
            .collect();

        let attachments = Attachment::find()
            .filter(AttachmentColumn::MessageId.eq(model.id))
            .order_by_asc(AttachmentColumn::Position)
            .all(&self.db)
            .await?
            .into_iter()
            .map(AttachmentRef::from)
            .collect();

        Ok(Message::from_parts(model, reactions, attachments))
    }

    pub async fn _list_messages(&self, thread_id: ThreadId) -> Result<Vec<Message>, StoreError> {
        self.ensure_thread(thread_id).await?;

        // Insert order of the auto-increment key is creation order
        let models = MessageEntity::find()
            .filter(MessageColumn::ThreadId.eq(thread_id))
            .order_by_asc(MessageColumn::Id)
            .all(&self.db)
            .await?;

        if models.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MessageId> = models.iter().map(|m| m.id).collect();

        let mut reactions: HashMap<MessageId, Vec<Reaction>> = HashMap::new();
        for reaction in ReactionEntity::find()
            .filter(ReactionColumn::MessageId.is_in(ids.clone()))
            .order_by_asc(ReactionColumn::CreatedAt)
            .all(&self.db)
            .await?
        {
            reactions
                .entry(reaction.message_id)
                .or_default()
                .push(reaction.into());
        }

        let mut attachments: HashMap<MessageId, Vec<AttachmentRef>> = HashMap::new();
        for attachment in Attachment::find()
            .filter(AttachmentColumn::MessageId.is_in(ids))
            .order_by_asc(AttachmentColumn::MessageId)
            .order_by_asc(AttachmentColumn::Position)
            .all(&self.db)
            .await?
        {
            attachments
                .entry(attachment.message_id)
                .or_default()
                .push(attachment.into());
        }

        let messages = models
            .into_iter()
            .map(|model| {
                let id = model.id;
                Message::from_parts(
                    model,
                    reactions.remove(&id).unwrap_or_default(),
                    attachments.remove(&id).unwrap_or_default(),
                )
            })
            .collect();

        Ok(messages)
    }

    /// Create a top-level message, or a reply when `parent_id` is set
    pub async fn _post_message(
        &self,
        actor: UserId,
        thread_id: ThreadId,
        body: String,
        parent_id: Option<MessageId>,
    ) -> Result<Message, StoreError> {
        self.ensure_thread(thread_id).await?;

        // Replies must stay inside the parent's thread
        if let Some(parent_id) = parent_id {
            let parent = MessageEntity::find_by_id(parent_id).one(&self.db).await?;
            match parent {
                Some(parent) if parent.thread_id == thread_id => {}
                _ => return Err(StoreError::ParentNotFound),
            }
        }

        let now = Utc::now();
        let message = MessageActiveModel {
            id: NotSet,
            thread_id: Set(thread_id),
            parent_id: Set(parent_id),
            author_id: Set(actor),
            body: Set(body),
            is_edited: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = MessageEntity::insert(message)
            .exec_with_returning(&self.db)
            .await?;

        tracing::info!(
            thread_id = %thread_id,
            message_id = %result.id,
            user_id = %actor,
            reply = parent_id.is_some(),
            "posted message"
        );
        Ok(Message::from_parts(result, Vec::new(), Vec::new()))
    }

    /// Replace a message body (only by author)
    pub async fn _edit_message(
        &self,
        actor: UserId,
        message_id: MessageId,
        new_body: String,
    ) -> Result<Message, StoreError> {
        let message = self._get_authored(actor, message_id).await?;

        let mut message_active: MessageActiveModel = message.into();
        message_active.body = Set(new_body);
        message_active.is_edited = Set(true);
        message_active.updated_at = Set(Utc::now());

        let updated = message_active.update(&self.db).await?;

        tracing::info!(message_id = %message_id, user_id = %actor, "edited message");
        self.load_message(updated).await
    }

    /// Delete a message with its reactions and attachments (only by author).
    /// Replies are left in place.
    pub async fn _delete_message(
        &self,
        actor: UserId,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        self._get_authored(actor, message_id).await?;

        let storage_keys: Vec<String> = Attachment::find()
            .filter(AttachmentColumn::MessageId.eq(message_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|a| a.storage_key)
            .collect();

        let txn = self.db.begin().await?;

        ReactionEntity::delete_many()
            .filter(ReactionColumn::MessageId.eq(message_id))
            .exec(&txn)
            .await?;

        Attachment::delete_many()
            .filter(AttachmentColumn::MessageId.eq(message_id))
            .exec(&txn)
            .await?;

        MessageEntity::delete_by_id(message_id).exec(&txn).await?;

        txn.commit().await?;

        for key in storage_keys {
            let path = self.attachment_dir.join(&key);
            if let Err(error) = tokio::fs::remove_file(&path).await {
                if error.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), %error, "failed to remove attachment file");
                }
            }
        }

        tracing::info!(message_id = %message_id, user_id = %actor, "deleted message");
        Ok(())
    }

    pub async fn _toggle_reaction(
        &self,
        actor: UserId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<ReactionToggle, StoreError> {
        self._get_message(message_id).await?;

        let mut own: Vec<Reaction> = ReactionEntity::find()
            .filter(ReactionColumn::MessageId.eq(message_id))
            .filter(ReactionColumn::UserId.eq(actor))
            .all(&self.db)
            .await?
            .into_iter()
            .map(Reaction::from)
            .collect();

        let outcome = toggle_reaction(&mut own, actor, &emoji);
        match outcome {
            ReactionToggle::Added => {
                let reaction = ReactionActiveModel {
                    message_id: Set(message_id),
                    user_id: Set(actor),
                    emoji: Set(emoji.clone()),
                    created_at: Set(Utc::now()),
                };
                ReactionEntity::insert(reaction).exec(&self.db).await?;
            }
            ReactionToggle::Removed => {
                ReactionEntity::delete_many()
                    .filter(ReactionColumn::MessageId.eq(message_id))
                    .filter(ReactionColumn::UserId.eq(actor))
                    .filter(ReactionColumn::Emoji.eq(emoji.as_str()))
                    .exec(&self.db)
                    .await?;
            }
        }

        tracing::debug!(message_id = %message_id, user_id = %actor, %emoji, ?outcome, "toggled reaction");
        Ok(outcome)
    }

    /// Store the bytes of `file` and append it to the message (only by author)
    pub async fn _upload_attachment(
        &self,
        actor: UserId,
        message_id: MessageId,
        file: AttachmentUpload,
    ) -> Result<AttachmentRef, StoreError> {
        self._get_authored(actor, message_id).await?;

        let size_bytes = file.bytes.len() as u64;
        if size_bytes > self.max_attachment_bytes {
            return Err(StoreError::AttachmentTooLarge {
                limit: self.max_attachment_bytes,
            });
        }

        let existing = Attachment::find()
            .filter(AttachmentColumn::MessageId.eq(message_id))
            .count(&self.db)
            .await?;

        let id = AttachmentId::new();
        // The file name never reaches the file system
        let storage_key = format!("{message_id}/{id}");
        let path = self.attachment_dir.join(&storage_key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, &file.bytes).await?;

        let attachment = AttachmentActiveModel {
            id: Set(id),
            message_id: Set(message_id),
            position: Set(i32::try_from(existing).unwrap_or(i32::MAX)),
            file_name: Set(file.file_name),
            content_type: Set(file.content_type),
            size_bytes: Set(i64::try_from(size_bytes).unwrap_or(i64::MAX)),
            storage_key: Set(storage_key),
            created_at: Set(Utc::now()),
        };

        let result = match Attachment::insert(attachment)
            .exec_with_returning(&self.db)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(error.into());
            }
        };

        tracing::info!(message_id = %message_id, attachment_id = %id, size_bytes, "stored attachment");
        Ok(result.into())
    }
}

#[async_trait]
impl MessageStore for MessagesService {
    async fn list_messages(&self, thread_id: ThreadId) -> Result<Vec<Message>, StoreError> {
        self._list_messages(thread_id).await
    }

    async fn post_message(
        &self,
        actor: UserId,
        thread_id: ThreadId,
        body: String,
        parent_id: Option<MessageId>,
    ) -> Result<Message, StoreError> {
        self._post_message(actor, thread_id, body, parent_id).await
    }

    async fn edit_message(
        &self,
        actor: UserId,
        message_id: MessageId,
        new_body: String,
    ) -> Result<Message, StoreError> {
        self._edit_message(actor, message_id, new_body).await
    }

    async fn delete_message(&self, actor: UserId, message_id: MessageId) -> Result<(), StoreError> {
        self._delete_message(actor, message_id).await
    }

    async fn toggle_reaction(
        &self,
        actor: UserId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<ReactionToggle, StoreError> {
        self._toggle_reaction(actor, message_id, emoji).await
    }

    async fn upload_attachment(
        &self,
        actor: UserId,
        message_id: MessageId,
        file: AttachmentUpload,
    ) -> Result<AttachmentRef, StoreError> {
        self._upload_attachment(actor, message_id, file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::migrator::Migrator;
    use crate::tree::build_forest;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;
    use tempfile::TempDir;

    async fn setup_test_service() -> (MessagesService, TempDir) {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = CarenetConfig::new(dir.path());
        (MessagesService::new(db, &config), dir)
    }

    async fn create_test_thread(service: &MessagesService, author: UserId) -> ThreadId {
        service
            .create_thread(author, "Night shift handover".to_string())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_post_and_list_messages() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let root = service
            ._post_message(author, thread_id, "First".to_string(), None)
            .await
            .unwrap();
        let reply = service
            ._post_message(author, thread_id, "Second".to_string(), Some(root.id))
            .await
            .unwrap();

        assert_eq!(root.parent_id, None);
        assert_eq!(reply.parent_id, Some(root.id));
        assert_eq!(reply.thread_id, thread_id);
        assert!(!reply.is_edited);

        let messages = service._list_messages(thread_id).await.unwrap();
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![root.id, reply.id]);
    }

    #[tokio::test]
    async fn test_root_message_reads_back_without_parent() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let root = service
            ._post_message(author, thread_id, "Top level".to_string(), None)
            .await
            .unwrap();

        let fetched = service.get_message(root.id).await.unwrap();
        assert_eq!(fetched.parent_id, None);
        assert_eq!(fetched.body, "Top level");

        let listed = service._list_messages(thread_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, root.id);
        assert_eq!(listed[0].parent_id, None);

        let model = MessageEntity::find_by_id(root.id)
            .one(&service.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(model.parent_id, None);
    }

    #[tokio::test]
    async fn test_list_unknown_thread_fails() {
        let (service, _dir) = setup_test_service().await;

        let result = service._list_messages(ThreadId::new()).await;
        assert!(matches!(result, Err(StoreError::ThreadNotFound)));
    }

    #[tokio::test]
    async fn test_reply_to_other_thread_fails() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let first = create_test_thread(&service, author).await;
        let second = create_test_thread(&service, author).await;

        let root = service
            ._post_message(author, first, "In first".to_string(), None)
            .await
            .unwrap();

        let result = service
            ._post_message(author, second, "Wrong thread".to_string(), Some(root.id))
            .await;
        assert!(matches!(result, Err(StoreError::ParentNotFound)));

        let result = service
            ._post_message(author, first, "Missing parent".to_string(), Some(MessageId::new(999)))
            .await;
        assert!(matches!(result, Err(StoreError::ParentNotFound)));
    }

    #[tokio::test]
    async fn test_edit_message_by_author() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let posted = service
            ._post_message(author, thread_id, "Original".to_string(), None)
            .await
            .unwrap();

        let edited = service
            ._edit_message(author, posted.id, "Updated".to_string())
            .await
            .unwrap();

        assert_eq!(edited.body, "Updated");
        assert!(edited.is_edited);
        assert!(edited.updated_at >= posted.updated_at);
        assert_eq!(edited.created_at, posted.created_at);
    }

    #[tokio::test]
    async fn test_edit_message_by_non_author_fails() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let other = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let posted = service
            ._post_message(author, thread_id, "Mine".to_string(), None)
            .await
            .unwrap();

        let result = service
            ._edit_message(other, posted.id, "Hijacked".to_string())
            .await;
        assert!(matches!(result, Err(StoreError::Unauthorized)));

        let unchanged = service.get_message(posted.id).await.unwrap();
        assert_eq!(unchanged.body, "Mine");
    }

    #[tokio::test]
    async fn test_delete_message_by_non_author_fails() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let posted = service
            ._post_message(author, thread_id, "Keep".to_string(), None)
            .await
            .unwrap();

        let result = service._delete_message(UserId::new(), posted.id).await;
        assert!(matches!(result, Err(StoreError::Unauthorized)));
        assert!(service.get_message(posted.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_deleted_parent_promotes_replies() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let replier = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let root = service
            ._post_message(author, thread_id, "Parent".to_string(), None)
            .await
            .unwrap();
        let reply = service
            ._post_message(replier, thread_id, "Child".to_string(), Some(root.id))
            .await
            .unwrap();
        service
            ._toggle_reaction(replier, root.id, "👍".to_string())
            .await
            .unwrap();

        service._delete_message(author, root.id).await.unwrap();

        let remaining = service._list_messages(thread_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].parent_id, Some(root.id));

        let forest = build_forest(remaining);
        assert_eq!(forest.roots().len(), 1);
        assert_eq!(forest.roots()[0].id(), reply.id);

        let leftover = ReactionEntity::find()
            .filter(ReactionColumn::MessageId.eq(root.id))
            .count(&service.db)
            .await
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_toggle_reaction_twice_restores() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let reader = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let posted = service
            ._post_message(author, thread_id, "React to me".to_string(), None)
            .await
            .unwrap();
        service
            ._toggle_reaction(author, posted.id, "❤️".to_string())
            .await
            .unwrap();
        let before = service.get_message(posted.id).await.unwrap().reactions;

        let first = service
            ._toggle_reaction(reader, posted.id, "👍".to_string())
            .await
            .unwrap();
        assert_eq!(first, ReactionToggle::Added);
        let during = service.get_message(posted.id).await.unwrap().reactions;
        assert!(during.contains(&Reaction::new("👍", reader)));

        let second = service
            ._toggle_reaction(reader, posted.id, "👍".to_string())
            .await
            .unwrap();
        assert_eq!(second, ReactionToggle::Removed);

        let after = service.get_message(posted.id).await.unwrap().reactions;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_toggle_reaction_on_missing_message_fails() {
        let (service, _dir) = setup_test_service().await;

        let result = service
            ._toggle_reaction(UserId::new(), MessageId::new(42), "👍".to_string())
            .await;
        assert!(matches!(result, Err(StoreError::MessageNotFound)));
    }

    #[tokio::test]
    async fn test_upload_attachments_in_order() {
        let (service, dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let posted = service
            ._post_message(author, thread_id, "See attached".to_string(), None)
            .await
            .unwrap();

        let first = service
            ._upload_attachment(
                author,
                posted.id,
                AttachmentUpload::new("ecg.png", "image/png", vec![1u8, 2, 3]),
            )
            .await
            .unwrap();
        let second = service
            ._upload_attachment(
                author,
                posted.id,
                AttachmentUpload::new("notes.pdf", "application/pdf", vec![4u8; 16]),
            )
            .await
            .unwrap();

        assert_eq!(first.size_bytes, 3);
        let stored = std::fs::read(dir.path().join("attachments").join(&first.storage_key)).unwrap();
        assert_eq!(stored, vec![1u8, 2, 3]);

        let messages = service._list_messages(thread_id).await.unwrap();
        let names: Vec<&str> = messages[0]
            .attachments
            .iter()
            .map(|a| a.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["ecg.png", "notes.pdf"]);
        assert_eq!(messages[0].attachments[1].id, second.id);
    }

    #[tokio::test]
    async fn test_upload_attachment_limits() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let posted = service
            ._post_message(author, thread_id, "Body".to_string(), None)
            .await
            .unwrap();

        let result = service
            ._upload_attachment(
                UserId::new(),
                posted.id,
                AttachmentUpload::new("x.txt", "text/plain", vec![0u8]),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Unauthorized)));

        let oversized = vec![0u8; (service.max_attachment_bytes + 1) as usize];
        let result = service
            ._upload_attachment(
                author,
                posted.id,
                AttachmentUpload::new("big.bin", "application/octet-stream", oversized),
            )
            .await;
        assert!(matches!(result, Err(StoreError::AttachmentTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_reply_lands_under_parent_after_rebuild() {
        let (service, _dir) = setup_test_service().await;
        let author = UserId::new();
        let thread_id = create_test_thread(&service, author).await;

        let root = service
            ._post_message(author, thread_id, "Root".to_string(), None)
            .await
            .unwrap();
        let middle = service
            ._post_message(author, thread_id, "Middle".to_string(), Some(root.id))
            .await
            .unwrap();
        service
            ._post_message(author, thread_id, "Other root".to_string(), None)
            .await
            .unwrap();

        let reply = service
            ._post_message(author, thread_id, "Reply".to_string(), Some(middle.id))
            .await
            .unwrap();

        let forest = build_forest(service._list_messages(thread_id).await.unwrap());
        let parent = forest.find(middle.id).unwrap();
        assert_eq!(parent.children().len(), 1);
        assert_eq!(parent.children()[0].id(), reply.id);
        assert_eq!(parent.children()[0].depth(), 3);
    }
}
