#[cfg(test)]
mod entity_tests {
    use crate::entity::prelude::*;
    use crate::ids::*;
    use crate::models::migrator::Migrator;
    use chrono::Utc;
    use sea_orm_migration::MigratorTrait;

    /// Test helper to create and migrate an in-memory database
    async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    async fn insert_thread(db: &DatabaseConnection) -> ThreadId {
        let thread_id = ThreadId::new();
        let thread = ThreadActiveModel {
            id: Set(thread_id),
            title: Set("Ward 4 discussion".to_string()),
            created_by: Set(UserId::new()),
            created_at: Set(Utc::now()),
        };
        Thread::insert(thread).exec(db).await.unwrap();
        thread_id
    }

    async fn insert_message(
        db: &DatabaseConnection,
        thread_id: ThreadId,
        parent_id: Option<MessageId>,
    ) -> MessageModel {
        let now = Utc::now();
        let message = MessageActiveModel {
            id: NotSet,
            thread_id: Set(thread_id),
            parent_id: Set(parent_id),
            author_id: Set(UserId::new()),
            body: Set("Body".to_string()),
            is_edited: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        MessageEntity::insert(message)
            .exec_with_returning(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_thread() {
        let db = setup_test_db().await;
        let thread_id = insert_thread(&db).await;

        let found = Thread::find_by_id(thread_id)
            .one(&db)
            .await
            .expect("Failed to query thread");

        assert!(found.is_some());
        assert_eq!(found.unwrap().title, "Ward 4 discussion");
    }

    #[tokio::test]
    async fn test_message_ids_are_assigned_in_order() {
        let db = setup_test_db().await;
        let thread_id = insert_thread(&db).await;

        let first = insert_message(&db, thread_id, None).await;
        let second = insert_message(&db, thread_id, Some(first.id)).await;

        assert!(second.id > first.id);
        assert_eq!(second.parent_id, Some(first.id));

        let found = MessageEntity::find_by_id(second.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, second);
    }

    #[tokio::test]
    async fn test_parent_id_may_dangle() {
        let db = setup_test_db().await;
        let thread_id = insert_thread(&db).await;

        let orphan = insert_message(&db, thread_id, Some(MessageId::new(12345))).await;
        assert_eq!(orphan.parent_id, Some(MessageId::new(12345)));
    }

    #[tokio::test]
    async fn test_reaction_key_is_unique() {
        let db = setup_test_db().await;
        let thread_id = insert_thread(&db).await;
        let message = insert_message(&db, thread_id, None).await;
        let user_id = UserId::new();

        let reaction = || ReactionActiveModel {
            message_id: Set(message.id),
            user_id: Set(user_id),
            emoji: Set("👍".to_string()),
            created_at: Set(Utc::now()),
        };

        ReactionEntity::insert(reaction()).exec(&db).await.unwrap();
        let duplicate = ReactionEntity::insert(reaction()).exec(&db).await;
        assert!(duplicate.is_err());

        let count = ReactionEntity::find()
            .filter(ReactionColumn::MessageId.eq(message.id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_find_related_attachments() {
        let db = setup_test_db().await;
        let thread_id = insert_thread(&db).await;
        let message = insert_message(&db, thread_id, None).await;

        for position in 0..3 {
            let attachment = AttachmentActiveModel {
                id: Set(AttachmentId::new()),
                message_id: Set(message.id),
                position: Set(position),
                file_name: Set(format!("scan-{position}.png")),
                content_type: Set("image/png".to_string()),
                size_bytes: Set(10),
                storage_key: Set(format!("{}/{position}", message.id)),
                created_at: Set(Utc::now()),
            };
            Attachment::insert(attachment).exec(&db).await.unwrap();
        }

        let attachments = message
            .find_related(Attachment)
            .order_by_asc(AttachmentColumn::Position)
            .all(&db)
            .await
            .unwrap();

        let names: Vec<String> = attachments.into_iter().map(|a| a.file_name).collect();
        assert_eq!(names, vec!["scan-0.png", "scan-1.png", "scan-2.png"]);
    }

    #[tokio::test]
    async fn test_messages_filtered_by_thread() {
        let db = setup_test_db().await;
        let first = insert_thread(&db).await;
        let second = insert_thread(&db).await;

        insert_message(&db, first, None).await;
        insert_message(&db, first, None).await;
        insert_message(&db, second, None).await;

        let in_first = MessageEntity::find()
            .filter(MessageColumn::ThreadId.eq(first))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(in_first, 2);
    }
}
