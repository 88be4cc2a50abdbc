use sea_orm_migration::{prelude::*, schema::*};

use super::m20261019_000001_create_threads_table::Thread;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Message::Table)
                    .col(pk_auto(Message::Id))
                    .col(uuid(Message::ThreadId))
                    // No foreign key: a reply keeps its parent id after the parent is deleted
                    .col(big_integer_null(Message::ParentId))
                    .col(uuid(Message::AuthorId))
                    .col(text(Message::Body))
                    .col(boolean(Message::IsEdited).default(false))
                    .col(timestamp_with_time_zone(Message::CreatedAt))
                    .col(timestamp_with_time_zone(Message::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-message-thread_id")
                            .from(Message::Table, Message::ThreadId)
                            .to(Thread::Table, Thread::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_thread_id")
                    .table(Message::Table)
                    .col(Message::ThreadId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_parent_id")
                    .table(Message::Table)
                    .col(Message::ParentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Message::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Message {
    Table,
    Id,
    ThreadId,
    ParentId,
    AuthorId,
    Body,
    IsEdited,
    CreatedAt,
    UpdatedAt,
}
