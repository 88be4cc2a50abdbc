use sea_orm_migration::{prelude::*, schema::*};

use super::m20261019_000002_create_messages_table::Message;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Attachment::Table)
                    .col(pk_uuid(Attachment::Id))
                    .col(big_integer(Attachment::MessageId))
                    .col(integer(Attachment::Position))
                    .col(string(Attachment::FileName))
                    .col(string(Attachment::ContentType))
                    .col(big_integer(Attachment::SizeBytes))
                    .col(string(Attachment::StorageKey))
                    .col(timestamp_with_time_zone(Attachment::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-attachment-message_id")
                            .from(Attachment::Table, Attachment::MessageId)
                            .to(Message::Table, Message::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attachments_message_id")
                    .table(Attachment::Table)
                    .col(Attachment::MessageId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Attachment::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Attachment {
    Table,
    Id,
    MessageId,
    Position,
    FileName,
    ContentType,
    SizeBytes,
    StorageKey,
    CreatedAt,
}
