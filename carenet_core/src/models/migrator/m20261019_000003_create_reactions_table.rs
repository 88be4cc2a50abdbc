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
                    .table(Reaction::Table)
                    .col(big_integer(Reaction::MessageId))
                    .col(uuid(Reaction::UserId))
                    .col(string(Reaction::Emoji))
                    .col(timestamp_with_time_zone(Reaction::CreatedAt))
                    .primary_key(
                        Index::create()
                            .name("pk-reaction")
                            .col(Reaction::MessageId)
                            .col(Reaction::UserId)
                            .col(Reaction::Emoji),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reaction-message_id")
                            .from(Reaction::Table, Reaction::MessageId)
                            .to(Message::Table, Message::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reaction::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Reaction {
    Table,
    MessageId,
    UserId,
    Emoji,
    CreatedAt,
}
