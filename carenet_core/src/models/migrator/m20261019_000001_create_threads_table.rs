use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Thread::Table)
                    .col(pk_uuid(Thread::Id))
                    .col(string(Thread::Title))
                    .col(uuid(Thread::CreatedBy))
                    .col(timestamp_with_time_zone(Thread::CreatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Thread::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Thread {
    Table,
    Id,
    Title,
    CreatedBy,
    CreatedAt,
}
