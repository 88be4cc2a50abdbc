// SeaORM entities backing the message store.

pub mod attachment;
pub mod message;
pub mod reaction;
pub mod thread;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use super::attachment::{
        ActiveModel as AttachmentActiveModel, Column as AttachmentColumn, Entity as Attachment,
        Model as AttachmentModel,
    };
    pub use super::message::{
        ActiveModel as MessageActiveModel, Column as MessageColumn, Entity as MessageEntity,
        Model as MessageModel,
    };
    pub use super::reaction::{
        ActiveModel as ReactionActiveModel, Column as ReactionColumn, Entity as ReactionEntity,
        Model as ReactionModel,
    };
    pub use super::thread::{
        ActiveModel as ThreadActiveModel, Column as ThreadColumn, Entity as Thread,
        Model as ThreadModel,
    };

    pub use sea_orm::{
        ActiveModelTrait,
        ActiveValue,
        ColumnTrait,
        ConnectionTrait,

        Database,
        DatabaseConnection,
        DbConn,
        DbErr,

        EntityTrait,
        ModelTrait,
        NotSet,
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        Related,
        Set,
        TransactionTrait,
    };
}
