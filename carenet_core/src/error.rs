use sea_orm::DbErr;
use thiserror::Error;

use crate::ids::MessageId;
use crate::session::Control;

/// Failures opening or migrating the local database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("data store disconnected")]
    Connect(#[source] DbErr),
    #[error("failed to run migrations")]
    Migrate(#[source] DbErr),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to find a data directory on this platform")]
    NoDataDir,
    #[error("config i/o failed")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by a [`crate::store::MessageStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fatal database error")]
    Db(#[from] DbErr),

    #[error("attachment i/o failed")]
    Io(#[from] std::io::Error),

    #[error("thread not found")]
    ThreadNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("parent message not found in thread")]
    ParentNotFound,

    #[error("unauthorized: not message author")]
    Unauthorized,

    #[error("attachment exceeds {limit} bytes")]
    AttachmentTooLarge { limit: u64 },
}

/// Rejections raised locally, before the store is contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message needs a body or at least one attachment")]
    EmptyDraft,

    #[error("replies stop at depth {max} (parent is at depth {depth})")]
    ReplyTooDeep { depth: u32, max: u32 },

    #[error("message {0} is not part of this thread")]
    UnknownMessage(MessageId),

    #[error("{file_name} is larger than {limit} bytes")]
    AttachmentTooLarge { file_name: String, limit: u64 },
}

/// Errors surfaced to whoever triggered a thread action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0:?} already has a request in flight")]
    Busy(Control),

    #[error("not allowed to modify this message")]
    Unauthorized,

    #[error("message store failed")]
    Store(#[source] StoreError),

    #[error("message {message_id} was saved but some attachments were not")]
    PartiallyApplied {
        message_id: MessageId,
        #[source]
        source: StoreError,
    },
}

impl From<StoreError> for ActionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unauthorized => ActionError::Unauthorized,
            other => ActionError::Store(other),
        }
    }
}

/// Failures bringing up a [`crate::CarenetCore`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
}
