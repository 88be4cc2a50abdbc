pub mod config;
pub mod entity;
pub mod error;
pub mod ids;
pub mod models;
pub mod reactions;
pub mod render;
pub mod service;
pub mod session;
pub mod store;
pub mod tree;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::OnceCell;

use crate::error::{StartError, StoreError};
use crate::ids::{ThreadId, UserId};
use crate::service::messages::MessagesService;
use crate::session::ThreadSession;

static CARENET_CORE: OnceCell<Arc<CarenetCore>> = OnceCell::const_new();

/// Process-wide handle, started from the platform config on first use.
pub async fn core() -> Result<Arc<CarenetCore>, StartError> {
    CARENET_CORE
        .get_or_try_init(|| async move { CarenetCore::start().await.map(Arc::new) })
        .await
        .cloned()
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `carenet_core=info`.
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carenet_core=info".into()),
        )
        .try_init()
    {
        tracing::debug!(%error, "kept existing tracing subscriber");
    }
}

/// Main runtime handle: configuration, database and the message store.
pub struct CarenetCore {
    pub config: config::CarenetConfig,

    db: DatabaseConnection,

    pub messages: MessagesService,
}

impl CarenetCore {
    pub async fn start() -> Result<Self, StartError> {
        let config = config::get_or_init().await?;
        Self::start_with(config).await
    }

    pub async fn start_with(config: config::CarenetConfig) -> Result<Self, StartError> {
        tracing::info!(database = %config.database_path.display(), "starting carenet core");

        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let messages = MessagesService::new(db.clone(), &config);

        Ok(Self {
            config,
            db,
            messages,
        })
    }

    /// Opens a thread for `viewer` using the configured depth and attachment limits.
    pub async fn open_thread(
        &self,
        thread_id: ThreadId,
        viewer: UserId,
    ) -> Result<ThreadSession, StoreError> {
        ThreadSession::open(
            Arc::new(self.messages.clone()),
            thread_id,
            viewer,
            self.config.session_options(),
        )
        .await
    }

    pub async fn shutdown(self) -> Result<(), StartError> {
        self.db
            .close()
            .await
            .map_err(|e| StartError::Db(error::DbError::Connect(e)))
    }
}

pub mod prelude {
    pub use super::config::CarenetConfig;
    pub use super::error::{ActionError, StoreError, ValidationError};
    pub use super::ids::{AttachmentId, MessageId, ThreadId, UserId};
    pub use super::models::{AttachmentRef, AttachmentUpload, Message, Reaction};
    pub use super::reactions::{summarize_reactions, ReactionSummary, ReactionToggle};
    pub use super::render::{render_rows, RenderContext, RenderRow};
    pub use super::session::{Control, Draft, Notice, SessionOptions, ThreadSession};
    pub use super::store::{MessageStore, NoRelationships, Relationship, RelationshipLookup};
    pub use super::tree::{build_forest, can_reply, should_indent, CommentNode, DepthPolicy, Forest, MAX_REPLY_DEPTH};
    pub use super::CarenetCore;
}
