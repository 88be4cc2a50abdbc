//! Client-side state for one open thread.
//!
//! Mutations are never merged into the local forest. Each one goes to the
//! store, and on success the whole forest is rebuilt from the list the store
//! returns. While a call is in flight only the control that issued it is
//! busy; unrelated controls keep working.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::DEFAULT_MAX_ATTACHMENT_BYTES;
use crate::error::{ActionError, StoreError, ValidationError};
use crate::ids::{MessageId, ThreadId, UserId};
use crate::models::{AttachmentUpload, Message};
use crate::reactions::ReactionToggle;
use crate::store::MessageStore;
use crate::tree::{build_forest, DepthPolicy, Forest};

/// The UI element an action was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Box for new top-level messages.
    Composer,
    Reply(MessageId),
    Edit(MessageId),
    Delete(MessageId),
    React(MessageId),
}

/// Unsent user input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    pub attachments: Vec<AttachmentUpload>,
}

impl Draft {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, file: AttachmentUpload) -> Self {
        self.attachments.push(file);
        self
    }

    /// Whitespace-only bodies count as empty.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty() && self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub open: bool,
    pub busy: bool,
    /// Input kept after a failed submission.
    pub draft: Option<Draft>,
}

/// A dismissable error message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub control: Control,
    pub text: String,
}

/// Limits a session checks locally before contacting the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub policy: DepthPolicy,
    pub max_attachment_bytes: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: DepthPolicy::default(),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Default)]
struct SessionState {
    forest: Arc<Forest>,
    /// Generation of the listing `forest` was built from.
    installed: u64,
    controls: HashMap<Control, ControlState>,
    notices: Vec<Notice>,
    next_notice: u64,
}

impl SessionState {
    fn push_notice(&mut self, control: Control, text: String) {
        self.next_notice += 1;
        self.notices.push(Notice {
            id: self.next_notice,
            control,
            text,
        });
    }

    /// Rebuilds the forest unless a listing requested later is already in place.
    fn install(&mut self, generation: u64, messages: Vec<Message>) -> bool {
        if generation <= self.installed {
            return false;
        }
        self.installed = generation;
        self.forest = Arc::new(build_forest(messages));
        true
    }
}

/// Result of a post or edit followed by its uploads.
enum Submitted {
    Done(Message),
    /// The message was saved, the listed files were not.
    Partial {
        message: Message,
        unsent: Vec<AttachmentUpload>,
        error: StoreError,
    },
}

pub struct ThreadSession {
    store: Arc<dyn MessageStore>,
    thread_id: ThreadId,
    viewer: UserId,
    options: SessionOptions,
    state: Mutex<SessionState>,
    closed: AtomicBool,
    generation: AtomicU64,
}

impl ThreadSession {
    /// Loads the thread and builds its first forest.
    pub async fn open(
        store: Arc<dyn MessageStore>,
        thread_id: ThreadId,
        viewer: UserId,
        options: SessionOptions,
    ) -> Result<Self, StoreError> {
        let messages = store.list_messages(thread_id).await?;
        let state = SessionState {
            forest: Arc::new(build_forest(messages)),
            ..SessionState::default()
        };

        tracing::debug!(thread_id = %thread_id, user_id = %viewer, "opened thread session");
        Ok(Self {
            store,
            thread_id,
            viewer,
            options,
            state: Mutex::new(state),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn policy(&self) -> DepthPolicy {
        self.options.policy
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Snapshot of the current forest. Later rebuilds do not affect it.
    pub async fn forest(&self) -> Arc<Forest> {
        self.state.lock().await.forest.clone()
    }

    /// Stops applying results. Calls already in flight still run to completion.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn control(&self, control: Control) -> ControlState {
        self.state
            .lock()
            .await
            .controls
            .get(&control)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn draft(&self, control: Control) -> Option<Draft> {
        self.control(control).await.draft
    }

    pub async fn open_control(&self, control: Control) {
        self.state
            .lock()
            .await
            .controls
            .entry(control)
            .or_default()
            .open = true;
    }

    /// Closes an idle control and discards its retained draft.
    pub async fn close_control(&self, control: Control) {
        let mut state = self.state.lock().await;
        if state.controls.get(&control).is_some_and(|c| !c.busy) {
            state.controls.remove(&control);
        }
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.state.lock().await.notices.clone()
    }

    pub async fn dismiss(&self, notice_id: u64) -> bool {
        let mut state = self.state.lock().await;
        let before = state.notices.len();
        state.notices.retain(|n| n.id != notice_id);
        state.notices.len() != before
    }

    /// Re-fetches the thread and rebuilds the forest from scratch.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let (generation, listing) = self.fetch().await;
        let messages = listing?;

        if self.is_closed() {
            return Ok(());
        }
        if !self.state.lock().await.install(generation, messages) {
            tracing::debug!(thread_id = %self.thread_id, generation, "skipped stale thread listing");
        }
        Ok(())
    }

    /// Posts a new top-level message.
    pub async fn post(&self, draft: Draft) -> Result<Message, ActionError> {
        if draft.is_empty() {
            return Err(ValidationError::EmptyDraft.into());
        }
        self.check_attachments(&draft)?;

        let control = Control::Composer;
        self.begin(control, Some(draft.clone())).await?;
        let result = self.submit(draft, None).await;
        self.settle(control, result).await
    }

    pub async fn reply(&self, parent_id: MessageId, draft: Draft) -> Result<Message, ActionError> {
        let parent_depth = {
            let forest = self.forest().await;
            forest
                .find(parent_id)
                .map(|node| node.depth())
                .ok_or(ValidationError::UnknownMessage(parent_id))?
        };
        if !self.options.policy.can_reply(parent_depth) {
            return Err(ValidationError::ReplyTooDeep {
                depth: parent_depth,
                max: self.options.policy.max_depth(),
            }
            .into());
        }
        if draft.is_empty() {
            return Err(ValidationError::EmptyDraft.into());
        }
        self.check_attachments(&draft)?;

        let control = Control::Reply(parent_id);
        self.begin(control, Some(draft.clone())).await?;
        let result = self.submit(draft, Some(parent_id)).await;
        self.settle(control, result).await
    }

    /// Replaces the body of a message and appends any new attachments.
    pub async fn edit(&self, message_id: MessageId, draft: Draft) -> Result<Message, ActionError> {
        let has_attachments = {
            let forest = self.forest().await;
            let node = forest
                .find(message_id)
                .ok_or(ValidationError::UnknownMessage(message_id))?;
            !node.message().attachments.is_empty()
        };
        if draft.is_empty() && !has_attachments {
            return Err(ValidationError::EmptyDraft.into());
        }
        self.check_attachments(&draft)?;

        let control = Control::Edit(message_id);
        self.begin(control, Some(draft.clone())).await?;
        let result = self.submit_edit(message_id, draft).await;
        self.settle(control, result).await
    }

    pub async fn delete(&self, message_id: MessageId) -> Result<(), ActionError> {
        self.ensure_known(message_id).await?;

        let control = Control::Delete(message_id);
        self.begin(control, None).await?;
        let result = self
            .store
            .delete_message(self.viewer, message_id)
            .await
            .map_err(ActionError::from);
        self.finish(control, result).await
    }

    pub async fn toggle_reaction(
        &self,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<ReactionToggle, ActionError> {
        self.ensure_known(message_id).await?;

        let control = Control::React(message_id);
        self.begin(control, None).await?;
        let result = self
            .store
            .toggle_reaction(self.viewer, message_id, emoji.to_string())
            .await
            .map_err(ActionError::from);
        self.finish(control, result).await
    }

    async fn ensure_known(&self, message_id: MessageId) -> Result<(), ValidationError> {
        if self.forest().await.find(message_id).is_none() {
            return Err(ValidationError::UnknownMessage(message_id));
        }
        Ok(())
    }

    fn check_attachments(&self, draft: &Draft) -> Result<(), ValidationError> {
        let limit = self.options.max_attachment_bytes;
        match draft
            .attachments
            .iter()
            .find(|file| file.bytes.len() as u64 > limit)
        {
            Some(file) => Err(ValidationError::AttachmentTooLarge {
                file_name: file.file_name.clone(),
                limit,
            }),
            None => Ok(()),
        }
    }

    /// Lists the thread, stamped with the order the request was issued in.
    async fn fetch(&self) -> (u64, Result<Vec<Message>, StoreError>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, self.store.list_messages(self.thread_id).await)
    }

    async fn submit(
        &self,
        draft: Draft,
        parent_id: Option<MessageId>,
    ) -> Result<Submitted, ActionError> {
        let message = self
            .store
            .post_message(self.viewer, self.thread_id, draft.body, parent_id)
            .await?;
        Ok(self.upload_all(message, draft.attachments).await)
    }

    async fn submit_edit(
        &self,
        message_id: MessageId,
        draft: Draft,
    ) -> Result<Submitted, ActionError> {
        let message = self
            .store
            .edit_message(self.viewer, message_id, draft.body)
            .await?;
        Ok(self.upload_all(message, draft.attachments).await)
    }

    /// Uploads `files` in order, stopping at the first failure.
    async fn upload_all(&self, mut message: Message, files: Vec<AttachmentUpload>) -> Submitted {
        let mut pending = files.into_iter();
        while let Some(file) = pending.next() {
            match self
                .store
                .upload_attachment(self.viewer, message.id, file.clone())
                .await
            {
                Ok(attachment) => message.attachments.push(attachment),
                Err(error) => {
                    let mut unsent = vec![file];
                    unsent.extend(pending);
                    return Submitted::Partial {
                        message,
                        unsent,
                        error,
                    };
                }
            }
        }
        Submitted::Done(message)
    }

    /// Marks `control` busy, refusing if it already is.
    async fn begin(&self, control: Control, draft: Option<Draft>) -> Result<(), ActionError> {
        let mut state = self.state.lock().await;
        let entry = state.controls.entry(control).or_default();
        if entry.busy {
            return Err(ActionError::Busy(control));
        }
        entry.busy = true;
        entry.open = true;
        if draft.is_some() {
            entry.draft = draft;
        }
        Ok(())
    }

    async fn settle(
        &self,
        control: Control,
        result: Result<Submitted, ActionError>,
    ) -> Result<Message, ActionError> {
        match result {
            Ok(Submitted::Done(message)) => self.finish(control, Ok(message)).await,
            Ok(Submitted::Partial {
                message,
                unsent,
                error,
            }) => self.finish_partial(control, message, unsent, error).await,
            Err(error) => self.finish(control, Err(error)).await,
        }
    }

    /// Applies the outcome of a store call to the session.
    ///
    /// Success closes the control and rebuilds the forest. Failure frees the
    /// control, keeps its draft and queues a notice.
    async fn finish<T>(
        &self,
        control: Control,
        result: Result<T, ActionError>,
    ) -> Result<T, ActionError> {
        if self.is_closed() {
            return result;
        }

        match result.as_ref().err().map(ToString::to_string) {
            None => {
                tracing::info!(thread_id = %self.thread_id, user_id = %self.viewer, ?control, "thread action succeeded");
                let (generation, listing) = self.fetch().await;
                if self.is_closed() {
                    return result;
                }

                let mut state = self.state.lock().await;
                state.controls.remove(&control);
                self.apply_listing(&mut state, control, generation, listing);
            }
            Some(error) => {
                tracing::warn!(thread_id = %self.thread_id, user_id = %self.viewer, ?control, %error, "thread action failed");
                let mut state = self.state.lock().await;
                if let Some(entry) = state.controls.get_mut(&control) {
                    entry.busy = false;
                }
                state.push_notice(control, error);
            }
        }

        result
    }

    /// The message was saved but some of its files were not.
    ///
    /// The forest is rebuilt so the saved message shows up, and the unsent
    /// files move to a draft on that message's edit control. Resubmitting that
    /// draft uploads the rest without posting the message again.
    async fn finish_partial(
        &self,
        control: Control,
        message: Message,
        unsent: Vec<AttachmentUpload>,
        error: StoreError,
    ) -> Result<Message, ActionError> {
        let message_id = message.id;
        tracing::warn!(
            thread_id = %self.thread_id,
            message_id = %message_id,
            ?control,
            unsent = unsent.len(),
            %error,
            "attachments failed after message was saved"
        );
        let error = ActionError::PartiallyApplied {
            message_id,
            source: error,
        };
        if self.is_closed() {
            return Err(error);
        }

        let (generation, listing) = self.fetch().await;
        if self.is_closed() {
            return Err(error);
        }

        let follow_up = Control::Edit(message_id);
        let mut state = self.state.lock().await;
        state.controls.remove(&control);
        state.controls.insert(
            follow_up,
            ControlState {
                open: true,
                busy: false,
                draft: Some(Draft {
                    body: message.body,
                    attachments: unsent,
                }),
            },
        );
        self.apply_listing(&mut state, follow_up, generation, listing);
        state.push_notice(follow_up, error.to_string());

        Err(error)
    }

    fn apply_listing(
        &self,
        state: &mut SessionState,
        control: Control,
        generation: u64,
        listing: Result<Vec<Message>, StoreError>,
    ) {
        match listing {
            Ok(messages) => {
                if !state.install(generation, messages) {
                    tracing::debug!(thread_id = %self.thread_id, generation, "skipped stale thread listing");
                }
            }
            Err(error) => {
                tracing::warn!(thread_id = %self.thread_id, %error, "refresh after action failed");
                state.push_notice(
                    control,
                    format!("Saved, but the thread could not be reloaded: {error}"),
                );
            }
        }
    }
}
