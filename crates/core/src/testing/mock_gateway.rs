//! Mock messaging gateway for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::gateway::{ChatId, GatewayError, MessageHandle, MessagingGateway};

/// How a mocked gateway operation responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    #[default]
    Succeed,
    /// Fail with `GatewayError::NotModified`.
    NotModified,
    /// Fail with an API error.
    Fail,
    /// Never complete.
    Hang,
}

/// A recorded text or status message.
#[derive(Debug, Clone)]
pub struct SentText {
    pub chat: ChatId,
    pub text: String,
    /// Sent through `send_status` rather than `send_text`.
    pub is_status: bool,
    pub message_id: i64,
}

/// A recorded status edit. Failed attempts are recorded too.
#[derive(Debug, Clone)]
pub struct RecordedEdit {
    pub message: MessageHandle,
    pub text: String,
    pub at: Instant,
}

/// A recorded file upload.
#[derive(Debug, Clone)]
pub struct SentFile {
    pub chat: ChatId,
    pub path: PathBuf,
    pub caption: String,
    /// Whether the file existed on disk when the upload was attempted.
    pub existed: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Behaviors {
    send_text: MockBehavior,
    edit: MockBehavior,
    send_file: MockBehavior,
    delete: MockBehavior,
    close: MockBehavior,
}

/// Mock implementation of the MessagingGateway trait.
///
/// Records every call and lets tests choose, per operation, whether it
/// succeeds, fails or hangs.
///
/// # Example
///
/// ```rust,ignore
/// use zenload_core::testing::{MockBehavior, MockGateway};
///
/// let gateway = MockGateway::new();
/// gateway.set_send_file_behavior(MockBehavior::Fail).await;
///
/// // ... run a download ...
///
/// assert_eq!(gateway.files().await.len(), 1);
/// assert_eq!(gateway.deleted().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockGateway {
    texts: Arc<RwLock<Vec<SentText>>>,
    edits: Arc<RwLock<Vec<RecordedEdit>>>,
    files: Arc<RwLock<Vec<SentFile>>>,
    deleted: Arc<RwLock<Vec<MessageHandle>>>,
    behaviors: Arc<RwLock<Behaviors>>,
    next_message_id: AtomicI64,
    closed: AtomicBool,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            texts: Arc::new(RwLock::new(Vec::new())),
            edits: Arc::new(RwLock::new(Vec::new())),
            files: Arc::new(RwLock::new(Vec::new())),
            deleted: Arc::new(RwLock::new(Vec::new())),
            behaviors: Arc::new(RwLock::new(Behaviors::default())),
            next_message_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn set_send_text_behavior(&self, behavior: MockBehavior) {
        self.behaviors.write().await.send_text = behavior;
    }

    pub async fn set_edit_behavior(&self, behavior: MockBehavior) {
        self.behaviors.write().await.edit = behavior;
    }

    /// Only `Hang` changes `close`: the gateway is marked closed, then the
    /// call never returns.
    pub async fn set_close_behavior(&self, behavior: MockBehavior) {
        self.behaviors.write().await.close = behavior;
    }

    pub async fn set_send_file_behavior(&self, behavior: MockBehavior) {
        self.behaviors.write().await.send_file = behavior;
    }

    pub async fn set_delete_behavior(&self, behavior: MockBehavior) {
        self.behaviors.write().await.delete = behavior;
    }

    pub async fn sent_texts(&self) -> Vec<SentText> {
        self.texts.read().await.clone()
    }

    /// Texts sent with `send_text`, i.e. excluding status messages.
    pub async fn notices(&self) -> Vec<String> {
        self.texts
            .read()
            .await
            .iter()
            .filter(|t| !t.is_status)
            .map(|t| t.text.clone())
            .collect()
    }

    pub async fn edits(&self) -> Vec<RecordedEdit> {
        self.edits.read().await.clone()
    }

    pub async fn files(&self) -> Vec<SentFile> {
        self.files.read().await.clone()
    }

    pub async fn deleted(&self) -> Vec<MessageHandle> {
        self.deleted.read().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn respond(&self, behavior: MockBehavior) -> Result<(), GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::Closed);
        }
        match behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::NotModified => Err(GatewayError::NotModified),
            MockBehavior::Fail => Err(GatewayError::Api {
                code: 500,
                description: "mock failure".to_string(),
            }),
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    async fn record_text(
        &self,
        chat: ChatId,
        text: &str,
        is_status: bool,
    ) -> Result<MessageHandle, GatewayError> {
        let behavior = self.behaviors.read().await.send_text;
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.texts.write().await.push(SentText {
            chat,
            text: text.to_string(),
            is_status,
            message_id,
        });
        self.respond(behavior).await?;
        Ok(MessageHandle::new(chat, message_id))
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageHandle, GatewayError> {
        self.record_text(chat, text, false).await
    }

    async fn send_status(&self, chat: ChatId, text: &str) -> Result<MessageHandle, GatewayError> {
        self.record_text(chat, text, true).await
    }

    async fn edit_status(&self, message: &MessageHandle, text: &str) -> Result<(), GatewayError> {
        let behavior = self.behaviors.read().await.edit;
        self.edits.write().await.push(RecordedEdit {
            message: *message,
            text: text.to_string(),
            at: Instant::now(),
        });
        self.respond(behavior).await
    }

    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let behavior = self.behaviors.read().await.send_file;
        self.files.write().await.push(SentFile {
            chat,
            path: path.to_path_buf(),
            caption: caption.to_string(),
            existed: path.is_file(),
        });
        self.respond(behavior).await?;
        Ok(MessageHandle::new(
            chat,
            self.next_message_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), GatewayError> {
        let behavior = self.behaviors.read().await.delete;
        self.respond(behavior).await?;
        self.deleted.write().await.push(*message);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.behaviors.read().await.close == MockBehavior::Hang {
            std::future::pending::<()>().await;
        }
    }
}
