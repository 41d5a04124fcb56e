//! Telegram Bot API gateway.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{RwLock, Semaphore};
use tracing::debug;

use super::{ChatId, GatewayError, MessageHandle, MessagingGateway, TelegramConfig};

/// Bot API envelope shared by every method.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: SentChat,
}

#[derive(Debug, Deserialize)]
struct SentChat {
    id: i64,
}

impl From<SentMessage> for MessageHandle {
    fn from(message: SentMessage) -> Self {
        MessageHandle::new(ChatId(message.chat.id), message.message_id)
    }
}

enum Payload {
    Json(serde_json::Value),
    Multipart(multipart::Form),
}

/// Telegram gateway backed by a shared reqwest connection pool.
pub struct TelegramGateway {
    config: TelegramConfig,
    /// `None` once closed.
    client: RwLock<Option<Client>>,
    permits: Arc<Semaphore>,
}

impl TelegramGateway {
    pub fn new(config: TelegramConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            client: RwLock::new(Some(client)),
            config,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    /// Request URLs embed the bot token, so they never reach error text.
    fn map_transport(&self, e: reqwest::Error) -> GatewayError {
        let e = e.without_url();
        if e.is_timeout() {
            GatewayError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }
        } else {
            GatewayError::Transport(e.to_string())
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: Payload,
    ) -> Result<T, GatewayError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GatewayError::Closed)?;
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or(GatewayError::Closed)?;

        let request = client.post(self.method_url(method));
        let request = match payload {
            Payload::Json(body) => request.json(&body),
            Payload::Multipart(form) => request.multipart(form),
        };

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let body: ApiResponse<T> = response.json().await.map_err(|e| self.map_transport(e))?;
        debug!(method, ok = body.ok, "Bot API call finished");
        into_result(body)
    }

    fn with_parse_mode(&self, mut body: serde_json::Value) -> serde_json::Value {
        if let Some(mode) = &self.config.parse_mode {
            body["parse_mode"] = json!(mode);
        }
        body
    }
}

fn into_result<T>(response: ApiResponse<T>) -> Result<T, GatewayError> {
    if response.ok {
        return response
            .result
            .ok_or_else(|| GatewayError::Transport("response has no result".to_string()));
    }
    let description = response.description.unwrap_or_default();
    if description.contains("message is not modified") {
        return Err(GatewayError::NotModified);
    }
    Err(GatewayError::Api {
        code: response.error_code.unwrap_or_default(),
        description,
    })
}

/// Bot API method and form field for uploading `path`.
fn upload_method(path: &Path) -> (&'static str, &'static str) {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" | "m4a" | "ogg" | "opus" | "flac" | "wav" => ("sendAudio", "audio"),
        "jpg" | "jpeg" | "png" | "webp" => ("sendPhoto", "photo"),
        _ => ("sendVideo", "video"),
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageHandle, GatewayError> {
        let body = self.with_parse_mode(json!({ "chat_id": chat.0, "text": text }));
        let sent: SentMessage = self.call("sendMessage", Payload::Json(body)).await?;
        Ok(sent.into())
    }

    async fn edit_status(&self, message: &MessageHandle, text: &str) -> Result<(), GatewayError> {
        let body = self.with_parse_mode(json!({
            "chat_id": message.chat_id.0,
            "message_id": message.message_id,
            "text": text,
        }));
        // Result is the edited message, or `true` for inline messages.
        let _: serde_json::Value = self.call("editMessageText", Payload::Json(body)).await?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let (method, field) = upload_method(path);
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();

        let mut form = multipart::Form::new()
            .text("chat_id", chat.0.to_string())
            .text("caption", caption.to_string())
            .part(field, multipart::Part::bytes(bytes).file_name(file_name));
        if let Some(mode) = &self.config.parse_mode {
            form = form.text("parse_mode", mode.clone());
        }
        if field == "video" {
            form = form.text("supports_streaming", "true");
        }

        let sent: SentMessage = self.call(method, Payload::Multipart(form)).await?;
        Ok(sent.into())
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), GatewayError> {
        let body = json!({
            "chat_id": message.chat_id.0,
            "message_id": message.message_id,
        });
        let _: bool = self.call("deleteMessage", Payload::Json(body)).await?;
        Ok(())
    }

    async fn close(&self) {
        self.permits.close();
        self.client.write().await.take();
        debug!("Telegram gateway closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> TelegramGateway {
        TelegramGateway::new(TelegramConfig::new("123:abc")).unwrap()
    }

    #[test]
    fn test_method_url() {
        let mut config = TelegramConfig::new("123:abc");
        config.api_url = "http://localhost:8081/".to_string();
        let gateway = TelegramGateway::new(config).unwrap();
        assert_eq!(
            gateway.method_url("sendMessage"),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        let mut config = TelegramConfig::new("123456:SECRET-TOKEN");
        config.api_url = "http://127.0.0.1:1".to_string();
        let gateway = TelegramGateway::new(config).unwrap();

        let err = gateway.send_text(ChatId(1), "hi").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transport(_) | GatewayError::Timeout { .. }
        ));
        assert!(!err.to_string().contains("SECRET-TOKEN"));
        assert!(!format!("{:?}", err).contains("SECRET-TOKEN"));
    }

    #[test]
    fn test_into_result_not_modified() {
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message is not modified: specified new message content and reply markup are exactly the same"}"#,
        )
        .unwrap();
        assert!(matches!(
            into_result(response),
            Err(GatewayError::NotModified)
        ));
    }

    #[test]
    fn test_into_result_api_error() {
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap();
        match into_result(response) {
            Err(GatewayError::Api { code, description }) => {
                assert_eq!(code, 403);
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_into_result_message() {
        let response: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok":true,"result":{"message_id":42,"chat":{"id":-100123,"type":"supergroup"},"text":"hi"}}"#,
        )
        .unwrap();
        let handle: MessageHandle = into_result(response).unwrap().into();
        assert_eq!(handle, MessageHandle::new(ChatId(-100123), 42));
    }

    #[test]
    fn test_upload_method() {
        assert_eq!(upload_method(Path::new("a.mp4")), ("sendVideo", "video"));
        assert_eq!(upload_method(Path::new("a.MP3")), ("sendAudio", "audio"));
        assert_eq!(upload_method(Path::new("a.jpg")), ("sendPhoto", "photo"));
        assert_eq!(upload_method(Path::new("noext")), ("sendVideo", "video"));
    }

    #[tokio::test]
    async fn test_calls_fail_after_close() {
        let gateway = gateway();
        gateway.close().await;

        let result = gateway.send_text(ChatId(1), "hello").await;
        assert!(matches!(result, Err(GatewayError::Closed)));

        let handle = MessageHandle::new(ChatId(1), 2);
        let result = gateway.edit_status(&handle, "x").await;
        assert!(matches!(result, Err(GatewayError::Closed)));
    }
}
