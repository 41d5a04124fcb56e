//! Messaging Gateway abstraction.
//!
//! Workers deliver status updates, result files and failure notices through
//! the [`MessagingGateway`] trait. [`TelegramGateway`] speaks the Telegram Bot
//! API; tests use `testing::MockGateway`.

mod config;
mod error;
mod telegram;
mod traits;
mod types;

pub use config::{GatewayBackend, GatewayConfig, TelegramConfig};
pub use error::GatewayError;
pub use telegram::TelegramGateway;
pub use traits::MessagingGateway;
pub use types::{ChatId, MessageHandle};
