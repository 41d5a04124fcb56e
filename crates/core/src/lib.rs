pub mod config;
pub mod extractor;
pub mod gateway;
pub mod messages;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod rate_limiter;
pub mod settings;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    SanitizedConfig, ServerConfig,
};
pub use extractor::{
    ExtractError, Extractor, ExtractorConfig, FetchedMedia, FormatDescriptor, Platform,
    YtDlpExtractor,
};
pub use gateway::{
    ChatId, GatewayBackend, GatewayConfig, GatewayError, MessageHandle, MessagingGateway,
    TelegramConfig, TelegramGateway,
};
pub use messages::{Language, Localizer};
pub use orchestrator::{
    DownloadConfig, DownloadError, DownloadManager, DownloadRequest, ManagerStatus, RejectReason,
    ShutdownReport, SubmitOutcome, TaskHandle, TaskId, TaskState, TaskSummary,
};
pub use progress::{ProgressCallback, ProgressEmitter, ProgressPump, PumpConfig, PumpStats};
pub use rate_limiter::{HostLimitStatus, HostPermit, HostRateLimiter};
pub use settings::{
    InMemorySettingsStore, Preferences, QualityPreference, SettingsConfig, SettingsError,
    SettingsStore, SqliteSettingsStore,
};
