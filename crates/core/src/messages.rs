//! User-visible text lookup.
//!
//! Text is keyed by short identifiers (see [`keys`]) and may carry `{name}`
//! placeholders filled by [`Localizer::format`]. Unknown languages fall back
//! to English, unknown keys render as the key itself.

/// Keys used by the download core.
pub mod keys {
    pub const STATUS_GETTING_INFO: &str = "status_getting_info";
    pub const STATUS_DOWNLOADING: &str = "status_downloading";
    pub const STATUS_SENDING: &str = "status_sending";
    pub const PROCESSING: &str = "processing";
    pub const DOWNLOAD_FAILED: &str = "download_failed";
    pub const ERROR_OCCURRED: &str = "error_occurred";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const AUTH_REQUIRED: &str = "auth_required";
    pub const TOO_MANY_DOWNLOADS: &str = "too_many_downloads";
    pub const QUEUE_FULL: &str = "queue_full";
    pub const SHUTTING_DOWN: &str = "shutting_down";
    pub const UNSUPPORTED_URL: &str = "unsupported_url";
    pub const CANCELLED: &str = "cancelled";
}

/// Supported interface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Ru,
}

impl Language {
    /// Parse a language code, falling back to English.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "ru" => Language::Ru,
            _ => Language::En,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }
}

fn lookup(language: Language, key: &str) -> Option<&'static str> {
    let text = match (language, key) {
        (Language::En, keys::STATUS_GETTING_INFO) => "🔍 Getting video info... {progress}%",
        (Language::En, keys::STATUS_DOWNLOADING) => "⏬ Downloading... {progress}%",
        (Language::En, keys::STATUS_SENDING) => "📤 Sending... {progress}%",
        (Language::En, keys::PROCESSING) => "⏳ Processing your request...",
        (Language::En, keys::DOWNLOAD_FAILED) => "❌ Download failed: {error}",
        (Language::En, keys::ERROR_OCCURRED) => "❌ An error occurred. Please try again later.",
        (Language::En, keys::RATE_LIMITED) => {
            "⏳ The service is rate limiting requests. Please try again in a few minutes."
        }
        (Language::En, keys::AUTH_REQUIRED) => "🔒 This content is private or requires login: {error}",
        (Language::En, keys::TOO_MANY_DOWNLOADS) => {
            "⚠️ You already have the maximum number of active downloads. Please wait for them to finish."
        }
        (Language::En, keys::QUEUE_FULL) => "⚠️ The download queue is full. Please try again later.",
        (Language::En, keys::SHUTTING_DOWN) => "⚠️ The bot is restarting. Please try again shortly.",
        (Language::En, keys::UNSUPPORTED_URL) => "❌ This link is not supported.",
        (Language::En, keys::CANCELLED) => "🚫 Download cancelled.",

        (Language::Ru, keys::STATUS_GETTING_INFO) => "🔍 Получаю информацию о видео... {progress}%",
        (Language::Ru, keys::STATUS_DOWNLOADING) => "⏬ Загрузка... {progress}%",
        (Language::Ru, keys::STATUS_SENDING) => "📤 Отправка... {progress}%",
        (Language::Ru, keys::PROCESSING) => "⏳ Обрабатываю запрос...",
        (Language::Ru, keys::DOWNLOAD_FAILED) => "❌ Ошибка загрузки: {error}",
        (Language::Ru, keys::ERROR_OCCURRED) => "❌ Произошла ошибка. Попробуйте позже.",
        (Language::Ru, keys::RATE_LIMITED) => {
            "⏳ Сервис ограничивает запросы. Попробуйте через несколько минут."
        }
        (Language::Ru, keys::AUTH_REQUIRED) => {
            "🔒 Контент приватный или требует входа: {error}"
        }
        (Language::Ru, keys::TOO_MANY_DOWNLOADS) => {
            "⚠️ У вас уже максимальное число активных загрузок. Дождитесь их завершения."
        }
        (Language::Ru, keys::QUEUE_FULL) => "⚠️ Очередь загрузок переполнена. Попробуйте позже.",
        (Language::Ru, keys::SHUTTING_DOWN) => "⚠️ Бот перезапускается. Попробуйте чуть позже.",
        (Language::Ru, keys::UNSUPPORTED_URL) => "❌ Эта ссылка не поддерживается.",
        (Language::Ru, keys::CANCELLED) => "🚫 Загрузка отменена.",
        _ => return None,
    };
    Some(text)
}

/// Text lookup bound to one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Localizer {
    language: Language,
}

impl Localizer {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Build a localizer from a language code such as `"ru"`.
    pub fn for_code(code: &str) -> Self {
        Self::new(Language::from_code(code))
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Raw template for `key`.
    pub fn get(&self, key: &str) -> String {
        lookup(self.language, key)
            .or_else(|| lookup(Language::En, key))
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string())
    }

    /// Template for `key` with `{name}` placeholders substituted.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.get(key);
        for (name, value) in args {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        text
    }

    /// Status line for a progress update.
    pub fn status(&self, status_key: &str, percent: u8) -> String {
        self.format(status_key, &[("progress", &percent.to_string())])
    }
}

/// Escape text interpolated into an HTML-formatted message.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}
