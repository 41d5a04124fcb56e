//! Supported upstream platforms.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rate_limiter::host_of;

/// A content platform the extractor knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    TikTok,
    YouTube,
    Pinterest,
    YandexMusic,
}

impl Platform {
    /// Detect the platform from a URL's host.
    pub fn detect(url: &str) -> Option<Self> {
        let host = host_of(url)?;
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if matches("instagram.com") || matches("instagr.am") {
            Some(Self::Instagram)
        } else if matches("tiktok.com") {
            Some(Self::TikTok)
        } else if matches("youtube.com") || matches("youtu.be") {
            Some(Self::YouTube)
        } else if matches("pinterest.com") || matches("pin.it") {
            Some(Self::Pinterest)
        } else if host.starts_with("music.yandex.") {
            Some(Self::YandexMusic)
        } else {
            None
        }
    }

    /// Stable identifier, also used to find cookie files.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::TikTok => "tiktok",
            Self::YouTube => "youtube",
            Self::Pinterest => "pinterest",
            Self::YandexMusic => "yandex_music",
        }
    }

    /// yt-dlp format selector used when the user did not pick one.
    pub fn default_format(&self) -> &'static str {
        match self {
            Self::YouTube => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            Self::YandexMusic => "bestaudio/best",
            _ => "best",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::YouTube => "YouTube",
            Self::Pinterest => "Pinterest",
            Self::YandexMusic => "Yandex Music",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_platforms() {
        let cases = [
            ("https://www.instagram.com/reel/Cabc123/", Platform::Instagram),
            ("https://instagr.am/p/xyz", Platform::Instagram),
            ("https://vm.tiktok.com/ZMabc/", Platform::TikTok),
            ("https://www.tiktok.com/@user/video/123", Platform::TikTok),
            ("https://youtu.be/dQw4w9WgXcQ", Platform::YouTube),
            ("https://m.youtube.com/shorts/abc", Platform::YouTube),
            ("https://pin.it/3xyz", Platform::Pinterest),
            ("https://music.yandex.ru/album/1/track/2", Platform::YandexMusic),
        ];
        for (url, expected) in cases {
            assert_eq!(Platform::detect(url), Some(expected), "url: {url}");
        }
    }

    #[test]
    fn test_detect_rejects_lookalikes() {
        assert_eq!(Platform::detect("https://notinstagram.com/p/1"), None);
        assert_eq!(Platform::detect("https://example.com/video.mp4"), None);
        assert_eq!(Platform::detect("instagram.com/p/1"), None);
    }

    #[test]
    fn test_default_format() {
        assert_eq!(Platform::TikTok.default_format(), "best");
        assert!(Platform::YouTube.default_format().contains("bestvideo"));
    }
}
