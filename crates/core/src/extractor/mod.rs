//! Extraction Service abstraction.
//!
//! This module provides the `Extractor` trait used by download workers to
//! list formats and fetch media to a local path, plus a yt-dlp backed
//! implementation.
//!
//! # Example
//!
//! ```ignore
//! use zenload_core::extractor::{Extractor, ExtractorConfig, YtDlpExtractor};
//!
//! let extractor = YtDlpExtractor::new(ExtractorConfig::default());
//! let formats = extractor.probe("https://www.tiktok.com/@user/video/123").await?;
//! println!("{} formats available", formats.len());
//! ```

mod config;
mod error;
mod platform;
mod traits;
mod types;
mod ytdlp;

pub use config::ExtractorConfig;
pub use error::ExtractError;
pub use platform::Platform;
pub use traits::Extractor;
pub use types::{FetchedMedia, FormatDescriptor};
pub use ytdlp::YtDlpExtractor;
