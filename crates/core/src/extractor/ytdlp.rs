//! yt-dlp backed extractor.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ExtractorConfig;
use super::error::ExtractError;
use super::platform::Platform;
use super::traits::Extractor;
use super::types::{FetchedMedia, FormatDescriptor};
use crate::messages::{escape_html, keys};
use crate::progress::ProgressCallback;
use crate::rate_limiter::host_of;

static PROGRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").expect("valid regex"));

/// Extractor that shells out to yt-dlp.
pub struct YtDlpExtractor {
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default())
    }

    fn common_args(&self, platform: Platform) -> Vec<String> {
        let mut args = vec![
            "--no-color".to_string(),
            "--no-warnings".to_string(),
            "--no-overwrites".to_string(),
            "--no-playlist".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
        ];
        if let Some(dir) = &self.config.cookies_dir {
            let cookie_file = dir.join(format!("{}.txt", platform.id()));
            if cookie_file.exists() {
                args.push("--cookies".to_string());
                args.push(cookie_file.display().to_string());
            }
        }
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ExtractError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExtractError::BinaryNotFound {
                path: self.config.binary.clone(),
            }
        } else {
            ExtractError::Io(e)
        }
    }

    fn resolve(url: &str) -> Result<(Platform, String), ExtractError> {
        let platform = Platform::detect(url).ok_or_else(|| ExtractError::UnsupportedUrl {
            url: url.to_string(),
        })?;
        let host = host_of(url).unwrap_or_default();
        Ok((platform, host))
    }

    /// Run `op` again while it fails with a retryable error, doubling the
    /// delay each time.
    async fn with_backoff<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ExtractError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExtractError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut delay = Duration::from_secs(self.config.retry_base_delay_secs);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, delay_secs = delay.as_secs(), error = %e, "Rate limited, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn probe_once(
        &self,
        url: &str,
        platform: Platform,
        host: &str,
    ) -> Result<Vec<FormatDescriptor>, ExtractError> {
        let mut args = self.common_args(platform);
        args.push("--dump-single-json".to_string());
        args.push(url.to_string());

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(ExtractError::from_stderr(
                host,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractError::failed(format!("invalid yt-dlp output: {e}")))?;
        Ok(parse_formats(&info))
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_once(
        &self,
        url: &str,
        platform: Platform,
        host: &str,
        format_id: Option<&str>,
        dest_dir: &Path,
        progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia, ExtractError> {
        let mut args = self.common_args(platform);
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            "download:[download] %(progress._percent_str)s".to_string(),
            "--print".to_string(),
            "after_move:%()j".to_string(),
            "--format".to_string(),
            format_id.unwrap_or(platform.default_format()).to_string(),
            "--paths".to_string(),
            dest_dir.display().to_string(),
            "--output".to_string(),
            "%(id)s.%(ext)s".to_string(),
            url.to_string(),
        ]);

        let mut child = self.command(&args).spawn().map_err(|e| self.spawn_error(e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::failed("yt-dlp stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractError::failed("yt-dlp stderr not captured"))?;

        // `--print` puts yt-dlp in quiet mode, which moves progress lines to
        // stderr. Everything else there is kept for error classification.
        let stderr_progress = Arc::clone(progress);
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !report_progress(&line, &stderr_progress) {
                    text.push_str(&line);
                    text.push('\n');
                }
            }
            text
        });

        let mut info: Option<Value> = None;
        let mut lines = BufReader::new(stdout).lines();
        let read_output = async {
            while let Some(line) = lines.next_line().await? {
                if report_progress(&line, progress) {
                    continue;
                }
                if line.starts_with('{') {
                    info = serde_json::from_str(&line).ok();
                } else {
                    debug!(line = %line, "yt-dlp output");
                }
            }
            Ok::<_, std::io::Error>(())
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(ExtractError::Cancelled);
            }
            result = read_output => result?,
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(ExtractError::from_stderr(host, &stderr_text));
        }

        let info = info.ok_or_else(|| ExtractError::failed("yt-dlp reported no file"))?;
        let path = info
            .get("filepath")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| ExtractError::failed("yt-dlp output has no filepath"))?;

        progress(keys::STATUS_DOWNLOADING, 100);
        Ok(FetchedMedia {
            caption: build_caption(platform, &info, url),
            path,
        })
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<Vec<FormatDescriptor>, ExtractError> {
        let (platform, host) = Self::resolve(url)?;
        let timeout_secs = self.config.probe_timeout_secs;
        let never = CancellationToken::new();

        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.with_backoff(&never, || self.probe_once(url, platform, &host)),
        )
        .await
        .map_err(|_| ExtractError::Timeout { timeout_secs })?
    }

    async fn fetch(
        &self,
        url: &str,
        format_id: Option<&str>,
        dest_dir: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, ExtractError> {
        let (platform, host) = Self::resolve(url)?;
        tokio::fs::create_dir_all(dest_dir).await?;

        info!(%platform, url, format = format_id.unwrap_or("default"), "Starting yt-dlp download");
        progress(keys::STATUS_DOWNLOADING, 0);

        self.with_backoff(&cancel, || {
            self.fetch_once(url, platform, &host, format_id, dest_dir, &progress, &cancel)
        })
        .await
    }
}

/// Forward a progress line to `progress`. Returns `false` for any other line.
fn report_progress(line: &str, progress: &ProgressCallback) -> bool {
    let Some(percent) = parse_progress(line) else {
        return false;
    };
    // Leave room at both ends for pre and post processing.
    let scaled = 20 + u32::from(percent) * 70 / 100;
    progress(keys::STATUS_DOWNLOADING, scaled as u8);
    true
}

/// Parse a `[download]  42.5%` line into a whole percentage.
fn parse_progress(line: &str) -> Option<u8> {
    let caps = PROGRESS_RE.captures(line.trim_start())?;
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0) as u8)
}

fn parse_formats(info: &Value) -> Vec<FormatDescriptor> {
    info.get("formats")
        .and_then(Value::as_array)
        .map(|formats| {
            formats
                .iter()
                .filter_map(|f| {
                    let id = f.get("format_id")?.as_str()?;
                    let text = |key: &str| f.get(key).and_then(Value::as_str).map(str::to_string);
                    Some(FormatDescriptor {
                        format_id: id.to_string(),
                        extension: text("ext"),
                        resolution: text("resolution"),
                        filesize: f
                            .get("filesize")
                            .and_then(Value::as_u64)
                            .or_else(|| f.get("filesize_approx").and_then(Value::as_u64)),
                        note: text("format_note"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn compact_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn build_caption(platform: Platform, info: &Value, url: &str) -> String {
    let count = |key: &str| info.get(key).and_then(Value::as_u64);
    let mut header = platform.to_string();
    if let Some(views) = count("view_count") {
        header.push_str(&format!(" | {} views", compact_count(views)));
    }
    if let Some(likes) = count("like_count") {
        header.push_str(&format!(" | {} likes", compact_count(likes)));
    }

    let author = info
        .get("uploader")
        .or_else(|| info.get("channel"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    format!(
        "{}\nby <a href=\"{}\">{}</a>",
        escape_html(&header),
        escape_html(url),
        escape_html(author)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("[download]  45.2% of 10.00MiB"), Some(45));
        assert_eq!(parse_progress("[download] 100%"), Some(100));
        assert_eq!(parse_progress("  [download]   3.0%"), Some(3));
        assert_eq!(parse_progress("[download] Destination: a.mp4"), None);
        assert_eq!(parse_progress("[info] 45%"), None);
    }

    #[test]
    fn test_parse_formats() {
        let info = json!({
            "formats": [
                {"format_id": "18", "ext": "mp4", "resolution": "640x360", "filesize": 1024, "format_note": "360p"},
                {"format_id": "140", "ext": "m4a", "resolution": "audio only", "filesize_approx": 2048},
                {"ext": "webm"}
            ]
        });
        let formats = parse_formats(&info);
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].format_id, "18");
        assert_eq!(formats[0].note.as_deref(), Some("360p"));
        assert_eq!(formats[1].filesize, Some(2048));
        assert!(parse_formats(&json!({})).is_empty());
    }

    #[test]
    fn test_build_caption() {
        let info = json!({"view_count": 1_500_000u64, "like_count": 2300u64, "uploader": "someone"});
        let caption = build_caption(Platform::Instagram, &info, "https://instagram.com/p/1");
        assert_eq!(
            caption,
            "Instagram | 1.5M views | 2.3K likes\nby <a href=\"https://instagram.com/p/1\">someone</a>"
        );

        let caption = build_caption(Platform::TikTok, &json!({}), "u");
        assert_eq!(caption, "TikTok\nby <a href=\"u\">unknown</a>");
    }

    #[test]
    fn test_build_caption_escapes_markup() {
        let info = json!({"uploader": "Tom & Jerry <3"});
        let caption = build_caption(
            Platform::YouTube,
            &info,
            "https://www.youtube.com/watch?v=abc&t=10",
        );
        assert_eq!(
            caption,
            "YouTube\nby <a href=\"https://www.youtube.com/watch?v=abc&amp;t=10\">Tom &amp; Jerry &lt;3</a>"
        );
    }

    fn recorder() -> (ProgressCallback, Arc<std::sync::Mutex<Vec<u8>>>) {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |_: &str, percent: u8| {
            sink.lock().unwrap().push(percent);
        });
        (callback, seen)
    }

    #[test]
    fn test_report_progress() {
        let (callback, seen) = recorder();
        assert!(report_progress("[download]  50.0%", &callback));
        assert!(!report_progress("WARNING: slow connection", &callback));
        assert_eq!(*seen.lock().unwrap(), vec![55]);
    }

    /// Extractor running a shell script in place of yt-dlp.
    #[cfg(unix)]
    fn scripted(dir: &Path, body: &str) -> YtDlpExtractor {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-yt-dlp");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlpExtractor::new(ExtractorConfig {
            binary: script,
            max_attempts: 1,
            ..Default::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_reads_progress_from_stderr() {
        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("task");
        let file = dest.join("clip.mp4");
        let extractor = scripted(
            temp.path(),
            &format!(
                "echo '[download]  10.0%' >&2\n\
                 echo '[download]  50.0%' >&2\n\
                 echo '{{\"filepath\": \"{}\", \"uploader\": \"someone\"}}'",
                file.display()
            ),
        );
        let (callback, seen) = recorder();

        let media = extractor
            .fetch(
                "https://www.tiktok.com/@u/video/1",
                None,
                &dest,
                callback,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(media.path, file);
        assert!(media.caption.contains("someone"));
        assert_eq!(*seen.lock().unwrap(), vec![0, 27, 55, 100]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_classifies_stderr_next_to_progress() {
        let temp = tempfile::TempDir::new().unwrap();
        let extractor = scripted(
            temp.path(),
            "echo '[download]  5.0%' >&2\n\
             echo 'ERROR: [TikTok] 1: This video is private video' >&2\n\
             exit 1",
        );
        let (callback, seen) = recorder();

        let err = extractor
            .fetch(
                "https://www.tiktok.com/@u/video/1",
                None,
                &temp.path().join("task"),
                callback,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            ExtractError::AuthRequired { reason } => {
                assert_eq!(reason, "[TikTok] 1: This video is private video")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 23]);
    }

    #[tokio::test]
    async fn test_unsupported_url_rejected_before_spawn() {
        let extractor = YtDlpExtractor::new(ExtractorConfig {
            binary: PathBuf::from("/nonexistent/yt-dlp"),
            ..Default::default()
        });
        let err = extractor.probe("https://example.com/x").await.unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedUrl { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_reported() {
        let extractor = YtDlpExtractor::new(ExtractorConfig {
            binary: PathBuf::from("/nonexistent/yt-dlp"),
            ..Default::default()
        });
        let err = extractor
            .probe("https://www.tiktok.com/@u/video/1")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::BinaryNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_retries_rate_limited() {
        let extractor = YtDlpExtractor::with_defaults();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), ExtractError> = extractor
            .with_backoff(&cancel, || {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ExtractError::RateLimited { host: "a".into() })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_gives_up_after_max_attempts() {
        let extractor = YtDlpExtractor::with_defaults();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), ExtractError> = extractor
            .with_backoff(&cancel, || {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(ExtractError::RateLimited { host: "a".into() }) }
            })
            .await;

        assert!(matches!(result, Err(ExtractError::RateLimited { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
