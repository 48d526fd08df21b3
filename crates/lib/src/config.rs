//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.lineplate/config.json`) and environment.
//! Environment variables override file values; absent storage credentials disable that sink.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LINE Messaging API credentials and endpoints.
    #[serde(default)]
    pub line: LineConfig,

    /// Gemini vision/chat model settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Chat session settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Video frame sampling settings.
    #[serde(default)]
    pub video: VideoConfig,

    /// Plate report command settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Optional persistence (PostgreSQL, Google Sheets).
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 5000). Overridden by PORT env.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the platform must reach the callback).
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_port() -> u16 {
    5000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

/// LINE channel credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Channel secret used to verify X-Line-Signature. Overridden by CHANNEL_SECRET env.
    pub channel_secret: Option<String>,
    /// Channel access token for reply/push/content. Overridden by CHANNEL_ACCESS_TOKEN env.
    pub channel_access_token: Option<String>,
    /// Messaging API base (default https://api.line.me).
    pub api_base: Option<String>,
    /// Content API base (default https://api-data.line.me).
    pub data_api_base: Option<String>,
}

/// Gemini model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GEMINI_API_KEY env.
    pub api_key: Option<String>,
    /// Model id, with or without the `models/` prefix. Overridden by GEMINI_MODEL env.
    pub model: Option<String>,
    /// API base URL (default https://generativelanguage.googleapis.com).
    pub base_url: Option<String>,
    /// Per-request deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Chat session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Maximum stored turns per source; oldest are dropped first.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Replaces the built-in system instruction when set.
    pub system_instruction: Option<String>,
}

fn default_max_history() -> usize {
    20
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            system_instruction: None,
        }
    }
}

/// Video sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    /// Sample every Nth frame.
    #[serde(default = "default_frame_interval")]
    pub frame_interval: u32,
    /// Maximum number of plates listed in the summary push.
    #[serde(default = "default_max_listed")]
    pub max_listed: usize,
    /// ffmpeg binary (default "ffmpeg" on PATH).
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

fn default_frame_interval() -> u32 {
    60
}

fn default_max_listed() -> usize {
    10
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_interval: default_frame_interval(),
            max_listed: default_max_listed(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

/// Report command settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    /// Number of recent plates shown by the report command.
    #[serde(default = "default_report_limit")]
    pub limit: usize,
}

fn default_report_limit() -> usize {
    10
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            limit: default_report_limit(),
        }
    }
}

/// Persistence settings. Each sink is enabled only when its credentials resolve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// PostgreSQL connection string. Overridden by DATABASE_URL env.
    pub database_url: Option<String>,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

/// Google Sheets sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsConfig {
    /// Spreadsheet id. Overridden by SPREADSHEET_ID env.
    pub spreadsheet_id: Option<String>,
    /// Service account JSON key file. Overridden by GOOGLE_CREDENTIALS_PATH env.
    pub credentials_path: Option<PathBuf>,
    /// A1 range rows are appended to.
    #[serde(default = "default_sheet_range")]
    pub range: String,
}

fn default_sheet_range() -> String {
    "Sheet1!A:E".to_string()
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            credentials_path: None,
            range: default_sheet_range(),
        }
    }
}

/// Non-empty, trimmed value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env var first, then the config value; both trimmed, empty treated as absent.
fn resolve(env: &str, configured: Option<&String>) -> Option<String> {
    env_value(env).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the channel secret: env CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    resolve("CHANNEL_SECRET", config.line.channel_secret.as_ref())
}

/// Resolve the channel access token: env CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    resolve("CHANNEL_ACCESS_TOKEN", config.line.channel_access_token.as_ref())
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    resolve("GEMINI_API_KEY", config.gemini.api_key.as_ref())
}

/// Resolve the Gemini model id (without `models/` prefix). Falls back to the flash model.
pub fn resolve_gemini_model(config: &Config) -> String {
    let model = resolve("GEMINI_MODEL", config.gemini.model.as_ref())
        .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
    model
        .strip_prefix("models/")
        .map(str::to_string)
        .unwrap_or(model)
}

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-flash-latest";

/// Resolve the database URL: env DATABASE_URL overrides config.
pub fn resolve_database_url(config: &Config) -> Option<String> {
    resolve("DATABASE_URL", config.storage.database_url.as_ref())
}

/// Resolve the spreadsheet id and credential file; both must be present for the sheet sink.
pub fn resolve_sheets(config: &Config) -> Option<(String, PathBuf)> {
    let id = resolve("SPREADSHEET_ID", config.storage.sheets.spreadsheet_id.as_ref())?;
    let path = env_value("GOOGLE_CREDENTIALS_PATH")
        .map(PathBuf::from)
        .or_else(|| config.storage.sheets.credentials_path.clone())
        .filter(|p| !p.as_os_str().is_empty())?;
    Some((id, path))
}

/// Apply PORT env over the configured port. Invalid values are ignored with a warning.
pub fn resolve_port(config: &Config) -> u16 {
    match env_value("PORT") {
        Some(p) => match p.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                log::warn!("ignoring invalid PORT value: {}", p);
                config.server.port
            }
        },
        None => config.server.port,
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LINEPLATE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".lineplate").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_filled_in() {
        let c = Config::default();
        assert_eq!(c.server.port, 5000);
        assert_eq!(c.server.bind, "0.0.0.0");
        assert_eq!(c.video.frame_interval, 60);
        assert_eq!(c.video.max_listed, 10);
        assert_eq!(c.gemini.timeout_secs, 30);
        assert_eq!(c.storage.sheets.range, "Sheet1!A:E");
    }

    #[test]
    fn parses_partial_camel_case_file() {
        let c: Config = serde_json::from_str(
            r#"{"server":{"port":8080},"line":{"channelSecret":"s"},"video":{"frameInterval":30}}"#,
        )
        .unwrap();
        assert_eq!(c.server.port, 8080);
        assert_eq!(c.server.bind, "0.0.0.0");
        assert_eq!(c.line.channel_secret.as_deref(), Some("s"));
        assert_eq!(c.video.frame_interval, 30);
        assert_eq!(c.video.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn model_prefix_is_stripped() {
        let mut c = Config::default();
        c.gemini.model = Some("models/gemini-2.0-flash".to_string());
        if std::env::var("GEMINI_MODEL").is_err() {
            assert_eq!(resolve_gemini_model(&c), "gemini-2.0-flash");
        }
    }

    #[test]
    fn blank_config_values_are_absent() {
        let mut c = Config::default();
        c.storage.sheets.spreadsheet_id = Some("   ".to_string());
        c.storage.sheets.credentials_path = Some(PathBuf::from("/tmp/key.json"));
        if std::env::var("SPREADSHEET_ID").is_err() {
            assert!(resolve_sheets(&c).is_none());
        }
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.report.limit, 10);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(Some(path)).is_err());
    }
}
