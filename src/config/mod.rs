use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Backend used when the site is served from `localhost`.
pub const LOCAL_BACKEND_URL: &str = "http://localhost:8000";

/// Backend used for every other host unless `PRODUCTION_BACKEND_URL` says otherwise.
pub const DEFAULT_PRODUCTION_BACKEND_URL: &str = "https://your-backend-url.com";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub ui: UiConfig,
}

/// Backend API configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub layout: ApiLayout,
}

/// Which route set the backend exposes for sign-in/sign-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiLayout {
    /// `/api/signin`, `/api/signup` (book site modal)
    #[default]
    Site,
    /// `/api/auth/signin`, `/api/auth/signup` (standalone widget)
    Widget,
}

/// Durable local storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Client timeout; `0` means wait indefinitely.
    pub timeout_ms: u64,
}

/// Widget behaviour knobs
#[derive(Debug, Clone)]
pub struct UiConfig {
    pub target_language: String,
    pub save_close_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = match env::var("BACKEND_URL") {
            Ok(url) if !url.trim().is_empty() => validate_base_url(&url)?,
            _ => {
                let production = env::var("PRODUCTION_BACKEND_URL")
                    .unwrap_or_else(|_| DEFAULT_PRODUCTION_BACKEND_URL.to_string());
                let hostname = env::var("SITE_HOSTNAME").ok();
                resolve_base_url(hostname.as_deref(), &production)
            }
        };

        let backend = BackendConfig {
            base_url,
            layout: match env::var("API_LAYOUT")
                .unwrap_or_else(|_| "site".to_string())
                .to_lowercase()
                .as_str()
            {
                "widget" => ApiLayout::Widget,
                _ => ApiLayout::Site,
            },
        };

        let storage = StorageConfig {
            path: PathBuf::from(
                env::var("SESSION_DB_PATH").unwrap_or_else(|_| "./data/session.db".to_string()),
            ),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
        };

        let ui = UiConfig {
            target_language: env::var("TARGET_LANGUAGE").unwrap_or_else(|_| "urdu".to_string()),
            save_close_delay_ms: env::var("SAVE_CLOSE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1500),
        };

        Ok(Config {
            backend,
            storage,
            logging,
            request,
            ui,
        })
    }
}

/// Pick the backend for the host the site is served from.
///
/// `localhost` (or no host at all, e.g. a prerender pass) talks to the
/// local backend; every other host talks to `production`.
pub fn resolve_base_url(hostname: Option<&str>, production: &str) -> String {
    match hostname.map(str::trim) {
        None | Some("") | Some("localhost") => LOCAL_BACKEND_URL.to_string(),
        Some(_) => production.trim_end_matches('/').to_string(),
    }
}

fn validate_base_url(url: &str) -> Result<String, AppError> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::Config {
            message: format!("BACKEND_URL must be an http(s) URL, got '{}'", url),
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: LOCAL_BACKEND_URL.to_string(),
            layout: ApiLayout::Site,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            target_language: "urdu".to_string(),
            save_close_delay_ms: 1500,
        }
    }
}
