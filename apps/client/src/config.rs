use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FRESHNESS_MS: u64 = 800;
const DEFAULT_SESSION_FILE: &str = ".session.json";

/// Client configuration loaded from environment variables.
/// Every variable has a default, so an empty environment yields a usable local setup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub session_file: PathBuf,
    /// How long an explicit sign-in outranks every other identity signal.
    pub identity_freshness: Duration,
    pub endpoints: Endpoints,
    pub rust_log: String,
}

/// Backend paths, relative to `api_base_url`.
///
/// The backend has moved the password-reset family between `/auth/*` and
/// `/password-reset/*` before, so none of these are hard-coded at call sites.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub google_sign_in: String,
    pub logout: String,
    pub profile: String,
    pub update_profile: String,
    pub forgot_password: String,
    pub verify_reset_code: String,
    pub reset_password: String,
    pub check_email: String,
    pub cover_letter: String,
    pub save_cover_letter: String,
    /// Prefixes that never carry credentials. Everything else is protected.
    pub public_prefixes: Vec<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            refresh: "/auth/refresh".to_string(),
            google_sign_in: "/auth/google-sign-in".to_string(),
            logout: "/auth/logout".to_string(),
            profile: "/auth/get_user_profile".to_string(),
            update_profile: "/users/profile".to_string(),
            forgot_password: "/auth/forgot".to_string(),
            verify_reset_code: "/auth/verify-code".to_string(),
            reset_password: "/auth/reset-password".to_string(),
            check_email: "/auth/check-email".to_string(),
            cover_letter: "/cover/cover-letter".to_string(),
            save_cover_letter: "/cover/save-cover-letter".to_string(),
            public_prefixes: default_public_prefixes(),
        }
    }
}

fn default_public_prefixes() -> Vec<String> {
    [
        "/auth/login",
        "/auth/register",
        "/auth/refresh",
        "/auth/google-sign-in",
        "/auth/forgot",
        "/auth/verify-code",
        "/auth/reset-password",
        "/auth/check-email",
        "/password-reset/",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            identity_freshness: Duration::from_millis(DEFAULT_FRESHNESS_MS),
            endpoints: Endpoints::default(),
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let mut endpoints = Endpoints::default();
        if let Ok(path) = std::env::var("PROFILE_PATH") {
            endpoints.profile = path;
        }
        if let Some(path) = optional_env("SAVE_COVER_LETTER_PATH") {
            endpoints.save_cover_letter = path;
        }
        if let Ok(list) = std::env::var("PUBLIC_ENDPOINTS") {
            endpoints.public_prefixes = parse_prefix_list(&list);
        }

        Ok(Config {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(
                optional_env("REQUEST_TIMEOUT_SECS")
                    .map(|v| {
                        v.parse::<u64>()
                            .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")
                    })
                    .transpose()?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            session_file: optional_env("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE)),
            identity_freshness: Duration::from_millis(
                optional_env("IDENTITY_FRESHNESS_MS")
                    .map(|v| {
                        v.parse::<u64>()
                            .context("IDENTITY_FRESHNESS_MS must be a whole number of milliseconds")
                    })
                    .transpose()?
                    .unwrap_or(DEFAULT_FRESHNESS_MS),
            ),
            endpoints,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Same configuration pointed at a different backend. Used by tests and the CLI `--api` flag.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Splits a comma-separated prefix list, dropping blanks and forcing a leading slash.
fn parse_prefix_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p.starts_with('/') {
                p.to_string()
            } else {
                format!("/{p}")
            }
        })
        .collect()
}
