use anyhow::{Context, Result};
use std::path::PathBuf;

/// Default proactive-refresh buffer: a token within this many milliseconds of
/// its expiry is refreshed before the request is sent, so that it is still
/// valid when the server processes it.
const DEFAULT_EXPIRY_BUFFER_MS: i64 = 30_000;

/// Client configuration
///
/// All values have working defaults; environment variables override them via
/// [`AuthConfig::from_env`].
#[derive(Clone, Debug)]
pub struct AuthConfig {
    // Backend endpoints
    pub api_base_url: String,
    pub login_path: String,
    pub refresh_path: String,

    // Credential storage
    pub access_token_key: String,
    pub refresh_token_key: String,
    /// SQLite key/value file for durable credentials; None keeps them in memory
    pub storage_file: Option<PathBuf>,

    // Token lifecycle
    pub expiry_buffer_ms: i64,
    /// How many times a request may be resubmitted after a 401 recovery.
    /// Zero disables reactive recovery entirely.
    pub max_auth_retries: u32,

    // Navigation
    pub sign_in_route: String,
    /// Locale path prefixes preserved when redirecting to the sign-in route
    pub locales: Vec<String>,

    // HTTP client
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            access_token_key: "flashdeck:access-token".to_string(),
            refresh_token_key: "flashdeck:refresh-token".to_string(),
            storage_file: None,
            expiry_buffer_ms: DEFAULT_EXPIRY_BUFFER_MS,
            max_auth_retries: 1,
            sign_in_route: "/sign-in".to_string(),
            locales: vec!["en".to_string(), "de".to_string()],
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl AuthConfig {
    /// Load configuration from the environment over built-in defaults
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(url) = std::env::var("FLASHDECK_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(path) = std::env::var("FLASHDECK_STORAGE_FILE") {
            config.storage_file = Some(PathBuf::from(path));
        }
        if let Ok(buffer) = std::env::var("TOKEN_EXPIRY_BUFFER_MS") {
            config.expiry_buffer_ms = buffer
                .parse()
                .context("TOKEN_EXPIRY_BUFFER_MS must be an integer")?;
        }
        if let Ok(retries) = std::env::var("MAX_AUTH_RETRIES") {
            config.max_auth_retries = retries
                .parse()
                .context("MAX_AUTH_RETRIES must be a non-negative integer")?;
        }
        if let Ok(route) = std::env::var("SIGN_IN_ROUTE") {
            config.sign_in_route = route;
        }
        if let Ok(locales) = std::env::var("FLASHDECK_LOCALES") {
            config.locales = locales
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }
        if let Ok(timeout) = std::env::var("HTTP_REQUEST_TIMEOUT") {
            config.request_timeout_secs = timeout
                .parse()
                .context("HTTP_REQUEST_TIMEOUT must be an integer")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.is_empty() {
            anyhow::bail!("api_base_url must not be empty");
        }
        if self.expiry_buffer_ms < 0 {
            anyhow::bail!("expiry_buffer_ms must not be negative");
        }
        if !self.sign_in_route.starts_with('/') {
            anyhow::bail!("sign_in_route must start with '/'");
        }
        Ok(())
    }

    /// Absolute URL for a backend path
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    pub fn login_url(&self) -> String {
        self.endpoint_url(&self.login_path)
    }

    pub fn refresh_url(&self) -> String {
        self.endpoint_url(&self.refresh_path)
    }
}
