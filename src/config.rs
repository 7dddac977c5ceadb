use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::auth::ServiceIdentity;
use crate::client::ClientSettings;

/// Smartflo Dialer - CRM calling backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "PORT", default_value = "4000")]
    pub port: u16,

    /// API key inbound callers must present
    #[arg(short = 'k', long, env = "PROXY_API_KEY")]
    pub api_key: Option<String>,

    /// Smartflo API base URL; "/v1" is appended when missing (login lives at {base}/auth/login)
    #[arg(
        long,
        env = "SMARTFLO_API_BASE_URL",
        default_value = "https://api.smartflo.tatatelebusiness.com/v1"
    )]
    pub smartflo_base_url: String,

    /// Smartflo service account email
    #[arg(long, env = "SMARTFLO_EMAIL")]
    pub smartflo_email: Option<String>,

    /// Smartflo service account password
    #[arg(long, env = "SMARTFLO_PASSWORD", hide_env_values = true)]
    pub smartflo_password: Option<String>,

    /// Caller id shown to customers when a call does not name one
    #[arg(long, env = "SMARTFLO_DEFAULT_CALLER_ID")]
    pub default_caller_id: Option<String>,

    /// Seconds before declared token expiry at which it is treated as expired
    #[arg(long, env = "TOKEN_SAFETY_MARGIN", default_value = "300")]
    pub token_safety_margin: u64,

    /// Login request timeout in seconds
    #[arg(long, env = "LOGIN_TIMEOUT", default_value = "30")]
    pub login_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Path to the SQLite database
    #[arg(short = 'd', long, env = "DATABASE_FILE", default_value = "dialer.sqlite3")]
    pub db_file: String,

    /// Allowed CORS origins, comma separated ("*.example.com" matches by suffix)
    #[arg(long, env = "CORS_ORIGINS", default_value = "")]
    pub cors_origins: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Authentication
    pub proxy_api_key: String,

    // Smartflo
    pub smartflo_base_url: String,
    pub smartflo_identity: Option<ServiceIdentity>,
    pub default_caller_id: Option<String>,
    pub token_safety_margin: u64,
    pub login_timeout: u64,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Storage
    pub database_file: PathBuf,

    // CORS
    pub cors_origins: Vec<String>,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let smartflo_identity =
            service_identity(args.smartflo_email, args.smartflo_password)?;

        let config = Config {
            server_host: args.host,
            server_port: args.port,

            proxy_api_key: args
                .api_key
                .filter(|k| !k.is_empty())
                .context("PROXY_API_KEY is required (use -k or set PROXY_API_KEY env var)")?,

            smartflo_base_url: normalize_base_url(&args.smartflo_base_url),
            smartflo_identity,
            default_caller_id: args.default_caller_id.filter(|id| !id.is_empty()),
            token_safety_margin: args.token_safety_margin,
            login_timeout: args.login_timeout,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            database_file: expand_tilde(&args.db_file),

            cors_origins: parse_cors_origins(&args.cors_origins),

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.smartflo_base_url.starts_with("http://")
            && !self.smartflo_base_url.starts_with("https://")
        {
            anyhow::bail!(
                "SMARTFLO_API_BASE_URL must be an http(s) URL: {}",
                self.smartflo_base_url
            );
        }

        if self.login_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("LOGIN_TIMEOUT and HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.smartflo_base_url.clone(),
            default_caller_id: self.default_caller_id.clone(),
            safety_margin_secs: self.token_safety_margin,
            login_timeout_secs: self.login_timeout,
        }
    }
}

/// Both halves of the identity or neither
fn service_identity(
    email: Option<String>,
    password: Option<String>,
) -> Result<Option<ServiceIdentity>> {
    let email = email.filter(|s| !s.is_empty());
    let password = password.filter(|s| !s.is_empty());

    match (email, password) {
        (Some(email), Some(password)) => Ok(Some(ServiceIdentity { email, password })),
        (None, None) => Ok(None),
        (Some(_), None) => anyhow::bail!("SMARTFLO_PASSWORD is required when SMARTFLO_EMAIL is set"),
        (None, Some(_)) => anyhow::bail!("SMARTFLO_EMAIL is required when SMARTFLO_PASSWORD is set"),
    }
}

/// Trim trailing slashes and make sure the path ends in the `/v1` API prefix
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.ends_with("/v1") {
        url.to_string()
    } else {
        format!("{}/v1", url)
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Split a comma-separated origin list, dropping blanks
fn parse_cors_origins(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
