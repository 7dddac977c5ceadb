// Login exchange against the Smartflo auth endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Lifetime assumed when the login response omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Why a login exchange did not produce a token.
///
/// Cloneable so one outcome can be handed to every caller waiting on the
/// same refresh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoginError {
    /// The auth endpoint answered with a non-success status
    #[error("login rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The request never got a response
    #[error("login transport failure ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    #[error("login timed out after {0:?}")]
    Timeout(Duration),

    /// 2xx response that did not carry a usable token
    #[error("invalid login response: {0}")]
    InvalidResponse(String),

    /// The login task ended without reporting an outcome
    #[error("login task aborted: {0}")]
    Aborted(String),
}

/// Token material returned by a successful login
#[derive(Clone, PartialEq)]
pub struct LoginGrant {
    pub access_token: String,
    pub expires_in: u64,
}

impl fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// One call to the remote authentication endpoint
#[async_trait]
pub trait LoginExchange: Send + Sync {
    async fn login(&self) -> Result<LoginGrant, LoginError>;
}

/// Fixed service identity used for every login
#[derive(Clone)]
pub struct ServiceIdentity {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Smartflo login request
#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Smartflo login response
#[derive(Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// `POST {base}/auth/login` with the service identity
pub struct SmartfloLogin {
    client: Client,
    url: String,
    identity: ServiceIdentity,
}

impl SmartfloLogin {
    pub fn new(client: Client, base_url: &str, identity: ServiceIdentity) -> Self {
        Self {
            client,
            url: format!("{}/auth/login", base_url.trim_end_matches('/')),
            identity,
        }
    }
}

#[async_trait]
impl LoginExchange for SmartfloLogin {
    async fn login(&self) -> Result<LoginGrant, LoginError> {
        tracing::info!("Logging in to Smartflo as {}", self.identity.email);

        let request = LoginRequest {
            email: &self.identity.email,
            password: &self.identity.password,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LoginError::Transport {
                kind: error_kind(&e),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = remote_message(&error_text).unwrap_or(error_text);
            tracing::error!(status = status.as_u16(), "Smartflo login failed: {}", message);
            return Err(LoginError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let data: LoginResponse = response
            .json()
            .await
            .map_err(|e| LoginError::InvalidResponse(e.to_string()))?;

        let access_token = data
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                LoginError::InvalidResponse("response does not contain access_token".to_string())
            })?;

        let expires_in = data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        tracing::info!(expires_in, "Smartflo login succeeded");

        Ok(LoginGrant {
            access_token,
            expires_in,
        })
    }
}

/// Pull a `message` field out of a JSON error body
fn remote_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Categorize a transport error for logs and error payloads
pub(crate) fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}
