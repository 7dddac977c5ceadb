use anyhow::Context;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{error_kind, Credential, RefreshCoordinator};
use crate::error::ApiError;

/// One remote operation, built per call
#[derive(Debug, Clone)]
pub struct RemoteOperationRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Option<Vec<(String, String)>>,
}

impl RemoteOperationRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            query: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            query: None,
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
            query: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = Some(query);
        self
    }
}

/// Progress of one call through [`RequestExecutor::execute`]
#[derive(Debug)]
pub enum CallState {
    Unauthorized,
    Authorizing,
    Sent(Credential),
    RetryingAuth(Credential),
    Sent2(Credential),
    Success(Value),
    Failed(ApiError),
}

impl CallState {
    fn name(&self) -> &'static str {
        match self {
            CallState::Unauthorized => "unauthorized",
            CallState::Authorizing => "authorizing",
            CallState::Sent(_) => "sent",
            CallState::RetryingAuth(_) => "retrying_auth",
            CallState::Sent2(_) => "sent2",
            CallState::Success(_) => "success",
            CallState::Failed(_) => "failed",
        }
    }
}

/// Result of a single HTTP attempt
enum Attempt {
    Ok(Value),
    /// Smartflo refused the presented credential
    Rejected { message: String, payload: Option<Value> },
    Err(ApiError),
}

/// HTTP executor for Smartflo operations.
///
/// Every call is sent with a credential from the refresh coordinator. A 401
/// drops the rejected credential (unless another caller already replaced
/// it), acquires a new one and re-sends exactly once; a second 401 ends the call with `AuthPersistentlyRejected`. Other
/// failures pass through untouched.
pub struct RequestExecutor {
    /// Shared HTTP client with connection pooling
    client: Client,

    base_url: String,

    coordinator: Arc<RefreshCoordinator>,
}

impl RequestExecutor {
    pub fn new(client: Client, base_url: &str, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            coordinator,
        }
    }

    /// Build the pooled client used for both login and operations
    pub fn build_client(
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> anyhow::Result<Client> {
        Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Run one operation to a terminal state
    pub async fn execute(&self, request: &RemoteOperationRequest) -> Result<Value, ApiError> {
        let mut state = CallState::Unauthorized;

        loop {
            tracing::trace!(
                method = %request.method,
                path = %request.path,
                state = state.name(),
                "Smartflo call state"
            );

            state = match state {
                CallState::Unauthorized => CallState::Authorizing,

                CallState::Authorizing => match self.coordinator.ensure_valid().await {
                    Ok(credential) => CallState::Sent(credential),
                    Err(e) => CallState::Failed(ApiError::AuthAcquisitionFailed(e)),
                },

                CallState::Sent(credential) => match self.send(request, &credential).await {
                    Attempt::Ok(body) => CallState::Success(body),
                    Attempt::Rejected { .. } => {
                        tracing::warn!(
                            path = %request.path,
                            "Smartflo rejected credential, re-authenticating once"
                        );
                        CallState::RetryingAuth(credential)
                    }
                    Attempt::Err(e) => CallState::Failed(e),
                },

                CallState::RetryingAuth(rejected) => {
                    match self.coordinator.reauthorize(&rejected).await {
                        Ok(credential) => CallState::Sent2(credential),
                        Err(e) => CallState::Failed(ApiError::AuthAcquisitionFailed(e)),
                    }
                }

                CallState::Sent2(credential) => match self.send(request, &credential).await {
                    Attempt::Ok(body) => CallState::Success(body),
                    Attempt::Rejected { message, payload } => {
                        tracing::error!(
                            path = %request.path,
                            "Smartflo rejected a freshly acquired credential"
                        );
                        CallState::Failed(ApiError::AuthPersistentlyRejected { message, payload })
                    }
                    Attempt::Err(e) => CallState::Failed(e),
                },

                CallState::Success(body) => return Ok(body),
                CallState::Failed(e) => return Err(e),
            };
        }
    }

    /// Send one attempt with `credential` attached
    async fn send(&self, request: &RemoteOperationRequest, credential: &Credential) -> Attempt {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .bearer_auth(credential.token());
        if let Some(ref query) = request.query {
            builder = builder.query(query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %url, "Sending Smartflo request");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = error_kind(&e);
                tracing::warn!(
                    error_kind = kind,
                    error = %e,
                    url = %url,
                    "Smartflo request error"
                );
                return Attempt::Err(ApiError::TransientNetworkError {
                    kind,
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Attempt::Err(ApiError::TransientNetworkError {
                    kind: error_kind(&e),
                    message: e.to_string(),
                })
            }
        };

        tracing::debug!(status = %status, "Received Smartflo response");

        if status.is_success() {
            if text.trim().is_empty() {
                return Attempt::Ok(Value::Null);
            }
            return match serde_json::from_str(&text) {
                Ok(body) => Attempt::Ok(body),
                Err(e) => Attempt::Err(ApiError::MalformedResponse(e.to_string())),
            };
        }

        let payload = serde_json::from_str::<Value>(&text).ok();
        let message = payload
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| text.clone());

        if status == StatusCode::UNAUTHORIZED {
            return Attempt::Rejected { message, payload };
        }

        tracing::error!(
            status = status.as_u16(),
            url = %url,
            response_body = %text,
            "Smartflo request failed with error response"
        );
        Attempt::Err(ApiError::RemoteServiceError {
            status: status.as_u16(),
            message,
            payload,
        })
    }
}
