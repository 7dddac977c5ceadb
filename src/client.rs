// Smartflo API client
// Typed remote operations on top of the authorized request executor

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialStore, LoginExchange, RefreshCoordinator, ServiceIdentity, SmartfloLogin};
use crate::error::{ApiError, Result};
use crate::http_client::{RemoteOperationRequest, RequestExecutor};
use crate::models::smartflo::{
    CampaignPayload, CampaignStatus, CampaignStatusPayload, ClickToCall, ClickToCallPayload,
    ConnectionStatus, CreateCampaign, LeadData, LeadListPayload, LeadPayload, ScheduleCallback,
    ScheduleCallbackPayload,
};

/// Knobs for building a [`TokenManagedClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub default_caller_id: Option<String>,
    pub safety_margin_secs: u64,
    pub login_timeout_secs: u64,
}

/// Smartflo client whose every call is authorized by a shared, self-renewing
/// bearer credential
pub struct TokenManagedClient {
    executor: RequestExecutor,
    default_caller_id: Option<String>,
}

impl TokenManagedClient {
    /// Client that logs in with `identity` against `settings.base_url`
    pub fn new(client: Client, settings: &ClientSettings, identity: ServiceIdentity) -> Self {
        let exchange = Arc::new(SmartfloLogin::new(
            client.clone(),
            &settings.base_url,
            identity,
        ));
        Self::with_exchange(client, settings, exchange)
    }

    /// Client with a caller-supplied login exchange
    pub fn with_exchange(
        client: Client,
        settings: &ClientSettings,
        exchange: Arc<dyn LoginExchange>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(settings.safety_margin_secs));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            exchange,
            Duration::from_secs(settings.login_timeout_secs),
        ));

        Self {
            executor: RequestExecutor::new(client, &settings.base_url, coordinator),
            default_caller_id: settings.default_caller_id.clone(),
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        self.executor.coordinator()
    }

    pub fn default_caller_id(&self) -> Option<&str> {
        self.default_caller_id.as_deref()
    }

    /// Run an arbitrary authorized request
    pub async fn execute(&self, request: RemoteOperationRequest) -> Result<Value> {
        self.executor.execute(&request).await
    }

    async fn post<T: Serialize>(&self, path: String, payload: &T) -> Result<Value> {
        let body = serde_json::to_value(payload).map_err(anyhow::Error::from)?;
        self.execute(RemoteOperationRequest::post(path, body)).await
    }

    fn caller_id(&self, explicit: Option<String>) -> Result<String> {
        explicit
            .filter(|id| !id.is_empty())
            .or_else(|| self.default_caller_id.clone())
            .ok_or_else(|| ApiError::ConfigMissing("SMARTFLO_DEFAULT_CALLER_ID".to_string()))
    }

    /// Click-to-call: ring the agent, then bridge to the destination
    pub async fn click_to_call(&self, call: ClickToCall) -> Result<Value> {
        let payload = ClickToCallPayload {
            agent_number: call.agent_number,
            destination_number: call.destination_number,
            async_mode: 1,
            caller_id: self.caller_id(call.caller_id)?,
            custom_identifier: call.custom_identifier,
        };

        tracing::info!(
            agent_number = %payload.agent_number,
            custom_identifier = %payload.custom_identifier,
            "Placing click-to-call"
        );
        self.post("/click_to_call".to_string(), &payload).await
    }

    pub async fn schedule_callback(&self, callback: ScheduleCallback) -> Result<Value> {
        let payload = ScheduleCallbackPayload {
            agent_number: callback.agent_number,
            destination_number: callback.destination_number,
            callback_time: callback.callback_time,
            remarks: callback.remarks.unwrap_or_default(),
        };
        self.post("/schedule_callback".to_string(), &payload).await
    }

    /// Call detail records between two `YYYY-MM-DD` dates
    pub async fn fetch_cdr(&self, from_date: &str, to_date: &str) -> Result<Value> {
        let request = RemoteOperationRequest::get("/cdr").with_query(vec![
            ("from_date".to_string(), from_date.to_string()),
            ("to_date".to_string(), to_date.to_string()),
        ]);
        self.execute(request).await
    }

    pub async fn create_lead_list(&self, name: &str, description: &str) -> Result<Value> {
        let payload = LeadListPayload {
            name: name.to_string(),
            description: description.to_string(),
        };
        self.post("/lead_list".to_string(), &payload).await
    }

    pub async fn add_lead_to_list(&self, lead_list_id: &str, lead: LeadData) -> Result<Value> {
        let path = format!("/lead_list/{}/lead", path_segment(lead_list_id)?);
        self.post(path, &LeadPayload::from(lead)).await
    }

    pub async fn create_campaign(&self, campaign: CreateCampaign) -> Result<Value> {
        let payload = CampaignPayload {
            name: campaign.name,
            lead_list_id: campaign.lead_list_id,
            campaign_type: campaign.campaign_type.as_str().to_string(),
            agent_numbers: campaign.agent_numbers,
            caller_id: self.caller_id(campaign.caller_id)?,
            start_time: campaign.start_time,
            end_time: campaign.end_time,
        };
        self.post("/campaign".to_string(), &payload).await
    }

    pub async fn get_dispositions(&self) -> Result<Value> {
        self.execute(RemoteOperationRequest::get("/disposition_list"))
            .await
    }

    pub async fn get_agents(&self) -> Result<Value> {
        self.execute(RemoteOperationRequest::get("/agent")).await
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Value> {
        let path = format!("/campaign/{}", path_segment(campaign_id)?);
        self.execute(RemoteOperationRequest::get(path)).await
    }

    pub async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<Value> {
        let path = format!("/campaign/{}/status", path_segment(campaign_id)?);
        let body = serde_json::to_value(CampaignStatusPayload { status })
            .map_err(anyhow::Error::from)?;
        self.execute(RemoteOperationRequest::put(path, body)).await
    }

    /// Force a fresh login and list agents; never fails, reports instead
    pub async fn test_connection(&self) -> ConnectionStatus {
        self.coordinator().store().invalidate();

        let result = match self.coordinator().ensure_valid().await {
            Ok(_) => self.get_agents().await,
            Err(e) => Err(ApiError::AuthAcquisitionFailed(e)),
        };

        match result {
            Ok(agents) => ConnectionStatus {
                success: true,
                message: "Successfully connected to Smartflo".to_string(),
                agent_count: count_items(&agents),
            },
            Err(e) => {
                tracing::warn!("Smartflo connection test failed: {}", e);
                ConnectionStatus {
                    success: false,
                    message: e.to_string(),
                    agent_count: 0,
                }
            }
        }
    }
}

/// Provider call id from a click-to-call response (`call_id`, else `id`)
pub fn provider_call_id(response: &Value) -> Option<String> {
    ["call_id", "id"].iter().find_map(|key| match response.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Length of `data` (or of the body itself when it is an array)
fn count_items(body: &Value) -> usize {
    body.get("data")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .map_or(0, Vec::len)
}

/// Reject ids that would escape their path segment
fn path_segment(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '?', '#', '%']) {
        return Err(ApiError::ValidationError(format!("invalid identifier: {:?}", id)));
    }
    Ok(id)
}
