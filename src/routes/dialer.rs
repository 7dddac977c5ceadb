// CRM dialer handlers: place calls, schedule callbacks, keep the call log

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::client::provider_call_id;
use crate::error::ApiError;
use crate::middleware::AgentUser;
use crate::models::records::{CallLog, CallLogFilter, Lead, PageRequest, Pagination, User};
use crate::models::smartflo::{ClickToCall, ScheduleCallback};

/// Most call-log entries returned for a single lead
const LEAD_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickToCallRequest {
    pub lead_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCallbackRequest {
    pub lead_id: Option<String>,
    pub callback_time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogQuery {
    pub lead_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualLogRequest {
    pub lead_id: Option<String>,
    pub duration: Option<i64>,
    pub disposition: Option<String>,
    pub remarks: Option<String>,
    pub call_status: Option<String>,
}

/// POST /api/dialer/click-to-call
///
/// Rings the acting agent through Smartflo, then bridges to the lead.
/// The call is logged as `initiated`; its outcome arrives later.
pub(super) async fn click_to_call_handler(
    State(state): State<AppState>,
    AgentUser(user_id): AgentUser,
    Json(request): Json<ClickToCallRequest>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    let lead_id = required(request.lead_id, "leadId")?;

    let mut lead = find_lead(&state, &lead_id).await?;
    let destination = lead
        .mobile_number
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::ValidationError("Lead does not have a phone number".to_string()))?;

    let (user, agent_number) = dialer_agent(&state, &user_id).await?;

    let caller_id = dialer
        .default_caller_id()
        .map(str::to_string)
        .ok_or_else(|| ApiError::ConfigMissing("SMARTFLO_DEFAULT_CALLER_ID".to_string()))?;

    let custom_identifier = format!("CRM_{}_{}", lead.id, Utc::now().timestamp_millis());

    let response = dialer
        .click_to_call(ClickToCall {
            agent_number: agent_number.clone(),
            destination_number: destination.clone(),
            caller_id: Some(caller_id.clone()),
            custom_identifier: custom_identifier.clone(),
        })
        .await?;

    let mut call_log = CallLog::outbound(&lead.id, &user.id, &agent_number, "initiated");
    call_log.destination_number = Some(destination);
    call_log.caller_id = Some(caller_id);
    call_log.provider_call_id = provider_call_id(&response);
    call_log.custom_identifier = Some(custom_identifier.clone());
    state.repository.save_call_log(&call_log).await?;

    lead.record_call("initiated", call_log.created_at);
    state.repository.save_lead(&lead).await?;

    tracing::info!(
        lead_id = %lead.id,
        call_log_id = %call_log.id,
        provider_call_id = ?call_log.provider_call_id,
        "Call initiated"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Call initiated successfully",
        "callLogId": call_log.id,
        "providerCallId": call_log.provider_call_id,
        "customIdentifier": custom_identifier,
    })))
}

/// POST /api/dialer/schedule-callback
pub(super) async fn schedule_callback_handler(
    State(state): State<AppState>,
    AgentUser(user_id): AgentUser,
    Json(request): Json<ScheduleCallbackRequest>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    let (lead_id, callback_time) = match (request.lead_id, request.callback_time) {
        (Some(lead_id), Some(time)) if !lead_id.is_empty() && !time.is_empty() => (lead_id, time),
        _ => {
            return Err(ApiError::ValidationError(
                "Lead ID and callback time are required".to_string(),
            ))
        }
    };
    let scheduled_at = parse_timestamp(&callback_time).ok_or_else(|| {
        ApiError::ValidationError(format!("Invalid callbackTime: {}", callback_time))
    })?;

    let mut lead = find_lead(&state, &lead_id).await?;
    let destination = lead
        .mobile_number
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::ValidationError("Lead does not have a phone number".to_string()))?;

    let (user, agent_number) = dialer_agent(&state, &user_id).await?;

    let reason = request.reason.unwrap_or_default();
    let response = dialer
        .schedule_callback(ScheduleCallback {
            agent_number,
            destination_number: destination,
            callback_time: scheduled_at.to_rfc3339(),
            remarks: Some(reason.clone()),
        })
        .await?;

    lead.callback_scheduled = Some(scheduled_at);
    lead.callback_reason = Some(reason);
    state.repository.save_lead(&lead).await?;

    tracing::info!(lead_id = %lead.id, scheduled_at = %scheduled_at, "Callback scheduled");

    Ok(Json(json!({
        "success": true,
        "message": "Callback scheduled successfully",
        "callbackId": response.get("id").cloned().unwrap_or(Value::Null),
        "scheduledTime": callback_time,
    })))
}

/// GET /api/dialer/call-logs
///
/// Newest first, filtered by any of lead, user, status and a created-at window.
pub(super) async fn call_logs_handler(
    State(state): State<AppState>,
    _user: AgentUser,
    Query(query): Query<CallLogQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = CallLogFilter {
        lead_id: non_empty(query.lead_id),
        user_id: non_empty(query.user_id),
        status: non_empty(query.status),
        start_date: date_param(query.start_date, "startDate")?,
        end_date: date_param(query.end_date, "endDate")?,
    };
    let page = PageRequest::new(query.page, query.limit);

    let (logs, total) = state.repository.find_call_logs(&filter, page).await?;

    Ok(Json(json!({
        "success": true,
        "data": logs,
        "pagination": Pagination::new(total, page),
    })))
}

/// GET /api/dialer/call-logs/:lead_id
pub(super) async fn lead_call_history_handler(
    State(state): State<AppState>,
    _user: AgentUser,
    Path(lead_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let logs = state
        .repository
        .lead_call_history(&lead_id, LEAD_HISTORY_LIMIT)
        .await?;

    Ok(Json(json!({
        "success": true,
        "total": logs.len(),
        "data": logs,
    })))
}

/// POST /api/dialer/manual-log
///
/// Records a call placed outside the dialer.
pub(super) async fn manual_log_handler(
    State(state): State<AppState>,
    AgentUser(user_id): AgentUser,
    Json(request): Json<ManualLogRequest>,
) -> Result<Json<Value>, ApiError> {
    let lead_id = required(request.lead_id, "leadId")?;
    let duration = request.duration.unwrap_or(0);
    if duration < 0 {
        return Err(ApiError::ValidationError(
            "duration must not be negative".to_string(),
        ));
    }

    let mut lead = find_lead(&state, &lead_id).await?;
    let user = find_user(&state, &user_id).await?;

    let agent_number = user
        .smartflo_agent_number
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or("manual");
    let status = non_empty(request.call_status).unwrap_or_else(|| "completed".to_string());
    let now = Utc::now();

    let mut call_log = CallLog::outbound(&lead.id, &user.id, agent_number, &status);
    call_log.destination_number = lead.mobile_number.clone();
    call_log.duration = duration;
    call_log.disposition = request.disposition;
    call_log.remarks = request.remarks;
    call_log.start_time = Some(now);
    call_log.end_time = Some(now);
    state.repository.save_call_log(&call_log).await?;

    lead.record_call(&status, now);
    state.repository.save_lead(&lead).await?;

    tracing::info!(lead_id = %lead.id, call_log_id = %call_log.id, "Manual call logged");

    Ok(Json(json!({
        "success": true,
        "message": "Call logged successfully",
        "callLogId": call_log.id,
    })))
}

async fn find_lead(state: &AppState, lead_id: &str) -> Result<Lead, ApiError> {
    state
        .repository
        .find_lead(lead_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))
}

async fn find_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    state
        .repository
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

const NOT_MAPPED: &str = "User is not mapped to Smartflo agent. Please contact administrator.";

fn mapped_agent(user: &User) -> Result<String, ApiError> {
    user.dialer_agent_number()
        .map(str::to_string)
        .ok_or_else(|| ApiError::ValidationError(NOT_MAPPED.to_string()))
}

/// Acting user and their agent number; an unknown user counts as unmapped
async fn dialer_agent(state: &AppState, user_id: &str) -> Result<(User, String), ApiError> {
    let user = state
        .repository
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::ValidationError(NOT_MAPPED.to_string()))?;
    let agent_number = mapped_agent(&user)?;
    Ok((user, agent_number))
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::ValidationError(format!("{} is required", name)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// RFC 3339 timestamp or bare `YYYY-MM-DD` (midnight UTC)
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

fn date_param(value: Option<String>, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match non_empty(value) {
        None => Ok(None),
        Some(v) => parse_timestamp(&v)
            .map(Some)
            .ok_or_else(|| ApiError::ValidationError(format!("Invalid {}: {}", name, v))),
    }
}
