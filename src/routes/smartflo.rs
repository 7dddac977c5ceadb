// Smartflo administration pass-throughs

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::ApiError;
use crate::models::smartflo::{
    ConnectionStatus, CreateCampaign, CreateLeadList, LeadData, UpdateCampaignStatus,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdrQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

fn wrap(data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
    }))
}

/// GET /api/smartflo/test-connection
///
/// Forces a fresh login; failures are reported in the body, not as an error status.
pub(super) async fn test_connection_handler(
    State(state): State<AppState>,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let dialer = state.dialer()?;
    Ok(Json(dialer.test_connection().await))
}

/// GET /api/smartflo/agents
pub(super) async fn agents_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    Ok(wrap(state.dialer()?.get_agents().await?))
}

/// GET /api/smartflo/dispositions
pub(super) async fn dispositions_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    Ok(wrap(state.dialer()?.get_dispositions().await?))
}

/// GET /api/smartflo/cdr?fromDate=YYYY-MM-DD&toDate=YYYY-MM-DD
pub(super) async fn cdr_handler(
    State(state): State<AppState>,
    Query(query): Query<CdrQuery>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    match (query.from_date, query.to_date) {
        (Some(from), Some(to)) if !from.is_empty() && !to.is_empty() => {
            Ok(wrap(dialer.fetch_cdr(&from, &to).await?))
        }
        _ => Err(ApiError::ValidationError(
            "fromDate and toDate are required".to_string(),
        )),
    }
}

/// POST /api/smartflo/lead-lists
pub(super) async fn create_lead_list_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateLeadList>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    if request.name.trim().is_empty() {
        return Err(ApiError::ValidationError("name is required".to_string()));
    }
    Ok(wrap(
        dialer
            .create_lead_list(&request.name, &request.description)
            .await?,
    ))
}

/// POST /api/smartflo/lead-lists/:id/leads
pub(super) async fn add_lead_handler(
    State(state): State<AppState>,
    Path(lead_list_id): Path<String>,
    Json(lead): Json<LeadData>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    Ok(wrap(dialer.add_lead_to_list(&lead_list_id, lead).await?))
}

/// POST /api/smartflo/campaigns
pub(super) async fn create_campaign_handler(
    State(state): State<AppState>,
    Json(campaign): Json<CreateCampaign>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    if campaign.name.trim().is_empty() || campaign.lead_list_id.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "name and leadListId are required".to_string(),
        ));
    }
    Ok(wrap(dialer.create_campaign(campaign).await?))
}

/// GET /api/smartflo/campaigns/:id
pub(super) async fn get_campaign_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(wrap(state.dialer()?.get_campaign(&campaign_id).await?))
}

/// PUT /api/smartflo/campaigns/:id/status
pub(super) async fn update_campaign_status_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Json(request): Json<UpdateCampaignStatus>,
) -> Result<Json<Value>, ApiError> {
    let dialer = state.dialer()?;
    tracing::info!(campaign_id = %campaign_id, status = ?request.status, "Updating campaign status");
    Ok(wrap(
        dialer
            .update_campaign_status(&campaign_id, request.status)
            .await?,
    ))
}
