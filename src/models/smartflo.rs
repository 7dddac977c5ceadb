use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ==================================================================================================
// Outbound Payloads (Smartflo wire format)
// ==================================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ClickToCallPayload {
    pub agent_number: String,
    pub destination_number: String,
    /// Smartflo answers immediately when set to 1
    #[serde(rename = "async")]
    pub async_mode: u8,
    pub caller_id: String,
    pub custom_identifier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleCallbackPayload {
    pub agent_number: String,
    pub destination_number: String,
    pub callback_time: String,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadListPayload {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadPayload {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub company: String,
    pub custom_fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignPayload {
    pub name: String,
    pub lead_list_id: String,
    pub campaign_type: String,
    pub agent_numbers: Vec<String>,
    pub caller_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatusPayload {
    pub status: CampaignStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignType {
    #[default]
    Progressive,
    Predictive,
    Preview,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Progressive => "progressive",
            CampaignType::Predictive => "predictive",
            CampaignType::Preview => "preview",
        }
    }
}

// ==================================================================================================
// Operation Parameters
// ==================================================================================================

#[derive(Debug, Clone)]
pub struct ClickToCall {
    pub agent_number: String,
    pub destination_number: String,
    pub caller_id: Option<String>,
    pub custom_identifier: String,
}

#[derive(Debug, Clone)]
pub struct ScheduleCallback {
    pub agent_number: String,
    pub destination_number: String,
    pub callback_time: String,
    pub remarks: Option<String>,
}

/// Lead fields accepted when adding to a Smartflo lead list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadData {
    pub first_name: Option<String>,
    pub contact_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub organization: Option<String>,
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
}

impl From<LeadData> for LeadPayload {
    fn from(lead: LeadData) -> Self {
        LeadPayload {
            first_name: lead.first_name.or(lead.contact_name).unwrap_or_default(),
            last_name: lead.last_name.unwrap_or_default(),
            phone_number: lead.phone_number.or(lead.mobile_number).unwrap_or_default(),
            email: lead.email.unwrap_or_default(),
            company: lead.company.or(lead.organization).unwrap_or_default(),
            custom_fields: lead.custom_fields,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaign {
    pub name: String,
    pub lead_list_id: String,
    #[serde(default)]
    pub campaign_type: CampaignType,
    #[serde(default)]
    pub agent_numbers: Vec<String>,
    pub caller_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadList {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCampaignStatus {
    pub status: CampaignStatus,
}

/// Outcome of a connectivity check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
    pub agent_count: usize,
}
