use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sales lead that agents dial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub customer_name: Option<String>,
    pub contact_name: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub total_calls_made: i64,
    pub last_call_date: Option<DateTime<Utc>>,
    pub last_call_status: Option<String>,
    pub callback_scheduled: Option<DateTime<Utc>>,
    pub callback_reason: Option<String>,
}

impl Lead {
    pub fn new(mobile_number: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            customer_name: None,
            contact_name: None,
            mobile_number,
            email: None,
            total_calls_made: 0,
            last_call_date: None,
            last_call_status: None,
            callback_scheduled: None,
            callback_reason: None,
        }
    }

    /// Bump call statistics after a call was placed or logged
    pub fn record_call(&mut self, status: &str, at: DateTime<Utc>) {
        self.total_calls_made += 1;
        self.last_call_date = Some(at);
        self.last_call_status = Some(status.to_string());
    }
}

/// CRM user, optionally mapped to a Smartflo agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub smartflo_enabled: bool,
    pub smartflo_agent_number: Option<String>,
}

impl User {
    /// Agent number if this user may place dialer calls
    pub fn dialer_agent_number(&self) -> Option<&str> {
        if self.smartflo_enabled {
            self.smartflo_agent_number.as_deref().filter(|n| !n.is_empty())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLog {
    pub id: String,
    pub lead_id: String,
    pub user_id: String,
    pub agent_number: String,
    pub destination_number: Option<String>,
    pub caller_id: Option<String>,
    pub provider_call_id: Option<String>,
    pub custom_identifier: Option<String>,
    pub call_status: String,
    pub call_direction: String,
    pub duration: i64,
    pub disposition: Option<String>,
    pub remarks: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CallLog {
    /// Outbound log with everything optional left empty
    pub fn outbound(lead_id: &str, user_id: &str, agent_number: &str, status: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            lead_id: lead_id.to_string(),
            user_id: user_id.to_string(),
            agent_number: agent_number.to_string(),
            destination_number: None,
            caller_id: None,
            provider_call_id: None,
            custom_identifier: None,
            call_status: status.to_string(),
            call_direction: "outbound".to_string(),
            duration: 0,
            disposition: None,
            remarks: None,
            start_time: None,
            end_time: None,
            created_at: Utc::now(),
        }
    }
}

/// Call-log query filter; every field narrows the result
#[derive(Debug, Clone, Default)]
pub struct CallLogFilter {
    pub lead_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 50;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, request: PageRequest) -> Self {
        Self {
            total,
            page: request.page,
            limit: request.limit,
            pages: total.div_ceil(request.limit as u64),
        }
    }
}
