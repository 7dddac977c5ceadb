// Persistence for leads, users and call logs

mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::records::{CallLog, CallLogFilter, Lead, PageRequest, User};

pub use sqlite::SqliteRepository;

/// Storage consumed by the dialer routes
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_lead(&self, id: &str) -> Result<Option<Lead>>;

    /// Insert or replace
    async fn save_lead(&self, lead: &Lead) -> Result<()>;

    async fn find_user(&self, id: &str) -> Result<Option<User>>;

    /// Insert or replace
    async fn save_user(&self, user: &User) -> Result<()>;

    async fn save_call_log(&self, log: &CallLog) -> Result<()>;

    /// Newest first; returns the page and the total match count
    async fn find_call_logs(&self, filter: &CallLogFilter, page: PageRequest) -> Result<(Vec<CallLog>, u64)>;

    async fn lead_call_history(&self, lead_id: &str, limit: u32) -> Result<Vec<CallLog>>;
}
