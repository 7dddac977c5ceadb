// SQLite-backed repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

use super::Repository;
use crate::models::records::{CallLog, CallLogFilter, Lead, PageRequest, User};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS leads (
    id                 TEXT PRIMARY KEY,
    customer_name      TEXT,
    contact_name       TEXT,
    mobile_number      TEXT,
    email              TEXT,
    total_calls_made   INTEGER NOT NULL DEFAULT 0,
    last_call_date     TEXT,
    last_call_status   TEXT,
    callback_scheduled TEXT,
    callback_reason    TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id                    TEXT PRIMARY KEY,
    username              TEXT NOT NULL,
    email                 TEXT,
    smartflo_enabled      INTEGER NOT NULL DEFAULT 0,
    smartflo_agent_number TEXT
);

CREATE TABLE IF NOT EXISTS call_logs (
    id                 TEXT PRIMARY KEY,
    lead_id            TEXT NOT NULL,
    user_id            TEXT NOT NULL,
    agent_number       TEXT NOT NULL,
    destination_number TEXT,
    caller_id          TEXT,
    provider_call_id   TEXT,
    custom_identifier  TEXT,
    call_status        TEXT NOT NULL,
    call_direction     TEXT NOT NULL,
    duration           INTEGER NOT NULL DEFAULT 0,
    disposition        TEXT,
    remarks            TEXT,
    start_time         TEXT,
    end_time           TEXT,
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_call_logs_lead ON call_logs (lead_id, created_at);
"#;

const CALL_LOG_COLUMNS: &str = "id, lead_id, user_id, agent_number, destination_number, caller_id, \
     provider_call_id, custom_identifier, call_status, call_direction, duration, disposition, \
     remarks, start_time, end_time, created_at";

/// Single-connection SQLite store
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create SQLite schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Timestamps are stored in one fixed-width UTC format so text order is time order
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(ts)
}

fn read_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn lead_from_row(row: &Row) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        customer_name: row.get(1)?,
        contact_name: row.get(2)?,
        mobile_number: row.get(3)?,
        email: row.get(4)?,
        total_calls_made: row.get(5)?,
        last_call_date: read_ts(row, 6)?,
        last_call_status: row.get(7)?,
        callback_scheduled: read_ts(row, 8)?,
        callback_reason: row.get(9)?,
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        smartflo_enabled: row.get(3)?,
        smartflo_agent_number: row.get(4)?,
    })
}

fn call_log_from_row(row: &Row) -> rusqlite::Result<CallLog> {
    Ok(CallLog {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        user_id: row.get(2)?,
        agent_number: row.get(3)?,
        destination_number: row.get(4)?,
        caller_id: row.get(5)?,
        provider_call_id: row.get(6)?,
        custom_identifier: row.get(7)?,
        call_status: row.get(8)?,
        call_direction: row.get(9)?,
        duration: row.get(10)?,
        disposition: row.get(11)?,
        remarks: row.get(12)?,
        start_time: read_ts(row, 13)?,
        end_time: read_ts(row, 14)?,
        created_at: read_ts(row, 15)?.unwrap_or_default(),
    })
}

/// WHERE clause and bound values for a call-log filter
fn filter_clause(filter: &CallLogFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(ref lead_id) = filter.lead_id {
        conditions.push("lead_id = ?");
        values.push(lead_id.clone());
    }
    if let Some(ref user_id) = filter.user_id {
        conditions.push("user_id = ?");
        values.push(user_id.clone());
    }
    if let Some(ref status) = filter.status {
        conditions.push("call_status = ?");
        values.push(status.clone());
    }
    if let Some(ref start) = filter.start_date {
        conditions.push("created_at >= ?");
        values.push(ts(start));
    }
    if let Some(ref end) = filter.end_date {
        conditions.push("created_at <= ?");
        values.push(ts(end));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_lead(&self, id: &str) -> Result<Option<Lead>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, customer_name, contact_name, mobile_number, email, total_calls_made, \
             last_call_date, last_call_status, callback_scheduled, callback_reason \
             FROM leads WHERE id = ?",
            [id],
            lead_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load lead {}", id))
    }

    async fn save_lead(&self, lead: &Lead) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO leads (id, customer_name, contact_name, mobile_number, email, \
             total_calls_made, last_call_date, last_call_status, callback_scheduled, callback_reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                lead.id,
                lead.customer_name,
                lead.contact_name,
                lead.mobile_number,
                lead.email,
                lead.total_calls_made,
                opt_ts(&lead.last_call_date),
                lead.last_call_status,
                opt_ts(&lead.callback_scheduled),
                lead.callback_reason,
            ],
        )
        .with_context(|| format!("Failed to save lead {}", lead.id))?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, email, smartflo_enabled, smartflo_agent_number \
             FROM users WHERE id = ?",
            [id],
            user_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load user {}", id))
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO users (id, username, email, smartflo_enabled, smartflo_agent_number) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.username,
                user.email,
                user.smartflo_enabled,
                user.smartflo_agent_number,
            ],
        )
        .with_context(|| format!("Failed to save user {}", user.id))?;
        Ok(())
    }

    async fn save_call_log(&self, log: &CallLog) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO call_logs ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                CALL_LOG_COLUMNS
            ),
            params![
                log.id,
                log.lead_id,
                log.user_id,
                log.agent_number,
                log.destination_number,
                log.caller_id,
                log.provider_call_id,
                log.custom_identifier,
                log.call_status,
                log.call_direction,
                log.duration,
                log.disposition,
                log.remarks,
                opt_ts(&log.start_time),
                opt_ts(&log.end_time),
                ts(&log.created_at),
            ],
        )
        .with_context(|| format!("Failed to save call log {}", log.id))?;
        Ok(())
    }

    async fn find_call_logs(
        &self,
        filter: &CallLogFilter,
        page: PageRequest,
    ) -> Result<(Vec<CallLog>, u64)> {
        let (clause, values) = filter_clause(filter);
        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM call_logs{}", clause),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .context("Failed to count call logs")?;

        let sql = format!(
            "SELECT {} FROM call_logs{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
            CALL_LOG_COLUMNS,
            clause,
            page.limit,
            page.offset()
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare call log query")?;
        let logs = stmt
            .query_map(params_from_iter(values.iter()), call_log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read call logs")?;

        Ok((logs, total as u64))
    }

    async fn lead_call_history(&self, lead_id: &str, limit: u32) -> Result<Vec<CallLog>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM call_logs WHERE lead_id = ? ORDER BY created_at DESC LIMIT {}",
            CALL_LOG_COLUMNS, limit
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare call history query")?;
        let logs = stmt
            .query_map([lead_id], call_log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read call history for lead {}", lead_id))?;
        Ok(logs)
    }
}
