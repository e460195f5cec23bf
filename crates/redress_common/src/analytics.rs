//! Admin dashboard aggregates.
//!
//! Every figure is a GROUP BY over the current tables, computed per request.

use crate::error::StoreError;
use crate::model::{Priority, Role, Status};
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const RECENT_DAYS: i64 = 7;
const TREND_DAYS: i64 = 30;
const STAFF_LEADERBOARD: i64 = 10;
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub overview: Overview,
    pub status_breakdown: BTreeMap<String, u64>,
    /// Most common first
    pub category_breakdown: Vec<Bucket>,
    pub priority_breakdown: BTreeMap<String, u64>,
    pub user_role_breakdown: BTreeMap<String, u64>,
    /// One row per day that saw complaints, oldest first
    pub complaints_trend: Vec<DailyCount>,
    pub staff_performance: Vec<StaffPerformance>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_complaints: u64,
    pub total_users: u64,
    /// Filed in the last seven days
    pub recent_complaints: u64,
    /// Whole hours, 0 when nothing has been resolved
    pub avg_resolution_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`, UTC
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPerformance {
    pub staff_id: String,
    pub name: String,
    pub email: String,
    pub resolved: u64,
}

fn count(conn: &Connection, sql: &str, since: Option<i64>) -> Result<u64, StoreError> {
    let n: i64 = match since {
        Some(since) => conn.query_row(sql, params![since], |row| row.get(0))?,
        None => conn.query_row(sql, [], |row| row.get(0))?,
    };
    Ok(n as u64)
}

fn grouped(conn: &Connection, sql: &str) -> Result<Vec<Bucket>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Bucket {
                name: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Grouped counts keyed by every member of a closed enumeration, zero-filled
fn breakdown<'a>(
    conn: &Connection,
    sql: &str,
    keys: impl IntoIterator<Item = &'a str>,
) -> Result<BTreeMap<String, u64>, StoreError> {
    let mut map: BTreeMap<String, u64> = keys.into_iter().map(|k| (k.to_string(), 0)).collect();
    for bucket in grouped(conn, sql)? {
        map.insert(bucket.name, bucket.count);
    }
    Ok(map)
}

fn average_resolution_hours(conn: &Connection) -> Result<i64, StoreError> {
    let avg: Option<f64> = conn.query_row(
        "SELECT AVG((resolved_at - created_at) / ?1) FROM complaints
         WHERE status = ?2 AND resolved_at IS NOT NULL",
        params![MILLIS_PER_HOUR, Status::Resolved.as_str()],
        |row| row.get(0),
    )?;
    Ok(avg.map(|h| h.round() as i64).unwrap_or(0))
}

fn trend(conn: &Connection, since: i64) -> Result<Vec<DailyCount>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m-%d', created_at / 1000, 'unixepoch') AS day, COUNT(*)
         FROM complaints WHERE created_at >= ?1
         GROUP BY day ORDER BY day ASC",
    )?;
    let rows = stmt
        .query_map(params![since], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Resolved complaints per assignee. The inner join drops assignees whose
/// account no longer exists.
fn staff_performance(conn: &Connection) -> Result<Vec<StaffPerformance>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT c.assigned_to, u.name, u.email, COUNT(*) AS resolved
         FROM complaints c JOIN users u ON u.id = c.assigned_to
         WHERE c.assigned_to IS NOT NULL AND c.status = ?1
         GROUP BY c.assigned_to, u.name, u.email
         ORDER BY resolved DESC, u.name ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![Status::Resolved.as_str(), STAFF_LEADERBOARD], |row| {
            Ok(StaffPerformance {
                staff_id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                resolved: row.get::<_, i64>(3)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl Store {
    /// Build the admin dashboard as of `now`
    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard, StoreError> {
        let recent_since = (now - Duration::days(RECENT_DAYS)).timestamp_millis();
        let trend_since = (now - Duration::days(TREND_DAYS)).timestamp_millis();

        self.with_conn(move |conn| {
            let overview = Overview {
                total_complaints: count(conn, "SELECT COUNT(*) FROM complaints", None)?,
                total_users: count(conn, "SELECT COUNT(*) FROM users", None)?,
                recent_complaints: count(
                    conn,
                    "SELECT COUNT(*) FROM complaints WHERE created_at >= ?1",
                    Some(recent_since),
                )?,
                avg_resolution_time: average_resolution_hours(conn)?,
            };

            let dashboard = Dashboard {
                overview,
                status_breakdown: breakdown(
                    conn,
                    "SELECT status, COUNT(*) FROM complaints GROUP BY status",
                    Status::ALL.iter().map(|s| s.as_str()),
                )?,
                category_breakdown: grouped(
                    conn,
                    "SELECT category, COUNT(*) AS n FROM complaints
                     GROUP BY category ORDER BY n DESC, category ASC",
                )?,
                priority_breakdown: breakdown(
                    conn,
                    "SELECT priority, COUNT(*) FROM complaints GROUP BY priority",
                    Priority::ALL.iter().map(|p| p.as_str()),
                )?,
                user_role_breakdown: breakdown(
                    conn,
                    "SELECT role, COUNT(*) FROM users GROUP BY role",
                    Role::ALL.iter().map(|r| r.as_str()),
                )?,
                complaints_trend: trend(conn, trend_since)?,
                staff_performance: staff_performance(conn)?,
            };

            debug!(
                "Dashboard: {} complaints, {} users",
                dashboard.overview.total_complaints, dashboard.overview.total_users
            );
            Ok(dashboard)
        })
        .await
    }
}
