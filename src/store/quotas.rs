use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{from_ms, optional, to_ms};
use crate::domain::UsageQuota;
use crate::error::{PlaneError, Result};

fn from_row(row: &Row<'_>) -> rusqlite::Result<UsageQuota> {
    Ok(UsageQuota {
        id: row.get(0)?,
        project_id: row.get(1)?,
        max_runs_per_day: row.get(2)?,
        runs_today: row.get(3)?,
        window_start: from_ms(row.get(4)?),
        version: row.get(5)?,
    })
}

pub fn for_project(conn: &Connection, project_id: i64) -> Result<Option<UsageQuota>> {
    optional(conn.query_row(
        r#"
        SELECT id, project_id, max_runs_per_day, runs_today, window_start, version
        FROM usage_quotas WHERE project_id = ?1
        "#,
        [project_id],
        from_row,
    ))
}

/// Insert an unlimited quota with a window starting at `now`.
pub fn insert_unlimited(conn: &Connection, project_id: i64, now: DateTime<Utc>) -> Result<UsageQuota> {
    conn.execute(
        "INSERT INTO usage_quotas (project_id, max_runs_per_day, runs_today, window_start) VALUES (?1, 0, 0, ?2)",
        params![project_id, to_ms(now)],
    )?;
    Ok(UsageQuota {
        id: conn.last_insert_rowid(),
        project_id,
        max_runs_per_day: 0,
        runs_today: 0,
        window_start: from_ms(to_ms(now)),
        version: 0,
    })
}

/// The project's quota, created unlimited on first use.
pub fn get_or_create(conn: &Connection, project_id: i64, now: DateTime<Utc>) -> Result<UsageQuota> {
    match for_project(conn, project_id)? {
        Some(quota) => Ok(quota),
        None => insert_unlimited(conn, project_id, now),
    }
}

/// Persist a quota, guarded by its version.
pub fn save(conn: &Connection, quota: &UsageQuota) -> Result<UsageQuota> {
    let changed = conn.execute(
        r#"
        UPDATE usage_quotas SET
            max_runs_per_day = ?1, runs_today = ?2, window_start = ?3, version = version + 1
        WHERE id = ?4 AND version = ?5
        "#,
        params![
            quota.max_runs_per_day,
            quota.runs_today,
            to_ms(quota.window_start),
            quota.id,
            quota.version
        ],
    )?;
    if changed == 0 {
        return Err(PlaneError::TransientStore(format!(
            "quota for project {} changed concurrently",
            quota.project_id
        )));
    }
    Ok(UsageQuota {
        version: quota.version + 1,
        ..quota.clone()
    })
}
