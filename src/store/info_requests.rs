use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use rusqlite::types::Type;

use super::{from_ms, opt_from_ms, optional, parse_column, to_ms};
use crate::domain::{InfoRequest, InfoRequestStatus};
use crate::error::{PlaneError, Result};

const COLUMNS: &str = "id, run_id, status, prompt, required_keys, responses, created_at, resolved_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<InfoRequest> {
    let keys: String = row.get(4)?;
    let required_keys: Vec<String> = serde_json::from_str(&keys)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(InfoRequest {
        id: row.get(0)?,
        run_id: row.get(1)?,
        status: parse_column(row, 2)?,
        prompt: row.get(3)?,
        required_keys,
        responses: row.get(5)?,
        created_at: from_ms(row.get(6)?),
        resolved_at: opt_from_ms(row.get(7)?),
    })
}

pub fn insert(
    conn: &Connection,
    run_id: i64,
    prompt: &str,
    required_keys: &[String],
    now: DateTime<Utc>,
) -> Result<InfoRequest> {
    conn.execute(
        r#"
        INSERT INTO info_requests (run_id, status, prompt, required_keys, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            run_id,
            InfoRequestStatus::Pending.as_str(),
            prompt,
            serde_json::to_string(required_keys)?,
            to_ms(now)
        ],
    )?;
    require(conn, conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<InfoRequest>> {
    optional(conn.query_row(
        &format!("SELECT {} FROM info_requests WHERE id = ?1", COLUMNS),
        [id],
        from_row,
    ))
}

/// Fetch an info request or fail with `NotFound`.
pub fn require(conn: &Connection, id: i64) -> Result<InfoRequest> {
    get(conn, id)?.ok_or(PlaneError::not_found("info request", id))
}

pub fn list_for_run(conn: &Connection, run_id: i64) -> Result<Vec<InfoRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM info_requests WHERE run_id = ?1 ORDER BY id",
        COLUMNS
    ))?;
    let rows = stmt.query_map([run_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Move a pending request to `status`, storing `responses`.
///
/// Fails with `PreconditionFailed` when the request is no longer pending.
pub fn finish(
    conn: &Connection,
    id: i64,
    status: InfoRequestStatus,
    responses: Option<&str>,
    now: DateTime<Utc>,
) -> Result<InfoRequest> {
    let changed = conn.execute(
        r#"
        UPDATE info_requests SET status = ?1, responses = ?2, resolved_at = ?3
        WHERE id = ?4 AND status = ?5
        "#,
        params![
            status.as_str(),
            responses,
            to_ms(now),
            id,
            InfoRequestStatus::Pending.as_str()
        ],
    )?;
    if changed == 0 {
        let current = require(conn, id)?;
        return Err(PlaneError::precondition(format!(
            "info request {} is {}, not pending",
            id, current.status
        )));
    }
    require(conn, id)
}
