use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{from_ms, opt_from_ms, optional, parse_column, to_ms};
use crate::domain::{Run, RunStatus};
use crate::error::{PlaneError, Result};

const COLUMNS: &str = "id, work_item_id, status, logs, trace_id, started_at, finished_at, \
                       claimed_by, claimed_at, heartbeat_at, lease_epoch, version";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        work_item_id: row.get(1)?,
        status: parse_column(row, 2)?,
        logs: row.get(3)?,
        trace_id: row.get(4)?,
        started_at: from_ms(row.get(5)?),
        finished_at: opt_from_ms(row.get(6)?),
        claimed_by: row.get(7)?,
        claimed_at: opt_from_ms(row.get(8)?),
        heartbeat_at: opt_from_ms(row.get(9)?),
        lease_epoch: row.get(10)?,
        version: row.get(11)?,
    })
}

/// Insert a new `running` run.
pub fn insert_running(
    conn: &Connection,
    work_item_id: i64,
    trace_id: &str,
    logs: &str,
    started_at: DateTime<Utc>,
) -> Result<Run> {
    conn.execute(
        "INSERT INTO runs (work_item_id, status, logs, trace_id, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![work_item_id, RunStatus::Running.as_str(), logs, trace_id, to_ms(started_at)],
    )?;
    require(conn, conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Run>> {
    optional(conn.query_row(
        &format!("SELECT {} FROM runs WHERE id = ?1", COLUMNS),
        [id],
        from_row,
    ))
}

/// Fetch a run or fail with `NotFound`.
pub fn require(conn: &Connection, id: i64) -> Result<Run> {
    get(conn, id)?.ok_or(PlaneError::not_found("run", id))
}

pub fn list_for_work_item(conn: &Connection, work_item_id: i64) -> Result<Vec<Run>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM runs WHERE work_item_id = ?1 ORDER BY id",
        COLUMNS
    ))?;
    let rows = stmt.query_map([work_item_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn latest_for(conn: &Connection, work_item_id: i64) -> Result<Option<Run>> {
    optional(conn.query_row(
        &format!("SELECT {} FROM runs WHERE work_item_id = ?1 ORDER BY id DESC LIMIT 1", COLUMNS),
        [work_item_id],
        from_row,
    ))
}

pub fn latest_running_for(conn: &Connection, work_item_id: i64) -> Result<Option<Run>> {
    optional(conn.query_row(
        &format!(
            "SELECT {} FROM runs WHERE work_item_id = ?1 AND status = ?2 ORDER BY id DESC LIMIT 1",
            COLUMNS
        ),
        params![work_item_id, RunStatus::Running.as_str()],
        from_row,
    ))
}

pub fn count_failed(conn: &Connection, work_item_id: i64) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM runs WHERE work_item_id = ?1 AND status = ?2",
        params![work_item_id, RunStatus::Failed.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

/// Persist every mutable column of `run`, guarded by its version.
///
/// Returns the stored run with the bumped version, or `TransientStore` when
/// another writer got there first.
pub fn save(conn: &Connection, run: &Run) -> Result<Run> {
    let changed = conn.execute(
        r#"
        UPDATE runs SET
            status = ?1, logs = ?2, finished_at = ?3,
            claimed_by = ?4, claimed_at = ?5, heartbeat_at = ?6,
            lease_epoch = ?7, version = version + 1
        WHERE id = ?8 AND version = ?9
        "#,
        params![
            run.status.as_str(),
            run.logs,
            run.finished_at.map(to_ms),
            run.claimed_by,
            run.claimed_at.map(to_ms),
            run.heartbeat_at.map(to_ms),
            run.lease_epoch,
            run.id,
            run.version
        ],
    )?;
    if changed == 0 {
        return Err(PlaneError::TransientStore(format!("run {} changed concurrently", run.id)));
    }
    Ok(Run {
        version: run.version + 1,
        ..run.clone()
    })
}

/// Append a line to a run's log, newline-terminated.
pub fn append_log(conn: &Connection, id: i64, line: &str) -> Result<()> {
    let line = if line.ends_with('\n') {
        line.to_string()
    } else {
        format!("{}\n", line)
    };
    let changed = conn.execute(
        "UPDATE runs SET logs = logs || ?1, version = version + 1 WHERE id = ?2",
        params![line, id],
    )?;
    if changed == 0 {
        return Err(PlaneError::not_found("run", id));
    }
    Ok(())
}
