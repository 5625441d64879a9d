use rusqlite::{Connection, Row, params};

use super::{optional, parse_column};
use crate::domain::{PolicyUpdate, WorkItem, WorkItemState};
use crate::error::{PlaneError, Result};

const COLUMNS: &str =
    "id, project_id, title, description, state, max_retries, backoff_base_seconds, backoff_jitter_seconds";

fn from_row(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        state: parse_column(row, 4)?,
        max_retries: row.get(5)?,
        backoff_base_seconds: row.get::<_, Option<i64>>(6)?.map(|v| v.max(0) as u64),
        backoff_jitter_seconds: row.get::<_, Option<i64>>(7)?.map(|v| v.max(0) as u64),
    })
}

pub fn insert(conn: &Connection, project_id: i64, title: &str, description: Option<&str>) -> Result<WorkItem> {
    conn.execute(
        "INSERT INTO work_items (project_id, title, description, state) VALUES (?1, ?2, ?3, ?4)",
        params![project_id, title, description, WorkItemState::Proposed.as_str()],
    )?;
    Ok(WorkItem {
        id: conn.last_insert_rowid(),
        project_id,
        title: title.to_string(),
        description: description.map(str::to_string),
        state: WorkItemState::Proposed,
        max_retries: None,
        backoff_base_seconds: None,
        backoff_jitter_seconds: None,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<WorkItem>> {
    optional(conn.query_row(
        &format!("SELECT {} FROM work_items WHERE id = ?1", COLUMNS),
        [id],
        from_row,
    ))
}

/// Fetch a work item or fail with `NotFound`.
pub fn require(conn: &Connection, id: i64) -> Result<WorkItem> {
    get(conn, id)?.ok_or(PlaneError::not_found("work item", id))
}

pub fn list_for_project(conn: &Connection, project_id: i64) -> Result<Vec<WorkItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM work_items WHERE project_id = ?1 ORDER BY id",
        COLUMNS
    ))?;
    let rows = stmt.query_map([project_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn set_state(conn: &Connection, id: i64, state: WorkItemState) -> Result<()> {
    let changed = conn.execute(
        "UPDATE work_items SET state = ?1 WHERE id = ?2",
        params![state.as_str(), id],
    )?;
    if changed == 0 {
        return Err(PlaneError::not_found("work item", id));
    }
    Ok(())
}

pub fn update_policy(conn: &Connection, id: i64, update: &PolicyUpdate) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE work_items SET
            max_retries = COALESCE(?1, max_retries),
            backoff_base_seconds = COALESCE(?2, backoff_base_seconds),
            backoff_jitter_seconds = COALESCE(?3, backoff_jitter_seconds)
        WHERE id = ?4
        "#,
        params![
            update.max_retries,
            update.backoff_base_seconds.map(|v| v as i64),
            update.backoff_jitter_seconds.map(|v| v as i64),
            id
        ],
    )?;
    if changed == 0 {
        return Err(PlaneError::not_found("work item", id));
    }
    Ok(())
}
