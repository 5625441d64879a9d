use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{from_ms, optional, parse_column, to_ms};
use crate::domain::{ScheduledTask, TaskStatus};
use crate::error::{PlaneError, Result};

const COLUMNS: &str = "id, work_item_id, status, priority, depends_on_work_item_id, scheduled_for, version";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledTask> {
    Ok(ScheduledTask {
        id: row.get(0)?,
        work_item_id: row.get(1)?,
        status: parse_column(row, 2)?,
        priority: row.get(3)?,
        depends_on_work_item_id: row.get(4)?,
        scheduled_for: from_ms(row.get(5)?),
        version: row.get(6)?,
    })
}

pub fn insert(
    conn: &Connection,
    work_item_id: i64,
    priority: i64,
    depends_on_work_item_id: Option<i64>,
    scheduled_for: DateTime<Utc>,
) -> Result<ScheduledTask> {
    conn.execute(
        r#"
        INSERT INTO scheduled_tasks (work_item_id, status, priority, depends_on_work_item_id, scheduled_for)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            work_item_id,
            TaskStatus::Queued.as_str(),
            priority,
            depends_on_work_item_id,
            to_ms(scheduled_for)
        ],
    )?;
    Ok(ScheduledTask {
        id: conn.last_insert_rowid(),
        work_item_id,
        status: TaskStatus::Queued,
        priority,
        depends_on_work_item_id,
        scheduled_for: from_ms(to_ms(scheduled_for)),
        version: 0,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<ScheduledTask>> {
    optional(conn.query_row(
        &format!("SELECT {} FROM scheduled_tasks WHERE id = ?1", COLUMNS),
        [id],
        from_row,
    ))
}

/// Queued tasks whose delay has elapsed, highest priority first, oldest first on ties.
pub fn due_candidates(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM scheduled_tasks
        WHERE status = ?1 AND scheduled_for <= ?2
        ORDER BY priority DESC, id ASC
        "#,
        COLUMNS
    ))?;
    let rows = stmt.query_map(params![TaskStatus::Queued.as_str(), to_ms(now)], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// All tasks, optionally filtered by status, in dispatch order.
pub fn list(conn: &Connection, status: Option<TaskStatus>) -> Result<Vec<ScheduledTask>> {
    let rows = match status {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scheduled_tasks WHERE status = ?1 ORDER BY priority DESC, id ASC",
                COLUMNS
            ))?;
            stmt.query_map([status.as_str()], from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scheduled_tasks ORDER BY priority DESC, id ASC",
                COLUMNS
            ))?;
            stmt.query_map([], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

/// Move a task to `status`, failing with `TransientStore` if it changed since it was read.
pub fn transition(conn: &Connection, task: &ScheduledTask, status: TaskStatus) -> Result<ScheduledTask> {
    let changed = conn.execute(
        "UPDATE scheduled_tasks SET status = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
        params![status.as_str(), task.id, task.version],
    )?;
    if changed == 0 {
        return Err(PlaneError::TransientStore(format!(
            "scheduled task {} changed concurrently",
            task.id
        )));
    }
    Ok(ScheduledTask {
        status,
        version: task.version + 1,
        ..task.clone()
    })
}

/// Retire every queued task of a work item. Returns how many were retired.
pub fn retire_queued_for(conn: &Connection, work_item_id: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE scheduled_tasks SET status = ?1, version = version + 1 WHERE work_item_id = ?2 AND status = ?3",
        params![TaskStatus::Done.as_str(), work_item_id, TaskStatus::Queued.as_str()],
    )?;
    Ok(changed)
}

/// The task most recently dispatched for a work item, if any.
pub fn latest_running_for(conn: &Connection, work_item_id: i64) -> Result<Option<ScheduledTask>> {
    optional(conn.query_row(
        &format!(
            "SELECT {} FROM scheduled_tasks WHERE work_item_id = ?1 AND status = ?2 ORDER BY id DESC LIMIT 1",
            COLUMNS
        ),
        params![work_item_id, TaskStatus::Running.as_str()],
        from_row,
    ))
}
