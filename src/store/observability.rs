use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use rusqlite::types::Type;

use super::{from_ms, opt_from_ms, optional, parse_column, to_ms};
use crate::domain::{NewStep, RunArtifact, RunStep, RunSummary, StepUpdate};
use crate::error::{PlaneError, Result};

//=== Steps ===

const STEP_COLUMNS: &str = "id, run_id, idx, name, status, duration_seconds, started_at, finished_at";

fn step_from_row(row: &Row<'_>) -> rusqlite::Result<RunStep> {
    Ok(RunStep {
        id: row.get(0)?,
        run_id: row.get(1)?,
        idx: row.get(2)?,
        name: row.get(3)?,
        status: parse_column(row, 4)?,
        duration_seconds: row.get(5)?,
        started_at: from_ms(row.get(6)?),
        finished_at: opt_from_ms(row.get(7)?),
    })
}

/// Append a step; `idx` is the number of steps already recorded for the run.
pub fn insert_step(conn: &Connection, run_id: i64, step: &NewStep, now: DateTime<Utc>) -> Result<RunStep> {
    let idx: i64 = conn.query_row("SELECT COUNT(*) FROM run_steps WHERE run_id = ?1", [run_id], |row| {
        row.get(0)
    })?;
    conn.execute(
        r#"
        INSERT INTO run_steps (run_id, idx, name, status, duration_seconds, started_at, finished_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            run_id,
            idx,
            step.name,
            step.status.as_str(),
            step.effective_duration(),
            to_ms(step.started_at.unwrap_or(now)),
            step.finished_at.map(to_ms)
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_step(conn, id)?.ok_or(PlaneError::not_found("run step", id))
}

pub fn get_step(conn: &Connection, id: i64) -> Result<Option<RunStep>> {
    optional(conn.query_row(
        &format!("SELECT {} FROM run_steps WHERE id = ?1", STEP_COLUMNS),
        [id],
        step_from_row,
    ))
}

pub fn update_step(conn: &Connection, id: i64, update: &StepUpdate) -> Result<RunStep> {
    let mut step = get_step(conn, id)?.ok_or(PlaneError::not_found("run step", id))?;
    if let Some(status) = update.status {
        step.status = status;
    }
    if let Some(finished_at) = update.finished_at {
        step.finished_at = Some(finished_at);
    }
    match update.duration_seconds {
        Some(secs) => step.duration_seconds = Some(secs),
        None if step.duration_seconds.is_none() => {
            step.duration_seconds = step
                .finished_at
                .map(|end| (end - step.started_at).num_milliseconds() as f64 / 1000.0);
        }
        None => {}
    }
    conn.execute(
        "UPDATE run_steps SET status = ?1, duration_seconds = ?2, finished_at = ?3 WHERE id = ?4",
        params![
            step.status.as_str(),
            step.duration_seconds,
            step.finished_at.map(to_ms),
            id
        ],
    )?;
    Ok(step)
}

pub fn list_steps(conn: &Connection, run_id: i64) -> Result<Vec<RunStep>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM run_steps WHERE run_id = ?1 ORDER BY idx, id",
        STEP_COLUMNS
    ))?;
    let rows = stmt.query_map([run_id], step_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

//=== Artifacts ===

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<RunArtifact> {
    Ok(RunArtifact {
        id: row.get(0)?,
        run_id: row.get(1)?,
        name: row.get(2)?,
        media_type: row.get(3)?,
        kind: row.get(4)?,
        size_bytes: row.get(5)?,
        content_base64: row.get(6)?,
    })
}

pub fn insert_artifact(
    conn: &Connection,
    run_id: i64,
    name: &str,
    media_type: Option<&str>,
    kind: &str,
    size_bytes: i64,
    content_base64: &str,
) -> Result<RunArtifact> {
    conn.execute(
        r#"
        INSERT INTO run_artifacts (run_id, name, media_type, kind, size_bytes, content_base64)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![run_id, name, media_type, kind, size_bytes, content_base64],
    )?;
    Ok(RunArtifact {
        id: conn.last_insert_rowid(),
        run_id,
        name: name.to_string(),
        media_type: media_type.map(str::to_string),
        kind: kind.to_string(),
        size_bytes,
        content_base64: content_base64.to_string(),
    })
}

pub fn list_artifacts(conn: &Connection, run_id: i64) -> Result<Vec<RunArtifact>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, run_id, name, media_type, kind, size_bytes, content_base64
        FROM run_artifacts WHERE run_id = ?1 ORDER BY id
        "#,
    )?;
    let rows = stmt.query_map([run_id], artifact_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

//=== Summaries ===

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<RunSummary> {
    Ok(RunSummary {
        id: row.get(0)?,
        run_id: row.get(1)?,
        title: row.get(2)?,
        tags: json_column(row, 3)?,
        data: json_column(row, 4)?.unwrap_or(serde_json::Value::Null),
    })
}

pub fn insert_summary(conn: &Connection, run_id: i64, data: &serde_json::Value) -> Result<RunSummary> {
    let (title, tags) = RunSummary::extract_metadata(data);
    let tags_json = tags.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO run_summaries (run_id, title, tags, data) VALUES (?1, ?2, ?3, ?4)",
        params![run_id, title, tags_json, serde_json::to_string(data)?],
    )?;
    Ok(RunSummary {
        id: conn.last_insert_rowid(),
        run_id,
        title,
        tags,
        data: data.clone(),
    })
}

pub fn list_summaries(conn: &Connection, run_id: i64) -> Result<Vec<RunSummary>> {
    let mut stmt =
        conn.prepare("SELECT id, run_id, title, tags, data FROM run_summaries WHERE run_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map([run_id], summary_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
