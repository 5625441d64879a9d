use rusqlite::{Connection, Row, params};

use super::optional;
use crate::domain::Project;
use crate::error::Result;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

pub fn insert(conn: &Connection, name: &str, description: Option<&str>) -> Result<Project> {
    conn.execute(
        "INSERT INTO projects (name, description) VALUES (?1, ?2)",
        params![name, description],
    )?;
    Ok(Project {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        description: description.map(str::to_string),
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Project>> {
    optional(conn.query_row(
        "SELECT id, name, description FROM projects WHERE id = ?1",
        [id],
        from_row,
    ))
}

pub fn list(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM projects ORDER BY id")?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
