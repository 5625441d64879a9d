use rusqlite::{Connection, Row, params};

use super::optional;
use crate::domain::ToolRecipe;
use crate::error::{PlaneError, Result};

fn from_row(row: &Row<'_>) -> rusqlite::Result<ToolRecipe> {
    Ok(ToolRecipe {
        id: row.get(0)?,
        work_item_id: row.get(1)?,
        yaml: row.get(2)?,
        valid: row.get(3)?,
        error: row.get(4)?,
    })
}

pub fn for_work_item(conn: &Connection, work_item_id: i64) -> Result<Option<ToolRecipe>> {
    optional(conn.query_row(
        "SELECT id, work_item_id, yaml, valid, error FROM tool_recipes WHERE work_item_id = ?1",
        [work_item_id],
        from_row,
    ))
}

/// Insert or replace the recipe attached to a work item.
pub fn upsert(conn: &Connection, work_item_id: i64, yaml: &str, valid: bool, error: &str) -> Result<ToolRecipe> {
    conn.execute(
        r#"
        INSERT INTO tool_recipes (work_item_id, yaml, valid, error) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(work_item_id) DO UPDATE SET yaml = excluded.yaml, valid = excluded.valid, error = excluded.error
        "#,
        params![work_item_id, yaml, valid, error],
    )?;
    for_work_item(conn, work_item_id)?.ok_or(PlaneError::not_found("tool recipe", work_item_id))
}
