use rusqlite::{Connection, Row, params};

use super::{optional, parse_column};
use crate::domain::{DraftStatus, RequirementsDraft, Vision};
use crate::error::{PlaneError, Result};

fn vision_from_row(row: &Row<'_>) -> rusqlite::Result<Vision> {
    Ok(Vision {
        id: row.get(0)?,
        project_id: row.get(1)?,
        content: row.get(2)?,
    })
}

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<RequirementsDraft> {
    Ok(RequirementsDraft {
        id: row.get(0)?,
        vision_id: row.get(1)?,
        draft: row.get(2)?,
        status: parse_column(row, 3)?,
    })
}

pub fn insert_vision(conn: &Connection, project_id: i64, content: &str) -> Result<Vision> {
    conn.execute(
        "INSERT INTO visions (project_id, content) VALUES (?1, ?2)",
        params![project_id, content],
    )?;
    Ok(Vision {
        id: conn.last_insert_rowid(),
        project_id,
        content: content.to_string(),
    })
}

pub fn get_vision(conn: &Connection, id: i64) -> Result<Option<Vision>> {
    optional(conn.query_row(
        "SELECT id, project_id, content FROM visions WHERE id = ?1",
        [id],
        vision_from_row,
    ))
}

/// The project's most recently created vision.
pub fn latest_for_project(conn: &Connection, project_id: i64) -> Result<Option<Vision>> {
    optional(conn.query_row(
        "SELECT id, project_id, content FROM visions WHERE project_id = ?1 ORDER BY id DESC LIMIT 1",
        [project_id],
        vision_from_row,
    ))
}

pub fn insert_draft(conn: &Connection, vision_id: i64, draft: &str) -> Result<RequirementsDraft> {
    conn.execute(
        "INSERT INTO requirements_drafts (vision_id, draft, status) VALUES (?1, ?2, ?3)",
        params![vision_id, draft, DraftStatus::Proposed.as_str()],
    )?;
    Ok(RequirementsDraft {
        id: conn.last_insert_rowid(),
        vision_id,
        draft: draft.to_string(),
        status: DraftStatus::Proposed,
    })
}

pub fn draft_for_vision(conn: &Connection, vision_id: i64) -> Result<Option<RequirementsDraft>> {
    optional(conn.query_row(
        "SELECT id, vision_id, draft, status FROM requirements_drafts WHERE vision_id = ?1",
        [vision_id],
        draft_from_row,
    ))
}

pub fn set_draft_status(conn: &Connection, id: i64, status: DraftStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE requirements_drafts SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(PlaneError::not_found("requirements draft", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, projects};

    #[test]
    fn test_latest_vision_wins() {
        let store = Store::open_in_memory().unwrap();
        let (first, second) = store
            .write(|tx| {
                let project = projects::insert(tx, "alpha", None)?;
                let first = insert_vision(tx, project.id, "a tool")?;
                let second = insert_vision(tx, project.id, "a better tool")?;
                Ok((first, second))
            })
            .unwrap();

        let latest = store
            .read(|conn| latest_for_project(conn, first.project_id))
            .unwrap()
            .unwrap();
        assert_eq!(latest, second);
    }

    #[test]
    fn test_one_draft_per_vision() {
        let store = Store::open_in_memory().unwrap();
        let vision = store
            .write(|tx| {
                let project = projects::insert(tx, "alpha", None)?;
                insert_vision(tx, project.id, "a tool")
            })
            .unwrap();

        store.write(|tx| insert_draft(tx, vision.id, "first")).unwrap();
        let err = store.write(|tx| insert_draft(tx, vision.id, "second")).unwrap_err();
        assert!(matches!(err, PlaneError::AlreadyExists(_)));

        let draft = store.read(|conn| draft_for_vision(conn, vision.id)).unwrap().unwrap();
        assert_eq!(draft.draft, "first");
        assert_eq!(draft.status, DraftStatus::Proposed);
    }
}
