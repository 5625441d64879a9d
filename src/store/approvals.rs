use rusqlite::{Connection, Row, params};

use super::{optional, parse_column};
use crate::domain::{ApprovalRequest, ApprovalStatus};
use crate::error::{PlaneError, Result};

fn from_row(row: &Row<'_>) -> rusqlite::Result<ApprovalRequest> {
    Ok(ApprovalRequest {
        id: row.get(0)?,
        work_item_id: row.get(1)?,
        status: parse_column(row, 2)?,
        reason: row.get(3)?,
    })
}

pub fn insert(conn: &Connection, work_item_id: i64, reason: &str) -> Result<ApprovalRequest> {
    conn.execute(
        "INSERT INTO approval_requests (work_item_id, status, reason) VALUES (?1, ?2, ?3)",
        params![work_item_id, ApprovalStatus::Pending.as_str(), reason],
    )?;
    Ok(ApprovalRequest {
        id: conn.last_insert_rowid(),
        work_item_id,
        status: ApprovalStatus::Pending,
        reason: reason.to_string(),
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<ApprovalRequest>> {
    optional(conn.query_row(
        "SELECT id, work_item_id, status, reason FROM approval_requests WHERE id = ?1",
        [id],
        from_row,
    ))
}

/// The most recent approval request for a work item; only this one counts.
pub fn latest_for(conn: &Connection, work_item_id: i64) -> Result<Option<ApprovalRequest>> {
    optional(conn.query_row(
        r#"
        SELECT id, work_item_id, status, reason FROM approval_requests
        WHERE work_item_id = ?1 ORDER BY id DESC LIMIT 1
        "#,
        [work_item_id],
        from_row,
    ))
}

/// Decide a pending request, replacing the reason when one is given.
/// A request that is already approved or denied stays as it is.
pub fn set_status(conn: &Connection, id: i64, status: ApprovalStatus, reason: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE approval_requests SET status = ?1, reason = COALESCE(?2, reason) WHERE id = ?3 AND status = ?4",
        params![status.as_str(), reason, id, ApprovalStatus::Pending.as_str()],
    )?;
    if changed == 0 {
        return match get(conn, id)? {
            None => Err(PlaneError::not_found("approval request", id)),
            Some(existing) => Err(PlaneError::precondition(format!(
                "approval request {} is already {}",
                id, existing.status
            ))),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, projects, work_items};

    fn pending() -> (Store, ApprovalRequest) {
        let store = Store::open_in_memory().unwrap();
        let request = store
            .write(|tx| {
                let project = projects::insert(tx, "alpha", None)?;
                let item = work_items::insert(tx, project.id, "build", None)?;
                insert(tx, item.id, "needs sign-off")
            })
            .unwrap();
        (store, request)
    }

    #[test]
    fn test_deny_keeps_reason_unless_replaced() {
        let (store, request) = pending();
        store
            .write(|tx| set_status(tx, request.id, ApprovalStatus::Denied, None))
            .unwrap();

        let denied = store.read(|conn| get(conn, request.id)).unwrap().unwrap();
        assert_eq!(denied.status, ApprovalStatus::Denied);
        assert_eq!(denied.reason, "needs sign-off");
    }

    #[test]
    fn test_decided_request_is_not_rewritten() {
        let (store, request) = pending();
        store
            .write(|tx| set_status(tx, request.id, ApprovalStatus::Approved, None))
            .unwrap();

        let err = store
            .write(|tx| set_status(tx, request.id, ApprovalStatus::Denied, Some("late")))
            .unwrap_err();
        assert!(matches!(err, PlaneError::PreconditionFailed(_)));

        let kept = store.read(|conn| get(conn, request.id)).unwrap().unwrap();
        assert_eq!(kept.status, ApprovalStatus::Approved);
        assert_eq!(kept.reason, "needs sign-off");
    }

    #[test]
    fn test_unknown_request_is_not_found() {
        let (store, _) = pending();
        let err = store
            .write(|tx| set_status(tx, 99, ApprovalStatus::Approved, None))
            .unwrap_err();
        assert!(matches!(err, PlaneError::NotFound { .. }));
    }
}
