//! Per-project quota enforcement inside the caller's transaction.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::domain::{QuotaDecision, UsageQuota};
use crate::error::{PlaneError, Result};
use crate::store::{projects, quotas};

/// Consume one run from the project's budget.
///
/// A window reset is persisted even when the attempt is denied. The row
/// write is version-guarded, so concurrent consumers cannot overshoot.
pub fn try_consume(conn: &Connection, project_id: i64, now: DateTime<Utc>) -> Result<QuotaDecision> {
    let mut quota = quotas::get_or_create(conn, project_id, now)?;
    let decision = quota.try_consume(now);
    if decision.allowed || decision.window_reset {
        quotas::save(conn, &quota)?;
    }

    if decision.allowed {
        tracing::debug!(
            project_id,
            remaining = decision.remaining.as_i64(),
            "Quota consumed"
        );
    } else {
        tracing::info!(
            project_id,
            runs_today = quota.runs_today,
            max_runs_per_day = quota.max_runs_per_day,
            "Quota exhausted"
        );
    }
    Ok(decision)
}

/// Set the daily limit; 0 means unlimited.
pub fn set_limit(conn: &Connection, project_id: i64, max_runs_per_day: u32, now: DateTime<Utc>) -> Result<UsageQuota> {
    projects::get(conn, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
    let mut quota = quotas::get_or_create(conn, project_id, now)?;
    quota.max_runs_per_day = max_runs_per_day;
    quotas::save(conn, &quota)
}

pub fn get(conn: &Connection, project_id: i64, now: DateTime<Utc>) -> Result<UsageQuota> {
    projects::get(conn, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
    quotas::get_or_create(conn, project_id, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Remaining;
    use crate::store::Store;
    use chrono::Duration;

    fn setup() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let project_id = store
            .write(|tx| Ok(projects::insert(tx, "alpha", None)?.id))
            .unwrap();
        (store, project_id)
    }

    #[test]
    fn test_limit_denies_without_increment() {
        let (store, project_id) = setup();
        let now = Utc::now();
        store.write(|tx| set_limit(tx, project_id, 2, now)).unwrap();

        let first = store.write(|tx| try_consume(tx, project_id, now)).unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, Remaining::Runs(1));

        let second = store.write(|tx| try_consume(tx, project_id, now)).unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, Remaining::Runs(0));

        let third = store.write(|tx| try_consume(tx, project_id, now)).unwrap();
        assert!(!third.allowed);

        let quota = store.read(|conn| get(conn, project_id, now)).unwrap();
        assert_eq!(quota.runs_today, 2);
    }

    #[test]
    fn test_window_reset_persists_on_consume() {
        let (store, project_id) = setup();
        let start = Utc::now();
        store.write(|tx| set_limit(tx, project_id, 1, start)).unwrap();
        store.write(|tx| try_consume(tx, project_id, start)).unwrap();
        assert!(!store.write(|tx| try_consume(tx, project_id, start)).unwrap().allowed);

        let later = start + Duration::hours(24);
        let decision = store.write(|tx| try_consume(tx, project_id, later)).unwrap();
        assert!(decision.allowed);
        assert!(decision.window_reset);

        let quota = store.read(|conn| get(conn, project_id, later)).unwrap();
        assert_eq!(quota.runs_today, 1);
        assert_eq!(quota.window_start.timestamp_millis(), later.timestamp_millis());
    }

    #[test]
    fn test_unlimited_reports_sentinel() {
        let (store, project_id) = setup();
        let decision = store.write(|tx| try_consume(tx, project_id, Utc::now())).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining.as_i64(), -1);
    }

    #[test]
    fn test_unknown_project_is_not_found() {
        let (store, _) = setup();
        let err = store.write(|tx| set_limit(tx, 99, 1, Utc::now())).unwrap_err();
        assert!(matches!(err, PlaneError::NotFound { kind: "project", id: 99 }));
    }
}
