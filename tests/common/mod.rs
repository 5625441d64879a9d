//! Shared setup for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use runplane::ControlPlane;
use runplane::clock::{Clock, ManualClock};
use runplane::config::Config;
use runplane::domain::{Project, WorkItem};
use runplane::store::Store;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn config(require_approval: bool) -> Config {
    let mut config = Config::default();
    config.scheduler.require_approval = require_approval;
    config.secrets.secret_key_env = "RUNPLANE_TEST_SECRET_KEY_UNSET".to_string();
    config
}

/// An in-memory plane on a manual clock.
pub struct Harness {
    pub plane: Arc<ControlPlane>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let store = Store::open_in_memory().unwrap();
        let plane = ControlPlane::new(store, config)
            .unwrap()
            .with_clock(clock.clone() as Arc<dyn Clock>);
        Self {
            plane: Arc::new(plane),
            clock,
        }
    }

    pub fn open() -> Self {
        Self::new(config(false))
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    pub fn project(&self, name: &str) -> Project {
        self.plane.create_project(name, None).unwrap()
    }

    pub fn item(&self, project: &Project, title: &str) -> WorkItem {
        self.plane.create_work_item(project.id, title, None).unwrap()
    }
}
