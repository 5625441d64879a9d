//! Vision and requirements drafting through the public service.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{Harness, config};
use runplane::domain::{DraftStatus, Project, Vision};
use runplane::planner::RequirementsPlanner;
use runplane::store::Store;
use runplane::{ControlPlane, PlaneError, Result};

/// Writes a fixed draft, or declines when the vision mentions "decline".
struct CountingPlanner {
    calls: AtomicUsize,
}

impl RequirementsPlanner for CountingPlanner {
    fn propose(&self, project: &Project, vision: &Vision) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if vision.content.contains("decline") {
            return Ok(None);
        }
        Ok(Some(format!("{}: ship the cache", project.name)))
    }
}

fn with_planner() -> (Arc<ControlPlane>, Arc<CountingPlanner>) {
    let planner = Arc::new(CountingPlanner {
        calls: AtomicUsize::new(0),
    });
    let plane = ControlPlane::new(Store::open_in_memory().unwrap(), config(false))
        .unwrap()
        .with_planner(planner.clone() as Arc<dyn RequirementsPlanner>);
    (Arc::new(plane), planner)
}

#[test]
fn test_fallback_draft_from_latest_vision() {
    let h = Harness::open();
    let project = h.project("atlas");
    h.plane.create_vision(project.id, "An outdated idea").unwrap();
    let vision = h.plane.create_vision(project.id, "Map every internal service").unwrap();

    let draft = h.plane.propose_requirements(project.id).unwrap();
    assert_eq!(draft.vision_id, vision.id);
    assert_eq!(draft.status, DraftStatus::Proposed);
    assert!(draft.draft.starts_with("Proposed Requirements for project 'atlas':\n"));
    assert!(draft.draft.ends_with("Vision Summary: Map every internal service"));

    assert_eq!(h.plane.get_requirements(vision.id).unwrap(), Some(draft));
    assert_eq!(h.plane.get_vision(vision.id).unwrap(), vision);
}

#[test]
fn test_proposing_twice_returns_existing_draft() {
    let (plane, planner) = with_planner();
    let project = plane.create_project("atlas", None).unwrap();
    plane.create_vision(project.id, "A shared build cache").unwrap();

    let first = plane.propose_requirements(project.id).unwrap();
    assert_eq!(first.draft, "atlas: ship the cache");
    let second = plane.propose_requirements(project.id).unwrap();
    assert_eq!(first, second);
    assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_declining_planner_falls_back() {
    let (plane, planner) = with_planner();
    let project = plane.create_project("atlas", None).unwrap();
    plane.create_vision(project.id, "Planner should decline this").unwrap();

    let draft = plane.propose_requirements(project.id).unwrap();
    assert!(draft.draft.contains("- MVP: implement minimal endpoints and CI."));
    assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_new_vision_gets_its_own_draft() {
    let h = Harness::open();
    let project = h.project("atlas");
    h.plane.create_vision(project.id, "v1").unwrap();
    let first = h.plane.propose_requirements(project.id).unwrap();
    h.plane.approve_requirements(project.id).unwrap();

    let v2 = h.plane.create_vision(project.id, "v2").unwrap();
    let second = h.plane.propose_requirements(project.id).unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.vision_id, v2.id);
    assert_eq!(second.status, DraftStatus::Proposed);
}

#[test]
fn test_approve_requirements() {
    let h = Harness::open();
    let project = h.project("atlas");
    let vision = h.plane.create_vision(project.id, "Map every internal service").unwrap();

    let err = h.plane.approve_requirements(project.id).unwrap_err();
    assert!(matches!(err, PlaneError::NotFound { .. }));

    h.plane.propose_requirements(project.id).unwrap();
    let approved = h.plane.approve_requirements(project.id).unwrap();
    assert_eq!(approved.status, DraftStatus::Approved);
    assert_eq!(
        h.plane.get_requirements(vision.id).unwrap().unwrap().status,
        DraftStatus::Approved
    );
}

#[test]
fn test_missing_project_or_vision() {
    let h = Harness::open();
    assert!(matches!(
        h.plane.create_vision(99, "anything").unwrap_err(),
        PlaneError::NotFound { .. }
    ));
    assert!(matches!(h.plane.get_vision(5).unwrap_err(), PlaneError::NotFound { .. }));
    assert!(matches!(h.plane.get_requirements(5).unwrap_err(), PlaneError::NotFound { .. }));

    let project = h.project("empty");
    assert!(matches!(
        h.plane.propose_requirements(project.id).unwrap_err(),
        PlaneError::NotFound { .. }
    ));
    assert!(matches!(
        h.plane.create_vision(project.id, "   ").unwrap_err(),
        PlaneError::InvalidInput(_)
    ));
}
