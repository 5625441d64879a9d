//! Info requests, encryption at rest, waiting, and run observability records.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::Harness;
use runplane::PlaneError;
use runplane::crypto::SecretBox;
use runplane::domain::{InfoRequestStatus, NewStep, StepStatus, StepUpdate};
use runplane::info::InfoOutcome;
use tokio::sync::watch;

fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|k| k.to_string()).collect()
}

#[test]
fn test_responses_are_sealed_when_secret_configured() {
    let mut config = common::config(false);
    config.secrets.secret_key = Some("correct horse battery staple".to_string());
    let h = Harness::new(config);
    let project = h.project("secrets");
    let item = h.item(&project, "terraform apply");
    let run = h.plane.start_run(item.id).unwrap();

    let request = h
        .plane
        .create_info_request(run.id, "cloud credentials", &keys(&["AWS_KEY", "AWS_SECRET"]))
        .unwrap();
    assert_eq!(request.status, InfoRequestStatus::Pending);
    assert!(h.plane.info_request_values(request.id).unwrap().is_none());

    let err = h
        .plane
        .respond_info_request(request.id, &values(&[("AWS_KEY", "AKIA")]))
        .unwrap_err();
    assert!(matches!(err, PlaneError::InvalidInput(msg) if msg.contains("AWS_SECRET")));

    let provided = values(&[("AWS_KEY", "AKIA"), ("AWS_SECRET", "hunter2"), ("EXTRA", "x")]);
    let resolved = h.plane.respond_info_request(request.id, &provided).unwrap();
    assert_eq!(resolved.status, InfoRequestStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let stored = resolved.responses.unwrap();
    assert!(SecretBox::is_sealed(&stored));
    assert!(!stored.contains("hunter2"));

    assert_eq!(h.plane.info_request_values(request.id).unwrap(), Some(provided));

    let err = h.plane.cancel_info_request(request.id).unwrap_err();
    assert!(matches!(err, PlaneError::PreconditionFailed(_)));
}

#[test]
fn test_responses_stored_plain_without_secret() {
    let h = Harness::open();
    let project = h.project("plain");
    let item = h.item(&project, "job");
    let run = h.plane.start_run(item.id).unwrap();

    let request = h.plane.create_info_request(run.id, "branch", &keys(&["BRANCH"])).unwrap();
    let resolved = h
        .plane
        .respond_info_request(request.id, &values(&[("BRANCH", "main")]))
        .unwrap();
    assert!(!SecretBox::is_sealed(resolved.responses.as_deref().unwrap()));
    assert_eq!(
        h.plane.info_request_values(request.id).unwrap(),
        Some(values(&[("BRANCH", "main")]))
    );
}

#[test]
fn test_info_request_needs_running_run() {
    let h = Harness::open();
    let project = h.project("done");
    let item = h.item(&project, "job");
    let run = h.plane.start_run(item.id).unwrap();
    h.plane.complete_run(run.id, true).unwrap();

    let err = h.plane.create_info_request(run.id, "late", &keys(&["X"])).unwrap_err();
    assert!(matches!(err, PlaneError::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_wait_for_info_wakes_on_response() {
    let h = Harness::open();
    let project = h.project("wait");
    let item = h.item(&project, "job");
    let run = h.plane.start_run(item.id).unwrap();
    let request = h.plane.create_info_request(run.id, "token", &keys(&["TOKEN"])).unwrap();

    let plane = h.plane.clone();
    let id = request.id;
    let waiter = tokio::spawn(async move {
        let (_tx, mut rx) = watch::channel(false);
        plane.wait_for_info(id, Duration::from_secs(60), &mut rx).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.plane
        .respond_info_request(request.id, &values(&[("TOKEN", "abc")]))
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, InfoOutcome::Resolved(values(&[("TOKEN", "abc")])));
}

#[tokio::test]
async fn test_wait_for_info_cancelled_and_shutdown() {
    let h = Harness::open();
    let project = h.project("cancel");
    let item = h.item(&project, "job");
    let run = h.plane.start_run(item.id).unwrap();

    let cancelled = h.plane.create_info_request(run.id, "a", &keys(&["A"])).unwrap();
    h.plane.cancel_info_request(cancelled.id).unwrap();
    let (tx, mut rx) = watch::channel(false);
    let outcome = h
        .plane
        .wait_for_info(cancelled.id, Duration::from_millis(10), &mut rx)
        .await
        .unwrap();
    assert_eq!(outcome, InfoOutcome::Cancelled);

    let pending = h.plane.create_info_request(run.id, "b", &keys(&["B"])).unwrap();
    tx.send(true).unwrap();
    let outcome = h
        .plane
        .wait_for_info(pending.id, Duration::from_millis(10), &mut rx)
        .await
        .unwrap();
    assert_eq!(outcome, InfoOutcome::Shutdown);
    assert_eq!(h.plane.list_info_requests(run.id).unwrap().len(), 2);
}

#[test]
fn test_steps_artifacts_and_summaries() {
    let h = Harness::open();
    let project = h.project("observe");
    let item = h.item(&project, "job");
    let run = h.plane.start_run(item.id).unwrap();
    let start = h.plane.now();

    let first = h
        .plane
        .add_run_step(run.id, &NewStep::new("checkout", StepStatus::Running).started_at(start))
        .unwrap();
    let second = h
        .plane
        .add_run_step(
            run.id,
            &NewStep::new("lint", StepStatus::Succeeded)
                .started_at(start)
                .finished_at(start + chrono::Duration::milliseconds(2500)),
        )
        .unwrap();
    assert_eq!(first.idx, 0);
    assert_eq!(second.idx, 1);
    assert_eq!(second.duration_seconds, Some(2.5));

    let updated = h
        .plane
        .update_run_step(
            first.id,
            &StepUpdate {
                status: Some(StepStatus::Failed),
                duration_seconds: None,
                finished_at: Some(start + chrono::Duration::seconds(4)),
            },
        )
        .unwrap();
    assert_eq!(updated.status, StepStatus::Failed);
    assert_eq!(updated.duration_seconds, Some(4.0));

    let steps = h.plane.list_run_steps(run.id).unwrap();
    let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["checkout", "lint"]);

    let artifact = h
        .plane
        .add_run_artifact(run.id, "plan.txt", Some("text/plain"), None, "aGVsbG8=")
        .unwrap();
    assert_eq!(artifact.size_bytes, 5);
    assert_eq!(artifact.kind, "file");
    assert!(matches!(
        h.plane.add_run_artifact(run.id, "bad", None, None, "***").unwrap_err(),
        PlaneError::InvalidInput(_)
    ));

    let summary = h
        .plane
        .add_run_summary(
            run.id,
            &serde_json::json!({"title": "Plan", "labels": ["infra", 3, "prod"], "changes": 2}),
        )
        .unwrap();
    assert_eq!(summary.title.as_deref(), Some("Plan"));
    assert_eq!(summary.tags, Some(vec!["infra".to_string(), "prod".to_string()]));
    assert_eq!(h.plane.list_run_summaries(run.id).unwrap().len(), 1);
}
