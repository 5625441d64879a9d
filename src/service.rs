//! ControlPlane: the service every caller (CLI, driver, agent) goes through.
//!
//! It owns the store, configuration, clock, secret box and info event hub.
//! Each operation is one transaction; operations that race with ticks or
//! other agents retry transient conflicts up to `scheduler.conflict_retries`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::{broadcast, watch};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crypto::SecretBox;
use crate::domain::{
    ApprovalRequest, ApprovalStatus, DraftStatus, InfoRequest, InfoRequestStatus, LeaseToken, NewStep, PolicyUpdate, Project,
    RequirementsDraft, Run, RunArtifact, RunStep, RunSummary, ScheduledTask, StepUpdate, TaskStatus, ToolRecipe,
    UsageQuota, Vision, WorkItem, WorkItemState,
};
use crate::error::{PlaneError, Result};
use crate::info::{InfoEvent, InfoHub, InfoOutcome};
use crate::lease::{self, ClaimOutcome};
use crate::lifecycle::{self, Completion};
use crate::planner::{self, RequirementsPlanner};
use crate::quota;
use crate::recipe::{self, Recipe};
use crate::scheduler::{self, EnqueueRequest, RequeueRequest, TickReport};
use crate::store::{
    Store, approvals, info_requests, observability, projects, quotas, recipes, runs, tasks, visions, work_items,
};

/// Default artifact kind when none is given.
pub const DEFAULT_ARTIFACT_KIND: &str = "file";

pub struct ControlPlane {
    store: Store,
    config: Config,
    clock: Arc<dyn Clock>,
    secrets: Option<SecretBox>,
    info_events: InfoHub,
    planner: Option<Arc<dyn RequirementsPlanner>>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("store", &self.store)
            .field("clock", &self.clock)
            .field("encrypts_responses", &self.secrets.is_some())
            .field("has_planner", &self.planner.is_some())
            .finish()
    }
}

impl ControlPlane {
    /// Build a service over `store` using the system clock and the configured secret.
    pub fn new(store: Store, config: Config) -> Result<Self> {
        let secrets = config.secrets.resolve().map(|key| SecretBox::new(&key)).transpose()?;
        Ok(Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            secrets,
            info_events: InfoHub::new(),
            planner: None,
        })
    }

    /// Open the database named in `config.storage.db_path`.
    pub fn open(config: Config) -> Result<Self> {
        let store = Store::open(&config.storage.db_path)?;
        Self::new(store, config)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Draft requirements with `planner` instead of the fixed outline.
    pub fn with_planner(mut self, planner: Arc<dyn RequirementsPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Encrypt info request responses with `secret` (overrides the configured key).
    pub fn with_secret(mut self, secret: &str) -> Result<Self> {
        self.secrets = Some(SecretBox::new(secret)?);
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn retries(&self) -> u32 {
        self.config.scheduler.conflict_retries
    }

    //=== Projects ===

    /// Create a project together with its (unlimited) usage quota.
    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlaneError::InvalidInput("project name must not be empty".to_string()));
        }
        let now = self.now();
        let project = self.store.write(|tx| {
            let project = projects::insert(tx, name, description)?;
            quotas::insert_unlimited(tx, project.id, now)?;
            Ok(project)
        })?;
        info!("Created project {} ({})", project.id, project.name);
        Ok(project)
    }

    pub fn get_project(&self, id: i64) -> Result<Project> {
        self.store
            .read(|conn| projects::get(conn, id))?
            .ok_or(PlaneError::not_found("project", id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.read(projects::list)
    }

    //=== Visions and requirements ===

    pub fn create_vision(&self, project_id: i64, content: &str) -> Result<Vision> {
        if content.trim().is_empty() {
            return Err(PlaneError::InvalidInput("vision content must not be empty".to_string()));
        }
        let vision = self.store.write(|tx| {
            projects::get(tx, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
            visions::insert_vision(tx, project_id, content)
        })?;
        info!("Recorded vision {} for project {}", vision.id, project_id);
        Ok(vision)
    }

    pub fn get_vision(&self, id: i64) -> Result<Vision> {
        self.store
            .read(|conn| visions::get_vision(conn, id))?
            .ok_or(PlaneError::not_found("vision", id))
    }

    pub fn get_requirements(&self, vision_id: i64) -> Result<Option<RequirementsDraft>> {
        self.store.read(|conn| {
            visions::get_vision(conn, vision_id)?.ok_or(PlaneError::not_found("vision", vision_id))?;
            visions::draft_for_vision(conn, vision_id)
        })
    }

    /// Propose requirements from the project's latest vision.
    ///
    /// An existing draft for that vision is returned unchanged. The planner is
    /// consulted outside the write transaction.
    pub fn propose_requirements(&self, project_id: i64) -> Result<RequirementsDraft> {
        let (project, vision, existing) = self.store.read(|conn| {
            let project = projects::get(conn, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
            let vision = visions::latest_for_project(conn, project_id)?
                .ok_or_else(|| PlaneError::not_found("vision for project", project_id))?;
            let existing = visions::draft_for_vision(conn, vision.id)?;
            Ok((project, vision, existing))
        })?;
        if let Some(draft) = existing {
            debug!("Vision {} already has requirements draft {}", vision.id, draft.id);
            return Ok(draft);
        }

        let proposed = match &self.planner {
            Some(planner) => planner.propose(&project, &vision)?,
            None => None,
        };
        let text = proposed.unwrap_or_else(|| planner::fallback_draft(&project.name, &vision.content));

        let draft = self.store.write(|tx| match visions::draft_for_vision(tx, vision.id)? {
            Some(draft) => Ok(draft),
            None => visions::insert_draft(tx, vision.id, &text),
        })?;
        info!("Proposed requirements draft {} for vision {}", draft.id, vision.id);
        Ok(draft)
    }

    /// Approve the requirements draft of the project's latest vision.
    pub fn approve_requirements(&self, project_id: i64) -> Result<RequirementsDraft> {
        let draft = self.store.write(|tx| {
            projects::get(tx, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
            let vision = visions::latest_for_project(tx, project_id)?
                .ok_or_else(|| PlaneError::not_found("vision for project", project_id))?;
            let draft = visions::draft_for_vision(tx, vision.id)?
                .ok_or_else(|| PlaneError::not_found("requirements draft for vision", vision.id))?;
            visions::set_draft_status(tx, draft.id, DraftStatus::Approved)?;
            Ok(RequirementsDraft {
                status: DraftStatus::Approved,
                ..draft
            })
        })?;
        info!("Approved requirements draft {} for project {}", draft.id, project_id);
        Ok(draft)
    }

    //=== Work items ===

    pub fn create_work_item(&self, project_id: i64, title: &str, description: Option<&str>) -> Result<WorkItem> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PlaneError::InvalidInput("work item title must not be empty".to_string()));
        }
        let item = self.store.write(|tx| {
            projects::get(tx, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
            work_items::insert(tx, project_id, title, description)
        })?;
        info!("Created work item {} in project {}", item.id, project_id);
        Ok(item)
    }

    pub fn get_work_item(&self, id: i64) -> Result<WorkItem> {
        self.store.read(|conn| work_items::require(conn, id))
    }

    pub fn list_work_items(&self, project_id: i64) -> Result<Vec<WorkItem>> {
        self.store.read(|conn| {
            projects::get(conn, project_id)?.ok_or(PlaneError::not_found("project", project_id))?;
            work_items::list_for_project(conn, project_id)
        })
    }

    /// Explicit lifecycle move; forward only, except Review -> InProgress.
    pub fn transition_work_item(&self, id: i64, next: WorkItemState) -> Result<WorkItem> {
        self.store.write(|tx| {
            let item = work_items::require(tx, id)?;
            if !item.state.can_transition_to(next) {
                return Err(PlaneError::precondition(format!(
                    "work item {} cannot move from {} to {}",
                    id, item.state, next
                )));
            }
            work_items::set_state(tx, id, next)?;
            if next == WorkItemState::Done {
                tasks::retire_queued_for(tx, id)?;
            }
            Ok(WorkItem { state: next, ..item })
        })
    }

    /// Update per-item retry overrides; unset fields are left as they are.
    pub fn set_work_item_policy(&self, id: i64, update: &PolicyUpdate) -> Result<WorkItem> {
        self.store.write(|tx| {
            work_items::update_policy(tx, id, update)?;
            work_items::require(tx, id)
        })
    }

    //=== Approvals ===

    pub fn request_approval(&self, work_item_id: i64, reason: &str) -> Result<ApprovalRequest> {
        self.store.write(|tx| {
            work_items::require(tx, work_item_id)?;
            approvals::insert(tx, work_item_id, reason)
        })
    }

    /// Approve a pending request; a Proposed work item moves to Approved.
    pub fn approve(&self, approval_id: i64) -> Result<ApprovalRequest> {
        let approval = self.store.write(|tx| {
            let approval =
                approvals::get(tx, approval_id)?.ok_or(PlaneError::not_found("approval request", approval_id))?;
            approvals::set_status(tx, approval_id, ApprovalStatus::Approved, None)?;
            let item = work_items::require(tx, approval.work_item_id)?;
            if item.state == WorkItemState::Proposed {
                work_items::set_state(tx, item.id, WorkItemState::Approved)?;
            }
            Ok(ApprovalRequest {
                status: ApprovalStatus::Approved,
                ..approval
            })
        })?;
        info!("Approved request {} for work item {}", approval.id, approval.work_item_id);
        Ok(approval)
    }

    pub fn deny(&self, approval_id: i64, reason: Option<&str>) -> Result<ApprovalRequest> {
        self.store.write(|tx| {
            approvals::get(tx, approval_id)?.ok_or(PlaneError::not_found("approval request", approval_id))?;
            approvals::set_status(tx, approval_id, ApprovalStatus::Denied, reason)?;
            approvals::get(tx, approval_id)?.ok_or(PlaneError::not_found("approval request", approval_id))
        })
    }

    pub fn latest_approval(&self, work_item_id: i64) -> Result<Option<ApprovalRequest>> {
        self.store.read(|conn| {
            work_items::require(conn, work_item_id)?;
            approvals::latest_for(conn, work_item_id)
        })
    }

    //=== Queue ===

    pub fn enqueue(&self, req: &EnqueueRequest) -> Result<ScheduledTask> {
        let now = self.now();
        self.store
            .write_with_retry(self.retries(), |tx| scheduler::enqueue(tx, req, now))
    }

    pub fn tick(&self) -> Result<TickReport> {
        scheduler::tick(&self.store, &self.config.scheduler, self.now())
    }

    pub fn list_queue(&self) -> Result<Vec<ScheduledTask>> {
        self.store.read(|conn| tasks::list(conn, None))
    }

    pub fn list_queue_by_status(&self, status: TaskStatus) -> Result<Vec<ScheduledTask>> {
        self.store.read(|conn| tasks::list(conn, Some(status)))
    }

    pub fn cancel_task(&self, task_id: i64) -> Result<ScheduledTask> {
        self.store
            .write_with_retry(self.retries(), |tx| scheduler::cancel(tx, task_id))
    }

    pub fn requeue_run(&self, run_id: i64, req: &RequeueRequest) -> Result<ScheduledTask> {
        let now = self.now();
        self.store.write_with_retry(self.retries(), |tx| {
            scheduler::requeue_run(tx, run_id, req, &self.config.scheduler, now)
        })
    }

    //=== Runs ===

    /// Start a run directly, bypassing the queue.
    ///
    /// Rejected when approval is required and absent, or when the item
    /// already has a running run.
    pub fn start_run(&self, work_item_id: i64) -> Result<Run> {
        let now = self.now();
        let require_approval = self.config.scheduler.require_approval;
        self.store.write(|tx| {
            let item = work_items::require(tx, work_item_id)?;
            if require_approval {
                let approved = approvals::latest_for(tx, item.id)?
                    .is_some_and(|a| a.status == ApprovalStatus::Approved);
                if !approved {
                    return Err(PlaneError::precondition("approval required before starting run"));
                }
            }
            if let Some(running) = runs::latest_running_for(tx, item.id)? {
                return Err(PlaneError::precondition(format!(
                    "work item {} already has running run {}",
                    item.id, running.id
                )));
            }
            lifecycle::start_run_in(tx, &item, now)
        })
    }

    pub fn get_run(&self, run_id: i64) -> Result<Run> {
        self.store.read(|conn| runs::require(conn, run_id))
    }

    pub fn list_runs(&self, work_item_id: i64) -> Result<Vec<Run>> {
        self.store.read(|conn| {
            work_items::require(conn, work_item_id)?;
            runs::list_for_work_item(conn, work_item_id)
        })
    }

    pub fn latest_run(&self, work_item_id: i64) -> Result<Option<Run>> {
        self.store.read(|conn| {
            work_items::require(conn, work_item_id)?;
            runs::latest_for(conn, work_item_id)
        })
    }

    /// The latest run of a work item if it is still running.
    pub fn running_run_for(&self, work_item_id: i64) -> Result<Option<Run>> {
        self.store.read(|conn| runs::latest_running_for(conn, work_item_id))
    }

    /// Complete a run and apply the retry policy on failure.
    pub fn complete_run(&self, run_id: i64, success: bool) -> Result<Completion> {
        self.complete(run_id, success, None)
    }

    /// Complete a run on behalf of a lease holder; rejected if the lease moved on.
    pub fn complete_claimed_run(&self, run_id: i64, success: bool, token: &LeaseToken) -> Result<Completion> {
        self.complete(run_id, success, Some(token))
    }

    fn complete(&self, run_id: i64, success: bool, token: Option<&LeaseToken>) -> Result<Completion> {
        let now = self.now();
        self.store.write_with_retry(self.retries(), |tx| {
            let run = runs::require(tx, run_id)?;
            if let Some(token) = token
                && !lease::token_is_current(&run, &token.agent_id, Some(token))
            {
                return Err(PlaneError::precondition(format!(
                    "lease on run {} is no longer held by {} (epoch {})",
                    run_id, token.agent_id, token.epoch
                )));
            }
            let mut rng = rand::rng();
            lifecycle::complete_run_in(tx, &run, success, now, &self.config.scheduler, &mut rng)
        })
    }

    pub fn append_run_log(&self, run_id: i64, line: &str) -> Result<()> {
        self.store
            .write_with_retry(self.retries(), |tx| runs::append_log(tx, run_id, line))
    }

    //=== Lease ===

    /// Claim a running run; `ttl_seconds` defaults to `lease.ttl_seconds`.
    pub fn claim_run(&self, run_id: i64, agent_id: &str, ttl_seconds: Option<u64>) -> Result<ClaimOutcome> {
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(PlaneError::InvalidInput("agent id must not be empty".to_string()));
        }
        let ttl = ttl_seconds.unwrap_or(self.config.lease.ttl_seconds);
        let now = self.now();
        self.store
            .write_with_retry(self.retries(), |tx| lease::claim_in(tx, run_id, agent_id, ttl, now))
    }

    /// Refresh the lease; returns whether `agent_id` (with `token`, if given) holds it.
    pub fn heartbeat_run(&self, run_id: i64, agent_id: &str, token: Option<&LeaseToken>) -> Result<bool> {
        let now = self.now();
        self.store
            .write_with_retry(self.retries(), |tx| lease::heartbeat_in(tx, run_id, agent_id, token, now))
    }

    //=== Quota ===

    pub fn set_quota(&self, project_id: i64, max_runs_per_day: u32) -> Result<UsageQuota> {
        let now = self.now();
        let quota = self.store.write_with_retry(self.retries(), |tx| {
            quota::set_limit(tx, project_id, max_runs_per_day, now)
        })?;
        info!("Project {} quota set to {} run(s)/day", project_id, max_runs_per_day);
        Ok(quota)
    }

    pub fn get_quota(&self, project_id: i64) -> Result<UsageQuota> {
        let now = self.now();
        self.store.write(|tx| quota::get(tx, project_id, now))
    }

    //=== Tool recipes ===

    /// Store a recipe with its validation outcome. Invalid YAML is stored, not rejected.
    pub fn set_tool_recipe(&self, work_item_id: i64, yaml: &str) -> Result<ToolRecipe> {
        let (valid, error) = match recipe::validate(yaml) {
            Ok(_) => (true, String::new()),
            Err(PlaneError::InvalidInput(msg)) => (false, msg),
            Err(e) => (false, e.to_string()),
        };
        self.store.write(|tx| {
            work_items::require(tx, work_item_id)?;
            recipes::upsert(tx, work_item_id, yaml, valid, &error)
        })
    }

    pub fn get_tool_recipe(&self, work_item_id: i64) -> Result<Option<ToolRecipe>> {
        self.store.read(|conn| {
            work_items::require(conn, work_item_id)?;
            recipes::for_work_item(conn, work_item_id)
        })
    }

    /// The parsed recipe, if one is stored and valid.
    pub fn recipe_for(&self, work_item_id: i64) -> Result<Option<Recipe>> {
        match self.get_tool_recipe(work_item_id)? {
            Some(stored) if stored.valid => Ok(Some(recipe::validate(&stored.yaml)?)),
            _ => Ok(None),
        }
    }

    //=== Info requests ===

    /// Open an info request against a running run.
    pub fn create_info_request(&self, run_id: i64, prompt: &str, required_keys: &[String]) -> Result<InfoRequest> {
        let now = self.now();
        let request = self.store.write(|tx| {
            let run = runs::require(tx, run_id)?;
            if run.status != crate::domain::RunStatus::Running {
                return Err(PlaneError::precondition(format!(
                    "run {} is {}, info requests need a running run",
                    run_id, run.status
                )));
            }
            info_requests::insert(tx, run_id, prompt, required_keys, now)
        })?;
        info!(
            "Info request {} opened for run {} (keys: {})",
            request.id,
            run_id,
            request.required_keys.join(", ")
        );
        Ok(request)
    }

    /// Resolve a pending request. Every required key must be present.
    pub fn respond_info_request(&self, id: i64, values: &BTreeMap<String, String>) -> Result<InfoRequest> {
        let now = self.now();
        let request = self.store.write(|tx| {
            let request = info_requests::require(tx, id)?;
            if request.status != InfoRequestStatus::Pending {
                return Err(PlaneError::precondition(format!(
                    "info request {} is {}, not pending",
                    id, request.status
                )));
            }
            let missing = request.missing_keys(values.keys());
            if !missing.is_empty() {
                return Err(PlaneError::InvalidInput(format!(
                    "missing required keys: {}",
                    missing.join(", ")
                )));
            }

            let plaintext = serde_json::to_string(values)?;
            let stored = match &self.secrets {
                Some(secrets) => secrets.seal(&plaintext)?,
                None => plaintext,
            };
            info_requests::finish(tx, id, InfoRequestStatus::Resolved, Some(&stored), now)
        })?;
        self.info_events.publish(InfoEvent::Resolved { id });
        info!("Info request {} resolved", id);
        Ok(request)
    }

    pub fn cancel_info_request(&self, id: i64) -> Result<InfoRequest> {
        let now = self.now();
        let request = self
            .store
            .write(|tx| info_requests::finish(tx, id, InfoRequestStatus::Cancelled, None, now))?;
        self.info_events.publish(InfoEvent::Cancelled { id });
        info!("Info request {} cancelled", id);
        Ok(request)
    }

    pub fn get_info_request(&self, id: i64) -> Result<InfoRequest> {
        self.store.read(|conn| info_requests::require(conn, id))
    }

    pub fn list_info_requests(&self, run_id: i64) -> Result<Vec<InfoRequest>> {
        self.store.read(|conn| {
            runs::require(conn, run_id)?;
            info_requests::list_for_run(conn, run_id)
        })
    }

    /// Decrypted response values; `None` unless the request is resolved.
    pub fn info_request_values(&self, id: i64) -> Result<Option<BTreeMap<String, String>>> {
        let request = self.get_info_request(id)?;
        self.decode_values(&request)
    }

    /// The outcome of a resolved or cancelled request; `None` while pending.
    fn settled_info(&self, id: i64) -> Result<Option<InfoOutcome>> {
        let request = self.get_info_request(id)?;
        match request.status {
            InfoRequestStatus::Resolved => Ok(Some(InfoOutcome::Resolved(
                self.decode_values(&request)?.unwrap_or_default(),
            ))),
            InfoRequestStatus::Cancelled => Ok(Some(InfoOutcome::Cancelled)),
            InfoRequestStatus::Pending => Ok(None),
        }
    }

    fn decode_values(&self, request: &InfoRequest) -> Result<Option<BTreeMap<String, String>>> {
        if request.status != InfoRequestStatus::Resolved {
            return Ok(None);
        }
        let Some(stored) = request.responses.as_deref() else {
            return Ok(None);
        };
        let plaintext = match (&self.secrets, SecretBox::is_sealed(stored)) {
            (Some(secrets), _) => secrets.open(stored)?,
            (None, true) => {
                return Err(PlaneError::Crypto(format!(
                    "info request {} is encrypted and no secret key is configured",
                    request.id
                )));
            }
            (None, false) => stored.to_string(),
        };
        Ok(Some(serde_json::from_str(&plaintext)?))
    }

    /// Block the calling agent until the request is resolved or cancelled, or
    /// `shutdown` flips to true.
    ///
    /// Wakes on in-process events and also polls the store every
    /// `poll_interval` so responses written by another process are seen.
    /// Store reads run on the blocking pool.
    pub async fn wait_for_info(
        self: &Arc<Self>,
        id: i64,
        poll_interval: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<InfoOutcome> {
        let mut events = self.info_events.subscribe();
        let mut poll = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                return Ok(InfoOutcome::Shutdown);
            }
            let plane = Arc::clone(self);
            let settled = tokio::task::spawn_blocking(move || plane.settled_info(id))
                .await
                .map_err(|e| PlaneError::Storage(format!("info request read aborted: {}", e)))??;
            if let Some(outcome) = settled {
                return Ok(outcome);
            }

            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) if event.id() == id => debug!("Info request {} event: {:?}", id, event),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        poll.tick().await;
                    }
                },
                _ = poll.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(InfoOutcome::Shutdown);
                    }
                }
            }
        }
    }

    //=== Observability ===

    pub fn add_run_step(&self, run_id: i64, step: &NewStep) -> Result<RunStep> {
        let now = self.now();
        self.store.write(|tx| {
            runs::require(tx, run_id)?;
            observability::insert_step(tx, run_id, step, now)
        })
    }

    pub fn update_run_step(&self, step_id: i64, update: &StepUpdate) -> Result<RunStep> {
        self.store.write(|tx| observability::update_step(tx, step_id, update))
    }

    pub fn list_run_steps(&self, run_id: i64) -> Result<Vec<RunStep>> {
        self.store.read(|conn| {
            runs::require(conn, run_id)?;
            observability::list_steps(conn, run_id)
        })
    }

    /// Attach a base64-encoded artifact; its size is that of the decoded bytes.
    pub fn add_run_artifact(
        &self,
        run_id: i64,
        name: &str,
        media_type: Option<&str>,
        kind: Option<&str>,
        content_base64: &str,
    ) -> Result<RunArtifact> {
        let decoded = STANDARD
            .decode(content_base64)
            .map_err(|e| PlaneError::InvalidInput(format!("artifact content is not valid base64: {}", e)))?;
        let kind = kind.filter(|k| !k.is_empty()).unwrap_or(DEFAULT_ARTIFACT_KIND);
        self.store.write(|tx| {
            runs::require(tx, run_id)?;
            observability::insert_artifact(
                tx,
                run_id,
                name,
                media_type,
                kind,
                decoded.len() as i64,
                content_base64,
            )
        })
    }

    pub fn list_run_artifacts(&self, run_id: i64) -> Result<Vec<RunArtifact>> {
        self.store.read(|conn| {
            runs::require(conn, run_id)?;
            observability::list_artifacts(conn, run_id)
        })
    }

    pub fn add_run_summary(&self, run_id: i64, data: &serde_json::Value) -> Result<RunSummary> {
        self.store.write(|tx| {
            runs::require(tx, run_id)?;
            observability::insert_summary(tx, run_id, data)
        })
    }

    pub fn list_run_summaries(&self, run_id: i64) -> Result<Vec<RunSummary>> {
        self.store.read(|conn| {
            runs::require(conn, run_id)?;
            observability::list_summaries(conn, run_id)
        })
    }
}
