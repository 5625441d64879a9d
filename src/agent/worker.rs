//! Agent worker loop: find running runs, claim them, execute their steps.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::blocking;
use super::executor::{ShellExecutor, StepExecutor};
use super::heartbeat::HeartbeatKeeper;
use crate::config::{AgentConfig, LeaseConfig};
use crate::domain::{LeaseToken, NewStep, Run, RunStatus, StepStatus, StepUpdate, TaskStatus};
use crate::error::{PlaneError, Result};
use crate::id::generate_agent_id;
use crate::info::InfoOutcome;
use crate::recipe::{Recipe, Step};
use crate::service::ControlPlane;

/// How an agent's handling of one run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
    /// Left running without completion; the lease will expire
    Abandoned(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: i64,
    pub outcome: RunOutcome,
}

/// A worker process competing with other agents for running runs.
pub struct Agent {
    plane: Arc<ControlPlane>,
    agent_id: String,
    config: AgentConfig,
    lease: LeaseConfig,
    executor: Arc<dyn StepExecutor>,
}

impl Agent {
    /// Build an agent from the plane's `agent` and `lease` config, executing through the shell.
    pub fn new(plane: Arc<ControlPlane>) -> Self {
        let config = plane.config().agent.clone();
        let lease = plane.config().lease.clone();
        let agent_id = config.agent_id.clone().unwrap_or_else(generate_agent_id);
        let executor: Arc<dyn StepExecutor> = Arc::new(ShellExecutor::new(
            config.shell.clone(),
            Duration::from_secs(config.step_timeout_seconds),
        ));
        Self {
            plane,
            agent_id,
            config,
            lease,
            executor,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Poll until `shutdown` flips to true. Returns every run handled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<Vec<RunReport>> {
        log::info!("Agent {} started", self.agent_id);
        let mut handled = Vec::new();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        while !*shutdown.borrow() {
            match self.poll_once(&mut shutdown).await {
                Ok(reports) => handled.extend(reports),
                Err(e) => log::warn!("Agent {} poll failed: {}", self.agent_id, e),
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        log::info!("Agent {} stopped after {} run(s)", self.agent_id, handled.len());
        Ok(handled)
    }

    /// One scan: optionally tick, then claim and execute every claimable running run.
    pub async fn poll_once(&self, shutdown: &mut watch::Receiver<bool>) -> Result<Vec<RunReport>> {
        if self.config.drive_ticks {
            let report = blocking(&self.plane, |plane| plane.tick()).await?;
            if report.processed > 0 {
                log::debug!("Agent {} tick promoted {} task(s)", self.agent_id, report.processed);
            }
        }

        let mut reports = Vec::new();
        let running = blocking(&self.plane, |plane| plane.list_queue_by_status(TaskStatus::Running)).await?;
        for task in running {
            if *shutdown.borrow() {
                break;
            }
            let work_item_id = task.work_item_id;
            let Some(run) = blocking(&self.plane, move |plane| plane.running_run_for(work_item_id)).await? else {
                continue;
            };

            let (run_id, agent_id, ttl) = (run.id, self.agent_id.clone(), self.lease.ttl_seconds);
            let claim = blocking(&self.plane, move |plane| plane.claim_run(run_id, &agent_id, Some(ttl))).await?;
            let Some(token) = claim.token() else {
                log::debug!("Run {} held by {:?}", run.id, claim.claimed_by);
                continue;
            };

            log::info!("Agent {} claimed run {} (epoch {})", self.agent_id, run.id, token.epoch);
            reports.push(self.execute_run(run, token, shutdown).await?);
        }
        Ok(reports)
    }

    async fn execute_run(
        &self,
        run: Run,
        token: LeaseToken,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunReport> {
        let keeper = HeartbeatKeeper::spawn(
            self.plane.clone(),
            run.id,
            token.clone(),
            Duration::from_secs(self.lease.heartbeat_interval_seconds.max(1)),
        );

        let outcome = self.drive(&run, &token, &keeper, shutdown).await;
        keeper.stop().await;

        let outcome = outcome?;
        match &outcome {
            RunOutcome::Abandoned(reason) => log::warn!("Run {} abandoned: {}", run.id, reason),
            RunOutcome::Succeeded | RunOutcome::Failed => {
                let success = outcome == RunOutcome::Succeeded;
                let run_id = run.id;
                let completed = blocking(&self.plane, move |plane| {
                    plane.complete_claimed_run(run_id, success, &token)
                })
                .await;
                match completed {
                    Ok(done) => log::info!(
                        "Run {} completed ({}), work item {} is {}",
                        run.id,
                        done.run.status,
                        done.work_item.id,
                        done.work_item.state
                    ),
                    Err(PlaneError::PreconditionFailed(msg)) => {
                        log::warn!("Run {} not completed: {}", run.id, msg);
                        return Ok(RunReport {
                            run_id: run.id,
                            outcome: RunOutcome::Abandoned(msg),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(RunReport { run_id: run.id, outcome })
    }

    async fn drive(
        &self,
        run: &Run,
        token: &LeaseToken,
        keeper: &HeartbeatKeeper,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        let work_item_id = run.work_item_id;
        let (item, recipe) = blocking(&self.plane, move |plane| {
            let item = plane.get_work_item(work_item_id)?;
            let recipe = plane.recipe_for(item.id)?.unwrap_or_default();
            Ok((item, recipe))
        })
        .await?;
        let steps: Vec<Step> = if recipe.steps().is_empty() {
            Recipe::inferred_steps(&item.title)
        } else {
            recipe.steps().to_vec()
        };

        let mut env = BTreeMap::new();
        if !recipe.requires.is_empty() {
            match self.request_inputs(run.id, &recipe.requires, shutdown).await? {
                InfoOutcome::Resolved(values) => env.extend(values),
                InfoOutcome::Cancelled => {
                    self.log(run.id, vec!["Agent: info request cancelled".to_string()]).await?;
                    return Ok(RunOutcome::Failed);
                }
                InfoOutcome::Shutdown => return Ok(RunOutcome::Abandoned("shutdown while waiting for input".into())),
            }
        }

        for step in &steps {
            if *shutdown.borrow() {
                return Ok(RunOutcome::Abandoned("shutdown between steps".into()));
            }
            if keeper.lease_lost() {
                return Ok(RunOutcome::Abandoned(format!("lease lost by {}", token.agent_id)));
            }
            let run_id = run.id;
            if blocking(&self.plane, move |plane| plane.get_run(run_id)).await?.status != RunStatus::Running {
                return Ok(RunOutcome::Abandoned("run no longer running".into()));
            }
            if !self.run_step(run.id, step, &env).await? {
                return Ok(RunOutcome::Failed);
            }
        }
        Ok(RunOutcome::Succeeded)
    }

    async fn request_inputs(
        &self,
        run_id: i64,
        keys: &[String],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<InfoOutcome> {
        let prompt = format!("Provide values for: {}", keys.join(", "));
        let keys = keys.to_vec();
        let request = blocking(&self.plane, move |plane| plane.create_info_request(run_id, &prompt, &keys)).await?;
        self.log(run_id, vec![format!("Agent: waiting on info request {}", request.id)])
            .await?;
        self.plane
            .wait_for_info(
                request.id,
                Duration::from_millis(self.config.info_poll_interval_ms),
                shutdown,
            )
            .await
    }

    /// Append `lines` to the run log in one blocking call.
    async fn log(&self, run_id: i64, lines: Vec<String>) -> Result<()> {
        blocking(&self.plane, move |plane| {
            lines.iter().try_for_each(|line| plane.append_run_log(run_id, line))
        })
        .await
    }

    /// Execute one step, recording its event and output. Returns whether it succeeded.
    async fn run_step(&self, run_id: i64, step: &Step, env: &BTreeMap<String, String>) -> Result<bool> {
        let command = step.run.clone();
        let record = blocking(&self.plane, move |plane| {
            plane.append_run_log(run_id, &format!("Agent: exec -> {}", command))?;
            plane.add_run_step(
                run_id,
                &NewStep::new(command, StepStatus::Running).started_at(plane.now()),
            )
        })
        .await?;

        let started = Instant::now();
        let result = self.executor.execute(step, env).await;
        let elapsed = started.elapsed().as_secs_f64();

        let mut lines = Vec::new();
        let (status, succeeded) = match &result {
            Ok(output) => {
                lines.extend(output.output.lines().map(str::to_string));
                if output.timed_out {
                    lines.push("Agent: timeout exceeded; killed process".to_string());
                } else {
                    lines.push(format!("Agent: exit code {:?}", output.exit_code));
                }
                let status = if output.success() { StepStatus::Succeeded } else { StepStatus::Failed };
                (status, output.success())
            }
            Err(e) => {
                lines.push(format!("Agent: error: {}", e));
                (StepStatus::Error, false)
            }
        };
        lines.push(format!("Agent: step duration {:.3}s", elapsed));
        self.log(run_id, lines).await?;

        let step_id = record.id;
        blocking(&self.plane, move |plane| {
            plane.update_run_step(
                step_id,
                &StepUpdate {
                    status: Some(status),
                    duration_seconds: Some(elapsed),
                    finished_at: Some(plane.now()),
                },
            )
        })
        .await?;
        Ok(succeeded)
    }
}
