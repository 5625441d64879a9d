use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{ApprovalCommands, Commands, InfoCommands, ItemCommands, ProjectCommands, QuotaCommands, RunCommands};
use runplane::agent::{Agent, RunOutcome};
use runplane::config::Config;
use runplane::domain::{LeaseToken, PolicyUpdate, TaskStatus, WorkItemState};
use runplane::scheduler::{EnqueueRequest, RequeueRequest, TickDriver};
use runplane::ControlPlane;

/// Interval the daemon falls back to when `scheduler.tick_interval_ms` is 0.
const DAEMON_TICK_INTERVAL_MS: u64 = 1000;

fn setup_logging(default_level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runplane")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("runplane.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env = env_logger::Env::default().default_filter_or(default_level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, mut config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    if let Some(db) = &cli.db {
        config.storage.db_path = db.clone();
    }

    match &cli.command {
        Commands::Daemon => return run_daemon(config),
        Commands::Agent { agent_id, no_tick } => {
            if *no_tick {
                config.agent.drive_ticks = false;
            }
            return run_agent(config, agent_id.clone());
        }
        _ => {}
    }

    let plane = open_plane(config)?;
    match &cli.command {
        Commands::Project { command } => handle_project_command(&plane, command),
        Commands::Item { command } => handle_item_command(&plane, command),
        Commands::Approval { command } => handle_approval_command(&plane, command),
        Commands::Enqueue {
            work_item_id,
            depends_on,
            priority,
            delay,
        } => {
            let mut req = EnqueueRequest::new(*work_item_id).priority(*priority).delay_seconds(*delay);
            if let Some(dep) = depends_on {
                req = req.depends_on(*dep);
            }
            let task = plane.enqueue(&req)?;
            println!(
                "{} task {} for work item {} (priority {}, at {})",
                "Queued:".green(),
                task.id,
                task.work_item_id,
                task.priority,
                task.scheduled_for
            );
            Ok(())
        }
        Commands::Requeue {
            run_id,
            priority,
            delay,
            backoff,
        } => {
            let task = plane.requeue_run(
                *run_id,
                &RequeueRequest {
                    priority: *priority,
                    delay_seconds: *delay,
                    backoff: *backoff,
                },
            )?;
            println!("{} task {} at {}", "Requeued:".green(), task.id, task.scheduled_for);
            Ok(())
        }
        Commands::Cancel { task_id } => {
            let task = plane.cancel_task(*task_id)?;
            println!("{} task {} is {}", "Cancelled:".red(), task.id, task.status);
            Ok(())
        }
        Commands::Tick => {
            let report = plane.tick()?;
            println!("{} {} task(s) promoted", "Tick:".cyan(), report.processed);
            for (task_id, run) in &report.started {
                println!("  task {} -> run {} (work item {})", task_id, run.id, run.work_item_id);
            }
            if cli.is_verbose() {
                for (task_id, reason) in &report.skipped {
                    println!("  task {} skipped: {}", task_id, reason.to_string().dimmed());
                }
            }
            Ok(())
        }
        Commands::Queue { status } => {
            let tasks = match status {
                Some(s) => plane.list_queue_by_status(s.parse::<TaskStatus>()?)?,
                None => plane.list_queue()?,
            };
            if tasks.is_empty() {
                println!("{}", "Queue is empty".dimmed());
            }
            for task in tasks {
                let dep = task
                    .depends_on_work_item_id
                    .map(|d| format!(" after {}", d))
                    .unwrap_or_default();
                println!(
                    "{:>5}  {:<8} item {:<5} prio {:<4} {}{}",
                    task.id,
                    task.status.to_string(),
                    task.work_item_id,
                    task.priority,
                    task.scheduled_for,
                    dep
                );
            }
            Ok(())
        }
        Commands::Run { command } => handle_run_command(&plane, command),
        Commands::Quota { command } => handle_quota_command(&plane, command),
        Commands::Info { command } => handle_info_command(&plane, command),
        Commands::Daemon | Commands::Agent { .. } => Ok(()),
    }
}

fn open_plane(config: Config) -> Result<ControlPlane> {
    let db_path = config.storage.db_path.clone();
    let plane = ControlPlane::open(config).context(format!("Failed to open database {}", db_path.display()))?;
    Ok(plane)
}

fn handle_project_command(plane: &ControlPlane, command: &ProjectCommands) -> Result<()> {
    info!("Handling project command: {:?}", command);
    match command {
        ProjectCommands::Create { name, description } => {
            let project = plane.create_project(name, description.as_deref())?;
            println!("{} project {} ({})", "Created:".green(), project.id, project.name);
        }
        ProjectCommands::List => {
            for project in plane.list_projects()? {
                println!(
                    "{:>5}  {}  {}",
                    project.id,
                    project.name.bold(),
                    project.description.unwrap_or_default().dimmed()
                );
            }
        }
        ProjectCommands::Vision { project_id, content } => {
            let vision = plane.create_vision(*project_id, content)?;
            println!("{} vision {} for project {}", "Recorded:".green(), vision.id, vision.project_id);
        }
        ProjectCommands::Propose { project_id } => {
            let draft = plane.propose_requirements(*project_id)?;
            println!("{} draft {} [{}]", "Requirements:".green(), draft.id, draft.status);
            println!("{}", draft.draft);
        }
        ProjectCommands::Approve { project_id } => {
            let draft = plane.approve_requirements(*project_id)?;
            println!("{} draft {} for vision {}", "Approved:".green(), draft.id, draft.vision_id);
        }
        ProjectCommands::Requirements { vision_id } => match plane.get_requirements(*vision_id)? {
            Some(draft) => {
                println!("{} [{}]", draft.id.to_string().bold(), draft.status);
                println!("{}", draft.draft);
            }
            None => println!("{}", "No requirements proposed yet".yellow()),
        },
    }
    Ok(())
}

fn handle_item_command(plane: &ControlPlane, command: &ItemCommands) -> Result<()> {
    info!("Handling item command: {:?}", command);
    match command {
        ItemCommands::Create {
            project_id,
            title,
            description,
        } => {
            let item = plane.create_work_item(*project_id, title, description.as_deref())?;
            println!("{} work item {} [{}]", "Created:".green(), item.id, item.state);
        }
        ItemCommands::Show { id } => {
            let item = plane.get_work_item(*id)?;
            println!("{} {}", item.id.to_string().bold(), item.title);
            println!("  state:    {}", item.state);
            println!("  project:  {}", item.project_id);
            if let Some(d) = &item.description {
                println!("  about:    {}", d);
            }
            if let Some(approval) = plane.latest_approval(item.id)? {
                println!("  approval: {} ({})", approval.status, approval.id);
            }
            if let Some(run) = plane.latest_run(item.id)? {
                println!("  last run: {} {}", run.id, run.status);
            }
            if let Some(recipe) = plane.get_tool_recipe(item.id)? {
                println!("  recipe:   {}", recipe.status_str());
            }
        }
        ItemCommands::List { project_id } => {
            for item in plane.list_work_items(*project_id)? {
                println!("{:>5}  {:<12} {}", item.id, item.state.to_string(), item.title);
            }
        }
        ItemCommands::Runs { id } => {
            for run in plane.list_runs(*id)? {
                println!(
                    "{:>5}  {:<9} started {}  holder {}",
                    run.id,
                    run.status.to_string(),
                    run.started_at,
                    run.claimed_by.unwrap_or_else(|| "-".to_string())
                );
            }
        }
        ItemCommands::Policy {
            id,
            max_retries,
            backoff_base,
            backoff_jitter,
        } => {
            let item = plane.set_work_item_policy(
                *id,
                &PolicyUpdate {
                    max_retries: *max_retries,
                    backoff_base_seconds: *backoff_base,
                    backoff_jitter_seconds: *backoff_jitter,
                },
            )?;
            println!(
                "{} work item {}: retries {:?}, base {:?}s, jitter {:?}s",
                "Updated:".green(),
                item.id,
                item.max_retries,
                item.backoff_base_seconds,
                item.backoff_jitter_seconds
            );
        }
        ItemCommands::Recipe { id, file } => match file {
            Some(path) => {
                let yaml = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
                let recipe = plane.set_tool_recipe(*id, &yaml)?;
                if recipe.valid {
                    println!("{} recipe for work item {}", "Saved:".green(), id);
                } else {
                    println!("{} recipe saved but invalid: {}", "Warning:".yellow(), recipe.error);
                }
            }
            None => match plane.get_tool_recipe(*id)? {
                Some(recipe) => {
                    println!("# {}", recipe.status_str());
                    if !recipe.error.is_empty() {
                        println!("# {}", recipe.error);
                    }
                    print!("{}", recipe.yaml);
                }
                None => println!("{}", "No recipe".dimmed()),
            },
        },
        ItemCommands::Transition { id, state } => {
            let next: WorkItemState = state.parse()?;
            let item = plane.transition_work_item(*id, next)?;
            println!("{} work item {} is {}", "Moved:".green(), item.id, item.state);
        }
    }
    Ok(())
}

fn handle_approval_command(plane: &ControlPlane, command: &ApprovalCommands) -> Result<()> {
    info!("Handling approval command: {:?}", command);
    match command {
        ApprovalCommands::Request { work_item_id, reason } => {
            let approval = plane.request_approval(*work_item_id, reason)?;
            println!("{} approval {} for work item {}", "Requested:".green(), approval.id, work_item_id);
        }
        ApprovalCommands::Approve { id } => {
            let approval = plane.approve(*id)?;
            println!("{} approval {}", "Approved:".green(), approval.id);
        }
        ApprovalCommands::Deny { id, reason } => {
            let approval = plane.deny(*id, reason.as_deref())?;
            println!("{} approval {}", "Denied:".red(), approval.id);
        }
    }
    Ok(())
}

fn handle_run_command(plane: &ControlPlane, command: &RunCommands) -> Result<()> {
    info!("Handling run command: {:?}", command);
    match command {
        RunCommands::Start { work_item_id } => {
            let run = plane.start_run(*work_item_id)?;
            println!(
                "{} run {} (trace {})",
                "Started:".green(),
                run.id,
                run.trace_id.unwrap_or_default()
            );
        }
        RunCommands::Complete { run_id, failed } => {
            let done = plane.complete_run(*run_id, !failed)?;
            let status = if *failed { "failed".red() } else { "succeeded".green() };
            println!("Run {} {}; work item {} is {}", run_id, status, done.work_item.id, done.work_item.state);
            if let Some(task) = done.retry {
                println!("  retry {} queued for {}", task.id, task.scheduled_for);
            }
        }
        RunCommands::Claim { run_id, agent, ttl } => {
            let claim = plane.claim_run(*run_id, agent, *ttl)?;
            if claim.success {
                println!(
                    "{} run {} by {} (epoch {}, expires in {}s)",
                    "Claimed:".green(),
                    run_id,
                    agent,
                    claim.epoch,
                    claim.expires_in
                );
            } else {
                println!(
                    "{} run {} held by {}",
                    "Not claimed:".yellow(),
                    run_id,
                    claim.claimed_by.unwrap_or_else(|| "nobody".to_string())
                );
            }
        }
        RunCommands::Heartbeat { run_id, agent, epoch } => {
            let token = epoch.map(|e| LeaseToken::new(agent.clone(), e));
            if plane.heartbeat_run(*run_id, agent, token.as_ref())? {
                println!("{} run {}", "Heartbeat:".green(), run_id);
            } else {
                println!("{} {} does not hold run {}", "Rejected:".red(), agent, run_id);
            }
        }
        RunCommands::Logs { run_id } => {
            print!("{}", plane.get_run(*run_id)?.logs);
        }
        RunCommands::Steps { run_id } => {
            for step in plane.list_run_steps(*run_id)? {
                let duration = step
                    .duration_seconds
                    .map(|d| format!("{:.3}s", d))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>3}  {:<9} {:>9}  {}", step.idx, step.status.to_string(), duration, step.name);
            }
            for artifact in plane.list_run_artifacts(*run_id)? {
                println!("  artifact {} ({}, {} bytes)", artifact.name, artifact.kind, artifact.size_bytes);
            }
        }
    }
    Ok(())
}

fn handle_quota_command(plane: &ControlPlane, command: &QuotaCommands) -> Result<()> {
    info!("Handling quota command: {:?}", command);
    let quota = match command {
        QuotaCommands::Set {
            project_id,
            max_runs_per_day,
        } => plane.set_quota(*project_id, *max_runs_per_day)?,
        QuotaCommands::Get { project_id } => plane.get_quota(*project_id)?,
    };
    let max = if quota.is_unlimited() {
        "unlimited".to_string()
    } else {
        quota.max_runs_per_day.to_string()
    };
    println!(
        "Project {}: {} used of {} (window from {})",
        quota.project_id, quota.runs_today, max, quota.window_start
    );
    Ok(())
}

fn handle_info_command(plane: &ControlPlane, command: &InfoCommands) -> Result<()> {
    info!("Handling info command: {:?}", command);
    match command {
        InfoCommands::Create { run_id, prompt, keys } => {
            let request = plane.create_info_request(*run_id, prompt, keys)?;
            println!("{} info request {} ({})", "Opened:".green(), request.id, keys.join(", "));
        }
        InfoCommands::Respond { id, values } => {
            let values = parse_pairs(values)?;
            let request = plane.respond_info_request(*id, &values)?;
            println!("{} info request {}", "Resolved:".green(), request.id);
        }
        InfoCommands::Show { id } => {
            let request = plane.get_info_request(*id)?;
            println!("{} [{}] {}", request.id, request.status, request.prompt);
            println!("  keys: {}", request.required_keys.join(", "));
            if let Some(values) = plane.info_request_values(*id)? {
                for (key, value) in values {
                    println!("  {}={}", key, value);
                }
            }
        }
        InfoCommands::List { run_id } => {
            for request in plane.list_info_requests(*run_id)? {
                println!("{:>5}  {:<9} {}", request.id, request.status.to_string(), request.prompt);
            }
        }
        InfoCommands::Cancel { id } => {
            let request = plane.cancel_info_request(*id)?;
            println!("{} info request {}", "Cancelled:".red(), request.id);
        }
    }
    Ok(())
}

fn parse_pairs(values: &[String]) -> Result<BTreeMap<String, String>> {
    values
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => eyre::bail!("expected KEY=VALUE, got '{}'", pair),
        })
        .collect()
}

async fn shutdown_on_ctrl_c(tx: tokio::sync::watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutdown requested");
    let _ = tx.send(true);
}

fn run_daemon(mut config: Config) -> Result<()> {
    if config.scheduler.tick_interval_ms == 0 {
        config.scheduler.tick_interval_ms = DAEMON_TICK_INTERVAL_MS;
    }
    let plane = Arc::new(open_plane(config)?);
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let Some(driver) = TickDriver::spawn(plane.clone()) else {
            eyre::bail!("tick interval resolved to 0");
        };
        println!(
            "{} ticking every {}ms (Ctrl-C to stop)",
            "Daemon:".cyan(),
            plane.config().scheduler.tick_interval_ms
        );
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
        }
        let ticks = driver.stop().await;
        println!("{} after {} tick(s)", "Stopped".yellow(), ticks);
        Ok::<(), eyre::Report>(())
    })
}

fn run_agent(config: Config, agent_id: Option<String>) -> Result<()> {
    let plane = Arc::new(open_plane(config)?);
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let mut agent = Agent::new(plane);
        if let Some(id) = agent_id {
            agent = agent.with_agent_id(id);
        }
        println!("{} {} polling (Ctrl-C to stop)", "Agent:".cyan(), agent.agent_id());

        let (tx, rx) = tokio::sync::watch::channel(false);
        tokio::spawn(shutdown_on_ctrl_c(tx));
        let reports = agent.run(rx).await?;

        for report in reports {
            let outcome = match report.outcome {
                RunOutcome::Succeeded => "succeeded".green(),
                RunOutcome::Failed => "failed".red(),
                RunOutcome::Abandoned(reason) => format!("abandoned: {}", reason).yellow(),
            };
            println!("  run {} {}", report.run_id, outcome);
        }
        Ok::<(), eyre::Report>(())
    })
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).context("Application failed")?;

    Ok(())
}
