//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - project / item / approval: backlog management
//! - enqueue / requeue / cancel / tick / queue: scheduler queue
//! - run / quota / info: run lifecycle, leases, quotas and info requests
//! - daemon / agent: long-running tick driver and worker

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runplane - schedules, leases, retries and rate-limits runs of queued work
#[derive(Parser, Debug)]
#[command(name = "runplane")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides storage.db_path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Work item management
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },

    /// Approval requests
    Approval {
        #[command(subcommand)]
        command: ApprovalCommands,
    },

    /// Queue a work item
    #[command(allow_negative_numbers = true)]
    Enqueue {
        work_item_id: i64,

        /// Work item that must be Done first
        #[arg(long)]
        depends_on: Option<i64>,

        /// Higher runs first
        #[arg(short, long, default_value_t = 0)]
        priority: i64,

        /// Seconds before the task becomes eligible
        #[arg(short, long, default_value_t = 0)]
        delay: u64,
    },

    /// Queue a run's work item again
    #[command(allow_negative_numbers = true)]
    Requeue {
        run_id: i64,

        #[arg(short, long, default_value_t = 0)]
        priority: i64,

        #[arg(short, long, default_value_t = 0)]
        delay: u64,

        /// Derive the delay from the failure count
        #[arg(long)]
        backoff: bool,
    },

    /// Cancel a queued task
    Cancel { task_id: i64 },

    /// Run one scheduler tick
    Tick,

    /// List scheduled tasks
    Queue {
        /// Filter by status (queued, running, done)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Run lifecycle and leases
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },

    /// Project usage quotas
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },

    /// Info requests
    Info {
        #[command(subcommand)]
        command: InfoCommands,
    },

    /// Run the background tick driver until Ctrl-C
    Daemon,

    /// Run an agent until Ctrl-C
    Agent {
        /// Agent identifier (generated when omitted)
        #[arg(long)]
        agent_id: Option<String>,

        /// Do not call tick before scanning the queue
        #[arg(long)]
        no_tick: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project
    Create {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List projects
    List,

    /// Record a new vision for a project
    Vision { project_id: i64, content: String },

    /// Propose requirements from the project's latest vision
    Propose { project_id: i64 },

    /// Approve the requirements draft of the project's latest vision
    Approve { project_id: i64 },

    /// Show the requirements draft for a vision
    Requirements { vision_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ItemCommands {
    /// Create a work item
    Create {
        project_id: i64,

        title: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show a work item
    Show { id: i64 },

    /// List a project's work items
    List { project_id: i64 },

    /// List a work item's runs
    Runs { id: i64 },

    /// Override retry policy for a work item
    Policy {
        id: i64,

        #[arg(long)]
        max_retries: Option<u32>,

        #[arg(long)]
        backoff_base: Option<u64>,

        #[arg(long)]
        backoff_jitter: Option<u64>,
    },

    /// Show the tool recipe, or set it from a YAML file
    Recipe {
        id: i64,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Move a work item to another state
    Transition {
        id: i64,

        /// proposed, approved, in-progress, review, done
        state: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ApprovalCommands {
    /// Request approval for a work item
    Request {
        work_item_id: i64,

        #[arg(short, long, default_value = "")]
        reason: String,
    },

    /// Approve a request
    Approve { id: i64 },

    /// Deny a request
    Deny {
        id: i64,

        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// Start a run directly
    Start { work_item_id: i64 },

    /// Complete a run
    Complete {
        run_id: i64,

        /// Report failure instead of success
        #[arg(long)]
        failed: bool,
    },

    /// Claim a running run
    Claim {
        run_id: i64,

        #[arg(short, long)]
        agent: String,

        /// Lease TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Refresh a lease
    Heartbeat {
        run_id: i64,

        #[arg(short, long)]
        agent: String,

        /// Lease epoch returned by claim
        #[arg(long)]
        epoch: Option<i64>,
    },

    /// Print a run's logs
    Logs { run_id: i64 },

    /// List a run's steps
    Steps { run_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum QuotaCommands {
    /// Set max runs per day (0 = unlimited)
    Set { project_id: i64, max_runs_per_day: u32 },

    /// Show a project's quota
    Get { project_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum InfoCommands {
    /// Open an info request on a running run
    Create {
        run_id: i64,

        #[arg(short, long)]
        prompt: String,

        /// Required key (repeatable)
        #[arg(short, long = "key")]
        keys: Vec<String>,
    },

    /// Respond with KEY=VALUE pairs
    Respond { id: i64, values: Vec<String> },

    /// Show a request and, when resolved, its values
    Show { id: i64 },

    /// List a run's info requests
    List { run_id: i64 },

    /// Cancel a pending request
    Cancel { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_with_options() {
        let cli = Cli::parse_from([
            "runplane",
            "enqueue",
            "4",
            "--depends-on",
            "3",
            "--priority",
            "-2",
            "--delay",
            "30",
        ]);
        match cli.command {
            Commands::Enqueue {
                work_item_id,
                depends_on,
                priority,
                delay,
            } => {
                assert_eq!(work_item_id, 4);
                assert_eq!(depends_on, Some(3));
                assert_eq!(priority, -2);
                assert_eq!(delay, 30);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["runplane", "tick", "--db", "/tmp/x.db", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Commands::Tick));
    }

    #[test]
    fn test_info_create_repeated_keys() {
        let cli = Cli::parse_from(["runplane", "info", "create", "7", "-p", "creds", "-k", "A", "-k", "B"]);
        match cli.command {
            Commands::Info {
                command: InfoCommands::Create { run_id, prompt, keys },
            } => {
                assert_eq!(run_id, 7);
                assert_eq!(prompt, "creds");
                assert_eq!(keys, vec!["A", "B"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_quota_rejects_negative() {
        assert!(Cli::try_parse_from(["runplane", "quota", "set", "1", "-5"]).is_err());
    }

    #[test]
    fn test_project_vision_takes_content() {
        let cli = Cli::parse_from(["runplane", "project", "vision", "2", "A shared build cache"]);
        match cli.command {
            Commands::Project {
                command: ProjectCommands::Vision { project_id, content },
            } => {
                assert_eq!(project_id, 2);
                assert_eq!(content, "A shared build cache");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
