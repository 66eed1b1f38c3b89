//! jobq CLI - submit shell-command jobs to a local persistent queue and run
//! the workers that execute them.

mod worker_cmd;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tabled::{Table, Tabled};

use jobq_core::domain::{Job, JobState};
use jobq_core::port::job_store::EnqueueRequest;
use jobq_core::port::JobStore;
use jobq_infra_store::{paths, FileConfigStore, FileJobStore};

#[derive(Parser)]
#[command(name = "jobq")]
#[command(about = "Local persistent background job queue", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job
    Enqueue {
        /// Shell command to execute
        #[arg(short, long)]
        command: Option<String>,

        /// Job id (generated when omitted)
        #[arg(short, long)]
        id: Option<String>,

        /// Attempts before the job is parked in the DLQ
        #[arg(short = 'r', long)]
        max_retries: Option<u32>,

        /// Priority, 1 (highest) to 5 (lowest)
        #[arg(short, long)]
        priority: Option<u8>,

        /// Per-attempt timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Prompt for the fields instead of flags
        #[arg(long)]
        interactive: bool,
    },

    /// Shorthand for enqueue: jobq add "tar czf backup.tgz ."
    Add {
        /// Shell command to execute
        command: String,

        #[arg(short = 'r', long)]
        max_retries: Option<u32>,

        #[arg(short, long)]
        priority: Option<u8>,
    },

    /// Manage worker loops
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },

    /// Per-state job counts plus worker liveness
    Status,

    /// Completion metrics
    Metrics,

    /// List jobs, newest first
    List {
        /// Filter by state (pending, processing, failed, completed, dead, cancelled)
        #[arg(long)]
        state: Option<String>,
    },

    /// Cancel a pending, failed, or dead job
    Cancel {
        job_id: String,
    },

    /// Dead Letter Queue operations
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Queue configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Run worker loops in the foreground until SIGINT/SIGTERM
    Start {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 1)]
        count: usize,
    },

    /// Signal the running worker process to shut down gracefully
    Stop,
}

#[derive(Subcommand)]
enum DlqCommands {
    /// Show dead jobs, newest first
    List,

    /// Revive a dead job back onto the queue
    Retry {
        job_id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set a tunable (max-retries, backoff-base)
    Set {
        key: String,
        value: String,
    },

    /// Print one tunable
    Get {
        key: String,
    },

    /// Print all tunables
    List,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "PRI")]
    priority: u8,
    #[tabled(rename = "ATTEMPTS")]
    attempts: String,
    #[tabled(rename = "CREATED")]
    created: String,
    #[tabled(rename = "COMMAND")]
    command: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state.to_string(),
            priority: job.priority,
            attempts: format!("{}/{}", job.attempts, job.max_retries),
            created: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            command: truncate(&job.command, 48),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

fn init_logging() {
    // LOG_LEVEL ∈ {DEBUG, INFO, WARN, ERROR}, default INFO.
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(level.to_lowercase())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(data_dir: &Path) -> Result<Arc<dyn JobStore>> {
    Ok(Arc::new(FileJobStore::open(data_dir)?))
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("{} {e}", "error:".red().bold());
        for cause in e.chain().skip(1) {
            eprintln!("  {} {cause}", "caused by:".red());
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = paths::data_dir();

    match cli.command {
        Commands::Enqueue {
            command,
            id,
            max_retries,
            priority,
            timeout,
            interactive,
        } => {
            let request = if interactive {
                prompt_enqueue()?
            } else {
                EnqueueRequest {
                    command: command
                        .context("either --command or --interactive is required")?,
                    id,
                    priority,
                    max_retries,
                    timeout_ms: timeout,
                }
            };

            let job = open_store(&data_dir)?.enqueue(request).await?;
            println!("{}", "✓ Job enqueued".green().bold());
            print_job(&job);
        }

        Commands::Add {
            command,
            max_retries,
            priority,
        } => {
            let job = open_store(&data_dir)?
                .enqueue(EnqueueRequest {
                    command,
                    priority,
                    max_retries,
                    ..Default::default()
                })
                .await?;
            println!("{} {}", "✓ Job enqueued".green().bold(), job.id);
        }

        Commands::Worker { command } => match command {
            WorkerCommands::Start { count } => worker_cmd::start(&data_dir, count).await?,
            WorkerCommands::Stop => worker_cmd::stop(&data_dir)?,
        },

        Commands::Status => {
            let summary = open_store(&data_dir)?.status().await?;

            println!("{}", "Queue Status".cyan().bold());
            println!();
            println!("  {} {}", "pending:".bold(), summary.pending);
            println!("  {} {}", "processing:".bold(), summary.processing);
            println!("  {} {}", "failed:".bold(), summary.failed);
            println!("  {} {}", "completed:".bold(), summary.completed.to_string().green());
            println!("  {} {}", "dead:".bold(), summary.dead.to_string().red());
            println!("  {} {}", "cancelled:".bold(), summary.cancelled);
            println!("  {} {}", "total:".bold(), summary.total());
            println!();

            match worker_cmd::running_worker(&data_dir) {
                Some(pid) => println!(
                    "  {} {} (pid {pid})",
                    "workers:".bold(),
                    "RUNNING".green()
                ),
                None => println!("  {} {}", "workers:".bold(), "STOPPED".yellow()),
            }
        }

        Commands::Metrics => {
            let metrics = open_store(&data_dir)?.metrics().await?;

            println!("{}", "Queue Metrics".cyan().bold());
            println!();
            println!("  {} {}", "total jobs:".bold(), metrics.total);
            println!("  {} {}", "completed:".bold(), metrics.completed);
            println!(
                "  {} {:.1}%",
                "success rate:".bold(),
                metrics.success_rate * 100.0
            );
            println!(
                "  {} {:.0} ms",
                "avg completion:".bold(),
                metrics.avg_completion_ms
            );
        }

        Commands::List { state } => {
            let state = state
                .map(|s| s.parse::<JobState>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;

            let jobs = open_store(&data_dir)?.list(state).await?;
            if jobs.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Cancel { job_id } => {
            let job = open_store(&data_dir)?.cancel(&job_id).await?;
            println!("{}", format!("✓ Job {} cancelled", job.id).green().bold());
        }

        Commands::Dlq { command } => match command {
            DlqCommands::List => {
                let jobs = open_store(&data_dir)?.list_dlq().await?;
                if jobs.is_empty() {
                    println!("{}", "DLQ is empty".green());
                } else {
                    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                    println!("{}", Table::new(rows));
                    for job in &jobs {
                        if let Some(error) = &job.error {
                            println!("  {} {}: {}", "✗".red(), job.id, error);
                        }
                    }
                }
            }
            DlqCommands::Retry { job_id } => {
                let job = open_store(&data_dir)?.retry_from_dlq(&job_id).await?;
                println!(
                    "{}",
                    format!("✓ Job {} requeued from DLQ", job.id).green().bold()
                );
            }
        },

        Commands::Config { command } => {
            let store = FileConfigStore::open(&data_dir)?;
            match command {
                ConfigCommands::Set { key, value } => {
                    let value: f64 = value.parse().with_context(|| {
                        format!("config value must be a number, got '{value}'")
                    })?;
                    store.set(&key, value).await?;
                    println!("{} {key} = {}", "✓".green(), format_number(value));
                }
                ConfigCommands::Get { key } => {
                    println!("{}", format_number(store.get(&key)?));
                }
                ConfigCommands::List => {
                    for (key, value) in store.load()?.entries() {
                        println!("{key} = {}", format_number(value));
                    }
                }
            }
        }
    }

    Ok(())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn print_job(job: &Job) {
    println!("  {} {}", "id:".bold(), job.id);
    println!("  {} {}", "state:".bold(), job.state);
    println!("  {} {}", "priority:".bold(), job.priority);
    println!(
        "  {} {}/{}",
        "attempts:".bold(),
        job.attempts,
        job.max_retries
    );
    println!("  {} {} ms", "timeout:".bold(), job.timeout_ms);
    println!("  {} {}", "command:".bold(), job.command);
}

fn prompt_enqueue() -> Result<EnqueueRequest> {
    let command = prompt("Command: ")?;
    let id = prompt("Job id (blank to generate): ")?;
    let priority = prompt("Priority 1-5 (blank for 5): ")?;
    let max_retries = prompt("Max retries (blank for default): ")?;
    let timeout = prompt("Timeout ms (blank for 300000): ")?;

    Ok(EnqueueRequest {
        command,
        id: none_if_empty(id),
        priority: parse_optional(priority).context("priority must be a number")?,
        max_retries: parse_optional(max_retries).context("max retries must be a number")?,
        timeout_ms: parse_optional(timeout).context("timeout must be a number")?,
    })
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_optional<T: std::str::FromStr>(s: String) -> Result<Option<T>, T::Err> {
    if s.is_empty() {
        Ok(None)
    } else {
        s.parse().map(Some)
    }
}
