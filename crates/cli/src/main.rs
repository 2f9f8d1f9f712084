//! taskpool CLI - run a simulated batch through the bounded executor.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use taskpool_core::{Outcome, Task, TaskId};
use taskpool_execution::{BatchOutcomes, DispatchStrategy, Executor, ExecutorConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskpool")]
#[command(about = "Bounded-concurrency task executor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter, e.g. "debug" or "taskpool_execution=trace" (defaults to RUST_LOG, then info)
    #[arg(long, global = true, env = "TASKPOOL_LOG")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of simulated tasks
    Run {
        /// Number of tasks (ids 1..=N)
        #[arg(long, env = "TASKPOOL_TASKS", default_value_t = 10)]
        tasks: u64,
        /// Maximum tasks running at once
        #[arg(long, env = "TASKPOOL_CONCURRENCY", default_value_t = 3)]
        concurrency: usize,
        /// Simulated work per task, in milliseconds
        #[arg(long, env = "TASKPOOL_DELAY_MS", default_value_t = 200)]
        delay_ms: u64,
        /// Dispatch strategy: gated or pool
        #[arg(long, env = "TASKPOOL_STRATEGY", default_value = "gated")]
        strategy: DispatchStrategy,
        /// Make tasks with an even id fail
        #[arg(long, env = "TASKPOOL_FAIL_EVEN", default_value_t = true, action = clap::ArgAction::Set)]
        fail_even: bool,
        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Demo task: sleeps, then echoes its data or fails on an even id.
#[derive(Debug, Clone)]
struct SimulatedTask {
    id: TaskId,
    data: String,
    delay: Duration,
    fail_even: bool,
}

impl SimulatedTask {
    fn new(id: u64, delay: Duration, fail_even: bool) -> Self {
        Self {
            id: TaskId::new(id),
            data: format!("Task {id} data"),
            delay,
            fail_even,
        }
    }
}

impl Task for SimulatedTask {
    type Output = String;

    fn id(&self) -> TaskId {
        self.id
    }

    fn execute(&self) -> Result<String> {
        info!("Processing task {}", self.id);
        std::thread::sleep(self.delay);
        if self.fail_even && self.id.get() % 2 == 0 {
            anyhow::bail!("task failed");
        }
        Ok(self.data.clone())
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(outcomes: &BatchOutcomes<String>) {
    for (id, outcome) in outcomes.iter() {
        match outcome {
            Outcome::Success(result) => {
                println!("Task {id} processed successfully with result: {result}");
            }
            Outcome::Failure(failure) => {
                println!("Error processing task {id}: {failure}");
            }
        }
    }

    let summary = outcomes.summary();
    println!(
        "{} tasks | {} succeeded | {} failed | {} faulted | {} cancelled | peak {} of {} | strategy {}",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.faulted,
        summary.cancelled,
        summary.peak_active,
        summary.concurrency_limit,
        summary.strategy,
    );
    if let Some(elapsed) = summary.elapsed() {
        println!("Elapsed: {} ms", elapsed.num_milliseconds());
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Run { tasks, concurrency, delay_ms, strategy, fail_even, json } => {
            let batch: Vec<_> = (1..=tasks)
                .map(|id| SimulatedTask::new(id, Duration::from_millis(delay_ms), fail_even))
                .collect();

            let executor = Executor::new()
                .with_config(ExecutorConfig::default().with_strategy(strategy));

            let outcomes = match executor.submit_and_wait(batch, concurrency).await {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    eprintln!("error: {err}");
                    return Ok(ExitCode::from(2));
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                print_report(&outcomes);
            }

            if outcomes.summary().all_succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                warn!("{} of {} tasks did not succeed", outcomes.failures().count(), outcomes.len());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
