//! Relay CLI - route coding tasks and run provider workers locally.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_control_plane::{Config, Router, WorkerManager};
use relay_core::{
    CancelRequest, RouteRequest, SpawnRequest, Task, WorkerId, WorkerOutputRequest,
    WorkerStatusReport,
};

/// Relay CLI - multi-provider coding agent dispatch
#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Route coding tasks to providers and supervise their workers", long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "relay.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers
    Providers,

    /// Recommend a provider for a task
    Route {
        /// Task description
        #[arg(short, long)]
        task: String,

        /// Files the task touches
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Explicit context size in tokens
        #[arg(long)]
        context_size: Option<u64>,

        /// low, medium or high
        #[arg(long)]
        complexity: Option<String>,

        /// low, normal, high or urgent
        #[arg(long)]
        priority: Option<String>,
    },

    /// Run a task on a provider and stream its output
    Run {
        /// Provider id
        #[arg(short, long)]
        provider: String,

        /// Task description
        #[arg(short, long)]
        task: String,

        /// Files the task touches
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Communication method (must match the provider)
        #[arg(short, long)]
        method: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Worker lifetime in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Only show output lines matching this regex
        #[arg(long)]
        filter: Option<String>,

        /// Wait for the worker to finish, then print at most this many lines
        #[arg(long)]
        limit: Option<usize>,

        /// Output poll interval in milliseconds
        #[arg(long, default_value = "500")]
        poll_ms: u64,
    },

    /// Check the config file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Providers => list_providers(&config)?,
        Commands::Route {
            task,
            files,
            context_size,
            complexity,
            priority,
        } => {
            let request = RouteRequest {
                task,
                files,
                context_size,
                complexity,
                priority,
            };
            route(&config, request)?;
        }
        Commands::Run {
            provider,
            task,
            files,
            method,
            model,
            timeout,
            filter,
            limit,
            poll_ms,
        } => {
            let mut task = Task::new(task);
            task.files = files;
            let request = SpawnRequest {
                provider,
                model,
                method,
                task,
                timeout_secs: timeout,
                ..SpawnRequest::default()
            };
            let options = RunOptions {
                filter,
                limit,
                poll: Duration::from_millis(poll_ms.max(50)),
            };
            run(config, request, options).await?;
        }
        Commands::Validate => {
            println!(
                "Config OK: {} providers ({})",
                config.providers.len(),
                config.catalog()?.ids().join(", ")
            );
        }
    }

    Ok(())
}

fn list_providers(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = config.catalog()?;

    println!("Providers ({}):", catalog.len());
    println!("{:<20}  {:<6}  {:<24}  {:>10}  {}", "ID", "METHOD", "MODEL", "CONTEXT", "BEST FOR");
    println!("{}", "-".repeat(80));

    for provider in catalog.iter() {
        println!(
            "{:<20}  {:<6}  {:<24}  {:>10}  {}",
            provider.id,
            provider.method,
            provider.model,
            provider.context_limit,
            provider.best_for.join(", ")
        );
    }

    Ok(())
}

fn route(config: &Config, request: RouteRequest) -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::new(Arc::new(config.catalog()?), config.router.clone());
    let decision = router.route_request(request)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

struct RunOptions {
    filter: Option<String>,
    limit: Option<usize>,
    poll: Duration,
}

async fn run(
    config: Config,
    request: SpawnRequest,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = WorkerManager::new(Arc::new(config.catalog()?), config.manager.clone());
    let worker_id = manager.spawn(request).await?;
    info!(worker_id = %worker_id, "Worker started, press Ctrl-C to cancel");

    let mut since: Option<String> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let mut cancel = CancelRequest::new(worker_id.clone());
                cancel.reason = Some("interrupted".to_string());
                manager.cancel(cancel).await;
            }
            _ = tokio::time::sleep(options.poll) => {}
        }

        // Read the status first so the last poll sees everything written.
        let finished = manager.status(&worker_id).await?.status.is_terminal();

        if options.limit.is_none() {
            let mut poll = WorkerOutputRequest::new(worker_id.clone());
            poll.since = since.clone();
            poll.filter = options.filter.clone();
            let response = manager.get_output(poll).await?;
            if !response.output.is_empty() {
                println!("{}", response.output);
            }
            since = Some(response.last_updated.to_rfc3339());
        }

        if finished {
            break;
        }
    }

    if let Some(limit) = options.limit {
        print_final(&manager, &worker_id, options.filter, limit).await?;
    }

    let report = manager.status(&worker_id).await?;
    print_report(&report);
    manager.shutdown().await;
    Ok(())
}

async fn print_final(
    manager: &WorkerManager,
    worker_id: &WorkerId,
    filter: Option<String>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = WorkerOutputRequest::new(worker_id.clone()).with_limit(limit);
    request.filter = filter;
    let response = manager.get_output(request).await?;
    if !response.output.is_empty() {
        println!("{}", response.output);
    }
    if response.truncated {
        println!("... ({} lines in total)", response.line_count);
    }
    Ok(())
}

fn print_report(report: &WorkerStatusReport) {
    eprintln!();
    eprintln!("  Worker:     {}", report.id);
    eprintln!("  Provider:   {} ({}, {})", report.provider, report.method, report.model);
    eprintln!("  Status:     {}", report.status);
    eprintln!("  Health:     {}", report.health);
    eprintln!("  Started:    {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    eprintln!("  Probes:     {}", report.health_check_count);
    eprintln!("  Retries:    {}", report.retry_count);
}
