//! gantry — a minimal container orchestrator.
//!
//! One binary, two roles:
//!
//! ```text
//! gantry manager --host 0.0.0.0 --port 5555 --workers 10.0.0.7:5556,10.0.0.8:5556
//! gantry worker  --host 0.0.0.0 --port 5556 --name node-a
//! ```
//!
//! The manager owns intent: it accepts task events, schedules them onto
//! workers, polls observed state back, and restarts unhealthy tasks. Each
//! worker owns one Docker daemon and drives its tasks through it.

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use gantry::manager::api as manager_api;
use gantry::manager::manager::{run_health_loop, run_process_loop, run_update_loop};
use gantry::manager::types::Manager;
use gantry::tasks::docker::DockerClient;
use gantry::worker::api as worker_api;
use gantry::worker::types::Worker;
use gantry::worker::worker::{run_observation_loop, run_task_loop};

#[derive(Parser)]
#[command(name = "gantry", about = "A minimal container orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane: task API, dispatch, reconciliation, health.
    Manager {
        /// Address to bind the task API on.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind the task API on.
        #[arg(long, default_value = "5555")]
        port: u16,

        /// Worker endpoints as host:port, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        workers: Vec<String>,

        /// Placement strategy.
        #[arg(long, default_value = "roundrobin")]
        scheduler: String,
    },

    /// Run a worker agent bound to the local Docker daemon.
    Worker {
        /// Address to bind the task API on.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind the task API on.
        #[arg(long, default_value = "5556")]
        port: u16,

        /// Node name; defaults to the bind endpoint.
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gantry=debug".parse().expect("default filter")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Manager {
            host,
            port,
            workers,
            scheduler,
        } => run_manager(host, port, workers, scheduler).await,
        Command::Worker { host, port, name } => run_worker(host, port, name).await,
    }
}

async fn run_manager(
    host: String,
    port: u16,
    workers: Vec<String>,
    scheduler: String,
) -> Result<(), Box<dyn Error>> {
    info!(?workers, %scheduler, "manager starting");
    let manager = Arc::new(Manager::new(workers, &scheduler));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let process = tokio::spawn(run_process_loop(manager.clone(), shutdown_rx.clone()));
    let update = tokio::spawn(run_update_loop(manager.clone(), shutdown_rx.clone()));
    let health = tokio::spawn(run_health_loop(manager.clone(), shutdown_rx));

    let app = manager_api::build_router(manager);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "manager API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    let _ = process.await;
    let _ = update.await;
    let _ = health.await;
    info!("manager stopped");
    Ok(())
}

async fn run_worker(host: String, port: u16, name: Option<String>) -> Result<(), Box<dyn Error>> {
    let name = name.unwrap_or_else(|| format!("{host}:{port}"));
    info!(%name, "worker starting");

    let runtime = Arc::new(DockerClient::connect()?);
    let worker = Arc::new(Worker::new(&name, runtime));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(run_task_loop(worker.clone(), shutdown_rx.clone()));
    let observe = tokio::spawn(run_observation_loop(worker.clone(), shutdown_rx));

    let app = worker_api::build_router(worker);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "worker API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    let _ = run.await;
    let _ = observe.await;
    info!("worker stopped");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
