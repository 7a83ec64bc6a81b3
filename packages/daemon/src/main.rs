//! `jobd`: runs the worker pool and offers the submission API on the command
//! line.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use actors::{MarkerPolicy, PoolExit, ProcessExecutor, SupervisorMessage, start_pool};
use api::{JobId, JobSystem};
use clap::Parser;
use job_core::CommandBuilder;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let builder = match &cli.install_dir {
        Some(dir) => CommandBuilder::new(dir),
        None => CommandBuilder::from_current_exe()?,
    };
    let system = JobSystem::init(&cli.store.config(builder.install_dir())).await?;

    let code = match cli.command {
        Commands::Run(args) => run(&system, builder, args).await?,

        Commands::Submit {
            resource,
            action,
            set,
            json,
        } => {
            let payload = cli::payload(json.as_deref(), &set)?;
            let id = system.service().create(&payload, &resource, &action).await?;
            println!("{}", id);
            ExitCode::SUCCESS
        }

        Commands::Show { id } => {
            let job = system.service().get(JobId(id)).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            ExitCode::SUCCESS
        }

        Commands::Requeue { id, action } => {
            let id = system.service().transition_id(JobId(id), &action).await?;
            println!("{}", id);
            ExitCode::SUCCESS
        }

        Commands::List { status, limit } => {
            for job in system.service().list(status, limit).await? {
                println!("{}\t{}\t{}\t{}", job.id, job.status, job.action, job.resource);
            }
            ExitCode::SUCCESS
        }
    };

    system.shutdown().await;

    Ok(code)
}

/// Run the worker pool until it completes, fails or is interrupted.
async fn run(
    system: &JobSystem,
    builder: CommandBuilder,
    args: RunArgs,
) -> Result<ExitCode, Box<dyn Error>> {
    tracing::info!(
        "Running {} via {}",
        builder.entrypoint().display(),
        builder.launcher().display()
    );

    if !system.config.is_durable() {
        tracing::warn!("Store {} is in memory; jobs are lost on exit", system.config.endpoint);
    }

    let stale = system.stale_claims().await?;
    if !stale.is_empty() {
        let ids: Vec<String> = stale.iter().map(|e| e.job_id.to_string()).collect();
        tracing::warn!(
            "{} queue entries were dequeued by an earlier run and never finished: jobs {}",
            stale.len(),
            ids.join(", ")
        );
    }

    // Surface lifecycle events in the log.
    let mut events = system.event_tx.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!("{}", event.description());
        }
    });

    let deps = system.pool_deps(
        Arc::new(ProcessExecutor::new(builder)),
        Arc::new(MarkerPolicy::default()),
    );
    let pool = start_pool(args.pool_config(), deps).await?;

    let supervisor = pool.supervisor().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing running jobs");
            let _ = supervisor.send_message(SupervisorMessage::Shutdown);
        }
    });

    let exit = pool.wait().await;
    tracing::info!("Pool exited: {}", exit.description());

    Ok(match exit {
        PoolExit::Completed | PoolExit::ShutDown => ExitCode::SUCCESS,
        PoolExit::WorkerFailed { .. } => ExitCode::FAILURE,
    })
}
