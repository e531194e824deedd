use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use trendreg::config::AppConfig;
use trendreg::detector::DuplicateDetector;
use trendreg::error::Result;
use trendreg::jobs::{InProcessQueue, JobQueue};
use trendreg::registry::{RuleTableValidator, SymbolRegistry};
use trendreg::store::PostgresStore;
use trendreg::workflow::{MergeWorker, MergeWorkflow};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "trendreg", about = "Trending-topic merge and symbol registry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the merge worker with scheduled duplicate and archival sweeps
    Daemon,
    /// One-shot duplicate scan, prints proposals without executing them
    Scan {
        /// Maximum topics in the scan window
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Execute a merge of explicit duplicate topics into a primary
    Merge {
        #[arg(long)]
        primary: Uuid,
        #[arg(long, required = true, num_args = 1..)]
        duplicates: Vec<Uuid>,
        #[arg(long, default_value = "cli")]
        executor: String,
    },
    /// Roll back a completed merge
    Rollback {
        #[arg(long)]
        merge_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show merge history for a topic
    History {
        #[arg(long)]
        topic: Uuid,
    },
    /// One-shot archival sweep of expired symbols
    Archive,
    /// Run database migrations
    Migrate,
}

/// Wired service graph over a Postgres-backed store
struct Services {
    detector: DuplicateDetector,
    workflow: MergeWorkflow,
    registry: Arc<SymbolRegistry>,
    worker: MergeWorker,
    receiver: tokio::sync::mpsc::UnboundedReceiver<trendreg::jobs::Job>,
    config: AppConfig,
}

async fn build_services(config: AppConfig) -> Result<Services> {
    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    let (queue, receiver) = InProcessQueue::new();
    let queue: Arc<dyn JobQueue> = Arc::new(queue);

    let registry = Arc::new(SymbolRegistry::new(
        store.clone(),
        Arc::new(RuleTableValidator::new(
            config.registry.reserved_prefixes.clone(),
        )),
        config.registry.clone(),
    ));
    let detector = DuplicateDetector::new(
        store.clone(),
        config.detector.clone(),
        config.similarity,
    );
    let workflow = MergeWorkflow::new(store.clone(), store.clone(), queue);
    let worker = MergeWorker::new(
        store.clone(),
        store.clone(),
        store,
        registry.clone(),
        config.worker.max_job_retries,
    );

    Ok(Services {
        detector,
        workflow,
        registry,
        worker,
        receiver,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Migrate => {
            let store =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
        }
        Commands::Scan { limit } => {
            let services = build_services(config).await?;
            let limit = limit.unwrap_or(services.config.detector.scan_limit);
            let proposals = services.detector.detect_duplicates(limit).await?;
            if proposals.is_empty() {
                println!("No duplicate groups found in a window of {limit}");
            }
            for proposal in proposals {
                println!(
                    "primary {}  duplicates {:?}  confidence {:.3}\n  {}",
                    proposal.primary_id, proposal.duplicate_ids, proposal.confidence,
                    proposal.reason
                );
            }
        }
        Commands::Merge {
            primary,
            duplicates,
            executor,
        } => {
            let mut services = build_services(config).await?;
            let proposal = services.detector.propose_merge(primary, &duplicates).await?;
            let receipt = services.workflow.execute(&proposal, &executor).await?;
            println!("merge {} queued", receipt.merge_id);
            // drain the in-process queue so the one-shot command finishes the job
            while let Ok(job) = services.receiver.try_recv() {
                services.worker.handle(job).await;
            }
        }
        Commands::Rollback { merge_id, reason } => {
            let mut services = build_services(config).await?;
            let receipt = services
                .workflow
                .rollback(merge_id, reason.as_deref())
                .await?;
            println!("rollback of {} queued", receipt.merge_id);
            while let Ok(job) = services.receiver.try_recv() {
                services.worker.handle(job).await;
            }
        }
        Commands::History { topic } => {
            let services = build_services(config).await?;
            let records = services.workflow.merge_history(topic, 10).await?;
            if records.is_empty() {
                println!("No merge history for {topic}");
            }
            for record in records {
                println!(
                    "{}  {}  {} duplicate(s)  by {}  {}",
                    record.created_at, record.status, record.duplicate_ids.len(),
                    record.executed_by, record.reason
                );
            }
        }
        Commands::Archive => {
            let services = build_services(config).await?;
            let archived = services.registry.archive_expired_symbols().await?;
            println!("archived {archived} expired symbol(s)");
        }
        Commands::Daemon => run_daemon(config).await?,
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let services = build_services(config).await?;
    let worker_cfg = services.config.worker.clone();
    info!("Starting trendreg daemon");

    let worker = Arc::new(services.worker);
    let worker_task = {
        let worker = worker.clone();
        let receiver = services.receiver;
        tokio::spawn(async move { worker.run(receiver).await })
    };

    // scheduled archival sweep
    let registry = services.registry.clone();
    let archive_task = tokio::spawn(async move {
        let mut timer =
            tokio::time::interval(Duration::from_secs(worker_cfg.archive_interval_secs.max(1)));
        loop {
            timer.tick().await;
            match registry.archive_expired_symbols().await {
                Ok(0) => {}
                Ok(n) => info!("Archival sweep archived {} symbol(s)", n),
                Err(e) => error!("Archival sweep failed: {}", e),
            }
        }
    });

    // optional scheduled duplicate scan; proposals are logged for admins,
    // never auto-executed
    let scan_secs = services.config.worker.scan_interval_secs;
    let scan_task = if scan_secs > 0 {
        let detector = services.detector;
        let limit = services.config.detector.scan_limit;
        Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_secs(scan_secs));
            loop {
                timer.tick().await;
                match detector.detect_duplicates(limit).await {
                    Ok(proposals) if !proposals.is_empty() => info!(
                        "Duplicate scan found {} group(s) awaiting review",
                        proposals.len()
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Duplicate scan failed: {}", e),
                }
            }
        }))
    } else {
        None
    };

    shutdown_signal().await;
    info!("Shutdown signal received");
    worker.stop();
    archive_task.abort();
    if let Some(task) = scan_task {
        task.abort();
    }
    // dropping the workflow releases the last queue sender, which closes the
    // channel and lets the worker loop drain out
    drop(services.workflow);
    let _ = worker_task.await;
    Ok(())
}

fn init_logging(cfg: &trendreg::config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", cfg.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
