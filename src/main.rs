use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::admission::{
    AdmissionController, AdmissionDecision, PolicyConfig, RequestMetadata, Sweeper,
};
use turnstile::config::{LoggingConfig, TurnstileConfig};

#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about = "In-process fixed-window admission control")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the controller, run the sweeper, and wait for a shutdown signal
    Run,
    /// Print the configured policies as JSON
    Policies,
    /// Simulate checks for one client and print each decision as a JSON line
    Check {
        /// Policy name to check against
        #[arg(short, long)]
        policy: String,
        /// X-Forwarded-For header value
        #[arg(long)]
        forwarded_for: Option<String>,
        /// X-Real-IP header value
        #[arg(long)]
        real_ip: Option<String>,
        /// User-Agent header value
        #[arg(long)]
        user_agent: Option<String>,
        /// Number of checks to issue
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
}

/// JSON view of a decision; `reset_at` is projected onto wall-clock time.
#[derive(Debug, Serialize)]
struct DecisionOutput<'a> {
    policy: &'a str,
    identity: &'a str,
    allowed: bool,
    remaining: u64,
    limit: u64,
    retry_after_ms: u64,
    reset_at: chrono::DateTime<chrono::Utc>,
}

impl<'a> DecisionOutput<'a> {
    fn new(policy: &'a str, identity: &'a str, decision: &AdmissionDecision) -> Self {
        let retry_after = chrono::Duration::from_std(decision.retry_after)
            .unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            policy,
            identity,
            allowed: decision.allowed,
            remaining: decision.remaining,
            limit: decision.limit,
            retry_after_ms: decision.retry_after.as_millis() as u64,
            reset_at: chrono::Utc::now() + retry_after,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TurnstileConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match cli.config.as_deref() {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Configuration loaded from defaults and environment"),
    }

    let registry = config.registry()?;
    let controller = Arc::new(AdmissionController::new(registry));

    match cli.command {
        Command::Run => run(controller, &config).await,
        Command::Policies => {
            let policies: Vec<PolicyConfig> = controller
                .registry()
                .policies()
                .iter()
                .map(|p| PolicyConfig::from(&**p))
                .collect();
            println!("{}", serde_json::to_string_pretty(&policies)?);
            Ok(())
        }
        Command::Check {
            policy,
            forwarded_for,
            real_ip,
            user_agent,
            count,
        } => {
            let metadata = RequestMetadata {
                forwarded_for,
                real_ip,
                user_agent,
            };
            let identity = metadata.identity();
            for _ in 0..count {
                let decision = controller.check(&policy, identity.as_str())?;
                let output = DecisionOutput::new(&policy, identity.as_str(), &decision);
                println!("{}", serde_json::to_string(&output)?);
            }
            Ok(())
        }
    }
}

async fn run(controller: Arc<AdmissionController>, config: &TurnstileConfig) -> anyhow::Result<()> {
    info!("Starting Turnstile admission controller");

    for policy in controller.registry().policies() {
        info!(
            policy = policy.name(),
            window_ms = policy.window().as_millis() as u64,
            max_requests = policy.max_requests(),
            "Policy registered"
        );
    }

    let sweeper = config
        .admission
        .sweep_interval()
        .map(|interval| Sweeper::spawn(Arc::clone(&controller), interval));
    if sweeper.is_none() {
        info!("Window sweeper disabled, expired windows are reclaimed on access only");
    }

    shutdown_signal().await;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    info!(
        slots = controller.active_slots(),
        "Turnstile admission controller stopped"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
