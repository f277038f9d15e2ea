//! memobench CLI
//!
//! Sends a batch of memo transactions to a Solana RPC node and reports how
//! long they took to land.

use clap::Parser;
use memobench::client::{LogsPubsub, NodeRpc};
use memobench::emitter::{EmitterConfig, StartAlignment};
use memobench::listener::{ListenerHandle, StopReason};
use memobench::logging::{self, SUMMARY_TARGET};
use memobench::preflight::{assert_sufficient_balance, resolve_keypair};
use memobench::report::field;
use memobench::{BenchConfig, BenchError, ConfigOutcome, RunConfig, RunController};
use memobench_types::RunId;
use solana_sdk::signer::Signer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

const BANNER: &str = r#"
 ███╗   ███╗███████╗███╗   ███╗ ██████╗ ██████╗ ███████╗███╗   ██╗ ██████╗██╗  ██╗
 ████╗ ████║██╔════╝████╗ ████║██╔═══██╗██╔══██╗██╔════╝████╗  ██║██╔════╝██║  ██║
 ██╔████╔██║█████╗  ██╔████╔██║██║   ██║██████╔╝█████╗  ██╔██╗ ██║██║     ███████║
 ██║╚██╔╝██║██╔══╝  ██║╚██╔╝██║██║   ██║██╔══██╗██╔══╝  ██║╚██╗██║██║     ██╔══██║
 ██║ ╚═╝ ██║███████╗██║ ╚═╝ ██║╚██████╔╝██████╔╝███████╗██║ ╚████║╚██████╗██║  ██║
 ╚═╝     ╚═╝╚══════╝╚═╝     ╚═╝ ╚═════╝ ╚═════╝ ╚══════╝╚═╝  ╚═══╝ ╚═════╝╚═╝  ╚═╝"#;

#[derive(Parser)]
#[command(name = "memobench")]
#[command(about = "Transaction landing-time benchmark for Solana RPC endpoints")]
#[command(version)]
struct Cli {
    /// Config file; a template is written if it does not exist
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for the run log file
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Forced stop after the blockhash fetch (e.g., "64s", "2m")
    #[arg(long, default_value = "64s")]
    deadline: humantime::Duration,

    /// Start sending immediately instead of on the next aligned boundary
    #[arg(long)]
    no_align: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    println!("{}", BANNER);
    println!("{:>82}", env!("CARGO_PKG_VERSION"));
    println!();

    let run_id = RunId::generate();
    let guard = logging::init(&run_id, &cli.log_dir).map_err(BenchError::from)?;

    match run(cli, run_id).await {
        Ok(outcome) => {
            if let Some(line) = results_line(&outcome, guard.path()) {
                println!();
                println!("{}", line);
            }
        }
        Err(e) => {
            error!("{}", e);
            drop(guard);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// How a successful invocation ended.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// A run finished and its report was written.
    Finished,
    /// No config existed; a template was written instead.
    ConfigCreated,
}

/// Where the report went, for runs that wrote one.
fn results_line(outcome: &Outcome, log_path: &Path) -> Option<String> {
    match outcome {
        Outcome::Finished => Some(format!(
            "Benchmark results saved to {}",
            log_path.display()
        )),
        Outcome::ConfigCreated => None,
    }
}

async fn run(cli: Cli, run_id: RunId) -> Result<Outcome, BenchError> {
    let config = match BenchConfig::load(&cli.config)? {
        ConfigOutcome::Loaded(config) => config,
        ConfigOutcome::Created(path) => {
            info!(path = %path.display(), "Edit the config and restart");
            return Ok(Outcome::ConfigCreated);
        }
    };
    let payer = resolve_keypair(&config)?;

    let mut header = vec![
        field("Date", humantime::format_rfc3339_seconds(SystemTime::now())),
        field("Test Wallet", payer.pubkey()),
        field("Starting Test ID", run_id),
    ];
    header.extend(config.echo_lines());
    header.push(String::new());
    for line in &header {
        info!(target: SUMMARY_TARGET, "{}", line);
    }

    let rpc = Arc::new(NodeRpc::new(config.rpc_url.clone()));
    let submitter = Arc::new(NodeRpc::new(config.send_url()));
    let subscriber = LogsPubsub::new(config.ws_url());

    assert_sufficient_balance(rpc.as_ref(), &payer.pubkey(), &config).await?;

    let alignment = (!cli.no_align).then(StartAlignment::default);
    let run_config = RunConfig::default()
        .with_emitter(
            EmitterConfig::default()
                .with_tx_count(config.tx_count)
                .with_prio_fee(config.prio_fee)
                .with_node_retries(config.node_retries)
                .with_alignment(alignment),
        )
        .with_rate_limit(config.rate_limit_config())
        .with_deadline(cli.deadline.into());

    let controller = RunController::new(rpc, submitter, subscriber, payer, run_id, run_config);
    spawn_signal_handler(controller.handle());

    let report = controller.run().await?;

    let mut finished = vec![field("Finished Test ID", run_id)];
    finished.extend(config.echo_lines());
    report.with_header(finished).log();
    Ok(Outcome::Finished)
}

/// Ctrl-C / SIGTERM stops a listening run; before that it exits right away.
fn spawn_signal_handler(handle: ListenerHandle) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = shutdown_signal().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }

            if handle.is_listening() {
                println!();
                info!("CTRL+C detected, Force stopping the test");
                println!();
                handle.stop(StopReason::Interrupted);
            } else if handle.stop_reason().is_none() {
                std::process::exit(0);
            }
        }
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
