//! pipeline-role - per-pipeline worker process.
//!
//! One of these runs per input/transcoder/output stage of a channel,
//! launched and supervised by `channel-managerd`. It owns construction,
//! steady-state running, watchdog-triggered reconstruction, and teardown of
//! exactly one stage; coordination with sibling stages happens only through
//! the filesystem (handoff descriptors, rendezvous markers, NDJSON metrics).

mod graph;
mod handoff;
mod metrics;
mod playlist;
mod role;
mod state_machine;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use graph::{RoleContext, StubGraphBuilder};
use metrics::MetricsAppender;
use role::Role;
use state_machine::StateMachine;

#[derive(Parser, Debug)]
#[command(name = "pipeline-role")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Channel this process is a stage of.
    channel: String,

    /// Which source in the channel's input list this stage was launched
    /// against (failover restarts may pick a different one).
    #[arg(long, default_value_t = 0)]
    source_index: usize,

    /// Output position within the channel's output list; only set for
    /// `--role output[N]`.
    #[arg(long)]
    output_index: Option<usize>,

    /// JSON object of the output's declared options (`OutputSpec::options`),
    /// only set for `--role output[N]`.
    #[arg(long)]
    output_options: Option<String>,

    /// Directory for this process's own logs.
    #[arg(long)]
    log_dir: PathBuf,

    /// Role identity, formatted the way `streamcore::lifecycle::Role`
    /// displays it: "input", "transcoder", or "output[N]".
    #[arg(long)]
    role: String,

    /// Log filter, e.g. "info" or "pipeline_role=debug,warn".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&args.log_level)).init();

    let role: Role = args.role.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
    if let (Role::Output(parsed), Some(cli_index)) = (role, args.output_index) {
        anyhow::ensure!(parsed == cli_index, "--output-index {cli_index} does not match --role {role}");
    }

    let state_dir = PathBuf::from(std::env::var("STREAMCORE_STATE_DIR").map_err(|_| anyhow::anyhow!("STREAMCORE_STATE_DIR not set"))?);
    let handoff_dir = PathBuf::from(std::env::var("STREAMCORE_HANDOFF_DIR").map_err(|_| anyhow::anyhow!("STREAMCORE_HANDOFF_DIR not set"))?);

    tracing::info!(channel = %args.channel, %role, source_index = args.source_index, "pipeline-role starting");

    let output_options = args
        .output_options
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!("--output-options is not valid JSON: {e}"))?
        .unwrap_or_default();

    let ctx = RoleContext {
        channel: args.channel.clone(),
        role,
        source_index: args.source_index,
        log_dir: args.log_dir,
        upstream: None,
        output_options,
    };

    let metrics = MetricsAppender::new(&state_dir, &args.channel);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let machine = StateMachine::new(ctx, handoff_dir, StubGraphBuilder::default());
    let result = machine.run(shutdown_rx).await;

    emit_exit_sample(&metrics, &args.channel, role, result.is_ok());

    match result {
        Ok(()) => {
            tracing::info!(channel = %args.channel, %role, "exiting cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!(channel = %args.channel, %role, error = %e, "exiting fatally");
            Err(e.into())
        }
    }
}

fn emit_exit_sample(metrics: &MetricsAppender, channel: &str, role: Role, clean: bool) {
    use std::collections::BTreeMap;
    use std::time::{SystemTime, UNIX_EPOCH};
    use streamcore::model::{MetricSample, MetricValue};

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let sample = MetricSample {
        timestamp,
        stat_type: role_stat_type(role).to_string(),
        channel: channel.to_string(),
        payload: BTreeMap::from([("exited_cleanly".to_string(), MetricValue::Number(if clean { 1.0 } else { 0.0 }))]),
    };
    if let Err(e) = metrics.append(&sample) {
        tracing::warn!(error = %e, "failed to append exit metric sample");
    }
}

fn role_stat_type(role: Role) -> &'static str {
    match role {
        Role::Input => "input",
        Role::Transcoder => "transcoder",
        Role::Output(_) => "output",
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
