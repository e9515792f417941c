//! ofstats-replay entry point.
//!
//! Replays scripted multipart replies for one device through the
//! reconciliation engine and prints the resulting store as JSON.

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use ofstats::{
    CycleOrchestrator, DeviceState, InMemoryDataStore, ScriptedTransport, StatisticsConfig,
};
use ofstats_types::NodeId;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Statistics reconciliation replay tool
#[derive(Parser, Debug)]
#[command(name = "ofstats-replay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML file mapping statistics kinds to scripted pull answers
    #[arg(short = 'r', long)]
    replies: PathBuf,

    /// YAML statistics configuration (defaults apply when omitted)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Device node id
    #[arg(short = 'n', long, default_value = "openflow:1")]
    node: String,

    /// Number of flow tables the device reports; omit to replay an
    /// unsynchronized device
    #[arg(short = 't', long)]
    tables: Option<u8>,

    /// Number of polling passes to run
    #[arg(short = 'p', long, default_value = "1")]
    passes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => StatisticsConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StatisticsConfig::default(),
    };
    let transport = ScriptedTransport::load(&args.replies)
        .with_context(|| format!("loading replies {}", args.replies.display()))?;
    let node = NodeId::new(args.node.as_str()).context("invalid node id")?;

    let state = match args.tables {
        Some(tables) => DeviceState::synchronized(node, tables),
        None => DeviceState {
            node_ready: true,
            ..DeviceState::new(node)
        },
    };

    info!("Node: {}", state.node_id);
    info!("Kinds: {:?}", config.kinds);
    info!("Passes: {}", args.passes);

    let store = Arc::new(InMemoryDataStore::new());
    let mut orch = CycleOrchestrator::new(state, Arc::new(transport), store.clone(), config);

    for pass in 1..=args.passes {
        let summary = orch.gather_dynamic_data().await;
        if summary.skipped {
            warn!("Polling disabled by configuration, nothing replayed");
            break;
        }
        for report in &summary.reports {
            info!(
                "pass {} request {} {}: {} ({} ops, {} dropped)",
                pass,
                report.request_id,
                report.kind.map(|k| k.as_str()).unwrap_or("-"),
                report.phase,
                report.ops_committed,
                report.soft_failures
            );
        }
        for (kind, reason) in &summary.failures {
            warn!("pass {} {} failed: {}", pass, kind, reason);
        }
    }

    for line in orch.device().timing.dump() {
        info!("timing {}", line);
    }

    let snapshot = store.snapshot_json().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
