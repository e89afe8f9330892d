#![forbid(unsafe_code)]

mod rpc;
mod sink;

use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dagscope_core::{Epoch, NodeReportedEngine, Observer, ObserverConfig, PassOutcome};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "dagscope: watch a DAG-consensus node and render its event DAG",
    long_about = "Polls a DAG-consensus node over JSON-RPC, reconstructs the observable \
event DAG, tags frame roots and block-finalizing (atropos) events, and writes \
Graphviz DOT captures highlighting what changed since the previous poll.",
    after_help = "EXAMPLES:\n    # Watch a local node, one capture per DAG change\n    dagscope --out ./dags\n\n    # One capture per sealed epoch, no PNG rendering\n    dagscope --out ./dags --mode epoch --no-render\n\n    # Limit the backward walk to 100 sequence numbers below the frontier\n    dagscope --out ./dags --limit 100"
)]
struct Cli {
    /// RPC host of the observed node.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// RPC port of the observed node.
    #[arg(long, default_value_t = 18545)]
    port: u16,

    /// Directory DOT (and rendered PNG) files are written to.
    #[arg(long)]
    out: PathBuf,

    /// Traversal depth limit in sequence numbers below the frontier;
    /// 0 walks all the way back.
    #[arg(long, default_value_t = 0)]
    limit: u32,

    /// When to write a capture.
    #[arg(long, value_enum, default_value_t = Mode::Root)]
    mode: Mode,

    /// Skip rendering PNGs with the external `dot` binary.
    #[arg(long)]
    no_render: bool,

    /// Seconds to sleep between polls.
    #[arg(long, default_value_t = 1)]
    interval: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Write a capture every time the DAG frontier changed.
    Root,
    /// Write one capture per epoch, when the epoch seals.
    Epoch,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DAGSCOPE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "dagscope=debug,info"
        } else {
            "dagscope=info,warn"
        })
    });

    let format = env::var("DAGSCOPE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("creating output directory {}", cli.out.display()))?;

    let source = rpc::RpcClient::new(&cli.host, cli.port);
    let sink = sink::Sink::new(cli.out.clone(), !cli.no_render, "dot");
    let config = ObserverConfig { depth_limit: cli.limit, ..ObserverConfig::default() };
    let mut observer = Observer::new(NodeReportedEngine::new(), config);

    info!(host = %cli.host, port = cli.port, mode = ?cli.mode, "watching node");

    // In epoch mode the last capture of each epoch is held back until the
    // next epoch's first capture proves the epoch sealed.
    let mut held: Option<(Epoch, String)> = None;

    loop {
        match observer.poll(&source) {
            Ok(PassOutcome::Idle(reason)) => {
                debug!(?reason, "nothing to capture");
            }
            Ok(PassOutcome::Captured(capture)) => match cli.mode {
                Mode::Root => {
                    let path = sink.write(&capture.name, &capture.dot)?;
                    info!(epoch = %capture.epoch, path = %path.display(), "wrote capture");
                }
                Mode::Epoch => {
                    if capture.epoch_changed {
                        if let Some((sealed, dot)) = held.take() {
                            let path = sink.write(&format!("DAG-EPOCH-{sealed}"), &dot)?;
                            info!(epoch = %sealed, path = %path.display(), "wrote sealed epoch");
                        }
                    }
                    held = Some((capture.epoch, capture.dot));
                }
            },
            Err(err) if err.is_transient() => {
                warn!(error = %err, "poll failed; retrying next interval");
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context("observation invariant broken"));
            }
        }

        thread::sleep(Duration::from_secs(cli.interval));
    }
}
