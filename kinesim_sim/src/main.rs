//! kinesim runtime host.
//!
//! Starts a runtime context, serves the JSON message protocol over TCP and,
//! unless headless, runs the operator console on stdin/stdout.

use anyhow::Context;
use clap::Parser;
use kinesim_core::{RuntimeConfig, RuntimeContext};
use kinesim_env::{BroadcastSink, WallClock};
use kinesim_sim::{run_console, MessageServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Notifications buffered per connected client before it starts lagging.
const NOTIFICATION_CAPACITY: usize = 1024;

/// kinesim real-time entity simulation runtime
#[derive(Parser, Debug)]
#[command(name = "kinesim")]
#[command(about = "Run the kinesim entity simulation runtime", long_about = None)]
struct Args {
    /// JSON configuration file (missing keys take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the message server (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Update loop rate in Hz (overrides config)
    #[arg(short, long)]
    tick_rate: Option<u32>,

    /// Tile archive directory (overrides config)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Scenario script directory (overrides config)
    #[arg(long)]
    scenario_dir: Option<PathBuf>,

    /// Scenario to load at startup
    #[arg(short = 'S', long)]
    scenario: Option<String>,

    /// Serve messages only; run until Ctrl-C
    #[arg(long)]
    headless: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => RuntimeConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(rate) = self.tick_rate {
            config.tick_rate_hz = rate;
        }
        if let Some(archive) = &self.archive {
            config.tile_archive_path = archive.clone();
        }
        if let Some(dir) = &self.scenario_dir {
            config.scenario_dir = dir.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over -v
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting tracing subscriber")?;

    info!("kinesim v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = args.runtime_config()?;
    let listen_addr = config.listen_addr.clone();

    let (sink, _initial_rx) = BroadcastSink::new(NOTIFICATION_CAPACITY);
    let rt = RuntimeContext::new(config, Arc::new(sink.clone()), WallClock::shared())?;

    if let Some(name) = &args.scenario {
        let summary = rt.load_scenario(name)?;
        info!("{}", summary);
    }

    let server = MessageServer::bind(&listen_addr, Arc::clone(&rt), sink)
        .await
        .with_context(|| format!("binding message server on {}", listen_addr))?;
    info!("Message server listening on {}", server.local_addr()?);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Message server stopped: {}", e);
        }
    });

    if args.headless {
        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        info!("Interrupted");
    } else {
        let console_rt = Arc::clone(&rt);
        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            run_console(&console_rt, stdin.lock(), std::io::stdout(), true)
        })
        .await??;
    }

    server_task.abort();
    rt.stop_simulation();
    info!("Shutting down");
    Ok(())
}
