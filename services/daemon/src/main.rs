//! netweave daemon
//!
//! Assembles a netlet stack from configuration — console connector, the
//! configured building blocks, loopback adapter — on a concurrent
//! scheduler, pushes the configured number of payloads through the outgoing
//! direction, and verifies every one of them comes back up the incoming
//! direction intact.

mod config;
mod endpoints;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use config::DaemonConfig;
use endpoints::{sequence_payload, ConsoleConnector, LoopbackAdapter};
use netlets::blocks::{CrcBlock, FragBlock, HeaderBlock, PadBlock};
use netlets::Netlet;
use runtime::{
    ConcurrentScheduler, LocalRegistry, MessageProcessor, MessageScheduler, SchedulerRegistry,
};
use types::LocalFlowState;

#[derive(Parser, Debug)]
#[command(name = "netweaved", about = "netweave netlet daemon", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tracing filter, e.g. "info" or "netweaved=debug,runtime=info".
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Payload count override.
    #[arg(long)]
    count: Option<u64>,
}

fn resolve_block(
    name: &str,
    scheduler: &Arc<dyn MessageScheduler>,
) -> anyhow::Result<Arc<dyn MessageProcessor>> {
    match name {
        "crc" => Ok(CrcBlock::new(scheduler)),
        "frag" => Ok(FragBlock::new(scheduler)),
        "header" => Ok(HeaderBlock::new(scheduler)),
        "pad" => Ok(PadBlock::new(scheduler)),
        other => bail!("unknown building block '{other}' in netlet configuration"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_filter)
                .context("parsing --log-filter")?,
        )
        .init();

    let config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    let payloads = args.count.unwrap_or(config.traffic.payloads);

    let registry = Arc::new(LocalRegistry::new());
    let scheduler = ConcurrentScheduler::builder(
        "netweaved",
        registry.clone() as Arc<dyn SchedulerRegistry>,
    )
    .workers(config.scheduler.workers)
    .detect_loops(config.scheduler.detect_loops)
    .build();
    let dynamic: Arc<dyn MessageScheduler> = scheduler.clone();
    registry.add_scheduler(&dynamic);

    let flow = Arc::new(LocalFlowState::with_window(
        config.traffic.max_floating_packets,
    ));
    let connector = ConsoleConnector::new(&dynamic, flow);
    let adapter = LoopbackAdapter::new(&dynamic);

    let mut builder = Netlet::builder(config.netlet.id.clone())
        .connector(connector.clone())
        .multiplexer(adapter.clone());
    for name in &config.netlet.blocks {
        builder = builder.block(name.clone(), resolve_block(name, &dynamic)?);
    }
    let netlet = builder.build()?;
    netlet.rewire()?;

    dynamic.register_message_processor(connector.clone())?;
    dynamic.register_message_processor(adapter.clone())?;
    netlet.register_blocks(&dynamic)?;
    dynamic.run();

    info!(
        netlet = %netlet.id(),
        blocks = ?config.netlet.blocks,
        payloads,
        "stack assembled, injecting traffic"
    );

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut injected = 0u64;
    while injected < payloads {
        if Instant::now() > deadline {
            bail!(
                "traffic stalled: {injected} injected, {} delivered",
                connector.delivered()
            );
        }
        if connector.inject(sequence_payload(injected))? {
            injected += 1;
        } else {
            // flow window closed; wait for deliveries to drain it
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    while connector.delivered() < payloads {
        if Instant::now() > deadline {
            bail!(
                "traffic stalled: {injected} injected, {} delivered",
                connector.delivered()
            );
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    info!(
        delivered = connector.delivered(),
        reflected = adapter.reflected(),
        dispatched = scheduler.dispatched_messages(),
        dropped = scheduler.dropped_messages(),
        "traffic complete"
    );
    if connector.mismatched() > 0 {
        warn!(mismatched = connector.mismatched(), "corrupted round trips");
    }

    dynamic.stop();
    netlet.unregister_blocks(&dynamic)?;
    dynamic.unregister_message_processor(adapter.id())?;
    dynamic.unregister_message_processor(connector.id())?;
    scheduler.shutdown();

    if connector.mismatched() > 0 {
        bail!("{} payloads came back corrupted", connector.mismatched());
    }
    Ok(())
}
