//! Athena forwarder daemon: loads TOML configuration, opens the configured
//! links, and runs the forwarding engine until SIGINT/SIGTERM (spec.md §1).

mod config;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use athena_common::Name;
use athena_forwarder::{Engine, EngineConfig, SimpleCodec};
use athena_transport::modules::{EthernetModule, LoopbackModule, TcpModule, UdpModule};
use athena_transport::LinkAdapter;
use clap::Parser;

use config::DaemonConfig;

/// Athena CCN/NDN packet forwarder.
#[derive(Parser, Debug)]
#[command(name = "athena", about = "Athena CCN/NDN packet forwarder")]
struct Cli {
    /// Path to the daemon's TOML configuration file.
    #[arg(long, default_value = "athena.toml")]
    config: String,
}

fn main() -> anyhow::Result<()> {
    athena_common::logging::init_logging();

    let cli = Cli::parse();
    let raw = fs::read_to_string(&cli.config)
        .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", cli.config))?;
    let config: DaemonConfig = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", cli.config))?;

    tracing::info!(
        forwarder_name = %config.forwarder_name,
        content_store_capacity_mb = config.content_store_capacity_mb,
        link_count = config.links.len(),
        "athena starting"
    );

    let mut adapter = LinkAdapter::new();
    adapter.register_module(Box::new(LoopbackModule::new()));
    adapter.register_module(Box::new(EthernetModule::new()));
    adapter.register_module(Box::new(TcpModule::new()));
    adapter.register_module(Box::new(UdpModule::new()));

    let management_prefix = Name::parse(&format!("ccnx:/local/{}", config.forwarder_name));
    let engine_config = EngineConfig {
        management_prefix,
        content_store_capacity_mb: config.content_store_capacity_mb,
        receive_timeout_ms: 200,
    };
    let mut engine = Engine::new(adapter, engine_config, Box::new(SimpleCodec::new()));

    for uri in &config.links {
        let id = engine
            .open_link(uri)
            .map_err(|e| anyhow::anyhow!("opening link {uri}: {e}"))?;
        tracing::info!(link = %id, uri = %uri, "link opened");
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            tracing::info!("shutdown signal received");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    engine.run(&running);
    tracing::info!("athena shut down");
    Ok(())
}
