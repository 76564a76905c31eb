//! SRTLA Send - bonding proxy for a local SRT encoder
//!
//! Listens on a loopback UDP port for an SRT stream and spreads it across
//! multiple egress paths to an SRTLA receiver. Each `--path` selects a local
//! bind address (and thereby an egress interface); the tool binds and
//! connects the socket before handing it to the engine.

use clap::Parser;
use srtla_cli::{display_path_stats, Config, PathEntry};
use srtla_core::{EngineConfig, PathSpec, SrtlaSender};
use srtla_io::UdpEndpoint;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "srtla-send")]
#[command(about = "SRTLA bonding sender", long_about = None)]
struct Args {
    /// Local UDP port the SRT encoder sends to
    #[arg(short, long, default_value = "6000")]
    local_port: u16,

    /// SRTLA receiver (host:port)
    #[arg(short, long)]
    receiver: Option<String>,

    /// Egress path: bind_addr[,kind[,weight]] (repeatable),
    /// e.g. "192.168.1.23:0,wifi,2"
    #[arg(short, long)]
    path: Vec<String>,

    /// TOML configuration file (overrides the flags above)
    #[arg(short, long)]
    config: Option<String>,

    /// Statistics interval in seconds
    #[arg(long, default_value = "1")]
    stats: u64,
}

fn parse_path_arg(arg: &str) -> anyhow::Result<PathEntry> {
    let mut parts = arg.split(',');
    let bind: SocketAddr = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty path spec"))?
        .parse()?;
    let kind = parts.next().unwrap_or("unknown").to_string();
    let weight: u32 = match parts.next() {
        Some(w) => w.parse()?,
        None => 1,
    };
    Ok(PathEntry {
        bind,
        kind,
        weight,
        virtual_ip: None,
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (local_port, receiver_host, receiver_port, paths, stats_interval) =
        if let Some(config_path) = &args.config {
            let config = Config::from_file(config_path)?;
            let s = config.sender;
            (
                s.local_port,
                s.receiver_host.clone(),
                s.receiver_port,
                s.paths,
                Duration::from_secs(s.stats_interval_secs),
            )
        } else {
            let receiver = args
                .receiver
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--receiver or --config is required"))?;
            let (host, port) = receiver
                .rsplit_once(':')
                .ok_or_else(|| anyhow::anyhow!("receiver must be host:port"))?;
            let paths: Vec<PathEntry> = args
                .path
                .iter()
                .map(|p| parse_path_arg(p))
                .collect::<Result<_, _>>()?;
            (
                args.local_port,
                host.to_string(),
                port.parse()?,
                paths,
                Duration::from_secs(args.stats),
            )
        };

    if paths.is_empty() {
        anyhow::bail!("at least one --path is required");
    }

    tracing::info!("SRTLA sender starting...");

    let sender = SrtlaSender::start(EngineConfig {
        local_port,
        receiver_host,
        receiver_port,
    })?;
    let receiver_addr = sender.receiver_addr();

    for entry in paths {
        let endpoint = UdpEndpoint::bind(entry.bind)?;
        endpoint.connect(receiver_addr)?;
        let local = endpoint.local_addr()?;

        let vip = sender.add_path(
            endpoint.into_udp_socket(),
            PathSpec {
                virtual_ip: entry.virtual_ip,
                weight: entry.weight,
                kind: entry.kind.clone(),
            },
        )?;
        tracing::info!(
            "path {} ({}) bound to {} -> {}",
            vip,
            entry.kind,
            local,
            receiver_addr
        );
    }

    tracing::info!(
        "encoder port udp://127.0.0.1:{}, {} path(s) registering",
        sender.local_addr()?.port(),
        sender.stats_snapshot().len()
    );

    loop {
        thread::sleep(stats_interval);
        display_path_stats(&sender.stats_snapshot(), sender.dropped_datagrams());
    }
}
