//! airlockd: Airlock peer-to-peer chat circle.
//!
//! Reads lines from stdin and broadcasts them to the circle; prints lines from
//! other members to stdout. Logs go to stderr (`RUST_LOG=airlock_services=debug`).

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use airlock_core::config::AirlockConfig;
use airlock_core::PeerAddress;
use airlock_services::{ChatLine, Node, NodeSettings};

/// Command-line flags. Anything given here overrides the config file and env.
#[derive(Debug, Parser)]
#[command(name = "airlockd", version, about = "Join or start an Airlock chat circle")]
struct Cli {
    /// Existing member to join through, as host:port.
    #[arg(short = 't', long)]
    target: Option<String>,

    /// UDP port to listen on.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Display name shown to other members.
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Address to bind the listen socket on.
    #[arg(long)]
    host: Option<String>,

    /// Give up joining after this many seconds. 0 waits forever.
    #[arg(long, value_name = "SECS")]
    discovery_timeout: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut AirlockConfig) {
        if let Some(t) = &self.target {
            config.network.bootstrap = Some(t.clone());
        }
        if let Some(p) = self.port {
            config.network.port = p;
        }
        if let Some(u) = &self.username {
            config.identity.display_name = u.clone();
        }
        if let Some(h) = &self.host {
            config.network.host = h.clone();
        }
        if let Some(s) = self.discovery_timeout {
            config.discovery.timeout_secs = s;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let result = runtime.block_on(run(cli));

    // stdin is read on a blocking thread that may never return; don't wait for it.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    // Load config
    if let Err(e) = AirlockConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = AirlockConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AirlockConfig::default()
    });
    cli.apply(&mut config);

    let host: IpAddr = config
        .network
        .host
        .parse()
        .with_context(|| format!("invalid listen host {:?}", config.network.host))?;
    let listen = SocketAddr::new(host, config.network.port);

    let node = Node::bind(
        listen,
        config.identity.display_name.clone(),
        NodeSettings::from_config(&config),
    )?;

    let (chat_tx, chat_rx) = mpsc::unbounded_channel::<ChatLine>();
    let inbound_task = node.start_inbound(chat_tx);
    let printer_task = tokio::spawn(print_chat(chat_rx));

    if let Some(target) = config.network.bootstrap.as_deref() {
        let bootstrap = resolve(target, host).await?;
        tracing::info!(%bootstrap, "joining circle");
        let report = node.join(bootstrap).await.context("failed to join circle")?;
        tracing::info!(
            learned = report.learned.len(),
            failed = report.failed,
            members = node.directory().len(),
            "joined circle"
        );
    }

    let heartbeat_task = node.start_heartbeat();

    let broadcaster = node.broadcaster();
    let stdin = BufReader::new(tokio::io::stdin());

    tokio::select! {
        r = broadcaster.run(stdin) => match r {
            Ok(end) => tracing::info!(?end, "broadcaster finished"),
            Err(e) => tracing::error!(error = %e, "broadcaster failed"),
        },
        _ = tokio::signal::ctrl_c()  => tracing::info!("shutdown signal received"),
        r = inbound_task             => tracing::error!("inbound handler exited: {:?}", r),
        r = heartbeat_task           => tracing::error!("heartbeat sender exited: {:?}", r),
        r = printer_task             => tracing::error!("chat printer exited: {:?}", r),
    }

    node.shutdown();
    Ok(())
}

async fn print_chat(mut rx: mpsc::UnboundedReceiver<ChatLine>) {
    while let Some(line) = rx.recv().await {
        println!("{line}");
    }
}

/// Resolve `host:port`, preferring an address in the same family as `listen`.
async fn resolve(target: &str, listen: IpAddr) -> Result<PeerAddress> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(target)
        .await
        .with_context(|| format!("failed to resolve target {target:?}"))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4() == listen.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .map(PeerAddress::from)
        .with_context(|| format!("target {target:?} resolved to no addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_match_reference_tool() {
        let cli = Cli::try_parse_from(["airlockd", "-t", "127.0.0.1:9001", "-p", "9002", "-u", "R"])
            .unwrap();
        let mut config = AirlockConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.network.bootstrap.as_deref(), Some("127.0.0.1:9001"));
        assert_eq!(config.network.port, 9002);
        assert_eq!(config.identity.display_name, "R");
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::try_parse_from(["airlockd"]).unwrap();
        let mut config = AirlockConfig::default();
        config.network.port = 9500;
        cli.apply(&mut config);

        assert_eq!(config.network.port, 9500);
        assert!(config.network.bootstrap.is_none());
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Cli::try_parse_from(["airlockd", "-p", "99999"]).is_err());
    }

    #[tokio::test]
    async fn resolve_literal_address() {
        let addr = resolve("127.0.0.1:9001", "127.0.0.1".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(addr, "127.0.0.1:9001".parse::<PeerAddress>().unwrap());
    }

    #[tokio::test]
    async fn resolve_rejects_missing_port() {
        assert!(resolve("127.0.0.1", "127.0.0.1".parse().unwrap()).await.is_err());
    }
}
