use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use server::relay::RelayConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Seconds between liveness sweeps
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval: u64,

    /// Seconds of silence before a player is evicted
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// Maximum number of concurrent players
    #[arg(short, long, default_value = "32")]
    max_players: usize,

    /// Reject updates moving faster than this many units per second
    #[arg(long)]
    max_speed: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        sweep_interval: Duration::from_secs(args.sweep_interval),
        relay: RelayConfig {
            session_timeout: Duration::from_secs(args.timeout),
            max_players: args.max_players,
            max_speed: args.max_speed,
            ..RelayConfig::default()
        },
    };

    info!("Starting relay server...");
    info!(
        "Sweeping every {}s, evicting after {}s of silence",
        args.sweep_interval, args.timeout
    );
    if let Some(max_speed) = args.max_speed {
        info!("Rejecting movement faster than {} units/s", max_speed);
    }

    let server = Server::bind(config).await?;
    server.run().await?;

    Ok(())
}
