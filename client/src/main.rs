use clap::Parser;
use client::input::CirclingBot;
use client::network::{Client, ClientConfig};
use client::rendering::LogRenderer;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Milliseconds between published updates
    #[arg(short = 'u', long, default_value = "50", value_parser = clap::value_parser!(u64).range(1..))]
    update_interval: u64,

    /// Render frames per second
    #[arg(short = 'f', long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..=1000))]
    frame_rate: u64,

    /// Reconnect this many milliseconds after losing the connection
    #[arg(short = 'r', long)]
    reconnect_delay: Option<u64>,

    /// Drop peers not heard from for this many seconds
    #[arg(long)]
    peer_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        server_url: args.server,
        outbound_interval: Duration::from_millis(args.update_interval),
        frame_interval: Duration::from_micros(1_000_000 / args.frame_rate),
        reconnect_delay: args.reconnect_delay.map(Duration::from_millis),
        peer_timeout: args.peer_timeout.map(Duration::from_secs),
    };

    info!("Starting client...");
    info!(
        "Publishing every {:?}, rendering every {:?}",
        config.outbound_interval, config.frame_interval
    );

    let bot = CirclingBot::random(&mut rand::thread_rng());
    info!("Bot walking at {:.1} units/s", bot.speed());

    // Log peer positions about once a second
    let renderer = LogRenderer::new(args.frame_rate);

    let mut client = Client::new(config, renderer, bot);
    client.run().await?;

    Ok(())
}
