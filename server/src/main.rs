use clap::Parser;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// UDP relay for two-player pong sessions
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Number of client slots
    #[clap(short, long, default_value = "256")]
    max_clients: usize,
    /// Accepted frames that may wait for the worker
    #[clap(long, default_value = "100000")]
    queue_capacity: usize,
    /// Milliseconds between idle sweeps
    #[clap(long, default_value = "1000")]
    sweep_interval_ms: u64,
    /// Seconds of silence before a client may be evicted
    #[clap(long, default_value = "10")]
    stale_after_secs: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            max_clients: args.max_clients,
            queue_capacity: args.queue_capacity,
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            stale_after: Duration::from_secs(args.stale_after_secs),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = Server::new(args.into()).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    Ok(())
}
