use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, SessionConfig};
use server::network::Server;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// How long the dealing animation lasts, in milliseconds
        #[clap(long, default_value = "3000")]
        deal_delay_ms: u64,
        /// Seconds the police gets to name a suspect
        #[clap(long, default_value = "30")]
        guess_seconds: u64,
        /// Seconds the result stays up before the room moves on
        #[clap(long, default_value = "15")]
        next_round_seconds: u64,
        /// Rounds per game for new rooms (1-20)
        #[clap(short, long, default_value = "5")]
        total_rounds: u32,
        /// Seconds an empty room lingers before it is closed
        #[clap(long, default_value = "60")]
        idle_room_seconds: u64,
        /// Seconds before an unrefreshed room drops out of the directory
        #[clap(long, default_value = "60")]
        directory_stale_seconds: u64,
        /// Seconds between directory sweeps
        #[clap(long, default_value = "15")]
        directory_sweep_seconds: u64,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = Args::parse();

    let session = SessionConfig {
        deal_delay: Duration::from_millis(args.deal_delay_ms),
        police_guess_timeout: Duration::from_secs(args.guess_seconds),
        next_round_timeout: Duration::from_secs(args.next_round_seconds),
        ..SessionConfig::default()
    }
    .with_total_rounds(args.total_rounds);

    if session.total_rounds != args.total_rounds {
        info!("Round count clamped to {}", session.total_rounds);
    }

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        session,
        idle_room_timeout: Duration::from_secs(args.idle_room_seconds),
        directory_stale_after: Duration::from_secs(args.directory_stale_seconds),
        directory_sweep_interval: Duration::from_secs(args.directory_sweep_seconds.max(1)),
    };

    let server = Server::bind(config).await?;
    let server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
