use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::bot::Autoplayer;
use server::utils::{now_ms, remaining};
use shared::{decode, read_frame, write_frame, ClientMessage, Phase, ServerMessage, SessionView};
use std::time::Duration;
use tokio::net::TcpStream;

/// Scripted player that joins a room and plays until the scoreboard.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Room to join
    #[clap(short, long, default_value = "lobby")]
    room: String,
    /// Display name
    #[clap(short, long, default_value = "Bot")]
    name: String,
    /// Player identity; reuse it to reconnect into the same seat
    #[clap(long)]
    id: Option<String>,
    /// Seed for the bot's guesses
    #[clap(long)]
    seed: Option<u64>,
    /// Pause before each move, in milliseconds
    #[clap(long, default_value = "250")]
    think_ms: u64,
}

fn print_view(view: &SessionView) {
    let me = view.me();
    let role = me
        .and_then(|p| p.role)
        .map(|r| r.label())
        .unwrap_or("-");
    let countdown = view
        .police_guess_deadline
        .or(view.next_round_deadline)
        .map(|deadline| format!(" ({}s left)", remaining(deadline, now_ms()).as_secs()))
        .unwrap_or_default();
    println!(
        "round {}/{} {:?}{} | my card: {} | {}",
        view.round,
        view.total_rounds,
        view.phase,
        countdown,
        role,
        view.players
            .iter()
            .map(|p| format!("{}={}", p.name, p.score))
            .collect::<Vec<_>>()
            .join(" ")
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let player_id = args
        .id
        .unwrap_or_else(|| format!("bot-{:08x}", rng.gen::<u32>()));

    let mut stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {} as {}", args.server, player_id);

    write_frame(
        &mut stream,
        &ClientMessage::Join {
            room_id: args.room.clone(),
            player_id: player_id.clone(),
            name: args.name.clone(),
        },
    )
    .await?;

    let mut bot = Autoplayer::new();
    while let Some(frame) = read_frame(&mut stream).await? {
        let message = match decode::<ServerMessage>(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring undecodable frame: {}", e);
                continue;
            }
        };

        match message {
            ServerMessage::State(view) => {
                print_view(&view);
                if view.phase == Phase::Scoreboard {
                    println!("Game over");
                    return Ok(());
                }
                if let Some(command) = bot.next_move(&view, &mut rng) {
                    tokio::time::sleep(Duration::from_millis(args.think_ms)).await;
                    info!("Sending {:?}", command);
                    write_frame(&mut stream, &ClientMessage::Command(command)).await?;
                }
            }
            ServerMessage::Error { message } => {
                eprintln!("Server refused us: {}", message);
                return Ok(());
            }
            ServerMessage::Notification {
                from_name,
                notification,
                ..
            } => info!("{}: {:?}", from_name, notification),
            ServerMessage::Signal { from_id, payload } => {
                info!("Signal from {} ({} bytes)", from_id, payload.len())
            }
            ServerMessage::Rooms(_) => {}
        }
    }

    println!("Server closed the connection");
    Ok(())
}
