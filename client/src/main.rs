use clap::Parser;
use client::{ClientSession, EventKind, SessionEvent};
use log::{info, warn};
use shared::codec::decode_state;
use shared::game::GameState;
use shared::{StateMap, DEFAULT_HOST, DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Duel session console client", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connection { id } => println!("* joined as participant {}", id),
        SessionEvent::GameStart => println!("* game start"),
        SessionEvent::GameUpdate { state } => {
            let game = decode_state(state, GameState::new());
            println!(
                "* update: turn {}, {} animals, {} resources{}",
                game.current_turn,
                game.animals.len(),
                game.resources.len(),
                if game.game_over { ", game over" } else { "" }
            );
        }
        SessionEvent::Chat { sender_id, message } => println!("<{}> {}", sender_id, message),
        SessionEvent::Disconnect => println!("* disconnected"),
    }
}

/// Lines starting with `{` are sent as action fragments, anything else as chat.
async fn send_line(session: &ClientSession, line: &str) -> bool {
    if line.starts_with('{') {
        match serde_json::from_str::<StateMap>(line) {
            Ok(fragment) => session.send_action(fragment).await,
            Err(e) => {
                warn!("Not a JSON object: {}", e);
                true
            }
        }
    } else {
        session.send_chat(line).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let session = ClientSession::default();
    for kind in [
        EventKind::Connection,
        EventKind::GameStart,
        EventKind::GameUpdate,
        EventKind::Chat,
        EventKind::Disconnect,
    ] {
        session.register(kind, print_event);
    }

    if !session.connect(&args.host, args.port).await {
        eprintln!("Could not connect to {}:{}", args.host, args.port);
        std::process::exit(1);
    }
    info!("Type a chat message, or a JSON object to send an action");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if !line.is_empty() && !send_line(&session, line).await {
                        warn!("Message was not delivered");
                    }
                }
                None => break,
            },
        }
    }

    session.disconnect().await;
    Ok(())
}
