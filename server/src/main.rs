use clap::Parser;
use log::info;
use server::{Server, ServerConfig};
use shared::{DEFAULT_HOST, DEFAULT_PORT};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Duel session server")]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Do not acknowledge client messages
    #[arg(long)]
    no_acks: bool,
}

/// Binds the server, then serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        send_acks: !args.no_acks,
    };

    let mut server = Server::bind(config).await?;
    server.start()?;
    info!("Serving duel sessions on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    server.stop().await;

    Ok(())
}
