use clap::Parser;
use client::display::Terminal;
use client::input::InputManager;
use client::network::{Client, ClientConfig};
use log::info;
use shared::DISCOVERY_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name to play under instead of the one the server assigns
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// UDP port to listen on for server offers
    #[arg(short = 'p', long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Listening for offers on port {}", args.discovery_port);
    info!("Type yes or no to answer, /name <name> to rename, exit to quit");

    let config = ClientConfig {
        discovery_port: args.discovery_port,
        name: args.name,
        ..ClientConfig::default()
    };

    let mut client = Client::new(config, InputManager::stdin(), Terminal);
    client.run().await?;

    Ok(())
}
