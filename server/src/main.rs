use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, DEFAULT_ROUNDS_PER_GAME, DEFAULT_SERVER_NAME, DEFAULT_TOPIC};
use server::network::Server;
use server::questions::CsvQuestionSource;
use shared::{DISCOVERY_PORT, MINIMUM_PLAYERS};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Runs a trivia server on the local network
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server name advertised to clients (at most 32 bytes)
    #[clap(default_value = DEFAULT_SERVER_NAME)]
    name: String,
    /// Question topic, loaded from <questions-dir>/<topic>.csv
    #[clap(short, long, default_value = DEFAULT_TOPIC)]
    topic: String,
    /// Directory holding the question sets
    #[clap(short, long, default_value = "questions")]
    questions_dir: PathBuf,
    /// IP address the game listener binds to
    #[clap(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,
    /// UDP port offers are broadcast to
    #[clap(short, long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,
    /// Maximum number of questions per game
    #[clap(short, long, default_value_t = DEFAULT_ROUNDS_PER_GAME)]
    rounds: u32,
    /// Players needed to start a game
    #[clap(short, long, default_value_t = MINIMUM_PLAYERS)]
    min_players: usize,
    /// Seconds each question stays open
    #[clap(short, long, default_value_t = 10)]
    answer_window: u64,
    /// Seconds without new joins before the game starts
    #[clap(short, long, default_value_t = 10)]
    join_grace: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        name: args.name,
        topic: args.topic,
        questions_dir: args.questions_dir,
        bind_ip: args.bind,
        discovery_target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), args.discovery_port),
        answer_window: Duration::from_secs(args.answer_window),
        join_grace: Duration::from_secs(args.join_grace),
        min_players: args.min_players,
        rounds_per_game: args.rounds,
        ..ServerConfig::default()
    };

    let source = Arc::new(CsvQuestionSource::new(&config.questions_dir));
    let mut server = match Server::new(config, source).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Err(e.into());
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
