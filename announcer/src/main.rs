use announcer::announcer::run_server;
use announcer::config::Settings;
use announcer::notify::Notifier;
use announcer::store::SqliteStore;
use clap::Parser;
use log::info;
use std::path::PathBuf;

/// Announces nukes in flight on a Screeps server to Slack and Discord.
/// Run it on a schedule; every invocation is one polling pass.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server entry in the config file
    #[arg(short, long, env = "NA_SERVER", default_value = "main")]
    server: String,

    /// Path to the TOML config file
    #[arg(short, long, env = "NA_CONFIG", default_value = "nuke-announcer.toml")]
    config: PathBuf,

    /// Path to the SQLite database holding tracked nukes
    #[arg(short, long, env = "NA_DB", default_value = "nukes.db")]
    db: PathBuf,

    /// Prefix every notification with a debug marker
    #[arg(long, env = "DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let settings = Settings::load(&args.config)?;
    let server = settings.server(&args.server)?;
    info!("Checking nukes on {} ({})", args.server, server.url);

    let store = SqliteStore::open(&args.db)?;
    let notifier = Notifier::from_settings(&settings, args.debug)?;

    run_server(server, &store, notifier).await?;

    Ok(())
}
