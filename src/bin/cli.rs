use std::fs;
use std::path::Path;

use clap::{Parser, Subcommand};
use tracing::debug;
use uuid::Uuid;

use keeper::client::KeeperClient;
use keeper::config::{ClientConfig, CLIENT_SETTINGS_FILE};
use keeper::models::{DeleteRequest, Item};
use keeper::queue::Command;
use keeper::telemetry;
use keeper::KeeperError;

#[derive(Parser)]
#[command(name = "keeper-cli")]
#[command(about = "CLI for the keeper item store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `server_url` from client_settings.yml
    #[arg(short, long)]
    url: Option<String>,

    #[arg(long, default_value = CLIENT_SETTINGS_FILE)]
    settings: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        login: String,
        #[arg(short, long)]
        password: String,
    },
    /// Log in and pull the server's items into the local store
    Login {
        #[arg(short, long)]
        login: String,
        #[arg(short, long)]
        password: String,
    },
    /// Add an item under a fresh id
    Add {
        #[arg(short, long)]
        data: String,
        #[arg(short, long, default_value = "")]
        metadata: String,
    },
    Update {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        data: String,
        #[arg(short, long, default_value = "")]
        metadata: String,
    },
    Delete {
        #[arg(short, long)]
        id: String,
    },
    /// Show local items, or the server's with --remote
    List {
        #[arg(long)]
        remote: bool,
    },
    Sync,
    Logout,
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = telemetry::init(false, "keeper=warn");

    let mut config = ClientConfig::load(&cli.settings)?;
    if let Some(url) = cli.url {
        config.server_url = url;
    }
    let token_file = config.token_file.clone();

    if let Commands::Version = cli.command {
        println!("keeper-cli {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if let Commands::Logout = cli.command {
        if Path::new(&token_file).exists() {
            fs::remove_file(&token_file)?;
        }
        println!("Logged out.");
        return Ok(());
    }

    let mut client = KeeperClient::open(config)?;
    if let Some(token) = read_token(&token_file) {
        client = client.with_token(token);
    }

    match cli.command {
        Commands::Register { login, password } => {
            let token = client.register(&login, &password).await?;
            fs::write(&token_file, token)?;
            println!("Registered {}. Token saved to {}", login, token_file);
        }
        Commands::Login { login, password } => {
            let token = client.login(&login, &password).await?;
            fs::write(&token_file, token)?;
            let pulled = client.actualize_storage().await?;
            println!("Logged in. {} item(s) pulled from server", pulled);
        }
        Commands::Add { data, metadata } => {
            let id = Uuid::new_v4().to_string();
            let item = Item::new(id.clone(), data).with_annotation(metadata);
            report(client.apply(Command::Set(item)).await)?;
            println!("Added {}", id);
        }
        Commands::Update { id, data, metadata } => {
            let item = Item::new(id.clone(), data).with_annotation(metadata);
            report(client.apply(Command::Update(item)).await)?;
            println!("Updated {}", id);
        }
        Commands::Delete { id } => {
            report(client.apply(Command::Delete(DeleteRequest::new(id.clone()))).await)?;
            println!("Deleted {}", id);
        }
        Commands::List { remote } => {
            let items = if remote {
                client.fetch_all().await?
            } else {
                client.local_items()?
            };
            for item in items {
                if item.annotation.is_empty() {
                    println!("{}\t{}", item.id, item.payload);
                } else {
                    println!("{}\t{}\t[{}]", item.id, item.payload, item.annotation);
                }
            }
        }
        Commands::Sync => {
            let pulled = client.actualize_storage().await?;
            println!("{} item(s) pulled from server", pulled);
        }
        Commands::Logout | Commands::Version => {}
    }

    client.cache().flush()?;
    Ok(())
}

fn read_token(path: &str) -> Option<String> {
    let token = fs::read_to_string(path).ok()?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Local writes stick even if the server refuses them; say so before failing.
fn report(result: keeper::Result<()>) -> keeper::Result<()> {
    if let Err(e) = &result {
        debug!("remote write failed: {:?}", e);
        match e {
            KeeperError::BadRequest(reason) => eprintln!("Invalid item: {}", reason),
            KeeperError::NotLoggedIn => eprintln!("Not logged in: change kept locally only"),
            KeeperError::ExpiredToken => eprintln!("Session expired: log in again to sync"),
            _ => eprintln!("Server rejected the change: kept locally only"),
        }
    }
    result
}
