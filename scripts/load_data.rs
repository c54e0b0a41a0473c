//! Seeds the server store with a demo account and a few items.
//!
//! Run with the server stopped: cargo run --bin load_data
//! Log in afterwards as demo / demo.

use keeper::config::{ServerConfig, SERVER_SETTINGS_FILE};
use keeper::models::Item;
use keeper::storage::{ServerStore, SledStorage};
use keeper::KeeperError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(SERVER_SETTINGS_FILE)?;
    let storage = SledStorage::open(&config.db_location)?;

    let owner = match storage.create_identity("demo", "demo") {
        Ok(id) => id,
        Err(KeeperError::UserConflict) => {
            // rerun: reuse the existing account
            storage
                .find_identity("demo")?
                .ok_or("demo account vanished")?
                .id
        }
        Err(e) => return Err(e.into()),
    };

    let samples = [
        ("wifi", "home-network / hunter2", "router in the hallway"),
        ("bank-card", "4111 1111 1111 1111 12/29", ""),
        ("note-1", "buy milk", "shopping"),
        ("note-2", "call the dentist", ""),
        ("ssh", "id_ed25519 passphrase: correct horse", "laptop"),
    ];
    for (id, data, metadata) in samples {
        storage.put_item(&Item::new(id, data).with_annotation(metadata), &owner)?;
    }
    storage.flush().await?;

    println!(
        "Loaded {} items for demo (id {}) into {}",
        samples.len(),
        owner,
        config.db_location
    );
    Ok(())
}
