use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::net::TcpListener;

use keeper::auth::TokenService;
use keeper::cache::LocalCache;
use keeper::client::KeeperClient;
use keeper::config::ClientConfig;
use keeper::models::{DeleteRequest, Item};
use keeper::queue::{Command, MutationWorker};
use keeper::rest::create_router;
use keeper::service::Keeper;
use keeper::storage::{MemoryStorage, ServerStore};
use keeper::KeeperError;

async fn start_server() -> SocketAddr {
    let store: Arc<dyn ServerStore> = Arc::new(MemoryStorage::new());
    let (queue, worker) = MutationWorker::spawn(store.clone(), 64);
    let app = create_router(Keeper::new(store, TokenService::new("e2e_secret", 5).unwrap(), queue));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // keep the worker alive as long as the server task
        let _worker = worker;
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> KeeperClient {
    let config = ClientConfig {
        server_url: format!("http://{}", addr),
        ..ClientConfig::default()
    };
    KeeperClient::new(config, LocalCache::temporary().unwrap())
}

/// Writes are applied asynchronously; poll until the server shows `expected`.
async fn wait_for(client: &KeeperClient, expected: &[Item]) -> Vec<Item> {
    for _ in 0..100 {
        let items = client.fetch_all().await.unwrap();
        if items == expected {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    client.fetch_all().await.unwrap()
}

#[tokio::test]
async fn register_write_and_read_back() {
    let addr = start_server().await;
    let mut client = client_for(addr);
    client.register("alice", "p1").await.unwrap();
    assert!(client.is_ready());

    client.apply(Command::Set(Item::new("a", "one"))).await.unwrap();
    client
        .apply(Command::Set(Item::new("b", "two").with_annotation("m")))
        .await
        .unwrap();
    client.apply(Command::Update(Item::new("a", "uno"))).await.unwrap();
    client.apply(Command::Delete(DeleteRequest::new("b"))).await.unwrap();

    let expected = vec![Item::new("a", "uno")];
    assert_eq!(wait_for(&client, &expected).await, expected);
    assert_eq!(client.local_items().unwrap(), expected);
}

#[tokio::test]
async fn second_device_pulls_items_on_login() {
    let addr = start_server().await;
    let mut laptop = client_for(addr);
    laptop.register("bob", "secret").await.unwrap();
    laptop.apply(Command::Set(Item::new("k", "v"))).await.unwrap();
    wait_for(&laptop, &[Item::new("k", "v")]).await;

    let mut phone = client_for(addr);
    phone.cache().upsert(&Item::new("k", "stale")).unwrap();
    phone.cache().upsert(&Item::new("draft", "offline")).unwrap();
    phone.login("bob", "secret").await.unwrap();
    assert_eq!(phone.actualize_storage().await.unwrap(), 1);

    assert_eq!(
        phone.local_items().unwrap(),
        vec![Item::new("draft", "offline"), Item::new("k", "v")]
    );
}

#[tokio::test]
async fn concurrent_registration_has_one_winner() {
    let addr = start_server().await;
    let attempts = (0..8).map(|i| async move {
        let mut client = client_for(addr);
        client.register("carol", &format!("p{}", i)).await
    });
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, KeeperError::UserConflict)));
}

#[tokio::test]
async fn credential_and_token_failures_map_to_errors() {
    let addr = start_server().await;
    let mut client = client_for(addr);
    client.register("dave", "right").await.unwrap();

    let mut other = client_for(addr);
    assert!(matches!(
        other.login("dave", "wrong").await,
        Err(KeeperError::UserDataConflict)
    ));
    assert!(matches!(
        other.register("dave", "again").await,
        Err(KeeperError::UserConflict)
    ));
    assert!(matches!(
        other.login("", "").await,
        Err(KeeperError::BadRequest(_))
    ));

    let forged = client_for(addr).with_token("not-a-token");
    assert!(matches!(forged.fetch_all().await, Err(KeeperError::InvalidToken)));

    let expired = TokenService::new("e2e_secret", 0).unwrap().issue("someone").unwrap();
    let stale = client_for(addr).with_token(expired);
    assert!(matches!(stale.fetch_all().await, Err(KeeperError::ExpiredToken)));
    assert!(matches!(
        stale.send(&Command::Set(Item::new("x", "y"))).await,
        Err(KeeperError::ExpiredToken)
    ));
}

#[tokio::test]
async fn users_are_isolated() {
    let addr = start_server().await;
    let mut erin = client_for(addr);
    erin.register("erin", "1").await.unwrap();
    let mut frank = client_for(addr);
    frank.register("frank", "2").await.unwrap();

    erin.apply(Command::Set(Item::new("shared-id", "erin's"))).await.unwrap();
    frank.apply(Command::Set(Item::new("shared-id", "frank's"))).await.unwrap();
    // both rows are on the server before frank deletes his
    assert_eq!(
        wait_for(&erin, &[Item::new("shared-id", "erin's")]).await,
        vec![Item::new("shared-id", "erin's")]
    );
    assert_eq!(
        wait_for(&frank, &[Item::new("shared-id", "frank's")]).await,
        vec![Item::new("shared-id", "frank's")]
    );

    frank.apply(Command::Delete(DeleteRequest::new("shared-id"))).await.unwrap();
    assert!(wait_for(&frank, &[]).await.is_empty());
    assert_eq!(
        erin.fetch_all().await.unwrap(),
        vec![Item::new("shared-id", "erin's")]
    );
}
