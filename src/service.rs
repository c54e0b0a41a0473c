//! Server core: registration, login, reads and queued writes.
//!
//! Every item operation re-validates its token; nothing carries over between
//! requests. Reads hit the store directly, writes go through the mutation
//! queue, so a read right after a write may not see it yet.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::TokenService;
use crate::error::{KeeperError, Result};
use crate::models::{Item, UserRequest};
use crate::queue::{Command, Mutation, MutationQueue};
use crate::storage::ServerStore;

#[derive(Clone)]
pub struct Keeper {
    store: Arc<dyn ServerStore>,
    tokens: TokenService,
    queue: MutationQueue,
}

impl Keeper {
    pub fn new(store: Arc<dyn ServerStore>, tokens: TokenService, queue: MutationQueue) -> Self {
        Self {
            store,
            tokens,
            queue,
        }
    }

    /// Creates an identity and returns a token for it.
    pub fn register(&self, request: &UserRequest) -> Result<String> {
        request.validate()?;
        let id = self.store.create_identity(&request.login, &request.password)?;
        info!(login = %request.login, "user registered");
        self.tokens.issue(&id)
    }

    /// Checks credentials and returns a fresh token.
    ///
    /// Passwords are stored and compared as plain text.
    pub fn login(&self, request: &UserRequest) -> Result<String> {
        request.validate()?;
        let identity = self
            .store
            .find_identity(&request.login)?
            .ok_or(KeeperError::UserDataConflict)?;
        if identity.password != request.password {
            return Err(KeeperError::UserDataConflict);
        }
        debug!(login = %request.login, "user logged in");
        self.tokens.issue(&identity.id)
    }

    /// Resolves a token to its owner id.
    pub fn authorize(&self, token: &str) -> Result<String> {
        self.tokens.validate(token)
    }

    pub fn read_all(&self, token: &str) -> Result<Vec<Item>> {
        let owner = self.authorize(token)?;
        self.store.list_items(&owner)
    }

    /// Validates the token, then queues the command.
    pub async fn write(&self, token: &str, command: Command) -> Result<()> {
        let owner = self.authorize(token)?;
        self.submit(owner, command).await
    }

    /// Queues a command for an already authorized owner. Invalid payloads
    /// never reach the queue.
    pub async fn submit(&self, owner: String, command: Command) -> Result<()> {
        command.validate()?;
        if self.queue.available() == 0 {
            warn!(%owner, "mutation queue full, waiting for a free slot");
        }
        debug!(%owner, kind = %command.kind(), id = command.item_id(), "mutation queued");
        self.queue.enqueue(Mutation::new(owner, command)).await
    }
}
