//! HTTP client for the keeper API with a local replica.
//!
//! Writes land in the local cache first and are then pushed to the server.
//! A failed push leaves the local change in place; the next
//! `actualize_storage` brings back whatever the server holds.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::config::ClientConfig;
use crate::error::{KeeperError, Result};
use crate::models::{Item, ItemsResponse, TokenResponse, UserRequest};
use crate::queue::Command;
use crate::sync::{self, RemoteItems};

pub struct KeeperClient {
    http: Client,
    config: ClientConfig,
    token: Option<String>,
    cache: LocalCache,
}

impl KeeperClient {
    pub fn new(config: ClientConfig, cache: LocalCache) -> Self {
        Self {
            http: Client::new(),
            config,
            token: None,
            cache,
        }
    }

    /// Opens the local replica at `config.db_location`.
    pub fn open(config: ClientConfig) -> Result<Self> {
        let cache = LocalCache::open(&config.db_location)?;
        Ok(Self::new(config, cache))
    }

    /// Reuses a token obtained earlier.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.token.is_some()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub async fn register(&mut self, login: &str, password: &str) -> Result<String> {
        let url = self.config.registration_url();
        self.authenticate(&url, login, password).await
    }

    pub async fn login(&mut self, login: &str, password: &str) -> Result<String> {
        let url = self.config.auth_url();
        self.authenticate(&url, login, password).await
    }

    async fn authenticate(&mut self, url: &str, login: &str, password: &str) -> Result<String> {
        let res = self
            .http
            .post(url)
            .json(&UserRequest::new(login, password))
            .send()
            .await?;

        let body: TokenResponse = match res.status() {
            StatusCode::OK => res.json().await?,
            StatusCode::CONFLICT => return Err(KeeperError::UserConflict),
            StatusCode::FORBIDDEN => return Err(KeeperError::UserDataConflict),
            other => return Err(common_status(other, res).await),
        };
        self.token = Some(body.token.clone());
        debug!(%login, "token obtained");
        Ok(body.token)
    }

    /// The caller's full item set as the server sees it.
    pub async fn fetch_all(&self) -> Result<Vec<Item>> {
        let res = self.item_request(Method::GET, None::<&()>).await?;
        match res.status() {
            StatusCode::OK => Ok(res.json::<ItemsResponse>().await?.data),
            other => Err(item_status(other, res).await),
        }
    }

    /// Pushes one command to the server. Acceptance means queued, not applied.
    pub async fn send(&self, command: &Command) -> Result<()> {
        let res = match command {
            Command::Set(item) => self.item_request(Method::POST, Some(item)).await?,
            Command::Update(item) => self.item_request(Method::PATCH, Some(item)).await?,
            Command::Delete(request) => self.item_request(Method::DELETE, Some(request)).await?,
        };
        match res.status() {
            StatusCode::OK => Ok(()),
            other => Err(item_status(other, res).await),
        }
    }

    /// Applies the command locally, then sends it.
    pub async fn apply(&self, command: Command) -> Result<()> {
        command.validate()?;
        match &command {
            Command::Set(item) | Command::Update(item) => self.cache.upsert(item)?,
            Command::Delete(request) => self.cache.remove(&request.id)?,
        }
        if let Err(e) = self.send(&command).await {
            warn!(kind = %command.kind(), id = command.item_id(), "remote write failed: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Pulls the server's items into the local cache.
    pub async fn actualize_storage(&self) -> Result<usize> {
        sync::actualize(self, &self.cache).await
    }

    pub fn local_items(&self) -> Result<Vec<Item>> {
        self.cache.list()
    }

    async fn item_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        body: Option<&B>,
    ) -> Result<Response> {
        let token = self.token.as_deref().ok_or(KeeperError::NotLoggedIn)?;
        let mut req = self
            .http
            .request(method, self.config.items_url())
            .header("Authorization", format!("Bearer {}", token));
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }
}

#[async_trait]
impl RemoteItems for KeeperClient {
    async fn fetch_all(&self) -> Result<Vec<Item>> {
        KeeperClient::fetch_all(self).await
    }
}

async fn item_status(status: StatusCode, res: Response) -> KeeperError {
    match status {
        StatusCode::FORBIDDEN => KeeperError::InvalidToken,
        StatusCode::UNAUTHORIZED => KeeperError::ExpiredToken,
        other => common_status(other, res).await,
    }
}

async fn common_status(status: StatusCode, res: Response) -> KeeperError {
    match status {
        StatusCode::BAD_REQUEST => {
            let reason = res.text().await.unwrap_or_default();
            KeeperError::BadRequest(reason)
        }
        StatusCode::INTERNAL_SERVER_ERROR => KeeperError::InternalServer,
        other => KeeperError::UnexpectedStatus(other.as_u16()),
    }
}
