//! Client reconciliation.
//!
//! Pulls the authoritative item set and overwrites matching local rows. It
//! never deletes: local items the server does not return are kept, and on an
//! id collision the server's value wins.

use async_trait::async_trait;
use tracing::info;

use crate::cache::LocalCache;
use crate::error::Result;
use crate::models::Item;

/// Anything that can hand over the caller's full item set.
#[async_trait]
pub trait RemoteItems: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Item>>;
}

/// Merges the remote snapshot into `cache`. Returns how many rows were written.
///
/// Stops at the first local write error; rows written before it stay.
pub async fn actualize<R>(remote: &R, cache: &LocalCache) -> Result<usize>
where
    R: RemoteItems + ?Sized,
{
    let snapshot = remote.fetch_all().await?;
    for item in &snapshot {
        cache.upsert(item)?;
    }
    info!(items = snapshot.len(), "local storage actualized");
    Ok(snapshot.len())
}
