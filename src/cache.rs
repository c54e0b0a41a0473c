use std::path::Path;

use sled::Db;

use crate::error::Result;
use crate::models::Item;

/// The client's own durable copy of its items, keyed by id.
///
/// Single tenant: there is no owner column, the whole cache belongs to
/// whoever runs the client.
#[derive(Clone)]
pub struct LocalCache {
    db: Db,
    item_tree: sled::Tree,
}

impl LocalCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway cache removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let item_tree = db.open_tree("items")?;
        Ok(Self { db, item_tree })
    }

    /// Insert or replace by id.
    pub fn upsert(&self, item: &Item) -> Result<()> {
        self.item_tree
            .insert(item.id.as_bytes(), serde_json::to_vec(item)?)?;
        Ok(())
    }

    /// Every cached item, ordered by id.
    pub fn list(&self) -> Result<Vec<Item>> {
        let mut items = vec![];
        for row in self.item_tree.iter() {
            let (_, value) = row?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    /// Removing an unknown id is not an error.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.item_tree.remove(id.as_bytes())?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
