//! Storage port for the server.
//!
//! Two partitions: identities keyed by login, and items keyed by
//! `(owner, id)`. Every item operation is scoped to an owner, so one
//! identity can never see or touch another identity's rows.
//!
//! Writers take a process-wide exclusive lock; readers do not.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sled::Db;
use tracing::debug;
use uuid::Uuid;

use crate::error::{KeeperError, Result};
use crate::models::{Identity, Item};

/// Capability set over a backing engine.
pub trait ServerStore: Send + Sync {
    /// Creates an identity and returns its fresh id.
    ///
    /// # Errors
    /// [`KeeperError::UserConflict`] if `login` is taken. Check and insert are
    /// atomic, so racing registrations of one login yield exactly one row.
    fn create_identity(&self, login: &str, password: &str) -> Result<String>;

    /// Looks up an identity by login. `Ok(None)` means no such login.
    fn find_identity(&self, login: &str) -> Result<Option<Identity>>;

    /// Inserts or replaces the item `(owner, item.id)`.
    fn put_item(&self, item: &Item, owner: &str) -> Result<()>;

    /// All items of `owner`, ordered by id.
    fn list_items(&self, owner: &str) -> Result<Vec<Item>>;

    /// Removes `(owner, id)`. Unknown ids and foreign owners are a no-op.
    fn delete_item(&self, id: &str, owner: &str) -> Result<()>;
}

fn new_identity_id() -> String {
    Uuid::new_v4().to_string()
}

/// Durable store on sled.
///
/// Item keys are the owner length (u32, big-endian), the owner, then the id.
/// The length makes an owner prefix scan stop at its own partition whatever
/// the owner string holds, and ids stay sorted within it.
#[derive(Clone)]
pub struct SledStorage {
    db: Db,
    identity_tree: sled::Tree,
    item_tree: sled::Tree,
    write_lock: Arc<Mutex<()>>,
}

impl SledStorage {
    /// Open or create the sled database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway database removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let identity_tree = db.open_tree("identities")?;
        let item_tree = db.open_tree("items")?;
        Ok(Self {
            db,
            identity_tree,
            item_tree,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn owner_prefix(owner: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(4 + owner.len());
        key.extend_from_slice(&(owner.len() as u32).to_be_bytes());
        key.extend_from_slice(owner.as_bytes());
        key
    }

    fn item_key(owner: &str, id: &str) -> Vec<u8> {
        let mut key = Self::owner_prefix(owner);
        key.extend_from_slice(id.as_bytes());
        key
    }
}

impl ServerStore for SledStorage {
    fn create_identity(&self, login: &str, password: &str) -> Result<String> {
        let identity = Identity {
            id: new_identity_id(),
            login: login.to_owned(),
            password: password.to_owned(),
        };
        let bytes = serde_json::to_vec(&identity)?;

        let _guard = self.write_lock.lock();
        let swapped = self.identity_tree.compare_and_swap(
            login.as_bytes(),
            None as Option<&[u8]>,
            Some(bytes),
        )?;
        if swapped.is_err() {
            return Err(KeeperError::UserConflict);
        }
        debug!(login, id = %identity.id, "identity created");
        Ok(identity.id)
    }

    fn find_identity(&self, login: &str) -> Result<Option<Identity>> {
        match self.identity_tree.get(login.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_item(&self, item: &Item, owner: &str) -> Result<()> {
        let bytes = serde_json::to_vec(item)?;
        let _guard = self.write_lock.lock();
        self.item_tree.insert(Self::item_key(owner, &item.id), bytes)?;
        Ok(())
    }

    fn list_items(&self, owner: &str) -> Result<Vec<Item>> {
        let mut items = vec![];
        for row in self.item_tree.scan_prefix(Self::owner_prefix(owner)) {
            let (_, value) = row?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn delete_item(&self, id: &str, owner: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.item_tree.remove(Self::item_key(owner, id))?;
        Ok(())
    }
}

/// In-memory store, for tests and throwaway servers.
///
/// Shares the writer discipline of [`SledStorage`]: one mutex serializes all
/// writes, readers only take the read side of each map.
#[derive(Default)]
pub struct MemoryStorage {
    identities: RwLock<HashMap<String, Identity>>,
    items: RwLock<BTreeMap<(String, String), Item>>,
    write_lock: Mutex<()>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerStore for MemoryStorage {
    fn create_identity(&self, login: &str, password: &str) -> Result<String> {
        let _guard = self.write_lock.lock();
        let mut identities = self.identities.write();
        if identities.contains_key(login) {
            return Err(KeeperError::UserConflict);
        }
        let identity = Identity {
            id: new_identity_id(),
            login: login.to_owned(),
            password: password.to_owned(),
        };
        let id = identity.id.clone();
        identities.insert(login.to_owned(), identity);
        Ok(id)
    }

    fn find_identity(&self, login: &str) -> Result<Option<Identity>> {
        Ok(self.identities.read().get(login).cloned())
    }

    fn put_item(&self, item: &Item, owner: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.items
            .write()
            .insert((owner.to_owned(), item.id.clone()), item.clone());
        Ok(())
    }

    fn list_items(&self, owner: &str) -> Result<Vec<Item>> {
        Ok(self
            .items
            .read()
            .iter()
            .filter(|((o, _), _)| o == owner)
            .map(|(_, item)| item.clone())
            .collect())
    }

    fn delete_item(&self, id: &str, owner: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.items.write().remove(&(owner.to_owned(), id.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // Every engine has to pass the same contract.
    fn engines() -> Vec<(&'static str, Arc<dyn ServerStore>)> {
        let sled: Arc<dyn ServerStore> = Arc::new(SledStorage::temporary().expect("temporary sled"));
        let memory: Arc<dyn ServerStore> = Arc::new(MemoryStorage::new());
        vec![("sled", sled), ("memory", memory)]
    }

    #[test]
    fn identity_create_and_find() {
        for (name, store) in engines() {
            let id = store.create_identity("alice", "p1").unwrap();
            assert!(!id.is_empty(), "{name}");

            let found = store.find_identity("alice").unwrap().expect(name);
            assert_eq!(found.id, id, "{name}");
            assert_eq!(found.password, "p1", "{name}");

            assert!(store.find_identity("bob").unwrap().is_none(), "{name}");
        }
    }

    #[test]
    fn duplicate_login_conflicts() {
        for (name, store) in engines() {
            let first = store.create_identity("alice", "p1").unwrap();
            let err = store.create_identity("alice", "other").unwrap_err();
            assert!(matches!(err, KeeperError::UserConflict), "{name}");
            // the first row is untouched
            assert_eq!(store.find_identity("alice").unwrap().unwrap().id, first, "{name}");
        }
    }

    #[test]
    fn concurrent_registration_of_one_login_creates_one_identity() {
        for (name, store) in engines() {
            let results: Vec<Result<String>> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..16)
                    .map(|_| s.spawn(|| store.create_identity("racer", "pw")))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let winners = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(winners, 1, "{name}");
            assert!(results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, KeeperError::UserConflict)));
        }
    }

    #[test]
    fn identity_ids_are_unique() {
        let store = MemoryStorage::new();
        let ids: HashSet<String> = (0..50)
            .map(|i| store.create_identity(&format!("user{i}"), "pw").unwrap())
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn put_item_is_idempotent_upsert() {
        for (name, store) in engines() {
            let item = Item::new("x", "payload").with_annotation("note");
            store.put_item(&item, "owner").unwrap();
            store.put_item(&item, "owner").unwrap();
            assert_eq!(store.list_items("owner").unwrap(), vec![item.clone()], "{name}");

            let replaced = Item::new("x", "changed");
            store.put_item(&replaced, "owner").unwrap();
            assert_eq!(store.list_items("owner").unwrap(), vec![replaced], "{name}");
        }
    }

    #[test]
    fn items_are_partitioned_by_owner() {
        for (name, store) in engines() {
            store.put_item(&Item::new("shared-id", "a's"), "owner-a").unwrap();
            store.put_item(&Item::new("shared-id", "b's"), "owner-b").unwrap();
            store.put_item(&Item::new("other", "a's too"), "owner-a").unwrap();

            let a = store.list_items("owner-a").unwrap();
            assert_eq!(a.len(), 2, "{name}");
            assert!(a.iter().all(|i| i.payload.starts_with("a's")), "{name}");

            let b = store.list_items("owner-b").unwrap();
            assert_eq!(b, vec![Item::new("shared-id", "b's")], "{name}");

            assert!(store.list_items("nobody").unwrap().is_empty(), "{name}");
        }
    }

    #[test]
    fn owner_that_prefixes_another_sees_only_its_own_items() {
        for (name, store) in engines() {
            store.put_item(&Item::new("secret", "b's"), "a/b").unwrap();
            store.put_item(&Item::new("b/secret", "b's too"), "a").unwrap();
            store.put_item(&Item::new("mine", "a's"), "a").unwrap();
            store.put_item(&Item::new("x", "longer owner"), "ab").unwrap();

            let ids: Vec<String> = store.list_items("a").unwrap().into_iter().map(|i| i.id).collect();
            assert_eq!(ids, ["b/secret", "mine"], "{name}");
            assert_eq!(store.list_items("a/b").unwrap(), vec![Item::new("secret", "b's")], "{name}");
            assert_eq!(store.list_items("ab").unwrap().len(), 1, "{name}");

            // same full key text, different partition
            store.delete_item("b/secret", "a").unwrap();
            assert_eq!(store.list_items("a/b").unwrap().len(), 1, "{name}");
        }
    }

    #[test]
    fn list_is_ordered_by_id() {
        for (name, store) in engines() {
            for id in ["c", "a", "b"] {
                store.put_item(&Item::new(id, "p"), "o").unwrap();
            }
            let ids: Vec<String> = store.list_items("o").unwrap().into_iter().map(|i| i.id).collect();
            assert_eq!(ids, ["a", "b", "c"], "{name}");
        }
    }

    #[test]
    fn delete_under_wrong_owner_is_noop() {
        for (name, store) in engines() {
            store.put_item(&Item::new("x", "keep me"), "owner-a").unwrap();

            store.delete_item("x", "owner-b").unwrap();
            store.delete_item("unknown", "owner-a").unwrap();
            assert_eq!(store.list_items("owner-a").unwrap().len(), 1, "{name}");

            store.delete_item("x", "owner-a").unwrap();
            assert!(store.list_items("owner-a").unwrap().is_empty(), "{name}");
        }
    }

    #[test]
    fn sled_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.db");
        let owner = {
            let store = SledStorage::open(&path).unwrap();
            let owner = store.create_identity("alice", "p1").unwrap();
            store.put_item(&Item::new("a", "hello"), &owner).unwrap();
            owner
        };

        let store = SledStorage::open(&path).unwrap();
        assert_eq!(store.find_identity("alice").unwrap().unwrap().id, owner);
        assert_eq!(store.list_items(&owner).unwrap(), vec![Item::new("a", "hello")]);
    }
}
