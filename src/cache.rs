//! Local persistent collection cache.
//!
//! One entry per `(user id, collection)`, held in a fast in-memory map and
//! mirrored to a JSON file so the next sign-in paints instantly and the UI
//! survives a slow or failing remote store. Every write is a
//! full-collection replace; there is no partial patching and therefore no
//! read-modify-write race. The cache is an injected service instance, not a
//! process-wide singleton, so its lifecycle follows the application's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::entities::Collection;
use crate::errors::CacheError;

/// Best-effort mirror of the aggregate state, keyed per user and collection.
#[derive(Debug)]
pub struct LocalCache {
    dir: PathBuf,
    mem: RwLock<HashMap<(String, Collection), String>>,
}

impl LocalCache {
    /// Opens the cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            mem: RwLock::new(HashMap::new()),
        })
    }

    fn entry_path(&self, user_id: &str, collection: Collection) -> PathBuf {
        self.dir
            .join(format!("{user_id}_{}.json", collection.as_str()))
    }

    /// Reads one collection entry, if present. Falls through to the file
    /// when the in-memory map has no entry yet (fresh process).
    pub fn read<T: DeserializeOwned>(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<Option<Vec<T>>, CacheError> {
        let key = (user_id.to_string(), collection);
        {
            let mem = self
                .mem
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(payload) = mem.get(&key) {
                trace!(user_id, collection = collection.as_str(), "cache mem hit");
                return Ok(Some(serde_json::from_str(payload)?));
            }
        }

        let payload = match std::fs::read_to_string(self.entry_path(user_id, collection)) {
            Ok(payload) => payload,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let items: Vec<T> = serde_json::from_str(&payload)?;
        self.mem
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, payload);
        debug!(
            user_id,
            collection = collection.as_str(),
            count = items.len(),
            "cache file hit"
        );
        Ok(Some(items))
    }

    /// Replaces one collection entry, in memory and on disk.
    pub fn write<T: Serialize>(
        &self,
        user_id: &str,
        collection: Collection,
        items: &[T],
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(items)?;
        self.mem
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((user_id.to_string(), collection), payload.clone());
        std::fs::write(self.entry_path(user_id, collection), payload)?;
        trace!(
            user_id,
            collection = collection.as_str(),
            "cache entry replaced"
        );
        Ok(())
    }

    /// Drops every entry belonging to one user. Used when the user deletes
    /// their data; a plain sign-out keeps the cache so the next sign-in is
    /// fast.
    pub fn clear_user(&self, user_id: &str) -> Result<(), CacheError> {
        self.mem
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|(uid, _), _| uid != user_id);
        for collection in [
            Collection::Accounts,
            Collection::Transactions,
            Collection::Categories,
        ] {
            match std::fs::remove_file(self.entry_path(user_id, collection)) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(user_id, "cache cleared");
        Ok(())
    }

    /// Root directory of the persisted entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
