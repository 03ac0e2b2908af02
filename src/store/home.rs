//! Per-sender home address, persisted as one TOML table per sender:
//!
//! ```toml
//! [o_user]
//! id = "ChIJwWnPHVdiSzQRN7O4WYYFC14"
//! address = "Hangzhou, Zhejiang, China"
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("home store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("home store {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize home store: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAddressRecord {
    #[serde(rename = "id")]
    pub place_id: String,
    pub address: String,
}

/// File-backed mapping from sender id to [`HomeAddressRecord`].
///
/// All writes go through one lock and replace the file atomically, so
/// concurrent `set` calls never lose each other's updates.
pub struct HomeAddressStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, HomeAddressRecord>>,
}

impl HomeAddressStore {
    /// Opens the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(
            "home store {} loaded with {} record(s)",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, sender: &str) -> Option<HomeAddressRecord> {
        self.records.lock().get(sender).cloned()
    }

    /// Stores `record` for `sender`, returning the record it replaced.
    ///
    /// The in-memory map only changes once the file has been written.
    pub fn set(
        &self,
        sender: &str,
        record: HomeAddressRecord,
    ) -> Result<Option<HomeAddressRecord>, StoreError> {
        let mut records = self.records.lock();
        let mut next = records.clone();
        let previous = next.insert(sender.to_string(), record);
        self.write_all(&next)?;
        *records = next;
        Ok(previous)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn write_all(&self, records: &BTreeMap<String, HomeAddressRecord>) -> Result<(), StoreError> {
        let rendered = toml::to_string(records)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(rendered.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(id: &str, address: &str) -> HomeAddressRecord {
        HomeAddressRecord {
            place_id: id.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HomeAddressStore::open(dir.path().join("userhome.toml")).unwrap();
        assert!(store.is_empty());
        assert!(store.get("o_user").is_none());
    }

    #[test]
    fn set_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("userhome.toml");

        {
            let store = HomeAddressStore::open(&path).unwrap();
            store.set("o_user", record("place-1", "Eiffel Tower, Paris")).unwrap();
        }

        let reopened = HomeAddressStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("o_user"),
            Some(record("place-1", "Eiffel Tower, Paris"))
        );

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("[o_user]"));
        assert!(raw.contains("id = \"place-1\""));
    }

    #[test]
    fn last_write_wins_and_returns_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = HomeAddressStore::open(dir.path().join("userhome.toml")).unwrap();

        assert!(store.set("o_user", record("a", "first")).unwrap().is_none());
        let previous = store.set("o_user", record("b", "second")).unwrap();
        assert_eq!(previous, Some(record("a", "first")));
        assert_eq!(store.get("o_user"), Some(record("b", "second")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userhome.toml");
        std::fs::write(&path, "[o_user\nid = ").unwrap();
        assert!(matches!(
            HomeAddressStore::open(&path),
            Err(StoreError::Parse { .. })
        ));
    }

    #[test]
    fn concurrent_sets_keep_every_sender() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userhome.toml");
        let store = Arc::new(HomeAddressStore::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .set(&format!("o_user{i}"), record(&format!("p{i}"), "addr"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = HomeAddressStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 8);
    }
}
