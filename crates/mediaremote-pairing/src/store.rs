//! Persistence of pairing records.
//!
//! One record per target device. A record is only ever written once a
//! pair-setup has fully completed, and is removed when the device presents a
//! different identity during pair-verify.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mediaremote_core::error::{PairingError, Result};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::identity::ControllerIdentity;

/// Everything needed to run pair-verify against one device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PairingRecord {
    /// Seed of our long-term Ed25519 key.
    #[serde(with = "hex")]
    pub seed: [u8; 32],
    /// Identifier we presented during pair-setup.
    #[serde(with = "hex")]
    pub own_id: Vec<u8>,
    /// Identifier the peer presented in M6.
    #[serde(with = "hex")]
    pub peer_id: Vec<u8>,
    /// Peer's long-term Ed25519 public key.
    #[serde(with = "hex")]
    pub peer_public_key: [u8; 32],
}

impl PairingRecord {
    pub fn new(identity: &ControllerIdentity, peer_id: Vec<u8>, peer_public_key: [u8; 32]) -> Self {
        Self {
            seed: identity.seed(),
            own_id: identity.id().to_vec(),
            peer_id,
            peer_public_key,
        }
    }

    /// Rebuild our long-term identity from the stored seed.
    pub fn identity(&self) -> ControllerIdentity {
        ControllerIdentity::from_seed(self.own_id.clone(), &self.seed)
    }

    pub fn peer_id_display(&self) -> String {
        String::from_utf8_lossy(&self.peer_id).into_owned()
    }
}

impl std::fmt::Debug for PairingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingRecord")
            .field("own_id", &String::from_utf8_lossy(&self.own_id))
            .field("peer_id", &self.peer_id_display())
            .field("peer_public_key", &hex::encode(self.peer_public_key))
            .finish_non_exhaustive()
    }
}

/// Storage for pairing records, keyed by target device id.
#[cfg_attr(test, mockall::automock)]
pub trait PairingStore: Send + Sync {
    /// Look up the record for `device_id`. `None` means not yet paired.
    fn get(&self, device_id: &str) -> Result<Option<PairingRecord>>;

    /// Insert or replace the record for `device_id`.
    fn put(&self, device_id: &str, record: &PairingRecord) -> Result<()>;

    /// Remove the record for `device_id`. Removing an absent record succeeds.
    fn delete(&self, device_id: &str) -> Result<()>;
}

/// In-memory store, for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, PairingRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PairingRecord>>> {
        self.records
            .lock()
            .map_err(|_| PairingError::Store("memory store lock poisoned".to_string()).into())
    }
}

impl PairingStore for MemoryStore {
    fn get(&self, device_id: &str) -> Result<Option<PairingRecord>> {
        Ok(self.lock()?.get(device_id).cloned())
    }

    fn put(&self, device_id: &str, record: &PairingRecord) -> Result<()> {
        self.lock()?.insert(device_id.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, device_id: &str) -> Result<()> {
        self.lock()?.remove(device_id);
        Ok(())
    }
}

/// Directory-backed store: one `<hex(device-id)>.json` file per device.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `device_id`.
    ///
    /// The file name is the hex encoding of the id, so distinct ids never
    /// share a file and no id can escape the store directory.
    pub fn path_for(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(device_id)))
    }
}

fn store_error(path: &Path, e: impl std::fmt::Display) -> mediaremote_core::Error {
    PairingError::Store(format!("{}: {}", path.display(), e)).into()
}

impl PairingStore for FileStore {
    fn get(&self, device_id: &str) -> Result<Option<PairingRecord>> {
        let path = self.path_for(device_id);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error(&path, e)),
        };
        let record = serde_json::from_str(&data).map_err(|e| store_error(&path, e))?;
        Ok(Some(record))
    }

    fn put(&self, device_id: &str, record: &PairingRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| store_error(&self.dir, e))?;

        let path = self.path_for(device_id);
        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(record).map_err(|e| store_error(&path, e))?;

        // Write beside the target and rename, so readers never see half a record
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(store_error(&path, e));
        }

        tracing::debug!(device_id, path = %path.display(), "Stored pairing record");
        Ok(())
    }

    fn delete(&self, device_id: &str) -> Result<()> {
        let path = self.path_for(device_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(device_id, path = %path.display(), "Deleted pairing record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error(&path, e)),
        }
    }
}
