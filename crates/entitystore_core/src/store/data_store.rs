//! JSON snapshot file backing the data store.
//!
//! # Responsibility
//! - Create and permission the backing file on first open.
//! - Load the full snapshot eagerly and write it back on `save`.
//!
//! # Invariants
//! - `save` replaces the file with exactly one current snapshot.
//! - Empty per-type maps are dropped so the snapshot never carries dead types.

use super::{StoreAction, StoreError, StoreResult};
use crate::model::Record;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

/// Persisted shape: entity type name -> primary key -> record.
pub type StoreSnapshot = BTreeMap<String, BTreeMap<String, Record>>;

#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o666;

/// Flat-file key-value store keyed by `(entity type, primary key)`.
#[derive(Debug)]
pub struct DataStore {
    path: PathBuf,
    entries: StoreSnapshot,
}

impl DataStore {
    /// Opens (creating if needed) the backing file and loads its snapshot.
    ///
    /// # Errors
    /// - `StoreError::Unavailable` when the file cannot be created, made
    ///   read/write, or read.
    /// - `StoreError::Corrupt` when the content is not a store snapshot.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let started_at = Instant::now();
        let path = path.as_ref().to_path_buf();
        info!("event=store_open module=store status=start");

        match load_snapshot(&path) {
            Ok(entries) => {
                info!(
                    "event=store_open module=store status=ok types={} duration_ms={}",
                    entries.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(Self { path, entries })
            }
            Err(err) => {
                error!(
                    "event=store_open module=store status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upserts one record in memory.
    pub fn set(&mut self, entity_type: &str, primary: &str, record: Record) {
        self.entries
            .entry(entity_type.to_string())
            .or_default()
            .insert(primary.to_string(), record);
    }

    pub fn get(&self, entity_type: &str, primary: &str) -> Option<&Record> {
        self.entries.get(entity_type)?.get(primary)
    }

    /// Removes one record in memory; returns whether it existed.
    pub fn delete(&mut self, entity_type: &str, primary: &str) -> bool {
        let Some(records) = self.entries.get_mut(entity_type) else {
            return false;
        };
        let removed = records.remove(primary).is_some();
        if records.is_empty() {
            self.entries.remove(entity_type);
        }
        removed
    }

    /// Entity type names with at least one stored record, sorted.
    pub fn item_types(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Primary keys stored for `entity_type`, sorted. Unknown types yield none.
    pub fn item_keys(&self, entity_type: &str) -> Vec<&str> {
        self.entries
            .get(entity_type)
            .map(|records| records.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.entries
    }

    /// Writes the whole in-memory mapping as the new file content.
    ///
    /// The snapshot is written to a sibling temp file and renamed over the
    /// backing file, so a failed save leaves the previous snapshot intact.
    pub fn save(&self) -> StoreResult<()> {
        let started_at = Instant::now();
        match write_snapshot(&self.path, &self.entries) {
            Ok(bytes) => {
                info!(
                    "event=store_save module=store status=ok types={} bytes={} duration_ms={}",
                    self.entries.len(),
                    bytes,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=store_save module=store status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

fn load_snapshot(path: &Path) -> StoreResult<StoreSnapshot> {
    let mut file = open_read_write(path)?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)
        .map_err(|err| StoreError::unavailable(path, StoreAction::Read, err))?;

    if raw.trim().is_empty() {
        debug!("event=store_load module=store status=skip reason=empty_file");
        return Ok(StoreSnapshot::new());
    }

    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn open_read_write(path: &Path) -> StoreResult<File> {
    if path.exists() {
        return OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| StoreError::unavailable(path, StoreAction::Read, err));
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| StoreError::unavailable(path, StoreAction::Create, err))?;
    set_new_file_permissions(path)?;
    info!("event=store_create module=store status=ok");
    Ok(file)
}

#[cfg(unix)]
fn set_new_file_permissions(path: &Path) -> StoreResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(NEW_FILE_MODE))
        .map_err(|err| StoreError::unavailable(path, StoreAction::Permission, err))
}

#[cfg(not(unix))]
fn set_new_file_permissions(path: &Path) -> StoreResult<()> {
    let mut permissions = fs::metadata(path)
        .map_err(|err| StoreError::unavailable(path, StoreAction::Permission, err))?
        .permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
        .map_err(|err| StoreError::unavailable(path, StoreAction::Permission, err))
}

fn write_snapshot(path: &Path, entries: &StoreSnapshot) -> StoreResult<usize> {
    let mut encoded = serde_json::to_vec_pretty(entries).map_err(StoreError::Encode)?;
    encoded.push(b'\n');

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let previous_permissions = fs::metadata(path).map(|meta| meta.permissions()).ok();

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|err| StoreError::unavailable(path, StoreAction::Write, err))?;
    tmp.write_all(&encoded)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| StoreError::unavailable(path, StoreAction::Write, err))?;
    tmp.persist(path)
        .map_err(|err| StoreError::unavailable(path, StoreAction::Write, err.error))?;

    if let Some(permissions) = previous_permissions {
        fs::set_permissions(path, permissions)
            .map_err(|err| StoreError::unavailable(path, StoreAction::Permission, err))?;
    }

    Ok(encoded.len())
}
