//! Observer appending every change payload to a JSON-lines file.

use super::{ChangeEvent, Observer, ObserverError};
use crate::manager::EntityManager;
use log::debug;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const OBSERVER_NAME: &str = "change_log";

/// Appends `payload` as one JSON line per notification.
#[derive(Debug, Clone)]
pub struct ChangeLogObserver {
    path: PathBuf,
}

impl ChangeLogObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Observer for ChangeLogObserver {
    fn receive_update(
        &self,
        _subject: &EntityManager,
        event: &ChangeEvent,
    ) -> Result<(), ObserverError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| {
                ObserverError::new(
                    OBSERVER_NAME,
                    format!("cannot open `{}`: {err}", self.path.display()),
                )
            })?;

        writeln!(file, "{}", event.payload).map_err(|err| {
            ObserverError::new(
                OBSERVER_NAME,
                format!("cannot append to `{}`: {err}", self.path.display()),
            )
        })?;

        debug!(
            "event=change_logged module=observer status=ok entity_type={} entity_id={}",
            event.entity_type, event.entity_id
        );
        Ok(())
    }
}
