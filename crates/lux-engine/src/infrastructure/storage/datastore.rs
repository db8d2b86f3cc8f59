//! The display/app-exception datastore collaborator.
//!
//! The engine treats the datastore as a key-value collaborator: load records
//! by serial, store them back, look up app exceptions by identifier.
//! `None` from a load means "nothing stored yet" — first run, not an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use lux_core::{AppException, DisplayRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Error type for datastore file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse stored TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Persistence collaborator.
pub trait Datastore: Send + Sync {
    /// Stored records for the given serials, or `None` when nothing has been
    /// stored yet (first run).
    fn displays(&self, serials: &[String]) -> Option<Vec<DisplayRecord>>;

    /// Upserts the given records by serial and returns the stored set.
    fn store_displays(&self, displays: Vec<DisplayRecord>) -> Vec<DisplayRecord>;

    /// Stored app exceptions matching the given identifiers, in the order
    /// the identifiers were supplied, or `None` when none are stored.
    fn app_exceptions(&self, identifiers: &[String]) -> Option<Vec<AppException>>;

    /// Replaces the stored app exception list.
    fn store_app_exceptions(&self, exceptions: Vec<AppException>);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DisplayFile {
    #[serde(default)]
    displays: Vec<DisplayRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AppFile {
    #[serde(default)]
    apps: Vec<AppException>,
}

/// TOML-file datastore: `displays.toml` and `apps.toml` under one directory.
pub struct TomlDatastore {
    dir: PathBuf,
}

impl TomlDatastore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn displays_path(&self) -> PathBuf {
        self.dir.join("displays.toml")
    }

    fn apps_path(&self) -> PathBuf {
        self.dir.join("apps.toml")
    }

    fn load_displays(&self) -> Result<Option<DisplayFile>, StoreError> {
        let path = self.displays_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(toml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }

    fn write_displays(&self, file: &DisplayFile) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let content = toml::to_string_pretty(file)?;
        std::fs::write(self.displays_path(), content).map_err(|source| StoreError::Io {
            path: self.displays_path(),
            source,
        })
    }

    fn load_apps(&self) -> Result<Option<AppFile>, StoreError> {
        let path = self.apps_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(toml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }
}

impl Datastore for TomlDatastore {
    fn displays(&self, serials: &[String]) -> Option<Vec<DisplayRecord>> {
        let file = match self.load_displays() {
            Ok(file) => file?,
            Err(e) => {
                warn!(error = %e, "failed to load stored displays, treating as first run");
                return None;
            }
        };
        Some(
            file.displays
                .into_iter()
                .filter(|record| serials.contains(&record.serial))
                .collect(),
        )
    }

    fn store_displays(&self, displays: Vec<DisplayRecord>) -> Vec<DisplayRecord> {
        let mut file = match self.load_displays() {
            Ok(file) => file.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to load stored displays before store, starting fresh");
                DisplayFile::default()
            }
        };

        for record in &displays {
            match file
                .displays
                .iter_mut()
                .find(|stored| stored.serial == record.serial)
            {
                Some(stored) => *stored = record.clone(),
                None => file.displays.push(record.clone()),
            }
        }

        if let Err(e) = self.write_displays(&file) {
            warn!(error = %e, "failed to persist displays");
        }
        displays
    }

    fn app_exceptions(&self, identifiers: &[String]) -> Option<Vec<AppException>> {
        let file = match self.load_apps() {
            Ok(file) => file?,
            Err(e) => {
                warn!(error = %e, "failed to load app exceptions");
                return None;
            }
        };
        let matched: Vec<AppException> = identifiers
            .iter()
            .filter_map(|identifier| {
                file.apps
                    .iter()
                    .find(|app| &app.identifier == identifier)
                    .cloned()
            })
            .collect();
        if matched.is_empty() {
            None
        } else {
            Some(matched)
        }
    }

    fn store_app_exceptions(&self, exceptions: Vec<AppException>) {
        let file = AppFile { apps: exceptions };
        if let Err(e) = std::fs::create_dir_all(&self.dir)
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })
            .and_then(|()| {
                let content = toml::to_string_pretty(&file)?;
                std::fs::write(self.apps_path(), content).map_err(|source| StoreError::Io {
                    path: self.apps_path(),
                    source,
                })
            })
        {
            warn!(error = %e, "failed to persist app exceptions");
        }
    }
}

/// In-memory datastore for tests and stateless deployments.
#[derive(Default)]
pub struct MemoryDatastore {
    displays: Mutex<Option<HashMap<String, DisplayRecord>>>,
    apps: Mutex<Option<Vec<AppException>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds stored records, flipping the store out of the first-run state.
    pub fn seed_displays(&self, records: Vec<DisplayRecord>) {
        let mut map = HashMap::new();
        for record in records {
            map.insert(record.serial.clone(), record);
        }
        *self.displays.lock().expect("lock poisoned") = Some(map);
    }

    /// Seeds stored app exceptions.
    pub fn seed_app_exceptions(&self, exceptions: Vec<AppException>) {
        *self.apps.lock().expect("lock poisoned") = Some(exceptions);
    }
}

impl Datastore for MemoryDatastore {
    fn displays(&self, serials: &[String]) -> Option<Vec<DisplayRecord>> {
        let guard = self.displays.lock().expect("lock poisoned");
        let map = guard.as_ref()?;
        Some(
            serials
                .iter()
                .filter_map(|serial| map.get(serial).cloned())
                .collect(),
        )
    }

    fn store_displays(&self, displays: Vec<DisplayRecord>) -> Vec<DisplayRecord> {
        let mut guard = self.displays.lock().expect("lock poisoned");
        let map = guard.get_or_insert_with(HashMap::new);
        for record in &displays {
            map.insert(record.serial.clone(), record.clone());
        }
        displays
    }

    fn app_exceptions(&self, identifiers: &[String]) -> Option<Vec<AppException>> {
        let guard = self.apps.lock().expect("lock poisoned");
        let apps = guard.as_ref()?;
        let matched: Vec<AppException> = identifiers
            .iter()
            .filter_map(|identifier| {
                apps.iter()
                    .find(|app| &app.identifier == identifier)
                    .cloned()
            })
            .collect();
        if matched.is_empty() {
            None
        } else {
            Some(matched)
        }
    }

    fn store_app_exceptions(&self, exceptions: Vec<AppException>) {
        *self.apps.lock().expect("lock poisoned") = Some(exceptions);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
