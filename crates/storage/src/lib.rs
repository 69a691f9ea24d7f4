//! Persistence gateways for annotation sets
//!
//! [`FileGateway`] keeps one JSON envelope per (document, user) pair under the
//! platform's local data directory. [`MemoryGateway`] keeps them in process,
//! for tests and hosts without a filesystem.

use directories::ProjectDirs;
use log::debug;
use markup_core::error::{GatewayError, GatewayResult};
use markup_core::host::PersistenceGateway;
use markup_core::wire::{Envelope, StoredAnnotation};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const ANNOTATIONS_FILE: &str = "annotations.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type PageRecords = BTreeMap<u32, Vec<StoredAnnotation>>;
type RecordSets = HashMap<(String, String), PageRecords>;

/// Escape an id into a single safe path segment
fn path_segment(id: &str) -> String {
    let mut segment = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => segment.push(byte as char),
            _ => segment.push_str(&format!("%{byte:02X}")),
        }
    }
    if segment.is_empty() {
        segment.push('_');
    }
    segment
}

#[derive(Debug, Clone)]
pub struct FileGateway {
    root: PathBuf,
}

impl FileGateway {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Markup", "Markup")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self {
            root: dirs.data_local_dir().join("annotations"),
        })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn annotations_path(&self, document_id: &str, user_id: &str) -> PathBuf {
        self.root
            .join(path_segment(document_id))
            .join(path_segment(user_id))
            .join(ANNOTATIONS_FILE)
    }

    /// Delete the stored set; a missing file is not an error
    pub fn remove(&self, document_id: &str, user_id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.annotations_path(document_id, user_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl PersistenceGateway for FileGateway {
    fn load(&self, document_id: &str, user_id: &str) -> GatewayResult<PageRecords> {
        let path = self.annotations_path(document_id, user_id);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let json = fs::read_to_string(&path)?;
        let pages = Envelope::parse(&json)?;
        debug!("read {} pages of annotations from {}", pages.len(), path.display());
        Ok(pages)
    }

    /// Write to a sibling temp file, then rename over the previous set
    fn save(&self, document_id: &str, user_id: &str, pages: &PageRecords) -> GatewayResult<()> {
        let path = self.annotations_path(document_id, user_id);
        let Some(dir) = path.parent() else {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "annotation path has no parent directory",
            )));
        };
        fs::create_dir_all(dir)?;

        let json = Envelope::to_json(pages)?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)?;
        debug!("wrote annotations to {}", path.display());
        Ok(())
    }
}

/// In-process gateway; clones share the same sets
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    sets: Arc<Mutex<RecordSets>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, RecordSets>> {
        self.sets
            .lock()
            .map_err(|_| GatewayError::Remote("memory gateway lock poisoned".to_string()))
    }

    /// Number of stored records for a pair
    pub fn record_count(&self, document_id: &str, user_id: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|sets| {
                sets.get(&(document_id.to_string(), user_id.to_string()))
                    .map(|pages| pages.values().map(Vec::len).sum())
            })
            .unwrap_or(0)
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&self, document_id: &str, user_id: &str) -> GatewayResult<PageRecords> {
        let sets = self.lock()?;
        Ok(sets
            .get(&(document_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, document_id: &str, user_id: &str, pages: &PageRecords) -> GatewayResult<()> {
        let mut sets = self.lock()?;
        sets.insert((document_id.to_string(), user_id.to_string()), pages.clone());
        Ok(())
    }
}
