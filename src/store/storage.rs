//! # Persisted store state.
//!
//! [`PersistedState`] is the logical state the store saves and reloads:
//! records, edited templates, selection, ordering, recency and the last
//! executor per record.
//! [`StateStorage`] is the persistence seam; [`FileStorage`] is the JSON
//! implementation over the three storage tiers.
//!
//! ## File layout
//! ```text
//! <workspace file>            workspace records, templates, selection, order,
//!                             recents, recent executors, known arbitrary files
//! <shared dir>/<id>.json      one file per shared record
//! <root>/<path>               arbitrary files: every record stored there
//! ```
//! A write is skipped when the SHA-256 digest of the encoded bytes equals the
//! digest of what was last read from or written to that path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::model::{ConfigurationRecord, StorageTier};

/// Logical persisted state of the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    /// Every stable and temporary record (templates excluded).
    #[serde(default)]
    pub records: Vec<ConfigurationRecord>,
    /// Edited templates, one per `(type, factory)` pair.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<ConfigurationRecord>,
    /// Selected unique id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    /// Unique ids in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
    /// Recently used temporary records, most recent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_temporaries: Vec<String>,
    /// Last executor id used per record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recent_executors: BTreeMap<String, String>,
}

/// Persistence seam of the store.
pub trait StateStorage: Send + Sync {
    /// Loads the persisted state (empty if nothing was saved yet).
    fn load(&self) -> Result<PersistedState, StoreError>;

    /// Saves `state`. Returns the number of files actually written.
    fn save(&self, state: &PersistedState) -> Result<usize, StoreError>;
}

#[derive(Default, Serialize, Deserialize)]
struct WorkspaceFile {
    #[serde(default)]
    records: Vec<ConfigurationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    templates: Vec<ConfigurationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    order: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    recent_temporaries: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    recent_executors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    arbitrary_files: BTreeSet<PathBuf>,
}

/// JSON files over workspace / shared / arbitrary-file tiers.
pub struct FileStorage {
    workspace_file: PathBuf,
    shared_dir: PathBuf,
    root: PathBuf,
    digests: Mutex<HashMap<PathBuf, [u8; 32]>>,
}

impl FileStorage {
    /// Creates a storage; arbitrary-file paths resolve against `root`.
    pub fn new(
        workspace_file: impl Into<PathBuf>,
        shared_dir: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            workspace_file: workspace_file.into(),
            shared_dir: shared_dir.into(),
            root: root.into(),
            digests: Mutex::new(HashMap::new()),
        }
    }

    /// Conventional layout under a project directory:
    /// `.launch/workspace.json`, `.launch/shared/`.
    pub fn in_project(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(
            root.join(".launch").join("workspace.json"),
            root.join(".launch").join("shared"),
            root,
        )
    }

    fn shared_path(&self, record: &ConfigurationRecord) -> PathBuf {
        let file: String = record
            .unique_id()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.shared_dir.join(format!("{file}.json"))
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        self.digests
            .lock()
            .insert(path.to_path_buf(), Sha256::digest(&bytes).into());
        Ok(Some(value))
    }

    fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<bool, StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        if self.digests.lock().get(path) == Some(&digest) && path.exists() {
            tracing::trace!(path = %path.display(), "unchanged, write skipped");
            return Ok(false);
        }
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, &bytes).map_err(io_err)?;
        self.digests.lock().insert(path.to_path_buf(), digest);
        Ok(true)
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        self.digests.lock().remove(path);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn shared_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.shared_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.shared_dir.clone(),
                    source,
                })
            }
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl StateStorage for FileStorage {
    fn load(&self) -> Result<PersistedState, StoreError> {
        let workspace: WorkspaceFile = self.read(&self.workspace_file)?.unwrap_or_default();
        let mut records: Vec<ConfigurationRecord> = workspace
            .records
            .into_iter()
            .map(|r| r.with_storage(StorageTier::Workspace))
            .collect();

        for path in self.shared_files()? {
            if let Some(rec) = self.read::<ConfigurationRecord>(&path)? {
                records.push(rec.with_storage(StorageTier::Shared));
            }
        }

        for rel in &workspace.arbitrary_files {
            let Some(found) = self.read::<Vec<ConfigurationRecord>>(&self.root.join(rel))? else {
                tracing::debug!(path = %rel.display(), "arbitrary run configuration file is gone");
                continue;
            };
            records.extend(
                found
                    .into_iter()
                    .map(|r| r.with_storage(StorageTier::ArbitraryFile(rel.clone()))),
            );
        }

        Ok(PersistedState {
            records,
            templates: workspace.templates,
            selected: workspace.selected,
            order: workspace.order,
            recent_temporaries: workspace.recent_temporaries,
            recent_executors: workspace.recent_executors,
        })
    }

    fn save(&self, state: &PersistedState) -> Result<usize, StoreError> {
        let mut workspace = WorkspaceFile {
            templates: state.templates.clone(),
            selected: state.selected.clone(),
            order: state.order.clone(),
            recent_temporaries: state.recent_temporaries.clone(),
            recent_executors: state.recent_executors.clone(),
            ..WorkspaceFile::default()
        };
        let mut shared: BTreeMap<PathBuf, &ConfigurationRecord> = BTreeMap::new();
        let mut arbitrary: BTreeMap<PathBuf, Vec<&ConfigurationRecord>> = BTreeMap::new();

        for rec in &state.records {
            match &rec.storage {
                StorageTier::Workspace => workspace.records.push(rec.clone()),
                StorageTier::Shared => {
                    shared.insert(self.shared_path(rec), rec);
                }
                StorageTier::ArbitraryFile(path) => {
                    arbitrary.entry(path.clone()).or_default().push(rec);
                }
            }
        }
        workspace.arbitrary_files = arbitrary.keys().cloned().collect();

        let mut written = 0;
        for (path, rec) in &shared {
            written += usize::from(self.write(path, rec)?);
        }
        for stale in self.shared_files()? {
            if !shared.contains_key(&stale) {
                self.remove(&stale)?;
            }
        }
        for (rel, recs) in &arbitrary {
            written += usize::from(self.write(&self.root.join(rel), recs)?);
        }
        written += usize::from(self.write(&self.workspace_file, &workspace)?);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PersistedState {
        PersistedState {
            records: vec![
                ConfigurationRecord::new("local", "App"),
                ConfigurationRecord::new("team", "App").with_storage(StorageTier::Shared),
                ConfigurationRecord::new("ci", "App")
                    .with_storage(StorageTier::ArbitraryFile(PathBuf::from("ci/app.run.json"))),
            ],
            templates: Vec::new(),
            selected: Some("App.team".into()),
            order: vec!["App.team".into(), "App.local".into()],
            recent_temporaries: Vec::new(),
            recent_executors: BTreeMap::from([("App.team".into(), "Run".into())]),
        }
    }

    #[test]
    fn save_and_load_across_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::in_project(dir.path());
        assert_eq!(storage.save(&state()).unwrap(), 3);
        assert!(dir.path().join("ci/app.run.json").exists());
        assert!(dir.path().join(".launch/shared/App.team.json").exists());

        let fresh = FileStorage::in_project(dir.path());
        let loaded = fresh.load().unwrap();
        let mut ids: Vec<_> = loaded.records.iter().map(|r| r.unique_id()).collect();
        ids.sort();
        assert_eq!(ids, vec!["App.ci@ci/app.run.json", "App.local", "App.team"]);
        assert_eq!(loaded.selected.as_deref(), Some("App.team"));
        assert_eq!(loaded.recent_executors.get("App.team").map(String::as_str), Some("Run"));
    }

    #[test]
    fn templates_live_in_the_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::in_project(dir.path());
        let mut with_template = state();
        let mut template = ConfigurationRecord::new("<template>", "App");
        template.template = true;
        with_template.templates.push(template);
        storage.save(&with_template).unwrap();

        let loaded = FileStorage::in_project(dir.path()).load().unwrap();
        assert_eq!(loaded.templates.len(), 1);
        assert!(loaded.templates[0].template);
        assert_eq!(loaded.templates[0].type_id, "App");
    }

    #[test]
    fn identical_output_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::in_project(dir.path());
        assert_eq!(storage.save(&state()).unwrap(), 3);
        assert_eq!(storage.save(&state()).unwrap(), 0);

        let mut changed = state();
        changed.selected = Some("App.local".into());
        assert_eq!(storage.save(&changed).unwrap(), 1);
    }

    #[test]
    fn unshared_records_lose_their_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::in_project(dir.path());
        storage.save(&state()).unwrap();

        let mut unshared = state();
        unshared.records[1].storage = StorageTier::Workspace;
        storage.save(&unshared).unwrap();
        assert!(!dir.path().join(".launch/shared/App.team.json").exists());
    }

    #[test]
    fn malformed_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::in_project(dir.path());
        fs::create_dir_all(dir.path().join(".launch")).unwrap();
        fs::write(dir.path().join(".launch/workspace.json"), b"{ not json").unwrap();
        let err = storage.load().unwrap_err();
        assert_eq!(err.as_label(), "store_format");
    }
}
