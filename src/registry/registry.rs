//! The versioned coverage registry: in-memory model, update protocol and persistence.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::context::ContextStore;
use crate::io::{TaggedDataInput, TaggedDataOutput};
use crate::registry::model::{FileInfo, ProjectInfo};
use crate::registry::update::{
    EmptyProjectUpdate, FullProjectUpdate, InstrumentationInfo, RegistryUpdate,
};
use crate::{Error, Result};

/// Magic identifying a registry file, "CRG1" on disk
const REGISTRY_MAGIC: u32 = 0x3147_5243;
/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

/// Whether a registry accepts instrumentation updates.
///
/// Registries produced by a merge are read-only; everything else is read-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Fresh or loaded registry, mutation permitted
    ReadWrite,
    /// Result of a merge, instrumentation updates rejected
    ReadOnly,
}

/// The versioned, persisted model of a project's instrumented source structure, its
/// active context catalog and its update history.
///
/// A registry is created on first instrumentation, loaded from an existing file, or
/// produced by a merge. An (external) instrumenter calls
/// [`CoverageRegistry::apply_update`] after each compile pass; the registry validates
/// the version, mutates the in-memory model, appends history and queues the update for
/// persistence.
///
/// # Concurrency
///
/// Instrumentation of a registry must be externally serialized; the version check in
/// [`CoverageRegistry::apply_update`] is a race detector, not a lock. Long-running
/// background loads take an isolated copy via
/// [`CoverageRegistry::copy_for_background_load`] instead of sharing the live instance.
/// All persistence is synchronous and blocking.
#[derive(Debug, Clone)]
pub struct CoverageRegistry {
    path: PathBuf,
    model: ProjectInfo,
    context_store: ContextStore,
    /// Newest first
    history: Vec<InstrumentationInfo>,
    unsaved: Vec<RegistryUpdate>,
    slot_count: u32,
    access_mode: AccessMode,
    /// Set once the backing file is known to carry our header, making cheap appends safe
    appendable: bool,
}

impl CoverageRegistry {
    /// Creates a fresh, empty, read-write registry backed by `path`.
    ///
    /// Nothing is written until the first save.
    #[must_use]
    pub fn new(path: &Path, name: &str) -> Self {
        CoverageRegistry {
            path: path.to_path_buf(),
            model: ProjectInfo::new(name),
            context_store: ContextStore::new(),
            history: Vec::new(),
            unsaved: Vec::new(),
            slot_count: 0,
            access_mode: AccessMode::ReadWrite,
            appendable: false,
        }
    }

    /// Loads a registry from `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist, signalling "create fresh" to the
    /// caller; a malformed existing file is a [`crate::Error::RegistryFormat`] error.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        Self::from_file_filtered(path, |_| true, |_, _| {})
    }

    /// Loads a registry from `path`, admitting only files accepted by `filter` and
    /// reporting `(bytes_read, bytes_total)` to `progress` after each session segment.
    ///
    /// Sessions are folded newest-to-oldest: a file seen for the first time is added
    /// (after passing `filter`); a file already present only gets its supported-version
    /// list extended, never its content replaced. The most recent session's embedded
    /// context store becomes the active store; custom contexts that existed only in
    /// superseded sessions are silently dropped.
    pub fn from_file_filtered<F, P>(path: &Path, filter: F, mut progress: P) -> Result<Option<Self>>
    where
        F: Fn(&FileInfo) -> bool,
        P: FnMut(u64, u64),
    {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let total = bytes.len() as u64;
        let mut input = TaggedDataInput::new(&bytes);

        let magic = Self::corrupt_on_truncation(input.read_u32())?;
        if magic != REGISTRY_MAGIC {
            return Err(format_error!(
                "bad magic 0x{magic:08x} in registry file {}",
                path.display()
            ));
        }
        let format = Self::corrupt_on_truncation(input.read_u32())?;
        if format != FORMAT_VERSION {
            return Err(format_error!(
                "unsupported registry format version {format} in {}",
                path.display()
            ));
        }
        let name = Self::corrupt_on_truncation(input.read_str())?;

        let mut sessions = Vec::new();
        while input.remaining() > 0 {
            let update = Self::corrupt_on_truncation(RegistryUpdate::read_segment(&mut input))?;
            sessions.push(update);
            progress(input.position() as u64, total);
        }

        let mut registry = CoverageRegistry::new(path, &name);
        registry.appendable = true;

        // Segments are appended on disk, so the newest session is the last one.
        let mut store_adopted = false;
        for update in sessions.iter().rev() {
            registry.history.push(update.instrumentation_info());
            if let RegistryUpdate::Full(full) = update {
                if !store_adopted {
                    registry.context_store = full.context_store.clone();
                    registry.slot_count = full.slot_count;
                    store_adopted = true;
                }
                for file in &full.files {
                    let seen = registry
                        .model
                        .files
                        .iter()
                        .position(|known| known.name == file.name);
                    match seen {
                        Some(at) => registry.model.files[at].add_supported_version(full.version),
                        None => {
                            if filter(file) {
                                let mut record = file.clone();
                                record.add_supported_version(full.version);
                                registry.model.files.push(record);
                            }
                        }
                    }
                }
            }
        }
        if let Some(newest) = registry.history.first() {
            registry.model.version = newest.version;
        }

        log::debug!(
            "loaded registry '{}' at version {} with {} sessions and {} files",
            registry.model.name,
            registry.model.version,
            registry.history.len(),
            registry.model.files.len()
        );
        Ok(Some(registry))
    }

    /// Loads the registry at `path` if it exists, otherwise constructs an empty one,
    /// creating parent directories as needed.
    pub fn create_or_load(path: &Path, name: &str) -> Result<Self> {
        if let Some(registry) = Self::from_file(path)? {
            return Ok(registry);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(CoverageRegistry::new(path, name))
    }

    fn corrupt_on_truncation<T>(result: Result<T>) -> Result<T> {
        result.map_err(|e| match e {
            Error::OutOfBounds => format_error!("truncated registry file"),
            other => other,
        })
    }

    /// The backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The project name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.model.name
    }

    /// The current model version; moves with every applied update
    #[must_use]
    pub fn version(&self) -> u64 {
        self.model.version
    }

    /// Total number of coverage slots after the newest session
    #[must_use]
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// The project model tree
    #[must_use]
    pub fn project(&self) -> &ProjectInfo {
        &self.model
    }

    /// The active context store
    #[must_use]
    pub fn context_store(&self) -> &ContextStore {
        &self.context_store
    }

    pub(crate) fn context_store_mut(&mut self) -> &mut ContextStore {
        &mut self.context_store
    }

    /// The instrumentation history, newest first
    #[must_use]
    pub fn instr_history(&self) -> &[InstrumentationInfo] {
        &self.history
    }

    /// Returns true if this registry rejects instrumentation updates
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.access_mode == AccessMode::ReadOnly
    }

    pub(crate) fn mark_read_only(&mut self) {
        self.access_mode = AccessMode::ReadOnly;
    }

    /// Applies one instrumentation update to the live model.
    ///
    /// The optimistic concurrency check fails with
    /// [`crate::Error::ConcurrentModification`] if the model version has moved past
    /// `expected_version` since the update was prepared; the caller must re-read and
    /// retry. The check only detects interim races - instrumentation must still be
    /// externally serialized.
    ///
    /// On success the structural delta is folded into the model, the update's context
    /// store becomes active, a history record is prepended and the update is queued for
    /// persistence.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ReadOnlyRegistry`] on a merged registry,
    /// [`crate::Error::ConcurrentModification`] on a version race.
    pub fn apply_update(&mut self, expected_version: u64, update: RegistryUpdate) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnlyRegistry);
        }
        if self.model.version != expected_version {
            return Err(Error::ConcurrentModification {
                expected: expected_version,
                found: self.model.version,
            });
        }

        if let RegistryUpdate::Full(full) = &update {
            for file in &full.files {
                let mut record = file.clone();
                record.add_supported_version(full.version);
                let seen = self
                    .model
                    .files
                    .iter()
                    .position(|known| known.name == file.name);
                match seen {
                    // A recompile regenerates the record; old content never survives
                    Some(at) => self.model.files[at] = record,
                    None => self.model.files.push(record),
                }
            }
            self.context_store = full.context_store.clone();
            self.slot_count = full.slot_count;
        }
        self.model.version = update.version();
        self.history.insert(0, update.instrumentation_info());
        self.unsaved.push(update);
        Ok(())
    }

    /// Flushes queued updates by appending session segments to the backing file.
    ///
    /// Falls back to [`CoverageRegistry::save_and_overwrite`] when the file is missing
    /// or was not written in a format we can extend.
    pub fn save_and_append(&mut self) -> Result<()> {
        if !self.appendable || !self.path.exists() {
            return self.save_and_overwrite();
        }
        let mut out = TaggedDataOutput::new();
        for update in &self.unsaved {
            update.write_segment(&mut out);
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&out.into_bytes())?;
        log::debug!(
            "appended {} session(s) to {}",
            self.unsaved.len(),
            self.path.display()
        );
        self.unsaved.clear();
        Ok(())
    }

    /// Writes the registry as a brand-new file.
    ///
    /// The full instrumentation history is replayed as synthetic empty sessions, oldest
    /// first, preserving version and timestamp lineage for historical reporting; the
    /// newest session is one full snapshot of the current state.
    pub fn save_and_overwrite(&mut self) -> Result<()> {
        let mut out = TaggedDataOutput::new();
        out.write_u32(REGISTRY_MAGIC);
        out.write_u32(FORMAT_VERSION);
        out.write_str(&self.model.name);

        // history[0] is the newest session; its header travels with the snapshot.
        for info in self.history.iter().skip(1).rev() {
            RegistryUpdate::Empty(EmptyProjectUpdate {
                version: info.version,
                start_ts: info.start_ts,
                end_ts: info.end_ts,
            })
            .write_segment(&mut out);
        }
        let newest = match self.history.first() {
            Some(info) => Some(*info),
            // A merged registry has structure but no instrumentation history; its
            // snapshot still needs a session header to travel in.
            None if !self.model.files.is_empty() => Some(InstrumentationInfo {
                version: self.model.version,
                start_ts: 0,
                end_ts: 0,
            }),
            None => None,
        };
        if let Some(newest) = newest {
            RegistryUpdate::Full(FullProjectUpdate {
                version: newest.version,
                start_ts: newest.start_ts,
                end_ts: newest.end_ts,
                slot_count: self.slot_count,
                files: self.model.files.clone(),
                context_store: self.context_store.clone(),
            })
            .write_segment(&mut out);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, out.into_bytes())?;
        log::debug!(
            "rewrote registry {} with {} session(s)",
            self.path.display(),
            self.history.len()
        );
        self.unsaved.clear();
        self.appendable = true;
        Ok(())
    }

    /// Returns an independent, read-only copy of this registry.
    ///
    /// Snapshot isolation for background coverage loads: the copy shares nothing mutable
    /// with the canonical instance, so a caller can read it while the original keeps
    /// taking updates. Copy-on-read, not locking.
    #[must_use]
    pub fn copy_for_background_load(&self) -> CoverageRegistry {
        CoverageRegistry {
            path: self.path.clone(),
            model: self.model.clone(),
            context_store: self.context_store.clone(),
            history: self.history.clone(),
            unsaved: Vec::new(),
            slot_count: self.slot_count,
            access_mode: AccessMode::ReadOnly,
            appendable: false,
        }
    }

    /// Walks the history backward `n` entries and returns that session's start
    /// timestamp, clamped to the oldest session. Returns 0 for an empty history.
    ///
    /// Used by span-based report filtering to find a time threshold.
    #[must_use]
    pub fn past_instr_timestamp(&self, n: usize) -> u64 {
        match self.history.get(n).or_else(|| self.history.last()) {
            Some(info) => info.start_ts,
            None => 0,
        }
    }

    /// Adds a file record while assembling a merged registry.
    ///
    /// The record should already have been remapped through the merge's
    /// [`crate::context::ContextMapper`].
    pub fn add_file(&mut self, file: FileInfo) {
        self.model.files.push(file);
    }
}
