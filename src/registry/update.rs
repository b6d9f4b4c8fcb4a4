//! Instrumentation session deltas and history records.
//!
//! Every instrumentation pass produces one [`RegistryUpdate`] which the registry applies
//! and queues for persistence. On disk each update becomes one session segment; the two
//! variants share a common header so history lineage survives a full rewrite.

use crate::context::ContextStore;
use crate::io::{TaggedDataInput, TaggedDataOutput};
use crate::registry::model::FileInfo;
use crate::Result;

const SEGMENT_KIND_EMPTY: u8 = 0;
const SEGMENT_KIND_FULL: u8 = 1;

/// One historical instrumentation record: which version a session produced and when it
/// ran. Created once per applied update and retained forever in the registry history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentationInfo {
    /// Registry version this session produced
    pub version: u64,
    /// Session start, millis since the epoch
    pub start_ts: u64,
    /// Session end, millis since the epoch
    pub end_ts: u64,
}

/// A complete instrumentation delta: the file structure produced by one compile pass
/// plus the context store in effect at that time.
#[derive(Debug, Clone)]
pub struct FullProjectUpdate {
    /// Registry version this update moves the model to
    pub version: u64,
    /// Session start, millis since the epoch
    pub start_ts: u64,
    /// Session end, millis since the epoch
    pub end_ts: u64,
    /// Total number of coverage slots after this session
    pub slot_count: u32,
    /// File records produced by the session
    pub files: Vec<FileInfo>,
    /// The context store in effect when the session ran
    pub context_store: ContextStore,
}

/// A synthetic placeholder update carrying only the session header.
///
/// Used when rewriting a registry file from scratch, to preserve the version and
/// timestamp lineage of historical sessions whose structure is already folded into the
/// current snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EmptyProjectUpdate {
    /// Registry version of the historical session
    pub version: u64,
    /// Session start, millis since the epoch
    pub start_ts: u64,
    /// Session end, millis since the epoch
    pub end_ts: u64,
}

/// A delta to apply and persist: either a real instrumentation session or a synthetic
/// history marker.
#[derive(Debug, Clone)]
pub enum RegistryUpdate {
    /// A real instrumentation session
    Full(FullProjectUpdate),
    /// A synthetic history marker
    Empty(EmptyProjectUpdate),
}

impl RegistryUpdate {
    /// The registry version this update carries
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            RegistryUpdate::Full(update) => update.version,
            RegistryUpdate::Empty(update) => update.version,
        }
    }

    /// Session start timestamp, millis since the epoch
    #[must_use]
    pub fn start_ts(&self) -> u64 {
        match self {
            RegistryUpdate::Full(update) => update.start_ts,
            RegistryUpdate::Empty(update) => update.start_ts,
        }
    }

    /// Session end timestamp, millis since the epoch
    #[must_use]
    pub fn end_ts(&self) -> u64 {
        match self {
            RegistryUpdate::Full(update) => update.end_ts,
            RegistryUpdate::Empty(update) => update.end_ts,
        }
    }

    /// Total coverage slots after this update; zero for a synthetic marker
    #[must_use]
    pub fn slot_count(&self) -> u32 {
        match self {
            RegistryUpdate::Full(update) => update.slot_count,
            RegistryUpdate::Empty(_) => 0,
        }
    }

    /// The history record this update contributes
    #[must_use]
    pub fn instrumentation_info(&self) -> InstrumentationInfo {
        InstrumentationInfo {
            version: self.version(),
            start_ts: self.start_ts(),
            end_ts: self.end_ts(),
        }
    }

    /// Encodes this update as one session segment
    pub(crate) fn write_segment(&self, out: &mut TaggedDataOutput) {
        let mut body = TaggedDataOutput::new();
        match self {
            RegistryUpdate::Empty(update) => {
                body.write_u8(SEGMENT_KIND_EMPTY);
                body.write_u64(update.version);
                body.write_u64(update.start_ts);
                body.write_u64(update.end_ts);
            }
            RegistryUpdate::Full(update) => {
                body.write_u8(SEGMENT_KIND_FULL);
                body.write_u64(update.version);
                body.write_u64(update.start_ts);
                body.write_u64(update.end_ts);
                body.write_u32(update.slot_count);
                update.context_store.write(&mut body);
                body.write_u32(update.files.len() as u32);
                for file in &update.files {
                    file.write(&mut body);
                }
            }
        }
        out.write_frame(&body.into_bytes());
    }

    /// Decodes one session segment
    pub(crate) fn read_segment(input: &mut TaggedDataInput<'_>) -> Result<Self> {
        let frame = input.read_frame()?;
        let mut body = TaggedDataInput::new(frame);
        let kind = body.read_u8()?;
        let version = body.read_u64()?;
        let start_ts = body.read_u64()?;
        let end_ts = body.read_u64()?;
        match kind {
            SEGMENT_KIND_EMPTY => Ok(RegistryUpdate::Empty(EmptyProjectUpdate {
                version,
                start_ts,
                end_ts,
            })),
            SEGMENT_KIND_FULL => {
                let slot_count = body.read_u32()?;
                let context_store = ContextStore::read(&mut body)?;
                let file_count = body.read_u32()? as usize;
                let files = (0..file_count)
                    .map(|_| FileInfo::read(&mut body))
                    .collect::<Result<Vec<_>>>()?;
                Ok(RegistryUpdate::Full(FullProjectUpdate {
                    version,
                    start_ts,
                    end_ts,
                    slot_count,
                    files,
                    context_store,
                }))
            }
            other => Err(format_error!("unknown session segment kind {other}")),
        }
    }
}
