use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::LedgerError;
use crate::models::ledger::LedgerEntry;

pub const LEDGER_HEADER: [&str; 7] = [
    "timestamp",
    "signal_type",
    "price",
    "quantity",
    "status",
    "pnl",
    "notes",
];

/// Append-only CSV trade ledger.
///
/// All appends go through one file handle behind a mutex, so concurrent
/// callers cannot interleave rows. Each append is encoded in memory and
/// written with a single `write_all`; a failed append leaves nothing
/// buffered and is truncated back off the file. The header is written
/// exactly once, with the first successful append to an empty file.
pub struct TradeLedger {
    path: PathBuf,
    writer: Mutex<LedgerWriter>,
}

struct LedgerWriter {
    file: File,
    needs_header: bool,
}

impl TradeLedger {
    /// Open (or create) the ledger file, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        info!(
            "Trade ledger at {} ({})",
            path.display(),
            if needs_header { "new" } else { "existing" }
        );

        Ok(Self {
            path,
            writer: Mutex::new(LedgerWriter { file, needs_header }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it to the file.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut guard = self.writer.lock().map_err(|_| LedgerError::Poisoned)?;
        let writer = &mut *guard;

        let bytes = encode(entry, writer.needs_header)?;
        let rollback_len = writer.file.metadata().map(|m| m.len()).ok();

        if let Err(e) = writer
            .file
            .write_all(&bytes)
            .and_then(|_| writer.file.flush())
        {
            if let Some(len) = rollback_len {
                if let Err(trunc) = writer.file.set_len(len) {
                    debug!("Ledger rollback to {len} bytes failed: {trunc}");
                }
            }
            return Err(e.into());
        }
        writer.needs_header = false;

        debug!("Ledger append: {:?} {}", entry.status, entry.notes);
        Ok(())
    }

    /// Read every entry back in append order.
    pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = Vec::new();
        for row in reader.deserialize() {
            entries.push(row?);
        }
        Ok(entries)
    }
}

/// One CSV record, preceded by the header when `with_header` is set.
fn encode(entry: &LedgerEntry, with_header: bool) -> Result<Vec<u8>, LedgerError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        csv.write_record(LEDGER_HEADER)?;
    }
    csv.serialize(entry)?;
    csv.into_inner().map_err(|e| LedgerError::Io(e.into_error()))
}
