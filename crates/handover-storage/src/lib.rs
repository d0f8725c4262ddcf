mod lock;
mod table;

use handover_core::{
    normalize_serial, AgreementRecord, CONFIRMED_COLUMN, CONFIRMED_TRUE, SCHOOL_COLUMN,
    SERIAL_COLUMN, STATUS_COLUMN,
};
use lock::AdvisoryFileLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use table::Table;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const RECORD_EXTENSION: &str = "csv";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read agreements directory {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read agreement file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("serial number {serial} not found in {path}")]
    RecordNotFound { serial: String, path: PathBuf },
    #[error("serial number {0} is not in the agreement index")]
    UnknownSerial(String),
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementEntry {
    pub source: PathBuf,
    pub record: AgreementRecord,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: usize,
    /// Rows read across all files, duplicates included.
    pub total: usize,
    pub confirmed: usize,
    pub duplicates: usize,
    pub skipped_rows: usize,
}

/// Held for the duration of every file rewrite. Shutdown takes it before
/// exiting so the process never stops halfway through a write.
#[derive(Debug, Clone, Default)]
pub struct PersistGate {
    inner: Arc<Mutex<()>>,
}

impl PersistGate {
    pub fn hold(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct AgreementStore {
    dir: PathBuf,
    index: HashMap<String, AgreementEntry>,
    summary: LoadSummary,
    gate: PersistGate,
}

impl AgreementStore {
    /// Loads every `*.csv` file in `dir`. Files are read in name order and a
    /// serial number seen twice keeps the last row loaded.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let files = record_files(&dir)?;

        let mut index = HashMap::new();
        let mut summary = LoadSummary {
            files: files.len(),
            ..LoadSummary::default()
        };

        for path in files {
            let (table, skipped) = Table::read_lenient(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            for row in &skipped {
                warn!(
                    event = "row_unreadable",
                    file = %path.display(),
                    line = ?row.line,
                    error = %row.error
                );
            }
            summary.skipped_rows += skipped.len();

            for (row_idx, row) in table.rows.iter().enumerate() {
                let headers = table.headers.iter().map(String::as_str);
                let values = row.iter().map(String::as_str);
                let Some(record) = AgreementRecord::from_row(headers, values) else {
                    warn!(
                        event = "row_without_serial",
                        file = %path.display(),
                        row = row_idx + 1
                    );
                    summary.skipped_rows += 1;
                    continue;
                };

                summary.total += 1;
                if record.confirmed {
                    summary.confirmed += 1;
                }

                let key = record.key();
                let entry = AgreementEntry {
                    source: path.clone(),
                    record,
                };
                if let Some(previous) = index.insert(key.clone(), entry) {
                    summary.duplicates += 1;
                    warn!(
                        event = "duplicate_serial",
                        serial = %key,
                        replaced = %previous.source.display(),
                        by = %path.display()
                    );
                }
            }
        }

        info!(
            event = "agreements_loaded",
            dir = %dir.display(),
            files = summary.files,
            rows = summary.total,
            confirmed = summary.confirmed,
            duplicates = summary.duplicates
        );

        Ok(Self {
            dir,
            index,
            summary,
            gate: PersistGate::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn summary(&self) -> &LoadSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of indexed records currently confirmed.
    pub fn confirmed_count(&self) -> usize {
        self.index
            .values()
            .filter(|entry| entry.record.confirmed)
            .count()
    }

    pub fn get(&self, serial: &str) -> Option<&AgreementEntry> {
        self.index.get(&normalize_serial(serial))
    }

    pub fn persist_gate(&self) -> PersistGate {
        self.gate.clone()
    }

    /// Confirms the record for `serial`, rewriting its source file and then
    /// the in-memory copy.
    pub fn confirm(
        &mut self,
        serial: &str,
        status: Option<&str>,
        school: Option<&str>,
    ) -> Result<&AgreementRecord, StoreError> {
        let key = normalize_serial(serial);
        let entry = self
            .index
            .get_mut(&key)
            .ok_or_else(|| StoreError::UnknownSerial(key.clone()))?;

        {
            let _gate = self.gate.hold();
            update_file(&entry.source, &key, status, school)?;
        }

        entry.record.confirm(status, school);
        Ok(&entry.record)
    }
}

/// Marks every row of `path` whose serial matches as confirmed with the
/// given status and school, then rewrites the whole file.
pub fn update_file(
    path: &Path,
    serial: &str,
    status: Option<&str>,
    school: Option<&str>,
) -> Result<(), StoreError> {
    let persist_err = |source: io::Error| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let _lock = AdvisoryFileLock::acquire(path).map_err(persist_err)?;

    let mut table = Table::read_strict(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let not_found = || StoreError::RecordNotFound {
        serial: serial.to_string(),
        path: path.to_path_buf(),
    };
    let serial_idx = table.column(SERIAL_COLUMN).ok_or_else(not_found)?;
    let key = normalize_serial(serial);
    let matching: Vec<usize> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.get(serial_idx)
                .is_some_and(|value| normalize_serial(value) == key)
        })
        .map(|(idx, _)| idx)
        .collect();
    if matching.is_empty() {
        return Err(not_found());
    }

    let confirmed_idx = table.ensure_column(CONFIRMED_COLUMN);
    let status_idx = table.ensure_column(STATUS_COLUMN);
    let school_idx = table.ensure_column(SCHOOL_COLUMN);
    for idx in matching {
        let row = &mut table.rows[idx];
        row[confirmed_idx] = CONFIRMED_TRUE.to_string();
        row[status_idx] = status.unwrap_or_default().to_string();
        row[school_idx] = school.unwrap_or_default().to_string();
    }

    table.write_atomic(path).map_err(persist_err)?;
    debug!(
        event = "agreement_file_rewritten",
        file = %path.display(),
        serial = %key,
        rows = table.rows.len()
    );
    Ok(())
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let load_err = |source| StoreError::Load {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(load_err)? {
        let path = entry.map_err(load_err)?.path();
        let is_record = path
            .extension()
            .is_some_and(|ext| ext == RECORD_EXTENSION);
        if is_record && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
