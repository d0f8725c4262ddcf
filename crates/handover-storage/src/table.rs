use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whole contents of one agreement file: header plus every row, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub crlf: bool,
}

/// Row-level parse failures seen while reading a table leniently.
#[derive(Debug)]
pub(crate) struct SkippedRow {
    pub line: Option<u64>,
    pub error: csv::Error,
}

impl Table {
    /// Reads every row or fails on the first bad one. Used before a rewrite,
    /// where dropping a row would lose data.
    pub fn read_strict(path: &Path) -> Result<Self, csv::Error> {
        let (mut table, skipped) = Self::read(path)?;
        if let Some(first) = skipped.into_iter().next() {
            return Err(first.error);
        }
        table.pad_rows();
        Ok(table)
    }

    /// Reads every row it can, returning the rows that failed to parse.
    pub fn read_lenient(path: &Path) -> Result<(Self, Vec<SkippedRow>), csv::Error> {
        Self::read(path)
    }

    fn read(path: &Path) -> Result<(Self, Vec<SkippedRow>), csv::Error> {
        let bytes = fs::read(path)?;
        let crlf = header_ends_with_crlf(&bytes);

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());
        let headers = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        for result in reader.records() {
            match result {
                Ok(record) => rows.push(record_to_row(&record)),
                Err(error) => skipped.push(SkippedRow {
                    line: error.position().map(|pos| pos.line()),
                    error,
                }),
            }
        }

        Ok((
            Self {
                headers,
                rows,
                crlf,
            },
            skipped,
        ))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Index of `name`, appending it as a new empty column when absent.
    /// Cells past the old header width stay past the new one.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        let idx = self.headers.len();
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            if row.len() < idx {
                row.resize(idx, String::new());
            }
            row.insert(idx, String::new());
        }
        idx
    }

    fn pad_rows(&mut self) {
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
    }

    /// Replaces `path` with this table via a sibling temp file and rename.
    pub fn write_atomic(&self, path: &Path) -> io::Result<()> {
        let temp_path = temp_path_for(path);
        let result = self.write_to(&temp_path).and_then(|()| fs::rename(&temp_path, path));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn write_to(&self, path: &Path) -> io::Result<()> {
        let terminator = if self.crlf {
            Terminator::CRLF
        } else {
            Terminator::Any(b'\n')
        };
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .terminator(terminator)
            .from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let file = writer
            .into_inner()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
        file.sync_all()
    }
}

pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    }
}

/// Line ending of the header row. Quoted cells further down may carry
/// their own line breaks.
fn header_ends_with_crlf(bytes: &[u8]) -> bool {
    match bytes.iter().position(|&byte| byte == b'\n') {
        Some(end) => end > 0 && bytes[end - 1] == b'\r',
        None => false,
    }
}

fn record_to_row(record: &StringRecord) -> Vec<String> {
    record.iter().map(str::to_string).collect()
}
