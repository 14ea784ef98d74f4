//! Tabular output: schema detection and append-mode CSV writing.
//!
//! New files get the canonical `id,text,char_len` header. When appending to a
//! file written by an older version that carried a fourth "matched keyword"
//! column, rows keep that shape with the fourth cell left blank. The schema is
//! resolved once, when the sink is opened.

use crate::selection::MatchedRecord;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Columns of the canonical schema.
pub const CANONICAL_COLUMNS: [&str; 3] = ["id", "text", "char_len"];

/// Accepted names for the legacy fourth column (case-insensitive).
pub const LEGACY_MARKERS: [&str; 2] = ["keyword", "matched_keyword"];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{path}: existing header {header:?} is neither id,text,char_len nor the legacy 4-column form")]
    UnknownHeader { path: PathBuf, header: Vec<String> },

    #[error("{path}: cannot read existing header: {source}")]
    Unreadable { path: PathBuf, source: csv::Error },
}

/// Column layout used for every row of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    columns: Vec<String>,
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self::canonical()
    }
}

impl OutputSchema {
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            columns: CANONICAL_COLUMNS.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.columns.len() == 4
    }

    /// Resolve the schema from an existing header row.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownHeader`] for any other header.
    pub fn from_header(path: &Path, header: &[String]) -> Result<Self, SchemaError> {
        let cleaned: Vec<String> = header
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let base_ok = cleaned.len() >= 3
            && cleaned
                .iter()
                .zip(CANONICAL_COLUMNS)
                .all(|(have, want)| have.eq_ignore_ascii_case(want));
        match cleaned.len() {
            3 if base_ok => Ok(Self::canonical()),
            4 if base_ok
                && LEGACY_MARKERS
                    .iter()
                    .any(|m| cleaned[3].eq_ignore_ascii_case(m)) =>
            {
                Ok(Self { columns: cleaned })
            }
            _ => Err(SchemaError::UnknownHeader {
                path: path.to_path_buf(),
                header: cleaned,
            }),
        }
    }

    /// Inspect `path`: `Ok(None)` when there is no header to respect (file
    /// missing or empty), otherwise the schema its header implies.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the header cannot be read or is not recognised.
    pub fn detect(path: &Path) -> Result<Option<Self>, SchemaError> {
        let unreadable = |source| SchemaError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unreadable(csv::Error::from(e))),
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        match rdr.records().next() {
            None => Ok(None),
            Some(Err(e)) => Err(unreadable(e)),
            Some(Ok(rec)) => {
                let header: Vec<String> = rec.iter().map(ToString::to_string).collect();
                if header.iter().all(|h| h.trim().is_empty()) {
                    return Ok(None);
                }
                Self::from_header(path, &header).map(Some)
            }
        }
    }

    /// Cells for one record under this schema.
    #[must_use]
    pub fn row(&self, record: &MatchedRecord) -> Vec<String> {
        let mut cells = vec![
            record.id.clone(),
            sanitize(&record.text),
            record.length.to_string(),
        ];
        cells.resize(self.columns.len(), String::new());
        cells
    }
}

/// Replace line separators so a record always occupies exactly one row.
#[must_use]
pub fn sanitize(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r', '\u{85}', '\u{2028}', '\u{2029}'], " ")
}

/// Destination for selected records.
pub trait RowSink {
    /// Write one selected record.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    fn write(&mut self, record: &MatchedRecord) -> Result<()>;

    /// Flush everything; called once on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered rows cannot be flushed.
    fn finish(&mut self) -> Result<()>;
}

/// Append-mode CSV file.
pub struct CsvSink {
    writer: csv::Writer<File>,
    schema: OutputSchema,
    path: PathBuf,
    rows: usize,
}

impl CsvSink {
    /// Open `path` for appending (or truncate it when `overwrite`), resolving
    /// the schema and writing a header if the file has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or its existing header
    /// is not recognised.
    pub fn open(path: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }

        let existing = if overwrite {
            None
        } else {
            OutputSchema::detect(path)?
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(!overwrite)
            .write(true)
            .truncate(overwrite)
            .read(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;

        let needs_header = existing.is_none();
        if !needs_header {
            ensure_trailing_newline(&mut file)
                .with_context(|| format!("inspect tail of {}", path.display()))?;
        } else if !overwrite && file.metadata().map(|m| m.len()).unwrap_or(0) > 0 {
            // Whitespace-only file: start over rather than append after it.
            file.set_len(0)
                .with_context(|| format!("truncate {}", path.display()))?;
        }
        let schema = existing.unwrap_or_default();

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer
                .write_record(schema.columns())
                .with_context(|| format!("write header to {}", path.display()))?;
        }
        info!(
            path = %path.display(),
            columns = schema.columns().len(),
            appending = !needs_header,
            "output opened"
        );
        Ok(Self {
            writer,
            schema,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    #[must_use]
    pub const fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    #[must_use]
    pub const fn rows_written(&self) -> usize {
        self.rows
    }
}

fn ensure_trailing_newline(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

impl RowSink for CsvSink {
    fn write(&mut self, record: &MatchedRecord) -> Result<()> {
        self.writer
            .write_record(self.schema.row(record))
            .with_context(|| format!("write row {} to {}", record.id, self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        debug!(path = %self.path.display(), rows = self.rows, "output flushed");
        Ok(())
    }
}

/// In-memory sink, for library callers and tests.
#[derive(Debug, Default)]
pub struct VecSink {
    pub rows: Vec<MatchedRecord>,
    pub finished: bool,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowSink for VecSink {
    fn write(&mut self, record: &MatchedRecord) -> Result<()> {
        self.rows.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
