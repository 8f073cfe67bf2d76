//! RMM-style CSV log parsing.
//!
//! The logging resource adaptor writes one header row followed by one row
//! per action, e.g.
//!
//! ```text
//! Thread,Time,Action,Pointer,Size,Stream
//! 140202006665024,08:12:17.472,allocate,0x7fb3c446f000,1024,0x0
//! 140202006665024,08:12:17.473,free,0x7fb3c446f000,1024,0x0
//! ```
//!
//! Columns are found by name, so extra columns and any column order are
//! accepted. The first malformed row aborts the whole load; replay never
//! starts on a partial log.

use crate::record::{Action, LogRecord, ParsedLog};
use heapreplay_core::{CoreError, OriginalAddress};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Column holding the action text
pub const ACTION_COLUMN: &str = "Action";
/// Column holding the decimal size
pub const SIZE_COLUMN: &str = "Size";
/// Column holding the hexadecimal pointer
pub const POINTER_COLUMN: &str = "Pointer";

/// Log result type
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while loading a log
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Log could not be read
    #[error("Failed to read log {log}: {source}")]
    Io {
        /// Log name or path
        log: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Log has no header row
    #[error("Log {log} has no header row")]
    MissingHeader {
        /// Log name or path
        log: String,
    },

    /// A required column is absent from the header
    #[error("Log {log} is missing required column '{column}'")]
    MissingColumn {
        /// Log name or path
        log: String,
        /// Column name
        column: &'static str,
    },

    /// Row has too few fields
    #[error("Line {line}: expected at least {expected} fields, found {found}")]
    MalformedRow {
        /// 1-based line number
        line: usize,
        /// Fields needed to reach every required column
        expected: usize,
        /// Fields present
        found: usize,
    },

    /// Action is neither `allocate` nor `free`
    #[error("Line {line}: unknown action '{action}'")]
    UnknownAction {
        /// 1-based line number
        line: usize,
        /// Action text
        action: String,
    },

    /// Size is not a decimal unsigned integer
    #[error("Line {line}: invalid size '{size}'")]
    InvalidSize {
        /// 1-based line number
        line: usize,
        /// Size text
        size: String,
    },

    /// Pointer is not a hexadecimal address
    #[error("Line {line}: {source}")]
    InvalidPointer {
        /// 1-based line number
        line: usize,
        /// Address parse failure
        source: CoreError,
    },
}

/// Positions of the required columns within a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    action: usize,
    size: usize,
    pointer: usize,
}

impl Columns {
    fn from_header(header: &str, log: &str) -> LogResult<Self> {
        let names: Vec<&str> = header
            .trim_start_matches('\u{feff}')
            .split(',')
            .map(str::trim)
            .collect();

        let find = |column: &'static str| {
            names
                .iter()
                .position(|name| *name == column)
                .ok_or_else(|| LogError::MissingColumn {
                    log: log.to_string(),
                    column,
                })
        };

        Ok(Self {
            action: find(ACTION_COLUMN)?,
            size: find(SIZE_COLUMN)?,
            pointer: find(POINTER_COLUMN)?,
        })
    }

    /// Fields a row must have to reach every required column
    fn width(&self) -> usize {
        self.action.max(self.size).max(self.pointer) + 1
    }

    fn parse_row(&self, row: &str, line: usize) -> LogResult<LogRecord> {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        if fields.len() < self.width() {
            return Err(LogError::MalformedRow {
                line,
                expected: self.width(),
                found: fields.len(),
            });
        }

        let action_text = fields[self.action];
        let action: Action = action_text.parse().map_err(|_| LogError::UnknownAction {
            line,
            action: action_text.to_string(),
        })?;

        let size_text = fields[self.size];
        let size: u64 = size_text.parse().map_err(|_| LogError::InvalidSize {
            line,
            size: size_text.to_string(),
        })?;

        let address = OriginalAddress::from_hex(fields[self.pointer])
            .map_err(|source| LogError::InvalidPointer { line, source })?;

        Ok(LogRecord {
            action,
            size,
            address,
        })
    }
}

/// Parse a log from any buffered reader.
///
/// `log` names the source in errors and in the resulting [`ParsedLog`].
///
/// # Errors
///
/// Returns the first I/O, header or row error encountered.
pub fn parse_reader<R: BufRead>(reader: R, log: &str) -> LogResult<ParsedLog> {
    let mut columns: Option<Columns> = None;
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|source| LogError::Io {
            log: log.to_string(),
            source,
        })?;

        if line.trim().is_empty() {
            continue;
        }

        match columns {
            None => {
                let found = Columns::from_header(&line, log)?;
                debug!(
                    log,
                    action = found.action,
                    size = found.size,
                    pointer = found.pointer,
                    "located log columns"
                );
                columns = Some(found);
            }
            Some(cols) => records.push(cols.parse_row(&line, line_number)?),
        }
    }

    if columns.is_none() {
        return Err(LogError::MissingHeader {
            log: log.to_string(),
        });
    }

    info!(log, records = records.len(), "parsed allocation log");
    Ok(ParsedLog::from_records(log, records))
}

/// Parse a log held in memory
///
/// # Errors
///
/// Returns the first header or row error encountered.
pub fn parse_str(text: &str) -> LogResult<ParsedLog> {
    parse_reader(text.as_bytes(), "<memory>")
}

/// Parse a log file
///
/// # Errors
///
/// Returns [`LogError::Io`] if the file cannot be opened or read, otherwise
/// the first header or row error encountered.
pub fn parse_file(path: impl AsRef<Path>) -> LogResult<ParsedLog> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let file = File::open(path).map_err(|source| LogError::Io {
        log: name.clone(),
        source,
    })?;
    parse_reader(BufReader::new(file), &name)
}
