//! heapreplay allocation logs
//!
//! Records of historical allocate/free actions and the parser that reads
//! them from RMM-style CSV logs. Row order is the only notion of time a log
//! carries, so everything here preserves it exactly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod parse;
pub mod record;

pub use parse::{LogError, LogResult, parse_file, parse_reader, parse_str};
pub use record::{Action, LogRecord, LogStats, ParsedLog, UnknownAction};
