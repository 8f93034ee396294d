//! Kernel rule table enumeration
//!
//! The kernel renders its live rule set as text, one record per line. A table
//! is read line by line:
//!
//! - a line in the backend's record layout is decoded and handed to the visitor
//! - a well-formed line for a chain or target outside the rule model is skipped
//! - the first line without the record layout (summary lines, garbage) ends
//!   the listing; that is a normal end, not an error
//!
//! The visitor returns [`ControlFlow`]: `Break` stops reading at once and its
//! value becomes the enumeration result.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::core::ActiveBackend;
use crate::core::backend::{Backend, TableLine};
use crate::core::error::{Error, Result};
use crate::core::firewall::Rule;

/// Longest table line read, newline included (`BUFSIZ`)
pub const MAX_LINE_LEN: usize = 8192;

/// Source of rule table text
pub trait RuleTable {
    type Reader: BufRead;

    /// Opens a fresh view of the table. The reader is dropped when enumeration ends.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while opening.
    fn open(&self) -> io::Result<Self::Reader>;

    /// Human-readable name used in errors and logs
    fn name(&self) -> Cow<'_, str>;
}

/// Table backed by a file, by default the kernel's proc file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcTable {
    path: PathBuf,
}

impl ProcTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new(ActiveBackend::TABLE_PATH)
    }
}

impl RuleTable for ProcTable {
    type Reader = BufReader<File>;

    fn open(&self) -> io::Result<Self::Reader> {
        File::open(&self.path).map(BufReader::new)
    }

    fn name(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }
}

/// Reads `table` with backend `Bk`, calling `visit` for each modelled rule.
///
/// Returns `Continue(())` once the table is exhausted or a line without the
/// record layout is reached, or the visitor's `Break` value.
///
/// # Errors
///
/// Returns `Error::Resource` if the table cannot be opened or a read fails.
pub fn enumerate<Bk, T, B, F>(table: &T, mut visit: F) -> Result<ControlFlow<B>>
where
    Bk: Backend,
    T: RuleTable + ?Sized,
    F: FnMut(&Rule) -> ControlFlow<B>,
{
    let mut reader = table
        .open()
        .map_err(|e| Error::resource(table.name(), e))?;

    let mut buf = Vec::new();
    let mut line_no = 0usize;
    let mut visited = 0usize;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::resource(table.name(), e))?;
        if read == 0 {
            debug!(table = %table.name(), visited, "Rule table fully enumerated");
            return Ok(ControlFlow::Continue(()));
        }
        line_no += 1;

        let overlong = read == MAX_LINE_LEN && buf.last() != Some(&b'\n');
        let parsed = if overlong {
            TableLine::Malformed
        } else {
            std::str::from_utf8(&buf).map_or(TableLine::Malformed, Bk::parse_line)
        };
        let record = match parsed {
            TableLine::Rule(record) => record,
            TableLine::Foreign => {
                trace!(line = line_no, "Skipping entry outside the rule model");
                continue;
            }
            TableLine::Malformed => {
                debug!(line = line_no, visited, "Rule table ended at non-record line");
                return Ok(ControlFlow::Continue(()));
            }
        };

        let rule = Bk::decode(&record);
        visited += 1;
        if let ControlFlow::Break(value) = visit(&rule) {
            debug!(line = line_no, "Enumeration stopped by visitor");
            return Ok(ControlFlow::Break(value));
        }
    }
}
