//! Event sources feeding the reporter.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use hostlink_common::error::{HostlinkError, Result};
use hostlink_common::types::ApiEvent;

/// Pull-based supplier of intercepted calls.
pub trait EventSource {
    /// Returns the next event, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the next event cannot be produced.
    fn next_event(&mut self) -> Result<Option<ApiEvent>>;
}

/// Source over any in-memory sequence of events.
#[derive(Debug)]
pub struct IterSource<I> {
    events: I,
}

impl<I: Iterator<Item = ApiEvent>> IterSource<I> {
    /// Wraps an iterator of events.
    pub fn new(events: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }
}

impl<I: Iterator<Item = ApiEvent>> EventSource for IterSource<I> {
    fn next_event(&mut self) -> Result<Option<ApiEvent>> {
        Ok(self.events.next())
    }
}

/// Reads one JSON-encoded [`ApiEvent`] per line. Blank lines are skipped.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    origin: PathBuf,
    line_no: usize,
    line: String,
}

impl JsonLinesSource<BufReader<File>> {
    /// Opens an events file.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Io`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| HostlinkError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::with_origin(BufReader::new(file), path.to_path_buf()))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Reads events from an arbitrary buffered reader.
    pub fn new(reader: R) -> Self {
        Self::with_origin(reader, PathBuf::from("<stream>"))
    }

    fn with_origin(reader: R, origin: PathBuf) -> Self {
        Self {
            reader,
            origin,
            line_no: 0,
            line: String::new(),
        }
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub const fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> EventSource for JsonLinesSource<R> {
    fn next_event(&mut self) -> Result<Option<ApiEvent>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| HostlinkError::Io {
                    path: self.origin.clone(),
                    source: e,
                })?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str(text).map(Some).map_err(|e| {
                tracing::warn!(
                    origin = %self.origin.display(),
                    line = self.line_no,
                    "malformed event line"
                );
                HostlinkError::from(e)
            });
        }
    }
}
