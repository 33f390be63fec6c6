//! Plain-text link-construction log used for offline timing analysis.
//!
//! ```text
//! Node 3
//! Node 1
//! Link no.0 183211ns
//! ```

use std::fs::{self, File};
use std::io::{LineWriter, Write};
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{FabricError, Result};
use crate::graph::NodeId;

/// Shared, line-buffered log sink. Safe to write from pool workers.
pub struct LinkLog {
    out: Mutex<Box<dyn Write + Send>>,
}

impl LinkLog {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Truncate or create `path`, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(FabricError::LinkLog)?;
        }
        let file = File::create(path).map_err(FabricError::LinkLog)?;
        Ok(Self::new(LineWriter::new(file)))
    }

    /// Discards everything.
    pub fn sink() -> Self {
        Self::new(std::io::sink())
    }

    pub fn node(&self, id: NodeId) -> Result<()> {
        self.line(format_args!("Node {id}"))
    }

    pub fn link(&self, number: usize, elapsed: Duration) -> Result<()> {
        self.line(format_args!("Link no.{number} {}ns", elapsed.as_nanos()))
    }

    pub fn flush(&self) -> Result<()> {
        self.out.lock().flush().map_err(FabricError::LinkLog)
    }

    fn line(&self, args: std::fmt::Arguments<'_>) -> Result<()> {
        let mut out = self.out.lock();
        out.write_fmt(args)
            .and_then(|()| out.write_all(b"\n"))
            .map_err(FabricError::LinkLog)
    }
}
