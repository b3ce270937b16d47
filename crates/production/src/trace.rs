//! Per-process trace output.
//!
//! Every tick produces exactly one line, flushed before the process sleeps,
//! so a killed process never loses a completed tick.

use lamport_core::TickRecord;
use lamport_types::Rank;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for tick records and fatal diagnostics.
pub trait TraceSink {
    /// Append one tick record.
    fn record(&mut self, record: &TickRecord) -> io::Result<()>;

    /// Append a free-form diagnostic line (used before exiting on error).
    fn diagnostic(&mut self, message: &str) -> io::Result<()>;
}

/// Trace file at `<dir>/process<rank>.log`.
#[derive(Debug)]
pub struct FileTraceSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileTraceSink {
    /// Create (truncating) the trace file for `rank` inside `dir`.
    pub fn create(dir: &Path, rank: Rank) -> io::Result<Self> {
        let path = Self::path_for(dir, rank);
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Trace file path for `rank` inside `dir`.
    pub fn path_for(dir: &Path, rank: Rank) -> PathBuf {
        dir.join(format!("process{}.log", rank))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &dyn std::fmt::Display) -> io::Result<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }
}

impl TraceSink for FileTraceSink {
    fn record(&mut self, record: &TickRecord) -> io::Result<()> {
        self.write_line(record)
    }

    fn diagnostic(&mut self, message: &str) -> io::Result<()> {
        self.write_line(&message)
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryTraceSink {
    records: Vec<TickRecord>,
    diagnostics: Vec<String>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&mut self, record: &TickRecord) -> io::Result<()> {
        self.records.push(*record);
        Ok(())
    }

    fn diagnostic(&mut self, message: &str) -> io::Result<()> {
        self.diagnostics.push(message.to_string());
        Ok(())
    }
}
