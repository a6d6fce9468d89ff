//! Data collaborators of relay nodes.
//!
//! A relay pulls outbound lines from an [`OutboundSource`] and hands every
//! frame it accepts to a [`DeliverySink`]. File-backed versions follow the
//! `input-file-<N>` / `output-file-<N>` naming; in-memory versions serve
//! tests and embedding.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{RingError, Result};

/// Source of outbound data lines (`"<destination>,<size>,<data>"`).
pub trait OutboundSource: Send {
    /// Next line, or `None` once the data is exhausted.
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Sink for frames a node accepted.
pub trait DeliverySink: Send {
    fn record_accepted(&mut self, delivery: &Delivery) -> Result<()>;
}

/// One accepted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub source: u8,
    pub destination: u8,
    pub size: u8,
    pub payload: Vec<u8>,
}

impl Delivery {
    /// Log record `"<source>,<destination>,<size>,<data>"`.
    pub fn to_record(&self) -> String {
        format!(
            "{},{},{},{}",
            self.source,
            self.destination,
            self.size,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

/// `<pattern><address>` as a path.
pub fn node_path(pattern: &str, address: u8) -> PathBuf {
    PathBuf::from(format!("{pattern}{address}"))
}

/// Outbound lines read from a file. A missing file is an empty source.
///
/// Reads are blocking `std::fs` calls of one short line each, made from the
/// relay task between frames.
pub struct LineSource {
    reader: Option<BufReader<File>>,
}

impl LineSource {
    /// Open `<pattern><address>`.
    pub fn open(pattern: &str, address: u8) -> Result<Self> {
        Self::from_path(node_path(pattern, address))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        match File::open(path.as_ref()) {
            Ok(file) => Ok(Self {
                reader: Some(BufReader::new(file)),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.as_ref().display(), "No input file, node has no data");
                Ok(Self { reader: None })
            }
            Err(e) => Err(RingError::Io(e)),
        }
    }
}

impl OutboundSource for LineSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            self.reader = None;
            return Ok(None);
        }
        while line.ends_with(['\n', '\r']) {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Accepted-frame records appended to a file, one per line.
///
/// Like [`LineSource`], writes are small blocking `std::fs` calls.
pub struct FrameLog {
    writer: BufWriter<File>,
}

impl FrameLog {
    /// Create (truncate) `<pattern><address>`.
    pub fn create(pattern: &str, address: u8) -> Result<Self> {
        Self::from_path(node_path(pattern, address))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl DeliverySink for FrameLog {
    fn record_accepted(&mut self, delivery: &Delivery) -> Result<()> {
        writeln!(self.writer, "{}", delivery.to_record())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Outbound lines held in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSource {
    lines: VecDeque<String>,
}

impl VecSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl OutboundSource for VecSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Deliveries collected in memory; clones share the same record list.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        match self.deliveries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DeliverySink for MemorySink {
    fn record_accepted(&mut self, delivery: &Delivery) -> Result<()> {
        let mut guard = self
            .deliveries
            .lock()
            .map_err(|_| RingError::Protocol("delivery log poisoned".to_string()))?;
        guard.push(delivery.clone());
        Ok(())
    }
}
