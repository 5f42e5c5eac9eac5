use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::Record;

/// Owns a spill file path and removes the file when released.
#[derive(Debug)]
pub struct SpillGuard {
    path: Option<PathBuf>,
    keep: bool,
}

impl SpillGuard {
    pub fn new(path: PathBuf, keep: bool) -> Self {
        Self {
            path: Some(path),
            keep,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Idempotent; failures are logged and swallowed.
    pub fn close(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        if self.keep {
            debug!(path = %path.display(), "keeping spill file");
            return;
        }
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove spill file");
            }
        }
    }
}

impl Drop for SpillGuard {
    fn drop(&mut self) {
        self.close();
    }
}

enum SpillWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl SpillWriter {
    fn as_write(&mut self) -> &mut dyn Write {
        match self {
            SpillWriter::Plain(w) => w,
            SpillWriter::Gzip(w) => w,
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            SpillWriter::Plain(mut w) => w.flush(),
            SpillWriter::Gzip(w) => w.finish()?.flush(),
        }
    }
}

/// Write side of one partition: newline-delimited JSON, optionally gzip.
pub struct SpillFile {
    writer: Option<SpillWriter>,
    compressed: bool,
    records: usize,
    guard: SpillGuard,
}

impl std::fmt::Debug for SpillFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillFile")
            .field("path", &self.guard.path())
            .field("compressed", &self.compressed)
            .field("records", &self.records)
            .finish()
    }
}

impl SpillFile {
    pub fn create(path: PathBuf, compressed: bool, keep: bool, buffer_size: usize) -> Result<Self> {
        let file = File::create(&path)?;
        let buffered = BufWriter::with_capacity(buffer_size, file);
        let writer = if compressed {
            SpillWriter::Gzip(GzEncoder::new(buffered, Compression::fast()))
        } else {
            SpillWriter::Plain(buffered)
        };

        Ok(Self {
            writer: Some(writer),
            compressed,
            records: 0,
            guard: SpillGuard::new(path, keep),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.guard.path()
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "spill file already finished").into());
        };
        let out = writer.as_write();
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finish(),
            None => Ok(()),
        }
    }

    /// Flushes the write side and reopens the file for a single forward pass.
    pub fn into_reader(mut self, buffer_size: usize) -> Result<SpillReader> {
        self.finish()?;
        let path = match self.guard.path() {
            Some(path) => path.to_path_buf(),
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "spill file already closed").into()),
        };

        let file = File::open(&path)?;
        let inner: Box<dyn Read + Send> = if self.compressed {
            Box::new(GzDecoder::new(BufReader::with_capacity(buffer_size, file)))
        } else {
            Box::new(file)
        };

        Ok(SpillReader {
            reader: BufReader::with_capacity(buffer_size, inner),
            line: String::new(),
            guard: self.guard,
        })
    }

    /// Releases the file; a failed flush is logged and the file is still removed.
    pub fn close(mut self) {
        if let Err(e) = self.finish() {
            warn!(path = ?self.guard.path(), error = %e, "failed to finish spill file");
        }
        self.guard.close();
    }
}

/// Read side of one partition.
pub struct SpillReader {
    reader: BufReader<Box<dyn Read + Send>>,
    line: String,
    guard: SpillGuard,
}

impl SpillReader {
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(Record::from_json_line(trimmed)?));
        }
    }

    pub fn close(mut self) {
        self.guard.close();
    }
}
