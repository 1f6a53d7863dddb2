//! Shared logging utilities for TalentMap binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "talentmap=info,talentmap_resolver=info,talentmap_engine=info,talentmap_store=info";
const LOG_KEEP_FILES: usize = 5;
const LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// Logging configuration for the CLI.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a size-capped file writer and stderr output.
///
/// The file layer always logs at the configured filter; stderr stays
/// quiet (warnings only) unless `verbose` is set.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedLogWriter::open(log_dir, config.app_name)?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Get the TalentMap home directory: ~/.talentmap
pub fn talentmap_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TALENTMAP_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".talentmap")
}

/// Get the logs directory: ~/.talentmap/logs
pub fn logs_dir() -> PathBuf {
    talentmap_home().join("logs")
}

/// Default directory for persisted embedding matrices: ~/.talentmap/embeddings
pub fn embeddings_dir() -> PathBuf {
    talentmap_home().join("embeddings")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that rotates itself once it crosses the size
/// cap. Rotations shift `name.log` -> `name.log.1` -> ... and drop the
/// oldest beyond the keep count.
struct SizeCappedLogFile {
    dir: PathBuf,
    base_name: String,
    file: File,
    written: u64,
}

impl SizeCappedLogFile {
    fn open(dir: PathBuf, base_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let base_name = sanitize_name(base_name);
        let (file, written) = open_append(&dir.join(format!("{base_name}.log")))?;
        let mut log = Self {
            dir,
            base_name,
            file,
            written,
        };
        if log.written > LOG_ROTATE_BYTES {
            log.rotate()?;
        }
        Ok(log)
    }

    fn slot_path(&self, index: usize) -> PathBuf {
        if index == 0 {
            self.dir.join(format!("{}.log", self.base_name))
        } else {
            self.dir.join(format!("{}.log.{}", self.base_name, index))
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        let _ = self.file.flush();

        let oldest = self.slot_path(LOG_KEEP_FILES - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (0..LOG_KEEP_FILES - 1).rev() {
            let src = self.slot_path(index);
            if src.exists() {
                fs::rename(&src, self.slot_path(index + 1))?;
            }
        }

        let (file, written) = open_append(&self.slot_path(0))?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

fn open_append(path: &PathBuf) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

impl Write for SizeCappedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > LOG_ROTATE_BYTES {
            self.rotate()?;
        }
        let bytes = self.file.write(buf)?;
        self.written += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// `MakeWriter` handing out guards over one shared rotating file.
#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<SizeCappedLogFile>>,
}

impl SharedLogWriter {
    fn open(dir: PathBuf, base_name: &str) -> Result<Self> {
        let log = SizeCappedLogFile::open(dir, base_name)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(log)),
        })
    }
}

struct SharedLogWriterGuard {
    inner: Arc<Mutex<SizeCappedLogFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedLogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
