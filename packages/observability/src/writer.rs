//! File sinks and subscriber composition.
//!
//! Two append-only JSONL files: a combined log for every event that passes
//! the level filter, and an error log that only receives `ERROR` events.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// `~/.notevault/logs`, the default home of both log files.
pub fn default_logs_dir() -> io::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".notevault").join("logs"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))
}

/// Line-flushed append writer shared by every clone.
#[derive(Clone)]
pub struct LogFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        // one flush per line keeps concurrent appenders from interleaving
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// MakeWriter implementation for tracing-subscriber
#[derive(Clone)]
pub struct WriterFactory {
    writer: LogFileWriter,
}

impl WriterFactory {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: LogFileWriter::new(path)?,
        })
    }
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn level_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
}

/// Install the global subscriber described by `config`.
pub fn init_subscriber(config: &LogConfig) -> io::Result<()> {
    let combined_path = match &config.log_path {
        Some(path) => path.clone(),
        None => default_logs_dir()?.join("combined.jsonl"),
    };
    let error_path = match &config.error_log_path {
        Some(path) => path.clone(),
        None => default_logs_dir()?.join("error.jsonl"),
    };

    let combined_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::open(&combined_path)?)
        .with_filter(level_filter(config));
    let error_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::open(&error_path)?)
        .with_filter(LevelFilter::ERROR);

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(level_filter(config))
    });

    tracing_subscriber::registry()
        .with(combined_layer)
        .with(error_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    tracing::debug!(
        combined = %combined_path.display(),
        errors = %error_path.display(),
        "observability initialized"
    );
    Ok(())
}
