//! Rotating JSONL writer for link telemetry

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::types::LinkRecord;
use crate::config::TelemetryConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "link_";
const FILE_EXTENSION: &str = "jsonl";

/// Telemetry logger
///
/// Writes one record per line. After `max_records_per_file` records the
/// current file is closed and a new one started; only the newest
/// `max_files_to_keep` files are retained.
///
/// Errors are logged and swallowed so recording never disturbs the link path.
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    sequence: u32,
}

impl TelemetryLogger {
    /// Create the log directory and a logger writing into it
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        fs::create_dir_all(&config.log_dir)?;
        info!("Recording link telemetry to {}", config.log_dir);

        Ok(Self {
            dir: PathBuf::from(&config.log_dir),
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// Append one record
    pub fn record(&mut self, record: &LinkRecord) {
        if let Err(e) = self.try_record(record) {
            warn!("Failed to write telemetry record: {}", e);
            // start over with a fresh file next time
            self.writer = None;
        }
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush telemetry file: {}", e);
            }
        }
    }

    /// Telemetry files currently on disk, oldest first
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.dir)
    }

    fn try_record(&mut self, record: &LinkRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.sequence = self.sequence.wrapping_add(1);
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence % 10_000,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);

        let file = File::create(&path)?;
        debug!("Opened telemetry file {}", path.display());
        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let files = list_files(&self.dir)?;
        let excess = files.len().saturating_sub(self.max_files_to_keep);

        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed old telemetry file {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

impl Drop for TelemetryLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_telemetry_file(path))
        .collect();

    // names embed timestamp and sequence so lexical order is age order
    files.sort();
    Ok(files)
}

fn is_telemetry_file(path: &Path) -> bool {
    let has_prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX));
    let has_extension = path.extension().is_some_and(|ext| ext == FILE_EXTENSION);

    has_prefix && has_extension
}
