//! CSV frequency logs: one file per channel per logging run.

use combctl_core::freq_log::FrequencySink;
use combctl_traits::DeviceError;
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub const HEADER: [&str; 2] = ["Time (s)", "Frequency (Hz)"];

pub struct CsvFrequencySink {
    dir: PathBuf,
    writers: HashMap<usize, csv::Writer<File>>,
}

impl CsvFrequencySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: HashMap::new(),
        }
    }

    fn file_path(&self, name: &str) -> PathBuf {
        let stem: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.dir.join(format!("{stem}_{secs}.csv"))
    }
}

impl FrequencySink for CsvFrequencySink {
    fn start(&mut self, channel: usize, name: &str) -> Result<(), DeviceError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_path(name);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        tracing::info!(channel, path = %path.display(), "frequency log opened");
        self.writers.insert(channel, writer);
        Ok(())
    }

    fn record(&mut self, channel: usize, elapsed_s: f64, frequency_hz: f64) -> Result<(), DeviceError> {
        let Some(writer) = self.writers.get_mut(&channel) else {
            return Err(format!("no frequency log open for channel {channel}").into());
        };
        writer.write_record([format!("{elapsed_s:.3}"), format!("{frequency_hz:.3}")])?;
        writer.flush()?;
        Ok(())
    }

    fn stop(&mut self, channel: usize) -> Result<(), DeviceError> {
        if let Some(mut writer) = self.writers.remove(&channel) {
            writer.flush()?;
            tracing::info!(channel, "frequency log closed");
        }
        Ok(())
    }
}
