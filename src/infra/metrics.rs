// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:    the epoch number (1, 2, 3, ...)
//   - avg_loss: mean of the batch losses of the epoch
//   - seconds:  wall time the epoch took
//   - best:     1 when this epoch wrote the best checkpoint
//
// Output file: <run_dir>/metrics.csv
//
// Example CSV output:
//   epoch,avg_loss,seconds,best
//   1,6.812300,41.20,1
//   2,5.904100,40.87,1
//   3,5.911800,40.95,0
//
// How to read the metrics:
//   - avg_loss should fall over the first epochs
//   - a run of best=0 rows means the loss has plateaued
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Mean masked cross-entropy over the epoch's batches
    pub avg_loss: f64,

    /// Wall time of the epoch
    pub seconds: f64,

    /// Whether the epoch produced a new best checkpoint
    pub best: bool,
}

impl EpochMetrics {
    pub fn new(epoch: usize, avg_loss: f64, seconds: f64, best: bool) -> Self {
        Self { epoch, avg_loss, seconds, best }
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// Full path to the CSV file
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger in `dir`.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,avg_loss,seconds,best")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.2},{}",
            m.epoch,
            m.avg_loss,
            m.seconds,
            u8::from(m.best),
        )?;

        tracing::debug!("Logged epoch {} metrics: avg_loss={:.4}", m.epoch, m.avg_loss);
        Ok(())
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_header_and_rows() {
        let tmp    = TempDir::new("metrics").unwrap();
        let logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 2.5, 1.25, true)).unwrap();
        logger.log(&EpochMetrics::new(2, 2.75, 1.0, false)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "epoch,avg_loss,seconds,best");
        assert_eq!(lines[1], "1,2.500000,1.25,1");
        assert_eq!(lines[2], "2,2.750000,1.00,0");
    }

    #[test]
    fn test_existing_file_is_appended() {
        let tmp = TempDir::new("metrics").unwrap();
        MetricsLogger::new(tmp.path()).unwrap()
            .log(&EpochMetrics::new(1, 1.0, 0.5, true)).unwrap();
        let again = MetricsLogger::new(tmp.path()).unwrap();
        let csv = fs::read_to_string(again.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }
}
