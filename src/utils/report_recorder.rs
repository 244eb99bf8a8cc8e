use super::formatters::{render, ReportFormat};
use crate::tester::RunReport;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "testLog";

/// Past this many same-second collisions something else is wrong.
const MAX_NAME_SUFFIX: u32 = 1000;

/// Writes run reports into the output directory, one new file per run.
pub struct ReportRecorder {
    output_dir: PathBuf,
}

impl ReportRecorder {
    /// Creates the recorder, creating the output directory if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        if !output_dir.exists() {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create directory: {:?}", output_dir))?;
        }
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `test_results_<YYYYMMDD_HHMMSS>.<ext>`, plus `_N` when `suffix` > 0.
    pub fn file_name(timestamp: &DateTime<Local>, format: ReportFormat, suffix: u32) -> String {
        let stamp = timestamp.format("%Y%m%d_%H%M%S");
        if suffix == 0 {
            format!("test_results_{}.{}", stamp, format.extension())
        } else {
            format!("test_results_{}_{}.{}", stamp, suffix, format.extension())
        }
    }

    /// Opens the first free name for `timestamp`. Existing files are never truncated.
    fn create_unique(
        &self,
        timestamp: &DateTime<Local>,
        format: ReportFormat,
    ) -> Result<(PathBuf, File)> {
        for suffix in 0..MAX_NAME_SUFFIX {
            let path = self
                .output_dir
                .join(Self::file_name(timestamp, format, suffix));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to open report file for writing: {:?}", path)
                    })
                }
            }
        }
        anyhow::bail!(
            "Could not find a free report file name in {:?}",
            self.output_dir
        )
    }

    /// Renders and writes the report, returning the path written.
    pub fn record(&self, report: &RunReport, format: ReportFormat) -> Result<PathBuf> {
        let content = render(report, format)?;
        let (path, file) = self.create_unique(&report.started_at, format)?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write report: {:?}", path))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush report writer: {:?}", path))?;

        tracing::info!("Test results saved to: {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::results::fixtures::sample_report;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_file_name_is_timestamp_qualified() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            ReportRecorder::file_name(&ts, ReportFormat::Html, 0),
            "test_results_20240309_070501.html"
        );
        assert_eq!(
            ReportRecorder::file_name(&ts, ReportFormat::Xml, 2),
            "test_results_20240309_070501_2.xml"
        );
    }

    #[test]
    fn test_recorder_creates_nested_output_dir() -> Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("logs").join("runs");
        assert!(!nested.exists());

        let recorder = ReportRecorder::new(&nested)?;
        assert!(nested.exists());
        assert_eq!(recorder.output_dir(), nested);
        Ok(())
    }

    #[test]
    fn test_repeated_runs_do_not_collide() -> Result<()> {
        let dir = tempdir()?;
        let recorder = ReportRecorder::new(dir.path())?;
        let report = sample_report();

        let first = recorder.record(&report, ReportFormat::Json)?;
        let second = recorder.record(&report, ReportFormat::Json)?;
        let third = recorder.record(&report, ReportFormat::Json)?;

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(second.to_string_lossy().ends_with("_1.json"));
        assert!(third.to_string_lossy().ends_with("_2.json"));

        let first_content = std::fs::read_to_string(&first)?;
        assert_eq!(first_content, std::fs::read_to_string(&second)?);
        let parsed: serde_json::Value = serde_json::from_str(&first_content)?;
        assert_eq!(parsed["prompts"][0]["prompt_name"], "translate");
        Ok(())
    }
}
