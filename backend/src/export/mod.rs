//! Tabular export of flushed series
//!
//! Three outputs, each owned by the [`Exporter`]:
//!
//! - the homogeneous series, written once after the homogeneous solve
//! - one series per ensemble member, written after the whole ensemble when
//!   CSV export is enabled
//! - a cumulative curvature table, one row appended per member

use crate::curvature::CurvaturePerturbationResult;
use crate::engine::StorageError;
use crate::models::series::FlushSeries;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for exported tables
pub trait Exporter {
    fn export_homogeneous(&mut self, series: &FlushSeries) -> Result<(), StorageError>;

    fn export_member(&mut self, member: usize, series: &FlushSeries) -> Result<(), StorageError>;

    fn append_curvature(&mut self, result: &CurvaturePerturbationResult) -> Result<(), StorageError>;
}

/// Exporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExporter;

impl Exporter for NullExporter {
    fn export_homogeneous(&mut self, _series: &FlushSeries) -> Result<(), StorageError> {
        Ok(())
    }

    fn export_member(&mut self, _member: usize, _series: &FlushSeries) -> Result<(), StorageError> {
        Ok(())
    }

    fn append_curvature(&mut self, _result: &CurvaturePerturbationResult) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Directory name for a member's output (`sim_001`, `sim_002`, ...)
pub fn member_dir_name(member: usize) -> String {
    format!("sim_{:03}", member)
}

/// Directory name for homogeneous output
pub const HOMOGENEOUS_DIR: &str = "homog";

/// File name of each exported series
pub const SERIES_FILE: &str = "evolution.csv";

/// File name of the cumulative curvature table
pub const CURVATURE_FILE: &str = "zeta.csv";

/// Leading columns of every series; per-field `omega_i` and `field_i` follow
pub const SERIES_COLUMNS: [&str; 6] = ["step", "time", "scale_factor", "hubble", "rho", "pressure"];

/// Columns of the curvature table
pub const CURVATURE_COLUMNS: [&str; 4] = ["initial_field", "reference_hubble", "ln_a", "ratio"];

/// Comma-separated files under an output root
///
/// ```text
/// <root>/homog/evolution.csv
/// <root>/sim_001/evolution.csv
/// <root>/zeta.csv
/// ```
#[derive(Debug, Clone)]
pub struct CsvExporter {
    root: PathBuf,
}

impl CsvExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_series(&self, dir: &Path, series: &FlushSeries) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        let path = dir.join(SERIES_FILE);
        let csv_error = |e: csv::Error| StorageError::io(&path, e.into());
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;

        let num_fields = series
            .samples()
            .first()
            .map(|s| s.omegas.len())
            .unwrap_or(0);

        let mut header: Vec<String> = SERIES_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend((0..num_fields).map(|i| format!("omega_{}", i)));
        header.extend((0..num_fields).map(|i| format!("field_{}", i)));
        writer.write_record(&header).map_err(csv_error)?;

        for sample in series.samples() {
            let mut record = vec![sample.step.to_string()];
            record.extend(
                [
                    sample.time,
                    sample.scale_factor,
                    sample.hubble,
                    sample.rho,
                    sample.pressure,
                ]
                .iter()
                .chain(&sample.omegas)
                .chain(&sample.field_values)
                .map(|v| format!("{:e}", v)),
            );
            writer.write_record(&record).map_err(csv_error)?;
        }
        writer
            .flush()
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(path)
    }
}

impl Exporter for CsvExporter {
    fn export_homogeneous(&mut self, series: &FlushSeries) -> Result<(), StorageError> {
        let path = self.write_series(&self.root.join(HOMOGENEOUS_DIR), series)?;
        debug!("Wrote homogeneous series to {}", path.display());
        Ok(())
    }

    fn export_member(&mut self, member: usize, series: &FlushSeries) -> Result<(), StorageError> {
        let path = self.write_series(&self.root.join(member_dir_name(member)), series)?;
        debug!("Wrote member {} series to {}", member, path.display());
        Ok(())
    }

    fn append_curvature(&mut self, result: &CurvaturePerturbationResult) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let path = self.root.join(CURVATURE_FILE);
        let is_new = !path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;
        let csv_error = |e: csv::Error| StorageError::io(&path, e.into());
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_new {
            writer.write_record(CURVATURE_COLUMNS).map_err(csv_error)?;
        }
        writer
            .write_record(
                [
                    result.initial_field,
                    result.reference_hubble,
                    result.ln_scale_factor,
                    result.ratio,
                ]
                .iter()
                .map(|v| format!("{:e}", v)),
            )
            .map_err(csv_error)?;
        writer
            .flush()
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(())
    }
}
