//! CSV writers for calibration results
//!
//! Three tables are written into the output folder: `posterior.csv` with every
//! retained draw, `convergence.csv` with per-parameter diagnostics, and
//! `predictions.csv` with the predictive trajectory ensemble.

use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::error::{Error, Result};
use crate::routines::diagnostics::ConvergenceReport;
use crate::routines::prediction::PredictiveDraw;
use crate::routines::settings::Settings;
use crate::structs::posterior::Posterior;

/// Snapshot the run configuration next to the result tables
pub fn write_settings(settings: &Settings, folder: &str) -> Result<PathBuf> {
    let outputfile = OutputFile::new(folder, "settings.json")?;
    serde_json::to_writer_pretty(outputfile.file(), settings)
        .map_err(|e| Error::Parse(format!("cannot serialize settings: {}", e)))?;
    Ok(outputfile.relative_path().to_path_buf())
}

/// Write the full posterior table, one row per retained draw
///
/// Columns are `chain`, `draw`, `logp`, then one column per parameter in
/// declared order.
pub fn write_posterior(posterior: &Posterior, folder: &str) -> Result<PathBuf> {
    let outputfile = OutputFile::new(folder, "posterior.csv")?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(outputfile.file());

    let mut header = vec!["chain".to_string(), "draw".to_string(), "logp".to_string()];
    header.extend(posterior.names().iter().cloned());
    writer.write_record(&header)?;

    for chain in 0..posterior.nchains() {
        let samples = posterior.chain(chain);
        let logp = posterior.logp(chain);
        for draw in 0..posterior.ndraws() {
            let mut record = vec![
                chain.to_string(),
                draw.to_string(),
                logp[draw].to_string(),
            ];
            record.extend(samples.row(draw).iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    tracing::info!("Posterior written to {:?}", outputfile.relative_path());
    Ok(outputfile.relative_path().to_path_buf())
}

/// Write per-parameter convergence diagnostics
pub fn write_convergence(report: &ConvergenceReport, folder: &str) -> Result<PathBuf> {
    let outputfile = OutputFile::new(folder, "convergence.csv")?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(outputfile.file());

    writer.write_record(["parameter", "rhat", "ess", "converged"])?;
    for p in &report.parameters {
        writer.write_record([
            p.name.clone(),
            p.rhat.to_string(),
            p.ess.to_string(),
            p.converged.to_string(),
        ])?;
    }
    writer.flush()?;
    tracing::info!("Diagnostics written to {:?}", outputfile.relative_path());
    Ok(outputfile.relative_path().to_path_buf())
}

/// Write a predictive ensemble, one row per draw, replicate and time point
///
/// Columns are `draw`, `replicate`, `time`, then one column per state
/// variable named `x0`, `x1`, ...
pub fn write_predictions(draws: &[PredictiveDraw], folder: &str) -> Result<PathBuf> {
    let outputfile = OutputFile::new(folder, "predictions.csv")?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(outputfile.file());

    let ndim = draws
        .first()
        .and_then(|d| d.trajectories.first())
        .map(|t| t.states.ncols())
        .unwrap_or(0);
    let mut header = vec!["draw".to_string(), "replicate".to_string(), "time".to_string()];
    header.extend((0..ndim).map(|j| format!("x{}", j)));
    writer.write_record(&header)?;

    for draw in draws {
        for trajectory in &draw.trajectories {
            for (i, time) in trajectory.times.iter().enumerate() {
                let mut record = vec![
                    draw.index.to_string(),
                    trajectory.replicate.clone(),
                    time.to_string(),
                ];
                record.extend(trajectory.states.row(i).iter().map(|v| v.to_string()));
                writer.write_record(&record)?;
            }
        }
    }
    writer.flush()?;
    tracing::info!("Predictions written to {:?}", outputfile.relative_path());
    Ok(outputfile.relative_path().to_path_buf())
}

/// Contains all the necessary information of an output file
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);

        if let Some(parent) = relative_path.parent() {
            create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_owned(self) -> File {
        self.file
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}
