//! Per-file execution inside a stage
//!
//! A stage is a set of independent units (one input file, or one season's
//! group of files). Units never read each other's data, so they may run on
//! the rayon pool. Outcomes are folded in input order: fatal errors abort
//! the stage, any other error costs only its unit.

use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::errors::Result;

/// What happened to a single unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Files written for this unit
    Written(Vec<PathBuf>),
    /// Nothing to write, with the reason
    Skipped(String),
}

/// Files written and units skipped by one stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub stage: String,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

impl StageReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..Self::default()
        }
    }
}

/// Run `work` over every `(label, unit)` and collect a report.
pub fn run_units<T, F>(stage: &str, parallel: bool, units: Vec<(String, T)>, work: F) -> Result<StageReport>
where
    T: Send + Sync,
    F: Fn(&str, &T) -> Result<UnitOutcome> + Send + Sync,
{
    info!("[{}] processing {} unit(s)", stage, units.len());

    let outcomes: Vec<Result<UnitOutcome>> = if parallel {
        units.par_iter().map(|(label, unit)| work(label, unit)).collect()
    } else {
        units.iter().map(|(label, unit)| work(label, unit)).collect()
    };

    let mut report = StageReport::new(stage);
    for ((label, _), outcome) in units.iter().zip(outcomes) {
        match outcome {
            Ok(UnitOutcome::Written(paths)) => {
                for path in &paths {
                    info!("[{}] {} -> {}", stage, label, path.display());
                }
                report.written.extend(paths);
            }
            Ok(UnitOutcome::Skipped(reason)) => {
                warn!("[{}] {} skipped: {}", stage, label, reason);
                report.skipped.push(label.clone());
            }
            Err(e) if e.is_fatal_for_run() => {
                error!("[{}] {} aborted the stage: {}", stage, label, e);
                return Err(e);
            }
            Err(e) => {
                error!("[{}] {} failed: {}", stage, label, e);
                report.skipped.push(label.clone());
            }
        }
    }

    info!(
        "[{}] done: {} file(s) written, {} unit(s) skipped",
        stage,
        report.written.len(),
        report.skipped.len()
    );
    Ok(report)
}
