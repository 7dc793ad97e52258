//! Run every stage in dependency order

use tracing::info;

use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::features::{engineer_market, engineer_weather};
use crate::merge::{merge, MergeReport};
use crate::preprocess::{preprocess_market, preprocess_weather};
use crate::splitter::{split_market, split_weather};
use crate::stage::StageReport;

/// Reports from one full pipeline run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub merge: MergeReport,
}

impl RunSummary {
    pub fn files_written(&self) -> usize {
        self.stages.iter().map(|s| s.written.len()).sum::<usize>() + self.merge.stage.written.len()
    }

    pub fn units_skipped(&self) -> usize {
        self.stages.iter().map(|s| s.skipped.len()).sum::<usize>() + self.merge.stage.skipped.len()
    }
}

/// Split, preprocess, engineer and merge, strictly in sequence.
///
/// The first stage error stops the run; later stages never see a partial
/// upstream output.
pub fn run_all(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;
    info!(
        "Running pipeline for {} over seasons {:?}",
        config.crop,
        config.seasons()
    );

    let stages: [fn(&PipelineConfig) -> Result<StageReport>; 6] = [
        split_market,
        split_weather,
        preprocess_market,
        preprocess_weather,
        engineer_market,
        engineer_weather,
    ];

    let mut summary = RunSummary::default();
    for stage in stages {
        summary.stages.push(stage(config)?);
    }
    summary.merge = merge(config)?;

    info!(
        "Pipeline finished: {} file(s) written, {} unit(s) skipped",
        summary.files_written(),
        summary.units_skipped()
    );
    Ok(summary)
}
