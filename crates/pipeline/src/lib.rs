//! Vegcast feature pipeline
//!
//! Turns raw market transactions and weather station readings into
//! leakage-free, season-split tables for short-horizon price forecasting.
//! Stages run in order, each owning its output directory:
//!
//! 1. [`splitter`]: cut multi-year raw tables into season windows
//! 2. [`preprocess`]: collapse each season to one row per date
//! 3. [`features`]: derive lagged and rolling features
//! 4. [`merge`]: join market and weather, split seasons into train/valid/test
//!
//! [`runner::run_all`] runs the four stages end to end.

pub mod calendar;
pub mod columns;
pub mod config;
pub mod errors;
pub mod features;
pub mod io;
pub mod merge;
pub mod preprocess;
pub mod runner;
pub mod schema;
pub mod season;
pub mod series;
pub mod splitter;
pub mod stage;
pub mod table;

pub use config::PipelineConfig;
pub use errors::{PipelineError, Result};
pub use features::{engineer_market, engineer_weather};
pub use merge::{merge, MergeReport, SplitRole};
pub use preprocess::{preprocess_market, preprocess_weather};
pub use runner::{run_all, RunSummary};
pub use season::{SeasonKind, SeasonWindow};
pub use splitter::{split_market, split_weather};
pub use stage::StageReport;
pub use table::Frame;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
