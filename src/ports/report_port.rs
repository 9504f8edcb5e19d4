//! Report persistence port trait.

use crate::domain::error::PortoptError;
use crate::domain::strategy::{Benchmark, StrategyRun};
use std::path::Path;

/// Port for persisting strategy results.
pub trait ReportPort {
    fn write(
        &self,
        run: &StrategyRun,
        benchmark: Option<&Benchmark>,
        output_dir: &Path,
    ) -> Result<(), PortoptError>;

    /// Default implementation: writes each run against the same benchmark.
    fn write_all(
        &self,
        runs: &[StrategyRun],
        benchmark: Option<&Benchmark>,
        output_dir: &Path,
    ) -> Result<(), PortoptError> {
        for run in runs {
            self.write(run, benchmark, output_dir)?;
        }
        Ok(())
    }
}
