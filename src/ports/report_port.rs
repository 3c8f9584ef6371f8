//! Result export port.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SpxError;
use crate::domain::sweep::{SweepReport, WalkForwardWindow};

/// Port for writing run results.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), SpxError>;

    fn write_sweep(&self, report: &SweepReport, output_dir: &Path) -> Result<(), SpxError>;

    fn write_walk_forward(
        &self,
        windows: &[WalkForwardWindow],
        output_dir: &Path,
    ) -> Result<(), SpxError>;
}
