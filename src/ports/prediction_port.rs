//! Predicted-return source port trait.

use crate::domain::error::PortoptError;
use crate::domain::prediction::PredictionSet;

pub trait PredictionPort {
    /// Predictions restricted to `tickers`. Predictions for other tickers are
    /// dropped.
    fn fetch_predictions(&self, tickers: &[String]) -> Result<PredictionSet, PortoptError>;
}
