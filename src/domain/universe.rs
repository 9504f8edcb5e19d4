//! Asset universe parsing and validation.
//!
//! Parses ticker lists from configuration and checks that each ticker has
//! enough price history to estimate returns.

use crate::domain::error::PortoptError;
use crate::domain::price::PriceSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::warn;

/// Three prices give two returns, the least a sample covariance needs.
pub const MIN_PRICE_POINTS: usize = 3;
pub const MIN_ASSETS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub tickers: Vec<String>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.tickers.len()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("invalid ticker: {0}")]
    InvalidTicker(String),
}

impl From<UniverseError> for PortoptError {
    fn from(err: UniverseError) -> Self {
        PortoptError::ConfigInvalid {
            section: "portfolio".into(),
            key: "tickers".into(),
            reason: err.to_string(),
        }
    }
}

/// Splits a comma-separated list into upper-cased tickers.
///
/// Index symbols such as `^GSPC` and class suffixes such as `BRK-B` or
/// `PETR4.SA` are accepted.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '^' | '.' | '-' | '='))
        {
            return Err(UniverseError::InvalidTicker(ticker));
        }
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

pub struct UniverseValidationResult {
    pub universe: Universe,
    pub series: Vec<PriceSeries>,
    pub skipped: Vec<SkippedTicker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientPrices { points: usize },
}

/// Loads every ticker, dropping those without usable history. Fails when
/// fewer than [`MIN_ASSETS`] remain.
pub fn validate_universe(
    data_port: &dyn DataPort,
    tickers: Vec<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<UniverseValidationResult, PortoptError> {
    let requested = tickers.len();
    let mut valid = Vec::new();
    let mut series = Vec::new();
    let mut skipped = Vec::new();

    for ticker in tickers {
        // Only absent data is skippable; malformed files abort the run.
        let prices = match data_port.fetch_prices(&ticker, start_date, end_date) {
            Ok(prices) => prices,
            Err(PortoptError::NoData { .. }) => {
                warn!(%ticker, "skipping ticker with no data");
                skipped.push(SkippedTicker {
                    ticker,
                    reason: SkipReason::NoData,
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        if prices.is_empty() {
            warn!(%ticker, "skipping ticker with no prices");
            skipped.push(SkippedTicker {
                ticker,
                reason: SkipReason::NoData,
            });
            continue;
        }

        if prices.len() < MIN_PRICE_POINTS {
            warn!(
                %ticker,
                points = prices.len(),
                minimum = MIN_PRICE_POINTS,
                "skipping ticker with too little history"
            );
            skipped.push(SkippedTicker {
                ticker,
                reason: SkipReason::InsufficientPrices {
                    points: prices.len(),
                },
            });
            continue;
        }

        eprintln!("  {}: {} prices [OK]", ticker, prices.len());
        valid.push(ticker);
        series.push(prices);
    }

    if valid.len() < MIN_ASSETS {
        return Err(PortoptError::insufficient(format!(
            "{} of {} tickers have usable history, need at least {}",
            valid.len(),
            requested,
            MIN_ASSETS
        )));
    }

    if !skipped.is_empty() {
        eprintln!("Using {} of {} tickers", valid.len(), requested);
    }

    Ok(UniverseValidationResult {
        universe: Universe { tickers: valid },
        series,
        skipped,
    })
}
