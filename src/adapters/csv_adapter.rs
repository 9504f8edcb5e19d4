//! CSV file price data adapter.
//!
//! One file per ticker, `<dir>/<TICKER>.csv`, with a header row holding a
//! `date` column and an `adj_close` or `close` column. Other columns are
//! ignored. Rows whose price cell is empty or `null` are skipped.

use crate::domain::error::PortoptError;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const DATE_COLUMN: &str = "date";
const PRICE_COLUMNS: [&str; 3] = ["adj_close", "adj close", "close"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    /// Every row of the ticker's file, unfiltered.
    fn read_points(&self, ticker: &str) -> Result<Vec<PricePoint>, PortoptError> {
        let path = self.csv_path(ticker);
        if !path.exists() {
            return Err(PortoptError::NoData {
                ticker: ticker.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| PortoptError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| PortoptError::Data {
                reason: format!("CSV header error in {}: {}", path.display(), e),
            })?
            .clone();

        let column = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let date_idx = column(&[DATE_COLUMN]).ok_or_else(|| PortoptError::Data {
            reason: format!("{} has no date column", path.display()),
        })?;
        let price_idx = PRICE_COLUMNS
            .iter()
            .find_map(|name| column(&[*name]))
            .ok_or_else(|| PortoptError::Data {
                reason: format!("{} has no adj_close or close column", path.display()),
            })?;

        let mut points = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| PortoptError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = record.get(date_idx).ok_or_else(|| PortoptError::Data {
                reason: "missing date column".into(),
            })?;
            // Timestamps such as "2024-01-15 00:00:00" keep only the date part.
            let date_part = date_str.trim().split(&[' ', 'T'][..]).next().unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
                PortoptError::Data {
                    reason: format!("invalid date '{}': {}", date_str, e),
                }
            })?;

            let cell = record.get(price_idx).unwrap_or_default().trim();
            if cell.is_empty() || cell.eq_ignore_ascii_case("null") {
                debug!(%ticker, %date, "skipping row without a price");
                continue;
            }
            let close: f64 = cell.parse().map_err(|e| PortoptError::Data {
                reason: format!("invalid price '{}' on {}: {}", cell, date, e),
            })?;

            points.push(PricePoint::new(date, close));
        }

        Ok(points)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, PortoptError> {
        let points = self
            .read_points(ticker)?
            .into_iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .collect();
        PriceSeries::new(ticker, points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortoptError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PortoptError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| PortoptError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(ticker) = name_str.strip_suffix(".csv") {
                symbols.push(ticker.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortoptError> {
        let points = match self.read_points(ticker) {
            Ok(points) => points,
            Err(PortoptError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let series = PriceSeries::new(ticker, points)?;
        Ok(match (series.first_date(), series.last_date()) {
            (Some(first), Some(last)) => Some((first, last, series.len())),
            _ => None,
        })
    }
}
