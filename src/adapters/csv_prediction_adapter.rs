//! CSV predicted-return adapter.
//!
//! Columns: `ticker,predicted_return[,as_of]`. Rows sharing an `as_of` date
//! form one prediction vector; rows with no `as_of` form the undated vector.

use crate::domain::error::PortoptError;
use crate::domain::estimator::ExpectedReturns;
use crate::domain::prediction::PredictionSet;
use crate::ports::prediction_port::PredictionPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvPredictionAdapter {
    path: PathBuf,
}

impl CsvPredictionAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

type Group = (Vec<String>, Vec<f64>);

impl PredictionPort for CsvPredictionAdapter {
    fn fetch_predictions(&self, tickers: &[String]) -> Result<PredictionSet, PortoptError> {
        let content = fs::read_to_string(&self.path).map_err(|e| PortoptError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let wanted: HashSet<String> = tickers.iter().map(|t| t.to_uppercase()).collect();
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut undated: Group = (Vec::new(), Vec::new());
        let mut dated: BTreeMap<NaiveDate, Group> = BTreeMap::new();

        for result in rdr.records() {
            let record = result.map_err(|e| PortoptError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let ticker = record
                .get(0)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| PortoptError::Data {
                    reason: "missing ticker column".into(),
                })?
                .to_uppercase();
            let value: f64 = record
                .get(1)
                .ok_or_else(|| PortoptError::Data {
                    reason: format!("missing predicted_return for {}", ticker),
                })?
                .parse()
                .map_err(|e| PortoptError::Data {
                    reason: format!("invalid predicted_return for {}: {}", ticker, e),
                })?;

            if !wanted.contains(&ticker) {
                debug!(%ticker, "ignoring prediction outside the universe");
                continue;
            }

            let group = match record.get(2).filter(|s| !s.is_empty()) {
                None => &mut undated,
                Some(s) => {
                    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                        PortoptError::Data {
                            reason: format!("invalid as_of date '{}': {}", s, e),
                        }
                    })?;
                    dated.entry(date).or_default()
                }
            };
            if group.0.contains(&ticker) {
                return Err(PortoptError::Data {
                    reason: format!("duplicate prediction for {}", ticker),
                });
            }
            group.0.push(ticker);
            group.1.push(value);
        }

        let undated = if undated.0.is_empty() {
            None
        } else {
            Some(ExpectedReturns::new(undated.0, undated.1)?)
        };
        let dated = dated
            .into_iter()
            .map(|(date, (t, v))| ExpectedReturns::new(t, v).map(|e| (date, e)))
            .collect::<Result<Vec<_>, _>>()?;

        PredictionSet::new(undated, dated)
    }
}
