//! Predicted returns supplied by an external model.

use chrono::NaiveDate;

use super::error::PortoptError;
use super::estimator::ExpectedReturns;

/// Undated predictions apply at any date; dated ones apply from their
/// `as_of` date onward.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionSet {
    undated: Option<ExpectedReturns>,
    dated: Vec<(NaiveDate, ExpectedReturns)>,
}

impl PredictionSet {
    pub fn new(
        undated: Option<ExpectedReturns>,
        mut dated: Vec<(NaiveDate, ExpectedReturns)>,
    ) -> Result<Self, PortoptError> {
        if undated.is_none() && dated.is_empty() {
            return Err(PortoptError::Data {
                reason: "prediction set is empty".into(),
            });
        }
        dated.sort_by_key(|(date, _)| *date);
        for pair in dated.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(PortoptError::Data {
                    reason: format!("two prediction vectors dated {}", pair[0].0),
                });
            }
        }
        Ok(Self { undated, dated })
    }

    pub fn undated(predictions: ExpectedReturns) -> Self {
        Self {
            undated: Some(predictions),
            dated: Vec::new(),
        }
    }

    pub fn is_dated(&self) -> bool {
        !self.dated.is_empty()
    }

    pub fn dated(&self) -> &[(NaiveDate, ExpectedReturns)] {
        &self.dated
    }

    pub fn as_of_dates(&self) -> Vec<NaiveDate> {
        self.dated.iter().map(|(d, _)| *d).collect()
    }

    /// The newest vector usable at `date`: the latest dated one on or
    /// before it, else the undated one.
    pub fn latest_through(&self, date: NaiveDate) -> Option<&ExpectedReturns> {
        let idx = self.dated.partition_point(|(d, _)| *d <= date);
        match idx.checked_sub(1) {
            Some(i) => Some(&self.dated[i].1),
            None => self.undated.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn preds(v: f64) -> ExpectedReturns {
        ExpectedReturns::new(vec!["A".into()], vec![v]).unwrap()
    }

    #[test]
    fn latest_through_prefers_dated() {
        let set = PredictionSet::new(Some(preds(0.0)), vec![(d(10), preds(0.2)), (d(5), preds(0.1))])
            .unwrap();
        assert_eq!(set.as_of_dates(), vec![d(5), d(10)]);
        assert_eq!(set.latest_through(d(1)).unwrap().values(), &[0.0]);
        assert_eq!(set.latest_through(d(5)).unwrap().values(), &[0.1]);
        assert_eq!(set.latest_through(d(9)).unwrap().values(), &[0.1]);
        assert_eq!(set.latest_through(d(30)).unwrap().values(), &[0.2]);
    }

    #[test]
    fn dated_only_has_nothing_before_first() {
        let set = PredictionSet::new(None, vec![(d(5), preds(0.1))]).unwrap();
        assert!(set.is_dated());
        assert!(set.latest_through(d(4)).is_none());
    }

    #[test]
    fn rejects_empty_and_duplicate_dates() {
        assert!(PredictionSet::new(None, vec![]).is_err());
        assert!(PredictionSet::new(None, vec![(d(5), preds(0.1)), (d(5), preds(0.2))]).is_err());
    }
}
