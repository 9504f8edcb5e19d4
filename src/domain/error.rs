//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for portopt.
#[derive(Debug, thiserror::Error)]
pub enum PortoptError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {ticker}")]
    NoData { ticker: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("asset universe is empty")]
    EmptyUniverse,

    #[error("non-monotonic dates for {ticker}: {date} does not follow {previous}")]
    NonMonotonicDates {
        ticker: String,
        previous: NaiveDate,
        date: NaiveDate,
    },

    #[error("invalid price for {ticker} on {date}: {price}")]
    InvalidPrice {
        ticker: String,
        date: NaiveDate,
        price: f64,
    },

    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("covariance matrix unusable after regularization (ridge reached {ridge:e})")]
    SingularCovariance { ridge: f64 },

    #[error("dimension mismatch: {reason}")]
    DimensionMismatch { reason: String },

    #[error("invalid weights: {reason}")]
    InvalidWeights { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortoptError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        PortoptError::InsufficientData {
            reason: reason.into(),
        }
    }
}

impl From<&PortoptError> for std::process::ExitCode {
    fn from(err: &PortoptError) -> Self {
        let code: u8 = match err {
            PortoptError::Io(_) => 1,
            PortoptError::ConfigParse { .. }
            | PortoptError::ConfigMissing { .. }
            | PortoptError::ConfigInvalid { .. } => 2,
            PortoptError::Data { .. } | PortoptError::NoData { .. } => 3,
            PortoptError::EmptyUniverse
            | PortoptError::NonMonotonicDates { .. }
            | PortoptError::InvalidPrice { .. }
            | PortoptError::DimensionMismatch { .. }
            | PortoptError::InvalidWeights { .. } => 4,
            PortoptError::InsufficientData { .. } | PortoptError::SingularCovariance { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = PortoptError::NonMonotonicDates {
            ticker: "AAPL".into(),
            previous: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "non-monotonic dates for AAPL: 2024-01-02 does not follow 2024-01-03"
        );
    }

    #[test]
    fn insufficient_helper() {
        let err = PortoptError::insufficient("only 1 overlapping day");
        assert!(matches!(err, PortoptError::InsufficientData { ref reason } if reason == "only 1 overlapping day"));
    }

    fn exit_code(err: &PortoptError) -> String {
        format!("{:?}", std::process::ExitCode::from(err))
    }

    #[test]
    fn exit_codes_by_category() {
        use std::process::ExitCode;
        let cfg = PortoptError::ConfigMissing {
            section: "portfolio".into(),
            key: "tickers".into(),
        };
        // ExitCode has no PartialEq; compare the Debug output.
        assert_eq!(exit_code(&cfg), format!("{:?}", ExitCode::from(2)));
        assert_eq!(
            exit_code(&PortoptError::SingularCovariance { ridge: 1e-3 }),
            format!("{:?}", ExitCode::from(5))
        );
        assert_eq!(
            exit_code(&PortoptError::EmptyUniverse),
            format!("{:?}", ExitCode::from(4))
        );
    }
}
