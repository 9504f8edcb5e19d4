//! Configuration validation.
//!
//! Validates all config fields before any pipeline runs.

use crate::domain::allocator::AllocationPolicy;
use crate::domain::error::PortoptError;
use crate::domain::rebalance::RebalanceFreq;
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    validate_data_dir(config)?;
    validate_tickers(config)?;
    validate_benchmark(config)?;
    validate_risk_free_rate(config)?;
    validate_optimizer(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    validate_portfolio_config(config)?;
    validate_dates(config)?;
    validate_rebalance(config)?;
    validate_lookback(config)?;
    Ok(())
}

pub fn validate_prediction_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    match config.get_string("predictions", "path") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(PortoptError::ConfigMissing {
                section: "predictions".to_string(),
                key: "path".to_string(),
            })
        }
    }
    parse_policy(config)?;
    Ok(())
}

/// `[predictions] policy`, defaulting to the optimizer.
pub fn parse_policy(config: &dyn ConfigPort) -> Result<AllocationPolicy, PortoptError> {
    match config.get_string("predictions", "policy") {
        None => Ok(AllocationPolicy::default()),
        Some(s) => s.parse().map_err(|reason| PortoptError::ConfigInvalid {
            section: "predictions".to_string(),
            key: "policy".to_string(),
            reason,
        }),
    }
}

/// `[backtest] rebalance`, defaulting to buy-and-hold.
pub fn parse_rebalance(config: &dyn ConfigPort) -> Result<RebalanceFreq, PortoptError> {
    match config.get_string("backtest", "rebalance") {
        None => Ok(RebalanceFreq::default()),
        Some(s) => s.parse().map_err(|reason| PortoptError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "rebalance".to_string(),
            reason,
        }),
    }
}

/// Optional `YYYY-MM-DD` value.
pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, PortoptError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| PortoptError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", key),
            }),
    }
}

fn validate_data_dir(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    match config.get_string("data", "dir") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(PortoptError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        }),
    }
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let Some(list) = config.get_string("portfolio", "tickers") else {
        return Err(PortoptError::ConfigMissing {
            section: "portfolio".to_string(),
            key: "tickers".to_string(),
        });
    };
    let tickers = parse_tickers(&list)?;
    if tickers.len() < 2 {
        return Err(PortoptError::ConfigInvalid {
            section: "portfolio".to_string(),
            key: "tickers".to_string(),
            reason: "at least 2 tickers are required".to_string(),
        });
    }
    Ok(())
}

fn validate_benchmark(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    match config.get_string("portfolio", "benchmark") {
        Some(s) if s.trim().is_empty() => Err(PortoptError::ConfigInvalid {
            section: "portfolio".to_string(),
            key: "benchmark".to_string(),
            reason: "benchmark must not be empty when set".to_string(),
        }),
        _ => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let value = config.get_double("portfolio", "risk_free_rate", 0.02);
    if !(0.0..1.0).contains(&value) {
        return Err(PortoptError::ConfigInvalid {
            section: "portfolio".to_string(),
            key: "risk_free_rate".to_string(),
            reason: "risk_free_rate must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

fn validate_optimizer(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    if config.get_int("optimizer", "max_iterations", 1000) < 1 {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "max_iterations".to_string(),
            reason: "max_iterations must be at least 1".to_string(),
        });
    }
    let tolerance = config.get_double("optimizer", "tolerance", 1e-10);
    if !(tolerance > 0.0 && tolerance < 1.0) {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "tolerance".to_string(),
            reason: "tolerance must be between 0 and 1".to_string(),
        });
    }
    let ridge = config.get_double("optimizer", "ridge", 1e-10);
    if !(ridge > 0.0 && ridge.is_finite()) {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "ridge".to_string(),
            reason: "ridge must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let start = parse_date(config, "backtest", "start_date")?;
    let end = parse_date(config, "backtest", "end_date")?;

    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(PortoptError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "start_date".to_string(),
                reason: "start_date must be before end_date".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_rebalance(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    parse_rebalance(config).map(|_| ())
}

fn validate_lookback(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    if config.get_int("backtest", "lookback_days", 252) < 2 {
        return Err(PortoptError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "lookback_days".to_string(),
            reason: "lookback_days must be at least 2".to_string(),
        });
    }
    Ok(())
}
