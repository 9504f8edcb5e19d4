//! Price data access port trait.

use crate::domain::error::PortoptError;
use crate::domain::price::PriceSeries;
use chrono::NaiveDate;

pub trait DataPort {
    /// Adjusted closes for `ticker` between `start_date` and `end_date`
    /// inclusive, in date order.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, PortoptError>;

    fn list_symbols(&self) -> Result<Vec<String>, PortoptError>;

    /// First date, last date and number of prices, or `None` when the ticker
    /// has no data.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortoptError>;
}
