//! Observation horizon: ordered periods of business days.

use crate::{
    config::HorizonConfig,
    error::{LabError, LabResult},
    types::PeriodIndex,
};
use chrono::{Datelike, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Period {
    pub index: PeriodIndex,
    pub label: String,
    pub days: Vec<NaiveDate>,
}

/// The time labels every entity is observed on, grouped into periods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Horizon {
    periods: Vec<Period>,
}

impl Horizon {
    /// Caller-supplied periods. Indices are reassigned by position.
    pub fn from_periods(periods: Vec<(String, Vec<NaiveDate>)>) -> LabResult<Self> {
        if periods.is_empty() || periods.iter().any(|(_, days)| days.is_empty()) {
            return Err(LabError::InvalidParameter {
                name: "horizon",
                reason: "every period needs at least one time step".into(),
            });
        }
        let periods = periods
            .into_iter()
            .enumerate()
            .map(|(index, (label, days))| Period { index, label, days })
            .collect();
        Ok(Self { periods })
    }

    /// The configured window if one is set, otherwise the monthly periods.
    pub fn from_config(config: &HorizonConfig) -> LabResult<Self> {
        match &config.business_days {
            Some(window) => Self::business_days(window.start, window.days),
            None => Self::monthly(config),
        }
    }

    /// Business days (Mon–Fri) of consecutive calendar months.
    pub fn monthly(config: &HorizonConfig) -> LabResult<Self> {
        let first = NaiveDate::from_ymd_opt(config.year, config.start_month, 1).ok_or_else(|| {
            LabError::InvalidParameter {
                name: "horizon",
                reason: format!("{}-{} is not a valid month", config.year, config.start_month),
            }
        })?;

        let mut periods = Vec::with_capacity(config.months as usize);
        for offset in 0..config.months {
            let start = first + Months::new(offset);
            let end = start + Months::new(1);
            let days = start
                .iter_days()
                .take_while(|d| *d < end)
                .filter(|d| is_business_day(*d))
                .collect();
            periods.push((start.format("%B").to_string(), days));
        }
        Self::from_periods(periods)
    }

    /// A single period of `count` business days starting at `start`
    /// (or the next business day after it).
    pub fn business_days(start: NaiveDate, count: usize) -> LabResult<Self> {
        let days: Vec<NaiveDate> = start
            .iter_days()
            .filter(|d| is_business_day(*d))
            .take(count)
            .collect();
        let label = start.format("%B").to_string();
        Self::from_periods(vec![(label, days)])
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn len_days(&self) -> usize {
        self.periods.iter().map(|p| p.days.len()).sum()
    }
}

pub fn is_business_day(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}
