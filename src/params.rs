use crate::error::ConfigError;
use crate::models::ScanCombination;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Which measurement dates inside the period get scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DateSelection {
    /// Every `days`-th day starting at the period start.
    Interval { days: u32 },
    /// Only the listed weekdays, keeping every n-th occurrence of each.
    Weekdays {
        days: Vec<Weekday>,
        #[serde(default = "one")]
        every_n_weeks: u32,
    },
    /// The first occurrence of each listed weekday per calendar month.
    MonthlyFirst { days: Vec<Weekday> },
}

fn one() -> u32 {
    1
}

impl Default for DateSelection {
    fn default() -> Self {
        DateSelection::Interval { days: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPlanRequest {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default)]
    pub dates: DateSelection,
    pub nights: Vec<u32>,
    pub guests: Vec<u32>,
    /// Drop stays whose check-out lies after the day following the period end.
    #[serde(default)]
    pub clip_to_period: bool,
}

impl ScanPlanRequest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_start > self.period_end {
            return Err(ConfigError::InvalidDateRange {
                start: self.period_start.to_string(),
                end: self.period_end.to_string(),
            });
        }
        match &self.dates {
            DateSelection::Interval { days: 0 } => return Err(ConfigError::ZeroInterval),
            DateSelection::Weekdays { every_n_weeks: 0, .. } => {
                return Err(ConfigError::ZeroInterval)
            }
            DateSelection::Weekdays { days, .. } | DateSelection::MonthlyFirst { days }
                if days.is_empty() =>
            {
                return Err(ConfigError::NoWeekdays)
            }
            _ => {}
        }
        check_variation("nights", &self.nights)?;
        check_variation("guests", &self.guests)?;
        Ok(())
    }
}

fn check_variation(name: &'static str, values: &[u32]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::EmptyVariation(name));
    }
    if values.contains(&0) {
        return Err(ConfigError::ZeroVariation(name));
    }
    Ok(())
}

/// Measurement dates of the period under the given selection, ascending.
pub fn measurement_dates(
    start: NaiveDate,
    end: NaiveDate,
    selection: &DateSelection,
) -> Vec<NaiveDate> {
    match selection {
        DateSelection::Interval { days } => {
            let step = Duration::days(i64::from((*days).max(1)));
            let mut dates = Vec::new();
            let mut current = start;
            while current <= end {
                dates.push(current);
                current += step;
            }
            dates
        }
        DateSelection::Weekdays { days, every_n_weeks } => {
            let every = (*every_n_weeks).max(1) as usize;
            let mut picked = BTreeSet::new();
            for weekday in days {
                start
                    .iter_days()
                    .take_while(|d| *d <= end)
                    .filter(|d| d.weekday() == *weekday)
                    .step_by(every)
                    .for_each(|d| {
                        picked.insert(d);
                    });
            }
            picked.into_iter().collect()
        }
        DateSelection::MonthlyFirst { days } => {
            let mut picked = BTreeSet::new();
            let mut month_start = NaiveDate::from_ymd_opt(start.year(), start.month(), 1);
            while let Some(first) = month_start {
                if first > end {
                    break;
                }
                for weekday in days {
                    let hit = first
                        .iter_days()
                        .take_while(|d| d.month() == first.month())
                        .find(|d| d.weekday() == *weekday);
                    if let Some(date) = hit.filter(|d| *d >= start && *d <= end) {
                        picked.insert(date);
                    }
                }
                month_start = first.checked_add_months(chrono::Months::new(1));
            }
            picked.into_iter().collect()
        }
    }
}

/// Every (measurement date, nights, guests) triple of the request, date-major,
/// keeping the caller's order of the variation lists.
pub fn generate_scan_combinations(
    request: &ScanPlanRequest,
) -> Result<Vec<ScanCombination>, ConfigError> {
    request.validate()?;

    let nights = dedup_preserving_order(&request.nights);
    let guests = dedup_preserving_order(&request.guests);
    let last_check_out = request.period_end + Duration::days(1);

    let mut combinations = Vec::new();
    for date in measurement_dates(request.period_start, request.period_end, &request.dates) {
        for &n in &nights {
            let stay = ScanCombination::new(date, n, 0);
            if request.clip_to_period && stay.check_out() > last_check_out {
                continue;
            }
            for &g in &guests {
                combinations.push(ScanCombination::new(date, n, g));
            }
        }
    }

    info!(
        "Generated {} scan combinations (nights: {:?}, guests: {:?})",
        combinations.len(),
        nights,
        guests
    );
    Ok(combinations)
}

fn dedup_preserving_order(values: &[u32]) -> Vec<u32> {
    let mut seen = BTreeSet::new();
    values.iter().copied().filter(|v| seen.insert(*v)).collect()
}
