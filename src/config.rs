use crate::airbnb::AirbnbSettings;
use crate::api_client::{RetryPolicy, SearchOptions};
use crate::error::ConfigError;
use crate::funda::FundaSettings;
use crate::orchestrator::OrchestratorOptions;
use crate::params::{DateSelection, ScanPlanRequest};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Settings of one scrape run. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub municipalities: Vec<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub dates: DateSelection,
    pub nights: Vec<u32>,
    pub guests: Vec<u32>,
    pub clip_to_period: bool,

    pub repeat_calls: usize,
    pub workers: usize,
    /// Seconds between dispatching two scans.
    pub delay_between_scans: f64,
    /// Seconds between the starts of the repeat calls of one scan.
    pub delay_between_calls: f64,
    pub retry_attempts: u32,
    /// Base of the exponential backoff, in seconds.
    pub retry_delay: f64,
    pub checkpoint_every: usize,
    pub max_tasks: Option<usize>,

    pub zoom: u8,
    pub currency: String,
    pub language: String,
    pub price_min: u32,
    pub price_max: u32,
    pub amenities: Vec<u32>,

    pub boundary_file: PathBuf,
    pub boundary_name_property: String,
    pub output_dir: PathBuf,

    pub airbnb: AirbnbSettings,
    pub funda: FundaSettings,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            municipalities: vec!["Schagen".to_string()],
            period_start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap_or(NaiveDate::MIN),
            period_end: NaiveDate::from_ymd_opt(2025, 12, 5).unwrap_or(NaiveDate::MIN),
            dates: DateSelection::default(),
            nights: vec![1, 3, 7],
            guests: vec![1, 3, 6],
            clip_to_period: false,
            repeat_calls: 3,
            workers: 2,
            delay_between_scans: 1.0,
            delay_between_calls: 0.5,
            retry_attempts: 3,
            retry_delay: 1.0,
            checkpoint_every: 10,
            max_tasks: None,
            zoom: 10,
            currency: "EUR".to_string(),
            language: "nl".to_string(),
            price_min: 0,
            price_max: 0,
            amenities: Vec::new(),
            boundary_file: PathBuf::from("assets/gemeenten.geojson"),
            boundary_name_property: "naam".to_string(),
            output_dir: PathBuf::from("outputs"),
            airbnb: AirbnbSettings::default(),
            funda: FundaSettings::default(),
        }
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidValue {
        field,
        reason: format!("{} is not a valid number of seconds", value),
    })
}

impl ScrapeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.municipalities.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::NoMunicipalities);
        }
        self.plan_request().validate()?;

        let positive = [
            ("repeat_calls", self.repeat_calls),
            ("workers", self.workers),
            ("checkpoint_every", self.checkpoint_every),
            ("retry_attempts", self.retry_attempts as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        seconds("delay_between_scans", self.delay_between_scans)?;
        seconds("delay_between_calls", self.delay_between_calls)?;
        seconds("retry_delay", self.retry_delay)?;

        if self.price_max > 0 && self.price_max < self.price_min {
            return Err(ConfigError::InvalidValue {
                field: "price_max",
                reason: format!("{} is below price_min {}", self.price_max, self.price_min),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "currency",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn plan_request(&self) -> ScanPlanRequest {
        ScanPlanRequest {
            period_start: self.period_start,
            period_end: self.period_end,
            dates: self.dates.clone(),
            nights: self.nights.clone(),
            guests: self.guests.clone(),
            clip_to_period: self.clip_to_period,
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            zoom: self.zoom,
            currency: self.currency.clone(),
            language: self.language.clone(),
            price_min: self.price_min,
            price_max: self.price_max,
            amenities: self.amenities.clone(),
        }
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: seconds("retry_delay", self.retry_delay)?,
        })
    }

    pub fn orchestrator_options(&self) -> Result<OrchestratorOptions, ConfigError> {
        Ok(OrchestratorOptions {
            workers: self.workers,
            repeats: self.repeat_calls,
            delay_between_scans: seconds("delay_between_scans", self.delay_between_scans)?,
            delay_between_calls: seconds("delay_between_calls", self.delay_between_calls)?,
            checkpoint_every: self.checkpoint_every,
            max_tasks: self.max_tasks,
            measured_at: None,
            search: self.search_options(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::generate_scan_combinations;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_plan_forty_five_scans() {
        let config = ScrapeConfig::default();
        config.validate().unwrap();
        assert_eq!(generate_scan_combinations(&config.plan_request()).unwrap().len(), 45);
        let options = config.orchestrator_options().unwrap();
        assert_eq!(options.delay_between_calls, Duration::from_millis(500));
        assert_eq!(options.search.zoom, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"municipalities": ["Texel"], "nights": [2], "dates": {"mode": "interval", "days": 7}}"#,
        )
        .unwrap();

        let config = ScrapeConfig::load(&path).unwrap();
        assert_eq!(config.municipalities, vec!["Texel"]);
        assert_eq!(config.nights, vec![2]);
        assert_eq!(config.dates, DateSelection::Interval { days: 7 });
        assert_eq!(config.guests, vec![1, 3, 6]);
        assert_eq!(config.currency, "EUR");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = ScrapeConfig {
            workers: 0,
            ..ScrapeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "workers", .. })
        ));

        config.workers = 2;
        config.delay_between_scans = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "delay_between_scans", .. })
        ));

        config.delay_between_scans = 1.0;
        config.period_end = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDateRange { .. })));

        config.period_end = config.period_start;
        config.municipalities = vec![" ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::NoMunicipalities)));
    }

    #[test]
    fn test_unreadable_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ScrapeConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ workers: 2").unwrap();
        assert!(matches!(ScrapeConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
