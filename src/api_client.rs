use crate::error::{FetchError, RetrievalError};
use crate::models::{ListingRecord, ScanCombination};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Search rectangle, usually the bounding box of a municipality.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub ne_lat: f64,
    pub ne_lon: f64,
    pub sw_lat: f64,
    pub sw_lon: f64,
}

/// Upstream search parameters that do not change between scans of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub zoom: u8,
    pub currency: String,
    pub language: String,
    pub price_min: u32,
    /// 0 means no upper bound.
    pub price_max: u32,
    pub amenities: Vec<u32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            zoom: 10,
            currency: "EUR".to_string(),
            language: "nl".to_string(),
            price_min: 0,
            price_max: 0,
            amenities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub municipality: String,
    pub combination: ScanCombination,
    pub viewport: Viewport,
    pub options: SearchOptions,
    pub measured_at: DateTime<Utc>,
}

/// Listings returned by one upstream request, before deduplication.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub records: Vec<ListingRecord>,
    /// Entries dropped while parsing because they lacked an id.
    pub skipped: usize,
}

/// One upstream request. Implementations hold their own HTTP session.
pub trait ListingApi: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, request: &SearchRequest) -> Result<RawBatch, FetchError>;
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (0-based): base, 2×base, 4×base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Outcome of a fan-out: every successful batch plus the failures.
#[derive(Debug, Default)]
pub struct FanOutResult {
    pub batches: Vec<RawBatch>,
    pub errors: Vec<RetrievalError>,
}

impl FanOutResult {
    pub fn all_failed(&self) -> bool {
        self.batches.is_empty() && !self.errors.is_empty()
    }

    pub fn raw_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.batches.iter().map(|b| b.skipped).sum()
    }

    pub fn into_records(self) -> Vec<ListingRecord> {
        self.batches.into_iter().flat_map(|b| b.records).collect()
    }

    pub fn into_error(mut self) -> Option<RetrievalError> {
        self.errors.pop()
    }
}

/// Retrying client around a [`ListingApi`]. Cheap to share between workers.
#[derive(Clone)]
pub struct ApiClient {
    api: Arc<dyn ListingApi>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(api: Arc<dyn ListingApi>) -> Self {
        Self::with_sleeper(api, Arc::new(ThreadSleeper), RetryPolicy::default())
    }

    pub fn with_sleeper(api: Arc<dyn ListingApi>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self { api, sleeper, policy }
    }

    pub fn source_name(&self) -> &str {
        self.api.name()
    }

    /// One request with exponential backoff between attempts.
    pub fn call(&self, request: &SearchRequest) -> Result<RawBatch, RetrievalError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.api.fetch(request) {
                Ok(batch) => {
                    debug!(
                        "{} {} {}: {} listings (attempt {})",
                        self.api.name(),
                        request.municipality,
                        request.combination,
                        batch.records.len(),
                        attempt + 1
                    );
                    return Ok(batch);
                }
                Err(err) => {
                    let attempts = attempt + 1;
                    if !err.is_retryable() || attempts >= max_attempts {
                        if err.is_rate_limit() {
                            error!("Rate limit: too many requests. Reduce workers or increase delays.");
                        } else {
                            error!("API call failed after {} attempt(s): {}", attempts, err);
                        }
                        return Err(RetrievalError { attempts, last: err });
                    }

                    let wait = self.policy.delay_after(attempt);
                    if err.is_rate_limit() {
                        warn!(
                            "Rate limit hit (attempt {}/{}). Waiting {:.1}s...",
                            attempts,
                            max_attempts,
                            wait.as_secs_f64()
                        );
                    } else {
                        warn!(
                            "API call failed (attempt {}/{}): {}. Retrying in {:.1}s...",
                            attempts,
                            max_attempts,
                            err,
                            wait.as_secs_f64()
                        );
                    }
                    self.sleeper.sleep(wait);
                    attempt += 1;
                }
            }
        }
    }

    /// `repeats` independent calls running concurrently. Member `i` starts after
    /// `i × stagger`. Failed members do not affect the others.
    pub fn parallel_call(&self, request: &SearchRequest, repeats: usize, stagger: Duration) -> FanOutResult {
        let repeats = repeats.max(1);

        let outcomes: Vec<Result<RawBatch, RetrievalError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..repeats)
                .map(|i| {
                    scope.spawn(move || {
                        if i > 0 {
                            self.sleeper.sleep(stagger.saturating_mul(i as u32));
                        }
                        self.call(request)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RetrievalError {
                        attempts: 0,
                        last: FetchError::Transport("fan-out member panicked".to_string()),
                    }),
                })
                .collect()
        });

        let mut result = FanOutResult::default();
        for outcome in outcomes {
            match outcome {
                Ok(batch) => result.batches.push(batch),
                Err(err) => result.errors.push(err),
            }
        }
        if !result.errors.is_empty() {
            warn!(
                "{} of {} repeat calls failed for {} {}",
                result.errors.len(),
                repeats,
                request.municipality,
                request.combination
            );
        }
        result
    }
}
