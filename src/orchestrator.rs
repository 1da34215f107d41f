use crate::api_client::{ApiClient, SearchOptions, SearchRequest, Sleeper, ThreadSleeper, Viewport};
use crate::boundary::{BoundaryIndex, MunicipalityBoundary};
use crate::checkpoint::{CheckpointStore, RunCheckpoint};
use crate::dedup::dedupe;
use crate::error::ConfigError;
use crate::models::{normalize_municipality, task_key, ListingRecord, ScanCombination, ScanTask};
use crate::progress::{ProgressReporter, ProgressUpdate, SilentReporter};
use crate::spatial::filter_within;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Stops dispatch of further tasks. Tasks already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Accumulated records of a run, one per (task, listing).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: BTreeMap<(String, String), ListingRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records; keys are derived from each record.
    pub fn from_records(records: impl IntoIterator<Item = ListingRecord>) -> Self {
        let mut dataset = Self::new();
        for record in records {
            let key = task_key(&record.municipality, &record.combination);
            dataset.records.insert((key, record.listing_id.clone()), record);
        }
        dataset
    }

    pub fn insert_task(&mut self, task_key: &str, records: Vec<ListingRecord>) {
        for record in records {
            self.records
                .insert((task_key.to_string(), record.listing_id.clone()), record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ListingRecord> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<ListingRecord> {
        self.records.into_values().collect()
    }

    pub fn unique_listings(&self) -> usize {
        self.records
            .keys()
            .map(|(_, id)| id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub planned: usize,
    /// Tasks executed in this session.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks already completed by an earlier session.
    pub skipped: usize,
    /// Tasks never dispatched (budget or cancellation).
    pub pending: usize,
    pub raw_observed: usize,
    pub unique_after_dedup: usize,
    pub retained: usize,
    pub rejected: usize,
    /// Upstream entries dropped while parsing.
    pub unparsed: usize,
    /// Records in the dataset at the end of the run, earlier sessions included.
    pub dataset_records: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub dataset: Dataset,
    pub summary: RunSummary,
    pub states: BTreeMap<String, TaskState>,
    pub measured_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub workers: usize,
    pub repeats: usize,
    pub delay_between_scans: Duration,
    pub delay_between_calls: Duration,
    pub checkpoint_every: usize,
    /// Dispatch at most this many tasks in one session.
    pub max_tasks: Option<usize>,
    /// Fixed measurement timestamp for a fresh run; defaults to now.
    pub measured_at: Option<DateTime<Utc>>,
    pub search: SearchOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            repeats: 3,
            delay_between_scans: Duration::from_secs(1),
            delay_between_calls: Duration::from_millis(500),
            checkpoint_every: 10,
            max_tasks: None,
            measured_at: None,
            search: SearchOptions::default(),
        }
    }
}

/// A planned task with its boundary resolved.
struct PreparedTask<'b> {
    key: String,
    task: ScanTask,
    boundary: &'b MunicipalityBoundary,
    viewport: Viewport,
}

struct TaskYield {
    raw: usize,
    unparsed: usize,
    unique: usize,
    rejected: usize,
    retained: Vec<ListingRecord>,
}

enum WorkerEvent {
    Started(String),
    Finished {
        key: String,
        task: ScanTask,
        result: Result<TaskYield, String>,
    },
}

/// Runs scan tasks on a worker pool. The calling thread is the only writer of
/// the dataset and the checkpoint file.
pub struct ScanOrchestrator {
    client: ApiClient,
    sleeper: Arc<dyn Sleeper>,
    options: OrchestratorOptions,
    store: Option<CheckpointStore>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
}

impl ScanOrchestrator {
    pub fn new(client: ApiClient, options: OrchestratorOptions) -> Self {
        Self {
            client,
            sleeper: Arc::new(ThreadSleeper),
            options,
            store: None,
            reporter: Arc::new(SilentReporter),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Tasks in execution order: every combination of the first municipality,
    /// then the next. Repeated municipality names are planned once.
    pub fn plan(municipalities: &[String], combinations: &[ScanCombination]) -> Vec<ScanTask> {
        let mut seen = HashSet::new();
        municipalities
            .iter()
            .map(|m| m.trim())
            .filter(|m| seen.insert(normalize_municipality(m)))
            .flat_map(|m| combinations.iter().map(move |c| ScanTask::new(m, *c)))
            .collect()
    }

    pub fn run(
        &self,
        municipalities: &[String],
        combinations: &[ScanCombination],
        boundaries: &BoundaryIndex,
    ) -> Result<RunOutcome, ConfigError> {
        let started = Instant::now();

        if municipalities.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::NoMunicipalities);
        }
        if combinations.is_empty() {
            return Err(ConfigError::EmptyVariation("scan combination"));
        }

        let plan = Self::plan(municipalities, combinations);
        let mut prepared = Vec::with_capacity(plan.len());
        let mut resolved: BTreeMap<String, (&MunicipalityBoundary, Viewport)> = BTreeMap::new();
        for task in plan {
            let name = normalize_municipality(&task.municipality);
            let (boundary, viewport) = match resolved.get(&name) {
                Some(entry) => *entry,
                None => {
                    let boundary = boundaries.get(&task.municipality)?;
                    let viewport = boundary.viewport().ok_or_else(|| ConfigError::InvalidValue {
                        field: "boundary",
                        reason: format!("{} has an empty geometry", boundary.name),
                    })?;
                    resolved.insert(name, (boundary, viewport));
                    (boundary, viewport)
                }
            };
            prepared.push(PreparedTask {
                key: task.key(),
                task,
                boundary,
                viewport,
            });
        }

        let planned_keys: HashSet<String> = prepared.iter().map(|t| t.key.clone()).collect();
        let (measured_at, mut completed, mut dataset) = self.restore(&planned_keys);

        let mut states: BTreeMap<String, TaskState> = prepared
            .iter()
            .map(|t| {
                let state = if completed.contains(&t.key) {
                    TaskState::Completed
                } else {
                    TaskState::Pending
                };
                (t.key.clone(), state)
            })
            .collect();

        let total = prepared.len();
        let skipped = completed.len();
        let mut queue: Vec<PreparedTask> = prepared
            .into_iter()
            .filter(|t| !completed.contains(&t.key))
            .collect();
        if let Some(limit) = self.options.max_tasks {
            queue.truncate(limit);
        }
        let to_run = queue.len();

        info!(
            "Planned {} scans for {} municipalities, {} already completed, {} to run now",
            total,
            resolved.len(),
            skipped,
            to_run
        );
        self.reporter.on_run_start(total, skipped);

        let mut summary = RunSummary {
            planned: total,
            skipped,
            ..RunSummary::default()
        };
        let mut since_checkpoint = 0;
        let workers = self.options.workers.max(1);

        let (task_tx, task_rx) = mpsc::sync_channel::<PreparedTask>(0);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();

        thread::scope(|scope| {
            let cancel = self.cancel.clone();
            let sleeper = Arc::clone(&self.sleeper);
            let delay = self.options.delay_between_scans;
            scope.spawn(move || {
                for (i, task) in queue.into_iter().enumerate() {
                    if cancel.is_cancelled() {
                        info!("Run cancelled; no further scans are dispatched");
                        break;
                    }
                    if i > 0 {
                        sleeper.sleep(delay);
                        if cancel.is_cancelled() {
                            info!("Run cancelled; no further scans are dispatched");
                            break;
                        }
                    }
                    if task_tx.send(task).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let task_rx = Arc::clone(&task_rx);
                let event_tx = event_tx.clone();
                scope.spawn(move || loop {
                    let next = match task_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok(prepared) = next else { break };
                    if event_tx.send(WorkerEvent::Started(prepared.key.clone())).is_err() {
                        break;
                    }
                    let result = self.execute(&prepared, measured_at);
                    let finished = WorkerEvent::Finished {
                        key: prepared.key,
                        task: prepared.task,
                        result,
                    };
                    if event_tx.send(finished).is_err() {
                        break;
                    }
                });
            }
            // workers hold the only receivers now, so the dispatcher stops if they all exit
            drop(task_rx);
            drop(event_tx);

            for event in event_rx {
                let (key, task, result) = match event {
                    WorkerEvent::Started(key) => {
                        states.insert(key, TaskState::InProgress);
                        continue;
                    }
                    WorkerEvent::Finished { key, task, result } => (key, task, result),
                };

                summary.attempted += 1;
                match result {
                    Ok(done) => {
                        summary.succeeded += 1;
                        summary.raw_observed += done.raw;
                        summary.unparsed += done.unparsed;
                        summary.unique_after_dedup += done.unique;
                        summary.rejected += done.rejected;
                        summary.retained += done.retained.len();
                        debug!(
                            "{} {}: {} raw, {} unique, {} retained",
                            task.municipality,
                            task.combination,
                            done.raw,
                            done.unique,
                            done.retained.len()
                        );
                        dataset.insert_task(&key, done.retained);
                        completed.insert(key.clone());
                        states.insert(key, TaskState::Completed);

                        since_checkpoint += 1;
                        if since_checkpoint >= self.options.checkpoint_every.max(1) {
                            self.save_checkpoint(measured_at, &completed, &dataset);
                            since_checkpoint = 0;
                        }
                    }
                    Err(reason) => {
                        summary.failed += 1;
                        error!(
                            "Scan {} {} failed: {}",
                            task.municipality, task.combination, reason
                        );
                        states.insert(key, TaskState::Failed);
                        self.reporter
                            .on_task_failed(&task.municipality, &task.combination, &reason);
                    }
                }

                let elapsed = started.elapsed();
                let remaining = to_run.saturating_sub(summary.attempted);
                let eta = (summary.attempted > 0)
                    .then(|| elapsed.div_f64(summary.attempted as f64).mul_f64(remaining as f64));
                self.reporter.on_task_complete(&ProgressUpdate {
                    completed: skipped + summary.attempted,
                    total,
                    municipality: task.municipality,
                    combination: task.combination,
                    elapsed,
                    eta,
                });
            }
        });

        self.save_checkpoint(measured_at, &completed, &dataset);

        summary.pending = states.values().filter(|s| **s == TaskState::Pending).count();
        summary.dataset_records = dataset.len();
        summary.elapsed = started.elapsed();
        info!(
            "Run finished: {} attempted, {} succeeded, {} failed, {} raw, {} unique, {} retained",
            summary.attempted,
            summary.succeeded,
            summary.failed,
            summary.raw_observed,
            summary.unique_after_dedup,
            summary.retained
        );
        self.reporter.on_run_complete(&summary);

        Ok(RunOutcome {
            dataset,
            summary,
            states,
            measured_at,
        })
    }

    /// Fan out, deduplicate and filter one task.
    fn execute(&self, prepared: &PreparedTask<'_>, measured_at: DateTime<Utc>) -> Result<TaskYield, String> {
        let request = SearchRequest {
            municipality: prepared.task.municipality.clone(),
            combination: prepared.task.combination,
            viewport: prepared.viewport,
            options: self.options.search.clone(),
            measured_at,
        };
        let fan_out = self.client.parallel_call(
            &request,
            self.options.repeats,
            self.options.delay_between_calls,
        );
        if fan_out.all_failed() {
            return Err(fan_out
                .into_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no result".to_string()));
        }

        let raw = fan_out.raw_count();
        let unparsed = fan_out.skipped();
        let unique = dedupe(fan_out.into_records());
        let unique_count = unique.len();
        let outcome = filter_within(unique, prepared.boundary);

        Ok(TaskYield {
            raw,
            unparsed,
            unique: unique_count,
            rejected: outcome.rejected(),
            retained: outcome.retained,
        })
    }

    /// Measurement time, completed keys and records from a usable checkpoint,
    /// or a fresh start.
    fn restore(&self, planned: &HashSet<String>) -> (DateTime<Utc>, BTreeSet<String>, Dataset) {
        let fresh = || {
            (
                self.options.measured_at.unwrap_or_else(Utc::now),
                BTreeSet::new(),
                Dataset::new(),
            )
        };
        let Some(store) = &self.store else {
            return fresh();
        };

        match store.load() {
            Ok(Some(checkpoint)) => match checkpoint.check_against_plan(planned) {
                Ok(()) => {
                    info!(
                        "Resuming run measured at {} with {} completed scans",
                        checkpoint.measured_at,
                        checkpoint.completed.len()
                    );
                    (
                        checkpoint.measured_at,
                        checkpoint.completed,
                        Dataset::from_records(checkpoint.records),
                    )
                }
                Err(e) => {
                    warn!("Checkpoint does not belong to this run, starting fresh: {}", e);
                    fresh()
                }
            },
            Ok(None) => fresh(),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint: {}", e);
                fresh()
            }
        }
    }

    fn save_checkpoint(&self, measured_at: DateTime<Utc>, completed: &BTreeSet<String>, dataset: &Dataset) {
        let Some(store) = &self.store else {
            return;
        };
        let checkpoint = RunCheckpoint {
            completed: completed.clone(),
            records: dataset.records().cloned().collect(),
            last_updated: Utc::now(),
            ..RunCheckpoint::new(measured_at)
        };
        match store.save(&checkpoint) {
            Ok(()) => self.reporter.on_checkpoint(completed.len(), dataset.len()),
            Err(e) => warn!("Failed to write checkpoint, continuing in memory: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ListingApi, RawBatch, RetryPolicy};
    use crate::error::FetchError;
    use crate::models::{Coordinates, Source};
    use chrono::{NaiveDate, TimeZone};
    use geo::{polygon, MultiPolygon};
    use tempfile::tempdir;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    /// Two listings inside the square, one outside; fails for one date.
    struct FixedApi {
        failing_date: Option<NaiveDate>,
    }

    impl ListingApi for FixedApi {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch(&self, request: &SearchRequest) -> Result<RawBatch, FetchError> {
            if Some(request.combination.date) == self.failing_date {
                return Err(FetchError::from_status(400, "bad request"));
            }
            let at = |id: &str, lat: f64, lon: f64| {
                let mut r = ListingRecord::bare(
                    id,
                    Source::Airbnb,
                    request.municipality.clone(),
                    request.combination,
                    request.measured_at,
                );
                r.coordinates = Some(Coordinates::new(lat, lon));
                r
            };
            Ok(RawBatch {
                records: vec![at("1", 52.75, 4.75), at("2", 52.8125, 4.8125), at("3", 50.75, 5.75)],
                skipped: 1,
            })
        }
    }

    fn boundaries() -> BoundaryIndex {
        let mut index = BoundaryIndex::new();
        index.insert(MunicipalityBoundary::new(
            "Schagen",
            MultiPolygon::new(vec![polygon![
                (x: 4.6, y: 52.7),
                (x: 4.9, y: 52.7),
                (x: 4.9, y: 52.9),
                (x: 4.6, y: 52.9),
                (x: 4.6, y: 52.7),
            ]]),
        ));
        index
    }

    fn combinations(n: u32) -> Vec<ScanCombination> {
        let start = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        (0..n)
            .map(|i| ScanCombination::new(start + chrono::Duration::days(i64::from(i)), 1, 2))
            .collect()
    }

    fn orchestrator(api: FixedApi, options: OrchestratorOptions) -> ScanOrchestrator {
        let client = ApiClient::with_sleeper(Arc::new(api), Arc::new(NoSleep), RetryPolicy::default());
        ScanOrchestrator::new(client, options).with_sleeper(Arc::new(NoSleep))
    }

    fn options() -> OrchestratorOptions {
        OrchestratorOptions {
            measured_at: Some(Utc.with_ymd_and_hms(2025, 11, 20, 8, 0, 0).unwrap()),
            ..OrchestratorOptions::default()
        }
    }

    #[test]
    fn test_plan_is_municipality_major() {
        let plan = ScanOrchestrator::plan(
            &["Schagen".to_string(), "Texel".to_string(), "schagen ".to_string()],
            &combinations(2),
        );
        let keys: Vec<_> = plan.iter().map(|t| t.key()).collect();
        assert_eq!(
            keys,
            vec![
                "schagen|2025-12-01/1n/2g",
                "schagen|2025-12-02/1n/2g",
                "texel|2025-12-01/1n/2g",
                "texel|2025-12-02/1n/2g",
            ]
        );
    }

    #[test]
    fn test_unknown_municipality_fails_before_scanning() {
        let result = orchestrator(FixedApi { failing_date: None }, options()).run(
            &["Schagen".to_string(), "Atlantis".to_string()],
            &combinations(2),
            &boundaries(),
        );
        assert!(matches!(result, Err(ConfigError::UnknownMunicipality(name)) if name == "Atlantis"));
    }

    #[test]
    fn test_run_collects_filtered_records() {
        let outcome = orchestrator(FixedApi { failing_date: None }, options())
            .run(&["Schagen".to_string()], &combinations(3), &boundaries())
            .unwrap();

        let s = &outcome.summary;
        assert_eq!((s.attempted, s.succeeded, s.failed, s.pending), (3, 3, 0, 0));
        // three repeat calls of three listings each per task
        assert_eq!(s.raw_observed, 27);
        assert_eq!(s.unique_after_dedup, 9);
        assert_eq!(s.retained, 6);
        assert_eq!(s.rejected, 3);
        assert_eq!(s.unparsed, 9);
        assert_eq!(outcome.dataset.len(), 6);
        assert_eq!(outcome.dataset.unique_listings(), 2);
        assert!(outcome.states.values().all(|s| *s == TaskState::Completed));
    }

    #[test]
    fn test_failed_task_does_not_halt_the_run() {
        let failing = NaiveDate::from_ymd_opt(2025, 12, 2).unwrap();
        let outcome = orchestrator(FixedApi { failing_date: Some(failing) }, options())
            .run(&["Schagen".to_string()], &combinations(3), &boundaries())
            .unwrap();

        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.states["schagen|2025-12-02/1n/2g"], TaskState::Failed);
        assert!(outcome.dataset.records().all(|r| r.combination.date != failing));
    }

    #[test]
    fn test_cancelled_run_dispatches_nothing() {
        let orchestrator = orchestrator(FixedApi { failing_date: None }, options());
        orchestrator.cancel_token().cancel();
        let outcome = orchestrator
            .run(&["Schagen".to_string()], &combinations(4), &boundaries())
            .unwrap();
        assert_eq!(outcome.summary.attempted, 0);
        assert_eq!(outcome.summary.pending, 4);
        assert!(outcome.dataset.is_empty());
    }

    #[test]
    fn test_budget_leaves_remaining_tasks_pending_in_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::in_dir(dir.path());
        let outcome = orchestrator(
            FixedApi { failing_date: None },
            OrchestratorOptions {
                max_tasks: Some(2),
                ..options()
            },
        )
        .with_checkpoint(store.clone())
        .run(&["Schagen".to_string()], &combinations(5), &boundaries())
        .unwrap();

        assert_eq!(outcome.summary.attempted, 2);
        assert_eq!(outcome.summary.pending, 3);
        let checkpoint = store.load().unwrap().unwrap();
        assert_eq!(checkpoint.completed.len(), 2);
        assert_eq!(checkpoint.records.len(), 4);
        assert_eq!(checkpoint.measured_at, outcome.measured_at);
    }

    #[test]
    fn test_foreign_checkpoint_is_ignored() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::in_dir(dir.path());
        let mut foreign = RunCheckpoint::new(Utc::now());
        foreign.completed.insert("texel|2025-12-01/1n/2g".to_string());
        store.save(&foreign).unwrap();

        let outcome = orchestrator(FixedApi { failing_date: None }, options())
            .with_checkpoint(store)
            .run(&["Schagen".to_string()], &combinations(2), &boundaries())
            .unwrap();
        assert_eq!(outcome.summary.skipped, 0);
        assert_eq!(outcome.summary.attempted, 2);
    }

    #[test]
    fn test_dataset_rebuilds_keys_from_records() {
        let outcome = orchestrator(FixedApi { failing_date: None }, options())
            .run(&["Schagen".to_string()], &combinations(2), &boundaries())
            .unwrap();
        let rebuilt = Dataset::from_records(outcome.dataset.records().cloned());
        assert_eq!(rebuilt, outcome.dataset);
    }

    /// Records dispatcher pauses; optionally cancels the run on the first one.
    struct RecordingSleeper {
        pauses: Mutex<Vec<Duration>>,
        cancel_on_first: Option<CancelToken>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
            if let Some(token) = &self.cancel_on_first {
                token.cancel();
            }
        }
    }

    #[test]
    fn test_scans_are_spaced_by_the_configured_delay() {
        let sleeper = Arc::new(RecordingSleeper {
            pauses: Mutex::new(Vec::new()),
            cancel_on_first: None,
        });
        let outcome = orchestrator(
            FixedApi { failing_date: None },
            OrchestratorOptions {
                workers: 2,
                delay_between_scans: Duration::from_millis(250),
                ..options()
            },
        )
        .with_sleeper(sleeper.clone())
        .run(&["Schagen".to_string()], &combinations(4), &boundaries())
        .unwrap();

        assert_eq!(outcome.summary.attempted, 4);
        assert_eq!(*sleeper.pauses.lock().unwrap(), vec![Duration::from_millis(250); 3]);
    }

    #[test]
    fn test_no_scan_is_dispatched_after_cancellation_during_delay() {
        let cancel = CancelToken::new();
        let sleeper = Arc::new(RecordingSleeper {
            pauses: Mutex::new(Vec::new()),
            cancel_on_first: Some(cancel.clone()),
        });
        let outcome = orchestrator(
            FixedApi { failing_date: None },
            OrchestratorOptions {
                workers: 1,
                delay_between_scans: Duration::from_secs(1),
                ..options()
            },
        )
        .with_sleeper(sleeper.clone())
        .with_cancel_token(cancel)
        .run(&["Schagen".to_string()], &combinations(4), &boundaries())
        .unwrap();

        assert_eq!(outcome.summary.attempted, 1);
        assert_eq!(outcome.summary.pending, 3);
        assert_eq!(sleeper.pauses.lock().unwrap().len(), 1);
    }

    struct PanickingReporter;

    impl ProgressReporter for PanickingReporter {
        fn on_task_complete(&self, _update: &ProgressUpdate) {
            panic!("reporter gave up");
        }
    }

    #[test]
    #[should_panic(expected = "reporter gave up")]
    fn test_run_unwinds_once_workers_have_exited() {
        // the dispatcher still holds scans when the workers stop; it must not block on them
        orchestrator(
            FixedApi { failing_date: None },
            OrchestratorOptions {
                workers: 1,
                ..options()
            },
        )
        .with_reporter(Arc::new(PanickingReporter))
        .run(&["Schagen".to_string()], &combinations(4), &boundaries())
        .unwrap();
    }
}
