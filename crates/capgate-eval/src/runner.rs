//! Trial execution.
//!
//! Trials are issued through one semaphore shared across suites: a trial's
//! tokio task is spawned only after it holds a permit, so
//! `max_concurrent_trials` bounds both in-flight model calls and live tasks.
//! A suite's result is assembled only after all of its trials are joined.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, instrument, warn};

use capgate_core::{
    emit_suite_finished, emit_trial_dropped, trial_prompt, EvalRun, GateError, ModelEnv, Result,
    RunId, RunStatus, RunnerSettings, SuiteResult, SuiteSpec, TaskResult, TrialError,
};

use crate::adapter::{ModelAdapter, ModelAdapterFactory, ModelTarget};

/// What became of one trial.
#[derive(Debug)]
enum TrialOutcome {
    Scored(f64),
    Failed(TrialError),
    /// Never issued because the run was cancelled.
    Skipped,
}

/// Result of one suite plus the number of trials cancellation skipped.
struct SuiteRun {
    result: SuiteResult,
    skipped: u64,
}

/// Runs suites against a candidate through a [`ModelAdapterFactory`].
pub struct EvalRunner {
    factory: Arc<dyn ModelAdapterFactory>,
    settings: RunnerSettings,
    env: ModelEnv,
    permits: Arc<Semaphore>,
    cancel: watch::Receiver<bool>,
}

impl EvalRunner {
    pub fn new(
        factory: Arc<dyn ModelAdapterFactory>,
        settings: RunnerSettings,
        env: ModelEnv,
    ) -> Self {
        let (_never, cancel) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_trials.max(1)));
        Self {
            factory,
            settings,
            env,
            permits,
            cancel,
        }
    }

    /// Stop issuing trials once `cancel` turns `true`. In-flight trials drain.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolve a suite's endpoint and token from the captured environment.
    pub fn resolve_target(&self, suite: &SuiteSpec) -> Result<ModelTarget> {
        let endpoint_env = &suite.model.endpoint_env;
        let endpoint = self.env.get(endpoint_env).ok_or_else(|| {
            GateError::config(format!(
                "Missing model endpoint env: {} (suite '{}')",
                endpoint_env, suite.name
            ))
        })?;
        let token = suite
            .model
            .token_env
            .as_deref()
            .and_then(|name| self.env.get(name))
            .map(str::to_string);
        Ok(ModelTarget {
            endpoint: endpoint.to_string(),
            token,
            limits: suite.limits.clone(),
        })
    }

    fn adapter_for(&self, suite: &SuiteSpec) -> Result<Arc<dyn ModelAdapter>> {
        let target = self.resolve_target(suite)?;
        self.factory.adapter(&target)
    }

    /// Run every trial of one suite and aggregate per task.
    pub async fn run(&self, suite: &SuiteSpec, candidate_tag: &str) -> Result<SuiteResult> {
        let adapter = self.adapter_for(suite)?;
        Ok(self.execute_suite(suite, adapter, candidate_tag).await.result)
    }

    /// Run all suites concurrently and assemble the EvalRun in suite order.
    ///
    /// Every endpoint is resolved before the first trial is issued, so a
    /// missing variable aborts the run without any model call.
    pub async fn run_all(
        &self,
        suites: &[SuiteSpec],
        candidate_tag: &str,
        run_id: &RunId,
    ) -> Result<EvalRun> {
        let adapters = suites
            .iter()
            .map(|suite| self.adapter_for(suite))
            .collect::<Result<Vec<_>>>()?;

        let runs = join_all(
            suites
                .iter()
                .zip(adapters)
                .map(|(suite, adapter)| self.execute_suite(suite, adapter, candidate_tag)),
        )
        .await;

        let skipped: u64 = runs.iter().map(|r| r.skipped).sum();
        let status = if skipped > 0 {
            warn!(
                run_id = %run_id,
                skipped = skipped,
                "run cancelled before all trials were issued"
            );
            RunStatus::Incomplete
        } else {
            RunStatus::Complete
        };

        Ok(EvalRun {
            run_id: run_id.clone(),
            candidate_tag: candidate_tag.to_string(),
            status,
            suites: runs.into_iter().map(|r| r.result).collect(),
        })
    }

    #[instrument(skip(self, suite, adapter), fields(suite = %suite.name))]
    async fn execute_suite(
        &self,
        suite: &SuiteSpec,
        adapter: Arc<dyn ModelAdapter>,
        candidate_tag: &str,
    ) -> SuiteRun {
        let mut tally = SuiteTally::new(suite);
        let mut in_flight = FuturesUnordered::new();

        // A trial is spawned only once it holds a permit, so live tasks never
        // exceed `max_concurrent_trials` regardless of `points`.
        for (task_index, task) in suite.tasks.iter().enumerate() {
            for trial in 0..task.points {
                let permit = match self.issue_permit().await {
                    Some(permit) => permit,
                    None => {
                        tally.record(task_index, trial, TrialOutcome::Skipped);
                        continue;
                    }
                };
                let prompt = trial_prompt(&suite.name, &task.name, trial, candidate_tag);
                let handle = self.spawn_trial(prompt, Arc::clone(&adapter), permit);
                in_flight.push(handle.map(move |joined| (task_index, trial, joined)));

                while let Some(Some(done)) = in_flight.next().now_or_never() {
                    tally.record_joined(done);
                }
            }
        }

        // Barrier: nothing is reported until every trial of the suite is joined.
        while let Some(done) = in_flight.next().await {
            tally.record_joined(done);
        }

        tally.finish()
    }

    /// Wait for a trial slot. `None` once the run is cancelled.
    async fn issue_permit(&self) -> Option<OwnedSemaphorePermit> {
        if self.cancelled() {
            return None;
        }
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        // Cancellation may have arrived while waiting for the slot.
        if self.cancelled() {
            return None;
        }
        Some(permit)
    }

    fn spawn_trial(
        &self,
        prompt: String,
        adapter: Arc<dyn ModelAdapter>,
        permit: OwnedSemaphorePermit,
    ) -> JoinHandle<TrialOutcome> {
        let timeout = self.settings.trial_timeout();
        let timeout_secs = self.settings.trial_timeout_secs;

        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(timeout, adapter.invoke(&prompt)).await {
                Ok(Ok(score)) if score.is_finite() && (0.0..=1.0).contains(&score) => {
                    TrialOutcome::Scored(score)
                }
                Ok(Ok(score)) => TrialOutcome::Failed(TrialError::OutOfRange { score }),
                Ok(Err(error)) => TrialOutcome::Failed(error),
                Err(_) => TrialOutcome::Failed(TrialError::TimedOut { secs: timeout_secs }),
            }
        })
    }
}

type JoinedTrial = (usize, u32, std::result::Result<TrialOutcome, JoinError>);

/// Running per-task totals of one suite.
struct SuiteTally<'a> {
    suite: &'a SuiteSpec,
    scores: Vec<Vec<f64>>,
    dropped: Vec<u32>,
    skipped: u64,
}

impl<'a> SuiteTally<'a> {
    fn new(suite: &'a SuiteSpec) -> Self {
        Self {
            suite,
            scores: vec![Vec::new(); suite.tasks.len()],
            dropped: vec![0; suite.tasks.len()],
            skipped: 0,
        }
    }

    fn record(&mut self, task_index: usize, trial: u32, outcome: TrialOutcome) {
        match outcome {
            TrialOutcome::Scored(score) => self.scores[task_index].push(score),
            TrialOutcome::Failed(error) => {
                let task = &self.suite.tasks[task_index].name;
                emit_trial_dropped(&self.suite.name, task, trial, &error);
                self.dropped[task_index] += 1;
            }
            TrialOutcome::Skipped => {
                self.skipped += 1;
                self.dropped[task_index] += 1;
            }
        }
    }

    fn record_joined(&mut self, (task_index, trial, joined): JoinedTrial) {
        let outcome = joined.unwrap_or_else(|e| {
            TrialOutcome::Failed(TrialError::Failed(format!("trial task aborted: {}", e)))
        });
        self.record(task_index, trial, outcome);
    }

    fn finish(self) -> SuiteRun {
        let results: Vec<TaskResult> = self
            .suite
            .tasks
            .iter()
            .zip(self.scores.iter().zip(&self.dropped))
            .map(|(task, (scores, &dropped))| {
                TaskResult::from_scores(&task.name, &task.metric, scores, dropped)
            })
            .collect();

        let collected: u64 = results.iter().map(|r| u64::from(r.n)).sum();
        let total_dropped: u64 = results.iter().map(|r| u64::from(r.dropped)).sum();
        emit_suite_finished(&self.suite.name, results.len(), collected, total_dropped);
        if self.skipped > 0 {
            debug!(skipped = self.skipped, "trials skipped after cancellation");
        }

        SuiteRun {
            result: SuiteResult {
                suite: self.suite.name.clone(),
                results,
            },
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use capgate_core::{ModelRef, TaskSpec};

    use crate::fakes::{
        deterministic_score, DeterministicModelAdapter, FixedScoreAdapter, FlakyModelAdapter,
        StaticAdapterFactory,
    };

    fn suite(name: &str, tasks: &[(&str, u32)]) -> SuiteSpec {
        SuiteSpec {
            name: name.to_string(),
            model: ModelRef {
                endpoint_env: "MODEL_ENDPOINT".to_string(),
                token_env: Some("MODEL_TOKEN".to_string()),
            },
            limits: BTreeMap::from([("max_tokens".to_string(), "512".to_string())]),
            tasks: tasks
                .iter()
                .map(|(task, points)| TaskSpec {
                    name: task.to_string(),
                    metric: "accuracy".to_string(),
                    points: *points,
                })
                .collect(),
        }
    }

    fn env() -> ModelEnv {
        ModelEnv::from_pairs([
            ("MODEL_ENDPOINT", "http://localhost:8080/score"),
            ("MODEL_TOKEN", "t0ken"),
        ])
    }

    fn runner(adapter: Arc<dyn ModelAdapter>) -> (EvalRunner, Arc<StaticAdapterFactory>) {
        let factory = Arc::new(StaticAdapterFactory::new(adapter));
        let runner = EvalRunner::new(factory.clone(), RunnerSettings::default(), env());
        (runner, factory)
    }

    #[tokio::test]
    async fn test_every_trial_collected_with_reliable_adapter() {
        let (runner, _) = runner(Arc::new(FixedScoreAdapter(0.75)));
        let result = runner
            .run(&suite("core", &[("reasoning", 20), ("summarization", 5)]), "model@v2")
            .await
            .unwrap();

        assert_eq!(result.suite, "core");
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].task, "reasoning");
        assert_eq!(result.results[0].n, 20);
        assert_eq!(result.results[1].n, 5);
        assert_eq!(result.results[1].dropped, 0);
        assert!((result.results[0].avg - 0.75).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_deterministic_adapter_matches_prompt_scores() {
        let (runner, _) = runner(Arc::new(DeterministicModelAdapter::new()));
        let result = runner
            .run(&suite("core", &[("reasoning", 4)]), "candidate@local")
            .await
            .unwrap();

        let expected: f64 = (0..4)
            .map(|i| deterministic_score(&trial_prompt("core", "reasoning", i, "candidate@local")))
            .sum::<f64>()
            / 4.0;
        assert!((result.results[0].avg - expected).abs() < 1e-12);

        let again = runner
            .run(&suite("core", &[("reasoning", 4)]), "candidate@local")
            .await
            .unwrap();
        assert_eq!(result, again);
    }

    #[tokio::test]
    async fn test_failed_trials_are_excluded_and_counted() {
        let adapter = FlakyModelAdapter::new(0.5).failing_on([0, 3]);
        let (runner, _) = runner(Arc::new(adapter));
        let result = runner.run(&suite("safety", &[("refusal", 10)]), "c").await.unwrap();

        assert_eq!(result.results[0].n, 8);
        assert_eq!(result.results[0].dropped, 2);
        assert!((result.results[0].avg - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_all_trials_failing_scores_zero() {
        let adapter = FlakyModelAdapter::new(0.9).failing_on(0..3);
        let (runner, _) = runner(Arc::new(adapter));
        let result = runner.run(&suite("safety", &[("refusal", 3)]), "c").await.unwrap();

        assert_eq!(result.results[0].n, 0);
        assert_eq!(result.results[0].dropped, 3);
        assert_eq!(result.results[0].avg, 0.0);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_dropped() {
        let (runner, _) = runner(Arc::new(FixedScoreAdapter(1.5)));
        let result = runner.run(&suite("core", &[("reasoning", 2)]), "c").await.unwrap();
        assert_eq!(result.results[0].n, 0);
        assert_eq!(result.results[0].dropped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_trial_times_out() {
        let adapter = FlakyModelAdapter::new(0.6).stalling_on([1]);
        let (runner, _) = runner(Arc::new(adapter));
        let result = runner.run(&suite("robustness", &[("noise", 3)]), "c").await.unwrap();

        assert_eq!(result.results[0].n, 2);
        assert_eq!(result.results[0].dropped, 1);
    }

    #[tokio::test]
    async fn test_missing_endpoint_aborts_before_any_call() {
        let adapter = DeterministicModelAdapter::new();
        let factory = Arc::new(StaticAdapterFactory::new(Arc::new(adapter.clone())));
        let runner = EvalRunner::new(
            factory.clone(),
            RunnerSettings::default(),
            ModelEnv::from_pairs([("OTHER", "x")]),
        );

        let err = runner
            .run_all(&[suite("core", &[("reasoning", 3)])], "c", &RunId::generate())
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Config(_)));
        assert!(err.to_string().contains("MODEL_ENDPOINT"));
        assert_eq!(adapter.calls(), 0);
        assert!(factory.targets().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_target_reads_token_and_limits() {
        let (runner, factory) = runner(Arc::new(FixedScoreAdapter(0.1)));
        runner.run(&suite("core", &[("reasoning", 1)]), "c").await.unwrap();

        let targets = factory.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].endpoint, "http://localhost:8080/score");
        assert_eq!(targets[0].token.as_deref(), Some("t0ken"));
        assert_eq!(targets[0].limits["max_tokens"], "512");
    }

    #[tokio::test]
    async fn test_run_all_keeps_suite_order() {
        let (runner, _) = runner(Arc::new(DeterministicModelAdapter::new()));
        let suites = vec![
            suite("core", &[("reasoning", 5)]),
            suite("safety", &[("refusal", 2)]),
            suite("robustness", &[("noise", 3)]),
        ];
        let run_id = RunId::parse("gate-2026-10-18T09-15-02-123Z").unwrap();
        let run = runner.run_all(&suites, "candidate@local", &run_id).await.unwrap();

        let names: Vec<&str> = run.suites.iter().map(|s| s.suite.as_str()).collect();
        assert_eq!(names, vec!["core", "safety", "robustness"]);
        assert_eq!(run.run_id, run_id);
        assert!(run.is_complete());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_issues_nothing() {
        let adapter = DeterministicModelAdapter::new();
        let (runner, _) = runner(Arc::new(adapter.clone()));
        let (tx, rx) = watch::channel(true);
        let runner = runner.with_cancellation(rx);

        let run = runner
            .run_all(&[suite("core", &[("reasoning", 4)])], "c", &RunId::generate())
            .await
            .unwrap();
        drop(tx);

        assert_eq!(run.status, RunStatus::Incomplete);
        assert_eq!(run.suites[0].results[0].n, 0);
        assert_eq!(run.suites[0].results[0].dropped, 4);
        assert_eq!(adapter.calls(), 0);
    }

    /// Records the peak number of live runtime tasks seen during a call.
    #[derive(Default)]
    struct TaskCountingAdapter {
        peak_alive: AtomicUsize,
    }

    #[async_trait]
    impl ModelAdapter for TaskCountingAdapter {
        async fn invoke(&self, _prompt: &str) -> std::result::Result<f64, TrialError> {
            let alive = tokio::runtime::Handle::current()
                .metrics()
                .num_alive_tasks();
            self.peak_alive.fetch_max(alive, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(0.5)
        }
    }

    #[tokio::test]
    async fn test_live_trial_tasks_bounded_by_concurrency() {
        let adapter = Arc::new(TaskCountingAdapter::default());
        let factory = Arc::new(StaticAdapterFactory::new(adapter.clone()));
        let settings = RunnerSettings {
            max_concurrent_trials: 2,
            ..RunnerSettings::default()
        };
        let runner = EvalRunner::new(factory, settings, env());

        let result = runner
            .run(&suite("core", &[("reasoning", 2_000)]), "c")
            .await
            .unwrap();

        assert_eq!(result.results[0].n, 2_000);
        let peak = adapter.peak_alive.load(Ordering::SeqCst);
        // Finished tasks may still be counted briefly after releasing their permit.
        assert!((1..=4).contains(&peak), "peak live tasks = {}", peak);
    }

    /// Trips the cancellation flag on its first call.
    struct CancellingAdapter {
        cancel: watch::Sender<bool>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelAdapter for CancellingAdapter {
        async fn invoke(&self, _prompt: &str) -> std::result::Result<f64, TrialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.cancel.send(true);
            Ok(0.4)
        }
    }

    #[tokio::test]
    async fn test_cancellation_mid_run_drains_in_flight_trials() {
        let (tx, rx) = watch::channel(false);
        let adapter = Arc::new(CancellingAdapter {
            cancel: tx,
            calls: AtomicUsize::new(0),
        });
        let factory = Arc::new(StaticAdapterFactory::new(adapter.clone()));
        let settings = RunnerSettings {
            max_concurrent_trials: 1,
            ..RunnerSettings::default()
        };
        let runner = EvalRunner::new(factory, settings, env()).with_cancellation(rx);

        let run = runner
            .run_all(&[suite("core", &[("reasoning", 10)])], "c", &RunId::generate())
            .await
            .unwrap();

        let task = &run.suites[0].results[0];
        assert_eq!(run.status, RunStatus::Incomplete);
        assert!(task.n >= 1 && task.n < 10);
        assert_eq!(task.n + task.dropped, 10);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), task.n as usize);
    }
}
