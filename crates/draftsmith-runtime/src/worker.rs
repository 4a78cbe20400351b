//! The worker: claims pending tasks and drives them through their plans.
//!
//! Wake-up is two-tier: a push hint from the notifier plus a periodic
//! catch-up scan that also reclaims orphaned in_progress tasks. Within a
//! claimed task, stages whose dependencies are satisfied run concurrently up
//! to `max_parallel_stages`; transient stage failures retry with exponential
//! backoff; the quality gate sits after the terminal content stage and can
//! send the draft back through the creative stage a bounded number of times.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use draftsmith_config::WorkerSettings;
use draftsmith_core::{
    EvalContext, QualityEvaluator, QualityScore, RefinementFeedback, StageContext, StageInput,
    StageName, StageOutcome, StageOutput, StageResult, StageRunner, StoreError, Task, TaskStatus,
    TaskStore,
};
use draftsmith_stores::{TaskEvent, TaskNotifier};

use crate::registry::StageRegistry;

/// Worker errors. Stage failures are task outcomes, not worker errors; only
/// store and notifier failures surface here.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Worker policy knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Retries after the first failed attempt of a stage
    pub max_stage_retries: u32,
    /// Quality refinement iterations per task
    pub max_refinements: u32,
    /// Per-stage attempt timeout
    pub stage_timeout: Duration,
    /// Whole-task wall-clock ceiling
    pub task_timeout: Duration,
    /// Catch-up scan interval
    pub scan_interval: Duration,
    /// in_progress tasks untouched for this long are reclaimed
    pub stale_after: chrono::Duration,
    /// Concurrent stage executions per task
    pub max_parallel_stages: usize,
    /// First retry backoff; doubles per attempt
    pub backoff_base: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_settings(&WorkerSettings::default())
    }
}

impl WorkerConfig {
    /// Build the runtime policy from loaded settings.
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_stage_retries: settings.max_stage_retries,
            max_refinements: settings.max_refinements,
            stage_timeout: Duration::from_secs(settings.stage_timeout_secs),
            task_timeout: Duration::from_secs(settings.task_timeout_secs),
            scan_interval: Duration::from_secs(settings.scan_interval_secs),
            stale_after: chrono::Duration::seconds(settings.stale_after_secs as i64),
            max_parallel_stages: settings.max_parallel_stages.max(1),
            backoff_base: Duration::from_millis(200),
        }
    }
}

/// How a task's pipeline ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEnd {
    /// Every planned stage completed
    Completed,
    /// A stage exhausted its retries, failed fatally, or the plan stalled
    Failed {
        stage: Option<StageName>,
        error: String,
    },
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_stage_retries: u32,
    stage_timeout: Duration,
    backoff_base: Duration,
}

/// Result of one stage including all its retry attempts.
enum StageRun {
    Completed(StageOutput),
    Failed(String),
}

/// Claims tasks from the store and executes their plans.
pub struct Worker {
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn TaskNotifier>,
    registry: Arc<StageRegistry>,
    evaluator: Arc<dyn QualityEvaluator>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn TaskNotifier>,
        registry: Arc<StageRegistry>,
        evaluator: Arc<dyn QualityEvaluator>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            registry,
            evaluator,
            config,
        }
    }

    /// Run until cancelled. Wakes on notifier events and on the periodic
    /// scan; the scan also reclaims stale in_progress tasks so a crashed
    /// worker's claims are not lost.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        let mut events = self.notifier.subscribe();
        let mut tick = tokio::time::interval(self.config.scan_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker shutting down");
                    return Ok(());
                }
                event = events.recv() => {
                    // Lagged receivers just miss the hint; the scan covers it.
                    if event.is_ok() {
                        self.drain_pending().await?;
                    }
                }
                _ = tick.tick() => {
                    let reclaimed = self.store.reclaim_stale(self.config.stale_after).await?;
                    if !reclaimed.is_empty() {
                        info!(count = reclaimed.len(), "reclaimed stale tasks");
                    }
                    self.drain_pending().await?;
                }
            }
        }
    }

    /// Claim and execute pending tasks until the store runs dry. Returns the
    /// number of tasks processed.
    pub async fn drain_pending(&self) -> Result<usize, WorkerError> {
        let mut processed = 0;
        while let Some(task) = self.store.claim_next_pending().await? {
            self.execute_task(task).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Execute one claimed task to a terminal status.
    pub async fn execute_task(&self, task: Task) -> Result<(), WorkerError> {
        let task_id = task.id.clone();
        info!(task_id = %task_id, stages = task.plan.stages.len(), "executing task");

        let end = match timeout(self.config.task_timeout, self.run_pipeline(&task)).await {
            Ok(end) => end?,
            Err(_) => PipelineEnd::Failed {
                stage: None,
                error: format!(
                    "task exceeded the {}s execution ceiling",
                    self.config.task_timeout.as_secs()
                ),
            },
        };

        match end {
            PipelineEnd::Completed => {
                self.store
                    .update_status(&task_id, TaskStatus::Completed)
                    .await?;
                self.notifier
                    .publish(TaskEvent::completed(task_id.as_str()))
                    .await?;
                info!(task_id = %task_id, "task completed");
            }
            PipelineEnd::Failed { stage, error } => {
                warn!(task_id = %task_id, ?stage, %error, "task failed");
                self.store.set_error(&task_id, error).await?;
                self.store
                    .update_status(&task_id, TaskStatus::Failed)
                    .await?;
                self.notifier
                    .publish(TaskEvent::failed(task_id.as_str()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn run_pipeline(&self, task: &Task) -> Result<PipelineEnd, WorkerError> {
        let plan = &task.plan;
        let params = Self::stage_params(task);

        // Resume support: seed from attempts persisted before a reclaim.
        let mut completed: HashSet<StageName> = HashSet::new();
        let mut outputs: HashMap<StageName, StageOutput> = HashMap::new();
        for stage in plan.stages.iter().map(|s| s.name) {
            if let Some(output) = task.latest_output(stage) {
                completed.insert(stage);
                outputs.insert(stage, output.clone());
            }
        }

        // A reclaimed task may carry a persisted verdict. Only treat the gate
        // as settled when that verdict passed or the refinement budget is
        // spent; a failing verdict with budget left re-enters the gate below.
        let gate_stage = plan.terminal_content_stage();
        let mut gate_done = match (gate_stage, &task.quality) {
            (Some(gate), Some(quality)) if completed.contains(&gate) => {
                quality.passing || task.refinement_count >= self.config.max_refinements
            }
            _ => false,
        };
        let mut refinements = task.refinement_count;
        let mut pending_feedback: Option<RefinementFeedback> = None;

        let policy = RetryPolicy {
            max_stage_retries: self.config.max_stage_retries,
            stage_timeout: self.config.stage_timeout,
            backoff_base: self.config.backoff_base,
        };

        loop {
            // Gate before scheduling so nothing downstream of the terminal
            // content stage runs against a draft the gate is about to reject.
            if let Some(gate) = gate_stage {
                if !gate_done && completed.contains(&gate) {
                    match self.gate_verdict(task, gate, &outputs).await? {
                        Some(score) => {
                            self.store.set_quality(&task.id, score.clone()).await?;
                            if score.passing || refinements >= self.config.max_refinements {
                                if !score.passing {
                                    info!(
                                        task_id = %task.id,
                                        overall = score.overall,
                                        refinements,
                                        "refinement budget exhausted, keeping the draft"
                                    );
                                }
                                gate_done = true;
                            } else if !plan.has_stage(StageName::Creative) {
                                // Nothing to refine without a creative stage.
                                gate_done = true;
                            } else {
                                refinements = self.store.record_refinement(&task.id).await?;
                                pending_feedback = Some(RefinementFeedback::from_score(&score));
                                for stage in [StageName::Creative, StageName::Qa, StageName::Format]
                                {
                                    if stage == StageName::Qa && gate != StageName::Qa {
                                        continue;
                                    }
                                    completed.remove(&stage);
                                    outputs.remove(&stage);
                                }
                                debug!(
                                    task_id = %task.id,
                                    overall = score.overall,
                                    refinements,
                                    "quality gate failed, refining the draft"
                                );
                            }
                        }
                        None => gate_done = true,
                    }
                }
            }

            let ready: Vec<StageName> = plan
                .stages
                .iter()
                .filter(|s| !completed.contains(&s.name))
                .filter(|s| s.depends_on.iter().all(|d| completed.contains(d)))
                .map(|s| s.name)
                .collect();

            if ready.is_empty() {
                if completed.len() == plan.stages.len() {
                    return Ok(PipelineEnd::Completed);
                }
                return Ok(PipelineEnd::Failed {
                    stage: None,
                    error: "plan stalled with unmet dependencies".to_string(),
                });
            }

            let mut joins = JoinSet::new();
            for stage in ready.into_iter().take(self.config.max_parallel_stages) {
                let runner = match self.registry.get(stage) {
                    Some(runner) => runner,
                    None => {
                        return Ok(PipelineEnd::Failed {
                            stage: Some(stage),
                            error: format!("no runner registered for stage {stage}"),
                        })
                    }
                };
                let mut input = StageInput::new(params.clone()).with_prior(outputs.clone());
                if stage == StageName::Creative {
                    if let Some(feedback) = pending_feedback.take() {
                        input = input.with_feedback(feedback);
                    }
                }
                let store = self.store.clone();
                let task_id = task.id.clone();
                joins.spawn(async move {
                    let run = run_stage_with_retries(runner, input, task_id, stage, policy, store)
                        .await;
                    (stage, run)
                });
            }

            let mut failure: Option<(StageName, String)> = None;
            while let Some(joined) = joins.join_next().await {
                let (stage, run) =
                    joined.map_err(|e| StoreError::Internal(format!("stage join failed: {e}")))?;
                match run? {
                    StageRun::Completed(output) => {
                        outputs.insert(stage, output);
                        completed.insert(stage);
                        self.notifier
                            .publish(TaskEvent::stage_completed(task.id.as_str(), stage))
                            .await?;
                    }
                    StageRun::Failed(message) => {
                        failure.get_or_insert((stage, message));
                    }
                }
            }
            if let Some((stage, error)) = failure {
                return Ok(PipelineEnd::Failed {
                    stage: Some(stage),
                    error,
                });
            }
        }
    }

    /// Obtain the gate verdict after the terminal content stage completed.
    /// When the plan has a qa stage the verdict is its output; otherwise the
    /// evaluator scores the creative draft directly. Returns None when no
    /// verdict could be produced, which lets the task proceed unscored.
    async fn gate_verdict(
        &self,
        task: &Task,
        gate: StageName,
        outputs: &HashMap<StageName, StageOutput>,
    ) -> Result<Option<QualityScore>, WorkerError> {
        if gate == StageName::Qa {
            if let Some(StageOutput::Qa { score }) = outputs.get(&StageName::Qa) {
                return Ok(Some(score.clone()));
            }
            warn!(task_id = %task.id, "qa stage completed without a verdict");
            return Ok(None);
        }

        let content = match outputs.get(&gate).and_then(|o| o.content()) {
            Some(content) => content.to_string(),
            None => {
                warn!(task_id = %task.id, stage = %gate, "gate stage produced no content");
                return Ok(None);
            }
        };
        let ctx = EvalContext {
            topic: task.intent.param_str("topic").map(|s| s.to_string()),
            target_word_count: task.intent.param_f64("word_count").map(|n| n as u64),
        };
        match self.evaluator.evaluate(&content, &ctx).await {
            Ok(score) => Ok(Some(score)),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "quality evaluation failed, skipping gate");
                Ok(None)
            }
        }
    }

    /// Flatten the intent's parameters into the loose JSON params every
    /// stage receives.
    fn stage_params(task: &Task) -> Value {
        let map: serde_json::Map<String, Value> = task
            .intent
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

async fn run_stage_with_retries(
    runner: Arc<dyn StageRunner>,
    input: StageInput,
    task_id: String,
    stage: StageName,
    policy: RetryPolicy,
    store: Arc<dyn TaskStore>,
) -> Result<StageRun, StoreError> {
    let max_attempts = policy.max_stage_retries + 1;
    let mut attempt = 1u32;
    loop {
        let started = Instant::now();
        let ctx = StageContext::attempt(task_id.clone(), attempt);
        let outcome = match timeout(policy.stage_timeout, runner.run(input.clone(), ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => StageOutcome::retryable(format!(
                "stage {stage} timed out after {}s",
                policy.stage_timeout.as_secs()
            )),
        };
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            StageOutcome::Success {
                output,
                tokens_used,
                model_used,
            } => {
                let result = StageResult::completed(stage, output.clone(), elapsed)
                    .with_usage(tokens_used, model_used);
                store.append_stage_result(&task_id, result).await?;
                debug!(task_id = %task_id, stage = %stage, attempt, "stage completed");
                return Ok(StageRun::Completed(output));
            }
            StageOutcome::Retryable {
                message,
                retry_after,
            } => {
                store
                    .append_stage_result(
                        &task_id,
                        StageResult::failed(stage, message.clone(), elapsed),
                    )
                    .await?;
                if attempt >= max_attempts {
                    return Ok(StageRun::Failed(format!(
                        "stage {stage} failed after {attempt} attempts: {message}"
                    )));
                }
                let backoff = retry_after
                    .unwrap_or_else(|| policy.backoff_base * 2u32.saturating_pow(attempt - 1));
                warn!(
                    task_id = %task_id,
                    stage = %stage,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient stage failure, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            StageOutcome::Fatal { message } => {
                store
                    .append_stage_result(
                        &task_id,
                        StageResult::failed(stage, message.clone(), elapsed),
                    )
                    .await?;
                return Ok(StageRun::Failed(format!("stage {stage} failed: {message}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use draftsmith_core::{ExecutionPlanner, Intent, IntentType, PlanConstraints, TaskType};
    use draftsmith_stores::{BroadcastNotifier, InMemoryTaskStore};
    use serde_json::json;

    struct StaticRunner {
        stage: StageName,
        output: StageOutput,
    }

    #[async_trait]
    impl StageRunner for StaticRunner {
        fn name(&self) -> StageName {
            self.stage
        }

        fn description(&self) -> &str {
            "returns a fixed output"
        }

        async fn run(&self, _input: StageInput, _ctx: StageContext) -> StageOutcome {
            StageOutcome::success(self.output.clone())
        }
    }

    struct FatalRunner {
        stage: StageName,
    }

    #[async_trait]
    impl StageRunner for FatalRunner {
        fn name(&self) -> StageName {
            self.stage
        }

        fn description(&self) -> &str {
            "always fails fatally"
        }

        async fn run(&self, _input: StageInput, _ctx: StageContext) -> StageOutcome {
            StageOutcome::fatal("broken")
        }
    }

    fn static_registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry
            .register(
                StageName::Research,
                Arc::new(StaticRunner {
                    stage: StageName::Research,
                    output: StageOutput::Research {
                        summary: "Findings.".to_string(),
                        sources: vec![],
                    },
                }),
            )
            .register(
                StageName::Creative,
                Arc::new(StaticRunner {
                    stage: StageName::Creative,
                    output: StageOutput::Creative {
                        content: "A draft.".to_string(),
                        word_count: 2,
                    },
                }),
            )
            .register(
                StageName::Format,
                Arc::new(StaticRunner {
                    stage: StageName::Format,
                    output: StageOutput::Format {
                        content: "# Done".to_string(),
                        format: "markdown".to_string(),
                    },
                }),
            );
        registry
    }

    fn stored_task(stages: Vec<StageName>) -> Task {
        let intent = Intent::new(
            "write about tea",
            IntentType::ContentGeneration,
            TaskType::BlogPost,
            0.9,
        )
        .with_parameters(
            [("topic".to_string(), json!("tea"))].into_iter().collect(),
        )
        .with_stages(stages);
        let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
        Task::new(intent, plan)
    }

    struct AlwaysPassing;

    #[async_trait]
    impl QualityEvaluator for AlwaysPassing {
        async fn evaluate(
            &self,
            _content: &str,
            _ctx: &EvalContext,
        ) -> Result<QualityScore, draftsmith_core::EvaluateError> {
            let criteria = draftsmith_core::Criterion::ALL
                .iter()
                .map(|c| (*c, 9.0))
                .collect();
            Ok(QualityScore::from_criteria(
                criteria,
                draftsmith_core::EvaluationMethod::Pattern,
            ))
        }
    }

    fn worker(store: Arc<InMemoryTaskStore>, registry: StageRegistry) -> Worker {
        Worker::new(
            store,
            Arc::new(BroadcastNotifier::default()),
            Arc::new(registry),
            Arc::new(AlwaysPassing),
            WorkerConfig {
                backoff_base: Duration::from_millis(1),
                ..WorkerConfig::default()
            },
        )
    }

    #[test]
    fn test_drain_completes_a_sequential_task() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryTaskStore::new());
            let task = stored_task(vec![
                StageName::Research,
                StageName::Creative,
                StageName::Format,
            ]);
            let id = store
                .create(task.intent.clone(), task.plan.clone())
                .await
                .unwrap();

            let worker = worker(store.clone(), static_registry());
            assert_eq!(worker.drain_pending().await.unwrap(), 1);

            let done = store.get(&id).await.unwrap().unwrap();
            assert_eq!(done.status, TaskStatus::Completed);
            assert_eq!(done.current_stage_index, done.plan.stages.len());
            assert!(done.quality.is_some());
            assert!(matches!(
                done.latest_output(StageName::Format),
                Some(StageOutput::Format { .. })
            ));
        });
    }

    #[test]
    fn test_fatal_stage_fails_the_task() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryTaskStore::new());
            let task = stored_task(vec![StageName::Research, StageName::Creative]);
            let id = store
                .create(task.intent.clone(), task.plan.clone())
                .await
                .unwrap();

            let mut registry = static_registry();
            registry.register(
                StageName::Creative,
                Arc::new(FatalRunner {
                    stage: StageName::Creative,
                }),
            );

            let worker = worker(store.clone(), registry);
            worker.drain_pending().await.unwrap();

            let failed = store.get(&id).await.unwrap().unwrap();
            assert_eq!(failed.status, TaskStatus::Failed);
            assert!(failed.error.as_deref().unwrap().contains("creative"));
            // The fatal attempt was persisted exactly once.
            assert_eq!(failed.attempts_for(StageName::Creative).len(), 1);
        });
    }

    #[test]
    fn test_missing_runner_fails_the_task() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryTaskStore::new());
            let task = stored_task(vec![StageName::Images]);
            let id = store
                .create(task.intent.clone(), task.plan.clone())
                .await
                .unwrap();

            let worker = worker(store.clone(), static_registry());
            worker.drain_pending().await.unwrap();

            let failed = store.get(&id).await.unwrap().unwrap();
            assert_eq!(failed.status, TaskStatus::Failed);
            assert!(failed.error.as_deref().unwrap().contains("no runner"));
        });
    }
}
