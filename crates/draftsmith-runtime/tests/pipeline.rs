//! End-to-end pipeline tests: fake providers, real store, real worker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use draftsmith_core::{
    Criterion, EvalContext, EvaluateError, EvaluationMethod, ExecutionPlanner, Intent, IntentType,
    ModelReply, PlanConstraints, ProviderError, QualityEvaluator, QualityScore, SearchProvider,
    SourceRef, StageName, StageStatus, TaskStatus, TaskStore, TaskType, TextModel,
};
use draftsmith_runtime::stages::default_registry;
use draftsmith_runtime::{Worker, WorkerConfig};
use draftsmith_stores::{BroadcastNotifier, InMemoryTaskStore};

struct StaticModel;

#[async_trait]
impl TextModel for StaticModel {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ProviderError> {
        Ok(ModelReply {
            text: format!("Draft generated for: {}", prompt.lines().next().unwrap_or("")),
            tokens_used: 50,
            model: "fake-model".to_string(),
        })
    }
}

/// Search that fails transiently a fixed number of times before succeeding.
struct FlakySearch {
    failures: u32,
    calls: AtomicU32,
}

impl FlakySearch {
    fn failing_first(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SearchProvider for FlakySearch {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SourceRef>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ProviderError::Network("connection reset".to_string()));
        }
        Ok(vec![SourceRef {
            title: format!("On {query}"),
            url: "https://example.com/1".to_string(),
        }])
    }
}

struct StaticImages;

#[async_trait]
impl draftsmith_core::ImageProvider for StaticImages {
    async fn find(
        &self,
        _query: &str,
        count: usize,
    ) -> Result<Vec<draftsmith_core::ImageAsset>, ProviderError> {
        Ok((0..count)
            .map(|i| draftsmith_core::ImageAsset {
                url: format!("https://img.example.com/{i}"),
                alt_text: format!("image {i}"),
            })
            .collect())
    }
}

struct FixedEvaluator {
    per_criterion: f64,
}

#[async_trait]
impl QualityEvaluator for FixedEvaluator {
    async fn evaluate(
        &self,
        _content: &str,
        _ctx: &EvalContext,
    ) -> Result<QualityScore, EvaluateError> {
        let criteria: BTreeMap<Criterion, f64> = Criterion::ALL
            .iter()
            .map(|c| (*c, self.per_criterion))
            .collect();
        Ok(QualityScore::from_criteria(criteria, EvaluationMethod::Pattern))
    }
}

fn content_intent(stages: Vec<StageName>) -> Intent {
    Intent::new(
        "Generate blog post about AI trends",
        IntentType::ContentGeneration,
        TaskType::BlogPost,
        0.9,
    )
    .with_parameters(
        [("topic".to_string(), json!("AI trends"))]
            .into_iter()
            .collect(),
    )
    .with_stages(stages)
}

fn intent_of(kind: IntentType, stages: Vec<StageName>) -> Intent {
    Intent::new("Analyze recent AI trends", kind, TaskType::Article, 0.85)
        .with_parameters(
            [("topic".to_string(), json!("AI trends"))]
                .into_iter()
                .collect(),
        )
        .with_stages(stages)
}

fn score_of(per_criterion: f64) -> QualityScore {
    QualityScore::from_criteria(
        Criterion::ALL.iter().map(|c| (*c, per_criterion)).collect(),
        EvaluationMethod::Pattern,
    )
}

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        backoff_base: Duration::from_millis(1),
        ..WorkerConfig::default()
    }
}

fn build_worker(
    store: Arc<InMemoryTaskStore>,
    search: Arc<dyn SearchProvider>,
    evaluator: Arc<dyn QualityEvaluator>,
) -> Worker {
    let registry = default_registry(
        Arc::new(StaticModel),
        search,
        Arc::new(StaticImages),
        evaluator.clone(),
    );
    Worker::new(
        store,
        Arc::new(BroadcastNotifier::default()),
        Arc::new(registry),
        evaluator,
        fast_config(),
    )
}

#[tokio::test]
async fn full_pipeline_completes_and_gates_on_quality() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = content_intent(vec![
        StageName::Research,
        StageName::Creative,
        StageName::Qa,
        StageName::Images,
        StageName::Format,
    ]);
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(0)),
        Arc::new(FixedEvaluator { per_criterion: 9.0 }),
    );
    assert_eq!(worker.drain_pending().await.unwrap(), 1);

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.current_stage_index, task.plan.stages.len());
    assert_eq!(task.refinement_count, 0);
    let quality = task.quality.as_ref().unwrap();
    assert!(quality.passing);
    assert!(matches!(
        task.latest_output(StageName::Format),
        Some(draftsmith_core::StageOutput::Format { .. })
    ));
}

#[tokio::test]
async fn failing_quality_refines_up_to_the_bound_then_completes() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = content_intent(vec![
        StageName::Research,
        StageName::Creative,
        StageName::Qa,
        StageName::Format,
    ]);
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    // Every draft scores 5.0: the gate fails, refines twice, then keeps
    // the draft rather than looping forever.
    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(0)),
        Arc::new(FixedEvaluator { per_criterion: 5.0 }),
    );
    worker.drain_pending().await.unwrap();

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.refinement_count, 2);
    assert!(!task.quality.as_ref().unwrap().passing);
    // Initial run plus two refinements.
    assert_eq!(task.attempts_for(StageName::Creative).len(), 3);
    assert_eq!(task.attempts_for(StageName::Qa).len(), 3);
    // Research ran once; refinement re-runs only the draft and its check.
    assert_eq!(task.attempts_for(StageName::Research).len(), 1);
    // Re-runs never move the stage index backwards.
    assert_eq!(task.current_stage_index, task.plan.stages.len());
}

#[tokio::test]
async fn analysis_pipeline_scores_the_research_summary() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = intent_of(
        IntentType::Analysis,
        vec![StageName::Research, StageName::Qa, StageName::Format],
    );
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(0)),
        Arc::new(FixedEvaluator { per_criterion: 9.0 }),
    );
    assert_eq!(worker.drain_pending().await.unwrap(), 1);

    // There is no draft stage: qa scores the research summary instead.
    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.quality.as_ref().unwrap().passing);
    assert!(task.attempts_for(StageName::Creative).is_empty());
    assert!(matches!(
        task.latest_output(StageName::Format),
        Some(draftsmith_core::StageOutput::Format { .. })
    ));
}

#[tokio::test]
async fn failing_verdict_without_a_draft_stage_is_kept() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = intent_of(
        IntentType::Analysis,
        vec![StageName::Research, StageName::Qa, StageName::Format],
    );
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(0)),
        Arc::new(FixedEvaluator { per_criterion: 5.0 }),
    );
    worker.drain_pending().await.unwrap();

    // With no creative stage there is nothing to refine: the low score is
    // recorded and the pipeline proceeds.
    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.refinement_count, 0);
    assert!(!task.quality.as_ref().unwrap().passing);
    assert_eq!(task.attempts_for(StageName::Qa).len(), 1);
}

#[tokio::test]
async fn revision_pipeline_completes_without_research() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = intent_of(
        IntentType::Revision,
        vec![StageName::Creative, StageName::Qa, StageName::Format],
    );
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(0)),
        Arc::new(FixedEvaluator { per_criterion: 9.0 }),
    );
    assert_eq!(worker.drain_pending().await.unwrap(), 1);

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.quality.as_ref().unwrap().passing);
    assert!(task.attempts_for(StageName::Research).is_empty());
    assert_eq!(task.attempts_for(StageName::Creative).len(), 1);
}

#[tokio::test]
async fn reclaimed_task_with_failing_verdict_resumes_refinement() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = content_intent(vec![
        StageName::Research,
        StageName::Creative,
        StageName::Qa,
        StageName::Format,
    ]);
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    // Simulate a worker that persisted a failing verdict and crashed before
    // running the refinement it still had budget for.
    store.claim_next_pending().await.unwrap().unwrap();
    store
        .append_stage_result(
            &id,
            draftsmith_core::StageResult::completed(
                StageName::Research,
                draftsmith_core::StageOutput::Research {
                    summary: "Findings on AI trends.".to_string(),
                    sources: vec![],
                },
                5,
            ),
        )
        .await
        .unwrap();
    store
        .append_stage_result(
            &id,
            draftsmith_core::StageResult::completed(
                StageName::Creative,
                draftsmith_core::StageOutput::Creative {
                    content: "A thin first draft.".to_string(),
                    word_count: 4,
                },
                5,
            ),
        )
        .await
        .unwrap();
    store
        .append_stage_result(
            &id,
            draftsmith_core::StageResult::completed(
                StageName::Qa,
                draftsmith_core::StageOutput::Qa {
                    score: score_of(5.0),
                },
                5,
            ),
        )
        .await
        .unwrap();
    store.set_quality(&id, score_of(5.0)).await.unwrap();

    let reclaimed = store.reclaim_stale(chrono::Duration::zero()).await.unwrap();
    assert_eq!(reclaimed, vec![id.clone()]);

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(0)),
        Arc::new(FixedEvaluator { per_criterion: 9.0 }),
    );
    assert_eq!(worker.drain_pending().await.unwrap(), 1);

    // The resumed run refines the rejected draft instead of settling for it.
    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.refinement_count, 1);
    assert!(task.quality.as_ref().unwrap().passing);
    assert_eq!(task.attempts_for(StageName::Creative).len(), 2);
    assert_eq!(task.attempts_for(StageName::Qa).len(), 2);
    // Research was kept from the first run.
    assert_eq!(task.attempts_for(StageName::Research).len(), 1);
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = content_intent(vec![StageName::Research, StageName::Format]);
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(2)),
        Arc::new(FixedEvaluator { per_criterion: 9.0 }),
    );
    worker.drain_pending().await.unwrap();

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    // Two failed attempts and the successful third, all persisted.
    let attempts = task.attempts_for(StageName::Research);
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].status, StageStatus::Failed);
    assert_eq!(attempts[1].status, StageStatus::Failed);
    assert_eq!(attempts[2].status, StageStatus::Completed);
}

#[tokio::test]
async fn exhausted_retries_fail_the_task() {
    let store = Arc::new(InMemoryTaskStore::new());
    let intent = content_intent(vec![StageName::Research, StageName::Format]);
    let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
    let id = store.create(intent, plan).await.unwrap();

    let worker = build_worker(
        store.clone(),
        Arc::new(FlakySearch::failing_first(u32::MAX)),
        Arc::new(FixedEvaluator { per_criterion: 9.0 }),
    );
    worker.drain_pending().await.unwrap();

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("research"));
    // First attempt plus exactly max_stage_retries retries.
    assert_eq!(task.attempts_for(StageName::Research).len(), 3);
    // Format never ran.
    assert!(task.attempts_for(StageName::Format).is_empty());
}

#[tokio::test]
async fn concurrent_workers_execute_each_task_exactly_once() {
    struct CountingSearch {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<SourceRef>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    let store = Arc::new(InMemoryTaskStore::new());
    let search = Arc::new(CountingSearch {
        calls: AtomicU32::new(0),
    });

    const TASKS: usize = 5;
    for _ in 0..TASKS {
        let intent = content_intent(vec![StageName::Research, StageName::Format]);
        let plan = ExecutionPlanner::new().plan(&intent, &PlanConstraints::default());
        store.create(intent, plan).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..10 {
        let worker = Arc::new(build_worker(
            store.clone(),
            search.clone(),
            Arc::new(FixedEvaluator { per_criterion: 9.0 }),
        ));
        handles.push(tokio::spawn(async move { worker.drain_pending().await }));
    }

    let mut processed = 0;
    for handle in handles {
        processed += handle.await.unwrap().unwrap();
    }

    // Every task was claimed by exactly one worker and ran exactly once.
    assert_eq!(processed, TASKS);
    assert_eq!(search.calls.load(Ordering::SeqCst) as usize, TASKS);
    assert_eq!(
        store
            .list_by_status(TaskStatus::Completed)
            .await
            .unwrap()
            .len(),
        TASKS
    );
}
