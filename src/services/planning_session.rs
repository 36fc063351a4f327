//! Caller-facing session: editing, draft decisions and the published plan.
//!
//! Every edit bumps an edit epoch. A recalculation snapshots the inputs and
//! the epoch, runs the pipeline, and publishes only if no edit landed in
//! the meantime; otherwise the result is stale and dropped. Plans are
//! persisted before they are published, so a store failure leaves the last
//! applied plan in place. Published plans are immutable `Arc` snapshots
//! swapped under a short write lock.
//!
//! Each applied recalculation drops decided drafts and caps the pending list
//! at [`MAX_PENDING_DRAFTS`], evicting the oldest first.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CoverageResult, DraftStatus, DraftTask, Exclusion, PriorityPlan, RecalcOutcome, RecalcStatus,
    RecalcTrigger, Reflection, SortStrategy, Task,
};
use crate::domain::ports::{write_typed, RecordKind, RecordStore};
use crate::services::pipeline::{AnalysisInput, AnalysisPipeline};
use crate::services::recalculation::Recalculator;

/// Record id of the current plan.
pub const CURRENT_PLAN_ID: &str = "current";

/// Pending drafts kept across recalculations.
pub const MAX_PENDING_DRAFTS: usize = 100;

/// Serializable session contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub outcome: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub reflections: Vec<Reflection>,
    #[serde(default)]
    pub drafts: Vec<DraftTask>,
    #[serde(default)]
    pub strategy: SortStrategy,
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Result of a batch draft decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftBatchOutcome {
    /// Empty selection; nothing changed
    NothingSelected { message: String },
    Accepted { tasks: Vec<Task> },
}

/// Scores behind the current plan, kept for re-sorting without recomputation.
#[derive(Debug, Clone)]
struct ScoredView {
    active: Vec<Task>,
    boosts: HashMap<String, f64>,
    exclusions: Vec<Exclusion>,
    coverage: Option<CoverageResult>,
    degraded: bool,
}

pub struct PlanningSession {
    pipeline: Arc<AnalysisPipeline>,
    store: Arc<dyn RecordStore>,
    state: RwLock<SessionSnapshot>,
    plan: RwLock<Option<Arc<PriorityPlan>>>,
    scored: RwLock<Option<Arc<ScoredView>>>,
    version: AtomicU64,
    edit_epoch: AtomicU64,
    single_flight: Mutex<()>,
}

impl PlanningSession {
    pub fn new(
        pipeline: Arc<AnalysisPipeline>,
        store: Arc<dyn RecordStore>,
        snapshot: SessionSnapshot,
    ) -> Self {
        Self {
            pipeline,
            store,
            state: RwLock::new(snapshot),
            plan: RwLock::new(None),
            scored: RwLock::new(None),
            version: AtomicU64::new(0),
            edit_epoch: AtomicU64::new(0),
            single_flight: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.clone()
    }

    /// Latest published plan.
    pub async fn current_plan(&self) -> Option<Arc<PriorityPlan>> {
        self.plan.read().await.clone()
    }

    pub fn plan_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Drafts awaiting an accept or discard decision.
    pub async fn pending_drafts(&self) -> Vec<DraftTask> {
        self.state
            .read()
            .await
            .drafts
            .iter()
            .filter(|d| d.status.is_pending())
            .cloned()
            .collect()
    }

    /// Inclusion boosts behind the current plan.
    pub async fn boosts(&self) -> HashMap<String, f64> {
        self.scored
            .read()
            .await
            .as_ref()
            .map(|view| view.boosts.clone())
            .unwrap_or_default()
    }

    fn bump_epoch(&self) {
        self.edit_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Recompute everything and publish a new plan.
    pub async fn recalculate(&self, trigger: RecalcTrigger) -> DomainResult<RecalcOutcome> {
        let _flight = self.single_flight.lock().await;
        let epoch = self.edit_epoch.load(Ordering::SeqCst);
        let inputs = self.snapshot().await;
        let pending: Vec<DraftTask> = inputs
            .drafts
            .iter()
            .filter(|d| d.status.is_pending())
            .cloned()
            .collect();

        debug!(trigger = trigger.as_str(), epoch, "Recalculation started");
        let result = self
            .pipeline
            .run(AnalysisInput {
                outcome: &inputs.outcome,
                tasks: &inputs.tasks,
                reflections: &inputs.reflections,
                pending_drafts: &pending,
                strategy: inputs.strategy,
                document_id: inputs.document_id.as_deref(),
            })
            .await?;

        let mut state = self.state.write().await;
        if self.edit_epoch.load(Ordering::SeqCst) != epoch {
            debug!(trigger = trigger.as_str(), "Inputs changed during recalculation, result discarded");
            return Ok(RecalcOutcome {
                plan_version: self.plan_version(),
                status: RecalcStatus::Stale,
                degraded: result.degraded,
            });
        }

        let excluded: Vec<&str> = result.exclusions.iter().map(|e| e.task_id.as_str()).collect();
        let active: Vec<Task> = result
            .tasks
            .iter()
            .filter(|t| !excluded.contains(&t.id.as_str()))
            .cloned()
            .collect();
        let ordered_ids = if state.strategy == inputs.strategy {
            result.ordered_ids.clone()
        } else {
            self.pipeline
                .sorting()
                .sort(&active, state.strategy, &result.boosts)
        };

        let version = self.plan_version() + 1;
        let plan = PriorityPlan {
            version,
            strategy: state.strategy,
            ordered_ids,
            exclusions: result.exclusions.clone(),
            coverage: Some(result.coverage.clone()),
            degraded: result.degraded,
            generated_at: Utc::now(),
        };

        self.persist_plan(&plan, &result.tasks)
            .await
            .inspect_err(|err| warn!(error = %err, "Plan not persisted, keeping last applied plan"))?;

        state.tasks = result.tasks;
        replace_drafts(&mut state.drafts, result.drafts.kept);
        *self.scored.write().await = Some(Arc::new(ScoredView {
            active,
            boosts: result.boosts,
            exclusions: result.exclusions,
            coverage: Some(result.coverage),
            degraded: result.degraded,
        }));
        self.publish(plan).await;
        drop(state);

        info!(
            trigger = trigger.as_str(),
            plan_version = version,
            degraded = result.degraded,
            "Plan applied"
        );
        Ok(RecalcOutcome {
            plan_version: version,
            status: RecalcStatus::Applied,
            degraded: result.degraded,
        })
    }

    /// Re-sort the current scores under another strategy. No inference calls.
    pub async fn change_strategy(&self, name: &str) -> DomainResult<Option<Arc<PriorityPlan>>> {
        let strategy: SortStrategy = name.parse()?;
        let mut state = self.state.write().await;
        state.strategy = strategy;

        let Some(view) = self.scored.read().await.clone() else {
            debug!(strategy = strategy.as_str(), "Strategy set before first plan");
            return Ok(None);
        };

        let plan = PriorityPlan {
            version: self.plan_version() + 1,
            strategy,
            ordered_ids: self.pipeline.sorting().sort(&view.active, strategy, &view.boosts),
            exclusions: view.exclusions.clone(),
            coverage: view.coverage.clone(),
            degraded: view.degraded,
            generated_at: Utc::now(),
        };
        write_typed(self.store.as_ref(), RecordKind::PriorityPlan, CURRENT_PLAN_ID, &plan).await?;
        let published = self.publish(plan).await;
        drop(state);

        info!(strategy = strategy.as_str(), plan_version = published.version, "Plan re-sorted");
        Ok(Some(published))
    }

    async fn publish(&self, plan: PriorityPlan) -> Arc<PriorityPlan> {
        let plan = Arc::new(plan);
        let mut current = self.plan.write().await;
        self.version.store(plan.version, Ordering::SeqCst);
        *current = Some(Arc::clone(&plan));
        plan
    }

    async fn persist_plan(&self, plan: &PriorityPlan, tasks: &[Task]) -> DomainResult<()> {
        let store = self.store.as_ref();
        for task in tasks {
            write_typed(store, RecordKind::Task, &task.id, task).await?;
        }
        write_typed(store, RecordKind::PriorityPlan, CURRENT_PLAN_ID, plan).await
    }

    pub async fn set_outcome(&self, outcome: &str) -> DomainResult<()> {
        if outcome.trim().is_empty() {
            return Err(DomainError::ValidationFailed("outcome must not be empty".to_string()));
        }
        let mut state = self.state.write().await;
        state.outcome = outcome.trim().to_string();
        self.bump_epoch();
        Ok(())
    }

    /// Insert a task or replace the one with the same id.
    pub async fn upsert_task(&self, mut task: Task) -> DomainResult<()> {
        if task.id.trim().is_empty() || task.text.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "task needs a non-empty id and text".to_string(),
            ));
        }
        task.ensure_hash();
        write_typed(self.store.as_ref(), RecordKind::Task, &task.id, &task).await?;

        let mut state = self.state.write().await;
        match state.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => state.tasks.push(task),
        }
        self.bump_epoch();
        Ok(())
    }

    pub async fn remove_task(&self, task_id: &str) -> DomainResult<Task> {
        let mut state = self.state.write().await;
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        let removed = state.tasks.remove(index);
        self.bump_epoch();
        Ok(removed)
    }

    pub async fn add_reflection(&self, text: &str) -> DomainResult<Reflection> {
        if text.trim().is_empty() {
            return Err(DomainError::ValidationFailed("reflection must not be empty".to_string()));
        }
        let reflection = Reflection::new(text.trim());
        let id = reflection.id.to_string();
        write_typed(self.store.as_ref(), RecordKind::Reflection, &id, &reflection).await?;

        self.state.write().await.reflections.push(reflection.clone());
        self.bump_epoch();
        Ok(reflection)
    }

    /// Archive reflection `id` and add its replacement.
    pub async fn supersede_reflection(&self, id: Uuid, text: &str) -> DomainResult<Reflection> {
        if text.trim().is_empty() {
            return Err(DomainError::ValidationFailed("reflection must not be empty".to_string()));
        }
        let mut state = self.state.write().await;
        let index = state
            .reflections
            .iter()
            .position(|r| r.id == id && !r.archived)
            .ok_or(DomainError::ReflectionNotFound(id))?;

        let mut archived = state.reflections[index].clone();
        let replacement = archived.supersede(text.trim());
        let store = self.store.as_ref();
        write_typed(store, RecordKind::Reflection, &archived.id.to_string(), &archived).await?;
        write_typed(store, RecordKind::Reflection, &replacement.id.to_string(), &replacement).await?;

        state.reflections[index] = archived;
        state.reflections.push(replacement.clone());
        self.bump_epoch();
        Ok(replacement)
    }

    /// Promote a pending draft to a task.
    pub async fn accept_draft(&self, draft_id: Uuid) -> DomainResult<Task> {
        let mut state = self.state.write().await;
        let index = pending_index(&state.drafts, draft_id)?;
        let task = state.drafts[index].clone().into_task();
        write_typed(self.store.as_ref(), RecordKind::Task, &task.id, &task).await?;

        state.drafts[index].status = DraftStatus::Accepted;
        state.tasks.push(task.clone());
        self.bump_epoch();
        info!(draft_id = %draft_id, task_id = %task.id, "Draft accepted");
        Ok(task)
    }

    /// Reject a pending draft. Inputs are unchanged, so no recalculation is needed.
    pub async fn discard_draft(&self, draft_id: Uuid) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let index = pending_index(&state.drafts, draft_id)?;
        state.drafts[index].status = DraftStatus::Discarded;
        info!(draft_id = %draft_id, "Draft discarded");
        Ok(())
    }

    /// Accept every selected draft, or none if any id is not pending.
    pub async fn apply_draft_decisions(&self, selected: &[Uuid]) -> DomainResult<DraftBatchOutcome> {
        if selected.is_empty() {
            return Ok(DraftBatchOutcome::NothingSelected {
                message: "No drafts selected; nothing was changed.".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let indices = selected
            .iter()
            .map(|id| pending_index(&state.drafts, *id))
            .collect::<DomainResult<Vec<_>>>()?;

        let tasks: Vec<Task> = indices
            .iter()
            .map(|i| state.drafts[*i].clone().into_task())
            .collect();
        for task in &tasks {
            write_typed(self.store.as_ref(), RecordKind::Task, &task.id, task).await?;
        }

        for index in indices {
            state.drafts[index].status = DraftStatus::Accepted;
        }
        state.tasks.extend(tasks.iter().cloned());
        self.bump_epoch();
        info!(accepted = tasks.len(), "Draft batch accepted");
        Ok(DraftBatchOutcome::Accepted { tasks })
    }
}

fn replace_drafts(drafts: &mut Vec<DraftTask>, kept: Vec<DraftTask>) {
    drafts.retain(|d| d.status.is_pending());
    drafts.extend(kept);
    let overflow = drafts.len().saturating_sub(MAX_PENDING_DRAFTS);
    if overflow > 0 {
        debug!(evicted = overflow, "Pending draft cap reached, oldest drafts dropped");
        drafts.drain(..overflow);
    }
}

fn pending_index(drafts: &[DraftTask], draft_id: Uuid) -> DomainResult<usize> {
    drafts
        .iter()
        .position(|d| d.id == draft_id && d.status.is_pending())
        .ok_or(DomainError::DraftNotFound(draft_id))
}

#[async_trait]
impl Recalculator for PlanningSession {
    async fn recalculate(&self, trigger: RecalcTrigger) -> DomainResult<RecalcOutcome> {
        Self::recalculate(self, trigger).await
    }
}
