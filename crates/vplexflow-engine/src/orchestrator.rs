//! Workflow orchestrator
//!
//! Runs a plan stage by stage. Operations inside a stage run concurrently up
//! to a worker limit; their outputs feed the bindings of later stages. After
//! a stage creates devices the workflow waits for their rebuilds before
//! moving on.

use crate::executor::{Outcome, StepExecutor, StepResult};
use crate::plan::{Intent, Operation, Plan, Stage};
use crate::planner::{ProvisionRequest, TeardownRequest, plan_provision, plan_teardown};
use crate::waiter::{WaitConfig, wait_for_rebuilds};
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vplexflow_core::{
    DesiredState, ResourceClient, ResourceKind, ResourceRef, Result, VplexError,
};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// What happens to a workflow's own changes when it fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop and leave everything in place; run teardown to clean up
    #[default]
    FailFast,
    /// Undo this run's creations and claims in reverse order
    BestEffortRollback,
}

impl FromStr for FailurePolicy {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "best-effort-rollback" => Ok(FailurePolicy::BestEffortRollback),
            other => Err(VplexError::validation(format!(
                "unknown failure policy '{}', expected fail-fast or best-effort-rollback",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::BestEffortRollback => write!(f, "best-effort-rollback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Operations of one stage in flight at once
    pub concurrency: usize,
    pub wait: WaitConfig,
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            wait: WaitConfig::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Workflow state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Planning,
    Executing {
        stage: usize,
        kind: ResourceKind,
    },
    Waiting {
        stage: usize,
        resources: Vec<ResourceRef>,
    },
    Completed,
    Failed {
        stage: Option<usize>,
        reason: String,
    },
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed { .. })
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Planning => write!(f, "planning"),
            WorkflowState::Executing { stage, kind } => {
                write!(f, "executing stage {} ({})", stage + 1, kind)
            }
            WorkflowState::Waiting { stage, resources } => write!(
                f,
                "waiting on {} rebuild(s) after stage {}",
                resources.len(),
                stage + 1
            ),
            WorkflowState::Completed => write!(f, "completed"),
            WorkflowState::Failed { reason, .. } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub state: WorkflowState,
    pub at: DateTime<Utc>,
}

/// Where and why a workflow stopped
#[derive(Debug, Serialize)]
pub struct StepFailure {
    pub stage: usize,
    pub kind: ResourceKind,
    /// `None` when the workflow was cancelled between operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ResourceRef>,
    #[serde(serialize_with = "serialize_error")]
    pub error: VplexError,
}

fn serialize_error<S: Serializer>(error: &VplexError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Outcome of undoing one change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub reference: ResourceRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that happened during one workflow run
#[derive(Debug, Serialize)]
pub struct WorkflowReport {
    pub intent: Intent,
    pub transitions: Vec<Transition>,
    pub results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<RollbackEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowReport {
    fn start(intent: Intent) -> Self {
        let now = Utc::now();
        Self {
            intent,
            transitions: vec![Transition {
                state: WorkflowState::Planning,
                at: now,
            }],
            results: Vec::new(),
            failure: None,
            rollback: Vec::new(),
            started_at: now,
            finished_at: None,
        }
    }

    fn transition(&mut self, state: WorkflowState) {
        info!(state = %state, "Workflow transition");
        self.transitions.push(Transition {
            state,
            at: Utc::now(),
        });
    }

    fn fail(&mut self, failure: StepFailure) {
        error!(
            stage = failure.stage + 1,
            resource = ?failure.reference.as_ref().map(|r| r.to_string()),
            error = %failure.error,
            "Workflow failed"
        );
        self.transition(WorkflowState::Failed {
            stage: Some(failure.stage),
            reason: failure.error.to_string(),
        });
        self.failure = Some(failure);
    }

    pub fn state(&self) -> &WorkflowState {
        self.transitions
            .last()
            .map(|t| &t.state)
            .unwrap_or(&WorkflowState::Planning)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state(), WorkflowState::Completed)
    }

    /// Whether any step changed the array
    pub fn changed(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_change())
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

pub struct Orchestrator {
    client: Arc<dyn ResourceClient>,
    executor: StepExecutor,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ResourceClient>, config: OrchestratorConfig) -> Self {
        Self {
            executor: StepExecutor::new(client.clone()),
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to stop the workflow from outside
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Plan and run a provision
    ///
    /// Planning errors are returned directly; anything that goes wrong once
    /// execution starts is recorded in the report.
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<WorkflowReport> {
        let report = WorkflowReport::start(Intent::Provision);
        let plan = plan_provision(request)?;
        Ok(self.execute(plan, report).await)
    }

    /// Discover, plan and run a teardown
    pub async fn teardown(&self, request: &TeardownRequest) -> Result<WorkflowReport> {
        let report = WorkflowReport::start(Intent::Teardown);
        let plan = plan_teardown(self.client.as_ref(), request).await?;
        Ok(self.execute(plan, report).await)
    }

    /// Run a prepared plan
    pub async fn run(&self, plan: Plan) -> Result<WorkflowReport> {
        plan.validate()?;
        let report = WorkflowReport::start(plan.intent);
        Ok(self.execute(plan, report).await)
    }

    async fn execute(&self, plan: Plan, mut report: WorkflowReport) -> WorkflowReport {
        info!(
            intent = %plan.intent,
            stages = plan.stages.len(),
            summary = %plan.summary(),
            "Starting workflow"
        );
        let mut outputs: HashMap<String, ResourceRef> = HashMap::new();

        for (index, stage) in plan.stages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.fail(StepFailure {
                    stage: index,
                    kind: stage.kind,
                    operation_id: None,
                    reference: None,
                    error: VplexError::Cancelled,
                });
                break;
            }

            report.transition(WorkflowState::Executing {
                stage: index,
                kind: stage.kind,
            });

            if let Err(failure) = self.run_stage(index, stage, &mut outputs, &mut report).await {
                report.fail(failure);
                break;
            }

            let waiting: Vec<ResourceRef> = stage
                .operations
                .iter()
                .filter(|op| op.desired == DesiredState::Present && op.reference.kind.is_device_class())
                .filter_map(|op| outputs.get(&op.id).cloned())
                .collect();
            if waiting.is_empty() {
                continue;
            }

            report.transition(WorkflowState::Waiting {
                stage: index,
                resources: waiting.clone(),
            });
            let waits =
                wait_for_rebuilds(self.client.as_ref(), &waiting, &self.config.wait, &self.cancel)
                    .await;
            if let Some((reference, Err(error))) = waits.into_iter().find(|(_, r)| r.is_err()) {
                let operation_id = stage
                    .operations
                    .iter()
                    .find(|op| outputs.get(&op.id) == Some(&reference))
                    .map(|op| op.id.clone());
                report.fail(StepFailure {
                    stage: index,
                    kind: stage.kind,
                    operation_id,
                    reference: Some(reference),
                    error,
                });
                break;
            }
        }

        if report.failure.is_some() {
            if self.config.failure_policy == FailurePolicy::BestEffortRollback {
                report.rollback = self.rollback(&report.results).await;
            }
        } else {
            report.transition(WorkflowState::Completed);
            info!(
                created = report.count(Outcome::Created),
                modified = report.count(Outcome::Modified),
                deleted = report.count(Outcome::Deleted),
                unchanged = report.count(Outcome::Unchanged),
                "Workflow completed"
            );
        }
        report.finished_at = Some(Utc::now());
        report
    }

    /// Run one stage's operations, at most `concurrency` at a time
    ///
    /// Once one operation fails, or the workflow is cancelled, operations
    /// that have not started yet are skipped.
    async fn run_stage(
        &self,
        index: usize,
        stage: &Stage,
        outputs: &mut HashMap<String, ResourceRef>,
        report: &mut WorkflowReport,
    ) -> std::result::Result<(), StepFailure> {
        let halted = AtomicBool::new(false);
        let bindings: &HashMap<String, ResourceRef> = outputs;

        let mut finished: Vec<(usize, Option<Result<StepResult>>)> =
            stream::iter(stage.operations.iter().enumerate())
                .map(|(position, operation)| {
                    let halted = &halted;
                    async move {
                        if halted.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                            return (position, None);
                        }
                        let result = self.executor.execute(operation, bindings).await;
                        if result.is_err() {
                            halted.store(true, Ordering::SeqCst);
                        }
                        (position, Some(result))
                    }
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;
        finished.sort_by_key(|(position, _)| *position);

        let mut failure: Option<StepFailure> = None;
        let mut skipped = false;
        for (position, result) in finished {
            let operation: &Operation = &stage.operations[position];
            match result {
                Some(Ok(step)) => {
                    outputs.insert(operation.id.clone(), step.output());
                    report.results.push(step);
                }
                Some(Err(error)) => {
                    if failure.is_none() {
                        failure = Some(StepFailure {
                            stage: index,
                            kind: stage.kind,
                            operation_id: Some(operation.id.clone()),
                            reference: Some(operation.reference.clone()),
                            error,
                        });
                    } else {
                        warn!(operation = %operation.id, error = %error, "Additional failure in stage");
                    }
                }
                None => skipped = true,
            }
        }

        match failure {
            Some(failure) => Err(failure),
            None if skipped => Err(StepFailure {
                stage: index,
                kind: stage.kind,
                operation_id: None,
                reference: None,
                error: VplexError::Cancelled,
            }),
            None => Ok(()),
        }
    }

    /// Undo this run's creations and claims, newest first
    ///
    /// Errors are collected rather than raised so the original failure stays
    /// the one reported.
    async fn rollback(&self, results: &[StepResult]) -> Vec<RollbackEntry> {
        let mut entries = Vec::new();
        for step in results.iter().rev() {
            let undo = match (step.desired, step.outcome, step.reference.kind) {
                (DesiredState::Present, Outcome::Created, _) => true,
                (DesiredState::Present, Outcome::Modified, ResourceKind::StorageVolume) => true,
                (DesiredState::Present, Outcome::Modified, _) => {
                    warn!(resource = %step.reference, "In-place modification is not rolled back");
                    false
                }
                _ => false,
            };
            if !undo {
                continue;
            }

            let entry = match self
                .executor
                .apply(
                    &format!("rollback:{}", step.operation_id),
                    &step.reference,
                    DesiredState::Absent,
                    None,
                )
                .await
            {
                Ok(result) => {
                    info!(resource = %step.reference, outcome = %result.outcome, "Rolled back");
                    RollbackEntry {
                        reference: step.reference.clone(),
                        outcome: Some(result.outcome),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(resource = %step.reference, error = %e, "Rollback failed");
                    RollbackEntry {
                        reference: step.reference.clone(),
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            entries.push(entry);
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!(
            "best-effort-rollback".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::BestEffortRollback
        );
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_state_serialization() {
        let state = WorkflowState::Executing {
            stage: 0,
            kind: ResourceKind::Extent,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "executing");
        assert_eq!(json["kind"], "extent");
        assert_eq!(state.to_string(), "executing stage 1 (extent)");
        assert!(!state.is_terminal());
        assert!(WorkflowState::Completed.is_terminal());
    }

    #[test]
    fn test_report_starts_in_planning() {
        let report = WorkflowReport::start(Intent::Provision);
        assert_eq!(report.state(), &WorkflowState::Planning);
        assert!(!report.is_success());
        assert!(!report.changed());
    }
}
