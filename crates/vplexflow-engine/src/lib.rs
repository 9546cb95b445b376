//! vplexflow engine
//!
//! Provisioning and teardown as staged workflows: the planner orders the
//! work, the step executor applies one operation idempotently, the waiter
//! holds a stage until device rebuilds settle, and the orchestrator ties
//! them together.

pub mod executor;
pub mod facts;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod waiter;

pub use executor::{Outcome, StepExecutor, StepResult};
pub use facts::{Facts, GatherSubset, gather_facts};
pub use orchestrator::{
    DEFAULT_CONCURRENCY, FailurePolicy, Orchestrator, OrchestratorConfig, RollbackEntry,
    StepFailure, Transition, WorkflowReport, WorkflowState,
};
pub use plan::{Input, Intent, Operation, Plan, PlanSummary, Stage, Verb};
pub use planner::{
    InitiatorRequest, MetroTarget, ProvisionRequest, TeardownRequest, pair_extents,
    plan_provision, plan_teardown, stage_order,
};
pub use waiter::{WaitConfig, rebuild_settled, wait_for_rebuild, wait_for_rebuilds, wait_until};
