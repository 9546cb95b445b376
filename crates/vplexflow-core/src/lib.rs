//! vplexflow core
//!
//! Shared vocabulary for the vplexflow crates: the resource model, typed
//! filters, the [`ResourceClient`] abstraction and an in-memory array that
//! implements it.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             vplexflow (CLI)                   │
//! └─────────────────┬────────────────────────────┘
//!                   │
//! ┌─────────────────▼────────────────────────────┐
//! │            vplexflow-engine                   │
//! │  planner · executor · waiter · orchestrator   │
//! └─────────────────┬────────────────────────────┘
//!                   │  trait ResourceClient
//!         ┌─────────┴──────────┐
//! ┌───────▼───────┐    ┌───────▼───────┐
//! │ vplexflow-rest│    │  MemoryArray  │
//! │   (reqwest)   │    │   (tests)     │
//! └───────────────┘    └───────────────┘
//! ```

pub mod client;
pub mod error;
pub mod filter;
pub mod memory;
pub mod model;
pub mod spec;

// Re-exports
pub use client::ResourceClient;
pub use error::{Result, VplexError};
pub use filter::{Filter, FilterOperator, FilterSet, FilterValue};
pub use memory::{Call, CallVerb, MemoryArray};
pub use model::{
    ClaimState, DesiredState, Geometry, HostType, RebuildStatus, ResourceDetails, ResourceKind,
    ResourceMap, ResourceRef, Scope, StripeDepth, validate_name,
};
pub use spec::ResourceSpec;
