//! Job pipeline: per-job state machine, dual review, retries and the
//! concurrency-bounded batch driver.
//!
//! ```text
//! BatchOrchestrator   (rows -> jobs, cap C on active jobs)
//!     ↓
//! PipelineEngine      (one job, stages in order)
//!     ↓
//! ReviewConsensus     (two reviewers in parallel, at most one revision)
//!     ↓
//! RetryPolicy         (every external call)
//! ```

pub mod collaborators;
pub mod consensus;
pub mod context;
pub mod engine;
pub mod orchestrator;
pub mod registry;
pub mod retry;

pub use collaborators::Collaborators;
pub use consensus::{ReviewConsensus, ReviewOutcome};
pub use context::PipelineContext;
pub use engine::PipelineEngine;
pub use orchestrator::{BatchOrchestrator, BatchTask, PlannedJob, PreparedBatch};
pub use registry::JobRegistry;
pub use retry::{RetryBudget, RetryPolicy};
