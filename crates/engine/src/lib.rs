//! Migration orchestration: the reconciliation engine.
//!
//! This crate provides the [`Migrator`], which decides for every unit of work
//! (repository content, issue set, issue, comment) whether it is done,
//! partially done, or not started, and drives it to completion; and the
//! [`RateGovernor`], which keeps remote writes under per-class ceilings.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The migrator sequences calls between the domain
//! rules in the [`migration`] crate and the port traits (remote API, content
//! transfer, progress store). It owns no I/O of its own; the only blocking it
//! performs is the rate governor's wait.
//!
//! ## Scheduling
//!
//! One logical worker, strictly sequential across repositories, issues, and
//! comments. Ordering (ascending issue numbers, in-order comments) depends on
//! it.

pub mod migrator;
pub mod rate_governor;
pub mod shutdown;

pub use migrator::{Migrator, RepositoryOutcome, RepositoryPhase, RunOutcome};
pub use rate_governor::{RateClass, RateGovernor, WindowStats, WINDOW};
pub use shutdown::ShutdownSignal;
