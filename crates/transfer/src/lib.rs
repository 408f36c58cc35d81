//! Repository content transfer adapter.
//!
//! Implements the [`migration::ContentTransfer`] port by driving the `git`
//! command line: a mirror clone of the source, large-file objects when
//! `git lfs` is installed, and a forced push of every branch and tag to the
//! target.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, time limits, credential handling in
//! remote URLs, and failure classification live here. The engine only sees a
//! [`migration::TransferOutcome`].

mod git;
pub mod mirror;

pub use mirror::{GitMirrorTransfer, DEFAULT_GIT_HOST};
