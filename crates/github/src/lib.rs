//! GitHub REST infrastructure adapter.
//!
//! Implements the [`migration::RemoteClient`] port over the GitHub REST v3 API
//! using `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (authentication headers, pagination, wire formats,
//! transient-failure retry) are handled here; the engine never sees them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | `GitHubClient`: request execution, retry, pagination |
//! | `wire` | Serde wire types and their mapping to domain descriptors |

pub mod client;
mod wire;

pub use client::{ClientBuildError, GitHubClient, DEFAULT_API_URL};
