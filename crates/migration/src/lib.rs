//! Domain model for migrating an organization's repositories between accounts.
//!
//! This crate contains every domain concept, newtype identifier, value type,
//! error type, and port trait used by the migration engine. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`OrganizationName`, `IssueNumber`, etc.) |
//! | [`types`] | Remote descriptors, comment payload variant, transfer outcome |
//! | [`checkpoint`] | Checkpoint document model and legacy upgrade |
//! | [`attribution`] | Replayed issue/comment/placeholder body text |
//! | [`settings`] | Run settings and validation |
//! | [`ports`] | `RemoteClient`, `ContentTransfer`, `ProgressStore` traits |
//! | [`errors`] | Error and retry-policy types |

pub mod attribution;
pub mod checkpoint;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod settings;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use checkpoint::{CheckpointDocument, DocumentHealth, IssueRecord, RepositoryRecord};
pub use errors::{CheckpointError, MigrationError, RemoteError, RetryPolicy};
pub use identifiers::{IssueNumber, MigrationRunId, OrganizationName, RepositoryName};
pub use ports::{ContentTransfer, ProgressStore, RemoteClient};
pub use settings::{MigrationSettings, RateLimits, DEFAULT_WRITES_PER_MINUTE};
pub use types::{
    CommentDescriptor, CreatedIssue, IssueComments, IssueDescriptor, IssueState,
    RepositoryDescriptor, RepositoryPath, Timestamp, TransferFailure, TransferOutcome,
};
