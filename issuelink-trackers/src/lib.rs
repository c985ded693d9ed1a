//! Issue tracker integrations for reporting failed test executions.
//!
//! Every vendor implements [`IssueTracker`]; callers pick an implementation through the
//! [`TrackerRegistry`] using the tracker type from configuration.

pub mod adapters;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod tracker;

pub use error::{TrackerError, TrackerResult};
pub use registry::{TrackerConstructor, TrackerRegistry};
pub use rpc::{AuthMode, RpcConnection};
pub use tracker::{IssueTracker, TrackerServices};
