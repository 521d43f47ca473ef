//! Shared types for the weaver workflow automation platform.
//!
//! This crate holds the identifiers and the error handling foundation that
//! every other weaver crate builds on.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SubscriptionId, WorkflowId, WorkflowRunId};
