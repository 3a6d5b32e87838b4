//! Structured cancellation utilities.
//!
//! This module provides:
//! - CancellationToken carrying a typed [`CancelReason`]
//! - OrderedTaskGroup for joining supervisor tasks in stage order

mod task_group;
mod token;

pub use task_group::OrderedTaskGroup;
pub use token::{CancelReason, CancellationToken};
