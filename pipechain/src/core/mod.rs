//! Core domain enums for pipechain.
//!
//! This module contains the small value types shared by every layer:
//! - Stage role and diagnostics policy
//! - Exit classification of a finished stage

mod status;

pub use status::{DiagnosticsPolicy, ExitClass, StageRole, TimeoutScope};
