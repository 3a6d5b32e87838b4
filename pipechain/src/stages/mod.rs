//! Stage descriptors and outcomes.
//!
//! A stage is one external process in a pipeline. Its descriptor says what to
//! run; its outcome says how the run ended.

mod outcome;

pub use outcome::StageOutcome;

use crate::core::{DiagnosticsPolicy, StageRole};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Immutable description of one pipeline step.
///
/// Executable resolution is deferred to launch time: a descriptor naming a
/// program that does not exist is valid, and produces a
/// [`ExitClass::SpawnFailure`](crate::core::ExitClass::SpawnFailure) outcome
/// when run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    executable: String,
    #[serde(default, alias = "args")]
    arguments: Vec<String>,
    #[serde(default)]
    role: StageRole,
    #[serde(default)]
    diagnostics: DiagnosticsPolicy,
}

impl StageDescriptor {
    /// Creates a data stage running `executable` with no arguments.
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            name: None,
            executable: executable.into(),
            arguments: Vec::new(),
            role: StageRole::Data,
            diagnostics: DiagnosticsPolicy::Capture,
        }
    }

    /// Creates a monitor stage (byte-for-byte pass-through observer).
    #[must_use]
    pub fn monitor(executable: impl Into<String>) -> Self {
        Self::new(executable).with_role(StageRole::Monitor)
    }

    /// Sets a human-readable name used in logs and results.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the stage role.
    #[must_use]
    pub fn with_role(mut self, role: StageRole) -> Self {
        self.role = role;
        self
    }

    /// Sets where the diagnostic stream goes.
    #[must_use]
    pub fn with_diagnostics(mut self, policy: DiagnosticsPolicy) -> Self {
        self.diagnostics = policy;
        self
    }

    /// Returns the display name: the explicit name, or the executable's file name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self.name {
            Some(ref name) => name,
            None => Path::new(&self.executable)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&self.executable),
        }
    }

    /// Returns the executable path or name.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Returns the argument list.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Returns the stage role.
    #[must_use]
    pub fn role(&self) -> StageRole {
        self.role
    }

    /// Returns the diagnostics policy.
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsPolicy {
        self.diagnostics
    }

    /// Returns true if diagnostics are captured into the outcome.
    #[must_use]
    pub fn capture_diagnostics(&self) -> bool {
        self.diagnostics.captures()
    }

    /// Renders the command as it would be typed in a shell.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .map(quote_word)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Validates the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable is empty or contains a NUL byte.
    pub fn validate(&self, index: usize) -> Result<(), ConfigurationError> {
        if self.executable.trim().is_empty() {
            return Err(ConfigurationError::invalid_stage(index, "executable is empty"));
        }
        if self.executable.contains('\0') || self.arguments.iter().any(|a| a.contains('\0')) {
            return Err(ConfigurationError::invalid_stage(
                index,
                "executable and arguments cannot contain NUL bytes",
            ));
        }
        Ok(())
    }
}

fn quote_word(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
