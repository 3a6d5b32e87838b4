//! Failure classification over a complete outcome list.
//!
//! A stage that dies of a broken pipe because something downstream quit is
//! a symptom, not a cause. Classification separates those collateral
//! outcomes from real faults and picks the fault to report first.

use crate::core::{ExitClass, StageRole};
use crate::stages::StageOutcome;
use serde::{Deserialize, Serialize};

/// Verdict over one run's outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureClassification {
    /// True iff no outcome is a fault.
    pub success: bool,
    /// Stage index of the outcome to report first.
    pub primary_failure: Option<usize>,
    /// Stage indices of collateral outcomes, ascending.
    pub collateral: Vec<usize>,
    /// Stage indices of faults, ascending.
    pub faults: Vec<usize>,
}

impl FailureClassification {
    /// Marks collateral outcomes in place and clears the flag elsewhere.
    pub fn apply(&self, outcomes: &mut [StageOutcome]) {
        for outcome in outcomes.iter_mut() {
            outcome.collateral = self.collateral.binary_search(&outcome.stage_index).is_ok();
        }
    }
}

/// Classifies the outcomes of one run.
///
/// Outcomes must be in stage order. The verdict depends only on each
/// outcome's exit class and role, so classifying the same list twice gives
/// the same answer.
///
/// Rules, scanning from the last stage towards the producer:
/// - a broken pipe is collateral when some downstream data stage has a
///   fault, a cancellation when that fault is not itself a cancellation;
/// - any other non-success is a fault; only data-stage faults can make
///   upstream outcomes collateral;
/// - a stage that never started is collateral when any fault exists.
///
/// The primary failure is the lowest-index data-stage fault the orchestrator
/// did not induce itself (a cancellation or the overall deadline), falling
/// back to the lowest-index induced one. Monitor stages are never primary.
#[must_use]
pub fn classify(outcomes: &[StageOutcome]) -> FailureClassification {
    let mut collateral = Vec::new();
    let mut faults = Vec::new();
    let mut not_started = Vec::new();
    let mut downstream_fault = false;
    let mut downstream_cause = false;

    for outcome in outcomes.iter().rev() {
        let class = outcome.exit_class;
        if class.is_success() {
            continue;
        }
        let explained = match class {
            ExitClass::BrokenPipe => downstream_fault,
            ExitClass::Cancelled => downstream_cause,
            _ => false,
        };
        if class == ExitClass::NotStarted {
            not_started.push(outcome.stage_index);
        } else if explained {
            collateral.push(outcome.stage_index);
        } else {
            faults.push(outcome.stage_index);
            if outcome.role == StageRole::Data {
                downstream_fault = true;
                downstream_cause |= class != ExitClass::Cancelled;
            }
        }
    }

    if faults.is_empty() {
        faults.append(&mut not_started);
    } else {
        collateral.append(&mut not_started);
    }
    collateral.sort_unstable();
    faults.sort_unstable();

    let data_faults = || {
        faults
            .iter()
            .filter_map(|&index| outcomes.iter().find(|o| o.stage_index == index))
            .filter(|o| o.role == StageRole::Data)
    };
    let primary_failure = data_faults()
        .find(|o| !o.exit_class.is_induced())
        .or_else(|| data_faults().next())
        .map(|o| o.stage_index);

    FailureClassification {
        success: faults.is_empty(),
        primary_failure,
        collateral,
        faults,
    }
}
