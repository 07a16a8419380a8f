use uuid::Uuid;

use crate::evaluation::types::{
    AreaNode, ElementStatus, MergedElement, Progress, Readiness, ReadinessLevel,
};
use crate::storage::types::TaskFeedback;

/// Feedback percentage at or above which a student is checkride ready.
const READY_PERCENT: u32 = 85;
/// Feedback percentage at or above which a student is almost there.
const ALMOST_THERE_PERCENT: u32 = 70;

/// Completion counts over a merged hierarchy. Pure; counts the derived
/// element statuses and nothing else.
pub fn compute_progress(areas: &[AreaNode]) -> Progress {
    let mut completed = 0usize;
    let mut issues = 0usize;
    let mut total = 0usize;
    for element in flatten_elements(areas) {
        total += 1;
        match element.status {
            ElementStatus::Completed => completed += 1,
            ElementStatus::Issue => issues += 1,
            ElementStatus::InProgress => {}
        }
    }
    let percentage = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    };
    Progress {
        completed,
        total,
        issues,
        percentage,
    }
}

/// Classifies checkride preparedness from task-level feedback tags.
/// Excellent and proficient tasks count toward the percentage; the
/// thresholds are fixed design constants.
pub fn compute_readiness(feedback: &[TaskFeedback]) -> Readiness {
    let total = feedback.len();
    let strong = feedback
        .iter()
        .filter(|f| matches!(f, TaskFeedback::Excellent | TaskFeedback::Proficient))
        .count();
    let percent = if total == 0 {
        0
    } else {
        ((strong as f64 / total as f64) * 100.0).round() as u32
    };
    let level = if percent >= READY_PERCENT {
        ReadinessLevel::CheckrideReady
    } else if percent >= ALMOST_THERE_PERCENT {
        ReadinessLevel::AlmostThere
    } else {
        ReadinessLevel::NeedsReview
    };
    Readiness { percent, level }
}

/// Flattens the hierarchy into the navigation order: areas by order
/// number, tasks by order letter, elements by code. The input is already
/// sorted that way, so this is a plain walk and two calls over unchanged
/// data yield the same sequence.
pub fn flatten_elements(areas: &[AreaNode]) -> Vec<&MergedElement> {
    areas
        .iter()
        .flat_map(|area| area.tasks.iter())
        .flat_map(|task| task.elements.iter())
        .collect()
}

/// The element after `current` in navigation order.
pub fn next_element<'a>(areas: &'a [AreaNode], current: Uuid) -> Option<&'a MergedElement> {
    let flat = flatten_elements(areas);
    let index = flat.iter().position(|e| e.id == current)?;
    flat.get(index + 1).copied()
}

/// The element before `current` in navigation order.
pub fn previous_element<'a>(areas: &'a [AreaNode], current: Uuid) -> Option<&'a MergedElement> {
    let flat = flatten_elements(areas);
    let index = flat.iter().position(|e| e.id == current)?;
    index.checked_sub(1).and_then(|i| flat.get(i).copied())
}
