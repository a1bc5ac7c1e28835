//! Synchronization planning: the `all` / `any` / `m_of_n` strategies.

use weft_core::TokenId;
use weft_telemetry::TraceEvent;
use weft_workflow::{FanInPath, FanInStrategy, Synchronization, TimeoutPolicy, Transition};

use crate::planner::decision::{Decision, PlanOutcome};
use crate::planner::snapshot::PlanSnapshot;
use crate::status::TokenStatus;
use crate::token::Token;

/// Plan a successful sibling arrival at a fan-in point.
///
/// The subject's own success is not yet reflected in the snapshot (its
/// status is still `Executing`), so quorum arithmetic counts it
/// explicitly.
pub(crate) fn plan_arrival(
    subject: &Token,
    transition: &Transition,
    sync: &Synchronization,
    snapshot: &PlanSnapshot,
    out: &mut PlanOutcome,
) {
    let fan_in_path = FanInPath::new(&sync.sibling_group, &transition.to_node);

    if snapshot.is_activated(&fan_in_path) {
        // The fan-in already fired (quorum or timeout); this arrival is a
        // straggler and its token is superseded.
        out.decisions.push(Decision::UpdateStatus {
            token: subject.id,
            status: TokenStatus::Cancelled,
        });
        return;
    }

    let total = subject.branch_total;
    let succeeded = snapshot.succeeded_siblings().len() as u32 + 1;
    let failed = failed_count(snapshot);

    let activated = match sync.strategy {
        FanInStrategy::Any => {
            emit_activation(subject, snapshot, &fan_in_path, transition, vec![subject.id], out);
            true
        }
        FanInStrategy::All => {
            if succeeded >= total {
                let merged = merged_with_subject(subject, snapshot);
                emit_activation(subject, snapshot, &fan_in_path, transition, merged, out);
                true
            } else if failed > 0 {
                // A failed sibling makes the full quorum unreachable.
                out.decisions.push(Decision::UpdateStatus {
                    token: subject.id,
                    status: TokenStatus::Completed,
                });
                out.decisions.push(Decision::FailWorkflow {
                    reason: format!(
                        "fan-in {fan_in_path}: {failed} sibling(s) failed, all-quorum unreachable"
                    ),
                });
                false
            } else {
                mark_waiting(subject.id, &fan_in_path, sync, out);
                false
            }
        }
        FanInStrategy::MOfN(m) => {
            if succeeded >= m {
                let merged = merged_with_subject(subject, snapshot);
                emit_activation(subject, snapshot, &fan_in_path, transition, merged, out);
                true
            } else if total.saturating_sub(failed) < m {
                out.decisions.push(Decision::UpdateStatus {
                    token: subject.id,
                    status: TokenStatus::Completed,
                });
                out.decisions.push(Decision::FailWorkflow {
                    reason: format!("fan-in {fan_in_path}: quorum {m} of {total} unreachable"),
                });
                false
            } else {
                mark_waiting(subject.id, &fan_in_path, sync, out);
                false
            }
        }
    };

    out.trace.push(TraceEvent::SyncChecked {
        fan_in_path: fan_in_path.as_str().to_owned(),
        succeeded,
        failed,
        total,
        activated,
    });
}

/// Plan a sibling failure's effect on its group's fan-in.
///
/// The subject's terminal status decision has already been emitted by the
/// caller; this only decides whether the quorum is now unreachable.
pub(crate) fn plan_group_failure(
    subject: &Token,
    transition: &Transition,
    sync: &Synchronization,
    snapshot: &PlanSnapshot,
    out: &mut PlanOutcome,
) {
    let fan_in_path = FanInPath::new(&sync.sibling_group, &transition.to_node);
    if snapshot.is_activated(&fan_in_path) {
        return;
    }

    let total = subject.branch_total;
    let succeeded = snapshot.succeeded_siblings().len() as u32;
    let failed = failed_count(snapshot) + 1;

    let unreachable = match sync.strategy {
        FanInStrategy::All => true,
        FanInStrategy::Any => failed >= total,
        FanInStrategy::MOfN(m) => total.saturating_sub(failed) < m,
    };
    if unreachable {
        out.decisions.push(Decision::FailWorkflow {
            reason: format!(
                "fan-in {fan_in_path}: sibling {} failed, quorum unreachable",
                subject.id
            ),
        });
    }

    out.trace.push(TraceEvent::SyncChecked {
        fan_in_path: fan_in_path.as_str().to_owned(),
        succeeded,
        failed,
        total,
        activated: false,
    });
}

/// Plan a fan-in deadline expiry.
pub(crate) fn plan_timeout(
    transition: &Transition,
    sync: &Synchronization,
    fan_in_path: &FanInPath,
    snapshot: &PlanSnapshot,
    out: &mut PlanOutcome,
) {
    if snapshot.is_activated(fan_in_path) {
        // The quorum arrived while the timeout message sat in the queue.
        return;
    }

    // No subject token for a timeout; the sentinel id 0 never matches a
    // live sibling.
    let nobody = TokenId::default();
    let waiting = snapshot.waiting_siblings(nobody);
    let in_flight = snapshot.in_flight_siblings(nobody);
    let total = snapshot.siblings.len() as u32;

    match sync.on_timeout {
        TimeoutPolicy::Fail => {
            out.decisions.push(Decision::FailWorkflow {
                reason: format!("fan-in {fan_in_path}: synchronization timed out"),
            });
        }
        TimeoutPolicy::ProceedWithAvailable => {
            let mut available = waiting.clone();
            available.sort_by_key(|s| s.branch_index);
            if available.is_empty() {
                out.decisions.push(Decision::FailWorkflow {
                    reason: format!(
                        "fan-in {fan_in_path}: timed out with no completed siblings"
                    ),
                });
            } else {
                for sibling in &waiting {
                    out.decisions.push(Decision::UpdateStatus {
                        token: sibling.token,
                        status: TokenStatus::Completed,
                    });
                }
                for sibling in &in_flight {
                    out.decisions.push(Decision::UpdateStatus {
                        token: sibling.token,
                        status: TokenStatus::TimedOut,
                    });
                }
                out.decisions.push(Decision::ActivateFanIn {
                    fan_in_path: fan_in_path.clone(),
                    sibling_group: sync.sibling_group.clone(),
                    target: transition.to_node.clone(),
                    merged: available.iter().map(|s| s.token).collect(),
                    winner: None,
                });
            }
        }
    }

    out.trace.push(TraceEvent::SyncChecked {
        fan_in_path: fan_in_path.as_str().to_owned(),
        succeeded: waiting.len() as u32,
        failed: failed_count(snapshot),
        total,
        activated: sync.on_timeout == TimeoutPolicy::ProceedWithAvailable,
    });
}

/// Emit the decision sequence for a won activation: settle the subject,
/// release parked siblings, cancel in-flight ones, then activate.
fn emit_activation(
    subject: &Token,
    snapshot: &PlanSnapshot,
    fan_in_path: &FanInPath,
    transition: &Transition,
    merged: Vec<TokenId>,
    out: &mut PlanOutcome,
) {
    out.decisions.push(Decision::UpdateStatus {
        token: subject.id,
        status: TokenStatus::Completed,
    });
    for sibling in snapshot.waiting_siblings(subject.id) {
        out.decisions.push(Decision::UpdateStatus {
            token: sibling.token,
            status: TokenStatus::Completed,
        });
    }
    for sibling in snapshot.in_flight_siblings(subject.id) {
        out.decisions.push(Decision::UpdateStatus {
            token: sibling.token,
            status: TokenStatus::Cancelled,
        });
    }
    out.decisions.push(Decision::ActivateFanIn {
        fan_in_path: fan_in_path.clone(),
        sibling_group: transition
            .synchronization
            .as_ref()
            .map(|s| s.sibling_group.clone())
            .unwrap_or_else(|| transition.transition_ref.clone()),
        target: transition.to_node.clone(),
        merged,
        winner: Some(subject.id),
    });
}

/// The successful contributors including the subject, in `branch_index`
/// order.
fn merged_with_subject(subject: &Token, snapshot: &PlanSnapshot) -> Vec<TokenId> {
    let mut members: Vec<(u32, TokenId)> = snapshot
        .succeeded_siblings()
        .iter()
        .map(|s| (s.branch_index, s.token))
        .collect();
    members.push((subject.branch_index, subject.id));
    members.sort_by_key(|&(index, _)| index);
    members.dedup_by_key(|&mut (_, token)| token);
    members.into_iter().map(|(_, token)| token).collect()
}

fn mark_waiting(
    token: TokenId,
    fan_in_path: &FanInPath,
    sync: &Synchronization,
    out: &mut PlanOutcome,
) {
    out.decisions.push(Decision::MarkWaiting {
        token,
        fan_in_path: fan_in_path.clone(),
        timeout: sync.timeout,
    });
}

fn failed_count(snapshot: &PlanSnapshot) -> u32 {
    snapshot
        .siblings
        .iter()
        .filter(|s| {
            matches!(
                s.status,
                TokenStatus::Failed | TokenStatus::TimedOut | TokenStatus::Cancelled
            )
        })
        .count() as u32
}
