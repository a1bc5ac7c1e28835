//! The routing planner.
//!
//! A pure function from `(event, workflow definition, state snapshot)` to
//! an ordered decision batch. No store access, no clocks, no I/O -- which
//! is what makes the routing rules testable without any persistence and
//! keeps all mutation concentrated in the dispatcher.

pub mod decision;
pub mod snapshot;
mod sync;

pub use decision::{Decision, PlanEvent, PlanOutcome, TokenRef};
pub use snapshot::{PlanSnapshot, SiblingInfo, TransitionView};

use weft_telemetry::TraceEvent;
use weft_workflow::{SpawnMode, Transition, WorkflowDefinition};

use crate::error::CoordinatorError;
use crate::status::TokenStatus;
use crate::token::{ForeachBinding, Token, TokenSpec};

/// Compute the decision batch for one event.
pub fn plan(
    event: &PlanEvent,
    definition: &WorkflowDefinition,
    snapshot: &PlanSnapshot,
) -> Result<PlanOutcome, CoordinatorError> {
    let mut out = PlanOutcome::default();

    match event {
        PlanEvent::TokenCompleted { token } => {
            let subject = subject(snapshot, *token)?;
            plan_completed(subject, definition, snapshot, &mut out)?;
        }
        PlanEvent::TokenFailed {
            token,
            terminal,
            reason,
        } => {
            let subject = subject(snapshot, *token)?;
            plan_failed(subject, *terminal, reason, definition, snapshot, &mut out)?;
        }
        PlanEvent::FanInTimeout { fan_in_path } => {
            let (group, target) = fan_in_path.parts().ok_or_else(|| {
                CoordinatorError::Definition(format!("malformed fan-in path `{fan_in_path}`"))
            })?;
            let (transition, sync_decl) = definition
                .synchronization_for(&group, &target)
                .ok_or_else(|| {
                    CoordinatorError::Definition(format!(
                        "no synchronization declared for fan-in `{fan_in_path}`"
                    ))
                })?;
            sync::plan_timeout(transition, sync_decl, fan_in_path, snapshot, &mut out);
        }
    }

    out.trace.push(TraceEvent::DispatchBatch {
        token: snapshot.token.as_ref().map(|t| t.id),
        node: snapshot.token.as_ref().map(|t| t.node_ref.clone()),
        decisions: out.decisions.len(),
    });
    Ok(out)
}

fn subject(snapshot: &PlanSnapshot, token: weft_core::TokenId) -> Result<&Token, CoordinatorError> {
    match &snapshot.token {
        Some(t) if t.id == token => Ok(t),
        _ => Err(CoordinatorError::TokenNotFound(token)),
    }
}

/// Route a completed token: evaluate its outgoing transitions, spawn
/// downstream tokens, and run synchronization planning where its own node
/// feeds a fan-in.
fn plan_completed(
    token: &Token,
    definition: &WorkflowDefinition,
    snapshot: &PlanSnapshot,
    out: &mut PlanOutcome,
) -> Result<(), CoordinatorError> {
    for view in &snapshot.transitions {
        if view.has_condition {
            out.trace.push(TraceEvent::ConditionEvaluated {
                transition: view.transition_ref.clone(),
                matched: view.condition_matched,
            });
        }
    }

    let mut created = 0usize;
    let mut subject_settled = false;

    for view in snapshot.transitions.iter().filter(|v| v.condition_matched) {
        let transition = lookup(definition, view)?;

        // The completed token converging at a fan-in point: its own
        // sibling group must match the declaration, otherwise the fan-in
        // does not apply and the edge behaves like an ordinary one.
        if let Some(sync_decl) = &transition.synchronization {
            if token.in_group(&sync_decl.sibling_group) {
                sync::plan_arrival(token, transition, sync_decl, snapshot, out);
                subject_settled = true;
                continue;
            }
        }

        spawn_from_view(token, transition, view, &mut created, out);
    }

    // No synchronization decided the subject's fate: the action succeeded,
    // so the token completes (a sink if nothing matched).
    if !subject_settled {
        out.decisions.insert(
            0,
            Decision::UpdateStatus {
                token: token.id,
                status: TokenStatus::Completed,
            },
        );
    }
    Ok(())
}

/// Route a failed token: record its terminal status, follow explicit
/// failure-branch edges if any match, otherwise account the failure
/// against its fan-in quorum or escalate to workflow failure.
fn plan_failed(
    token: &Token,
    terminal: TokenStatus,
    reason: &str,
    definition: &WorkflowDefinition,
    snapshot: &PlanSnapshot,
    out: &mut PlanOutcome,
) -> Result<(), CoordinatorError> {
    out.decisions.push(Decision::UpdateStatus {
        token: token.id,
        status: terminal,
    });

    // Conditional edges whose guard matched are failure branches: routing
    // continues through them and the failure stays token-scoped.
    let mut created = 0usize;
    let mut branched = false;
    for view in &snapshot.transitions {
        if !view.has_condition {
            continue;
        }
        out.trace.push(TraceEvent::ConditionEvaluated {
            transition: view.transition_ref.clone(),
            matched: view.condition_matched,
        });
        if view.condition_matched {
            let transition = lookup(definition, view)?;
            spawn_from_view(token, transition, view, &mut created, out);
            branched = true;
        }
    }
    if branched {
        return Ok(());
    }

    if let Some(group) = &token.sibling_group {
        let sync_edge = definition
            .transitions_from(&token.node_ref)
            .into_iter()
            .find_map(|t| {
                t.synchronization
                    .as_ref()
                    .filter(|s| &s.sibling_group == group)
                    .map(|s| (t, s))
            });
        if let Some((transition, sync_decl)) = sync_edge {
            sync::plan_group_failure(token, transition, sync_decl, snapshot, out);
            return Ok(());
        }
    }

    out.decisions.push(Decision::FailWorkflow {
        reason: format!("token {} at node {}: {reason}", token.id, token.node_ref),
    });
    Ok(())
}

/// Emit `CreateToken` + `MarkForDispatch` pairs for one firing edge.
fn spawn_from_view(
    token: &Token,
    transition: &Transition,
    view: &TransitionView,
    created: &mut usize,
    out: &mut PlanOutcome,
) {
    if transition.is_fan_out() {
        out.trace.push(TraceEvent::SpawnComputed {
            transition: transition.transition_ref.clone(),
            count: view.spawn_count,
        });
    }
    // A foreach over an empty collection fires no work.
    if view.spawn_count == 0 {
        return;
    }

    let item_var = match &transition.spawn {
        SpawnMode::ForEach { item_var, .. } => Some(item_var.clone()),
        _ => None,
    };
    // Fan-out edges name a sibling group even when they resolve to a
    // single branch, so a later fan-in can still join the "group of one".
    let sibling_group = transition
        .is_fan_out()
        .then(|| transition.transition_ref.clone());

    for index in 0..view.spawn_count {
        let foreach_item = match (&item_var, &view.items) {
            (Some(var), Some(items)) => items.get(index as usize).map(|value| ForeachBinding {
                var: var.clone(),
                value: value.clone(),
            }),
            _ => None,
        };
        out.decisions.push(Decision::CreateToken(TokenSpec {
            node_ref: transition.to_node.clone(),
            parent: Some(token.id),
            path: token.path.child(&token.node_ref, index),
            sibling_group: sibling_group.clone(),
            branch_index: index,
            branch_total: view.spawn_count,
            foreach_item,
            spawned_by: Some(transition.transition_ref.clone()),
        }));
        out.decisions.push(Decision::MarkForDispatch(TokenRef::Created(*created)));
        *created += 1;
    }
}

fn lookup<'d>(
    definition: &'d WorkflowDefinition,
    view: &TransitionView,
) -> Result<&'d Transition, CoordinatorError> {
    definition.transition(&view.transition_ref).ok_or_else(|| {
        CoordinatorError::Definition(format!(
            "transition `{}` not in definition",
            view.transition_ref
        ))
    })
}
