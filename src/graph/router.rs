//! Pure routing functions for the conditional edges of the phase graph.
//!
//! Both routers take the full state and nothing else, so they can be tested
//! without an engine or a store.

use serde::{Deserialize, Serialize};

use crate::state::{WorkflowPhase, WorkflowState};

/// Where a routing decision leads: another phase, or the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Next {
    Phase(WorkflowPhase),
    End,
}

/// Check whether the approval gate is open.
///
/// The gate is closed exactly when approval is required and not yet granted.
/// `hitl_approved` is only meaningful as `true` when approval is required or
/// was never requested; both cases leave the gate open.
pub fn approval_gate_open(state: &WorkflowState) -> bool {
    !(state.hitl_required && !state.hitl_approved)
}

/// Approval gate router: the conditional edge out of generate and the
/// self-loop out of approval.
///
/// Returns `Approval` while the gate is closed, `Setup` once it opens.
pub fn approval_route(state: &WorkflowState) -> WorkflowPhase {
    if approval_gate_open(state) {
        WorkflowPhase::Setup
    } else {
        WorkflowPhase::Approval
    }
}

/// Terminal router: the conditional edge out of verify, and the rule that
/// recorded errors preempt every other route.
///
/// Returns the error phase when any error is recorded, `End` when the run
/// has completed, and the current phase unchanged otherwise.
pub fn terminal_route(state: &WorkflowState) -> Next {
    if state.has_errors() {
        return Next::Phase(WorkflowPhase::Error);
    }
    if state.current_phase == WorkflowPhase::Complete {
        return Next::End;
    }
    Next::Phase(state.current_phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::state::StateUpdate;

    fn state() -> WorkflowState {
        WorkflowState::new(&RunConfig::new("/repo", "o1", "p1"))
    }

    #[test]
    fn test_gate_closed_when_required_and_unapproved() {
        let mut s = state();
        s.hitl_required = true;
        s.hitl_approved = false;
        assert!(!approval_gate_open(&s));
        assert_eq!(approval_route(&s), WorkflowPhase::Approval);
    }

    #[test]
    fn test_gate_open_when_approved() {
        let mut s = state();
        s.hitl_required = true;
        s.hitl_approved = true;
        assert!(approval_gate_open(&s));
        assert_eq!(approval_route(&s), WorkflowPhase::Setup);
    }

    #[test]
    fn test_gate_open_when_not_required() {
        let mut s = state();
        s.hitl_required = false;
        s.hitl_approved = false;
        assert!(approval_gate_open(&s));
        assert_eq!(approval_route(&s), WorkflowPhase::Setup);
    }

    #[test]
    fn test_approval_route_is_idempotent_and_field_independent() {
        let mut s = state();
        s.hitl_required = true;
        s.hitl_approved = false;

        // Unrelated fields do not affect the decision
        for phase in [
            WorkflowPhase::Generate,
            WorkflowPhase::Approval,
            WorkflowPhase::Setup,
        ] {
            s.current_phase = phase;
            s.apply(StateUpdate::new().with_message("noise"));
            for _ in 0..3 {
                assert_eq!(approval_route(&s), WorkflowPhase::Approval);
            }
        }
    }

    #[test]
    fn test_terminal_route_prefers_errors() {
        let mut s = state();
        s.current_phase = WorkflowPhase::Setup;
        s.apply(StateUpdate::new().with_error("disk full"));
        // Errors win even though the handler never changed the phase
        assert_eq!(terminal_route(&s), Next::Phase(WorkflowPhase::Error));
    }

    #[test]
    fn test_terminal_route_errors_beat_complete() {
        let mut s = state();
        s.current_phase = WorkflowPhase::Complete;
        s.apply(StateUpdate::new().with_error("late failure"));
        assert_eq!(terminal_route(&s), Next::Phase(WorkflowPhase::Error));
    }

    #[test]
    fn test_terminal_route_complete_ends() {
        let mut s = state();
        s.current_phase = WorkflowPhase::Complete;
        assert_eq!(terminal_route(&s), Next::End);
    }

    #[test]
    fn test_terminal_route_passes_through_otherwise() {
        let mut s = state();
        s.current_phase = WorkflowPhase::Verify;
        assert_eq!(terminal_route(&s), Next::Phase(WorkflowPhase::Verify));
    }
}
