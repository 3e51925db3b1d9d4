use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phases of one dispatch attempt.
///
/// `Idle → Guarded → Provisioned → { Calling → Active | CallFailed }
/// | ProvisionFailed`. `Active` and both failure phases return to `Idle`
/// through an explicit stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchPhase {
    Idle,
    Guarded,
    Provisioned,
    Calling,
    Active,
    CallFailed,
    ProvisionFailed,
}

impl DispatchPhase {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::CallFailed | Self::ProvisionFailed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEvent {
    GuardAcquired,
    AgentProvisioned,
    ProvisioningFailed,
    CallPlaced,
    CallBridged,
    CallRejected,
    Stopped,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchTransitionError {
    #[error("invalid dispatch transition from {phase:?} on {event:?}")]
    InvalidTransition { phase: DispatchPhase, event: DispatchEvent },
}

/// Apply one event to a dispatch attempt, rejecting transitions the attempt
/// state machine does not define.
pub fn transition(
    phase: DispatchPhase,
    event: DispatchEvent,
) -> Result<DispatchPhase, DispatchTransitionError> {
    use DispatchEvent::{
        AgentProvisioned, CallBridged, CallPlaced, CallRejected, GuardAcquired,
        ProvisioningFailed, Stopped,
    };
    use DispatchPhase::{
        Active, CallFailed, Calling, Guarded, Idle, ProvisionFailed, Provisioned,
    };

    let next = match (phase, event) {
        (Idle, GuardAcquired) => Guarded,
        (Guarded, AgentProvisioned) => Provisioned,
        (Guarded, ProvisioningFailed) => ProvisionFailed,
        (Provisioned, CallPlaced) => Calling,
        (Calling, CallBridged) => Active,
        (Calling, CallRejected) => CallFailed,
        (Active | CallFailed | ProvisionFailed, Stopped) => Idle,
        (phase, event) => {
            return Err(DispatchTransitionError::InvalidTransition { phase, event });
        }
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::{transition, DispatchEvent, DispatchPhase, DispatchTransitionError};

    fn run(events: &[DispatchEvent]) -> Result<DispatchPhase, DispatchTransitionError> {
        events
            .iter()
            .try_fold(DispatchPhase::Idle, |phase, event| transition(phase, *event))
    }

    #[test]
    fn successful_dispatch_reaches_active() {
        let phase = run(&[
            DispatchEvent::GuardAcquired,
            DispatchEvent::AgentProvisioned,
            DispatchEvent::CallPlaced,
            DispatchEvent::CallBridged,
        ])
        .expect("happy path should be accepted");

        assert_eq!(phase, DispatchPhase::Active);
        assert!(!phase.is_failure());
    }

    #[test]
    fn provisioning_failure_terminates_before_any_call() {
        let phase = run(&[DispatchEvent::GuardAcquired, DispatchEvent::ProvisioningFailed])
            .expect("provisioning failure is a defined transition");

        assert_eq!(phase, DispatchPhase::ProvisionFailed);
        assert!(phase.is_failure());
    }

    #[test]
    fn rejected_call_lands_in_call_failed() {
        let phase = run(&[
            DispatchEvent::GuardAcquired,
            DispatchEvent::AgentProvisioned,
            DispatchEvent::CallPlaced,
            DispatchEvent::CallRejected,
        ])
        .expect("call rejection is a defined transition");

        assert_eq!(phase, DispatchPhase::CallFailed);
    }

    #[test]
    fn stop_returns_terminal_phases_to_idle() {
        for terminal in [
            DispatchPhase::Active,
            DispatchPhase::CallFailed,
            DispatchPhase::ProvisionFailed,
        ] {
            let phase = transition(terminal, DispatchEvent::Stopped)
                .expect("stop should be accepted from terminal phases");
            assert_eq!(phase, DispatchPhase::Idle);
        }
    }

    #[test]
    fn undefined_transitions_are_rejected() {
        let error = transition(DispatchPhase::Idle, DispatchEvent::CallPlaced)
            .expect_err("idle cannot place a call");

        assert_eq!(
            error,
            DispatchTransitionError::InvalidTransition {
                phase: DispatchPhase::Idle,
                event: DispatchEvent::CallPlaced,
            }
        );

        assert!(transition(DispatchPhase::Guarded, DispatchEvent::Stopped).is_err());
        assert!(transition(DispatchPhase::Calling, DispatchEvent::AgentProvisioned).is_err());
    }

    #[test]
    fn replay_is_deterministic_for_the_same_event_sequence() {
        let events = [
            DispatchEvent::GuardAcquired,
            DispatchEvent::AgentProvisioned,
            DispatchEvent::CallPlaced,
            DispatchEvent::CallBridged,
            DispatchEvent::Stopped,
        ];

        assert_eq!(run(&events), run(&events));
        assert_eq!(run(&events).expect("replay"), DispatchPhase::Idle);
    }
}
