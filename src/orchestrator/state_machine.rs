//! Pod provisioning state machine (spec §4.3 "Provisioning state machine").

use crate::error::{CoreError, CoreResult};
use crate::model::PodStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BeginProvision,
    StepFailed,
    AllStepsOk,
    Stop,
    Start,
    Delete,
    Retry,
    /// Internal: tear down and re-provision a pod's container in place
    /// (`Rebuild`, spec §4.3 public operations). Valid from any state except
    /// `deleting`, since the pod keeps its identity and volumes.
    Rebuild,
}

/// Validates (and resolves) a transition per the spec's table. Returns the
/// resulting status, or a `Conflict`/`Invariant` error if the transition is
/// not allowed from `from`.
pub fn transition(from: PodStatus, event: Event) -> CoreResult<PodStatus> {
    use Event::*;
    use PodStatus::*;

    match (from, event) {
        (Creating, BeginProvision) => Ok(Provisioning),
        (Provisioning, StepFailed) => Ok(Error),
        (Provisioning, AllStepsOk) => Ok(Running),
        (Running, Stop) => Ok(Stopping),
        (Stopped, Start) => Ok(Provisioning),
        (Error, Retry) => Ok(Provisioning),
        (_, Delete) => Ok(Deleting),
        (Deleting, Rebuild) => Err(CoreError::Conflict("cannot rebuild a pod that is being deleted".into())),
        (_, Rebuild) => Ok(Provisioning),
        (from, event) => Err(CoreError::Conflict(format!(
            "event {event:?} is not valid from pod status {from:?}"
        ))),
    }
}

/// `Stopping` settles into `Stopped` once the container has actually
/// stopped; this is a side-effect-only completion, not an event a caller
/// issues (spec §4.3 "running → Stop → stopping→stopped").
pub fn stopping_complete() -> PodStatus {
    PodStatus::Stopped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_provision_then_run() {
        assert_eq!(transition(PodStatus::Creating, Event::BeginProvision).unwrap(), PodStatus::Provisioning);
        assert_eq!(transition(PodStatus::Provisioning, Event::AllStepsOk).unwrap(), PodStatus::Running);
    }

    #[test]
    fn retry_resumes_from_error_into_provisioning() {
        assert_eq!(transition(PodStatus::Error, Event::Retry).unwrap(), PodStatus::Provisioning);
    }

    #[test]
    fn delete_is_allowed_from_any_state() {
        for status in [PodStatus::Creating, PodStatus::Provisioning, PodStatus::Running, PodStatus::Stopped, PodStatus::Error] {
            assert_eq!(transition(status, Event::Delete).unwrap(), PodStatus::Deleting);
        }
    }

    #[test]
    fn start_is_rejected_unless_stopped() {
        assert!(transition(PodStatus::Running, Event::Start).is_err());
        assert!(transition(PodStatus::Stopped, Event::Start).is_ok());
    }

    #[test]
    fn stop_requires_running() {
        assert!(transition(PodStatus::Creating, Event::Stop).is_err());
        assert!(transition(PodStatus::Running, Event::Stop).is_ok());
    }
}
