use crate::machine::MachineState;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionAction {
    Start,
    Stop,
}

impl TransitionAction {
    /// Stable state the action drives the machine to.
    pub fn target(&self) -> MachineState {
        match self {
            TransitionAction::Start => MachineState::Ready,
            TransitionAction::Stop => MachineState::Off,
        }
    }

    /// Intermediate state the machine is expected to pass through.
    pub fn transitional(&self) -> MachineState {
        match self {
            TransitionAction::Start => MachineState::Starting,
            TransitionAction::Stop => MachineState::Stopping,
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransitionAction::Start => "start",
            TransitionAction::Stop => "stop",
        })
    }
}

/// A requested change of machine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRequest {
    pub action: TransitionAction,
    pub target: MachineState,
}

impl From<TransitionAction> for TransitionRequest {
    fn from(action: TransitionAction) -> Self {
        Self {
            action,
            target: action.target(),
        }
    }
}

/// How a transition ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The provider reported the target state.
    Reached(MachineState),
    /// The deadline passed first. `last` is the last state observed.
    TimedOut { last: MachineState },
    /// The worker was cancelled.
    Cancelled,
    /// A non-retryable provider error (e.g. rejected credentials).
    Failed(String),
}

/// Message from a worker to its controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A state change observed while polling, in observation order.
    Progress(MachineState),
    /// Always the last event of a worker.
    Finished(TransitionOutcome),
}
