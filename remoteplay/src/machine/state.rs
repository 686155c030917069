//! Machine power state as reported by the provider.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Power state of the remote machine.
///
/// The provider is authoritative. Any copy held locally is a cache that can go
/// stale between polls and is only ever refreshed by polling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    #[default]
    Unknown,
    Off,
    Starting,
    Ready,
    Stopping,
    Error,
}

/// Color-coded severity shown next to a state label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Transitioning,
    Error,
}

impl MachineState {
    /// Map a free-form provider state string.
    ///
    /// Unrecognized values map to `Unknown` rather than failing.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" => MachineState::Off,
            "starting" | "provisioning" | "restarting" | "serviceready" | "upgrading" => {
                MachineState::Starting
            }
            "ready" => MachineState::Ready,
            "stopping" => MachineState::Stopping,
            "error" | "failed" => MachineState::Error,
            _ => MachineState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Unknown => "unknown",
            MachineState::Off => "off",
            MachineState::Starting => "starting",
            MachineState::Ready => "ready",
            MachineState::Stopping => "stopping",
            MachineState::Error => "error",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            MachineState::Off | MachineState::Ready => Severity::Normal,
            MachineState::Starting | MachineState::Stopping => Severity::Transitioning,
            MachineState::Unknown | MachineState::Error => Severity::Error,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_states_map() {
        assert_eq!(MachineState::from_provider("off"), MachineState::Off);
        assert_eq!(MachineState::from_provider("ready"), MachineState::Ready);
        assert_eq!(MachineState::from_provider("Starting"), MachineState::Starting);
        assert_eq!(MachineState::from_provider("restarting"), MachineState::Starting);
        assert_eq!(MachineState::from_provider("stopping"), MachineState::Stopping);
    }

    #[test]
    fn test_unrecognized_state_is_unknown() {
        assert_eq!(MachineState::from_provider("hibernating"), MachineState::Unknown);
        assert_eq!(MachineState::from_provider(""), MachineState::Unknown);
    }

    #[test]
    fn test_display_round_trips_known_labels() {
        for state in [
            MachineState::Off,
            MachineState::Starting,
            MachineState::Ready,
            MachineState::Stopping,
        ] {
            assert_eq!(MachineState::from_provider(&state.to_string()), state);
        }
    }

    #[test]
    fn test_severity() {
        assert_eq!(MachineState::Ready.severity(), Severity::Normal);
        assert_eq!(MachineState::Stopping.severity(), Severity::Transitioning);
        assert_eq!(MachineState::Unknown.severity(), Severity::Error);
    }
}
