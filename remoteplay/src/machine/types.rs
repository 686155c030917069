use super::MachineState;

/// Opaque provider-side machine identifier.
pub type MachineId = String;

/// A remote machine as returned by the provider.
///
/// Identity fields never change after lookup; `state` is refreshed by polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub public_address: Option<String>,
    pub state: MachineState,
}

impl Machine {
    /// Whether `key` names this machine by id or by name.
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.name == key
    }
}
