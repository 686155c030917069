//! Remote machine provider boundary.
//!
//! The provider is consumed through the `MachineProvider` trait so the
//! lifecycle engine can be driven by the Paperspace REST client in production
//! and by scripted fakes in tests.

mod paperspace;

pub use paperspace::PaperspaceProvider;

use crate::machine::{Machine, MachineState};
use async_trait::async_trait;
use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};

/// Operations the lifecycle engine needs from a cloud machine provider.
///
/// None of these block until a target state is reached. Callers that need to
/// wait use the poll-until pattern in `transition`.
#[async_trait]
pub trait MachineProvider: Send + Sync {
    /// All machines visible with the current credentials.
    async fn list_machines(&self) -> RemoteplayResult<Vec<Machine>>;

    /// A single machine by id.
    async fn get_machine(&self, id: &str) -> RemoteplayResult<Machine>;

    /// Current power state of a machine.
    async fn get_state(&self, id: &str) -> RemoteplayResult<MachineState>;

    /// Ask the provider to power the machine on.
    async fn request_start(&self, id: &str) -> RemoteplayResult<()>;

    /// Ask the provider to power the machine off.
    async fn request_stop(&self, id: &str) -> RemoteplayResult<()>;
}

/// Look up a machine by id or name. First match wins.
pub async fn find_machine(
    provider: &dyn MachineProvider,
    id_or_name: &str,
) -> RemoteplayResult<Machine> {
    let machines = provider.list_machines().await?;
    tracing::debug!(count = machines.len(), key = %id_or_name, "Looking up machine");

    machines
        .into_iter()
        .find(|m| m.matches(id_or_name))
        .ok_or_else(|| RemoteplayError::MachineNotFound(id_or_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    fn two_machines() -> ScriptedProvider {
        ScriptedProvider::with_machines(vec![
            Machine {
                id: "pskwujgcp".into(),
                name: "Arcturus".into(),
                public_address: Some("74.82.29.115".into()),
                state: MachineState::Off,
            },
            Machine {
                id: "skwujgcpp".into(),
                name: "OtherServer".into(),
                public_address: None,
                state: MachineState::Off,
            },
        ])
    }

    #[tokio::test]
    async fn test_find_machine_by_name() {
        let provider = two_machines();
        let machine = find_machine(&provider, "OtherServer").await.unwrap();
        assert_eq!(machine.id, "skwujgcpp");
    }

    #[tokio::test]
    async fn test_find_machine_by_id() {
        let provider = two_machines();
        let machine = find_machine(&provider, "pskwujgcp").await.unwrap();
        assert_eq!(machine.name, "Arcturus");
        assert_eq!(machine.public_address.as_deref(), Some("74.82.29.115"));
    }

    #[tokio::test]
    async fn test_find_machine_unmatched() {
        let provider = two_machines();
        let err = find_machine(&provider, "Vega").await.unwrap_err();
        assert!(matches!(err, RemoteplayError::MachineNotFound(ref key) if key == "Vega"));
    }
}
