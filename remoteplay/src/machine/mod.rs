//! Remote machine identity and power state.
//!
//! - `state`: power state enum and its presentation helpers
//! - `types`: the `Machine` record returned by provider lookups

mod state;
mod types;

pub use state::{MachineState, Severity};
pub use types::{Machine, MachineId};
