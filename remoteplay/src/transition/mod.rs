//! Machine state transitions.
//!
//! A transition drives the machine to `Ready` (start) or `Off` (stop) on a
//! background task and reports back over a channel:
//!
//! ```text
//! controller ──spawn──► TransitionWorker ──get_state/request──► provider
//!      ▲                       │
//!      └──── WorkerEvent ──────┘   Progress(state)* then Finished(outcome)
//! ```

mod types;
mod worker;

pub use types::{TransitionAction, TransitionOutcome, TransitionRequest, WorkerEvent};
pub use worker::{TransitionHandle, TransitionWorker};
