//! Background worker that drives one transition to completion.
//!
//! Algorithm:
//! 1. Poll the state. If already at target, report it once and finish without
//!    issuing the provider action.
//! 2. Otherwise issue the start/stop request once.
//! 3. Sleep, poll, report every state change, until the target is observed.
//!
//! Transient provider errors are retried with exponential backoff until the
//! optional deadline. Non-transient errors end the transition.

use super::types::{TransitionOutcome, TransitionRequest, WorkerEvent};
use crate::machine::{MachineId, MachineState};
use crate::provider::MachineProvider;
use crate::runtime::TransitionOptions;
use crate::transition::TransitionAction;
use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Provider action not issued yet.
    Initial,
    /// Provider action issued, waiting for target.
    Requested,
}

/// Controller-side handle to a running worker.
///
/// Dropping the handle cancels the worker.
pub struct TransitionHandle {
    request: TransitionRequest,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    cancel: watch::Sender<bool>,
}

impl TransitionHandle {
    pub fn request(&self) -> TransitionRequest {
        self.request
    }

    /// Ask the worker to stop at its next suspension point.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Next event, waiting if none is queued. `None` once the worker is gone.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<WorkerEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for TransitionHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

pub struct TransitionWorker {
    provider: Arc<dyn MachineProvider>,
    machine_id: MachineId,
    request: TransitionRequest,
    options: TransitionOptions,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: watch::Receiver<bool>,
}

impl TransitionWorker {
    /// Spawn a worker on the tokio runtime and return its handle.
    pub fn spawn(
        provider: Arc<dyn MachineProvider>,
        machine_id: MachineId,
        request: TransitionRequest,
        options: TransitionOptions,
    ) -> TransitionHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let worker = Self {
            provider,
            machine_id,
            request,
            options,
            events: events_tx,
            cancel: cancel_rx,
        };

        tracing::debug!(
            machine_id = %worker.machine_id,
            action = %request.action,
            target = %request.target,
            "Spawning transition worker"
        );

        tokio::spawn(worker.run());

        TransitionHandle {
            request,
            events: events_rx,
            cancel: cancel_tx,
        }
    }

    async fn run(mut self) {
        let outcome = self.drive().await;
        tracing::info!(
            machine_id = %self.machine_id,
            action = %self.request.action,
            outcome = ?outcome,
            "Transition finished"
        );
        let _ = self.events.send(WorkerEvent::Finished(outcome));
    }

    fn emit(&self, state: MachineState) {
        tracing::debug!(machine_id = %self.machine_id, state = %state, "Transition progress");
        let _ = self.events.send(WorkerEvent::Progress(state));
    }

    async fn issue_request(&self) -> RemoteplayResult<()> {
        match self.request.action {
            TransitionAction::Start => self.provider.request_start(&self.machine_id).await,
            TransitionAction::Stop => self.provider.request_stop(&self.machine_id).await,
        }
    }

    /// Delay before the next poll, doubling per consecutive failure.
    fn next_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.options.poll_interval;
        }
        let factor = 1u32 << (failures - 1).min(16);
        self.options
            .poll_interval
            .saturating_mul(factor)
            .min(self.options.max_backoff.max(self.options.poll_interval))
    }

    /// Count a failure. Returns an outcome if the error is not retryable.
    fn record_failure(
        &self,
        error: &RemoteplayError,
        failures: u32,
        last: &mut Option<MachineState>,
    ) -> Option<TransitionOutcome> {
        if !error.is_transient() {
            tracing::error!(machine_id = %self.machine_id, error = %error, "Transition aborted");
            return Some(TransitionOutcome::Failed(error.to_string()));
        }

        tracing::warn!(
            machine_id = %self.machine_id,
            failures,
            error = %error,
            "Provider error during transition, retrying"
        );

        if failures >= self.options.error_threshold && *last != Some(MachineState::Error) {
            self.emit(MachineState::Error);
            *last = Some(MachineState::Error);
        }
        None
    }

    /// Sleep for `delay`, bounded by the deadline. Returns an outcome if the
    /// worker must stop.
    async fn wait(
        &mut self,
        delay: Duration,
        deadline: Option<Instant>,
        last: Option<MachineState>,
    ) -> Option<TransitionOutcome> {
        let timed_out = || TransitionOutcome::TimedOut {
            last: last.unwrap_or_default(),
        };

        let sleep_for = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Some(timed_out());
                }
                delay.min(deadline - now)
            }
            None => delay,
        };

        tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => return Some(TransitionOutcome::Cancelled),
            _ = tokio::time::sleep(sleep_for) => {}
        }

        match deadline {
            Some(deadline) if Instant::now() >= deadline => Some(timed_out()),
            _ => None,
        }
    }

    async fn drive(&mut self) -> TransitionOutcome {
        let target = self.request.target;
        let deadline = self.options.timeout.map(|t| Instant::now() + t);

        let mut phase = Phase::Initial;
        let mut last: Option<MachineState> = None;
        let mut failures: u32 = 0;

        loop {
            if *self.cancel.borrow() {
                return TransitionOutcome::Cancelled;
            }

            match self.provider.get_state(&self.machine_id).await {
                Ok(state) => {
                    failures = 0;
                    match phase {
                        Phase::Initial if state == target => {
                            // Already there: report once, do not re-issue the action.
                            self.emit(target);
                            return TransitionOutcome::Reached(target);
                        }
                        Phase::Initial => {
                            last = Some(state);
                            match self.issue_request().await {
                                Ok(()) => phase = Phase::Requested,
                                Err(e) => {
                                    failures += 1;
                                    if let Some(outcome) = self.record_failure(&e, failures, &mut last)
                                    {
                                        return outcome;
                                    }
                                }
                            }
                        }
                        Phase::Requested => {
                            if last != Some(state) {
                                self.emit(state);
                                last = Some(state);
                            }
                            if state == target {
                                return TransitionOutcome::Reached(target);
                            }
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    if let Some(outcome) = self.record_failure(&e, failures, &mut last) {
                        return outcome;
                    }
                }
            }

            let delay = self.next_delay(failures);
            if let Some(outcome) = self.wait(delay, deadline, last).await {
                return outcome;
            }
        }
    }
}

/// Resolves once cancellation is requested or the handle is dropped.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
