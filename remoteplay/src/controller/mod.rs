//! Lifecycle controller: the single owner of cached machine state and the
//! two process supervisors.
//!
//! The controller is driven from one task. Transitions run on a
//! `TransitionWorker` task and report back through `WorkerEvent`s; a periodic
//! `reconcile()` re-polls the provider so changes made outside this program
//! (console, scheduled shutdown) still drive the tunnel.

mod snapshot;

pub use snapshot::{ControlState, ControllerSnapshot};

use crate::machine::{Machine, MachineState};
use crate::provider::MachineProvider;
use crate::runtime::RemoteplayOptions;
use crate::supervisor::{ServiceState, ServiceSupervisor, TunnelState, TunnelSupervisor};
use crate::transition::{
    TransitionAction, TransitionHandle, TransitionOutcome, TransitionWorker, WorkerEvent,
};
use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Result of `request_transition`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionDecision {
    /// A worker was spawned.
    Spawned,
    /// The machine is already at the requested target.
    AlreadyInState,
    /// Another transition is still outstanding.
    Busy,
    /// The action does not apply from the current state.
    Rejected(MachineState),
}

impl TransitionDecision {
    /// Turn a rejection into an `InvalidState` error. Other decisions pass through.
    pub fn check(self, action: TransitionAction) -> RemoteplayResult<Self> {
        match self {
            TransitionDecision::Rejected(state) => Err(RemoteplayError::InvalidState(format!(
                "cannot {} while machine is {}",
                action, state
            ))),
            other => Ok(other),
        }
    }
}

/// Commands accepted by a running controller.
#[derive(Debug)]
pub enum ControllerCommand {
    Transition {
        action: TransitionAction,
        reply: oneshot::Sender<TransitionDecision>,
    },
    Shutdown,
}

/// Cloneable handle to a controller running on its own task.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControllerCommand>,
    snapshots: watch::Receiver<ControllerSnapshot>,
}

impl ControllerHandle {
    /// Ask the controller to start or stop the machine.
    pub async fn transition(&self, action: TransitionAction) -> RemoteplayResult<TransitionDecision> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ControllerCommand::Transition { action, reply })
            .await
            .map_err(|_| RemoteplayError::Internal("controller is not running".into()))?;
        rx.await
            .map_err(|_| RemoteplayError::Internal("controller dropped transition request".into()))
    }

    /// Request `action` once no transition is outstanding.
    ///
    /// Fails with `TimedOut` if the pending transition has not finished
    /// within `wait`.
    pub async fn transition_when_idle(
        &self,
        action: TransitionAction,
        wait: Duration,
    ) -> RemoteplayResult<TransitionDecision> {
        let mut snapshots = self.snapshots.clone();
        match tokio::time::timeout(wait, snapshots.wait_for(|s| !s.transition_pending)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(RemoteplayError::Internal("controller is not running".into())),
            Err(_) => {
                return Err(RemoteplayError::TimedOut(format!(
                    "pending transition still running after {:?}",
                    wait
                )));
            }
        }
        self.transition(action).await
    }

    /// Stop the controller loop. Closes the tunnel and cancels any worker.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(ControllerCommand::Shutdown).await;
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshots.borrow().clone()
    }
}

pub struct LifecycleController {
    provider: Arc<dyn MachineProvider>,
    /// Identity fields are fixed; `machine.state` is unused after construction.
    machine: Machine,
    options: RemoteplayOptions,

    // ========================================================================
    // Owned exclusively by the controller task
    // ========================================================================
    /// Last state observed from the provider or a worker.
    state: MachineState,
    tunnel: TunnelSupervisor,
    service: ServiceSupervisor,
    worker: Option<TransitionHandle>,
    /// Consecutive failed reconcile polls.
    reconcile_failures: u32,

    snapshots: watch::Sender<ControllerSnapshot>,
}

impl LifecycleController {
    pub fn new(
        provider: Arc<dyn MachineProvider>,
        machine: Machine,
        tunnel: TunnelSupervisor,
        service: ServiceSupervisor,
        options: RemoteplayOptions,
    ) -> Self {
        let state = machine.state;
        let (snapshots, _) = watch::channel(ControllerSnapshot {
            machine_id: machine.id.clone(),
            machine_name: machine.name.clone(),
            hostname: None,
            public_address: machine.public_address.clone(),
            machine_state: state,
            severity: state.severity(),
            tunnel: TunnelState::Closed,
            service: ServiceState::Inactive,
            transition_pending: false,
            control: ControlState::derive(state, false),
        });

        let mut controller = Self {
            provider,
            machine,
            options,
            state,
            tunnel,
            service,
            worker: None,
            reconcile_failures: 0,
            snapshots,
        };
        controller.publish();
        controller
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Whether a transition worker is outstanding.
    pub fn is_busy(&self) -> bool {
        self.worker.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshots.subscribe()
    }

    /// Build a fresh snapshot. Polls both supervisors.
    pub fn snapshot(&mut self) -> ControllerSnapshot {
        ControllerSnapshot {
            machine_id: self.machine.id.clone(),
            machine_name: self.machine.name.clone(),
            hostname: self.tunnel.host(),
            public_address: self.machine.public_address.clone(),
            machine_state: self.state,
            severity: self.state.severity(),
            tunnel: self.tunnel.status(),
            service: self.service.status(),
            transition_pending: self.worker.is_some(),
            control: ControlState::derive(self.state, self.worker.is_some()),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    /// Poll once and open the tunnel if the machine is already ready.
    pub async fn initialize(&mut self) {
        match self.provider.get_state(&self.machine.id).await {
            Ok(state) => {
                tracing::info!(machine_id = %self.machine.id, state = %state, "Initial machine state");
                self.state = state;
            }
            Err(e) => {
                tracing::warn!(machine_id = %self.machine.id, error = %e, "Initial state poll failed");
            }
        }

        if self.state == MachineState::Ready {
            self.tunnel.start();
        }
        self.publish();
    }

    /// Start or stop the machine.
    ///
    /// At most one worker is outstanding. A request that is already satisfied
    /// or that does not apply to the cached state spawns nothing.
    pub fn request_transition(&mut self, action: TransitionAction) -> TransitionDecision {
        if self.worker.is_some() {
            tracing::debug!(action = %action, "Transition already in progress");
            return TransitionDecision::Busy;
        }

        if self.state == action.target() {
            tracing::debug!(action = %action, state = %self.state, "Machine already in requested state");
            return TransitionDecision::AlreadyInState;
        }

        let source = match action {
            TransitionAction::Start => MachineState::Off,
            TransitionAction::Stop => MachineState::Ready,
        };
        if self.state != source {
            tracing::warn!(action = %action, state = %self.state, "Transition not allowed from current state");
            return TransitionDecision::Rejected(self.state);
        }

        match action {
            TransitionAction::Start => self.service.start(),
            TransitionAction::Stop => self.tunnel.stop(),
        }

        tracing::info!(machine_id = %self.machine.id, action = %action, "Starting transition");
        self.worker = Some(TransitionWorker::spawn(
            Arc::clone(&self.provider),
            self.machine.id.clone(),
            action.into(),
            self.options.transition.clone(),
        ));
        self.state = action.transitional();
        self.publish();

        TransitionDecision::Spawned
    }

    /// Apply one event from the outstanding worker.
    pub fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(state) => {
                if state != self.state {
                    tracing::debug!(machine_id = %self.machine.id, state = %state, "Transition progress");
                    self.state = state;
                }
            }
            WorkerEvent::Finished(outcome) => {
                self.worker = None;
                match outcome {
                    TransitionOutcome::Reached(state) => {
                        self.state = state;
                        match state {
                            MachineState::Ready => self.tunnel.start(),
                            MachineState::Off => self.tunnel.stop(),
                            _ => {}
                        }
                    }
                    TransitionOutcome::TimedOut { last } => {
                        tracing::warn!(machine_id = %self.machine.id, last = %last, "Transition timed out");
                        self.state = MachineState::Error;
                    }
                    TransitionOutcome::Failed(reason) => {
                        tracing::error!(machine_id = %self.machine.id, reason = %reason, "Transition failed");
                        self.state = MachineState::Error;
                    }
                    TransitionOutcome::Cancelled => {
                        tracing::info!(machine_id = %self.machine.id, "Transition cancelled");
                    }
                }
            }
        }
        self.publish();
    }

    /// Apply every event the worker has queued so far.
    pub fn drain_events(&mut self) {
        loop {
            let Some(event) = self.worker.as_mut().and_then(|w| w.try_recv()) else {
                return;
            };
            self.handle_event(event);
        }
    }

    /// Wait for the next worker event. Never resolves while no worker is outstanding.
    async fn next_event(worker: &mut Option<TransitionHandle>) -> WorkerEvent {
        match worker {
            Some(handle) => handle.recv().await.unwrap_or_else(|| {
                WorkerEvent::Finished(TransitionOutcome::Failed(
                    "transition worker exited without reporting".into(),
                ))
            }),
            None => std::future::pending().await,
        }
    }

    /// Adopt an observed state. Opens the tunnel on entering `Ready`, closes
    /// it on any other change.
    fn observe(&mut self, state: MachineState) {
        if state == self.state {
            return;
        }
        tracing::info!(
            machine_id = %self.machine.id,
            from = %self.state,
            to = %state,
            "Machine state changed"
        );
        self.state = state;
        if state == MachineState::Ready {
            self.tunnel.start();
        } else {
            self.tunnel.stop();
        }
    }

    /// Cache-only update while a worker owns the transition.
    ///
    /// Only readings on the worker's path (transitional or target state) are
    /// taken; anything else is a stale read from before the request. Tunnel
    /// side effects wait for the worker's `Finished` event.
    fn observe_in_flight(&mut self, action: TransitionAction, state: MachineState) {
        if state == self.state {
            return;
        }
        if state != action.transitional() && state != action.target() {
            tracing::debug!(
                machine_id = %self.machine.id,
                action = %action,
                cached = %self.state,
                observed = %state,
                "Ignoring stale state during transition"
            );
            return;
        }
        tracing::debug!(machine_id = %self.machine.id, from = %self.state, to = %state, "Transition observed by reconcile");
        self.state = state;
    }

    /// Re-poll the provider and bring the supervisors in line with it.
    ///
    /// Provider failures are counted, not returned. While a worker is
    /// outstanding only the cache is touched.
    pub async fn reconcile(&mut self) {
        let in_flight = self.worker.as_ref().map(|w| w.request().action);

        match self.provider.get_state(&self.machine.id).await {
            Ok(state) => {
                self.reconcile_failures = 0;
                match in_flight {
                    Some(action) => self.observe_in_flight(action, state),
                    None => self.observe(state),
                }
            }
            Err(e) => {
                self.reconcile_failures += 1;
                tracing::warn!(
                    machine_id = %self.machine.id,
                    failures = self.reconcile_failures,
                    error = %e,
                    "Reconcile poll failed"
                );
                // An outstanding worker reports its own provider errors.
                if in_flight.is_none()
                    && self.reconcile_failures >= self.options.transition.error_threshold
                {
                    self.observe(MachineState::Error);
                }
            }
        }

        if in_flight.is_none()
            && self.state == MachineState::Ready
            && self.options.tunnel.restart_on_exit
            && self.tunnel.status() != TunnelState::Open
        {
            tracing::info!(machine_id = %self.machine.id, "Tunnel not open while machine ready, restarting");
            self.tunnel.start();
        }

        self.publish();
    }

    /// Cancel any outstanding worker and close the tunnel.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            tracing::info!(action = %worker.request().action, "Cancelling transition on shutdown");
            worker.cancel();
        }
        self.tunnel.stop();
        self.publish();
    }

    /// Move the controller onto its own task.
    pub fn spawn(self) -> (ControllerHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(16);
        let handle = ControllerHandle {
            commands,
            snapshots: self.subscribe(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Controller loop: commands, worker events and reconcile ticks.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ControllerCommand>) {
        self.initialize().await;

        let mut ticker = tokio::time::interval(self.options.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; initialize() already polled.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ControllerCommand::Transition { action, reply }) => {
                        let decision = self.request_transition(action);
                        let _ = reply.send(decision);
                    }
                    Some(ControllerCommand::Shutdown) | None => break,
                },
                event = Self::next_event(&mut self.worker) => self.handle_event(event),
                _ = ticker.tick() => self.reconcile().await,
            }
        }

        tracing::info!(machine_id = %self.machine.id, "Controller shutting down");
        self.shutdown();
    }
}
