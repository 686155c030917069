//! In-process fakes for the provider and process boundaries.

use crate::machine::{Machine, MachineState};
use crate::provider::MachineProvider;
use crate::supervisor::{LaunchSpec, ProcessHandle, ProcessLauncher, ProcessStatus, ProcessTable};
use async_trait::async_trait;
use parking_lot::Mutex;
use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted `get_state` answer.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Step {
    State(MachineState),
    /// Transient network failure.
    Fail,
    /// Credentials rejected.
    Reject,
}

/// Provider whose `get_state` answers come from a script.
///
/// Once the script runs dry the last returned state repeats.
pub(crate) struct ScriptedProvider {
    machines: Vec<Machine>,
    script: Mutex<VecDeque<Step>>,
    last: Mutex<MachineState>,
    on_start: Mutex<Option<Vec<Step>>>,
    on_stop: Mutex<Option<Vec<Step>>>,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(initial: MachineState) -> Self {
        Self {
            machines: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(initial),
            on_start: Mutex::new(None),
            on_stop: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_machines(machines: Vec<Machine>) -> Self {
        Self {
            machines,
            ..Self::new(MachineState::Unknown)
        }
    }

    /// Queue provider state strings, mapped the same way the REST client maps them.
    pub(crate) fn script_states(&self, raw: &[&str]) {
        self.script(raw.iter().map(|s| Step::State(MachineState::from_provider(s))));
    }

    pub(crate) fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().extend(steps);
    }

    /// Replace the script when a start request arrives.
    pub(crate) fn after_start(&self, raw: &[&str]) {
        *self.on_start.lock() = Some(
            raw.iter()
                .map(|s| Step::State(MachineState::from_provider(s)))
                .collect(),
        );
    }

    /// Replace the script when a stop request arrives.
    pub(crate) fn after_stop(&self, raw: &[&str]) {
        *self.on_stop.lock() = Some(
            raw.iter()
                .map(|s| Step::State(MachineState::from_provider(s)))
                .collect(),
        );
    }

    pub(crate) fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn replace_script(&self, steps: Option<Vec<Step>>) {
        if let Some(steps) = steps {
            let mut script = self.script.lock();
            script.clear();
            script.extend(steps);
        }
    }
}

#[async_trait]
impl MachineProvider for ScriptedProvider {
    async fn list_machines(&self) -> RemoteplayResult<Vec<Machine>> {
        Ok(self.machines.clone())
    }

    async fn get_machine(&self, id: &str) -> RemoteplayResult<Machine> {
        self.machines
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| RemoteplayError::MachineNotFound(id.to_string()))
    }

    async fn get_state(&self, _id: &str) -> RemoteplayResult<MachineState> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::State(state)) => {
                *self.last.lock() = state;
                Ok(state)
            }
            Some(Step::Fail) => Err(RemoteplayError::ProviderUnavailable(
                "scripted failure".into(),
            )),
            Some(Step::Reject) => Err(RemoteplayError::AuthenticationRejected(
                "scripted rejection".into(),
            )),
            None => Ok(*self.last.lock()),
        }
    }

    async fn request_start(&self, _id: &str) -> RemoteplayResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let steps = self.on_start.lock().take();
        self.replace_script(steps);
        Ok(())
    }

    async fn request_stop(&self, _id: &str) -> RemoteplayResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let steps = self.on_stop.lock().take();
        self.replace_script(steps);
        Ok(())
    }
}

struct FakeProcess {
    status: ProcessStatus,
}

struct FakeHandle {
    pid: u32,
    process: Arc<Mutex<FakeProcess>>,
    terminations: Arc<AtomicUsize>,
}

impl ProcessHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn poll(&mut self) -> RemoteplayResult<ProcessStatus> {
        Ok(self.process.lock().status)
    }

    fn terminate(&mut self) -> RemoteplayResult<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.process.lock().status = ProcessStatus::Exited(None);
        Ok(())
    }
}

/// Launcher that records launch specs and hands out controllable handles.
pub(crate) struct FakeLauncher {
    fail: bool,
    launched: Mutex<Vec<LaunchSpec>>,
    processes: Mutex<Vec<Arc<Mutex<FakeProcess>>>>,
    terminations: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self {
            fail: false,
            launched: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
            terminations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every launch fails as if the executable were missing.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.launched.lock().len()
    }

    pub(crate) fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.lock().clone()
    }

    pub(crate) fn terminate_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Make every launched process exit with `code`.
    pub(crate) fn exit_all(&self, code: Option<i32>) {
        for process in self.processes.lock().iter() {
            process.lock().status = ProcessStatus::Exited(code);
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> RemoteplayResult<Box<dyn ProcessHandle>> {
        if self.fail {
            return Err(RemoteplayError::ProcessLaunch(format!(
                "{}: No such file or directory",
                spec.program.display()
            )));
        }

        let mut launched = self.launched.lock();
        launched.push(spec.clone());

        let process = Arc::new(Mutex::new(FakeProcess {
            status: ProcessStatus::Running,
        }));
        self.processes.lock().push(Arc::clone(&process));

        Ok(Box::new(FakeHandle {
            pid: 10_000 + launched.len() as u32,
            process,
            terminations: Arc::clone(&self.terminations),
        }))
    }
}

/// Process table with a settable list of process names.
pub(crate) struct FakeProcessTable {
    names: Mutex<Vec<String>>,
}

impl FakeProcessTable {
    pub(crate) fn with(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
        }
    }

    pub(crate) fn set(&self, names: &[&str]) {
        *self.names.lock() = names.iter().map(|n| n.to_string()).collect();
    }
}

impl ProcessTable for FakeProcessTable {
    fn contains(&self, marker: &str) -> bool {
        self.names.lock().iter().any(|n| n.contains(marker))
    }
}
