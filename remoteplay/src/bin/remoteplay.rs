//! remoteplay command-line entry point.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use remoteplay::provider::{MachineProvider, PaperspaceProvider, find_machine};
use remoteplay::runtime::{RemoteplayOptions, StoredConfig, default_config_path};
use remoteplay::supervisor::{
    ProcessLauncher, ServiceSupervisor, SysinfoProcessTable, SystemLauncher, TunnelSupervisor,
};
use remoteplay::util::{resolve_host, ssh_config_hostname};
use remoteplay::{
    ControllerHandle, ControllerSnapshot, LifecycleController, MachineState, TransitionAction,
    TransitionDecision, init_logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Upper bound on waiting for a pending transition when none is configured.
const DEFAULT_IDLE_WAIT: Duration = Duration::from_secs(900);

#[derive(Parser, Debug)]
#[command(name = "remoteplay", version, about = "Remote cloud workstation power and tunnel manager")]
struct Cli {
    /// Machine id or name. Defaults to the last one used.
    #[arg(short, long, global = true)]
    machine: Option<String>,

    /// Provider API key. Defaults to the stored key.
    #[arg(short = 'a', long, env = "REMOTEPLAY_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write logs to a daily rolling file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Config file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Port forwarded through the tunnel.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Seconds between state polls.
    #[arg(long, global = true)]
    poll_interval: Option<u64>,

    /// Give up on a transition after this many seconds. 0 waits forever.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// USB bridge executable.
    #[arg(long, global = true)]
    usb_executable: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the machine's current state.
    Status,
    /// Start the machine, USB bridge and tunnel, and stay attached.
    Start {
        /// Stop the machine when detaching with Ctrl+C.
        #[arg(long)]
        stop_on_exit: bool,
    },
    /// Stop the machine and wait until it is off.
    Stop,
    /// Follow the machine state and keep the tunnel in step.
    Watch,
}

impl Cli {
    fn options(&self) -> RemoteplayOptions {
        let mut options = RemoteplayOptions::default();
        if let Some(url) = &self.api_url {
            options.api_url = url.clone();
        }
        if let Some(port) = self.port {
            options.tunnel.port = port;
        }
        if let Some(secs) = self.poll_interval {
            options.transition.poll_interval = Duration::from_secs(secs.max(1));
            options.reconcile_interval = options.transition.poll_interval;
        }
        if let Some(secs) = self.timeout {
            options.transition.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(exe) = &self.usb_executable {
            options.service.executable = exe.clone();
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_dir.as_deref())?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut stored = StoredConfig::load(&config_path)?;

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| stored.api_key.clone())
        .context("no API key: pass --api-key or set REMOTEPLAY_API_KEY")?;
    let machine_key = cli
        .machine
        .clone()
        .or_else(|| stored.machine.clone())
        .context("no machine selected: pass --machine")?;

    let options = cli.options();
    let provider: Arc<dyn MachineProvider> = Arc::new(PaperspaceProvider::new(
        &options.api_url,
        &api_key,
        options.request_timeout,
    )?);

    let machine = find_machine(provider.as_ref(), &machine_key)
        .await
        .with_context(|| format!("failed to look up machine '{}'", machine_key))?;
    tracing::info!(machine_id = %machine.id, name = %machine.name, state = %machine.state, "Found machine");

    stored.machine = Some(machine_key);
    stored.api_key = Some(api_key);
    if let Err(e) = stored.save(&config_path) {
        tracing::warn!(path = %config_path.display(), error = %e, "Failed to save config");
    }

    let ssh_binary = options.tunnel.ssh_binary.clone();
    let host = resolve_host(
        &[machine.name.as_str(), machine.id.as_str()],
        machine.public_address.as_deref(),
        |alias| ssh_config_hostname(&ssh_binary, alias),
    );
    if host.is_none() {
        tracing::warn!(machine_id = %machine.id, "No SSH alias or public IP for machine, tunnel disabled");
    }

    let launcher: Arc<dyn ProcessLauncher> = Arc::new(SystemLauncher);
    let tunnel = TunnelSupervisor::new(
        Box::new(move || host.clone()),
        Arc::clone(&launcher),
        &options.tunnel.ssh_binary,
        options.tunnel.port,
    );
    let service = ServiceSupervisor::new(
        &options.service.executable,
        &options.service.marker,
        launcher,
        Arc::new(SysinfoProcessTable::new()),
    );
    // Kept for a direct stop request if the controller cannot take one on exit.
    let exit_provider = Arc::clone(&provider);
    let machine_id = machine.id.clone();
    let idle_wait = options
        .transition
        .timeout
        .map_or(DEFAULT_IDLE_WAIT, |t| t + options.transition.poll_interval);
    let mut controller = LifecycleController::new(provider, machine, tunnel, service, options);

    match cli.command {
        Command::Status => {
            println!("{}", controller.snapshot());
            Ok(())
        }
        Command::Start { stop_on_exit } => {
            let (handle, task) = controller.spawn();
            let decision = handle.transition(TransitionAction::Start).await?;
            report_decision(TransitionAction::Start, decision);

            follow(&mut handle.subscribe(), |_| false).await;

            if stop_on_exit {
                stop_before_exit(&handle, exit_provider.as_ref(), &machine_id, idle_wait).await?;
            }

            handle.shutdown().await;
            task.await.context("controller task failed")?;
            Ok(())
        }
        Command::Stop => {
            let (handle, task) = controller.spawn();
            let decision = handle.transition(TransitionAction::Stop).await?;
            report_decision(TransitionAction::Stop, decision);
            if let Err(e) = decision.check(TransitionAction::Stop) {
                handle.shutdown().await;
                task.await.context("controller task failed")?;
                return Err(e.into());
            }

            let outcome = match decision {
                TransitionDecision::Spawned => wait_settled(&handle).await,
                TransitionDecision::AlreadyInState => Some(MachineState::Off),
                TransitionDecision::Busy | TransitionDecision::Rejected(_) => None,
            };

            handle.shutdown().await;
            task.await.context("controller task failed")?;

            match outcome {
                Some(MachineState::Off) => Ok(()),
                Some(state) => bail!("machine did not stop, last state {}", state),
                None => bail!("stop interrupted"),
            }
        }
        Command::Watch => {
            let (handle, task) = controller.spawn();
            follow(&mut handle.subscribe(), |_| false).await;
            handle.shutdown().await;
            task.await.context("controller task failed")?;
            Ok(())
        }
    }
}

/// Stop the machine on detach. A start still in progress is allowed to
/// finish first; if the controller cannot take the stop, the provider is
/// asked directly so the machine is not left running.
async fn stop_before_exit(
    handle: &ControllerHandle,
    provider: &dyn MachineProvider,
    machine_id: &str,
    idle_wait: Duration,
) -> anyhow::Result<()> {
    println!("Stopping machine before exit (Ctrl+C again to detach)");

    let decision = tokio::select! {
        decision = handle.transition_when_idle(TransitionAction::Stop, idle_wait) => decision,
        _ = tokio::signal::ctrl_c() => {
            println!("Detached without stopping the machine");
            return Ok(());
        }
    };

    let direct = match decision {
        Ok(TransitionDecision::Spawned) => {
            report_decision(TransitionAction::Stop, TransitionDecision::Spawned);
            follow(&mut handle.subscribe(), settled).await;
            false
        }
        Ok(TransitionDecision::AlreadyInState) => {
            report_decision(TransitionAction::Stop, TransitionDecision::AlreadyInState);
            false
        }
        Ok(other) => {
            report_decision(TransitionAction::Stop, other);
            true
        }
        Err(e) => {
            tracing::warn!(machine_id = %machine_id, error = %e, "Controller could not take stop request");
            true
        }
    };

    if direct {
        provider
            .request_stop(machine_id)
            .await
            .context("failed to request machine stop")?;
        println!("Requested stop from the provider");
    }
    Ok(())
}

fn report_decision(action: TransitionAction, decision: TransitionDecision) {
    match decision {
        TransitionDecision::Spawned => println!("Requested {}", action),
        TransitionDecision::AlreadyInState => println!("Machine already at {}", action.target()),
        TransitionDecision::Busy => println!("Another transition is in progress"),
        TransitionDecision::Rejected(state) => {
            println!("Cannot {} while machine is {}", action, state)
        }
    }
}

/// Whether a stop has run its course.
fn settled(snapshot: &ControllerSnapshot) -> bool {
    matches!(snapshot.machine_state, MachineState::Off | MachineState::Error)
}

async fn wait_settled(handle: &ControllerHandle) -> Option<MachineState> {
    let mut snapshots = handle.subscribe();
    if follow(&mut snapshots, settled).await {
        Some(snapshots.borrow().machine_state)
    } else {
        None
    }
}

/// Print snapshot changes until `done` holds or Ctrl+C. Returns false if interrupted.
async fn follow<F>(snapshots: &mut watch::Receiver<ControllerSnapshot>, done: F) -> bool
where
    F: Fn(&ControllerSnapshot) -> bool,
{
    let current = snapshots.borrow_and_update().clone();
    println!("{}", current);
    if done(&current) {
        return true;
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return false;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", snapshot);
                if done(&snapshot) {
                    return true;
                }
            }
            _ = tokio::signal::ctrl_c() => return false,
        }
    }
}
