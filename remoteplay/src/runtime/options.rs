//! Tunable options for the lifecycle engine.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.paperspace.com/v1";
pub const DEFAULT_TUNNEL_PORT: u16 = 7575;
pub const DEFAULT_SERVICE_MARKER: &str = "vhusb";

/// Options for a transition worker's poll loop.
#[derive(Debug, Clone)]
pub struct TransitionOptions {
    /// Delay between provider polls.
    pub poll_interval: Duration,
    /// Give up after this long. `None` polls forever.
    pub timeout: Option<Duration>,
    /// Upper bound for the retry delay after provider errors.
    pub max_backoff: Duration,
    /// Consecutive provider errors before reporting `MachineState::Error`.
    pub error_threshold: u32,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Some(Duration::from_secs(600)),
            max_backoff: Duration::from_secs(60),
            error_threshold: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub ssh_binary: PathBuf,
    /// Forwarded on both ends of the tunnel.
    pub port: u16,
    /// Relaunch the tunnel from `reconcile()` if it dies while the machine is ready.
    pub restart_on_exit: bool,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            ssh_binary: PathBuf::from("ssh"),
            port: DEFAULT_TUNNEL_PORT,
            restart_on_exit: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub executable: PathBuf,
    /// Substring that identifies the bridge in the process table.
    pub marker: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            executable: default_service_executable(),
            marker: DEFAULT_SERVICE_MARKER.to_string(),
        }
    }
}

/// Bundled USB bridge location per platform.
fn default_service_executable() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/VirtualHereServerUniversal.app/Contents/MacOS/vhusbdosx")
    } else if cfg!(windows) {
        PathBuf::from(r"C:\Program Files\VirtualHere\vhusbdwin64.exe")
    } else {
        PathBuf::from("vhuit64")
    }
}

/// Top-level options for a remoteplay session.
#[derive(Debug, Clone)]
pub struct RemoteplayOptions {
    pub api_url: String,
    /// Per-request HTTP timeout for provider calls.
    pub request_timeout: Duration,
    /// Period of the controller's reconcile tick.
    pub reconcile_interval: Duration,
    pub transition: TransitionOptions,
    pub tunnel: TunnelOptions,
    pub service: ServiceOptions,
}

impl Default for RemoteplayOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            reconcile_interval: Duration::from_secs(5),
            transition: TransitionOptions::default(),
            tunnel: TunnelOptions::default(),
            service: ServiceOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let options = RemoteplayOptions::default();
        assert_eq!(options.transition.poll_interval, Duration::from_secs(5));
        assert_eq!(options.tunnel.port, 7575);
        assert_eq!(options.service.marker, "vhusb");
        assert!(options.transition.timeout.is_some());
    }
}
