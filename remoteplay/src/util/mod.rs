mod host;
mod process;

pub use host::{is_ip_literal, parse_ssh_hostname, resolve_host, ssh_config_hostname};
pub use process::{process_running_with_marker, terminate_process};
