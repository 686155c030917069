//! Tunnel target resolution.
//!
//! A machine is reachable over SSH either through an alias configured in the
//! user's SSH config or through its literal public address.

use regex::Regex;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)$")
        .expect("valid IPv4 pattern")
});

static IPV6: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{0,4}(:[0-9A-Fa-f]{0,4}){2,7}$").expect("valid IPv6 pattern")
});

/// Whether `candidate` is a literal IPv4 or IPv6 address.
pub fn is_ip_literal(candidate: &str) -> bool {
    let candidate = candidate.trim();
    IPV4.is_match(candidate) || IPV6.is_match(candidate)
}

/// Extract the `hostname` value from `ssh -G` output.
pub fn parse_ssh_hostname(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let key = parts.next()?.trim_end_matches(':');
        if !key.eq_ignore_ascii_case("hostname") {
            return None;
        }
        let value = parts.next()?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Ask the SSH client which hostname `alias` resolves to.
///
/// Returns `None` if the client cannot be run or prints no hostname.
pub fn ssh_config_hostname(ssh_binary: &Path, alias: &str) -> Option<String> {
    let output = Command::new(ssh_binary)
        .arg("-G")
        .arg(alias)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .inspect_err(|e| tracing::debug!(alias = %alias, error = %e, "ssh -G failed to run"))
        .ok()?;

    if !output.status.success() {
        tracing::debug!(alias = %alias, status = ?output.status.code(), "ssh -G exited with failure");
        return None;
    }

    parse_ssh_hostname(&String::from_utf8_lossy(&output.stdout))
}

/// Pick the tunnel target for a machine.
///
/// Each candidate is checked against the SSH config via `lookup`; the first one
/// that resolves to a different hostname is a configured alias and wins. If no
/// alias is configured, a literal IP public address is used. Otherwise none.
pub fn resolve_host<F>(candidates: &[&str], public_address: Option<&str>, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for candidate in candidates.iter().filter(|c| !c.is_empty()) {
        if let Some(hostname) = lookup(candidate)
            && !hostname.eq_ignore_ascii_case(candidate)
        {
            tracing::debug!(alias = %candidate, hostname = %hostname, "Using SSH config alias");
            return Some(candidate.to_string());
        }
    }

    public_address
        .filter(|addr| is_ip_literal(addr))
        .map(|addr| addr.trim().to_string())
}
