//! Process signalling and process-table inspection.

/// Ask a process to exit with SIGTERM.
///
/// # Returns
/// * `true` - Signal delivered or process already gone
/// * `false` - Failed to signal (permission denied)
#[cfg(unix)]
pub fn terminate_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 || libc::kill(pid as i32, 0) != 0 }
}

/// Non-unix platforms terminate through the owned child handle instead.
#[cfg(not(unix))]
pub fn terminate_process(_pid: u32) -> bool {
    false
}

/// Check whether any process whose name contains `marker` is running.
///
/// Re-scans the process table on every call; the matching process may have
/// been started by something other than this program.
pub fn process_running_with_marker(system: &mut sysinfo::System, marker: &str) -> bool {
    system.refresh_processes();

    let marker = marker.to_ascii_lowercase();
    system
        .processes()
        .values()
        .any(|p| p.name().to_ascii_lowercase().contains(&marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_matches_current_process() {
        let mut system = sysinfo::System::new();
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().to_string();
        // Process names are truncated to 15 bytes on Linux.
        let marker: String = name.chars().take(8).collect();
        assert!(process_running_with_marker(&mut system, &marker));
    }

    #[test]
    fn test_marker_absent() {
        let mut system = sysinfo::System::new();
        assert!(!process_running_with_marker(
            &mut system,
            "remoteplay-no-such-process-4242"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_missing_process_reports_gone() {
        // High PIDs are unlikely to exist; kill(pid, 0) fails and the call reports gone.
        assert!(terminate_process(999_999_999));
    }
}
