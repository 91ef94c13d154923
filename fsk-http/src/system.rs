use std::path::Path;

use serde::Serialize;
use sysinfo::{Disks, MINIMUM_CPU_UPDATE_INTERVAL, System};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Utilisation above this percentage marks the service as degraded.
pub const RESOURCE_LIMIT_PERCENT: f64 = 90.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_available_gb: f64,
    pub disk_percent: f64,
    pub disk_free_gb: f64,
}

impl SystemSample {
    pub fn over_limit(&self) -> bool {
        self.cpu_percent > RESOURCE_LIMIT_PERCENT
            || self.memory_percent > RESOURCE_LIMIT_PERCENT
            || self.disk_percent > RESOURCE_LIMIT_PERCENT
    }
}

/// Samples CPU, memory and root-disk utilisation. Blocks for the minimum CPU
/// measurement window, so call it from a blocking context.
pub fn sample_system() -> SystemSample {
    let mut system = System::new();
    system.refresh_cpu_usage();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_cpu_usage();
    system.refresh_memory();

    let total_memory = system.total_memory();
    let available_memory = system.available_memory();

    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()));
    let (disk_total, disk_available) = root
        .map(|disk| (disk.total_space(), disk.available_space()))
        .unwrap_or((0, 0));

    SystemSample {
        cpu_percent: round2(f64::from(system.global_cpu_usage())),
        memory_percent: round2(used_percent(total_memory, available_memory)),
        memory_available_gb: round2(available_memory as f64 / GIB),
        disk_percent: round2(used_percent(disk_total, disk_available)),
        disk_free_gb: round2(disk_available as f64 / GIB),
    }
}

/// Whether `path` names an existing file this process may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    metadata.is_file() && may_execute(path)
}

/// Asks the kernel via `access(2)`, so ownership and group bits are judged
/// against this process's own user.
#[cfg(unix)]
fn may_execute(path: &Path) -> bool {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the whole call.
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(not(unix))]
fn may_execute(_path: &Path) -> bool {
    true
}

fn used_percent(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(available) as f64 * 100.0 / total as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_percent_handles_empty_totals() {
        assert_eq!(used_percent(0, 0), 0.0);
        assert_eq!(used_percent(200, 50), 75.0);
    }

    #[test]
    fn any_resource_over_ninety_percent_is_over_limit() {
        let calm = SystemSample {
            cpu_percent: 90.0,
            memory_percent: 40.0,
            disk_percent: 10.0,
            ..SystemSample::default()
        };
        assert!(!calm.over_limit());
        let busy = SystemSample {
            disk_percent: 90.5,
            ..calm
        };
        assert!(busy.over_limit());
    }

    #[cfg(unix)]
    #[test]
    fn executable_check_respects_mode_bits() {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("fskhttp-exec-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"#!/bin/sh\n").expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
            .expect("chmod 644");
        assert!(!is_executable(&path));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod 755");
        assert!(is_executable(&path));
        let _ = std::fs::remove_file(&path);
        assert!(!is_executable(&path));
    }

    #[cfg(unix)]
    #[test]
    fn execute_bit_for_other_users_only_is_not_enough() {
        use std::os::unix::fs::PermissionsExt;

        // Root may execute anything with any x bit set, so the check only
        // discriminates for unprivileged users.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let path = std::env::temp_dir().join(format!("fskhttp-exec-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"#!/bin/sh\n").expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o601))
            .expect("chmod 601");
        assert!(!is_executable(&path));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn directories_are_not_executables() {
        assert!(!is_executable(&std::env::temp_dir()));
    }
}
