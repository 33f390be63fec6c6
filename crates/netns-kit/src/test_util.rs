use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

static NS_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns `true` if the environment supports namespace-based tests
/// (requires the `ip` tool and an effective uid of root, since switching a
/// thread's namespace needs `CAP_SYS_ADMIN` in-process).
pub fn check_privileges() -> bool {
    // SAFETY: geteuid has no preconditions.
    let is_root = unsafe { libc::geteuid() } == 0;

    is_root
        && Command::new("ip")
            .args(["netns", "list"])
            .output()
            .is_ok_and(|o| o.status.success())
}

/// Generate a unique namespace/interface name safe for parallel tests.
///
/// Combines prefix + PID + atomic counter, truncated to 15 chars
/// (Linux netdev name limit).
pub fn unique_ns_name(prefix: &str) -> String {
    let seq = NS_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() % 0xffff;
    let name = format!("{prefix}_{pid:x}_{seq}");
    if name.len() > 15 { name[..15].to_string() } else { name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_differ_and_fit() {
        let a = unique_ns_name("ft");
        let b = unique_ns_name("ft");
        assert_ne!(a, b);
        assert!(a.len() <= 15 && b.len() <= 15);
    }
}
