use std::process::{Command, Output};

use anyhow::{Context, Result, bail};

/// Run `ip <args>`, returning raw output.
///
/// The child inherits the network namespace of the calling thread.
pub fn ip(args: &[&str]) -> Result<Output> {
    Command::new("ip")
        .args(args)
        .output()
        .with_context(|| format!("ip {}", args.join(" ")))
}

/// Run `ip <args>`, returning output on success or bailing with stderr.
pub fn ip_checked(args: &[&str]) -> Result<Output> {
    let output = ip(args)?;
    if !output.status.success() {
        bail!(
            "command failed: ip {}\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Returns `true` if a link called `name` exists in the calling thread's
/// namespace and reports `kind` (e.g. `vxlan`, `bridge`) in its details.
pub fn link_has_kind(name: &str, kind: &str) -> bool {
    ip(&["-d", "-o", "link", "show", "dev", name]).is_ok_and(|o| {
        o.status.success()
            && String::from_utf8_lossy(&o.stdout)
                .split_whitespace()
                .any(|word| word == kind)
    })
}

/// Names of all links in the calling thread's namespace.
///
/// Veth names are reported without their `@peer` suffix.
pub fn link_names() -> Result<Vec<String>> {
    let out = ip_checked(&["-o", "link", "show"])?;
    Ok(parse_link_names(&String::from_utf8_lossy(&out.stdout)))
}

fn parse_link_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split(": ").nth(1))
        .map(|name| name.split('@').next().unwrap_or(name).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::check_privileges;

    #[test]
    fn test_parse_link_names() {
        let listing = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue\n\
                       7: 1-2-i@if6: <BROADCAST,MULTICAST,UP> mtu 1450 master 1-2\n\
                       8: 1-2: <BROADCAST,MULTICAST,UP> mtu 1450 qdisc noqueue\n";
        assert_eq!(parse_link_names(listing), vec!["lo", "1-2-i", "1-2"]);
    }

    #[test]
    fn test_parse_link_names_empty() {
        assert!(parse_link_names("").is_empty());
    }

    #[test]
    fn test_loopback_is_listed() {
        if !check_privileges() {
            eprintln!("Skipping: insufficient privileges");
            return;
        }

        let names = link_names().expect("list links");
        assert!(names.iter().any(|n| n == "lo"), "loopback missing: {names:?}");
    }
}
