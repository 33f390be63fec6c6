//! Linux network namespace primitives for building emulated topologies.
//!
//! The active network namespace is per-thread kernel state: switching it with
//! [`NetNs::enter`] only affects the calling OS thread, and any `ip` command
//! spawned from that thread inherits the namespace the thread is in.
//!
//! # Modules
//!
//! - [`namespace`]: Namespace handles, thread-local switching and named
//!   namespace management
//! - [`ip`]: `ip(8)` command runner and link inspection helpers
//! - [`test_util`]: Privilege checks and unique name generation for tests

pub mod ip;
pub mod namespace;
pub mod test_util;

pub use ip::{ip, ip_checked, link_has_kind, link_names};
pub use namespace::{NETNS_RUN_DIR, NetNs};
pub use test_util::{check_privileges, unique_ns_name};
