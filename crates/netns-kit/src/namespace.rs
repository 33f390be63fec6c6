use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::ip::ip_checked;

/// Directory where `ip netns add` pins named namespaces.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// An open handle to a network namespace.
///
/// Holding the handle keeps the namespace reachable even if its name is
/// removed. Identity is the `(dev, inode)` pair of the nsfs file, so two
/// handles opened through different paths compare equal when they refer to
/// the same namespace.
#[derive(Debug)]
pub struct NetNs {
    file: File,
    path: PathBuf,
    id: (u64, u64),
}

impl NetNs {
    /// Handle to the namespace the calling thread is currently in.
    pub fn current() -> Result<Self> {
        Self::from_path(THREAD_NETNS)
    }

    /// Handle to the named namespace `/var/run/netns/<name>`.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::from_path(Path::new(NETNS_RUN_DIR).join(name))
    }

    /// Handle to the namespace of process `pid`.
    pub fn from_pid(pid: u32) -> Result<Self> {
        Self::from_path(format!("/proc/{pid}/ns/net"))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open netns '{}'", path.display()))?;
        let meta = file
            .metadata()
            .with_context(|| format!("stat netns '{}'", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            id: (meta.dev(), meta.ino()),
        })
    }

    /// `(dev, inode)` identity of the namespace.
    pub fn id(&self) -> (u64, u64) {
        self.id
    }

    /// Path the handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path that resolves to this namespace from any process while the
    /// handle is open. Suitable for `ip ... netns <path>` arguments.
    pub fn fd_path(&self) -> String {
        format!("/proc/{}/fd/{}", std::process::id(), self.file.as_raw_fd())
    }

    /// Returns `true` if the calling thread is inside this namespace.
    pub fn is_current(&self) -> Result<bool> {
        let meta = std::fs::metadata(THREAD_NETNS).context("stat current netns")?;
        Ok((meta.dev(), meta.ino()) == self.id)
    }

    /// Move the calling thread into this namespace.
    ///
    /// Only the calling OS thread is affected. A no-op when the thread is
    /// already there.
    pub fn enter(&self) -> Result<()> {
        if self.is_current()? {
            return Ok(());
        }
        // SAFETY: the fd is owned by `self.file` and stays open for the call.
        let rc = unsafe { libc::setns(self.file.as_raw_fd(), libc::CLONE_NEWNET) };
        if rc == -1 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("setns into '{}'", self.path.display()));
        }
        Ok(())
    }

    /// Run `f` inside this namespace, then move the calling thread into
    /// `back` whether or not `f` succeeded.
    ///
    /// An error from `f` wins over an error returning to `back`.
    pub fn run_in<T>(&self, back: &NetNs, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let res = self.enter().and_then(|()| f());
        let restored = back.enter();
        let value = res?;
        restored?;
        Ok(value)
    }

    /// Create the named namespace `name` and open a handle to it.
    pub fn create_named(name: &str) -> Result<Self> {
        ip_checked(&["netns", "add", name]).with_context(|| format!("create netns '{name}'"))?;
        debug!(ns = name, "created network namespace");
        Self::from_name(name)
    }

    /// Remove the name of namespace `name`.
    pub fn delete_named(name: &str) -> Result<()> {
        ip_checked(&["netns", "del", name]).with_context(|| format!("delete netns '{name}'"))?;
        debug!(ns = name, "deleted network namespace");
        Ok(())
    }

    /// Returns `true` if a namespace called `name` is pinned under
    /// [`NETNS_RUN_DIR`].
    pub fn exists_named(name: &str) -> bool {
        Path::new(NETNS_RUN_DIR).join(name).exists()
    }

    /// Names of all pinned namespaces. A missing run directory means none.
    pub fn list_named() -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(NETNS_RUN_DIR) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(format!("read {NETNS_RUN_DIR}")),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read {NETNS_RUN_DIR}"))?;
            if entry.file_type().is_ok_and(|t| !t.is_dir()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl PartialEq for NetNs {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NetNs {}
