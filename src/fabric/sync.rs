//! Netlink settle barrier.
//!
//! Namespace teardown releases kernel resources asynchronously and holds the
//! rtnl lock while doing so. Churning a throwaway dummy device through a few
//! add/delete cycles only completes once that work has drained, which makes
//! it a cheap "is the kernel done" probe between teardown phases.

use std::thread;
use std::time::Duration;

use netns_kit::{ip, ip_checked};
use tracing::debug;

use crate::error::{FabricError, Result};

pub const DEFAULT_PROBES_PER_ROUND: usize = 20;
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBE_DEVICE: &str = "probe-dummy";

/// Units of extra work per additional probe round.
const EXTRA_PER_ROUND: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncBarrier {
    /// Add/delete cycles per round. Zero disables the barrier.
    pub probes_per_round: usize,
    /// Sleep before the first round and after every round.
    pub settle: Duration,
    pub device: String,
}

impl Default for SyncBarrier {
    fn default() -> Self {
        Self {
            probes_per_round: DEFAULT_PROBES_PER_ROUND,
            settle: DEFAULT_SETTLE,
            device: DEFAULT_PROBE_DEVICE.to_string(),
        }
    }
}

impl SyncBarrier {
    /// A barrier that returns immediately.
    pub fn disabled() -> Self {
        Self {
            probes_per_round: 0,
            settle: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.probes_per_round == 0
    }

    /// Rounds run for `extra` units of requested extra work.
    pub fn rounds(&self, extra: usize) -> usize {
        1 + extra.div_ceil(EXTRA_PER_ROUND)
    }

    /// Run the probe rounds in the calling thread's namespace.
    pub fn run(&self, extra: usize) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        // Leftover from an interrupted run.
        let _ = ip(&["link", "del", &self.device]);

        thread::sleep(self.settle);
        let rounds = self.rounds(extra);
        for round in 0..rounds {
            for _ in 0..self.probes_per_round {
                ip_checked(&["link", "add", &self.device, "type", "dummy"])
                    .map_err(|e| FabricError::device(&self.device, e))?;
                ip_checked(&["link", "del", &self.device])
                    .map_err(|e| FabricError::device(&self.device, e))?;
            }
            debug!(round = round + 1, rounds, "netlink probe round done");
            thread::sleep(self.settle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_grow_with_extra_work() {
        let barrier = SyncBarrier::default();
        assert_eq!(barrier.rounds(0), 1);
        assert_eq!(barrier.rounds(1), 2);
        assert_eq!(barrier.rounds(100), 2);
        assert_eq!(barrier.rounds(101), 3);
    }

    #[test]
    fn test_disabled_barrier_is_noop() {
        let barrier = SyncBarrier::disabled();
        assert!(barrier.is_disabled());
        assert!(barrier.run(10_000).is_ok());
    }
}
