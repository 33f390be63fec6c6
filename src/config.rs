//! Run configuration.
//!
//! [`ServerList`] is the JSON file describing every physical host taking
//! part in a multi-server topology. [`RunContext`] bundles everything one
//! setup or teardown invocation needs and is handed to the builder and the
//! link manager instead of being read from process-wide state.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FabricError, Result};
use crate::fabric::sync::SyncBarrier;

/// Bounded attempts at creating a VXLAN device.
pub const DEFAULT_VXLAN_RETRY_LIMIT: u32 = 64;

pub const DEFAULT_BACKBONES: usize = 1;

/// Link log location relative to a server's agent work directory.
pub const LINK_LOG_RELATIVE: &str = "tmp/link_log.txt";

/// One physical host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Tunnel destination used by peers reaching this host.
    pub ip_addr: IpAddr,
    /// Physical interface carrying VXLAN traffic.
    pub phy_intf: String,
    #[serde(default)]
    pub agent_work_dir: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerList {
    pub servers: Vec<ServerInfo>,
}

impl ServerList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
            .map_err(|e| FabricError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FabricError::Config(e.to_string()))
    }
}

/// Everything one setup/teardown run needs.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub servers: Vec<ServerInfo>,
    /// Index of this host in `servers`.
    pub local_server: usize,
    /// Worker threads for link construction. Zero runs links inline.
    pub parallel: usize,
    /// Backbone namespaces created up front.
    pub backbones: usize,
    pub disable_ipv6: bool,
    pub vxlan_retry_limit: u32,
    pub sync: SyncBarrier,
    /// Extra work announced to every teardown barrier; each started 100
    /// adds one probe round.
    pub sync_extra: usize,
    pub link_log: PathBuf,
}

impl RunContext {
    /// Context for host `local_server` of `servers`. The link log defaults
    /// to `<agentWorkDir>/tmp/link_log.txt` of that host.
    pub fn new(servers: ServerList, local_server: usize) -> Result<Self> {
        let link_log = servers
            .servers
            .get(local_server)
            .map(|s| s.agent_work_dir.join(LINK_LOG_RELATIVE))
            .ok_or_else(|| {
                FabricError::Config(format!(
                    "server id {local_server} out of range ({} servers)",
                    servers.servers.len()
                ))
            })?;

        Ok(Self {
            servers: servers.servers,
            local_server,
            link_log,
            ..Self::standalone()
        })
    }

    /// Single-host context without any server entries. External edges fail
    /// under it.
    pub fn standalone() -> Self {
        Self {
            servers: Vec::new(),
            local_server: 0,
            parallel: 0,
            backbones: DEFAULT_BACKBONES,
            disable_ipv6: false,
            vxlan_retry_limit: DEFAULT_VXLAN_RETRY_LIMIT,
            sync: SyncBarrier::default(),
            sync_extra: 0,
            link_log: PathBuf::from("link_log.txt"),
        }
    }

    pub fn with_parallel(mut self, workers: usize) -> Self {
        self.parallel = workers;
        self
    }

    pub fn with_backbones(mut self, count: usize) -> Self {
        self.backbones = count;
        self
    }

    pub fn with_disable_ipv6(mut self, disable: bool) -> Self {
        self.disable_ipv6 = disable;
        self
    }

    pub fn with_sync(mut self, sync: SyncBarrier) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_sync_extra(mut self, extra: usize) -> Self {
        self.sync_extra = extra;
        self
    }

    pub fn with_link_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.link_log = path.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.backbones == 0 {
            return Err(FabricError::Config(
                "backbone namespace count must be at least 1".into(),
            ));
        }
        if self.vxlan_retry_limit == 0 {
            return Err(FabricError::Config("VXLAN retry limit must be at least 1".into()));
        }
        if !self.servers.is_empty() && self.local_server >= self.servers.len() {
            return Err(FabricError::Config(format!(
                "server id {} out of range ({} servers)",
                self.local_server,
                self.servers.len()
            )));
        }
        Ok(())
    }

    /// The host this process runs on.
    pub fn local(&self) -> Result<&ServerInfo> {
        self.server(self.local_server)
    }

    pub fn server(&self, id: usize) -> Result<&ServerInfo> {
        self.servers.get(id).ok_or_else(|| {
            FabricError::Config(format!(
                "unknown server id {id} ({} servers configured)",
                self.servers.len()
            ))
        })
    }
}
