use netns_kit::{NetNs, ip_checked};
use tracing::debug;

use crate::error::{FabricError, Result};
use crate::fabric::NodeManager;
use crate::graph::NodeId;

pub const DEFAULT_NODE_PREFIX: &str = "node";

/// Nodes as bare named network namespaces, `<prefix><id>`.
#[derive(Clone, Debug)]
pub struct NetnsNodeManager {
    prefix: String,
}

impl Default for NetnsNodeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NetnsNodeManager {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_NODE_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn ns_name(&self, id: NodeId) -> String {
        format!("{}{id}", self.prefix)
    }
}

impl NodeManager for NetnsNodeManager {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        Ok(())
    }

    fn setup_node(&self, id: NodeId) -> Result<()> {
        let name = self.ns_name(id);
        NetNs::create_named(&name).map_err(|e| FabricError::namespace(&name, e))?;
        ip_checked(&["-n", &name, "link", "set", "lo", "up"])
            .map_err(|e| FabricError::namespace(&name, e))?;
        Ok(())
    }

    fn node_netns(&self, id: NodeId) -> Result<NetNs> {
        let name = self.ns_name(id);
        NetNs::from_name(&name).map_err(|e| FabricError::namespace(name, e))
    }

    fn clean_node(&self, id: NodeId) -> Result<()> {
        let name = self.ns_name(id);
        if !NetNs::exists_named(&name) {
            debug!(node = id, "node namespace already gone");
            return Ok(());
        }
        NetNs::delete_named(&name).map_err(|e| FabricError::namespace(name, e))
    }

    fn node_exec(&self, id: NodeId, argv: &[&str]) -> Result<()> {
        let name = self.ns_name(id);
        let mut args = vec!["netns", "exec", name.as_str()];
        args.extend_from_slice(argv);
        ip_checked(&args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names() {
        assert_eq!(NetnsNodeManager::new().ns_name(12), "node12");
        assert_eq!(NetnsNodeManager::with_prefix("t7n").ns_name(3), "t7n3");
    }

    #[test]
    fn test_clean_missing_node_is_ok() {
        let nodes = NetnsNodeManager::with_prefix("netfab-absent-");
        assert!(nodes.clean_node(4_000_000).is_ok());
    }
}
