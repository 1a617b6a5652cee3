use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Target being probed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// As given on the command line
    pub original: String,
    pub resolved: Ipv4Addr,
}

impl Target {
    pub fn new(original: impl Into<String>, resolved: Ipv4Addr) -> Self {
        Self {
            original: original.into(),
            resolved,
        }
    }
}
