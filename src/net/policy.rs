//! Connection-accept policy.
//!
//! Consulted once per accepted socket, before any request is read.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

pub trait AcceptPolicy: Send + Sync {
    fn accept(&self, peer: &SocketAddr) -> bool;
}

/// Accepts every peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AcceptPolicy for AllowAll {
    fn accept(&self, _peer: &SocketAddr) -> bool {
        true
    }
}

/// Rejects peers whose IP is listed.
#[derive(Debug, Default, Clone)]
pub struct DenyList {
    denied: HashSet<IpAddr>,
}

impl DenyList {
    pub fn new(denied: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }
}

impl AcceptPolicy for DenyList {
    fn accept(&self, peer: &SocketAddr) -> bool {
        !self.denied.contains(&peer.ip())
    }
}
