// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Handle, NodeError, NodeId, Result};
use dashmap::DashMap;
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Everything a node needs to know to talk to a peer.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    pub handle: Handle,
}

impl fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) @ {}", self.id, self.name, self.handle)
    }
}

/// The set of nodes a node believes to be members, itself included.
///
/// Inserts, removals and lookups may run concurrently from any thread.
/// Iteration is weakly consistent: a record pruned by one thread may still
/// turn up in another thread's walk, which is harmless because the next
/// call against it fails and prunes it again.
///
/// Callers never hold a reference into the map: every accessor copies out,
/// so nothing is locked while a peer is being called.
pub struct Registry {
    own: NodeId,
    nodes: DashMap<NodeId, NodeRecord>,
}

impl Registry {
    pub fn new(own: NodeRecord) -> Self {
        let nodes = DashMap::new();
        let id = own.id;
        nodes.insert(id, own);
        Registry { own: id, nodes }
    }

    pub fn own_record(&self) -> Option<NodeRecord> {
        self.get(self.own)
    }

    /// Replace the handle this node advertises for itself.
    pub fn rebind_self(&self, handle: Handle) {
        if let Some(mut own) = self.nodes.get_mut(&self.own) {
            own.handle = handle;
        }
    }

    /// Insert or refresh a peer. Returns true if the id was not known
    /// before. Records claiming this node's own id are ignored, so a stale
    /// snapshot can't overwrite how the node advertises itself.
    pub fn register(&self, record: NodeRecord) -> bool {
        if record.id == self.own {
            return false;
        }
        trace!("registry {} insert {}", self.own, record);
        self.nodes.insert(record.id, record).is_none()
    }

    /// Union `records` into the registry, returning how many were new.
    pub fn merge<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        records.into_iter().filter(|r| self.register(r.clone())).count()
    }

    /// Drop a peer. A node never unregisters itself.
    pub fn unregister(&self, id: NodeId) -> Option<NodeRecord> {
        if id == self.own {
            return None;
        }
        self.nodes.remove(&id).map(|(_, record)| record)
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRecord> {
        self.nodes.get(&id).map(|r| r.value().clone())
    }

    pub fn lookup(&self, id: NodeId) -> Result<Handle> {
        self.nodes
            .get(&id)
            .map(|r| r.handle.clone())
            .ok_or_else(|| NodeError::NotFound(format!("node {}", id)))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// An ordered, immutable copy of the whole registry.
    pub fn snapshot(&self) -> OrdMap<NodeId, NodeRecord> {
        self.nodes
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }

    /// Every member other than this node, in id order.
    pub fn peers(&self) -> Vec<NodeRecord> {
        let mut snap = self.snapshot();
        snap.remove(&self.own);
        snap.values().cloned().collect()
    }

    /// Every member whose id is not in `skip`, in id order.
    pub fn peers_except(&self, skip: &[NodeId]) -> Vec<NodeRecord> {
        self.snapshot()
            .values()
            .filter(|r| !skip.contains(&r.id))
            .cloned()
            .collect()
    }

    /// Every member with an id strictly above `id`, in id order.
    pub fn higher_than(&self, id: NodeId) -> Vec<NodeRecord> {
        self.snapshot()
            .values()
            .filter(|r| r.id > id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: u64) -> NodeRecord {
        NodeRecord {
            id: NodeId(id),
            name: format!("n{}", id),
            handle: Handle::new(format!("ChatNode_{}", id)),
        }
    }

    #[test]
    fn register_is_idempotent() {
        let reg = Registry::new(rec(2));
        assert!(reg.register(rec(1)));
        assert!(!reg.register(rec(1)));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.lookup(NodeId(1)).unwrap(), Handle::new("ChatNode_1"));
        assert_eq!(
            reg.lookup(NodeId(7)),
            Err(NodeError::NotFound("node 7".into()))
        );
    }

    #[test]
    fn never_unregisters_self() {
        let reg = Registry::new(rec(2));
        reg.register(rec(3));
        assert!(reg.unregister(NodeId(2)).is_none());
        assert!(reg.contains(NodeId(2)));
        assert_eq!(reg.unregister(NodeId(3)), Some(rec(3)));
        assert!(!reg.contains(NodeId(3)));
    }

    #[test]
    fn foreign_record_for_own_id_is_ignored() {
        let reg = Registry::new(rec(2));
        let mut imposter = rec(2);
        imposter.name = "imposter".into();
        assert_eq!(reg.merge(vec![imposter, rec(1), rec(5)]), 2);
        assert_eq!(reg.own_record().unwrap().name, "n2");
    }

    #[test]
    fn ordered_views() {
        let reg = Registry::new(rec(3));
        reg.merge(vec![rec(5), rec(1), rec(4)]);
        let higher: Vec<_> = reg.higher_than(NodeId(3)).into_iter().map(|r| r.id.0).collect();
        assert_eq!(higher, vec![4, 5]);
        let peers: Vec<_> = reg.peers().into_iter().map(|r| r.id.0).collect();
        assert_eq!(peers, vec![1, 4, 5]);
        let fan: Vec<_> = reg
            .peers_except(&[NodeId(3), NodeId(4)])
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(fan, vec![1, 5]);
        let keys: Vec<_> = reg.snapshot().keys().map(|k| k.0).collect();
        assert_eq!(keys, vec![1, 3, 4, 5]);
    }
}
