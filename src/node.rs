// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::election::Election;
use crate::{
    Call, ChatMessage, ChatNode, ConfigError, ElectionState, Gateway, Handle, LogicalClock,
    MessageHistory, NodeConfig, NodeError, NodeId, NodeInfo, NodeRecord, Registry, Reply, Result,
    Timestamp,
};
use itertools::Itertools;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One chat node: the owned state of a single process in the group.
///
/// Every piece of shared state has its own synchronization: the clock and
/// the election flag are atomics, the registry is a concurrent map, and the
/// coordinator id, history and system log sit behind short locks. None of
/// them is held across a call to a peer, because those calls routinely come
/// straight back into this node (an election message sent up the id order
/// produces a coordinator announcement sent back down, before the first
/// call has returned).
///
/// The protocol itself is split over several files: election in
/// `election.rs`, message relay in `relay.rs`, and coordinator probing in
/// `detector.rs`. This file has construction, discovery, the inbound call
/// dispatch, and the read-only views offered to a user interface.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) config: NodeConfig,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) registry: Registry,
    pub(crate) clock: LogicalClock,
    pub(crate) election: Election,
    pub(crate) history: MessageHistory,
    system_log: Mutex<Vec<String>>,
}

impl Node {
    /// Build a node. It knows only itself until `join` is called.
    pub fn new(config: NodeConfig, gateway: Arc<dyn Gateway>) -> std::result::Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let own = NodeRecord {
            id: config.id,
            name: config.name.clone(),
            handle: Handle::new(config.directory_name()),
        };
        let node = Arc::new(Node {
            id: config.id,
            name: config.name.clone(),
            registry: Registry::new(own),
            gateway,
            clock: LogicalClock::new(),
            election: Election::default(),
            history: MessageHistory::default(),
            system_log: Mutex::new(Vec::new()),
            config,
        });
        node.note(format!("node initialized with id {} and name {}", node.id, node.name));
        Ok(node)
    }

    /// Publish this node in the directory and merge in the membership of
    /// every peer already there, then announce this node to all of them.
    /// Returns the number of members learned.
    ///
    /// Nothing here is fatal. If the name can't be published the node
    /// carries on unpublished: it still learns the membership and can send,
    /// but it doesn't announce itself, since peers could not call it back.
    /// Peers that fail to answer are skipped.
    pub fn join(self: &Arc<Self>) -> usize {
        let own_name = self.config.directory_name();
        let service: Arc<dyn ChatNode> = self.clone();
        let published = match self.gateway.register(&own_name, service) {
            Ok(handle) => {
                self.registry.rebind_self(handle);
                true
            }
            Err(e) => {
                warn!(node = %self.id, "continuing unpublished: {}", e);
                self.note(format!("startup failure, continuing unregistered: {}", e));
                false
            }
        };

        let names = match self.gateway.list() {
            Ok(names) => names,
            Err(e) => {
                self.note(format!("could not list directory: {}", e));
                return 0;
            }
        };

        let mut learned = 0;
        for name in names
            .iter()
            .filter(|n| n.starts_with(&self.config.name_prefix) && **n != own_name)
        {
            let exchanged = self.gateway.lookup(name).and_then(|handle| {
                match self.gateway.invoke(&handle, Call::GetRegisteredNodes)? {
                    Reply::Nodes(records) => Ok(records),
                    other => Err(unexpected(name, &other)),
                }
            });
            match exchanged {
                Ok(records) => learned += self.registry.merge(records),
                Err(e) => debug!(node = %self.id, "skipping `{}` during discovery: {}", name, e),
            }
        }
        if learned > 0 {
            self.note(format!(
                "discovered nodes {}",
                self.registry.peers().iter().map(|r| r.id).join(", ")
            ));
        }

        if published {
            if let Some(own) = self.registry.own_record() {
                for peer in self.registry.peers() {
                    if let Err(e) = self.gateway.invoke(&peer.handle, Call::RegisterNode(own.clone())) {
                        self.prune(peer.id, &e);
                    }
                }
            }
        }

        if self.registry.len() > 1 && self.election.coordinator().is_none() {
            self.start_election();
        }
        learned
    }

    /// Inbound `registerNode`: a peer announcing itself.
    pub fn register_node(&self, record: NodeRecord) {
        let id = record.id;
        if self.registry.register(record) {
            self.note(format!("registered node with id {}", id));
        }
        if self.election.coordinator().is_none() && self.election.state() == ElectionState::Idle {
            self.start_election();
        }
    }

    /// Drop a peer after a failed call. Returns true if it was the
    /// coordinator, in which case the coordinator is now unknown and the
    /// caller should start an election. Never removes this node itself.
    pub(crate) fn prune(&self, id: NodeId, cause: &NodeError) -> bool {
        if id == self.id {
            return false;
        }
        if self.registry.unregister(id).is_some() {
            self.note(format!("removed node {}: {}", id, cause));
        }
        let was_coordinator = self.election.clear_coordinator_if(id);
        if was_coordinator {
            self.note(format!("coordinator {} lost", id));
        }
        was_coordinator
    }

    /// Record a protocol event in the system log and the tracing stream.
    pub(crate) fn note(&self, event: impl Into<String>) {
        let event = event.into();
        info!(node = %self.id, "{}", event);
        self.system_log.lock().push(event);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn clock(&self) -> Timestamp {
        self.clock.current()
    }

    pub fn coordinator(&self) -> Option<NodeId> {
        self.election.coordinator()
    }

    pub fn is_coordinator(&self) -> bool {
        self.election.coordinator() == Some(self.id)
    }

    pub fn election_state(&self) -> ElectionState {
        self.election.state()
    }

    /// Every known member, this node included, in id order.
    pub fn list_peers(&self) -> Vec<NodeRecord> {
        self.registry.snapshot().values().cloned().collect()
    }

    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id,
            name: self.name.clone(),
            is_coordinator: self.is_coordinator(),
            coordinator: self.coordinator(),
            logical_clock: self.clock(),
            election: self.election_state(),
            peer_count: self.registry.len().saturating_sub(1),
        }
    }

    pub fn message_history(&self) -> Vec<ChatMessage> {
        self.history.snapshot()
    }

    pub fn system_log(&self) -> Vec<String> {
        self.system_log.lock().clone()
    }
}

impl ChatNode for Node {
    fn handle(&self, call: Call) -> Result<Reply> {
        match call {
            Call::ReceiveMessage(message) => self.receive_message(message).map(Reply::Accepted),
            Call::StartElection => {
                self.start_election();
                Ok(Reply::Ack)
            }
            Call::ElectionMessage { sender } => {
                self.on_election_message(sender);
                Ok(Reply::Ack)
            }
            Call::CoordinatorMessage { coordinator } => {
                self.on_coordinator_message(coordinator);
                Ok(Reply::Ack)
            }
            Call::RegisterNode(record) => {
                self.register_node(record);
                Ok(Reply::Ack)
            }
            Call::GetRegisteredNodes => Ok(Reply::Nodes(self.list_peers())),
            Call::GetNodeId => Ok(Reply::NodeId(self.id)),
            Call::GetNodeInfo => Ok(Reply::Info(self.node_info())),
            Call::IsAlive => Ok(Reply::Alive(true)),
        }
    }
}

/// A peer answered with the wrong kind of reply; treat it like any other
/// failed call.
pub(crate) fn unexpected(target: impl Into<String>, reply: &Reply) -> NodeError {
    NodeError::unreachable(target, format!("unexpected reply {:?}", reply))
}
