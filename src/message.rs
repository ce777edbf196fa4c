// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{ElectionState, NodeId, NodeRecord, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat line. The timestamp is provisional while the message travels from
/// its sender to the coordinator; the coordinator stamps it for good and
/// records itself as `sequencer` before fanning it out.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub sender_id: NodeId,
    pub sender_name: String,
    pub logical_timestamp: Timestamp,
    /// The coordinator that finalized `logical_timestamp`, if any yet.
    pub sequencer: Option<NodeId>,
}

impl ChatMessage {
    pub fn new(
        content: impl Into<String>,
        sender_id: NodeId,
        sender_name: impl Into<String>,
        logical_timestamp: Timestamp,
    ) -> Self {
        ChatMessage {
            content: content.into(),
            sender_id,
            sender_name: sender_name.into(),
            logical_timestamp,
            sequencer: None,
        }
    }

    pub fn is_sequenced(&self) -> bool {
        self.sequencer.is_some()
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.logical_timestamp, self.sender_name, self.content
        )
    }
}

/// Plain-data status of one node, as shown to a user or asked for by a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub is_coordinator: bool,
    pub coordinator: Option<NodeId>,
    pub logical_clock: Timestamp,
    pub election: ElectionState,
    pub peer_count: usize,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coordinator = match self.coordinator {
            Some(c) => c.to_string(),
            None => "none".to_string(),
        };
        write!(
            f,
            "node {} ({}) coordinator={} clock={} election={:?} peers={}",
            self.id, self.name, coordinator, self.logical_clock, self.election, self.peer_count
        )
    }
}

/// Calls are the node-to-node contract: every node answers all of these.
/// They are point-to-point and blocking; a broadcast is just the same call
/// issued to each peer in turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    ReceiveMessage(ChatMessage),
    StartElection,
    ElectionMessage { sender: NodeId },
    CoordinatorMessage { coordinator: NodeId },
    RegisterNode(NodeRecord),
    GetRegisteredNodes,
    GetNodeId,
    GetNodeInfo,
    IsAlive,
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::ReceiveMessage(_) => "receiveMessage",
            Call::StartElection => "startElection",
            Call::ElectionMessage { .. } => "electionMessage",
            Call::CoordinatorMessage { .. } => "coordinatorMessage",
            Call::RegisterNode(_) => "registerNode",
            Call::GetRegisteredNodes => "getRegisteredNodes",
            Call::GetNodeId => "getNodeId",
            Call::GetNodeInfo => "getNodeInfo",
            Call::IsAlive => "isAlive",
        }
    }
}

/// Replies, one shape per kind of call. Anything that only needs to say
/// "done" answers `Ack`; the success of the call is the acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ack,
    /// The message as recorded by the callee, with its new timestamp.
    Accepted(ChatMessage),
    Nodes(Vec<NodeRecord>),
    NodeId(NodeId),
    Info(NodeInfo),
    Alive(bool),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Handle;

    #[test]
    fn calls_and_replies_survive_json() {
        let mut message = ChatMessage::new("hello", NodeId(1), "ann", 4);
        message.sequencer = Some(NodeId(3));
        let call = Call::ReceiveMessage(message);
        let text = serde_json::to_string(&call).unwrap();
        assert_eq!(serde_json::from_str::<Call>(&text).unwrap(), call);

        let reply = Reply::Nodes(vec![NodeRecord {
            id: NodeId(2),
            name: "bob".into(),
            handle: Handle::new("ChatNode_2"),
        }]);
        let text = serde_json::to_string(&reply).unwrap();
        assert_eq!(serde_json::from_str::<Reply>(&text).unwrap(), reply);

        let call = Call::CoordinatorMessage {
            coordinator: NodeId(3),
        };
        let text = serde_json::to_string(&call).unwrap();
        assert_eq!(serde_json::from_str::<Call>(&text).unwrap(), call);
    }
}
