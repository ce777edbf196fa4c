// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::node::unexpected;
use crate::{Call, ChatMessage, Node, NodeError, NodeId, Reply, Result};
use im::Vector;
use parking_lot::RwLock;
use tracing::{debug, trace};

/// The messages a node has delivered, in the order it delivered them. This
/// is a local view only: two nodes agree on order just for messages that
/// went through the same coordinator.
#[derive(Debug, Default)]
pub struct MessageHistory {
    messages: RwLock<Vector<ChatMessage>>,
}

impl MessageHistory {
    pub fn append(&self, message: ChatMessage) {
        self.messages.write().push_back(message);
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.read().iter().cloned().collect()
    }
}

impl Node {
    /// Send a chat line from the local user.
    ///
    /// The coordinator stamps and broadcasts its own messages directly.
    /// Everyone else forwards to the coordinator and records the stamped
    /// copy it sends back. With no coordinator, one that can't be reached,
    /// or one that turns out not to be coordinating any more, the message
    /// is dropped and an election started; the caller
    /// gets the error and may try again once a coordinator is known.
    pub fn send_message(&self, content: &str) -> Result<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(NodeError::InvalidInput("empty message".to_string()));
        }

        let coordinator = match self.election.coordinator() {
            Some(c) => c,
            None => {
                self.note("cannot send message: no coordinator available");
                self.start_election();
                return Err(NodeError::NoCoordinator(self.id));
            }
        };

        if coordinator == self.id {
            let mut message =
                ChatMessage::new(content, self.id, self.name.clone(), self.clock.increment());
            message.sequencer = Some(self.id);
            self.history.append(message.clone());
            debug!(node = %self.id, "sequenced own message {}", message);
            self.fan_out(&message);
            return Ok(message);
        }

        let message = ChatMessage::new(content, self.id, self.name.clone(), self.clock.increment());
        match self.forward(coordinator, message) {
            Ok(stamped) => Ok(self.deliver(stamped)),
            Err(e) => {
                self.note(format!("error sending message to coordinator {}: {}", coordinator, e));
                if e.is_peer_failure() {
                    self.prune(coordinator, &e);
                } else if self.election.clear_coordinator_if(coordinator) {
                    self.note(format!("node {} no longer coordinates", coordinator));
                }
                self.start_election();
                Err(e)
            }
        }
    }

    /// Inbound `receiveMessage`: fold the incoming timestamp into the clock,
    /// stamp the message with the result and record it. At the coordinator
    /// this is also where a forwarded message gets its final timestamp and
    /// is fanned out to everyone but its sender. An unsequenced message
    /// arriving anywhere else is refused, and its sender gets the error.
    pub fn receive_message(&self, mut message: ChatMessage) -> Result<ChatMessage> {
        let sequencing = !message.is_sequenced();
        if sequencing && !self.is_coordinator() {
            self.note(format!(
                "refused message from node {}: not the coordinator",
                message.sender_id
            ));
            return Err(NodeError::NotCoordinator(self.id));
        }
        if sequencing {
            message.sequencer = Some(self.id);
        }
        let message = self.deliver(message);
        if sequencing {
            debug!(node = %self.id, "sequenced message {}", message);
            self.fan_out(&message);
        }
        Ok(message)
    }

    fn deliver(&self, mut message: ChatMessage) -> ChatMessage {
        message.logical_timestamp = self.clock.merge(message.logical_timestamp);
        trace!(node = %self.id, "delivered {}", message);
        self.history.append(message.clone());
        message
    }

    fn forward(&self, coordinator: NodeId, message: ChatMessage) -> Result<ChatMessage> {
        let handle = self.registry.lookup(coordinator)?;
        match self.gateway.invoke(&handle, Call::ReceiveMessage(message))? {
            Reply::Accepted(stamped) if stamped.is_sequenced() => Ok(stamped),
            Reply::Accepted(_) => Err(NodeError::NotCoordinator(coordinator)),
            other => Err(unexpected(handle.name(), &other)),
        }
    }

    /// Best-effort broadcast of a sequenced message to every peer except
    /// its sender. Peers that fail are pruned and the message is not
    /// retried for them.
    fn fan_out(&self, message: &ChatMessage) {
        let mut lost_coordinator = false;
        for peer in self.registry.peers_except(&[self.id, message.sender_id]) {
            if let Err(e) = self
                .gateway
                .invoke(&peer.handle, Call::ReceiveMessage(message.clone()))
            {
                lost_coordinator |= self.prune(peer.id, &e);
            }
        }
        if lost_coordinator {
            self.start_election();
        }
    }
}
