// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::NodeId;
use thiserror::Error;

/// Everything that can go wrong while a node talks to its peers or its
/// local caller. None of these are fatal: peer-facing errors are recovered
/// by pruning and re-electing, local ones are handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// A call to a peer failed or timed out.
    #[error("peer `{target}` unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    /// A directory or registry lookup found nothing under the key.
    #[error("`{0}` not found")]
    NotFound(String),

    /// A malformed local command or message.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The node could not publish itself under the directory.
    #[error("startup failure: {0}")]
    StartupFailure(String),

    /// `send_message` found no coordinator to hand the message to; an
    /// election has been started and the message was dropped.
    #[error("message not delivered: no coordinator known to node {0}")]
    NoCoordinator(NodeId),

    /// A message was forwarded for sequencing to a node that is not the
    /// coordinator, so nobody stamped or broadcast it.
    #[error("message not delivered: node {0} is not the coordinator")]
    NotCoordinator(NodeId),
}

impl NodeError {
    pub fn unreachable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeError::Unreachable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// True for the errors that mean "this peer is gone": both a failed
    /// call and a failed directory lookup get the peer pruned.
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, NodeError::Unreachable { .. } | NodeError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
