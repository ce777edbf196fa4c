// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

/*!
 * This crate lets a handful of independent chat nodes organize themselves
 * into one group with a single coordinator, and uses that coordinator to put
 * the group's messages in order. It has three moving parts:
 *
 *   - A _membership registry_ per node, filled by asking whichever peers a
 *     name directory already knows about for their own registries, and
 *     pruned whenever a call to a peer fails.
 *
 *   - The _bully algorithm_ for choosing the coordinator: the highest-id
 *     node that answers wins. A node that wants an election pokes every
 *     higher-id node it knows about; if none of them answer it takes over
 *     and tells everyone. A successful reply to the poke is the "OK", there
 *     is no separate answer message.
 *
 *   - _Lamport clocks_ for ordering: messages are forwarded to the
 *     coordinator, which stamps them with `max(local, received) + 1` and
 *     fans them out. Since one node does all the stamping, the group sees
 *     one sequence per coordinator incarnation.
 *
 * A background failure detector probes the coordinator and calls a new
 * election when the probe fails.
 *
 * What you do _not_ get: persistence, authentication, guaranteed delivery,
 * or any protection against network partitions (both sides of a split will
 * each happily elect a coordinator). Messages lost mid-broadcast stay lost,
 * and there is no ordering across coordinator changes.
 *
 * The crate doesn't care how nodes find or call each other; that's behind
 * the [`Gateway`] trait, a name directory plus a blocking call primitive.
 * [`LocalGateway`] is an in-process implementation used by the tests and by
 * the `conclave` console binary.
 *
 * ## Reference
 *
 * Hector Garcia-Molina. Elections in a Distributed Computing System.
 * IEEE Transactions on Computers, C-31(1):48-59, 1982.
 *
 * Leslie Lamport. Time, Clocks, and the Ordering of Events in a Distributed
 * System. Communications of the ACM, 21(7):558-565, 1978.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

mod clock;
mod command;
mod config;
mod detector;
mod election;
mod error;
mod gateway;
mod local;
mod message;
mod node;
mod registry;
mod relay;


pub use clock::{increment, merge, LogicalClock, Timestamp};
pub use command::Command;
pub use config::{ConfigError, NodeConfig};
pub use detector::FailureDetector;
pub use election::ElectionState;
pub use error::{NodeError, Result};
pub use gateway::{ChatNode, Gateway, Handle};
pub use local::LocalGateway;
pub use message::{Call, ChatMessage, NodeInfo, Reply};
pub use node::Node;
pub use registry::{NodeRecord, Registry};
pub use relay::MessageHistory;

/// Nodes are identified by a cluster-unique integer. Nothing checks the
/// uniqueness; two nodes sharing an id will confuse each other. The order
/// on ids is the election priority.
#[derive(
    Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(NodeId)
    }
}
