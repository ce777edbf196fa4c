// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Call, Reply, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An opaque reference to a remote node, good for passing back to the
/// `Gateway` that produced it. Directories here are name-based, so the
/// handle carries the name the node was published under.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(String);

impl Handle {
    pub fn new(name: impl Into<String>) -> Self {
        Handle(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The server side of the node-to-node contract. A `Gateway` routes each
/// inbound `Call` to the `ChatNode` published under the target name.
///
/// Implementations must tolerate re-entrant calls: handling one call
/// commonly issues others that come back to the same node before the first
/// one returns.
pub trait ChatNode: Send + Sync {
    fn handle(&self, call: Call) -> Result<Reply>;
}

/// The remote-invocation gateway: a name directory plus a blocking call.
///
/// Responsibility for transport, encoding, and timeouts lies with the
/// implementation. The protocol only relies on `invoke` eventually either
/// returning the callee's reply or failing with `NodeError::Unreachable`,
/// and on `lookup` failing with `NodeError::NotFound` for unknown names.
pub trait Gateway: Send + Sync {
    /// Publish `service` under `name`, returning the handle peers should use
    /// to reach it. Fails with `NodeError::StartupFailure` if the name is
    /// taken.
    fn register(&self, name: &str, service: Arc<dyn ChatNode>) -> Result<Handle>;

    /// Every name currently in the directory.
    fn list(&self) -> Result<Vec<String>>;

    fn lookup(&self, name: &str) -> Result<Handle>;

    fn invoke(&self, handle: &Handle, call: Call) -> Result<Reply>;
}
