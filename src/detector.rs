// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::node::unexpected;
use crate::{Call, Node, NodeError, Reply, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// A background thread that probes a node's coordinator once per probe
/// interval and calls an election the first time a probe fails. Only the
/// coordinator is watched; other peers are found dead when something
/// actually calls them.
///
/// The same tick gives up on elections that have waited too long for a
/// coordinator announcement.
///
/// The thread holds the node weakly and exits once the node is gone, or
/// when the detector is stopped or dropped.
pub struct FailureDetector {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FailureDetector {
    pub fn spawn(node: &Arc<Node>) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = node.config().probe_interval();
        let weak = Arc::downgrade(node);
        let thread = Builder::new()
            .name(format!("conclaveProbe{}", node.id()))
            .spawn(move || Self::run(weak, interval, stop_rx))
            .map_err(|e| NodeError::StartupFailure(format!("failed to spawn failure detector: {}", e)))?;
        debug!(node = %node.id(), "failure detector started, interval {:?}", interval);
        Ok(FailureDetector {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run(node: Weak<Node>, interval: Duration, stop: Receiver<()>) {
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => match node.upgrade() {
                    Some(node) => {
                        node.probe_coordinator();
                        node.check_election_timeout();
                    }
                    None => break,
                },
                // Stopped, or the detector handle is gone.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        trace!("failure detector exiting");
    }

    /// Stop the thread and wait for any probe in flight to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FailureDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Node {
    /// One liveness probe of the coordinator. On failure the coordinator is
    /// pruned and an election started. Returns false if the probe failed;
    /// when this node is the coordinator, or none is known, there is
    /// nothing to probe and the result is true.
    pub fn probe_coordinator(&self) -> bool {
        let coordinator = match self.election.coordinator() {
            Some(c) if c != self.id => c,
            _ => return true,
        };
        let outcome = self
            .registry
            .lookup(coordinator)
            .and_then(|handle| self.gateway.invoke(&handle, Call::IsAlive));
        let failure = match outcome {
            Ok(Reply::Alive(true)) => {
                trace!(node = %self.id, "coordinator {} alive", coordinator);
                return true;
            }
            Ok(Reply::Alive(false)) => {
                NodeError::unreachable(coordinator.to_string(), "reported not alive")
            }
            Ok(other) => unexpected(coordinator.to_string(), &other),
            Err(e) => e,
        };
        self.note(format!(
            "coordinator {} failed liveness probe: {}",
            coordinator, failure
        ));
        self.prune(coordinator, &failure);
        self.start_election();
        false
    }
}
