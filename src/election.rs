// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Call, Node, NodeId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

// The bully algorithm, with RPC success standing in for the "OK" answer.
//
// A node starting an election sends `electionMessage` to every known node
// with a higher id. Each higher node that takes the call has thereby
// acknowledged it, and goes on to run its own election in turn, so
// contention climbs the id order until it reaches the highest live node.
// That node finds nobody above it, declares itself coordinator, and
// announces so to everyone.
//
// A higher node whose call fails is pruned on the spot. If every higher node
// fails, the caller is the highest survivor and takes over itself.
//
// A caller that did get an answer stays `InProgress` until an announcement
// arrives. If the node that answered dies before announcing, nothing else
// would ever end the round, so the failure detector's tick abandons rounds
// older than the configured election timeout and starts a fresh one.
//
// Nothing numbers the rounds: an announcement always wins, whichever round
// it came from, and so the latest announcement received is what a node
// believes.

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    Idle,
    InProgress,
}

/// Per-node election bookkeeping. The in-progress flag is an atomic so
/// that checking and claiming it is a single step.
#[derive(Debug, Default)]
pub(crate) struct Election {
    in_progress: AtomicBool,
    coordinator: Mutex<Option<NodeId>>,
    started_at: Mutex<Option<Instant>>,
}

impl Election {
    /// Claim the election. False if one is already running.
    pub(crate) fn try_begin(&self) -> bool {
        let claimed = self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            *self.started_at.lock() = Some(Instant::now());
        }
        claimed
    }

    /// End any running round with `coordinator` as the outcome.
    pub(crate) fn settle(&self, coordinator: NodeId) {
        *self.coordinator.lock() = Some(coordinator);
        *self.started_at.lock() = None;
        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// End the running round without an outcome.
    pub(crate) fn abandon(&self) {
        *self.started_at.lock() = None;
        self.in_progress.store(false, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> ElectionState {
        if self.in_progress.load(Ordering::SeqCst) {
            ElectionState::InProgress
        } else {
            ElectionState::Idle
        }
    }

    pub(crate) fn coordinator(&self) -> Option<NodeId> {
        *self.coordinator.lock()
    }

    /// Forget the coordinator if it is `id`. Returns whether it was.
    pub(crate) fn clear_coordinator_if(&self, id: NodeId) -> bool {
        let mut coordinator = self.coordinator.lock();
        if *coordinator == Some(id) {
            *coordinator = None;
            true
        } else {
            false
        }
    }

    /// True if a round has been running for longer than `limit`.
    pub(crate) fn overdue(&self, limit: std::time::Duration) -> bool {
        match *self.started_at.lock() {
            Some(started) => self.state() == ElectionState::InProgress && started.elapsed() >= limit,
            None => false,
        }
    }
}

impl Node {
    /// Start an election unless one is already running at this node.
    /// Returns true if this call started one.
    pub fn start_election(&self) -> bool {
        if !self.election.try_begin() {
            trace!(node = %self.id, "election already in progress");
            return false;
        }
        self.note("starting election");

        let higher = self.registry.higher_than(self.id);
        if higher.is_empty() {
            self.become_coordinator();
            return true;
        }

        let mut answered = 0;
        for peer in higher {
            debug!(node = %self.id, "sending election message to {}", peer.id);
            match self
                .gateway
                .invoke(&peer.handle, Call::ElectionMessage { sender: self.id })
            {
                Ok(_) => answered += 1,
                Err(e) => {
                    self.prune(peer.id, &e);
                }
            }
        }

        if answered == 0 {
            self.note("no higher node answered");
            self.become_coordinator();
        } else {
            debug!(
                node = %self.id,
                "{} higher node(s) answered, awaiting coordinator announcement", answered
            );
        }
        true
    }

    /// Inbound `electionMessage`. Returning normally is the acknowledgment;
    /// the election it provokes here carries the contention further up.
    pub fn on_election_message(&self, sender: NodeId) {
        self.note(format!("received election message from node {}", sender));
        self.start_election();
    }

    /// Inbound `coordinatorMessage`. Always accepted.
    pub fn on_coordinator_message(&self, coordinator: NodeId) {
        self.election.settle(coordinator);
        self.note(format!("coordinator set to node {}", coordinator));
    }

    pub(crate) fn become_coordinator(&self) {
        self.election.settle(self.id);
        self.note("this node is now the coordinator");
        for peer in self.registry.peers() {
            if let Err(e) = self
                .gateway
                .invoke(&peer.handle, Call::CoordinatorMessage { coordinator: self.id })
            {
                self.prune(peer.id, &e);
            }
        }
    }

    /// Abandon a round that has waited longer than the election timeout
    /// for its announcement, and start a new one. Returns true if it did.
    pub fn check_election_timeout(&self) -> bool {
        if !self.election.overdue(self.config.election_timeout()) {
            return false;
        }
        self.note("election timed out without a coordinator announcement, restarting");
        self.election.abandon();
        self.start_election();
        true
    }
}
