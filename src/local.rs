// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Call, ChatNode, Gateway, Handle, NodeError, Reply, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

struct Binding {
    service: Weak<dyn ChatNode>,
    crashed: bool,
}

/// A `Gateway` whose directory and calls never leave the process. Calls
/// dispatch straight into the target's `ChatNode::handle` on the caller's
/// thread.
///
/// Services are held weakly, so a dropped node simply becomes unreachable.
/// For fault injection a name can be `crash`ed, which keeps it listed (like
/// a stale directory entry) but fails every call to it, or `unbind`ed, which
/// removes it outright.
#[derive(Default)]
pub struct LocalGateway {
    bindings: RwLock<BTreeMap<String, Binding>>,
}

impl LocalGateway {
    pub fn new() -> Self {
        LocalGateway::default()
    }

    /// Make every call to `name` fail as if the process had died.
    pub fn crash(&self, name: &str) -> bool {
        match self.bindings.write().get_mut(name) {
            Some(b) => {
                debug!("crashing `{}`", name);
                b.crashed = true;
                true
            }
            None => false,
        }
    }

    /// Undo `crash`. The node keeps whatever state it had; its peers may
    /// well have pruned it in the meantime.
    pub fn restore(&self, name: &str) -> bool {
        match self.bindings.write().get_mut(name) {
            Some(b) => {
                debug!("restoring `{}`", name);
                b.crashed = false;
                true
            }
            None => false,
        }
    }

    pub fn unbind(&self, name: &str) -> bool {
        self.bindings.write().remove(name).is_some()
    }
}

impl Gateway for LocalGateway {
    fn register(&self, name: &str, service: Arc<dyn ChatNode>) -> Result<Handle> {
        let mut bindings = self.bindings.write();
        if let Some(existing) = bindings.get(name).and_then(|b| b.service.upgrade()) {
            // Re-registering the same service is how a restored node
            // republishes itself; anyone else is a name collision.
            if Arc::as_ptr(&existing) as *const () != Arc::as_ptr(&service) as *const () {
                return Err(NodeError::StartupFailure(format!(
                    "name `{}` is already bound",
                    name
                )));
            }
        }
        bindings.insert(
            name.to_string(),
            Binding {
                service: Arc::downgrade(&service),
                crashed: false,
            },
        );
        debug!("bound `{}`", name);
        Ok(Handle::new(name))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.bindings.read().keys().cloned().collect())
    }

    fn lookup(&self, name: &str) -> Result<Handle> {
        if self.bindings.read().contains_key(name) {
            Ok(Handle::new(name))
        } else {
            Err(NodeError::NotFound(name.to_string()))
        }
    }

    fn invoke(&self, handle: &Handle, call: Call) -> Result<Reply> {
        // The directory lock must be released before dispatching, since the
        // callee will usually call back out through this same gateway.
        let service = {
            let bindings = self.bindings.read();
            match bindings.get(handle.name()) {
                None => return Err(NodeError::unreachable(handle.name(), "not bound")),
                Some(b) if b.crashed => {
                    return Err(NodeError::unreachable(handle.name(), "crashed"))
                }
                Some(b) => b.service.upgrade(),
            }
        };
        let service =
            service.ok_or_else(|| NodeError::unreachable(handle.name(), "service dropped"))?;
        trace!("invoke {} on `{}`", call.name(), handle);
        service.handle(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ChatNode for Echo {
        fn handle(&self, call: Call) -> Result<Reply> {
            match call {
                Call::IsAlive => Ok(Reply::Alive(true)),
                _ => Ok(Reply::Ack),
            }
        }
    }

    #[test]
    fn directory_round_trip() {
        let gw = LocalGateway::new();
        let echo: Arc<dyn ChatNode> = Arc::new(Echo);
        let handle = gw.register("ChatNode_1", echo.clone()).unwrap();
        assert_eq!(gw.list().unwrap(), vec!["ChatNode_1".to_string()]);
        assert_eq!(gw.lookup("ChatNode_1").unwrap(), handle);
        assert_eq!(
            gw.lookup("ChatNode_2"),
            Err(NodeError::NotFound("ChatNode_2".into()))
        );
        assert_eq!(gw.invoke(&handle, Call::IsAlive).unwrap(), Reply::Alive(true));
    }

    #[test]
    fn name_collision_is_a_startup_failure() {
        let gw = LocalGateway::new();
        let first: Arc<dyn ChatNode> = Arc::new(Echo);
        let second: Arc<dyn ChatNode> = Arc::new(Echo);
        gw.register("ChatNode_1", first.clone()).unwrap();
        assert!(matches!(
            gw.register("ChatNode_1", second),
            Err(NodeError::StartupFailure(_))
        ));
        // The same service may publish itself again.
        assert!(gw.register("ChatNode_1", first).is_ok());
    }

    #[test]
    fn crashed_and_dropped_services_are_unreachable() {
        let gw = LocalGateway::new();
        let echo: Arc<dyn ChatNode> = Arc::new(Echo);
        let handle = gw.register("ChatNode_1", echo.clone()).unwrap();

        assert!(gw.crash("ChatNode_1"));
        let err = gw.invoke(&handle, Call::IsAlive).unwrap_err();
        assert!(matches!(err, NodeError::Unreachable { .. }));
        // Still listed, like a stale directory entry.
        assert!(gw.lookup("ChatNode_1").is_ok());

        assert!(gw.restore("ChatNode_1"));
        assert!(gw.invoke(&handle, Call::IsAlive).is_ok());

        assert!(gw.unbind("ChatNode_1"));
        assert_eq!(
            gw.lookup("ChatNode_1"),
            Err(NodeError::NotFound("ChatNode_1".into()))
        );
        gw.register("ChatNode_1", echo.clone()).unwrap();

        drop(echo);
        assert!(gw.invoke(&handle, Call::IsAlive).unwrap_err().is_peer_failure());
        // A dead binding no longer blocks the name.
        let fresh: Arc<dyn ChatNode> = Arc::new(Echo);
        assert!(gw.register("ChatNode_1", fresh).is_ok());
    }
}
