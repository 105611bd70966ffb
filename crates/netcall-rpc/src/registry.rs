//! The function registry: which handler runs for which call.
//!
//! Game code fills a [`FunctionRegistry`] at startup and hands it to
//! [`ProtocolContext::new`](crate::ProtocolContext::new), which owns it
//! read-only from then on. There is no way to register more functions once
//! the context exists.
//!
//! # Lookup rules
//!
//! A function is identified by its id *and* parameter count (overloads
//! share an id), and carries a [`Role`] saying where it may run. The same
//! id and count may be registered once per role, so a call can have a
//! client-side and a server-side handler at the same time.

use std::collections::HashMap;
use std::fmt;

use netcall_protocol::{FunctionId, NodeRole, ProtocolError, Reader, Role, TransferId};
use netcall_transport::PeerId;

use crate::RpcError;

/// What a handler learns about the call besides its parameters.
///
/// Only a peer identity and ids; nothing game-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// The peer that sent the call.
    pub peer: PeerId,
    /// The function being called.
    pub function_id: FunctionId,
    /// The transfer the call arrived in.
    pub transfer_id: TransferId,
}

/// A registered callback.
///
/// It reads its parameters off the [`Reader`] in the order the caller wrote
/// them. Returning a decode error (say, a truncated string) drops the call
/// with a log line; it never reaches the host's tick loop.
pub type Handler =
    Box<dyn Fn(&CallContext, &mut Reader<'_>) -> Result<(), ProtocolError> + Send + Sync>;

/// One registered function.
pub struct FunctionDescriptor {
    pub id: FunctionId,
    pub role: Role,
    pub parameter_count: usize,
    pub handler: Handler,
}

impl FunctionDescriptor {
    /// Creates a descriptor from any compatible closure.
    pub fn new<F>(id: FunctionId, role: Role, parameter_count: usize, handler: F) -> Self
    where
        F: Fn(&CallContext, &mut Reader<'_>) -> Result<(), ProtocolError> + Send + Sync + 'static,
    {
        Self {
            id,
            role,
            parameter_count,
            handler: Box::new(handler),
        }
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("parameter_count", &self.parameter_count)
            .finish_non_exhaustive()
    }
}

/// Table of every callable function, keyed by id.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// Each id maps to its overloads/roles, in registration order.
    functions: HashMap<FunctionId, Vec<FunctionDescriptor>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor.
    ///
    /// # Errors
    /// - [`RpcError::ReservedFunctionId`] for negative ids
    /// - [`RpcError::DuplicateDescriptor`] if the same id, parameter count
    ///   and role are already registered
    pub fn register(&mut self, descriptor: FunctionDescriptor) -> Result<(), RpcError> {
        if descriptor.id.is_reserved() {
            return Err(RpcError::ReservedFunctionId(descriptor.id));
        }

        let entries = self.functions.entry(descriptor.id).or_default();
        let duplicate = entries.iter().any(|d| {
            d.parameter_count == descriptor.parameter_count && d.role == descriptor.role
        });
        if duplicate {
            return Err(RpcError::DuplicateDescriptor {
                function_id: descriptor.id,
                parameter_count: descriptor.parameter_count,
                role: descriptor.role,
            });
        }

        tracing::debug!(
            function_id = %descriptor.id,
            role = %descriptor.role,
            parameter_count = descriptor.parameter_count,
            "function registered"
        );
        entries.push(descriptor);
        Ok(())
    }

    /// Shorthand for [`register`](Self::register) with a closure.
    pub fn register_handler<F>(
        &mut self,
        id: FunctionId,
        role: Role,
        parameter_count: usize,
        handler: F,
    ) -> Result<(), RpcError>
    where
        F: Fn(&CallContext, &mut Reader<'_>) -> Result<(), ProtocolError> + Send + Sync + 'static,
    {
        self.register(FunctionDescriptor::new(id, role, parameter_count, handler))
    }

    /// Every descriptor registered under `id`.
    pub fn get(&self, id: FunctionId) -> &[FunctionDescriptor] {
        self.functions.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Descriptors registered under `id` with exactly `role`.
    ///
    /// This is the sender's view: `invoke` names the role it is calling.
    pub fn with_role(&self, id: FunctionId, role: Role) -> impl Iterator<Item = &FunctionDescriptor> {
        self.get(id).iter().filter(move |d| d.role == role)
    }

    /// Finds the handler a node playing `node` should run for an incoming
    /// call.
    ///
    /// Never returns a descriptor whose role excludes `node`. When both a
    /// side-specific and a [`Role::Both`] descriptor match, the
    /// side-specific one wins. `None` is the normal answer for broadcast
    /// traffic meant for other participants.
    pub fn find(
        &self,
        id: FunctionId,
        parameter_count: usize,
        node: NodeRole,
    ) -> Option<&FunctionDescriptor> {
        let mut candidates = self
            .get(id)
            .iter()
            .filter(|d| d.parameter_count == parameter_count && d.role.runs_on(node));

        let first = candidates.next()?;
        if first.role != Role::Both {
            return Some(first);
        }
        candidates.find(|d| d.role != Role::Both).or(Some(first))
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.functions.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &CallContext, _: &mut Reader<'_>) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn registry_with(entries: &[(i32, Role, usize)]) -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        for &(id, role, count) in entries {
            reg.register_handler(FunctionId(id), role, count, noop)
                .expect("registration should succeed");
        }
        reg
    }

    // =====================================================================
    // register()
    // =====================================================================

    #[test]
    fn test_register_same_id_and_count_twice_returns_duplicate() {
        let mut reg = registry_with(&[(1, Role::Both, 2)]);
        let result = reg.register_handler(FunctionId(1), Role::Both, 2, noop);
        assert!(matches!(
            result,
            Err(RpcError::DuplicateDescriptor {
                parameter_count: 2,
                role: Role::Both,
                ..
            })
        ));
    }

    #[test]
    fn test_register_same_id_and_count_different_roles_is_allowed() {
        let reg = registry_with(&[(1, Role::ClientOnly, 2), (1, Role::ServerOnly, 2)]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_register_overloads_by_parameter_count() {
        let reg = registry_with(&[(1, Role::Both, 1), (1, Role::Both, 2)]);
        assert_eq!(reg.get(FunctionId(1)).len(), 2);
    }

    #[test]
    fn test_register_negative_id_is_reserved() {
        let mut reg = FunctionRegistry::new();
        let result = reg.register_handler(FunctionId(-1), Role::Both, 0, noop);
        assert!(matches!(result, Err(RpcError::ReservedFunctionId(_))));
        assert!(reg.is_empty());
    }

    // =====================================================================
    // find()
    // =====================================================================

    #[test]
    fn test_find_respects_role_for_every_node() {
        // Three function roles × two node roles.
        let cases = [
            (Role::ClientOnly, NodeRole::Client, true),
            (Role::ClientOnly, NodeRole::Server, false),
            (Role::ServerOnly, NodeRole::Client, false),
            (Role::ServerOnly, NodeRole::Server, true),
            (Role::Both, NodeRole::Client, true),
            (Role::Both, NodeRole::Server, true),
        ];

        for (role, node, expected) in cases {
            let reg = registry_with(&[(5, role, 1)]);
            let found = reg.find(FunctionId(5), 1, node);
            assert_eq!(found.is_some(), expected, "{role} on {node}");
            if let Some(d) = found {
                assert!(d.role.runs_on(node));
            }
        }
    }

    #[test]
    fn test_find_wrong_parameter_count_returns_none() {
        let reg = registry_with(&[(5, Role::Both, 2)]);
        assert!(reg.find(FunctionId(5), 3, NodeRole::Server).is_none());
    }

    #[test]
    fn test_find_unknown_id_returns_none() {
        let reg = registry_with(&[(5, Role::Both, 2)]);
        assert!(reg.find(FunctionId(6), 2, NodeRole::Server).is_none());
    }

    #[test]
    fn test_find_prefers_side_specific_over_both() {
        let reg = registry_with(&[(5, Role::Both, 1), (5, Role::ServerOnly, 1)]);
        let found = reg.find(FunctionId(5), 1, NodeRole::Server).unwrap();
        assert_eq!(found.role, Role::ServerOnly);

        let found = reg.find(FunctionId(5), 1, NodeRole::Client).unwrap();
        assert_eq!(found.role, Role::Both);
    }

    #[test]
    fn test_with_role_filters_exact_role() {
        let reg = registry_with(&[(5, Role::Both, 1), (5, Role::ClientOnly, 2)]);
        let counts: Vec<usize> = reg
            .with_role(FunctionId(5), Role::ClientOnly)
            .map(|d| d.parameter_count)
            .collect();
        assert_eq!(counts, vec![2]);
    }
}
