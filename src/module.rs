//! Module capability traits and the directory resolving module addresses.
//!
//! A module is third-party code selected at install time. Every call across
//! this boundary is untrusted: it may revert, return garbage, or lie. The
//! pipeline bounds its effect with the authority and recursion checks rather
//! than trusting it.

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::sol_types::SolValue;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::abi::PackedUserOperation;
use crate::context::RuntimeContext;
use crate::error::{AccountError, AccountResult, Revert};
use crate::types::Selector;

/// Interface names used in `InterfaceNotSupported` errors.
pub const VALIDATION_INTERFACE: &str = "IValidationModule";
pub const VALIDATION_HOOK_INTERFACE: &str = "IValidationHookModule";
pub const EXECUTION_HOOK_INTERFACE: &str = "IExecutionHookModule";
pub const EXECUTION_INTERFACE: &str = "IExecutionModule";

/// Base trait of every module.
///
/// Capabilities are discovered through the `as_*` accessors, which default to
/// `None`. Install fails with `InterfaceNotSupported` when a module is used in
/// a role it does not implement.
pub trait Module: Send + Sync + Debug {
    /// Human-readable identifier, e.g. `"example.single-signer.1.0.0"`.
    fn module_id(&self) -> &str;

    fn on_install(&self, ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert>;

    fn on_uninstall(&self, ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert>;

    /// Encoded copy of the state this module keeps for `account`.
    ///
    /// Taken before every account operation and handed back to
    /// [`Module::restore_state`] when the operation fails, so that install and
    /// uninstall side effects roll back together with the registry. Stateless
    /// modules keep the defaults.
    fn snapshot_state(&self, _account: Address) -> Bytes {
        Bytes::new()
    }

    /// Replaces the state kept for `account` with a [`Module::snapshot_state`] copy.
    fn restore_state(&self, _account: Address, _state: &[u8]) -> Result<(), Revert> {
        Ok(())
    }

    fn as_validation(&self) -> Option<&dyn ValidationModule> {
        None
    }

    fn as_validation_hook(&self) -> Option<&dyn ValidationHookModule> {
        None
    }

    fn as_execution_hook(&self) -> Option<&dyn ExecutionHookModule> {
        None
    }

    fn as_execution(&self) -> Option<&dyn ExecutionModule> {
        None
    }
}

/// Primary authorization check.
pub trait ValidationModule {
    /// Returns packed ERC-4337 validation data. `op.signature` carries only the
    /// validation function's own data.
    fn validate_user_op(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        op: &PackedUserOperation,
        op_hash: B256,
    ) -> Result<U256, Revert>;

    /// Reverts to reject.
    fn validate_runtime(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        sender: Address,
        value: U256,
        data: &[u8],
        authorization: &[u8],
    ) -> Result<(), Revert>;

    /// Returns the ERC-1271 magic value when `signature` is valid over `hash`.
    fn validate_signature(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        sender: Address,
        hash: B256,
        signature: &[u8],
    ) -> Result<Selector, Revert>;
}

/// Checks run before the validation function, each with its own signature segment.
pub trait ValidationHookModule {
    fn pre_user_op_validation_hook(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        op: &PackedUserOperation,
        op_hash: B256,
    ) -> Result<U256, Revert>;

    fn pre_runtime_validation_hook(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        sender: Address,
        value: U256,
        data: &[u8],
        authorization: &[u8],
    ) -> Result<(), Revert>;

    fn pre_signature_validation_hook(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        sender: Address,
        hash: B256,
        signature: &[u8],
    ) -> Result<(), Revert>;
}

/// Hooks wrapped around execution.
pub trait ExecutionHookModule {
    /// Raw return data. It must be an ABI-encoded `bytes` value; the decoded
    /// bytes are handed back to the paired post hook.
    fn pre_execution_hook(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        sender: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Revert>;

    fn post_execution_hook(&self, ctx: &RuntimeContext, entity_id: u32, pre_context: &[u8]) -> Result<(), Revert>;
}

/// Module contributing functions to the account's call surface.
///
/// The manifest is supplied by the installer in `installExecution` call data.
pub trait ExecutionModule {
    /// Handles a call to one of the selectors installed for this module.
    fn execute(&self, ctx: &RuntimeContext, sender: Address, value: U256, data: &[u8]) -> Result<Bytes, Revert>;
}

/// Encodes a pre-execution hook context the way the account expects it back.
pub fn encode_hook_context(context: &[u8]) -> Bytes {
    Bytes::copy_from_slice(context).abi_encode().into()
}

/// Decodes a pre-execution hook's raw return data into its context.
pub fn decode_hook_context(raw: &[u8]) -> Option<Bytes> {
    Bytes::abi_decode(raw).ok()
}

/// Maps module addresses to their implementations.
#[derive(Debug, Clone, Default)]
pub struct ModuleDirectory {
    modules: HashMap<Address, Arc<dyn Module>>,
}

impl ModuleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` at `address`, replacing any previous registration.
    pub fn register(&mut self, address: Address, module: Arc<dyn Module>) {
        tracing::debug!(%address, module_id = module.module_id(), "registered module");
        self.modules.insert(address, module);
    }

    pub fn get(&self, address: Address) -> AccountResult<Arc<dyn Module>> {
        self.modules
            .get(&address)
            .cloned()
            .ok_or(AccountError::UnknownModule { module: address })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, &Arc<dyn Module>)> {
        self.modules.iter().map(|(address, module)| (*address, module))
    }

    pub fn contains(&self, address: Address) -> bool {
        self.modules.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Builder for constructing module directories.
#[derive(Debug, Default)]
pub struct ModuleDirectoryBuilder {
    directory: ModuleDirectory,
}

impl ModuleDirectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, address: Address, module: Arc<dyn Module>) -> Self {
        self.directory.register(address, module);
        self
    }

    pub fn build(self) -> ModuleDirectory {
        self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop;

    impl Module for Noop {
        fn module_id(&self) -> &str {
            "test.noop"
        }

        fn on_install(&self, _ctx: &RuntimeContext, _data: &[u8]) -> Result<(), Revert> {
            Ok(())
        }

        fn on_uninstall(&self, _ctx: &RuntimeContext, _data: &[u8]) -> Result<(), Revert> {
            Ok(())
        }
    }

    #[test]
    fn test_directory_builder() {
        let directory = ModuleDirectoryBuilder::new()
            .with_module(Address::repeat_byte(1), Arc::new(Noop))
            .build();

        assert_eq!(directory.len(), 1);
        assert!(directory.contains(Address::repeat_byte(1)));
        let module = directory.get(Address::repeat_byte(1)).unwrap();
        assert_eq!(module.module_id(), "test.noop");
        assert!(module.as_validation().is_none());
        assert!(module.snapshot_state(Address::ZERO).is_empty());
        assert!(module.restore_state(Address::ZERO, &[]).is_ok());
        let addresses: Vec<Address> = directory.iter().map(|(address, _)| address).collect();
        assert_eq!(addresses, vec![Address::repeat_byte(1)]);
        assert_eq!(
            directory.get(Address::repeat_byte(2)).unwrap_err(),
            AccountError::UnknownModule {
                module: Address::repeat_byte(2)
            }
        );
    }

    #[test]
    fn test_hook_context_encoding() {
        let raw = encode_hook_context(b"ctx");
        assert!(raw.len() >= 64);
        assert_eq!(decode_hook_context(&raw), Some(Bytes::from_static(b"ctx")));
        assert_eq!(decode_hook_context(&[0u8; 10]), None);
    }
}
