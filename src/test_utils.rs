//! Shared mocks: a journal of module calls, scriptable validation and hook
//! modules, and a host recording external calls.

use alloy::primitives::{Address, B256, Bytes, U256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::abi::{ERC1271_INVALID, ERC1271_MAGIC_VALUE, PackedUserOperation};
use crate::codec::{SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCEEDED};
use crate::context::{BlockInfo, Host, RuntimeContext};
use crate::error::Revert;
use crate::module::{
    ExecutionHookModule, ExecutionModule, Module, ValidationHookModule, ValidationModule, encode_hook_context,
};
use crate::types::Selector;

pub const TEST_ACCOUNT: Address = Address::repeat_byte(0xac);

pub fn test_ctx() -> RuntimeContext {
    RuntimeContext::new(
        TEST_ACCOUNT,
        1,
        BlockInfo {
            timestamp: 100,
            number: 1,
        },
    )
}

fn text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Ordered log of module callbacks shared by every mock.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries containing `pattern`, in order.
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        self.entries().into_iter().filter(|e| e.contains(pattern)).collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Debug)]
pub struct MockValidationModule {
    name: &'static str,
    journal: Journal,
    fail_install: bool,
    fail_uninstall: bool,
    user_op_result: U256,
    runtime_revert: Option<Revert>,
    signature_valid: bool,
}

impl MockValidationModule {
    pub fn new(name: &'static str, journal: Journal) -> Self {
        Self {
            name,
            journal,
            fail_install: false,
            fail_uninstall: false,
            user_op_result: SIG_VALIDATION_SUCCEEDED,
            runtime_revert: None,
            signature_valid: true,
        }
    }

    pub fn failing_install(mut self) -> Self {
        self.fail_install = true;
        self
    }

    pub fn failing_uninstall(mut self) -> Self {
        self.fail_uninstall = true;
        self
    }

    pub fn with_user_op_result(mut self, result: U256) -> Self {
        self.user_op_result = result;
        self
    }

    pub fn rejecting_runtime(mut self) -> Self {
        self.runtime_revert = Some(Revert::reason("runtime rejected"));
        self
    }

    pub fn rejecting_signatures(mut self) -> Self {
        self.signature_valid = false;
        self
    }
}

impl Module for MockValidationModule {
    fn module_id(&self) -> &str {
        self.name
    }

    fn on_install(&self, _ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert> {
        self.journal.record(format!("{}.on_install:{}", self.name, text(data)));
        if self.fail_install {
            return Err(Revert::reason("install refused"));
        }
        Ok(())
    }

    fn on_uninstall(&self, _ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert> {
        self.journal.record(format!("{}.on_uninstall:{}", self.name, text(data)));
        if self.fail_uninstall {
            return Err(Revert::reason("uninstall refused"));
        }
        Ok(())
    }

    fn as_validation(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for MockValidationModule {
    fn validate_user_op(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        op: &PackedUserOperation,
        _op_hash: B256,
    ) -> Result<U256, Revert> {
        self.journal
            .record(format!("{}.validate_user_op[{entity_id}]:{}", self.name, text(&op.signature)));
        Ok(self.user_op_result)
    }

    fn validate_runtime(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        _sender: Address,
        _value: U256,
        _data: &[u8],
        authorization: &[u8],
    ) -> Result<(), Revert> {
        self.journal
            .record(format!("{}.validate_runtime[{entity_id}]:{}", self.name, text(authorization)));
        match &self.runtime_revert {
            Some(revert) => Err(revert.clone()),
            None => Ok(()),
        }
    }

    fn validate_signature(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        _sender: Address,
        _hash: B256,
        signature: &[u8],
    ) -> Result<Selector, Revert> {
        self.journal
            .record(format!("{}.validate_signature[{entity_id}]:{}", self.name, text(signature)));
        Ok(if self.signature_valid { ERC1271_MAGIC_VALUE } else { ERC1271_INVALID })
    }
}

/// Validation and execution hook module; optionally an execution module too.
#[derive(Debug)]
pub struct MockHookModule {
    name: &'static str,
    journal: Journal,
    reject_entity: Option<u32>,
    revert_entity: Option<u32>,
    window: Option<U256>,
    bad_context: bool,
    execution: bool,
}

impl MockHookModule {
    pub fn new(name: &'static str, journal: Journal) -> Self {
        Self {
            name,
            journal,
            reject_entity: None,
            revert_entity: None,
            window: None,
            bad_context: false,
            execution: false,
        }
    }

    /// Returns signature failure from the validation hook with this entity id.
    pub fn rejecting(mut self, entity_id: u32) -> Self {
        self.reject_entity = Some(entity_id);
        self
    }

    /// Reverts from every hook with this entity id.
    pub fn reverting(mut self, entity_id: u32) -> Self {
        self.revert_entity = Some(entity_id);
        self
    }

    /// Returns this packed validation data from user op validation hooks.
    pub fn with_validation_data(mut self, data: U256) -> Self {
        self.window = Some(data);
        self
    }

    /// Pre-execution hooks return data that is not an encoded context.
    pub fn with_bad_context(mut self) -> Self {
        self.bad_context = true;
        self
    }

    /// Also serves installed execution functions.
    pub fn with_execution(mut self) -> Self {
        self.execution = true;
        self
    }

    fn check_revert(&self, entity_id: u32) -> Result<(), Revert> {
        if self.revert_entity == Some(entity_id) {
            return Err(Revert::reason(format!("{} hook {entity_id} reverted", self.name)));
        }
        Ok(())
    }
}

impl Module for MockHookModule {
    fn module_id(&self) -> &str {
        self.name
    }

    fn on_install(&self, _ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert> {
        self.journal.record(format!("{}.on_install:{}", self.name, text(data)));
        Ok(())
    }

    fn on_uninstall(&self, _ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert> {
        self.journal.record(format!("{}.on_uninstall:{}", self.name, text(data)));
        Ok(())
    }

    fn as_validation_hook(&self) -> Option<&dyn ValidationHookModule> {
        Some(self)
    }

    fn as_execution_hook(&self) -> Option<&dyn ExecutionHookModule> {
        Some(self)
    }

    fn as_execution(&self) -> Option<&dyn ExecutionModule> {
        self.execution.then_some(self as &dyn ExecutionModule)
    }
}

impl ValidationHookModule for MockHookModule {
    fn pre_user_op_validation_hook(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        op: &PackedUserOperation,
        _op_hash: B256,
    ) -> Result<U256, Revert> {
        self.journal
            .record(format!("{}.pre_validation[{entity_id}]:{}", self.name, text(&op.signature)));
        self.check_revert(entity_id)?;
        if self.reject_entity == Some(entity_id) {
            return Ok(SIG_VALIDATION_FAILED);
        }
        Ok(self.window.unwrap_or(SIG_VALIDATION_SUCCEEDED))
    }

    fn pre_runtime_validation_hook(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        _sender: Address,
        _value: U256,
        _data: &[u8],
        authorization: &[u8],
    ) -> Result<(), Revert> {
        self.journal
            .record(format!("{}.pre_runtime[{entity_id}]:{}", self.name, text(authorization)));
        self.check_revert(entity_id)
    }

    fn pre_signature_validation_hook(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        _sender: Address,
        _hash: B256,
        signature: &[u8],
    ) -> Result<(), Revert> {
        self.journal
            .record(format!("{}.pre_signature[{entity_id}]:{}", self.name, text(signature)));
        self.check_revert(entity_id)
    }
}

impl ExecutionHookModule for MockHookModule {
    fn pre_execution_hook(
        &self,
        _ctx: &RuntimeContext,
        entity_id: u32,
        _sender: Address,
        _value: U256,
        _data: &[u8],
    ) -> Result<Bytes, Revert> {
        self.journal.record(format!("{}.pre_exec[{entity_id}]", self.name));
        self.check_revert(entity_id)?;
        if self.bad_context {
            return Ok(Bytes::from_static(b"short"));
        }
        Ok(encode_hook_context(format!("ctx{entity_id}").as_bytes()))
    }

    fn post_execution_hook(&self, _ctx: &RuntimeContext, entity_id: u32, pre_context: &[u8]) -> Result<(), Revert> {
        self.journal
            .record(format!("{}.post_exec[{entity_id}]:{}", self.name, text(pre_context)));
        self.check_revert(entity_id)
    }
}

impl ExecutionModule for MockHookModule {
    fn execute(&self, _ctx: &RuntimeContext, _sender: Address, _value: U256, data: &[u8]) -> Result<Bytes, Revert> {
        self.journal.record(format!("{}.execute:{}", self.name, data.len()));
        Ok(Bytes::from_static(b"executed"))
    }
}

#[derive(Debug, Default)]
struct HostState {
    block: BlockInfo,
    calls: Vec<(Address, U256, Bytes)>,
    reverting: HashSet<Address>,
}

/// Host recording every external call. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    state: Arc<Mutex<HostState>>,
    journal: Option<Journal>,
}

impl RecordingHost {
    pub fn new(timestamp: u64) -> Self {
        let host = Self::default();
        host.set_timestamp(timestamp);
        host
    }

    /// Also logs calls into `journal` so they interleave with hook calls.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.lock().unwrap().block.timestamp = timestamp;
    }

    pub fn revert_on(&self, target: Address) {
        self.state.lock().unwrap().reverting.insert(target);
    }

    pub fn calls(&self) -> Vec<(Address, U256, Bytes)> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Host for RecordingHost {
    fn block(&self) -> BlockInfo {
        self.state.lock().unwrap().block
    }

    fn call(&mut self, target: Address, value: U256, data: &[u8]) -> Result<Bytes, Revert> {
        if let Some(journal) = &self.journal {
            journal.record(format!("host.call:{target}"));
        }
        let mut state = self.state.lock().unwrap();
        if state.reverting.contains(&target) {
            return Err(Revert::reason("target reverted"));
        }
        state.calls.push((target, value, Bytes::copy_from_slice(data)));
        Ok(Bytes::from_static(b"result"))
    }
}
