//! Call routing: caller permission, execution hooks and native dispatch.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};

use super::validation::ValidationScope;
use super::{ModularAccount, invalid_call_data, selector_of};
use crate::abi::IModularAccount::{
    executeBatchCall, executeCall, executeUserOpCall, executeWithRuntimeValidationCall, installExecutionCall,
    installValidationCall, isValidSignatureCall, uninstallExecutionCall, uninstallValidationCall, validateUserOpCall,
};
use crate::abi::{
    EXECUTE, EXECUTE_BATCH, EXECUTE_USER_OP, EXECUTE_WITH_RUNTIME_VALIDATION, INSTALL_EXECUTION, INSTALL_VALIDATION,
    IS_VALID_SIGNATURE, UNINSTALL_EXECUTION, UNINSTALL_VALIDATION, VALIDATE_USER_OP, is_top_level_entry,
};
use crate::codec::ValidationLocator;
use crate::error::{AccountError, AccountResult};
use crate::module::{EXECUTION_HOOK_INTERFACE, EXECUTION_INTERFACE, VALIDATION_HOOK_INTERFACE, decode_hook_context};
use crate::types::{HookConfig, ModuleEntity, Selector, ValidationConfig, ValidationLookupKey};

impl ModularAccount {
    /// Handles a call to the account from `caller`. Returns the ABI-encoded
    /// return data.
    pub fn call(&mut self, caller: Address, value: U256, data: &[u8]) -> AccountResult<Bytes> {
        self.atomically(|account| account.call_inner(caller, value, data))
    }

    pub(crate) fn call_inner(&mut self, caller: Address, value: U256, data: &[u8]) -> AccountResult<Bytes> {
        let selector = selector_of(data)?;
        if is_top_level_entry(selector) && self.depth > 0 {
            return Err(AccountError::SelfCallRecursionDepthExceeded);
        }

        if selector == EXECUTE_USER_OP {
            self.execute_user_op(caller, data)
        } else if selector == EXECUTE_WITH_RUNTIME_VALIDATION {
            self.execute_with_runtime_validation(caller, value, data)
        } else if selector == VALIDATE_USER_OP || selector == IS_VALID_SIGNATURE {
            self.dispatch(caller, value, data)
        } else {
            let hooks = self.check_permitted_caller(caller, value, data, selector)?;
            self.execute_with_hooks(caller, value, data, hooks)
        }
    }

    fn execute_user_op(&mut self, caller: Address, data: &[u8]) -> AccountResult<Bytes> {
        if caller != self.config.entry_point {
            return Err(AccountError::NotEntryPoint { caller });
        }
        let call = executeUserOpCall::abi_decode(data).map_err(invalid_call_data(EXECUTE_USER_OP))?;
        let op = call.userOp;
        if selector_of(&op.callData)? != EXECUTE_USER_OP {
            return Err(AccountError::InvalidCallData {
                selector: EXECUTE_USER_OP,
                reason: "user operation call data lacks the executeUserOp prefix".to_string(),
            });
        }

        let key = ValidationLocator::from_nonce(op.nonce)?.key;
        let hooks = self.registry.validation_execution_hooks(key);
        tracing::debug!(user_op_hash = %call.userOpHash, hooks = hooks.len(), "executing user operation");
        self.execute_with_hooks(caller, U256::ZERO, &op.callData[4..], hooks)
    }

    fn execute_with_runtime_validation(&mut self, caller: Address, value: U256, data: &[u8]) -> AccountResult<Bytes> {
        let call = executeWithRuntimeValidationCall::abi_decode(data)
            .map_err(invalid_call_data(EXECUTE_WITH_RUNTIME_VALIDATION))?;
        let key = self.validate_runtime_authorization(caller, value, &call.data, &call.authorization)?;
        let hooks = self.registry.validation_execution_hooks(key);
        self.execute_with_hooks(caller, value, &call.data, hooks)
    }

    /// Allows the entry point, the account itself, selectors that skip
    /// runtime validation, and callers with an applicable direct-call
    /// validation. Returns the execution hooks the caller's validation adds.
    fn check_permitted_caller(
        &self,
        caller: Address,
        value: U256,
        data: &[u8],
        selector: Selector,
    ) -> AccountResult<Vec<HookConfig>> {
        if caller == self.config.entry_point || caller == self.address() {
            return Ok(Vec::new());
        }
        if self
            .registry
            .execution(selector)
            .is_some_and(|entry| entry.skip_runtime_validation)
        {
            return Ok(Vec::new());
        }

        let key = ValidationLookupKey::DirectCall(caller);
        if !self.registry.is_installed(key) {
            return Err(AccountError::ValidationFunctionMissing { selector });
        }
        self.check_validation_applies(data, key, ValidationScope::Either, false)?;

        let ctx = self.runtime_context();
        for hook in self.registry.validation_hooks(key) {
            let module = self.module(hook.entity.module)?;
            let hook_module = module
                .as_validation_hook()
                .ok_or(AccountError::InterfaceNotSupported {
                    module: hook.entity.module,
                    interface: VALIDATION_HOOK_INTERFACE,
                })?;
            hook_module
                .pre_runtime_validation_hook(&ctx, hook.entity.entity_id, caller, value, data, &[])
                .map_err(|revert| AccountError::PreValidationHookReverted {
                    hook: hook.entity,
                    revert,
                })?;
        }

        tracing::debug!(%caller, %selector, "direct call authorized");
        Ok(self.registry.validation_execution_hooks(key))
    }

    /// Runs `data` wrapped in its selector's execution hooks followed by `extra`.
    fn execute_with_hooks(
        &mut self,
        caller: Address,
        value: U256,
        data: &[u8],
        extra: Vec<HookConfig>,
    ) -> AccountResult<Bytes> {
        let selector = selector_of(data)?;
        let mut hooks = self.registry.selector_execution_hooks(selector);
        hooks.extend(extra);

        self.depth += 1;
        let result = self.run_hook_chain(caller, value, data, &hooks);
        self.depth -= 1;
        result
    }

    fn run_hook_chain(&mut self, caller: Address, value: U256, data: &[u8], hooks: &[HookConfig]) -> AccountResult<Bytes> {
        let ctx = self.runtime_context();
        let mut contexts = Vec::with_capacity(hooks.len());

        for hook in hooks {
            if !hook.has_pre {
                contexts.push(Bytes::new());
                continue;
            }
            let module = self.module(hook.entity.module)?;
            let exec_hook = module
                .as_execution_hook()
                .ok_or(AccountError::InterfaceNotSupported {
                    module: hook.entity.module,
                    interface: EXECUTION_HOOK_INTERFACE,
                })?;
            let raw = exec_hook
                .pre_execution_hook(&ctx, hook.entity.entity_id, caller, value, data)
                .map_err(|revert| AccountError::PreExecHookReverted {
                    hook: hook.entity,
                    revert,
                })?;
            let context = decode_hook_context(&raw).ok_or(AccountError::PreExecHookReturnDataInvalid {
                hook: hook.entity,
                len: raw.len(),
            })?;
            contexts.push(context);
        }

        let output = self.dispatch(caller, value, data)?;

        for (hook, context) in hooks.iter().zip(&contexts).rev() {
            if !hook.has_post {
                continue;
            }
            let module = self.module(hook.entity.module)?;
            let exec_hook = module
                .as_execution_hook()
                .ok_or(AccountError::InterfaceNotSupported {
                    module: hook.entity.module,
                    interface: EXECUTION_HOOK_INTERFACE,
                })?;
            exec_hook
                .post_execution_hook(&ctx, hook.entity.entity_id, context)
                .map_err(|revert| AccountError::PostExecHookReverted {
                    hook: hook.entity,
                    revert,
                })?;
        }

        Ok(output)
    }

    /// Native functions and installed execution functions.
    fn dispatch(&mut self, caller: Address, value: U256, data: &[u8]) -> AccountResult<Bytes> {
        let selector = selector_of(data)?;
        let fail = invalid_call_data(selector);
        if is_top_level_entry(selector) {
            return Err(AccountError::SelfCallRecursionDepthExceeded);
        }
        tracing::trace!(%caller, %selector, depth = self.depth, "dispatch");

        if selector == EXECUTE {
            let call = executeCall::abi_decode(data).map_err(fail)?;
            let result = self.execute_call(call.target, call.value, &call.data)?;
            return Ok(result.abi_encode().into());
        }
        if selector == EXECUTE_BATCH {
            let batch = executeBatchCall::abi_decode(data).map_err(fail)?;
            let mut results = Vec::with_capacity(batch.calls.len());
            for call in &batch.calls {
                results.push(self.execute_call(call.target, call.value, &call.data)?);
            }
            return Ok(results.abi_encode().into());
        }

        let ctx = self.runtime_context();
        if selector == INSTALL_VALIDATION {
            let call = installValidationCall::abi_decode(data).map_err(fail)?;
            let config = ValidationConfig::unpack(call.validationConfig);
            let event = self.registry.install_validation(
                &self.modules,
                &ctx,
                config,
                &call.selectors,
                &call.installData,
                &call.hooks,
            )?;
            self.emit(event);
            return Ok(Bytes::new());
        }
        if selector == UNINSTALL_VALIDATION {
            let call = uninstallValidationCall::abi_decode(data).map_err(fail)?;
            let entity = ModuleEntity::unpack(call.validationFunction);
            let event = self.registry.uninstall_validation(
                &self.modules,
                &ctx,
                entity,
                &call.uninstallData,
                &call.hookUninstallData,
            )?;
            self.emit(event);
            return Ok(Bytes::new());
        }
        if selector == INSTALL_EXECUTION {
            let call = installExecutionCall::abi_decode(data).map_err(fail)?;
            let event = self.registry.install_execution(
                &self.modules,
                &ctx,
                call.module,
                &call.manifest,
                &call.moduleInstallData,
            )?;
            self.emit(event);
            return Ok(Bytes::new());
        }
        if selector == UNINSTALL_EXECUTION {
            let call = uninstallExecutionCall::abi_decode(data).map_err(fail)?;
            let event = self.registry.uninstall_execution(
                &self.modules,
                &ctx,
                call.module,
                &call.manifest,
                &call.moduleUninstallData,
            )?;
            self.emit(event);
            return Ok(Bytes::new());
        }
        if selector == VALIDATE_USER_OP {
            if caller != self.config.entry_point {
                return Err(AccountError::NotEntryPoint { caller });
            }
            let call = validateUserOpCall::abi_decode(data).map_err(fail)?;
            let validation_data = self.validate_user_op_inner(&call.userOp, call.userOpHash)?;
            if !call.missingAccountFunds.is_zero() {
                let entry_point = self.config.entry_point;
                if let Err(revert) = self.host.call(entry_point, call.missingAccountFunds, &[]) {
                    tracing::warn!(%entry_point, %revert, "prefund transfer failed");
                }
            }
            return Ok(validation_data.abi_encode().into());
        }
        if selector == IS_VALID_SIGNATURE {
            let call = isValidSignatureCall::abi_decode(data).map_err(fail)?;
            let magic = self.is_valid_signature(caller, call.hash, &call.signature)?;
            return Ok(magic.abi_encode().into());
        }

        let Some(address) = self.registry.execution(selector).and_then(|entry| entry.module) else {
            return Err(AccountError::UnrecognizedFunction { selector });
        };
        let module = self.module(address)?;
        let execution = module.as_execution().ok_or(AccountError::InterfaceNotSupported {
            module: address,
            interface: EXECUTION_INTERFACE,
        })?;
        execution
            .execute(&ctx, caller, value, data)
            .map_err(|revert| AccountError::ExecutionReverted { target: address, revert })
    }

    /// Calls into the account re-enter the router as a self-call; anything
    /// else goes to the host.
    fn execute_call(&mut self, target: Address, value: U256, data: &[u8]) -> AccountResult<Bytes> {
        if target == self.address() {
            return self.call_inner(target, value, data);
        }
        self.host
            .call(target, value, data)
            .map_err(|revert| AccountError::ExecutionReverted { target, revert })
    }
}
