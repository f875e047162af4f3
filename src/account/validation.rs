//! Validation: user operations, runtime authorization and ERC-1271 signatures.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;

use super::{ModularAccount, invalid_call_data, selector_of};
use crate::abi::IModularAccount::{executeBatchCall, executeCall};
use crate::abi::{
    ERC1271_INVALID, ERC1271_MAGIC_VALUE, EXECUTE, EXECUTE_BATCH, EXECUTE_USER_OP, IS_VALID_SIGNATURE,
    PackedUserOperation, is_global_validation_native, is_self_call_wrapper, is_top_level_entry,
};
use crate::codec::{ValidationData, ValidationLocator, parse_runtime_authorization, parse_signature};
use crate::error::{AccountError, AccountResult};
use crate::module::{VALIDATION_HOOK_INTERFACE, VALIDATION_INTERFACE};
use crate::types::{ModuleEntity, Selector, ValidationLookupKey};

/// Which of a validation's grants may authorize a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValidationScope {
    /// The global flag, for global-eligible selectors.
    Global,
    /// The explicit selector allow list.
    Selector,
    /// Either one; used for direct calls, which carry no locator.
    Either,
}

impl From<&ValidationLocator> for ValidationScope {
    fn from(locator: &ValidationLocator) -> Self {
        if locator.is_global {
            ValidationScope::Global
        } else {
            ValidationScope::Selector
        }
    }
}

/// What the validation is about to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capability {
    UserOp,
    Runtime,
    Signature,
}

fn check_hook_result(hook: ModuleEntity, raw: U256) -> AccountResult<ValidationData> {
    let data = ValidationData::unpack(raw);
    if let Some(aggregator) = data.aggregator() {
        return Err(AccountError::UnexpectedAggregator {
            module: hook,
            aggregator,
        });
    }
    if data.is_sig_failure() {
        return Err(AccountError::PreValidationHookRejected {
            hook,
            validation_data: raw,
        });
    }
    Ok(data)
}

impl ModularAccount {
    /// ERC-4337 `validateUserOp`. Returns packed validation data; a rejected
    /// signature is a result, not an error. A deferred action carried by a
    /// rejected operation leaves no trace.
    pub fn validate_user_op(
        &mut self,
        caller: Address,
        op: &PackedUserOperation,
        op_hash: B256,
    ) -> AccountResult<U256> {
        if caller != self.config.entry_point {
            return Err(AccountError::NotEntryPoint { caller });
        }
        self.atomically(|account| account.validate_user_op_inner(op, op_hash))
    }

    pub(crate) fn validate_user_op_inner(&mut self, op: &PackedUserOperation, op_hash: B256) -> AccountResult<U256> {
        let locator = ValidationLocator::from_nonce(op.nonce)?;
        let parsed = parse_signature(&op.signature, locator.has_deferred_action)?;

        let before_deferred = match &parsed.deferred {
            Some(deferred) => {
                let snapshot = self.snapshot();
                self.run_deferred_action(op.nonce, deferred)?;
                Some(snapshot)
            }
            None => None,
        };

        let selector = selector_of(&op.callData)?;
        let key = locator.key;
        let validation = self.resolve_validation(key, selector, Capability::UserOp)?;
        self.check_validation_applies(&op.callData, key, ValidationScope::from(&locator), true)?;

        let has_execution_hooks = self
            .registry
            .validation(key)
            .is_some_and(|entry| entry.has_execution_hooks());
        if has_execution_hooks && selector != EXECUTE_USER_OP {
            return Err(AccountError::RequireUserOperationContext);
        }

        let hooks = self.registry.validation_hooks(key);
        parsed.check_hook_count(hooks.len())?;
        let ctx = self.runtime_context();

        let mut outcome = ValidationData::success();
        for (index, hook) in hooks.iter().enumerate() {
            let module = self.module(hook.entity.module)?;
            let hook_module = module
                .as_validation_hook()
                .ok_or(AccountError::InterfaceNotSupported {
                    module: hook.entity.module,
                    interface: VALIDATION_HOOK_INTERFACE,
                })?;
            let mut hook_op = op.clone();
            hook_op.signature = parsed.hook_data(index);
            tracing::debug!(hook = %hook.entity, index, "pre user op validation hook");
            let raw = hook_module
                .pre_user_op_validation_hook(&ctx, hook.entity.entity_id, &hook_op, op_hash)
                .map_err(|revert| AccountError::PreValidationHookReverted {
                    hook: hook.entity,
                    revert,
                })?;
            outcome = outcome.intersect(&check_hook_result(hook.entity, raw)?);
        }

        let module = self.module(validation.module)?;
        let validation_module = module.as_validation().ok_or(AccountError::InterfaceNotSupported {
            module: validation.module,
            interface: VALIDATION_INTERFACE,
        })?;
        let mut final_op = op.clone();
        final_op.signature = parsed.final_data.clone();
        let raw = validation_module
            .validate_user_op(&ctx, validation.entity_id, &final_op, op_hash)
            .map_err(|revert| AccountError::ValidationFunctionReverted { validation, revert })?;
        let data = ValidationData::unpack(raw);
        if let Some(aggregator) = data.aggregator() {
            return Err(AccountError::UnexpectedAggregator {
                module: validation,
                aggregator,
            });
        }

        let outcome = outcome.intersect(&data);
        if outcome.is_sig_failure() {
            tracing::info!(%validation, %op_hash, "user operation signature rejected");
            if let Some(snapshot) = before_deferred {
                self.restore(snapshot);
                tracing::info!(%validation, %op_hash, "deferred action discarded");
            }
        } else {
            tracing::debug!(%validation, %op_hash, hooks = hooks.len(), "user operation validated");
        }
        Ok(outcome.pack())
    }

    /// Runs runtime validation for `data` and returns the authorizing key.
    pub(crate) fn validate_runtime_authorization(
        &mut self,
        caller: Address,
        value: U256,
        data: &[u8],
        authorization: &[u8],
    ) -> AccountResult<ValidationLookupKey> {
        let auth = parse_runtime_authorization(authorization)?;
        if auth.locator.has_deferred_action {
            return Err(AccountError::DeferredActionNotSupported);
        }
        let key = auth.locator.key;
        let selector = selector_of(data)?;
        let validation = self.resolve_validation(key, selector, Capability::Runtime)?;
        self.check_validation_applies(data, key, ValidationScope::from(&auth.locator), false)?;

        let hooks = self.registry.validation_hooks(key);
        auth.signature.check_hook_count(hooks.len())?;
        let ctx = self.runtime_context();

        for (index, hook) in hooks.iter().enumerate() {
            let module = self.module(hook.entity.module)?;
            let hook_module = module
                .as_validation_hook()
                .ok_or(AccountError::InterfaceNotSupported {
                    module: hook.entity.module,
                    interface: VALIDATION_HOOK_INTERFACE,
                })?;
            tracing::debug!(hook = %hook.entity, index, "pre runtime validation hook");
            hook_module
                .pre_runtime_validation_hook(
                    &ctx,
                    hook.entity.entity_id,
                    caller,
                    value,
                    data,
                    &auth.signature.hook_data(index),
                )
                .map_err(|revert| AccountError::PreValidationHookReverted {
                    hook: hook.entity,
                    revert,
                })?;
        }

        let module = self.module(validation.module)?;
        let validation_module = module.as_validation().ok_or(AccountError::InterfaceNotSupported {
            module: validation.module,
            interface: VALIDATION_INTERFACE,
        })?;
        validation_module
            .validate_runtime(
                &ctx,
                validation.entity_id,
                caller,
                value,
                data,
                &auth.signature.final_data,
            )
            .map_err(|revert| AccountError::ValidationFunctionReverted { validation, revert })?;

        tracing::debug!(%validation, %caller, %selector, "runtime call authorized");
        Ok(key)
    }

    /// ERC-1271. `signature` is a locator prefix followed by the usual
    /// segments. Returns the magic value or `0xffffffff`.
    pub fn is_valid_signature(&self, caller: Address, hash: B256, signature: &[u8]) -> AccountResult<Selector> {
        let auth = parse_runtime_authorization(signature)?;
        if auth.locator.has_deferred_action {
            return Err(AccountError::DeferredActionNotSupported);
        }
        let key = auth.locator.key;
        let validation = self.resolve_validation(key, IS_VALID_SIGNATURE, Capability::Signature)?;

        let hooks = self.registry.validation_hooks(key);
        auth.signature.check_hook_count(hooks.len())?;
        let ctx = self.runtime_context();

        for (index, hook) in hooks.iter().enumerate() {
            let module = self.module(hook.entity.module)?;
            let hook_module = module
                .as_validation_hook()
                .ok_or(AccountError::InterfaceNotSupported {
                    module: hook.entity.module,
                    interface: VALIDATION_HOOK_INTERFACE,
                })?;
            hook_module
                .pre_signature_validation_hook(&ctx, hook.entity.entity_id, caller, hash, &auth.signature.hook_data(index))
                .map_err(|revert| AccountError::PreValidationHookReverted {
                    hook: hook.entity,
                    revert,
                })?;
        }

        let module = self.module(validation.module)?;
        let validation_module = module.as_validation().ok_or(AccountError::InterfaceNotSupported {
            module: validation.module,
            interface: VALIDATION_INTERFACE,
        })?;
        let result = validation_module
            .validate_signature(&ctx, validation.entity_id, caller, hash, &auth.signature.final_data)
            .map_err(|revert| AccountError::ValidationFunctionReverted { validation, revert })?;

        Ok(if result == ERC1271_MAGIC_VALUE {
            ERC1271_MAGIC_VALUE
        } else {
            ERC1271_INVALID
        })
    }

    /// The installed validation under `key`, if it has `capability`.
    pub(crate) fn resolve_validation(
        &self,
        key: ValidationLookupKey,
        selector: Selector,
        capability: Capability,
    ) -> AccountResult<ModuleEntity> {
        let missing = AccountError::ValidationFunctionMissing { selector };
        let entry = self.registry.validation(key).ok_or(missing.clone())?;
        let capable = match capability {
            Capability::UserOp => entry.flags.is_user_op_validation,
            Capability::Signature => entry.flags.is_signature_validation,
            Capability::Runtime => true,
        };
        if !capable {
            return Err(missing);
        }
        self.registry.validation_entity(key).ok_or(missing)
    }

    fn is_global_eligible(&self, selector: Selector) -> bool {
        is_global_validation_native(selector)
            || self
                .registry
                .execution(selector)
                .is_some_and(|entry| entry.allow_global_validation)
    }

    pub(crate) fn check_selector_applies(
        &self,
        selector: Selector,
        key: ValidationLookupKey,
        scope: ValidationScope,
    ) -> AccountResult<()> {
        let missing = AccountError::ValidationFunctionMissing { selector };
        let entry = self.registry.validation(key).ok_or(missing.clone())?;
        let global = entry.flags.is_global && self.is_global_eligible(selector);
        let listed = entry.selectors.contains(selector);
        let applies = match scope {
            ValidationScope::Global => global,
            ValidationScope::Selector => listed,
            ValidationScope::Either => global || listed,
        };
        if applies { Ok(()) } else { Err(missing) }
    }

    /// Checks that the validation under `key` may authorize `call_data`,
    /// looking through `executeUserOp` and into `execute`/`executeBatch`
    /// self-calls.
    pub(crate) fn check_validation_applies(
        &self,
        call_data: &[u8],
        key: ValidationLookupKey,
        scope: ValidationScope,
        user_op: bool,
    ) -> AccountResult<()> {
        let mut data = call_data;
        let mut selector = selector_of(data)?;
        if user_op && selector == EXECUTE_USER_OP {
            data = &data[4..];
            selector = selector_of(data)?;
        }
        if is_top_level_entry(selector) {
            return Err(AccountError::SelfCallRecursionDepthExceeded);
        }
        self.check_selector_applies(selector, key, scope)?;

        if selector == EXECUTE {
            let call = executeCall::abi_decode(data).map_err(invalid_call_data(selector))?;
            if call.target == self.address() {
                self.check_inner_self_call(&call.data, key, scope)?;
            }
        } else if selector == EXECUTE_BATCH {
            let batch = executeBatchCall::abi_decode(data).map_err(invalid_call_data(selector))?;
            for call in batch.calls.iter().filter(|call| call.target == self.address()) {
                self.check_inner_self_call(&call.data, key, scope)?;
            }
        }
        Ok(())
    }

    fn check_inner_self_call(&self, data: &[u8], key: ValidationLookupKey, scope: ValidationScope) -> AccountResult<()> {
        let selector = selector_of(data)?;
        if is_self_call_wrapper(selector) {
            return Err(AccountError::SelfCallRecursionDepthExceeded);
        }
        self.check_selector_applies(selector, key, scope)
    }
}
