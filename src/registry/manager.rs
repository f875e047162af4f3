//! Validation and execution registry.
//!
//! Installs are staged: the entry is fully built and every `on_install`
//! callback has succeeded before anything is written, so a failing install
//! leaves no residue. Uninstalls always complete; `on_uninstall` failures are
//! logged and reported in the event, never fatal, so a broken module cannot
//! block its own removal.

use alloy::primitives::{Address, Bytes, FixedBytes};
use std::collections::HashMap;
use std::sync::Arc;

use super::entries::{ExecutionEntry, ValidationEntry};
use crate::abi::{ExecutionManifest, is_native_function};
use crate::context::RuntimeContext;
use crate::error::{AccountError, AccountResult};
use crate::events::AccountEvent;
use crate::linked_set::LinkedSet;
use crate::module::{
    EXECUTION_HOOK_INTERFACE, EXECUTION_INTERFACE, Module, ModuleDirectory, VALIDATION_HOOK_INTERFACE,
    VALIDATION_INTERFACE,
};
use crate::types::{HookConfig, ModuleEntity, PackedHookConfig, Selector, ValidationConfig, ValidationLookupKey};

/// Segment indices are one byte and 255 is reserved, so 255 hooks at most.
pub const MAX_VALIDATION_HOOKS: usize = 255;

const HOOK_CONFIG_BYTES: usize = 25;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    validations: HashMap<ValidationLookupKey, ValidationEntry>,
    executions: HashMap<Selector, ExecutionEntry>,
    interfaces: HashMap<FixedBytes<4>, u32>,
}

fn require_interface(module: &Arc<dyn Module>, address: Address, interface: &'static str) -> AccountResult<()> {
    let supported = match interface {
        VALIDATION_INTERFACE => module.as_validation().is_some(),
        VALIDATION_HOOK_INTERFACE => module.as_validation_hook().is_some(),
        EXECUTION_HOOK_INTERFACE => module.as_execution_hook().is_some(),
        EXECUTION_INTERFACE => module.as_execution().is_some(),
        _ => false,
    };
    if supported {
        Ok(())
    } else {
        Err(AccountError::InterfaceNotSupported {
            module: address,
            interface,
        })
    }
}

fn add_hook(set: &mut LinkedSet<PackedHookConfig>, hook: HookConfig, what: &'static str) -> AccountResult<()> {
    set.try_add(hook.pack())
        .map_err(|source| AccountError::DuplicateEntry { what, source })
}

/// Runs `on_uninstall`, logging a failure instead of returning it.
fn uninstall_best_effort(modules: &ModuleDirectory, ctx: &RuntimeContext, address: Address, data: &[u8]) -> bool {
    let outcome = match modules.get(address) {
        Ok(module) => module.on_uninstall(ctx, data).map_err(|revert| revert.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match outcome {
        Ok(()) => true,
        Err(reason) => {
            tracing::warn!(module = %address, %reason, "onUninstall failed, removal continues");
            false
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validation(&self, key: ValidationLookupKey) -> Option<&ValidationEntry> {
        self.validations.get(&key)
    }

    pub fn execution(&self, selector: Selector) -> Option<&ExecutionEntry> {
        self.executions.get(&selector)
    }

    pub fn is_installed(&self, key: ValidationLookupKey) -> bool {
        self.validations.contains_key(&key)
    }

    /// Identity of the validation stored under `key`.
    pub fn validation_entity(&self, key: ValidationLookupKey) -> Option<ModuleEntity> {
        let entry = self.validations.get(&key)?;
        Some(match key {
            ValidationLookupKey::EntityId(id) => ModuleEntity::new(entry.module, id),
            ValidationLookupKey::DirectCall(module) => ModuleEntity::direct_call(module),
        })
    }

    pub fn validation_hooks(&self, key: ValidationLookupKey) -> Vec<HookConfig> {
        self.validations
            .get(&key)
            .map(ValidationEntry::validation_hooks)
            .unwrap_or_default()
    }

    pub fn validation_execution_hooks(&self, key: ValidationLookupKey) -> Vec<HookConfig> {
        self.validations
            .get(&key)
            .map(ValidationEntry::execution_hooks)
            .unwrap_or_default()
    }

    pub fn selectors(&self, key: ValidationLookupKey) -> Vec<Selector> {
        self.validations
            .get(&key)
            .map(|entry| entry.selectors.get_all())
            .unwrap_or_default()
    }

    pub fn selector_execution_hooks(&self, selector: Selector) -> Vec<HookConfig> {
        self.executions
            .get(&selector)
            .map(ExecutionEntry::execution_hooks)
            .unwrap_or_default()
    }

    /// True while at least one installed execution module declares `interface_id`.
    pub fn supports_interface(&self, interface_id: FixedBytes<4>) -> bool {
        self.interfaces.get(&interface_id).is_some_and(|count| *count > 0)
    }

    /// Installs a validation function with its selectors and hooks.
    ///
    /// Each entry of `hooks` is a packed [`HookConfig`] followed by that
    /// hook's install data.
    pub fn install_validation(
        &mut self,
        modules: &ModuleDirectory,
        ctx: &RuntimeContext,
        config: ValidationConfig,
        selectors: &[Selector],
        install_data: &[u8],
        hooks: &[Bytes],
    ) -> AccountResult<AccountEvent> {
        let entity = config.entity;
        let key = ValidationLookupKey::from(entity);
        if self.validations.contains_key(&key) {
            return Err(AccountError::AlreadyInstalled { key });
        }

        let module = modules.get(entity.module)?;
        let flags = config.flags;
        if !entity.is_direct_call() || flags.is_signature_validation || flags.is_user_op_validation {
            require_interface(&module, entity.module, VALIDATION_INTERFACE)?;
        }

        let mut entry = ValidationEntry::new(entity.module, flags);
        let mut callbacks = Vec::with_capacity(hooks.len() + 1);

        for raw in hooks {
            if raw.len() < HOOK_CONFIG_BYTES {
                return Err(AccountError::InvalidHookConfig(format!(
                    "hook entry of {} bytes, need at least {HOOK_CONFIG_BYTES}",
                    raw.len()
                )));
            }
            let hook = HookConfig::unpack(FixedBytes::from_slice(&raw[..HOOK_CONFIG_BYTES]));
            let hook_module = modules.get(hook.entity.module)?;
            if hook.is_validation_hook {
                require_interface(&hook_module, hook.entity.module, VALIDATION_HOOK_INTERFACE)?;
                add_hook(&mut entry.validation_hooks, hook, "validation hook")?;
                if entry.validation_hooks.len() > MAX_VALIDATION_HOOKS {
                    return Err(AccountError::ValidationHookLimitExceeded {
                        count: entry.validation_hooks.len(),
                    });
                }
            } else {
                if !hook.has_pre && !hook.has_post {
                    return Err(AccountError::InvalidHookConfig(format!(
                        "execution hook {} has neither pre nor post",
                        hook.entity
                    )));
                }
                require_interface(&hook_module, hook.entity.module, EXECUTION_HOOK_INTERFACE)?;
                add_hook(&mut entry.execution_hooks, hook, "execution hook")?;
            }
            callbacks.push((hook.entity.module, hook_module, raw.slice(HOOK_CONFIG_BYTES..)));
        }

        for selector in selectors {
            entry
                .selectors
                .try_add(*selector)
                .map_err(|source| AccountError::DuplicateEntry { what: "selector", source })?;
        }

        callbacks.push((entity.module, module, Bytes::copy_from_slice(install_data)));
        for (address, module, data) in &callbacks {
            module
                .on_install(ctx, data)
                .map_err(|revert| AccountError::ModuleInstallCallbackFailed {
                    module: *address,
                    revert,
                })?;
        }

        tracing::info!(
            module = %entity.module,
            entity_id = entity.entity_id,
            validation_hooks = entry.validation_hooks.len(),
            execution_hooks = entry.execution_hooks.len(),
            selectors = entry.selectors.len(),
            is_global = flags.is_global,
            "installed validation"
        );
        self.validations.insert(key, entry);

        Ok(AccountEvent::ValidationInstalled {
            module: entity.module,
            entity_id: entity.entity_id,
        })
    }

    /// Removes a validation function and everything attached to it.
    ///
    /// `hook_uninstall_data` is either empty or holds one entry per hook:
    /// validation hooks first, then execution hooks.
    pub fn uninstall_validation(
        &mut self,
        modules: &ModuleDirectory,
        ctx: &RuntimeContext,
        entity: ModuleEntity,
        uninstall_data: &[u8],
        hook_uninstall_data: &[Bytes],
    ) -> AccountResult<AccountEvent> {
        let key = ValidationLookupKey::from(entity);
        match self.validations.get(&key) {
            Some(entry) if entry.module == entity.module => {}
            _ => return Err(AccountError::ValidationDoesNotExist { entity }),
        }

        let hooks: Vec<HookConfig> = self
            .validation_hooks(key)
            .into_iter()
            .chain(self.validation_execution_hooks(key))
            .collect();
        if !hook_uninstall_data.is_empty() && hook_uninstall_data.len() != hooks.len() {
            return Err(AccountError::ArrayLengthMismatch {
                expected: hooks.len(),
                actual: hook_uninstall_data.len(),
            });
        }

        if let Some(mut entry) = self.validations.remove(&key) {
            entry.clear();
        }

        let mut succeeded = true;
        for (i, hook) in hooks.iter().enumerate() {
            let data = hook_uninstall_data.get(i).map(|data| &data[..]).unwrap_or_default();
            succeeded &= uninstall_best_effort(modules, ctx, hook.entity.module, data);
        }
        succeeded &= uninstall_best_effort(modules, ctx, entity.module, uninstall_data);

        tracing::info!(
            module = %entity.module,
            entity_id = entity.entity_id,
            hooks = hooks.len(),
            on_uninstall_succeeded = succeeded,
            "uninstalled validation"
        );

        Ok(AccountEvent::ValidationUninstalled {
            module: entity.module,
            entity_id: entity.entity_id,
            on_uninstall_succeeded: succeeded,
        })
    }

    /// Installs an execution module's functions, selector hooks and interfaces.
    pub fn install_execution(
        &mut self,
        modules: &ModuleDirectory,
        ctx: &RuntimeContext,
        address: Address,
        manifest: &ExecutionManifest,
        install_data: &[u8],
    ) -> AccountResult<AccountEvent> {
        let module = modules.get(address)?;
        require_interface(&module, address, EXECUTION_INTERFACE)?;

        let mut executions = self.executions.clone();
        let mut selectors = Vec::with_capacity(manifest.executionFunctions.len());

        for function in &manifest.executionFunctions {
            let selector = function.executionSelector;
            if is_native_function(selector) {
                return Err(AccountError::NativeFunctionNotAllowed { selector });
            }
            let entry = executions.entry(selector).or_default();
            if entry.module.is_some() {
                return Err(AccountError::ExecutionFunctionAlreadySet { selector });
            }
            entry.module = Some(address);
            entry.skip_runtime_validation = function.skipRuntimeValidation;
            entry.allow_global_validation = function.allowGlobalValidation;
            selectors.push(selector);
        }

        if !manifest.executionHooks.is_empty() {
            require_interface(&module, address, EXECUTION_HOOK_INTERFACE)?;
        }
        for hook in &manifest.executionHooks {
            let config = HookConfig::execution(ModuleEntity::new(address, hook.entityId), hook.isPreHook, hook.isPostHook);
            if !config.has_pre && !config.has_post {
                return Err(AccountError::InvalidHookConfig(format!(
                    "execution hook {} has neither pre nor post",
                    config.entity
                )));
            }
            let entry = executions.entry(hook.executionSelector).or_default();
            add_hook(&mut entry.execution_hooks, config, "execution hook")?;
        }

        module
            .on_install(ctx, install_data)
            .map_err(|revert| AccountError::ModuleInstallCallbackFailed { module: address, revert })?;

        self.executions = executions;
        for interface_id in &manifest.interfaceIds {
            *self.interfaces.entry(*interface_id).or_default() += 1;
        }

        tracing::info!(
            module = %address,
            functions = selectors.len(),
            hooks = manifest.executionHooks.len(),
            "installed execution module"
        );

        Ok(AccountEvent::ExecutionInstalled {
            module: address,
            selectors,
        })
    }

    /// Removes what `manifest` installed for `address`.
    pub fn uninstall_execution(
        &mut self,
        modules: &ModuleDirectory,
        ctx: &RuntimeContext,
        address: Address,
        manifest: &ExecutionManifest,
        uninstall_data: &[u8],
    ) -> AccountResult<AccountEvent> {
        let mut executions = self.executions.clone();
        let mut selectors = Vec::with_capacity(manifest.executionFunctions.len());

        for function in &manifest.executionFunctions {
            let selector = function.executionSelector;
            match executions.get_mut(&selector) {
                Some(entry) if entry.module == Some(address) => {
                    entry.module = None;
                    entry.skip_runtime_validation = false;
                    entry.allow_global_validation = false;
                }
                _ => {
                    return Err(AccountError::ExecutionFunctionNotInstalled {
                        selector,
                        module: address,
                    });
                }
            }
            selectors.push(selector);
        }

        for hook in &manifest.executionHooks {
            let config = HookConfig::execution(ModuleEntity::new(address, hook.entityId), hook.isPreHook, hook.isPostHook);
            if let Some(entry) = executions.get_mut(&hook.executionSelector) {
                entry.execution_hooks.remove(config.pack());
            }
        }
        executions.retain(|_, entry| !entry.is_vacant());
        self.executions = executions;

        for interface_id in &manifest.interfaceIds {
            if let Some(count) = self.interfaces.get_mut(interface_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.interfaces.remove(interface_id);
                }
            }
        }

        let succeeded = uninstall_best_effort(modules, ctx, address, uninstall_data);
        tracing::info!(
            module = %address,
            functions = selectors.len(),
            on_uninstall_succeeded = succeeded,
            "uninstalled execution module"
        );

        Ok(AccountEvent::ExecutionUninstalled {
            module: address,
            selectors,
            on_uninstall_succeeded: succeeded,
        })
    }
}
