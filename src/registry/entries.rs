//! Stored registry records.

use alloy::primitives::Address;

use crate::linked_set::LinkedSet;
use crate::types::{HookConfig, PackedHookConfig, Selector, ValidationFlags};

/// Everything installed for one validation function.
#[derive(Debug, Clone)]
pub struct ValidationEntry {
    pub module: Address,
    pub flags: ValidationFlags,
    pub validation_hooks: LinkedSet<PackedHookConfig>,
    pub execution_hooks: LinkedSet<PackedHookConfig>,
    /// Allowed selectors. Empty on a global validation means every
    /// global-eligible selector.
    pub selectors: LinkedSet<Selector>,
}

impl ValidationEntry {
    pub fn new(module: Address, flags: ValidationFlags) -> Self {
        Self {
            module,
            flags,
            validation_hooks: LinkedSet::new(),
            execution_hooks: LinkedSet::new(),
            selectors: LinkedSet::new(),
        }
    }

    pub fn validation_hooks(&self) -> Vec<HookConfig> {
        self.validation_hooks.iter().map(HookConfig::unpack).collect()
    }

    pub fn execution_hooks(&self) -> Vec<HookConfig> {
        self.execution_hooks.iter().map(HookConfig::unpack).collect()
    }

    pub fn has_execution_hooks(&self) -> bool {
        !self.execution_hooks.is_empty()
    }

    /// Removes every hook and selector one by one.
    pub fn clear(&mut self) {
        for set in [&mut self.validation_hooks, &mut self.execution_hooks] {
            for hook in set.get_all() {
                set.remove(hook);
            }
        }
        for selector in self.selectors.get_all() {
            self.selectors.remove(selector);
        }
    }
}

/// Per-selector execution record.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEntry {
    /// Execution module serving the selector; `None` for hook-only entries.
    pub module: Option<Address>,
    /// Any caller may invoke the selector without validation.
    pub skip_runtime_validation: bool,
    pub allow_global_validation: bool,
    pub execution_hooks: LinkedSet<PackedHookConfig>,
}

impl ExecutionEntry {
    pub fn execution_hooks(&self) -> Vec<HookConfig> {
        self.execution_hooks.iter().map(HookConfig::unpack).collect()
    }

    /// Nothing left worth keeping.
    pub fn is_vacant(&self) -> bool {
        self.module.is_none() && self.execution_hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleEntity;

    #[test]
    fn test_clear_empties_every_set() {
        let mut entry = ValidationEntry::new(Address::repeat_byte(1), ValidationFlags::default());
        let entity = ModuleEntity::new(Address::repeat_byte(2), 1);
        entry.validation_hooks.add(HookConfig::validation(entity).pack());
        entry.execution_hooks.add(HookConfig::execution(entity, true, true).pack());
        entry.selectors.add(Selector::new([1, 2, 3, 4]));
        entry.clear();
        assert_eq!(entry.validation_hooks.len(), 0);
        assert_eq!(entry.execution_hooks.len(), 0);
        assert_eq!(entry.selectors.len(), 0);
    }

    #[test]
    fn test_execution_entry_vacancy() {
        let mut entry = ExecutionEntry::default();
        assert!(entry.is_vacant());
        entry.module = Some(Address::repeat_byte(3));
        assert!(!entry.is_vacant());
    }
}
