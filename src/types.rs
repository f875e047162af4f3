//! Identity and configuration types shared by the registry, codec and pipeline.

use alloy::primitives::{Address, FixedBytes};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 4-byte function selector.
pub type Selector = FixedBytes<4>;

/// Entity id reserved for direct-call validation: the module itself is the caller.
pub const DIRECT_CALL_VALIDATION_ENTITY_ID: u32 = u32::MAX;

/// Identity of a pluggable unit of logic: module address plus entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEntity {
    pub module: Address,
    pub entity_id: u32,
}

impl ModuleEntity {
    pub const fn new(module: Address, entity_id: u32) -> Self {
        Self { module, entity_id }
    }

    /// Direct-call validation entity for `module`.
    pub const fn direct_call(module: Address) -> Self {
        Self::new(module, DIRECT_CALL_VALIDATION_ENTITY_ID)
    }

    pub fn is_direct_call(&self) -> bool {
        self.entity_id == DIRECT_CALL_VALIDATION_ENTITY_ID
    }

    /// `[address 20][entity id 4, big endian]`
    pub fn pack(&self) -> FixedBytes<24> {
        let mut out = [0u8; 24];
        out[..20].copy_from_slice(self.module.as_slice());
        out[20..].copy_from_slice(&self.entity_id.to_be_bytes());
        FixedBytes(out)
    }

    pub fn unpack(packed: FixedBytes<24>) -> Self {
        let module = Address::from_slice(&packed[..20]);
        let mut id = [0u8; 4];
        id.copy_from_slice(&packed[20..]);
        Self::new(module, u32::from_be_bytes(id))
    }
}

impl fmt::Display for ModuleEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_direct_call() {
            write!(f, "{}:direct", self.module)
        } else {
            write!(f, "{}:{}", self.module, self.entity_id)
        }
    }
}

/// Key under which a validation is stored.
///
/// Ordinary validations are keyed by entity id alone, so entity ids are unique
/// per account. Direct-call validations share the sentinel entity id and are
/// keyed by module address instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationLookupKey {
    EntityId(u32),
    DirectCall(Address),
}

impl From<ModuleEntity> for ValidationLookupKey {
    fn from(entity: ModuleEntity) -> Self {
        if entity.is_direct_call() {
            ValidationLookupKey::DirectCall(entity.module)
        } else {
            ValidationLookupKey::EntityId(entity.entity_id)
        }
    }
}

impl fmt::Display for ValidationLookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLookupKey::EntityId(id) => write!(f, "entity {id}"),
            ValidationLookupKey::DirectCall(module) => write!(f, "direct call {module}"),
        }
    }
}

const HOOK_IS_VALIDATION: u8 = 0b001;
const HOOK_HAS_POST: u8 = 0b010;
const HOOK_HAS_PRE: u8 = 0b100;

/// Packed form of [`HookConfig`] as stored in the ordered sets.
pub type PackedHookConfig = FixedBytes<25>;

/// A hook attached to a validation or a selector.
///
/// Validation hooks only run before validation; execution hooks may have a
/// pre half, a post half, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    pub entity: ModuleEntity,
    pub has_pre: bool,
    pub has_post: bool,
    pub is_validation_hook: bool,
}

impl HookConfig {
    pub const fn validation(entity: ModuleEntity) -> Self {
        Self {
            entity,
            has_pre: false,
            has_post: false,
            is_validation_hook: true,
        }
    }

    pub const fn execution(entity: ModuleEntity, has_pre: bool, has_post: bool) -> Self {
        Self {
            entity,
            has_pre,
            has_post,
            is_validation_hook: false,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.is_validation_hook {
            flags |= HOOK_IS_VALIDATION;
        }
        if self.has_post {
            flags |= HOOK_HAS_POST;
        }
        if self.has_pre {
            flags |= HOOK_HAS_PRE;
        }
        flags
    }

    /// `[address 20][entity id 4][flags 1]`
    pub fn pack(&self) -> PackedHookConfig {
        let mut out = [0u8; 25];
        out[..24].copy_from_slice(self.entity.pack().as_slice());
        out[24] = self.flags();
        FixedBytes(out)
    }

    pub fn unpack(packed: PackedHookConfig) -> Self {
        let entity = ModuleEntity::unpack(FixedBytes::from_slice(&packed[..24]));
        let flags = packed[24];
        if flags & HOOK_IS_VALIDATION != 0 {
            Self::validation(entity)
        } else {
            Self::execution(entity, flags & HOOK_HAS_PRE != 0, flags & HOOK_HAS_POST != 0)
        }
    }
}

const VALIDATION_IS_USER_OP: u8 = 0b001;
const VALIDATION_IS_SIGNATURE: u8 = 0b010;
const VALIDATION_IS_GLOBAL: u8 = 0b100;

/// Capability flags of an installed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFlags {
    pub is_global: bool,
    pub is_signature_validation: bool,
    pub is_user_op_validation: bool,
}

impl ValidationFlags {
    fn to_byte(self) -> u8 {
        let mut flags = 0;
        if self.is_user_op_validation {
            flags |= VALIDATION_IS_USER_OP;
        }
        if self.is_signature_validation {
            flags |= VALIDATION_IS_SIGNATURE;
        }
        if self.is_global {
            flags |= VALIDATION_IS_GLOBAL;
        }
        flags
    }

    fn from_byte(flags: u8) -> Self {
        Self {
            is_global: flags & VALIDATION_IS_GLOBAL != 0,
            is_signature_validation: flags & VALIDATION_IS_SIGNATURE != 0,
            is_user_op_validation: flags & VALIDATION_IS_USER_OP != 0,
        }
    }
}

/// Validation function plus the flags it is installed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    pub entity: ModuleEntity,
    pub flags: ValidationFlags,
}

impl ValidationConfig {
    pub fn new(
        entity: ModuleEntity,
        is_global: bool,
        is_signature_validation: bool,
        is_user_op_validation: bool,
    ) -> Self {
        Self {
            entity,
            flags: ValidationFlags {
                is_global,
                is_signature_validation,
                is_user_op_validation,
            },
        }
    }

    /// `[address 20][entity id 4][flags 1]`
    pub fn pack(&self) -> FixedBytes<25> {
        let mut out = [0u8; 25];
        out[..24].copy_from_slice(self.entity.pack().as_slice());
        out[24] = self.flags.to_byte();
        FixedBytes(out)
    }

    pub fn unpack(packed: FixedBytes<25>) -> Self {
        Self {
            entity: ModuleEntity::unpack(FixedBytes::from_slice(&packed[..24])),
            flags: ValidationFlags::from_byte(packed[24]),
        }
    }
}

/// Encodes one entry of the `hooks` argument of `installValidation`:
/// the packed hook config followed by the hook's install data.
pub fn encode_hook_install(hook: HookConfig, install_data: &[u8]) -> alloy::primitives::Bytes {
    let mut out = Vec::with_capacity(25 + install_data.len());
    out.extend_from_slice(hook.pack().as_slice());
    out.extend_from_slice(install_data);
    out.into()
}
