//! Validation locator: which validation authorizes an operation, plus flags.
//!
//! Integer layout (168 significant bits):
//!
//! ```text
//! bits 0..8     options: bit0 direct call, bit1 deferred action, bit2 global
//! bits 8..168   direct call: module address
//! bits 8..40    otherwise: entity id (bits 40..168 zero)
//! ```
//!
//! In a nonce the locator occupies the low 168 bits of the 192-bit key, above
//! the 64-bit sequence. As a signature prefix it is the option byte followed by
//! either the 4-byte entity id or the 20-byte address.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use thiserror::Error;

use crate::types::{DIRECT_CALL_VALIDATION_ENTITY_ID, ModuleEntity, ValidationLookupKey};

const OPTION_DIRECT_CALL: u8 = 0b001;
const OPTION_DEFERRED_ACTION: u8 = 0b010;
const OPTION_GLOBAL: u8 = 0b100;
const OPTION_MASK: u8 = OPTION_DIRECT_CALL | OPTION_DEFERRED_ACTION | OPTION_GLOBAL;

const LOCATOR_BITS: usize = 168;
const NONCE_SEQUENCE_BITS: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidLocator {
    #[error("unused option bits set: {0:#010b}")]
    UnusedOptionBits(u8),
    #[error("bits above the locator width are set")]
    ReservedBitsSet,
    #[error("entity id does not fit 32 bits")]
    EntityIdOverflow,
    #[error("direct-call locator with a zero address")]
    ZeroDirectCallAddress,
    #[error("entity id {0:#x} is reserved for direct-call validation")]
    SentinelEntityId(u32),
    #[error("truncated locator prefix: needed {needed} bytes, {available} available")]
    TruncatedPrefix { needed: usize, available: usize },
}

/// Decoded validation locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLocator {
    pub key: ValidationLookupKey,
    pub is_global: bool,
    pub has_deferred_action: bool,
}

/// Packs `entity` with its flags into the integer locator form.
pub fn pack_validation_locator(entity: ModuleEntity, is_global: bool, has_deferred_action: bool) -> U256 {
    ValidationLocator::for_entity(entity, is_global, has_deferred_action).pack()
}

impl ValidationLocator {
    pub fn new(key: ValidationLookupKey, is_global: bool, has_deferred_action: bool) -> Self {
        Self {
            key,
            is_global,
            has_deferred_action,
        }
    }

    pub fn for_entity(entity: ModuleEntity, is_global: bool, has_deferred_action: bool) -> Self {
        Self::new(entity.into(), is_global, has_deferred_action)
    }

    fn options(&self) -> u8 {
        let mut options = 0;
        if matches!(self.key, ValidationLookupKey::DirectCall(_)) {
            options |= OPTION_DIRECT_CALL;
        }
        if self.has_deferred_action {
            options |= OPTION_DEFERRED_ACTION;
        }
        if self.is_global {
            options |= OPTION_GLOBAL;
        }
        options
    }

    fn check_options(options: u8) -> Result<(), InvalidLocator> {
        if options & !OPTION_MASK != 0 {
            return Err(InvalidLocator::UnusedOptionBits(options));
        }
        Ok(())
    }

    fn from_parts(options: u8, key: ValidationLookupKey) -> Result<Self, InvalidLocator> {
        match key {
            ValidationLookupKey::DirectCall(module) if module == Address::ZERO => {
                return Err(InvalidLocator::ZeroDirectCallAddress);
            }
            ValidationLookupKey::EntityId(DIRECT_CALL_VALIDATION_ENTITY_ID) => {
                return Err(InvalidLocator::SentinelEntityId(DIRECT_CALL_VALIDATION_ENTITY_ID));
            }
            _ => {}
        }
        Ok(Self {
            key,
            is_global: options & OPTION_GLOBAL != 0,
            has_deferred_action: options & OPTION_DEFERRED_ACTION != 0,
        })
    }

    pub fn pack(&self) -> U256 {
        let body = match self.key {
            ValidationLookupKey::EntityId(id) => U256::from(id),
            ValidationLookupKey::DirectCall(module) => U256::from_be_slice(module.as_slice()),
        };
        (body << 8) | U256::from(self.options())
    }

    pub fn unpack(value: U256) -> Result<Self, InvalidLocator> {
        if value >> LOCATOR_BITS != U256::ZERO {
            return Err(InvalidLocator::ReservedBitsSet);
        }
        let options = (value & U256::from(0xffu8)).to::<u8>();
        Self::check_options(options)?;
        let body: U256 = value >> 8;

        let key = if options & OPTION_DIRECT_CALL != 0 {
            let word: [u8; 32] = body.to_be_bytes();
            ValidationLookupKey::DirectCall(Address::from_slice(&word[12..]))
        } else {
            if body > U256::from(u32::MAX) {
                return Err(InvalidLocator::EntityIdOverflow);
            }
            ValidationLookupKey::EntityId(body.to::<u32>())
        };
        Self::from_parts(options, key)
    }

    /// The 192-bit nonce key carrying this locator.
    pub fn nonce_key(&self) -> U256 {
        self.pack()
    }

    /// Full nonce: `(key << 64) | sequence`.
    pub fn nonce(&self, sequence: u64) -> U256 {
        (self.nonce_key() << NONCE_SEQUENCE_BITS) | U256::from(sequence)
    }

    /// Extracts the locator from a user operation nonce. The upper 24 bits of
    /// the key are free parallel-nonce space and are ignored.
    pub fn from_nonce(nonce: U256) -> Result<Self, InvalidLocator> {
        let key = nonce >> NONCE_SEQUENCE_BITS;
        let mask = (U256::from(1u8) << LOCATOR_BITS) - U256::from(1u8);
        Self::unpack(key & mask)
    }

    /// Signature-prefix form: option byte, then entity id or address.
    pub fn encode_prefix(&self) -> Vec<u8> {
        let mut out = vec![self.options()];
        match self.key {
            ValidationLookupKey::EntityId(id) => out.extend_from_slice(&id.to_be_bytes()),
            ValidationLookupKey::DirectCall(module) => out.extend_from_slice(module.as_slice()),
        }
        out
    }

    /// Reads a prefix from the head of `bytes`, returning the locator and the remainder.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, &[u8]), InvalidLocator> {
        let Some(&options) = bytes.first() else {
            return Err(InvalidLocator::TruncatedPrefix {
                needed: 1,
                available: 0,
            });
        };
        Self::check_options(options)?;
        let body_len = if options & OPTION_DIRECT_CALL != 0 { 20 } else { 4 };
        if bytes.len() < 1 + body_len {
            return Err(InvalidLocator::TruncatedPrefix {
                needed: 1 + body_len,
                available: bytes.len(),
            });
        }
        let body = &bytes[1..1 + body_len];
        let key = if options & OPTION_DIRECT_CALL != 0 {
            ValidationLookupKey::DirectCall(Address::from_slice(body))
        } else {
            ValidationLookupKey::EntityId(u32::from_be_bytes([body[0], body[1], body[2], body[3]]))
        };
        Ok((Self::from_parts(options, key)?, &bytes[1 + body_len..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const MODULE: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

    #[test]
    fn test_pack_unpack_all_flag_combinations() {
        for entity in [ModuleEntity::new(MODULE, 0), ModuleEntity::new(MODULE, 42), ModuleEntity::direct_call(MODULE)] {
            for is_global in [false, true] {
                for deferred in [false, true] {
                    let packed = pack_validation_locator(entity, is_global, deferred);
                    let locator = ValidationLocator::unpack(packed).unwrap();
                    assert_eq!(locator, ValidationLocator::for_entity(entity, is_global, deferred));
                    assert_eq!(locator.key, ValidationLookupKey::from(entity));
                }
            }
        }
    }

    #[test]
    fn test_entity_layout() {
        let packed = pack_validation_locator(ModuleEntity::new(MODULE, 0x0102_0304), true, false);
        assert_eq!(packed, U256::from(0x01_0203_0404u64));
    }

    #[test]
    fn test_direct_call_carries_address() {
        let locator = ValidationLocator::for_entity(ModuleEntity::direct_call(MODULE), false, false);
        let packed = locator.pack();
        assert_eq!(packed >> 8, U256::from_be_slice(MODULE.as_slice()));
        assert_eq!(packed & U256::from(0xff), U256::from(1));
    }

    #[test]
    fn test_rejects_inconsistent_values() {
        assert_eq!(
            ValidationLocator::unpack(U256::from(0b1000u8)),
            Err(InvalidLocator::UnusedOptionBits(0b1000))
        );
        assert_eq!(
            ValidationLocator::unpack(U256::from(1u8) << 200),
            Err(InvalidLocator::ReservedBitsSet)
        );
        assert_eq!(
            ValidationLocator::unpack(U256::from(1u8) << 48),
            Err(InvalidLocator::EntityIdOverflow)
        );
        assert_eq!(
            ValidationLocator::unpack(U256::from(OPTION_DIRECT_CALL)),
            Err(InvalidLocator::ZeroDirectCallAddress)
        );
        assert_eq!(
            ValidationLocator::unpack(U256::from(u32::MAX) << 8),
            Err(InvalidLocator::SentinelEntityId(u32::MAX))
        );
    }

    #[test]
    fn test_nonce_roundtrip_ignores_parallel_key_bits() {
        let locator = ValidationLocator::for_entity(ModuleEntity::new(MODULE, 7), true, true);
        let nonce = locator.nonce(99);
        assert_eq!(nonce & U256::from(u64::MAX), U256::from(99));
        assert_eq!(ValidationLocator::from_nonce(nonce).unwrap(), locator);

        let with_parallel_key = nonce | (U256::from(0xabu8) << (64 + 168));
        assert_eq!(ValidationLocator::from_nonce(with_parallel_key).unwrap(), locator);
    }

    #[test]
    fn test_prefix_roundtrip() {
        let entity_locator = ValidationLocator::for_entity(ModuleEntity::new(MODULE, 3), true, false);
        let mut bytes = entity_locator.encode_prefix();
        assert_eq!(bytes, vec![0b100, 0, 0, 0, 3]);
        bytes.extend_from_slice(b"rest");
        let (decoded, rest) = ValidationLocator::decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, entity_locator);
        assert_eq!(rest, b"rest");

        let direct = ValidationLocator::for_entity(ModuleEntity::direct_call(MODULE), false, true);
        let bytes = direct.encode_prefix();
        assert_eq!(bytes.len(), 21);
        assert_eq!(ValidationLocator::decode_prefix(&bytes).unwrap(), (direct, &[][..]));
    }

    #[test]
    fn test_prefix_truncated() {
        assert_eq!(
            ValidationLocator::decode_prefix(&[OPTION_DIRECT_CALL, 1, 2]),
            Err(InvalidLocator::TruncatedPrefix {
                needed: 21,
                available: 3
            })
        );
        assert!(ValidationLocator::decode_prefix(&[]).is_err());
    }
}
