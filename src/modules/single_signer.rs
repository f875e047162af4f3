//! ECDSA single-signer validation.
//!
//! Each (account, entity id) pair owns one signer address, set at install
//! time from `abi.encode(uint32 entityId, address signer)`.
//!
//! - user operations: EIP-191 personal signature over the user operation hash
//! - signatures (ERC-1271, deferred actions): raw signature over the hash
//! - runtime: the caller must be the signer itself

use alloy::primitives::{Address, B256, Bytes, Signature, U256, eip191_hash_message};
use alloy::sol_types::SolValue;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::abi::{ERC1271_INVALID, ERC1271_MAGIC_VALUE, PackedUserOperation};
use crate::codec::{SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCEEDED};
use crate::context::RuntimeContext;
use crate::error::Revert;
use crate::module::{Module, ValidationModule};
use crate::types::Selector;

pub const SINGLE_SIGNER_MODULE_ID: &str = "modular-account.single-signer.1.0.0";

#[derive(Debug, Default)]
pub struct SingleSignerValidation {
    signers: Mutex<HashMap<(Address, u32), Address>>,
}

impl SingleSignerValidation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install data for `entity_id` owned by `signer`.
    pub fn install_data(entity_id: u32, signer: Address) -> Vec<u8> {
        (entity_id, signer).abi_encode_params()
    }

    pub fn signer_of(&self, account: Address, entity_id: u32) -> Option<Address> {
        self.signers
            .lock()
            .ok()
            .and_then(|signers| signers.get(&(account, entity_id)).copied())
    }

    fn recover(hash: B256, signature: &[u8]) -> Option<Address> {
        let signature = Signature::try_from(signature).ok()?;
        signature.recover_address_from_prehash(&hash).ok()
    }

    fn is_signer(&self, ctx: &RuntimeContext, entity_id: u32, hash: B256, signature: &[u8]) -> bool {
        match (self.signer_of(ctx.account, entity_id), Self::recover(hash, signature)) {
            (Some(signer), Some(recovered)) => signer == recovered,
            _ => false,
        }
    }
}

impl Module for SingleSignerValidation {
    fn module_id(&self) -> &str {
        SINGLE_SIGNER_MODULE_ID
    }

    fn on_install(&self, ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert> {
        let (entity_id, signer) = <(u32, Address)>::abi_decode_params(data)
            .map_err(|e| Revert::reason(format!("invalid install data: {e}")))?;
        let mut signers = self
            .signers
            .lock()
            .map_err(|_| Revert::reason("signer table poisoned"))?;
        signers.insert((ctx.account, entity_id), signer);
        tracing::info!(account = %ctx.account, entity_id, %signer, "signer set");
        Ok(())
    }

    fn on_uninstall(&self, ctx: &RuntimeContext, data: &[u8]) -> Result<(), Revert> {
        let entity_id = u32::abi_decode(data).map_err(|e| Revert::reason(format!("invalid uninstall data: {e}")))?;
        let mut signers = self
            .signers
            .lock()
            .map_err(|_| Revert::reason("signer table poisoned"))?;
        signers.remove(&(ctx.account, entity_id));
        Ok(())
    }

    fn snapshot_state(&self, account: Address) -> Bytes {
        let mut owned: Vec<(u32, Address)> = match self.signers.lock() {
            Ok(signers) => signers
                .iter()
                .filter(|((owner, _), _)| *owner == account)
                .map(|((_, entity_id), signer)| (*entity_id, *signer))
                .collect(),
            Err(_) => Vec::new(),
        };
        owned.sort();
        owned.abi_encode().into()
    }

    fn restore_state(&self, account: Address, state: &[u8]) -> Result<(), Revert> {
        let owned = <Vec<(u32, Address)>>::abi_decode(state)
            .map_err(|e| Revert::reason(format!("invalid signer snapshot: {e}")))?;
        let mut signers = self
            .signers
            .lock()
            .map_err(|_| Revert::reason("signer table poisoned"))?;
        signers.retain(|(owner, _), _| *owner != account);
        signers.extend(owned.into_iter().map(|(entity_id, signer)| ((account, entity_id), signer)));
        Ok(())
    }

    fn as_validation(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for SingleSignerValidation {
    fn validate_user_op(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        op: &PackedUserOperation,
        op_hash: B256,
    ) -> Result<U256, Revert> {
        let digest = eip191_hash_message(op_hash);
        if self.is_signer(ctx, entity_id, digest, &op.signature) {
            Ok(SIG_VALIDATION_SUCCEEDED)
        } else {
            Ok(SIG_VALIDATION_FAILED)
        }
    }

    fn validate_runtime(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        sender: Address,
        _value: U256,
        _data: &[u8],
        _authorization: &[u8],
    ) -> Result<(), Revert> {
        if self.signer_of(ctx.account, entity_id) == Some(sender) {
            Ok(())
        } else {
            Err(Revert::reason("not authorized"))
        }
    }

    fn validate_signature(
        &self,
        ctx: &RuntimeContext,
        entity_id: u32,
        _sender: Address,
        hash: B256,
        signature: &[u8],
    ) -> Result<Selector, Revert> {
        if self.is_signer(ctx, entity_id, hash, signature) {
            Ok(ERC1271_MAGIC_VALUE)
        } else {
            Ok(ERC1271_INVALID)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BlockInfo;
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(Address::repeat_byte(0xac), 1, BlockInfo::default())
    }

    #[test]
    fn test_install_and_signature_check() {
        let signer = PrivateKeySigner::random();
        let module = SingleSignerValidation::new();
        module
            .on_install(&ctx(), &SingleSignerValidation::install_data(3, signer.address()))
            .unwrap();
        assert_eq!(module.signer_of(ctx().account, 3), Some(signer.address()));

        let hash = B256::repeat_byte(0x42);
        let signature = signer.sign_hash_sync(&hash).unwrap().as_bytes();
        assert_eq!(
            module.validate_signature(&ctx(), 3, Address::ZERO, hash, &signature),
            Ok(ERC1271_MAGIC_VALUE)
        );
        assert_eq!(
            module.validate_signature(&ctx(), 4, Address::ZERO, hash, &signature),
            Ok(ERC1271_INVALID)
        );
        assert_eq!(
            module.validate_signature(&ctx(), 3, Address::ZERO, hash, &[1, 2, 3]),
            Ok(ERC1271_INVALID)
        );
    }

    #[test]
    fn test_user_op_uses_personal_sign() {
        let signer = PrivateKeySigner::random();
        let module = SingleSignerValidation::new();
        module
            .on_install(&ctx(), &SingleSignerValidation::install_data(0, signer.address()))
            .unwrap();

        let op_hash = B256::repeat_byte(7);
        let mut op = PackedUserOperation::default();
        op.signature = signer.sign_message_sync(op_hash.as_slice()).unwrap().as_bytes().to_vec().into();
        assert_eq!(module.validate_user_op(&ctx(), 0, &op, op_hash), Ok(SIG_VALIDATION_SUCCEEDED));

        op.signature = signer.sign_hash_sync(&op_hash).unwrap().as_bytes().to_vec().into();
        assert_eq!(module.validate_user_op(&ctx(), 0, &op, op_hash), Ok(SIG_VALIDATION_FAILED));
    }

    #[test]
    fn test_runtime_requires_signer_as_sender() {
        let owner = Address::repeat_byte(0x0f);
        let module = SingleSignerValidation::new();
        module.on_install(&ctx(), &SingleSignerValidation::install_data(1, owner)).unwrap();
        assert!(module.validate_runtime(&ctx(), 1, owner, U256::ZERO, &[], &[]).is_ok());
        assert!(module.validate_runtime(&ctx(), 1, Address::ZERO, U256::ZERO, &[], &[]).is_err());
    }

    #[test]
    fn test_uninstall_clears_signer() {
        let module = SingleSignerValidation::new();
        module
            .on_install(&ctx(), &SingleSignerValidation::install_data(2, Address::repeat_byte(1)))
            .unwrap();
        module.on_uninstall(&ctx(), &2u32.abi_encode()).unwrap();
        assert_eq!(module.signer_of(ctx().account, 2), None);
        assert!(module.on_install(&ctx(), &[0xff]).is_err());
    }

    #[test]
    fn test_restore_state_undoes_uninstall() {
        let owner = Address::repeat_byte(0x0f);
        let other_account = Address::repeat_byte(0xbb);
        let module = SingleSignerValidation::new();
        module.on_install(&ctx(), &SingleSignerValidation::install_data(1, owner)).unwrap();
        let snapshot = module.snapshot_state(ctx().account);

        module.on_uninstall(&ctx(), &1u32.abi_encode()).unwrap();
        module
            .on_install(&ctx(), &SingleSignerValidation::install_data(2, owner))
            .unwrap();
        let other_ctx = RuntimeContext::new(other_account, 1, BlockInfo::default());
        module
            .on_install(&other_ctx, &SingleSignerValidation::install_data(1, owner))
            .unwrap();

        module.restore_state(ctx().account, &snapshot).unwrap();
        assert_eq!(module.signer_of(ctx().account, 1), Some(owner));
        assert_eq!(module.signer_of(ctx().account, 2), None);
        assert_eq!(module.signer_of(other_account, 1), Some(owner));
        assert!(module.restore_state(ctx().account, &[1, 2, 3]).is_err());
    }
}
