//! Deferred actions: a self-call signed by one validation and carried inside
//! another validation's user operation signature.

use alloy::primitives::{B256, Bytes, U256};
use alloy::sol_types::{Eip712Domain, SolStruct, eip712_domain};

use super::validation::{Capability, ValidationScope};
use super::{ModularAccount, selector_of};
use crate::abi::{DeferredAction, ERC1271_MAGIC_VALUE, is_top_level_entry};
use crate::codec::DeferredActionEnvelope;
use crate::config::AccountConfig;
use crate::error::{AccountError, AccountResult};
use crate::module::VALIDATION_INTERFACE;
use crate::types::ModuleEntity;

/// EIP-712 domain of the account described by `config`.
pub fn deferred_action_domain(config: &AccountConfig) -> Eip712Domain {
    eip712_domain! {
        name: config.domain.name.clone(),
        version: config.domain.version.clone(),
        chain_id: config.chain_id,
        verifying_contract: config.account,
    }
}

/// Digest the signing validation signs. `nonce` is the outer user
/// operation's nonce, which ties the action to that single operation.
pub fn deferred_action_digest(config: &AccountConfig, nonce: U256, deadline: u64, self_call: &Bytes) -> B256 {
    let action = DeferredAction {
        nonce,
        deadline,
        selfCall: self_call.clone(),
    };
    action.eip712_signing_hash(&deferred_action_domain(config))
}

impl ModularAccount {
    /// Checks the envelope and returns the validation that signed it.
    ///
    /// Authority, the no-hooks rule and the signature are all checked against
    /// the signing validation named in the envelope, not the validation in the
    /// user operation nonce. The latter may not exist until the action installs
    /// it; it is resolved afterwards, against the post-action registry.
    pub(crate) fn verify_deferred_action(
        &self,
        outer_nonce: U256,
        envelope: &DeferredActionEnvelope,
    ) -> AccountResult<ModuleEntity> {
        let selector = selector_of(&envelope.self_call)?;
        if is_top_level_entry(selector) {
            return Err(AccountError::SelfCallRecursionDepthExceeded);
        }

        let now = self.host.block().timestamp;
        if envelope.deadline != 0 && now > envelope.deadline {
            return Err(AccountError::ExpiredDeferredAction {
                deadline: envelope.deadline,
                now,
            });
        }

        let locator = &envelope.signing_validation;
        if locator.has_deferred_action {
            return Err(AccountError::DeferredActionNotSupported);
        }
        let key = locator.key;
        let validation = self.resolve_validation(key, selector, Capability::Signature)?;
        if !self.registry.validation_hooks(key).is_empty() {
            return Err(AccountError::DeferredValidationHasValidationHooks { key });
        }
        self.check_validation_applies(&envelope.self_call, key, ValidationScope::from(locator), false)?;

        let digest = deferred_action_digest(&self.config, outer_nonce, envelope.deadline, &envelope.self_call);
        let module = self.module(validation.module)?;
        let validation_module = module.as_validation().ok_or(AccountError::InterfaceNotSupported {
            module: validation.module,
            interface: VALIDATION_INTERFACE,
        })?;
        let result = validation_module
            .validate_signature(
                &self.runtime_context(),
                validation.entity_id,
                self.address(),
                digest,
                &envelope.signature,
            )
            .map_err(|revert| AccountError::ValidationFunctionReverted { validation, revert })?;
        if result != ERC1271_MAGIC_VALUE {
            return Err(AccountError::DeferredActionSignatureInvalid { validation });
        }
        Ok(validation)
    }

    /// Verifies the envelope, then runs its self-call as the account.
    pub(crate) fn run_deferred_action(
        &mut self,
        outer_nonce: U256,
        envelope: &DeferredActionEnvelope,
    ) -> AccountResult<()> {
        let validation = self.verify_deferred_action(outer_nonce, envelope)?;
        tracing::info!(
            %validation,
            deadline = envelope.deadline,
            selector = %selector_of(&envelope.self_call)?,
            "running deferred action"
        );
        self.call_inner(self.address(), U256::ZERO, &envelope.self_call)?;
        Ok(())
    }
}
