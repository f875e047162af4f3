//! Error types for the account pipeline.
//!
//! Every failure aborts the whole operation. Errors coming out of a module carry
//! the module identity and the raw revert payload so callers can tell which
//! plugin blocked the operation.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolError;
use std::fmt;
use thiserror::Error;

use crate::codec::{InvalidLocator, SignatureCodecError};
use crate::linked_set::LinkedSetError;
use crate::types::{ModuleEntity, Selector, ValidationLookupKey};

/// Raw revert payload returned by a module or an external call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revert(pub Bytes);

impl Revert {
    /// Encodes `reason` as a Solidity `Error(string)` payload.
    pub fn reason(reason: impl Into<String>) -> Self {
        let revert = alloy::sol_types::Revert {
            reason: reason.into(),
        };
        Self(revert.abi_encode().into())
    }

    /// An empty revert, like a bare `revert()`.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Returns the decoded `Error(string)` reason, if the payload is one.
    pub fn decoded_reason(&self) -> Option<String> {
        alloy::sol_types::Revert::abi_decode(&self.0)
            .ok()
            .map(|revert| revert.reason)
    }

    pub fn data(&self) -> &Bytes {
        &self.0
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decoded_reason() {
            Some(reason) => write!(f, "\"{reason}\""),
            None if self.0.is_empty() => f.write_str("<empty>"),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Coarse classification of [`AccountError`], used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed wire data. Never retried.
    Parse,
    /// Nothing authorizes the operation. Safe to retry with corrected input.
    Authorization,
    /// A hook or validation module explicitly rejected or reverted.
    HookRejection,
    /// The self-call recursion guard tripped. Never retried.
    RecursionLimit,
    /// Install/uninstall invariant violated. Caller error.
    RegistryState,
    /// The target call or an execution function reverted.
    Execution,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Authorization | ErrorKind::Execution)
    }
}

/// Errors raised by the account pipeline and registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// Malformed signature blob or runtime authorization
    #[error("validation signature parse error: {0}")]
    ValidationSignatureParseError(#[from] SignatureCodecError),

    /// Locator with an unknown option byte or bad length
    #[error("invalid validation locator: {0}")]
    InvalidLocator(#[from] InvalidLocator),

    /// Call data that does not decode for its selector
    #[error("invalid call data for {selector}: {reason}")]
    InvalidCallData { selector: Selector, reason: String },

    /// Call data shorter than four bytes
    #[error("call data shorter than a selector ({0} bytes)")]
    MissingSelector(usize),

    /// No installed validation may authorize the selector
    #[error("validation function missing for selector {selector}")]
    ValidationFunctionMissing { selector: Selector },

    /// Validation carries execution hooks but the call data lacks the `executeUserOp` prefix
    #[error("validation with execution hooks requires the executeUserOp prefix")]
    RequireUserOperationContext,

    /// Entry-point-only function called by someone else
    #[error("caller {caller} is not the entry point")]
    NotEntryPoint { caller: Address },

    /// Deferred action past its deadline
    #[error("deferred action expired: deadline {deadline}, now {now}")]
    ExpiredDeferredAction { deadline: u64, now: u64 },

    /// Signing validation did not return the ERC-1271 magic value
    #[error("deferred action signature rejected by {validation}")]
    DeferredActionSignatureInvalid { validation: ModuleEntity },

    /// Signing validation of a deferred action has validation hooks
    #[error("deferred action validation {key} has validation hooks")]
    DeferredValidationHasValidationHooks { key: ValidationLookupKey },

    /// Deferred flag outside a user operation, or on a signing locator
    #[error("deferred actions are only accepted in user operations")]
    DeferredActionNotSupported,

    /// Pre-validation hook reverted
    #[error("pre-validation hook {hook} reverted: {revert}")]
    PreValidationHookReverted { hook: ModuleEntity, revert: Revert },

    /// Pre-validation hook returned signature failure
    #[error("pre-validation hook {hook} rejected the operation (validation data {validation_data:#x})")]
    PreValidationHookRejected {
        hook: ModuleEntity,
        validation_data: U256,
    },

    /// Hook or validation returned an aggregator address
    #[error("module {module} returned unexpected aggregator {aggregator}")]
    UnexpectedAggregator {
        module: ModuleEntity,
        aggregator: Address,
    },

    /// Validation function reverted
    #[error("validation function {validation} reverted: {revert}")]
    ValidationFunctionReverted {
        validation: ModuleEntity,
        revert: Revert,
    },

    /// Pre-execution hook reverted
    #[error("pre-execution hook {hook} reverted: {revert}")]
    PreExecHookReverted { hook: ModuleEntity, revert: Revert },

    /// Pre-execution hook return data is not ABI-encoded `bytes`
    #[error("pre-execution hook {hook} returned {len} bytes, not an encoded context")]
    PreExecHookReturnDataInvalid { hook: ModuleEntity, len: usize },

    /// Post-execution hook reverted
    #[error("post-execution hook {hook} reverted: {revert}")]
    PostExecHookReverted { hook: ModuleEntity, revert: Revert },

    /// Top-level entry reached from inside the account
    #[error("self-call recursion depth exceeded")]
    SelfCallRecursionDepthExceeded,

    /// Target call or execution function reverted
    #[error("call to {target} reverted: {revert}")]
    ExecutionReverted { target: Address, revert: Revert },

    /// Selector is neither native nor installed
    #[error("unrecognized function {selector}")]
    UnrecognizedFunction { selector: Selector },

    /// `initialize` called twice
    #[error("account already initialized")]
    AlreadyInitialized,

    /// Validation installed again without being uninstalled
    #[error("validation {key} already installed")]
    AlreadyInstalled { key: ValidationLookupKey },

    /// Uninstall of a validation that is not installed
    #[error("validation {entity} does not exist")]
    ValidationDoesNotExist { entity: ModuleEntity },

    /// Module address missing from the directory
    #[error("no module registered at {module}")]
    UnknownModule { module: Address },

    /// Module used in a role it does not implement
    #[error("module {module} does not implement {interface}")]
    InterfaceNotSupported {
        module: Address,
        interface: &'static str,
    },

    /// Selector or hook listed twice
    #[error("duplicate {what}: {source}")]
    DuplicateEntry {
        what: &'static str,
        source: LinkedSetError,
    },

    /// Hook install entry that does not decode
    #[error("invalid hook config: {0}")]
    InvalidHookConfig(String),

    /// More validation hooks than segment indices
    #[error("too many validation hooks ({count})")]
    ValidationHookLimitExceeded { count: usize },

    /// Per-hook uninstall data does not match the hook count
    #[error("array length mismatch: expected {expected}, got {actual}")]
    ArrayLengthMismatch { expected: usize, actual: usize },

    /// Module `on_install` reverted
    #[error("onInstall of {module} reverted: {revert}")]
    ModuleInstallCallbackFailed { module: Address, revert: Revert },

    /// Execution function would shadow a native function
    #[error("selector {selector} is a native function")]
    NativeFunctionNotAllowed { selector: Selector },

    /// Selector already routed to an execution module
    #[error("execution function {selector} already set")]
    ExecutionFunctionAlreadySet { selector: Selector },

    /// Uninstall names a selector the module does not own
    #[error("execution function {selector} is not installed by {module}")]
    ExecutionFunctionNotInstalled { selector: Selector, module: Address },
}

impl AccountError {
    pub fn kind(&self) -> ErrorKind {
        use AccountError::*;
        match self {
            ValidationSignatureParseError(_)
            | InvalidLocator(_)
            | InvalidCallData { .. }
            | MissingSelector(_) => ErrorKind::Parse,
            ValidationFunctionMissing { .. }
            | RequireUserOperationContext
            | NotEntryPoint { .. }
            | ExpiredDeferredAction { .. }
            | DeferredActionSignatureInvalid { .. }
            | DeferredValidationHasValidationHooks { .. }
            | DeferredActionNotSupported => ErrorKind::Authorization,
            PreValidationHookReverted { .. }
            | PreValidationHookRejected { .. }
            | UnexpectedAggregator { .. }
            | ValidationFunctionReverted { .. }
            | PreExecHookReverted { .. }
            | PreExecHookReturnDataInvalid { .. }
            | PostExecHookReverted { .. } => ErrorKind::HookRejection,
            SelfCallRecursionDepthExceeded => ErrorKind::RecursionLimit,
            ExecutionReverted { .. } | UnrecognizedFunction { .. } => ErrorKind::Execution,
            AlreadyInitialized
            | AlreadyInstalled { .. }
            | ValidationDoesNotExist { .. }
            | UnknownModule { .. }
            | InterfaceNotSupported { .. }
            | DuplicateEntry { .. }
            | InvalidHookConfig(_)
            | ValidationHookLimitExceeded { .. }
            | ArrayLengthMismatch { .. }
            | ModuleInstallCallbackFailed { .. }
            | NativeFunctionNotAllowed { .. }
            | ExecutionFunctionAlreadySet { .. }
            | ExecutionFunctionNotInstalled { .. } => ErrorKind::RegistryState,
        }
    }

    /// The module blamed for the failure, when one is.
    pub fn blamed_module(&self) -> Option<ModuleEntity> {
        use AccountError::*;
        match self {
            PreValidationHookReverted { hook, .. }
            | PreValidationHookRejected { hook, .. }
            | PreExecHookReverted { hook, .. }
            | PreExecHookReturnDataInvalid { hook, .. }
            | PostExecHookReverted { hook, .. } => Some(*hook),
            UnexpectedAggregator { module, .. } => Some(*module),
            ValidationFunctionReverted { validation, .. }
            | DeferredActionSignatureInvalid { validation } => Some(*validation),
            _ => None,
        }
    }

    /// Raw revert payload carried by the error, if any.
    pub fn revert_data(&self) -> Option<&Revert> {
        use AccountError::*;
        match self {
            PreValidationHookReverted { revert, .. }
            | ValidationFunctionReverted { revert, .. }
            | PreExecHookReverted { revert, .. }
            | PostExecHookReverted { revert, .. }
            | ExecutionReverted { revert, .. }
            | ModuleInstallCallbackFailed { revert, .. } => Some(revert),
            _ => None,
        }
    }
}

/// Result type for account operations
pub type AccountResult<T> = Result<T, AccountError>;
