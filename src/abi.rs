//! Solidity bindings for the account surface.
//!
//! Call data reaching the account is real ABI-encoded bytes; the account decodes
//! it with the generated call types and routes on the 4-byte selector.

use alloy::sol;

use crate::types::Selector;

sol! {
    /// ERC-4337 v0.7 packed user operation.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address target;
        uint256 value;
        bytes data;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ManifestExecutionFunction {
        bytes4 executionSelector;
        bool skipRuntimeValidation;
        bool allowGlobalValidation;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ManifestExecutionHook {
        bytes4 executionSelector;
        uint32 entityId;
        bool isPreHook;
        bool isPostHook;
    }

    /// What an execution module installs on the account.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct ExecutionManifest {
        ManifestExecutionFunction[] executionFunctions;
        ManifestExecutionHook[] executionHooks;
        bytes4[] interfaceIds;
    }

    /// EIP-712 typed data signed for a deferred action.
    #[derive(Debug, PartialEq, Eq)]
    struct DeferredAction {
        uint256 nonce;
        uint64 deadline;
        bytes selfCall;
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IModularAccount {
        function execute(address target, uint256 value, bytes data) external payable returns (bytes result);
        function executeBatch(Call[] calls) external payable returns (bytes[] results);
        function executeWithRuntimeValidation(bytes data, bytes authorization) external payable returns (bytes result);
        function executeUserOp(PackedUserOperation userOp, bytes32 userOpHash) external;
        function validateUserOp(PackedUserOperation userOp, bytes32 userOpHash, uint256 missingAccountFunds) external returns (uint256 validationData);
        function installExecution(address module, ExecutionManifest manifest, bytes moduleInstallData) external;
        function uninstallExecution(address module, ExecutionManifest manifest, bytes moduleUninstallData) external;
        function installValidation(bytes25 validationConfig, bytes4[] selectors, bytes installData, bytes[] hooks) external;
        function uninstallValidation(bytes24 validationFunction, bytes uninstallData, bytes[] hookUninstallData) external;
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
    }
}

use alloy::sol_types::SolCall;
use IModularAccount::*;

pub const EXECUTE: Selector = Selector::new(executeCall::SELECTOR);
pub const EXECUTE_BATCH: Selector = Selector::new(executeBatchCall::SELECTOR);
pub const EXECUTE_WITH_RUNTIME_VALIDATION: Selector =
    Selector::new(executeWithRuntimeValidationCall::SELECTOR);
pub const EXECUTE_USER_OP: Selector = Selector::new(executeUserOpCall::SELECTOR);
pub const VALIDATE_USER_OP: Selector = Selector::new(validateUserOpCall::SELECTOR);
pub const INSTALL_EXECUTION: Selector = Selector::new(installExecutionCall::SELECTOR);
pub const UNINSTALL_EXECUTION: Selector = Selector::new(uninstallExecutionCall::SELECTOR);
pub const INSTALL_VALIDATION: Selector = Selector::new(installValidationCall::SELECTOR);
pub const UNINSTALL_VALIDATION: Selector = Selector::new(uninstallValidationCall::SELECTOR);
pub const IS_VALID_SIGNATURE: Selector = Selector::new(isValidSignatureCall::SELECTOR);

/// ERC-1271 magic value for a valid signature.
pub const ERC1271_MAGIC_VALUE: Selector = Selector::new([0x16, 0x26, 0xba, 0x7e]);
/// Returned by `isValidSignature` when the signature does not check out.
pub const ERC1271_INVALID: Selector = Selector::new([0xff, 0xff, 0xff, 0xff]);

/// Functions implemented by the account itself. Execution modules cannot claim them.
pub fn is_native_function(selector: Selector) -> bool {
    [
        EXECUTE,
        EXECUTE_BATCH,
        EXECUTE_WITH_RUNTIME_VALIDATION,
        EXECUTE_USER_OP,
        VALIDATE_USER_OP,
        INSTALL_EXECUTION,
        UNINSTALL_EXECUTION,
        INSTALL_VALIDATION,
        UNINSTALL_VALIDATION,
        IS_VALID_SIGNATURE,
    ]
    .contains(&selector)
}

/// Native functions a global validation may authorize.
pub fn is_global_validation_native(selector: Selector) -> bool {
    [
        EXECUTE,
        EXECUTE_BATCH,
        INSTALL_EXECUTION,
        UNINSTALL_EXECUTION,
        INSTALL_VALIDATION,
        UNINSTALL_VALIDATION,
    ]
    .contains(&selector)
}

/// Entries that dispatch and authorize on their own; they may never be reached
/// from inside another call.
pub fn is_top_level_entry(selector: Selector) -> bool {
    selector == EXECUTE_USER_OP || selector == EXECUTE_WITH_RUNTIME_VALIDATION
}

/// Selectors that wrap further calls and would re-enter the applicability check.
pub fn is_self_call_wrapper(selector: Selector) -> bool {
    selector == EXECUTE || selector == EXECUTE_BATCH || is_top_level_entry(selector)
}
