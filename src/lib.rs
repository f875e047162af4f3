//! Authorization and execution-hook pipeline of a modular smart account.
//!
//! A [`ModularAccount`] owns a [`Registry`] of installed validations and
//! execution functions, a [`ModuleDirectory`] resolving module addresses to
//! implementations, and a [`Host`] providing block data and external calls.
//! User operations, runtime calls and ERC-1271 checks are validated against
//! the registry; execution runs wrapped in pre and post execution hooks.

pub mod abi;
pub mod account;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod linked_set;
pub mod module;
pub mod modules;
pub mod registry;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use account::{ACCOUNT_VERSION, ModularAccount, deferred_action_digest, deferred_action_domain};
pub use config::AccountConfig;
pub use context::{BlockInfo, Host, RuntimeContext, StaticHost};
pub use error::{AccountError, AccountResult, ErrorKind, Revert};
pub use events::{AccountEvent, EventLog, EventSink, TracingSink};
pub use module::{
    ExecutionHookModule, ExecutionModule, Module, ModuleDirectory, ModuleDirectoryBuilder, ValidationHookModule,
    ValidationModule,
};
pub use registry::Registry;
pub use types::{HookConfig, ModuleEntity, Selector, ValidationConfig, ValidationLookupKey};
