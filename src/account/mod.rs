//! The account: registry, module directory and host wired into the
//! validation and execution pipeline.
//!
//! Every public entry point is atomic. The registry, the event buffer and the
//! state modules keep for this account are snapshotted on entry and restored
//! on error; buffered events reach the sink only after the whole operation
//! succeeded.

mod deferred;
mod execution;
mod validation;

pub use deferred::{deferred_action_digest, deferred_action_domain};

use alloy::primitives::{Address, Bytes};
use std::sync::Arc;

use crate::config::AccountConfig;
use crate::context::{Host, RuntimeContext};
use crate::error::{AccountError, AccountResult};
use crate::events::{AccountEvent, EventSink, TracingSink};
use crate::module::{Module, ModuleDirectory};
use crate::registry::Registry;
use crate::types::{Selector, ValidationConfig};

/// Version reported by the `Initialized` event.
pub const ACCOUNT_VERSION: u64 = 1;

/// Account and module state captured before an operation.
pub(crate) struct Snapshot {
    registry: Registry,
    initialized: bool,
    pending_events: usize,
    module_state: Vec<(Address, Bytes)>,
}

pub struct ModularAccount {
    config: AccountConfig,
    registry: Registry,
    modules: ModuleDirectory,
    host: Box<dyn Host>,
    sink: Arc<dyn EventSink>,
    pending_events: Vec<AccountEvent>,
    initialized: bool,
    /// Nesting of calls dispatched by the account.
    depth: usize,
}

impl ModularAccount {
    pub fn new(config: AccountConfig, modules: ModuleDirectory, host: impl Host + 'static) -> Self {
        Self {
            config,
            registry: Registry::new(),
            modules,
            host: Box::new(host),
            sink: Arc::new(TracingSink),
            pending_events: Vec::new(),
            initialized: false,
            depth: 0,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn address(&self) -> Address {
        self.config.account
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn modules(&self) -> &ModuleDirectory {
        &self.modules
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Installs the first validation. Can only run once.
    pub fn initialize(
        &mut self,
        config: ValidationConfig,
        selectors: &[Selector],
        install_data: &[u8],
        hooks: &[Bytes],
    ) -> AccountResult<()> {
        self.atomically(|account| {
            if account.initialized {
                return Err(AccountError::AlreadyInitialized);
            }
            let ctx = account.runtime_context();
            let event = account
                .registry
                .install_validation(&account.modules, &ctx, config, selectors, install_data, hooks)?;
            account.emit(event);
            account.initialized = true;
            account.emit(AccountEvent::Initialized {
                version: ACCOUNT_VERSION,
            });
            Ok(())
        })
    }

    pub(crate) fn runtime_context(&self) -> RuntimeContext {
        RuntimeContext::new(self.config.account, self.config.chain_id, self.host.block())
    }

    pub(crate) fn emit(&mut self, event: AccountEvent) {
        self.pending_events.push(event);
    }

    pub(crate) fn module(&self, address: Address) -> AccountResult<Arc<dyn Module>> {
        self.modules.get(address)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let account = self.address();
        Snapshot {
            registry: self.registry.clone(),
            initialized: self.initialized,
            pending_events: self.pending_events.len(),
            module_state: self
                .modules
                .iter()
                .map(|(address, module)| (address, module.snapshot_state(account)))
                .collect(),
        }
    }

    /// Puts back everything captured by [`ModularAccount::snapshot`] and drops
    /// the events buffered since.
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        let account = self.address();
        for (address, state) in &snapshot.module_state {
            let Ok(module) = self.modules.get(*address) else {
                continue;
            };
            if let Err(revert) = module.restore_state(account, state) {
                tracing::error!(module = %address, %revert, "failed to restore module state");
            }
        }
        self.registry = snapshot.registry;
        self.initialized = snapshot.initialized;
        self.pending_events.truncate(snapshot.pending_events);
    }

    /// Runs `op` against a snapshot; everything it changed is discarded on error.
    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> AccountResult<T>) -> AccountResult<T> {
        let snapshot = self.snapshot();

        match op(self) {
            Ok(value) => {
                for event in std::mem::take(&mut self.pending_events) {
                    self.sink.publish(&event);
                }
                Ok(value)
            }
            Err(e) => {
                self.restore(snapshot);
                self.depth = 0;
                tracing::warn!(error = %e, kind = ?e.kind(), "operation reverted");
                Err(e)
            }
        }
    }
}

/// The 4-byte selector at the head of `data`.
pub(crate) fn selector_of(data: &[u8]) -> AccountResult<Selector> {
    data.get(..4)
        .map(Selector::from_slice)
        .ok_or(AccountError::MissingSelector(data.len()))
}

pub(crate) fn invalid_call_data(selector: Selector) -> impl Fn(alloy::sol_types::Error) -> AccountError {
    move |e| AccountError::InvalidCallData {
        selector,
        reason: e.to_string(),
    }
}
