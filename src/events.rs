//! Registry mutation events and the sinks they are published to.
//!
//! Events are buffered while an operation runs and only published once the
//! whole operation succeeded.

use alloy::primitives::Address;
use serde::Serialize;
use std::sync::Mutex;

use crate::types::Selector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AccountEvent {
    #[serde(rename_all = "camelCase")]
    ValidationInstalled { module: Address, entity_id: u32 },
    #[serde(rename_all = "camelCase")]
    ValidationUninstalled {
        module: Address,
        entity_id: u32,
        on_uninstall_succeeded: bool,
    },
    #[serde(rename_all = "camelCase")]
    ExecutionInstalled { module: Address, selectors: Vec<Selector> },
    #[serde(rename_all = "camelCase")]
    ExecutionUninstalled {
        module: Address,
        selectors: Vec<Selector>,
        on_uninstall_succeeded: bool,
    },
    Initialized { version: u64 },
}

/// Receiver of published events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &AccountEvent);
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<AccountEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events published so far.
    pub fn events(&self) -> Vec<AccountEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: &AccountEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &AccountEvent) {
        match event {
            AccountEvent::ValidationInstalled { module, entity_id } => {
                tracing::info!(%module, entity_id, "ValidationInstalled");
            }
            AccountEvent::ValidationUninstalled {
                module,
                entity_id,
                on_uninstall_succeeded,
            } => {
                tracing::info!(%module, entity_id, on_uninstall_succeeded, "ValidationUninstalled");
            }
            AccountEvent::ExecutionInstalled { module, selectors } => {
                tracing::info!(%module, selectors = selectors.len(), "ExecutionInstalled");
            }
            AccountEvent::ExecutionUninstalled {
                module,
                selectors,
                on_uninstall_succeeded,
            } => {
                tracing::info!(
                    %module,
                    selectors = selectors.len(),
                    on_uninstall_succeeded,
                    "ExecutionUninstalled"
                );
            }
            AccountEvent::Initialized { version } => {
                tracing::info!(version, "Initialized");
            }
        }
    }
}
