//! Runtime context handed to every module callback, and the host seam the
//! account uses for block info and external calls.

use alloy::primitives::{Address, Bytes, U256};
use serde::Serialize;

use crate::error::Revert;

/// Block values visible to the running operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    /// Current block timestamp (block.timestamp)
    pub timestamp: u64,
    /// Current block number (block.number)
    pub number: u64,
}

/// Context available to module callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeContext {
    /// The account invoking the module (msg.sender in module calls)
    pub account: Address,
    pub chain_id: u64,
    pub timestamp: u64,
    pub block_number: u64,
}

impl RuntimeContext {
    pub fn new(account: Address, chain_id: u64, block: BlockInfo) -> Self {
        Self {
            account,
            chain_id,
            timestamp: block.timestamp,
            block_number: block.number,
        }
    }
}

/// Environment the account runs in.
///
/// Calls to addresses other than the account itself leave the pipeline
/// through [`Host::call`]; a revert is returned as its raw payload.
pub trait Host: Send {
    fn block(&self) -> BlockInfo;

    fn call(&mut self, target: Address, value: U256, data: &[u8]) -> Result<Bytes, Revert>;
}

/// Host with a fixed block and no external contracts: every call succeeds with
/// empty return data.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub block: BlockInfo,
}

impl StaticHost {
    pub fn at(timestamp: u64, number: u64) -> Self {
        Self {
            block: BlockInfo { timestamp, number },
        }
    }
}

impl Host for StaticHost {
    fn block(&self) -> BlockInfo {
        self.block
    }

    fn call(&mut self, target: Address, value: U256, data: &[u8]) -> Result<Bytes, Revert> {
        tracing::debug!(%target, %value, len = data.len(), "static host call");
        Ok(Bytes::new())
    }
}
