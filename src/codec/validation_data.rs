//! ERC-4337 packed validation data.
//!
//! ```text
//! bits 0..160    authorizer: 0 success, 1 signature failure, otherwise an aggregator
//! bits 160..208  validUntil (0 means no expiry)
//! bits 208..256  validAfter
//! ```

use alloy::primitives::{Address, U256};
use serde::Serialize;

const AUTHORIZER_BITS: usize = 160;
const VALID_UNTIL_SHIFT: usize = 160;
const VALID_AFTER_SHIFT: usize = 208;
const TIME_MASK: u64 = (1 << 48) - 1;

/// Packed validation data of a successful validation without a time window.
pub const SIG_VALIDATION_SUCCEEDED: U256 = U256::ZERO;
/// Packed validation data of a failed signature check.
pub const SIG_VALIDATION_FAILED: U256 = U256::from_limbs([1, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    pub authorizer: Address,
    pub valid_after: u64,
    pub valid_until: u64,
}

impl ValidationData {
    pub fn success() -> Self {
        Self {
            authorizer: Address::ZERO,
            valid_after: 0,
            valid_until: 0,
        }
    }

    pub fn failed() -> Self {
        Self {
            authorizer: Address::with_last_byte(1),
            ..Self::success()
        }
    }

    pub fn with_window(valid_after: u64, valid_until: u64) -> Self {
        Self {
            valid_after: valid_after & TIME_MASK,
            valid_until: valid_until & TIME_MASK,
            ..Self::success()
        }
    }

    pub fn is_success(&self) -> bool {
        self.authorizer == Address::ZERO
    }

    pub fn is_sig_failure(&self) -> bool {
        self.authorizer == Address::with_last_byte(1)
    }

    /// An authorizer other than success or failure names an aggregator.
    pub fn aggregator(&self) -> Option<Address> {
        (!self.is_success() && !self.is_sig_failure()).then_some(self.authorizer)
    }

    pub fn pack(&self) -> U256 {
        let authorizer = U256::from_be_slice(self.authorizer.as_slice());
        authorizer
            | (U256::from(self.valid_until & TIME_MASK) << VALID_UNTIL_SHIFT)
            | (U256::from(self.valid_after & TIME_MASK) << VALID_AFTER_SHIFT)
    }

    pub fn unpack(value: U256) -> Self {
        let authorizer_mask = (U256::from(1u8) << AUTHORIZER_BITS) - U256::from(1u8);
        let time_mask = U256::from(TIME_MASK);
        let word: [u8; 32] = (value & authorizer_mask).to_be_bytes();
        Self {
            authorizer: Address::from_slice(&word[12..]),
            valid_until: ((value >> VALID_UNTIL_SHIFT) & time_mask).to::<u64>(),
            valid_after: ((value >> VALID_AFTER_SHIFT) & time_mask).to::<u64>(),
        }
    }

    fn effective_until(&self) -> u64 {
        if self.valid_until == 0 { TIME_MASK } else { self.valid_until }
    }

    /// Combines two results: the later `valid_after`, the earlier `valid_until`,
    /// and a failure if either side failed.
    pub fn intersect(&self, other: &Self) -> Self {
        let authorizer = if self.is_success() { other.authorizer } else { self.authorizer };
        let valid_until = self.effective_until().min(other.effective_until());
        Self {
            authorizer,
            valid_after: self.valid_after.max(other.valid_after),
            valid_until: if valid_until == TIME_MASK { 0 } else { valid_until },
        }
    }
}
