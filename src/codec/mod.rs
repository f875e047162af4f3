//! Wire codec for validation locators, per-hook signature segments, the
//! deferred-action envelope and packed ERC-4337 validation data.
//!
//! Decoding is a single forward scan over the input with explicit bounds
//! checks. A truncated or out-of-order segment is a hard failure; nothing is
//! ever partially read.

mod locator;
mod segments;
mod signature;
mod validation_data;

pub use locator::{InvalidLocator, ValidationLocator, pack_validation_locator};
pub use segments::{HookSegment, RESERVED_VALIDATION_DATA_INDEX, pack_pre_hook_data};
pub use signature::{
    DeferredActionEnvelope, ParsedSignature, RuntimeAuthorization, pack_runtime_authorization,
    pack_signature, parse_runtime_authorization, parse_signature,
};
pub use validation_data::{SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCEEDED, ValidationData};

use thiserror::Error;

/// Errors produced while encoding or decoding signature blobs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureCodecError {
    #[error("truncated {what}: needed {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("segment index {index} does not follow {previous}")]
    SegmentOutOfOrder { previous: u8, index: u8 },
    #[error("segment index {0} is reserved for validation data")]
    ReservedSegmentIndex(u8),
    #[error("signature segment for index {index} but only {hook_count} hooks")]
    SegmentIndexOutOfRange { index: u8, hook_count: usize },
    #[error("segment of {0} bytes does not fit a 4-byte length")]
    SegmentTooLarge(usize),
    #[error("deadline {0} does not fit 48 bits")]
    DeadlineOutOfRange(u64),
    #[error(transparent)]
    Locator(#[from] InvalidLocator),
}

/// Forward-only reader over a byte slice.
pub(crate) struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], SignatureCodecError> {
        if self.remaining() < n {
            return Err(SignatureCodecError::Truncated {
                what,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn take_u8(&mut self, what: &'static str) -> Result<u8, SignatureCodecError> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn take_u32(&mut self, what: &'static str) -> Result<u32, SignatureCodecError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// `[4-byte big-endian length][body]`
    pub(crate) fn take_length_prefixed(&mut self, what: &'static str) -> Result<&'a [u8], SignatureCodecError> {
        let len = self.take_u32(what)? as usize;
        self.take(len, what)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}

pub(crate) fn put_length_prefixed(out: &mut Vec<u8>, body: &[u8]) -> Result<(), SignatureCodecError> {
    let len = u32::try_from(body.len()).map_err(|_| SignatureCodecError::SegmentTooLarge(body.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(())
}
