//! Sparse per-hook signature segments.
//!
//! ```text
//! { [1-byte hook index][4-byte BE length][hook data] }*  [0xFF][validation data]
//! ```
//!
//! Hooks without data are simply omitted. Indices are strictly increasing and
//! never the reserved index; the validation data after the reserved marker
//! runs to the end of the blob.

use alloy::primitives::Bytes;
use serde::Serialize;

use super::{ByteCursor, SignatureCodecError, put_length_prefixed};

/// Index byte introducing the validation function's own data.
pub const RESERVED_VALIDATION_DATA_INDEX: u8 = u8::MAX;

/// Data addressed to the hook at `index` in the validation's hook list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookSegment {
    pub index: u8,
    pub data: Bytes,
}

impl HookSegment {
    pub fn new(index: u8, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }
}

fn check_order(previous: Option<u8>, index: u8) -> Result<(), SignatureCodecError> {
    if index == RESERVED_VALIDATION_DATA_INDEX {
        return Err(SignatureCodecError::ReservedSegmentIndex(index));
    }
    if let Some(previous) = previous {
        if index <= previous {
            return Err(SignatureCodecError::SegmentOutOfOrder { previous, index });
        }
    }
    Ok(())
}

/// Encodes the hook segments only (no validation-data marker).
pub fn pack_pre_hook_data(segments: &[HookSegment]) -> Result<Vec<u8>, SignatureCodecError> {
    let mut out = Vec::new();
    let mut previous = None;
    for segment in segments {
        check_order(previous, segment.index)?;
        previous = Some(segment.index);
        out.push(segment.index);
        put_length_prefixed(&mut out, &segment.data)?;
    }
    Ok(out)
}

pub(crate) fn pack_segments_and_final(
    out: &mut Vec<u8>,
    segments: &[HookSegment],
    final_data: &[u8],
) -> Result<(), SignatureCodecError> {
    out.extend_from_slice(&pack_pre_hook_data(segments)?);
    out.push(RESERVED_VALIDATION_DATA_INDEX);
    out.extend_from_slice(final_data);
    Ok(())
}

pub(crate) fn read_segments_and_final(
    cursor: &mut ByteCursor<'_>,
) -> Result<(Vec<HookSegment>, Bytes), SignatureCodecError> {
    let mut segments = Vec::new();
    let mut previous = None;
    loop {
        let index = cursor.take_u8("segment index")?;
        if index == RESERVED_VALIDATION_DATA_INDEX {
            let final_data = Bytes::copy_from_slice(cursor.rest());
            return Ok((segments, final_data));
        }
        check_order(previous, index)?;
        previous = Some(index);
        let data = cursor.take_length_prefixed("hook segment")?;
        segments.push(HookSegment::new(index, Bytes::copy_from_slice(data)));
    }
}
