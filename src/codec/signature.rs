//! Whole-signature layout.
//!
//! ```text
//! user op signature:
//!   [4-byte len][deferred payload][4-byte len][deferred signature]   (only if the locator says so)
//!   { [index][4-byte len][hook data] }*
//!   [0xFF][validation data]
//!
//! deferred payload:
//!   [signature-validation locator prefix][6-byte BE deadline][self call]
//!
//! runtime authorization / ERC-1271 signature:
//!   [locator prefix][same as user op signature]
//! ```
//!
//! In the runtime form the locator's option byte leads the blob, so it is also
//! the marker telling the parser whether a deferred envelope follows.

use alloy::primitives::Bytes;
use serde::Serialize;

use super::locator::ValidationLocator;
use super::segments::{HookSegment, pack_segments_and_final, read_segments_and_final};
use super::{ByteCursor, SignatureCodecError, put_length_prefixed};

const DEADLINE_BYTES: usize = 6;
const MAX_DEADLINE: u64 = (1 << 48) - 1;

/// A pre-authorized self-call bundled into a user operation's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredActionEnvelope {
    /// Validation whose signature authorizes the self-call.
    pub signing_validation: ValidationLocator,
    /// Unix timestamp after which the action is void; zero means no expiry.
    pub deadline: u64,
    pub self_call: Bytes,
    pub signature: Bytes,
}

impl DeferredActionEnvelope {
    pub fn encode_payload(&self) -> Result<Vec<u8>, SignatureCodecError> {
        if self.deadline > MAX_DEADLINE {
            return Err(SignatureCodecError::DeadlineOutOfRange(self.deadline));
        }
        let mut out = self.signing_validation.encode_prefix();
        out.extend_from_slice(&self.deadline.to_be_bytes()[8 - DEADLINE_BYTES..]);
        out.extend_from_slice(&self.self_call);
        Ok(out)
    }

    pub fn decode_payload(payload: &[u8], signature: &[u8]) -> Result<Self, SignatureCodecError> {
        let (signing_validation, rest) = ValidationLocator::decode_prefix(payload)?;
        let mut cursor = ByteCursor::new(rest);
        let deadline_bytes = cursor.take(DEADLINE_BYTES, "deferred action deadline")?;
        let mut word = [0u8; 8];
        word[8 - DEADLINE_BYTES..].copy_from_slice(deadline_bytes);
        Ok(Self {
            signing_validation,
            deadline: u64::from_be_bytes(word),
            self_call: Bytes::copy_from_slice(cursor.rest()),
            signature: Bytes::copy_from_slice(signature),
        })
    }
}

/// A signature split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSignature {
    pub deferred: Option<DeferredActionEnvelope>,
    pub segments: Vec<HookSegment>,
    pub final_data: Bytes,
}

impl ParsedSignature {
    /// Data for the hook at `index`; hooks without a segment get empty data.
    pub fn hook_data(&self, index: usize) -> Bytes {
        self.segments
            .iter()
            .find(|segment| usize::from(segment.index) == index)
            .map(|segment| segment.data.clone())
            .unwrap_or_default()
    }

    /// Every segment must address an existing hook.
    pub fn check_hook_count(&self, hook_count: usize) -> Result<(), SignatureCodecError> {
        // indices are strictly increasing, so the last one is the largest
        match self.segments.last() {
            Some(segment) if usize::from(segment.index) >= hook_count => {
                Err(SignatureCodecError::SegmentIndexOutOfRange {
                    index: segment.index,
                    hook_count,
                })
            }
            _ => Ok(()),
        }
    }
}

pub fn parse_signature(blob: &[u8], has_deferred_action: bool) -> Result<ParsedSignature, SignatureCodecError> {
    let mut cursor = ByteCursor::new(blob);
    let deferred = if has_deferred_action {
        let payload = cursor.take_length_prefixed("deferred action payload")?;
        let signature = cursor.take_length_prefixed("deferred action signature")?;
        Some(DeferredActionEnvelope::decode_payload(payload, signature)?)
    } else {
        None
    };
    let (segments, final_data) = read_segments_and_final(&mut cursor)?;
    Ok(ParsedSignature {
        deferred,
        segments,
        final_data,
    })
}

pub fn pack_signature(
    deferred: Option<&DeferredActionEnvelope>,
    segments: &[HookSegment],
    final_data: &[u8],
) -> Result<Vec<u8>, SignatureCodecError> {
    let mut out = Vec::new();
    if let Some(deferred) = deferred {
        put_length_prefixed(&mut out, &deferred.encode_payload()?)?;
        put_length_prefixed(&mut out, &deferred.signature)?;
    }
    pack_segments_and_final(&mut out, segments, final_data)?;
    Ok(out)
}

/// Runtime authorization or ERC-1271 signature: locator prefix plus signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeAuthorization {
    pub locator: ValidationLocator,
    pub signature: ParsedSignature,
}

pub fn parse_runtime_authorization(blob: &[u8]) -> Result<RuntimeAuthorization, SignatureCodecError> {
    let (locator, rest) = ValidationLocator::decode_prefix(blob)?;
    let signature = parse_signature(rest, locator.has_deferred_action)?;
    Ok(RuntimeAuthorization { locator, signature })
}

pub fn pack_runtime_authorization(
    locator: &ValidationLocator,
    segments: &[HookSegment],
    final_data: &[u8],
) -> Result<Vec<u8>, SignatureCodecError> {
    let mut out = locator.encode_prefix();
    out.extend_from_slice(&pack_signature(None, segments, final_data)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModuleEntity, ValidationLookupKey};
    use alloy::primitives::Address;

    fn envelope(deadline: u64) -> DeferredActionEnvelope {
        DeferredActionEnvelope {
            signing_validation: ValidationLocator::for_entity(
                ModuleEntity::new(Address::repeat_byte(0x0a), 1),
                true,
                false,
            ),
            deadline,
            self_call: Bytes::from_static(&[0x12, 0x34, 0x56, 0x78, 0x9a]),
            signature: Bytes::from(vec![0x55; 65]),
        }
    }

    #[test]
    fn test_roundtrip_without_deferred_action() {
        let segments = vec![HookSegment::new(0, vec![1, 2, 3]), HookSegment::new(4, vec![])];
        let blob = pack_signature(None, &segments, b"final").unwrap();
        let parsed = parse_signature(&blob, false).unwrap();
        assert_eq!(parsed.segments, segments);
        assert_eq!(parsed.final_data, Bytes::from_static(b"final"));
        assert!(parsed.deferred.is_none());
    }

    #[test]
    fn test_roundtrip_with_deferred_action() {
        let deferred = envelope(5);
        let blob = pack_signature(Some(&deferred), &[], &[0xee; 65]).unwrap();
        let parsed = parse_signature(&blob, true).unwrap();
        assert_eq!(parsed.deferred, Some(deferred));
        assert!(parsed.segments.is_empty());
        assert_eq!(parsed.final_data.len(), 65);
    }

    #[test]
    fn test_deadline_is_six_bytes() {
        let payload = envelope(0x0102_0304_0506).encode_payload().unwrap();
        // 5-byte locator prefix, then the deadline
        assert_eq!(&payload[5..11], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            envelope(1 << 48).encode_payload(),
            Err(SignatureCodecError::DeadlineOutOfRange(1 << 48))
        );
    }

    #[test]
    fn test_truncated_deferred_envelope_is_fatal() {
        let blob = pack_signature(Some(&envelope(0)), &[], b"x").unwrap();
        for cut in [2, 10, 30] {
            assert!(matches!(
                parse_signature(&blob[..cut], true),
                Err(SignatureCodecError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn test_hook_data_defaults_to_empty() {
        let blob = pack_signature(None, &[HookSegment::new(0, vec![0xaa])], b"v").unwrap();
        let parsed = parse_signature(&blob, false).unwrap();
        assert_eq!(parsed.hook_data(0), Bytes::from_static(&[0xaa]));
        assert_eq!(parsed.hook_data(1), Bytes::new());
        assert!(parsed.check_hook_count(2).is_ok());
        assert_eq!(
            parsed.check_hook_count(0),
            Err(SignatureCodecError::SegmentIndexOutOfRange { index: 0, hook_count: 0 })
        );
    }

    #[test]
    fn test_runtime_authorization_leading_locator() {
        let locator = ValidationLocator::new(ValidationLookupKey::EntityId(9), false, false);
        let blob = pack_runtime_authorization(&locator, &[HookSegment::new(1, vec![7])], b"sig").unwrap();
        let auth = parse_runtime_authorization(&blob).unwrap();
        assert_eq!(auth.locator, locator);
        assert_eq!(auth.signature.hook_data(1), Bytes::from_static(&[7]));
        assert_eq!(auth.signature.final_data, Bytes::from_static(b"sig"));
    }
}
