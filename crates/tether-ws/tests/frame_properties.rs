//! Property tests for the frame codec.
//!
//! Covers decode(encode(frame)) for both roles, the masking involution,
//! partial buffers and back-to-back frames in one buffer.

use proptest::prelude::*;
use tether_ws::{apply_mask, Decoded, Frame, FrameCodec, Opcode, Role};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_data_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![Just(Opcode::Text), Just(Opcode::Binary)]
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Client), Just(Role::Server)]
}

/// Payload lengths that exercise all three length encodings.
fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=125),
        prop::collection::vec(any::<u8>(), 126..=300),
        prop::collection::vec(any::<u8>(), 65_535..=65_600),
    ]
}

fn decode_one(codec: &FrameCodec, buf: &[u8]) -> (Frame, usize) {
    match codec.decode(buf).expect("valid frame") {
        Decoded::Complete { frame, consumed } => (frame, consumed),
        Decoded::NeedMoreData => panic!("complete frame reported as partial"),
    }
}

// ============================================================================
// Round Trip
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Decoding an encoded frame yields the same opcode and payload.
    #[test]
    fn encode_decode_round_trip(
        role in arb_role(),
        opcode in arb_data_opcode(),
        payload in arb_payload(),
    ) {
        let codec = FrameCodec::new(role);
        let bytes = codec.encode(&Frame::new(opcode, payload.clone()));

        let (frame, consumed) = decode_one(&codec, &bytes);
        prop_assert_eq!(consumed, bytes.len());
        prop_assert!(frame.fin);
        prop_assert_eq!(frame.opcode, opcode);
        prop_assert_eq!(frame.masked, role == Role::Client);
        prop_assert_eq!(&frame.payload[..], &payload[..]);
    }

    /// Every strict prefix of an encoded frame is reported as incomplete.
    #[test]
    fn prefixes_need_more_data(role in arb_role(), payload in prop::collection::vec(any::<u8>(), 0..200)) {
        let codec = FrameCodec::new(role);
        let bytes = codec.encode(&Frame::binary(payload));

        for end in 0..bytes.len() {
            prop_assert_eq!(codec.decode(&bytes[..end]), Ok(Decoded::NeedMoreData));
        }
    }

    /// Two frames in one buffer decode in order and consume exactly their bytes.
    #[test]
    fn back_to_back_frames(first in arb_payload(), second in prop::collection::vec(any::<u8>(), 0..64)) {
        let codec = FrameCodec::client();
        let mut bytes = codec.encode(&Frame::binary(first.clone()));
        let boundary = bytes.len();
        bytes.extend(codec.encode(&Frame::binary(second.clone())));

        let (frame, consumed) = decode_one(&codec, &bytes);
        prop_assert_eq!(consumed, boundary);
        prop_assert_eq!(&frame.payload[..], &first[..]);

        let (frame, consumed) = decode_one(&codec, &bytes[boundary..]);
        prop_assert_eq!(consumed, bytes.len() - boundary);
        prop_assert_eq!(&frame.payload[..], &second[..]);
    }
}

// ============================================================================
// Masking
// ============================================================================

proptest! {
    /// Applying the same mask twice restores the original payload.
    #[test]
    fn mask_is_an_involution(key in any::<[u8; 4]>(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut data = payload.clone();
        apply_mask(&mut data, key);
        apply_mask(&mut data, key);
        prop_assert_eq!(data, payload);
    }

    /// A fixed client mask key is written to the wire and used for the payload.
    #[test]
    fn client_frames_carry_their_key(key in any::<[u8; 4]>(), payload in prop::collection::vec(any::<u8>(), 1..125)) {
        let codec = FrameCodec::client();
        let bytes = codec.encode(&Frame::binary(payload.clone()).with_mask(key));

        prop_assert_eq!(&bytes[2..6], &key[..]);
        let mut unmasked = bytes[6..].to_vec();
        apply_mask(&mut unmasked, key);
        prop_assert_eq!(unmasked, payload);
    }
}
