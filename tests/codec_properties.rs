//! Property tests for the codec building blocks.

use bytes::BytesMut;
use proptest::prelude::*;
use websockets_monoio_codec::codec::{Decoder, Encoder};
use websockets_monoio_codec::aggregator::FrameAggregator;
use websockets_monoio_codec::mask::apply_mask;
use websockets_monoio_codec::utf8::Utf8Validator;
use websockets_monoio_codec::{CloseCode, DecoderConfig, Frame, FrameCodec, Opcode, Role, WebSocketVersion};

fn data_frame() -> impl Strategy<Value = Frame> {
    prop_oneof![
        ".{0,200}".prop_map(Frame::text),
        proptest::collection::vec(any::<u8>(), 0..70_000).prop_map(Frame::binary),
    ]
}

/// Any frame a fresh RFC 6455 decoder accepts on its own: data frames with
/// any flags, and control frames within their size and body rules.
fn hybi_frame() -> impl Strategy<Value = Frame> {
    let data = (
        prop_oneof![Just(Opcode::Text), Just(Opcode::Binary)],
        any::<bool>(),
        0u8..8,
        proptest::collection::vec(any::<u8>(), 0..70_000),
    )
        .prop_map(|(opcode, fin, rsv, payload)| Frame::new(opcode, fin, rsv, payload));
    let ping_pong = (
        prop_oneof![Just(Opcode::Ping), Just(Opcode::Pong)],
        0u8..8,
        proptest::collection::vec(any::<u8>(), 0..=125),
    )
        .prop_map(|(opcode, rsv, payload)| Frame::new(opcode, true, rsv, payload));
    let close = (
        prop_oneof![1000u16..=1003, 1007u16..=1014, 3000u16..5000],
        ".{0,30}",
        0u8..8,
    )
        .prop_map(|(code, reason, rsv)| Frame {
            rsv,
            ..Frame::close(CloseCode::new(code), &reason)
        });
    prop_oneof![
        4 => data,
        2 => ping_pong,
        1 => close,
        1 => Just(Frame::close_empty()),
    ]
}

fn codecs(version: WebSocketVersion) -> (FrameCodec, FrameCodec) {
    let config = DecoderConfig::default()
        .max_frame_payload_len(1 << 20)
        .allow_extensions(true);
    (
        FrameCodec::new(version, Role::Client, config.expect_masked_frames(false)),
        FrameCodec::new(version, Role::Server, config.expect_masked_frames(true)),
    )
}

proptest! {
    #[test]
    fn mask_is_an_involution(data in proptest::collection::vec(any::<u8>(), 0..300), key in any::<[u8; 4]>()) {
        let mut buf = data.clone();
        apply_mask(&mut buf, key);
        apply_mask(&mut buf, key);
        prop_assert_eq!(buf, data);
    }

    #[test]
    fn utf8_validator_agrees_with_std(
        data in proptest::collection::vec(any::<u8>(), 0..64),
        split in any::<prop::sample::Index>(),
    ) {
        let at = split.index(data.len() + 1);
        let mut validator = Utf8Validator::new();
        let accepted = validator.check(&data[..at]).is_ok()
            && validator.check(&data[at..]).is_ok()
            && validator.finish().is_ok();
        prop_assert_eq!(accepted, std::str::from_utf8(&data).is_ok());
    }

    #[test]
    fn frames_survive_arbitrary_splits(
        frames in proptest::collection::vec(data_frame(), 1..4),
        chunk in 1usize..4096,
        legacy in any::<bool>(),
    ) {
        let version = if legacy { WebSocketVersion::V00 } else { WebSocketVersion::V13 };
        let (mut client, mut server) = codecs(version);

        let mut wire = BytesMut::new();
        for frame in &frames {
            client.encode(frame.clone(), &mut wire).unwrap();
        }

        let mut inbound = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            inbound.extend_from_slice(piece);
            while let Some(frame) = server.decode(&mut inbound).unwrap() {
                decoded.push(frame);
            }
        }
        prop_assert!(inbound.is_empty());
        prop_assert_eq!(decoded, frames);
    }

    #[test]
    fn any_valid_frame_round_trips(frame in hybi_frame(), from_client in any::<bool>()) {
        let (mut client, mut server) = codecs(WebSocketVersion::V13);
        let (encoder, decoder) = if from_client {
            (&mut client, &mut server)
        } else {
            (&mut server, &mut client)
        };

        let mut wire = BytesMut::new();
        encoder.encode(frame.clone(), &mut wire).unwrap();
        let decoded = decoder.decode(&mut wire).unwrap();
        prop_assert!(wire.is_empty());
        prop_assert_eq!(decoded, Some(frame));
    }

    #[test]
    fn fragments_reassemble_into_the_original_message(
        payload in proptest::collection::vec(any::<u8>(), 0..2000),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
        text in any::<bool>(),
    ) {
        let opcode = if text { Opcode::Text } else { Opcode::Binary };
        let mut bounds: Vec<usize> = cuts.iter().map(|cut| cut.index(payload.len() + 1)).collect();
        bounds.push(0);
        bounds.push(payload.len());
        bounds.sort_unstable();

        let pieces: Vec<&[u8]> = bounds.windows(2).map(|w| &payload[w[0]..w[1]]).collect();
        let last = pieces.len() - 1;
        let (mut client, mut server) = codecs(WebSocketVersion::V13);
        let mut wire = BytesMut::new();
        for (i, piece) in pieces.iter().enumerate() {
            let fragment = if i == 0 {
                Frame::new(opcode, i == last, 0, piece.to_vec())
            } else {
                Frame::continuation(i == last, piece.to_vec())
            };
            client.encode(fragment, &mut wire).unwrap();
        }

        let mut aggregator = FrameAggregator::new(1 << 20);
        let mut messages = Vec::new();
        while let Some(frame) = server.decode(&mut wire).unwrap() {
            if let Some(message) = aggregator.push(frame).unwrap() {
                messages.push(message);
            }
        }
        prop_assert!(!aggregator.in_progress());
        prop_assert_eq!(messages, vec![Frame::new(opcode, true, 0, payload)]);
    }

    #[test]
    fn server_frames_are_never_masked(payload in proptest::collection::vec(any::<u8>(), 0..300)) {
        let (_, mut server) = codecs(WebSocketVersion::V13);
        let mut wire = BytesMut::new();
        server.encode(Frame::binary(payload), &mut wire).unwrap();
        prop_assert_eq!(wire[0], 0x80 | Opcode::Binary as u8);
        prop_assert_eq!(wire[1] & 0x80, 0);
    }
}
