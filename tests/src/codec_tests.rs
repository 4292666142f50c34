//! Codec, text buffer and parser properties

use proptest::prelude::*;
use wk_keyer_core::buffer::TEXT_BUFFER_CAPACITY;
use wk_keyer_core::morse::{elements_of, CodeCollector, MAX_ELEMENTS};
use wk_keyer_core::test_utils::simulation::Simulation;
use wk_keyer_core::{KeyerMode, MorseCodec, RingTextBuffer};

/// Characters whose code is not shared with another character
fn unambiguous(ch: u8) -> bool {
    ch.is_ascii_uppercase() || ch.is_ascii_digit() || b"?/=,.".contains(&ch)
}

#[test]
fn test_paddle_collection_decodes_every_letter_and_digit() {
    for ch in (b'0'..=b'9').chain(b'A'..=b'Z') {
        let mut collector = CodeCollector::new();
        for element in elements_of(MorseCodec::encode(ch)) {
            collector.push(element);
        }
        let collected = collector.finish().unwrap();
        assert_eq!(MorseCodec::decode(collected), Some(ch), "{}", ch as char);
    }
}

proptest! {
    #[test]
    fn prop_lowercase_encodes_like_uppercase(ch in b'a'..=b'z') {
        prop_assert_eq!(MorseCodec::encode(ch), MorseCodec::encode(ch.to_ascii_uppercase()));
    }

    #[test]
    fn prop_codes_carry_at_most_seven_elements(ch in any::<u8>()) {
        let code = MorseCodec::encode(ch);
        prop_assert!(elements_of(code).count() <= MAX_ELEMENTS as usize);
        if !(0x20..=0x7F).contains(&ch) {
            prop_assert_eq!(code, 0);
        }
    }

    #[test]
    fn prop_decode_never_panics(collected in any::<u16>()) {
        if let Some(ch) = MorseCodec::decode(collected) {
            prop_assert!((0x20..0x60).contains(&ch));
        }
    }

    #[test]
    fn prop_decode_inverts_collection(ch in prop::sample::select(
        (0x21u8..0x60).filter(|c| unambiguous(*c)).collect::<Vec<_>>()
    )) {
        let mut collector = CodeCollector::new();
        for element in elements_of(MorseCodec::encode(ch)) {
            collector.push(element);
        }
        prop_assert_eq!(collector.finish().and_then(MorseCodec::decode), Some(ch));
    }

    #[test]
    fn prop_ring_buffer_is_fifo_and_bounded(ops in prop::collection::vec(any::<Option<u8>>(), 0..600)) {
        let mut buffer = RingTextBuffer::new();
        let mut model = std::collections::VecDeque::new();
        for op in ops {
            match op {
                Some(byte) => {
                    buffer.push(byte);
                    if model.len() < TEXT_BUFFER_CAPACITY {
                        model.push_back(byte);
                    }
                }
                None => {
                    prop_assert_eq!(buffer.pop(), model.pop_front().unwrap_or(0));
                }
            }
            prop_assert_eq!(buffer.length(), model.len());
            prop_assert_eq!(buffer.free(), TEXT_BUFFER_CAPACITY - model.len());
        }
    }

    #[test]
    fn prop_host_noise_never_wedges_the_text_path(noise in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut sim = Simulation::with_mode(KeyerMode::IambicB);
        sim.host_send(&noise);
        // at most one command runs per tick
        sim.run_for(noise.len() as u32 + 5);
        prop_assert_eq!(sim.keyer().host().pending(), 0);
        prop_assert!(sim.keyer().protocol().text_buffer().length() <= TEXT_BUFFER_CAPACITY);

        // a software reset always brings the session back
        sim.keyer_mut().reset();
        sim.host_send(b"T");
        prop_assert!(sim.run_until_idle(5_000));
        prop_assert_eq!(sim.sent_morse().chars().last(), Some('-'));
    }
}
