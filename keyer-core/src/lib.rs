#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! # Keyer Core
//!
//! Control core of a Winkeyer-compatible Morse keyer for embedded systems.
//! Keys text sent by a host over the serial protocol, keys paddle input in
//! Iambic A, Iambic B and Ultimatic modes, and reports status back to the
//! host. Everything runs from one cooperative service tick.

pub mod types;
pub mod buffer;
pub mod morse;
pub mod paddle;
pub mod keying;
pub mod commands;
pub mod speed;
pub mod protocol;
pub mod hal;
pub mod controller;

#[cfg(feature = "test-utils")]
pub mod test_utils;


pub use types::*;
pub use buffer::RingTextBuffer;
pub use morse::MorseCodec;
pub use paddle::{PaddleSampler, PaddleStatus};
pub use keying::{KeyingEngine, OutputLines};
pub use protocol::{HostProtocolEngine, StatusMode};
pub use speed::{FixedSpeed, Potentiometer, PulseCounter, RotaryEncoder, SpeedControl, SpeedRange};
pub use hal::{Clock, HalError, HostSerial, KeyerOutputs, PaddleContacts, PinOutputs, PinPaddles};
pub use controller::*;

/// Keyer library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration: Iambic B at 20 WPM with a 600 Hz sidetone
pub fn default_config() -> KeyerConfig {
    KeyerConfig::default()
}
