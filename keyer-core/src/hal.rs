//! Hardware Abstraction Layer for the keyer core

use embedded_hal::digital::{InputPin, OutputPin};

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// Timing operation failed
    TimingError,
    /// Analog conversion failed
    ConversionError,
    /// Hardware not initialized
    NotInitialized,
    /// Invalid configuration
    InvalidConfig,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::TimingError => write!(f, "Timing operation failed"),
            HalError::ConversionError => write!(f, "Analog conversion failed"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
            HalError::InvalidConfig => write!(f, "Invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Monotonic millisecond time source
pub trait Clock {
    /// Milliseconds since an arbitrary origin, wrapping at `u32::MAX`
    fn now_ms(&self) -> u32;
}

/// Raw paddle contact lines
pub trait PaddleContacts {
    /// Line levels: bit 0 = left (Dit), bit 1 = right (Dah), high when released
    fn read_levels(&mut self) -> Result<u8, HalError>;
}

/// Key, PTT and sidetone outputs
pub trait KeyerOutputs {
    fn set_key(&mut self, on: bool) -> Result<(), HalError>;

    fn set_ptt(&mut self, on: bool) -> Result<(), HalError>;

    /// Sidetone frequency, `0` = silent
    fn set_tone(&mut self, hz: u16) -> Result<(), HalError>;
}

/// Byte link to the host computer
pub trait HostSerial {
    /// Next received byte, if any
    fn read_byte(&mut self) -> Option<u8>;

    fn write_byte(&mut self, byte: u8);
}

/// Paddle contacts on two embedded-hal input pins (pulled up, grounded when pressed)
pub struct PinPaddles<L, R> {
    left: L,
    right: R,
}

impl<L, R> PinPaddles<L, R>
where
    L: InputPin,
    R: InputPin,
{
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }

    pub fn release(self) -> (L, R) {
        (self.left, self.right)
    }
}

impl<L, R> PaddleContacts for PinPaddles<L, R>
where
    L: InputPin,
    R: InputPin,
{
    fn read_levels(&mut self) -> Result<u8, HalError> {
        let left = self.left.is_high().map_err(|_| HalError::GpioError)?;
        let right = self.right.is_high().map_err(|_| HalError::GpioError)?;
        Ok((left as u8) | ((right as u8) << 1))
    }
}

/// Key, PTT and sidetone gate on embedded-hal output pins.
///
/// The sidetone frequency is recorded for an external oscillator; the gate
/// pin only tells it when to sound.
pub struct PinOutputs<K, P, S> {
    key: K,
    ptt: P,
    tone_gate: S,
    key_inverted: bool,
    tone_hz: u16,
}

impl<K, P, S> PinOutputs<K, P, S>
where
    K: OutputPin,
    P: OutputPin,
    S: OutputPin,
{
    pub fn new(key: K, ptt: P, tone_gate: S, key_inverted: bool) -> Self {
        Self {
            key,
            ptt,
            tone_gate,
            key_inverted,
            tone_hz: 0,
        }
    }

    /// Frequency the oscillator should run at, `0` while silent
    pub fn tone_hz(&self) -> u16 {
        self.tone_hz
    }
}

fn drive<O: OutputPin>(pin: &mut O, high: bool) -> Result<(), HalError> {
    if high {
        pin.set_high().map_err(|_| HalError::GpioError)
    } else {
        pin.set_low().map_err(|_| HalError::GpioError)
    }
}

impl<K, P, S> KeyerOutputs for PinOutputs<K, P, S>
where
    K: OutputPin,
    P: OutputPin,
    S: OutputPin,
{
    fn set_key(&mut self, on: bool) -> Result<(), HalError> {
        drive(&mut self.key, on != self.key_inverted)
    }

    fn set_ptt(&mut self, on: bool) -> Result<(), HalError> {
        drive(&mut self.ptt, on)
    }

    fn set_tone(&mut self, hz: u16) -> Result<(), HalError> {
        self.tone_hz = hz;
        drive(&mut self.tone_gate, hz != 0)
    }
}

/// Clock backed by the embassy time driver
#[cfg(feature = "embassy-time")]
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-time")]
impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        embassy_time::Instant::now().as_millis() as u32
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use crate::types::PaddleSide;
    use core::cell::Cell;
    use heapless::{Deque, Vec};

    /// Clock advanced by hand
    #[derive(Default)]
    pub struct MockClock {
        now: Cell<u32>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, ms: u32) {
            self.now.set(ms);
        }

        pub fn advance(&self, ms: u32) {
            self.now.set(self.now.get().wrapping_add(ms));
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u32 {
            self.now.get()
        }
    }

    #[derive(Default)]
    pub struct MockPaddles {
        pressed: u8,
        fail: bool,
    }

    impl MockPaddles {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn press(&mut self, side: PaddleSide) {
            self.pressed |= Self::bit(side);
        }

        pub fn release(&mut self, side: PaddleSide) {
            self.pressed &= !Self::bit(side);
        }

        pub fn release_all(&mut self) {
            self.pressed = 0;
        }

        /// Make every following read fail
        pub fn fail_reads(&mut self, fail: bool) {
            self.fail = fail;
        }

        fn bit(side: PaddleSide) -> u8 {
            match side {
                PaddleSide::Dit => 0x01,
                PaddleSide::Dah => 0x02,
            }
        }
    }

    impl PaddleContacts for MockPaddles {
        fn read_levels(&mut self) -> Result<u8, HalError> {
            if self.fail {
                return Err(HalError::GpioError);
            }
            Ok(!self.pressed & 0x03)
        }
    }

    /// Outputs that remember their last level and count key transitions
    #[derive(Default)]
    pub struct MockOutputs {
        pub key: bool,
        pub ptt: bool,
        pub tone_hz: u16,
        pub key_downs: u32,
    }

    impl MockOutputs {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl KeyerOutputs for MockOutputs {
        fn set_key(&mut self, on: bool) -> Result<(), HalError> {
            if on && !self.key {
                self.key_downs += 1;
            }
            self.key = on;
            Ok(())
        }

        fn set_ptt(&mut self, on: bool) -> Result<(), HalError> {
            self.ptt = on;
            Ok(())
        }

        fn set_tone(&mut self, hz: u16) -> Result<(), HalError> {
            self.tone_hz = hz;
            Ok(())
        }
    }

    /// Host link with a receive queue and a transmit log
    #[derive(Default)]
    pub struct MockSerial {
        rx: Deque<u8, 512>,
        tx: Vec<u8, 1024>,
    }

    impl MockSerial {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue bytes as if sent by the host; bytes beyond capacity are dropped
        pub fn feed(&mut self, bytes: &[u8]) {
            for byte in bytes {
                let _ = self.rx.push_back(*byte);
            }
        }

        pub fn pending(&self) -> usize {
            self.rx.len()
        }

        pub fn written(&self) -> &[u8] {
            &self.tx
        }

        pub fn clear_written(&mut self) {
            self.tx.clear();
        }
    }

    impl HostSerial for MockSerial {
        fn read_byte(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn write_byte(&mut self, byte: u8) {
            let _ = self.tx.push(byte);
        }
    }
}
