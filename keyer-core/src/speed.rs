//! Speed control boundary: rotary encoder, potentiometer or a fixed value

use portable_atomic::{AtomicI32, Ordering};

use crate::hal::HalError;

/// Full-scale reading of the potentiometer input
pub const POT_FULL_SCALE: u16 = 1023;
/// Minimum time between potentiometer readings
pub const POT_INTERVAL_MS: u32 = 150;

/// Lowest speed the range may start at
pub const RANGE_MIN_WPM: u8 = 5;
/// The range top must reach at least this speed
pub const RANGE_MAX_FLOOR_WPM: u8 = 15;

/// Speed range shared by the controls
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedRange {
    pub min: u8,
    pub max: u8,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self { min: 5, max: 40 }
    }
}

impl SpeedRange {
    /// Apply a new range. Bounds that fail validation are left unchanged and
    /// `min < max` holds afterwards: when the pair does not fit together,
    /// only the bound that still fits the other one's old value is taken.
    pub fn set(&mut self, min: u8, max: u8) {
        let min = (min >= RANGE_MIN_WPM).then_some(min);
        let max = (max >= RANGE_MAX_FLOOR_WPM).then_some(max);
        let (new_min, new_max) = (min.unwrap_or(self.min), max.unwrap_or(self.max));

        if new_min < new_max {
            self.min = new_min;
            self.max = new_max;
        } else if let Some(min) = min.filter(|&min| min < self.max) {
            self.min = min;
        } else if let Some(max) = max.filter(|&max| max > self.min) {
            self.max = max;
        }
    }

    pub fn crop(&self, value: i32) -> u8 {
        value.max(self.min as i32).min(self.max as i32) as u8
    }
}

/// A physical speed input, as seen by the tick
pub trait SpeedControl {
    /// Current speed in WPM
    fn value(&self) -> u8;

    fn range(&self) -> SpeedRange;

    fn set_min_max(&mut self, min: u8, max: u8);

    /// Fold pending input into the value; true when it changed
    fn update(&mut self, now_ms: u32) -> bool;

    /// Preset the value where the input allows it
    fn set_value(&mut self, _wpm: u8) {}

    /// Speed as reported to the host: offset from the range minimum, six bits
    fn speed_wk2(&self) -> u8 {
        0x80 | (self.value().wrapping_sub(self.range().min) & 0x3F)
    }
}

/// Encoder pulses accumulated in interrupt context.
///
/// The tick reads and clears the count in one atomic step.
#[derive(Debug, Default)]
pub struct PulseCounter {
    pulses: AtomicI32,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            pulses: AtomicI32::new(0),
        }
    }

    /// Record one detent; safe to call from an interrupt handler
    pub fn record(&self, delta: i32) {
        self.pulses.fetch_add(delta, Ordering::Relaxed);
    }

    /// Read and clear the accumulated count
    pub fn take(&self) -> i32 {
        self.pulses.swap(0, Ordering::AcqRel)
    }
}

/// Rotary encoder fed by a [`PulseCounter`]
#[derive(Debug)]
pub struct RotaryEncoder<'a> {
    pulses: &'a PulseCounter,
    value: u8,
    range: SpeedRange,
}

impl<'a> RotaryEncoder<'a> {
    pub fn new(pulses: &'a PulseCounter, initial_wpm: u8) -> Self {
        let range = SpeedRange::default();
        Self {
            pulses,
            value: range.crop(initial_wpm as i32),
            range,
        }
    }
}

impl SpeedControl for RotaryEncoder<'_> {
    fn value(&self) -> u8 {
        self.value
    }

    fn range(&self) -> SpeedRange {
        self.range
    }

    fn set_min_max(&mut self, min: u8, max: u8) {
        self.range.set(min, max);
    }

    fn update(&mut self, _now_ms: u32) -> bool {
        let increment = self.pulses.take();
        if increment == 0 {
            return false;
        }
        let target = self.value as i32 + increment;
        if target <= 0 {
            return false;
        }
        let old = self.value;
        self.value = self.range.crop(target);
        old != self.value
    }

    fn set_value(&mut self, wpm: u8) {
        self.value = self.range.crop(wpm as i32);
    }
}

/// Raw analog reading behind a potentiometer
pub trait SpeedSense {
    fn read_raw(&mut self) -> Result<u16, HalError>;
}

/// Potentiometer mapped linearly onto the speed range
#[derive(Debug)]
pub struct Potentiometer<S> {
    sense: S,
    value: u8,
    range: SpeedRange,
    last_reading_ms: Option<u32>,
}

impl<S: SpeedSense> Potentiometer<S> {
    pub fn new(sense: S) -> Self {
        let range = SpeedRange::default();
        Self {
            sense,
            value: range.min,
            range,
            last_reading_ms: None,
        }
    }

    fn map(&self, raw: u16) -> u8 {
        let raw = raw.min(POT_FULL_SCALE) as u32;
        let span = self.range.max.saturating_sub(self.range.min) as u32;
        self.range.min + (raw * span / POT_FULL_SCALE as u32) as u8
    }
}

impl<S: SpeedSense> SpeedControl for Potentiometer<S> {
    fn value(&self) -> u8 {
        self.value
    }

    fn range(&self) -> SpeedRange {
        self.range
    }

    fn set_min_max(&mut self, min: u8, max: u8) {
        self.range.set(min, max);
        self.value = self.range.crop(self.value as i32);
    }

    fn update(&mut self, now_ms: u32) -> bool {
        let due = match self.last_reading_ms {
            Some(last) => now_ms.wrapping_sub(last) > POT_INTERVAL_MS,
            None => true,
        };
        if !due {
            return false;
        }
        self.last_reading_ms = Some(now_ms);

        // a failed conversion keeps the previous value
        let Ok(raw) = self.sense.read_raw() else {
            return false;
        };
        let old = self.value;
        self.value = self.map(raw);
        old != self.value
    }
}

/// No physical input: the value only changes through `set_value`
#[derive(Debug, Clone)]
pub struct FixedSpeed {
    value: u8,
    range: SpeedRange,
}

impl FixedSpeed {
    pub fn new(wpm: u8) -> Self {
        Self {
            value: wpm,
            range: SpeedRange::default(),
        }
    }
}

impl SpeedControl for FixedSpeed {
    fn value(&self) -> u8 {
        self.value
    }

    fn range(&self) -> SpeedRange {
        self.range
    }

    fn set_min_max(&mut self, min: u8, max: u8) {
        self.range.set(min, max);
    }

    fn update(&mut self, _now_ms: u32) -> bool {
        false
    }

    fn set_value(&mut self, wpm: u8) {
        self.value = wpm;
    }
}
