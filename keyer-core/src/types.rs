//! Core data types for the keyer

/// Lowest sidetone frequency the sidetone band accepts
pub const SIDETONE_MIN_HZ: u16 = 300;
/// Highest sidetone frequency the sidetone band accepts
pub const SIDETONE_MAX_HZ: u16 = 3000;
/// Upper bound for the first-element extension
pub const FIRST_EXTENSION_MAX_MS: u8 = 250;

/// Keyed or silent timing element
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "std", derive(Hash))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Element {
    /// Nothing in progress
    #[default]
    None,
    /// Dit (short element)
    Dit,
    /// Dah (long element)
    Dah,
    /// Character space, added after the element space of the last element
    CharSpace,
    /// Word space, added after the character space
    WordSpace,
    /// Autospace gap between paddle characters
    HalfSpace,
}

impl Element {
    /// Returns true if this element produces key output
    pub const fn is_keyed(&self) -> bool {
        matches!(self, Element::Dit | Element::Dah)
    }

    /// Returns the opposite element (Dit <-> Dah), others unchanged
    pub const fn opposite(&self) -> Element {
        match self {
            Element::Dit => Element::Dah,
            Element::Dah => Element::Dit,
            other => *other,
        }
    }

    /// Next element of a squeeze: the opposite of `last`, Dah when nothing was sent yet
    pub const fn alternate(last: Element) -> Element {
        match last {
            Element::Dah => Element::Dit,
            _ => Element::Dah,
        }
    }
}

/// Keyer operating modes
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyerMode {
    /// Iambic A: squeeze memory is dropped when the paddles are released
    IambicA,
    /// Iambic B: one opposite element is sent after a squeeze release
    #[default]
    IambicB,
    /// Ultimatic: the most recently pressed paddle wins a squeeze
    Ultimatic,
}

impl KeyerMode {
    /// Returns true if this mode keeps squeeze memory after release
    pub const fn has_memory(&self) -> bool {
        matches!(self, KeyerMode::IambicB)
    }

    /// Returns true if squeezing alternates elements
    pub const fn alternates(&self) -> bool {
        !matches!(self, KeyerMode::Ultimatic)
    }

    /// Decode the key mode bits (5:4) of a mode register byte.
    ///
    /// `None` for the bug mode, which this keyer does not implement.
    pub const fn from_mode_register(byte: u8) -> Option<KeyerMode> {
        match byte & 0x30 {
            0x00 => Some(KeyerMode::IambicB),
            0x10 => Some(KeyerMode::IambicA),
            0x20 => Some(KeyerMode::Ultimatic),
            _ => None,
        }
    }
}

/// Paddle side identification
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PaddleSide {
    /// Dit paddle (typically left side)
    Dit,
    /// Dah paddle (typically right side)
    Dah,
}

impl PaddleSide {
    /// Convert to corresponding Element
    pub const fn to_element(&self) -> Element {
        match self {
            PaddleSide::Dit => Element::Dit,
            PaddleSide::Dah => Element::Dah,
        }
    }

    /// Returns the opposite paddle side
    pub const fn opposite(&self) -> PaddleSide {
        match self {
            PaddleSide::Dit => PaddleSide::Dah,
            PaddleSide::Dah => PaddleSide::Dit,
        }
    }
}

/// Debounced contact state of both paddles.
///
/// On the wire and in the sampler this is a two-bit value: bit 0 = Dit, bit 1 = Dah.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PaddleState {
    /// No contact
    #[default]
    Free,
    /// Dit contact only
    Dit,
    /// Dah contact only
    Dah,
    /// Both contacts
    Squeeze,
}

impl PaddleState {
    pub const DIT_BIT: u8 = 0x01;
    pub const DAH_BIT: u8 = 0x02;

    /// Build from the two low bits of `bits`
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => PaddleState::Free,
            1 => PaddleState::Dit,
            2 => PaddleState::Dah,
            _ => PaddleState::Squeeze,
        }
    }

    pub const fn bits(&self) -> u8 {
        match self {
            PaddleState::Free => 0,
            PaddleState::Dit => Self::DIT_BIT,
            PaddleState::Dah => Self::DAH_BIT,
            PaddleState::Squeeze => Self::DIT_BIT | Self::DAH_BIT,
        }
    }

    pub const fn is_free(&self) -> bool {
        matches!(self, PaddleState::Free)
    }

    pub const fn is_squeeze(&self) -> bool {
        matches!(self, PaddleState::Squeeze)
    }

    pub const fn has(&self, side: PaddleSide) -> bool {
        let bit = match side {
            PaddleSide::Dit => Self::DIT_BIT,
            PaddleSide::Dah => Self::DAH_BIT,
        };
        self.bits() & bit != 0
    }

    /// The single pressed side, if exactly one paddle is in contact
    pub const fn single(&self) -> Option<PaddleSide> {
        match self {
            PaddleState::Dit => Some(PaddleSide::Dit),
            PaddleState::Dah => Some(PaddleSide::Dah),
            PaddleState::Free | PaddleState::Squeeze => None,
        }
    }

    /// Exchange the Dit and Dah contacts
    pub const fn swapped(&self) -> PaddleState {
        match self {
            PaddleState::Dit => PaddleState::Dah,
            PaddleState::Dah => PaddleState::Dit,
            other => *other,
        }
    }
}

/// Engine readiness
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Busy {
    /// No timer running and no element in progress
    #[default]
    Ready,
    /// A mark or a space is being timed
    Busy,
}

/// Where the engine takes its next element from
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyingSource {
    #[default]
    Paddle,
    Buffer,
    /// Forced keydown requested by the host
    Command,
}

/// Snapshot of the keyer returned by every service tick
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyerState {
    pub key: bool,
    pub ptt: bool,
    pub busy: Busy,
    pub break_in: bool,
    /// The two-slot code buffer can take another code
    pub accept: bool,
    pub source: KeyingSource,
    pub force: bool,
    pub mode: KeyerMode,
    pub has_paddle_code: bool,
}

impl Default for KeyerState {
    fn default() -> Self {
        Self {
            key: false,
            ptt: false,
            busy: Busy::Ready,
            break_in: false,
            accept: true,
            source: KeyingSource::Paddle,
            force: false,
            mode: KeyerMode::IambicB,
            has_paddle_code: false,
        }
    }
}

impl KeyerState {
    pub const fn is_ready(&self) -> bool {
        matches!(self.busy, Busy::Ready)
    }

    /// True while characters from the text buffer are being keyed
    pub const fn is_sending_buffer(&self) -> bool {
        matches!(self.source, KeyingSource::Buffer)
    }
}

/// Element timing parameters, mutated only by configuration operations
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingParameters {
    pub wpm: u8,
    /// Base timing unit, `1200 / wpm` milliseconds
    pub unit_ms: u32,
    /// Mark share of the element period in percent, 50 = neutral
    pub weighting: u32,
    /// Dah mark relative to the Dit mark in percent, 300 = 3:1
    pub dit_dah_ratio: u32,
    pub farnsworth_wpm: u8,
    pub qsk_compensation_ms: u32,
    pub ptt_lead_ms: u32,
    pub ptt_tail_ms: u32,
    pub first_extension_ms: u32,
}

impl TimingParameters {
    pub const fn unit_for_wpm(wpm: u8) -> u32 {
        let wpm = if wpm == 0 { 1 } else { wpm as u32 };
        1200 / wpm
    }
}

impl Default for TimingParameters {
    fn default() -> Self {
        KeyerConfig::default().timing()
    }
}

/// Keyer configuration parameters applied at power-up and on reset
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyerConfig {
    /// Operating mode
    pub mode: KeyerMode,
    /// Keying speed in words per minute
    pub wpm: u8,
    pub weighting: u8,
    /// Dah:Dit mark ratio in percent
    pub dit_dah_ratio: u16,
    pub sidetone_hz: u16,
    pub ptt_lead_ms: u8,
    pub ptt_tail_ms: u8,
    pub first_extension_ms: u8,
    pub qsk_compensation_ms: u8,
    pub farnsworth_wpm: u8,
    /// Speed control range
    pub speed_min: u8,
    pub speed_max: u8,
    pub swap_paddles: bool,
    pub autospace: bool,
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self {
            mode: KeyerMode::IambicB,
            wpm: 20,
            weighting: 50,
            dit_dah_ratio: 300,
            sidetone_hz: 600,
            ptt_lead_ms: 0,
            ptt_tail_ms: 0,
            first_extension_ms: 0,
            qsk_compensation_ms: 0,
            farnsworth_wpm: 10,
            speed_min: 5,
            speed_max: 40,
            swap_paddles: false,
            autospace: false,
        }
    }
}

impl KeyerConfig {
    /// Create a new configuration with validation
    pub fn new(
        mode: KeyerMode,
        wpm: u8,
        weighting: u8,
        dit_dah_ratio: u16,
        first_extension_ms: u8,
    ) -> Result<Self, &'static str> {
        if !(5..=99).contains(&wpm) {
            return Err("WPM must be between 5 and 99");
        }
        if !(10..=90).contains(&weighting) {
            return Err("Weighting must be between 10 and 90");
        }
        if !(150..=500).contains(&dit_dah_ratio) {
            return Err("Dit:dah ratio must be between 150 and 500 percent");
        }
        if first_extension_ms > FIRST_EXTENSION_MAX_MS {
            return Err("First extension must be <= 250ms");
        }

        Ok(Self {
            mode,
            wpm,
            weighting,
            dit_dah_ratio,
            first_extension_ms,
            ..Self::default()
        })
    }

    /// Basic timing unit in milliseconds (PARIS standard: 50 units per word)
    pub fn unit_ms(&self) -> u32 {
        TimingParameters::unit_for_wpm(self.wpm)
    }

    /// Timing parameters derived from this configuration
    pub fn timing(&self) -> TimingParameters {
        TimingParameters {
            wpm: self.wpm,
            unit_ms: self.unit_ms(),
            weighting: self.weighting as u32,
            dit_dah_ratio: self.dit_dah_ratio as u32,
            farnsworth_wpm: self.farnsworth_wpm,
            qsk_compensation_ms: self.qsk_compensation_ms as u32,
            ptt_lead_ms: self.ptt_lead_ms as u32,
            ptt_tail_ms: self.ptt_tail_ms as u32,
            first_extension_ms: self.first_extension_ms.min(FIRST_EXTENSION_MAX_MS) as u32,
        }
    }
}
