//! Element timing state machine and keying source arbitration
//!
//! The engine is driven by [`KeyingEngine::service`] from a single tick and
//! never blocks: marks and spaces are timers decremented by the wall-clock
//! time elapsed since the previous tick. At most one of the two timers is
//! non-zero at any time.

use crate::morse::{CodeCollector, CHAR_SPACE_CODE, WORD_SPACE_CODE};
use crate::paddle::PaddleStatus;
use crate::types::{
    Busy, Element, KeyerConfig, KeyerMode, KeyerState, KeyingSource, PaddleState,
    TimingParameters, FIRST_EXTENSION_MAX_MS, SIDETONE_MAX_HZ, SIDETONE_MIN_HZ,
};

/// Paddle idle time, in units after an element space, that completes a character
pub const CHAR_GAP_UNITS: u32 = 2;
/// Paddle idle time, in units after an element space, that completes a word
pub const WORD_GAP_UNITS: u32 = 6;

/// Levels the outputs should be driven to
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputLines {
    pub key: bool,
    pub ptt: bool,
    /// Sidetone frequency, `0` when silent
    pub tone_hz: u16,
}

#[derive(Copy, Clone, Debug)]
struct ForceKeydown {
    started_ms: u32,
    timeout_ms: u32,
}

/// Keying engine owning timing, line state and source arbitration
#[derive(Debug)]
pub struct KeyingEngine {
    timing: TimingParameters,
    state: KeyerState,

    current: Element,
    last: Element,
    /// Source of the element in `current`
    element_source: KeyingSource,
    on_timer: u32,
    off_timer: u32,
    /// Space that follows the running mark
    pending_space: u32,
    last_tick: Option<u32>,

    current_code: u8,
    next_code: u8,

    /// Opposite paddle latched while an element plays
    iambic_b_memory: PaddleState,
    force: Option<ForceKeydown>,
    break_in_pending: bool,

    key_enabled: bool,
    ptt_enabled: bool,
    tone_enabled: bool,
    tone_paddle_only: bool,
    tone_hz: u16,

    autospace: bool,
    first_element: bool,
    idle_ms: u32,
    collector: CodeCollector,
    paddle_code: Option<u16>,
    word_gap_armed: bool,
}

impl KeyingEngine {
    pub fn new(config: &KeyerConfig) -> Self {
        Self {
            timing: config.timing(),
            state: KeyerState {
                mode: config.mode,
                ..KeyerState::default()
            },
            current: Element::None,
            last: Element::None,
            element_source: KeyingSource::Paddle,
            on_timer: 0,
            off_timer: 0,
            pending_space: 0,
            last_tick: None,
            current_code: 0,
            next_code: 0,
            iambic_b_memory: PaddleState::Free,
            force: None,
            break_in_pending: false,
            key_enabled: true,
            ptt_enabled: true,
            tone_enabled: true,
            tone_paddle_only: false,
            tone_hz: clamp_tone(config.sidetone_hz),
            autospace: config.autospace,
            first_element: true,
            idle_ms: 0,
            collector: CodeCollector::new(),
            paddle_code: None,
            word_gap_armed: false,
        }
    }

    /// Advance the engine to `now_ms` and return the resulting state.
    ///
    /// Consumes the paddle touch flag.
    pub fn service(&mut self, now_ms: u32, paddle: &mut PaddleStatus) -> KeyerState {
        let touched = paddle.take_touch();

        // break-in and force keydown end pre-empt all timer bookkeeping
        let buffer_break = touched && self.state.source == KeyingSource::Buffer;
        let force_break = touched && self.state.force;
        let force_expired = self
            .force
            .is_some_and(|f| now_ms.wrapping_sub(f.started_ms) >= f.timeout_ms);
        if buffer_break || force_break || force_expired {
            #[cfg(feature = "defmt")]
            if force_expired {
                defmt::info!("force keydown timed out");
            } else {
                defmt::debug!("break-in from {}", self.state.source);
            }
            self.interrupt(now_ms, buffer_break);
            paddle.current = Element::None;
            return self.state;
        }
        if self.state.force {
            self.last_tick = Some(now_ms);
            return self.state;
        }

        let elapsed = match self.last_tick {
            Some(last) => now_ms.wrapping_sub(last),
            None => 0,
        };
        self.last_tick = Some(now_ms);
        if elapsed == 0 {
            return self.state;
        }

        if self.on_timer > 0 {
            self.latch_iambic_b(paddle.contacts);
            self.on_timer = self.on_timer.saturating_sub(elapsed);
            if self.on_timer == 0 {
                self.state.key = false;
                self.off_timer = self.pending_space.max(1);
                self.pending_space = 0;
            }
            return self.refresh();
        }

        // idle time starts counting on the tick after a space ends
        let mut idle_elapsed = elapsed;
        if self.off_timer > 0 {
            self.latch_iambic_b(paddle.contacts);
            self.off_timer = self.off_timer.saturating_sub(elapsed);
            if self.off_timer > 0 {
                return self.refresh();
            }
            self.end_space();
            idle_elapsed = 0;
        }

        if self.state.source == KeyingSource::Buffer {
            self.service_buffer();
        }
        if self.state.source == KeyingSource::Paddle && self.state.busy == Busy::Ready {
            self.service_paddle(idle_elapsed, paddle);
        }

        self.refresh()
    }

    fn end_space(&mut self) {
        self.last = self.current;
        self.current = Element::None;
        self.state.busy = Busy::Ready;
        if self.break_in_pending {
            self.break_in_pending = false;
            self.state.break_in = false;
            self.state.accept = true;
            self.state.source = KeyingSource::Paddle;
        }
    }

    fn service_buffer(&mut self) {
        if self.current_code == 0 {
            self.current_code = self.next_code;
            self.next_code = 0;
            self.state.accept = true;
            if self.current_code == 0 {
                self.state.source = KeyingSource::Paddle;
                return;
            }
        }

        match self.current_code {
            WORD_SPACE_CODE => {
                self.current_code = 0;
                self.send_element(Element::WordSpace, KeyingSource::Buffer);
            }
            CHAR_SPACE_CODE => {
                self.current_code = 0;
                self.send_element(Element::CharSpace, KeyingSource::Buffer);
            }
            code => {
                let element = if code & 0x80 != 0 { Element::Dah } else { Element::Dit };
                self.current_code = code << 1;
                self.send_element(element, KeyingSource::Buffer);
            }
        }
    }

    fn service_paddle(&mut self, elapsed: u32, paddle: &mut PaddleStatus) {
        let element = match self.state.mode {
            KeyerMode::Ultimatic => {
                if paddle.contacts.is_free() {
                    Element::None
                } else {
                    paddle.next
                }
            }
            KeyerMode::IambicA | KeyerMode::IambicB => {
                let mut contacts = paddle.contacts;
                if self.state.mode.has_memory() {
                    contacts = PaddleState::from_bits(contacts.bits() | self.iambic_b_memory.bits());
                }
                match contacts {
                    PaddleState::Free => Element::None,
                    PaddleState::Squeeze => Element::alternate(self.last),
                    single => single.single().map(|side| side.to_element()).unwrap_or(Element::None),
                }
            }
        };

        if element.is_keyed() {
            // the sampler alternates a squeeze from this element
            paddle.current = element;
            self.collector.push(element);
            self.send_element(element, KeyingSource::Paddle);
            // a squeeze already held at the start counts for the memory
            self.latch_iambic_b(paddle.contacts);
            return;
        }

        if self.autospace && self.last.is_keyed() && self.element_source == KeyingSource::Paddle {
            self.finish_character();
            self.send_element(Element::HalfSpace, KeyingSource::Paddle);
            return;
        }

        self.idle_ms = self.idle_ms.saturating_add(elapsed);
        let unit = self.timing.unit_ms;
        if self.idle_ms >= CHAR_GAP_UNITS * unit {
            self.finish_character();
        }
        if self.idle_ms >= WORD_GAP_UNITS * unit {
            self.first_element = true;
            if self.word_gap_armed && self.paddle_code.is_none() {
                self.word_gap_armed = false;
                self.paddle_code = Some(0);
                self.state.has_paddle_code = true;
            }
        }
    }

    fn finish_character(&mut self) {
        if let Some(code) = self.collector.finish() {
            self.paddle_code = Some(code);
            self.state.has_paddle_code = true;
            self.word_gap_armed = true;
        }
    }

    fn latch_iambic_b(&mut self, contacts: PaddleState) {
        if self.state.mode != KeyerMode::IambicB || !self.current.is_keyed() {
            return;
        }
        let opposite = self.current.opposite();
        let wanted = match opposite {
            Element::Dit => contacts.bits() & PaddleState::DIT_BIT,
            _ => contacts.bits() & PaddleState::DAH_BIT,
        };
        self.iambic_b_memory = PaddleState::from_bits(self.iambic_b_memory.bits() | wanted);
    }

    /// Start `element` and compute its timers
    pub fn send_element(&mut self, element: Element, source: KeyingSource) {
        self.current = element;
        self.element_source = source;
        self.iambic_b_memory = PaddleState::Free;
        self.idle_ms = 0;

        let unit = self.timing.unit_ms;
        match element {
            Element::Dit | Element::Dah => {
                let mut mark = unit * self.timing.weighting / 50;
                let space = (2 * unit).saturating_sub(mark);
                if element == Element::Dah {
                    mark = mark * self.timing.dit_dah_ratio / 100;
                }
                mark += self.timing.qsk_compensation_ms;
                if self.first_element {
                    mark += self.timing.first_extension_ms;
                    self.first_element = false;
                }
                self.on_timer = mark.max(1);
                self.off_timer = 0;
                self.pending_space = space.max(1);
                self.state.key = true;
                self.state.busy = Busy::Busy;
            }
            Element::CharSpace | Element::WordSpace | Element::HalfSpace => {
                let space = match element {
                    Element::CharSpace => 2 * unit,
                    Element::WordSpace => 4 * unit,
                    _ => 3 * unit + 1,
                };
                self.on_timer = 0;
                self.off_timer = space.max(1);
                self.pending_space = 0;
                self.state.key = false;
                self.state.busy = Busy::Busy;
            }
            Element::None => {
                self.on_timer = 0;
                self.off_timer = 0;
                self.pending_space = 0;
                self.state.key = false;
                self.state.busy = Busy::Ready;
            }
        }
        self.refresh();
    }

    /// De-key immediately and start a one-unit settle space
    fn interrupt(&mut self, now_ms: u32, from_buffer: bool) {
        let was_forced = self.state.force;
        self.state.key = false;
        self.state.force = false;
        self.force = None;
        self.current = Element::None;
        self.last = Element::None;
        self.iambic_b_memory = PaddleState::Free;
        self.collector = CodeCollector::new();

        if from_buffer {
            self.current_code = 0;
            self.next_code = 0;
            self.state.break_in = true;
            self.state.accept = false;
            self.break_in_pending = true;
            self.state.source = KeyingSource::Buffer;
        } else if was_forced {
            self.state.source = self.source_after_force();
        }

        self.on_timer = 0;
        self.pending_space = 0;
        self.off_timer = self.timing.unit_ms.max(1);
        self.state.busy = Busy::Busy;
        self.first_element = true;
        self.last_tick = Some(now_ms);
        self.refresh();
    }

    fn source_after_force(&self) -> KeyingSource {
        if self.current_code != 0 || self.next_code != 0 {
            KeyingSource::Buffer
        } else {
            KeyingSource::Paddle
        }
    }

    fn refresh(&mut self) -> KeyerState {
        self.state.ptt = self.state.force || self.state.busy == Busy::Busy;
        self.state
    }

    /// Queue a binary code; `false` when both code slots are occupied.
    ///
    /// A zero code is accepted and produces nothing.
    pub fn accept_code(&mut self, code: u8) -> bool {
        if self.current_code != 0 && self.next_code != 0 {
            self.state.accept = false;
            return false;
        }
        if code == 0 {
            return true;
        }

        if self.current_code == 0 && self.next_code == 0 {
            self.current_code = code;
        } else if self.next_code == 0 {
            self.next_code = code;
        } else {
            // current drained but next not yet promoted
            self.current_code = self.next_code;
            self.next_code = code;
        }

        if !self.state.force {
            self.state.source = KeyingSource::Buffer;
        }
        self.state.accept = self.next_code == 0;
        true
    }

    /// True when another code can be queued
    pub fn can_accept(&self) -> bool {
        !self.break_in_pending && (self.current_code == 0 || self.next_code == 0)
    }

    /// Drop both queued codes; an element already playing completes
    pub fn clear_codes(&mut self) {
        self.current_code = 0;
        self.next_code = 0;
        self.state.accept = !self.break_in_pending;
        if self.state.source == KeyingSource::Buffer && !self.break_in_pending {
            self.state.source = KeyingSource::Paddle;
        }
    }

    pub fn set_mode(&mut self, mode: KeyerMode) {
        if self.state.mode == mode {
            return;
        }
        #[cfg(feature = "defmt")]
        defmt::debug!("keyer mode {} -> {}", self.state.mode, mode);

        self.state.mode = mode;
        self.iambic_b_memory = PaddleState::Free;
        self.last = Element::None;
    }

    /// Update speed, dit:dah ratio and weighting; zero keeps the current value
    pub fn set_timing_parameters(&mut self, wpm: u8, dit_dah_ratio: u16, weighting: u8) {
        if wpm != 0 {
            self.timing.wpm = wpm.clamp(5, 99);
            self.timing.unit_ms = TimingParameters::unit_for_wpm(self.timing.wpm);
        }
        if dit_dah_ratio != 0 {
            self.timing.dit_dah_ratio = dit_dah_ratio.clamp(150, 500) as u32;
        }
        if weighting != 0 {
            self.timing.weighting = weighting.clamp(10, 90) as u32;
        }
    }

    /// Stored only, not applied to element timing
    pub fn set_ptt_timing(&mut self, lead_ms: u32, tail_ms: u32) {
        self.timing.ptt_lead_ms = lead_ms;
        self.timing.ptt_tail_ms = tail_ms;
    }

    /// Values above 250 ms are ignored
    pub fn set_first_extension(&mut self, extension_ms: u32) {
        if extension_ms <= FIRST_EXTENSION_MAX_MS as u32 {
            self.timing.first_extension_ms = extension_ms;
        }
    }

    pub fn set_qsk_compensation(&mut self, compensation_ms: u32) {
        self.timing.qsk_compensation_ms = compensation_ms;
    }

    /// Stored only, not applied to element timing
    pub fn set_farnsworth_wpm(&mut self, wpm: u8) {
        self.timing.farnsworth_wpm = wpm;
    }

    pub fn enable_key(&mut self, enabled: bool) {
        self.key_enabled = enabled;
    }

    pub fn enable_ptt(&mut self, enabled: bool) {
        self.ptt_enabled = enabled;
    }

    pub fn enable_tone(&mut self, enabled: bool) {
        self.tone_enabled = enabled;
    }

    /// Limit the sidetone to paddle-sourced elements
    pub fn set_tone_paddle_only(&mut self, paddle_only: bool) {
        self.tone_paddle_only = paddle_only;
    }

    /// Clamped to the sidetone band; `0` silences the sidetone
    pub fn set_tone_frequency(&mut self, hz: u16) {
        self.tone_hz = clamp_tone(hz);
    }

    pub fn set_autospace(&mut self, autospace: bool) {
        self.autospace = autospace;
    }

    /// Start or end a forced keydown; it ends by itself after `timeout_ms`
    pub fn force_key(&mut self, on: bool, now_ms: u32, timeout_ms: u32) {
        if on {
            if self.state.force {
                return;
            }
            self.force = Some(ForceKeydown { started_ms: now_ms, timeout_ms });
            self.state.force = true;
            self.state.key = true;
            self.state.source = KeyingSource::Command;
            self.current = Element::None;
            self.on_timer = 0;
            self.off_timer = 0;
            self.pending_space = 0;
            self.state.busy = Busy::Ready;
        } else if self.state.force {
            self.force = None;
            self.state.force = false;
            self.state.key = false;
            self.state.source = self.source_after_force();
            self.last_tick = Some(now_ms);
        }
        self.refresh();
    }

    /// Take the paddle code finished since the last call
    pub fn take_paddle_code(&mut self) -> Option<u16> {
        self.state.has_paddle_code = false;
        self.paddle_code.take()
    }

    pub fn state(&self) -> KeyerState {
        self.state
    }

    pub fn timing(&self) -> &TimingParameters {
        &self.timing
    }

    pub fn current_element(&self) -> Element {
        self.current
    }

    pub fn last_element(&self) -> Element {
        self.last
    }

    /// Mark and space timers in milliseconds
    pub fn timers(&self) -> (u32, u32) {
        (self.on_timer, self.off_timer)
    }

    pub fn queued_codes(&self) -> (u8, u8) {
        (self.current_code, self.next_code)
    }

    pub fn tone_hz(&self) -> u16 {
        self.tone_hz
    }

    /// Output levels after the key, PTT and sidetone enables are applied
    pub fn lines(&self) -> OutputLines {
        let keyed = self.state.key;
        let tone_source_ok = !self.tone_paddle_only
            || (!self.state.force && self.element_source == KeyingSource::Paddle);
        let tone_hz = if keyed && self.tone_enabled && tone_source_ok {
            self.tone_hz
        } else {
            0
        };
        OutputLines {
            key: keyed && self.key_enabled,
            ptt: self.state.ptt && self.ptt_enabled,
            tone_hz,
        }
    }
}

fn clamp_tone(hz: u16) -> u16 {
    if hz == 0 {
        0
    } else {
        hz.clamp(SIDETONE_MIN_HZ, SIDETONE_MAX_HZ)
    }
}
