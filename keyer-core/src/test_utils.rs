//! Test utilities for keyer core functionality

pub mod virtual_time {
    //! Virtual time shared between the keyer and the test

    use crate::hal::Clock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Millisecond clock advanced by the test; clones share one counter
    #[derive(Clone, Debug, Default)]
    pub struct VirtualClock {
        now: Arc<AtomicU32>,
    }

    impl VirtualClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn now(&self) -> u32 {
            self.now.load(Ordering::SeqCst)
        }

        pub fn advance(&self, ms: u32) {
            let now = self.now();
            self.now.store(now.wrapping_add(ms), Ordering::SeqCst);
        }

        pub fn set(&self, ms: u32) {
            self.now.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for VirtualClock {
        fn now_ms(&self) -> u32 {
            self.now()
        }
    }
}

pub mod paddle_simulator {
    //! Paddle input simulation for testing

    use super::virtual_time::VirtualClock;
    use crate::hal::{HalError, PaddleContacts};
    use crate::paddle::IDLE_LEVELS;
    use crate::types::PaddleState;
    use heapless::Vec;

    /// Contacts that take effect at a point in time
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct PaddleEvent {
        pub at_ms: u32,
        pub contacts: PaddleState,
    }

    /// Paddle pattern with times relative to its start
    #[derive(Debug, Clone)]
    pub struct PaddlePattern {
        pub events: Vec<PaddleEvent, 64>,
        pub description: &'static str,
    }

    impl PaddlePattern {
        /// Hold `contacts` for `duration_ms`, then release
        pub fn hold(contacts: PaddleState, duration_ms: u32) -> Self {
            Self::sequence(&[(contacts, duration_ms)], "Hold")
        }

        /// Dit paddle held for `duration_ms`
        pub fn dit(duration_ms: u32) -> Self {
            Self::sequence(&[(PaddleState::Dit, duration_ms)], "Dit")
        }

        /// Dah paddle held for `duration_ms`
        pub fn dah(duration_ms: u32) -> Self {
            Self::sequence(&[(PaddleState::Dah, duration_ms)], "Dah")
        }

        /// Dit closed first, Dah joins 10 ms later, both held for `duration_ms`
        pub fn squeeze(duration_ms: u32) -> Self {
            Self::sequence(
                &[(PaddleState::Dit, 10), (PaddleState::Squeeze, duration_ms)],
                "Squeeze",
            )
        }

        /// Back-to-back segments, released at the end
        pub fn sequence(segments: &[(PaddleState, u32)], description: &'static str) -> Self {
            let mut events = Vec::new();
            let mut offset = 0;
            for (contacts, duration_ms) in segments {
                events.push(PaddleEvent { at_ms: offset, contacts: *contacts }).ok();
                offset += duration_ms;
            }
            events.push(PaddleEvent { at_ms: offset, contacts: PaddleState::Free }).ok();
            Self { events, description }
        }

        /// Time of the final release
        pub fn duration_ms(&self) -> u32 {
            self.events.last().map(|e| e.at_ms).unwrap_or(0)
        }
    }

    /// Paddles replaying scheduled contact changes against a [`VirtualClock`]
    #[derive(Debug)]
    pub struct ScriptedPaddles {
        clock: VirtualClock,
        events: std::vec::Vec<PaddleEvent>,
    }

    impl ScriptedPaddles {
        pub fn new(clock: VirtualClock) -> Self {
            Self {
                clock,
                events: std::vec::Vec::new(),
            }
        }

        /// Change the contacts at an absolute time
        pub fn schedule(&mut self, at_ms: u32, contacts: PaddleState) {
            let pos = self.events.partition_point(|e| e.at_ms <= at_ms);
            self.events.insert(pos, PaddleEvent { at_ms, contacts });
        }

        /// Replay `pattern` starting at `start_ms`
        pub fn play(&mut self, start_ms: u32, pattern: &PaddlePattern) {
            for event in &pattern.events {
                self.schedule(start_ms + event.at_ms, event.contacts);
            }
        }

        /// Contacts in effect at `now_ms`
        pub fn contacts_at(&self, now_ms: u32) -> PaddleState {
            self.events
                .iter()
                .rev()
                .find(|e| e.at_ms <= now_ms)
                .map(|e| e.contacts)
                .unwrap_or(PaddleState::Free)
        }

        /// True once every scheduled change is in the past
        pub fn finished(&self) -> bool {
            self.events.last().map_or(true, |e| e.at_ms <= self.clock.now())
        }
    }

    impl PaddleContacts for ScriptedPaddles {
        fn read_levels(&mut self) -> Result<u8, HalError> {
            let contacts = self.contacts_at(self.clock.now());
            Ok(contacts.bits() ^ IDLE_LEVELS)
        }
    }
}

pub mod output_capture {
    //! Output capture and analysis for testing

    use super::virtual_time::VirtualClock;
    use crate::hal::{HalError, KeyerOutputs};

    /// Key line transition
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct KeyEvent {
        pub at_ms: u32,
        pub down: bool,
    }

    /// One completed key-down period
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Mark {
        pub start_ms: u32,
        pub duration_ms: u32,
    }

    impl Mark {
        pub fn end_ms(&self) -> u32 {
            self.start_ms + self.duration_ms
        }
    }

    /// Outputs that log every key and PTT transition with its time
    #[derive(Debug)]
    pub struct CaptureOutputs {
        clock: VirtualClock,
        key_events: Vec<KeyEvent>,
        ptt_events: Vec<KeyEvent>,
        pub key: bool,
        pub ptt: bool,
        pub tone_hz: u16,
        /// Highest sidetone frequency seen while keyed
        pub keyed_tone_hz: u16,
    }

    impl CaptureOutputs {
        pub fn new(clock: VirtualClock) -> Self {
            Self {
                clock,
                key_events: Vec::new(),
                ptt_events: Vec::new(),
                key: false,
                ptt: false,
                tone_hz: 0,
                keyed_tone_hz: 0,
            }
        }

        pub fn key_events(&self) -> &[KeyEvent] {
            &self.key_events
        }

        pub fn ptt_events(&self) -> &[KeyEvent] {
            &self.ptt_events
        }

        /// Clear the logs, keeping the current line levels
        pub fn clear(&mut self) {
            self.key_events.clear();
            self.ptt_events.clear();
            self.keyed_tone_hz = 0;
        }

        /// Completed marks in order; a mark still held is left out
        pub fn marks(&self) -> Vec<Mark> {
            let mut marks = Vec::new();
            let mut start = None;
            for event in &self.key_events {
                if event.down {
                    start = Some(event.at_ms);
                } else if let Some(start_ms) = start.take() {
                    marks.push(Mark {
                        start_ms,
                        duration_ms: event.at_ms - start_ms,
                    });
                }
            }
            marks
        }

        /// Key-up time between consecutive marks
        pub fn gaps(&self) -> Vec<u32> {
            self.marks()
                .windows(2)
                .map(|pair| pair[1].start_ms - pair[0].end_ms())
                .collect()
        }

        /// Dots and dashes for a 3:1 ratio; a gap of 2 units separates
        /// characters and 5 units separates words
        pub fn to_morse_string(&self, unit_ms: u32) -> String {
            let mut result = String::new();
            let mut previous: Option<Mark> = None;
            for mark in self.marks() {
                if let Some(prev) = previous {
                    let gap = mark.start_ms - prev.end_ms();
                    if gap >= 5 * unit_ms {
                        result.push_str(" / ");
                    } else if gap >= 2 * unit_ms {
                        result.push(' ');
                    }
                }
                result.push(if mark.duration_ms >= 2 * unit_ms { '-' } else { '.' });
                previous = Some(mark);
            }
            result
        }

        /// Analyze timing accuracy
        pub fn analyze_timing(&self, unit_ms: u32) -> TimingAnalysis {
            let mut analysis = TimingAnalysis {
                expected_unit_ms: unit_ms,
                dit_durations: Vec::new(),
                dah_durations: Vec::new(),
                inter_element_gaps: Vec::new(),
            };
            for mark in self.marks() {
                if mark.duration_ms >= 2 * unit_ms {
                    analysis.dah_durations.push(mark.duration_ms);
                } else {
                    analysis.dit_durations.push(mark.duration_ms);
                }
            }
            analysis.inter_element_gaps = self
                .gaps()
                .into_iter()
                .filter(|gap| *gap < 2 * unit_ms)
                .collect();
            analysis
        }
    }

    impl KeyerOutputs for CaptureOutputs {
        fn set_key(&mut self, on: bool) -> Result<(), HalError> {
            if on != self.key {
                self.key_events.push(KeyEvent {
                    at_ms: self.clock.now(),
                    down: on,
                });
            }
            self.key = on;
            Ok(())
        }

        fn set_ptt(&mut self, on: bool) -> Result<(), HalError> {
            if on != self.ptt {
                self.ptt_events.push(KeyEvent {
                    at_ms: self.clock.now(),
                    down: on,
                });
            }
            self.ptt = on;
            Ok(())
        }

        fn set_tone(&mut self, hz: u16) -> Result<(), HalError> {
            self.tone_hz = hz;
            self.keyed_tone_hz = self.keyed_tone_hz.max(hz);
            Ok(())
        }
    }

    /// Timing analysis results
    #[derive(Debug)]
    pub struct TimingAnalysis {
        pub expected_unit_ms: u32,
        pub dit_durations: Vec<u32>,
        pub dah_durations: Vec<u32>,
        pub inter_element_gaps: Vec<u32>,
    }

    fn error_percent(samples: &[u32], expected: u32) -> f64 {
        if samples.is_empty() || expected == 0 {
            return 0.0;
        }
        let expected = expected as f64;
        let average = samples.iter().map(|d| *d as f64).sum::<f64>() / samples.len() as f64;
        ((average - expected).abs() / expected) * 100.0
    }

    impl TimingAnalysis {
        /// Dit timing error in percent of one unit
        pub fn dit_accuracy(&self) -> f64 {
            error_percent(&self.dit_durations, self.expected_unit_ms)
        }

        /// Dah timing error in percent of three units
        pub fn dah_accuracy(&self) -> f64 {
            error_percent(&self.dah_durations, self.expected_unit_ms * 3)
        }

        /// Element space error in percent of one unit
        pub fn spacing_accuracy(&self) -> f64 {
            error_percent(&self.inter_element_gaps, self.expected_unit_ms)
        }
    }
}

pub mod host_link {
    //! Scripted host side of the serial link

    use crate::hal::HostSerial;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    pub struct ScriptedHost {
        to_keyer: VecDeque<u8>,
        from_keyer: Vec<u8>,
    }

    impl ScriptedHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn send(&mut self, bytes: &[u8]) {
            self.to_keyer.extend(bytes.iter().copied());
        }

        /// Bytes not yet read by the keyer
        pub fn pending(&self) -> usize {
            self.to_keyer.len()
        }

        pub fn received(&self) -> &[u8] {
            &self.from_keyer
        }

        pub fn take_received(&mut self) -> Vec<u8> {
            std::mem::take(&mut self.from_keyer)
        }
    }

    impl HostSerial for ScriptedHost {
        fn read_byte(&mut self) -> Option<u8> {
            self.to_keyer.pop_front()
        }

        fn write_byte(&mut self, byte: u8) {
            self.from_keyer.push(byte);
        }
    }
}

pub mod simulation {
    //! Whole keyer driven tick by tick in virtual time

    use super::host_link::ScriptedHost;
    use super::output_capture::CaptureOutputs;
    use super::paddle_simulator::{PaddlePattern, ScriptedPaddles};
    use super::virtual_time::VirtualClock;
    use crate::controller::KeyerController;
    use crate::speed::FixedSpeed;
    use crate::types::{KeyerConfig, KeyerMode, KeyerState, PaddleState};

    pub type SimulatedKeyer =
        KeyerController<VirtualClock, ScriptedPaddles, CaptureOutputs, ScriptedHost, FixedSpeed>;

    /// Keyer with scripted paddles and host, ticked once per virtual millisecond
    pub struct Simulation {
        keyer: SimulatedKeyer,
        clock: VirtualClock,
    }

    impl Simulation {
        pub fn new(config: KeyerConfig) -> Self {
            let clock = VirtualClock::new();
            let mut keyer = KeyerController::new(
                config,
                clock.clone(),
                ScriptedPaddles::new(clock.clone()),
                CaptureOutputs::new(clock.clone()),
                ScriptedHost::new(),
                FixedSpeed::new(config.wpm),
            );
            keyer.tick();
            Self { keyer, clock }
        }

        pub fn with_mode(mode: KeyerMode) -> Self {
            Self::new(KeyerConfig {
                mode,
                ..KeyerConfig::default()
            })
        }

        pub fn now_ms(&self) -> u32 {
            self.clock.now()
        }

        pub fn unit_ms(&self) -> u32 {
            self.keyer.engine().timing().unit_ms
        }

        /// Advance one millisecond and tick
        pub fn step(&mut self) -> KeyerState {
            self.clock.advance(1);
            self.keyer.tick()
        }

        /// Advance `ms` milliseconds in a single tick
        pub fn step_by(&mut self, ms: u32) -> KeyerState {
            self.clock.advance(ms);
            self.keyer.tick()
        }

        pub fn run_for(&mut self, ms: u32) {
            for _ in 0..ms {
                self.step();
            }
        }

        /// Nothing queued, nothing playing
        pub fn is_idle(&self) -> bool {
            let state = self.keyer.engine().state();
            state.is_ready()
                && !state.key
                && !state.force
                && self.keyer.engine().queued_codes() == (0, 0)
                && !self.keyer.protocol().text_buffer().has_more()
                && self.keyer.host().pending() == 0
                && self.keyer.paddles().finished()
        }

        /// Tick until idle; false when `max_ms` runs out first
        pub fn run_until_idle(&mut self, max_ms: u32) -> bool {
            for _ in 0..max_ms {
                self.step();
                if self.is_idle() {
                    return true;
                }
            }
            false
        }

        pub fn host_send(&mut self, bytes: &[u8]) {
            self.keyer.host_mut().send(bytes);
        }

        pub fn host_received(&self) -> &[u8] {
            self.keyer.host().received()
        }

        pub fn take_host_received(&mut self) -> Vec<u8> {
            self.keyer.host_mut().take_received()
        }

        /// Change the paddle contacts `delay_ms` from now
        pub fn hold_after(&mut self, delay_ms: u32, contacts: PaddleState) {
            let at = self.now_ms() + delay_ms;
            self.keyer.paddles_mut().schedule(at, contacts);
        }

        /// Start `pattern` on the next tick
        pub fn play(&mut self, pattern: &PaddlePattern) {
            let start = self.now_ms() + 1;
            self.keyer.paddles_mut().play(start, pattern);
        }

        pub fn outputs(&self) -> &CaptureOutputs {
            self.keyer.outputs()
        }

        /// Sent elements as dots and dashes
        pub fn sent_morse(&self) -> String {
            self.outputs().to_morse_string(self.unit_ms())
        }

        pub fn keyer(&self) -> &SimulatedKeyer {
            &self.keyer
        }

        pub fn keyer_mut(&mut self) -> &mut SimulatedKeyer {
            &mut self.keyer
        }
    }
}

pub mod test_scenarios {
    //! Common test scenarios

    use super::paddle_simulator::PaddlePattern;
    use crate::types::{KeyerMode, PaddleState};
    use heapless::Vec;

    /// "CQ" keyed on single paddles at `unit_ms`.
    ///
    /// Each paddle is released before its element ends, so the pattern
    /// keys the same in every mode. The character gap leaves the keyer
    /// idle long enough to complete "C" before "Q" starts.
    pub fn cq_pattern(unit_ms: u32) -> PaddlePattern {
        let half = unit_ms / 2;
        let dit = [(PaddleState::Dit, half), (PaddleState::Free, 2 * unit_ms - half)];
        let dah = [(PaddleState::Dah, unit_ms), (PaddleState::Free, 3 * unit_ms)];
        let char_gap = [(PaddleState::Free, 3 * unit_ms)];

        let parts: [&[(PaddleState, u32)]; 9] =
            [&dah, &dit, &dah, &dit, &char_gap, &dah, &dah, &dit, &dah];
        let segments: std::vec::Vec<(PaddleState, u32)> =
            parts.iter().flat_map(|part| part.iter().copied()).collect();
        PaddlePattern::sequence(&segments, "CQ")
    }

    /// The same squeeze in every keyer mode
    pub fn mode_comparison_scenarios(unit_ms: u32) -> Vec<(KeyerMode, PaddlePattern), 4> {
        let squeeze = PaddlePattern::squeeze(unit_ms * 5);
        Vec::from_iter([
            (KeyerMode::IambicA, squeeze.clone()),
            (KeyerMode::IambicB, squeeze.clone()),
            (KeyerMode::Ultimatic, squeeze),
        ])
    }
}
