//! Host protocol: command parser, text buffer and status reporting
//!
//! Bytes below `0x20` start a command, everything else is text for the
//! ring buffer. Status bytes go back to the host only when they change,
//! except on an explicit status request.

use crate::buffer::RingTextBuffer;
use crate::commands::{self, Command, CommandSpec, ADMIN_BASE, MAX_COMMAND, PARAM_CAPACITY};
use crate::hal::HostSerial;
use crate::keying::KeyingEngine;
use crate::morse::MorseCodec;
use crate::paddle::PaddleSampler;
use crate::speed::SpeedControl;
use crate::types::{KeyerMode, KeyerState, KeyingSource};

/// Fixed high bits of every status byte
pub const STATUS_TEMPLATE: u8 = 0xC0;
/// Text buffer nearly full
pub const STATUS_XOFF: u8 = 0x01;
pub const STATUS_BREAKIN: u8 = 0x02;
/// Sending from the text buffer
pub const STATUS_BUSY: u8 = 0x04;
/// Forced keydown, reported in WK2 status mode only
pub const STATUS_KEYDOWN: u8 = 0x08;

/// XOFF is raised when free space falls to this many bytes
pub const XOFF_THRESHOLD: usize = 4;
/// XON once free space climbs above this many bytes
pub const XON_THRESHOLD: usize = 16;

/// Revision byte answered on host open
pub const PROTOCOL_REVISION: u8 = 22;
/// A forced keydown releases itself after this long
pub const FORCE_KEYDOWN_TIMEOUT_MS: u32 = 15_000;
/// The sidetone command selects `SIDETONE_DIVIDEND / n` Hz
pub const SIDETONE_DIVIDEND: u16 = 4000;
/// PTT lead and tail arrive in units of 10 ms
pub const PTT_TIME_UNIT_MS: u32 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Phase {
    FetchAny,
    ExpectAdmin,
    ExpectParams,
    Execute,
}

/// Which status flags the host asked for
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusMode {
    Wk1,
    #[default]
    Wk2,
}

/// Everything a host command may reconfigure
pub struct Targets<'a, S: SpeedControl + ?Sized> {
    pub engine: &'a mut KeyingEngine,
    pub paddle: &'a mut PaddleSampler,
    pub speed: &'a mut S,
    pub now_ms: u32,
}

/// Byte-level host session
#[derive(Debug)]
pub struct HostProtocolEngine {
    phase: Phase,
    command: Option<CommandSpec>,
    params: [u8; PARAM_CAPACITY],
    bytes_expected: u16,
    bytes_fetched: u16,

    fifo: RingTextBuffer,
    /// Text byte read while the ring buffer was full
    pending_text: Option<u8>,
    utf8_prefix: Option<u8>,
    paused: bool,

    last_status: u8,
    xoff: bool,
    break_in_seen: bool,
    status_mode: StatusMode,

    serial_echo: bool,
    paddle_echo: bool,
    host_open: bool,
    /// The host set the speed; the speed control is ignored until `0x02 0x00`
    speed_from_host: bool,
    last_reported_speed: Option<u8>,
    reset_requested: bool,
}

impl Default for HostProtocolEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProtocolEngine {
    pub const fn new() -> Self {
        Self {
            phase: Phase::FetchAny,
            command: None,
            params: [0; PARAM_CAPACITY],
            bytes_expected: 0,
            bytes_fetched: 0,
            fifo: RingTextBuffer::new(),
            pending_text: None,
            utf8_prefix: None,
            paused: false,
            last_status: STATUS_TEMPLATE,
            xoff: false,
            break_in_seen: false,
            status_mode: StatusMode::Wk2,
            serial_echo: false,
            paddle_echo: false,
            host_open: false,
            speed_from_host: false,
            last_reported_speed: None,
            reset_requested: false,
        }
    }

    /// Drain host input into the parser or the text buffer, then run at most one command
    pub fn service<H, S>(&mut self, host: &mut H, mut targets: Targets<'_, S>)
    where
        H: HostSerial,
        S: SpeedControl + ?Sized,
    {
        self.flush_pending_text();
        while self.can_read_more() {
            let Some(byte) = host.read_byte() else {
                break;
            };
            self.receive(byte, host);
        }

        if self.phase == Phase::Execute {
            self.execute(host, &mut targets);
            self.phase = Phase::FetchAny;
        }
    }

    /// Reading stops behind a held text byte so text stays in order, except
    /// while paused: then only commands can drain the buffer again.
    fn can_read_more(&self) -> bool {
        self.phase != Phase::Execute && (self.pending_text.is_none() || self.paused)
    }

    fn flush_pending_text(&mut self) {
        if self.fifo.can_accept() {
            if let Some(byte) = self.pending_text.take() {
                self.fifo.push(byte);
            }
        }
    }

    fn store_text<H: HostSerial>(&mut self, byte: u8, host: &mut H) {
        if self.fifo.can_accept() {
            self.fifo.push(byte);
        } else if self.pending_text.is_none() {
            self.pending_text = Some(byte);
        } else {
            // the host ignored XOFF while sending is paused
            #[cfg(feature = "defmt")]
            defmt::debug!("text overflow, dropped {=u8:#x}", byte);
            return;
        }
        if self.serial_echo {
            host.write_byte(byte);
        }
    }

    fn receive<H: HostSerial>(&mut self, byte: u8, host: &mut H) {
        match self.phase {
            Phase::FetchAny => match byte {
                0 => self.phase = Phase::ExpectAdmin,
                0x01..=0x1F => self.start_command(byte),
                _ => self.store_text(byte, host),
            },
            Phase::ExpectAdmin => {
                let code = ADMIN_BASE as u16 + byte as u16;
                if code > MAX_COMMAND as u16 {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("invalid admin command {=u8:#x}", byte);
                    self.phase = Phase::FetchAny;
                } else {
                    self.start_command(code as u8);
                }
            }
            Phase::ExpectParams => {
                let fetched = self.bytes_fetched as usize;
                if fetched < PARAM_CAPACITY {
                    self.params[fetched] = byte;
                }
                self.bytes_fetched = self.bytes_fetched.saturating_add(1);
                if self.bytes_fetched == 1 {
                    if let Some(spec) = self.command {
                        self.bytes_expected += spec.extra_params(byte);
                    }
                }
                self.bytes_expected = self.bytes_expected.saturating_sub(1);
                if self.bytes_expected == 0 {
                    self.phase = Phase::Execute;
                }
            }
            Phase::Execute => {}
        }
    }

    fn start_command(&mut self, code: u8) {
        self.command = commands::lookup(code);
        self.params = [0; PARAM_CAPACITY];
        self.bytes_fetched = 0;
        self.bytes_expected = self.command.map_or(0, |spec| spec.params);
        self.phase = match self.command {
            None => Phase::FetchAny,
            Some(_) if self.bytes_expected > 0 => Phase::ExpectParams,
            Some(_) => Phase::Execute,
        };
    }

    fn execute<H, S>(&mut self, host: &mut H, targets: &mut Targets<'_, S>)
    where
        H: HostSerial,
        S: SpeedControl + ?Sized,
    {
        let Some(spec) = self.command.take() else {
            return;
        };
        let p = self.params;

        match spec.command {
            Command::Sidetone => self.apply_sidetone(p[0], targets.engine),
            Command::Speed => self.apply_speed(p[0], targets),
            Command::Weighting => targets.engine.set_timing_parameters(0, 0, p[0]),
            Command::PttTiming => targets.engine.set_ptt_timing(
                p[0] as u32 * PTT_TIME_UNIT_MS,
                p[1] as u32 * PTT_TIME_UNIT_MS,
            ),
            Command::SpeedRange => targets.speed.set_min_max(p[0], p[0].saturating_add(p[1])),
            Command::Pause => self.paused = p[0] != 0,
            Command::SpeedQuery => host.write_byte(targets.speed.speed_wk2()),
            Command::Backspace => {
                if self.pending_text.take().is_none() {
                    self.fifo.unpush();
                }
            }
            Command::PinConfig => apply_pin_config(p[0], targets.engine),
            Command::ClearBuffer => {
                self.fifo.reset();
                self.pending_text = None;
                self.utf8_prefix = None;
                targets.engine.clear_codes();
            }
            Command::KeyImmediate => {
                targets
                    .engine
                    .force_key(p[0] != 0, targets.now_ms, FORCE_KEYDOWN_TIMEOUT_MS)
            }
            Command::Farnsworth => targets.engine.set_farnsworth_wpm(p[0]),
            Command::ModeRegister => self.apply_mode_register(p[0], targets),
            Command::LoadDefaults => self.load_defaults(&p, targets),
            Command::FirstExtension => targets.engine.set_first_extension(p[0] as u32),
            Command::KeyCompensation => targets.engine.set_qsk_compensation(p[0] as u32),
            Command::StatusRequest => {
                let state = targets.engine.state();
                let mut status = self.status_byte(&state);
                if state.break_in {
                    status |= STATUS_BREAKIN;
                }
                host.write_byte(status);
                self.last_status = status & !STATUS_BREAKIN;
            }
            Command::DitDahRatio => apply_ratio(p[0], targets.engine),
            Command::Echo | Command::PaddleA2d | Command::SpeedA2d | Command::GetCalibration => {
                host.write_byte(p[0])
            }
            Command::Reset => {
                #[cfg(feature = "defmt")]
                defmt::info!("host requested reset");
                self.reset_requested = true;
            }
            Command::HostOpen => {
                #[cfg(feature = "defmt")]
                defmt::info!("host open");
                self.host_open = true;
                self.last_reported_speed = Some(targets.speed.value());
                host.write_byte(PROTOCOL_REVISION);
            }
            Command::HostClose => {
                #[cfg(feature = "defmt")]
                defmt::info!("host close");
                self.host_open = false;
            }
            Command::Wk1Mode => self.status_mode = StatusMode::Wk1,
            Command::Wk2Mode => self.status_mode = StatusMode::Wk2,
            _ => {
                #[cfg(feature = "defmt")]
                defmt::trace!("ignored command {=u8:#x}", spec.code);
            }
        }
    }

    fn apply_sidetone(&mut self, param: u8, engine: &mut KeyingEngine) {
        engine.set_tone_paddle_only(param & 0x80 != 0);
        let divisor = (param & 0x0F) as u16;
        if divisor != 0 {
            engine.set_tone_frequency(SIDETONE_DIVIDEND / divisor);
        }
    }

    fn apply_speed<S: SpeedControl + ?Sized>(&mut self, wpm: u8, targets: &mut Targets<'_, S>) {
        if wpm == 0 {
            self.speed_from_host = false;
            targets.engine.set_timing_parameters(targets.speed.value(), 0, 0);
        } else {
            self.speed_from_host = true;
            targets.engine.set_timing_parameters(wpm, 0, 0);
        }
    }

    fn apply_mode_register<S: SpeedControl + ?Sized>(&mut self, mode: u8, targets: &mut Targets<'_, S>) {
        self.paddle_echo = mode & 0x40 != 0;
        if let Some(keyer_mode) = KeyerMode::from_mode_register(mode) {
            targets.engine.set_mode(keyer_mode);
            targets.paddle.set_mode(keyer_mode);
        }
        targets.paddle.set_swap(mode & 0x08 != 0);
        self.serial_echo = mode & 0x04 != 0;
        targets.engine.set_autospace(mode & 0x02 != 0);
    }

    fn load_defaults<S: SpeedControl + ?Sized>(
        &mut self,
        p: &[u8; PARAM_CAPACITY],
        targets: &mut Targets<'_, S>,
    ) {
        self.apply_mode_register(p[0], targets);
        self.apply_speed(p[1], targets);
        self.apply_sidetone(p[2], targets.engine);
        targets.engine.set_timing_parameters(0, 0, p[3]);
        targets.engine.set_ptt_timing(
            p[4] as u32 * PTT_TIME_UNIT_MS,
            p[5] as u32 * PTT_TIME_UNIT_MS,
        );
        targets.speed.set_min_max(p[6], p[6].saturating_add(p[7]));
        targets.engine.set_first_extension(p[8] as u32);
        targets.engine.set_qsk_compensation(p[9] as u32);
        targets.engine.set_farnsworth_wpm(p[10]);
        // p[11] is the paddle switchpoint
        apply_ratio(p[12], targets.engine);
        apply_pin_config(p[13], targets.engine);
    }

    /// Move text from the ring buffer into the engine's code slots
    pub fn feed(&mut self, engine: &mut KeyingEngine) {
        while !self.paused && engine.can_accept() && self.fifo.has_more() {
            let byte = self.fifo.pop();
            let code = match self.utf8_prefix.take() {
                Some(prefix) => MorseCodec::utf8_to_code(prefix, byte),
                None if MorseCodec::is_utf8_prefix(byte) => {
                    self.utf8_prefix = Some(byte);
                    continue;
                }
                None => MorseCodec::encode(byte),
            };
            engine.accept_code(code);
        }
    }

    /// Status byte for `state` without the break-in flag
    fn status_byte(&self, state: &KeyerState) -> u8 {
        let mut status = STATUS_TEMPLATE;
        if self.xoff {
            status |= STATUS_XOFF;
        }
        if state.source == KeyingSource::Buffer && !state.break_in {
            status |= STATUS_BUSY;
        }
        if self.status_mode == StatusMode::Wk2 && state.force {
            status |= STATUS_KEYDOWN;
        }
        status
    }

    /// Report state changes to the host: break-in, flow control, status, paddle echo and speed
    pub fn report<H, S>(&mut self, host: &mut H, state: &KeyerState, engine: &mut KeyingEngine, speed: &S)
    where
        H: HostSerial,
        S: SpeedControl + ?Sized,
    {
        let free = self.fifo.free();
        if !self.xoff && free <= XOFF_THRESHOLD {
            #[cfg(feature = "defmt")]
            defmt::debug!("xoff, {} bytes free", free);
            self.xoff = true;
        } else if self.xoff && free > XON_THRESHOLD {
            #[cfg(feature = "defmt")]
            defmt::debug!("xon, {} bytes free", free);
            self.xoff = false;
        }

        if state.break_in && !self.break_in_seen {
            self.fifo.reset();
            self.utf8_prefix = None;
            self.xoff = false;
            host.write_byte(STATUS_TEMPLATE | STATUS_BREAKIN);
            host.write_byte(STATUS_TEMPLATE);
            self.last_status = STATUS_TEMPLATE;
        }
        self.break_in_seen = state.break_in;

        let status = self.status_byte(state);
        if status != self.last_status {
            host.write_byte(status);
            self.last_status = status;
        }

        if let Some(code) = engine.take_paddle_code() {
            if self.paddle_echo {
                if let Some(ch) = MorseCodec::decode(code) {
                    host.write_byte(ch);
                }
            }
        }

        if self.host_open {
            let value = speed.value();
            if self.last_reported_speed != Some(value) {
                host.write_byte(speed.speed_wk2());
                self.last_reported_speed = Some(value);
            }
        }
    }

    pub fn take_reset_request(&mut self) -> bool {
        core::mem::replace(&mut self.reset_requested, false)
    }

    pub fn is_host_open(&self) -> bool {
        self.host_open
    }

    pub fn speed_from_host(&self) -> bool {
        self.speed_from_host
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_xoff(&self) -> bool {
        self.xoff
    }

    pub fn status_mode(&self) -> StatusMode {
        self.status_mode
    }

    pub fn serial_echo(&self) -> bool {
        self.serial_echo
    }

    pub fn paddle_echo(&self) -> bool {
        self.paddle_echo
    }

    pub fn text_buffer(&self) -> &RingTextBuffer {
        &self.fifo
    }
}

fn apply_pin_config(config: u8, engine: &mut KeyingEngine) {
    engine.enable_ptt(config & 0x01 != 0);
    engine.enable_tone(config & 0x02 != 0);
    engine.enable_key(config & 0x0C != 0);
}

fn apply_ratio(param: u8, engine: &mut KeyingEngine) {
    // 50 is 3:1
    let ratio = (param as u32 * 300 / 50).min(u16::MAX as u32) as u16;
    engine.set_timing_parameters(0, ratio, 0);
}
