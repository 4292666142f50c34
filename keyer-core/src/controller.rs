//! Keyer context: owns every component and runs the service tick

use crate::hal::{Clock, HostSerial, KeyerOutputs, PaddleContacts};
use crate::keying::{KeyingEngine, OutputLines};
use crate::paddle::PaddleSampler;
use crate::protocol::{HostProtocolEngine, Targets};
use crate::speed::SpeedControl;
use crate::types::{KeyerConfig, KeyerState};

/// Interval between ticks when the controller runs as a task
pub const TICK_INTERVAL_MS: u64 = 1;

/// One keyer instance with its hardware boundary.
///
/// All mutable state is touched only from [`tick`](Self::tick), so no
/// locking is needed between the components.
pub struct KeyerController<C, P, O, H, S> {
    config: KeyerConfig,
    engine: KeyingEngine,
    sampler: PaddleSampler,
    protocol: HostProtocolEngine,
    clock: C,
    paddles: P,
    outputs: O,
    host: H,
    speed: S,
    applied: Option<OutputLines>,
}

impl<C, P, O, H, S> KeyerController<C, P, O, H, S>
where
    C: Clock,
    P: PaddleContacts,
    O: KeyerOutputs,
    H: HostSerial,
    S: SpeedControl,
{
    pub fn new(config: KeyerConfig, clock: C, paddles: P, outputs: O, host: H, speed: S) -> Self {
        let mut controller = Self {
            config,
            engine: KeyingEngine::new(&config),
            sampler: PaddleSampler::new(config.mode),
            protocol: HostProtocolEngine::new(),
            clock,
            paddles,
            outputs,
            host,
            speed,
            applied: None,
        };
        controller.apply_config();
        controller
    }

    fn apply_config(&mut self) {
        self.sampler.set_swap(self.config.swap_paddles);
        self.speed.set_min_max(self.config.speed_min, self.config.speed_max);
    }

    /// Run one service tick and return the keyer state it produced
    pub fn tick(&mut self) -> KeyerState {
        let now = self.clock.now_ms();

        if self.speed.update(now) && !self.protocol.speed_from_host() {
            self.engine.set_timing_parameters(self.speed.value(), 0, 0);
        }

        self.protocol.service(
            &mut self.host,
            Targets {
                engine: &mut self.engine,
                paddle: &mut self.sampler,
                speed: &mut self.speed,
                now_ms: now,
            },
        );
        if self.protocol.take_reset_request() {
            self.reset();
            return self.engine.state();
        }
        self.protocol.feed(&mut self.engine);

        self.sampler.check(&mut self.paddles);
        let state = self.engine.service(now, self.sampler.status_mut());

        self.protocol
            .report(&mut self.host, &state, &mut self.engine, &self.speed);
        self.apply_outputs();
        state
    }

    fn apply_outputs(&mut self) {
        let lines = self.engine.lines();
        let previous = self.applied;
        if previous == Some(lines) {
            return;
        }

        // output errors are not fatal; the next change retries
        if previous.map(|p| p.key) != Some(lines.key) {
            self.outputs.set_key(lines.key).ok();
        }
        if previous.map(|p| p.ptt) != Some(lines.ptt) {
            self.outputs.set_ptt(lines.ptt).ok();
        }
        if previous.map(|p| p.tone_hz) != Some(lines.tone_hz) {
            self.outputs.set_tone(lines.tone_hz).ok();
        }
        self.applied = Some(lines);
    }

    /// Rebuild engine, sampler and host session from the power-up configuration
    pub fn reset(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("keyer reset");

        self.engine = KeyingEngine::new(&self.config);
        self.sampler = PaddleSampler::new(self.config.mode);
        self.protocol = HostProtocolEngine::new();
        self.apply_config();
        self.applied = None;
        self.apply_outputs();
    }

    pub fn config(&self) -> &KeyerConfig {
        &self.config
    }

    pub fn engine(&self) -> &KeyingEngine {
        &self.engine
    }

    pub fn sampler(&self) -> &PaddleSampler {
        &self.sampler
    }

    pub fn protocol(&self) -> &HostProtocolEngine {
        &self.protocol
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn paddles(&self) -> &P {
        &self.paddles
    }

    pub fn paddles_mut(&mut self) -> &mut P {
        &mut self.paddles
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn speed(&self) -> &S {
        &self.speed
    }
}

/// Async task running the tick every millisecond
#[cfg(feature = "embassy-time")]
pub async fn keyer_task<C, P, O, H, S>(mut controller: KeyerController<C, P, O, H, S>) -> !
where
    C: Clock,
    P: PaddleContacts,
    O: KeyerOutputs,
    H: HostSerial,
    S: SpeedControl,
{
    use embassy_time::{Duration, Timer};

    loop {
        let _state = controller.tick();

        #[cfg(feature = "defmt")]
        defmt::trace!("keyer state: {:?}", _state);

        Timer::after(Duration::from_millis(TICK_INTERVAL_MS)).await;
    }
}
