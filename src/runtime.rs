//! Execution contexts
//!
//! The engine context ticks the reactor against wall-clock time, the display
//! context polls telemetry and supplies operator rod targets, and the serial
//! receiver decodes the telemetry byte stream. They only meet through
//! [`SharedMemory`] and channels.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::commands::{ControlPanel, Indicators, OperatorCommand, PanelInputs};
use crate::config::constants::REGULATING_ROD_MIN_AUTO_POSITION;
use crate::config::ReactorConfig;
use crate::intercore::{RodTargets, SharedMemory, TelemetrySnapshot};
use crate::packets::{telemetry_frame, DisplayState, PacketDecoder, TELEMETRY_PERIOD_STEPS};
use crate::reactor::{ReactorEngine, ReactorState};
use crate::trace::Trace;

/// Upper bound on ticks per engine wake, so a stalled wake cannot stall the
/// runtime for long afterwards
pub const MAX_TICKS_PER_WAKE: usize = 1000;

const FRAME_CHANNEL_CAPACITY: usize = 64;

const MIN_WAKE_PERIOD: Duration = Duration::from_micros(100);

/// Operator command applied once simulated time reaches `at_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub at_seconds: f64,
    pub command: OperatorCommand,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Simulated time to run for [s]
    pub duration_seconds: f64,
    /// Simulated seconds per wall-clock second
    pub time_speed: f64,
    pub engine_period: Duration,
    pub display_period: Duration,
    pub trace_sample_every: u64,
    pub panel: PanelInputs,
    pub commands: Vec<ScheduledCommand>,
    /// Targets the display context writes while in manual mode
    pub manual_targets: RodTargets,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            duration_seconds: 10.0,
            time_speed: 1.0,
            engine_period: Duration::from_millis(1),
            display_period: Duration::from_millis(10),
            trace_sample_every: 500,
            panel: PanelInputs::default(),
            commands: Vec::new(),
            manual_targets: RodTargets([0, REGULATING_ROD_MIN_AUTO_POSITION, 0]),
        }
    }
}

// ============================================================================
// Engine context
// ============================================================================

pub struct EngineLoop {
    engine: ReactorEngine,
    shared: Arc<SharedMemory>,
    frames: mpsc::Sender<Vec<u8>>,
    live_commands: Option<mpsc::UnboundedReceiver<OperatorCommand>>,
    schedule: VecDeque<ScheduledCommand>,
    trace: Trace,
    accumulated_seconds: f64,
    frames_sent: u64,
    frames_dropped: u64,
}

/// What is left of the engine context once it stops
#[derive(Debug)]
pub struct EngineOutcome {
    pub engine: ReactorEngine,
    pub trace: Trace,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

impl EngineLoop {
    pub fn new(
        engine: ReactorEngine,
        shared: Arc<SharedMemory>,
        frames: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            engine,
            shared,
            frames,
            live_commands: None,
            schedule: VecDeque::new(),
            trace: Trace::new(500),
            accumulated_seconds: 0.0,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_schedule(mut self, mut commands: Vec<ScheduledCommand>) -> Self {
        commands.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
        self.schedule = commands.into();
        self
    }

    pub fn with_live_commands(mut self, commands: mpsc::UnboundedReceiver<OperatorCommand>) -> Self {
        self.live_commands = Some(commands);
        self
    }

    pub fn engine(&self) -> &ReactorEngine {
        &self.engine
    }

    /// Accumulate simulated time and run as many whole ticks as fit.
    /// Returns the number of ticks run.
    pub fn advance(&mut self, simulated_seconds: f64) -> usize {
        self.accumulated_seconds += simulated_seconds.max(0.0);

        let dt = self.engine.time_delta_seconds();
        let ticks = (self.accumulated_seconds / dt).floor() as usize;
        self.accumulated_seconds -= ticks as f64 * dt;

        let ticks = ticks.min(MAX_TICKS_PER_WAKE);
        for _ in 0..ticks {
            self.step();
        }
        ticks
    }

    /// One tick followed by the per-step housekeeping
    pub fn step(&mut self) {
        self.engine.tick();
        self.apply_commands();

        self.shared.publish_telemetry(&self.engine);
        self.shared.exchange_rod_targets_engine(&mut self.engine);
        self.trace.observe(&self.engine);

        if self.engine.steps_elapsed() % TELEMETRY_PERIOD_STEPS == 0 {
            self.emit_frame();
        }
    }

    fn apply_commands(&mut self) {
        let now = self.engine.time_elapsed_seconds();
        while self
            .schedule
            .front()
            .is_some_and(|scheduled| scheduled.at_seconds <= now)
        {
            if let Some(scheduled) = self.schedule.pop_front() {
                self.execute(scheduled.command);
            }
        }

        let mut live = Vec::new();
        if let Some(receiver) = self.live_commands.as_mut() {
            while let Ok(command) = receiver.try_recv() {
                live.push(command);
            }
        }
        for command in live {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: OperatorCommand) {
        log::debug!(
            "applying {command:?} at {:.4} s",
            self.engine.time_elapsed_seconds()
        );
        if let Err(err) = ControlPanel::execute(command, &mut self.engine) {
            log::warn!("operator command {command:?} rejected: {err}");
        }
    }

    // The engine never waits on the link; a full channel drops the frame.
    fn emit_frame(&mut self) {
        match self.frames.try_send(telemetry_frame(&self.engine)) {
            Ok(()) => self.frames_sent += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                log::debug!("serial link busy, dropping telemetry frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.frames_dropped += 1,
        }
    }

    /// Tick against wall-clock time until `duration_seconds` of simulated
    /// time have passed
    pub async fn run(mut self, duration_seconds: f64, time_speed: f64, period: Duration) -> EngineOutcome {
        let mut interval = time::interval(period.max(MIN_WAKE_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_wake = Instant::now();

        while self.engine.time_elapsed_seconds() < duration_seconds {
            interval.tick().await;

            let now = Instant::now();
            let wall_seconds = now.duration_since(last_wake).as_secs_f64();
            last_wake = now;

            let remaining = duration_seconds - self.engine.time_elapsed_seconds();
            let ticks = self.advance((wall_seconds * time_speed).min(remaining));
            log::trace!("engine wake ran {ticks} ticks");
        }

        self.finish()
    }

    pub fn finish(self) -> EngineOutcome {
        EngineOutcome {
            engine: self.engine,
            trace: self.trace,
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
        }
    }
}

// ============================================================================
// Display context
// ============================================================================

/// Where manual rod targets come from, e.g. filtered potentiometer readings
pub trait RodTargetSource: Send {
    fn targets(&mut self, telemetry: &TelemetrySnapshot) -> RodTargets;
}

/// Holds the rods at fixed targets
#[derive(Debug, Clone, Copy)]
pub struct FixedTargets(pub RodTargets);

impl RodTargetSource for FixedTargets {
    fn targets(&mut self, _telemetry: &TelemetrySnapshot) -> RodTargets {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisplayReport {
    pub iterations: u64,
    pub last_telemetry: TelemetrySnapshot,
    pub shown_targets: RodTargets,
}

pub struct DisplayLoop<S> {
    shared: Arc<SharedMemory>,
    source: S,
    period: Duration,
    report: DisplayReport,
}

impl<S: RodTargetSource> DisplayLoop<S> {
    pub fn new(shared: Arc<SharedMemory>, source: S, period: Duration) -> Self {
        Self {
            shared,
            source,
            period,
            report: DisplayReport::default(),
        }
    }

    /// One display refresh
    pub fn poll(&mut self) {
        let telemetry = self.shared.read_telemetry();
        let operator_targets = self.source.targets(&telemetry);

        self.report.shown_targets = self.shared.exchange_rod_targets_display(operator_targets);
        self.report.last_telemetry = telemetry;
        self.report.iterations += 1;
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DisplayReport {
        let mut interval = time::interval(self.period.max(MIN_WAKE_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.poll(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.report
    }
}

// ============================================================================
// Serial link
// ============================================================================

#[derive(Debug, Default)]
pub struct SerialReceiver {
    decoder: PacketDecoder,
    display: DisplayState,
    packets: u64,
}

impl SerialReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for packet in self.decoder.decode_all(bytes) {
            self.display.apply(packet);
            self.packets += 1;
        }
    }

    pub fn display(&self) -> DisplayState {
        self.display
    }

    pub fn packets_received(&self) -> u64 {
        self.packets
    }

    /// Decode frames until the sending side hangs up
    pub async fn run(mut self, mut frames: mpsc::Receiver<Vec<u8>>) -> Self {
        while let Some(bytes) = frames.recv().await {
            self.feed(&bytes);
        }
        self
    }
}

// ============================================================================
// Wiring
// ============================================================================

#[derive(Debug)]
pub struct RunReport {
    pub final_state: ReactorState,
    pub indicators: Indicators,
    pub display: DisplayState,
    pub packets_received: u64,
    pub frames_dropped: u64,
    pub display_report: DisplayReport,
    pub trace: Trace,
}

/// Run the engine, display and serial contexts until the simulated duration
/// has elapsed
pub async fn run_simulation(config: ReactorConfig, options: RunOptions) -> Result<RunReport> {
    run(config, options, None).await
}

/// Like [`run_simulation`], with operator commands fed from `commands`
/// while the engine runs. Pending commands are applied after each tick.
pub async fn run_simulation_with_operator(
    config: ReactorConfig,
    options: RunOptions,
    commands: mpsc::UnboundedReceiver<OperatorCommand>,
) -> Result<RunReport> {
    run(config, options, Some(commands)).await
}

async fn run(
    config: ReactorConfig,
    options: RunOptions,
    operator: Option<mpsc::UnboundedReceiver<OperatorCommand>>,
) -> Result<RunReport> {
    anyhow::ensure!(
        options.duration_seconds.is_finite() && options.duration_seconds >= 0.0,
        "simulated duration must be a finite, non-negative number of seconds"
    );
    anyhow::ensure!(
        options.time_speed.is_finite() && options.time_speed > 0.0,
        "time speed must be finite and > 0, got {}",
        options.time_speed
    );

    let mut engine = ReactorEngine::with_config(config).context("invalid reactor configuration")?;
    ControlPanel::apply(&options.panel, &mut engine);

    let shared = Arc::new(SharedMemory::for_engine(&engine));
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    log::info!(
        "Starting simulation: {:.3} s at {}x, dt = {} s",
        options.duration_seconds,
        options.time_speed,
        engine.time_delta_seconds()
    );

    let receiver = tokio::spawn(SerialReceiver::new().run(frames_rx));
    let display = tokio::spawn(
        DisplayLoop::new(
            Arc::clone(&shared),
            FixedTargets(options.manual_targets),
            options.display_period,
        )
        .run(shutdown_rx),
    );

    let mut engine_loop = EngineLoop::new(engine, shared, frames_tx)
        .with_trace(Trace::new(options.trace_sample_every))
        .with_schedule(options.commands);
    if let Some(commands) = operator {
        engine_loop = engine_loop.with_live_commands(commands);
    }
    let outcome = tokio::spawn(engine_loop.run(
        options.duration_seconds,
        options.time_speed,
        options.engine_period,
    ))
    .await
    .context("engine task failed")?;

    // The display may already be gone; nothing to tell it then
    let _ = shutdown_tx.send(true);
    let display_report = display.await.context("display task failed")?;
    let receiver = receiver.await.context("serial receiver task failed")?;

    let final_state = outcome.engine.state();
    log::info!(
        "Simulation finished after {} steps: {:.1} W, fuel {:.1} °C, water {:.2} °C",
        final_state.steps_elapsed,
        final_state.power_watts,
        final_state.fuel_temperature_celsius,
        final_state.water_temperature_celsius
    );

    Ok(RunReport {
        indicators: Indicators::from_engine(&outcome.engine),
        final_state,
        display: receiver.display(),
        packets_received: receiver.packets_received(),
        frames_dropped: outcome.frames_dropped,
        display_report,
        trace: outcome.trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_loop() -> (EngineLoop, mpsc::Receiver<Vec<u8>>) {
        let engine = ReactorEngine::new();
        let shared = Arc::new(SharedMemory::for_engine(&engine));
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        (EngineLoop::new(engine, shared, tx), rx)
    }

    #[test]
    fn advance_runs_whole_ticks_and_keeps_the_remainder() {
        let (mut engine_loop, _rx) = engine_loop();

        assert_eq!(engine_loop.advance(2.5e-4), 2);
        assert_eq!(engine_loop.advance(0.6e-4), 1);
        assert_eq!(engine_loop.engine().steps_elapsed(), 3);
    }

    #[test]
    fn advance_is_capped_per_wake() {
        let (mut engine_loop, _rx) = engine_loop();
        assert_eq!(engine_loop.advance(5.0), MAX_TICKS_PER_WAKE);
        assert_eq!(engine_loop.engine().steps_elapsed(), 1000);
    }

    #[test]
    fn frames_are_emitted_every_hundred_steps() {
        let (mut engine_loop, mut rx) = engine_loop();
        for _ in 0..350 {
            engine_loop.step();
        }

        let mut frames = 0;
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame.len(), 9);
            frames += 1;
        }
        assert_eq!(frames, 3);
    }

    #[test]
    fn scheduled_commands_fire_in_time_order() {
        let (engine_loop, _rx) = engine_loop();
        let mut engine_loop = engine_loop.with_schedule(vec![
            ScheduledCommand {
                at_seconds: 0.00195,
                command: OperatorCommand::Scram,
            },
            ScheduledCommand {
                at_seconds: 0.00095,
                command: OperatorCommand::SetTargetPower(1234),
            },
        ]);

        for _ in 0..10 {
            engine_loop.step();
        }
        assert_eq!(engine_loop.engine().target_thermal_power_watts(), 1234);
        assert_eq!(engine_loop.engine().last_scram_cause(), None);

        for _ in 0..15 {
            engine_loop.step();
        }
        assert_eq!(
            engine_loop.engine().last_scram_cause(),
            Some(crate::reactor::ScramCause::Manual)
        );
    }

    #[test]
    fn live_commands_are_applied_after_a_tick() {
        let (engine_loop, _rx) = engine_loop();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine_loop = engine_loop.with_live_commands(rx);

        tx.send(OperatorCommand::SetTimeStep(-1.0)).expect("send");
        tx.send(OperatorCommand::SetTimeStep(2e-4)).expect("send");
        engine_loop.step();
        assert_eq!(engine_loop.engine().time_delta_seconds(), 2e-4);
    }

    #[test]
    fn display_poll_writes_manual_targets() {
        let mut engine = ReactorEngine::new();
        engine.automatic_control = false;
        let shared = Arc::new(SharedMemory::for_engine(&engine));
        let targets = RodTargets([0, 3_000_000, 0]);

        let mut display = DisplayLoop::new(Arc::clone(&shared), FixedTargets(targets), Duration::from_millis(5));
        display.poll();
        assert_eq!(shared.read_rod_targets(), targets);

        shared.exchange_rod_targets_engine(&mut engine);
        assert_eq!(engine.regulating_rod().target_position(), 3_000_000);
    }

    #[test]
    fn serial_receiver_tracks_the_latest_frame() {
        let mut receiver = SerialReceiver::new();
        let mut engine = ReactorEngine::new();
        engine.set_neutron_population(1e11);

        receiver.feed(&[0xAA]);
        receiver.feed(&telemetry_frame(&engine));
        assert_eq!(receiver.packets_received(), 2);
        assert_eq!(receiver.display().power_watts, engine.power_watts() as u32);
        assert_eq!(receiver.display().water_temperature_celsius, 20);
    }

    #[tokio::test]
    async fn display_loop_stops_on_shutdown() {
        let shared = Arc::new(SharedMemory::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let display = tokio::spawn(
            DisplayLoop::new(shared, FixedTargets(RodTargets::default()), Duration::from_millis(1))
                .run(shutdown_rx),
        );

        time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).expect("display is listening");
        let report = display.await.expect("display task");
        assert!(report.iterations >= 1);
    }
}
