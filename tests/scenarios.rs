use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use triga_simulator_lib::commands::{OperatorCommand, PanelInputs};
use triga_simulator_lib::config::{load_config, InitialRodPositions};
use triga_simulator_lib::intercore::{RodTargets, SharedMemory};
use triga_simulator_lib::physics;
use triga_simulator_lib::reactor::ScramCause;
use triga_simulator_lib::runtime::{EngineLoop, ScheduledCommand};
use triga_simulator_lib::{
    run_simulation, run_simulation_with_operator, ReactorConfig, ReactorEngine, RodKind, RunOptions,
};

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}

fn subcritical_config() -> ReactorConfig {
    ReactorConfig {
        excess_reactivity_pcm: 0.0,
        ..ReactorConfig::default()
    }
}

#[test]
fn one_tick_from_rest_gives_the_expected_reactivity() {
    let config = ReactorConfig::default();
    let rod_worth = config.rod_worth_pcm();
    let mut engine = ReactorEngine::with_config(config).expect("default config is valid");
    engine.automatic_control = false;

    engine.tick();

    let fuel_feedback_20_c = 20.0 * (6.0 + (9.0 - 6.0) * 20.0 / 240.0);
    let expected = 3000.0 - (0.0 + 2_400_000.0 / 4_000_000.0 * rod_worth + 0.0) - fuel_feedback_20_c;
    assert_close(engine.reactivity_pcm(), expected, 1e-6);
    assert_close(engine.reactivity_pcm(), 2075.0, 1e-6);
}

#[test]
fn high_demand_with_withdrawn_rods_never_pushes_target_past_full_insertion() {
    let config = ReactorConfig {
        initial_rod_positions: InitialRodPositions {
            safety: 0,
            regulating: 0,
            compensating: 0,
        },
        target_thermal_power_watts: 1_000_000,
        ..ReactorConfig::default()
    };
    let mut engine = ReactorEngine::with_config(config).expect("valid config");
    assert!(engine.automatic_control);

    let mut previous = engine.regulating_rod().target_position();
    for _ in 0..5000 {
        engine.tick();
        let target = engine.regulating_rod().target_position();
        assert!(target >= previous, "target went from {previous} to {target}");
        assert!(target <= 4_000_000);
        assert!(target >= 2_400_000);
        previous = target;
    }
}

#[test]
fn automatic_control_inserts_the_regulating_rod_when_power_is_too_high() {
    let mut engine = ReactorEngine::with_config(subcritical_config()).expect("valid config");
    engine.set_target_thermal_power_watts(100);
    engine.set_neutron_population(100_000.0 / physics::calc_power_watts(1.0));

    let start = engine.regulating_rod().current_position();
    for _ in 0..50 {
        engine.tick();
        let rod = engine.regulating_rod();
        assert_eq!(rod.target_position(), rod.current_position() + 4000);
    }
    assert!(engine.regulating_rod().current_position() > start);
    assert!(!engine.in_scram());
}

#[test]
fn power_excursion_scrams_and_inserts_every_rod() {
    let mut engine = ReactorEngine::new();
    engine.automatic_control = false;
    // Prompt supercritical with the rods held where they are
    for _ in 0..20_000 {
        engine.tick();
        if engine.in_scram() {
            break;
        }
    }

    assert!(engine.in_scram());
    assert_eq!(engine.last_scram_cause(), Some(ScramCause::PowerLimit));
    for kind in RodKind::ALL {
        assert_eq!(engine.rod(kind).current_position(), 4_000_000);
        assert_eq!(engine.rod(kind).target_position(), 4_000_000);
    }
    assert!(engine.reactivity_pcm() > 0.0);

    // Next tick sees the inserted rods
    engine.tick();
    assert!(engine.reactivity_pcm() < 0.0);
    assert!(engine.water_temperature_celsius() >= 20.0);
}

#[test]
fn manual_targets_flow_through_shared_memory() {
    let mut engine = ReactorEngine::with_config(subcritical_config()).expect("valid config");
    engine.automatic_control = false;

    let shared = Arc::new(SharedMemory::for_engine(&engine));
    let (frames_tx, _frames_rx) = mpsc::channel(8);
    let mut engine_loop = EngineLoop::new(engine, Arc::clone(&shared), frames_tx);

    shared.write_rod_targets(RodTargets([0, 3_000_000, 0]));
    for _ in 0..10 {
        engine_loop.step();
    }

    let engine = engine_loop.engine();
    assert_eq!(engine.regulating_rod().target_position(), 3_000_000);
    // 28_000 units/s at 1e-4 s moves the rod two units per tick; the first
    // tick ran before the targets were adopted
    assert_eq!(engine.regulating_rod().current_position(), 2_400_018);

    let telemetry = shared.read_telemetry();
    assert_eq!(telemetry.rod_current_positions[1], 2_400_018);
    assert!(!telemetry.in_scram);
}

#[test]
fn shipped_config_file_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/triga.json");
    let config = load_config(&path).expect("shipped config should load");
    let defaults = ReactorConfig::default();

    assert_eq!(config.initial_rod_positions, defaults.initial_rod_positions);
    assert_eq!(config.regulating_rod_speed_per_second, 28_000);
    assert_eq!(config.target_thermal_power_watts, 20_001);
    assert_close(config.beta_effective(), defaults.beta_effective(), 1e-12);
    assert_close(config.power_scram_watts, 250_000.0, 1e-9);
    assert_close(config.fuel_feedback_240_c_pcm_per_c, 9.0, 1e-12);
}

#[tokio::test]
async fn short_run_streams_telemetry_to_the_display() {
    let options = RunOptions {
        duration_seconds: 0.05,
        time_speed: 50.0,
        display_period: Duration::from_millis(2),
        trace_sample_every: 100,
        ..RunOptions::default()
    };

    let report = run_simulation(ReactorConfig::default(), options)
        .await
        .expect("simulation should run");

    let steps = report.final_state.steps_elapsed;
    assert!((499..=510).contains(&steps), "ran {steps} steps");
    assert!(report.final_state.time_elapsed_seconds >= 0.05 - 1e-9);

    assert_eq!(report.frames_dropped, 0);
    assert_eq!(report.packets_received, 2 * (steps / 100));
    assert_eq!(report.display.water_temperature_celsius, 20);
    assert_eq!(report.trace.len() as u64, steps / 100);
    assert!(report.display_report.iterations >= 1);
}

#[tokio::test]
async fn manual_run_follows_operator_targets_and_scheduled_commands() {
    let options = RunOptions {
        duration_seconds: 0.2,
        time_speed: 20.0,
        display_period: Duration::from_millis(1),
        panel: PanelInputs {
            automatic_control: false,
            ..PanelInputs::default()
        },
        manual_targets: RodTargets([0, 3_000_000, 0]),
        commands: vec![ScheduledCommand {
            at_seconds: 0.1,
            command: OperatorCommand::SetTargetPower(5_000),
        }],
        ..RunOptions::default()
    };

    let report = run_simulation(subcritical_config(), options)
        .await
        .expect("simulation should run");

    let state = &report.final_state;
    assert!(!state.automatic_control);
    assert!(!state.scram_active);
    assert_eq!(state.target_thermal_power_watts, 5_000);
    assert_eq!(state.rod_target_positions, [0, 3_000_000, 0]);
    assert!(state.rod_current_positions[1] > 2_400_000);
    assert_eq!(report.display_report.shown_targets, RodTargets([0, 3_000_000, 0]));
}

#[tokio::test]
async fn operator_commands_reach_a_running_simulation() {
    let options = RunOptions {
        duration_seconds: 0.02,
        time_speed: 20.0,
        display_period: Duration::from_millis(1),
        ..RunOptions::default()
    };
    let (operator, commands) = mpsc::unbounded_channel();
    operator
        .send(OperatorCommand::SetTargetPower(7_000))
        .expect("receiver is alive");
    operator
        .send(OperatorCommand::SetPanel(PanelInputs {
            automatic_control: false,
            ..PanelInputs::default()
        }))
        .expect("receiver is alive");

    let report = run_simulation_with_operator(subcritical_config(), options, commands)
        .await
        .expect("simulation should run");

    let state = &report.final_state;
    assert_eq!(state.target_thermal_power_watts, 7_000);
    assert!(!state.automatic_control);
    assert!(state.steps_elapsed >= 199);
}

#[tokio::test]
async fn invalid_time_speed_is_rejected() {
    let options = RunOptions {
        time_speed: 0.0,
        ..RunOptions::default()
    };
    assert!(run_simulation(ReactorConfig::default(), options).await.is_err());
}
