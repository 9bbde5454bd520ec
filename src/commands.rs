//! Operator panel: switches, buttons and indicator lamps
//!
//! These are the operator-facing inputs to the engine. The runtime applies
//! them between ticks.

use serde::{Deserialize, Serialize};

use crate::config::constants::REGULATING_ROD_MIN_AUTO_POSITION;
use crate::control_rod::RodPosition;
use crate::error::ReactorError;
use crate::reactor::{ReactorEngine, RodKind};

/// Steps between two toggles of the SCRAM lamp
pub const SCRAM_LAMP_TOGGLE_STEPS: u64 = 5000;

/// Highest Cherenkov glow level, reached at the power scram limit
pub const CHERENKOV_MAX_LEVEL: u16 = 1000;

/// State of the panel switches and the SCRAM button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelInputs {
    pub scram_button: bool,
    pub scrams_enabled: bool,
    pub active_cooling: bool,
    pub automatic_control: bool,
}

impl Default for PanelInputs {
    fn default() -> Self {
        Self {
            scram_button: false,
            scrams_enabled: true,
            active_cooling: true,
            automatic_control: true,
        }
    }
}

/// Requests sent by the operator to the engine context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OperatorCommand {
    Scram,
    SetTargetPower(u32),
    SetTimeStep(f64),
    SetPanel(PanelInputs),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ControlPanel;

impl ControlPanel {
    /// Apply the panel switches to the engine
    pub fn apply(inputs: &PanelInputs, engine: &mut ReactorEngine) {
        if inputs.scram_button && !engine.in_scram() {
            log::info!("SCRAM button pressed");
            engine.scram();
        }

        engine.scrams_enabled = inputs.scrams_enabled;
        engine.active_cooling_enabled = inputs.active_cooling;

        // Manual to automatic: start the balancing from a known rod layout
        if inputs.automatic_control && !engine.automatic_control && !engine.in_scram() {
            log::info!("Switching to automatic control");
            engine
                .rod_mut(RodKind::Safety)
                .set_target_position(RodPosition::FULLY_WITHDRAWN.units());
            engine
                .rod_mut(RodKind::Regulating)
                .set_target_position(REGULATING_ROD_MIN_AUTO_POSITION);
            engine
                .rod_mut(RodKind::Compensating)
                .set_target_position(RodPosition::FULLY_WITHDRAWN.units());
        }
        engine.automatic_control = inputs.automatic_control;
    }

    pub fn execute(command: OperatorCommand, engine: &mut ReactorEngine) -> Result<(), ReactorError> {
        match command {
            OperatorCommand::Scram => {
                engine.scram();
                Ok(())
            }
            OperatorCommand::SetTargetPower(watts) => {
                engine.set_target_thermal_power_watts(watts);
                Ok(())
            }
            OperatorCommand::SetTimeStep(dt) => engine.set_time_delta_seconds(dt),
            OperatorCommand::SetPanel(inputs) => {
                Self::apply(&inputs, engine);
                Ok(())
            }
        }
    }
}

/// Panel lamps and gauges derived from the engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    pub scram_lamp: bool,
    pub cherenkov_level: u16,
    /// Rod positions in 0..=999 for the panel gauges
    pub rod_gauges: [u16; 3],
}

impl Indicators {
    pub fn from_engine(engine: &ReactorEngine) -> Self {
        let scram_lamp = engine.in_scram()
            && (engine.steps_since_scram_started() / SCRAM_LAMP_TOGGLE_STEPS) % 2 == 0;

        let glow = engine.power_watts() / engine.config().power_scram_watts
            * CHERENKOV_MAX_LEVEL as f64;
        let cherenkov_level = glow.clamp(0.0, CHERENKOV_MAX_LEVEL as f64) as u16;

        let rod_gauges = RodKind::ALL
            .map(|kind| RodPosition::new(engine.rod(kind).current_position()).to_display_per_mille());

        Self {
            scram_lamp,
            cherenkov_level,
            rod_gauges,
        }
    }
}
