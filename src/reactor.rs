//! TRIGA Reactor Simulation Engine
//!
//! This module contains the reactor state and the per-step simulation logic:
//! point kinetics, fuel and pool thermal model, reactivity, automatic rod
//! balancing and the SCRAM trip state machine.
//!
//! The engine is single threaded and deterministic. Sharing with other
//! execution contexts goes through [`crate::intercore::SharedMemory`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::constants::{
    BALANCE_STEP_POSITION, REGULATING_ROD_MIN_AUTO_POSITION, SCRAM_RECOVERY_POWER_WATTS,
    WATER_HEAT_CAPACITY_J_PER_K, WATER_TEMPERATURE_FLOOR_CELSIUS,
};
use crate::config::ReactorConfig;
use crate::control_rod::{ControlRod, RodPosition};
use crate::error::ReactorError;
use crate::kinetics::{self, DelayedNeutronGroups, PrecursorGroup, NUM_DELAYED_GROUPS};
use crate::physics::{self, FuelFeedback};

/// The three rods of the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RodKind {
    Safety,
    Regulating,
    /// Also called the shim rod
    Compensating,
}

impl RodKind {
    pub const ALL: [RodKind; 3] = [RodKind::Safety, RodKind::Regulating, RodKind::Compensating];

    pub fn index(self) -> usize {
        match self {
            RodKind::Safety => 0,
            RodKind::Regulating => 1,
            RodKind::Compensating => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RodKind::Safety => "safety",
            RodKind::Regulating => "regulating",
            RodKind::Compensating => "compensating",
        }
    }
}

/// Why a SCRAM was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScramCause {
    Manual,
    PowerLimit,
    WaterTemperatureLimit,
    FuelTemperatureLimit,
}

/// Serializable snapshot of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactorState {
    // Time
    pub time_elapsed_seconds: f64,
    pub time_delta_seconds: f64,
    pub steps_elapsed: u64,

    // Power and neutronics
    pub power_watts: f64,
    pub flux: f64,
    pub neutron_population: f64,
    pub precursor_populations: [f64; NUM_DELAYED_GROUPS],
    pub reactivity_pcm: f64,
    pub reactivity: f64,
    pub k_eff: f64,

    // Temperatures
    pub fuel_temperature_celsius: f64,
    pub water_temperature_celsius: f64,

    // Rods, indexed by RodKind
    pub rod_current_positions: [u32; 3],
    pub rod_target_positions: [u32; 3],

    // Control
    pub scram_active: bool,
    pub step_scram_started: u64,
    pub last_scram_cause: Option<ScramCause>,
    pub target_thermal_power_watts: u32,
    pub automatic_control: bool,
    pub active_cooling_enabled: bool,
    pub scrams_enabled: bool,
}

/// Reactor simulation engine
#[derive(Debug, Clone)]
pub struct ReactorEngine {
    config: ReactorConfig,
    feedback: FuelFeedback,

    time_delta_seconds: f64,
    time_elapsed_seconds: f64,
    steps_elapsed: u64,

    in_scram: bool,
    step_scram_started: u64,
    last_scram_cause: Option<ScramCause>,

    water_temperature_celsius: f64,
    fuel_temperature_celsius: f64,

    reactivity_pcm: f64,
    neutron_population: f64,
    precursors: DelayedNeutronGroups,

    rods: [ControlRod; 3],

    /// Setpoint the automatic control tries to hold
    target_thermal_power_watts: u32,

    /// Whether the active cooling loop removes heat from the pool
    pub active_cooling_enabled: bool,
    /// Whether the regulating rod is balanced automatically
    pub automatic_control: bool,
    /// Whether the trip limits are checked
    pub scrams_enabled: bool,
}

impl Default for ReactorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactorEngine {
    pub fn new() -> Self {
        Self::build(ReactorConfig::default())
    }

    /// Engine with custom tunables. The configuration is validated first.
    pub fn with_config(config: ReactorConfig) -> Result<Self, ReactorError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ReactorConfig) -> Self {
        let rod_worth = config.rod_worth_pcm();
        let initial = config.initial_rod_positions;
        let rods = [
            ControlRod::new(initial.safety, config.safety_rod_speed_per_second, rod_worth),
            ControlRod::new(
                initial.regulating,
                config.regulating_rod_speed_per_second,
                rod_worth,
            ),
            ControlRod::new(
                initial.compensating,
                config.compensating_rod_speed_per_second,
                rod_worth,
            ),
        ];

        let mut engine = Self {
            feedback: FuelFeedback {
                coefficient_0_c: config.fuel_feedback_0_c_pcm_per_c,
                coefficient_240_c: config.fuel_feedback_240_c_pcm_per_c,
                slope_after_peak: config.fuel_feedback_slope_after_peak,
            },
            time_delta_seconds: config.time_delta_seconds,
            time_elapsed_seconds: 0.0,
            steps_elapsed: 0,
            in_scram: false,
            step_scram_started: 0,
            last_scram_cause: None,
            water_temperature_celsius: WATER_TEMPERATURE_FLOOR_CELSIUS,
            fuel_temperature_celsius: WATER_TEMPERATURE_FLOOR_CELSIUS,
            reactivity_pcm: 0.0,
            neutron_population: 0.0,
            precursors: DelayedNeutronGroups::new(&config.delayed_groups),
            rods,
            target_thermal_power_watts: config.target_thermal_power_watts,
            active_cooling_enabled: true,
            automatic_control: true,
            scrams_enabled: true,
            config,
        };
        engine.reactivity_pcm = engine.calculate_reactivity_pcm();
        engine
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Rods
    // ------------------------------------------------------------------

    pub fn rod(&self, kind: RodKind) -> &ControlRod {
        &self.rods[kind.index()]
    }

    pub fn rod_mut(&mut self, kind: RodKind) -> &mut ControlRod {
        &mut self.rods[kind.index()]
    }

    pub fn safety_rod(&self) -> &ControlRod {
        self.rod(RodKind::Safety)
    }

    pub fn regulating_rod(&self) -> &ControlRod {
        self.rod(RodKind::Regulating)
    }

    pub fn compensating_rod(&self) -> &ControlRod {
        self.rod(RodKind::Compensating)
    }

    /// Same rod as [`Self::compensating_rod`]
    pub fn shim_rod(&self) -> &ControlRod {
        self.compensating_rod()
    }

    pub fn rods(&self) -> &[ControlRod; 3] {
        &self.rods
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    pub fn time_delta_seconds(&self) -> f64 {
        self.time_delta_seconds
    }

    /// Change the integration step. Non-positive or non-finite steps are
    /// rejected and the previous step is kept.
    pub fn set_time_delta_seconds(&mut self, dt: f64) -> Result<(), ReactorError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ReactorError::InvalidTimeStep(dt));
        }
        self.time_delta_seconds = dt;
        Ok(())
    }

    pub fn time_elapsed_seconds(&self) -> f64 {
        self.time_elapsed_seconds
    }

    pub fn steps_elapsed(&self) -> u64 {
        self.steps_elapsed
    }

    // ------------------------------------------------------------------
    // State accessors
    // ------------------------------------------------------------------

    pub fn fuel_temperature_celsius(&self) -> f64 {
        self.fuel_temperature_celsius
    }

    pub fn water_temperature_celsius(&self) -> f64 {
        self.water_temperature_celsius
    }

    pub fn reactivity_pcm(&self) -> f64 {
        self.reactivity_pcm
    }

    /// Reactivity as Δk/k
    pub fn reactivity(&self) -> f64 {
        self.reactivity_pcm * 1e-5
    }

    pub fn k_effective(&self) -> f64 {
        physics::calc_k_effective(self.reactivity())
    }

    pub fn neutron_population(&self) -> f64 {
        self.neutron_population
    }

    /// Override the neutron population, e.g. to start from a known power
    /// level. Negative values are floored at zero.
    pub fn set_neutron_population(&mut self, population: f64) {
        self.neutron_population = population.max(0.0);
    }

    pub fn precursor_groups(&self) -> &[PrecursorGroup; NUM_DELAYED_GROUPS] {
        self.precursors.groups()
    }

    pub fn target_thermal_power_watts(&self) -> u32 {
        self.target_thermal_power_watts
    }

    pub fn set_target_thermal_power_watts(&mut self, target: u32) {
        self.target_thermal_power_watts = target;
    }

    pub fn in_scram(&self) -> bool {
        self.in_scram
    }

    pub fn step_scram_started(&self) -> u64 {
        self.step_scram_started
    }

    pub fn last_scram_cause(&self) -> Option<ScramCause> {
        self.last_scram_cause
    }

    pub fn steps_since_scram_started(&self) -> u64 {
        self.steps_elapsed.saturating_sub(self.step_scram_started)
    }

    // ------------------------------------------------------------------
    // Derived quantities
    // ------------------------------------------------------------------

    pub fn power_watts(&self) -> f64 {
        physics::calc_power_watts(self.neutron_population)
    }

    pub fn power_mev_per_second(&self) -> f64 {
        physics::calc_power_mev_per_second(self.neutron_population)
    }

    pub fn flux(&self) -> f64 {
        physics::calc_flux(self.neutron_population)
    }

    pub fn power_per_element_watts(&self) -> f64 {
        physics::calc_power_per_element(self.power_watts())
    }

    pub fn stationary_fuel_temperature_celsius(&self) -> f64 {
        physics::calc_stationary_fuel_temperature(
            self.power_watts(),
            self.water_temperature_celsius,
        )
    }

    pub fn fuel_temperature_feedback_pcm(&self) -> f64 {
        self.feedback.feedback_pcm(self.fuel_temperature_celsius)
    }

    /// Excess reactivity minus rod worths minus fuel temperature feedback
    pub fn calculate_reactivity_pcm(&self) -> f64 {
        let rod_worths_pcm: f64 = self.rods.iter().map(ControlRod::worth_pcm).sum();
        let cold_core_reactivity_pcm = self.config.excess_reactivity_pcm - rod_worths_pcm;

        cold_core_reactivity_pcm - self.fuel_temperature_feedback_pcm()
    }

    /// Fuel temperature change over one step, from the current power
    pub fn fuel_temperature_change_celsius(&self) -> f64 {
        let dt = self.time_delta_seconds;
        let heat_capacity = physics::calc_fuel_heat_capacity_j_per_k(self.fuel_temperature_celsius);

        let generated_j = self.power_watts() * dt;
        let exchanged_j = physics::calc_power_exchanged_watts(
            self.fuel_temperature_celsius,
            self.water_temperature_celsius,
        ) * dt;

        (generated_j - exchanged_j) / heat_capacity
    }

    /// Pool temperature change over one step, from the current power
    pub fn water_temperature_change_celsius(&self) -> f64 {
        let dt = self.time_delta_seconds;

        let generated_j = self.power_watts() * dt;
        let to_air_j = physics::calc_water_to_air_convection_watts(self.water_temperature_celsius) * dt;
        let to_concrete_j = physics::calc_water_to_concrete_watts(self.water_temperature_celsius) * dt;
        let active_cooling_j = if self.active_cooling_enabled {
            self.config.active_cooling_power_watts * dt
        } else {
            0.0
        };

        (generated_j - to_air_j - to_concrete_j - active_cooling_j) / WATER_HEAT_CAPACITY_J_PER_K
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    /// Advance the simulation by one time step
    pub fn tick(&mut self) {
        let dt = self.time_delta_seconds;

        // 1. Fuel heats up from the previous step's power
        self.fuel_temperature_celsius += self.fuel_temperature_change_celsius();

        // 2. Rods travel towards their targets
        for rod in &mut self.rods {
            rod.move_towards_target(dt);
        }

        // 3. Regulating rod chases the power setpoint
        if !self.in_scram && self.automatic_control {
            self.balance_control_rods();
        }

        // 4.
        self.reactivity_pcm = self.calculate_reactivity_pcm();

        // 5. Point kinetics, explicit Euler
        let lifetime = self.config.prompt_neutron_lifetime_seconds;
        let dn_dt = kinetics::neutron_rate(
            self.neutron_population,
            self.reactivity(),
            lifetime,
            &self.precursors,
            self.config.neutron_source_per_second,
        );
        self.neutron_population = (self.neutron_population + dn_dt * dt).max(0.0);
        self.precursors.step(self.neutron_population, lifetime, dt);

        // 6. Pool water, never below the initial fill temperature
        self.water_temperature_celsius = (self.water_temperature_celsius
            + self.water_temperature_change_celsius())
        .max(WATER_TEMPERATURE_FLOOR_CELSIUS);

        // 7.
        self.evaluate_scram_conditions();

        self.time_elapsed_seconds += dt;
        self.steps_elapsed += 1;
    }

    fn evaluate_scram_conditions(&mut self) {
        // Toggling the enable-scrams switch off allows a quick restart
        if self.in_scram
            && (self.power_watts() <= SCRAM_RECOVERY_POWER_WATTS || !self.scrams_enabled)
        {
            self.clear_scram();
        }

        if self.scrams_enabled {
            if let Some(cause) = self.trip_condition() {
                self.trip(cause);
            }
        }
    }

    /// First violated safety limit, if any
    pub fn trip_condition(&self) -> Option<ScramCause> {
        if self.power_watts() >= self.config.power_scram_watts {
            Some(ScramCause::PowerLimit)
        } else if self.water_temperature_celsius >= self.config.water_temperature_scram_celsius {
            Some(ScramCause::WaterTemperatureLimit)
        } else if self.fuel_temperature_celsius >= self.config.fuel_temperature_scram_celsius {
            Some(ScramCause::FuelTemperatureLimit)
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Reactor control system
    // ------------------------------------------------------------------

    /// Step the regulating rod towards the power setpoint.
    ///
    /// Safety and compensating rods are commanded out first; the regulating
    /// rod is only adjusted once both have fully withdrawn.
    pub fn balance_control_rods(&mut self) {
        self.rod_mut(RodKind::Safety)
            .set_target_position(RodPosition::FULLY_WITHDRAWN.units());
        self.rod_mut(RodKind::Compensating)
            .set_target_position(RodPosition::FULLY_WITHDRAWN.units());

        let safety_out = self.safety_rod().current_position() == 0;
        let compensating_out = self.compensating_rod().current_position() == 0;
        if !safety_out || !compensating_out {
            return;
        }

        let thermal_power_watts = self.power_watts() as u32;
        let delta = match thermal_power_watts.cmp(&self.target_thermal_power_watts) {
            Ordering::Greater => BALANCE_STEP_POSITION,
            Ordering::Less => -BALANCE_STEP_POSITION,
            Ordering::Equal => 0,
        };

        let rod = self.rod_mut(RodKind::Regulating);
        let new_target = (rod.current_position() as i64 + delta).clamp(
            REGULATING_ROD_MIN_AUTO_POSITION as i64,
            RodPosition::FULLY_INSERTED.units() as i64,
        );
        rod.set_target_position(new_target as u32);
    }

    /// Initiate an emergency shutdown
    pub fn scram(&mut self) {
        self.trip(ScramCause::Manual);
    }

    fn trip(&mut self, cause: ScramCause) {
        if self.in_scram {
            log::trace!("SCRAM re-triggered by {cause:?} at step {}", self.steps_elapsed);
        } else {
            log::warn!(
                "SCRAM initiated by {cause:?} at step {} (power {:.0} W, fuel {:.1} °C, water {:.1} °C)",
                self.steps_elapsed,
                self.power_watts(),
                self.fuel_temperature_celsius,
                self.water_temperature_celsius,
            );
        }

        self.in_scram = true;
        self.step_scram_started = self.steps_elapsed;
        self.last_scram_cause = Some(cause);

        for rod in &mut self.rods {
            rod.insert_fully();
        }
    }

    fn clear_scram(&mut self) {
        log::info!(
            "SCRAM cleared at step {} after {} steps (power {:.3} W)",
            self.steps_elapsed,
            self.steps_since_scram_started(),
            self.power_watts(),
        );

        self.in_scram = false;
        self.step_scram_started = 0;

        if self.automatic_control {
            self.rod_mut(RodKind::Safety)
                .set_target_position(RodPosition::FULLY_WITHDRAWN.units());
            self.rod_mut(RodKind::Compensating)
                .set_target_position(RodPosition::FULLY_WITHDRAWN.units());
        }
    }

    /// Get current state snapshot
    pub fn state(&self) -> ReactorState {
        ReactorState {
            time_elapsed_seconds: self.time_elapsed_seconds,
            time_delta_seconds: self.time_delta_seconds,
            steps_elapsed: self.steps_elapsed,
            power_watts: self.power_watts(),
            flux: self.flux(),
            neutron_population: self.neutron_population,
            precursor_populations: self.precursors.populations(),
            reactivity_pcm: self.reactivity_pcm,
            reactivity: self.reactivity(),
            k_eff: self.k_effective(),
            fuel_temperature_celsius: self.fuel_temperature_celsius,
            water_temperature_celsius: self.water_temperature_celsius,
            rod_current_positions: self.rods.each_ref().map(ControlRod::current_position),
            rod_target_positions: self.rods.each_ref().map(ControlRod::target_position),
            scram_active: self.in_scram,
            step_scram_started: self.step_scram_started,
            last_scram_cause: self.last_scram_cause,
            target_thermal_power_watts: self.target_thermal_power_watts,
            automatic_control: self.automatic_control,
            active_cooling_enabled: self.active_cooling_enabled,
            scrams_enabled: self.scrams_enabled,
        }
    }
}
