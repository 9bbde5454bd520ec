//! Reactor configuration
//!
//! Tunable operating parameters live in [`ReactorConfig`] and can be loaded
//! from JSON. Geometry and material data that define the physical model are
//! fixed in [`constants`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ReactorError;

/// Physical constants for the TRIGA core model
pub mod constants {
    /// Default prompt neutron lifetime Λ [s]
    pub const PROMPT_NEUTRON_LIFETIME_SECONDS: f64 = 39e-6;

    /// Reactivity with every control poison removed [pcm]
    pub const EXCESS_REACTIVITY_PCM: f64 = 3000.0;

    /// Combined worth of all three rods at full insertion [pcm]
    pub const CONTROL_ROD_WORTH_PCM: f64 = 4000.0;

    pub const NEUTRON_SOURCE_NEUTRONS_PER_SECOND: f64 = 1e5;

    /// (β_i, λ_i [1/s]) for the six delayed neutron groups
    pub const DELAYED_NEUTRON_GROUPS: [(f64, f64); 6] = [
        (0.00023097, 0.01240),
        (0.00153278, 0.03041),
        (0.00137180, 0.11150),
        (0.00276451, 0.30100),
        (0.00080489, 0.13800),
        (0.00029396, 3.01000),
    ];

    // Scram limits
    pub const POWER_SCRAM_WATTS: f64 = 250_000.0;
    pub const FUEL_TEMPERATURE_SCRAM_CELSIUS: f64 = 300.0;
    pub const WATER_TEMPERATURE_SCRAM_CELSIUS: f64 = 80.0;

    /// A scram clears once thermal power has decayed to this level [W]
    pub const SCRAM_RECOVERY_POWER_WATTS: f64 = 1.0;

    pub const ACTIVE_COOLING_POWER_WATTS: f64 = 240_000.0;

    // Fuel temperature reactivity feedback
    pub const FUEL_FEEDBACK_COEFFICIENT_0_C_PCM_PER_C: f64 = 6.0;
    pub const FUEL_FEEDBACK_COEFFICIENT_240_C_PCM_PER_C: f64 = 9.0;
    pub const FUEL_FEEDBACK_SLOPE_AFTER_PEAK_PCM_PER_C_SQUARED: f64 = -0.004;
    pub const FUEL_FEEDBACK_PEAK_CELSIUS: f64 = 240.0;

    // Rod speeds in position units per second (15, 7 and 20 per mille of travel)
    pub const SAFETY_ROD_SPEED_PER_SECOND: u32 = 15 * 4000;
    pub const REGULATING_ROD_SPEED_PER_SECOND: u32 = 7 * 4000;
    pub const COMPENSATING_ROD_SPEED_PER_SECOND: u32 = 20 * 4000;

    // Automatic rod balancing
    pub const BALANCE_STEP_POSITION: i64 = 4000;
    pub const REGULATING_ROD_MIN_AUTO_POSITION: u32 = 2_400_000;

    // Core geometry
    pub const CORE_VOLUME_LITERS: f64 = 25.43;
    pub const FUEL_ELEMENTS_IN_CORE: f64 = 59.0;
    pub const FUEL_ELEMENT_OUTER_RADIUS_CM: f64 = 3.556;
    pub const FUEL_ELEMENT_INNER_RADIUS_CM: f64 = 0.635;
    pub const FUEL_ELEMENT_LENGTH_CM: f64 = 38.1;
    pub const ONE_FUEL_ELEMENT_VOLUME_CM3: f64 = ((0.5 * FUEL_ELEMENT_OUTER_RADIUS_CM)
        * (0.5 * FUEL_ELEMENT_OUTER_RADIUS_CM)
        - (0.5 * FUEL_ELEMENT_INNER_RADIUS_CM) * (0.5 * FUEL_ELEMENT_INNER_RADIUS_CM))
        * FUEL_ELEMENT_LENGTH_CM
        * 3.1415926535;
    pub const FUEL_DENSITY_KG_PER_CM3: f64 = 0.0614;
    pub const FUEL_MASS_KG: f64 =
        FUEL_DENSITY_KG_PER_CM3 * ONE_FUEL_ELEMENT_VOLUME_CM3 * FUEL_ELEMENTS_IN_CORE;

    // Fuel heat capacity Cp(T) = 333 + 0.678 (T + 0.15) [J/kgK]
    pub const FUEL_CP_BASE_J_PER_KG_K: f64 = 333.0;
    pub const FUEL_CP_SLOPE_J_PER_KG_K2: f64 = 0.678;

    // Stationary fuel temperature polynomial (TRIGLAV)
    pub const TEMPERATURE_FE_STAT_A0: f64 = 67.18e-03;
    pub const TEMPERATURE_FE_STAT_A1: f64 = -8.381e-06;
    pub const TEMPERATURE_FE_STAT_A2: f64 = 0.3843e-09;

    // Pool water
    pub const WATER_VOLUME_CUBIC_METERS: f64 = 20.0;
    pub const WATER_DENSITY_KG_PER_M3: f64 = 998.2;
    pub const WATER_SPECIFIC_HEAT_CAPACITY_J_PER_KG_K: f64 = 4185.0;
    pub const WATER_HEAT_CAPACITY_J_PER_K: f64 = WATER_VOLUME_CUBIC_METERS
        * WATER_DENSITY_KG_PER_M3
        * WATER_SPECIFIC_HEAT_CAPACITY_J_PER_KG_K;
    pub const WATER_TEMPERATURE_FLOOR_CELSIUS: f64 = 20.0;

    // Heat sinks held at a fixed temperature
    pub const AIR_TEMPERATURE_CELSIUS: f64 = 20.0;
    pub const CONCRETE_TEMPERATURE_CELSIUS: f64 = 20.0;
    pub const AIR_CONVECTION_COEFFICIENT: f64 = 13.6;
    pub const CONCRETE_EXCHANGE_W_PER_K: f64 = 250.0;

    // Neutron to power conversion
    pub const NEUTRON_VELOCITY_METERS_PER_SECOND: f64 = 2200.0;
    pub const MACROSCOPIC_FISSION_CROSS_SECTION_PER_METER: f64 = 0.56;
    pub const FISSION_ENERGY_RELEASED_MEV: f64 = 200.0;
    pub const MEV_TO_JOULE: f64 = 1.6022e-13;

    pub const DEFAULT_TIME_DELTA_SECONDS: f64 = 1e-4;
    pub const DEFAULT_TARGET_THERMAL_POWER_WATTS: u32 = 20_001;
}

/// One delayed neutron precursor group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayedGroupConfig {
    pub fraction: f64,
    /// Decay constant λ [1/s]
    pub decay_constant: f64,
}

/// Initial insertion of the three rods, in position units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialRodPositions {
    pub safety: u32,
    pub regulating: u32,
    pub compensating: u32,
}

impl Default for InitialRodPositions {
    fn default() -> Self {
        Self {
            safety: 0,
            regulating: constants::REGULATING_ROD_MIN_AUTO_POSITION,
            compensating: 0,
        }
    }
}

/// Operating parameters of the simulated core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorConfig {
    pub time_delta_seconds: f64,
    pub prompt_neutron_lifetime_seconds: f64,
    pub excess_reactivity_pcm: f64,
    /// Aggregate worth of the three rods, shared evenly between them
    pub control_rod_worth_pcm: f64,
    pub neutron_source_per_second: f64,
    pub delayed_groups: [DelayedGroupConfig; 6],

    pub power_scram_watts: f64,
    pub fuel_temperature_scram_celsius: f64,
    pub water_temperature_scram_celsius: f64,

    pub safety_rod_speed_per_second: u32,
    pub regulating_rod_speed_per_second: u32,
    pub compensating_rod_speed_per_second: u32,
    pub initial_rod_positions: InitialRodPositions,

    pub active_cooling_power_watts: f64,
    pub target_thermal_power_watts: u32,

    pub fuel_feedback_0_c_pcm_per_c: f64,
    pub fuel_feedback_240_c_pcm_per_c: f64,
    pub fuel_feedback_slope_after_peak: f64,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            time_delta_seconds: constants::DEFAULT_TIME_DELTA_SECONDS,
            prompt_neutron_lifetime_seconds: constants::PROMPT_NEUTRON_LIFETIME_SECONDS,
            excess_reactivity_pcm: constants::EXCESS_REACTIVITY_PCM,
            control_rod_worth_pcm: constants::CONTROL_ROD_WORTH_PCM,
            neutron_source_per_second: constants::NEUTRON_SOURCE_NEUTRONS_PER_SECOND,
            delayed_groups: constants::DELAYED_NEUTRON_GROUPS.map(|(fraction, decay_constant)| {
                DelayedGroupConfig {
                    fraction,
                    decay_constant,
                }
            }),
            power_scram_watts: constants::POWER_SCRAM_WATTS,
            fuel_temperature_scram_celsius: constants::FUEL_TEMPERATURE_SCRAM_CELSIUS,
            water_temperature_scram_celsius: constants::WATER_TEMPERATURE_SCRAM_CELSIUS,
            safety_rod_speed_per_second: constants::SAFETY_ROD_SPEED_PER_SECOND,
            regulating_rod_speed_per_second: constants::REGULATING_ROD_SPEED_PER_SECOND,
            compensating_rod_speed_per_second: constants::COMPENSATING_ROD_SPEED_PER_SECOND,
            initial_rod_positions: InitialRodPositions::default(),
            active_cooling_power_watts: constants::ACTIVE_COOLING_POWER_WATTS,
            target_thermal_power_watts: constants::DEFAULT_TARGET_THERMAL_POWER_WATTS,
            fuel_feedback_0_c_pcm_per_c: constants::FUEL_FEEDBACK_COEFFICIENT_0_C_PCM_PER_C,
            fuel_feedback_240_c_pcm_per_c: constants::FUEL_FEEDBACK_COEFFICIENT_240_C_PCM_PER_C,
            fuel_feedback_slope_after_peak:
                constants::FUEL_FEEDBACK_SLOPE_AFTER_PEAK_PCM_PER_C_SQUARED,
        }
    }
}

impl ReactorConfig {
    /// Effective delayed neutron fraction, the plain sum of the group fractions
    pub fn beta_effective(&self) -> f64 {
        self.delayed_groups.iter().map(|group| group.fraction).sum()
    }

    /// Full-insertion worth of a single rod [pcm]
    pub fn rod_worth_pcm(&self) -> f64 {
        self.control_rod_worth_pcm / 3.0
    }

    pub fn validate(&self) -> Result<(), ReactorError> {
        if !self.time_delta_seconds.is_finite() || self.time_delta_seconds <= 0.0 {
            return Err(ReactorError::InvalidTimeStep(self.time_delta_seconds));
        }
        if !self.prompt_neutron_lifetime_seconds.is_finite()
            || self.prompt_neutron_lifetime_seconds <= 0.0
        {
            return Err(ReactorError::InvalidConfig(format!(
                "prompt neutron lifetime must be > 0, got {}",
                self.prompt_neutron_lifetime_seconds
            )));
        }

        let finite_fields = [
            ("excess_reactivity_pcm", self.excess_reactivity_pcm),
            ("control_rod_worth_pcm", self.control_rod_worth_pcm),
            ("neutron_source_per_second", self.neutron_source_per_second),
            ("power_scram_watts", self.power_scram_watts),
            ("fuel_temperature_scram_celsius", self.fuel_temperature_scram_celsius),
            ("water_temperature_scram_celsius", self.water_temperature_scram_celsius),
            ("active_cooling_power_watts", self.active_cooling_power_watts),
            ("fuel_feedback_0_c_pcm_per_c", self.fuel_feedback_0_c_pcm_per_c),
            ("fuel_feedback_240_c_pcm_per_c", self.fuel_feedback_240_c_pcm_per_c),
            ("fuel_feedback_slope_after_peak", self.fuel_feedback_slope_after_peak),
        ];
        for (name, value) in finite_fields {
            if !value.is_finite() {
                return Err(ReactorError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }

        for (index, group) in self.delayed_groups.iter().enumerate() {
            let valid = group.fraction.is_finite()
                && group.fraction >= 0.0
                && group.decay_constant.is_finite()
                && group.decay_constant >= 0.0;
            if !valid {
                return Err(ReactorError::InvalidConfig(format!(
                    "delayed group {} has invalid fraction {} or decay constant {}",
                    index + 1,
                    group.fraction,
                    group.decay_constant
                )));
            }
        }

        Ok(())
    }
}

/// Load and validate a configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<ReactorConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading reactor config: {}", path.display()))?;
    let config: ReactorConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing reactor config as JSON: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("rejected reactor config: {}", path.display()))?;
    Ok(config)
}

/// Try each candidate path in turn, falling back to the built-in defaults
pub fn load_config_or_default<P: AsRef<Path>>(paths: &[P]) -> ReactorConfig {
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            continue;
        }
        match load_config(path) {
            Ok(config) => {
                log::info!("Loaded reactor config from {}", path.display());
                return config;
            }
            Err(err) => log::warn!("Ignoring reactor config {}: {err:#}", path.display()),
        }
    }

    log::warn!("No usable reactor config found, using built-in defaults");
    ReactorConfig::default()
}
