//! Thermal and neutronic relations of the core model
//!
//! Pure functions with no engine state. The exchanged-power cubic solve and
//! the 4/3-power convection law keep the algebraic form of the TRIGLAV
//! reference model, constant factors included.

use crate::config::constants::*;

/// Thermal power from the neutron population
///
/// # Arguments
/// * `neutron_population` - Core-averaged neutron population N
///
/// # Returns
/// Thermal power [W]
pub fn calc_power_watts(neutron_population: f64) -> f64 {
    calc_power_mev_per_second(neutron_population) * MEV_TO_JOULE
}

/// Fission energy release rate [MeV/s]
pub fn calc_power_mev_per_second(neutron_population: f64) -> f64 {
    neutron_population
        * MACROSCOPIC_FISSION_CROSS_SECTION_PER_METER
        * NEUTRON_VELOCITY_METERS_PER_SECOND
        * FISSION_ENERGY_RELEASED_MEV
}

/// Neutron flux [n/cm²/s]
pub fn calc_flux(neutron_population: f64) -> f64 {
    let core_volume_cubic_centimeters = CORE_VOLUME_LITERS * 10.0 * 10.0 * 10.0;
    let neutron_velocity_cm_per_second = NEUTRON_VELOCITY_METERS_PER_SECOND * 100.0;

    neutron_population * (neutron_velocity_cm_per_second / core_volume_cubic_centimeters)
}

/// Power produced by a single fuel element, P_el [W]
pub fn calc_power_per_element(power_watts: f64) -> f64 {
    power_watts / FUEL_ELEMENTS_IN_CORE
}

/// Effective multiplication factor from unitless reactivity
pub fn calc_k_effective(reactivity: f64) -> f64 {
    1.0 / (1.0 - reactivity)
}

/// Fuel specific heat Cp(T) [J/kgK]
///
/// The fit is in "kelvin minus 273", so the Celsius input is shifted by 0.15.
pub fn calc_fuel_specific_heat_j_per_kg_k(fuel_temperature_celsius: f64) -> f64 {
    FUEL_CP_BASE_J_PER_KG_K + FUEL_CP_SLOPE_J_PER_KG_K2 * (fuel_temperature_celsius + 0.15)
}

/// Heat capacity of all fuel in the core [J/K]
pub fn calc_fuel_heat_capacity_j_per_k(fuel_temperature_celsius: f64) -> f64 {
    calc_fuel_specific_heat_j_per_kg_k(fuel_temperature_celsius) * FUEL_MASS_KG
}

/// Power flowing from the fuel into the pool water, P_fe_stat [W]
///
/// Inverts the stationary temperature polynomial
/// `ΔT = a0 P + a1 P² + a2 P³` through the closed-form real root of the
/// depressed cubic. `f64::cbrt` returns the real root for negative input.
///
/// # Arguments
/// * `fuel_temperature_celsius` - Fuel temperature [°C]
/// * `water_temperature_celsius` - Pool water temperature [°C]
///
/// # Returns
/// Exchanged power for the whole core [W], positive when the fuel is hotter
pub fn calc_power_exchanged_watts(
    fuel_temperature_celsius: f64,
    water_temperature_celsius: f64,
) -> f64 {
    let a0 = TEMPERATURE_FE_STAT_A0;
    let a1 = TEMPERATURE_FE_STAT_A1;
    let a2 = TEMPERATURE_FE_STAT_A2;

    let temperature_difference = water_temperature_celsius - fuel_temperature_celsius;

    let first = a1 * a1 - 3.0 * a0 * a2;
    let second =
        2.0 * a1 * a1 * a1 - 9.0 * a0 * a1 * a2 + 27.0 * a2 * a2 * temperature_difference;
    let root = ((second + (second * second - 4.0 * first * first * first).sqrt()) / 2.0).cbrt();

    -FUEL_ELEMENTS_IN_CORE * (1.0 / (3.0 * a2)) * (a1 + root + (first / root))
}

/// Fuel temperature in stationary conditions, T_fe_stat [°C]
pub fn calc_stationary_fuel_temperature(power_watts: f64, water_temperature_celsius: f64) -> f64 {
    let p = calc_power_per_element(power_watts);

    TEMPERATURE_FE_STAT_A0 * p
        + TEMPERATURE_FE_STAT_A1 * p * p
        + TEMPERATURE_FE_STAT_A2 * p * p * p
        + water_temperature_celsius
}

/// Heat leaving the pool surface by convection to the air [W]
///
/// The air is held at a fixed 20 °C; no loss when it is at least as warm as
/// the water.
pub fn calc_water_to_air_convection_watts(water_temperature_celsius: f64) -> f64 {
    let temperature_delta = water_temperature_celsius - AIR_TEMPERATURE_CELSIUS;
    if temperature_delta <= 0.0 {
        return 0.0;
    }

    // ΔT^(4/3)
    AIR_CONVECTION_COEFFICIENT * temperature_delta.powi(4).cbrt()
}

/// Heat exchanged with the concrete pool wall, held at 20 °C [W]
///
/// Positive when heat flows from the water into the concrete.
pub fn calc_water_to_concrete_watts(water_temperature_celsius: f64) -> f64 {
    CONCRETE_EXCHANGE_W_PER_K * (water_temperature_celsius - CONCRETE_TEMPERATURE_CELSIUS)
}

/// Fuel temperature feedback coefficients [pcm/°C]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelFeedback {
    pub coefficient_0_c: f64,
    pub coefficient_240_c: f64,
    pub slope_after_peak: f64,
}

impl Default for FuelFeedback {
    fn default() -> Self {
        Self {
            coefficient_0_c: FUEL_FEEDBACK_COEFFICIENT_0_C_PCM_PER_C,
            coefficient_240_c: FUEL_FEEDBACK_COEFFICIENT_240_C_PCM_PER_C,
            slope_after_peak: FUEL_FEEDBACK_SLOPE_AFTER_PEAK_PCM_PER_C_SQUARED,
        }
    }
}

impl FuelFeedback {
    /// Negative reactivity from fuel heating [pcm]
    ///
    /// The coefficient is interpolated between 0 °C and 240 °C, extrapolated
    /// with a fixed slope above, and multiplied by the temperature itself.
    pub fn feedback_pcm(&self, fuel_temperature_celsius: f64) -> f64 {
        let t = fuel_temperature_celsius;

        if t <= 0.0 {
            return 0.0;
        }

        if t <= FUEL_FEEDBACK_PEAK_CELSIUS {
            let fraction_to_peak = t / FUEL_FEEDBACK_PEAK_CELSIUS;
            let coefficient = self.coefficient_0_c
                + (self.coefficient_240_c - self.coefficient_0_c) * fraction_to_peak;
            return t * coefficient;
        }

        let above_peak = t - FUEL_FEEDBACK_PEAK_CELSIUS;
        t * (self.coefficient_240_c + self.slope_after_peak * above_peak)
    }
}
